//! Task (thread) enumeration through the proc filesystem.

use std::collections::BTreeSet;
use std::fs;
use std::io::{Error, ErrorKind, Result};
use std::path::Path;

use log::warn;

/// Kernel task (thread) identifier.
pub type Tid = libc::pid_t;

/// Lists the tasks of `pid` from `<proc_root>/<pid>/task/`.
///
/// A missing task directory means the process exited or never existed and
/// yields the empty set. An entry name that is not a non-negative decimal
/// integer breaks the procfs contract and is an error the caller should
/// treat as fatal. Entries racing with task exit are skipped.
pub fn list_tasks<P: AsRef<Path>>(proc_root: P, pid: Tid) -> Result<BTreeSet<Tid>> {
    let task_dir = proc_root.as_ref().join(pid.to_string()).join("task");

    let entries = match fs::read_dir(&task_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("no such pid {pid}");
            return Ok(BTreeSet::new());
        }
        Err(e) => return Err(e),
    };

    let mut tids = BTreeSet::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            // The task exited between listing and inspection.
            Err(_) => continue,
        };
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let tid = name.parse::<Tid>().ok().filter(|tid| *tid >= 0).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidData,
                format!("task entry {name:?} under {} is not a tid", task_dir.display()),
            )
        })?;
        tids.insert(tid);
    }

    Ok(tids)
}
