//! Keeps the counter set matched to the live task set.

use std::collections::BTreeSet;
use std::io::Result;
use std::path::Path;

use crate::count::set::CounterSet;
use crate::task::{list_tasks, Tid};

/// One reconciliation round: re-enumerates the tasks of `pid` and adjusts
/// `counters` so it tracks exactly the live tasks.
///
/// `known` is the caller-owned snapshot from the previous round; both set
/// differences are computed against it before it is replaced. Newly arrived
/// tasks get fresh counter groups and departed tasks have theirs closed.
/// Surviving tasks keep their groups: recreating them would waste the open
/// overhead and lose their descriptors.
///
/// The only error is a broken procfs contract from [`list_tasks`], which the
/// caller should treat as fatal.
pub fn reconcile<P: AsRef<Path>>(
    proc_root: P,
    pid: Tid,
    counters: &mut CounterSet,
    known: &mut BTreeSet<Tid>,
) -> Result<()> {
    let live = list_tasks(proc_root, pid)?;

    let arrived: BTreeSet<Tid> = live.difference(known).copied().collect();
    let departed: BTreeSet<Tid> = known.difference(&live).copied().collect();

    counters.create(&arrived);
    counters.cull(&departed);
    *known = live;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_vanished_pid_culls_everything() {
        let root = tempfile::tempdir().unwrap();
        let mut counters = CounterSet::new();
        let mut known = BTreeSet::from([999_999_999]);
        counters.create(&known);
        assert_eq!(counters.len(), 1);

        reconcile(root.path(), 4242, &mut counters, &mut known).unwrap();

        assert!(known.is_empty());
        assert!(counters.is_empty());
    }

    #[test]
    fn rounds_are_stable_when_nothing_changes() {
        let pid = std::process::id() as Tid;
        let mut counters = CounterSet::new();
        let mut known = BTreeSet::new();

        reconcile("/proc", pid, &mut counters, &mut known).unwrap();
        assert!(known.contains(&pid));
        assert_eq!(counters.len(), known.len());

        // The harness runs tests on sibling threads, so the task set may
        // shift between rounds; the set and the snapshot must stay in step
        // regardless.
        reconcile("/proc", pid, &mut counters, &mut known).unwrap();
        assert!(known.contains(&pid));
        assert_eq!(counters.len(), known.len());
    }
}
