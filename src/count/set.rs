//! The live counter set, one record per tracked task.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;

use log::{debug, warn};

use super::{TaskCounter, CYCLES};
use crate::ffi::bindings as b;
use crate::ffi::syscall::{close, ioctl_arg};
use crate::task::Tid;

/// Owns every live [`TaskCounter`], keyed by task id.
///
/// Exclusively owned by the thread driving the sampling loop; concurrent
/// polling of independent process trees needs independent sets.
#[derive(Default)]
pub struct CounterSet {
    counters: BTreeMap<Tid, TaskCounter>,
}

impl CounterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a counter group for every id not already tracked.
    ///
    /// Duplicate ids collapse to one record. A present record whose leader
    /// never opened is replaced with a fresh open attempt, so each round is
    /// a fresh chance for a task that could not be measured before.
    pub fn create(&mut self, tids: &BTreeSet<Tid>) {
        for &tid in tids {
            if let Some(counter) = self.counters.get(&tid) {
                if counter.fds[CYCLES].is_some() {
                    continue;
                }
            }
            self.counters.insert(tid, TaskCounter::open(tid));
        }
    }

    /// Closes and removes the records of the given ids.
    ///
    /// Ids without a record are no-ops. A close failure is logged and never
    /// blocks removal of the rest of the record.
    pub fn cull(&mut self, tids: &BTreeSet<Tid>) {
        for tid in tids {
            let Some(counter) = self.counters.remove(tid) else {
                continue;
            };
            for fd in counter.fds {
                let Some(fd) = fd else { continue };
                if let Err(e) = close(fd) {
                    warn!("task {tid}: close failed: {e}");
                }
            }
        }
    }

    /// Zeroes every group, then starts it counting.
    ///
    /// Reset-before-enable makes each window start from zero no matter what
    /// the previous window left behind. `PERF_IOC_FLAG_GROUP` applies each
    /// op to every member, so only the leader is touched.
    pub fn reset_and_enable(&self) {
        for counter in self.counters.values() {
            if let Some(leader) = &counter.fds[CYCLES] {
                group_ioctl(leader, counter.tid, b::PERF_IOC_OP_RESET);
                group_ioctl(leader, counter.tid, b::PERF_IOC_OP_ENABLE);
            }
        }
    }

    /// Stops every group counting.
    ///
    /// Called at the end of the window, before the values are read, so a
    /// slow read cannot inflate the counts.
    pub fn disable(&self) {
        for counter in self.counters.values() {
            if let Some(leader) = &counter.fds[CYCLES] {
                group_ioctl(leader, counter.tid, b::PERF_IOC_OP_DISABLE);
            }
        }
    }

    /// Decodes the latest window's counts into every record.
    pub fn read(&mut self) {
        for counter in self.counters.values_mut() {
            counter.read_group();
        }
    }

    pub fn get(&self, tid: Tid) -> Option<&TaskCounter> {
        self.counters.get(&tid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskCounter> {
        self.counters.values()
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

fn group_ioctl(leader: &File, tid: Tid, op: u32) {
    if let Err(e) = ioctl_arg(leader, op as _, b::PERF_IOC_FLAG_GROUP as _) {
        debug!("task {tid}: group ioctl {op:#x} failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io;
    use std::os::fd::{AsRawFd, RawFd};

    use super::*;
    use crate::reconcile::reconcile;

    // An id far above the default pid_max, so opens fail with ESRCH and the
    // record degrades instead of touching a real task.
    const NO_SUCH_TID: Tid = 999_999_999;

    // cull only cares about descriptor ownership, so plain files stand in
    // for perf descriptors.
    fn record_with_files(tid: Tid) -> (TaskCounter, [RawFd; 2]) {
        let mut counter = TaskCounter::unopened(tid);
        let a = tempfile::tempfile().unwrap();
        let b = tempfile::tempfile().unwrap();
        let fds = [a.as_raw_fd(), b.as_raw_fd()];
        counter.fds = [Some(a), Some(b)];
        (counter, fds)
    }

    fn fd_is_open(fd: RawFd) -> bool {
        unsafe { libc::fcntl(fd, libc::F_GETFD) != -1 }
    }

    #[test]
    fn create_then_cull_empties_the_set() {
        let mut set = CounterSet::new();
        let ids = BTreeSet::from([NO_SUCH_TID]);
        set.create(&ids);
        assert_eq!(set.len(), 1);
        set.cull(&ids);
        assert!(set.is_empty());
    }

    #[test]
    fn cull_closes_every_descriptor_exactly_once() {
        let mut set = CounterSet::new();
        let (counter, fds) = record_with_files(7);
        set.counters.insert(7, counter);

        set.cull(&BTreeSet::from([7]));
        assert!(set.is_empty());
        for fd in fds {
            // Already closed: closing again must report a bad descriptor.
            assert_eq!(unsafe { libc::close(fd) }, -1);
            assert_eq!(
                io::Error::last_os_error().raw_os_error(),
                Some(libc::EBADF)
            );
        }
    }

    #[test]
    fn cull_of_even_ids_keeps_the_odd_half() {
        const N: Tid = 10;
        let mut set = CounterSet::new();
        let mut fds = BTreeMap::new();
        for tid in 0..N {
            let (counter, pair) = record_with_files(tid);
            set.counters.insert(tid, counter);
            fds.insert(tid, pair);
        }

        let evens: BTreeSet<Tid> = (0..N).filter(|tid| tid % 2 == 0).collect();
        set.cull(&evens);

        assert_eq!(set.len(), (N - N / 2) as usize);
        for (tid, pair) in fds {
            for fd in pair {
                assert_eq!(fd_is_open(fd), tid % 2 == 1);
            }
        }
    }

    #[test]
    fn cull_of_an_absent_id_is_a_noop() {
        let mut set = CounterSet::new();
        set.create(&BTreeSet::from([NO_SUCH_TID]));
        set.cull(&BTreeSet::from([NO_SUCH_TID + 1]));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn degraded_records_read_as_zero() {
        let mut set = CounterSet::new();
        set.create(&BTreeSet::from([NO_SUCH_TID]));
        set.read();
        let counter = set.get(NO_SUCH_TID).unwrap();
        assert_eq!(counter.cycles(), 0);
        assert_eq!(counter.instrs(), 0);
    }

    #[test]
    fn window_control_is_idempotent_and_keeps_descriptors_open() {
        let mut set = CounterSet::new();
        set.counters.insert(1, TaskCounter::unopened(1));
        let (counter, fds) = record_with_files(2);
        set.counters.insert(2, counter);

        // Plain files reject the ioctls; that is logged, not propagated.
        for _ in 0..3 {
            set.reset_and_enable();
            set.disable();
        }

        assert_eq!(set.len(), 2);
        for fd in fds {
            assert!(fd_is_open(fd));
        }
    }

    #[test]
    fn reconcile_diffs_against_the_previous_snapshot() {
        let root = tempfile::tempdir().unwrap();
        let task_dir = root.path().join("4242").join("task");
        fs::create_dir_all(&task_dir).unwrap();
        for tid in [2, 3, 4] {
            fs::create_dir(task_dir.join(tid.to_string())).unwrap();
        }

        let mut set = CounterSet::new();
        let mut known = BTreeSet::from([1, 2, 3]);
        for &tid in &known {
            set.counters.insert(tid, TaskCounter::unopened(tid));
        }
        // Sentinel to prove surviving records are not recreated.
        set.counters.get_mut(&2).unwrap().values[CYCLES] = 77;

        reconcile(root.path(), 4242, &mut set, &mut known).unwrap();

        assert_eq!(known, BTreeSet::from([2, 3, 4]));
        assert!(set.get(1).is_none());
        assert!(set.get(4).is_some());
        assert_eq!(set.get(2).unwrap().cycles(), 77);
        assert_eq!(set.len(), 3);
    }
}
