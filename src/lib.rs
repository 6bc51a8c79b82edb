//! Per-task CPU cycle and instruction sampling via `perf_event_open`.
//!
//! Tracks every kernel task (thread) of one process. Each task gets a
//! two-event counter group (CPU cycles as the group leader, retired
//! instructions as its sibling) that is reset, enabled, disabled and read
//! in lock-step with a caller-imposed sampling window. Between windows the
//! group set is reconciled against `/proc/<pid>/task`, so threads that
//! start or exit mid-run are picked up or released automatically.
//!
//! ## Example
//!
//! ```no_run
//! use std::collections::BTreeSet;
//! use std::thread;
//! use std::time::Duration;
//!
//! use perf_task_count::count::set::CounterSet;
//! use perf_task_count::reconcile::reconcile;
//!
//! let pid = 1234; // the process tree to measure
//! let mut counters = CounterSet::new();
//! let mut known = BTreeSet::new();
//!
//! loop {
//!     reconcile("/proc", pid, &mut counters, &mut known).unwrap();
//!     counters.reset_and_enable();
//!     thread::sleep(Duration::from_secs(5));
//!     counters.disable();
//!     counters.read();
//!
//!     let cycles: u64 = counters.iter().map(|c| c.cycles()).sum();
//!     let instrs: u64 = counters.iter().map(|c| c.instrs()).sum();
//!     println!("{cycles} cycles, {instrs} instructions");
//! }
//! ```
//!
//! A task whose counters cannot be opened (permissions, descriptor
//! exhaustion, unsupported hardware) degrades that task only: the failure
//! is reported through the `log` facade and the task reads as zero until a
//! later round can measure it. The one fatal condition is a malformed
//! procfs task entry, which means the kernel contract this crate relies on
//! does not hold.
//!
//! Everything here is blocking and single-threaded; a [`CounterSet`] is
//! exclusively owned by the thread driving the loop.
//!
//! [`CounterSet`]: count::set::CounterSet

pub mod count;
pub mod error;
mod ffi;
pub mod reconcile;
pub mod task;
