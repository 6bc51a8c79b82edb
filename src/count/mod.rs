//! Per-task counter groups.
//!
//! Each tracked task owns one two-event group: CPU cycles opens first and
//! becomes the group leader, retired instructions joins as its sibling.
//! Grouping guarantees both counts cover exactly the same enable window and
//! lets a single read on the leader return both values.

use std::fs::File;
use std::os::fd::AsRawFd;

use arrayvec::ArrayVec;
use log::warn;

use crate::error::OpenError;
use crate::ffi::syscall::{ioctl_argp, perf_event_open, read};
use crate::ffi::{bindings as b, deref_offset, Attr};
use crate::task::Tid;

pub mod set;

/// Slot of the cycle event, which is also the group leader.
pub(crate) const CYCLES: usize = 0;
/// Slot of the instruction event.
pub(crate) const INSTRS: usize = 1;
pub(crate) const OBSERVED_EVENTS: usize = 2;

// https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h#L344
// struct read_format {
//     u64 nr;
//     struct {
//         u64 value;
//         u64 id;
//     } values[nr];
// };
//
// With PERF_FORMAT_GROUP | PERF_FORMAT_ID on a two-event group the kernel
// replies with exactly these 40 bytes: the u64 count plus two value/id
// pairs. The buffer must be sized to the byte: oversizing would let a
// corrupt partial reply pass the length check, undersizing truncates the
// second entry.
pub(crate) const READ_BUF_LEN: usize = size_of::<u64>() * (1 + 2 * OBSERVED_EVENTS);

// Aligned so the u64 fields can be dereferenced in place.
#[repr(C, align(8))]
pub(crate) struct ReadBuf(pub(crate) [u8; READ_BUF_LEN]);

/// The counter group of one task.
///
/// Either slot may be missing: an open failure leaves `None` there, is
/// logged, and degrades this task only. `fds[CYCLES]` is the group leader,
/// the only descriptor ever read from or ioctl'd.
pub struct TaskCounter {
    pub(crate) tid: Tid,
    pub(crate) attrs: [Attr; OBSERVED_EVENTS],
    pub(crate) ids: [u64; OBSERVED_EVENTS],
    pub(crate) values: [u64; OBSERVED_EVENTS],
    pub(crate) fds: [Option<File>; OBSERVED_EVENTS],
    pub(crate) read_buf: ReadBuf,
}

fn hardware_attr(config: u32) -> Attr {
    let mut attr = Attr {
        size: size_of::<Attr>() as _,
        ..Default::default()
    };
    attr.type_ = b::PERF_TYPE_HARDWARE;
    attr.config = config as u64;
    // One read on the leader returns every group member, each tagged with
    // its kernel-assigned id.
    attr.read_format = (b::PERF_FORMAT_GROUP | b::PERF_FORMAT_ID) as u64;
    // Created disabled, so the group only counts between an explicit
    // enable and disable and needs no extra syscall at creation.
    attr.set_disabled(1);
    attr
}

impl TaskCounter {
    pub(crate) fn unopened(tid: Tid) -> Self {
        Self {
            tid,
            attrs: [
                hardware_attr(b::PERF_COUNT_HW_CPU_CYCLES),
                hardware_attr(b::PERF_COUNT_HW_INSTRUCTIONS),
            ],
            ids: [0; OBSERVED_EVENTS],
            values: [0; OBSERVED_EVENTS],
            fds: [None, None],
            read_buf: ReadBuf([0; READ_BUF_LEN]),
        }
    }

    /// Opens the counter group for `tid`.
    ///
    /// Always returns a record. Each open may fail independently; the errno
    /// is mapped through [`OpenError`], logged, and the slot stays empty.
    pub fn open(tid: Tid) -> Self {
        let mut record = Self::unopened(tid);
        // No group yet: the cycle event becomes the leader.
        record.open_slot(CYCLES, -1);
        match record.fds[CYCLES].as_ref().map(|fd| fd.as_raw_fd()) {
            Some(leader_fd) => record.open_slot(INSTRS, leader_fd),
            // Without a leader there is no group to join; leave the sibling
            // closed rather than opening a stray ungrouped counter.
            None => warn!("task {tid}: no group leader, skipping instruction event"),
        }
        record
    }

    fn open_slot(&mut self, slot: usize, group_fd: i32) {
        // pid = tid and cpu = -1 measures the task on whatever CPU it runs.
        let flags = b::PERF_FLAG_FD_CLOEXEC as u64;
        match perf_event_open(&self.attrs[slot], self.tid, -1, group_fd, flags) {
            Ok(fd) => {
                // The id is what matches this event's value in the group
                // read buffer, where member order is unspecified.
                if let Err(e) = ioctl_argp(&fd, b::PERF_IOC_OP_ID as _, &mut self.ids[slot]) {
                    warn!("task {}: event id fetch failed: {e}", self.tid);
                }
                self.fds[slot] = Some(fd);
            }
            Err(e) => warn!("task {}: {}", self.tid, OpenError::from(e)),
        }
    }

    pub fn tid(&self) -> Tid {
        self.tid
    }

    /// CPU cycles decoded from the most recent accepted read.
    pub fn cycles(&self) -> u64 {
        self.values[CYCLES]
    }

    /// Retired instructions decoded from the most recent accepted read.
    pub fn instrs(&self) -> u64 {
        self.values[INSTRS]
    }

    /// Reads the group through the leader and decodes both values.
    ///
    /// Only a byte-exact reply is accepted; a short or failed read keeps
    /// the previous values and is logged.
    pub(crate) fn read_group(&mut self) {
        let Some(leader) = &self.fds[CYCLES] else {
            warn!("task {}: no open group to read", self.tid);
            return;
        };
        match read(leader, &mut self.read_buf.0) {
            Ok(len) if len == READ_BUF_LEN => self.decode_read_buf(),
            Ok(len) => warn!("task {}: short group read of {len} bytes", self.tid),
            Err(e) => warn!("task {}: group read failed: {e}", self.tid),
        }
    }

    fn decode_read_buf(&mut self) {
        let mut ptr = self.read_buf.0.as_ptr();
        // The count field gates how much of the buffer is trusted.
        let nr = unsafe { deref_offset::<u64>(&mut ptr) };

        let mut entries: ArrayVec<(u64, u64), OBSERVED_EVENTS> = ArrayVec::new();
        for _ in 0..nr.min(OBSERVED_EVENTS as u64) {
            let value = unsafe { deref_offset::<u64>(&mut ptr) };
            let id = unsafe { deref_offset::<u64>(&mut ptr) };
            entries.push((value, id));
        }

        // Group members come back in unspecified order, so each value is
        // assigned to its slot by id, never by position.
        for (value, id) in entries {
            if id == self.ids[CYCLES] {
                self.values[CYCLES] = value;
            } else if id == self.ids[INSTRS] {
                self.values[INSTRS] = value;
            }
        }
    }
}
