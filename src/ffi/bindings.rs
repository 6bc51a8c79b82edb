//! Hand-maintained subset of the perf uapi.
//!
//! Only the pieces this crate touches are declared: the hardware event
//! domain, the two observed event selectors, the group read format, the
//! group ioctl ops and the event attribute struct. Everything keeps the
//! uapi spelling.
//!
//! https://github.com/torvalds/linux/blob/v6.13/include/uapi/linux/perf_event.h

#![allow(non_camel_case_types)]

pub const PERF_TYPE_HARDWARE: u32 = 0;

pub const PERF_COUNT_HW_CPU_CYCLES: u32 = 0;
pub const PERF_COUNT_HW_INSTRUCTIONS: u32 = 1;

pub const PERF_FORMAT_ID: u32 = 1 << 2;
pub const PERF_FORMAT_GROUP: u32 = 1 << 3;

pub const PERF_FLAG_FD_CLOEXEC: u32 = 1 << 3;

// _IO('$', 0..3) and _IOR('$', 7, u64).
pub const PERF_IOC_OP_ENABLE: u32 = 0x2400;
pub const PERF_IOC_OP_DISABLE: u32 = 0x2401;
pub const PERF_IOC_OP_RESET: u32 = 0x2403;
pub const PERF_IOC_OP_ID: u32 = 0x8008_2407;

pub const PERF_IOC_FLAG_GROUP: u32 = 1;

pub const PERF_ATTR_SIZE_VER8: u32 = 136;

/// The event attribute struct at its `PERF_ATTR_SIZE_VER8` layout, with the
/// bitfield word flattened to `flags`. The kernel dispatches on `size`, so
/// the layout must hold byte for byte.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct perf_event_attr {
    pub type_: u32,
    pub size: u32,
    pub config: u64,
    pub sample_period_or_freq: u64,
    pub sample_type: u64,
    pub read_format: u64,
    pub flags: u64,
    pub wakeup_events_or_watermark: u32,
    pub bp_type: u32,
    pub config1: u64,
    pub config2: u64,
    pub branch_sample_type: u64,
    pub sample_regs_user: u64,
    pub sample_stack_user: u32,
    pub clockid: i32,
    pub sample_regs_intr: u64,
    pub aux_watermark: u32,
    pub sample_max_stack: u16,
    pub __reserved_2: u16,
    pub aux_sample_size: u32,
    pub __reserved_3: u32,
    pub sig_data: u64,
    pub config3: u64,
}

const _: () = assert!(size_of::<perf_event_attr>() == PERF_ATTR_SIZE_VER8 as usize);

impl Default for perf_event_attr {
    fn default() -> Self {
        // All-zero is the documented "everything off" attr.
        unsafe { std::mem::zeroed() }
    }
}

impl perf_event_attr {
    // Bit 0 of the flags word.
    pub fn set_disabled(&mut self, val: u64) {
        self.flags = (self.flags & !1) | (val & 1);
    }
}
