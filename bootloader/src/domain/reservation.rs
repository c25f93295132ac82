//! Memory reservations handed to the kernel
//!
//! The kernel receives a pointer to a contiguous array of [`Reservation`]
//! records plus a count. The record layout is part of the kernel's binary
//! contract: three pointer-sized fields in this order, no extra padding.

use crate::error::{BootError, Result};
use alloc::ffi::CString;
use core::ffi::{c_char, CStr};
use core::fmt;

/// A named half-open range `[begin, end)` of memory consumed by the loader
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Reservation {
    /// NUL-terminated label, never freed
    name: *const c_char,
    begin: u64,
    end: u64,
}

impl Reservation {
    /// Create a reservation labelled `label`.
    ///
    /// The label is copied into a NUL-terminated buffer that lives for the
    /// rest of the boot and is read by the kernel after handoff.
    pub fn new(label: &str, begin: u64, end: u64) -> Result<Self> {
        debug_assert!(begin <= end);

        let name = CString::new(label).map_err(|_| BootError::Syntax("label contains NUL"))?;

        Ok(Self {
            name: CString::into_raw(name).cast_const(),
            begin,
            end,
        })
    }

    pub fn label(&self) -> &str {
        // SAFETY: `name` comes from `CString::into_raw` in `new` and is never
        // released, so it points to a valid NUL-terminated string.
        let name = unsafe { CStr::from_ptr(self.name) };
        name.to_str().unwrap_or("")
    }

    pub fn begin(&self) -> u64 {
        self.begin
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    pub fn overlaps(&self, other: &Reservation) -> bool {
        self.begin < other.end && other.begin < self.end
    }
}

impl fmt::Debug for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{:#x}, {:#x})", self.label(), self.begin, self.end)
    }
}
