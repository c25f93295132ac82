//! Firmware Interface - the services the loader consumes from the host
//!
//! The pipeline only talks to the platform through [`Firmware`] and
//! [`FirmwareFile`]. [`uefi_boot_services`] implements them on top of UEFI
//! boot services; tests drive the same pipeline with a simulated firmware.
//!
//! [`Firmware::exit_boot_services`] takes the capability by value. Once the
//! exit has succeeded nothing in the loader can reach a firmware service
//! again; a failed exit hands the capability back.

pub mod uefi_boot_services;

use crate::error::{BootError, IoOp, Result};
use core::ptr::NonNull;
use uefi::Status;

/// Page granularity of firmware page allocations
pub const PAGE_SIZE: u64 = 4096;

/// Key identifying one memory map snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryMapKey(pub usize);

/// Why a memory map snapshot could not be taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryMapError {
    /// The buffer is smaller than the map; `required` is the size the
    /// firmware reported at the time of the call.
    BufferTooSmall { required: usize },
    /// Any other firmware failure
    Failed(Status),
}

/// An open, read-only file on the boot volume.
///
/// Dropping the handle closes the file.
pub trait FirmwareFile {
    /// Size of the file in bytes
    fn size(&mut self) -> Result<u64>;

    /// Move the read position to `position` bytes from the start
    fn set_position(&mut self, position: u64) -> Result<()>;

    /// Read into `buffer` and return the number of bytes read, which may be
    /// fewer than requested.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;
}

/// Boot-time firmware services
pub trait Firmware {
    type File: FirmwareFile;

    /// Open `path` read-only, relative to the boot volume root
    fn open(&mut self, path: &str) -> Result<Self::File>;

    /// Allocate `count` pages of loader data at any physical address
    fn allocate_pages(&mut self, count: usize) -> Result<NonNull<u8>>;

    /// Allocate `size` bytes of loader data from the pool
    fn allocate_pool(&mut self, size: usize) -> Result<NonNull<u8>>;

    /// Return a pool buffer to the firmware.
    ///
    /// # Safety
    /// `buffer` must come from [`Firmware::allocate_pool`] on this firmware
    /// and must not be used afterwards.
    unsafe fn free_pool(&mut self, buffer: NonNull<u8>) -> Result<()>;

    /// Copy the current memory map into `buffer`
    fn memory_map(&mut self, buffer: &mut [u8]) -> core::result::Result<MemoryMapKey, MemoryMapError>;

    /// Leave boot services. `key` must belong to the latest memory map
    /// snapshot; any allocation since then makes it stale.
    ///
    /// On failure boot services are still active and the firmware is
    /// returned together with the error.
    fn exit_boot_services(self, key: MemoryMapKey) -> core::result::Result<(), (Self, BootError)>
    where
        Self: Sized;
}

/// Fill `buffer` from `file` starting at `offset`.
///
/// A single firmware read may come back short, so keep reading until the
/// whole buffer is filled. Hitting the end of the file first is an error.
pub fn read_exact_at<F: FirmwareFile + ?Sized>(file: &mut F, offset: u64, buffer: &mut [u8]) -> Result<()> {
    file.set_position(offset)?;

    let mut filled = 0;
    while filled < buffer.len() {
        let read = file.read(&mut buffer[filled..])?;
        if read == 0 {
            log::error!("unexpected end of file after {} of {} bytes", filled, buffer.len());
            return Err(BootError::Io(IoOp::Read, Status::END_OF_FILE));
        }
        filled += read.min(buffer.len() - filled);
    }

    Ok(())
}
