//! Bootloader → Kernel Handoff
//!
//! Takes the final memory map snapshot, leaves boot services and jumps to the
//! kernel. A [`Handoff`] can only be obtained from [`exit_boot_services`],
//! which consumes the firmware capability, so the kernel is never entered
//! while firmware services are still reachable from the loader.

use crate::arch::{self, KernelEntry};
use crate::domain::context::LoaderContext;
use crate::domain::reservation::Reservation;
use crate::error::{BootError, Result};
use crate::firmware::{Firmware, MemoryMapError, MemoryMapKey};
use crate::utils::registry::Registry;
use core::mem::{self, ManuallyDrop};
use core::ptr::{self, NonNull};
use core::slice;

/// First guess for the memory map buffer size in bytes
pub const INITIAL_MEMORY_MAP_SIZE: usize = 4096;

/// The memory map snapshot taken right before the exit
#[derive(Debug)]
pub struct MemoryMapSnapshot {
    pub key: MemoryMapKey,
    /// Pool buffer holding the map
    pub buffer: NonNull<u8>,
    pub size: usize,
}

/// Take a memory map snapshot.
///
/// The buffer size starts at [`INITIAL_MEMORY_MAP_SIZE`] and is doubled after
/// every "buffer too small" answer. Buffers that turned out too small are
/// returned to the pool; the final one is owned by the snapshot, since
/// freeing it would change the map again.
pub fn fetch_memory_map<F: Firmware>(firmware: &mut F) -> Result<MemoryMapSnapshot> {
    let mut size = INITIAL_MEMORY_MAP_SIZE;

    loop {
        let buffer = firmware.allocate_pool(size)?;
        // SAFETY: the pool allocation is `size` bytes and owned by the loader
        let map = unsafe {
            ptr::write_bytes(buffer.as_ptr(), 0, size);
            slice::from_raw_parts_mut(buffer.as_ptr(), size)
        };

        match firmware.memory_map(map) {
            Ok(key) => return Ok(MemoryMapSnapshot { key, buffer, size }),
            Err(MemoryMapError::BufferTooSmall { required }) => {
                // SAFETY: `buffer` came from `allocate_pool` above and `map`
                // is not used past this point.
                unsafe { firmware.free_pool(buffer)? };
                size = size
                    .max(required)
                    .checked_mul(2)
                    .ok_or(BootError::FatalService("memory map too large", uefi::Status::BUFFER_TOO_SMALL))?;
            }
            Err(MemoryMapError::Failed(status)) => {
                log::error!("failed to get memory map: {:?}", status);
                // SAFETY: as above
                unsafe { firmware.free_pool(buffer)? };
                return Err(BootError::FatalService("failed to get memory map", status));
            }
        }
    }
}

/// Leave boot services and produce the handoff for the loaded kernel.
///
/// Nothing may allocate between the memory map snapshot and the exit call,
/// so the last log line is written before the snapshot is taken. Once the
/// exit succeeds the global allocator is gone as well: the parts of the
/// context the kernel does not receive are leaked rather than dropped. If
/// the exit fails they are released normally together with the map buffer.
pub fn exit_boot_services<F: Firmware>(mut firmware: F, ctx: LoaderContext) -> Result<Handoff> {
    let LoaderContext {
        config,
        modules,
        kernel,
        reservations,
        ..
    } = ctx;
    let entry = kernel.as_ref().map(|kernel| kernel.entry).ok_or(BootError::MissingKernel)?;
    log::info!("Starting ELF image...");

    let snapshot = fetch_memory_map(&mut firmware)?;
    let bookkeeping = ManuallyDrop::new((config, modules, kernel));
    let reservations = ManuallyDrop::new(reservations);

    match firmware.exit_boot_services(snapshot.key) {
        Ok(()) => Ok(Handoff { entry, reservations }),
        Err((mut firmware, err)) => {
            log::error!("{}", err);
            // SAFETY: the snapshot buffer came from `allocate_pool` on this
            // firmware and nothing refers to it any more.
            if let Err(e) = unsafe { firmware.free_pool(snapshot.buffer) } {
                log::warn!("{}", e);
            }
            drop(ManuallyDrop::into_inner(bookkeeping));
            drop(ManuallyDrop::into_inner(reservations));
            Err(err)
        }
    }
}

/// Kernel handoff
///
/// Everything the kernel receives: its entry address and the reservation
/// array.
///
/// Boot services are gone once a handoff exists, so dropping one leaks the
/// reservation array instead of returning it to the pool.
pub struct Handoff {
    entry: u64,
    reservations: ManuallyDrop<Registry<Reservation>>,
}

impl Handoff {
    pub fn entry(&self) -> u64 {
        self.entry
    }

    pub fn reservations(&self) -> &[Reservation] {
        self.reservations.as_slice()
    }

    /// Jump to the kernel.
    ///
    /// # Safety
    ///
    /// `entry` must point at executable code of a loaded kernel that
    /// follows the entry ABI in [`KernelEntry`]. Firmware services are gone
    /// at this point, so the call cannot be undone; if the kernel returns the
    /// CPU is parked.
    pub unsafe fn execute(self) -> ! {
        // SAFETY: guaranteed by the caller
        unsafe {
            let kernel: KernelEntry = mem::transmute::<usize, KernelEntry>(self.entry as usize);
            kernel(self.reservations.as_ptr(), self.reservations.len());
        }

        arch::halt_forever()
    }
}
