//! Module loader
//!
//! Loads every configured module other than the kernel as an opaque blob into
//! its own pool allocation. Blobs are never freed; the kernel learns about
//! them through the reservation registry.

use crate::domain::context::LoaderContext;
use crate::domain::reservation::Reservation;
use crate::error::Result;
use crate::firmware::{Firmware, FirmwareFile, read_exact_at};
use core::ptr;
use core::slice;

/// Load all non-kernel modules in registry order.
///
/// The first failing module aborts the whole boot.
pub fn load_modules<F: Firmware>(firmware: &mut F, ctx: &mut LoaderContext) -> Result<()> {
    for (index, module) in ctx.modules.iter().enumerate() {
        if Some(index) == ctx.kernel_index {
            continue;
        }

        log::info!("Loading module {} from {}", module.name, module.path);
        let mut file = firmware.open(&module.path)?;
        let size = file.size()? as usize;

        let buffer = firmware.allocate_pool(size)?;
        // SAFETY: the pool allocation is `size` bytes and owned by the loader
        let blob = unsafe {
            ptr::write_bytes(buffer.as_ptr(), 0, size);
            slice::from_raw_parts_mut(buffer.as_ptr(), size)
        };
        read_exact_at(&mut file, 0, blob)?;

        let begin = buffer.as_ptr() as u64;
        let end = begin + size as u64;
        ctx.reservations
            .append(Reservation::new(&module.name, begin, end)?)?;
        log::debug!("module {} at [{:#x}, {:#x})", module.name, begin, end);
    }

    Ok(())
}
