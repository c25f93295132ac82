//! Config loader
//!
//! Reads the whole configuration file into one buffer with a trailing NUL,
//! so the parser always finds a sentinel at the end.

use crate::domain::context::LoaderContext;
use crate::error::{BootError, Result};
use crate::firmware::{Firmware, FirmwareFile, read_exact_at};
use alloc::vec::Vec;

/// Read the file at `path` into the context's config buffer
pub fn load_config<F: Firmware>(firmware: &mut F, ctx: &mut LoaderContext, path: &str) -> Result<()> {
    log::info!("Loading config from {}", path);

    let mut file = firmware.open(path)?;
    let size = file.size()? as usize;

    let mut buffer = Vec::new();
    let length = size.checked_add(1).ok_or(BootError::Allocation("config buffer"))?;
    buffer
        .try_reserve_exact(length)
        .map_err(|_| BootError::Allocation("config buffer"))?;
    buffer.resize(length, 0u8);

    read_exact_at(&mut file, 0, &mut buffer[..size])?;
    log::debug!("config: {} bytes", size);

    ctx.config = buffer;
    Ok(())
}
