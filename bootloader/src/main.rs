//! elfload - UEFI boot loader entry point
//!
//! Installs the console logger, resolves the boot volume, runs the loading
//! pipeline and jumps to the kernel. Any failure before the boot-services
//! exit is logged and its status returned to the firmware.

#![cfg_attr(target_os = "uefi", no_std)]
#![cfg_attr(target_os = "uefi", no_main)]

#[cfg(target_os = "uefi")]
use elfload::{
    arch::Architecture,
    drivers::console::{self, ConsoleLogger},
    firmware::uefi_boot_services::UefiFirmware,
};
#[cfg(target_os = "uefi")]
use log::LevelFilter;
#[cfg(target_os = "uefi")]
use uefi::prelude::*;

#[cfg(target_os = "uefi")]
const LOG_LEVEL: LevelFilter = if cfg!(feature = "verbose_logging") {
    LevelFilter::Debug
} else {
    LevelFilter::Info
};

#[cfg(target_os = "uefi")]
#[entry]
fn efi_main() -> Status {
    if ConsoleLogger::init(LOG_LEVEL).is_err() {
        return Status::ABORTED;
    }
    console::clear_screen();
    log::info!(
        "elfload {} ({})",
        env!("CARGO_PKG_VERSION"),
        Architecture::current().name()
    );

    let handoff = match UefiFirmware::resolve().and_then(elfload::boot) {
        Ok(handoff) => handoff,
        Err(err) => {
            log::error!("boot failed: {}", err);
            return err.status();
        }
    };

    // SAFETY: the handoff describes a kernel verified and loaded by the
    // pipeline, and boot services have been exited.
    unsafe { handoff.execute() }
}

#[cfg(not(target_os = "uefi"))]
fn main() {
    eprintln!("elfload is a UEFI application; build it for a *-unknown-uefi target");
}
