//! elfload - UEFI ELF64 boot loader
//!
//! Loads the ELF64 kernel and auxiliary modules named in a small text
//! configuration file, exits boot services and jumps to the kernel with a
//! list of the memory ranges the loader consumed.
//!
//! The pipeline is written against the [`firmware::Firmware`] capability, so
//! everything except the UEFI backend itself runs on the host under test.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

/// Domain layer - module list, reservations, loader context
pub mod domain;

/// Application layer - pipeline orchestration
pub mod application;

/// Firmware interface - capability traits and the UEFI backend
pub mod firmware;

/// Device drivers - console logger
pub mod drivers;

/// Kernel interface - ELF loading, module loading, handoff
pub mod kernel_if;

/// Architecture support - entry calling convention, idle loop
pub mod arch;

/// Utility library - growable registry
pub mod utils;

/// Error types
pub mod error;

pub use application::{BootOrchestrator, CONFIG_PATH, boot};
pub use error::{BootError, Result};
pub use firmware::{Firmware, FirmwareFile};
pub use kernel_if::Handoff;
