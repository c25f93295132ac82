//! Domain Layer - the records the loading pipeline builds up
//!
//! - [`boot_config`]: the module list parsed from the configuration file
//! - [`reservation`]: the memory ranges handed to the kernel
//! - [`context`]: the aggregate every pipeline stage fills in

pub mod boot_config;
pub mod context;
pub mod reservation;

pub use boot_config::{KERNEL_MODULE, ModuleEntry, parse_config};
pub use context::LoaderContext;
pub use reservation::Reservation;
