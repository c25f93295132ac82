//! Application Layer - the boot use case

pub mod boot_orchestrator;
pub mod config_loader;

pub use boot_orchestrator::{BootOrchestrator, CONFIG_PATH, boot};
