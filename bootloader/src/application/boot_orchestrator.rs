//! Boot Application Service - coordinates the loading pipeline
//!
//! Stages run strictly in order, each one a prerequisite of the next:
//! 1. Load the configuration file
//! 2. Parse it into the module list
//! 3. Load and verify the kernel image
//! 4. Load the remaining modules
//! 5. Exit boot services and produce the kernel handoff
//!
//! The first failing stage aborts the boot and its error is returned.

use crate::application::config_loader::load_config;
use crate::domain::boot_config::parse_config;
use crate::domain::context::LoaderContext;
use crate::error::Result;
use crate::firmware::Firmware;
use crate::kernel_if::elf_loader::load_kernel_image;
use crate::kernel_if::kernel_handoff::{self, Handoff};
use crate::kernel_if::module_loader::load_modules;

/// Location of the configuration file on the boot volume
pub const CONFIG_PATH: &str = "\\efi\\boot\\config";

/// Boot Application Service
///
/// Owns the firmware capability and the loader context for the duration of
/// the boot. [`BootOrchestrator::exit_boot_services`] consumes both.
pub struct BootOrchestrator<F: Firmware> {
    firmware: F,
    ctx: LoaderContext,
}

impl<F: Firmware> BootOrchestrator<F> {
    pub fn new(firmware: F) -> Self {
        Self {
            firmware,
            ctx: LoaderContext::new(),
        }
    }

    pub fn context(&self) -> &LoaderContext {
        &self.ctx
    }

    pub fn firmware(&self) -> &F {
        &self.firmware
    }

    /// Read the configuration file at `path`
    pub fn load_config(&mut self, path: &str) -> Result<()> {
        load_config(&mut self.firmware, &mut self.ctx, path)
    }

    /// Parse the loaded configuration into the module registry
    pub fn parse_config(&mut self) -> Result<()> {
        let kernel = parse_config(&self.ctx.config, &mut self.ctx.modules).inspect_err(|e| {
            log::error!("{}", e);
        })?;
        log::debug!("{} modules, kernel is entry {}", self.ctx.modules.len(), kernel);
        self.ctx.kernel_index = Some(kernel);
        Ok(())
    }

    pub fn load_kernel(&mut self) -> Result<()> {
        load_kernel_image(&mut self.firmware, &mut self.ctx)
    }

    pub fn load_modules(&mut self) -> Result<()> {
        load_modules(&mut self.firmware, &mut self.ctx)
    }

    /// Run every stage up to, but not including, the boot-services exit
    pub fn prepare(&mut self, config_path: &str) -> Result<()> {
        self.load_config(config_path)?;
        self.parse_config()?;
        self.load_kernel()?;
        self.load_modules()?;

        for reservation in self.ctx.reservations.iter() {
            log::debug!("reserved {:?}", reservation);
        }
        Ok(())
    }

    /// Leave boot services. On success the firmware is no longer reachable
    /// and only the kernel handoff remains.
    pub fn exit_boot_services(self) -> Result<Handoff> {
        kernel_handoff::exit_boot_services(self.firmware, self.ctx)
    }
}

/// Run the whole pipeline with the configuration at [`CONFIG_PATH`]
pub fn boot<F: Firmware>(firmware: F) -> Result<Handoff> {
    let mut orchestrator = BootOrchestrator::new(firmware);
    orchestrator.prepare(CONFIG_PATH)?;
    orchestrator.exit_boot_services()
}
