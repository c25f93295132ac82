//! Loader context
//!
//! [`LoaderContext`] is the aggregate the pipeline fills in stage by stage.
//! It is owned by the boot orchestrator and passed by exclusive reference to
//! every stage; there is no global loader state. Firmware handles are not
//! part of it: they live in the [`Firmware`](crate::firmware::Firmware)
//! capability, which the handoff consumes separately.

use crate::domain::boot_config::ModuleEntry;
use crate::domain::reservation::Reservation;
use crate::kernel_if::elf_loader::KernelImage;
use crate::utils::registry::Registry;
use alloc::vec::Vec;

pub struct LoaderContext {
    /// Raw configuration text including the trailing NUL sentinel
    pub(crate) config: Vec<u8>,
    pub(crate) modules: Registry<ModuleEntry>,
    pub(crate) kernel_index: Option<usize>,
    pub(crate) reservations: Registry<Reservation>,
    pub(crate) kernel: Option<KernelImage>,
}

impl LoaderContext {
    pub const fn new() -> Self {
        Self {
            config: Vec::new(),
            modules: Registry::new("module registry"),
            kernel_index: None,
            reservations: Registry::new("reservation registry"),
            kernel: None,
        }
    }

    pub fn config(&self) -> &[u8] {
        &self.config
    }

    pub fn modules(&self) -> &Registry<ModuleEntry> {
        &self.modules
    }

    /// Index of the first module named `kernel`, once the config is parsed
    pub fn kernel_index(&self) -> Option<usize> {
        self.kernel_index
    }

    /// The module entry of the kernel, once the config is parsed
    pub fn kernel_module(&self) -> Option<&ModuleEntry> {
        self.kernel_index.and_then(|index| self.modules.get(index))
    }

    pub fn reservations(&self) -> &Registry<Reservation> {
        &self.reservations
    }

    /// ELF bookkeeping of the loaded kernel
    pub fn kernel(&self) -> Option<&KernelImage> {
        self.kernel.as_ref()
    }
}

impl Default for LoaderContext {
    fn default() -> Self {
        Self::new()
    }
}
