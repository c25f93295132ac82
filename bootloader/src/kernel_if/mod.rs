//! Kernel Interface - ELF loading, module loading, handoff

pub mod elf64;
pub mod elf_loader;
pub mod kernel_handoff;
pub mod module_loader;

pub use elf_loader::{ElfLayout, KernelImage, compute_layout, load_kernel_image};
pub use kernel_handoff::{Handoff, MemoryMapSnapshot, exit_boot_services, fetch_memory_map};
pub use module_loader::load_modules;
