//! Architecture abstraction layer
//!
//! The kernel entry calling convention and the idle loop used when there is
//! nothing left to do.

use crate::domain::reservation::Reservation;

/// Architecture types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    X86_64,
    AArch64,
    Other,
}

impl Architecture {
    /// Get the current architecture at compile time
    pub const fn current() -> Self {
        if cfg!(target_arch = "x86_64") {
            Architecture::X86_64
        } else if cfg!(target_arch = "aarch64") {
            Architecture::AArch64
        } else {
            Architecture::Other
        }
    }

    /// Get architecture name
    pub fn name(self) -> &'static str {
        match self {
            Architecture::X86_64 => "x86_64",
            Architecture::AArch64 => "AArch64",
            Architecture::Other => "unknown",
        }
    }
}

/// Kernel entry point: the reservation array and its length.
///
/// x86_64 kernels are entered with the System V convention regardless of
/// the loader's own (Microsoft) convention.
#[cfg(target_arch = "x86_64")]
pub type KernelEntry = unsafe extern "sysv64" fn(*const Reservation, usize);

/// Kernel entry point: the reservation array and its length.
#[cfg(not(target_arch = "x86_64"))]
pub type KernelEntry = unsafe extern "C" fn(*const Reservation, usize);

/// Wait for interrupt (low-power idle)
pub fn wait_for_interrupt() {
    #[cfg(target_arch = "x86_64")]
    x86_64::instructions::hlt();

    #[cfg(target_arch = "aarch64")]
    aarch64_cpu::asm::wfe();

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    core::hint::spin_loop();
}

/// Park the CPU for good
pub fn halt_forever() -> ! {
    loop {
        wait_for_interrupt();
    }
}
