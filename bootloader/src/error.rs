//! Bootloader error handling
//!
//! Every stage of the loading pipeline reports failures through [`BootError`].
//! The driver logs the error and, while boot services are still available,
//! hands the matching [`Status`] back to the firmware.

use core::fmt;
use uefi::Status;

/// The file operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Open,
    Stat,
    Seek,
    Read,
}

impl IoOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            IoOp::Open => "open",
            IoOp::Stat => "stat",
            IoOp::Seek => "seek",
            IoOp::Read => "read",
        }
    }
}

/// ELF image checks, in the order they are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfCheck {
    /// The identification bytes do not start with `\x7fELF`
    BadMagic,
    /// Object class other than ELFCLASS64
    NotElf64(u8),
    /// File type other than ET_EXEC or ET_DYN
    UnsupportedType(u16),
    /// The header declares an empty program header table
    NoProgramHeaders,
    /// Program header entry size differs from the ELF64 record size
    ProgramHeaderSize(u16),
    /// No PT_LOAD segment to materialize
    NoLoadableSegments,
    /// A segment end or its alignment does not fit in 64 bits
    SegmentOverflow,
    /// A segment declares more file bytes than memory bytes
    FileSizeExceedsMemSize,
    /// The entry address lies outside the loaded span
    EntryOutsideImage,
}

impl fmt::Display for ElfCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElfCheck::BadMagic => write!(f, "no ELF magic sequence in the ELF header"),
            ElfCheck::NotElf64(class) => {
                write!(f, "unsupported ELF class {:#x}, only ELFCLASS64 is supported", class)
            }
            ElfCheck::UnsupportedType(ty) => write!(
                f,
                "unsupported ELF file type {:#x}, only ET_EXEC and ET_DYN are supported",
                ty
            ),
            ElfCheck::NoProgramHeaders => write!(f, "ELF file doesn't contain any program headers"),
            ElfCheck::ProgramHeaderSize(size) => write!(
                f,
                "unexpected ELF program header size {}, only size 56 is supported",
                size
            ),
            ElfCheck::NoLoadableSegments => write!(f, "ELF file has no loadable segments"),
            ElfCheck::SegmentOverflow => write!(f, "loadable segment overflows the address space"),
            ElfCheck::FileSizeExceedsMemSize => {
                write!(f, "loadable segment has more file bytes than memory bytes")
            }
            ElfCheck::EntryOutsideImage => write!(f, "entry point is outside the loaded image"),
        }
    }
}

/// Bootloader error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    /// Firmware file operation failed
    Io(IoOp, Status),

    /// Pool or page allocation failed; carries what was being allocated
    Allocation(&'static str),

    /// Malformed configuration file
    Syntax(&'static str),

    /// The configuration has no module named `kernel`
    MissingKernel,

    /// The kernel image failed ELF validation
    UnsupportedFormat(ElfCheck),

    /// Memory map retrieval or boot-services exit failed
    FatalService(&'static str, Status),
}

impl BootError {
    /// Status handed back to the firmware when the loader gives up
    pub fn status(&self) -> Status {
        match self {
            BootError::Io(_, status) => *status,
            BootError::Allocation(_) => Status::OUT_OF_RESOURCES,
            BootError::Syntax(_) | BootError::MissingKernel => Status::INVALID_PARAMETER,
            BootError::UnsupportedFormat(_) => Status::UNSUPPORTED,
            BootError::FatalService(_, status) => *status,
        }
    }

    /// Get a human-readable description of the error
    pub fn description(&self) -> &'static str {
        match self {
            BootError::Io(..) => "file I/O failed",
            BootError::Allocation(_) => "memory allocation failed",
            BootError::Syntax(msg) => msg,
            BootError::MissingKernel => "no kernel module in the configuration",
            BootError::UnsupportedFormat(_) => "unsupported kernel image",
            BootError::FatalService(msg, _) => msg,
        }
    }
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootError::Io(op, status) => write!(f, "{} failed: {:?}", op.as_str(), status),
            BootError::Allocation(what) => write!(f, "failed to allocate {}", what),
            BootError::Syntax(msg) => write!(f, "invalid config format: {}", msg),
            BootError::MissingKernel => write!(f, "invalid config format: no kernel module"),
            BootError::UnsupportedFormat(check) => write!(f, "{}", check),
            BootError::FatalService(msg, status) => write!(f, "{}: {:?}", msg, status),
        }
    }
}

/// Result type used throughout the bootloader
pub type Result<T = ()> = core::result::Result<T, BootError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            BootError::Io(IoOp::Read, Status::DEVICE_ERROR).status(),
            Status::DEVICE_ERROR
        );
        assert_eq!(BootError::Allocation("x").status(), Status::OUT_OF_RESOURCES);
        assert_eq!(BootError::MissingKernel.status(), Status::INVALID_PARAMETER);
        assert_eq!(
            BootError::UnsupportedFormat(ElfCheck::BadMagic).status(),
            Status::UNSUPPORTED
        );
    }

    #[test]
    fn test_display_names_failing_check() {
        let msg = format!("{}", BootError::UnsupportedFormat(ElfCheck::ProgramHeaderSize(64)));
        assert!(msg.contains("64"));
        let msg = format!("{}", BootError::Syntax("missing separator"));
        assert!(msg.ends_with("missing separator"));
    }
}
