//! ELF64 format support
//!
//! Only the subset of the format the loader consumes: the file header, the
//! program header table, and the constants needed to check and describe them.
//! Headers are decoded field by field from little-endian bytes, so the input
//! buffers need no particular alignment.

use crate::error::{BootError, ElfCheck, Result};
use bitflags::bitflags;
use core::fmt;

/// Size of the ELF64 file header in bytes
pub const ELF_HEADER_SIZE: usize = 64;

/// Size of one ELF64 program header in bytes
pub const PROGRAM_HEADER_SIZE: usize = 56;

/// ELF64 header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct ElfHeader {
    /// Magic number (0x7F 'E' 'L' 'F')
    pub magic: [u8; 4],
    /// File class (1=32-bit, 2=64-bit)
    pub class: u8,
    /// Data encoding (1=little endian, 2=big endian)
    pub data: u8,
    /// ELF version
    pub version: u8,
    /// OS/ABI identification
    pub os_abi: u8,
    /// ABI version
    pub abi_version: u8,
    /// Padding
    pub padding: [u8; 7],
    /// File type
    pub file_type: u16,
    /// Machine architecture
    pub machine: u16,
    /// ELF version
    pub elf_version: u32,
    /// Entry point virtual address
    pub entry_point: u64,
    /// Program header table file offset
    pub program_header_offset: u64,
    /// Section header table file offset
    pub section_header_offset: u64,
    /// Processor-specific flags
    pub flags: u32,
    /// ELF header size
    pub header_size: u16,
    /// Program header entry size
    pub program_header_size: u16,
    /// Program header entry count
    pub program_header_count: u16,
    /// Section header entry size
    pub section_header_size: u16,
    /// Section header entry count
    pub section_header_count: u16,
    /// Section header string table index
    pub section_header_string_index: u16,
}

/// ELF64 program header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct ProgramHeader {
    /// Segment type
    pub segment_type: u32,
    /// Segment flags
    pub flags: u32,
    /// File offset
    pub file_offset: u64,
    /// Virtual address
    pub virtual_address: u64,
    /// Physical address
    pub physical_address: u64,
    /// Segment size in file
    pub file_size: u64,
    /// Segment size in memory
    pub mem_size: u64,
    /// Segment alignment
    pub alignment: u64,
}

/// ELF constants
pub mod constants {
    /// ELF magic number
    pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

    /// ELF classes
    pub const ELFCLASS32: u8 = 1;
    pub const ELFCLASS64: u8 = 2;

    /// ELF file types
    pub const ET_NONE: u16 = 0; // No file type
    pub const ET_REL: u16 = 1; // Relocatable file
    pub const ET_EXEC: u16 = 2; // Executable file
    pub const ET_DYN: u16 = 3; // Shared object file
    pub const ET_CORE: u16 = 4; // Core file

    /// Program header types
    pub const PT_NULL: u32 = 0; // Unused entry
    pub const PT_LOAD: u32 = 1; // Loadable segment
    pub const PT_DYNAMIC: u32 = 2; // Dynamic linking information
    pub const PT_INTERP: u32 = 3; // Program interpreter
    pub const PT_NOTE: u32 = 4; // Auxiliary information
    pub const PT_SHLIB: u32 = 5; // Reserved
    pub const PT_PHDR: u32 = 6; // Program header table
    pub const PT_TLS: u32 = 7; // Thread-local storage
}

use constants::*;

bitflags! {
    /// Program header permission flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SegmentFlags: u32 {
        const EXECUTE = 0x1;
        const WRITE = 0x2;
        const READ = 0x4;
    }
}

impl fmt::Display for SegmentFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bit = |flag, c| if self.contains(flag) { c } else { '-' };
        write!(
            f,
            "{}{}{}",
            bit(SegmentFlags::READ, 'R'),
            bit(SegmentFlags::WRITE, 'W'),
            bit(SegmentFlags::EXECUTE, 'X')
        )
    }
}

/// Symbolic name of a program header type, if it has one
pub fn segment_type_name(segment_type: u32) -> Option<&'static str> {
    Some(match segment_type {
        PT_NULL => "PT_NULL",
        PT_LOAD => "PT_LOAD",
        PT_DYNAMIC => "PT_DYNAMIC",
        PT_INTERP => "PT_INTERP",
        PT_NOTE => "PT_NOTE",
        PT_SHLIB => "PT_SHLIB",
        PT_PHDR => "PT_PHDR",
        PT_TLS => "PT_TLS",
        _ => return None,
    })
}

fn u16_at(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

fn u64_at(bytes: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(raw)
}

impl ElfHeader {
    /// Decode the header from the first bytes of the file
    pub fn from_bytes(bytes: &[u8; ELF_HEADER_SIZE]) -> Self {
        let mut padding = [0u8; 7];
        padding.copy_from_slice(&bytes[9..16]);

        Self {
            magic: [bytes[0], bytes[1], bytes[2], bytes[3]],
            class: bytes[4],
            data: bytes[5],
            version: bytes[6],
            os_abi: bytes[7],
            abi_version: bytes[8],
            padding,
            file_type: u16_at(bytes, 16),
            machine: u16_at(bytes, 18),
            elf_version: u32_at(bytes, 20),
            entry_point: u64_at(bytes, 24),
            program_header_offset: u64_at(bytes, 32),
            section_header_offset: u64_at(bytes, 40),
            flags: u32_at(bytes, 48),
            header_size: u16_at(bytes, 52),
            program_header_size: u16_at(bytes, 54),
            program_header_count: u16_at(bytes, 56),
            section_header_size: u16_at(bytes, 58),
            section_header_count: u16_at(bytes, 60),
            section_header_string_index: u16_at(bytes, 62),
        }
    }

    /// Check that the loader can handle this image. Checks run in a fixed
    /// order and the first failing one is reported.
    pub fn verify(&self) -> Result<()> {
        let check = if self.magic != ELF_MAGIC {
            Some(ElfCheck::BadMagic)
        } else if self.class != ELFCLASS64 {
            Some(ElfCheck::NotElf64(self.class))
        } else if self.file_type != ET_EXEC && self.file_type != ET_DYN {
            Some(ElfCheck::UnsupportedType(self.file_type))
        } else if self.program_header_count == 0 {
            Some(ElfCheck::NoProgramHeaders)
        } else if self.program_header_size as usize != PROGRAM_HEADER_SIZE {
            Some(ElfCheck::ProgramHeaderSize(self.program_header_size))
        } else {
            None
        };

        match check {
            Some(check) => Err(BootError::UnsupportedFormat(check)),
            None => Ok(()),
        }
    }

    /// Size in bytes of the program header table
    pub fn program_table_size(&self) -> usize {
        self.program_header_count as usize * self.program_header_size as usize
    }
}

impl ProgramHeader {
    /// Decode one program header table entry
    pub fn from_bytes(bytes: &[u8; PROGRAM_HEADER_SIZE]) -> Self {
        Self {
            segment_type: u32_at(bytes, 0),
            flags: u32_at(bytes, 4),
            file_offset: u64_at(bytes, 8),
            virtual_address: u64_at(bytes, 16),
            physical_address: u64_at(bytes, 24),
            file_size: u64_at(bytes, 32),
            mem_size: u64_at(bytes, 40),
            alignment: u64_at(bytes, 48),
        }
    }

    pub fn is_load(&self) -> bool {
        self.segment_type == PT_LOAD
    }

    pub fn segment_flags(&self) -> SegmentFlags {
        SegmentFlags::from_bits_truncate(self.flags)
    }
}

impl fmt::Display for ProgramHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match segment_type_name(self.segment_type) {
            Some(name) => write!(f, "{:<10}", name)?,
            None => write!(f, "{:#010x}", self.segment_type)?,
        }
        write!(
            f,
            " {} offset {:#x} vaddr {:#x} paddr {:#x} filesz {:#x} memsz {:#x} align {:#x}",
            self.segment_flags(),
            self.file_offset,
            self.virtual_address,
            self.physical_address,
            self.file_size,
            self.mem_size,
            self.alignment
        )
    }
}
