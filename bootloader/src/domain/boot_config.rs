//! Boot Configuration - module list parser
//!
//! The configuration is a sequence of `name:path` pairs separated by
//! whitespace, e.g.
//!
//! ```text
//! kernel:\EFI\BOOT\KERNEL.ELF
//! data:\EFI\BOOT\DATA.BIN
//! ```
//!
//! There is no quoting, escaping or comment syntax. Exactly one entry is
//! expected to be named `kernel`; if several are, the first one wins.

use crate::error::{BootError, Result};
use crate::utils::registry::Registry;
use alloc::string::String;

/// Name of the module that holds the ELF kernel
pub const KERNEL_MODULE: &str = "kernel";

/// A file the loader has to bring into memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEntry {
    pub name: String,
    pub path: String,
}

impl ModuleEntry {
    pub fn is_kernel(&self) -> bool {
        self.name == KERNEL_MODULE
    }
}

/// Same set as C `isspace`, which includes vertical tab
fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r')
}

fn is_name_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-' | b'.')
}

fn is_path_char(byte: u8) -> bool {
    is_name_char(byte) || matches!(byte, b'\\' | b'/')
}

/// Byte cursor over the configuration text.
///
/// The end of the slice and a NUL byte both read as the sentinel.
struct Scanner<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn peek(&self) -> u8 {
        self.data.get(self.pos).copied().unwrap_or(0)
    }

    fn at_sentinel(&self) -> bool {
        self.peek() == 0
    }

    fn skip_while(&mut self, accept: impl Fn(u8) -> bool) -> &'a [u8] {
        let begin = self.pos;
        while self.peek() != 0 && accept(self.peek()) {
            self.pos += 1;
        }
        &self.data[begin..self.pos]
    }

    fn skip_ws(&mut self) {
        self.skip_while(is_space);
    }
}

fn to_string(run: &[u8]) -> String {
    // Runs only ever contain ASCII
    run.iter().map(|&b| b as char).collect()
}

/// Parse `data` into `modules` and return the index of the kernel entry.
///
/// Entries are appended in file order. A failure leaves the entries parsed
/// so far in the registry; the caller aborts the boot anyway.
pub fn parse_config(data: &[u8], modules: &mut Registry<ModuleEntry>) -> Result<usize> {
    let mut scanner = Scanner::new(data);

    loop {
        scanner.skip_ws();
        if scanner.at_sentinel() {
            break;
        }

        let name = scanner.skip_while(is_name_char);
        scanner.skip_ws();

        if scanner.peek() != b':' {
            return Err(BootError::Syntax("missing separator"));
        }
        scanner.pos += 1;

        scanner.skip_ws();
        let path = scanner.skip_while(is_path_char);

        // The scans never fail on their own; garbage or a truncated entry
        // shows up as an empty run.
        if name.is_empty() || path.is_empty() {
            return Err(BootError::Syntax("empty name or path"));
        }

        let index = modules.append(ModuleEntry {
            name: to_string(name),
            path: to_string(path),
        })?;
        log::debug!("config entry {}: {} -> {}", index, modules[index].name, modules[index].path);
    }

    modules
        .iter()
        .position(ModuleEntry::is_kernel)
        .ok_or(BootError::MissingKernel)
}
