//! Simulated firmware shared by the integration tests
//!
//! Files live in a path → bytes map, page and pool allocations are real
//! leaked heap blocks, and every memory map request and boot-services exit is
//! recorded so tests can inspect the protocol afterwards.

#![allow(dead_code)]

use elfload::error::{BootError, IoOp, Result};
use elfload::firmware::{Firmware, FirmwareFile, MemoryMapError, MemoryMapKey, PAGE_SIZE};
use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::cell::RefCell;
use std::collections::HashMap;
use std::ptr::NonNull;
use std::rc::Rc;
use uefi::Status;

/// Observable firmware state
pub struct SimState {
    pub files: HashMap<String, Vec<u8>>,
    /// Largest number of bytes a single read returns; 0 means unlimited
    pub read_chunk: usize,
    /// Size the firmware claims the memory map needs
    pub memory_map_required: usize,
    /// Number of upcoming memory map calls answered with "buffer too small"
    pub too_small_answers: usize,
    pub memory_map_failure: Option<Status>,
    pub exit_failure: Option<Status>,
    pub fail_page_allocation: bool,
    /// Called right after a successful exit
    pub on_exit: Option<fn()>,

    /// Buffer size of every memory map call, in order
    pub memory_map_attempts: Vec<usize>,
    /// Key passed to every exit call
    pub exit_calls: Vec<MemoryMapKey>,
    pub exited: bool,
    pub page_allocations: Vec<(usize, usize)>,
    pub pool_allocations: HashMap<usize, Layout>,
    pub freed: Vec<usize>,
    /// Bumped on every allocation or free; a memory map key is only valid
    /// for the generation it was taken in.
    pub generation: usize,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            files: HashMap::new(),
            read_chunk: 0,
            memory_map_required: 1024,
            too_small_answers: 0,
            memory_map_failure: None,
            exit_failure: None,
            fail_page_allocation: false,
            on_exit: None,
            memory_map_attempts: Vec::new(),
            exit_calls: Vec::new(),
            exited: false,
            page_allocations: Vec::new(),
            pool_allocations: HashMap::new(),
            freed: Vec::new(),
            generation: 0,
        }
    }
}

#[derive(Clone, Default)]
pub struct SimFirmware {
    pub state: Rc<RefCell<SimState>>,
}

impl SimFirmware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, data: impl Into<Vec<u8>>) -> Self {
        self.state.borrow_mut().files.insert(path.to_string(), data.into());
        self
    }

    fn check_boot_services(&self) {
        assert!(!self.state.borrow().exited, "firmware service used after exit");
    }
}

pub struct SimFile {
    data: Vec<u8>,
    position: usize,
    chunk: usize,
}

impl FirmwareFile for SimFile {
    fn size(&mut self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn set_position(&mut self, position: u64) -> Result<()> {
        self.position = position as usize;
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let available = self.data.len().saturating_sub(self.position);
        let mut count = buffer.len().min(available);
        if self.chunk > 0 {
            count = count.min(self.chunk);
        }
        buffer[..count].copy_from_slice(&self.data[self.position..self.position + count]);
        self.position += count;
        Ok(count)
    }
}

impl Firmware for SimFirmware {
    type File = SimFile;

    fn open(&mut self, path: &str) -> Result<SimFile> {
        self.check_boot_services();
        let state = self.state.borrow();
        let data = state
            .files
            .get(path)
            .cloned()
            .ok_or(BootError::Io(IoOp::Open, Status::NOT_FOUND))?;
        Ok(SimFile {
            data,
            position: 0,
            chunk: state.read_chunk,
        })
    }

    fn allocate_pages(&mut self, count: usize) -> Result<NonNull<u8>> {
        self.check_boot_services();
        let mut state = self.state.borrow_mut();
        if state.fail_page_allocation {
            return Err(BootError::Allocation("pages"));
        }

        let page = PAGE_SIZE as usize;
        let layout = Layout::from_size_align(count.max(1) * page, page)
            .map_err(|_| BootError::Allocation("pages"))?;
        // SAFETY: layout has a non-zero size
        let ptr = NonNull::new(unsafe { alloc_zeroed(layout) }).ok_or(BootError::Allocation("pages"))?;

        // Pages handed out are garbage until the loader zeroes them.
        // SAFETY: freshly allocated block of `layout.size()` bytes
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0xa5, layout.size()) };

        state.page_allocations.push((ptr.as_ptr() as usize, count));
        state.generation += 1;
        Ok(ptr)
    }

    fn allocate_pool(&mut self, size: usize) -> Result<NonNull<u8>> {
        self.check_boot_services();
        let mut state = self.state.borrow_mut();
        let layout = Layout::from_size_align(size.max(1), 8).map_err(|_| BootError::Allocation("pool"))?;
        // SAFETY: layout has a non-zero size
        let ptr = NonNull::new(unsafe { alloc_zeroed(layout) }).ok_or(BootError::Allocation("pool"))?;

        state.pool_allocations.insert(ptr.as_ptr() as usize, layout);
        state.generation += 1;
        Ok(ptr)
    }

    unsafe fn free_pool(&mut self, buffer: NonNull<u8>) -> Result<()> {
        self.check_boot_services();
        let mut state = self.state.borrow_mut();
        let address = buffer.as_ptr() as usize;
        let layout = state
            .pool_allocations
            .remove(&address)
            .ok_or(BootError::FatalService("free of unknown pool buffer", Status::INVALID_PARAMETER))?;

        // SAFETY: the block was allocated with this layout in `allocate_pool`
        unsafe { dealloc(buffer.as_ptr(), layout) };
        state.freed.push(address);
        state.generation += 1;
        Ok(())
    }

    fn memory_map(&mut self, buffer: &mut [u8]) -> core::result::Result<MemoryMapKey, MemoryMapError> {
        self.check_boot_services();
        let mut state = self.state.borrow_mut();
        state.memory_map_attempts.push(buffer.len());

        if let Some(status) = state.memory_map_failure {
            return Err(MemoryMapError::Failed(status));
        }
        if state.too_small_answers > 0 || buffer.len() < state.memory_map_required {
            state.too_small_answers = state.too_small_answers.saturating_sub(1);
            return Err(MemoryMapError::BufferTooSmall {
                required: state.memory_map_required,
            });
        }

        buffer[..8].copy_from_slice(&0x4d454d4du64.to_le_bytes());
        Ok(MemoryMapKey(state.generation))
    }

    fn exit_boot_services(self, key: MemoryMapKey) -> core::result::Result<(), (Self, BootError)> {
        self.check_boot_services();
        let failure = {
            let mut state = self.state.borrow_mut();
            state.exit_calls.push(key);

            if let Some(status) = state.exit_failure {
                Some(BootError::FatalService("failed to exit boot services", status))
            } else if key.0 != state.generation {
                Some(BootError::FatalService(
                    "failed to exit boot services",
                    Status::INVALID_PARAMETER,
                ))
            } else {
                state.exited = true;
                if let Some(on_exit) = state.on_exit {
                    on_exit();
                }
                None
            }
        };

        match failure {
            Some(err) => Err((self, err)),
            None => Ok(()),
        }
    }
}

/// One loadable segment of a synthetic ELF image
#[derive(Clone)]
pub struct Segment {
    pub vaddr: u64,
    pub data: Vec<u8>,
    pub mem_size: u64,
    pub align: u64,
}

/// Segment contents that differ from byte to byte and from segment to segment
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed) | 1).collect()
}

/// Build a little-endian ELF64 position-independent executable
pub fn build_elf(entry: u64, segments: &[Segment]) -> Vec<u8> {
    const EHDR: usize = 64;
    const PHDR: usize = 56;

    let table_end = EHDR + PHDR * segments.len();
    let mut offsets = Vec::new();
    let mut offset = table_end.next_multiple_of(16);
    for segment in segments {
        offsets.push(offset);
        offset += segment.data.len();
    }

    let mut image = vec![0u8; offset];
    image[..4].copy_from_slice(b"\x7fELF");
    image[4] = 2; // ELFCLASS64
    image[5] = 1; // little endian
    image[6] = 1;
    image[16..18].copy_from_slice(&3u16.to_le_bytes()); // ET_DYN
    image[18..20].copy_from_slice(&62u16.to_le_bytes());
    image[20..24].copy_from_slice(&1u32.to_le_bytes());
    image[24..32].copy_from_slice(&entry.to_le_bytes());
    image[32..40].copy_from_slice(&(EHDR as u64).to_le_bytes());
    image[52..54].copy_from_slice(&(EHDR as u16).to_le_bytes());
    image[54..56].copy_from_slice(&(PHDR as u16).to_le_bytes());
    image[56..58].copy_from_slice(&(segments.len() as u16).to_le_bytes());

    for (i, (segment, &file_offset)) in segments.iter().zip(&offsets).enumerate() {
        let ph = &mut image[EHDR + i * PHDR..EHDR + (i + 1) * PHDR];
        ph[0..4].copy_from_slice(&1u32.to_le_bytes()); // PT_LOAD
        ph[4..8].copy_from_slice(&5u32.to_le_bytes()); // R-X
        ph[8..16].copy_from_slice(&(file_offset as u64).to_le_bytes());
        ph[16..24].copy_from_slice(&segment.vaddr.to_le_bytes());
        ph[24..32].copy_from_slice(&segment.vaddr.to_le_bytes());
        ph[32..40].copy_from_slice(&(segment.data.len() as u64).to_le_bytes());
        ph[40..48].copy_from_slice(&segment.mem_size.to_le_bytes());
        ph[48..56].copy_from_slice(&segment.align.to_le_bytes());

        image[file_offset..file_offset + segment.data.len()].copy_from_slice(&segment.data);
    }

    image
}

/// Entry address of [`two_segment_kernel`]
pub const KERNEL_ENTRY: u64 = 0x1010;

/// The two segments of the minimal kernel: 0x1000/0x2000 and 0x4000/0x1000
pub fn kernel_segments() -> Vec<Segment> {
    vec![
        Segment {
            vaddr: 0x1000,
            data: pattern(0x800, 1),
            mem_size: 0x2000,
            align: 0x1000,
        },
        Segment {
            vaddr: 0x4000,
            data: pattern(0x100, 2),
            mem_size: 0x1000,
            align: 0x1000,
        },
    ]
}

pub fn two_segment_kernel() -> Vec<u8> {
    build_elf(KERNEL_ENTRY, &kernel_segments())
}

/// View `len` bytes of loaded memory
///
/// # Safety
/// `address` must point into a live simulated allocation of at least `len`
/// bytes.
pub unsafe fn memory(address: u64, len: usize) -> &'static [u8] {
    unsafe { std::slice::from_raw_parts(address as *const u8, len) }
}
