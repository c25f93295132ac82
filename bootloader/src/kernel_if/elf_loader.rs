//! ELF kernel loader
//!
//! Loads the kernel as a position-independent image: all segment addresses
//! are taken as offsets from the lowest aligned segment start, and the whole
//! span is placed in one freshly allocated page range. No relocations are
//! applied.

use crate::domain::context::LoaderContext;
use crate::domain::boot_config::KERNEL_MODULE;
use crate::domain::reservation::Reservation;
use crate::error::{BootError, ElfCheck, Result};
use crate::firmware::{Firmware, FirmwareFile, PAGE_SIZE, read_exact_at};
use crate::kernel_if::elf64::{ELF_HEADER_SIZE, ElfHeader, PROGRAM_HEADER_SIZE, ProgramHeader};
use alloc::vec::Vec;
use core::ptr::{self, NonNull};
use core::slice;

/// Aligned span covering every loadable segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfLayout {
    pub image_begin: u64,
    pub image_end: u64,
    /// Entry point relative to `image_begin`
    pub entry_offset: u64,
}

impl ElfLayout {
    pub fn size(&self) -> u64 {
        self.image_end - self.image_begin
    }

    /// Number of pages needed to hold the image
    pub fn pages(&self) -> usize {
        self.size().div_ceil(PAGE_SIZE) as usize
    }
}

/// A kernel image resident in memory
#[derive(Debug, Clone)]
pub struct KernelImage {
    pub header: ElfHeader,
    pub program_headers: Vec<ProgramHeader>,
    pub layout: ElfLayout,
    /// Address of the page allocation holding the image
    pub base: u64,
    pub pages: usize,
    /// Absolute entry address
    pub entry: u64,
}

fn format_error(check: ElfCheck) -> BootError {
    BootError::UnsupportedFormat(check)
}

/// Compute the aligned span of all `PT_LOAD` segments and the entry offset.
///
/// Every segment is aligned to at least a page. The entry point has to fall
/// inside the span, otherwise jumping to it would leave the image.
pub fn compute_layout(program_headers: &[ProgramHeader], entry: u64) -> Result<ElfLayout> {
    let mut span: Option<(u64, u64)> = None;

    for ph in program_headers.iter().filter(|ph| ph.is_load()) {
        if ph.file_size > ph.mem_size {
            return Err(format_error(ElfCheck::FileSizeExceedsMemSize));
        }

        let align = PAGE_SIZE.max(ph.alignment);
        let end = ph
            .virtual_address
            .checked_add(ph.mem_size)
            .ok_or(format_error(ElfCheck::SegmentOverflow))?;

        let begin = ph.virtual_address - ph.virtual_address % align;
        let end = end
            .div_ceil(align)
            .checked_mul(align)
            .ok_or(format_error(ElfCheck::SegmentOverflow))?;

        span = Some(match span {
            Some((lo, hi)) => (lo.min(begin), hi.max(end)),
            None => (begin, end),
        });
    }

    let (image_begin, image_end) = span.ok_or(format_error(ElfCheck::NoLoadableSegments))?;
    if entry < image_begin || entry >= image_end {
        return Err(format_error(ElfCheck::EntryOutsideImage));
    }

    Ok(ElfLayout {
        image_begin,
        image_end,
        entry_offset: entry - image_begin,
    })
}

fn read_header<T: FirmwareFile>(file: &mut T) -> Result<ElfHeader> {
    let mut bytes = [0u8; ELF_HEADER_SIZE];
    read_exact_at(file, 0, &mut bytes)?;

    let header = ElfHeader::from_bytes(&bytes);
    if let Err(e) = header.verify() {
        log::error!("{}", e);
        return Err(e);
    }
    Ok(header)
}

fn read_program_headers<T: FirmwareFile>(file: &mut T, header: &ElfHeader) -> Result<Vec<ProgramHeader>> {
    let size = header.program_table_size();

    let mut table = Vec::new();
    table
        .try_reserve_exact(size)
        .map_err(|_| BootError::Allocation("program header table"))?;
    table.resize(size, 0u8);
    read_exact_at(file, header.program_header_offset, &mut table)?;

    let mut program_headers = Vec::new();
    program_headers
        .try_reserve_exact(header.program_header_count as usize)
        .map_err(|_| BootError::Allocation("program header table"))?;
    program_headers.extend(
        table
            .chunks_exact(PROGRAM_HEADER_SIZE)
            .filter_map(|entry| <&[u8; PROGRAM_HEADER_SIZE]>::try_from(entry).ok())
            .map(ProgramHeader::from_bytes),
    );

    Ok(program_headers)
}

/// Copy the file-backed part of every loadable segment into the image.
///
/// `image` must already be zeroed; the tail of each segment past its file
/// size stays zero.
fn load_segments<T: FirmwareFile>(
    file: &mut T,
    program_headers: &[ProgramHeader],
    layout: &ElfLayout,
    image: &mut [u8],
) -> Result<()> {
    for ph in program_headers.iter().filter(|ph| ph.is_load()) {
        let offset = (ph.virtual_address - layout.image_begin) as usize;
        let size = ph.file_size as usize;
        read_exact_at(file, ph.file_offset, &mut image[offset..offset + size])?;
    }
    Ok(())
}

/// Load the kernel module named in the configuration.
///
/// On success the image is recorded in the context and its span is
/// registered as the `kernel` reservation.
pub fn load_kernel_image<F: Firmware>(firmware: &mut F, ctx: &mut LoaderContext) -> Result<()> {
    let module = ctx.kernel_module().ok_or(BootError::MissingKernel)?;
    log::info!("Loading ELF image...");
    log::debug!("kernel path: {}", module.path);

    let mut file = firmware.open(&module.path)?;
    let header = read_header(&mut file)?;
    let program_headers = read_program_headers(&mut file, &header)?;

    for (index, ph) in program_headers.iter().enumerate() {
        log::debug!("program header {}: {}", index, ph);
    }

    let layout = compute_layout(&program_headers, header.entry_point).inspect_err(|e| {
        log::error!("{}", e);
    })?;
    let pages = layout.pages();
    log::debug!(
        "image span [{:#x}, {:#x}), {} pages",
        layout.image_begin,
        layout.image_end,
        pages
    );

    let base: NonNull<u8> = firmware.allocate_pages(pages)?;
    let length = pages * PAGE_SIZE as usize;

    // SAFETY: the firmware handed out `pages` whole pages at `base`, owned
    // exclusively by the loader from now on.
    let image = unsafe {
        ptr::write_bytes(base.as_ptr(), 0, length);
        slice::from_raw_parts_mut(base.as_ptr(), length)
    };
    load_segments(&mut file, &program_headers, &layout, image)?;
    drop(file);

    let base = base.as_ptr() as u64;
    let entry = base + layout.entry_offset;
    ctx.reservations
        .append(Reservation::new(KERNEL_MODULE, base, base + layout.size())?)?;

    log::info!("Loaded ELF image at {:#x}, entry {:#x}", base, entry);
    ctx.kernel = Some(KernelImage {
        header,
        program_headers,
        layout,
        base,
        pages,
        entry,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel_if::elf64::constants::{PT_LOAD, PT_NOTE};

    fn load(virtual_address: u64, mem_size: u64, alignment: u64) -> ProgramHeader {
        ProgramHeader {
            segment_type: PT_LOAD,
            flags: 0x4,
            file_offset: 0,
            virtual_address,
            physical_address: virtual_address,
            file_size: mem_size,
            mem_size,
            alignment,
        }
    }

    fn check(result: Result<ElfLayout>) -> ElfCheck {
        match result {
            Err(BootError::UnsupportedFormat(check)) => check,
            other => panic!("expected a format error, got {:?}", other),
        }
    }

    #[test]
    fn test_two_segment_layout() {
        let headers = [load(0x1000, 0x2000, 0x1000), load(0x4000, 0x1000, 0x1000)];
        let layout = compute_layout(&headers, 0x1800).unwrap();

        assert_eq!(layout.image_begin, 0x1000);
        assert_eq!(layout.image_end, 0x5000);
        assert_eq!(layout.entry_offset, 0x800);
        assert_eq!(layout.pages(), 4);
    }

    #[test]
    fn test_unaligned_segments_rounded_to_pages() {
        let headers = [load(0x1234, 0x10, 0), load(0x3ff0, 0x20, 8)];
        let layout = compute_layout(&headers, 0x1234).unwrap();

        assert_eq!(layout.image_begin, 0x1000);
        assert_eq!(layout.image_end, 0x5000);
    }

    #[test]
    fn test_large_alignment_widens_span() {
        let headers = [load(0x20_1000, 0x1000, 0x20_0000)];
        let layout = compute_layout(&headers, 0x20_1000).unwrap();

        assert_eq!(layout.image_begin, 0x20_0000);
        assert_eq!(layout.image_end, 0x40_0000);
        assert_eq!(layout.entry_offset, 0x1000);
    }

    #[test]
    fn test_non_load_segments_ignored() {
        let mut note = load(0x9000_0000, 0x1000, 0x1000);
        note.segment_type = PT_NOTE;
        let headers = [note, load(0, 0x1000, 0x1000)];
        let layout = compute_layout(&headers, 0).unwrap();

        assert_eq!((layout.image_begin, layout.image_end), (0, 0x1000));
    }

    #[test]
    fn test_layout_rejections() {
        let mut note = load(0, 0x1000, 0x1000);
        note.segment_type = PT_NOTE;
        assert_eq!(check(compute_layout(&[note], 0)), ElfCheck::NoLoadableSegments);

        let mut bss = load(0, 0x1000, 0x1000);
        bss.file_size = 0x1001;
        assert_eq!(check(compute_layout(&[bss], 0)), ElfCheck::FileSizeExceedsMemSize);

        let huge = load(u64::MAX - 0x10, 0x100, 0x1000);
        assert_eq!(check(compute_layout(&[huge], 0)), ElfCheck::SegmentOverflow);

        let headers = [load(0x1000, 0x1000, 0x1000)];
        assert_eq!(check(compute_layout(&headers, 0x2000)), ElfCheck::EntryOutsideImage);
        assert_eq!(check(compute_layout(&headers, 0xfff)), ElfCheck::EntryOutsideImage);
    }
}
