//! UEFI boot services backend
//!
//! [`UefiFirmware`] is the real [`Firmware`]: it resolves the volume the
//! loader image was started from, opens files relative to its root, and
//! allocates loader data memory. Memory map retrieval and the boot-services
//! exit go straight to the boot services table so the loader controls the
//! retry protocol and the map key. The table is reached through the raw
//! pointer, so its field types follow the `uefi-raw` release `uefi` uses.

use crate::drivers::console::ConsoleLogger;
use crate::error::{BootError, IoOp, Result};
use crate::firmware::{Firmware, FirmwareFile, MemoryMapError, MemoryMapKey};
use core::mem::ManuallyDrop;
use core::ptr::NonNull;
use uefi::boot::{self, AllocateType, MemoryType, ScopedProtocol};
use uefi::proto::media::file::{Directory, File, FileAttribute, FileInfo, FileMode, RegularFile};
use uefi::proto::media::fs::SimpleFileSystem;
use uefi::{CString16, Status};

/// A regular file opened on the boot volume
pub struct UefiFile {
    file: RegularFile,
}

impl FirmwareFile for UefiFile {
    fn size(&mut self) -> Result<u64> {
        let info = self
            .file
            .get_boxed_info::<FileInfo>()
            .map_err(|e| BootError::Io(IoOp::Stat, e.status()))?;
        Ok(info.file_size())
    }

    fn set_position(&mut self, position: u64) -> Result<()> {
        self.file
            .set_position(position)
            .map_err(|e| BootError::Io(IoOp::Seek, e.status()))
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        self.file
            .read(buffer)
            .map_err(|e| BootError::Io(IoOp::Read, e.status()))
    }
}

/// Boot services of the firmware that started this image
pub struct UefiFirmware {
    root: Directory,
    _volume: ScopedProtocol<SimpleFileSystem>,
}

impl UefiFirmware {
    /// Locate the boot volume and open its root directory
    pub fn resolve() -> Result<Self> {
        let image = boot::image_handle();

        let mut volume = boot::get_image_file_system(image).map_err(|e| {
            log::error!("failed to open the boot volume: {:?}", e.status());
            BootError::Io(IoOp::Open, e.status())
        })?;

        let root = volume.open_volume().map_err(|e| {
            log::error!("failed to open the boot volume root: {:?}", e.status());
            BootError::Io(IoOp::Open, e.status())
        })?;

        Ok(Self {
            root,
            _volume: volume,
        })
    }
}

impl Firmware for UefiFirmware {
    type File = UefiFile;

    fn open(&mut self, path: &str) -> Result<UefiFile> {
        let name = CString16::try_from(path).map_err(|_| {
            log::error!("path {} is not representable in UCS-2", path);
            BootError::Io(IoOp::Open, Status::INVALID_PARAMETER)
        })?;

        let handle = self
            .root
            .open(&name, FileMode::Read, FileAttribute::READ_ONLY)
            .map_err(|e| {
                log::error!("failed to open {}: {:?}", path, e.status());
                BootError::Io(IoOp::Open, e.status())
            })?;

        let file = handle.into_regular_file().ok_or_else(|| {
            log::error!("{} is not a regular file", path);
            BootError::Io(IoOp::Open, Status::UNSUPPORTED)
        })?;

        Ok(UefiFile { file })
    }

    fn allocate_pages(&mut self, count: usize) -> Result<NonNull<u8>> {
        boot::allocate_pages(AllocateType::AnyPages, MemoryType::LOADER_DATA, count).map_err(|e| {
            log::error!("failed to allocate {} pages: {:?}", count, e.status());
            BootError::Allocation("pages")
        })
    }

    fn allocate_pool(&mut self, size: usize) -> Result<NonNull<u8>> {
        boot::allocate_pool(MemoryType::LOADER_DATA, size).map_err(|e| {
            log::error!("failed to allocate {} bytes: {:?}", size, e.status());
            BootError::Allocation("pool buffer")
        })
    }

    unsafe fn free_pool(&mut self, buffer: NonNull<u8>) -> Result<()> {
        // SAFETY: forwarded from the caller
        unsafe { boot::free_pool(buffer) }
            .map_err(|e| BootError::FatalService("failed to free pool buffer", e.status()))
    }

    fn memory_map(&mut self, buffer: &mut [u8]) -> core::result::Result<MemoryMapKey, MemoryMapError> {
        let Some(system_table) = uefi::table::system_table_raw() else {
            return Err(MemoryMapError::Failed(Status::NOT_READY));
        };
        // SAFETY: the system table stays valid while boot services are active
        let boot_services = unsafe { system_table.as_ref().boot_services };
        if boot_services.is_null() {
            return Err(MemoryMapError::Failed(Status::NOT_READY));
        }

        let mut size = buffer.len();
        let mut key = 0usize;
        let mut desc_size = 0usize;
        let mut desc_version = 0u32;

        // SAFETY: all out-pointers are valid locals and `buffer` is writable
        // for `size` bytes. Pool buffers are 8-byte aligned.
        let status = unsafe {
            ((*boot_services).get_memory_map)(
                &mut size,
                buffer.as_mut_ptr().cast(),
                &mut key,
                &mut desc_size,
                &mut desc_version,
            )
        };

        match Status(status.0) {
            Status::SUCCESS => Ok(MemoryMapKey(key)),
            Status::BUFFER_TOO_SMALL => Err(MemoryMapError::BufferTooSmall { required: size }),
            other => Err(MemoryMapError::Failed(other)),
        }
    }

    fn exit_boot_services(self, key: MemoryMapKey) -> core::result::Result<(), (Self, BootError)> {
        let Some(system_table) = uefi::table::system_table_raw() else {
            return Err((self, BootError::FatalService("system table unavailable", Status::NOT_READY)));
        };
        // SAFETY: the system table stays valid while boot services are active
        let boot_services = unsafe { system_table.as_ref().boot_services };
        if boot_services.is_null() {
            return Err((self, BootError::FatalService("boot services unavailable", Status::NOT_READY)));
        }
        let image = boot::image_handle();

        // Closing the root directory or the volume protocol is itself a boot
        // service call, which would also change the memory map.
        let this = ManuallyDrop::new(self);

        ConsoleLogger::mute();

        // SAFETY: nothing allocates between the memory map snapshot and this
        // call, and on success no boot service is used again.
        let status = unsafe { ((*boot_services).exit_boot_services)(image.as_ptr().cast(), key.0) };

        match Status(status.0) {
            Status::SUCCESS => Ok(()),
            other => {
                ConsoleLogger::resume();
                Err((
                    ManuallyDrop::into_inner(this),
                    BootError::FatalService("failed to exit boot services", other),
                ))
            }
        }
    }
}
