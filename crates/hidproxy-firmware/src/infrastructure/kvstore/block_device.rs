//! Block devices that back the KV store.
//!
//! # NOR flash in one paragraph (for beginners)
//!
//! On-chip flash is not a disk.  Erasing a block sets every bit to 1
//! (`0xFF` bytes); programming can only clear bits, so writing `0x0F` over
//! `0xF0` leaves `0x00`, not `0x0F`.  The only way back to 1 is erasing the
//! whole block again.  The log store is built around these rules: it only
//! ever appends into erased space, and it reclaims space by erasing an
//! entire area at once.
//!
//! [`RamDevice`] models those rules exactly and can simulate a power cut
//! part-way through a write.  [`FileDevice`] persists the same image to a
//! file so the host binary keeps its macros between runs.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// The value of an erased byte.
pub const ERASED: u8 = 0xFF;

/// Error type for block device operations.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("access at {offset}+{len} outside device of {size} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },

    #[error("block {block} does not exist")]
    NoSuchBlock { block: usize },

    /// The simulated supply failed part-way through a program operation.
    #[error("power lost during program")]
    PowerLoss,

    #[error("I/O error on flash image {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Raw access to an erasable, bit-clearing storage region.
pub trait BlockDevice: Send {
    /// Total size in bytes.
    fn size(&self) -> usize;

    /// Erase granularity in bytes.
    fn block_size(&self) -> usize;

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), DeviceError>;

    /// Programs `data` at `offset`.  Bits already cleared stay cleared.
    fn program(&mut self, offset: usize, data: &[u8]) -> Result<(), DeviceError>;

    /// Resets block number `block` to [`ERASED`].
    fn erase(&mut self, block: usize) -> Result<(), DeviceError>;
}

fn check_range(offset: usize, len: usize, size: usize) -> Result<(), DeviceError> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(DeviceError::OutOfBounds { offset, len, size }),
    }
}

fn program_nor(image: &mut [u8], offset: usize, data: &[u8]) {
    for (cell, byte) in image[offset..offset + data.len()].iter_mut().zip(data) {
        *cell &= *byte;
    }
}

// ── RAM device ────────────────────────────────────────────────────────────────

/// In-memory flash with optional power-loss injection.
#[derive(Debug, Clone)]
pub struct RamDevice {
    data: Vec<u8>,
    block_size: usize,
    /// Bytes that may still be programmed before the simulated power cut.
    program_budget: Option<usize>,
}

impl RamDevice {
    /// A fully erased device.
    pub fn new(size: usize, block_size: usize) -> Self {
        Self {
            data: vec![ERASED; size],
            block_size,
            program_budget: None,
        }
    }

    /// Rebuilds a device from an image captured with [`RamDevice::image`],
    /// as if the board had rebooted.
    pub fn from_image(image: Vec<u8>, block_size: usize) -> Self {
        Self {
            data: image,
            block_size,
            program_budget: None,
        }
    }

    /// Cuts power after `bytes` more bytes have been programmed.  The write
    /// that crosses the limit is torn: its prefix lands, the rest does not.
    pub fn power_loss_after(&mut self, bytes: usize) {
        self.program_budget = Some(bytes);
    }

    /// Restores normal operation.
    pub fn restore_power(&mut self) {
        self.program_budget = None;
    }

    pub fn image(&self) -> &[u8] {
        &self.data
    }
}

impl BlockDevice for RamDevice {
    fn size(&self) -> usize {
        self.data.len()
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), DeviceError> {
        check_range(offset, buf.len(), self.data.len())?;
        buf.copy_from_slice(&self.data[offset..offset + buf.len()]);
        Ok(())
    }

    fn program(&mut self, offset: usize, data: &[u8]) -> Result<(), DeviceError> {
        check_range(offset, data.len(), self.data.len())?;
        match self.program_budget {
            Some(budget) if budget < data.len() => {
                program_nor(&mut self.data, offset, &data[..budget]);
                self.program_budget = Some(0);
                Err(DeviceError::PowerLoss)
            }
            Some(budget) => {
                program_nor(&mut self.data, offset, data);
                self.program_budget = Some(budget - data.len());
                Ok(())
            }
            None => {
                program_nor(&mut self.data, offset, data);
                Ok(())
            }
        }
    }

    fn erase(&mut self, block: usize) -> Result<(), DeviceError> {
        if self.program_budget == Some(0) {
            return Err(DeviceError::PowerLoss);
        }
        let start = block * self.block_size;
        if start + self.block_size > self.data.len() {
            return Err(DeviceError::NoSuchBlock { block });
        }
        self.data[start..start + self.block_size].fill(ERASED);
        Ok(())
    }
}

// ── File device ───────────────────────────────────────────────────────────────

/// A flash image persisted to a regular file.
///
/// The whole image is mirrored in memory; programs and erases are written
/// through to the file before returning.
#[derive(Debug)]
pub struct FileDevice {
    path: PathBuf,
    file: File,
    data: Vec<u8>,
    block_size: usize,
}

impl FileDevice {
    /// Opens `path`, creating an erased image of `size` bytes if it does not
    /// exist.  A shorter existing image is extended with erased bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Io`] if the file cannot be opened, read or
    /// extended.
    pub fn open(path: &Path, size: usize, block_size: usize) -> Result<Self, DeviceError> {
        let io_err = |source| DeviceError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(io_err)?;

        let mut data = Vec::with_capacity(size);
        file.read_to_end(&mut data).map_err(io_err)?;
        if data.len() < size {
            let old_len = data.len();
            data.resize(size, ERASED);
            file.seek(SeekFrom::Start(old_len as u64)).map_err(io_err)?;
            file.write_all(&data[old_len..]).map_err(io_err)?;
            file.sync_data().map_err(io_err)?;
        }
        data.truncate(size);

        Ok(Self {
            path: path.to_path_buf(),
            file,
            data,
            block_size,
        })
    }

    fn write_through(&mut self, offset: usize, len: usize) -> Result<(), DeviceError> {
        let io_err = |source| DeviceError::Io {
            path: self.path.clone(),
            source,
        };
        self.file
            .seek(SeekFrom::Start(offset as u64))
            .map_err(io_err)?;
        self.file
            .write_all(&self.data[offset..offset + len])
            .map_err(io_err)?;
        self.file.sync_data().map_err(io_err)
    }
}

impl BlockDevice for FileDevice {
    fn size(&self) -> usize {
        self.data.len()
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), DeviceError> {
        check_range(offset, buf.len(), self.data.len())?;
        buf.copy_from_slice(&self.data[offset..offset + buf.len()]);
        Ok(())
    }

    fn program(&mut self, offset: usize, data: &[u8]) -> Result<(), DeviceError> {
        check_range(offset, data.len(), self.data.len())?;
        program_nor(&mut self.data, offset, data);
        self.write_through(offset, data.len())
    }

    fn erase(&mut self, block: usize) -> Result<(), DeviceError> {
        let start = block * self.block_size;
        if start + self.block_size > self.data.len() {
            return Err(DeviceError::NoSuchBlock { block });
        }
        self.data[start..start + self.block_size].fill(ERASED);
        self.write_through(start, self.block_size)
    }
}
