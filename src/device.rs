//! Block device abstraction over a memory-mapped image file.
//!
//! The FAT and directory managers never touch a device directly — only the
//! buffer manager does. They are written against the `BlockDevice` trait so
//! tests can swap in an in-memory device without a filesystem round-trip.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;

use memmap2::MmapMut;

use crate::config::Geometry;
use crate::error::{FsError, FsResult};
use crate::superblock::Superblock;

/// Anything that can serve fixed-size blocks. The buffer manager is generic
/// over this trait rather than over a concrete mmap type.
pub trait BlockDevice {
    fn geometry(&self) -> Geometry;

    /// Reads block `index`, returning exactly `geometry().block_size` bytes.
    fn read_block(&mut self, index: u32) -> FsResult<Vec<u8>>;

    /// Writes `data` to block `index`. Shorter input is zero-padded on the
    /// right; longer input is truncated to the block size.
    fn write_block(&mut self, index: u32, data: &[u8]) -> FsResult<()>;

    /// Forces pending writes to the backing storage.
    fn flush(&mut self) -> FsResult<()>;

    /// Flushes and releases the underlying storage. After `close`, further
    /// calls on this device are not made by well-behaved callers.
    fn close(&mut self) -> FsResult<()>;
}

/// A block device backed by a memory-mapped file of exactly
/// `geometry.image_bytes()` bytes.
pub struct MmapBlockDevice {
    geometry: Geometry,
    file: File,
    map: MmapMut,
}

impl MmapBlockDevice {
    /// Opens `path`, creating and zero-filling a fresh image (with an
    /// initialized superblock) if it does not already exist.
    pub fn open(path: impl AsRef<Path>, geometry: Geometry) -> FsResult<Self> {
        let path = path.as_ref();
        let is_new = !path.exists();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(io_err)?;

        let image_bytes = geometry.image_bytes();
        if is_new {
            file.set_len(image_bytes).map_err(io_err)?;
            log::info!("created new image {:?} ({} bytes)", path, image_bytes);
        } else {
            let len = file.metadata().map_err(io_err)?.len();
            if len != image_bytes {
                log::warn!(
                    "image {:?} size {} does not match geometry ({})",
                    path,
                    len,
                    image_bytes
                );
            }
        }

        // SAFETY: `file` is kept alive for as long as `map`, inside `self`,
        // and nothing else in this process maps the same file.
        let map = unsafe { MmapMut::map_mut(&file) }.map_err(io_err)?;

        let mut device = Self {
            geometry,
            file,
            map,
        };

        if is_new {
            let sb = Superblock::new(geometry);
            device.write_block(geometry.superblock_block(), sb.as_bytes())?;
            device.flush()?;
            log::info!("superblock initialized at block 0");
        }

        Ok(device)
    }

    fn block_range(&self, index: u32) -> FsResult<std::ops::Range<usize>> {
        if index >= self.geometry.total_blocks {
            return Err(FsError::InvalidBlock(index));
        }
        let start = index as usize * self.geometry.block_size as usize;
        let end = start + self.geometry.block_size as usize;
        Ok(start..end)
    }
}

impl BlockDevice for MmapBlockDevice {
    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn read_block(&mut self, index: u32) -> FsResult<Vec<u8>> {
        let range = self.block_range(index)?;
        Ok(self.map[range].to_vec())
    }

    fn write_block(&mut self, index: u32, data: &[u8]) -> FsResult<()> {
        let range = self.block_range(index)?;
        let block_size = self.geometry.block_size as usize;
        let n = data.len().min(block_size);
        self.map[range.start..range.start + n].copy_from_slice(&data[..n]);
        if n < block_size {
            self.map[range.start + n..range.end].fill(0);
        }
        Ok(())
    }

    fn flush(&mut self) -> FsResult<()> {
        self.map.flush().map_err(io_err)
    }

    fn close(&mut self) -> FsResult<()> {
        self.flush()?;
        // Dropping the mmap and file handle releases the mapping; nothing
        // further to do explicitly, matching `DiskManager.close`.
        Ok(())
    }
}

fn io_err(e: io::Error) -> FsError {
    // The device layer only ever fails with index-range errors in this
    // design; a hard I/O failure maps to the closest taxonomy member since
    // the spec has no dedicated "device failure" variant.
    log::error!("block device I/O error: {e}");
    FsError::InvalidBlock(u32::MAX)
}

/// An in-memory `BlockDevice` used by tests that want to exercise the cache
/// and metadata managers without touching the filesystem.
#[cfg(test)]
pub struct MemBlockDevice {
    geometry: Geometry,
    blocks: Vec<Vec<u8>>,
}

#[cfg(test)]
impl MemBlockDevice {
    pub fn new(geometry: Geometry) -> Self {
        let blocks = vec![vec![0u8; geometry.block_size as usize]; geometry.total_blocks as usize];
        Self { geometry, blocks }
    }
}

#[cfg(test)]
impl BlockDevice for MemBlockDevice {
    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn read_block(&mut self, index: u32) -> FsResult<Vec<u8>> {
        self.blocks
            .get(index as usize)
            .cloned()
            .ok_or(FsError::InvalidBlock(index))
    }

    fn write_block(&mut self, index: u32, data: &[u8]) -> FsResult<()> {
        let block_size = self.geometry.block_size as usize;
        let block = self
            .blocks
            .get_mut(index as usize)
            .ok_or(FsError::InvalidBlock(index))?;
        let n = data.len().min(block_size);
        block[..n].copy_from_slice(&data[..n]);
        for b in &mut block[n..] {
            *b = 0;
        }
        Ok(())
    }

    fn flush(&mut self) -> FsResult<()> {
        Ok(())
    }

    fn close(&mut self) -> FsResult<()> {
        Ok(())
    }
}
