//! Directory manager: resolves multi-level paths to directory entries and
//! maintains directory block lists.
//!
//! Mirrors `disk.directory_manager.DirectoryManager`. The root directory
//! occupies the fixed block range reserved at image creation; every
//! subdirectory occupies data blocks chained through the FAT, exactly like a
//! file's chain, addressed by its own FCB's `start_block`.

use crate::bio::BufferManager;
use crate::config::Geometry;
use crate::device::BlockDevice;
use crate::error::{FsError, FsResult};
use crate::fat::{FatManager, EOF};
use crate::fcb::{Fcb, EMPTY_BLOCK};
use crate::path;

const OWNER: &str = "DIR";

/// A directory entry together with its on-disk slot address, so callers can
/// update or delete it without re-resolving.
#[derive(Debug, Clone)]
pub struct Entry {
    pub fcb: Fcb,
    pub block: u32,
    pub offset: usize,
}

pub struct DirectoryManager<'a, D> {
    buffer: &'a BufferManager<D>,
    geometry: Geometry,
}

impl<'a, D: BlockDevice> DirectoryManager<'a, D> {
    pub fn new(buffer: &'a BufferManager<D>, geometry: Geometry) -> Self {
        Self { buffer, geometry }
    }

    fn root_blocks(&self) -> Vec<u32> {
        (self.geometry.dir_start()..self.geometry.data_start()).collect()
    }

    /// Blocks belonging to a subdirectory's chain; empty if it has never
    /// been grown past creation (which should not happen for directories,
    /// since `create_directory` allocates one block up front, but is
    /// handled defensively all the same).
    fn chain_blocks(&self, fat: &FatManager<'_, D>, start_block: i32) -> FsResult<Vec<u32>> {
        if start_block == EMPTY_BLOCK {
            Ok(Vec::new())
        } else {
            fat.get_file_blocks(start_block)
        }
    }

    fn slot_size(&self) -> usize {
        crate::config::FCB_SIZE as usize
    }

    /// Zeroes every slot in the root directory's fixed block range.
    pub fn init(&self) -> FsResult<()> {
        let zero = vec![0u8; self.geometry.block_size as usize];
        for block in self.root_blocks() {
            self.buffer.write_page(block, &zero, Some(OWNER))?;
        }
        self.buffer.flush_all()
    }

    fn list_blocks(&self, blocks: &[u32]) -> FsResult<Vec<Entry>> {
        let mut entries = Vec::new();
        let slot_size = self.slot_size();
        for &block in blocks {
            let data = self.buffer.read_page(block, Some(OWNER))?;
            for (slot_index, chunk) in data.chunks(slot_size).enumerate() {
                if let Some(fcb) = Fcb::from_bytes(chunk) {
                    entries.push(Entry {
                        fcb,
                        block,
                        offset: slot_index * slot_size,
                    });
                }
            }
        }
        Ok(entries)
    }

    /// Lists the root directory's occupied slots.
    pub fn list_root(&self) -> FsResult<Vec<Entry>> {
        self.list_blocks(&self.root_blocks())
    }

    /// Lists a subdirectory's occupied slots, given its FCB's `start_block`.
    pub fn list_in(&self, fat: &FatManager<'_, D>, start_block: i32) -> FsResult<Vec<Entry>> {
        let blocks = self.chain_blocks(fat, start_block)?;
        self.list_blocks(&blocks)
    }

    pub fn find_root(&self, name: &str) -> FsResult<Option<Entry>> {
        Ok(self.list_root()?.into_iter().find(|e| e.fcb.name == name))
    }

    pub fn find_in(
        &self,
        fat: &FatManager<'_, D>,
        start_block: i32,
        name: &str,
    ) -> FsResult<Option<Entry>> {
        Ok(self
            .list_in(fat, start_block)?
            .into_iter()
            .find(|e| e.fcb.name == name))
    }

    /// Walks `abs_path` component by component from the root, failing with
    /// `NotFound` on a missing component and `NotADirectory` if an
    /// intermediate component is not itself a directory. `"/"` (or `""`)
    /// resolves to `None`, meaning the root.
    pub fn resolve(&self, fat: &FatManager<'_, D>, abs_path: &str) -> FsResult<Option<Entry>> {
        let parts = path::split(abs_path)?;
        if parts.is_empty() {
            return Ok(None);
        }
        let mut current: Option<Entry> = None;
        for part in &parts {
            let found = match &current {
                None => self.find_root(part)?,
                Some(entry) => {
                    if !entry.fcb.is_directory {
                        return Err(FsError::NotADirectory(entry.fcb.name.clone()));
                    }
                    self.find_in(fat, entry.fcb.start_block, part)?
                }
            };
            current = Some(found.ok_or_else(|| FsError::NotFound(abs_path.to_string()))?);
        }
        Ok(current)
    }

    fn find_free_slot(&self, blocks: &[u32]) -> FsResult<Option<(u32, usize)>> {
        let slot_size = self.slot_size();
        for &block in blocks {
            let data = self.buffer.read_page(block, Some(OWNER))?;
            for (slot_index, chunk) in data.chunks(slot_size).enumerate() {
                if chunk.iter().all(|&b| b == 0) {
                    return Ok(Some((block, slot_index * slot_size)));
                }
            }
        }
        Ok(None)
    }

    /// Inserts `fcb` into `parent` (`None` meaning the root), dispatching to
    /// `add_entry_root` or `add_entry_in`.
    pub fn add_entry(
        &self,
        fat: &FatManager<'_, D>,
        parent: Option<&mut Entry>,
        fcb: Fcb,
    ) -> FsResult<Entry> {
        match parent {
            None => self.add_entry_root(fcb),
            Some(parent) => self.add_entry_in(fat, parent, fcb),
        }
    }

    /// Inserts `fcb` into the root directory. Fails `AlreadyExists` or
    /// `DirectoryFull` (the root cannot grow past its fixed block range).
    pub fn add_entry_root(&self, fcb: Fcb) -> FsResult<Entry> {
        if self.find_root(&fcb.name)?.is_some() {
            return Err(FsError::AlreadyExists(fcb.name));
        }
        match self.find_free_slot(&self.root_blocks())? {
            Some((block, offset)) => {
                self.write_slot(block, offset, &fcb)?;
                log::info!("directory entry added at root: {}", fcb.name);
                Ok(Entry { fcb, block, offset })
            }
            None => Err(FsError::DirectoryFull("/".to_string())),
        }
    }

    /// Inserts `fcb` into the subdirectory described by `parent`, growing
    /// its chain by one block through the FAT if every existing slot is
    /// occupied. Updates `parent.fcb.start_block` and persists the parent's
    /// own slot when growth allocates the subdirectory's first block.
    pub fn add_entry_in(
        &self,
        fat: &FatManager<'_, D>,
        parent: &mut Entry,
        fcb: Fcb,
    ) -> FsResult<Entry> {
        if self.find_in(fat, parent.fcb.start_block, &fcb.name)?.is_some() {
            return Err(FsError::AlreadyExists(fcb.name));
        }
        let blocks = self.chain_blocks(fat, parent.fcb.start_block)?;
        if let Some((block, offset)) = self.find_free_slot(&blocks)? {
            self.write_slot(block, offset, &fcb)?;
            log::info!("directory entry added in {}: {}", parent.fcb.name, fcb.name);
            return Ok(Entry { fcb, block, offset });
        }

        let new_block = fat.allocate_block()?.ok_or(FsError::NoSpace)?;
        let zero = vec![0u8; self.geometry.block_size as usize];
        self.buffer.write_page(new_block, &zero, Some(OWNER))?;
        fat.set_next(new_block, EOF)?;

        if let Some(&tail) = blocks.last() {
            fat.set_next(tail, new_block)?;
        } else {
            parent.fcb.start_block = new_block as i32;
            self.update_entry(parent, &parent.fcb.clone())?;
        }

        self.write_slot(new_block, 0, &fcb)?;
        log::info!(
            "directory {} grown by one block to hold {}",
            parent.fcb.name,
            fcb.name
        );
        Ok(Entry {
            fcb,
            block: new_block,
            offset: 0,
        })
    }

    /// Overwrites the slot at `entry.block`/`entry.offset` with `fcb`,
    /// keeping the entry's on-disk position stable.
    pub fn update_entry(&self, entry: &Entry, fcb: &Fcb) -> FsResult<()> {
        self.write_slot(entry.block, entry.offset, fcb)
    }

    /// Zeroes the slot occupied by `entry`, freeing it for reuse.
    pub fn remove_entry(&self, entry: &Entry) -> FsResult<()> {
        let slot_size = self.slot_size();
        let zero = vec![0u8; slot_size];
        self.write_bytes(entry.block, entry.offset, &zero)?;
        log::info!("directory entry removed: {}", entry.fcb.name);
        Ok(())
    }

    fn write_slot(&self, block: u32, offset: usize, fcb: &Fcb) -> FsResult<()> {
        let bytes = fcb.to_bytes()?;
        self.write_bytes(block, offset, &bytes)
    }

    fn write_bytes(&self, block: u32, offset: usize, bytes: &[u8]) -> FsResult<()> {
        let mut data = self.buffer.read_page(block, Some(OWNER))?;
        data[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.buffer.write_page(block, &data, Some(OWNER))
    }

    /// Total number of occupied root slots, for `get_system_info`.
    pub fn root_entry_count(&self) -> FsResult<usize> {
        Ok(self.list_root()?.len())
    }
}
