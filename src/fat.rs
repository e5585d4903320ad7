//! FAT manager: block allocation, free-block tracking, and chain traversal.
//!
//! Every FAT read and write goes through the buffer manager; mirrors
//! `disk.fat_manager.FATManager`.

use std::collections::HashSet;

use crate::bio::BufferManager;
use crate::config::Geometry;
use crate::device::BlockDevice;
use crate::error::{FsError, FsResult};

pub const FREE: u32 = 0xFFFF_FFFF;
pub const EOF: u32 = 0xFFFF_FFFE;
pub const BAD: u32 = 0xFFFF_FFFD;
pub const RESERVED_BASE: u32 = 0xFFFF_FF00;

const OWNER: &str = "FAT";

pub struct FatManager<'a, D> {
    buffer: &'a BufferManager<D>,
    geometry: Geometry,
}

impl<'a, D: BlockDevice> FatManager<'a, D> {
    pub fn new(buffer: &'a BufferManager<D>, geometry: Geometry) -> Self {
        Self { buffer, geometry }
    }

    fn entries_per_block(&self) -> u32 {
        self.geometry.entries_per_fat_block()
    }

    fn total_entries(&self) -> u32 {
        self.geometry.total_fat_entries()
    }

    fn block_for_entry(&self, index: u32) -> u32 {
        self.geometry.fat_start() + index / self.entries_per_block()
    }

    fn offset_for_entry(&self, index: u32) -> usize {
        (index % self.entries_per_block()) as usize * 4
    }

    fn read_entry(&self, index: u32) -> FsResult<u32> {
        if index >= self.total_entries() {
            return Err(FsError::InvalidBlock(index));
        }
        let block_id = self.block_for_entry(index);
        let data = self.buffer.read_page(block_id, Some(OWNER))?;
        let off = self.offset_for_entry(index);
        Ok(u32::from_le_bytes(data[off..off + 4].try_into().unwrap()))
    }

    fn write_entry(&self, index: u32, value: u32) -> FsResult<()> {
        if index >= self.total_entries() {
            return Err(FsError::InvalidBlock(index));
        }
        let block_id = self.block_for_entry(index);
        let mut data = self.buffer.read_page(block_id, Some(OWNER))?;
        let off = self.offset_for_entry(index);
        data[off..off + 4].copy_from_slice(&value.to_le_bytes());
        self.buffer.write_page(block_id, &data, Some(OWNER))
    }

    /// Low-level edit: used when extending or truncating chains.
    pub fn set_next(&self, index: u32, next: u32) -> FsResult<()> {
        self.write_entry(index, next)
    }

    /// Initializes every data-region entry to `FREE`. Called once, at image
    /// creation, before `mark_system_blocks`.
    pub fn init_free_entries(&self) -> FsResult<()> {
        for i in self.geometry.data_start()..self.total_entries().min(self.geometry.total_blocks) {
            self.write_entry(i, FREE)?;
        }
        Ok(())
    }

    /// Writes reserved sentinels over the superblock, FAT, and root
    /// directory regions so they are never handed out by `allocate_block`.
    pub fn mark_system_blocks(&self) -> FsResult<()> {
        let geo = self.geometry;
        self.write_entry(geo.superblock_block(), RESERVED_BASE + 3)?;
        for i in geo.fat_start()..geo.fat_start() + geo.fat_blocks {
            if i < self.total_entries() {
                self.write_entry(i, RESERVED_BASE + 1)?;
            }
        }
        for i in geo.dir_start()..geo.data_start() {
            if i < self.total_entries() {
                self.write_entry(i, RESERVED_BASE + 2)?;
            }
        }
        self.buffer.flush_all()?;
        log::info!("system blocks marked reserved");
        Ok(())
    }

    /// Returns the smallest free block in the data region, marking it `EOF`.
    /// Returns `None` if the disk is full.
    pub fn allocate_block(&self) -> FsResult<Option<u32>> {
        let max_block = self.total_entries().min(self.geometry.total_blocks);
        for i in self.geometry.data_start()..max_block {
            if self.read_entry(i)? == FREE {
                self.write_entry(i, EOF)?;
                log::debug!("allocated block {i}");
                return Ok(Some(i));
            }
        }
        log::warn!("no free blocks available");
        Ok(None)
    }

    /// Marks `block_index` free. Invalid or reserved indices are silently
    /// ignored, matching the Python manager's guard (`block_index < 2 or
    /// >= total_entries`).
    pub fn free_block(&self, block_index: i32) -> FsResult<()> {
        if block_index < 0 {
            return Ok(());
        }
        let idx = block_index as u32;
        if idx < self.geometry.data_start() || idx >= self.total_entries() {
            return Ok(());
        }
        self.write_entry(idx, FREE)?;
        log::debug!("freed block {idx}");
        Ok(())
    }

    /// Walks the chain starting at `start`, stopping at `EOF`/`FREE`, on a
    /// detected cycle, or once the chain exceeds `N` blocks. Returns the
    /// blocks collected so far alongside whether the walk stopped on one of
    /// those anomalies rather than a clean `EOF`/`FREE`.
    fn walk_chain(&self, start: i32) -> FsResult<(Vec<u32>, bool)> {
        if start < 0 {
            return Ok((Vec::new(), false));
        }
        let mut current = start as u32;
        if current >= self.total_entries() {
            return Err(FsError::InvalidBlock(current));
        }

        let mut blocks = Vec::new();
        let mut seen = HashSet::new();
        let max_len = self.geometry.total_blocks as usize;

        loop {
            if current >= self.total_entries() {
                log::warn!("chain left valid range at block {current}");
                return Ok((blocks, true));
            }
            if !seen.insert(current) {
                log::warn!("FAT cycle detected at block {current}");
                return Ok((blocks, true));
            }
            blocks.push(current);
            if blocks.len() >= max_len {
                log::warn!("chain exceeded {max_len} blocks, truncating");
                return Ok((blocks, true));
            }

            let next = self.read_entry(current)?;
            if next == FREE || next == EOF || next >= EOF {
                return Ok((blocks, false));
            }
            current = next;
        }
    }

    /// Read-context chain walk: stopping at `EOF`/`FREE`, on a detected
    /// cycle, or once the chain exceeds `N` blocks (defensive termination;
    /// logs and returns the prefix collected so far, never errors on an
    /// anomaly).
    pub fn get_file_blocks(&self, start: i32) -> FsResult<Vec<u32>> {
        Ok(self.walk_chain(start)?.0)
    }

    /// Mutation-context chain walk: identical traversal, but a cycle,
    /// out-of-range entry, or length-cap anomaly is reported as
    /// `CorruptFat` instead of silently truncating, so the caller aborts
    /// the mutation rather than writing through a partial chain.
    pub fn get_file_blocks_for_mutation(&self, start: i32) -> FsResult<Vec<u32>> {
        let (blocks, truncated) = self.walk_chain(start)?;
        if truncated {
            return Err(FsError::CorruptFat(start as u32));
        }
        Ok(blocks)
    }

    /// Scans the data region and returns every block currently marked
    /// `FREE`.
    pub fn get_free_blocks(&self) -> FsResult<Vec<u32>> {
        let max_block = self.total_entries().min(self.geometry.total_blocks);
        let mut free = Vec::new();
        for i in self.geometry.data_start()..max_block {
            if self.read_entry(i)? == FREE {
                free.push(i);
            }
        }
        Ok(free)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemBlockDevice;

    fn setup(capacity: usize) -> (BufferManager<MemBlockDevice>, Geometry) {
        let geo = Geometry::default();
        let buf = BufferManager::new(MemBlockDevice::new(geo), capacity);
        let fat = FatManager::new(&buf, geo);
        fat.init_free_entries().unwrap();
        fat.mark_system_blocks().unwrap();
        (buf, geo)
    }

    #[test]
    fn allocate_returns_smallest_free_data_block() {
        let (buf, geo) = setup(8);
        let fat = FatManager::new(&buf, geo);
        let b = fat.allocate_block().unwrap().unwrap();
        assert_eq!(b, geo.data_start());
    }

    #[test]
    fn free_then_allocate_reuses_block() {
        let (buf, geo) = setup(8);
        let fat = FatManager::new(&buf, geo);
        let a = fat.allocate_block().unwrap().unwrap();
        let b = fat.allocate_block().unwrap().unwrap();
        fat.free_block(a as i32).unwrap();
        let c = fat.allocate_block().unwrap().unwrap();
        assert_eq!(a, c);
        assert_ne!(a, b);
    }

    #[test]
    fn chain_walk_stops_at_eof() {
        let (buf, geo) = setup(8);
        let fat = FatManager::new(&buf, geo);
        let a = fat.allocate_block().unwrap().unwrap();
        let b = fat.allocate_block().unwrap().unwrap();
        fat.set_next(a, b).unwrap();
        fat.set_next(b, EOF).unwrap();
        let chain = fat.get_file_blocks(a as i32).unwrap();
        assert_eq!(chain, vec![a, b]);
    }

    #[test]
    fn chain_walk_breaks_cycle() {
        let (buf, geo) = setup(8);
        let fat = FatManager::new(&buf, geo);
        let a = fat.allocate_block().unwrap().unwrap();
        let b = fat.allocate_block().unwrap().unwrap();
        fat.set_next(a, b).unwrap();
        fat.set_next(b, a).unwrap(); // cycle
        let chain = fat.get_file_blocks(a as i32).unwrap();
        assert_eq!(chain, vec![a, b]);
    }

    #[test]
    fn chain_walk_cycle_reported_as_corrupt_for_mutation() {
        let (buf, geo) = setup(8);
        let fat = FatManager::new(&buf, geo);
        let a = fat.allocate_block().unwrap().unwrap();
        let b = fat.allocate_block().unwrap().unwrap();
        fat.set_next(a, b).unwrap();
        fat.set_next(b, a).unwrap(); // cycle
        let err = fat.get_file_blocks_for_mutation(a as i32).unwrap_err();
        assert!(matches!(err, FsError::CorruptFat(_)));
    }

    #[test]
    fn negative_start_is_empty_chain() {
        let (buf, geo) = setup(8);
        let fat = FatManager::new(&buf, geo);
        assert_eq!(fat.get_file_blocks(-1).unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn free_blocks_excludes_reserved_and_allocated() {
        let (buf, geo) = setup(8);
        let fat = FatManager::new(&buf, geo);
        let before = fat.get_free_blocks().unwrap().len();
        let _ = fat.allocate_block().unwrap().unwrap();
        let after = fat.get_free_blocks().unwrap().len();
        assert_eq!(before - 1, after);
    }
}
