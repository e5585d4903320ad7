//! Buffer manager: a fixed-capacity cache of disk blocks with LRU eviction
//! and write-back. This is the only layer permitted to touch the block
//! device for payload bytes; the FAT and directory managers, and the
//! facade's direct block writes, all go through here.
//!
//! Interface mirrors `buffer.buffer_manager.BufferManager`: `read_page`,
//! `write_page`, `flush_all`, `invalidate`, `clear`, `get_status`.

use std::collections::HashMap;

use parking_lot::ReentrantMutex;
use std::cell::RefCell;

use crate::config::Geometry;
use crate::device::BlockDevice;
use crate::error::{FsError, FsResult};

/// A monotonic tick counter standing in for `time.time()` in the original;
/// using a logical clock instead of wall-clock time makes eviction order
/// deterministic and makes the unit tests below exact rather than racy.
type Tick = u64;

#[derive(Debug, Clone)]
pub struct Page {
    pub block_id: u32,
    pub data: Vec<u8>,
    pub is_dirty: bool,
    pub last_access: Tick,
    pub owner: Option<String>,
    pub ref_count: u32,
}

impl Page {
    fn is_pinned(&self) -> bool {
        self.ref_count > 0
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub hit: u64,
    pub miss: u64,
    pub evict: u64,
    pub writeback: u64,
}

impl Stats {
    /// `hit / (hit + miss)`, or `0.0` when nothing has been requested yet.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hit + self.miss;
        if total == 0 {
            0.0
        } else {
            self.hit as f64 / total as f64
        }
    }

    fn reset(&mut self) {
        *self = Stats::default();
    }
}

#[derive(Debug, Clone)]
pub struct PageSummary {
    pub block_id: u32,
    pub is_dirty: bool,
    pub owner: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BufferStatus {
    pub capacity: usize,
    pub occupancy: usize,
    pub pages: Vec<PageSummary>,
    pub stats: Stats,
}

struct Inner<D> {
    device: D,
    geometry: Geometry,
    capacity: usize,
    pages: HashMap<u32, Page>,
    clock: Tick,
    stats: Stats,
}

impl<D: BlockDevice> Inner<D> {
    fn tick(&mut self) -> Tick {
        self.clock += 1;
        self.clock
    }

    /// Picks the least-recently-used unpinned page, writing it through if
    /// dirty, and removes it. Fails with `PoolExhausted` if every resident
    /// page is pinned.
    fn evict_one(&mut self) -> FsResult<()> {
        let victim = self
            .pages
            .values()
            .filter(|p| !p.is_pinned())
            .min_by_key(|p| (p.last_access, p.block_id))
            .map(|p| p.block_id);

        let victim = victim.ok_or(FsError::PoolExhausted(self.pages.len()))?;
        self.writeback_if_dirty(victim)?;
        self.stats.evict += 1;
        self.pages.remove(&victim);
        log::debug!("evicted block {victim}");
        Ok(())
    }

    fn writeback_if_dirty(&mut self, block_id: u32) -> FsResult<()> {
        if let Some(page) = self.pages.get(&block_id) {
            if page.is_dirty {
                self.device.write_block(block_id, &page.data)?;
                self.stats.writeback += 1;
                log::debug!("wrote back dirty block {block_id}");
                if let Some(page) = self.pages.get_mut(&block_id) {
                    page.is_dirty = false;
                }
            }
        }
        Ok(())
    }

    fn ensure_resident(&mut self, block_id: u32, owner: Option<&str>) -> FsResult<()> {
        if self.pages.contains_key(&block_id) {
            return Ok(());
        }
        if self.pages.len() >= self.capacity {
            self.evict_one()?;
        }
        let data = self.device.read_block(block_id)?;
        let tick = self.tick();
        self.pages.insert(
            block_id,
            Page {
                block_id,
                data,
                is_dirty: false,
                last_access: tick,
                owner: owner.map(str::to_string),
                ref_count: 0,
            },
        );
        Ok(())
    }

    fn read_page(&mut self, block_id: u32, owner: Option<&str>) -> FsResult<Vec<u8>> {
        self.check_block(block_id)?;
        if let Some(page) = self.pages.get(&block_id) {
            let data = page.data.clone();
            let tick = self.tick();
            let page = self.pages.get_mut(&block_id).unwrap();
            page.last_access = tick;
            if owner.is_some() {
                page.owner = owner.map(str::to_string);
            }
            self.stats.hit += 1;
            return Ok(data);
        }

        self.stats.miss += 1;
        self.ensure_resident(block_id, owner)?;
        Ok(self.pages[&block_id].data.clone())
    }

    fn write_page(&mut self, block_id: u32, data: &[u8], owner: Option<&str>) -> FsResult<()> {
        self.check_block(block_id)?;
        if !self.pages.contains_key(&block_id) {
            // Establish residency via the same miss path `read_page` uses,
            // without double counting a hit for the immediate write.
            self.stats.miss += 1;
            self.ensure_resident(block_id, owner)?;
        }

        let block_size = self.geometry.block_size as usize;
        let tick = self.tick();
        let page = self.pages.get_mut(&block_id).unwrap();
        let n = data.len().min(block_size);
        page.data[..n].copy_from_slice(&data[..n]);
        for b in &mut page.data[n..] {
            *b = 0;
        }
        page.is_dirty = true;
        page.last_access = tick;
        if owner.is_some() {
            page.owner = owner.map(str::to_string);
        }
        Ok(())
    }

    fn flush_all(&mut self) -> FsResult<()> {
        let dirty_ids: Vec<u32> = self
            .pages
            .values()
            .filter(|p| p.is_dirty)
            .map(|p| p.block_id)
            .collect();
        for id in dirty_ids {
            self.writeback_if_dirty(id)?;
        }
        self.device.flush()
    }

    fn invalidate(&mut self, block_id: u32) -> FsResult<()> {
        self.writeback_if_dirty(block_id)?;
        self.pages.remove(&block_id);
        Ok(())
    }

    fn clear(&mut self) -> FsResult<()> {
        self.flush_all()?;
        self.pages.clear();
        Ok(())
    }

    fn status(&self) -> BufferStatus {
        let mut pages: Vec<PageSummary> = self
            .pages
            .values()
            .map(|p| PageSummary {
                block_id: p.block_id,
                is_dirty: p.is_dirty,
                owner: p.owner.clone(),
            })
            .collect();
        pages.sort_by_key(|p| p.block_id);
        BufferStatus {
            capacity: self.capacity,
            occupancy: self.pages.len(),
            pages,
            stats: self.stats,
        }
    }

    fn check_block(&self, block_id: u32) -> FsResult<()> {
        if block_id >= self.geometry.total_blocks {
            Err(FsError::InvalidBlock(block_id))
        } else {
            Ok(())
        }
    }
}

/// The buffer manager proper. Wraps its mutable state in a re-entrant mutex
/// so the FAT and directory managers — which call back into the cache while
/// the facade already holds its own coarse lock — never deadlock against
/// themselves on a single thread.
pub struct BufferManager<D> {
    inner: ReentrantMutex<RefCell<Inner<D>>>,
}

impl<D: BlockDevice> BufferManager<D> {
    pub fn new(device: D, capacity: usize) -> Self {
        let geometry = device.geometry();
        Self {
            inner: ReentrantMutex::new(RefCell::new(Inner {
                device,
                geometry,
                capacity,
                pages: HashMap::with_capacity(capacity),
                clock: 0,
                stats: Stats::default(),
            })),
        }
    }

    pub fn read_page(&self, block_id: u32, owner: Option<&str>) -> FsResult<Vec<u8>> {
        self.inner.lock().borrow_mut().read_page(block_id, owner)
    }

    pub fn write_page(&self, block_id: u32, data: &[u8], owner: Option<&str>) -> FsResult<()> {
        self.inner
            .lock()
            .borrow_mut()
            .write_page(block_id, data, owner)
    }

    pub fn flush_all(&self) -> FsResult<()> {
        self.inner.lock().borrow_mut().flush_all()
    }

    pub fn invalidate(&self, block_id: u32) -> FsResult<()> {
        self.inner.lock().borrow_mut().invalidate(block_id)
    }

    pub fn clear(&self) -> FsResult<()> {
        self.inner.lock().borrow_mut().clear()
    }

    pub fn get_status(&self) -> BufferStatus {
        self.inner.lock().borrow().status()
    }

    pub fn reset_stats(&self) {
        self.inner.lock().borrow_mut().stats.reset();
    }

    /// Flushes and hands back the underlying device, consuming the manager.
    /// Used by the facade's `shutdown`.
    pub fn into_device(self) -> FsResult<D> {
        let cell = self.inner.into_inner();
        let mut inner = cell.into_inner();
        inner.flush_all()?;
        Ok(inner.device)
    }
}
