//! The superblock: 64 bytes at block 0 describing filesystem magic, version,
//! and the layout geometry baked into the image at creation time.

use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::config::{Geometry, DISK_MAGIC, DISK_VERSION, FCB_SIZE};

#[derive(AsBytes, FromBytes, FromZeroes, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, packed)]
pub struct Superblock {
    magic: [u8; 5],
    version: u8,
    block_size: u16,
    total_blocks: u32,
    fat_start: u32,
    fat_blocks: u8,
    dir_start: u32,
    dir_blocks: u8,
    data_start: u32,
    _padding: [u8; 64 - 5 - 1 - 2 - 4 - 4 - 1 - 4 - 1 - 4],
}

static_assertions::const_assert_eq!(std::mem::size_of::<Superblock>(), 64);

impl Superblock {
    pub fn new(geo: Geometry) -> Self {
        Self {
            magic: DISK_MAGIC,
            version: DISK_VERSION,
            block_size: geo.block_size as u16,
            total_blocks: geo.total_blocks,
            fat_start: geo.fat_start(),
            fat_blocks: geo.fat_blocks as u8,
            dir_start: geo.dir_start(),
            dir_blocks: geo.dir_blocks as u8,
            data_start: geo.data_start(),
            _padding: [0; 64 - 5 - 1 - 2 - 4 - 4 - 1 - 4 - 1 - 4],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        AsBytes::as_bytes(self)
    }

    pub fn from_block(data: &[u8]) -> Option<Self> {
        Superblock::read_from_prefix(data)
    }

    pub fn is_valid(&self) -> bool {
        self.magic == DISK_MAGIC
    }

    pub fn geometry(&self) -> Geometry {
        Geometry {
            block_size: self.block_size as u32,
            total_blocks: self.total_blocks,
            buffer_capacity: crate::config::DEFAULT_BUFFER_CAPACITY,
            fat_blocks: self.fat_blocks as u32,
            dir_blocks: self.dir_blocks as u32,
        }
    }
}

static_assertions::const_assert_eq!(FCB_SIZE, 64);
