//! An educational FAT-style filesystem simulator over a single memory-mapped
//! image file: a block device, a cache with LRU eviction and write-back, a
//! FAT chain allocator, a flat directory region, and a facade tying them
//! together behind one lock.

pub mod bio;
pub mod config;
pub mod device;
pub mod dir;
pub mod error;
pub mod fat;
pub mod fcb;
pub mod fs;
pub mod path;
pub mod scheduler;
pub mod superblock;

pub use config::Geometry;
pub use device::{BlockDevice, MmapBlockDevice};
pub use error::{FsError, FsResult};
pub use fs::{FileInfo, Filesystem, SystemInfo};
pub use scheduler::Scheduler;
