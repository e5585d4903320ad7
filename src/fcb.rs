//! File control block: the 64-byte directory entry describing a file or
//! subdirectory. Mirrors `disk.fcb.FCB` byte for byte.

use std::time::{SystemTime, UNIX_EPOCH};

use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::config::FCB_SIZE;
use crate::error::FsError;

const NAME_LEN: usize = 32;

/// `start_block == EMPTY_BLOCK` means "no block allocated" (empty file, or a
/// directory that was created but never grown past its initial block... in
/// practice directories always get one block at creation, but files may not).
pub const EMPTY_BLOCK: i32 = -1;

#[derive(AsBytes, FromBytes, FromZeroes, Clone, Copy)]
#[repr(C, packed)]
struct RawFcb {
    name: [u8; NAME_LEN],
    size: u32,
    start_block: i32,
    create_time: f64,
    modify_time: f64,
    is_directory: u8,
    _reserved: [u8; 7],
}

static_assertions::const_assert_eq!(std::mem::size_of::<RawFcb>(), FCB_SIZE as usize);

/// An in-memory, ergonomic view of a directory entry. Converts to/from the
/// packed 64-byte on-disk form via `to_bytes`/`from_bytes`.
#[derive(Debug, Clone, PartialEq)]
pub struct Fcb {
    pub name: String,
    pub size: u32,
    pub start_block: i32,
    pub create_time: f64,
    pub modify_time: f64,
    pub is_directory: bool,
}

impl Fcb {
    pub fn new_file(name: impl Into<String>, size: u32, start_block: i32) -> Self {
        let now = now_secs();
        Self {
            name: name.into(),
            size,
            start_block,
            create_time: now,
            modify_time: now,
            is_directory: false,
        }
    }

    pub fn new_directory(name: impl Into<String>, start_block: i32) -> Self {
        let mut fcb = Self::new_file(name, 0, start_block);
        fcb.is_directory = true;
        fcb
    }

    pub fn to_bytes(&self) -> Result<[u8; FCB_SIZE as usize], FsError> {
        if self.name.is_empty() || self.name.len() > NAME_LEN {
            return Err(FsError::InvalidName {
                name: self.name.clone(),
                reason: "name must be 1-32 bytes",
            });
        }
        let mut name_buf = [0u8; NAME_LEN];
        name_buf[..self.name.len()].copy_from_slice(self.name.as_bytes());

        let raw = RawFcb {
            name: name_buf,
            size: self.size,
            start_block: self.start_block,
            create_time: self.create_time,
            modify_time: self.modify_time,
            is_directory: self.is_directory as u8,
            _reserved: [0; 7],
        };
        let mut out = [0u8; FCB_SIZE as usize];
        out.copy_from_slice(AsBytes::as_bytes(&raw));
        Ok(out)
    }

    /// Returns `None` for an all-zero (empty) slot, matching the Python
    /// `FCB.from_bytes`'s "all zero => empty" convention.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < FCB_SIZE as usize || data.iter().all(|&b| b == 0) {
            return None;
        }
        let raw = RawFcb::read_from_prefix(data)?;
        let nul = raw.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        let name = String::from_utf8_lossy(&raw.name[..nul]).trim().to_string();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name,
            size: raw.size,
            start_block: raw.start_block,
            create_time: raw.create_time,
            modify_time: raw.modify_time,
            is_directory: raw.is_directory != 0,
        })
    }

    pub fn touch_modified(&mut self) {
        self.modify_time = now_secs();
    }

    pub fn has_block(&self) -> bool {
        self.start_block != EMPTY_BLOCK
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let fcb = Fcb::new_file("hello.txt", 42, 100);
        let bytes = fcb.to_bytes().unwrap();
        let back = Fcb::from_bytes(&bytes).unwrap();
        assert_eq!(fcb.name, back.name);
        assert_eq!(fcb.size, back.size);
        assert_eq!(fcb.start_block, back.start_block);
        assert!(!back.is_directory);
    }

    #[test]
    fn all_zero_slot_is_empty() {
        let zero = [0u8; FCB_SIZE as usize];
        assert!(Fcb::from_bytes(&zero).is_none());
    }

    #[test]
    fn rejects_overlong_name() {
        let long_name = "x".repeat(40);
        let fcb = Fcb::new_file(long_name, 0, -1);
        assert!(matches!(fcb.to_bytes(), Err(FsError::InvalidName { .. })));
    }

    #[test]
    fn negative_start_block_round_trips() {
        let fcb = Fcb::new_directory("sub", EMPTY_BLOCK);
        let bytes = fcb.to_bytes().unwrap();
        let back = Fcb::from_bytes(&bytes).unwrap();
        assert_eq!(back.start_block, EMPTY_BLOCK);
        assert!(back.is_directory);
    }
}
