/*
 * Copyright 2026 The Simdisk Authors
 *
 * This file is part of Simdisk.
 *
 * Simdisk is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Simdisk is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Simdisk. If not, see <https://www.gnu.org/licenses/>.
 */

//! The block device: a fixed-size random-access byte store backed by a host
//! file, partitioned into [`BLOCK_SIZE`]-byte blocks.

use crate::layout::{BLOCKS_NUM, BLOCK_SIZE};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A single on-disk block, as an opaque byte buffer.
///
/// Every typed view of a block (superblock, inode array, entry array,
/// pointer array, bitmap bytes) is obtained by reinterpreting this buffer on
/// demand; none of them own storage of their own.
pub type Block = [u8; BLOCK_SIZE];

/// Returns a zeroed block.
pub fn zeroed_block() -> Block {
    [0u8; BLOCK_SIZE]
}

/// The backing host file for a disk image.
pub struct Device {
    file: File,
}

impl Device {
    /// Creates a new image at `path`, exactly `BLOCKS_NUM * BLOCK_SIZE` bytes
    /// of zeros, and opens it.
    pub fn format(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len((BLOCKS_NUM as u64) * (BLOCK_SIZE as u64))?;
        Ok(Device { file })
    }

    /// Opens an existing image at `path`.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Device { file })
    }

    /// Reads block `id` from the image.
    pub fn read_block(&mut self, id: u32) -> io::Result<Block> {
        debug_assert!(id < BLOCKS_NUM, "block id {id} out of range");
        let mut block = zeroed_block();
        self.file
            .seek(SeekFrom::Start((id as u64) * (BLOCK_SIZE as u64)))?;
        self.file.read_exact(&mut block)?;
        Ok(block)
    }

    /// Writes `block` to block `id` of the image.
    pub fn write_block(&mut self, id: u32, block: &Block) -> io::Result<()> {
        debug_assert!(id < BLOCKS_NUM, "block id {id} out of range");
        self.file
            .seek(SeekFrom::Start((id as u64) * (BLOCK_SIZE as u64)))?;
        self.file.write_all(block)?;
        self.file.flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn format_creates_zeroed_image_of_exact_size() {
        let tmp = NamedTempFile::new().unwrap();
        let mut dev = Device::format(tmp.path()).unwrap();
        let meta = std::fs::metadata(tmp.path()).unwrap();
        assert_eq!(meta.len(), (BLOCKS_NUM as u64) * (BLOCK_SIZE as u64));
        assert_eq!(dev.read_block(0).unwrap(), zeroed_block());
    }

    #[test]
    fn write_then_read_round_trips() {
        let tmp = NamedTempFile::new().unwrap();
        let mut dev = Device::format(tmp.path()).unwrap();
        let mut block = zeroed_block();
        block[0] = 0xaa;
        block[BLOCK_SIZE - 1] = 0x55;
        dev.write_block(42, &block).unwrap();
        assert_eq!(dev.read_block(42).unwrap(), block);
        // Unrelated blocks stay untouched.
        assert_eq!(dev.read_block(41).unwrap(), zeroed_block());
    }
}
