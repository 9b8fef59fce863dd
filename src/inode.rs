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

//! The inode record and the flat inode table.

use crate::device::Device;
use crate::layout::{INODES_NUM, INODES_PER_BLOCK, INODE_SIZE, SENTINEL};
use std::io;

/// The kind of file an inode describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// A directory.
    Dir,
    /// A regular file.
    File,
    /// No file: the inode is not in use.
    Invalid,
}

impl Kind {
    fn to_byte(self) -> u8 {
        match self {
            Kind::Dir => b'd',
            Kind::File => b'f',
            Kind::Invalid => b'n',
        }
    }

    fn from_byte(b: u8) -> Self {
        match b {
            b'd' => Kind::Dir,
            b'f' => Kind::File,
            _ => Kind::Invalid,
        }
    }
}

/// The length, in bytes, of the NUL-padded owner field.
const OWNER_LEN: usize = 8;
/// The number of block-pointer slots in an inode.
const I_BLOCK_SLOTS: usize = 9;

/// Index of the single-indirect pointer slot.
pub const SINGLE_INDIRECT_SLOT: usize = 6;
/// Index of the double-indirect pointer slot.
pub const DOUBLE_INDIRECT_SLOT: usize = 7;
/// Index of the (unused) triple-indirect pointer slot.
pub const TRIPLE_INDIRECT_SLOT: usize = 8;

/// An in-memory, unpacked view of a 64-byte on-disk inode record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    pub valid: bool,
    pub link_count: u8,
    pub size: u32,
    pub capacity: u32,
    pub mode: u16,
    pub kind: Kind,
    pub owner: [u8; OWNER_LEN],
    pub i_block: [u32; I_BLOCK_SLOTS],
}

impl Inode {
    /// An inode with no content, marked invalid.
    pub fn empty() -> Self {
        Inode {
            valid: false,
            link_count: 0,
            size: 0,
            capacity: 0,
            mode: 0,
            kind: Kind::Invalid,
            owner: [0; OWNER_LEN],
            i_block: [SENTINEL; I_BLOCK_SLOTS],
        }
    }

    /// Sets the owner field from a username, truncating to 8 bytes.
    pub fn set_owner(&mut self, user: &str) {
        self.owner = [0; OWNER_LEN];
        let bytes = user.as_bytes();
        let len = bytes.len().min(OWNER_LEN);
        self.owner[..len].copy_from_slice(&bytes[..len]);
    }

    /// Returns the owner field as a `&str`, stopping at the first NUL.
    pub fn owner_str(&self) -> &str {
        let len = self.owner.iter().position(|&b| b == 0).unwrap_or(OWNER_LEN);
        std::str::from_utf8(&self.owner[..len]).unwrap_or("")
    }

    /// Serializes the inode into a fixed `INODE_SIZE`-byte record.
    pub fn to_bytes(&self) -> [u8; INODE_SIZE] {
        let mut buf = [0u8; INODE_SIZE];
        buf[0] = self.valid as u8;
        buf[1] = self.link_count;
        buf[2..6].copy_from_slice(&self.size.to_le_bytes());
        buf[6..10].copy_from_slice(&self.capacity.to_le_bytes());
        buf[10..12].copy_from_slice(&self.mode.to_le_bytes());
        buf[12] = self.kind.to_byte();
        buf[13..13 + OWNER_LEN].copy_from_slice(&self.owner);
        let mut off = 13 + OWNER_LEN;
        for ptr in &self.i_block {
            buf[off..off + 4].copy_from_slice(&ptr.to_le_bytes());
            off += 4;
        }
        debug_assert!(off <= INODE_SIZE);
        buf
    }

    /// Deserializes an inode from a fixed `INODE_SIZE`-byte record.
    pub fn from_bytes(buf: &[u8; INODE_SIZE]) -> Self {
        let valid = buf[0] != 0;
        let link_count = buf[1];
        let size = u32::from_le_bytes(buf[2..6].try_into().unwrap());
        let capacity = u32::from_le_bytes(buf[6..10].try_into().unwrap());
        let mode = u16::from_le_bytes(buf[10..12].try_into().unwrap());
        let kind = Kind::from_byte(buf[12]);
        let mut owner = [0u8; OWNER_LEN];
        owner.copy_from_slice(&buf[13..13 + OWNER_LEN]);
        let mut off = 13 + OWNER_LEN;
        let mut i_block = [SENTINEL; I_BLOCK_SLOTS];
        for slot in i_block.iter_mut() {
            *slot = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
            off += 4;
        }
        Inode {
            valid,
            link_count,
            size,
            capacity,
            mode,
            kind,
            owner,
            i_block,
        }
    }
}

/// The flat, on-disk array of inodes.
pub struct Table {
    offset: u32,
}

impl Table {
    /// Creates a handle to the inode table starting at block `offset`.
    pub fn new(offset: u32) -> Self {
        Table { offset }
    }

    fn block_of(&self, index: u32) -> u32 {
        self.offset + index / INODES_PER_BLOCK
    }

    /// Reads inode `index` from `dev`.
    pub fn get(&self, index: u32, dev: &mut Device) -> io::Result<Inode> {
        debug_assert!(index < INODES_NUM);
        let block = dev.read_block(self.block_of(index))?;
        let slot = (index % INODES_PER_BLOCK) as usize;
        let start = slot * INODE_SIZE;
        let bytes: [u8; INODE_SIZE] = block[start..start + INODE_SIZE].try_into().unwrap();
        Ok(Inode::from_bytes(&bytes))
    }

    /// Writes `inode` to slot `index`, read-modify-writing the owning block.
    pub fn set(&self, index: u32, inode: &Inode, dev: &mut Device) -> io::Result<()> {
        debug_assert!(index < INODES_NUM);
        let block_id = self.block_of(index);
        let mut block = dev.read_block(block_id)?;
        let slot = (index % INODES_PER_BLOCK) as usize;
        let start = slot * INODE_SIZE;
        block[start..start + INODE_SIZE].copy_from_slice(&inode.to_bytes());
        dev.write_block(block_id, &block)
    }

    /// Writes every block of the inode table back. Every [`Table::set`]
    /// already writes through immediately, so this is a no-op kept for API
    /// symmetry with [`crate::bitmap::Bitmap::flush`].
    pub fn flush(&self, _dev: &mut Device) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn inode_round_trips_through_bytes() {
        let mut inode = Inode::empty();
        inode.valid = true;
        inode.link_count = 1;
        inode.size = 42;
        inode.capacity = 1024;
        inode.mode = 0o755;
        inode.kind = Kind::Dir;
        inode.set_owner("root");
        inode.i_block[0] = 123;
        let bytes = inode.to_bytes();
        let back = Inode::from_bytes(&bytes);
        assert_eq!(inode, back);
        assert_eq!(back.owner_str(), "root");
    }

    #[test]
    fn table_get_set_round_trips() {
        let tmp = NamedTempFile::new().unwrap();
        let mut dev = Device::format(tmp.path()).unwrap();
        let table = Table::new(10);
        let mut inode = Inode::empty();
        inode.valid = true;
        inode.kind = Kind::File;
        inode.set_owner("bob");
        table.set(5, &inode, &mut dev).unwrap();
        // A neighboring slot in the same block stays untouched.
        let neighbor = table.get(6, &mut dev).unwrap();
        assert!(!neighbor.valid);
        let back = table.get(5, &mut dev).unwrap();
        assert_eq!(back.owner_str(), "bob");
        assert_eq!(back.kind, Kind::File);
    }
}
