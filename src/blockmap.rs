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

//! Translation between an inode's flat list of data block ids and its
//! direct / single-indirect / double-indirect pointer tree.

use crate::bitmap::Bitmap;
use crate::device::{zeroed_block, Device};
use crate::error::{Error, Result};
use crate::inode::{Inode, DOUBLE_INDIRECT_SLOT, SINGLE_INDIRECT_SLOT};
use crate::layout::{DIRECT_PTRS, DOUBLE_INDIRECT_MAX, POINTERS_PER_BLOCK, SENTINEL};
use std::io;

fn read_pointers(block_id: u32, dev: &mut Device) -> io::Result<Vec<u32>> {
    let block = dev.read_block(block_id)?;
    Ok(block
        .chunks_exact(4)
        .take(POINTERS_PER_BLOCK as usize)
        .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
        .collect())
}

fn write_pointers(block_id: u32, pointers: &[u32], dev: &mut Device) -> io::Result<()> {
    let mut block = zeroed_block();
    for (i, ptr) in pointers.iter().enumerate() {
        let start = i * 4;
        block[start..start + 4].copy_from_slice(&ptr.to_le_bytes());
    }
    dev.write_block(block_id, &block)
}

/// Returns the full, ordered list of data block ids addressed by `inode`,
/// stopping at the first [`SENTINEL`] encountered at each tier.
pub fn blocks_of(inode: &Inode, dev: &mut Device) -> io::Result<Vec<u32>> {
    let mut out = Vec::new();

    for slot in 0..DIRECT_PTRS as usize {
        let ptr = inode.i_block[slot];
        if ptr == SENTINEL {
            return Ok(out);
        }
        out.push(ptr);
    }

    let single = inode.i_block[SINGLE_INDIRECT_SLOT];
    if single == SENTINEL {
        return Ok(out);
    }
    for ptr in read_pointers(single, dev)? {
        if ptr == SENTINEL {
            return Ok(out);
        }
        out.push(ptr);
    }

    let double = inode.i_block[DOUBLE_INDIRECT_SLOT];
    if double == SENTINEL {
        return Ok(out);
    }
    for indirect_id in read_pointers(double, dev)? {
        if indirect_id == SENTINEL {
            return Ok(out);
        }
        for ptr in read_pointers(indirect_id, dev)? {
            if ptr == SENTINEL {
                return Ok(out);
            }
            out.push(ptr);
        }
    }

    Ok(out)
}

fn no_space() -> Error {
    Error::Io(io::Error::new(io::ErrorKind::Other, "no free blocks remaining"))
}

fn free_indirect_structure(inode: &Inode, dev: &mut Device, bitmap: &mut Bitmap) -> io::Result<()> {
    let single = inode.i_block[SINGLE_INDIRECT_SLOT];
    if single != SENTINEL {
        bitmap.free(single);
    }
    let double = inode.i_block[DOUBLE_INDIRECT_SLOT];
    if double != SENTINEL {
        for indirect_id in read_pointers(double, dev)? {
            if indirect_id == SENTINEL {
                break;
            }
            bitmap.free(indirect_id);
        }
        bitmap.free(double);
    }
    Ok(())
}

/// Rewrites `inode`'s pointer tree so it addresses exactly `blocks`,
/// allocating whatever single- and double-indirect structure blocks are
/// needed from `bitmap` and freeing whichever ones it previously held.
///
/// This only manages the pointer tree; the data blocks themselves must
/// already be allocated or freed by the caller.
pub fn set_blocks(
    inode: &mut Inode,
    blocks: &[u32],
    dev: &mut Device,
    bitmap: &mut Bitmap,
) -> Result<()> {
    if blocks.len() as u32 > DOUBLE_INDIRECT_MAX {
        return Err(Error::Exceeded);
    }

    free_indirect_structure(inode, dev, bitmap)?;
    inode.i_block[SINGLE_INDIRECT_SLOT] = SENTINEL;
    inode.i_block[DOUBLE_INDIRECT_SLOT] = SENTINEL;

    let direct_n = blocks.len().min(DIRECT_PTRS as usize);
    for slot in 0..DIRECT_PTRS as usize {
        inode.i_block[slot] = if slot < direct_n {
            blocks[slot]
        } else {
            SENTINEL
        };
    }
    if blocks.len() <= DIRECT_PTRS as usize {
        return Ok(());
    }

    let rest = &blocks[DIRECT_PTRS as usize..];
    let single_n = rest.len().min(POINTERS_PER_BLOCK as usize);
    let single_id = bitmap.allocate().ok_or_else(no_space)?;
    let mut single_ptrs = vec![SENTINEL; POINTERS_PER_BLOCK as usize];
    single_ptrs[..single_n].copy_from_slice(&rest[..single_n]);
    write_pointers(single_id, &single_ptrs, dev)?;
    inode.i_block[SINGLE_INDIRECT_SLOT] = single_id;

    if rest.len() <= POINTERS_PER_BLOCK as usize {
        return Ok(());
    }

    let rest2 = &rest[POINTERS_PER_BLOCK as usize..];
    let n_groups = (rest2.len() + POINTERS_PER_BLOCK as usize - 1) / POINTERS_PER_BLOCK as usize;
    let mut index_ptrs = vec![SENTINEL; POINTERS_PER_BLOCK as usize];
    for group in 0..n_groups {
        let start = group * POINTERS_PER_BLOCK as usize;
        let end = (start + POINTERS_PER_BLOCK as usize).min(rest2.len());
        let chunk = &rest2[start..end];
        let indirect_id = bitmap.allocate().ok_or_else(no_space)?;
        let mut ptrs = vec![SENTINEL; POINTERS_PER_BLOCK as usize];
        ptrs[..chunk.len()].copy_from_slice(chunk);
        write_pointers(indirect_id, &ptrs, dev)?;
        index_ptrs[group] = indirect_id;
    }
    let double_id = bitmap.allocate().ok_or_else(no_space)?;
    write_pointers(double_id, &index_ptrs, dev)?;
    inode.i_block[DOUBLE_INDIRECT_SLOT] = double_id;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::inode::Inode;
    use tempfile::NamedTempFile;

    fn harness() -> (Device, Bitmap) {
        let tmp = NamedTempFile::new().unwrap();
        let mut dev = Device::format(tmp.path()).unwrap();
        let bitmap = Bitmap::create(4096, 50, &mut dev).unwrap();
        (dev, bitmap)
    }

    #[test]
    fn direct_only_round_trips() {
        let (mut dev, mut bitmap) = harness();
        let mut inode = Inode::empty();
        set_blocks(&mut inode, &[100, 101, 102], &mut dev, &mut bitmap).unwrap();
        assert_eq!(blocks_of(&inode, &mut dev).unwrap(), vec![100, 101, 102]);
    }

    #[test]
    fn single_indirect_round_trips() {
        let (mut dev, mut bitmap) = harness();
        let mut inode = Inode::empty();
        let blocks: Vec<u32> = (200..210).collect();
        set_blocks(&mut inode, &blocks, &mut dev, &mut bitmap).unwrap();
        assert_eq!(blocks_of(&inode, &mut dev).unwrap(), blocks);
        assert_ne!(inode.i_block[SINGLE_INDIRECT_SLOT], SENTINEL);
    }

    #[test]
    fn double_indirect_round_trips() {
        let (mut dev, mut bitmap) = harness();
        let mut inode = Inode::empty();
        let n = DIRECT_PTRS as usize + POINTERS_PER_BLOCK as usize + 5;
        let blocks: Vec<u32> = (1000..1000 + n as u32).collect();
        set_blocks(&mut inode, &blocks, &mut dev, &mut bitmap).unwrap();
        assert_eq!(blocks_of(&inode, &mut dev).unwrap(), blocks);
        assert_ne!(inode.i_block[DOUBLE_INDIRECT_SLOT], SENTINEL);
    }

    #[test]
    fn shrinking_frees_the_single_indirect_block() {
        let (mut dev, mut bitmap) = harness();
        let mut inode = Inode::empty();
        let blocks: Vec<u32> = (200..210).collect();
        set_blocks(&mut inode, &blocks, &mut dev, &mut bitmap).unwrap();
        let before = bitmap.count();
        set_blocks(&mut inode, &[200, 201], &mut dev, &mut bitmap).unwrap();
        assert!(bitmap.count() < before);
        assert_eq!(inode.i_block[SINGLE_INDIRECT_SLOT], SENTINEL);
    }

    #[test]
    fn exceeding_double_indirect_capacity_is_rejected() {
        let (mut dev, mut bitmap) = harness();
        let mut inode = Inode::empty();
        let n = DOUBLE_INDIRECT_MAX + 1;
        let blocks: Vec<u32> = vec![1; n as usize];
        assert!(matches!(
            set_blocks(&mut inode, &blocks, &mut dev, &mut bitmap),
            Err(Error::Exceeded)
        ));
    }
}
