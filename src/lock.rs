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

//! Advisory read/write locks, materialised as files under `/usr/lock`.

use crate::error::{Error, Result};
use crate::fs::Filesystem;

const LOCK_DIR: &str = "/usr/lock";

fn wlock_name(inode_id: u32) -> String {
    format!("{inode_id}.wlock")
}

fn rlock_name(inode_id: u32) -> String {
    format!("{inode_id}.rlock")
}

/// Acquires a write lock on `inode_id`. Fails if a read or write lock is
/// already held by anyone.
pub fn acquire_write(fs: &mut Filesystem, inode_id: u32) -> Result<()> {
    let dir = fs.resolve_from(&fs.root_entry(), LOCK_DIR)?;
    if fs.child(&dir, &wlock_name(inode_id))?.is_some()
        || fs.child(&dir, &rlock_name(inode_id))?.is_some()
    {
        return Err(Error::Locked);
    }
    fs.create_file(&dir, &wlock_name(inode_id), "root")
}

/// Releases the write lock on `inode_id`.
pub fn release_write(fs: &mut Filesystem, inode_id: u32) -> Result<()> {
    let dir = fs.resolve_from(&fs.root_entry(), LOCK_DIR)?;
    fs.remove_file(&dir, &wlock_name(inode_id))
}

/// Acquires a read lock on `inode_id`, incrementing the reader count if one
/// is already held. Fails if a write lock is held.
pub fn acquire_read(fs: &mut Filesystem, inode_id: u32) -> Result<()> {
    let dir = fs.resolve_from(&fs.root_entry(), LOCK_DIR)?;
    if let Some(entry) = fs.child(&dir, &rlock_name(inode_id))? {
        let count = read_count(fs, &entry)?;
        fs.write_data(&entry, format!("{}", count + 1).as_bytes())?;
        return Ok(());
    }
    if fs.child(&dir, &wlock_name(inode_id))?.is_some() {
        return Err(Error::Locked);
    }
    fs.create_file(&dir, &rlock_name(inode_id), "root")?;
    let entry = fs
        .child(&dir, &rlock_name(inode_id))?
        .expect("just created");
    fs.write_data(&entry, b"1")
}

/// Releases one reader of the read lock on `inode_id`, deleting the lock
/// file once the count reaches zero.
pub fn release_read(fs: &mut Filesystem, inode_id: u32) -> Result<()> {
    let dir = fs.resolve_from(&fs.root_entry(), LOCK_DIR)?;
    let entry = match fs.child(&dir, &rlock_name(inode_id))? {
        Some(e) => e,
        None => return Ok(()),
    };
    let count = read_count(fs, &entry)?;
    if count <= 1 {
        fs.remove_file(&dir, &rlock_name(inode_id))
    } else {
        fs.write_data(&entry, format!("{}", count - 1).as_bytes())
    }
}

fn read_count(fs: &mut Filesystem, entry: &crate::dirent::Entry) -> Result<u32> {
    let bytes = fs.read_data(entry)?;
    Ok(String::from_utf8_lossy(&bytes).trim().parse().unwrap_or(0))
}
