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

//! The filesystem engine: namespace resolution, directory and file
//! operations, permissions, and the user database.

use crate::bitmap::Bitmap;
use crate::blockmap;
use crate::device::{zeroed_block, Device};
use crate::dirent::{self, Entry, ENTRY_SIZE};
use crate::error::{Error, Result};
use crate::inode::{Inode, Kind, Table};
use crate::layout::{BLOCKS_NUM, BLOCK_SIZE, INODES_NUM, MAGIC_NUMBER, MAX_NAME};
use crate::layout::Layout;
use crate::lock;
use crate::wire::Opt;
use std::collections::HashMap;
use std::io;
use std::path::Path;

/// Owner-or-other read bit.
pub const READ: u16 = 0b100;
/// Owner-or-other write bit.
pub const WRITE: u16 = 0b010;
/// Owner-or-other execute bit.
pub const EXEC: u16 = 0b001;

fn no_space() -> Error {
    Error::Io(io::Error::new(io::ErrorKind::Other, "no free blocks remaining"))
}

fn bad_request(msg: &str) -> Error {
    Error::Io(io::Error::new(io::ErrorKind::InvalidInput, msg.to_string()))
}

/// The live filesystem engine, owning the backing device, the two bitmaps,
/// the inode table, and the in-memory user database.
pub struct Filesystem {
    dev: Device,
    block_bitmap: Bitmap,
    inode_bitmap: Bitmap,
    inodes: Table,
    layout: Layout,
    root_inode: u32,
    users: HashMap<String, String>,
}

impl Filesystem {
    /// Creates a fresh image at `path`: superblock, bitmaps, inode table,
    /// root directory, and the canonical bootstrap subtree.
    pub fn format(path: impl AsRef<Path>) -> Result<Self> {
        let mut dev = Device::format(&path)?;
        let layout = Layout::standard();
        let mut block_bitmap = Bitmap::create(BLOCKS_NUM, layout.block_bitmap_start, &mut dev)?;
        block_bitmap.mark_used_range(layout.data_start);
        let mut inode_bitmap = Bitmap::create(INODES_NUM, layout.inode_bitmap_start, &mut dev)?;
        let inodes = Table::new(layout.inode_table_start);

        let root_inode_id = inode_bitmap.allocate().expect("fresh inode bitmap has room");
        let root_block = block_bitmap.allocate().expect("fresh block bitmap has room");

        let mut root_inode = Inode::empty();
        root_inode.valid = true;
        root_inode.link_count = 1;
        root_inode.kind = Kind::Dir;
        root_inode.mode = 0o755;
        root_inode.set_owner("root");
        root_inode.i_block[0] = root_block;
        root_inode.capacity = BLOCK_SIZE as u32;
        root_inode.size = 2 * ENTRY_SIZE as u32;
        inodes.set(root_inode_id, &root_inode, &mut dev)?;

        let mut block = zeroed_block();
        dirent::set_entry(&mut block, 0, &Entry::new(".", root_inode_id));
        dirent::set_entry(&mut block, 1, &Entry::new("..", root_inode_id));
        dev.write_block(root_block, &block)?;

        block_bitmap.flush(&mut dev)?;
        inode_bitmap.flush(&mut dev)?;

        let mut fs = Filesystem {
            dev,
            block_bitmap,
            inode_bitmap,
            inodes,
            layout,
            root_inode: root_inode_id,
            users: HashMap::new(),
        };
        fs.write_superblock(root_block)?;

        let root = fs.root_entry();
        for name in ["home", "lost+found", "proc", "root", "usr"] {
            fs.make_directory(&root, name, "root")?;
        }
        let root_home = fs.resolve_from(&root, "root")?;
        fs.chmod(&root_home, "o-rwx")?;

        let usr = fs.resolve_from(&root, "usr")?;
        fs.make_directory(&usr, "lock", "root")?;
        fs.create_file(&usr, "user.log", "root")?;
        let user_log = fs.resolve_from(&usr, "user.log")?;
        fs.write_whole(
            &user_log,
            b"username    password\n    root        root\n",
            "root",
        )?;
        fs.users.insert("root".to_string(), "root".to_string());

        fs.chmod(&root, "a-w")?;
        Ok(fs)
    }

    /// Opens an existing image at `path`, rebuilding bitmap counters and the
    /// user database from persisted state.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut dev = Device::open(&path)?;
        let layout = Layout::standard();
        let root_inode = Self::read_superblock(&mut dev)?;
        let block_bitmap = Bitmap::load(BLOCKS_NUM, layout.block_bitmap_start, &mut dev)?;
        let inode_bitmap = Bitmap::load(INODES_NUM, layout.inode_bitmap_start, &mut dev)?;
        let inodes = Table::new(layout.inode_table_start);
        let mut fs = Filesystem {
            dev,
            block_bitmap,
            inode_bitmap,
            inodes,
            layout,
            root_inode,
            users: HashMap::new(),
        };

        let root = fs.root_entry();
        if let Ok(user_log) = fs.resolve_from(&root, "/usr/user.log") {
            let content = fs.read_data(&user_log)?;
            for line in String::from_utf8_lossy(&content).lines().skip(1) {
                let mut parts = line.split_whitespace();
                if let (Some(u), Some(p)) = (parts.next(), parts.next()) {
                    fs.users.insert(u.to_string(), p.to_string());
                }
            }
        }
        Ok(fs)
    }

    fn write_superblock(&mut self, root_block: u32) -> Result<()> {
        let mut block = zeroed_block();
        block[0..4].copy_from_slice(&MAGIC_NUMBER.to_le_bytes());
        block[4..8].copy_from_slice(&BLOCKS_NUM.to_le_bytes());
        block[8..12].copy_from_slice(&INODES_NUM.to_le_bytes());
        block[12..16].copy_from_slice(&(BLOCK_SIZE as u32).to_le_bytes());
        block[16..20].copy_from_slice(&(crate::layout::INODE_SIZE as u32).to_le_bytes());
        block[20..24].copy_from_slice(&self.layout.block_bitmap_len().to_le_bytes());
        block[24..28].copy_from_slice(&self.layout.inode_bitmap_len().to_le_bytes());
        block[28..32].copy_from_slice(&self.layout.inode_table_len().to_le_bytes());
        block[32..36].copy_from_slice(&root_block.to_le_bytes());
        block[36..40].copy_from_slice(&self.root_inode.to_le_bytes());
        self.dev.write_block(0, &block)?;
        Ok(())
    }

    fn read_superblock(dev: &mut Device) -> Result<u32> {
        let block = dev.read_block(0)?;
        let magic = u32::from_le_bytes(block[0..4].try_into().unwrap());
        if magic != MAGIC_NUMBER {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                "not a simdisk image",
            )));
        }
        Ok(u32::from_le_bytes(block[36..40].try_into().unwrap()))
    }

    /// The root directory entry, `"/"`.
    pub fn root_entry(&self) -> Entry {
        Entry::new("/", self.root_inode)
    }

    /// Reads inode `id`.
    pub fn inode_of(&mut self, id: u32) -> Result<Inode> {
        Ok(self.inodes.get(id, &mut self.dev)?)
    }

    /// "functioning properly" health check, matching the reference's static
    /// response.
    pub fn check(&self) -> &'static str {
        "simdisk is functioning properly"
    }

    /// The live population of the block bitmap.
    pub fn block_bitmap_count(&self) -> u32 {
        self.block_bitmap.count()
    }

    /// The live population of the inode bitmap.
    pub fn inode_bitmap_count(&self) -> u32 {
        self.inode_bitmap.count()
    }

    // ---- namespace resolution ----------------------------------------

    fn rewrite_tilde(path: &str) -> String {
        match path.strip_prefix('~') {
            Some(rest) => format!("/home{rest}"),
            None => path.to_string(),
        }
    }

    /// Resolves `path` starting from the session's root entry (if absolute
    /// or tilde-prefixed) or its current entry (if relative).
    pub fn resolve(&mut self, session: &crate::session::Session, path: &str) -> Result<Entry> {
        let rewritten = Self::rewrite_tilde(path);
        let start = if rewritten.starts_with('/') {
            session.root_entry.clone()
        } else {
            session.current_entry.clone()
        };
        self.resolve_from(&start, &rewritten)
    }

    /// Resolves `path` starting from `start`, walking `.`/`..`/named
    /// components through real directory entries.
    pub fn resolve_from(&mut self, start: &Entry, path: &str) -> Result<Entry> {
        let rewritten = Self::rewrite_tilde(path);
        let mut cur = start.clone();
        for comp in rewritten.split('/').filter(|s| !s.is_empty()) {
            cur = self.child(&cur, comp)?.ok_or(Error::FileNotFound)?;
        }
        Ok(cur)
    }

    /// Splits `path` into `(parent_dir_path, leaf_name)`.
    pub fn split_path_and_name(path: &str) -> (String, String) {
        if path.is_empty() {
            return ("..".to_string(), ".".to_string());
        }
        let trimmed = path.strip_suffix('/').unwrap_or(path);
        if trimmed.is_empty() {
            return ("/".to_string(), ".".to_string());
        }
        match trimmed.rfind('/') {
            Some(0) => ("/".to_string(), trimmed[1..].to_string()),
            Some(i) => (trimmed[..i].to_string(), trimmed[i + 1..].to_string()),
            None => (".".to_string(), trimmed.to_string()),
        }
    }

    /// Looks up `name` among `dir`'s entries, including `.` and `..`.
    pub fn child(&mut self, dir: &Entry, name: &str) -> Result<Option<Entry>> {
        let inode = self.inodes.get(dir.inode_id, &mut self.dev)?;
        if inode.kind != Kind::Dir {
            return Ok(None);
        }
        let blocks = blockmap::blocks_of(&inode, &mut self.dev)?;
        for block_id in blocks {
            let block = self.dev.read_block(block_id)?;
            for e in dirent::entries_of(&block) {
                if e.valid && e.name == name {
                    return Ok(Some(e));
                }
            }
        }
        Ok(None)
    }

    fn append_child_entry(&mut self, dir_id: u32, entry: &Entry) -> Result<()> {
        let mut inode = self.inodes.get(dir_id, &mut self.dev)?;
        let mut blocks = blockmap::blocks_of(&inode, &mut self.dev)?;

        for &block_id in &blocks {
            let mut block = self.dev.read_block(block_id)?;
            let entries = dirent::entries_of(&block);
            if let Some(slot) = entries.iter().position(|e| !e.valid) {
                dirent::set_entry(&mut block, slot, entry);
                self.dev.write_block(block_id, &block)?;
                inode.size += ENTRY_SIZE as u32;
                self.inodes.set(dir_id, &inode, &mut self.dev)?;
                return Ok(());
            }
        }

        let new_block = self.block_bitmap.allocate().ok_or_else(no_space)?;
        let mut block = zeroed_block();
        dirent::set_entry(&mut block, 0, entry);
        self.dev.write_block(new_block, &block)?;
        blocks.push(new_block);
        blockmap::set_blocks(&mut inode, &blocks, &mut self.dev, &mut self.block_bitmap)?;
        inode.size += ENTRY_SIZE as u32;
        inode.capacity += BLOCK_SIZE as u32;
        self.inodes.set(dir_id, &inode, &mut self.dev)?;
        self.block_bitmap.flush(&mut self.dev)?;
        Ok(())
    }

    fn remove_child_entry(&mut self, dir_id: u32, name: &str) -> Result<()> {
        let mut inode = self.inodes.get(dir_id, &mut self.dev)?;
        let blocks = blockmap::blocks_of(&inode, &mut self.dev)?;
        for block_id in blocks {
            let mut block = self.dev.read_block(block_id)?;
            let entries = dirent::entries_of(&block);
            if let Some(slot) = entries.iter().position(|e| e.valid && e.name == name) {
                dirent::set_entry(&mut block, slot, &Entry::empty());
                self.dev.write_block(block_id, &block)?;
                inode.size = inode.size.saturating_sub(ENTRY_SIZE as u32);
                self.inodes.set(dir_id, &inode, &mut self.dev)?;
                return Ok(());
            }
        }
        Err(Error::FileNotFound)
    }

    // ---- directory operations -----------------------------------------

    /// Creates directory `name` under `parent`, owned by `user`.
    pub fn make_directory(&mut self, parent: &Entry, name: &str, user: &str) -> Result<()> {
        if name.len() > MAX_NAME {
            return Err(Error::Exceeded);
        }
        if self.child(parent, name)?.is_some() {
            return Err(Error::Exists);
        }
        let new_id = self.inode_bitmap.allocate().ok_or_else(no_space)?;
        let data_block = self.block_bitmap.allocate().ok_or_else(no_space)?;

        let mut inode = Inode::empty();
        inode.valid = true;
        inode.link_count = 1;
        inode.kind = Kind::Dir;
        inode.mode = 0o755;
        inode.set_owner(user);
        inode.i_block[0] = data_block;
        inode.capacity = BLOCK_SIZE as u32;
        inode.size = 2 * ENTRY_SIZE as u32;
        self.inodes.set(new_id, &inode, &mut self.dev)?;

        let mut block = zeroed_block();
        dirent::set_entry(&mut block, 0, &Entry::new(".", new_id));
        dirent::set_entry(&mut block, 1, &Entry::new("..", parent.inode_id));
        self.dev.write_block(data_block, &block)?;

        self.append_child_entry(parent.inode_id, &Entry::new(name, new_id))?;
        self.inode_bitmap.flush(&mut self.dev)?;
        self.block_bitmap.flush(&mut self.dev)?;
        Ok(())
    }

    /// Removes directory `name` under `parent`. Non-empty directories
    /// require `option == Opt::Response` to confirm, otherwise returns
    /// `Error::WaitRequest`.
    pub fn remove_directory(&mut self, parent: &Entry, name: &str, option: Opt) -> Result<()> {
        let target = self.child(parent, name)?.ok_or(Error::FileNotFound)?;
        let inode = self.inodes.get(target.inode_id, &mut self.dev)?;
        if inode.kind != Kind::Dir {
            return Err(Error::FileNotMatch);
        }
        if inode.size > 2 * ENTRY_SIZE as u32 && option != Opt::Response {
            return Err(Error::WaitRequest);
        }
        self.remove_subtree(target.inode_id)?;
        self.free_inode(target.inode_id)?;
        self.remove_child_entry(parent.inode_id, name)?;
        Ok(())
    }

    fn remove_subtree(&mut self, dir_id: u32) -> Result<()> {
        let inode = self.inodes.get(dir_id, &mut self.dev)?;
        let blocks = blockmap::blocks_of(&inode, &mut self.dev)?;
        let mut children = Vec::new();
        for block_id in blocks {
            let block = self.dev.read_block(block_id)?;
            for e in dirent::entries_of(&block) {
                if e.valid && e.name != "." && e.name != ".." {
                    children.push(e);
                }
            }
        }
        for child in children {
            let child_inode = self.inodes.get(child.inode_id, &mut self.dev)?;
            if child_inode.kind == Kind::Dir {
                self.remove_subtree(child.inode_id)?;
            }
            self.free_inode(child.inode_id)?;
        }
        Ok(())
    }

    fn free_inode(&mut self, inode_id: u32) -> Result<()> {
        let mut inode = self.inodes.get(inode_id, &mut self.dev)?;
        let data_blocks = blockmap::blocks_of(&inode, &mut self.dev)?;
        for b in data_blocks {
            self.block_bitmap.free(b);
        }
        blockmap::set_blocks(&mut inode, &[], &mut self.dev, &mut self.block_bitmap)?;
        self.inode_bitmap.free(inode_id);
        inode.valid = false;
        inode.kind = Kind::Invalid;
        self.inodes.set(inode_id, &inode, &mut self.dev)?;
        self.block_bitmap.flush(&mut self.dev)?;
        self.inode_bitmap.flush(&mut self.dev)?;
        Ok(())
    }

    /// Lists `entry`: its children (one per line or space-joined) if it is a
    /// directory and `dirs_only` is false, otherwise just its own stat line.
    /// Names beginning with `.` are hidden.
    pub fn list(&mut self, entry: &Entry, long: bool, dirs_only: bool) -> Result<String> {
        let inode = self.inodes.get(entry.inode_id, &mut self.dev)?;
        if inode.kind == Kind::File || dirs_only {
            return Ok(self.stat_line(entry, &inode, long));
        }
        let blocks = blockmap::blocks_of(&inode, &mut self.dev)?;
        let mut lines = Vec::new();
        for block_id in blocks {
            let block = self.dev.read_block(block_id)?;
            for e in dirent::entries_of(&block) {
                if e.valid && !e.name.starts_with('.') {
                    let child_inode = self.inodes.get(e.inode_id, &mut self.dev)?;
                    lines.push(if long {
                        self.stat_line(&e, &child_inode, true)
                    } else {
                        e.name.clone()
                    });
                }
            }
        }
        Ok(lines.join(if long { "\n" } else { "  " }))
    }

    fn stat_line(&self, entry: &Entry, inode: &Inode, long: bool) -> String {
        if !long {
            return entry.name.clone();
        }
        let first_block_addr = inode.i_block[0] as u64 * BLOCK_SIZE as u64;
        format!(
            "{}{} {:>8} 0x{:07x} {:>10} {:>10} {}",
            match inode.kind {
                Kind::Dir => 'd',
                Kind::File => '-',
                Kind::Invalid => '?',
            },
            mode_str(inode.mode),
            inode.owner_str(),
            first_block_addr,
            inode.size,
            inode.capacity,
            entry.name,
        )
    }

    // ---- file operations -----------------------------------------------

    /// Creates file `name` under `parent`, owned by `user`.
    pub fn create_file(&mut self, parent: &Entry, name: &str, user: &str) -> Result<()> {
        if name.len() > MAX_NAME {
            return Err(Error::Exceeded);
        }
        if self.child(parent, name)?.is_some() {
            return Err(Error::Exists);
        }
        let new_id = self.inode_bitmap.allocate().ok_or_else(no_space)?;
        let data_block = self.block_bitmap.allocate().ok_or_else(no_space)?;

        let mut inode = Inode::empty();
        inode.valid = true;
        inode.link_count = 1;
        inode.kind = Kind::File;
        inode.mode = 0o644;
        inode.set_owner(user);
        inode.i_block[0] = data_block;
        inode.capacity = BLOCK_SIZE as u32;
        inode.size = 0;
        self.inodes.set(new_id, &inode, &mut self.dev)?;
        self.dev.write_block(data_block, &zeroed_block())?;

        self.append_child_entry(parent.inode_id, &Entry::new(name, new_id))?;
        self.inode_bitmap.flush(&mut self.dev)?;
        self.block_bitmap.flush(&mut self.dev)?;
        Ok(())
    }

    /// Removes file `name` under `parent`.
    pub fn remove_file(&mut self, parent: &Entry, name: &str) -> Result<()> {
        let target = self.child(parent, name)?.ok_or(Error::FileNotFound)?;
        let inode = self.inodes.get(target.inode_id, &mut self.dev)?;
        if inode.kind != Kind::File {
            return Err(Error::FileNotMatch);
        }
        self.free_inode(target.inode_id)?;
        self.remove_child_entry(parent.inode_id, name)?;
        Ok(())
    }

    /// Reads the whole content of file `entry`, without any permission or
    /// lock check (callers that need one compose it themselves, e.g. `cat`
    /// via [`crate::lock`]).
    pub fn read_whole(&mut self, entry: &Entry) -> Result<Vec<u8>> {
        let inode = self.inodes.get(entry.inode_id, &mut self.dev)?;
        if inode.kind != Kind::File {
            return Err(Error::FileNotMatch);
        }
        self.read_data(entry)
    }

    /// Low-level read: concatenates every data block and truncates to
    /// `inode.size`, with no kind/permission/lock checks.
    pub(crate) fn read_data(&mut self, entry: &Entry) -> Result<Vec<u8>> {
        let inode = self.inodes.get(entry.inode_id, &mut self.dev)?;
        let blocks = blockmap::blocks_of(&inode, &mut self.dev)?;
        let mut buf = Vec::with_capacity(blocks.len() * BLOCK_SIZE);
        for block_id in blocks {
            buf.extend_from_slice(&self.dev.read_block(block_id)?);
        }
        buf.truncate(inode.size as usize);
        Ok(buf)
    }

    /// Overwrites the whole content of file `entry` with `bytes`. Checks
    /// write permission for `user` and brackets the write with the advisory
    /// write lock.
    pub fn write_whole(&mut self, entry: &Entry, bytes: &[u8], user: &str) -> Result<()> {
        let inode = self.inodes.get(entry.inode_id, &mut self.dev)?;
        if inode.kind != Kind::File {
            return Err(Error::FileNotMatch);
        }
        self.check_perm(&inode, user, WRITE)?;
        lock::acquire_write(self, entry.inode_id)?;
        let result = self.write_data(entry, bytes);
        lock::release_write(self, entry.inode_id)?;
        result
    }

    /// Low-level write: grows or shrinks the block allocation to fit
    /// `bytes`, writes the payload, and updates `size`/`capacity`, with no
    /// permission/lock check.
    pub(crate) fn write_data(&mut self, entry: &Entry, bytes: &[u8]) -> Result<()> {
        let mut inode = self.inodes.get(entry.inode_id, &mut self.dev)?;
        let needed_n = ((bytes.len() + BLOCK_SIZE - 1) / BLOCK_SIZE).max(1);
        let mut blocks = blockmap::blocks_of(&inode, &mut self.dev)?;

        if needed_n > blocks.len() {
            for _ in 0..(needed_n - blocks.len()) {
                blocks.push(self.block_bitmap.allocate().ok_or_else(no_space)?);
            }
        } else if needed_n < blocks.len() {
            for b in blocks.split_off(needed_n) {
                self.block_bitmap.free(b);
            }
        }
        blockmap::set_blocks(&mut inode, &blocks, &mut self.dev, &mut self.block_bitmap)?;

        for (i, block_id) in blocks.iter().enumerate() {
            let start = i * BLOCK_SIZE;
            let end = (start + BLOCK_SIZE).min(bytes.len());
            let mut block = zeroed_block();
            if start < bytes.len() {
                block[..end - start].copy_from_slice(&bytes[start..end]);
            }
            self.dev.write_block(*block_id, &block)?;
        }

        inode.size = bytes.len() as u32;
        inode.capacity = blocks.len() as u32 * BLOCK_SIZE as u32;
        self.inodes.set(entry.inode_id, &inode, &mut self.dev)?;
        self.block_bitmap.flush(&mut self.dev)?;
        Ok(())
    }

    // ---- permissions ----------------------------------------------------

    /// Checks whether `user` has `bit` permission on `inode`: the owner's
    /// bits if `user` owns it, otherwise the "other" bits. Group bits are
    /// maintained but never consulted.
    pub fn check_perm(&self, inode: &Inode, user: &str, bit: u16) -> Result<()> {
        let is_owner = inode.owner_str() == user;
        let shift = if is_owner { 6 } else { 0 };
        if (inode.mode >> shift) & bit != 0 {
            Ok(())
        } else {
            Err(Error::PermissionDenied)
        }
    }

    /// Applies a `chmod`-style expression `[augo][+-][rwx]+` to `entry`.
    pub fn chmod(&mut self, entry: &Entry, expr: &str) -> Result<()> {
        let mut inode = self.inodes.get(entry.inode_id, &mut self.dev)?;
        let mut chars = expr.chars();
        let group = chars.next().ok_or_else(|| bad_request("empty chmod expression"))?;
        let op = chars.next().ok_or_else(|| bad_request("missing chmod operator"))?;
        let shifts: &[u16] = match group {
            'a' => &[6, 3, 0],
            'u' => &[6],
            'g' => &[3],
            'o' => &[0],
            _ => return Err(bad_request("unknown chmod group")),
        };
        let mut mask = 0u16;
        for c in chars {
            mask |= match c {
                'r' => READ,
                'w' => WRITE,
                'x' => EXEC,
                _ => return Err(bad_request("unknown chmod permission")),
            };
        }
        for &shift in shifts {
            match op {
                '+' => inode.mode |= mask << shift,
                '-' => inode.mode &= !(mask << shift),
                _ => return Err(bad_request("unknown chmod operator")),
            }
        }
        self.inodes.set(entry.inode_id, &inode, &mut self.dev)?;
        Ok(())
    }

    // ---- user database ---------------------------------------------------

    /// Adds user `u` with password `p`, both in memory and as a new row
    /// appended to `/usr/user.log`.
    pub fn useradd(&mut self, u: &str, p: &str) -> Result<()> {
        if self.users.contains_key(u) {
            return Err(Error::Exists);
        }
        let entry = self.resolve_from(&self.root_entry(), "/usr/user.log")?;
        let mut content = self.read_data(&entry)?;
        content.extend_from_slice(format!("{u}    {p}\n").as_bytes());
        self.write_whole(&entry, &content, "root")?;
        self.users.insert(u.to_string(), p.to_string());
        Ok(())
    }

    /// Checks `u`'s password against the in-memory user database.
    pub fn authenticate(&self, u: &str, p: &str) -> bool {
        self.users.get(u).map(|pw| pw == p).unwrap_or(false)
    }
}

fn mode_str(mode: u16) -> String {
    let mut s = String::with_capacity(9);
    for shift in [6, 3, 0] {
        s.push(if mode >> shift & READ != 0 { 'r' } else { '-' });
        s.push(if mode >> shift & WRITE != 0 { 'w' } else { '-' });
        s.push(if mode >> shift & EXEC != 0 { 'x' } else { '-' });
    }
    s
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::NamedTempFile;

    fn fresh() -> Filesystem {
        let tmp = NamedTempFile::new().unwrap();
        Filesystem::format(tmp.path()).unwrap()
    }

    #[test]
    fn format_creates_the_bootstrap_subtree() {
        let mut fs = fresh();
        let root = fs.root_entry();
        let listing = fs.list(&root, false, false).unwrap();
        assert_eq!(listing, "home  lost+found  proc  root  usr");
    }

    #[test]
    fn user_log_has_the_exact_bootstrap_content() {
        let mut fs = fresh();
        let entry = fs.resolve_from(&fs.root_entry(), "/usr/user.log").unwrap();
        let content = fs.read_whole(&entry).unwrap();
        assert_eq!(
            String::from_utf8(content).unwrap(),
            "username    password\n    root        root\n"
        );
    }

    #[test]
    fn mkdir_then_rmdir_restores_population() {
        let mut fs = fresh();
        let root = fs.root_entry();
        let before = fs.inode_bitmap.count();
        fs.make_directory(&root, "t", "root").unwrap();
        assert!(fs.inode_bitmap.count() > before);
        let t = fs.resolve_from(&root, "t").unwrap();
        fs.remove_directory(&root, "t", Opt::None).unwrap();
        let _ = t;
        assert_eq!(fs.inode_bitmap.count(), before);
    }

    #[test]
    fn rmdir_of_nonempty_directory_requires_confirmation() {
        let mut fs = fresh();
        let root = fs.root_entry();
        fs.make_directory(&root, "a", "root").unwrap();
        let a = fs.resolve_from(&root, "a").unwrap();
        fs.create_file(&a, "x", "root").unwrap();
        assert!(matches!(
            fs.remove_directory(&root, "a", Opt::None),
            Err(Error::WaitRequest)
        ));
        fs.remove_directory(&root, "a", Opt::Response).unwrap();
        assert!(fs.child(&root, "a").unwrap().is_none());
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut fs = fresh();
        let root = fs.root_entry();
        fs.create_file(&root, "f", "root").unwrap();
        let f = fs.resolve_from(&root, "f").unwrap();
        fs.write_whole(&f, b"hello world", "root").unwrap();
        assert_eq!(fs.read_whole(&f).unwrap(), b"hello world");
    }

    #[test]
    fn write_within_single_indirect_range_leaves_double_indirect_unset() {
        let mut fs = fresh();
        let root = fs.root_entry();
        fs.create_file(&root, "big", "root").unwrap();
        let f = fs.resolve_from(&root, "big").unwrap();
        let payload = vec![7u8; 260 * BLOCK_SIZE];
        fs.write_whole(&f, &payload, "root").unwrap();
        assert_eq!(fs.read_whole(&f).unwrap(), payload);
        let inode = fs.inode_of(f.inode_id).unwrap();
        assert_ne!(inode.i_block[6], crate::layout::SENTINEL);
        assert_eq!(inode.i_block[7], crate::layout::SENTINEL);
    }

    #[test]
    fn permission_denied_when_other_lacks_the_bit() {
        let mut fs = fresh();
        let root = fs.root_entry();
        let root_home = fs.resolve_from(&root, "root").unwrap();
        let inode = fs.inode_of(root_home.inode_id).unwrap();
        assert!(fs.check_perm(&inode, "bob", EXEC).is_err());
        assert!(fs.check_perm(&inode, "root", EXEC).is_ok());
    }

    #[test]
    fn useradd_appends_a_fixed_format_row() {
        let mut fs = fresh();
        fs.useradd("bob", "bob").unwrap();
        assert!(fs.authenticate("bob", "bob"));
        let entry = fs.resolve_from(&fs.root_entry(), "/usr/user.log").unwrap();
        let content = String::from_utf8(fs.read_whole(&entry).unwrap()).unwrap();
        assert!(content.ends_with("bob    bob\n"));
    }

    #[test]
    fn chmod_x_bit_applies_uniformly_under_every_group() {
        let mut fs = fresh();
        let root = fs.root_entry();
        fs.create_file(&root, "f", "root").unwrap();
        let f = fs.resolve_from(&root, "f").unwrap();
        fs.chmod(&f, "u+x").unwrap();
        let inode = fs.inode_of(f.inode_id).unwrap();
        assert_eq!(inode.mode & (EXEC << 6), EXEC << 6);
    }

    #[test]
    fn name_exceeding_max_len_is_rejected() {
        let mut fs = fresh();
        let root = fs.root_entry();
        let ok_name = "x".repeat(MAX_NAME);
        fs.create_file(&root, &ok_name, "root").unwrap();
        let too_long = "x".repeat(MAX_NAME + 1);
        assert!(matches!(
            fs.create_file(&root, &too_long, "root"),
            Err(Error::Exceeded)
        ));
    }

    #[test]
    fn format_then_load_round_trips_the_tree_and_population() {
        let tmp = NamedTempFile::new().unwrap();
        let mut fs = Filesystem::format(tmp.path()).unwrap();
        let root = fs.root_entry();
        let before_blocks = fs.block_bitmap.count();
        let before_inodes = fs.inode_bitmap.count();
        drop(fs);

        let mut reloaded = Filesystem::load(tmp.path()).unwrap();
        assert_eq!(reloaded.block_bitmap.count(), before_blocks);
        assert_eq!(reloaded.inode_bitmap.count(), before_inodes);
        assert!(reloaded.authenticate("root", "root"));
        let listing = reloaded.list(&root, false, false).unwrap();
        assert_eq!(listing, "home  lost+found  proc  root  usr");
    }
}
