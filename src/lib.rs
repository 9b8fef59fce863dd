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

//! `simdisk` is a Unix-style filesystem hosted inside a single fixed-size
//! host file. It owns the on-disk layout (superblock, bitmaps, inode
//! table, data blocks), mediates access through advisory locks, and serves
//! multiple shell clients concurrently through [`server::Server`].
//!
//! The engine is [`fs::Filesystem`]; everything below it (`device`,
//! `bitmap`, `inode`, `blockmap`, `dirent`) is a layer it composes. The
//! command surface (`command`, `wire`, `session`, `server`) is the part a
//! shell client actually talks to.

pub mod bitmap;
pub mod blockmap;
pub mod command;
pub mod device;
pub mod dirent;
pub mod error;
pub mod fs;
pub mod inode;
pub mod layout;
pub mod lock;
pub mod server;
pub mod session;
pub mod wire;

pub use error::{Error, ErrorCode, Result};
pub use fs::Filesystem;
pub use server::{Client, Server};
