/*
 * Copyright 2026 The blockfs authors
 *
 * This file is part of blockfs.
 *
 * blockfs is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * blockfs is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * blockfs. If not, see <https://www.gnu.org/licenses/>.
 */

//! A single-file, block-structured filesystem: one regular file on the
//! host filesystem holds a superblock, block and inode bitmaps, an inode
//! table, and a data region, addressed entirely through this crate's
//! [`Disk`] handle.

pub mod alloc;
pub mod bitmap;
pub mod buffer;
pub mod device;
pub mod dir;
pub mod disk;
pub mod error;
pub mod file;
pub mod layout;
pub mod stream;

pub use buffer::ByteBuffer;
pub use dir::DirectoryEntry;
pub use disk::Disk;
pub use error::{Error, Result};
pub use layout::{Inode, Regions, Superblock};
