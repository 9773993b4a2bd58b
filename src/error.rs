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

//! The error tags produced by every fallible operation in this crate.

use std::io;

/// A failure of one of the filesystem's operations.
///
/// Every public and internal fallible function in this crate returns
/// `Result<T, Error>`. Propagation is local: the first failure wins, and
/// any bitmap bits reserved during an aborted call are rolled back before
/// the error is returned.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A byte buffer could not be allocated.
    #[error("malloc failed")]
    MallocFailed,
    /// An access fell outside the bounds of a buffer, bitmap, or inode
    /// pointer set.
    #[error("invalid memory access")]
    InvalidMemoryAccess,
    /// The operation requires a mounted disk.
    #[error("disk is not mounted")]
    DiskNotMounted,
    /// A requested allocation size is invalid (e.g. zero where not
    /// permitted, or below the current size for a realloc).
    #[error("invalid memory allocation")]
    InvalidMemAlloc,
    /// A path could not be interpreted.
    #[error("invalid file path")]
    InvalidFilePath,
    /// The backing file could not be opened, read, or written.
    #[error("file access failed: {0}")]
    FileAccessFailed(#[from] io::Error),
    /// A write to the backing file wrote fewer bytes than requested.
    #[error("partial file write")]
    PartialFileWrite,
    /// A required string was null.
    #[error("null string")]
    NullString,
    /// A required string was empty.
    #[error("empty string")]
    EmptyString,
    /// A directory entry's name exceeds 255 bytes.
    #[error("inode name too large")]
    InodeNameTooLarge,
    /// A lookup, resolve, or removal found no matching entry.
    #[error("inode not found")]
    InodeNotFound,
    /// The block or inode bitmap has no run of the requested length.
    #[error("no bitmap run found")]
    NoBitmapRunFound,
    /// A bitmap's `size_bits` is inconsistent with its backing buffer.
    #[error("invalid bitmap")]
    InvalidBitmap,
    /// A structural on-disk invariant did not hold: an inode's materialized
    /// run list does not cover `⌈size / BLOCK_SIZE⌉` blocks, or the
    /// superblock's magic numbers or version do not match.
    #[error("corrupt filesystem structure")]
    CorruptInode,
}

pub type Result<T> = std::result::Result<T, Error>;
