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

//! Block and inode allocation, driven by run-length search over the
//! bitmaps. There is no free list: every allocation is a fresh bitmap scan.

use crate::bitmap::Bitmap;
use crate::error::{Error, Result};
use crate::layout::BlockSequence;

/// Reserves `n` contiguous-or-not blocks from `bitmap`, relative to
/// `base_block` (the disk-wide block number of bit 0).
///
/// Policy: repeatedly take the longest currently-available run, up to the
/// remaining need; if none exists, take the largest available run and
/// continue. Ties break toward the lowest start address. Every returned
/// block is marked used immediately, so later searches within the same
/// call cannot overlap earlier ones.
///
/// On failure (fewer than `n` blocks reachable in total), every bit set
/// during this call is rolled back before returning
/// [`Error::NoBitmapRunFound`].
pub fn allocate_blocks(
    bitmap: &mut Bitmap,
    base_block: u64,
    n: u64,
) -> Result<Vec<BlockSequence>> {
    let mut runs = Vec::new();
    let mut remaining = n;

    while remaining > 0 {
        let Some((start, len)) = bitmap.find_longest_run(remaining)? else {
            rollback(bitmap, base_block, &runs);
            return Err(Error::NoBitmapRunFound);
        };
        for i in start..start + len {
            bitmap.write(i, true)?;
        }
        runs.push(BlockSequence {
            start_addr: base_block + start,
            length: len,
        });
        remaining -= len;
    }
    Ok(runs)
}

fn rollback(bitmap: &mut Bitmap, base_block: u64, runs: &[BlockSequence]) {
    for run in runs {
        let start = run.start_addr - base_block;
        for i in start..start + run.length {
            let _ = bitmap.write(i, false);
        }
    }
}

/// Frees every block in `runs`. Freeing an already-clear bit is a no-op.
pub fn free_blocks(bitmap: &mut Bitmap, base_block: u64, runs: &[BlockSequence]) -> Result<()> {
    for run in runs {
        let start = run.start_addr - base_block;
        for i in start..start + run.length {
            bitmap.write(i, false)?;
        }
    }
    Ok(())
}

/// Reserves the lowest unused inode number at or above index 1 (index 0 is
/// reserved as "unallocated").
pub fn allocate_inode(bitmap: &mut Bitmap) -> Result<u32> {
    for i in 1..bitmap.size_bits() {
        if !bitmap.read(i)? {
            bitmap.write(i, true)?;
            return Ok(i as u32);
        }
    }
    Err(Error::NoBitmapRunFound)
}

/// Frees an inode number. Freeing an already-clear bit is a no-op.
pub fn free_inode(bitmap: &mut Bitmap, n: u32) -> Result<()> {
    bitmap.write(n as u64, false)
}
