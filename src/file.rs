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

//! Scatter/gather read and replace-all write of a byte stream across an
//! inode's block runs.

use crate::alloc;
use crate::bitmap::Bitmap;
use crate::buffer::ByteBuffer;
use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::layout::{self, BlockSequence, Inode, BLOCK_SIZE};
use crate::stream::{self, BlockReader};

/// Adapts a [`BlockDevice`] to the [`BlockReader`] trait the address
/// stream needs, treating block numbers as absolute disk-wide indices.
struct DeviceReader<'a> {
    device: &'a mut BlockDevice,
}

impl BlockReader for DeviceReader<'_> {
    fn read_block(&mut self, block_addr: u64) -> Result<Vec<u8>> {
        self.device
            .read(block_addr * BLOCK_SIZE, BLOCK_SIZE as usize)
    }
}

/// Materializes the ordered run list backing `inode`'s payload, reading
/// any indirect blocks it needs from `device`.
pub fn materialize_runs(device: &mut BlockDevice, inode: &Inode) -> Result<Vec<BlockSequence>> {
    let mut reader = DeviceReader { device };
    stream::read_addresses(&mut reader, inode)
}

fn write_block(device: &mut BlockDevice, block_addr: u64, data: &ByteBuffer) -> Result<()> {
    device.write(block_addr * BLOCK_SIZE, data.as_slice())
}

/// Concatenates `disk_read(run.start * BLOCK_SIZE, run.length * BLOCK_SIZE)`
/// for each run in order. If `strip_to` is `Some(size)`, the result is
/// truncated to `size` bytes.
pub fn read_runs(
    device: &mut BlockDevice,
    runs: &[BlockSequence],
    strip_to: Option<u64>,
) -> Result<ByteBuffer> {
    let mut out = Vec::new();
    for run in runs {
        let bytes = device.read(run.start_addr * BLOCK_SIZE, (run.length * BLOCK_SIZE) as usize)?;
        out.extend(bytes);
    }
    let mut buf = ByteBuffer::from_vec(out);
    if let Some(size) = strip_to {
        buf.realloc(size as usize);
    }
    Ok(buf)
}

/// Capacity of a `level`-deep indirect tree, in number of `BlockSequence`
/// leaves (64 for single, 4096 for double, 262144 for triple).
fn tree_capacity(level: u32) -> u64 {
    (layout::INDIRECT_NUM_BLOCK_SEQUENCE as u64).pow(level)
}

/// Builds a `level`-deep indirect tree over `runs` (`runs.len()` must not
/// exceed `tree_capacity(level)`), allocating one block per tree node, and
/// returns the address of the tree's root block.
///
/// Every block this call allocates, including ones allocated by nested
/// recursive calls, is pushed onto `allocated` as it is reserved — even if
/// a later sibling or the node's own write then fails. Callers use that
/// list to free everything this call reserved if they need to unwind.
fn build_tree(
    device: &mut BlockDevice,
    bitmap: &mut Bitmap,
    runs: &[BlockSequence],
    level: u32,
    allocated: &mut Vec<u64>,
) -> Result<u64> {
    if level == 1 {
        let addr = alloc::allocate_blocks(bitmap, 0, 1)?[0].start_addr;
        allocated.push(addr);
        write_block(device, addr, &layout::encode_indirect_block(runs))?;
        return Ok(addr);
    }

    let sub_capacity = tree_capacity(level - 1);
    let mut child_addrs = Vec::new();
    for chunk in runs.chunks(sub_capacity as usize) {
        child_addrs.push(build_tree(device, bitmap, chunk, level - 1, allocated)?);
    }
    let addr = alloc::allocate_blocks(bitmap, 0, 1)?[0].start_addr;
    allocated.push(addr);
    write_block(device, addr, &layout::encode_pointer_block(&child_addrs))?;
    Ok(addr)
}

/// Materializes every block (data and structural) currently held by
/// `inode`, as a flat list of single-block-or-longer runs.
fn inode_blocks(device: &mut BlockDevice, inode: &Inode) -> Result<Vec<BlockSequence>> {
    let mut reader = DeviceReader { device };
    let data_runs = stream::read_addresses(&mut reader, inode)?;
    let structural = stream::structural_blocks(&mut reader, inode)?;

    let mut all = data_runs;
    all.extend(structural.into_iter().map(|addr| BlockSequence {
        start_addr: addr,
        length: 1,
    }));
    Ok(all)
}

/// Re-marks every block in `runs` as used, ignoring individual failures —
/// used only to unwind a bitmap mutation that already succeeded once and
/// so cannot fail to repeat.
fn restore(bitmap: &mut Bitmap, runs: &[BlockSequence]) {
    for run in runs {
        for i in run.start_addr..run.start_addr + run.length {
            let _ = bitmap.write(i, true);
        }
    }
}

/// Replace-all write: frees every block the inode currently holds,
/// allocates fresh runs for `data`, distributes them into the inode's
/// direct/indirect pointer set, writes the payload, and updates
/// `inode.size`/`inode.time_last_modified`.
///
/// The whole operation is atomic with respect to the block bitmap: if any
/// allocation after the old blocks are freed fails, every bit this call
/// touched is rolled back (new blocks freed, old blocks re-marked used)
/// before the error is returned, so a failed write never leaves the
/// bitmap and the (unwritten) on-disk inode disagreeing about which
/// blocks are free.
pub fn write_to_file(
    device: &mut BlockDevice,
    bitmap: &mut Bitmap,
    inode: &mut Inode,
    data: &[u8],
    now: u64,
) -> Result<()> {
    // Free any runs/indirect blocks the inode already owns, unless it was
    // never given any (a brand-new inode with size 0 and no pointers).
    let had_blocks = inode.size > 0
        || !inode.direct_blocks.iter().all(|s| s.is_empty())
        || inode.single_indirect != 0
        || inode.double_indirect != 0
        || inode.triple_indirect != 0;
    let old_runs = if had_blocks {
        inode_blocks(device, inode)?
    } else {
        Vec::new()
    };
    if !old_runs.is_empty() {
        alloc::free_blocks(bitmap, 0, &old_runs)?;
    }

    let need = (data.len() as u64).div_ceil(BLOCK_SIZE);
    let runs = if need == 0 {
        Vec::new()
    } else {
        match alloc::allocate_blocks(bitmap, 0, need) {
            Ok(runs) => runs,
            Err(e) => {
                restore(bitmap, &old_runs);
                return Err(e);
            }
        }
    };

    let direct_count = layout::DIRECT_BLOCK_NUM.min(runs.len());
    let mut direct_blocks = [BlockSequence::default(); layout::DIRECT_BLOCK_NUM];
    direct_blocks[..direct_count].copy_from_slice(&runs[..direct_count]);

    let overflow = &runs[direct_count..];
    let single_cap = tree_capacity(1);
    let double_cap = tree_capacity(2);
    let triple_cap = tree_capacity(3);

    let mut structural_allocated: Vec<u64> = Vec::new();
    let tree_result = if overflow.is_empty() {
        Ok((0, 0, 0))
    } else if overflow.len() as u64 <= single_cap {
        build_tree(device, bitmap, overflow, 1, &mut structural_allocated).map(|s| (s, 0, 0))
    } else if overflow.len() as u64 <= single_cap + double_cap {
        let (first, rest) = overflow.split_at(single_cap as usize);
        (|| {
            let single = build_tree(device, bitmap, first, 1, &mut structural_allocated)?;
            let double = build_tree(device, bitmap, rest, 2, &mut structural_allocated)?;
            Ok((single, double, 0))
        })()
    } else if overflow.len() as u64 <= single_cap + double_cap + triple_cap {
        let (first, rest) = overflow.split_at(single_cap as usize);
        let (second, third) = rest.split_at(double_cap as usize);
        (|| {
            let single = build_tree(device, bitmap, first, 1, &mut structural_allocated)?;
            let double = build_tree(device, bitmap, second, 2, &mut structural_allocated)?;
            let triple = build_tree(device, bitmap, third, 3, &mut structural_allocated)?;
            Ok((single, double, triple))
        })()
    } else {
        Err(Error::NoBitmapRunFound)
    };

    let (single_indirect, double_indirect, triple_indirect) = match tree_result {
        Ok(v) => v,
        Err(e) => {
            alloc::free_blocks(bitmap, 0, &runs).ok();
            let structural_runs: Vec<BlockSequence> = structural_allocated
                .into_iter()
                .map(|addr| BlockSequence {
                    start_addr: addr,
                    length: 1,
                })
                .collect();
            alloc::free_blocks(bitmap, 0, &structural_runs).ok();
            restore(bitmap, &old_runs);
            return Err(e);
        }
    };

    inode.direct_blocks = direct_blocks;
    inode.single_indirect = single_indirect;
    inode.double_indirect = double_indirect;
    inode.triple_indirect = triple_indirect;
    inode.size = data.len() as u64;
    inode.time_last_modified = now;

    let mut offset = 0usize;
    for run in &runs {
        let run_bytes = (run.length * BLOCK_SIZE) as usize;
        let take = run_bytes.min(data.len() - offset);
        let mut chunk = vec![0u8; run_bytes];
        chunk[..take].copy_from_slice(&data[offset..offset + take]);
        device.write(run.start_addr * BLOCK_SIZE, &chunk)?;
        offset += take;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bitmap::Bitmap;
    use std::env::temp_dir;
    use std::path::PathBuf;

    fn tmp(name: &str) -> PathBuf {
        temp_dir().join(format!("blockfs-file-test-{name}-{}", std::process::id()))
    }

    #[test]
    fn round_trip_small_write() {
        let path = tmp("small");
        let mut device = BlockDevice::create(&path, 64 * BLOCK_SIZE).unwrap();
        let mut bitmap = Bitmap::zeroed(64);
        let mut inode = Inode::new_empty(1, false, 0);

        write_to_file(&mut device, &mut bitmap, &mut inode, b"world", 1).unwrap();
        let mut reader = DeviceReader { device: &mut device };
        let runs = stream::read_addresses(&mut reader, &inode).unwrap();
        let data = read_runs(&mut device, &runs, Some(inode.size)).unwrap();
        assert_eq!(data.as_slice(), b"world");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn multi_block_write_round_trips() {
        let path = tmp("multiblock");
        let mut device = BlockDevice::create(&path, 64 * BLOCK_SIZE).unwrap();
        let mut bitmap = Bitmap::zeroed(64);
        let mut inode = Inode::new_empty(1, false, 0);

        let payload: Vec<u8> = (0..2049u32).map(|i| (i % 251) as u8).collect();
        write_to_file(&mut device, &mut bitmap, &mut inode, &payload, 1).unwrap();
        assert_eq!(inode.size, 2049);

        let mut reader = DeviceReader { device: &mut device };
        let runs = stream::read_addresses(&mut reader, &inode).unwrap();
        let total_blocks: u64 = runs.iter().map(|r| r.length).sum();
        assert_eq!(total_blocks, 5);

        let data = read_runs(&mut device, &runs, Some(inode.size)).unwrap();
        assert_eq!(data.as_slice(), payload.as_slice());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn rewrite_frees_old_blocks() {
        let path = tmp("rewrite");
        let mut device = BlockDevice::create(&path, 64 * BLOCK_SIZE).unwrap();
        let mut bitmap = Bitmap::zeroed(64);
        let mut inode = Inode::new_empty(1, false, 0);

        write_to_file(&mut device, &mut bitmap, &mut inode, &vec![1u8; 4096], 1).unwrap();
        let used_after_first = (0..64).filter(|&i| bitmap.read(i).unwrap()).count();
        write_to_file(&mut device, &mut bitmap, &mut inode, b"tiny", 2).unwrap();
        let used_after_second = (0..64).filter(|&i| bitmap.read(i).unwrap()).count();

        assert!(used_after_second < used_after_first);
        assert_eq!(inode.size, 4);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn failed_rewrite_restores_old_blocks() {
        let path = tmp("rollback");
        let total_blocks = 8u64;
        let mut device = BlockDevice::create(&path, total_blocks * BLOCK_SIZE).unwrap();
        let mut bitmap = Bitmap::zeroed(total_blocks);
        let mut inode = Inode::new_empty(1, false, 0);

        write_to_file(&mut device, &mut bitmap, &mut inode, &vec![1u8; 4 * BLOCK_SIZE as usize], 1)
            .unwrap();
        let bitmap_before: Vec<bool> = (0..total_blocks).map(|i| bitmap.read(i).unwrap()).collect();
        let inode_before = inode;

        // Needs 9 blocks; only 8 exist on this disk even with the old 4
        // freed, so the allocation must fail and everything must unwind.
        let result = write_to_file(
            &mut device,
            &mut bitmap,
            &mut inode,
            &vec![2u8; 9 * BLOCK_SIZE as usize],
            2,
        );
        assert!(matches!(result, Err(Error::NoBitmapRunFound)));

        let bitmap_after: Vec<bool> = (0..total_blocks).map(|i| bitmap.read(i).unwrap()).collect();
        assert_eq!(bitmap_before, bitmap_after);
        assert_eq!(inode, inode_before);

        let mut reader = DeviceReader { device: &mut device };
        let runs = stream::read_addresses(&mut reader, &inode).unwrap();
        let data = read_runs(&mut device, &runs, Some(inode.size)).unwrap();
        assert_eq!(data.as_slice(), vec![1u8; 4 * BLOCK_SIZE as usize].as_slice());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn failed_indirect_block_allocation_frees_the_data_runs() {
        let path = tmp("rollback-indirect");
        // Every other block is pre-used, so the 7 free blocks are each an
        // isolated 1-block run: allocating them for data (6 direct + 1
        // overflow) consumes every free block on the disk, leaving none
        // for the indirect tree's own pointer block.
        let total_blocks = 2 * (layout::DIRECT_BLOCK_NUM as u64 + 1);
        let mut device = BlockDevice::create(&path, total_blocks * BLOCK_SIZE).unwrap();
        let mut bitmap = Bitmap::zeroed(total_blocks);
        for i in (0..total_blocks).step_by(2) {
            bitmap.write(i, true).unwrap();
        }
        let bitmap_before: Vec<bool> = (0..total_blocks).map(|i| bitmap.read(i).unwrap()).collect();
        let mut inode = Inode::new_empty(1, false, 0);

        let result = write_to_file(
            &mut device,
            &mut bitmap,
            &mut inode,
            &vec![3u8; (layout::DIRECT_BLOCK_NUM + 1) * BLOCK_SIZE as usize],
            1,
        );
        assert!(matches!(result, Err(Error::NoBitmapRunFound)));

        let bitmap_after: Vec<bool> = (0..total_blocks).map(|i| bitmap.read(i).unwrap()).collect();
        assert_eq!(bitmap_before, bitmap_after);
        assert_eq!(inode, Inode::new_empty(1, false, 0));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn cross_indirect_write_round_trips() {
        let path = tmp("indirect");
        let total_blocks = 256u64;
        let mut device = BlockDevice::create(&path, total_blocks * BLOCK_SIZE).unwrap();
        let mut bitmap = Bitmap::zeroed(total_blocks);
        let mut inode = Inode::new_empty(1, false, 0);

        // Force fragmentation into > 6 runs: free blocks are only the odd
        // indices below 200, each isolated between used neighbors, plus
        // block 200 itself used so no large trailing run is available.
        for i in 0..201 {
            if i % 2 == 0 {
                bitmap.write(i, true).unwrap();
            }
        }
        for i in 201..total_blocks {
            bitmap.write(i, true).unwrap();
        }
        let payload = vec![7u8; 10 * BLOCK_SIZE as usize];
        write_to_file(&mut device, &mut bitmap, &mut inode, &payload, 1).unwrap();

        assert!(inode.direct_blocks.iter().all(|s| !s.is_empty()));
        assert_ne!(inode.single_indirect, 0);

        let mut reader = DeviceReader { device: &mut device };
        let runs = stream::read_addresses(&mut reader, &inode).unwrap();
        let data = read_runs(&mut device, &runs, Some(inode.size)).unwrap();
        assert_eq!(data.as_slice(), payload.as_slice());

        std::fs::remove_file(&path).unwrap();
    }
}
