/*
 * Copyright 2025 Luc Lenôtre
 *
 * This file is part of Maestro.
 *
 * Maestro is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Maestro is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Maestro. If not, see <https://www.gnu.org/licenses/>.
 */

//! Writing a fresh file system onto a device.

use crate::error::Result;
use crate::image::{reinterpret, reinterpret_mut};
use crate::image::{DirEnt, Inode, SuperBlock, BLOCK_SIZE, ROOT_INODE, T_DIR};
use std::fs::File;
use std::io;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::mem::size_of;

/// Geometry of the file system to create.
pub struct FormatOptions {
    /// Total number of blocks in the image.
    pub size: u32,
    /// Number of inodes.
    pub ninodes: u32,
    /// Number of log blocks to reserve.
    pub nlog: u32,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            size: 1000,
            ninodes: 200,
            nlog: 30,
        }
    }
}

impl FormatOptions {
    /// Returns the superblock describing this geometry.
    fn super_block(&self) -> SuperBlock {
        let inode_blocks = self.ninodes / 8 + 1;
        let mut sb = SuperBlock {
            size: self.size,
            nblocks: 0,
            ninodes: self.ninodes,
            nlog: self.nlog,
            log_start: 2,
            inode_start: 2 + self.nlog,
            bmap_start: 2 + self.nlog + inode_blocks,
        };
        sb.nblocks = self.size.saturating_sub(sb.data_start() as u32);
        sb
    }
}

/// Tells whether `dev` plausibly holds an xv6 file system.
///
/// The format has no magic number, so the check is limited to the region
/// indices of the superblock being consistent with each other.
pub fn is_present(dev: &mut File) -> Result<bool> {
    let mut sb = SuperBlock::default();
    dev.seek(SeekFrom::Start(BLOCK_SIZE as u64))?;
    match dev.read_exact(reinterpret_mut(&mut sb)) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(false),
        Err(e) => return Err(e.into()),
    }
    let consistent = sb.size > 0
        && sb.ninodes > 0
        && sb.log_start == 2
        && sb.inode_start == 2 + sb.nlog
        && sb.bmap_start as u64 == sb.inode_start as u64 + sb.inode_blocks()
        && sb.data_start() < sb.size as u64;
    Ok(consistent)
}

/// Creates an xv6 file system on `dev`.
///
/// The whole image is zeroed, then the superblock, the root directory's
/// inode, its `.` and `..` entries and the allocation bitmap are written. All
/// metadata blocks and the root directory's block are marked used in the
/// bitmap.
pub fn format(dev: &mut File, options: &FormatOptions) -> Result<()> {
    let sb = options.super_block();
    let data_start = sb.data_start();
    if options.ninodes < 2 || data_start + 1 >= sb.size as u64 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "file system geometry leaves no usable data block",
        )
        .into());
    }

    // Zero the whole image
    let zero = [0u8; BLOCK_SIZE];
    dev.seek(SeekFrom::Start(0))?;
    for _ in 0..sb.size {
        dev.write_all(&zero)?;
    }

    // Superblock, at block 1
    dev.seek(SeekFrom::Start(BLOCK_SIZE as u64))?;
    dev.write_all(reinterpret(&sb))?;

    // Root directory inode
    let root = Inode {
        typ: T_DIR,
        nlink: 1,
        size: 2 * size_of::<DirEnt>() as u32,
        addrs: {
            let mut addrs = [0u32; 13];
            addrs[0] = data_start as u32;
            addrs
        },
        ..Default::default()
    };
    let root_pos = BLOCK_SIZE as u64 * sb.inode_start as u64 + 64 * ROOT_INODE as u64;
    dev.seek(SeekFrom::Start(root_pos))?;
    dev.write_all(reinterpret(&root))?;

    // Root directory content, in the first data block
    let mut block = [0u8; BLOCK_SIZE];
    block[..16].copy_from_slice(&DirEnt::new(ROOT_INODE, ".").encode());
    block[16..32].copy_from_slice(&DirEnt::new(ROOT_INODE, "..").encode());
    dev.seek(SeekFrom::Start(BLOCK_SIZE as u64 * data_start))?;
    dev.write_all(&block)?;

    // Bitmap: metadata blocks plus the root directory's block, MSB-first
    let used = data_start + 1;
    let mut bitmap = vec![0u8; used.div_ceil(8) as usize];
    for n in 0..used {
        bitmap[(n / 8) as usize] |= 0x80 >> (n % 8);
    }
    dev.seek(SeekFrom::Start(BLOCK_SIZE as u64 * sb.bmap_start as u64))?;
    dev.write_all(&bitmap)?;

    dev.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn default_geometry() {
        let sb = FormatOptions::default().super_block();
        assert_eq!(sb.size, 1000);
        assert_eq!(sb.ninodes, 200);
        assert_eq!(sb.nlog, 30);
        assert_eq!(sb.log_start, 2);
        assert_eq!(sb.inode_start, 32);
        assert_eq!(sb.bmap_start, 58);
        assert_eq!(sb.data_start(), 59);
        assert_eq!(sb.nblocks, 941);
    }

    #[test]
    pub fn tiny_geometry_rejected() {
        let mut tmp = tempfile::tempfile().unwrap();
        // Data would start at block 2 + 30 + 3 + 1 = 36, the end of the image
        let options = FormatOptions {
            size: 36,
            ninodes: 16,
            nlog: 30,
        };
        format(&mut tmp, &options).unwrap_err();
    }
}
