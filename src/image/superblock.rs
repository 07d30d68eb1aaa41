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

//! The superblock and the position arithmetic derived from it.

use super::inode::Inode;
use super::BLOCK_SIZE;
use crate::error::{Error, Result};
use std::mem::size_of;

/// The superblock, read from block 1 of the image.
///
/// Disk layout described by the fields:
///
/// ```text
/// [ boot | super | log (nlog) | inode table | bitmap | data ... ]
/// ```
///
/// The format carries no magic number; consistency of the region indices is
/// the only sanity check available.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct SuperBlock {
    /// Total number of blocks in the image.
    pub size: u32,
    /// Number of data blocks. Informational, not used for addressing.
    pub nblocks: u32,
    /// Number of inodes.
    pub ninodes: u32,
    /// Number of log blocks. The log region is reserved and never touched.
    pub nlog: u32,
    /// Block index of the first log block.
    pub log_start: u32,
    /// Block index of the first inode table block.
    pub inode_start: u32,
    /// Block index of the first bitmap block.
    pub bmap_start: u32,
}

impl SuperBlock {
    /// Returns the number of blocks occupied by the inode table.
    ///
    /// The stored form keeps xv6's historical approximation, so layouts agree
    /// with pre-existing images.
    pub fn inode_blocks(&self) -> u64 {
        self.ninodes as u64 / 8 + 1
    }

    /// Returns the number of blocks occupied by the allocation bitmap.
    pub fn bitmap_blocks(&self) -> u64 {
        self.size as u64 / (BLOCK_SIZE as u64 * 8) + 1
    }

    /// Returns the index of the first data block.
    pub fn data_start(&self) -> u64 {
        2 + self.nlog as u64 + self.inode_blocks() + self.bitmap_blocks()
    }

    /// Returns the byte position of inode `n` in the image.
    pub(crate) fn inode_position(&self, n: u32) -> Result<u64> {
        if n >= self.ninodes {
            return Err(Error::OutOfRange {
                region: "inode",
                index: n as u64,
            });
        }
        Ok(BLOCK_SIZE as u64 * self.inode_start as u64 + size_of::<Inode>() as u64 * n as u64)
    }

    /// Returns the byte position of block `n`'s bitmap bit, along with the
    /// mask selecting it within that byte.
    ///
    /// Bits are MSB-first within each byte.
    pub(crate) fn bitmap_position(&self, n: u32) -> Result<(u64, u8)> {
        if n >= self.size {
            return Err(Error::OutOfRange {
                region: "bitmap",
                index: n as u64,
            });
        }
        let pos = BLOCK_SIZE as u64 * self.bmap_start as u64 + n as u64 / 8;
        Ok((pos, 0x80 >> (n % 8)))
    }

    /// Returns the byte position of data block `n`.
    ///
    /// Blocks below the data region are rejected: the boot block, superblock,
    /// log, inode table and bitmap are never addressed as data.
    pub(crate) fn data_position(&self, n: u32) -> Result<u64> {
        if (n as u64) < self.data_start() || n >= self.size {
            return Err(Error::OutOfRange {
                region: "data block",
                index: n as u64,
            });
        }
        Ok(BLOCK_SIZE as u64 * n as u64)
    }
}
