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

//! The block device layer: typed random access to an image file's regions.

pub mod inode;
pub mod superblock;

pub use inode::{DirEnt, Inode, DIRENT_SIZE, DIRSIZ, MAX_FILE_SIZE, NDIRECT, NINDIRECT};
pub use inode::{ROOT_INODE, T_DEV, T_DIR, T_FILE, T_UNUSED};
pub use superblock::SuperBlock;

use crate::error::{Error, Result};
use std::fs::File;
use std::fs::OpenOptions;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::mem::size_of;
use std::path::Path;
use std::slice;

/// The size of a block in bytes.
pub const BLOCK_SIZE: usize = 512;

/// Reinterprets a record as its raw bytes.
pub(crate) fn reinterpret<T>(val: &T) -> &[u8] {
    unsafe { slice::from_raw_parts(val as *const _ as *const u8, size_of::<T>()) }
}

/// Reinterprets a record as its raw bytes, for writing into.
pub(crate) fn reinterpret_mut<T>(val: &mut T) -> &mut [u8] {
    unsafe { slice::from_raw_parts_mut(val as *mut _ as *mut u8, size_of::<T>()) }
}

/// An open xv6 file system image.
///
/// The image owns the backing file handle for the lifetime of the mount; it is
/// closed when the value is dropped. Every operation is a fresh positioned
/// read or write, there is no caching.
pub struct DiskImage {
    /// The image's superblock, read once at open.
    super_block: SuperBlock,
    /// The backing file.
    src: File,
}

impl DiskImage {
    /// Opens the image at `path` read-write and reads its superblock.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut src = OpenOptions::new().read(true).write(true).open(path)?;
        let mut super_block = SuperBlock::default();
        src.seek(SeekFrom::Start(BLOCK_SIZE as u64))?;
        src.read_exact(reinterpret_mut(&mut super_block))?;
        Ok(Self { super_block, src })
    }

    /// Returns the image's superblock.
    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    /// Reads inode `n` from the inode table.
    pub fn get_inode(&mut self, n: u32) -> Result<Inode> {
        let pos = self.super_block.inode_position(n)?;
        let mut inode = Inode::default();
        self.src.seek(SeekFrom::Start(pos))?;
        self.src.read_exact(reinterpret_mut(&mut inode))?;
        Ok(inode)
    }

    /// Writes inode `n` to the inode table.
    pub fn set_inode(&mut self, n: u32, inode: &Inode) -> Result<()> {
        let pos = self.super_block.inode_position(n)?;
        self.src.seek(SeekFrom::Start(pos))?;
        self.src.write_all(reinterpret(inode))?;
        Ok(())
    }

    /// Returns the number of the first unused inode.
    ///
    /// The slot is only reserved once a non-unused type has been written to
    /// it, so the caller must claim it with [`Self::set_inode`] before
    /// releasing control.
    pub fn alloc_inode(&mut self) -> Result<u32> {
        // Inode 0 is reserved
        for n in 1..self.super_block.ninodes {
            if self.get_inode(n)?.typ == T_UNUSED {
                return Ok(n);
            }
        }
        Err(Error::NoSpace("inodes"))
    }

    /// Returns whether block `n`'s bitmap bit is set.
    pub fn get_bitmap(&mut self, n: u32) -> Result<bool> {
        let (pos, mask) = self.super_block.bitmap_position(n)?;
        let mut byte = [0u8; 1];
        self.src.seek(SeekFrom::Start(pos))?;
        self.src.read_exact(&mut byte)?;
        Ok(byte[0] & mask != 0)
    }

    /// Sets or clears block `n`'s bitmap bit.
    pub fn set_bitmap(&mut self, n: u32, used: bool) -> Result<()> {
        let (pos, mask) = self.super_block.bitmap_position(n)?;
        let mut byte = [0u8; 1];
        self.src.seek(SeekFrom::Start(pos))?;
        self.src.read_exact(&mut byte)?;
        if used {
            byte[0] |= mask;
        } else {
            byte[0] &= !mask;
        }
        self.src.seek(SeekFrom::Start(pos))?;
        self.src.write_all(&byte)?;
        Ok(())
    }

    /// Reads data block `n`.
    ///
    /// A read past the end of the backing file is zero-padded to a full
    /// block.
    pub fn get_data(&mut self, n: u32) -> Result<[u8; BLOCK_SIZE]> {
        let pos = self.super_block.data_position(n)?;
        let mut block = [0u8; BLOCK_SIZE];
        self.src.seek(SeekFrom::Start(pos))?;
        let mut off = 0;
        while off < block.len() {
            let count = self.src.read(&mut block[off..])?;
            if count == 0 {
                break;
            }
            off += count;
        }
        Ok(block)
    }

    /// Writes data block `n`.
    pub fn set_data(&mut self, n: u32, block: &[u8; BLOCK_SIZE]) -> Result<()> {
        let pos = self.super_block.data_position(n)?;
        self.src.seek(SeekFrom::Start(pos))?;
        self.src.write_all(block)?;
        Ok(())
    }

    /// Returns the index of the first data block whose bitmap bit is clear.
    ///
    /// The bit is NOT set here: the caller sets it after writing the block,
    /// so an interrupted allocation leaves no dangling reserved bit.
    pub fn alloc_data(&mut self) -> Result<u32> {
        for n in self.super_block.data_start() as u32..self.super_block.size {
            if !self.get_bitmap(n)? {
                return Ok(n);
            }
        }
        Err(Error::NoSpace("data blocks"))
    }
}
