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

//! Whole-file content access over an inode's block chain.

use crate::error::{Error, Result};
use crate::image::{DiskImage, Inode, BLOCK_SIZE, MAX_FILE_SIZE, NDIRECT, NINDIRECT};
use crate::image::{T_DIR, T_UNUSED};

/// A file: one inode plus its chain of direct and indirect blocks.
///
/// The inode is held as a value and written back explicitly; the image is
/// passed into each operation, so all mutation flows through the block
/// device.
pub struct File {
    /// The inode's number.
    inum: u32,
    /// The inode's current content.
    inode: Inode,
    /// The name the file was reached under. For display only, not persisted.
    name: String,
}

impl File {
    pub(crate) fn new(inum: u32, inode: Inode, name: String) -> Self {
        Self { inum, inode, name }
    }

    /// Loads the regular file with inode number `inum`.
    ///
    /// `name` is the name the file is being reached under.
    pub fn load(image: &mut DiskImage, inum: u32, name: &str) -> Result<Self> {
        let inode = image.get_inode(inum)?;
        match inode.typ {
            T_UNUSED => Err(Error::NotFound(name.to_owned())),
            T_DIR => Err(Error::IsDir),
            _ => Ok(Self::new(inum, inode, name.to_owned())),
        }
    }

    /// Returns the file's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the file's inode number.
    pub fn inode_num(&self) -> u32 {
        self.inum
    }

    /// Returns the size of the file's content in bytes.
    pub fn size(&self) -> u64 {
        self.inode.size as u64
    }

    pub(crate) fn inode_mut(&mut self) -> &mut Inode {
        &mut self.inode
    }

    /// Reads the file's whole content.
    ///
    /// Direct blocks are walked first, then the indirect block's addresses; a
    /// zero entry terminates the chain. The result is truncated to the
    /// inode's size.
    pub fn read(&self, image: &mut DiskImage) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity((self.inode.size as usize).next_multiple_of(BLOCK_SIZE));
        let mut terminated = false;
        for &addr in &self.inode.addrs[..NDIRECT] {
            if addr == 0 {
                terminated = true;
                break;
            }
            data.extend_from_slice(&image.get_data(addr)?);
        }
        let indirect = self.inode.addrs[NDIRECT];
        if !terminated && indirect != 0 {
            let block = image.get_data(indirect)?;
            for raw in block.chunks_exact(4) {
                let addr = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
                if addr == 0 {
                    break;
                }
                data.extend_from_slice(&image.get_data(addr)?);
            }
        }
        data.truncate(self.inode.size as usize);
        Ok(data)
    }

    /// Replaces the file's whole content with `data`.
    ///
    /// Content beyond [`MAX_FILE_SIZE`] is discarded. The previous block
    /// chain is freed first so its bitmap bits do not leak; the operation is
    /// not crash-atomic.
    pub fn write(&mut self, image: &mut DiskImage, data: &[u8]) -> Result<()> {
        self.truncate(image, 0)?;
        let data = &data[..data.len().min(MAX_FILE_SIZE)];
        self.inode.size = data.len() as u32;

        // Data blocks, in index order
        let mut blocks = Vec::with_capacity(data.len().div_ceil(BLOCK_SIZE));
        for chunk in data.chunks(BLOCK_SIZE) {
            let mut block = [0u8; BLOCK_SIZE];
            block[..chunk.len()].copy_from_slice(chunk);
            let n = image.alloc_data()?;
            image.set_data(n, &block)?;
            image.set_bitmap(n, true)?;
            blocks.push(n);
        }

        for (i, slot) in self.inode.addrs[..NDIRECT].iter_mut().enumerate() {
            *slot = blocks.get(i).copied().unwrap_or(0);
        }
        if blocks.len() > NDIRECT {
            let mut block = [0u8; BLOCK_SIZE];
            for (i, addr) in blocks[NDIRECT..].iter().enumerate() {
                block[i * 4..(i + 1) * 4].copy_from_slice(&addr.to_le_bytes());
            }
            let n = image.alloc_data()?;
            image.set_data(n, &block)?;
            image.set_bitmap(n, true)?;
            self.inode.addrs[NDIRECT] = n;
        } else {
            self.inode.addrs[NDIRECT] = 0;
        }

        image.set_inode(self.inum, &self.inode)
    }

    /// Shrinks the file to `size` bytes, freeing the blocks past the new end.
    ///
    /// When every indirect slot is dropped, the indirect block itself is
    /// freed as well.
    pub fn truncate(&mut self, image: &mut DiskImage, size: u64) -> Result<()> {
        let keep = (size as usize).div_ceil(BLOCK_SIZE);
        for i in keep..NDIRECT {
            if self.inode.addrs[i] != 0 {
                image.set_bitmap(self.inode.addrs[i], false)?;
                self.inode.addrs[i] = 0;
            }
        }
        let indirect = self.inode.addrs[NDIRECT];
        if indirect != 0 {
            let mut block = image.get_data(indirect)?;
            let keep = keep.saturating_sub(NDIRECT);
            for i in keep..NINDIRECT {
                let raw = &mut block[i * 4..(i + 1) * 4];
                let addr = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
                if addr != 0 {
                    image.set_bitmap(addr, false)?;
                    raw.fill(0);
                }
            }
            if keep == 0 {
                image.set_bitmap(indirect, false)?;
                self.inode.addrs[NDIRECT] = 0;
            } else {
                image.set_data(indirect, &block)?;
            }
        }
        self.inode.size = size as u32;
        image.set_inode(self.inum, &self.inode)
    }

    /// Drops one link to the file.
    ///
    /// When the link count reaches zero, the content is freed and the inode
    /// slot is returned to the table as unused.
    pub fn delete(mut self, image: &mut DiskImage) -> Result<()> {
        self.inode.nlink -= 1;
        if self.inode.nlink <= 0 {
            self.truncate(image, 0)?;
            self.inode = Inode::default();
        }
        image.set_inode(self.inum, &self.inode)
    }
}
