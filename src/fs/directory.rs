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

//! Directories: files whose bytes are a stream of 16-byte entries.

use super::entry::Entry;
use super::file::File;
use crate::error::{Error, Result};
use crate::image::{DirEnt, DiskImage, Inode, DIRENT_SIZE, ROOT_INODE, T_DIR, T_FILE};

/// A directory.
///
/// A directory is a [`File`] whose content is decoded as directory entries;
/// the composition keeps all block chain handling in one place. The content
/// is re-read from the image on every enumeration, trading speed for
/// correctness under external modification.
pub struct Directory {
    file: File,
}

impl Directory {
    pub(crate) fn from_file(file: File) -> Self {
        Self { file }
    }

    /// Returns the root directory, at inode [`ROOT_INODE`].
    pub fn root(image: &mut DiskImage) -> Result<Self> {
        let inode = image.get_inode(ROOT_INODE)?;
        if inode.typ != T_DIR {
            return Err(Error::TypeMismatch {
                inum: ROOT_INODE,
                typ: inode.typ,
            });
        }
        Ok(Self::from_file(File::new(
            ROOT_INODE,
            inode,
            String::new(),
        )))
    }

    /// Loads the directory with inode number `inum`.
    ///
    /// `name` is the name the directory is being reached under.
    pub fn open(image: &mut DiskImage, inum: u32, name: &str) -> Result<Self> {
        let inode = image.get_inode(inum)?;
        if inode.typ != T_DIR {
            return Err(Error::NotDir);
        }
        Ok(Self::from_file(File::new(inum, inode, name.to_owned())))
    }

    /// Returns the directory's name.
    pub fn name(&self) -> &str {
        self.file.name()
    }

    /// Returns the directory's inode number.
    pub fn inode_num(&self) -> u32 {
        self.file.inode_num()
    }

    /// Returns the size of the directory's content in bytes.
    pub fn size(&self) -> u64 {
        self.file.size()
    }

    /// Decodes and resolves the directory's entries.
    ///
    /// Free slots (`inum == 0`) are skipped. Each surviving entry is resolved
    /// against the inode table and yielded as a [`Entry::File`] or
    /// [`Entry::Directory`] according to its type.
    pub fn entries(&self, image: &mut DiskImage) -> Result<Vec<Entry>> {
        let data = self.file.read(image)?;
        let mut entries = Vec::with_capacity(data.len() / DIRENT_SIZE);
        for raw in data.chunks_exact(DIRENT_SIZE) {
            let ent = DirEnt::decode(raw);
            if ent.inum == 0 {
                continue;
            }
            let inode = image.get_inode(ent.inum as u32)?;
            entries.push(Entry::from_inode(ent.inum as u32, inode, ent.name_str())?);
        }
        Ok(entries)
    }

    /// Creates an empty regular file named `name` in the directory.
    pub fn add_file(&mut self, image: &mut DiskImage, name: &str) -> Result<File> {
        self.check_absent(image, name)?;
        let inum = image.alloc_inode()?;
        let inode = Inode {
            typ: T_FILE,
            nlink: 1,
            ..Default::default()
        };
        // Claim the slot before anything else can scan for it
        image.set_inode(inum, &inode)?;
        self.append_entry(image, DirEnt::new(inum, name))?;
        Ok(File::new(inum, inode, name.to_owned()))
    }

    /// Creates an empty directory named `name`, containing `.` and `..`.
    ///
    /// The parent gains a link, held by the child's `..` entry.
    pub fn add_directory(&mut self, image: &mut DiskImage, name: &str) -> Result<Directory> {
        self.check_absent(image, name)?;
        let inum = image.alloc_inode()?;
        let inode = Inode {
            typ: T_DIR,
            nlink: 1,
            ..Default::default()
        };
        image.set_inode(inum, &inode)?;

        let mut child = File::new(inum, inode, name.to_owned());
        let mut content = Vec::with_capacity(2 * DIRENT_SIZE);
        content.extend_from_slice(&DirEnt::new(inum, ".").encode());
        content.extend_from_slice(&DirEnt::new(self.inode_num(), "..").encode());
        child.write(image, &content)?;

        self.bump_nlink(image, 1)?;
        self.append_entry(image, DirEnt::new(inum, name))?;
        Ok(Self::from_file(child))
    }

    /// Adds an entry named `name` for the already existing inode `inum`,
    /// incrementing its link count.
    pub fn link_entry(&mut self, image: &mut DiskImage, name: &str, inum: u32) -> Result<()> {
        self.check_absent(image, name)?;
        let mut inode = image.get_inode(inum)?;
        inode.nlink += 1;
        image.set_inode(inum, &inode)?;
        self.append_entry(image, DirEnt::new(inum, name))
    }

    /// Removes the entry named `name`, rebuilding the content without it.
    ///
    /// The inode the entry pointed to is left alone; dropping its link is the
    /// caller's separate step.
    pub fn remove_entry(&mut self, image: &mut DiskImage, name: &str) -> Result<()> {
        let data = self.file.read(image)?;
        let mut content = Vec::with_capacity(data.len());
        for raw in data.chunks_exact(DIRENT_SIZE) {
            if DirEnt::decode(raw).name_str() != name {
                content.extend_from_slice(raw);
            }
        }
        self.file.write(image, &content)
    }

    /// Renames the entry `old` to `new`, keeping its inode number.
    pub fn rename_entry(&mut self, image: &mut DiskImage, old: &str, new: &str) -> Result<()> {
        self.check_absent(image, new)?;
        let data = self.file.read(image)?;
        let mut content = Vec::with_capacity(data.len());
        for raw in data.chunks_exact(DIRENT_SIZE) {
            let ent = DirEnt::decode(raw);
            if ent.inum != 0 && ent.name_str() == old {
                content.extend_from_slice(&DirEnt::new(ent.inum as u32, new).encode());
            } else {
                content.extend_from_slice(raw);
            }
        }
        self.file.write(image, &content)
    }

    /// Deletes the directory.
    ///
    /// Only an empty directory (contents at most `.` and `..`) can be
    /// deleted. The link the parent held through `..` is dropped, then the
    /// directory itself is deleted like a file.
    pub fn delete(self, image: &mut DiskImage) -> Result<()> {
        let entries = self.entries(image)?;
        if entries.iter().any(|e| e.name() != "." && e.name() != "..") {
            return Err(Error::NotEmpty);
        }
        if let Some(parent) = entries.iter().find(|e| e.name() == "..") {
            let parent_num = parent.inode_num();
            // The root's `..` points back to itself
            if parent_num != self.inode_num() {
                let mut inode = image.get_inode(parent_num)?;
                inode.nlink -= 1;
                image.set_inode(parent_num, &inode)?;
            }
        }
        self.file.delete(image)
    }

    /// Returns an error if an entry named `name` exists.
    fn check_absent(&self, image: &mut DiskImage, name: &str) -> Result<()> {
        let data = self.file.read(image)?;
        for raw in data.chunks_exact(DIRENT_SIZE) {
            let ent = DirEnt::decode(raw);
            if ent.inum != 0 && ent.name_str() == name {
                return Err(Error::Exists(name.to_owned()));
            }
        }
        Ok(())
    }

    /// Appends `ent` to the directory's content.
    fn append_entry(&mut self, image: &mut DiskImage, ent: DirEnt) -> Result<()> {
        let mut data = self.file.read(image)?;
        data.extend_from_slice(&ent.encode());
        self.file.write(image, &data)
    }

    /// Adjusts the directory's own link count by `delta` and persists it.
    fn bump_nlink(&mut self, image: &mut DiskImage, delta: i16) -> Result<()> {
        let inode = self.file.inode_mut();
        inode.nlink += delta;
        let inode = *inode;
        image.set_inode(self.inode_num(), &inode)
    }
}
