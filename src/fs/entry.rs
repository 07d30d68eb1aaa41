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

//! The polymorphic view over a directory's children.

use super::directory::Directory;
use super::file::File;
use crate::error::{Error, Result};
use crate::image::{Inode, T_DIR, T_UNUSED};

/// A directory entry resolved to the object it points to.
pub enum Entry {
    /// A regular file (or device node, which is read the same way).
    File(File),
    /// A directory.
    Directory(Directory),
}

impl Entry {
    /// Wraps an inode loaded during enumeration.
    ///
    /// A referenced inode must not be unused; finding one means the directory
    /// and the inode table disagree.
    pub(crate) fn from_inode(inum: u32, inode: Inode, name: String) -> Result<Self> {
        match inode.typ {
            T_UNUSED => Err(Error::TypeMismatch {
                inum,
                typ: inode.typ,
            }),
            T_DIR => Ok(Self::Directory(Directory::from_file(File::new(
                inum, inode, name,
            )))),
            _ => Ok(Self::File(File::new(inum, inode, name))),
        }
    }

    /// Returns whether the entry is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Directory(_))
    }

    /// Returns the entry's name.
    pub fn name(&self) -> &str {
        match self {
            Self::File(file) => file.name(),
            Self::Directory(dir) => dir.name(),
        }
    }

    /// Returns the entry's inode number.
    pub fn inode_num(&self) -> u32 {
        match self {
            Self::File(file) => file.inode_num(),
            Self::Directory(dir) => dir.inode_num(),
        }
    }

    /// Returns the size of the entry's content in bytes.
    pub fn size(&self) -> u64 {
        match self {
            Self::File(file) => file.size(),
            Self::Directory(dir) => dir.size(),
        }
    }
}
