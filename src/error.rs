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

//! Errors shared by every layer of the crate.

use std::io;
use thiserror::Error;

/// Result of an operation on an xv6 image.
pub type Result<T> = std::result::Result<T, Error>;

/// An error returned by an operation on an xv6 image.
///
/// Operations are not transactional: a failure in the middle of a write can
/// leave leaked bitmap bits or an inode whose size disagrees with its block
/// chain. Recovery requires offline repair.
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying image read or write failed.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// An inode or block index fell outside its on-disk region.
    #[error("{region} index {index} out of range")]
    OutOfRange {
        /// The region the index was checked against.
        region: &'static str,
        /// The offending index.
        index: u64,
    },
    /// The image has no free inode or data block left.
    #[error("no free {0} left")]
    NoSpace(&'static str),
    /// A directory entry with the requested name already exists.
    #[error("entry `{0}` already exists")]
    Exists(String),
    /// No entry with the requested name exists.
    #[error("`{0}` not found")]
    NotFound(String),
    /// The operation expected a directory.
    #[error("not a directory")]
    NotDir,
    /// The operation expected a regular file.
    #[error("is a directory")]
    IsDir,
    /// An inode's type disagrees with what its references imply.
    #[error("inode {inum} has unexpected type {typ}")]
    TypeMismatch {
        /// The inode number.
        inum: u32,
        /// The type read from the inode table.
        typ: i16,
    },
    /// The directory still contains entries besides `.` and `..`.
    #[error("directory not empty")]
    NotEmpty,
}
