//! The FUSE adapter, translating kernel callbacks into core operations.
//!
//! FUSE addresses objects by inode number, which maps one to one onto the
//! image's inode numbers; the root of the mount is inode 1 on both sides.
//! Modes are fixed (0755 for directories, 0644 for files) and timestamps are
//! not stored by the on-disk format.

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyWrite, Request, TimeOrNow,
};
use log::debug;
use std::ffi::c_int;
use std::ffi::OsStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use xv6fs::fs::{Directory, Entry, File};
use xv6fs::image::{DiskImage, Inode, BLOCK_SIZE, MAX_FILE_SIZE, T_DIR, T_UNUSED};
use xv6fs::Error;

/// Validity period handed to the kernel for attributes and entries.
const TTL: Duration = Duration::from_secs(1);

/// Maps a core error to an errno value.
fn errno(err: &Error) -> c_int {
    match err {
        Error::Io(_) => libc::EIO,
        Error::OutOfRange { .. } => libc::EIO,
        Error::NoSpace(_) => libc::ENOSPC,
        Error::Exists(_) => libc::EEXIST,
        Error::NotFound(_) => libc::ENOENT,
        Error::NotDir => libc::ENOTDIR,
        Error::IsDir => libc::EISDIR,
        Error::TypeMismatch { .. } => libc::EIO,
        Error::NotEmpty => libc::ENOTEMPTY,
    }
}

/// The mounted file system.
pub struct Xv6Fs {
    /// The image being served.
    image: DiskImage,
    /// Owner reported for every object.
    uid: u32,
    /// Group reported for every object.
    gid: u32,
}

impl Xv6Fs {
    /// Creates the file system over an open image.
    pub fn new(image: DiskImage) -> Self {
        Self {
            image,
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
        }
    }

    /// Builds the attributes of inode `inum`.
    fn attr(&self, inum: u32, inode: &Inode) -> FileAttr {
        let dir = inode.typ == T_DIR;
        FileAttr {
            ino: inum as u64,
            size: inode.size as u64,
            blocks: (inode.size as u64).div_ceil(BLOCK_SIZE as u64),
            atime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
            crtime: UNIX_EPOCH,
            kind: if dir {
                FileType::Directory
            } else {
                FileType::RegularFile
            },
            perm: if dir { 0o755 } else { 0o644 },
            nlink: inode.nlink as u32,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE as u32,
            flags: 0,
        }
    }

    /// Reads the attributes of inode `inum` back from the image.
    fn attr_of(&mut self, inum: u32) -> Result<FileAttr, c_int> {
        let inode = self.image.get_inode(inum).map_err(|e| errno(&e))?;
        if inode.typ == T_UNUSED {
            return Err(libc::ENOENT);
        }
        Ok(self.attr(inum, &inode))
    }

    /// Resolves the entry `name` in the directory at inode `parent`.
    fn lookup_entry(&mut self, parent: u64, name: &OsStr) -> Result<Entry, c_int> {
        let name = name.to_str().ok_or(libc::ENOENT)?;
        let dir = Directory::open(&mut self.image, parent as u32, "").map_err(|e| errno(&e))?;
        dir.entries(&mut self.image)
            .map_err(|e| errno(&e))?
            .into_iter()
            .find(|ent| ent.name() == name)
            .ok_or(libc::ENOENT)
    }
}

impl Filesystem for Xv6Fs {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        debug!("lookup: parent={parent}, name={name:?}");
        match self
            .lookup_entry(parent, name)
            .and_then(|ent| self.attr_of(ent.inode_num()))
        {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        debug!("getattr: ino={ino}");
        match self.attr_of(ino as u32) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(errno) => reply.error(errno),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        debug!("setattr: ino={ino}, size={size:?}");
        if let Some(size) = size {
            let res = File::load(&mut self.image, ino as u32, "").and_then(|mut file| {
                if size < file.size() {
                    file.truncate(&mut self.image, size)
                } else if size > file.size() {
                    // Extending has no dedicated path: rewrite with a
                    // zero-filled tail
                    let mut data = file.read(&mut self.image)?;
                    data.resize((size as usize).min(MAX_FILE_SIZE), 0);
                    file.write(&mut self.image, &data)
                } else {
                    Ok(())
                }
            });
            if let Err(e) = res {
                reply.error(errno(&e));
                return;
            }
        }
        match self.attr_of(ino as u32) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(errno) => reply.error(errno),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        debug!("read: ino={ino}, offset={offset}, size={size}");
        let res = File::load(&mut self.image, ino as u32, "")
            .and_then(|file| file.read(&mut self.image));
        match res {
            Ok(data) => {
                let start = (offset.max(0) as usize).min(data.len());
                let end = (start + size as usize).min(data.len());
                reply.data(&data[start..end]);
            }
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        debug!("write: ino={ino}, offset={offset}, len={}", data.len());
        // The core replaces whole contents, so splice the chunk into the
        // current bytes first
        let res = File::load(&mut self.image, ino as u32, "").and_then(|mut file| {
            let mut content = file.read(&mut self.image)?;
            let start = offset.max(0) as usize;
            let end = start + data.len();
            if content.len() < end {
                content.resize(end, 0);
            }
            content[start..end].copy_from_slice(data);
            file.write(&mut self.image, &content)
        });
        match res {
            Ok(()) => reply.written(data.len() as u32),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!("readdir: ino={ino}, offset={offset}");
        let res = Directory::open(&mut self.image, ino as u32, "")
            .and_then(|dir| dir.entries(&mut self.image));
        let entries = match res {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(errno(&e));
                return;
            }
        };
        for (i, ent) in entries.iter().enumerate().skip(offset.max(0) as usize) {
            let kind = if ent.is_dir() {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            if reply.add(ent.inode_num() as u64, (i + 1) as i64, kind, ent.name()) {
                break;
            }
        }
        reply.ok();
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        debug!("create: parent={parent}, name={name:?}");
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        let res = Directory::open(&mut self.image, parent as u32, "")
            .and_then(|mut dir| dir.add_file(&mut self.image, name));
        match res {
            Ok(file) => match self.attr_of(file.inode_num()) {
                Ok(attr) => reply.created(&TTL, &attr, 0, 0, 0),
                Err(errno) => reply.error(errno),
            },
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        debug!("mkdir: parent={parent}, name={name:?}");
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        let res = Directory::open(&mut self.image, parent as u32, "")
            .and_then(|mut dir| dir.add_directory(&mut self.image, name));
        match res {
            Ok(dir) => match self.attr_of(dir.inode_num()) {
                Ok(attr) => reply.entry(&TTL, &attr, 0),
                Err(errno) => reply.error(errno),
            },
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!("unlink: parent={parent}, name={name:?}");
        let file = match self.lookup_entry(parent, name) {
            Ok(Entry::File(file)) => file,
            Ok(Entry::Directory(_)) => {
                reply.error(libc::EISDIR);
                return;
            }
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        let res = file.delete(&mut self.image).and_then(|_| {
            let mut dir = Directory::open(&mut self.image, parent as u32, "")?;
            dir.remove_entry(&mut self.image, &name.to_string_lossy())
        });
        match res {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!("rmdir: parent={parent}, name={name:?}");
        let dir = match self.lookup_entry(parent, name) {
            Ok(Entry::Directory(dir)) => dir,
            Ok(Entry::File(_)) => {
                reply.error(libc::ENOTDIR);
                return;
            }
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        // The parent's inode changes underneath here (`..` drops a link), so
        // it is reopened before rewriting its content
        let res = dir.delete(&mut self.image).and_then(|_| {
            let mut parent_dir = Directory::open(&mut self.image, parent as u32, "")?;
            parent_dir.remove_entry(&mut self.image, &name.to_string_lossy())
        });
        match res {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        debug!("rename: parent={parent}, name={name:?}, newparent={newparent}, newname={newname:?}");
        let (Some(old), Some(new)) = (name.to_str(), newname.to_str()) else {
            reply.error(libc::EINVAL);
            return;
        };
        let entry = match self.lookup_entry(parent, name) {
            Ok(entry) => entry,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        let res = if parent == newparent {
            Directory::open(&mut self.image, parent as u32, "")
                .and_then(|mut dir| dir.rename_entry(&mut self.image, old, new))
        } else {
            // Moving a directory would have to rewrite its `..`; not
            // supported by the on-disk format's tooling
            if entry.is_dir() {
                reply.error(libc::EPERM);
                return;
            }
            let inum = entry.inode_num();
            Directory::open(&mut self.image, newparent as u32, "")
                .and_then(|mut dir| dir.link_entry(&mut self.image, new, inum))
                .and_then(|_| {
                    let mut dir = Directory::open(&mut self.image, parent as u32, "")?;
                    dir.remove_entry(&mut self.image, old)
                })
                .and_then(|_| {
                    // link_entry took a reference for the new name; give back
                    // the one the removed entry held
                    let mut inode = self.image.get_inode(inum)?;
                    inode.nlink -= 1;
                    self.image.set_inode(inum, &inode)
                })
        };
        match res {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno(&e)),
        }
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        debug!("link: ino={ino}, newparent={newparent}, newname={newname:?}");
        let Some(name) = newname.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        match self.image.get_inode(ino as u32) {
            Ok(inode) if inode.typ == T_DIR => {
                reply.error(libc::EPERM);
                return;
            }
            Ok(_) => {}
            Err(e) => {
                reply.error(errno(&e));
                return;
            }
        }
        let res = Directory::open(&mut self.image, newparent as u32, "")
            .and_then(|mut dir| dir.link_entry(&mut self.image, name, ino as u32));
        match res {
            Ok(()) => match self.attr_of(ino as u32) {
                Ok(attr) => reply.entry(&TTL, &attr, 0),
                Err(errno) => reply.error(errno),
            },
            Err(e) => reply.error(errno(&e)),
        }
    }
}
