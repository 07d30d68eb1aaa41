//! End to end tests of the file system core, run against scratch images.

use std::collections::BTreeSet;
use tempfile::NamedTempFile;
use xv6fs::format::{format, FormatOptions};
use xv6fs::fs::{Directory, Entry, File};
use xv6fs::image::{DiskImage, NDIRECT, ROOT_INODE, T_DIR, T_FILE, T_UNUSED};
use xv6fs::Error;

/// Formats a fresh image and opens it.
fn scratch(size: u32, ninodes: u32) -> (NamedTempFile, DiskImage) {
    let mut tmp = NamedTempFile::new().unwrap();
    let options = FormatOptions {
        size,
        ninodes,
        nlog: 30,
    };
    format(tmp.as_file_mut(), &options).unwrap();
    let image = DiskImage::open(tmp.path()).unwrap();
    (tmp, image)
}

/// Returns the allocation state of every data block.
fn data_bitmap(image: &mut DiskImage) -> Vec<bool> {
    let sb = *image.super_block();
    (sb.data_start() as u32..sb.size)
        .map(|n| image.get_bitmap(n).unwrap())
        .collect()
}

/// Returns every data block reachable from a used inode, indirect blocks
/// included.
fn referenced_blocks(image: &mut DiskImage) -> BTreeSet<u32> {
    let sb = *image.super_block();
    let mut blocks = BTreeSet::new();
    for n in 0..sb.ninodes {
        let inode = image.get_inode(n).unwrap();
        if inode.typ == T_UNUSED {
            continue;
        }
        for &addr in &inode.addrs[..NDIRECT] {
            if addr != 0 {
                blocks.insert(addr);
            }
        }
        let indirect = inode.addrs[NDIRECT];
        if indirect != 0 {
            blocks.insert(indirect);
            let block = image.get_data(indirect).unwrap();
            for raw in block.chunks_exact(4) {
                let addr = u32::from_le_bytes(raw.try_into().unwrap());
                if addr != 0 {
                    blocks.insert(addr);
                }
            }
        }
    }
    blocks
}

/// Checks that the bitmap's data region agrees exactly with the blocks
/// reachable from the inode table.
fn assert_bitmap_consistent(image: &mut DiskImage) {
    let sb = *image.super_block();
    let referenced = referenced_blocks(image);
    for (i, used) in data_bitmap(image).into_iter().enumerate() {
        let n = sb.data_start() as u32 + i as u32;
        assert_eq!(
            used,
            referenced.contains(&n),
            "bitmap disagrees with inode table for block {n}"
        );
    }
}

/// Content with no repeating 512-byte period, zeros included.
fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn fresh_image_root_entries() {
    let (_tmp, mut image) = scratch(1000, 200);
    let root = Directory::root(&mut image).unwrap();
    assert_eq!(root.inode_num(), ROOT_INODE);

    let entries = root.entries(&mut image).unwrap();
    let names: Vec<&str> = entries.iter().map(Entry::name).collect();
    assert_eq!(names, [".", ".."]);
    for ent in &entries {
        assert!(ent.is_dir());
        assert_eq!(ent.inode_num(), ROOT_INODE);
    }
}

#[test]
fn write_survives_reopen() {
    let (tmp, mut image) = scratch(1000, 200);
    let mut root = Directory::root(&mut image).unwrap();
    let mut file = root.add_file(&mut image, "hello").unwrap();
    file.write(&mut image, b"world\n").unwrap();
    drop(image);

    let mut image = DiskImage::open(tmp.path()).unwrap();
    let root = Directory::root(&mut image).unwrap();
    let entries = root.entries(&mut image).unwrap();
    let ent = entries.iter().find(|e| e.name() == "hello").unwrap();
    assert_eq!(ent.size(), 6);
    let Entry::File(file) = entries.into_iter().find(|e| e.name() == "hello").unwrap() else {
        panic!("`hello` is not a file");
    };
    assert_eq!(file.read(&mut image).unwrap(), b"world\n");
}

#[test]
fn read_round_trips_across_sizes() {
    let (_tmp, mut image) = scratch(1000, 200);
    let mut root = Directory::root(&mut image).unwrap();
    let mut file = root.add_file(&mut image, "sizes").unwrap();
    // One block, unaligned tails, the direct/indirect boundary
    for len in [0, 1, 511, 512, 513, 2000, 12 * 512, 12 * 512 + 1] {
        let data = pattern(len);
        file.write(&mut image, &data).unwrap();
        assert_eq!(file.size(), len as u64);
        assert_eq!(file.read(&mut image).unwrap(), data, "length {len}");
    }
}

#[test]
fn large_file_uses_indirect_block() {
    let (_tmp, mut image) = scratch(1000, 200);
    let mut root = Directory::root(&mut image).unwrap();
    let mut file = root.add_file(&mut image, "big").unwrap();
    let data = pattern(70000);
    file.write(&mut image, &data).unwrap();
    assert_eq!(file.read(&mut image).unwrap(), data);

    let inode = image.get_inode(file.inode_num()).unwrap();
    assert!(inode.addrs[..NDIRECT].iter().all(|&a| a != 0));
    let indirect = inode.addrs[NDIRECT];
    assert_ne!(indirect, 0);

    // ceil(70000 / 512) - 12 = 125 blocks spill into the indirect block
    let block = image.get_data(indirect).unwrap();
    let addrs: Vec<u32> = block
        .chunks_exact(4)
        .map(|raw| u32::from_le_bytes(raw.try_into().unwrap()))
        .collect();
    assert!(addrs[..125].iter().all(|&a| a != 0));
    assert!(addrs[125..].iter().all(|&a| a == 0));

    assert_bitmap_consistent(&mut image);
}

#[test]
fn oversized_write_is_capped() {
    let (_tmp, mut image) = scratch(1000, 200);
    let mut root = Directory::root(&mut image).unwrap();
    let mut file = root.add_file(&mut image, "big").unwrap();
    let data = pattern(80000);
    file.write(&mut image, &data).unwrap();
    assert_eq!(file.size(), 71680);
    assert_eq!(file.read(&mut image).unwrap(), data[..71680]);
}

#[test]
fn duplicate_name_rejected() {
    let (_tmp, mut image) = scratch(1000, 200);
    let mut root = Directory::root(&mut image).unwrap();
    root.add_file(&mut image, "a").unwrap();
    assert!(matches!(
        root.add_file(&mut image, "a"),
        Err(Error::Exists(_))
    ));
    // A directory cannot take the name either
    assert!(matches!(
        root.add_directory(&mut image, "a"),
        Err(Error::Exists(_))
    ));
}

#[test]
fn rename_keeps_inode() {
    let (_tmp, mut image) = scratch(1000, 200);
    let mut root = Directory::root(&mut image).unwrap();
    let file = root.add_file(&mut image, "a").unwrap();
    let inum = file.inode_num();

    root.rename_entry(&mut image, "a", "b").unwrap();
    let entries = root.entries(&mut image).unwrap();
    assert!(entries.iter().all(|e| e.name() != "a"));
    let ent = entries.iter().find(|e| e.name() == "b").unwrap();
    assert_eq!(ent.inode_num(), inum);

    // Renaming over an existing name is rejected
    root.add_file(&mut image, "c").unwrap();
    assert!(matches!(
        root.rename_entry(&mut image, "b", "c"),
        Err(Error::Exists(_))
    ));
}

#[test]
fn truncate_is_idempotent() {
    let (_tmp, mut image) = scratch(1000, 200);
    let mut root = Directory::root(&mut image).unwrap();
    let mut file = root.add_file(&mut image, "t").unwrap();
    file.write(&mut image, &pattern(70000)).unwrap();

    file.truncate(&mut image, 600).unwrap();
    let content = file.read(&mut image).unwrap();
    let bitmap = data_bitmap(&mut image);

    file.truncate(&mut image, 600).unwrap();
    assert_eq!(file.read(&mut image).unwrap(), content);
    assert_eq!(data_bitmap(&mut image), bitmap);

    assert_eq!(content, pattern(70000)[..600]);
    assert_bitmap_consistent(&mut image);
}

#[test]
fn truncate_through_indirect_boundary() {
    let (_tmp, mut image) = scratch(1000, 200);
    let mut root = Directory::root(&mut image).unwrap();
    let mut file = root.add_file(&mut image, "t").unwrap();
    file.write(&mut image, &pattern(70000)).unwrap();

    // Keep 50 indirect slots: the indirect block itself must survive
    let keep = (NDIRECT + 50) * 512;
    file.truncate(&mut image, keep as u64).unwrap();
    let inode = image.get_inode(file.inode_num()).unwrap();
    assert_ne!(inode.addrs[NDIRECT], 0);
    assert_eq!(file.read(&mut image).unwrap(), pattern(70000)[..keep]);
    assert_bitmap_consistent(&mut image);

    // Dropping below the boundary frees the indirect block too
    file.truncate(&mut image, 600).unwrap();
    let inode = image.get_inode(file.inode_num()).unwrap();
    assert_eq!(inode.addrs[NDIRECT], 0);
    assert_bitmap_consistent(&mut image);
}

#[test]
fn delete_frees_inode_and_blocks() {
    let (_tmp, mut image) = scratch(1000, 200);
    let mut root = Directory::root(&mut image).unwrap();
    let mut file = root.add_file(&mut image, "doomed").unwrap();
    file.write(&mut image, &pattern(1024)).unwrap();
    let inum = file.inode_num();

    root.remove_entry(&mut image, "doomed").unwrap();
    file.delete(&mut image).unwrap();

    let inode = image.get_inode(inum).unwrap();
    assert_eq!(inode.typ, T_UNUSED);
    assert_eq!(inode.size, 0);
    assert!(inode.addrs.iter().all(|&a| a == 0));

    // The slot is immediately reusable
    assert_eq!(image.alloc_inode().unwrap(), inum);
    assert_bitmap_consistent(&mut image);
}

#[test]
fn directory_entry_stride() {
    let (_tmp, mut image) = scratch(1000, 200);
    let mut root = Directory::root(&mut image).unwrap();
    for name in ["a", "bb", "ccc", "a-much-longer-name"] {
        root.add_file(&mut image, name).unwrap();
    }
    root.remove_entry(&mut image, "bb").unwrap();

    let inode = image.get_inode(ROOT_INODE).unwrap();
    assert_eq!(inode.size % 16, 0);
    // Every listed entry resolves against the inode table
    for ent in root.entries(&mut image).unwrap() {
        let inode = image.get_inode(ent.inode_num()).unwrap();
        assert_ne!(inode.typ, T_UNUSED);
    }
}

#[test]
fn add_directory_creates_dot_entries() {
    let (_tmp, mut image) = scratch(1000, 200);
    let mut root = Directory::root(&mut image).unwrap();
    let sub = root.add_directory(&mut image, "sub").unwrap();

    let entries = sub.entries(&mut image).unwrap();
    let dot = entries.iter().find(|e| e.name() == ".").unwrap();
    let dotdot = entries.iter().find(|e| e.name() == "..").unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(dot.inode_num(), sub.inode_num());
    assert_eq!(dotdot.inode_num(), ROOT_INODE);

    // The child's `..` holds a link on the parent
    assert_eq!(image.get_inode(ROOT_INODE).unwrap().nlink, 2);
    assert_eq!(image.get_inode(sub.inode_num()).unwrap().nlink, 1);
    assert_eq!(image.get_inode(sub.inode_num()).unwrap().typ, T_DIR);
    assert_bitmap_consistent(&mut image);
}

#[test]
fn delete_directory_requires_empty() {
    let (_tmp, mut image) = scratch(1000, 200);
    let mut root = Directory::root(&mut image).unwrap();
    let mut sub = root.add_directory(&mut image, "sub").unwrap();
    let inner = sub.add_file(&mut image, "inner").unwrap();

    let sub2 = Directory::open(&mut image, sub.inode_num(), "sub").unwrap();
    assert!(matches!(sub2.delete(&mut image), Err(Error::NotEmpty)));

    sub.remove_entry(&mut image, "inner").unwrap();
    inner.delete(&mut image).unwrap();
    let inum = sub.inode_num();
    // Unlink from the parent first: deleting drops a link on the parent's
    // inode, which would go stale under a later rewrite of its content
    root.remove_entry(&mut image, "sub").unwrap();
    sub.delete(&mut image).unwrap();

    assert_eq!(image.get_inode(inum).unwrap().typ, T_UNUSED);
    // The `..` link is given back
    assert_eq!(image.get_inode(ROOT_INODE).unwrap().nlink, 1);
    assert_bitmap_consistent(&mut image);
}

#[test]
fn link_entry_shares_content() {
    let (_tmp, mut image) = scratch(1000, 200);
    let mut root = Directory::root(&mut image).unwrap();
    let mut file = root.add_file(&mut image, "first").unwrap();
    file.write(&mut image, b"shared bytes").unwrap();
    let inum = file.inode_num();

    root.link_entry(&mut image, "second", inum).unwrap();
    assert_eq!(image.get_inode(inum).unwrap().nlink, 2);

    // Dropping one name keeps the content alive through the other. The
    // handle is reloaded so it carries the link taken above.
    root.remove_entry(&mut image, "first").unwrap();
    let first = File::load(&mut image, inum, "first").unwrap();
    first.delete(&mut image).unwrap();
    assert_eq!(image.get_inode(inum).unwrap().nlink, 1);

    let entries = root.entries(&mut image).unwrap();
    let Entry::File(second) = entries.into_iter().find(|e| e.name() == "second").unwrap() else {
        panic!("`second` is not a file");
    };
    assert_eq!(second.inode_num(), inum);
    assert_eq!(second.read(&mut image).unwrap(), b"shared bytes");
    assert_bitmap_consistent(&mut image);
}

#[test]
fn mixed_workload_keeps_bitmap_consistent() {
    let (_tmp, mut image) = scratch(1000, 200);
    let mut root = Directory::root(&mut image).unwrap();

    let mut a = root.add_file(&mut image, "a").unwrap();
    a.write(&mut image, &pattern(20000)).unwrap();
    let mut sub = root.add_directory(&mut image, "sub").unwrap();
    let mut b = sub.add_file(&mut image, "b").unwrap();
    b.write(&mut image, &pattern(70000)).unwrap();
    b.truncate(&mut image, 100).unwrap();
    a.write(&mut image, &pattern(300)).unwrap();
    root.rename_entry(&mut image, "a", "renamed").unwrap();
    sub.remove_entry(&mut image, "b").unwrap();
    b.delete(&mut image).unwrap();

    assert_bitmap_consistent(&mut image);

    let root = Directory::root(&mut image).unwrap();
    let entries = root.entries(&mut image).unwrap();
    let Entry::File(renamed) = entries.into_iter().find(|e| e.name() == "renamed").unwrap() else {
        panic!("`renamed` is not a file");
    };
    assert_eq!(renamed.read(&mut image).unwrap(), pattern(300));
}

#[test]
fn data_blocks_run_out() {
    // 2 + 30 + 2 + 1 = 35 metadata blocks, leaving 15 for data
    let (_tmp, mut image) = scratch(50, 8);
    let mut root = Directory::root(&mut image).unwrap();
    let mut file = root.add_file(&mut image, "filler").unwrap();
    assert!(matches!(
        file.write(&mut image, &pattern(20 * 512)),
        Err(Error::NoSpace(_))
    ));
}

#[test]
fn inodes_run_out() {
    let (_tmp, mut image) = scratch(1000, 8);
    let mut root = Directory::root(&mut image).unwrap();
    // Inode 0 is reserved and 1 is the root: six slots remain
    for i in 0..6 {
        root.add_file(&mut image, &format!("f{i}")).unwrap();
    }
    assert!(matches!(
        root.add_file(&mut image, "straw"),
        Err(Error::NoSpace(_))
    ));
}

#[test]
fn root_must_be_a_directory() {
    let (_tmp, mut image) = scratch(1000, 200);
    let mut inode = image.get_inode(ROOT_INODE).unwrap();
    inode.typ = T_FILE;
    image.set_inode(ROOT_INODE, &inode).unwrap();
    assert!(matches!(
        Directory::root(&mut image),
        Err(Error::TypeMismatch { .. })
    ));
}
