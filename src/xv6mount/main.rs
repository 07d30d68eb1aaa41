//! The `xv6mount` tool mounts an xv6 file system image through FUSE.

mod fuse;

use fuser::MountOption;
use std::process::exit;
use xv6fs::error;
use xv6fs::fs::Directory;
use xv6fs::image::DiskImage;

/// Prints the command's usage.
///
/// `bin` is the name of the current binary.
fn print_usage(bin: &str) {
    eprintln!("Usage:");
    eprintln!(" {bin} [-h]");
    eprintln!(" {bin} <image> <mount point>");
    eprintln!();
    eprintln!("Options:");
    eprintln!(" -h:\t\tprints usage");
    eprintln!(" image:\t\tthe file system image to mount");
    eprintln!(" mount point:\tthe directory on which the file system is to be mounted");
}

fn main() {
    env_logger::init();

    let (bin, args) = xv6fs::args();
    let args: Vec<String> = args.filter_map(|a| a.into_string().ok()).collect();
    let a: Vec<&str> = args.iter().map(String::as_str).collect();
    match a[..] {
        ["-h" | "--help"] => {
            print_usage(&bin);
            exit(0);
        }

        [image_path, mount_point] => {
            let mut image = DiskImage::open(image_path).unwrap_or_else(|e| {
                error(&bin, format_args!("{image_path}: {e}"));
            });
            // Fail before mounting if the root inode is unusable
            Directory::root(&mut image).unwrap_or_else(|e| {
                error(&bin, format_args!("{image_path}: {e}"));
            });

            let options = [MountOption::FSName("xv6fs".to_owned())];
            fuser::mount2(fuse::Xv6Fs::new(image), mount_point, &options).unwrap_or_else(|e| {
                error(&bin, format_args!("{mount_point}: {e}"));
            });
        }

        _ => {
            print_usage(&bin);
            exit(1);
        }
    }
}
