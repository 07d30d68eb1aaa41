//! The `mkfs` tool creates an xv6 file system on a device or image file.

use std::env::ArgsOs;
use std::fs::OpenOptions;
use std::io;
use std::io::BufRead;
use std::io::Write;
use std::path::PathBuf;
use std::process::exit;
use xv6fs::error;
use xv6fs::format::{format, is_present, FormatOptions};

/// Structure storing command line arguments.
struct Args {
    /// If true, print command line help.
    help: bool,
    /// The total number of blocks in the file system.
    size: u32,
    /// The number of inodes in the file system.
    ninodes: u32,
    /// The path to the device file on which the file system will be created.
    device_path: Option<PathBuf>,
}

impl Default for Args {
    fn default() -> Self {
        let defaults = FormatOptions::default();
        Self {
            help: false,
            size: defaults.size,
            ninodes: defaults.ninodes,
            device_path: None,
        }
    }
}

fn parse_args(bin: &str, mut args: ArgsOs) -> Args {
    let mut res: Args = Default::default();
    while let Some(arg) = args.next() {
        match arg.to_str() {
            Some("-h" | "--help") => res.help = true,
            Some(opt @ ("-s" | "--size")) => res.size = parse_count(bin, opt, args.next()),
            Some(opt @ ("-i" | "--inodes")) => res.ninodes = parse_count(bin, opt, args.next()),
            _ => {
                if res.device_path.is_some() {
                    error(bin, "only one device may be given");
                }
                res.device_path = Some(PathBuf::from(arg));
            }
        }
    }
    res
}

fn parse_count(bin: &str, opt: &str, val: Option<std::ffi::OsString>) -> u32 {
    val.and_then(|v| v.into_string().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| {
            error(bin, format_args!("option `{opt}` requires a block count"));
        })
}

/// Prints the command's usage.
///
/// `bin` is the name of the current binary.
fn print_usage(bin: &str) {
    eprintln!("Usage:");
    eprintln!(" {bin} [-h]");
    eprintln!(" {bin} [-s blocks] [-i inodes] <device>");
    eprintln!();
    eprintln!("Options:");
    eprintln!(" -h:\t\tprints usage");
    eprintln!(" -s blocks:\ttotal number of blocks (default 1000)");
    eprintln!(" -i inodes:\tnumber of inodes (default 200)");
    eprintln!(" device:\tthe device or image file to create the file system on");
}

/// Asks for confirmation on stdin.
fn confirm(msg: &str) -> bool {
    print!("{msg}");
    let _ = io::stdout().flush();
    let input = io::stdin()
        .lock()
        .lines()
        .next()
        .and_then(|l| l.ok())
        .unwrap_or_default();
    input.trim().to_lowercase() == "y"
}

fn main() {
    let (bin, args) = xv6fs::args();
    let args = parse_args(&bin, args);
    if args.help {
        print_usage(&bin);
        exit(0);
    }
    let device_path = args.device_path.unwrap_or_else(|| {
        error(&bin, "specify path to a device");
    });
    let mut dev = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(&device_path)
        .unwrap_or_else(|e| {
            error(&bin, format_args!("{}: {e}", device_path.display()));
        });

    let present = is_present(&mut dev).unwrap_or_else(|e| {
        error(&bin, format_args!("{}: {e}", device_path.display()));
    });
    if present {
        println!(
            "{} already contains an xv6 file system",
            device_path.display()
        );
        if !confirm("Proceed anyway? (y/N) ") {
            eprintln!("Abort.");
            exit(1);
        }
    }

    let options = FormatOptions {
        size: args.size,
        ninodes: args.ninodes,
        ..Default::default()
    };
    format(&mut dev, &options).unwrap_or_else(|e| {
        error(&bin, format_args!("failed to create file system: {e}"));
    });
}
