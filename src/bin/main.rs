/*
 * Copyright 2026 The blockfs authors
 *
 * This file is part of blockfs.
 *
 * blockfs is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * blockfs is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * blockfs. If not, see <https://www.gnu.org/licenses/>.
 */

//! `blockfs-cli` drives a single `blockfs` image: format it, and list,
//! read, write, and remove files inside it.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::exit;

use blockfs::dir::{self, DirectoryEntry};
use blockfs::{Disk, Error};

struct Args {
    prog: String,
    command: String,
    rest: Vec<String>,
}

fn parse_args() -> Args {
    let mut iter = env::args();
    let prog = iter.next().unwrap_or_else(|| "blockfs-cli".to_owned());
    let command = iter.next().unwrap_or_default();
    let rest = iter.collect();
    Args { prog, command, rest }
}

fn usage(prog: &str) -> ! {
    eprintln!("usage: {prog} format <path>");
    eprintln!("       {prog} ls <path> <fs-path>");
    eprintln!("       {prog} cat <path> <fs-path>");
    eprintln!("       {prog} put <path> <fs-path> <local-file>");
    eprintln!("       {prog} mkdir <path> <fs-path>");
    eprintln!("       {prog} rm <path> <fs-path>");
    exit(1);
}

fn split_parent_and_name(fs_path: &str) -> (&[u8], &[u8]) {
    let bytes = fs_path.as_bytes();
    match bytes.iter().rposition(|&b| b == b'/') {
        Some(i) => (&bytes[..i], &bytes[i + 1..]),
        None => (&[], bytes),
    }
}

fn fail(prog: &str, context: &str, e: Error) -> ! {
    eprintln!("{prog}: {context}: {e}");
    exit(1);
}

fn main() {
    let args = parse_args();

    match args.command.as_str() {
        "format" => cmd_format(&args),
        "ls" => cmd_ls(&args),
        "cat" => cmd_cat(&args),
        "put" => cmd_put(&args),
        "mkdir" => cmd_mkdir(&args),
        "rm" => cmd_rm(&args),
        _ => usage(&args.prog),
    }
}

fn cmd_format(args: &Args) {
    let [image_path] = args.rest.as_slice() else {
        usage(&args.prog);
    };
    let path = PathBuf::from(image_path);
    let mut disk = Disk::format_and_mount(&path).unwrap_or_else(|e| fail(&args.prog, image_path, e));
    disk.unmount().unwrap_or_else(|e| fail(&args.prog, image_path, e));
}

fn cmd_ls(args: &Args) {
    let [image_path, fs_path] = args.rest.as_slice() else {
        usage(&args.prog);
    };
    let mut disk = mount(args, image_path);
    let inode_number = disk
        .resolve(fs_path.as_bytes())
        .unwrap_or_else(|e| fail(&args.prog, fs_path, e));
    let listing = disk
        .read_all(inode_number)
        .unwrap_or_else(|e| fail(&args.prog, fs_path, e))
        .into_vec();

    let mut pos = 0;
    while pos < listing.len() {
        let (entry, next): (DirectoryEntry, usize) =
            dir::read_next_entry(&listing, pos).unwrap_or_else(|e| fail(&args.prog, fs_path, e));
        println!("{}\t{}", entry.inode_number, String::from_utf8_lossy(&entry.name));
        pos = next;
    }

    disk.unmount().unwrap_or_else(|e| fail(&args.prog, image_path, e));
}

fn cmd_cat(args: &Args) {
    let [image_path, fs_path] = args.rest.as_slice() else {
        usage(&args.prog);
    };
    let mut disk = mount(args, image_path);
    let inode_number = disk
        .resolve(fs_path.as_bytes())
        .unwrap_or_else(|e| fail(&args.prog, fs_path, e));
    let data = disk
        .read_all(inode_number)
        .unwrap_or_else(|e| fail(&args.prog, fs_path, e));
    print!("{}", String::from_utf8_lossy(data.as_slice()));

    disk.unmount().unwrap_or_else(|e| fail(&args.prog, image_path, e));
}

fn cmd_put(args: &Args) {
    let [image_path, fs_path, local_path] = args.rest.as_slice() else {
        usage(&args.prog);
    };
    let mut disk = mount(args, image_path);
    let (parent, name) = split_parent_and_name(fs_path);

    let inode_number = match disk.resolve(fs_path.as_bytes()) {
        Ok(n) => n,
        Err(Error::InodeNotFound) => disk
            .create_file(parent, name, false)
            .unwrap_or_else(|e| fail(&args.prog, fs_path, e)),
        Err(e) => fail(&args.prog, fs_path, e),
    };

    let data = fs::read(Path::new(local_path)).unwrap_or_else(|e| {
        eprintln!("{}: {}: {}", args.prog, local_path, e);
        exit(1);
    });
    disk.write_file(inode_number, &data)
        .unwrap_or_else(|e| fail(&args.prog, fs_path, e));

    disk.unmount().unwrap_or_else(|e| fail(&args.prog, image_path, e));
}

fn cmd_mkdir(args: &Args) {
    let [image_path, fs_path] = args.rest.as_slice() else {
        usage(&args.prog);
    };
    let mut disk = mount(args, image_path);
    let (parent, name) = split_parent_and_name(fs_path);
    disk.create_file(parent, name, true)
        .unwrap_or_else(|e| fail(&args.prog, fs_path, e));

    disk.unmount().unwrap_or_else(|e| fail(&args.prog, image_path, e));
}

fn cmd_rm(args: &Args) {
    let [image_path, fs_path] = args.rest.as_slice() else {
        usage(&args.prog);
    };
    let mut disk = mount(args, image_path);
    let (parent, name) = split_parent_and_name(fs_path);
    disk.remove_entry(parent, name)
        .unwrap_or_else(|e| fail(&args.prog, fs_path, e));

    disk.unmount().unwrap_or_else(|e| fail(&args.prog, image_path, e));
}

fn mount(args: &Args, image_path: &str) -> Disk {
    Disk::mount(Path::new(image_path)).unwrap_or_else(|e| fail(&args.prog, image_path, e))
}
