//! Mounts an ext2 image, stats the root directory, and lists its
//! entries.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use ext2rd::{Drive, FileVolume};

/// Inspect an ext2 volume.
#[derive(Parser)]
struct Cli {
    /// Path to the device or image file
    drive: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let file = match OpenOptions::new().read(true).write(true).open(&cli.drive) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("failed to open {}: {err}", cli.drive.display());
            return ExitCode::FAILURE;
        }
    };

    let drive = match Drive::try_mount(Box::new(FileVolume(file))) {
        Ok(drive) => drive,
        Err(err) => {
            eprintln!("failed to mount {}: {err}", cli.drive.display());
            return ExitCode::FAILURE;
        }
    };

    let stat = match drive.stat("/", "") {
        Ok(stat) => stat,
        Err(err) => {
            eprintln!("failed to stat /: {err}");
            return ExitCode::FAILURE;
        }
    };
    println!("inode {}", stat.ino);
    println!("    size:   {}", stat.size);
    println!("    blocks: {}", stat.blocks);
    println!("    links:  {}", stat.links);
    println!("    mode:   {:o}", stat.mode);
    println!("    uid:    {}", stat.uid);
    println!("    gid:    {}", stat.gid);
    println!("    atime:  {}", stat.atime);
    println!("    mtime:  {}", stat.mtime);
    println!("    ctime:  {}", stat.ctime);

    let dir = match drive.open_dir("/", "") {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("failed to open /: {err}");
            return ExitCode::FAILURE;
        }
    };
    println!("directory:");
    for entry in &dir {
        match entry {
            Ok(entry) => println!("    {}", String::from_utf8_lossy(&entry.name)),
            Err(err) => {
                eprintln!("failed to read directory: {err}");
                return ExitCode::FAILURE;
            }
        }
    }
    drop(dir);

    if let Err(err) = drive.unmount() {
        eprintln!("failed to unmount: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
