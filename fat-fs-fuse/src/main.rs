//! Host-side driver: backs the block device with a disk image file and runs
//! the demonstration sequence (create, append, read, remove, read-after-
//! remove) against it.

use std::error::Error;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use clap::{App, Arg};
use fat_fs::{BlockDevice, FlatFs, FsError, BLOCK_SZ};
use log::info;

mod logging;

/// A disk image file exposed as a block device.
struct BlockFile(Mutex<File>);

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * BLOCK_SZ) as u64))
            .expect("error when seeking");
        assert_eq!(file.read(buf).unwrap(), BLOCK_SZ, "not a complete block");
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * BLOCK_SZ) as u64))
            .expect("error when seeking");
        assert_eq!(file.write(buf).unwrap(), BLOCK_SZ, "not a complete block");
    }

    fn num_blocks(&self) -> usize {
        let file = self.0.lock().unwrap();
        file.metadata().unwrap().len() as usize / BLOCK_SZ
    }
}

/// Open the image at `path` (creating and sizing it when absent) and mount
/// it, formatting only when the image did not exist yet.
fn mount(path: &str, blocks: usize) -> Result<FlatFs, Box<dyn Error>> {
    // two reserved blocks plus at least one data block
    if blocks <= fat_fs::DATA_START {
        return Err(format!(
            "image must hold at least {} blocks, got {}",
            fat_fs::DATA_START + 1,
            blocks
        )
        .into());
    }
    let formatted = Path::new(path).exists();
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)?;
    file.set_len((blocks * BLOCK_SZ) as u64)?;
    let bdev = Arc::new(BlockFile(Mutex::new(file)));
    let fs = if formatted {
        FlatFs::open(bdev)?
    } else {
        FlatFs::format(bdev)
    };
    Ok(fs)
}

fn demo(path: &str, blocks: usize) -> Result<(), Box<dyn Error>> {
    let mut fs = mount(path, blocks)?;
    info!("free space: {} bytes", fs.free_space());

    // a previous run may have left the file behind
    if fs.ls().iter().any(|name| name == "a.txt") {
        fs.remove("a.txt")?;
    }

    fs.create("a.txt", b"hi")?;
    println!("{}", String::from_utf8_lossy(&fs.read("a.txt", 0, None)?));

    fs.append("a.txt", b" there")?;
    println!("{}", String::from_utf8_lossy(&fs.read("a.txt", 0, None)?));

    for name in fs.ls() {
        println!("/{}", name);
    }

    fs.remove("a.txt")?;
    match fs.read("a.txt", 0, None) {
        Err(FsError::NotFound(_)) => println!("a.txt is gone, as expected"),
        other => panic!("unexpected result after remove: {:?}", other),
    }
    info!("free space: {} bytes", fs.free_space());
    Ok(())
}

pub fn main() {
    logging::init();
    let matches = App::new("fat-fs demo")
        .arg(
            Arg::with_name("image")
                .short("i")
                .long("image")
                .takes_value(true)
                .help("Disk image path"),
        )
        .arg(
            Arg::with_name("blocks")
                .short("n")
                .long("blocks")
                .takes_value(true)
                .help("Image size in blocks"),
        )
        .get_matches();
    let image = matches.value_of("image").unwrap_or("fs.img");
    let blocks: usize = matches
        .value_of("blocks")
        .unwrap_or("128")
        .parse()
        .expect("--blocks must be a number");

    if let Err(e) = demo(image, blocks) {
        eprintln!("demo failed: {}", e);
        std::process::exit(1);
    }
}

#[test]
fn tiny_image_is_rejected_before_touching_the_disk() {
    let image = std::env::temp_dir().join("fat_fs_fuse_tiny.img");
    let path = image.to_str().unwrap();
    assert!(mount(path, 2).is_err());
    assert!(mount(path, 0).is_err());
    assert!(!Path::new(path).exists());
}

#[test]
fn image_backed_volume_test() -> std::io::Result<()> {
    let image = std::env::temp_dir().join("fat_fs_fuse_test.img");
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(image)?;
    file.set_len((128 * BLOCK_SZ) as u64)?;
    let bdev = Arc::new(BlockFile(Mutex::new(file)));
    let mut fs = FlatFs::format(bdev);
    let full = fs.free_space();

    let random_bytes = |len: usize| -> Vec<u8> { (0..len).map(|_| rand::random::<u8>()).collect() };

    let data = random_bytes(10 * BLOCK_SZ + BLOCK_SZ / 3);
    fs.create("blob.bin", &data).unwrap();
    assert_eq!(fs.read("blob.bin", 0, None).unwrap(), data);

    // chunked reads crossing block boundaries
    let mut offset = 0;
    let mut collected = Vec::new();
    while offset < data.len() {
        let part = fs.read("blob.bin", offset, Some(127)).unwrap();
        offset += part.len();
        collected.extend_from_slice(&part);
    }
    assert_eq!(collected, data);

    let extra = random_bytes(BLOCK_SZ + 17);
    fs.append("blob.bin", &extra).unwrap();
    let mut joined = data;
    joined.extend_from_slice(&extra);
    assert_eq!(fs.read("blob.bin", 0, None).unwrap(), joined);

    fs.remove("blob.bin").unwrap();
    assert_eq!(fs.free_space(), full);
    Ok(())
}
