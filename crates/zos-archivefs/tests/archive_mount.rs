//! Archive Mount Integration Tests
//!
//! Mounts TAR and ZIP images through the public API the way a VFS host
//! would: generic over `ArchiveFs`, on memory and stream devices.

use std::io::{Cursor, Read, Seek};
use std::rc::Rc;
use std::sync::Arc;

use zos_archivefs::{
    ArchiveFs, EntryKind, FindResult, FsConfig, FsError, ImportStat, SharedFs, TarBuilder, TarFs,
    ZipBuilder, ZipFs,
};
use zos_blockdev::{MemoryBlockDevice, StreamBlockDevice};

const MTIME_2024: u64 = 1_709_214_330;

fn tar_image() -> Vec<u8> {
    let mut builder = TarBuilder::new();
    builder.set_mtime(MTIME_2024);
    builder.add_file("main.py", b"import app\napp.run()\n").unwrap();
    builder.add_file("app/__init__.py", b"def run(): pass\n").unwrap();
    builder.add_file("app/data.bin", &[7u8; 2000]).unwrap();
    builder.finish()
}

fn zip_image() -> Vec<u8> {
    let mut builder = ZipBuilder::new();
    builder.set_mtime(MTIME_2024);
    builder.add_file("main.py", b"import app\napp.run()\n").unwrap();
    builder.add_file("app/__init__.py", b"def run(): pass\n").unwrap();
    builder.add_file("app/data.bin", &[7u8; 2000]).unwrap();
    builder.finish().unwrap()
}

/// What a module loader does: probe, then read the whole source.
fn load_module<F: ArchiveFs>(fs: &F, name: &str) -> Result<Option<Vec<u8>>, FsError> {
    let path = format!("{}.py", name);
    match fs.import_stat(&path) {
        ImportStat::File => {
            let mut file = fs.open(&path, "rb")?;
            let source = file.read_to_end()?;
            file.close();
            Ok(Some(source))
        }
        ImportStat::Dir | ImportStat::NoExist => {
            let package = format!("{}/__init__.py", name);
            if fs.import_stat(&package) != ImportStat::File {
                return Ok(None);
            }
            let mut file = fs.open(&package, "r")?;
            Ok(Some(file.read_to_end()?))
        }
    }
}

fn exercise<F: ArchiveFs>(fs: &F) {
    fs.mount(true, false).unwrap();

    assert_eq!(
        load_module(fs, "main").unwrap().unwrap(),
        b"import app\napp.run()\n"
    );
    assert_eq!(load_module(fs, "app").unwrap().unwrap(), b"def run(): pass\n");
    assert_eq!(load_module(fs, "missing").unwrap(), None);

    let root = fs.readdir("/").unwrap();
    let kinds: Vec<_> = root.iter().map(|e| (e.name.as_str(), e.kind)).collect();
    assert!(kinds.contains(&("main.py", EntryKind::File)));
    assert!(kinds.contains(&("app", EntryKind::Directory)));
    assert_eq!(root.len(), 2);

    fs.chdir("app").unwrap();
    assert_eq!(fs.getcwd(), "/app");
    let stat = fs.stat("data.bin").unwrap();
    assert_eq!(stat.size, 2000);
    assert_eq!(stat.mtime, MTIME_2024);
    assert!(fs.stat("..").unwrap().is_directory());

    assert!(matches!(fs.open("data.bin", "w"), Err(FsError::ReadOnly)));
    assert!(matches!(fs.remove("data.bin"), Err(FsError::ReadOnly)));
    assert!(matches!(fs.open("/app", "r"), Err(FsError::IsADirectory)));
    fs.umount();
}

#[test]
fn test_tar_through_trait() {
    let dev = MemoryBlockDevice::from_image(&tar_image(), 512);
    exercise(&TarFs::new(&dev).unwrap());
}

#[test]
fn test_zip_through_trait() {
    let dev = MemoryBlockDevice::from_image(&zip_image(), 512);
    exercise(&ZipFs::new(&dev).unwrap());
}

#[test]
fn test_stream_device_mounts_both_formats() {
    let tar = StreamBlockDevice::new(Cursor::new(tar_image())).unwrap();
    exercise(&TarFs::new(tar).unwrap());

    // ZIP images are not block multiples; the stream pads the final block.
    let image = zip_image();
    assert_ne!(image.len() % 512, 0);
    let zip = StreamBlockDevice::new(Cursor::new(image.as_slice())).unwrap();
    let fs = ZipFs::new(zip).unwrap();
    exercise(&fs);
    assert!(fs.verify_crc("/app/data.bin").unwrap());
}

#[test]
fn test_stream_window_inside_partition_image() {
    // Archive stored at a block-aligned offset within a larger image.
    let mut disk = vec![0xEEu8; 4096];
    disk.extend_from_slice(&tar_image());
    disk.extend_from_slice(&[0xEEu8; 1024]);

    let len = tar_image().len() as u64;
    let dev = StreamBlockDevice::with_window(Cursor::new(disk), 512, Some(4096), Some(len)).unwrap();
    exercise(&TarFs::new(dev).unwrap());
}

#[test]
fn test_std_io_read_and_seek() {
    let dev = MemoryBlockDevice::from_image(&zip_image(), 512);
    let fs = ZipFs::new(&dev).unwrap();
    fs.mount(true, false).unwrap();

    let mut file = fs.open("app/data.bin", "rb").unwrap();
    Seek::seek(&mut file, std::io::SeekFrom::End(-10)).unwrap();
    let mut tail = Vec::new();
    Read::read_to_end(&mut file, &mut tail).unwrap();
    assert_eq!(tail, vec![7u8; 10]);

    file.close();
    let err: std::io::Error = fs.open("nope", "r").unwrap_err().into();
    assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
}

#[test]
fn test_one_device_shared_by_two_mounts() {
    let dev = Rc::new(MemoryBlockDevice::from_image(&tar_image(), 512));
    let first = TarFs::new(Rc::clone(&dev)).unwrap();
    let second = TarFs::new(Rc::clone(&dev)).unwrap();
    first.mount(true, false).unwrap();
    second.mount(true, false).unwrap();

    first.chdir("app").unwrap();
    assert_eq!(second.getcwd(), "/");
    assert!(matches!(first.find("data.bin").unwrap(), FindResult::File(_)));
    assert!(matches!(second.find("data.bin").unwrap(), FindResult::NotFound));
    assert_eq!(Rc::strong_count(&dev), 3);
}

#[test]
fn test_shared_mount_across_threads() {
    let dev = Arc::new(MemoryBlockDevice::from_image(&zip_image(), 512));
    let fs = Arc::new(SharedFs::new(ZipFs::new(Arc::clone(&dev)).unwrap()));

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let fs = Arc::clone(&fs);
            std::thread::spawn(move || fs.read_file("/app/__init__.py").unwrap())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), b"def run(): pass\n");
    }
}

#[test]
fn test_config_from_json_sets_epoch() {
    let config = FsConfig::from_json(r#"{"epoch": "y2000"}"#).unwrap();
    let dev = MemoryBlockDevice::from_image(&tar_image(), 512);
    let fs = TarFs::with_config(&dev, config).unwrap();
    fs.mount(true, false).unwrap();
    assert_eq!(fs.stat("main.py").unwrap().mtime, MTIME_2024 - 946_684_800);
}

#[test]
fn test_wrong_driver_reports_no_filesystem() {
    let zip = MemoryBlockDevice::from_image(&zip_image(), 512);
    let fs = TarFs::new(&zip).unwrap();
    assert!(fs.is_no_filesystem());
    assert!(matches!(fs.mount(true, false), Err(FsError::NoFilesystem)));

    let tar = MemoryBlockDevice::from_image(&tar_image(), 512);
    let fs = ZipFs::new(&tar).unwrap();
    assert!(fs.is_no_filesystem());
    assert!(matches!(fs.mount(true, true), Err(FsError::NotImplemented)));
}
