use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use block_dev::{BlockDevice, DeviceError};
use enumflags2::BitFlags;
use rfss::{OpenFlag, SECTORS_PER_BLOCK, Session};

use crate::BlockFile;

fn image(name: &str, blocks: u64) -> (PathBuf, Arc<BlockFile>) {
    let path = std::env::temp_dir().join(format!("rfss-{}-{name}.img", std::process::id()));
    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&path)
        .unwrap();
    fd.set_len(blocks * SECTORS_PER_BLOCK * 512).unwrap();
    (path, Arc::new(BlockFile::new(fd).unwrap()))
}

#[test]
fn sectors_round_trip() {
    let (path, dev) = image("sectors", 1);
    assert_eq!(dev.sector_count(), 8);

    dev.write_sectors(3, &[0x42; 1024]).unwrap();
    let mut buf = [0; 512];
    dev.read_sectors(4, &mut buf).unwrap();
    assert_eq!(buf, [0x42; 512]);
    assert_eq!(
        dev.read_sectors(7, &mut [0; 1024]),
        Err(DeviceError::OutOfRange { lba: 7 })
    );
    assert_eq!(dev.write_sectors(0, &[0; 100]), Err(DeviceError::Misaligned));

    std::fs::remove_file(path).unwrap();
}

#[test]
fn filesystem_on_image() {
    let (path, dev) = image("fs", 128);
    Session::format(dev.clone(), Some("HOST")).unwrap();

    let mut fs = Session::mount(dev.clone()).unwrap();
    let mut file = fs.open("/hello", OpenFlag::CREATE).unwrap();
    file.write(&mut fs, b"hello from the host").unwrap();
    fs.unmount().unwrap();

    let mut fs = Session::mount(dev).unwrap();
    assert_eq!(fs.stats().label, "HOST");
    let mut file = fs.open("/hello", BitFlags::empty()).unwrap();
    let mut buf = [0; 64];
    let n = file.read(&fs, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"hello from the host");

    std::fs::remove_file(path).unwrap();
}
