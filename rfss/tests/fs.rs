use std::sync::Arc;

use block_dev::MemDisk;
use enumflags2::BitFlags;
use rfss::{
    BLOCK_SIZE, DEFAULT_LABEL, Error, FileType, MAX_FILE_SIZE, MountSlot, OpenFlag,
    SECTORS_PER_BLOCK, Session,
};

fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn fresh(blocks: u64) -> Arc<MemDisk> {
    init_log();
    let disk = Arc::new(MemDisk::new(blocks * SECTORS_PER_BLOCK));
    Session::format(disk.clone(), None).unwrap();
    disk
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 253) as u8 ^ 0x5a).collect()
}

fn read_all(fs: &mut Session, path: &str) -> Vec<u8> {
    let mut file = fs.open(path, BitFlags::empty()).unwrap();
    let mut data = vec![0; file.size() as usize];
    let mut done = 0;
    while done < data.len() {
        let n = file.read(fs, &mut data[done..]).unwrap();
        assert_ne!(n, 0);
        done += n;
    }
    data
}

#[test]
fn format_mount_unmount_cycle() {
    let disk = fresh(256);
    let mut slot = MountSlot::new();

    let fs = slot.mount(disk.clone()).unwrap();
    let stats = fs.stats();
    assert_eq!(stats.label, DEFAULT_LABEL);
    assert_eq!(stats.block_size as usize, BLOCK_SIZE);
    assert_eq!(stats.total_blocks, 256);
    assert_eq!(stats.free_blocks, 256 - 80);
    assert_eq!(stats.inode_count, 1024);
    assert_eq!(stats.free_inodes, 1023);

    let names: Vec<_> = fs.list_directory("/").unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, [".", ".."]);
    slot.unmount().unwrap();

    let fs = slot.mount(disk).unwrap();
    assert_eq!(fs.stats().mount_count, 2);
}

#[test]
fn files_survive_remount() {
    let disk = fresh(256);
    let sizes = [10, BLOCK_SIZE, 40000];

    let mut fs = Session::mount(disk.clone()).unwrap();
    fs.create_directory("/data").unwrap();
    for (i, &len) in sizes.iter().enumerate() {
        let path = format!("/data/file{i}");
        fs.create_file(&path, 0o644).unwrap();
        let mut file = fs.open(&path, OpenFlag::TRUNC).unwrap();
        assert_eq!(file.write(&mut fs, &pattern(len)).unwrap(), len);
        file.close();
    }
    fs.unmount().unwrap();

    let mut fs = Session::mount(disk).unwrap();
    for (i, &len) in sizes.iter().enumerate() {
        let path = format!("/data/file{i}");
        assert_eq!(read_all(&mut fs, &path), pattern(len));
        let stat = fs.stat(&path).unwrap();
        assert_eq!(stat.kind, FileType::Regular);
        assert_eq!(stat.size, len as u64);
        assert_eq!(stat.blocks as usize, len.div_ceil(BLOCK_SIZE));
    }
    assert!(fs.check().unwrap().is_empty());
}

#[test]
fn oversized_write_is_short() {
    let disk = fresh(256);
    let mut fs = Session::mount(disk).unwrap();
    let mut file = fs.open("/big", OpenFlag::CREATE).unwrap();
    let written = file.write(&mut fs, &pattern(50000)).unwrap();
    assert_eq!(written as u64, MAX_FILE_SIZE);
    assert_eq!(read_all(&mut fs, "/big"), pattern(50000)[..written]);
}

#[test]
fn write_truncate_then_read_is_empty() {
    let disk = fresh(128);
    let mut fs = Session::mount(disk).unwrap();
    let free = fs.free_block_count();

    let mut file = fs.open("/t", OpenFlag::CREATE).unwrap();
    file.write(&mut fs, &pattern(9000)).unwrap();

    let mut file = fs.open("/t", OpenFlag::TRUNC).unwrap();
    let mut buf = [0; 64];
    assert_eq!(file.read(&fs, &mut buf).unwrap(), 0);
    assert_eq!(fs.free_block_count(), free);
}

#[test]
fn directory_tree_operations() {
    let disk = fresh(256);
    let mut fs = Session::mount(disk).unwrap();
    let before = fs.stats();

    fs.create_directory("/a").unwrap();
    fs.create_directory("/a/b").unwrap();
    fs.create_file("/a/b/c", 0o600).unwrap();
    fs.change_directory("/a").unwrap();
    fs.create_file("rel", 0o644).unwrap();
    assert!(fs.resolve("/a/rel").unwrap().is_some());

    assert_eq!(fs.remove_directory("b"), Err(Error::DirectoryNotEmpty));
    fs.delete_file("b/c").unwrap();
    fs.remove_directory("b").unwrap();
    fs.delete_file("rel").unwrap();

    fs.change_directory("/").unwrap();
    fs.remove_directory("/a").unwrap();
    assert_eq!(fs.stats(), before);

    let names: Vec<_> = fs.list_directory("/").unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, [".", ".."]);
}

#[test]
fn inode_exhaustion_and_rollback() {
    let disk = fresh(100);
    let mut fs = Session::mount(disk).unwrap();

    // 根目录最多 12 块；用短名字让目录块先装下所有文件
    let mut created = 0;
    let err = loop {
        match fs.create_file(&format!("/{created}"), 0o644) {
            Ok(_) => created += 1,
            Err(err) => break err,
        }
    };
    assert_eq!(err, Error::NoSpace);
    assert_eq!(created, 1023);
    assert_eq!(fs.free_inode_count(), 0);
    assert!(fs.check().unwrap().is_empty());
}

#[test]
fn device_errors_surface() {
    let disk = fresh(100);
    let mut fs = Session::mount(disk.clone()).unwrap();
    fs.create_file("/f", 0o644).unwrap();

    disk.fail_reads(true);
    assert!(matches!(fs.resolve("/f"), Err(Error::Device(_))));
    disk.fail_reads(false);

    disk.set_present(false);
    assert!(Session::mount(disk.clone()).is_err());
}

#[test]
fn read_block_checks_range() {
    let disk = fresh(100);
    let fs = Session::mount(disk).unwrap();
    let mut buf = [0; BLOCK_SIZE];
    assert_eq!(fs.read_block(100, &mut buf), Err(Error::OutOfRange));
    assert!(fs.read_block(99, &mut buf).is_ok());
}
