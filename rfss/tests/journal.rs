use std::sync::Arc;

use block_dev::{BlockDevice, MemDisk};
use rfss::{BLOCK_SIZE, Error, FormatOptions, JournalStatus, OpenFlag, SECTORS_PER_BLOCK, Session};

const DATA_BLOCK: u32 = 90;

fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn journaled_disk() -> Arc<MemDisk> {
    init_log();
    let disk = Arc::new(MemDisk::new(128 * SECTORS_PER_BLOCK));
    Session::format_with(disk.clone(), &FormatOptions::default().journal(true)).unwrap();
    disk
}

fn mount_journaled(disk: &Arc<MemDisk>) -> Session {
    let mut fs = Session::mount(disk.clone()).unwrap();
    fs.enable_journaling().unwrap();
    fs
}

/// 以崩溃瞬间的磁盘内容构造新设备
fn crash(disk: &MemDisk) -> Arc<MemDisk> {
    Arc::new(MemDisk::from_image(disk.snapshot()))
}

fn read(fs: &Session, block: u32) -> [u8; BLOCK_SIZE] {
    let mut buf = [0; BLOCK_SIZE];
    fs.read_block(block, &mut buf).unwrap();
    buf
}

#[test]
fn crash_after_in_place_write_is_undone() {
    let disk = journaled_disk();
    let mut fs = mount_journaled(&disk);
    fs.write_block(DATA_BLOCK, &[0xaa; BLOCK_SIZE]).unwrap();

    fs.start_transaction().unwrap();
    fs.write_block(DATA_BLOCK, &[0xbb; BLOCK_SIZE]).unwrap();
    assert_eq!(read(&fs, DATA_BLOCK), [0xbb; BLOCK_SIZE]);

    let crashed = crash(&disk);
    let fs = Session::mount(crashed).unwrap();
    assert_eq!(read(&fs, DATA_BLOCK), [0xaa; BLOCK_SIZE]);
    assert_eq!(fs.check_consistency().unwrap(), JournalStatus::Clean);
}

#[test]
fn explicitly_logged_block_is_restored() {
    let disk = journaled_disk();
    let mut fs = mount_journaled(&disk);
    let old = [0xaa; BLOCK_SIZE];
    fs.write_block(DATA_BLOCK, &old).unwrap();

    fs.start_transaction().unwrap();
    fs.log_block(DATA_BLOCK, &old).unwrap();
    // 绕过会话直接改写设备
    let lba = DATA_BLOCK as u64 * SECTORS_PER_BLOCK;
    disk.write_sectors(lba, &[0x55; BLOCK_SIZE]).unwrap();

    let crashed = crash(&disk);
    let fs = Session::mount(crashed).unwrap();
    assert_eq!(read(&fs, DATA_BLOCK), old);
    assert_eq!(fs.check_consistency().unwrap(), JournalStatus::Clean);
}

#[test]
fn crash_before_in_place_write_keeps_old_data() {
    let disk = journaled_disk();
    let mut fs = mount_journaled(&disk);
    fs.write_block(DATA_BLOCK, &[0xaa; BLOCK_SIZE]).unwrap();
    fs.start_transaction().unwrap();

    // 日志的两块写完后设备失效，原地写没有发生
    disk.fail_writes_after(Some(2));
    assert!(fs.write_block(DATA_BLOCK, &[0xbb; BLOCK_SIZE]).is_err());
    disk.fail_writes_after(None);

    let crashed = crash(&disk);
    let fs = Session::mount(crashed).unwrap();
    assert_eq!(read(&fs, DATA_BLOCK), [0xaa; BLOCK_SIZE]);
}

#[test]
fn committed_transaction_survives_crash() {
    let disk = journaled_disk();
    let mut fs = mount_journaled(&disk);
    fs.write_block(DATA_BLOCK, &[0xaa; BLOCK_SIZE]).unwrap();

    fs.start_transaction().unwrap();
    fs.write_block(DATA_BLOCK, &[0xbb; BLOCK_SIZE]).unwrap();
    fs.write_block(DATA_BLOCK + 1, &[0xcc; BLOCK_SIZE]).unwrap();
    fs.commit_transaction().unwrap();

    let crashed = crash(&disk);
    let fs = Session::mount(crashed).unwrap();
    assert_eq!(read(&fs, DATA_BLOCK), [0xbb; BLOCK_SIZE]);
    assert_eq!(read(&fs, DATA_BLOCK + 1), [0xcc; BLOCK_SIZE]);
}

#[test]
fn replay_is_idempotent() {
    let disk = journaled_disk();
    let mut fs = mount_journaled(&disk);
    fs.write_block(DATA_BLOCK, &[1; BLOCK_SIZE]).unwrap();
    fs.start_transaction().unwrap();
    fs.write_block(DATA_BLOCK, &[2; BLOCK_SIZE]).unwrap();
    fs.write_block(DATA_BLOCK, &[3; BLOCK_SIZE]).unwrap();

    let image = disk.snapshot();
    for _ in 0..2 {
        let crashed = Arc::new(MemDisk::from_image(image.clone()));
        let fs = Session::mount(crashed.clone()).unwrap();
        assert_eq!(read(&fs, DATA_BLOCK), [1; BLOCK_SIZE]);
        drop(fs);

        // 重放后再次挂载不做任何事
        let again = Session::mount(crashed.clone()).unwrap();
        assert_eq!(read(&again, DATA_BLOCK), [1; BLOCK_SIZE]);
    }
}

#[test]
fn corrupted_header_fails_mount() {
    let disk = journaled_disk();
    let mut fs = mount_journaled(&disk);
    fs.start_transaction().unwrap();
    fs.write_block(DATA_BLOCK, &[9; BLOCK_SIZE]).unwrap();

    let mut image = disk.snapshot();
    let header = rfss::JOURNAL_BLOCK as usize * BLOCK_SIZE;
    image[header + 4] ^= 0xff;
    let crashed = Arc::new(MemDisk::from_image(image));
    assert_eq!(Session::mount(crashed).unwrap_err(), Error::Corruption);
}

#[test]
fn interrupted_mkdir_leaves_no_trace() {
    let disk = journaled_disk();
    let mut fs = mount_journaled(&disk);
    fs.create_directory("/keep").unwrap();
    fs.sync().unwrap();
    let before = fs.stats();

    fs.start_transaction().unwrap();
    fs.create_directory("/keep/lost").unwrap();
    fs.create_file("/keep/lost/file", 0o644).unwrap();

    let crashed = crash(&disk);
    let mut fs = Session::mount(crashed).unwrap();
    assert!(fs.resolve("/keep").unwrap().is_some());
    assert_eq!(fs.resolve("/keep/lost").unwrap(), None);
    assert_eq!(fs.stats().free_blocks, before.free_blocks);
    assert_eq!(fs.stats().free_inodes, before.free_inodes);
    assert!(fs.check().unwrap().is_empty());
}

#[test]
fn atomic_write_commits_data_and_metadata() {
    let disk = journaled_disk();
    let mut fs = mount_journaled(&disk);

    fs.atomically(|fs| {
        let mut file = fs.open("/notes", OpenFlag::CREATE)?;
        file.write(fs, b"journaled")?;
        Ok(())
    })
    .unwrap();

    let crashed = crash(&disk);
    let mut fs = Session::mount(crashed).unwrap();
    let mut file = fs.open("/notes", OpenFlag::APPEND).unwrap();
    assert_eq!(file.size(), 9);
    file.seek(0);
    let mut buf = [0; 16];
    assert_eq!(file.read(&fs, &mut buf).unwrap(), 9);
    assert_eq!(&buf[..9], b"journaled");
    assert!(fs.check().unwrap().is_empty());
}

#[test]
fn oversized_atomic_write_rolls_back() {
    let disk = journaled_disk();
    let mut fs = mount_journaled(&disk);
    let before = fs.stats();

    // 三个数据块加上索引节点表、目录与提交时的三块元数据，超过 7 块的上限
    let result = fs.atomically(|fs| {
        let mut file = fs.open("/big", OpenFlag::CREATE)?;
        file.write(fs, &[7; 3 * BLOCK_SIZE])
    });
    assert_eq!(result, Err(Error::TransactionFull));
    assert!(!fs.in_transaction());
    assert_eq!(fs.resolve("/big").unwrap(), None);
    assert_eq!(fs.stats(), before);

    let written = fs
        .atomically(|fs| {
            let mut file = fs.open("/small", OpenFlag::CREATE)?;
            file.write(fs, &[7; 2 * BLOCK_SIZE])
        })
        .unwrap();
    assert_eq!(written, 2 * BLOCK_SIZE);
}

#[test]
fn unmount_aborts_open_transaction() {
    let disk = journaled_disk();
    let mut fs = mount_journaled(&disk);
    let before = fs.stats();
    fs.start_transaction().unwrap();
    fs.create_file("/temp", 0o644).unwrap();
    fs.unmount().unwrap();

    let fs = Session::mount(disk).unwrap();
    assert_eq!(fs.resolve("/temp").unwrap(), None);
    assert_eq!(fs.stats().free_inodes, before.free_inodes);
}
