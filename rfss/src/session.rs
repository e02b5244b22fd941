//! # 文件系统会话
//!
//! 会话独占一个已挂载的卷：缓存超级块与两张位图，记录当前目录与日志状态。
//! 格式化与挂载都从块设备构造，卸载时写回脏的元数据。

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use core::fmt;

use block_dev::{BlockDevice, DeviceError};

use crate::block_io::{read_raw, write_raw};
use crate::dir::init_dir_block;
use crate::journal::Journal;
use crate::layout::{Bitmap, DiskInode, FileType, SuperBlock};
use crate::{
    BLOCK_BITS, BLOCK_SIZE, DEFAULT_LABEL, Error, InodeId, JOURNAL_BLOCKS, MIN_BLOCKS,
    RESERVED_BLOCKS, ROOT_DIR_BLOCK, ROOT_INODE, Result, SECTORS_PER_BLOCK,
};

/// 没有接入时钟时，时间戳一律为 0
fn no_clock() -> u64 {
    0
}

/// 格式化参数
#[derive(Debug, Clone, Copy)]
pub struct FormatOptions<'a> {
    /// 卷标，不超过 15 字节
    pub label: &'a str,
    /// 是否预留日志区
    pub journal: bool,
    pub clock: fn() -> u64,
}

impl Default for FormatOptions<'_> {
    fn default() -> Self {
        Self {
            label: DEFAULT_LABEL,
            journal: false,
            clock: no_clock,
        }
    }
}

impl<'a> FormatOptions<'a> {
    pub fn label(self, label: &'a str) -> Self {
        Self { label, ..self }
    }

    pub fn journal(self, journal: bool) -> Self {
        Self { journal, ..self }
    }

    pub fn clock(self, clock: fn() -> u64) -> Self {
        Self { clock, ..self }
    }
}

/// 卷的统计信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsStats {
    pub label: String,
    pub block_size: u32,
    pub total_blocks: u32,
    pub free_blocks: u32,
    pub inode_count: u32,
    pub free_inodes: u32,
    pub journal_blocks: u32,
    pub mount_count: u32,
}

pub struct Session {
    pub(crate) dev: Arc<dyn BlockDevice>,
    pub(crate) sb: SuperBlock,
    pub(crate) block_bitmap: Bitmap,
    pub(crate) inode_bitmap: Bitmap,
    /// 缓存的超级块或位图有未写回的修改
    pub(crate) dirty: bool,
    pub(crate) cwd: InodeId,
    pub(crate) cwd_path: String,
    pub(crate) journal: Journal,
    clock: fn() -> u64,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("label", &self.sb.label())
            .field("total_blocks", &self.sb.total_blocks)
            .field("free_blocks", &self.sb.free_blocks)
            .field("free_inodes", &self.sb.free_inode_count)
            .field("dirty", &self.dirty)
            .field("cwd", &self.cwd_path)
            .field("journal", &self.journal)
            .finish()
    }
}

impl Session {
    pub fn format(dev: Arc<dyn BlockDevice>, label: Option<&str>) -> Result<()> {
        let options = FormatOptions::default().label(label.unwrap_or(DEFAULT_LABEL));
        Self::format_with(dev, &options)
    }

    /// 在设备上建立新的文件系统：
    ///
    /// | 块 | 内容 |
    /// |---|---|
    /// | 0 | 超级块 |
    /// | 1..=64 | 索引节点表 |
    /// | 69 | 块位图 |
    /// | 70 | 索引节点位图 |
    /// | 71..=78 | 日志区 |
    /// | 79 | 根目录 |
    pub fn format_with(dev: Arc<dyn BlockDevice>, options: &FormatOptions) -> Result<()> {
        if !dev.is_present() {
            return Err(DeviceError::NotPresent.into());
        }
        if options.label.len() >= 16 || options.label.contains('\0') {
            return Err(Error::InvalidArgument);
        }

        let device_blocks = dev.sector_count() / SECTORS_PER_BLOCK;
        if device_blocks < MIN_BLOCKS as u64 {
            log::error!("device holds {device_blocks} blocks, at least {MIN_BLOCKS} needed");
            return Err(Error::NoSpace);
        }
        if device_blocks > BLOCK_BITS as u64 {
            log::warn!("device holds {device_blocks} blocks, only the first {BLOCK_BITS} are used");
        }
        let total_blocks = device_blocks.min(BLOCK_BITS as u64) as u32;

        let now = (options.clock)();
        let journal_size = if options.journal { JOURNAL_BLOCKS } else { 0 };
        let sb = SuperBlock::new(total_blocks, options.label, journal_size, now);

        let mut buf = [0; BLOCK_SIZE];
        for block in 1..RESERVED_BLOCKS {
            write_raw(&*dev, block, &buf)?;
        }

        let mut root = DiskInode::new(FileType::Directory, 0o755, now);
        root.size = BLOCK_SIZE as u64;
        root.links_count = 2;
        root.blocks_count = 1;
        root.direct[0] = ROOT_DIR_BLOCK;
        root.encode(&mut buf);
        write_raw(&*dev, sb.inode_table_block, &buf)?;

        let mut block_bitmap = Bitmap::default();
        (0..RESERVED_BLOCKS as usize).for_each(|bit| block_bitmap.set(bit));
        buf.fill(0);
        block_bitmap.encode(&mut buf);
        write_raw(&*dev, sb.bitmap_block, &buf)?;

        let mut inode_bitmap = Bitmap::default();
        inode_bitmap.set(ROOT_INODE as usize - 1);
        buf.fill(0);
        inode_bitmap.encode(&mut buf);
        write_raw(&*dev, sb.inode_bitmap_block(), &buf)?;

        buf.fill(0);
        init_dir_block(&mut buf, ROOT_INODE, ROOT_INODE);
        write_raw(&*dev, ROOT_DIR_BLOCK, &buf)?;

        buf.fill(0);
        sb.encode(&mut buf);
        write_raw(&*dev, 0, &buf)?;

        log::info!(
            "formatted {:?}: {total_blocks} blocks, {} inodes, journal {journal_size} blocks",
            sb.label(),
            sb.inode_count
        );
        Ok(())
    }

    pub fn mount(dev: Arc<dyn BlockDevice>) -> Result<Self> {
        if !dev.is_present() {
            return Err(DeviceError::NotPresent.into());
        }

        let sb = read_super_block(&*dev)?;
        let mut fs = Self {
            dev,
            sb,
            block_bitmap: Bitmap::default(),
            inode_bitmap: Bitmap::default(),
            dirty: false,
            cwd: ROOT_INODE,
            cwd_path: "/".to_string(),
            journal: Journal::default(),
            clock: no_clock,
        };
        fs.cwd = fs.sb.root_inode;

        if fs.sb.has_journal() {
            fs.replay()?;
        }
        fs.load_metadata()?;
        // 带日志区的卷挂载后即启用日志
        if fs.sb.has_journal() {
            fs.enable_journaling()?;
        }

        fs.sb.mount_count = fs.sb.mount_count.saturating_add(1);
        if fs.sb.mount_count > fs.sb.max_mount_count {
            log::warn!(
                "mounted {} times without a check, running fsck is recommended",
                fs.sb.mount_count
            );
        }
        fs.dirty = true;

        log::info!(
            "mounted {:?}: {}/{} blocks free, {}/{} inodes free",
            fs.sb.label(),
            fs.sb.free_blocks,
            fs.sb.total_blocks,
            fs.sb.free_inode_count,
            fs.sb.inode_count
        );
        Ok(fs)
    }

    /// 卸载：放弃未提交的事务，写回元数据
    pub fn unmount(mut self) -> Result<()> {
        if self.in_transaction() {
            log::warn!("unmounting with an open transaction, aborting it");
            self.abort_transaction()?;
        }
        self.sync()?;
        log::info!("unmounted {:?}", self.sb.label());
        Ok(())
    }

    /// 立即写回缓存的位图与超级块
    pub fn sync(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.sb.modified_time = self.now();

        let mut buf = [0; BLOCK_SIZE];
        self.block_bitmap.encode(&mut buf);
        self.write_block(self.sb.bitmap_block, &buf)?;

        buf.fill(0);
        self.inode_bitmap.encode(&mut buf);
        self.write_block(self.sb.inode_bitmap_block(), &buf)?;

        buf.fill(0);
        self.sb.encode(&mut buf);
        self.write_block(0, &buf)?;

        self.dirty = false;
        Ok(())
    }

    /// 从磁盘重新载入超级块与位图，丢弃缓存中的修改
    pub(crate) fn load_metadata(&mut self) -> Result<()> {
        self.sb = read_super_block(&*self.dev)?;

        let mut buf = [0; BLOCK_SIZE];
        read_raw(&*self.dev, self.sb.bitmap_block, &mut buf)?;
        self.block_bitmap = Bitmap::decode(&buf);
        read_raw(&*self.dev, self.sb.inode_bitmap_block(), &mut buf)?;
        self.inode_bitmap = Bitmap::decode(&buf);

        self.dirty = false;
        Ok(())
    }

    /// 在一个事务中执行 `f`，出错时撤销其全部写入
    pub fn atomically<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.start_transaction()?;
        let result = f(self).and_then(|val| self.commit_transaction().map(|_| val));
        if result.is_err() && self.in_transaction() {
            if let Err(err) = self.abort_transaction() {
                log::error!("failed to abort transaction: {err}");
            }
        }
        result
    }

    pub fn stats(&self) -> FsStats {
        FsStats {
            label: self.sb.label().to_string(),
            block_size: self.sb.block_size,
            total_blocks: self.sb.total_blocks,
            free_blocks: self.sb.free_blocks,
            inode_count: self.sb.inode_count,
            free_inodes: self.sb.free_inode_count,
            journal_blocks: self.sb.journal_size,
            mount_count: self.sb.mount_count,
        }
    }

    #[inline]
    pub fn super_block(&self) -> &SuperBlock {
        &self.sb
    }

    /// 设置索引节点与超级块时间戳的来源
    pub fn set_clock(&mut self, clock: fn() -> u64) {
        self.clock = clock;
    }

    #[inline]
    pub(crate) fn now(&self) -> u64 {
        (self.clock)()
    }
}

fn read_super_block(dev: &dyn BlockDevice) -> Result<SuperBlock> {
    let mut buf = [0; BLOCK_SIZE];
    read_raw(dev, 0, &mut buf)?;
    let sb = SuperBlock::decode(&buf);

    if !sb.is_valid() {
        log::error!("bad superblock: magic {:#x}, version {}", sb.magic, sb.version);
        return Err(Error::Corruption);
    }
    if sb.block_size as usize != BLOCK_SIZE || !sb.counters_sane() || !sb.layout_sane() {
        log::error!("superblock fields out of range: {sb:?}");
        return Err(Error::Corruption);
    }
    if sb.total_blocks as u64 * SECTORS_PER_BLOCK > dev.sector_count() {
        log::error!("superblock claims {} blocks, device is smaller", sb.total_blocks);
        return Err(Error::Corruption);
    }
    Ok(sb)
}
