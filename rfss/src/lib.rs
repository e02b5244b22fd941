#![cfg_attr(not(test), no_std)]

extern crate alloc;

/* RFSS 的整体架构，自上而下 */

// 挂载槽：当前挂载的文件系统
mod mount;
pub use mount::MountSlot;

// 文件系统会话：格式化、挂载、卸载与统计
mod session;
pub use session::{FormatOptions, FsStats, Session};

// 复合操作：创建、删除文件与目录
mod vfs;
pub use vfs::Stat;

// 文件系统检查
mod fsck;
pub use fsck::Problem;

// 文件句柄层：顺序读写
mod file;
pub use file::{FileHandle, OpenFlag};

// 路径解析
mod path;
pub use path::Path;

// 目录引擎：变长目录项
mod dir;
pub use dir::DirEntry;

// 索引节点存储
mod inode_store;

// 位图分配器
mod allocator;

// 预写日志
mod journal;
pub use journal::{JournalStatus, TxnId};

// 块读写层：逻辑块与扇区的映射
mod block_io;

// 磁盘数据结构层
mod layout;
pub use layout::{DiskInode, FileType, FsState, SuperBlock};

mod error;
pub use error::{Error, Result};

pub use block_dev::{BlockDevice, DeviceError};

pub const MAGIC: u32 = 0x5246_5353;
pub const VERSION: u32 = 1;
pub const BLOCK_SIZE: usize = 4096;
pub const BLOCK_BITS: usize = BLOCK_SIZE * 8;
pub const SECTORS_PER_BLOCK: u64 = (BLOCK_SIZE / block_dev::SECTOR_SIZE) as u64;

pub const MAX_FILENAME: usize = 255;
pub const MAX_PATH: usize = 1023;
pub const DIRECT_BLOCKS: usize = 12;
/// 单个文件的最大字节数（仅直接块）
pub const MAX_FILE_SIZE: u64 = (DIRECT_BLOCKS * BLOCK_SIZE) as u64;

pub const INODE_COUNT: u32 = 1024;
pub const ROOT_INODE: u32 = 1;

/* 磁盘布局，块号 */
pub const SUPER_BLOCK: u32 = 0;
pub const INODE_TABLE_BLOCK: u32 = 1;
pub const INODE_TABLE_BLOCKS: u32 = INODE_COUNT / layout::INODES_PER_BLOCK as u32;
pub const BLOCK_BITMAP_BLOCK: u32 = 69;
pub const INODE_BITMAP_BLOCK: u32 = 70;
pub const JOURNAL_BLOCK: u32 = 71;
pub const JOURNAL_BLOCKS: u32 = 8;
pub const ROOT_DIR_BLOCK: u32 = 79;
/// 元数据保留区 `[0, RESERVED_BLOCKS)`，分配器从不动用
pub const RESERVED_BLOCKS: u32 = 80;
pub const MIN_BLOCKS: u32 = RESERVED_BLOCKS + 1;

pub const MAX_MOUNT_COUNT: u32 = 100;
/// 单个事务最多记录的块数
pub const MAX_TXN_BLOCKS: usize = 64;
pub const DEFAULT_LABEL: &str = "RFSS_DRIVE";

/// 一整块数据
pub type DataBlock = [u8; BLOCK_SIZE];

/// 块号
pub type BlockId = u32;
/// 索引节点号，从 1 开始
pub type InodeId = u32;
