use super::{get_u32, get_u64, put_u32, put_u64};
use crate::{BLOCK_SIZE, BlockId, DIRECT_BLOCKS};

pub const INODE_SIZE: usize = 248;
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

const EXTENT_SLOTS: usize = 8;
const TYPE_SHIFT: u32 = 12;
const PERM_MASK: u32 = 0o7777;

/// 文件类型，存放于 `mode` 的 12..16 位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileType {
    Regular = 1,
    Directory = 2,
    Symlink = 3,
    Device = 4,
}

impl FileType {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Regular),
            2 => Some(Self::Directory),
            3 => Some(Self::Symlink),
            4 => Some(Self::Device),
            _ => None,
        }
    }
}

/// 磁盘上的索引节点，每块存放 [`INODES_PER_BLOCK`] 个
///
/// 间接块与区段字段只保留位置，始终为零。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiskInode {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime: u64,
    pub ctime: u64,
    pub mtime: u64,
    pub links_count: u32,
    pub blocks_count: u32,
    pub flags: u32,
    /// 直接块，0 表示未分配
    pub direct: [BlockId; DIRECT_BLOCKS],
    pub indirect: BlockId,
    pub double_indirect: BlockId,
    pub triple_indirect: BlockId,
    pub extents: [(BlockId, u32); EXTENT_SLOTS],
    pub extent_count: u32,
}

impl DiskInode {
    pub fn new(file_type: FileType, perm: u32, now: u64) -> Self {
        Self {
            mode: ((file_type as u32) << TYPE_SHIFT) | (perm & PERM_MASK),
            links_count: 1,
            atime: now,
            ctime: now,
            mtime: now,
            ..Self::default()
        }
    }

    pub fn decode(buf: &[u8]) -> Self {
        let mut direct = [0; DIRECT_BLOCKS];
        for (i, block) in direct.iter_mut().enumerate() {
            *block = get_u32(buf, 56 + i * 4);
        }
        let mut extents = [(0, 0); EXTENT_SLOTS];
        for (i, extent) in extents.iter_mut().enumerate() {
            *extent = (get_u32(buf, 116 + i * 8), get_u32(buf, 120 + i * 8));
        }

        Self {
            mode: get_u32(buf, 0),
            uid: get_u32(buf, 4),
            gid: get_u32(buf, 8),
            size: get_u64(buf, 12),
            atime: get_u64(buf, 20),
            ctime: get_u64(buf, 28),
            mtime: get_u64(buf, 36),
            links_count: get_u32(buf, 44),
            blocks_count: get_u32(buf, 48),
            flags: get_u32(buf, 52),
            direct,
            indirect: get_u32(buf, 104),
            double_indirect: get_u32(buf, 108),
            triple_indirect: get_u32(buf, 112),
            extents,
            extent_count: get_u32(buf, 180),
        }
    }

    /// 写入 `buf` 的前 [`INODE_SIZE`] 字节，保留区清零。
    pub fn encode(&self, buf: &mut [u8]) {
        put_u32(buf, 0, self.mode);
        put_u32(buf, 4, self.uid);
        put_u32(buf, 8, self.gid);
        put_u64(buf, 12, self.size);
        put_u64(buf, 20, self.atime);
        put_u64(buf, 28, self.ctime);
        put_u64(buf, 36, self.mtime);
        put_u32(buf, 44, self.links_count);
        put_u32(buf, 48, self.blocks_count);
        put_u32(buf, 52, self.flags);
        for (i, &block) in self.direct.iter().enumerate() {
            put_u32(buf, 56 + i * 4, block);
        }
        put_u32(buf, 104, self.indirect);
        put_u32(buf, 108, self.double_indirect);
        put_u32(buf, 112, self.triple_indirect);
        for (i, &(start, len)) in self.extents.iter().enumerate() {
            put_u32(buf, 116 + i * 8, start);
            put_u32(buf, 120 + i * 8, len);
        }
        put_u32(buf, 180, self.extent_count);
        buf[184..INODE_SIZE].fill(0);
    }

    #[inline]
    pub fn file_type(&self) -> Option<FileType> {
        FileType::from_raw(((self.mode >> TYPE_SHIFT) & 0xf) as u8)
    }

    #[inline]
    pub fn permissions(&self) -> u32 {
        self.mode & PERM_MASK
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.file_type() == Some(FileType::Directory)
    }

    #[inline]
    pub fn is_file(&self) -> bool {
        self.file_type() == Some(FileType::Regular)
    }

    /// 已分配的直接块
    pub fn data_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.direct.iter().copied().filter(|&block| block != 0)
    }
}
