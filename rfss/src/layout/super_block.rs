use enumflags2::{BitFlags, bitflags};

use super::{INODES_PER_BLOCK, get_u32, get_u64, put_u32, put_u64};
use crate::{
    BLOCK_BITMAP_BLOCK, BLOCK_BITS, BLOCK_SIZE, BlockId, INODE_COUNT, INODE_TABLE_BLOCK,
    JOURNAL_BLOCK, MAGIC, MAX_MOUNT_COUNT, MIN_BLOCKS, RESERVED_BLOCKS, ROOT_INODE, VERSION,
};

/// 文件系统状态标志
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsState {
    Clean = 1,
    Errors = 1 << 1,
}

/// 超级块，位于 0 号块开头
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    pub magic: u32,
    pub version: u32,
    pub block_size: u32,
    pub total_blocks: u32,
    pub free_blocks: u32,
    pub inode_table_block: BlockId,
    pub inode_count: u32,
    pub free_inode_count: u32,
    pub root_inode: u32,
    /// 块位图所在块，索引节点位图紧随其后
    pub bitmap_block: BlockId,
    pub journal_block: BlockId,
    /// 日志区块数，为 0 表示没有日志
    pub journal_size: u32,
    pub created_time: u64,
    pub modified_time: u64,
    pub mount_count: u32,
    pub max_mount_count: u32,
    pub state: BitFlags<FsState>,
    pub errors: u32,
    pub uuid: [u8; 16],
    /// 卷标，以 NUL 填充
    pub label: [u8; 16],
}

impl SuperBlock {
    /// 编码后的长度，之后到块尾全部为保留的零
    pub const SIZE: usize = 112 + 928;

    /// 新格式化的超级块。保留区与根目录的块、根索引节点已计为占用。
    pub fn new(total_blocks: u32, label: &str, journal_size: u32, now: u64) -> Self {
        let mut raw_label = [0; 16];
        raw_label[..label.len()].copy_from_slice(label.as_bytes());

        Self {
            magic: MAGIC,
            version: VERSION,
            block_size: BLOCK_SIZE as u32,
            total_blocks,
            free_blocks: total_blocks - RESERVED_BLOCKS,
            inode_table_block: INODE_TABLE_BLOCK,
            inode_count: INODE_COUNT,
            free_inode_count: INODE_COUNT - 1,
            root_inode: ROOT_INODE,
            bitmap_block: BLOCK_BITMAP_BLOCK,
            journal_block: JOURNAL_BLOCK,
            journal_size,
            created_time: now,
            modified_time: now,
            mount_count: 0,
            max_mount_count: MAX_MOUNT_COUNT,
            state: FsState::Clean.into(),
            errors: 0,
            uuid: make_uuid(total_blocks, now),
            label: raw_label,
        }
    }

    pub fn decode(buf: &[u8]) -> Self {
        let mut uuid = [0; 16];
        uuid.copy_from_slice(&buf[80..96]);
        let mut label = [0; 16];
        label.copy_from_slice(&buf[96..112]);

        Self {
            magic: get_u32(buf, 0),
            version: get_u32(buf, 4),
            block_size: get_u32(buf, 8),
            total_blocks: get_u32(buf, 12),
            free_blocks: get_u32(buf, 16),
            inode_table_block: get_u32(buf, 20),
            inode_count: get_u32(buf, 24),
            free_inode_count: get_u32(buf, 28),
            root_inode: get_u32(buf, 32),
            bitmap_block: get_u32(buf, 36),
            journal_block: get_u32(buf, 40),
            journal_size: get_u32(buf, 44),
            created_time: get_u64(buf, 48),
            modified_time: get_u64(buf, 56),
            mount_count: get_u32(buf, 64),
            max_mount_count: get_u32(buf, 68),
            state: BitFlags::from_bits_truncate(get_u32(buf, 72)),
            errors: get_u32(buf, 76),
            uuid,
            label,
        }
    }

    /// 写入 `buf` 的前 [`SuperBlock::SIZE`] 字节，保留区清零。
    pub fn encode(&self, buf: &mut [u8]) {
        put_u32(buf, 0, self.magic);
        put_u32(buf, 4, self.version);
        put_u32(buf, 8, self.block_size);
        put_u32(buf, 12, self.total_blocks);
        put_u32(buf, 16, self.free_blocks);
        put_u32(buf, 20, self.inode_table_block);
        put_u32(buf, 24, self.inode_count);
        put_u32(buf, 28, self.free_inode_count);
        put_u32(buf, 32, self.root_inode);
        put_u32(buf, 36, self.bitmap_block);
        put_u32(buf, 40, self.journal_block);
        put_u32(buf, 44, self.journal_size);
        put_u64(buf, 48, self.created_time);
        put_u64(buf, 56, self.modified_time);
        put_u32(buf, 64, self.mount_count);
        put_u32(buf, 68, self.max_mount_count);
        put_u32(buf, 72, self.state.bits());
        put_u32(buf, 76, self.errors);
        buf[80..96].copy_from_slice(&self.uuid);
        buf[96..112].copy_from_slice(&self.label);
        buf[112..Self::SIZE].fill(0);
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC && self.version == VERSION
    }

    /// 空闲计数不超过总数
    pub fn counters_sane(&self) -> bool {
        self.free_blocks <= self.total_blocks && self.free_inode_count <= self.inode_count
    }

    /// 各区域落在保留区内且互不重叠，计数不超过一张位图的容量
    pub fn layout_sane(&self) -> bool {
        let bits = BLOCK_BITS as u32;
        let table_blocks = self.inode_count.div_ceil(INODES_PER_BLOCK as u32);
        let table_end = self.inode_table_block as u64 + table_blocks as u64;
        let journal_end = self.journal_block as u64 + self.journal_size as u64;

        (MIN_BLOCKS..=bits).contains(&self.total_blocks)
            && (1..=bits).contains(&self.inode_count)
            && (1..=self.inode_count).contains(&self.root_inode)
            && self.inode_table_block > 0
            && table_end <= self.bitmap_block as u64
            && self.inode_bitmap_block() < RESERVED_BLOCKS
            && (!self.has_journal()
                || (self.journal_block > self.inode_bitmap_block()
                    && journal_end <= RESERVED_BLOCKS as u64))
    }

    #[inline]
    pub fn inode_bitmap_block(&self) -> BlockId {
        self.bitmap_block + 1
    }

    #[inline]
    pub fn has_journal(&self) -> bool {
        self.journal_size > 0
    }

    pub fn label(&self) -> &str {
        let end = self.label.iter().position(|&b| b == 0).unwrap_or(16);
        core::str::from_utf8(&self.label[..end]).unwrap_or("")
    }
}

/// 没有随机源，由格式化参数混合出卷标识
fn make_uuid(total_blocks: u32, now: u64) -> [u8; 16] {
    let mut seed = ((now ^ MAGIC as u64) << 32) | total_blocks as u64;
    let mut uuid = [0; 16];
    for chunk in uuid.chunks_mut(8) {
        // xorshift64
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        chunk.copy_from_slice(&seed.to_le_bytes());
    }
    uuid
}
