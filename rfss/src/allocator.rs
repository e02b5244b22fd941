//! # 位图分配器
//!
//! 块位图与索引节点位图在挂载期间缓存于会话中，分配与释放只修改缓存并
//! 标记为脏，卸载或 [`Session::sync`] 时才写回。

use crate::{BlockId, Error, InodeId, RESERVED_BLOCKS, Result, Session};

impl Session {
    /// 从保留区之后找第一个空闲块
    pub fn allocate_block(&mut self) -> Result<BlockId> {
        if self.sb.free_blocks == 0 {
            return Err(Error::NoSpace);
        }

        let Some(bit) = self
            .block_bitmap
            .first_clear(RESERVED_BLOCKS as usize, self.sb.total_blocks as usize)
        else {
            log::error!(
                "block bitmap full but superblock reports {} free blocks",
                self.sb.free_blocks
            );
            return Err(Error::Corruption);
        };

        self.block_bitmap.set(bit);
        self.sb.free_blocks -= 1;
        self.dirty = true;
        Ok(bit as BlockId)
    }

    /// 释放数据块；越界、保留区内或本就空闲的块被忽略
    pub fn free_block(&mut self, block: BlockId) {
        if block < RESERVED_BLOCKS || block >= self.sb.total_blocks {
            return;
        }
        if self.block_bitmap.clear(block as usize) {
            self.sb.free_blocks += 1;
            self.dirty = true;
        }
    }

    /// 索引节点从 1 开始编号，第 `n` 号占用位图第 `n - 1` 位
    pub fn allocate_inode(&mut self) -> Result<InodeId> {
        if self.sb.free_inode_count == 0 {
            return Err(Error::NoSpace);
        }

        let Some(bit) = self.inode_bitmap.first_clear(0, self.sb.inode_count as usize) else {
            log::error!(
                "inode bitmap full but superblock reports {} free inodes",
                self.sb.free_inode_count
            );
            return Err(Error::Corruption);
        };

        self.inode_bitmap.set(bit);
        self.sb.free_inode_count -= 1;
        self.dirty = true;
        Ok(bit as InodeId + 1)
    }

    pub fn free_inode(&mut self, inode: InodeId) {
        if inode == 0 || inode > self.sb.inode_count {
            return;
        }
        if self.inode_bitmap.clear(inode as usize - 1) {
            self.sb.free_inode_count += 1;
            self.dirty = true;
        }
    }

    #[inline]
    pub fn free_block_count(&self) -> u32 {
        self.sb.free_blocks
    }

    #[inline]
    pub fn free_inode_count(&self) -> u32 {
        self.sb.free_inode_count
    }
}
