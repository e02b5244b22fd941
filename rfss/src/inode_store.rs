//! # 索引节点存储
//!
//! 第 `n` 号索引节点位于索引节点表第 `(n - 1) / 16` 块、块内第 `(n - 1) % 16` 槽。
//! 调用者得到的总是副本，修改后须经 [`Session::write_inode`] 写回。

use crate::layout::{DiskInode, INODE_SIZE, INODES_PER_BLOCK};
use crate::{BLOCK_SIZE, BlockId, Error, InodeId, Result, Session};

impl Session {
    fn inode_position(&self, inode: InodeId) -> Result<(BlockId, usize)> {
        if inode == 0 || inode > self.sb.inode_count {
            log::warn!("invalid inode number {inode}");
            return Err(Error::OutOfRange);
        }
        let index = (inode - 1) as usize;
        let block = self.sb.inode_table_block + (index / INODES_PER_BLOCK) as BlockId;
        Ok((block, index % INODES_PER_BLOCK * INODE_SIZE))
    }

    pub fn get_inode(&self, inode: InodeId) -> Result<DiskInode> {
        let (block, offset) = self.inode_position(inode)?;
        let mut buf = [0; BLOCK_SIZE];
        self.read_block(block, &mut buf)?;
        Ok(DiskInode::decode(&buf[offset..offset + INODE_SIZE]))
    }

    pub fn write_inode(&mut self, inode: InodeId, disk_inode: &DiskInode) -> Result<()> {
        let (block, offset) = self.inode_position(inode)?;
        let mut buf = [0; BLOCK_SIZE];
        self.read_block(block, &mut buf)?;
        disk_inode.encode(&mut buf[offset..offset + INODE_SIZE]);
        self.write_block(block, &buf)
    }
}
