//! 文件系统检查

use alloc::vec::Vec;

use derive_more::Display;

use crate::layout::FsState;
use crate::{BlockId, Error, JournalStatus, RESERVED_BLOCKS, Result, Session};

/// 检查发现的问题
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Problem {
    #[display(fmt = "bad magic or version")]
    BadSuperBlock,
    #[display(fmt = "superblock records {recorded} free blocks, bitmap has {counted}")]
    FreeBlocks { recorded: u32, counted: u32 },
    #[display(fmt = "superblock records {recorded} free inodes, bitmap has {counted}")]
    FreeInodes { recorded: u32, counted: u32 },
    #[display(fmt = "reserved block {} is marked free", _0)]
    ReservedBlockFree(BlockId),
    #[display(fmt = "root inode is not an allocated directory")]
    BadRoot,
    #[display(fmt = "journal header is corrupted")]
    BadJournal,
}

impl Session {
    /// 检查超级块、位图计数与日志。发现问题时在超级块中标记错误状态。
    pub fn check(&mut self) -> Result<Vec<Problem>> {
        let mut problems = Vec::new();

        if !self.sb.is_valid() {
            problems.push(Problem::BadSuperBlock);
        }

        let used = self.block_bitmap.count_set(self.sb.total_blocks as usize) as u32;
        let counted = self.sb.total_blocks - used;
        if counted != self.sb.free_blocks {
            problems.push(Problem::FreeBlocks {
                recorded: self.sb.free_blocks,
                counted,
            });
        }

        let used = self.inode_bitmap.count_set(self.sb.inode_count as usize) as u32;
        let counted = self.sb.inode_count - used;
        if counted != self.sb.free_inode_count {
            problems.push(Problem::FreeInodes {
                recorded: self.sb.free_inode_count,
                counted,
            });
        }

        problems.extend(
            (0..RESERVED_BLOCKS)
                .filter(|&block| !self.block_bitmap.get(block as usize))
                .map(Problem::ReservedBlockFree),
        );

        let root = self.sb.root_inode;
        let root_ok = root != 0
            && self.inode_bitmap.get(root as usize - 1)
            && self.get_inode(root).is_ok_and(|inode| inode.is_dir());
        if !root_ok {
            problems.push(Problem::BadRoot);
        }

        match self.check_consistency() {
            Ok(JournalStatus::Pending { id, .. }) if !self.in_transaction() => {
                log::warn!("journal holds uncommitted transaction {id}");
            }
            Ok(_) => (),
            Err(Error::Corruption) => problems.push(Problem::BadJournal),
            Err(err) => return Err(err),
        }

        if problems.is_empty() {
            log::info!("filesystem is clean");
        } else {
            for problem in &problems {
                log::warn!("fsck: {problem}");
            }
            self.sb.state |= FsState::Errors;
            self.dirty = true;
        }
        Ok(problems)
    }
}
