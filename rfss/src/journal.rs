//! # 预写日志
//!
//! 物理日志：事务记录每个被改写块的前像。日志区是从 `journal_block` 起
//! 连续 `journal_size` 块组成的字节流，依次存放事务头与块记录。
//!
//! 原地写之前，事务以 [`TxnState::Pending`] 状态连同前像落盘；
//! 提交时改写为 [`TxnState::Committed`] 并记下后像校验和。
//! 挂载时的重放撤销未提交的事务，并检查已提交事务的块。

use alloc::vec::Vec;
use core::ops::Range;

use derive_more::{Display, From, Into};

use crate::block_io::{read_raw, write_raw};
use crate::layout::{
    JOURNAL_HEADER_SIZE, JOURNAL_RECORD_SIZE, JournalHeader, JournalRecordHead, TxnState, checksum,
};
use crate::{BLOCK_SIZE, BlockId, DataBlock, Error, MAX_TXN_BLOCKS, Result, Session};

/// 事务编号，从 1 开始
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
#[repr(transparent)]
pub struct TxnId(u32);

/// 日志区的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalStatus {
    /// 文件系统没有日志区，或日志为空
    Clean,
    /// 有未提交的事务，下次挂载时会被撤销
    Pending { id: TxnId, blocks: u32 },
    Committed { id: TxnId, blocks: u32 },
}

#[derive(Debug)]
pub(crate) struct Journal {
    enabled: bool,
    next_id: u32,
    txn: Option<Transaction>,
}

impl Default for Journal {
    fn default() -> Self {
        Self {
            enabled: false,
            next_id: 1,
            txn: None,
        }
    }
}

#[derive(Debug)]
struct Transaction {
    id: TxnId,
    started: u64,
    records: Vec<LoggedBlock>,
}

/// 事务中的一块：首次记录的前像与最近一次写入的后像校验和
#[derive(Debug)]
struct LoggedBlock {
    block: BlockId,
    pre: Vec<u8>,
    pre_checksum: u32,
    post_checksum: u32,
}

impl Transaction {
    fn find_mut(&mut self, block: BlockId) -> Option<&mut LoggedBlock> {
        self.records.iter_mut().find(|rec| rec.block == block)
    }
}

impl Session {
    #[inline]
    pub fn journaling(&self) -> bool {
        self.journal.enabled
    }

    #[inline]
    pub fn in_transaction(&self) -> bool {
        self.journal.txn.is_some()
    }

    fn journal_region(&self) -> Range<BlockId> {
        self.sb.journal_block..self.sb.journal_block + self.sb.journal_size
    }

    /// 日志区能容纳的块记录数，不超过 [`MAX_TXN_BLOCKS`]
    pub fn journal_capacity(&self) -> usize {
        let bytes = self.sb.journal_size as usize * BLOCK_SIZE;
        (bytes.saturating_sub(JOURNAL_HEADER_SIZE) / JOURNAL_RECORD_SIZE).min(MAX_TXN_BLOCKS)
    }

    /// 启用日志并清空日志区
    pub fn enable_journaling(&mut self) -> Result<()> {
        if !self.sb.has_journal() {
            log::warn!("filesystem was formatted without a journal");
            return Err(Error::InvalidArgument);
        }
        if self.journal.enabled {
            return Ok(());
        }
        self.clear_journal()?;
        self.journal.enabled = true;
        log::info!("journaling enabled, {} blocks per transaction", self.journal_capacity());
        Ok(())
    }

    pub fn disable_journaling(&mut self) -> Result<()> {
        if self.journal.txn.is_some() {
            return Err(Error::TransactionOpen);
        }
        self.journal.enabled = false;
        log::info!("journaling disabled");
        Ok(())
    }

    pub fn start_transaction(&mut self) -> Result<TxnId> {
        if self.journal.txn.is_some() {
            return Err(Error::TransactionOpen);
        }
        if !self.journal.enabled || self.journal_capacity() == 0 {
            return Err(Error::InvalidArgument);
        }
        // 事务开始时缓存的元数据与磁盘一致，撤销后才能原样重新载入
        self.sync()?;

        let id = TxnId(self.journal.next_id);
        self.journal.next_id = self.journal.next_id.checked_add(1).unwrap_or(1);
        self.journal.txn = Some(Transaction {
            id,
            started: self.now(),
            records: Vec::new(),
        });
        log::debug!("transaction {id} started");
        Ok(id)
    }

    /// 把 `block` 的前像记入当前事务并立即落盘。
    /// 同一块只保留第一次记录的前像。
    pub fn log_block(&mut self, block: BlockId, pre_image: &DataBlock) -> Result<()> {
        self.log_pre_image(block, pre_image, checksum(pre_image))?;
        self.persist_journal(TxnState::Pending)
    }

    fn log_pre_image(&mut self, block: BlockId, pre_image: &[u8], post_checksum: u32) -> Result<()> {
        let capacity = self.journal_capacity();
        let txn = self.journal.txn.as_mut().ok_or(Error::NoTransaction)?;

        if let Some(rec) = txn.find_mut(block) {
            rec.post_checksum = post_checksum;
            return Ok(());
        }
        if txn.records.len() >= capacity {
            log::warn!("transaction {} is full ({capacity} blocks)", txn.id);
            return Err(Error::TransactionFull);
        }

        let mut pre = Vec::new();
        pre.try_reserve_exact(BLOCK_SIZE)?;
        pre.extend_from_slice(pre_image);
        txn.records.push(LoggedBlock {
            block,
            pre_checksum: checksum(pre_image),
            post_checksum,
            pre,
        });
        Ok(())
    }

    /// 经由日志的写：有打开的事务时，先把前像与新内容的校验和落盘，再原地写
    pub fn safe_write(&mut self, block: BlockId, data: &DataBlock) -> Result<()> {
        if self.journal.txn.is_some() && !self.journal_region().contains(&block) {
            let mut pre = [0; BLOCK_SIZE];
            if let Err(err) = read_raw(&*self.dev, block, &mut pre) {
                log::warn!("cannot read pre-image of block {block}: {err}, logging zeros");
                pre.fill(0);
            }
            self.log_pre_image(block, &pre, checksum(data))?;
            self.persist_journal(TxnState::Pending)?;
        }
        write_raw(&*self.dev, block, data)
    }

    /// 以提交状态重写日志，事务随之结束
    pub fn commit_transaction(&mut self) -> Result<TxnId> {
        if self.journal.txn.is_none() {
            return Err(Error::NoTransaction);
        }
        // 位图与超级块随事务一同提交；失败时事务保持打开，由调用者撤销
        self.sync()?;

        let mut buf = [0; BLOCK_SIZE];
        let blocks: Vec<_> = self.journal.txn.iter().flat_map(|t| &t.records).map(|r| r.block).collect();
        for block in blocks {
            read_raw(&*self.dev, block, &mut buf)?;
            if let Some(rec) = self.journal.txn.as_mut().and_then(|t| t.find_mut(block)) {
                rec.post_checksum = checksum(&buf);
            }
        }

        let result = self.persist_journal(TxnState::Committed);
        let txn = self.journal.txn.take().ok_or(Error::NoTransaction)?;
        result?;
        log::info!("transaction {} committed ({} blocks)", txn.id, txn.records.len());
        Ok(txn.id)
    }

    /// 按相反顺序写回所有前像，清空日志头，事务随之结束。
    /// 缓存的超级块与位图随后从磁盘重新载入。
    pub fn abort_transaction(&mut self) -> Result<()> {
        let txn = self.journal.txn.take().ok_or(Error::NoTransaction)?;
        for rec in txn.records.iter().rev() {
            write_raw(&*self.dev, rec.block, &rec.pre)?;
        }
        self.clear_journal_header()?;
        self.load_metadata()?;
        log::info!("transaction {} aborted ({} blocks restored)", txn.id, txn.records.len());
        Ok(())
    }

    /// 把当前事务写入日志区。由后向前写，使事务头所在的第一块最后落盘。
    fn persist_journal(&self, state: TxnState) -> Result<()> {
        let Some(txn) = &self.journal.txn else {
            return Ok(());
        };

        let used = JOURNAL_HEADER_SIZE + txn.records.len() * JOURNAL_RECORD_SIZE;
        let mut image = Vec::new();
        image.try_reserve_exact(used.next_multiple_of(BLOCK_SIZE))?;
        image.resize(used.next_multiple_of(BLOCK_SIZE), 0);

        JournalHeader::new(txn.id.into(), txn.records.len() as u32, txn.started, state)
            .encode(&mut image[..JOURNAL_HEADER_SIZE]);
        for (i, rec) in txn.records.iter().enumerate() {
            let offset = JOURNAL_HEADER_SIZE + i * JOURNAL_RECORD_SIZE;
            JournalRecordHead {
                block: rec.block,
                pre_checksum: rec.pre_checksum,
                post_checksum: rec.post_checksum,
            }
            .encode(&mut image[offset..offset + 12]);
            image[offset + 12..offset + JOURNAL_RECORD_SIZE].copy_from_slice(&rec.pre);
        }

        for (i, chunk) in image.chunks(BLOCK_SIZE).enumerate().rev() {
            write_raw(&*self.dev, self.sb.journal_block + i as BlockId, chunk)?;
        }
        Ok(())
    }

    fn read_journal(&self) -> Result<Vec<u8>> {
        let len = self.sb.journal_size as usize * BLOCK_SIZE;
        let mut image = Vec::new();
        image.try_reserve_exact(len)?;
        image.resize(len, 0);
        for (block, chunk) in self.journal_region().zip(image.chunks_mut(BLOCK_SIZE)) {
            read_raw(&*self.dev, block, chunk)?;
        }
        Ok(image)
    }

    fn clear_journal_header(&self) -> Result<()> {
        if !self.sb.has_journal() {
            return Ok(());
        }
        let mut buf = [0; BLOCK_SIZE];
        read_raw(&*self.dev, self.sb.journal_block, &mut buf)?;
        buf[..JOURNAL_HEADER_SIZE].fill(0);
        write_raw(&*self.dev, self.sb.journal_block, &buf)
    }

    /// 清零整个日志区
    pub fn clear_journal(&self) -> Result<()> {
        let zero = [0; BLOCK_SIZE];
        for block in self.journal_region() {
            write_raw(&*self.dev, block, &zero)?;
        }
        Ok(())
    }

    fn read_journal_header(&self) -> Result<Option<JournalHeader>> {
        if !self.sb.has_journal() {
            return Ok(None);
        }
        let mut buf = [0; BLOCK_SIZE];
        read_raw(&*self.dev, self.sb.journal_block, &mut buf)?;
        let header = JournalHeader::decode(&buf);
        if header.is_empty() {
            return Ok(None);
        }
        if !header.is_intact() || header.txn_state().is_none() {
            log::error!("journal header of transaction {} is corrupted", header.txn_id);
            return Err(Error::Corruption);
        }
        if header.block_count as usize > self.journal_capacity() {
            log::error!(
                "journal header claims {} blocks, capacity is {}",
                header.block_count,
                self.journal_capacity()
            );
            return Err(Error::Corruption);
        }
        Ok(Some(header))
    }

    /// 只读地检查日志头
    pub fn check_consistency(&self) -> Result<JournalStatus> {
        Ok(match self.read_journal_header()? {
            None => JournalStatus::Clean,
            Some(header) => {
                let id = TxnId(header.txn_id);
                let blocks = header.block_count;
                match header.txn_state() {
                    Some(TxnState::Committed) => JournalStatus::Committed { id, blocks },
                    _ => JournalStatus::Pending { id, blocks },
                }
            }
        })
    }

    /// 挂载时重放日志，返回写回前像的块数。成功后日志头被清零，重放是幂等的。
    pub(crate) fn replay(&mut self) -> Result<usize> {
        let Some(header) = self.read_journal_header()? else {
            return Ok(0);
        };
        let committed = header.txn_state() == Some(TxnState::Committed);
        log::info!(
            "replaying {} transaction {} ({} blocks)",
            if committed { "committed" } else { "pending" },
            header.txn_id,
            header.block_count
        );

        let image = self.read_journal()?;
        let mut order: Vec<usize> = (0..header.block_count as usize).collect();
        if !committed {
            order.reverse();
        }

        let region = self.journal_region();
        let mut current = [0; BLOCK_SIZE];
        let mut restored = 0;
        for i in order {
            let offset = JOURNAL_HEADER_SIZE + i * JOURNAL_RECORD_SIZE;
            let head = JournalRecordHead::decode(&image[offset..offset + 12]);
            let pre = &image[offset + 12..offset + JOURNAL_RECORD_SIZE];

            if head.block >= self.sb.total_blocks || region.contains(&head.block) {
                log::warn!("journal record {i} names invalid block {}", head.block);
                continue;
            }
            if checksum(pre) != head.pre_checksum {
                log::warn!("journal record {i} for block {} is torn, skipped", head.block);
                continue;
            }

            read_raw(&*self.dev, head.block, &mut current)?;
            let now = checksum(&current);
            let restore = if committed {
                if now == head.post_checksum {
                    false
                } else if now == head.pre_checksum {
                    true
                } else {
                    log::warn!("block {} matches neither journal image, left as is", head.block);
                    false
                }
            } else {
                now != head.pre_checksum
            };

            if restore {
                write_raw(&*self.dev, head.block, pre)?;
                restored += 1;
            }
        }

        self.clear_journal_header()?;
        log::info!("journal replay restored {restored} blocks");
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use block_dev::MemDisk;

    use super::*;
    use crate::FormatOptions;

    fn journaled(blocks: u64) -> (Arc<MemDisk>, Session) {
        let disk = Arc::new(MemDisk::new(blocks * crate::SECTORS_PER_BLOCK));
        Session::format_with(disk.clone(), &FormatOptions::default().journal(true)).unwrap();
        let mut fs = Session::mount(disk.clone()).unwrap();
        fs.enable_journaling().unwrap();
        (disk, fs)
    }

    #[test]
    fn capacity_is_bounded_by_region() {
        let (_, fs) = journaled(100);
        assert_eq!(fs.journal_capacity(), 7);
    }

    #[test]
    fn state_machine() {
        let (_, mut fs) = journaled(100);
        assert_eq!(fs.log_block(90, &[0; BLOCK_SIZE]), Err(Error::NoTransaction));
        assert_eq!(fs.commit_transaction(), Err(Error::NoTransaction));

        let id = fs.start_transaction().unwrap();
        assert_eq!(fs.start_transaction(), Err(Error::TransactionOpen));
        assert_eq!(fs.disable_journaling(), Err(Error::TransactionOpen));
        assert_eq!(fs.commit_transaction().unwrap(), id);
        assert!(!fs.in_transaction());

        let next = fs.start_transaction().unwrap();
        assert!(next > id);
        fs.abort_transaction().unwrap();
        assert_eq!(fs.check_consistency().unwrap(), JournalStatus::Clean);
    }

    #[test]
    fn transaction_requires_journaling() {
        let disk = Arc::new(MemDisk::new(100 * crate::SECTORS_PER_BLOCK));
        Session::format(disk.clone(), None).unwrap();
        let mut fs = Session::mount(disk).unwrap();
        assert_eq!(fs.enable_journaling(), Err(Error::InvalidArgument));
        assert_eq!(fs.start_transaction(), Err(Error::InvalidArgument));
    }

    #[test]
    fn abort_restores_pre_images() {
        let (_, mut fs) = journaled(100);
        let before = [0x11; BLOCK_SIZE];
        fs.write_block(90, &before).unwrap();

        fs.start_transaction().unwrap();
        fs.write_block(90, &[0x22; BLOCK_SIZE]).unwrap();
        fs.write_block(90, &[0x33; BLOCK_SIZE]).unwrap();
        fs.abort_transaction().unwrap();

        let mut buf = [0; BLOCK_SIZE];
        fs.read_block(90, &mut buf).unwrap();
        assert_eq!(buf, before);
    }

    #[test]
    fn full_transaction() {
        let (_, mut fs) = journaled(100);
        fs.start_transaction().unwrap();
        for block in 81..88 {
            fs.write_block(block, &[1; BLOCK_SIZE]).unwrap();
        }
        // 已记录的块可以反复写
        fs.write_block(81, &[2; BLOCK_SIZE]).unwrap();
        assert_eq!(fs.write_block(88, &[1; BLOCK_SIZE]), Err(Error::TransactionFull));
        fs.commit_transaction().unwrap();
    }

    #[test]
    fn committed_journal_survives_commit() {
        let (_, mut fs) = journaled(100);
        let id = fs.start_transaction().unwrap();
        fs.write_block(90, &[5; BLOCK_SIZE]).unwrap();
        assert_eq!(fs.check_consistency().unwrap(), JournalStatus::Pending { id, blocks: 1 });
        fs.commit_transaction().unwrap();
        assert_eq!(fs.check_consistency().unwrap(), JournalStatus::Committed { id, blocks: 1 });
    }
}
