use super::{get_u32, get_u64, put_u32, put_u64};
use crate::{BLOCK_SIZE, BlockId};

pub const JOURNAL_HEADER_SIZE: usize = 24;
/// 块号、前像校验和、后像校验和，随后是前像
pub const JOURNAL_RECORD_SIZE: usize = 12 + BLOCK_SIZE;

/// 乘 33 累加的字节校验和
pub fn checksum(data: &[u8]) -> u32 {
    data.iter()
        .fold(0u32, |c, &b| (c << 5).wrapping_add(c).wrapping_add(b as u32))
}

/// 日志中事务的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TxnState {
    /// 前像已落盘，原地写可能进行到一半
    Pending = 1,
    Committed = 2,
}

/// 日志区开头的事务头，`txn_id` 为 0 表示日志为空
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalHeader {
    pub txn_id: u32,
    pub block_count: u32,
    pub timestamp: u64,
    pub state: u32,
    pub checksum: u32,
}

impl JournalHeader {
    pub fn new(txn_id: u32, block_count: u32, timestamp: u64, state: TxnState) -> Self {
        let mut header = Self {
            txn_id,
            block_count,
            timestamp,
            state: state as u32,
            checksum: 0,
        };
        let mut buf = [0; JOURNAL_HEADER_SIZE];
        header.encode(&mut buf);
        header.checksum = checksum(&buf[..20]);
        header
    }

    pub fn decode(buf: &[u8]) -> Self {
        Self {
            txn_id: get_u32(buf, 0),
            block_count: get_u32(buf, 4),
            timestamp: get_u64(buf, 8),
            state: get_u32(buf, 16),
            checksum: get_u32(buf, 20),
        }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        put_u32(buf, 0, self.txn_id);
        put_u32(buf, 4, self.block_count);
        put_u64(buf, 8, self.timestamp);
        put_u32(buf, 16, self.state);
        put_u32(buf, 20, self.checksum);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.txn_id == 0
    }

    /// 校验和覆盖头部前 20 字节
    pub fn is_intact(&self) -> bool {
        let mut buf = [0; JOURNAL_HEADER_SIZE];
        self.encode(&mut buf);
        checksum(&buf[..20]) == self.checksum
    }

    pub fn txn_state(&self) -> Option<TxnState> {
        match self.state {
            1 => Some(TxnState::Pending),
            2 => Some(TxnState::Committed),
            _ => None,
        }
    }
}

/// 日志块记录的头部，前像紧随其后
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalRecordHead {
    pub block: BlockId,
    pub pre_checksum: u32,
    pub post_checksum: u32,
}

impl JournalRecordHead {
    pub fn decode(buf: &[u8]) -> Self {
        Self {
            block: get_u32(buf, 0),
            pre_checksum: get_u32(buf, 4),
            post_checksum: get_u32(buf, 8),
        }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        put_u32(buf, 0, self.block);
        put_u32(buf, 4, self.pre_checksum);
        put_u32(buf, 8, self.post_checksum);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_times_33() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[1]), 1);
        assert_eq!(checksum(&[1, 2]), 35);
        assert_eq!(checksum(&[0; BLOCK_SIZE]), 0);
    }

    #[test]
    fn header_detects_tampering() {
        let header = JournalHeader::new(3, 2, 99, TxnState::Committed);
        assert!(header.is_intact());
        assert_eq!(header.txn_state(), Some(TxnState::Committed));

        let mut buf = [0; JOURNAL_HEADER_SIZE];
        header.encode(&mut buf);
        buf[4] ^= 1;
        assert!(!JournalHeader::decode(&buf).is_intact());
    }
}
