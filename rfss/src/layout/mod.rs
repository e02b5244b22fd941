//! # 磁盘数据结构层
//!
//! 所有磁盘结构都以小端序逐字段编解码，不依赖内存布局。

mod bitmap;
mod dir_entry;
mod inode;
mod journal;
mod super_block;

pub use self::{
    bitmap::Bitmap,
    dir_entry::{RawDirEntry, natural_rec_len},
    inode::{DiskInode, FileType, INODE_SIZE, INODES_PER_BLOCK},
    journal::{
        JOURNAL_HEADER_SIZE, JOURNAL_RECORD_SIZE, JournalHeader, JournalRecordHead, TxnState,
        checksum,
    },
    super_block::{FsState, SuperBlock},
};

#[inline]
pub(crate) fn get_u16(buf: &[u8], off: usize) -> u16 {
    let mut raw = [0; 2];
    raw.copy_from_slice(&buf[off..off + 2]);
    u16::from_le_bytes(raw)
}

#[inline]
pub(crate) fn get_u32(buf: &[u8], off: usize) -> u32 {
    let mut raw = [0; 4];
    raw.copy_from_slice(&buf[off..off + 4]);
    u32::from_le_bytes(raw)
}

#[inline]
pub(crate) fn get_u64(buf: &[u8], off: usize) -> u64 {
    let mut raw = [0; 8];
    raw.copy_from_slice(&buf[off..off + 8]);
    u64::from_le_bytes(raw)
}

#[inline]
pub(crate) fn put_u16(buf: &mut [u8], off: usize, val: u16) {
    buf[off..off + 2].copy_from_slice(&val.to_le_bytes());
}

#[inline]
pub(crate) fn put_u32(buf: &mut [u8], off: usize, val: u32) {
    buf[off..off + 4].copy_from_slice(&val.to_le_bytes());
}

#[inline]
pub(crate) fn put_u64(buf: &mut [u8], off: usize, val: u64) {
    buf[off..off + 8].copy_from_slice(&val.to_le_bytes());
}
