use super::{get_u16, get_u32, put_u16, put_u32};

/// 目录项头部：inode(4) + rec_len(2) + name_len(1) + file_type(1)
pub const DIR_ENTRY_HEADER: usize = 8;

/// 名字长为 `name_len` 的目录项实际需要的长度，按 4 字节对齐
#[inline]
pub const fn natural_rec_len(name_len: usize) -> usize {
    (DIR_ENTRY_HEADER + name_len).next_multiple_of(4)
}

/// 目录块内一个目录项的头部及其位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawDirEntry {
    /// 在块内的偏移
    pub offset: usize,
    /// 为 0 表示墓碑
    pub inode: u32,
    pub rec_len: usize,
    pub name_len: usize,
    pub file_type: u8,
}

impl RawDirEntry {
    /// 解析 `offset` 处的目录项；记录长度不合法时扫描到此为止，返回 `None`。
    pub fn parse(block: &[u8], offset: usize) -> Option<Self> {
        let rest = block.len().checked_sub(offset)?;
        if rest < DIR_ENTRY_HEADER {
            return None;
        }
        let rec_len = get_u16(block, offset + 4) as usize;
        let name_len = block[offset + 6] as usize;
        if rec_len % 4 != 0 || rec_len < natural_rec_len(name_len) || rec_len > rest {
            return None;
        }

        Some(Self {
            offset,
            inode: get_u32(block, offset),
            rec_len,
            name_len,
            file_type: block[offset + 7],
        })
    }

    #[inline]
    pub fn name<'a>(&self, block: &'a [u8]) -> &'a [u8] {
        let start = self.offset + DIR_ENTRY_HEADER;
        &block[start..start + self.name_len]
    }

    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.inode == 0
    }

    /// 记录末尾可供新目录项使用的空间
    #[inline]
    pub fn slack(&self) -> usize {
        self.rec_len - natural_rec_len(self.name_len)
    }

    /// 依次遍历块内的目录项，包括墓碑
    pub fn iter(block: &[u8]) -> impl Iterator<Item = Self> + '_ {
        let mut offset = 0;
        core::iter::from_fn(move || {
            let entry = Self::parse(block, offset)?;
            offset += entry.rec_len;
            Some(entry)
        })
    }

    /// 在 `offset` 处写入一个完整的目录项
    pub fn write(block: &mut [u8], offset: usize, inode: u32, rec_len: usize, name: &[u8], file_type: u8) {
        put_u32(block, offset, inode);
        put_u16(block, offset + 4, rec_len as u16);
        block[offset + 6] = name.len() as u8;
        block[offset + 7] = file_type;
        let start = offset + DIR_ENTRY_HEADER;
        block[start..start + name.len()].copy_from_slice(name);
    }

    pub fn set_rec_len(block: &mut [u8], offset: usize, rec_len: usize) {
        put_u16(block, offset + 4, rec_len as u16);
    }

    pub fn set_inode(block: &mut [u8], offset: usize, inode: u32) {
        put_u32(block, offset, inode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BLOCK_SIZE;

    #[test]
    fn record_lengths() {
        assert_eq!(natural_rec_len(1), 12);
        assert_eq!(natural_rec_len(2), 12);
        assert_eq!(natural_rec_len(4), 12);
        assert_eq!(natural_rec_len(5), 16);
        assert_eq!(natural_rec_len(255), 264);
    }

    #[test]
    fn scan_stops_at_bad_record() {
        let mut block = [0u8; BLOCK_SIZE];
        RawDirEntry::write(&mut block, 0, 1, 12, b".", 2);
        RawDirEntry::write(&mut block, 12, 1, 12, b"..", 2);
        // 第三项的记录长度为 0
        RawDirEntry::write(&mut block, 24, 5, 0, b"abc", 1);

        let names: Vec<_> = RawDirEntry::iter(&block)
            .map(|e| e.name(&block).to_vec())
            .collect();
        assert_eq!(names, [b".".to_vec(), b"..".to_vec()]);
    }

    #[test]
    fn record_past_block_end_is_rejected() {
        let mut block = [0u8; BLOCK_SIZE];
        RawDirEntry::write(&mut block, 0, 1, BLOCK_SIZE + 4, b"x", 1);
        assert_eq!(RawDirEntry::parse(&block, 0), None);
    }
}
