//! # 目录引擎
//!
//! 目录的数据块由变长目录项首尾相接填满，每块最后一项延伸到块尾。
//! 删除只把目录项的 inode 置 0 留下墓碑，从不整理；
//! 插入只利用每块最后一项之后的空闲空间，不复用墓碑。

use alloc::string::String;
use alloc::vec::Vec;

use crate::layout::{DiskInode, FileType, RawDirEntry, natural_rec_len};
use crate::{BLOCK_SIZE, Error, InodeId, MAX_FILENAME, Result, Session};

/// 目录中的一项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub inode: InodeId,
    /// 目录项中记录的类型，无法识别时为 `None`
    pub kind: Option<FileType>,
    pub name: String,
}

/// 文件名为 1 到 255 字节，且不含 `/` 与 NUL
pub(crate) fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_FILENAME || name.bytes().any(|b| b == b'/' || b == 0) {
        return Err(Error::InvalidArgument);
    }
    Ok(())
}

/// 新目录的第一块：`.` 指向自身，`..` 指向父目录并延伸到块尾
pub(crate) fn init_dir_block(buf: &mut [u8], ino: InodeId, parent: InodeId) {
    let dot = natural_rec_len(1);
    let kind = FileType::Directory as u8;
    RawDirEntry::write(buf, 0, ino, dot, b".", kind);
    RawDirEntry::write(buf, dot, parent, BLOCK_SIZE - dot, b"..", kind);
}

impl Session {
    fn dir_inode(&self, dir: InodeId) -> Result<DiskInode> {
        let inode = self.get_inode(dir)?;
        if !inode.is_dir() {
            return Err(Error::NotADirectory);
        }
        Ok(inode)
    }

    /// 在目录 `dir` 中查找名为 `name` 的目录项
    pub fn find_entry(&self, dir: InodeId, name: &str) -> Result<Option<InodeId>> {
        let inode = self.dir_inode(dir)?;
        let mut buf = [0; BLOCK_SIZE];

        for block in inode.data_blocks() {
            self.read_block(block, &mut buf)?;
            if let Some(entry) = RawDirEntry::iter(&buf)
                .find(|e| !e.is_tombstone() && e.name(&buf) == name.as_bytes())
            {
                return Ok(Some(entry.inode));
            }
        }

        Ok(None)
    }

    /// 向目录 `dir` 加入指向 `target` 的目录项，不检查重名
    pub fn add_entry(&mut self, dir: InodeId, name: &str, target: InodeId, kind: FileType) -> Result<()> {
        check_name(name)?;
        if target == 0 {
            return Err(Error::InvalidArgument);
        }

        let mut inode = self.dir_inode(dir)?;
        let needed = natural_rec_len(name.len());
        let mut buf = [0; BLOCK_SIZE];

        for block in inode.data_blocks() {
            self.read_block(block, &mut buf)?;
            let Some(last) = RawDirEntry::iter(&buf).last() else {
                continue;
            };
            if last.slack() < needed {
                continue;
            }

            // 把最后一项收缩到实际长度，新目录项占据余下的空间
            let used = natural_rec_len(last.name_len);
            RawDirEntry::set_rec_len(&mut buf, last.offset, used);
            RawDirEntry::write(
                &mut buf,
                last.offset + used,
                target,
                last.rec_len - used,
                name.as_bytes(),
                kind as u8,
            );
            return self.write_block(block, &buf);
        }

        let Some(slot) = inode.direct.iter().position(|&b| b == 0) else {
            log::warn!("directory {dir} has no free direct block for {name:?}");
            return Err(Error::DirectoryFull);
        };

        let new_block = self.allocate_block()?;
        buf.fill(0);
        RawDirEntry::write(&mut buf, 0, target, BLOCK_SIZE, name.as_bytes(), kind as u8);
        if let Err(err) = self.write_block(new_block, &buf) {
            self.free_block(new_block);
            return Err(err);
        }

        inode.direct[slot] = new_block;
        inode.size += BLOCK_SIZE as u64;
        inode.blocks_count += 1;
        inode.mtime = self.now();
        if let Err(err) = self.write_inode(dir, &inode) {
            self.free_block(new_block);
            return Err(err);
        }

        Ok(())
    }

    /// 将名为 `name` 的目录项就地置为墓碑
    pub fn remove_entry(&mut self, dir: InodeId, name: &str) -> Result<()> {
        let inode = self.dir_inode(dir)?;
        let mut buf = [0; BLOCK_SIZE];

        for block in inode.data_blocks() {
            self.read_block(block, &mut buf)?;
            let found = RawDirEntry::iter(&buf)
                .find(|e| !e.is_tombstone() && e.name(&buf) == name.as_bytes());
            if let Some(entry) = found {
                RawDirEntry::set_inode(&mut buf, entry.offset, 0);
                return self.write_block(block, &buf);
            }
        }

        Err(Error::NotFound)
    }

    /// 除 `.` 与 `..` 外只剩墓碑
    pub fn is_empty(&self, dir: InodeId) -> Result<bool> {
        let inode = self.dir_inode(dir)?;
        let mut buf = [0; BLOCK_SIZE];

        for block in inode.data_blocks() {
            self.read_block(block, &mut buf)?;
            let occupied = RawDirEntry::iter(&buf)
                .filter(|e| !e.is_tombstone())
                .any(|e| !matches!(e.name(&buf), b"." | b".."));
            if occupied {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// 按磁盘顺序列出所有有效目录项，包括 `.` 与 `..`
    pub fn list(&self, dir: InodeId) -> Result<Vec<DirEntry>> {
        let inode = self.dir_inode(dir)?;
        let mut buf = [0; BLOCK_SIZE];
        let mut entries = Vec::new();

        for block in inode.data_blocks() {
            self.read_block(block, &mut buf)?;
            entries.extend(RawDirEntry::iter(&buf).filter(|e| !e.is_tombstone()).map(|e| {
                DirEntry {
                    inode: e.inode,
                    kind: FileType::from_raw(e.file_type),
                    name: String::from_utf8_lossy(e.name(&buf)).into_owned(),
                }
            }));
        }

        Ok(entries)
    }
}
