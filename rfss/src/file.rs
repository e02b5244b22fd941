//! # 文件句柄层
//!
//! 句柄持有索引节点的副本与读写位置，每次调用都显式传入会话。
//! 文件只使用直接块，最大为 [`MAX_FILE_SIZE`](crate::MAX_FILE_SIZE) 字节。

use enumflags2::{BitFlags, bitflags};

use crate::layout::DiskInode;
use crate::{BLOCK_SIZE, BlockId, DIRECT_BLOCKS, Error, InodeId, Result, Session};

#[allow(clippy::upper_case_acronyms)]
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFlag {
    /// 先清空文件，再交给调用者
    TRUNC  = 0b0001,
    /// 文件不存在时创建
    CREATE = 0b0010,
    /// 读写位置从文件末尾开始
    APPEND = 0b0100,
}

impl OpenFlag {
    /// 不带任何标志：打开已存在的文件，从头读写
    #[inline]
    pub fn plain() -> BitFlags<OpenFlag> {
        BitFlags::empty()
    }
}

/// 打开的普通文件
#[derive(Debug)]
pub struct FileHandle {
    ino: InodeId,
    inode: DiskInode,
    pos: u64,
}

impl Session {
    pub fn open(&mut self, path: &str, flags: impl Into<BitFlags<OpenFlag>>) -> Result<FileHandle> {
        let flags = flags.into();

        let ino = match self.resolve(path)? {
            Some(ino) => ino,
            None if flags.contains(OpenFlag::CREATE) => self.create_file(path, 0o644)?,
            None => return Err(Error::NotFound),
        };
        let mut inode = self.get_inode(ino)?;
        if !inode.is_file() {
            return Err(Error::NotAFile);
        }

        if flags.contains(OpenFlag::TRUNC) {
            let blocks = detach_blocks(&mut inode);
            inode.mtime = self.now();
            self.write_inode(ino, &inode)?;
            self.free_blocks(&blocks);
        }
        let pos = if flags.contains(OpenFlag::APPEND) {
            inode.size
        } else {
            0
        };

        Ok(FileHandle { ino, inode, pos })
    }

    /// 释放列表中的非零块
    pub(crate) fn free_blocks(&mut self, blocks: &[BlockId]) {
        for &block in blocks.iter().filter(|&&b| b != 0) {
            self.free_block(block);
        }
    }
}

/// 清空直接块列表并将文件长度归零，返回原先的块。
/// 索引节点写回之后才能释放这些块。
pub(crate) fn detach_blocks(inode: &mut DiskInode) -> [BlockId; DIRECT_BLOCKS] {
    inode.size = 0;
    inode.blocks_count = 0;
    core::mem::take(&mut inode.direct)
}

impl FileHandle {
    #[inline]
    pub fn inode_number(&self) -> InodeId {
        self.ino
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.inode.size
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn seek(&mut self, pos: u64) {
        self.pos = pos;
    }

    /// 从当前位置读入 `buf`，返回读到的字节数，到达文件末尾时为 0
    pub fn read(&mut self, fs: &Session, buf: &mut [u8]) -> Result<usize> {
        if self.pos >= self.inode.size {
            return Ok(0);
        }
        let want = buf.len().min((self.inode.size - self.pos) as usize);
        let mut block_buf = [0; BLOCK_SIZE];
        let mut done = 0;

        while done < want {
            let index = (self.pos / BLOCK_SIZE as u64) as usize;
            let offset = (self.pos % BLOCK_SIZE as u64) as usize;
            if index >= DIRECT_BLOCKS {
                break;
            }
            let len = (BLOCK_SIZE - offset).min(want - done);

            match self.inode.direct[index] {
                // 空洞读出零
                0 => buf[done..done + len].fill(0),
                block => {
                    fs.read_block(block, &mut block_buf)?;
                    buf[done..done + len].copy_from_slice(&block_buf[offset..offset + len]);
                }
            }
            done += len;
            self.pos += len as u64;
        }

        Ok(done)
    }

    /// 从当前位置写入 `data`，返回写入的字节数。
    ///
    /// 空间不足或直接块用尽时提前停止，返回的字节数少于 `data.len()`，不视为错误。
    pub fn write(&mut self, fs: &mut Session, data: &[u8]) -> Result<usize> {
        let before = self.inode.clone();
        let start = self.pos;
        let mut block_buf = [0; BLOCK_SIZE];
        let mut done = 0;
        let mut io_error = None;

        while done < data.len() {
            let index = (self.pos / BLOCK_SIZE as u64) as usize;
            let offset = (self.pos % BLOCK_SIZE as u64) as usize;
            if index >= DIRECT_BLOCKS {
                log::debug!("inode {} reached the direct block limit", self.ino);
                break;
            }
            let len = (BLOCK_SIZE - offset).min(data.len() - done);

            let block = match self.inode.direct[index] {
                0 => {
                    let Ok(block) = fs.allocate_block() else {
                        log::warn!("no space left while writing inode {}", self.ino);
                        break;
                    };
                    block_buf.fill(0);
                    block_buf[offset..offset + len].copy_from_slice(&data[done..done + len]);
                    if let Err(err) = fs.write_block(block, &block_buf) {
                        fs.free_block(block);
                        io_error = Some(err);
                        break;
                    }
                    self.inode.direct[index] = block;
                    self.inode.blocks_count += 1;
                    block
                }
                block => {
                    let merged = if len < BLOCK_SIZE {
                        fs.read_block(block, &mut block_buf)
                    } else {
                        Ok(())
                    };
                    block_buf[offset..offset + len].copy_from_slice(&data[done..done + len]);
                    if let Err(err) = merged.and_then(|()| fs.write_block(block, &block_buf)) {
                        io_error = Some(err);
                        break;
                    }
                    block
                }
            };
            log::trace!("inode {} wrote {len} bytes to block {block}", self.ino);

            done += len;
            self.pos += len as u64;
            self.inode.size = self.inode.size.max(self.pos);
        }

        self.inode.mtime = fs.now();
        if let Err(err) = fs.write_inode(self.ino, &self.inode) {
            // 索引节点没有落盘，本次新分配的块无人引用
            for (&old, &new) in before.direct.iter().zip(&self.inode.direct) {
                if old == 0 && new != 0 {
                    fs.free_block(new);
                }
            }
            self.inode = before;
            self.pos = start;
            return Err(err);
        }

        match io_error {
            Some(err) if done == 0 => Err(err),
            _ => Ok(done),
        }
    }

    /// 没有需要刷新的状态
    pub fn close(self) {}
}
