//! # 复合操作
//!
//! 创建与删除文件、目录，以及当前目录的维护。
//! 分配之后的任何一步失败，都会释放本次分配的索引节点与块。

use alloc::string::String;
use alloc::vec::Vec;

use crate::dir::{DirEntry, check_name, init_dir_block};
use crate::layout::{DiskInode, FileType};
use crate::{BLOCK_SIZE, Error, InodeId, Path, Result, Session};

/// 文件的元数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub inode: InodeId,
    pub kind: FileType,
    /// 权限位
    pub mode: u32,
    pub size: u64,
    pub blocks: u32,
    pub links: u32,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
}

impl Session {
    /// 解析父目录，检查名字与重名
    fn prepare_create<'a>(&self, path: &'a str) -> Result<(InodeId, &'a str)> {
        let (parent, name) = self.split_parent(path)?;
        check_name(name)?;
        if self.find_entry(parent, name)?.is_some() {
            return Err(Error::AlreadyExists);
        }
        Ok((parent, name))
    }

    pub fn create_file(&mut self, path: &str, mode: u32) -> Result<InodeId> {
        let (parent, name) = self.prepare_create(path)?;

        let ino = self.allocate_inode()?;
        let inode = DiskInode::new(FileType::Regular, mode, self.now());
        let linked = self
            .write_inode(ino, &inode)
            .and_then(|()| self.add_entry(parent, name, ino, FileType::Regular));
        if let Err(err) = linked {
            self.free_inode(ino);
            return Err(err);
        }

        log::debug!("created file {path:?} (inode {ino})");
        Ok(ino)
    }

    pub fn create_directory(&mut self, path: &str) -> Result<InodeId> {
        let (parent, name) = self.prepare_create(path)?;

        let ino = self.allocate_inode()?;
        let block = match self.allocate_block() {
            Ok(block) => block,
            Err(err) => {
                self.free_inode(ino);
                return Err(err);
            }
        };

        let mut inode = DiskInode::new(FileType::Directory, 0o755, self.now());
        inode.size = BLOCK_SIZE as u64;
        inode.links_count = 2;
        inode.blocks_count = 1;
        inode.direct[0] = block;

        let mut buf = [0; BLOCK_SIZE];
        init_dir_block(&mut buf, ino, parent);
        let linked = self
            .write_block(block, &buf)
            .and_then(|()| self.write_inode(ino, &inode))
            .and_then(|()| self.add_entry(parent, name, ino, FileType::Directory));
        if let Err(err) = linked {
            self.free_block(block);
            self.free_inode(ino);
            return Err(err);
        }

        log::debug!("created directory {path:?} (inode {ino}, block {block})");
        Ok(ino)
    }

    /// 删除普通文件，释放其数据块与索引节点
    pub fn delete_file(&mut self, path: &str) -> Result<()> {
        let (parent, name) = self.split_parent(path)?;
        let ino = self.find_entry(parent, name)?.ok_or(Error::NotFound)?;
        let inode = self.get_inode(ino)?;
        if inode.is_dir() {
            return Err(Error::NotAFile);
        }

        self.remove_entry(parent, name)?;
        self.release_inode(ino, inode)?;
        log::debug!("deleted file {path:?} (inode {ino})");
        Ok(())
    }

    /// 删除空目录。根目录与当前目录不能删除。
    pub fn remove_directory(&mut self, path: &str) -> Result<()> {
        let (parent, name) = self.split_parent(path)?;
        if matches!(name, "." | "..") {
            return Err(Error::InvalidArgument);
        }
        let ino = self.find_entry(parent, name)?.ok_or(Error::NotFound)?;
        if ino == self.sb.root_inode || ino == self.cwd {
            return Err(Error::InvalidArgument);
        }
        let inode = self.get_inode(ino)?;
        if !inode.is_dir() {
            return Err(Error::NotADirectory);
        }
        if !self.is_empty(ino)? {
            return Err(Error::DirectoryNotEmpty);
        }

        self.remove_entry(parent, name)?;
        self.release_inode(ino, inode)?;
        log::debug!("removed directory {path:?} (inode {ino})");
        Ok(())
    }

    /// 释放已脱离目录树的索引节点及其数据块。
    /// 先清空磁盘上的索引节点，写回失败时块与索引节点都保持占用。
    fn release_inode(&mut self, ino: InodeId, inode: DiskInode) -> Result<()> {
        self.write_inode(ino, &DiskInode::default())?;
        self.free_blocks(&inode.direct);
        self.free_inode(ino);
        Ok(())
    }

    pub fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>> {
        let ino = self.resolve(path)?.ok_or(Error::NotFound)?;
        self.list(ino)
    }

    pub fn change_directory(&mut self, path: &str) -> Result<()> {
        let ino = self.resolve(path)?.ok_or(Error::NotFound)?;
        if !self.get_inode(ino)?.is_dir() {
            return Err(Error::NotADirectory);
        }
        let canonical: String = path.canonicalize(&self.cwd_path);
        self.cwd = ino;
        self.cwd_path = canonical;
        Ok(())
    }

    #[inline]
    pub fn current_path(&self) -> &str {
        &self.cwd_path
    }

    pub fn stat(&self, path: &str) -> Result<Stat> {
        let ino = self.resolve(path)?.ok_or(Error::NotFound)?;
        let inode = self.get_inode(ino)?;
        let kind = inode.file_type().ok_or_else(|| {
            log::error!("inode {ino} has unknown type in mode {:#o}", inode.mode);
            Error::Corruption
        })?;

        Ok(Stat {
            inode: ino,
            kind,
            mode: inode.permissions(),
            size: inode.size,
            blocks: inode.blocks_count,
            links: inode.links_count,
            atime: inode.atime,
            mtime: inode.mtime,
            ctime: inode.ctime,
        })
    }
}
