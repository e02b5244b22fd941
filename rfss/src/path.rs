//! # 路径解析
//!
//! 以 `/` 开头的路径从根目录出发，否则从当前目录出发；空分量被忽略。

use alloc::borrow::ToOwned;
use alloc::string::String;
use alloc::vec::Vec;

use crate::{Error, InodeId, MAX_PATH, Result, Session};

pub trait Path: ToOwned {
    fn is_absolute(&self) -> bool;

    /// 返回路径的`(父目录, 文件名)`，忽略末尾的`/`。
    ///
    /// 只有一个分量的相对路径，父目录为空串。
    fn parent_file(&self) -> Option<(&Self, &Self)>;

    /// 返回不以`/`结束、不包含相对项的绝对路径。
    /// 越过根目录的`..`停在根目录。
    ///
    /// # 参数
    ///
    /// `cwd`: 绝对路径，非根时不以`/`结束。
    fn canonicalize(&self, cwd: &Self) -> Self::Owned;
}

impl Path for str {
    fn is_absolute(&self) -> bool {
        self.starts_with('/')
    }

    fn parent_file(&self) -> Option<(&Self, &Self)> {
        let trimmed = self.trim_end_matches('/');
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.rsplit_once('/') {
            // `/name` 的父目录是根
            Some(("", name)) => Some(("/", name)),
            Some((parent, name)) => Some((parent, name)),
            None => Some(("", trimmed)),
        }
    }

    fn canonicalize(&self, cwd: &Self) -> String {
        let mut cmps = Vec::new();
        if !self.is_absolute() {
            cmps.extend(cwd.split('/').filter(|s| !s.is_empty()));
        }

        for cmp in self.split('/') {
            match cmp {
                ".." => {
                    cmps.pop();
                }
                "." | "" => (),
                s => cmps.push(s),
            }
        }

        if cmps.is_empty() {
            return "/".to_owned();
        }
        cmps.insert(0, ""); // 在接下来的拼接中代表根目录
        cmps.join("/")
    }
}

impl Session {
    /// 解析路径得到索引节点号，某一分量不存在时返回 `None`
    pub fn resolve(&self, path: &str) -> Result<Option<InodeId>> {
        if path.len() > MAX_PATH {
            return Err(Error::InvalidArgument);
        }

        let mut current = if path.is_absolute() {
            self.sb.root_inode
        } else {
            self.cwd
        };
        for name in path.split('/').filter(|s| !s.is_empty()) {
            match self.find_entry(current, name)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }

        Ok(Some(current))
    }

    /// 解析出父目录与最后一个分量，父目录必须存在且为目录
    pub(crate) fn split_parent<'a>(&self, path: &'a str) -> Result<(InodeId, &'a str)> {
        if path.len() > MAX_PATH {
            return Err(Error::InvalidArgument);
        }
        let (parent, name) = path.parent_file().ok_or(Error::InvalidArgument)?;
        let parent = self.resolve(parent)?.ok_or(Error::NotFound)?;
        if !self.get_inode(parent)?.is_dir() {
            return Err(Error::NotADirectory);
        }
        Ok((parent, name))
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use block_dev::MemDisk;

    use super::*;
    use crate::ROOT_INODE;

    #[test]
    fn parent_file() {
        assert_eq!("/a/b".parent_file(), Some(("/a", "b")));
        assert_eq!("/a".parent_file(), Some(("/", "a")));
        assert_eq!("a".parent_file(), Some(("", "a")));
        assert_eq!("a/b/".parent_file(), Some(("a", "b")));
        assert_eq!("/".parent_file(), None);
        assert_eq!("".parent_file(), None);
    }

    #[test]
    fn canonicalize() {
        assert_eq!("/a/./b/../c".canonicalize("/x"), "/a/c");
        assert_eq!("b".canonicalize("/a"), "/a/b");
        assert_eq!("..".canonicalize("/a"), "/");
        assert_eq!("../../..".canonicalize("/a"), "/");
        assert_eq!("/".canonicalize("/a"), "/");
        assert_eq!("c//d/".canonicalize("/"), "/c/d");
    }

    #[test]
    fn resolve_walks_components() {
        let disk = Arc::new(MemDisk::new(200 * crate::SECTORS_PER_BLOCK));
        Session::format(disk.clone(), None).unwrap();
        let mut fs = Session::mount(disk).unwrap();

        let a = fs.create_directory("/a").unwrap();
        let b = fs.create_directory("/a/b").unwrap();
        let f = fs.create_file("/a/b/f", 0o644).unwrap();

        assert_eq!(fs.resolve("/").unwrap(), Some(ROOT_INODE));
        assert_eq!(fs.resolve("").unwrap(), Some(ROOT_INODE));
        assert_eq!(fs.resolve("/a").unwrap(), Some(a));
        assert_eq!(fs.resolve("//a///b/").unwrap(), Some(b));
        assert_eq!(fs.resolve("/a/b/f").unwrap(), Some(f));
        assert_eq!(fs.resolve("/a/./b/..").unwrap(), Some(a));
        assert_eq!(fs.resolve("/a/missing/f").unwrap(), None);
        assert_eq!(fs.resolve("/a/b/f/x"), Err(Error::NotADirectory));

        fs.change_directory("/a").unwrap();
        assert_eq!(fs.resolve("b/f").unwrap(), Some(f));
        assert_eq!(fs.resolve("..").unwrap(), Some(ROOT_INODE));
    }

    #[test]
    fn overlong_path() {
        let disk = Arc::new(MemDisk::new(100 * crate::SECTORS_PER_BLOCK));
        Session::format(disk.clone(), None).unwrap();
        let fs = Session::mount(disk).unwrap();
        let path = "/a".repeat(512);
        assert_eq!(fs.resolve(&path), Err(Error::InvalidArgument));
    }
}
