//! # 挂载槽
//!
//! 同一时刻至多挂载一个文件系统。槽由持有者（内核或外壳）拥有，没有全局状态。

use alloc::sync::Arc;

use block_dev::BlockDevice;

use crate::{Error, Result, Session};

#[derive(Debug, Default)]
pub struct MountSlot {
    session: Option<Session>,
}

impl MountSlot {
    pub const fn new() -> Self {
        Self { session: None }
    }

    pub fn mount(&mut self, dev: Arc<dyn BlockDevice>) -> Result<&mut Session> {
        if self.session.is_some() {
            return Err(Error::AlreadyMounted);
        }
        Ok(self.session.insert(Session::mount(dev)?))
    }

    pub fn unmount(&mut self) -> Result<()> {
        self.session.take().ok_or(Error::NotMounted)?.unmount()
    }

    #[inline]
    pub fn is_mounted(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&mut self) -> Result<&mut Session> {
        self.session.as_mut().ok_or(Error::NotMounted)
    }
}
