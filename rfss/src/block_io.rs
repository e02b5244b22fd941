//! # 块读写层
//!
//! 逻辑块 `n` 对应设备上从 `n * 8` 开始的 8 个扇区。
//! 启用日志后，写操作经由日志层的 [`Session::safe_write`]。

use block_dev::BlockDevice;

use crate::{BlockId, DataBlock, Error, Result, SECTORS_PER_BLOCK, Session};

/// 不经过日志、不检查范围的读，`buf` 为整块
#[inline]
pub(crate) fn read_raw(dev: &dyn BlockDevice, block: BlockId, buf: &mut [u8]) -> Result<()> {
    dev.read_sectors(block as u64 * SECTORS_PER_BLOCK, buf)?;
    Ok(())
}

#[inline]
pub(crate) fn write_raw(dev: &dyn BlockDevice, block: BlockId, buf: &[u8]) -> Result<()> {
    dev.write_sectors(block as u64 * SECTORS_PER_BLOCK, buf)?;
    Ok(())
}

impl Session {
    fn check_block(&self, block: BlockId) -> Result<()> {
        // 0 号块在超级块载入前也要能读
        if block != 0 && block >= self.sb.total_blocks {
            log::error!("block {block} beyond end of filesystem ({})", self.sb.total_blocks);
            return Err(Error::OutOfRange);
        }
        Ok(())
    }

    pub fn read_block(&self, block: BlockId, buf: &mut DataBlock) -> Result<()> {
        self.check_block(block)?;
        read_raw(&*self.dev, block, buf)
    }

    pub fn write_block(&mut self, block: BlockId, buf: &DataBlock) -> Result<()> {
        self.check_block(block)?;
        if self.journaling() {
            self.safe_write(block, buf)
        } else {
            write_raw(&*self.dev, block, buf)
        }
    }
}
