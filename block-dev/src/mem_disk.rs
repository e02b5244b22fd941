//! 内存盘：以一段内存模拟的块设备，用于测试与宿主机工具。

use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;

use crate::{BlockDevice, DeviceError, SECTOR_SIZE, check_access};

#[derive(Debug)]
pub struct MemDisk {
    data: Mutex<Vec<u8>>,
    inner: Mutex<Faults>,
}

/// 注入的故障
#[derive(Debug, Default)]
struct Faults {
    absent: bool,
    /// 还允许成功的写次数，用尽后所有写都失败
    writes_left: Option<usize>,
    fail_reads: bool,
}

impl MemDisk {
    pub fn new(sectors: u64) -> Self {
        Self::from_image(vec![0; sectors as usize * SECTOR_SIZE])
    }

    /// 以已有的磁盘镜像构造，镜像长度不足一个扇区的部分会被截掉。
    pub fn from_image(mut image: Vec<u8>) -> Self {
        image.truncate(image.len() / SECTOR_SIZE * SECTOR_SIZE);
        Self {
            data: Mutex::new(image),
            inner: Mutex::default(),
        }
    }

    /// 当前磁盘内容的副本
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    pub fn set_present(&self, present: bool) {
        self.inner.lock().absent = !present;
    }

    /// 再成功 `writes` 次写之后，后续写全部失败；`None` 取消限制。
    pub fn fail_writes_after(&self, writes: Option<usize>) {
        self.inner.lock().writes_left = writes;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.inner.lock().fail_reads = fail;
    }
}

impl BlockDevice for MemDisk {
    fn read_sectors(&self, lba: u64, buf: &mut [u8]) -> Result<(), DeviceError> {
        {
            let faults = self.inner.lock();
            if faults.absent {
                return Err(DeviceError::NotPresent);
            }
            if faults.fail_reads {
                return Err(DeviceError::Io);
            }
        }
        check_access(self, lba, buf.len())?;

        let start = lba as usize * SECTOR_SIZE;
        buf.copy_from_slice(&self.data.lock()[start..start + buf.len()]);
        Ok(())
    }

    fn write_sectors(&self, lba: u64, buf: &[u8]) -> Result<(), DeviceError> {
        {
            let mut faults = self.inner.lock();
            if faults.absent {
                return Err(DeviceError::NotPresent);
            }
            match &mut faults.writes_left {
                Some(0) => return Err(DeviceError::Io),
                Some(left) => *left -= 1,
                None => (),
            }
        }
        check_access(self, lba, buf.len())?;

        let start = lba as usize * SECTOR_SIZE;
        self.data.lock()[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn sector_count(&self) -> u64 {
        (self.data.lock().len() / SECTOR_SIZE) as u64
    }

    fn is_present(&self) -> bool {
        !self.inner.lock().absent
    }
}
