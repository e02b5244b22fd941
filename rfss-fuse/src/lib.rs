#[cfg(test)]
mod tests;

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

use block_dev::{BlockDevice, DeviceError, SECTOR_SIZE, check_access};

/// 以宿主机上的镜像文件作为块设备
#[derive(Debug)]
pub struct BlockFile {
    file: Mutex<File>,
    sectors: u64,
}

impl BlockFile {
    /// 镜像长度不足一个扇区的部分不可访问
    pub fn new(file: File) -> io::Result<Self> {
        let sectors = file.metadata()?.len() / SECTOR_SIZE as u64;
        Ok(Self {
            file: Mutex::new(file),
            sectors,
        })
    }
}

impl BlockDevice for BlockFile {
    fn read_sectors(&self, lba: u64, buf: &mut [u8]) -> Result<(), DeviceError> {
        check_access(self, lba, buf.len())?;
        let mut file = self.file.lock().map_err(|_| DeviceError::Io)?;
        file.seek(SeekFrom::Start(lba * SECTOR_SIZE as u64))
            .and_then(|_| file.read_exact(buf))
            .map_err(|err| {
                log::error!("reading sector {lba}: {err}");
                DeviceError::Io
            })
    }

    fn write_sectors(&self, lba: u64, buf: &[u8]) -> Result<(), DeviceError> {
        check_access(self, lba, buf.len())?;
        let mut file = self.file.lock().map_err(|_| DeviceError::Io)?;
        file.seek(SeekFrom::Start(lba * SECTOR_SIZE as u64))
            .and_then(|_| file.write_all(buf))
            .map_err(|err| {
                log::error!("writing sector {lba}: {err}");
                DeviceError::Io
            })
    }

    fn sector_count(&self) -> u64 {
        self.sectors
    }
}
