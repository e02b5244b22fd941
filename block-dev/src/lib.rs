//! # 块设备接口层
//!
//! 块设备以**扇区**为单位存储数据；[`BlockDevice`] 是对读写扇区的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 文件系统只通过块设备驱动访问磁盘，从不直接接触硬件。

#![no_std]

extern crate alloc;

mod mem_disk;

use core::any::Any;
use core::fmt;

pub use self::mem_disk::MemDisk;

/// 扇区大小
pub const SECTOR_SIZE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// 驱动器不存在
    NotPresent,
    /// 访问越过了设备末尾
    OutOfRange { lba: u64 },
    /// 缓冲区长度不是扇区大小的整数倍
    Misaligned,
    Io,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotPresent => f.write_str("drive not present"),
            Self::OutOfRange { lba } => write!(f, "sector {lba} out of range"),
            Self::Misaligned => f.write_str("buffer is not a whole number of sectors"),
            Self::Io => f.write_str("I/O error"),
        }
    }
}

impl core::error::Error for DeviceError {}

/// 块设备驱动特质
///
/// 读写的缓冲区长度必须是 [`SECTOR_SIZE`] 的整数倍，
/// 从 `lba` 开始连续读写 `buf.len() / SECTOR_SIZE` 个扇区。
pub trait BlockDevice: Send + Sync + Any {
    fn read_sectors(&self, lba: u64, buf: &mut [u8]) -> Result<(), DeviceError>;

    fn write_sectors(&self, lba: u64, buf: &[u8]) -> Result<(), DeviceError>;

    /// 设备的总扇区数
    fn sector_count(&self) -> u64;

    fn is_present(&self) -> bool {
        true
    }
}

/// 检查一次访问是否落在设备内，返回访问的扇区数。
pub fn check_access(dev: &dyn BlockDevice, lba: u64, len: usize) -> Result<u64, DeviceError> {
    if len % SECTOR_SIZE != 0 {
        return Err(DeviceError::Misaligned);
    }
    let count = (len / SECTOR_SIZE) as u64;
    match lba.checked_add(count) {
        Some(end) if end <= dev.sector_count() => Ok(count),
        _ => Err(DeviceError::OutOfRange { lba }),
    }
}
