use block_dev::DeviceError;
use derive_more::Display;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[display(fmt = "invalid argument")]
    InvalidArgument,
    #[display(fmt = "no such file or directory")]
    NotFound,
    #[display(fmt = "not a directory")]
    NotADirectory,
    #[display(fmt = "not a regular file")]
    NotAFile,
    #[display(fmt = "already exists")]
    AlreadyExists,
    #[display(fmt = "directory not empty")]
    DirectoryNotEmpty,
    #[display(fmt = "directory has no room for another block")]
    DirectoryFull,
    #[display(fmt = "no space left on device")]
    NoSpace,
    #[display(fmt = "out of range")]
    OutOfRange,
    #[display(fmt = "device error: {}", _0)]
    Device(DeviceError),
    #[display(fmt = "filesystem corrupted")]
    Corruption,
    #[display(fmt = "a filesystem is already mounted")]
    AlreadyMounted,
    #[display(fmt = "no filesystem mounted")]
    NotMounted,
    #[display(fmt = "a transaction is already open")]
    TransactionOpen,
    #[display(fmt = "no open transaction")]
    NoTransaction,
    #[display(fmt = "transaction is full")]
    TransactionFull,
    #[display(fmt = "out of memory")]
    OutOfMemory,
}

impl From<DeviceError> for Error {
    fn from(err: DeviceError) -> Self {
        Self::Device(err)
    }
}

impl From<alloc::collections::TryReserveError> for Error {
    fn from(_: alloc::collections::TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

impl core::error::Error for Error {}
