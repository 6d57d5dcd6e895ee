use derive_more::{Display, From};
use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by bus session operations.
///
/// Every error is terminal for the operation that raised it; nothing is
/// retried internally.
#[derive(Debug, Display)]
pub enum Error {
    /// The device node could not be opened read-write.
    #[display("failed to open I2C device {}: {source}", path.display())]
    OpenFailed { path: PathBuf, source: io::Error },
    /// The slave address could not be bound to the handle.
    #[display("failed to select address {address:#04x}: {cause}")]
    AddressSelectFailed { address: u8, cause: Cause },
    #[display("read failed: {_0}")]
    ReadFailed(Cause),
    #[display("write failed: {_0}")]
    WriteFailed(Cause),
    /// A transfer buffer of `len` bytes could not be reserved.
    #[display("could not allocate a {len} byte buffer")]
    AllocationFailed { len: usize },
    /// The blocking task carrying the operation was dropped by the runtime.
    #[display("bus operation cancelled before completion")]
    Cancelled,
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::OpenFailed { source, .. } => Some(source),
            Self::AddressSelectFailed { cause, .. } => Some(cause),
            Self::ReadFailed(cause) | Self::WriteFailed(cause) => Some(cause),
            Self::AllocationFailed { .. } | Self::Cancelled => None,
        }
    }
}

/// Why a selection or transfer failed.
#[derive(Debug, Display, From)]
pub enum Cause {
    #[from(skip)]
    #[display("session is not open")]
    NotOpen,
    #[from(skip)]
    #[display("no slave address selected")]
    NoAddress,
    #[from(skip)]
    #[display("address is outside the 7-bit range")]
    InvalidAddress,
    #[from(skip)]
    #[display("length {len} is outside 1..={max}")]
    InvalidLength { len: usize, max: usize },
    #[from(skip)]
    #[display("transferred {actual} of {expected} bytes")]
    Short { expected: usize, actual: usize },
    #[display("{_0}")]
    Os(io::Error),
}

impl std::error::Error for Cause {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Os(err) => Some(err),
            _ => None,
        }
    }
}
