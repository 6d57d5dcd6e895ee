//! Session-based access to Linux I2C/SMBus character devices.
//!
//! A [`BusSession`] owns one open `/dev/i2c-N` handle and the slave address
//! currently bound to it, and offers address selection, bus scanning, plain
//! reads and writes, and SMBus byte, word and block transfers. Hardware access
//! goes through the [`Backend`] seam: [`LinuxFactory`] talks to i2c-dev, while
//! [`mock::MockBus`] simulates a bus for tests.
//!
//! [`SharedSession`] wraps a session for use from async code, serializing
//! every select-and-transfer sequence and exposing block polling as a
//! stream.
//!
//! ```no_run
//! # fn main() -> i2c_bus::Result<()> {
//! let mut bus = i2c_bus::BusSession::open_bus("1")?;
//! for address in bus.scan().present() {
//!     println!("device at {address}");
//! }
//! bus.set_address(0x48)?;
//! let temp = bus.read_block(0x00, 2)?;
//! # let _ = temp;
//! # Ok(())
//! # }
//! ```

mod address;
mod backend;
mod device;
mod error;
#[cfg(target_os = "linux")]
mod linux;
pub mod mock;
mod scan;
mod session;
mod shared;

pub use address::Address;
pub use backend::{Backend, BackendFactory, SMBUS_BLOCK_MAX};
pub use device::{device_path, DEV_DIR};
pub use error::{Cause, Error, Result};
#[cfg(target_os = "linux")]
pub use linux::{LinuxDevice, LinuxFactory};
pub use scan::{Probe, ScanMode, ScanOptions, ScanResult, NO_DEVICE};
pub use session::{BlockPoll, BusSession};
pub use shared::SharedSession;
