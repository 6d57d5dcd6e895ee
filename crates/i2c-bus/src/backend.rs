use std::io;
use std::path::Path;

use crate::address::Address;

/// Largest payload of a single SMBus block transaction.
pub const SMBUS_BLOCK_MAX: usize = 32;

/// Transfer primitives of one open bus handle.
///
/// A backend only moves bytes; it keeps no notion of the session state.
/// Every primitive targets whatever address was last bound with
/// [`set_slave_address`](Self::set_slave_address). Dropping the backend
/// releases the handle.
pub trait Backend {
    /// Bind the handle to `address`, even if a kernel driver owns it.
    fn set_slave_address(&mut self, address: Address) -> io::Result<()>;

    /// Plain I2C read. Returns the number of bytes received.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Plain I2C write. Returns the number of bytes sent.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// SMBus quick command with the write bit and no payload.
    fn smbus_write_quick(&mut self) -> io::Result<()>;

    /// SMBus receive byte (no command byte).
    fn smbus_read_byte(&mut self) -> io::Result<u8>;

    /// SMBus send byte (no command byte).
    fn smbus_write_byte(&mut self, value: u8) -> io::Result<()>;

    fn smbus_write_word_data(
        &mut self,
        command: u8,
        value: u16,
    ) -> io::Result<()>;

    /// I2C block read of up to [`SMBUS_BLOCK_MAX`] bytes starting at
    /// `command`. Returns the number of bytes the adapter delivered.
    fn smbus_read_i2c_block_data(
        &mut self,
        command: u8,
        buf: &mut [u8],
    ) -> io::Result<usize>;

    fn smbus_write_i2c_block_data(
        &mut self,
        command: u8,
        data: &[u8],
    ) -> io::Result<()>;
}

/// Opens device nodes into [`Backend`] handles.
///
/// The session owns the factory and asks it for a fresh handle on every
/// `open`, which is how tests swap the kernel interface for a simulated bus.
pub trait BackendFactory {
    type Backend: Backend;

    fn open(&self, path: &Path) -> io::Result<Self::Backend>;
}
