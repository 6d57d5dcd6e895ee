//! i2c-dev backend on top of the `i2cdev` crate.

use std::io;
use std::path::Path;

use i2cdev::core::I2CDevice;
use i2cdev::linux::{LinuxI2CDevice, LinuxI2CError};

use crate::address::Address;
use crate::backend::{Backend, BackendFactory, SMBUS_BLOCK_MAX};
use crate::device::device_path;
use crate::error::Result;
use crate::session::BusSession;

impl BusSession<LinuxFactory> {
    /// Open bus `bus`, either a bus number or a device node path.
    pub fn open_bus(bus: &str) -> Result<Self> {
        Self::open_with(LinuxFactory, device_path(bus))
    }
}

/// Opens i2c-dev nodes read-write.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxFactory;

impl BackendFactory for LinuxFactory {
    type Backend = LinuxDevice;

    fn open(&self, path: &Path) -> io::Result<LinuxDevice> {
        // The general call address is never claimed by a driver, so the
        // unforced select inside `new` cannot fail with EBUSY.
        let dev = LinuxI2CDevice::new(path, 0).map_err(os)?;
        Ok(LinuxDevice { dev })
    }
}

/// An open i2c-dev node. Closing happens on drop.
pub struct LinuxDevice {
    dev: LinuxI2CDevice,
}

impl std::fmt::Debug for LinuxDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinuxDevice").finish_non_exhaustive()
    }
}

fn os(err: LinuxI2CError) -> io::Error {
    io::Error::from(err)
}

impl Backend for LinuxDevice {
    fn set_slave_address(&mut self, address: Address) -> io::Result<()> {
        let raw = u16::from(address.get());
        // SAFETY: forced selection may reach a device a kernel driver owns;
        // the caller picked the address explicitly.
        let selected = unsafe { self.dev.force_set_slave_address(raw) };
        selected.map_err(os)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // i2c-dev reports a partial message as an error.
        self.dev.read(buf).map_err(os)?;
        Ok(buf.len())
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.dev.write(data).map_err(os)?;
        Ok(data.len())
    }

    fn smbus_write_quick(&mut self) -> io::Result<()> {
        // `false` is the write bit.
        self.dev.smbus_write_quick(false).map_err(os)
    }

    fn smbus_read_byte(&mut self) -> io::Result<u8> {
        self.dev.smbus_read_byte().map_err(os)
    }

    fn smbus_write_byte(&mut self, value: u8) -> io::Result<()> {
        self.dev.smbus_write_byte(value).map_err(os)
    }

    fn smbus_write_word_data(
        &mut self,
        command: u8,
        value: u16,
    ) -> io::Result<()> {
        self.dev.smbus_write_word_data(command, value).map_err(os)
    }

    fn smbus_read_i2c_block_data(
        &mut self,
        command: u8,
        buf: &mut [u8],
    ) -> io::Result<usize> {
        let len = buf.len().min(SMBUS_BLOCK_MAX);
        let block =
            self.dev.smbus_read_i2c_block_data(command, len as u8).map_err(os)?;
        let count = block.len().min(len);
        buf[..count].copy_from_slice(&block[..count]);
        Ok(count)
    }

    fn smbus_write_i2c_block_data(
        &mut self,
        command: u8,
        data: &[u8],
    ) -> io::Result<()> {
        let len = data.len().min(SMBUS_BLOCK_MAX);
        self.dev.smbus_write_i2c_block_data(command, &data[..len]).map_err(os)
    }
}
