//! Simulated bus for running sessions without hardware.
//!
//! [`MockBus`] plays the role of the kernel: it owns a set of device nodes
//! and the slaves attached to the bus, and records every primitive a handle
//! issues so tests can assert on the exact transaction sequence. Clones share
//! state, so a test keeps one clone while the session owns the factory.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::address::Address;
use crate::backend::{Backend, BackendFactory};

/// One primitive issued through a [`MockHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Select(u8),
    Read { address: u8, len: usize },
    Write { address: u8, data: Vec<u8> },
    WriteQuick(u8),
    ReadByte(u8),
    WriteByte { address: u8, value: u8 },
    WriteWord { address: u8, command: u8, value: u16 },
    ReadBlock { address: u8, command: u8, len: usize },
    WriteBlock { address: u8, command: u8, data: Vec<u8> },
}

impl Transaction {
    /// Address the primitive targeted.
    pub fn address(&self) -> u8 {
        match *self {
            Self::Select(address)
            | Self::WriteQuick(address)
            | Self::ReadByte(address) => address,
            Self::Read { address, .. }
            | Self::Write { address, .. }
            | Self::WriteByte { address, .. }
            | Self::WriteWord { address, .. }
            | Self::ReadBlock { address, .. }
            | Self::WriteBlock { address, .. } => address,
        }
    }

    pub fn is_probe(&self) -> bool {
        matches!(self, Self::WriteQuick(_) | Self::ReadByte(_))
    }
}

/// A simulated slave device.
///
/// Plain writes and byte writes are echoed back by plain reads and byte
/// reads. Word and block writes land in a per-command register file that
/// block reads serve from.
#[derive(Debug, Default, Clone)]
pub struct MockDevice {
    echo: Vec<u8>,
    registers: BTreeMap<u8, Vec<u8>>,
    short_by: usize,
    failing_block_reads: usize,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preload the register file at `command`.
    pub fn with_register(mut self, command: u8, data: &[u8]) -> Self {
        self.registers.insert(command, data.to_vec());
        self
    }

    /// Deliver `missing` fewer bytes than asked on every multi-byte transfer.
    pub fn with_short_transfers(mut self, missing: usize) -> Self {
        self.short_by = missing;
        self
    }

    /// Fail the next `count` block reads before serving data again.
    pub fn with_failing_block_reads(mut self, count: usize) -> Self {
        self.failing_block_reads = count;
        self
    }

    fn shorten(&self, len: usize) -> usize {
        len.saturating_sub(self.short_by)
    }
}

#[derive(Debug, Default)]
struct BusState {
    nodes: BTreeSet<PathBuf>,
    devices: BTreeMap<u8, MockDevice>,
    log: Vec<Transaction>,
    open_handles: usize,
}

/// In-memory bus and [`BackendFactory`] for it.
#[derive(Debug, Clone, Default)]
pub struct MockBus {
    state: Arc<Mutex<BusState>>,
}

impl MockBus {
    /// A bus reachable through the single device node `node`.
    pub fn new(node: impl Into<PathBuf>) -> Self {
        let bus = Self::default();
        bus.add_node(node);
        bus
    }

    pub fn add_node(&self, node: impl Into<PathBuf>) {
        self.lock().nodes.insert(node.into());
    }

    /// Attach `device` at `address`, replacing anything already there.
    pub fn attach(&self, address: u8, device: MockDevice) {
        self.lock().devices.insert(address, device);
    }

    pub fn detach(&self, address: u8) -> Option<MockDevice> {
        self.lock().devices.remove(&address)
    }

    /// Register contents of the device at `address`, if any.
    pub fn register(&self, address: u8, command: u8) -> Option<Vec<u8>> {
        self.lock()
            .devices
            .get(&address)
            .and_then(|device| device.registers.get(&command).cloned())
    }

    /// Transaction log (for test verification).
    pub fn transactions(&self) -> Vec<Transaction> {
        self.lock().log.clone()
    }

    pub fn clear_transactions(&self) {
        self.lock().log.clear();
    }

    /// Number of block reads issued so far.
    pub fn block_reads(&self) -> usize {
        self.lock()
            .log
            .iter()
            .filter(|t| matches!(t, Transaction::ReadBlock { .. }))
            .count()
    }

    /// Handles opened and not yet dropped.
    pub fn open_handles(&self) -> usize {
        self.lock().open_handles
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BackendFactory for MockBus {
    type Backend = MockHandle;

    fn open(&self, path: &Path) -> io::Result<MockHandle> {
        let mut state = self.lock();
        if !state.nodes.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such device node: {}", path.display()),
            ));
        }
        state.open_handles += 1;
        Ok(MockHandle { bus: self.clone(), address: None })
    }
}

/// An open handle onto a [`MockBus`].
#[derive(Debug)]
pub struct MockHandle {
    bus: MockBus,
    address: Option<u8>,
}

impl MockHandle {
    /// Log `record(address)` and run `op` against the selected device.
    ///
    /// Absent devices answer with a NACK, like the kernel's `ENXIO`.
    fn transact<R>(
        &mut self,
        record: impl FnOnce(u8) -> Transaction,
        op: impl FnOnce(&mut MockDevice) -> io::Result<R>,
    ) -> io::Result<R> {
        let address = self.address.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "no address bound")
        })?;
        let mut state = self.bus.lock();
        state.log.push(record(address));
        match state.devices.get_mut(&address) {
            Some(device) => op(device),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("no acknowledge from {address:#04x}"),
            )),
        }
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        let mut state = self.bus.lock();
        state.open_handles = state.open_handles.saturating_sub(1);
    }
}

impl Backend for MockHandle {
    fn set_slave_address(&mut self, address: Address) -> io::Result<()> {
        self.bus.lock().log.push(Transaction::Select(address.get()));
        self.address = Some(address.get());
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = buf.len();
        self.transact(
            |address| Transaction::Read { address, len },
            |device| {
                let n = device.shorten(device.echo.len().min(len));
                buf[..n].copy_from_slice(&device.echo[..n]);
                Ok(n)
            },
        )
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.transact(
            |address| Transaction::Write { address, data: data.to_vec() },
            |device| {
                let n = device.shorten(data.len());
                device.echo = data[..n].to_vec();
                Ok(n)
            },
        )
    }

    fn smbus_write_quick(&mut self) -> io::Result<()> {
        self.transact(Transaction::WriteQuick, |_| Ok(()))
    }

    fn smbus_read_byte(&mut self) -> io::Result<u8> {
        // An idle bus reads back all ones.
        self.transact(Transaction::ReadByte, |device| {
            Ok(device.echo.last().copied().unwrap_or(0xFF))
        })
    }

    fn smbus_write_byte(&mut self, value: u8) -> io::Result<()> {
        self.transact(
            |address| Transaction::WriteByte { address, value },
            |device| {
                device.echo = vec![value];
                Ok(())
            },
        )
    }

    fn smbus_write_word_data(
        &mut self,
        command: u8,
        value: u16,
    ) -> io::Result<()> {
        self.transact(
            |address| Transaction::WriteWord { address, command, value },
            |device| {
                device.registers.insert(command, value.to_le_bytes().to_vec());
                Ok(())
            },
        )
    }

    fn smbus_read_i2c_block_data(
        &mut self,
        command: u8,
        buf: &mut [u8],
    ) -> io::Result<usize> {
        let len = buf.len();
        self.transact(
            |address| Transaction::ReadBlock { address, command, len },
            |device| {
                if device.failing_block_reads > 0 {
                    device.failing_block_reads -= 1;
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "simulated block read failure",
                    ));
                }
                let data = device
                    .registers
                    .get(&command)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let n = device.shorten(data.len().min(len));
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            },
        )
    }

    fn smbus_write_i2c_block_data(
        &mut self,
        command: u8,
        data: &[u8],
    ) -> io::Result<()> {
        self.transact(
            |address| Transaction::WriteBlock {
                address,
                command,
                data: data.to_vec(),
            },
            |device| {
                device.registers.insert(command, data.to_vec());
                Ok(())
            },
        )
    }
}
