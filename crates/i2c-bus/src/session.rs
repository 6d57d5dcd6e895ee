use std::fmt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::address::Address;
use crate::backend::{Backend, BackendFactory, SMBUS_BLOCK_MAX};
use crate::error::{Cause, Error, Result};
use crate::scan::{Probe, ScanOptions, ScanResult};

/// One connection to a bus device node.
///
/// The session owns at most one backend handle plus the slave address last
/// bound to it. Every transfer targets that address; a transfer issued before
/// any address was selected fails rather than hitting whatever the kernel
/// client last held.
///
/// Operations take `&mut self`, so one owner can never interleave a select
/// with somebody else's transfer. Use
/// [`SharedSession`](crate::SharedSession) to share a session between tasks.
pub struct BusSession<F: BackendFactory> {
    factory: F,
    handle: Option<F::Backend>,
    path: Option<PathBuf>,
    current_address: Option<Address>,
}

impl<F: BackendFactory> BusSession<F> {
    /// A closed session that opens nodes through `factory`.
    pub fn new(factory: F) -> Self {
        Self { factory, handle: None, path: None, current_address: None }
    }

    /// Create a session and open `path` in one go.
    pub fn open_with(factory: F, path: impl AsRef<Path>) -> Result<Self> {
        let mut session = Self::new(factory);
        session.open(path)?;
        Ok(session)
    }

    /// Open `path` read-write, closing any handle held before.
    ///
    /// On failure the session stays closed. No address is selected after a
    /// successful open.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.close();

        let handle = self.factory.open(path).map_err(|source| {
            Error::OpenFailed { path: path.to_path_buf(), source }
        })?;

        debug!(path = %path.display(), "opened I2C device");
        self.handle = Some(handle);
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    /// Release the handle. Closing a closed session does nothing.
    pub fn close(&mut self) {
        if self.handle.take().is_some() {
            debug!(path = ?self.path, "closed I2C device");
        }
        self.current_address = None;
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Node opened last, kept after `close` for diagnostics.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn current_address(&self) -> Option<Address> {
        self.current_address
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Bind the handle to `address` with forced selection.
    ///
    /// The selected address only changes on success. After a failure the
    /// kernel side may be left pointing anywhere, so select again before the
    /// next transfer.
    pub fn set_address(&mut self, address: u8) -> Result<()> {
        let fail = |cause| Error::AddressSelectFailed { address, cause };

        let target =
            Address::new(address).ok_or_else(|| fail(Cause::InvalidAddress))?;
        let handle = self.handle.as_mut().ok_or_else(|| fail(Cause::NotOpen))?;
        handle.set_slave_address(target).map_err(|err| fail(err.into()))?;

        trace!(address = %target, "selected slave address");
        self.current_address = Some(target);
        Ok(())
    }

    /// Probe every 7-bit address with the automatic probe heuristic.
    pub fn scan(&mut self) -> ScanResult {
        self.scan_with(&ScanOptions::default())
    }

    /// Probe the addresses covered by `options`.
    ///
    /// Addresses outside the window, addresses that cannot be selected and
    /// addresses that do not answer are all reported absent; a closed
    /// session reports nothing present. The handle is re-bound to the
    /// selected address afterwards.
    pub fn scan_with(&mut self, options: &ScanOptions) -> ScanResult {
        let mut result = ScanResult::empty();
        let Some(handle) = self.handle.as_mut() else {
            debug!("scan requested on a closed session");
            return result;
        };

        for address in Address::all().filter(|a| options.covers(*a)) {
            if let Err(err) = handle.set_slave_address(address) {
                trace!(%address, %err, "could not select address for probe");
                continue;
            }
            let answered = match options.mode.probe_for(address) {
                Probe::ReadByte => handle.smbus_read_byte().is_ok(),
                Probe::WriteQuick => handle.smbus_write_quick().is_ok(),
            };
            if answered {
                result.mark_present(address);
            }
        }

        if let Some(previous) = self.current_address {
            if let Err(err) = handle.set_slave_address(previous) {
                warn!(
                    address = %previous,
                    %err,
                    "could not restore address after scan"
                );
                self.current_address = None;
            }
        }

        debug!(found = result.count(), "scan complete");
        result
    }

    /// Read exactly `len` bytes in a single transaction.
    pub fn read(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = alloc(len)?;
        let handle = self.target(Error::ReadFailed)?;
        let n = handle.read(&mut buf).map_err(|e| Error::ReadFailed(e.into()))?;
        if n != len {
            return Err(Error::ReadFailed(Cause::Short {
                expected: len,
                actual: n,
            }));
        }
        trace!(len, "read");
        Ok(buf)
    }

    /// Write all of `data` in a single transaction.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let handle = self.target(Error::WriteFailed)?;
        let n = handle.write(data).map_err(|e| Error::WriteFailed(e.into()))?;
        if n != data.len() {
            return Err(Error::WriteFailed(Cause::Short {
                expected: data.len(),
                actual: n,
            }));
        }
        trace!(len = data.len(), "write");
        Ok(())
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        let handle = self.target(Error::ReadFailed)?;
        let value =
            handle.smbus_read_byte().map_err(|e| Error::ReadFailed(e.into()))?;
        trace!(value, "read byte");
        Ok(value)
    }

    pub fn write_byte(&mut self, value: u8) -> Result<()> {
        let handle = self.target(Error::WriteFailed)?;
        handle
            .smbus_write_byte(value)
            .map_err(|e| Error::WriteFailed(e.into()))?;
        trace!(value, "wrote byte");
        Ok(())
    }

    /// Write a 16-bit word to register `command`.
    pub fn write_word(&mut self, command: u8, word: u16) -> Result<()> {
        let handle = self.target(Error::WriteFailed)?;
        handle
            .smbus_write_word_data(command, word)
            .map_err(|e| Error::WriteFailed(e.into()))?;
        trace!(command, word, "wrote word");
        Ok(())
    }

    /// Write `data` as one I2C block transfer addressed by `command`.
    pub fn write_block(&mut self, command: u8, data: &[u8]) -> Result<()> {
        check_block_len(data.len()).map_err(Error::WriteFailed)?;
        let handle = self.target(Error::WriteFailed)?;
        handle
            .smbus_write_i2c_block_data(command, data)
            .map_err(|e| Error::WriteFailed(e.into()))?;
        trace!(command, len = data.len(), "wrote block");
        Ok(())
    }

    /// Read `len` bytes starting at register `command` in one transaction.
    ///
    /// A block shorter than `len` is a failure.
    pub fn read_block(&mut self, command: u8, len: usize) -> Result<Vec<u8>> {
        check_block_len(len).map_err(Error::ReadFailed)?;
        let mut buf = alloc(len)?;
        let handle = self.target(Error::ReadFailed)?;
        let n = handle
            .smbus_read_i2c_block_data(command, &mut buf)
            .map_err(|e| Error::ReadFailed(e.into()))?;
        if n != len {
            return Err(Error::ReadFailed(Cause::Short {
                expected: len,
                actual: n,
            }));
        }
        trace!(command, len, "read block");
        Ok(buf)
    }

    /// Poll register `command` every `delay`.
    ///
    /// The iterator yields one result per transaction and keeps going after
    /// a failed read. It ends once the session is closed, checked before
    /// each transaction; dropping it stops polling as well. A `len` outside
    /// 1..=32 yields a single `InvalidLength` failure and ends.
    pub fn poll_block(
        &mut self,
        command: u8,
        len: usize,
        delay: Duration,
    ) -> BlockPoll<'_, F> {
        BlockPoll {
            session: self,
            command,
            len,
            delay,
            started: false,
            finished: false,
        }
    }

    fn target(&mut self, fail: fn(Cause) -> Error) -> Result<&mut F::Backend> {
        let handle = self.handle.as_mut().ok_or(fail(Cause::NotOpen))?;
        if self.current_address.is_none() {
            return Err(fail(Cause::NoAddress));
        }
        Ok(handle)
    }
}

impl<F: BackendFactory> fmt::Debug for BusSession<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusSession")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .field("current_address", &self.current_address)
            .finish_non_exhaustive()
    }
}

/// Repeated block reads from [`BusSession::poll_block`].
pub struct BlockPoll<'a, F: BackendFactory> {
    session: &'a mut BusSession<F>,
    command: u8,
    len: usize,
    delay: Duration,
    started: bool,
    finished: bool,
}

impl<F: BackendFactory> BlockPoll<'_, F> {
    /// Close the underlying session, ending the poll.
    pub fn close(&mut self) {
        self.session.close();
    }

    pub fn session(&self) -> &BusSession<F> {
        &*self.session
    }
}

impl<F: BackendFactory> Iterator for BlockPoll<'_, F> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || !self.session.is_open() {
            return None;
        }
        if let Err(cause) = check_block_len(self.len) {
            // Bad length: report once and end.
            self.finished = true;
            return Some(Err(Error::ReadFailed(cause)));
        }
        if self.started {
            thread::sleep(self.delay);
            if !self.session.is_open() {
                return None;
            }
        }
        self.started = true;

        let sample = self.session.read_block(self.command, self.len);
        if let Err(err) = &sample {
            debug!(command = self.command, %err, "block poll read failed");
        }
        Some(sample)
    }
}

pub(crate) fn check_block_len(len: usize) -> std::result::Result<(), Cause> {
    if (1..=SMBUS_BLOCK_MAX).contains(&len) {
        Ok(())
    } else {
        Err(Cause::InvalidLength { len, max: SMBUS_BLOCK_MAX })
    }
}

fn alloc(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| Error::AllocationFailed { len })?;
    buf.resize(len, 0);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBus, MockDevice};

    const NODE: &str = "/dev/i2c-1";

    fn session() -> (BusSession<MockBus>, MockBus) {
        let bus = MockBus::new(NODE);
        (BusSession::open_with(bus.clone(), NODE).unwrap(), bus)
    }

    #[test]
    fn new_session_is_closed() {
        let session = BusSession::new(MockBus::new(NODE));
        assert!(!session.is_open());
        assert_eq!(session.current_address(), None);
        assert_eq!(session.path(), None);
    }

    #[test]
    fn reopen_replaces_the_handle() {
        let (mut session, bus) = session();
        session.set_address(0x20).unwrap();
        session.open(NODE).unwrap();
        assert_eq!(bus.open_handles(), 1);
        assert_eq!(session.current_address(), None);
    }

    #[test]
    fn close_is_idempotent() {
        let (mut session, bus) = session();
        session.close();
        session.close();
        assert!(!session.is_open());
        assert_eq!(bus.open_handles(), 0);
        assert_eq!(session.path(), Some(Path::new(NODE)));
    }

    #[test]
    fn failed_select_keeps_previous_address() {
        let (mut session, _bus) = session();
        session.set_address(0x20).unwrap();
        let err = session.set_address(0x80).unwrap_err();
        assert!(matches!(
            err,
            Error::AddressSelectFailed {
                address: 0x80,
                cause: Cause::InvalidAddress
            }
        ));
        assert_eq!(session.current_address().map(Address::get), Some(0x20));
    }

    #[test]
    fn transfer_before_select_is_rejected() {
        let (mut session, bus) = session();
        bus.attach(0x20, MockDevice::new());
        assert!(matches!(
            session.read_byte(),
            Err(Error::ReadFailed(Cause::NoAddress))
        ));
        assert!(matches!(
            session.write(&[1]),
            Err(Error::WriteFailed(Cause::NoAddress))
        ));
        assert!(bus.transactions().is_empty());
    }

    #[test]
    fn block_length_is_bounded() {
        let (mut session, bus) = session();
        bus.attach(0x20, MockDevice::new());
        session.set_address(0x20).unwrap();
        assert!(matches!(
            session.read_block(0, 0),
            Err(Error::ReadFailed(Cause::InvalidLength { len: 0, max: 32 }))
        ));
        assert!(matches!(
            session.write_block(0, &[0; 33]),
            Err(Error::WriteFailed(Cause::InvalidLength { len: 33, .. }))
        ));
    }

    #[test]
    fn allocation_failure_is_reported() {
        let (mut session, bus) = session();
        bus.attach(0x20, MockDevice::new());
        session.set_address(0x20).unwrap();
        assert!(matches!(
            session.read(usize::MAX),
            Err(Error::AllocationFailed { len: usize::MAX })
        ));
    }
}
