use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt};
use tracing::debug;

use crate::address::Address;
use crate::backend::BackendFactory;
use crate::error::{Error, Result};
use crate::scan::{ScanOptions, ScanResult};
use crate::session::{check_block_len, BusSession};

/// A [`BusSession`] shared between tasks, with futures for every operation.
///
/// Each operation locks the session for its whole select-and-transfer
/// sequence and runs on Tokio's blocking pool, since i2c-dev calls block the
/// calling thread. Use [`transaction`](Self::transaction) to run several steps
/// under one lock. Clones refer to the same session.
pub struct SharedSession<F: BackendFactory> {
    inner: Arc<Mutex<BusSession<F>>>,
}

impl<F: BackendFactory> Clone for SharedSession<F> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<F: BackendFactory> From<BusSession<F>> for SharedSession<F> {
    fn from(session: BusSession<F>) -> Self {
        Self::new(session)
    }
}

impl<F: BackendFactory> SharedSession<F> {
    pub fn new(session: BusSession<F>) -> Self {
        Self { inner: Arc::new(Mutex::new(session)) }
    }

    /// Lock the session from synchronous code.
    ///
    /// Blocks while another operation is in flight.
    pub fn lock(&self) -> MutexGuard<'_, BusSession<F>> {
        lock(&self.inner)
    }
}

impl<F> SharedSession<F>
where
    F: BackendFactory + Send + 'static,
    F::Backend: Send + 'static,
{
    /// Run `op` with exclusive access to the session.
    ///
    /// Nothing else touches the session until `op` returns, so an address
    /// selected inside `op` is the one its transfers hit.
    pub async fn transaction<T, Op>(&self, op: Op) -> Result<T>
    where
        T: Send + 'static,
        Op: FnOnce(&mut BusSession<F>) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        match tokio::task::spawn_blocking(move || op(&mut lock(&inner))).await
        {
            Ok(result) => result,
            Err(err) if err.is_panic() => {
                std::panic::resume_unwind(err.into_panic())
            }
            Err(_) => Err(Error::Cancelled),
        }
    }

    pub async fn open(&self, path: impl Into<PathBuf>) -> Result<()> {
        let path = path.into();
        self.transaction(move |s| s.open(&path)).await
    }

    pub async fn close(&self) -> Result<()> {
        self.transaction(|s| {
            s.close();
            Ok(())
        })
        .await
    }

    pub async fn is_open(&self) -> Result<bool> {
        self.transaction(|s| Ok(s.is_open())).await
    }

    pub async fn current_address(&self) -> Result<Option<Address>> {
        self.transaction(|s| Ok(s.current_address())).await
    }

    pub async fn set_address(&self, address: u8) -> Result<()> {
        self.transaction(move |s| s.set_address(address)).await
    }

    pub async fn scan(&self) -> Result<ScanResult> {
        self.transaction(|s| Ok(s.scan())).await
    }

    pub async fn scan_with(&self, options: ScanOptions) -> Result<ScanResult> {
        self.transaction(move |s| Ok(s.scan_with(&options))).await
    }

    pub async fn read(&self, len: usize) -> Result<Vec<u8>> {
        self.transaction(move |s| s.read(len)).await
    }

    pub async fn write(&self, data: impl Into<Vec<u8>>) -> Result<()> {
        let data = data.into();
        self.transaction(move |s| s.write(&data)).await
    }

    pub async fn read_byte(&self) -> Result<u8> {
        self.transaction(|s| s.read_byte()).await
    }

    pub async fn write_byte(&self, value: u8) -> Result<()> {
        self.transaction(move |s| s.write_byte(value)).await
    }

    pub async fn write_word(&self, command: u8, word: u16) -> Result<()> {
        self.transaction(move |s| s.write_word(command, word)).await
    }

    pub async fn write_block(
        &self,
        command: u8,
        data: impl Into<Vec<u8>>,
    ) -> Result<()> {
        let data = data.into();
        self.transaction(move |s| s.write_block(command, &data)).await
    }

    pub async fn read_block(&self, command: u8, len: usize) -> Result<Vec<u8>> {
        self.transaction(move |s| s.read_block(command, len)).await
    }

    /// Stream of block reads from register `command`, one every `delay`.
    ///
    /// The lock is only held for each read, so [`close`](Self::close) from
    /// another task ends the stream before its next transaction. Failed reads
    /// are yielded and polling continues, except for a `len` outside 1..=32,
    /// which is reported once. Dropping the stream stops polling.
    pub fn poll_block(
        &self,
        command: u8,
        len: usize,
        delay: Duration,
    ) -> BoxStream<'static, Result<Vec<u8>>> {
        let valid = check_block_len(len).is_ok();
        let session = self.clone();
        stream::unfold(PollState::First, move |state| {
            let session = session.clone();
            async move {
                match state {
                    PollState::Done => return None,
                    PollState::Running => tokio::time::sleep(delay).await,
                    PollState::First => {}
                }
                let sample = session
                    .transaction(move |s| {
                        Ok(s.is_open().then(|| s.read_block(command, len)))
                    })
                    .await;
                match sample {
                    Ok(Some(sample)) if valid => {
                        Some((sample, PollState::Running))
                    }
                    Ok(Some(sample)) => Some((sample, PollState::Done)),
                    Ok(None) => {
                        debug!(command, "session closed, block polling ends");
                        None
                    }
                    Err(err) => Some((Err(err), PollState::Done)),
                }
            }
        })
        .boxed()
    }
}

#[derive(Debug, Clone, Copy)]
enum PollState {
    First,
    Running,
    Done,
}

/// Sessions stay consistent across a panicking operation, so a poisoned lock
/// is still usable.
fn lock<F: BackendFactory>(
    inner: &Mutex<BusSession<F>>,
) -> MutexGuard<'_, BusSession<F>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}
