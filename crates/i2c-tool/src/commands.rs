use std::future::Future;
use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use i2c_bus::{Address, BackendFactory, SharedSession};
use tracing::{info, warn};

use crate::cli::Commands;
use crate::config::Settings;
use crate::render::{hex_bytes, Grid, ScanReport};

/// Run one command against an open session, printing results to `out`.
///
/// `shutdown` resolving closes the session, which ends a running poll.
pub async fn execute<F, W>(
    session: &SharedSession<F>,
    settings: &Settings,
    command: &Commands,
    out: &mut W,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()>
where
    F: BackendFactory + Send + 'static,
    F::Backend: Send + 'static,
    W: Write,
{
    match command {
        Commands::Scan { json, .. } => {
            let options = settings.scan;
            let result = session.scan_with(options).await?;
            info!(found = result.count(), "scan finished");
            if *json {
                let report = ScanReport::new(&settings.bus, &result);
                serde_json::to_writer_pretty(&mut *out, &report)?;
                writeln!(out)?;
            } else {
                write!(out, "{}", Grid { result: &result, options: &options })?;
            }
        }
        Commands::Read { len } => {
            let len = *len;
            let data =
                on_target(session, settings, move |s| s.read(len)).await?;
            writeln!(out, "{}", hex_bytes(&data))?;
        }
        Commands::Write { bytes } => {
            let bytes = bytes.clone();
            on_target(session, settings, move |s| s.write(&bytes)).await?;
        }
        Commands::ReadByte => {
            let value = on_target(session, settings, |s| s.read_byte()).await?;
            writeln!(out, "{value:#04x}")?;
        }
        Commands::WriteByte { value } => {
            let value = *value;
            on_target(session, settings, move |s| s.write_byte(value)).await?;
        }
        Commands::WriteWord { register, word } => {
            let (register, word) = (*register, *word);
            on_target(session, settings, move |s| {
                s.write_word(register, word)
            })
            .await?;
        }
        Commands::ReadBlock { register, len, delay_ms: None, .. } => {
            let (register, len) = (*register, *len);
            let data = on_target(session, settings, move |s| {
                s.read_block(register, len)
            })
            .await?;
            writeln!(out, "{}", hex_bytes(&data))?;
        }
        Commands::ReadBlock { register, len, delay_ms: Some(delay), count } => {
            let address = target(settings)?;
            session.set_address(address.get()).await?;
            poll(
                session,
                *register,
                *len,
                Duration::from_millis(*delay),
                *count,
                out,
                shutdown,
            )
            .await?;
        }
        Commands::WriteBlock { register, bytes } => {
            let register = *register;
            let bytes = bytes.clone();
            on_target(session, settings, move |s| {
                s.write_block(register, &bytes)
            })
            .await?;
        }
    }
    Ok(())
}

fn target(settings: &Settings) -> Result<Address> {
    settings
        .address
        .context("no slave address; use --address or `address` in the config")
}

/// Select the configured address and run `op` under the same lock.
async fn on_target<F, T>(
    session: &SharedSession<F>,
    settings: &Settings,
    op: impl FnOnce(&mut i2c_bus::BusSession<F>) -> i2c_bus::Result<T>
        + Send
        + 'static,
) -> Result<T>
where
    F: BackendFactory + Send + 'static,
    F::Backend: Send + 'static,
    T: Send + 'static,
{
    let address = target(settings)?;
    let value = session
        .transaction(move |s| {
            s.set_address(address.get())?;
            op(s)
        })
        .await?;
    Ok(value)
}

async fn poll<F, W>(
    session: &SharedSession<F>,
    register: u8,
    len: usize,
    delay: Duration,
    count: Option<usize>,
    out: &mut W,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()>
where
    F: BackendFactory + Send + 'static,
    F::Backend: Send + 'static,
    W: Write,
{
    let closer = {
        let session = session.clone();
        tokio::spawn(async move {
            shutdown.await;
            info!("interrupted, closing bus");
            if let Err(err) = session.close().await {
                warn!(%err, "could not close bus");
            }
        })
    };

    let stream = session.poll_block(register, len, delay);
    let mut stream = match count {
        Some(count) => stream.take(count).boxed(),
        None => stream,
    };
    let mut failures = 0usize;
    while let Some(sample) = stream.next().await {
        match sample {
            Ok(data) => writeln!(out, "{}", hex_bytes(&data))?,
            Err(err) => {
                failures += 1;
                warn!(%err, register, "block read failed");
            }
        }
    }
    closer.abort();

    if failures > 0 {
        info!(failures, "polling finished with failed reads");
    }
    Ok(())
}
