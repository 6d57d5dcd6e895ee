mod cli;
mod commands;
mod config;
mod render;

use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use i2c_bus::SharedSession;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;
use crate::config::{Config, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let settings = Settings::resolve(&cli, config)?;
    init_tracing(&settings.log_level);
    debug!(?settings, "resolved settings");

    let session = open_bus(&settings.bus)?;
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(%err, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let mut stdout = io::stdout().lock();
    commands::execute(&session, &settings, &cli.command, &mut stdout, ctrl_c)
        .await?;

    session.close().await?;
    Ok(())
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

#[cfg(target_os = "linux")]
fn open_bus(path: &Path) -> Result<SharedSession<i2c_bus::LinuxFactory>> {
    let session = i2c_bus::BusSession::open_with(i2c_bus::LinuxFactory, path)
        .context("cannot open bus")?;
    Ok(SharedSession::new(session))
}

#[cfg(not(target_os = "linux"))]
fn open_bus(path: &Path) -> Result<SharedSession<i2c_bus::mock::MockBus>> {
    anyhow::bail!("{}: i2c-dev is only available on Linux", path.display())
}
