use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use i2c_bus::{device_path, Address, ScanOptions};
use serde::Deserialize;

use crate::cli::{Cli, Commands, Mode};

const DEFAULT_LOG_LEVEL: &str = "warn";

/// Defaults read from `--config`.
#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub bus: Option<String>,
    pub address: Option<u8>,
    pub log_level: Option<String>,
    pub scan: ScanConfig,
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    pub mode: Option<Mode>,
    pub first: Option<u8>,
    pub last: Option<u8>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))
    }
}

/// Command-line values merged over the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bus: PathBuf,
    pub address: Option<Address>,
    pub scan: ScanOptions,
    pub log_level: String,
}

impl Settings {
    pub fn resolve(cli: &Cli, config: Config) -> Result<Self> {
        let Some(bus) = cli.bus.as_deref().or(config.bus.as_deref()) else {
            bail!("no bus given; use --bus, I2C_BUS or `bus` in the config");
        };

        let address = match (cli.address, config.address) {
            (Some(address), _) => Some(address),
            (None, Some(raw)) => Some(config_address("address", raw)?),
            (None, None) => None,
        };

        let mut scan = ScanOptions::default();
        if let Some(mode) = config.scan.mode {
            scan.mode = mode.into();
        }
        if let Some(raw) = config.scan.first {
            scan.first = config_address("scan.first", raw)?;
        }
        if let Some(raw) = config.scan.last {
            scan.last = config_address("scan.last", raw)?;
        }
        if let Commands::Scan { mode, first, last, .. } = &cli.command {
            if let Some(mode) = mode {
                scan.mode = (*mode).into();
            }
            scan.first = first.unwrap_or(scan.first);
            scan.last = last.unwrap_or(scan.last);
        }
        if scan.first > scan.last {
            bail!("scan range {} to {} is empty", scan.first, scan.last);
        }

        let log_level = cli
            .log_level
            .clone()
            .or(config.log_level)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_owned());

        Ok(Self { bus: device_path(bus), address, scan, log_level })
    }
}

fn config_address(key: &str, raw: u8) -> Result<Address> {
    Address::new(raw).with_context(|| {
        format!("config `{key}`: {raw:#04x} is not a 7-bit address")
    })
}
