use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use i2c_bus::{Address, ScanMode};
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Inspect and drive Linux I2C buses",
    long_about = None
)]
pub struct Cli {
    /// Bus number or device node path
    #[arg(short, long, env = "I2C_BUS", global = true)]
    pub bus: Option<String>,

    /// Slave address used by transfer commands
    #[arg(short, long, global = true, value_parser = parse_address)]
    pub address: Option<Address>,

    /// JSON file with defaults for bus, address and scan
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Probe the bus for responding devices
    Scan {
        #[arg(long, value_enum)]
        mode: Option<Mode>,

        /// First address probed
        #[arg(long, value_parser = parse_address)]
        first: Option<Address>,

        /// Last address probed
        #[arg(long, value_parser = parse_address)]
        last: Option<Address>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Plain read of LEN bytes
    Read {
        #[arg(value_parser = parse_usize)]
        len: usize,
    },
    /// Plain write of the given bytes
    Write {
        #[arg(required = true, value_parser = parse_u8)]
        bytes: Vec<u8>,
    },
    /// SMBus receive byte
    ReadByte,
    /// SMBus send byte
    WriteByte {
        #[arg(value_parser = parse_u8)]
        value: u8,
    },
    /// SMBus write word data
    WriteWord {
        #[arg(value_name = "CMD", value_parser = parse_u8)]
        register: u8,

        #[arg(value_parser = parse_u16)]
        word: u16,
    },
    /// I2C block read, optionally polled
    ReadBlock {
        #[arg(value_name = "CMD", value_parser = parse_u8)]
        register: u8,

        #[arg(value_parser = parse_usize)]
        len: usize,

        /// Keep reading, pausing this long between reads
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Stop polling after this many samples
        #[arg(long, requires = "delay_ms")]
        count: Option<usize>,
    },
    /// I2C block write
    WriteBlock {
        #[arg(value_name = "CMD", value_parser = parse_u8)]
        register: u8,

        #[arg(required = true, value_parser = parse_u8)]
        bytes: Vec<u8>,
    },
}

/// Probe selection for `scan`.
#[derive(ValueEnum, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Auto,
    Quick,
    Read,
}

impl From<Mode> for ScanMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Auto => ScanMode::Auto,
            Mode::Quick => ScanMode::Quick,
            Mode::Read => ScanMode::Read,
        }
    }
}

/// Decimal, or hex with a `0x` prefix.
fn parse_number(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("`{s}` is not a number: {e}"))
}

fn parse_bounded<T: TryFrom<u64>>(s: &str) -> Result<T, String> {
    let value = parse_number(s)?;
    T::try_from(value).map_err(|_| format!("{value} is out of range"))
}

pub fn parse_u8(s: &str) -> Result<u8, String> {
    parse_bounded(s)
}

pub fn parse_u16(s: &str) -> Result<u16, String> {
    parse_bounded(s)
}

pub fn parse_usize(s: &str) -> Result<usize, String> {
    parse_bounded(s)
}

pub fn parse_address(s: &str) -> Result<Address, String> {
    let raw = parse_u8(s)?;
    Address::new(raw)
        .ok_or_else(|| format!("{raw:#04x} is not a 7-bit address"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let argv = std::iter::once("i2c-tool").chain(args.iter().copied());
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn numbers_accept_hex_and_decimal() {
        assert_eq!(parse_u8("0x42"), Ok(0x42));
        assert_eq!(parse_u8("0X1f"), Ok(0x1F));
        assert_eq!(parse_u8("66"), Ok(66));
        assert_eq!(parse_u16("0xBEEF"), Ok(0xBEEF));
        assert!(parse_u8("256").is_err());
        assert!(parse_u8("0xZZ").is_err());
        assert!(parse_u8("").is_err());
    }

    #[test]
    fn address_must_fit_seven_bits() {
        assert_eq!(parse_address("0x7f").map(u8::from), Ok(0x7F));
        assert!(parse_address("0x80").is_err());
    }

    #[test]
    fn global_options_follow_the_subcommand() {
        let cli = parse(&["read-byte", "--bus", "1", "-a", "0x50"]);
        assert_eq!(cli.bus.as_deref(), Some("1"));
        assert_eq!(cli.address.map(u8::from), Some(0x50));
        assert_eq!(cli.command, Commands::ReadByte);
    }

    #[test]
    fn scan_options() {
        let cli = parse(&[
            "scan", "--mode", "quick", "--first", "0x08", "--last", "0x77",
            "--json",
        ]);
        let Commands::Scan { mode, first, last, json } = cli.command else {
            panic!("expected scan");
        };
        assert_eq!(mode, Some(Mode::Quick));
        assert_eq!(first.map(u8::from), Some(0x08));
        assert_eq!(last.map(u8::from), Some(0x77));
        assert!(json);
    }

    #[test]
    fn block_polling_arguments() {
        let cli = parse(&[
            "read-block", "0x10", "4", "--delay-ms", "100", "--count", "3",
        ]);
        assert_eq!(
            cli.command,
            Commands::ReadBlock {
                register: 0x10,
                len: 4,
                delay_ms: Some(100),
                count: Some(3),
            }
        );
    }

    #[test]
    fn count_needs_a_delay() {
        let args = ["i2c-tool", "read-block", "0x10", "4", "--count", "3"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn writes_need_bytes() {
        assert!(Cli::try_parse_from(["i2c-tool", "write"]).is_err());
        let cli = parse(&["write-block", "0x20", "1", "0x02", "3"]);
        assert_eq!(
            cli.command,
            Commands::WriteBlock { register: 0x20, bytes: vec![1, 2, 3] }
        );
    }
}
