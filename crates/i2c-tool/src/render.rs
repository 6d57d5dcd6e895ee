use std::fmt;
use std::path::Path;

use i2c_bus::{Address, ScanOptions, ScanResult};
use serde::Serialize;

const COLUMNS: u8 = 16;

/// i2cdetect-style table of a scan.
///
/// Present devices show their address, silent ones `--`, and addresses
/// outside the scanned window are left blank.
pub struct Grid<'a> {
    pub result: &'a ScanResult,
    pub options: &'a ScanOptions,
}

impl fmt::Display for Grid<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "   ")?;
        for column in 0..COLUMNS {
            write!(f, "  {column:x}")?;
        }
        writeln!(f)?;

        for address in Address::all() {
            let raw = address.get();
            if raw % COLUMNS == 0 {
                write!(f, "{raw:02x}:")?;
            }
            if !self.options.covers(address) {
                write!(f, "   ")?;
            } else if self.result.is_present(raw) {
                write!(f, " {raw:02x}")?;
            } else {
                write!(f, " --")?;
            }
            if raw % COLUMNS == COLUMNS - 1 {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

/// Machine-readable scan output.
#[derive(Debug, Serialize)]
pub struct ScanReport {
    pub bus: String,
    pub devices: Vec<u8>,
    /// One entry per address, -1 where nothing answered.
    pub slots: Vec<i16>,
}

impl ScanReport {
    pub fn new(bus: &Path, result: &ScanResult) -> Self {
        Self {
            bus: bus.display().to_string(),
            devices: result.present().map(u8::from).collect(),
            slots: result.to_sentinel_vec(),
        }
    }
}

pub fn hex_bytes(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:#04x}")).collect::<Vec<_>>().join(" ")
}
