use std::path::PathBuf;

/// Directory holding the i2c-dev nodes.
pub const DEV_DIR: &str = "/dev";

/// Resolve a bus identifier to a device node path.
///
/// A bare bus number `N` names `/dev/i2c-N`; anything else is taken as a
/// path as-is.
pub fn device_path(bus: &str) -> PathBuf {
    let bus = bus.trim();
    if !bus.is_empty() && bus.bytes().all(|b| b.is_ascii_digit()) {
        PathBuf::from(DEV_DIR).join(format!("i2c-{bus}"))
    } else {
        PathBuf::from(bus)
    }
}
