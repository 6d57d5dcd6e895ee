//! Address-space discovery.

use crate::address::Address;

/// Value reported for an address where nothing answered.
pub const NO_DEVICE: i16 = -1;

/// How an address is tested for a responding device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// SMBus quick command, write direction, no payload.
    WriteQuick,
    /// SMBus receive byte.
    ReadByte,
}

impl Probe {
    /// Probe picked by the automatic heuristic.
    ///
    /// 0x30-0x37 hold write-only devices a quick write can corrupt, and
    /// 0x50-0x5F hold EEPROMs that a quick write can lock up, so those are
    /// read instead.
    pub const fn for_address(address: Address) -> Self {
        match address.get() {
            0x30..=0x37 | 0x50..=0x5F => Self::ReadByte,
            _ => Self::WriteQuick,
        }
    }
}

/// Probe selection for a whole scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Per-address heuristic of [`Probe::for_address`].
    #[default]
    Auto,
    /// Write-quick everywhere.
    Quick,
    /// Read-byte everywhere.
    Read,
}

impl ScanMode {
    pub const fn probe_for(self, address: Address) -> Probe {
        match self {
            Self::Auto => Probe::for_address(address),
            Self::Quick => Probe::WriteQuick,
            Self::Read => Probe::ReadByte,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    pub mode: ScanMode,
    /// First address probed, inclusive.
    pub first: Address,
    /// Last address probed, inclusive.
    pub last: Address,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            mode: ScanMode::Auto,
            first: Address::FIRST,
            last: Address::LAST,
        }
    }
}

impl ScanOptions {
    pub fn with_mode(mut self, mode: ScanMode) -> Self {
        self.mode = mode;
        self
    }

    /// Restrict probing to `first..=last`.
    pub fn with_range(mut self, first: Address, last: Address) -> Self {
        self.first = first;
        self.last = last;
        self
    }

    pub fn covers(&self, address: Address) -> bool {
        (self.first..=self.last).contains(&address)
    }
}

/// Outcome of a scan: one slot per 7-bit address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    slots: [Option<Address>; Address::COUNT],
}

impl ScanResult {
    pub(crate) fn empty() -> Self {
        Self { slots: [None; Address::COUNT] }
    }

    pub(crate) fn mark_present(&mut self, address: Address) {
        self.slots[usize::from(address.get())] = Some(address);
    }

    /// All 128 slots in address order.
    pub fn slots(&self) -> &[Option<Address>; Address::COUNT] {
        &self.slots
    }

    pub fn is_present(&self, raw: u8) -> bool {
        self.slots.get(usize::from(raw)).is_some_and(Option::is_some)
    }

    /// Addresses that answered, ascending.
    pub fn present(&self) -> impl Iterator<Item = Address> + '_ {
        self.slots.iter().flatten().copied()
    }

    pub fn count(&self) -> usize {
        self.present().count()
    }

    /// Flat form: the address where a device answered, [`NO_DEVICE`]
    /// elsewhere.
    pub fn to_sentinel_vec(&self) -> Vec<i16> {
        self.slots
            .iter()
            .map(|slot| slot.map_or(NO_DEVICE, |a| i16::from(a.get())))
            .collect()
    }
}
