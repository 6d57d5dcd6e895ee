use core::fmt;

/// A validated 7-bit slave address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u8);

impl Address {
    /// Highest address reachable with 7-bit addressing.
    pub const MAX: u8 = 0x7F;

    /// Number of distinct 7-bit addresses.
    pub const COUNT: usize = Self::MAX as usize + 1;

    pub const FIRST: Self = Self(0);
    pub const LAST: Self = Self(Self::MAX);

    pub const fn new(raw: u8) -> Option<Self> {
        if raw <= Self::MAX {
            Some(Self(raw))
        } else {
            None
        }
    }

    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Every 7-bit address in ascending order.
    pub fn all() -> impl Iterator<Item = Address> {
        (0..=Self::MAX).map(Self)
    }
}

impl TryFrom<u8> for Address {
    type Error = u8;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or(raw)
    }
}

impl From<Address> for u8 {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_seven_bit_range() {
        assert_eq!(Address::new(0).map(Address::get), Some(0));
        assert_eq!(Address::new(0x7F).map(Address::get), Some(0x7F));
        assert_eq!(Address::new(0x80), None);
        assert_eq!(Address::try_from(0xFF), Err(0xFF));
    }

    #[test]
    fn all_covers_every_address_once() {
        let all: Vec<u8> = Address::all().map(u8::from).collect();
        assert_eq!(all.len(), Address::COUNT);
        assert_eq!(all.first(), Some(&0));
        assert_eq!(all.last(), Some(&0x7F));
    }

    #[test]
    fn displays_as_hex() {
        assert_eq!(Address::new(0x50).unwrap().to_string(), "0x50");
        assert_eq!(Address::new(0x08).unwrap().to_string(), "0x08");
    }
}
