//! Protocol code tables with a total lookup
//!
//! Vendor protocols describe status fields as tables of numeric codes. A
//! lookup never fails: codes that are not in the table map to the table's
//! `Unknown` entry.

use serde::{Deserialize, Serialize};

/// A closed table of protocol codes
pub trait CodeTable: Sized + Copy + PartialEq + 'static {
    /// Value returned for codes that are not in the table
    const UNKNOWN: Self;

    /// Every entry, `UNKNOWN` included
    fn entries() -> &'static [Self];

    /// The protocol defined code of this entry
    fn code(self) -> i32;

    /// Look up an entry by code, falling back to `UNKNOWN`
    fn from_code(code: i32) -> Self {
        Self::entries()
            .iter()
            .copied()
            .find(|entry| entry.code() == code)
            .unwrap_or(Self::UNKNOWN)
    }
}

/// BGAPI connection status flags
///
/// The flags field is a bit mask, so several flags can be active at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionStatusFlag {
    Unknown,
    /// A connection to the remote device exists
    Connected,
    Encrypted,
    /// A new connection has been created
    Completed,
    /// Connection parameters changed due to a link layer operation
    ParametersChange,
}

impl ConnectionStatusFlag {
    /// Flags set in `mask`, in ascending bit order
    ///
    /// Bits without a table entry are ignored.
    pub fn decode_mask(mask: u32) -> Vec<Self> {
        Self::entries()
            .iter()
            .copied()
            .filter(|flag| *flag != Self::Unknown && flag.is_set(mask))
            .collect()
    }

    /// Whether this flag is active in `mask`
    pub fn is_set(self, mask: u32) -> bool {
        match self {
            ConnectionStatusFlag::Unknown => false,
            flag => (mask & flag.code() as u32) != 0,
        }
    }

    /// Combine flags back into a mask
    pub fn to_mask(flags: &[Self]) -> u32 {
        flags
            .iter()
            .filter(|flag| **flag != Self::Unknown)
            .fold(0, |mask, flag| mask | flag.code() as u32)
    }
}

impl CodeTable for ConnectionStatusFlag {
    const UNKNOWN: Self = ConnectionStatusFlag::Unknown;

    fn entries() -> &'static [Self] {
        &[
            ConnectionStatusFlag::Unknown,
            ConnectionStatusFlag::Connected,
            ConnectionStatusFlag::Encrypted,
            ConnectionStatusFlag::Completed,
            ConnectionStatusFlag::ParametersChange,
        ]
    }

    fn code(self) -> i32 {
        match self {
            ConnectionStatusFlag::Unknown => -1,
            ConnectionStatusFlag::Connected => 0x0001,
            ConnectionStatusFlag::Encrypted => 0x0002,
            ConnectionStatusFlag::Completed => 0x0004,
            ConnectionStatusFlag::ParametersChange => 0x0008,
        }
    }
}
