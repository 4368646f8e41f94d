//! Address ranges of memory-mapped targets.

use std::fmt;

use super::convert::{parse_integer, ConversionError, FromValue, IntegerError};
use super::Value;

/// A contiguous range of bus addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AddressRange {
    begin: u64,
    size: u64,
}

impl AddressRange {
    pub fn new(begin: u64, size: u64) -> Self {
        Self { begin, size }
    }

    pub fn begin(&self) -> u64 {
        self.begin
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Last address of the range (inclusive). Equals `begin` for an empty
    /// range.
    pub fn end(&self) -> u64 {
        self.begin.saturating_add(self.size.saturating_sub(1))
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.size > 0 && addr >= self.begin && addr <= self.end()
    }

    pub fn overlaps(&self, other: &AddressRange) -> bool {
        self.size > 0 && other.size > 0 && self.begin <= other.end() && other.begin <= self.end()
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}..=0x{:x}", self.begin, self.end())
    }
}

/// Built from a single-entry map `{ <base>: <size> }`, e.g. `{ 0x1000: 4K }`.
impl FromValue for AddressRange {
    const TYPE_NAME: &'static str = "address-range";

    fn from_value(value: &Value) -> Result<Self, ConversionError> {
        let wrong_kind = || ConversionError::WrongKind {
            target: Self::TYPE_NAME,
            kind: value.kind(),
            origin: value.origin(),
        };

        if !value.is_map() || value.size() != 1 {
            return Err(wrong_kind());
        }
        let (key, size) = value.entries()?.next().ok_or_else(wrong_kind)?;
        let key = key.name().ok_or_else(wrong_kind)?;

        let begin = parse_integer(key, false, true)
            .and_then(|n| u64::try_from(n).map_err(|_| IntegerError::Range))
            .map_err(|e| e.into_conversion(Self::TYPE_NAME, key, value.origin()))?;
        let size = size.parse::<u64>()?;

        Ok(AddressRange::new(begin, size))
    }
}
