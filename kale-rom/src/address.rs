// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Bank-relative ROM addressing.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Add;

/// Size of one switchable PRG bank (8KB).
pub const BANK_SIZE: usize = 0x2000;

/// Size of the iNES file header preceding the PRG banks.
pub const HEADER_SIZE: usize = 16;

/// Bank bits used for addressing.  The top bit of a bank byte is an
/// attribute (the level "no return on death" flag) and is never part of the
/// address.
pub const BANK_MASK: u8 = 0x7F;

/// Attribute bit co-located with the bank number in pointer tables.
pub const BANK_FLAG: u8 = 0x80;

/// A bank number plus an offset.
///
/// The offset is normally a CPU address inside the bank's mapping window
/// (0x8000-0x9FFF for the table bank, 0xA000-0xBFFF for level data), but
/// only its position within the bank matters for file access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct RomAddress {
    pub bank: u8,
    pub offset: u32,
}

impl RomAddress {
    pub const fn new(bank: u8, offset: u32) -> Self {
        Self { bank, offset }
    }

    /// Returns a new address `n` bytes further on.  The bank is never
    /// changed - crossing into the next bank is up to the caller.
    pub const fn add(self, n: u32) -> Self {
        Self {
            bank: self.bank,
            offset: self.offset + n,
        }
    }

    /// Converts to a byte offset into the ROM file.
    pub const fn to_file_offset(self) -> usize {
        (self.offset as usize % BANK_SIZE)
            + (self.bank & BANK_MASK) as usize * BANK_SIZE
            + HEADER_SIZE
    }

    /// Position within the bank (0..BANK_SIZE).
    pub const fn bank_offset(self) -> usize {
        self.offset as usize % BANK_SIZE
    }

    /// Bytes left in the bank from this address.
    pub const fn space_left(self) -> usize {
        BANK_SIZE - self.bank_offset()
    }

    /// Re-expresses the address inside a CPU mapping window starting at
    /// `base`, as stored in the game's pointer tables.
    pub const fn in_window(self, base: u32) -> Self {
        Self {
            bank: self.bank,
            offset: base + self.bank_offset() as u32,
        }
    }

    pub const fn is_null(self) -> bool {
        self.offset == 0
    }

    pub const fn low(self) -> u8 {
        (self.offset & 0xFF) as u8
    }

    pub const fn high(self) -> u8 {
        ((self.offset >> 8) & 0xFF) as u8
    }

    /// Parses `BB:OOOO` (both hex, optional `0x`/`$` prefixes).
    pub fn from_str(s: &str) -> Option<Self> {
        let (bank, offset) = s.trim().split_once(':')?;
        let bank = u8::from_str_radix(strip_hex_prefix(bank), 16).ok()?;
        let offset = u32::from_str_radix(strip_hex_prefix(offset), 16).ok()?;
        Some(Self { bank, offset })
    }
}

fn strip_hex_prefix(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .or_else(|| s.strip_prefix('$'))
        .unwrap_or(s)
}

impl Add<u32> for RomAddress {
    type Output = RomAddress;

    fn add(self, n: u32) -> RomAddress {
        RomAddress::add(self, n)
    }
}

impl fmt::Display for RomAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}:{:04X}", self.bank, self.offset)
    }
}

impl Serialize for RomAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RomAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        RomAddress::from_str(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "Invalid ROM address: {}, must be BANK:OFFSET in hex, e.g. 12:88A6",
                s
            ))
        })
    }
}
