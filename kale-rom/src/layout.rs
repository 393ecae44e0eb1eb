// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Locations of the game's tables and data regions.
//!
//! [`RomLayout::default()`] describes Kirby's Adventure with the map
//! expansion patch applied.  Any subset of it can be overridden from a JSON
//! file, e.g.
//!
//! ```json
//! {
//!     "data_start": "40:0000",
//!     "last_data_bank": 125,
//!     "map_widths": [4, 4, 5, 4, 4, 4, 3]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::address::{BANK_MASK, RomAddress};
use crate::error::{Result, RomError};
use crate::{NUM_LEVELS, NUM_MAPS, NUM_TILESETS};

/// Low/high/bank byte arrays, one entry per indexed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongPointerTable {
    pub low: RomAddress,
    pub high: RomAddress,
    pub bank: RomAddress,
}

/// Low/high byte arrays whose entries all point into one bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortPointerTable {
    pub low: RomAddress,
    pub high: RomAddress,
    pub bank: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RomLayout {
    /// Compressed level maps
    pub map_data: LongPointerTable,
    /// Tileset number for each level
    pub map_tilesets: RomAddress,
    /// Sprite tables
    pub sprites: LongPointerTable,
    /// Exit lists (one more entry than there are levels)
    pub exits: ShortPointerTable,
    /// End of the region exit records are stored in
    pub exit_data_end: RomAddress,
    /// Boss door destinations, 3 bytes per level
    pub boss_exits: RomAddress,
    /// Compressed tilesets
    pub tilesets: LongPointerTable,
    /// "Broken tile" offsets, one byte per tileset
    pub tile_subtract: RomAddress,
    /// Map clear lists, one entry per (map, stage)
    pub map_clear: ShortPointerTable,
    /// Region the map clear lists are packed into
    pub map_clear_data: RomAddress,
    pub map_clear_end: RomAddress,
    /// Single entry pointing at the CHR bank tables
    pub bank_tables: LongPointerTable,
    pub bg_palettes: RomAddress,
    pub sprite_palettes: RomAddress,
    /// First free address for repacked data
    pub data_start: RomAddress,
    /// Last bank the repacked data may use
    pub last_data_bank: u8,
    /// CPU window level data banks are mapped into
    pub data_window: u32,
    /// Width in screens of each overworld map
    pub map_widths: [u8; NUM_MAPS],
}

impl Default for RomLayout {
    fn default() -> Self {
        const TABLES: u8 = 0x12;
        let at = |offset| RomAddress::new(TABLES, offset);
        Self {
            map_data: LongPointerTable {
                low: at(0x88A6),
                high: at(0x875F),
                bank: at(0x84D1),
            },
            map_tilesets: at(0x8618),
            sprites: LongPointerTable {
                low: at(0x8D0E),
                high: at(0x8BC7),
                bank: at(0x8A80),
            },
            exits: ShortPointerTable {
                low: at(0x8F82),
                high: at(0x90CB),
                bank: TABLES,
            },
            exit_data_end: at(0x9C4A),
            boss_exits: at(0x9C4A),
            tilesets: LongPointerTable {
                low: at(0x8A4F),
                high: at(0x8A1E),
                bank: at(0x89ED),
            },
            tile_subtract: at(0x84A0),
            map_clear: ShortPointerTable {
                low: at(0x9C7E),
                high: at(0x9CEE),
                bank: TABLES,
            },
            map_clear_data: at(0x9D5E),
            map_clear_end: at(0xA000),
            bank_tables: LongPointerTable {
                low: at(0x8E55),
                high: at(0x8E56),
                bank: at(0x8E57),
            },
            bg_palettes: RomAddress::new(0x13, 0x8000),
            sprite_palettes: RomAddress::new(0x13, 0x8A00),
            data_start: RomAddress::new(0x40, 0x0000),
            last_data_bank: 0x7D,
            data_window: 0xA000,
            map_widths: [4; NUM_MAPS],
        }
    }
}

impl RomLayout {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let layout: RomLayout = serde_json::from_str(s)?;
        layout.validate()?;
        Ok(layout)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| RomError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Start of the exit record region.  The exit pointer table is
    /// followed directly by the records.
    pub fn exit_data_start(&self) -> RomAddress {
        self.exits.high + (NUM_LEVELS as u32 + 2)
    }

    /// Most exits the exit region can hold.
    pub fn max_exits(&self) -> usize {
        (self.exit_data_end.offset.saturating_sub(self.exit_data_start().offset)) as usize
            / crate::level::EXIT_RECORD_SIZE
    }

    /// Bytes available for repacked chunks.
    pub fn free_space(&self) -> usize {
        crate::chunk::free_space(self.data_start, self.last_data_bank)
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| -> Result<()> { Err(RomError::BadLayout(msg)) };

        let mut addresses = vec![
            ("map_tilesets", self.map_tilesets),
            ("exit_data_end", self.exit_data_end),
            ("boss_exits", self.boss_exits),
            ("tile_subtract", self.tile_subtract),
            ("map_clear_data", self.map_clear_data),
            ("map_clear_end", self.map_clear_end),
            ("bg_palettes", self.bg_palettes),
            ("sprite_palettes", self.sprite_palettes),
            ("data_start", self.data_start),
        ];
        for (name, table) in [
            ("map_data", &self.map_data),
            ("sprites", &self.sprites),
            ("tilesets", &self.tilesets),
            ("bank_tables", &self.bank_tables),
        ] {
            addresses.push((name, table.low));
            addresses.push((name, table.high));
            addresses.push((name, table.bank));
        }
        for (name, table) in [("exits", &self.exits), ("map_clear", &self.map_clear)] {
            addresses.push((name, table.low));
            addresses.push((name, table.high));
            addresses.push((name, RomAddress::new(table.bank, 0)));
        }
        for (name, addr) in addresses {
            if addr.bank > BANK_MASK {
                return bad(format!("{}: bank 0x{:02X} is above 0x{:02X}", name, addr.bank, BANK_MASK));
            }
        }

        if self.last_data_bank > BANK_MASK {
            return bad(format!("last_data_bank 0x{:02X} is above 0x{:02X}", self.last_data_bank, BANK_MASK));
        }
        if self.last_data_bank < self.data_start.bank {
            return bad(format!(
                "last_data_bank 0x{:02X} is before data_start {}",
                self.last_data_bank, self.data_start
            ));
        }
        if self.exit_data_end.offset < self.exit_data_start().offset {
            return bad(format!(
                "exit_data_end {} is before the exit data start {}",
                self.exit_data_end,
                self.exit_data_start()
            ));
        }
        if self.map_clear_end.offset < self.map_clear_data.offset {
            return bad(format!(
                "map_clear_end {} is before map_clear_data {}",
                self.map_clear_end, self.map_clear_data
            ));
        }
        if self.data_window % crate::address::BANK_SIZE as u32 != 0 {
            return bad(format!("data_window 0x{:04X} is not bank aligned", self.data_window));
        }
        for (map, &width) in self.map_widths.iter().enumerate() {
            if width == 0 || width > 16 {
                return bad(format!("map_widths[{}] = {}, must be 1-16", map, width));
            }
        }

        // Tables must not run off the end of their bank
        for (name, base, count) in [
            ("map_data.low", self.map_data.low, NUM_LEVELS),
            ("sprites.low", self.sprites.low, NUM_LEVELS),
            ("tilesets.low", self.tilesets.low, NUM_TILESETS),
            ("exits.high", self.exits.high, NUM_LEVELS + 1),
        ] {
            if base.bank_offset() + count > crate::address::BANK_SIZE {
                return bad(format!("{} table at {} crosses a bank boundary", name, base));
            }
        }

        Ok(())
    }
}
