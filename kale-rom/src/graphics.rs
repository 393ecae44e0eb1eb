// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Palettes, CHR bank selection tables and CHR tile graphics.

use log::debug;

use crate::address::RomAddress;
use crate::error::{Result, RomError};
use crate::layout::RomLayout;
use crate::romfile::{CHR_BANK_SIZE, RomFile};

/// Number of colour slots in a background palette.
pub const BG_PAL_SIZE: usize = 10;
/// Number of selectable background palettes.
pub const BG_PAL_NUM: usize = 256;
/// Number of colours in a sprite palette.
pub const SPR_PAL_SIZE: usize = 6;
/// Number of sprite palettes.
pub const SPR_PAL_NUM: usize = 50;

/// Hardware colours are 6 bit.
pub const NUM_COLORS: u8 = 0x40;

/// Size of the CHR bank selection tables.
pub const BANK_TABLES_SIZE: usize = 0x300;
const BANK_TABLE_COUNT: usize = BANK_TABLES_SIZE / 256;

// 2C02 master palette as 0xRRGGBB.  Exact values vary by decoder.
pub const NES_PALETTE: [u32; NUM_COLORS as usize] = [
    0x545454, 0x001E74, 0x081090, 0x300088, 0x440064, 0x5C0030, 0x540400, 0x3C1800,
    0x202A00, 0x083A00, 0x004000, 0x003C00, 0x00323C, 0x000000, 0x000000, 0x000000,
    0x989698, 0x084CC4, 0x3032EC, 0x5C1EE4, 0x8814B0, 0xA01464, 0x982220, 0x783C00,
    0x545A00, 0x287200, 0x087C00, 0x007628, 0x006678, 0x000000, 0x000000, 0x000000,
    0xECEEEC, 0x4C9AEC, 0x787CEC, 0xB062EC, 0xE454EC, 0xEC58B4, 0xEC6A64, 0xD48820,
    0xA0AA00, 0x74C400, 0x4CD020, 0x38CC6C, 0x38B4CC, 0x3C3C3C, 0x000000, 0x000000,
    0xECEEEC, 0xA8CCEC, 0xBCBCEC, 0xD4B2EC, 0xECAEEC, 0xECAED4, 0xECC4B0, 0xE4D4A0,
    0xCCDCA0, 0xB4E4A0, 0xA8E4B4, 0xA0E4CC, 0xA0D4E4, 0xA0A2A0, 0x000000, 0x000000,
];

/// RGB for a hardware colour index.  The top two bits are ignored.
pub fn rgb(color: u8) -> (u8, u8, u8) {
    let c = NES_PALETTE[(color & (NUM_COLORS - 1)) as usize];
    ((c >> 16) as u8, (c >> 8) as u8, c as u8)
}

/// Background and sprite palette tables.
///
/// Background palettes are stored slot-major: `bg[slot][palette]`, one
/// 256 byte array per colour slot.  Sprite palettes are palette-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palettes {
    pub bg: [[u8; BG_PAL_NUM]; BG_PAL_SIZE],
    pub sprite: [[u8; SPR_PAL_SIZE]; SPR_PAL_NUM],
}

impl Default for Palettes {
    fn default() -> Self {
        Self {
            bg: [[0; BG_PAL_NUM]; BG_PAL_SIZE],
            sprite: [[0; SPR_PAL_SIZE]; SPR_PAL_NUM],
        }
    }
}

impl Palettes {
    /// The colours of background palette `palette`, in slot order.
    pub fn bg_palette(&self, palette: u8) -> [u8; BG_PAL_SIZE] {
        std::array::from_fn(|slot| self.bg[slot][palette as usize])
    }

    pub fn set_bg_color(&mut self, palette: u8, slot: usize, color: u8) -> Result<()> {
        check_color(color)?;
        if slot >= BG_PAL_SIZE {
            return Err(RomError::BadIndex {
                what: "background palette slot",
                index: slot,
                count: BG_PAL_SIZE,
            });
        }
        self.bg[slot][palette as usize] = color;
        Ok(())
    }

    pub fn set_sprite_color(&mut self, palette: usize, slot: usize, color: u8) -> Result<()> {
        check_color(color)?;
        let entry = self
            .sprite
            .get_mut(palette)
            .ok_or(RomError::BadIndex {
                what: "sprite palette",
                index: palette,
                count: SPR_PAL_NUM,
            })?
            .get_mut(slot)
            .ok_or(RomError::BadIndex {
                what: "sprite palette slot",
                index: slot,
                count: SPR_PAL_SIZE,
            })?;
        *entry = color;
        Ok(())
    }

    /// Checks every entry is a valid hardware colour.
    pub fn validate(&self) -> Result<()> {
        self.bg
            .iter()
            .flatten()
            .chain(self.sprite.iter().flatten())
            .try_for_each(|&c| check_color(c))
    }
}

fn check_color(color: u8) -> Result<()> {
    if color < NUM_COLORS {
        Ok(())
    } else {
        Err(RomError::range("palette colour", color as u32, NUM_COLORS as u32 - 1))
    }
}

pub fn load_palettes(rom: &RomFile, layout: &RomLayout) -> Result<Palettes> {
    let mut palettes = Palettes::default();
    for (slot, row) in palettes.bg.iter_mut().enumerate() {
        let addr = layout.bg_palettes + (slot * BG_PAL_NUM) as u32;
        row.copy_from_slice(rom.read_bytes(addr, BG_PAL_NUM)?);
    }
    for (num, pal) in palettes.sprite.iter_mut().enumerate() {
        let addr = layout.sprite_palettes + (num * SPR_PAL_SIZE) as u32;
        pal.copy_from_slice(rom.read_bytes(addr, SPR_PAL_SIZE)?);
    }
    Ok(palettes)
}

pub fn save_palettes(rom: &mut RomFile, layout: &RomLayout, palettes: &Palettes) -> Result<()> {
    for (slot, row) in palettes.bg.iter().enumerate() {
        rom.write_bytes(layout.bg_palettes + (slot * BG_PAL_NUM) as u32, row)?;
    }
    let sprite: Vec<u8> = palettes.sprite.iter().flatten().copied().collect();
    rom.write_bytes(layout.sprite_palettes, &sprite)?;
    debug!("Saved palettes");
    Ok(())
}

/// CHR bank numbers selected by a level header's tile/sprite bank index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankTables {
    pub tables: [[u8; 256]; BANK_TABLE_COUNT],
}

impl Default for BankTables {
    fn default() -> Self {
        Self {
            tables: [[0; 256]; BANK_TABLE_COUNT],
        }
    }
}

impl BankTables {
    pub fn to_bytes(&self) -> Vec<u8> {
        self.tables.iter().flatten().copied().collect()
    }

    pub fn from_bytes(data: &[u8]) -> Self {
        let mut tables = Self::default();
        for (table, chunk) in tables.tables.iter_mut().zip(data.chunks(256)) {
            table[..chunk.len()].copy_from_slice(chunk);
        }
        tables
    }
}

pub fn load_bank_tables(rom: &RomFile, layout: &RomLayout) -> Result<BankTables> {
    let mut buf = [0u8; BANK_TABLES_SIZE];
    rom.read_from_pointer(&layout.bank_tables, 0, BANK_TABLES_SIZE, &mut buf)?;
    Ok(BankTables::from_bytes(&buf))
}

/// Writes the bank tables chunk at `addr` and repoints the game at it.
pub fn save_bank_tables(
    rom: &mut RomFile,
    layout: &RomLayout,
    data: &[u8],
    addr: RomAddress,
) -> Result<()> {
    let addr = addr.in_window(layout.data_window);
    rom.write_to_pointer(&layout.bank_tables, 0, addr, data)?;
    debug!("Saved bank tables at {}", addr);
    Ok(())
}

/// A decoded CHR bank.
///
/// The 64 tiles are laid out 16 across and 4 down, giving a 128x32 strip.
/// The strip is repeated once per palette selector, so the image is 128x128
/// and each pixel holds `palette * 4 + colour`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChrBank {
    pixels: Vec<u8>,
}

impl ChrBank {
    pub const WIDTH: usize = 128;
    pub const ROW_HEIGHT: usize = 32;
    pub const PALETTES: usize = 4;
    pub const HEIGHT: usize = Self::ROW_HEIGHT * Self::PALETTES;

    const TILES_ACROSS: usize = Self::WIDTH / 8;
    const TILE_BYTES: usize = 16;

    /// Decodes 1KB of planar 2bpp tile data.  Short input decodes as
    /// blank tiles.
    pub fn decode(data: &[u8]) -> Self {
        let mut pixels = vec![0u8; Self::WIDTH * Self::HEIGHT];
        for tile in 0..CHR_BANK_SIZE / Self::TILE_BYTES {
            let base = tile * Self::TILE_BYTES;
            let tx = (tile % Self::TILES_ACROSS) * 8;
            let ty = (tile / Self::TILES_ACROSS) * 8;
            for row in 0..8 {
                let lo = data.get(base + row).copied().unwrap_or(0);
                let hi = data.get(base + row + 8).copied().unwrap_or(0);
                for col in 0..8 {
                    let bit = 7 - col;
                    let color = ((lo >> bit) & 1) | (((hi >> bit) & 1) << 1);
                    for pal in 0..Self::PALETTES {
                        let y = pal * Self::ROW_HEIGHT + ty + row;
                        pixels[y * Self::WIDTH + tx + col] = (pal as u8) * 4 + color;
                    }
                }
            }
        }
        Self { pixels }
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<u8> {
        if x >= Self::WIDTH || y >= Self::HEIGHT {
            return None;
        }
        Some(self.pixels[y * Self::WIDTH + x])
    }

    /// The 128x32 strip drawn with palette `pal` (0-3).
    pub fn palette_row(&self, pal: usize) -> &[u8] {
        let pal = pal % Self::PALETTES;
        let len = Self::WIDTH * Self::ROW_HEIGHT;
        &self.pixels[pal * len..(pal + 1) * len]
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

pub fn load_chr_banks(rom: &RomFile) -> Result<Vec<ChrBank>> {
    let banks = (0..rom.num_chr_banks())
        .map(|n| rom.read_chr_bank(n))
        .collect::<Result<Vec<_>>>()?;
    debug!("Loaded {} CHR banks", banks.len());
    Ok(banks)
}
