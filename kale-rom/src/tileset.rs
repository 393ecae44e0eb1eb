// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Metatile sets.
//!
//! Each tileset decompresses to 0x540 bytes: four 8x8 tile numbers per
//! metatile (0x400), a 2 bit palette per metatile packed four to a byte
//! (0x40), then one behaviour byte per metatile (0x100).

use log::debug;
use serde::{Deserialize, Serialize};

use crate::address::RomAddress;
use crate::chunk::{ChunkKind, DataChunk};
use crate::codec::DATA_SIZE;
use crate::error::{Result, RomError};
use crate::layout::RomLayout;
use crate::romfile::RomFile;

pub const NUM_METATILES: usize = 0x100;
pub const TILESET_SIZE: usize = 0x540;

const PALETTE_OFFSET: usize = 0x400;
const BEHAVIOR_OFFSET: usize = 0x440;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metatile {
    pub ul: u8,
    pub ur: u8,
    pub ll: u8,
    pub lr: u8,
    /// 0-3
    pub palette: u8,
    pub behavior: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tileset {
    pub metatiles: Vec<Metatile>,
    /// Added to a metatile number to find its "broken" form
    pub tile_subtract: u8,
}

impl Default for Tileset {
    fn default() -> Self {
        Self {
            metatiles: vec![Metatile::default(); NUM_METATILES],
            tile_subtract: 0,
        }
    }
}

impl Tileset {
    /// Decodes an uncompressed tileset.  Missing trailing bytes read as
    /// zero.
    pub fn from_bytes(data: &[u8], tile_subtract: u8) -> Self {
        let byte = |i: usize| data.get(i).copied().unwrap_or(0);
        let metatiles = (0..NUM_METATILES)
            .map(|t| Metatile {
                ul: byte(t * 4),
                ur: byte(t * 4 + 1),
                ll: byte(t * 4 + 2),
                lr: byte(t * 4 + 3),
                palette: (byte(PALETTE_OFFSET + t / 4) >> ((3 - t % 4) * 2)) & 3,
                behavior: byte(BEHAVIOR_OFFSET + t),
            })
            .collect();
        Self {
            metatiles,
            tile_subtract,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.metatiles.len() != NUM_METATILES {
            return Err(RomError::range(
                "tileset size",
                self.metatiles.len() as u32,
                NUM_METATILES as u32,
            ));
        }
        let mut buf = vec![0u8; TILESET_SIZE];
        for (t, tile) in self.metatiles.iter().enumerate() {
            if tile.palette > 3 {
                return Err(RomError::range(
                    format!("metatile {:02X} palette", t),
                    tile.palette as u32,
                    3,
                ));
            }
            buf[t * 4..t * 4 + 4].copy_from_slice(&[tile.ul, tile.ur, tile.ll, tile.lr]);
            buf[PALETTE_OFFSET + t / 4] |= tile.palette << ((3 - t % 4) * 2);
            buf[BEHAVIOR_OFFSET + t] = tile.behavior;
        }
        Ok(buf)
    }
}

pub fn load_tilesets(rom: &RomFile, layout: &RomLayout) -> Result<Vec<Tileset>> {
    let mut buf = vec![0u8; DATA_SIZE];
    let mut sets = Vec::with_capacity(crate::NUM_TILESETS);
    for set in 0..crate::NUM_TILESETS {
        let len = rom.read_from_pointer(&layout.tilesets, set, 0, &mut buf)?;
        if len == 0 {
            buf.fill(0);
        }
        let subtract = rom.read_byte(layout.tile_subtract + set as u32)?;
        sets.push(Tileset::from_bytes(&buf[..TILESET_SIZE], subtract));
    }
    debug!("Loaded {} tilesets", sets.len());
    Ok(sets)
}

pub fn pack_tileset(tileset: &Tileset, num: usize) -> Result<DataChunk> {
    DataChunk::new(ChunkKind::Tileset, num, &tileset.to_bytes()?)
}

/// Writes a tileset chunk at `addr`, updating its pointer and broken tile
/// offset.
pub fn save_tileset(
    rom: &mut RomFile,
    layout: &RomLayout,
    chunk: &DataChunk,
    tileset: &Tileset,
    addr: RomAddress,
) -> Result<()> {
    let addr = addr.in_window(layout.data_window);
    rom.write_to_pointer(&layout.tilesets, chunk.owner, addr, chunk.data())?;
    rom.write_byte(layout.tile_subtract + chunk.owner as u32, tileset.tile_subtract)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::test_rom::blank_rom;

    fn sample() -> Tileset {
        let mut set = Tileset {
            tile_subtract: 0x40,
            ..Default::default()
        };
        for (t, tile) in set.metatiles.iter_mut().enumerate() {
            *tile = Metatile {
                ul: t as u8,
                ur: (t as u8).wrapping_add(1),
                ll: 0x80 | t as u8 >> 1,
                lr: 0xFF - t as u8,
                palette: (t % 4) as u8 ^ ((t / 4) % 4) as u8,
                behavior: (t * 7) as u8,
            };
        }
        set
    }

    #[test]
    fn test_palette_packing() {
        let mut set = Tileset::default();
        set.metatiles[0].palette = 3;
        set.metatiles[1].palette = 0;
        set.metatiles[2].palette = 2;
        set.metatiles[3].palette = 1;
        set.metatiles[5].palette = 1;
        let bytes = set.to_bytes().unwrap();
        assert_eq!(bytes.len(), TILESET_SIZE);
        // First metatile in the top two bits
        assert_eq!(bytes[0x400], 0b11_00_10_01);
        assert_eq!(bytes[0x401], 0b00_01_00_00);
        assert_eq!(Tileset::from_bytes(&bytes, 0), set);
    }

    #[test]
    fn test_bytes_round_trip() {
        let set = sample();
        let bytes = set.to_bytes().unwrap();
        assert_eq!(&bytes[4..8], &[1, 2, 0x80, 0xFE]);
        assert_eq!(bytes[0x440 + 3], 21);
        assert_eq!(Tileset::from_bytes(&bytes, 0x40), set);
    }

    #[test]
    fn test_bad_palette() {
        let mut set = Tileset::default();
        set.metatiles[9].palette = 4;
        assert!(matches!(set.to_bytes(), Err(RomError::OutOfRange { .. })));
        set.metatiles.pop();
        assert!(set.to_bytes().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let layout = RomLayout::default();
        let mut rom = RomFile::from_bytes(blank_rom()).unwrap();
        let set = sample();
        let chunk = pack_tileset(&set, 0x30).unwrap();
        assert_eq!(codec::unpack(chunk.data()).unwrap(), set.to_bytes().unwrap());

        save_tileset(&mut rom, &layout, &chunk, &set, RomAddress::new(0x44, 0x10)).unwrap();
        assert_eq!(
            rom.read_pointer(&layout.tilesets, 0x30).unwrap(),
            RomAddress::new(0x44, 0xA010)
        );
        assert_eq!(rom.read_byte(layout.tile_subtract + 0x30).unwrap(), 0x40);

        let sets = load_tilesets(&rom, &layout).unwrap();
        assert_eq!(sets.len(), crate::NUM_TILESETS);
        assert_eq!(sets[0x30], set);
        // Tilesets with no data load as blank
        assert_eq!(sets[0], Tileset::default());
    }
}
