// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Overworld "map clear" regions.
//!
//! Clearing a stage reveals rectangles of the overworld map.  Each
//! (map, stage) pair points at a list of 4 byte entries:
//!
//! - screen number, with bit 7 set on the last entry
//! - y within the screen (high nibble), x within the screen (low nibble)
//! - width in tiles
//! - height in tiles
//!
//! A null pointer is an empty list.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::address::RomAddress;
use crate::error::{Result, RomError};
use crate::layout::RomLayout;
use crate::romfile::RomFile;
use crate::{NUM_MAPS, NUM_STAGES, SCREEN_HEIGHT, SCREEN_WIDTH};

const ENTRY_SIZE: usize = 4;
const LAST_ENTRY: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MapClearRegion {
    pub x: u16,
    pub y: u16,
    pub width: u8,
    pub height: u8,
}

/// All map clear lists, indexed by map and stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapClearTable {
    lists: Vec<Vec<MapClearRegion>>,
}

impl Default for MapClearTable {
    fn default() -> Self {
        Self {
            lists: vec![Vec::new(); NUM_MAPS * NUM_STAGES],
        }
    }
}

fn key(map: usize, stage: usize) -> Result<usize> {
    if map >= NUM_MAPS {
        return Err(RomError::BadIndex {
            what: "map",
            index: map,
            count: NUM_MAPS,
        });
    }
    if stage >= NUM_STAGES {
        return Err(RomError::BadIndex {
            what: "stage",
            index: stage,
            count: NUM_STAGES,
        });
    }
    Ok(map * NUM_STAGES + stage)
}

impl MapClearTable {
    pub fn get(&self, map: usize, stage: usize) -> Result<&[MapClearRegion]> {
        Ok(&self.lists[key(map, stage)?])
    }

    pub fn set(&mut self, map: usize, stage: usize, regions: Vec<MapClearRegion>) -> Result<()> {
        self.lists[key(map, stage)?] = regions;
        Ok(())
    }

    /// Encodes every list, in table order.  Empty lists encode to nothing.
    pub fn encode(&self, widths: &[u8; NUM_MAPS]) -> Result<Vec<Vec<u8>>> {
        self.lists
            .iter()
            .enumerate()
            .map(|(k, list)| encode_list(list, widths[k / NUM_STAGES] as usize))
            .collect()
    }

    /// Total bytes the encoded lists take.
    pub fn encoded_size(&self, widths: &[u8; NUM_MAPS]) -> Result<usize> {
        Ok(self.encode(widths)?.iter().map(Vec::len).sum())
    }
}

fn encode_list(list: &[MapClearRegion], width: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(list.len() * ENTRY_SIZE);
    for (i, region) in list.iter().enumerate() {
        let (x, y) = (region.x as usize, region.y as usize);
        let screen = (y / SCREEN_HEIGHT) * width + x / SCREEN_WIDTH;
        if screen > 0xF || x / SCREEN_WIDTH >= width {
            return Err(RomError::range(
                format!("map clear region at ({}, {}) screen", x, y),
                screen as u32,
                0xF,
            ));
        }
        let mut b0 = screen as u8;
        if i + 1 == list.len() {
            b0 |= LAST_ENTRY;
        }
        out.extend_from_slice(&[
            b0,
            (((y % SCREEN_HEIGHT) << 4) | (x % SCREEN_WIDTH)) as u8,
            region.width,
            region.height,
        ]);
    }
    Ok(out)
}

pub fn load_map_clear_data(rom: &RomFile, layout: &RomLayout) -> Result<MapClearTable> {
    let mut table = MapClearTable::default();
    for (k, list) in table.lists.iter_mut().enumerate() {
        let width = layout.map_widths[k / NUM_STAGES] as usize;
        let mut addr = rom.read_short_pointer(&layout.map_clear, k)?;
        if addr.is_null() {
            continue;
        }
        loop {
            if addr.bank_offset() + ENTRY_SIZE > crate::address::BANK_SIZE {
                return Err(RomError::OutOfBounds {
                    offset: addr.to_file_offset(),
                    len: ENTRY_SIZE,
                    file_len: rom.as_bytes().len(),
                });
            }
            let b = rom.read_bytes(addr, ENTRY_SIZE)?;
            let screen = (b[0] & 0xF) as usize;
            list.push(MapClearRegion {
                x: ((screen % width) * SCREEN_WIDTH + (b[1] & 0xF) as usize) as u16,
                y: ((screen / width) * SCREEN_HEIGHT + (b[1] >> 4) as usize) as u16,
                width: b[2],
                height: b[3],
            });
            if b[0] & LAST_ENTRY != 0 {
                break;
            }
            addr = addr + ENTRY_SIZE as u32;
        }
    }
    Ok(table)
}

/// Rewrites every list into the map clear region, in map order, and
/// repoints the table.  Empty lists get a null pointer.
///
/// Returns the number of bytes written.
pub fn save_map_clear_data(
    rom: &mut RomFile,
    layout: &RomLayout,
    table: &MapClearTable,
) -> Result<usize> {
    let encoded = table.encode(&layout.map_widths)?;
    let needed: usize = encoded.iter().map(Vec::len).sum();
    let available = (layout.map_clear_end.offset - layout.map_clear_data.offset) as usize;
    if needed > available {
        return Err(RomError::MapClearTooLarge { needed, available });
    }

    let mut addr = layout.map_clear_data;
    for (k, bytes) in encoded.iter().enumerate() {
        if bytes.is_empty() {
            rom.write_short_pointer(&layout.map_clear, k, RomAddress::new(layout.map_clear.bank, 0))?;
            continue;
        }
        rom.write_bytes(addr, bytes)?;
        rom.write_short_pointer(&layout.map_clear, k, addr)?;
        addr = addr + bytes.len() as u32;
    }
    debug!("Saved {} bytes of map clear data", needed);
    Ok(needed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_rom::blank_rom;

    fn region(x: u16, y: u16, width: u8, height: u8) -> MapClearRegion {
        MapClearRegion { x, y, width, height }
    }

    #[test]
    fn test_encode_list() {
        // Width 4: (37, 14) is screen 1 * 4 + 2 = 6, at (5, 2)
        let bytes = encode_list(&[region(3, 4, 2, 2), region(37, 14, 8, 1)], 4).unwrap();
        assert_eq!(bytes, vec![0x00, 0x43, 2, 2, 0x86, 0x25, 8, 1]);
        assert!(encode_list(&[], 4).unwrap().is_empty());
        // Past the right edge of the map
        assert!(encode_list(&[region(64, 0, 1, 1)], 4).is_err());
        // Past screen 15
        assert!(encode_list(&[region(0, 48, 1, 1)], 4).is_err());
    }

    #[test]
    fn test_empty_list_is_null_pointer() {
        let layout = RomLayout::default();
        let mut rom = RomFile::from_bytes(blank_rom()).unwrap();
        // Leave junk in the pointer table to show it gets cleared
        rom.write_short_pointer(&layout.map_clear, 0, RomAddress::new(0x12, 0x9E00))
            .unwrap();

        let mut table = MapClearTable::default();
        table.set(0, 1, vec![region(1, 1, 1, 1)]).unwrap();
        save_map_clear_data(&mut rom, &layout, &table).unwrap();

        assert!(rom.read_short_pointer(&layout.map_clear, 0).unwrap().is_null());
        assert_eq!(
            rom.read_short_pointer(&layout.map_clear, 1).unwrap(),
            layout.map_clear_data
        );
        assert!(load_map_clear_data(&rom, &layout).unwrap().get(0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_null_pointer_reads_no_records() {
        let layout = RomLayout::default();
        let mut rom = RomFile::from_bytes(blank_rom()).unwrap();
        // A record where a null pointer would point if it were followed
        rom.write_bytes(RomAddress::new(0x12, 0), &[0x81, 0x11, 3, 3]).unwrap();
        let table = load_map_clear_data(&rom, &layout).unwrap();
        assert_eq!(table, MapClearTable::default());
    }

    #[test]
    fn test_round_trip() {
        let layout = RomLayout::default();
        let mut rom = RomFile::from_bytes(blank_rom()).unwrap();
        let mut table = MapClearTable::default();
        table
            .set(0, 0, vec![region(0, 0, 16, 12), region(20, 13, 4, 4), region(63, 47, 1, 1)])
            .unwrap();
        table.set(3, 15, vec![region(5, 6, 7, 8)]).unwrap();
        table.set(6, 2, vec![region(16, 0, 2, 2), region(0, 12, 2, 2)]).unwrap();

        let written = save_map_clear_data(&mut rom, &layout, &table).unwrap();
        assert_eq!(written, (3 + 1 + 2) * 4);
        assert_eq!(table.encoded_size(&layout.map_widths).unwrap(), written);
        assert_eq!(load_map_clear_data(&rom, &layout).unwrap(), table);
        assert!(matches!(table.get(7, 0), Err(RomError::BadIndex { .. })));
        assert!(matches!(table.get(0, 16), Err(RomError::BadIndex { .. })));
    }

    #[test]
    fn test_too_large() {
        let layout = RomLayout::default();
        let mut rom = RomFile::from_bytes(blank_rom()).unwrap();
        let available = (layout.map_clear_end.offset - layout.map_clear_data.offset) as usize;
        let mut table = MapClearTable::default();
        let per_list = available / 4 / (NUM_MAPS * NUM_STAGES) + 1;
        for map in 0..NUM_MAPS {
            for stage in 0..NUM_STAGES {
                table.set(map, stage, vec![region(0, 0, 1, 1); per_list]).unwrap();
            }
        }
        let before = rom.as_bytes().to_vec();
        assert!(matches!(
            save_map_clear_data(&mut rom, &layout, &table),
            Err(RomError::MapClearTooLarge { .. })
        ));
        assert_eq!(rom.as_bytes(), &before[..]);
    }
}
