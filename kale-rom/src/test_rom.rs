// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Synthetic ROM images for unit tests.

use crate::address::{BANK_SIZE, HEADER_SIZE};
use crate::chunk::{self, ChunkKind, DataChunk};
use crate::layout::RomLayout;
use crate::level::{self, BossDestination, Exit, LevelData, LevelHeader, Sprite};
use crate::romfile::{CHR_BANK_SIZE, RomFile};
use crate::{BOSS_DOOR_TYPE, NUM_LEVELS};

/// A zeroed MMC3 image: 128 PRG banks, 128 CHR banks.
pub fn blank_rom() -> Vec<u8> {
    let mut data = vec![0u8; HEADER_SIZE + 128 * BANK_SIZE + 128 * CHR_BANK_SIZE];
    data[..8].copy_from_slice(&[b'N', b'E', b'S', 0x1A, 64, 16, 0x40, 0]);
    data
}

fn fixture_level(num: usize) -> LevelData {
    match num {
        0 => {
            let mut level = LevelData::new(LevelHeader {
                screens_h: 2,
                screens_v: 2,
                ..Default::default()
            });
            level.fill(0x05);
            level.sprites.push(Sprite {
                sprite_type: 0x10,
                x: 20,
                y: 14,
            });
            level.exits.push(Exit {
                exit_type: 0x00,
                x: 5,
                y: 3,
                dest: 3,
                dest_screen: 1,
                dest_x: 2,
                dest_y: 2,
                boss: None,
            });
            level
        }
        1 => {
            let mut level = LevelData::empty();
            level.exits.push(Exit {
                exit_type: BOSS_DOOR_TYPE,
                x: 1,
                y: 1,
                dest: 0,
                dest_screen: 0,
                dest_x: 4,
                dest_y: 4,
                boss: Some(BossDestination {
                    level: 0x20,
                    screen: 1,
                    x: 2,
                    y: 3,
                }),
            });
            level
        }
        _ => LevelData::empty(),
    }
}

/// An image every level loads from: level 0 is 2x2 screens with a sprite
/// and an exit, level 1 has a boss door, the rest are empty 1x1 levels.
pub fn game_rom() -> RomFile {
    let layout = RomLayout::default();
    let mut rom = RomFile::from_bytes(blank_rom()).unwrap();

    let levels: Vec<LevelData> = (0..NUM_LEVELS).map(fixture_level).collect();
    let chunks: Vec<DataChunk> = levels
        .iter()
        .enumerate()
        .flat_map(|(num, l)| {
            [
                level::pack_level(l, num).unwrap(),
                level::pack_sprites(l, num).unwrap(),
            ]
        })
        .collect();
    let placements = chunk::allocate(&chunks, layout.data_start, layout.last_data_bank).unwrap();
    for p in &placements {
        let chunk = &chunks[p.index];
        match chunk.kind {
            ChunkKind::LevelMap => {
                level::save_level(&mut rom, &layout, chunk, &levels[chunk.owner], p.addr).unwrap()
            }
            _ => level::save_sprites(&mut rom, &layout, chunk, p.addr).unwrap(),
        }
    }

    rom.write_short_pointer(&layout.exits, 0, layout.exit_data_start())
        .unwrap();
    for (num, l) in levels.iter().enumerate() {
        level::save_exits(&mut rom, &layout, l, num).unwrap();
    }

    rom.write_bytes(layout.bg_palettes, &[0x0F, 0x30, 0x21]).unwrap();
    rom
}
