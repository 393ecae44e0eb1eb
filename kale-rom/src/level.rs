// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Level maps, sprites and exits.
//!
//! A level's map is a compressed blob:
//!
//! | Offset | Contents                                   |
//! |--------|--------------------------------------------|
//! | 0x00   | [`LevelHeader`]                            |
//! | 0x08   | screen table, one byte per screen slot     |
//! | 0xDA   | 16x12 tiles per screen, in screen order    |
//!
//! Sprites live in a separate uncompressed table and exits in the shared
//! exit region of the table bank.  The number of exits a level has is
//! never stored: the game works it out from the distance between this
//! level's exit pointer and the next one.

use deku::prelude::*;
use log::debug;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;

use crate::address::RomAddress;
use crate::chunk::{ChunkKind, DataChunk};
use crate::codec::DATA_SIZE;
use crate::error::{Result, RomError};
use crate::layout::RomLayout;
use crate::romfile::RomFile;
use crate::{BOSS_DOOR_TYPE, BOSS_LEVELS, SCREEN_HEIGHT, SCREEN_WIDTH};

/// Largest decompressed map blob.
pub const MAP_DATA_SIZE: usize = 0xCDA;
pub const MAX_SCREENS: usize = 16;
/// Tiles in one screen.
pub const SCREEN_TILES: usize = SCREEN_WIDTH * SCREEN_HEIGHT;
/// Tile grid dimensions large enough for any level shape.
pub const MAX_WIDTH: usize = MAX_SCREENS * SCREEN_WIDTH;
pub const MAX_HEIGHT: usize = MAX_SCREENS * SCREEN_HEIGHT;

pub const EXIT_RECORD_SIZE: usize = 5;
pub const BOSS_RECORD_SIZE: usize = 3;

const HEADER_SIZE: usize = 8;
const SCREEN_TABLE_OFFSET: usize = HEADER_SIZE;
const TILE_DATA_OFFSET: usize = 0xDA;

// Sprite positions treat each screen as 16 tiles tall, not 12.
const SPRITE_SCREEN_HEIGHT: usize = SCREEN_HEIGHT + 4;

const_assert_eq!(core::mem::size_of::<LevelHeader>(), HEADER_SIZE);
const_assert_eq!(TILE_DATA_OFFSET + MAX_SCREENS * SCREEN_TILES, MAP_DATA_SIZE);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, DekuRead, DekuWrite, Serialize, Deserialize,
)]
pub struct LevelHeader {
    pub screens_h: u8,
    pub screens_v: u8,
    /// Index into the CHR bank tables for background tiles
    pub tile_index: u8,
    pub tile_pal: u8,
    /// Index into the CHR bank tables for sprites
    pub sprite_index: u8,
    pub sprite_pal: u8,
    pub music: u8,
    pub anim_speed: u8,
}

impl LevelHeader {
    pub fn num_screens(&self) -> usize {
        self.screens_h as usize * self.screens_v as usize
    }

    pub fn width(&self) -> usize {
        self.screens_h as usize * SCREEN_WIDTH
    }

    pub fn height(&self) -> usize {
        self.screens_v as usize * SCREEN_HEIGHT
    }

    pub fn is_valid(&self) -> bool {
        self.screens_h > 0 && self.screens_v > 0 && self.num_screens() <= MAX_SCREENS
    }

    /// Fails with [`RomError::InvalidLevelSize`] unless the level is 1-16
    /// screens.
    pub fn validate(&self, level: usize) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(RomError::InvalidLevelSize {
                level,
                screens_h: self.screens_h,
                screens_v: self.screens_v,
            })
        }
    }

    fn parse(data: &[u8]) -> Result<Self> {
        LevelHeader::from_bytes((data, 0))
            .map(|(_, header)| header)
            .map_err(|e| RomError::Parse(format!("level header: {}", e)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sprite {
    #[serde(rename = "type")]
    pub sprite_type: u8,
    pub x: u16,
    pub y: u16,
}

impl Sprite {
    /// Screen number used to group sprites in the sprite table.
    fn screen(&self, header: &LevelHeader) -> usize {
        (self.y as usize / SPRITE_SCREEN_HEIGHT) * header.screens_h as usize
            + self.x as usize / SCREEN_WIDTH
    }
}

/// Where a boss door leads once the boss is beaten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BossDestination {
    pub level: u16,
    pub screen: u8,
    pub x: u8,
    pub y: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exit {
    #[serde(rename = "type")]
    pub exit_type: u8,
    pub x: u16,
    pub y: u16,
    pub dest: u16,
    pub dest_screen: u8,
    pub dest_x: u8,
    pub dest_y: u8,
    /// Only present for boss doors in the first [`BOSS_LEVELS`] levels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boss: Option<BossDestination>,
}

/// Whether an exit in level `num` of type `exit_type` has a boss record.
pub const fn has_boss_record(num: usize, exit_type: u8) -> bool {
    num < BOSS_LEVELS && exit_type == BOSS_DOOR_TYPE
}

/// An editable level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelData {
    pub header: LevelHeader,
    tiles: Vec<u8>,
    pub tileset: u8,
    /// "Don't return on death", stored in the top bit of the map pointer's
    /// bank byte
    pub no_return: bool,
    pub sprites: Vec<Sprite>,
    pub exits: Vec<Exit>,
    /// Differs from the ROM as loaded
    pub modified: bool,
    /// Changed since the last save
    pub modified_recently: bool,
}

impl LevelData {
    pub fn new(header: LevelHeader) -> Self {
        Self {
            header,
            tiles: vec![0; MAX_WIDTH * MAX_HEIGHT],
            tileset: 0,
            no_return: false,
            sprites: Vec::new(),
            exits: Vec::new(),
            modified: false,
            modified_recently: false,
        }
    }

    /// The smallest valid level, used in place of one that fails to load.
    pub fn empty() -> Self {
        Self::new(LevelHeader {
            screens_h: 1,
            screens_v: 1,
            ..Default::default()
        })
    }

    pub fn tile(&self, x: usize, y: usize) -> Option<u8> {
        if x < MAX_WIDTH && y < MAX_HEIGHT {
            Some(self.tiles[y * MAX_WIDTH + x])
        } else {
            None
        }
    }

    pub fn set_tile(&mut self, x: usize, y: usize, tile: u8) -> Result<()> {
        if x >= MAX_WIDTH || y >= MAX_HEIGHT {
            return Err(RomError::BadIndex {
                what: "tile position",
                index: y * MAX_WIDTH + x,
                count: MAX_WIDTH * MAX_HEIGHT,
            });
        }
        self.tiles[y * MAX_WIDTH + x] = tile;
        Ok(())
    }

    /// Row `y` of the tile grid, limited to the level's width.
    pub fn row(&self, y: usize) -> &[u8] {
        let start = y * MAX_WIDTH;
        &self.tiles[start..start + self.header.width().min(MAX_WIDTH)]
    }

    pub fn fill(&mut self, tile: u8) {
        let (w, h) = (self.header.width(), self.header.height());
        for y in 0..h.min(MAX_HEIGHT) {
            self.tiles[y * MAX_WIDTH..y * MAX_WIDTH + w.min(MAX_WIDTH)].fill(tile);
        }
    }

    /// Checks everything that has to fit in a packed ROM field.
    pub fn validate(&self, num: usize) -> Result<()> {
        self.header.validate(num)?;
        for sprite in &self.sprites {
            sprite_screen(sprite, &self.header)?;
        }
        if self.sprites.len() > u8::MAX as usize {
            return Err(RomError::range(
                format!("level 0x{:03X} sprite count", num),
                self.sprites.len() as u32,
                u8::MAX as u32,
            ));
        }
        for exit in &self.exits {
            encode_exit(exit, &self.header)?;
            if let Some(boss) = exit.boss.filter(|_| has_boss_record(num, exit.exit_type)) {
                encode_boss(&boss)?;
            }
        }
        Ok(())
    }
}

/// Loads level `num`.
///
/// A level whose header gives an impossible size fails with
/// [`RomError::InvalidLevelSize`]; the caller decides whether that stops
/// the whole ROM from loading.
pub fn load_level(rom: &RomFile, layout: &RomLayout, num: usize) -> Result<LevelData> {
    let mut buf = vec![0u8; DATA_SIZE];
    let len = rom.read_from_pointer(&layout.map_data, num, 0, &mut buf)?;
    if len == 0 {
        return Err(RomError::MissingLevel { level: num });
    }

    let header = LevelHeader::parse(&buf[..HEADER_SIZE])?;
    header.validate(num)?;

    let mut level = LevelData::new(header);
    let screens = &buf[SCREEN_TABLE_OFFSET..TILE_DATA_OFFSET];
    let tiles = &buf[TILE_DATA_OFFSET..];
    let h = header.screens_h as usize;
    for y in 0..header.height() {
        for x in 0..header.width() {
            let screen = screens[(y / SCREEN_HEIGHT) * h + x / SCREEN_WIDTH] as usize;
            let src = screen * SCREEN_TILES + (y % SCREEN_HEIGHT) * SCREEN_WIDTH + x % SCREEN_WIDTH;
            level.tiles[y * MAX_WIDTH + x] = tiles.get(src).copied().unwrap_or(0);
        }
    }

    level.tileset = rom.read_byte(layout.map_tilesets + num as u32)?;
    level.no_return = rom.read_pointer_flag(&layout.map_data, num)?;
    level.sprites = load_sprites(rom, layout, num, &header)?;
    level.exits = load_exits(rom, layout, num, &header)?;

    debug!(
        "Loaded level 0x{:03X}: {}x{} screens, {} sprites, {} exits",
        num,
        header.screens_h,
        header.screens_v,
        level.sprites.len(),
        level.exits.len()
    );
    Ok(level)
}

fn load_sprites(
    rom: &RomFile,
    layout: &RomLayout,
    num: usize,
    header: &LevelHeader,
) -> Result<Vec<Sprite>> {
    let ptr = rom.read_pointer(&layout.sprites, num)?;
    let screens = rom.read_byte(ptr)? as u32;
    if screens == 0 {
        return Ok(Vec::new());
    }

    // Running count of sprites up to and including each screen
    let counts = ptr + 2;
    let total = rom.read_byte(counts + (screens - 1))? as u32;
    let positions = counts + screens;
    let types = positions + total;

    let h = header.screens_h as usize;
    let mut sprites = Vec::with_capacity(total as usize);
    let mut n = 0u32;
    for screen in 0..screens {
        let upto = rom.read_byte(counts + screen)? as u32;
        while n < upto {
            let pos = rom.read_byte(positions + n)? as usize;
            let screen = screen as usize;
            sprites.push(Sprite {
                sprite_type: rom.read_byte(types + n)?,
                x: ((screen % h) * SCREEN_WIDTH + (pos >> 4)) as u16,
                y: ((screen / h) * SPRITE_SCREEN_HEIGHT + (pos & 0xF)) as u16,
            });
            n += 1;
        }
    }
    Ok(sprites)
}

fn load_exits(
    rom: &RomFile,
    layout: &RomLayout,
    num: usize,
    header: &LevelHeader,
) -> Result<Vec<Exit>> {
    let this = rom.read_short_pointer(&layout.exits, num)?;
    let next = rom.read_short_pointer(&layout.exits, num + 1)?;
    if next.offset < this.offset {
        return Err(RomError::BadExitPointers {
            level: num,
            this: this.offset,
            next: next.offset,
        });
    }
    let count = (next.offset - this.offset) as usize / EXIT_RECORD_SIZE;

    let mut exits = Vec::with_capacity(count);
    for i in 0..count {
        let bytes = rom.read_bytes(this + (i * EXIT_RECORD_SIZE) as u32, EXIT_RECORD_SIZE)?;
        let mut exit = decode_exit(bytes, header);
        if has_boss_record(num, exit.exit_type) {
            let boss_addr = layout.boss_exits + (num * BOSS_RECORD_SIZE) as u32;
            exit.boss = Some(decode_boss(rom.read_bytes(boss_addr, BOSS_RECORD_SIZE)?));
        }
        exits.push(exit);
    }
    Ok(exits)
}

fn decode_exit(b: &[u8], header: &LevelHeader) -> Exit {
    let screen = (b[0] & 0xF) as usize;
    let h = header.screens_h as usize;
    let mut dest = b[2] as u16;
    if b[3] & 0x80 != 0 {
        dest |= 0x100;
    }
    Exit {
        exit_type: (b[0] >> 4) | (b[3] & 0x70),
        x: ((screen % h) * SCREEN_WIDTH + (b[1] >> 4) as usize) as u16,
        y: ((screen / h) * SCREEN_HEIGHT + (b[1] & 0xF) as usize) as u16,
        dest,
        dest_screen: b[3] & 0xF,
        dest_x: b[4] >> 4,
        dest_y: b[4] & 0xF,
        boss: None,
    }
}

fn decode_boss(b: &[u8]) -> BossDestination {
    let mut level = b[0] as u16;
    if b[1] & 0x80 != 0 {
        level |= 0x100;
    }
    BossDestination {
        level,
        screen: b[1] & 0xF,
        x: b[2] >> 4,
        y: b[2] & 0xF,
    }
}

fn check(what: &str, value: u32, max: u32) -> Result<()> {
    if value > max {
        Err(RomError::range(what, value, max))
    } else {
        Ok(())
    }
}

/// Packs one exit into its 5 byte record.
pub fn encode_exit(exit: &Exit, header: &LevelHeader) -> Result<[u8; EXIT_RECORD_SIZE]> {
    check("exit type", exit.exit_type as u32, 0x7F)?;
    check("exit x", exit.x as u32, (header.width() as u32).saturating_sub(1))?;
    check("exit y", exit.y as u32, (header.height() as u32).saturating_sub(1))?;
    check("exit destination", exit.dest as u32, 0x1FF)?;
    check("exit destination screen", exit.dest_screen as u32, 0xF)?;
    check("exit destination x", exit.dest_x as u32, 0xF)?;
    check("exit destination y", exit.dest_y as u32, 0xF)?;

    let (x, y) = (exit.x as usize, exit.y as usize);
    let screen = (y / SCREEN_HEIGHT) * header.screens_h as usize + x / SCREEN_WIDTH;
    let mut b3 = (exit.exit_type & 0x70) | exit.dest_screen;
    if exit.dest >= 0x100 {
        b3 |= 0x80;
    }
    Ok([
        (exit.exit_type << 4) | screen as u8,
        (((x % SCREEN_WIDTH) << 4) | (y % SCREEN_HEIGHT)) as u8,
        (exit.dest & 0xFF) as u8,
        b3,
        (exit.dest_x << 4) | exit.dest_y,
    ])
}

pub fn encode_boss(boss: &BossDestination) -> Result<[u8; BOSS_RECORD_SIZE]> {
    check("boss destination", boss.level as u32, 0x1FF)?;
    check("boss destination screen", boss.screen as u32, 0xF)?;
    check("boss destination x", boss.x as u32, 0xF)?;
    check("boss destination y", boss.y as u32, 0xF)?;
    let mut b1 = boss.screen;
    if boss.level >= 0x100 {
        b1 |= 0x80;
    }
    Ok([(boss.level & 0xFF) as u8, b1, (boss.x << 4) | boss.y])
}

fn sprite_screen(sprite: &Sprite, header: &LevelHeader) -> Result<usize> {
    check("sprite x", sprite.x as u32, (header.width() as u32).saturating_sub(1))?;
    let rows = header.screens_v as u32 * SPRITE_SCREEN_HEIGHT as u32;
    check("sprite y", sprite.y as u32, rows.saturating_sub(1))?;
    Ok(sprite.screen(header))
}

/// Builds the compressed map chunk for level `num`.  Only the level's own
/// screens are emitted, renumbered in raster order.
pub fn pack_level(level: &LevelData, num: usize) -> Result<DataChunk> {
    let header = &level.header;
    header.validate(num)?;
    let screens = header.num_screens();
    let h = header.screens_h as usize;

    let mut buf = vec![0u8; TILE_DATA_OFFSET + screens * SCREEN_TILES];
    let header_bytes = header
        .to_bytes()
        .map_err(|e| RomError::Parse(format!("level header: {}", e)))?;
    buf[..HEADER_SIZE].copy_from_slice(&header_bytes);

    for i in 0..screens {
        buf[SCREEN_TABLE_OFFSET + i] = i as u8;
        let (sx, sy) = ((i % h) * SCREEN_WIDTH, (i / h) * SCREEN_HEIGHT);
        for row in 0..SCREEN_HEIGHT {
            let dst = TILE_DATA_OFFSET + i * SCREEN_TILES + row * SCREEN_WIDTH;
            let src = (sy + row) * MAX_WIDTH + sx;
            buf[dst..dst + SCREEN_WIDTH].copy_from_slice(&level.tiles[src..src + SCREEN_WIDTH]);
        }
    }

    let chunk = DataChunk::new(ChunkKind::LevelMap, num, &buf)?;
    debug!(
        "Packed level 0x{:03X}: {} bytes -> {} bytes",
        num,
        buf.len(),
        chunk.size()
    );
    Ok(chunk)
}

/// Builds the sprite table chunk for level `num`.
pub fn pack_sprites(level: &LevelData, num: usize) -> Result<DataChunk> {
    let header = &level.header;
    header.validate(num)?;
    let screens = header.num_screens();

    let mut sorted = level
        .sprites
        .iter()
        .map(|s| sprite_screen(s, header).map(|screen| (screen, s)))
        .collect::<Result<Vec<_>>>()?;
    // Stable, so sprites keep their order within a screen
    sorted.sort_by_key(|&(screen, _)| screen);

    let count = sorted.len();
    check(
        &format!("level 0x{:03X} sprite count", num),
        count as u32,
        u8::MAX as u32,
    )?;

    let mut buf = vec![0u8; 2 + screens + 2 * count];
    buf[0] = screens as u8;
    buf[1] = header.screens_v;
    let (counts, rest) = buf[2..].split_at_mut(screens);
    let (positions, types) = rest.split_at_mut(count);
    for (n, (screen, sprite)) in sorted.iter().enumerate() {
        for c in &mut counts[*screen..] {
            *c += 1;
        }
        let (x, y) = (sprite.x as usize, sprite.y as usize);
        positions[n] = (((x % SCREEN_WIDTH) << 4) | (y % SPRITE_SCREEN_HEIGHT)) as u8;
        types[n] = sprite.sprite_type;
    }

    DataChunk::new(ChunkKind::Sprites, num, &buf)
}

/// Writes a level's map chunk at `addr` and updates its pointer and
/// tileset.
pub fn save_level(
    rom: &mut RomFile,
    layout: &RomLayout,
    chunk: &DataChunk,
    level: &LevelData,
    addr: RomAddress,
) -> Result<()> {
    let mut addr = addr.in_window(layout.data_window);
    if level.no_return {
        addr.bank |= crate::address::BANK_FLAG;
    }
    rom.write_to_pointer(&layout.map_data, chunk.owner, addr, chunk.data())?;
    rom.write_byte(layout.map_tilesets + chunk.owner as u32, level.tileset)
}

pub fn save_sprites(
    rom: &mut RomFile,
    layout: &RomLayout,
    chunk: &DataChunk,
    addr: RomAddress,
) -> Result<()> {
    let addr = addr.in_window(layout.data_window);
    rom.write_to_pointer(&layout.sprites, chunk.owner, addr, chunk.data())
}

/// Writes level `num`'s exits at its current exit pointer, then points
/// level `num + 1` just past them.  Levels must be saved in order.
///
/// Returns the address after the last record.
pub fn save_exits(
    rom: &mut RomFile,
    layout: &RomLayout,
    level: &LevelData,
    num: usize,
) -> Result<RomAddress> {
    let mut addr = rom.read_short_pointer(&layout.exits, num)?;
    for exit in &level.exits {
        let record = encode_exit(exit, &level.header)?;
        rom.write_bytes(addr, &record)?;
        addr = addr + EXIT_RECORD_SIZE as u32;

        if has_boss_record(num, exit.exit_type) {
            let boss = encode_boss(&exit.boss.unwrap_or_default())?;
            rom.write_bytes(layout.boss_exits + (num * BOSS_RECORD_SIZE) as u32, &boss)?;
        }
    }
    rom.write_short_pointer(&layout.exits, num + 1, addr)?;
    Ok(addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::test_rom::blank_rom;

    fn setup() -> (RomFile, RomLayout) {
        (RomFile::from_bytes(blank_rom()).unwrap(), RomLayout::default())
    }

    fn level_2x2() -> LevelData {
        let mut level = LevelData::new(LevelHeader {
            screens_h: 2,
            screens_v: 2,
            tile_index: 0x11,
            tile_pal: 2,
            sprite_index: 0x22,
            sprite_pal: 3,
            music: 7,
            anim_speed: 4,
        });
        level.fill(0x05);
        level.tileset = 0x0C;
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

    /// Writes a level's chunks and exits the way a save would.
    fn store(rom: &mut RomFile, layout: &RomLayout, level: &LevelData, num: usize) {
        let map = pack_level(level, num).unwrap();
        let spr = pack_sprites(level, num).unwrap();
        save_level(rom, layout, &map, level, RomAddress::new(0x40, 0x100)).unwrap();
        save_sprites(rom, layout, &spr, RomAddress::new(0x41, 0x200)).unwrap();
        rom.write_short_pointer(&layout.exits, num, layout.exit_data_start())
            .unwrap();
        save_exits(rom, layout, level, num).unwrap();
    }

    #[test]
    fn test_header_validation() {
        let header = |h, v| LevelHeader {
            screens_h: h,
            screens_v: v,
            ..Default::default()
        };
        assert!(header(1, 1).is_valid());
        assert!(header(4, 4).is_valid());
        assert!(header(16, 1).is_valid());
        assert!(!header(0, 3).is_valid());
        assert!(!header(3, 0).is_valid());
        assert!(!header(5, 4).is_valid());
        assert!(matches!(
            header(5, 4).validate(9),
            Err(RomError::InvalidLevelSize {
                level: 9,
                screens_h: 5,
                screens_v: 4
            })
        ));
    }

    #[test]
    fn test_pack_level_layout() {
        let mut level = level_2x2();
        level.set_tile(16, 0, 0x77).unwrap();
        level.set_tile(31, 23, 0x99).unwrap();
        // Outside the level, never emitted
        level.set_tile(40, 0, 0x55).unwrap();

        let chunk = pack_level(&level, 0).unwrap();
        assert_eq!(chunk.kind, ChunkKind::LevelMap);
        let raw = codec::unpack(chunk.data()).unwrap();
        assert_eq!(raw.len(), 0xDA + 4 * 192);
        assert_eq!(&raw[..8], &[2, 2, 0x11, 2, 0x22, 3, 7, 4]);
        assert_eq!(&raw[8..12], &[0, 1, 2, 3]);
        assert!(raw[12..0xDA].iter().all(|&b| b == 0));
        // Screen 1 starts with the tile at (16, 0)
        assert_eq!(raw[0xDA + 192], 0x77);
        // Last tile of screen 3 is (31, 23)
        assert_eq!(raw[0xDA + 4 * 192 - 1], 0x99);
        assert!(!raw.contains(&0x55));
    }

    #[test]
    fn test_pack_sprites_layout() {
        let mut level = level_2x2();
        level.sprites = vec![
            Sprite { sprite_type: 0xA0, x: 20, y: 17 },
            Sprite { sprite_type: 0xA1, x: 3, y: 2 },
            Sprite { sprite_type: 0xA2, x: 30, y: 1 },
            Sprite { sprite_type: 0xA3, x: 4, y: 5 },
        ];
        let chunk = pack_sprites(&level, 0).unwrap();
        assert_eq!(chunk.kind, ChunkKind::Sprites);
        assert_eq!(
            chunk.data(),
            &[
                4, 2, // screens, screens tall
                2, 3, 3, 4, // running counts
                0x32, 0x45, 0xE1, 0x41, // positions, screen order
                0xA1, 0xA3, 0xA2, 0xA0, // types
            ]
        );
    }

    #[test]
    fn test_sprite_out_of_bounds() {
        let mut level = level_2x2();
        level.sprites.push(Sprite { sprite_type: 0, x: 32, y: 0 });
        assert!(matches!(pack_sprites(&level, 0), Err(RomError::OutOfRange { .. })));
        level.sprites.pop();
        level.sprites.push(Sprite { sprite_type: 0, x: 0, y: 32 });
        assert!(pack_sprites(&level, 0).is_err());
        level.sprites.pop();
        // Rows 24-31 belong to the second row of sprite screens
        level.sprites.push(Sprite { sprite_type: 0, x: 0, y: 31 });
        pack_sprites(&level, 0).unwrap();
    }

    #[test]
    fn test_exit_encoding() {
        let header = level_2x2().header;
        let exit = Exit {
            exit_type: 0x3A,
            x: 17,
            y: 13,
            dest: 0x123,
            dest_screen: 5,
            dest_x: 9,
            dest_y: 0xB,
            boss: None,
        };
        let bytes = encode_exit(&exit, &header).unwrap();
        assert_eq!(bytes, [0xA3, 0x11, 0x23, 0x80 | 0x30 | 5, 0x9B]);
        assert_eq!(decode_exit(&bytes, &header), exit);

        let bad = Exit { dest: 0x200, ..exit };
        assert!(encode_exit(&bad, &header).is_err());
        let bad = Exit { x: 32, ..exit };
        assert!(encode_exit(&bad, &header).is_err());
        let bad = Exit { exit_type: 0x80, ..exit };
        assert!(encode_exit(&bad, &header).is_err());
    }

    #[test]
    fn test_two_by_two_round_trip() {
        let (mut rom, layout) = setup();
        let level = level_2x2();
        store(&mut rom, &layout, &level, 5);

        let loaded = load_level(&rom, &layout, 5).unwrap();
        assert_eq!(loaded, level);
        assert_eq!(loaded.sprites[0], Sprite { sprite_type: 0x10, x: 20, y: 14 });
        assert_eq!(loaded.exits[0].dest, 3);
        assert_eq!(loaded.tile(31, 23), Some(0x05));
        assert_eq!(loaded.tile(32, 0), Some(0));
    }

    #[test]
    fn test_no_return_flag() {
        let (mut rom, layout) = setup();
        let mut level = level_2x2();
        level.no_return = true;
        store(&mut rom, &layout, &level, 2);

        assert_eq!(rom.read_byte(layout.map_data.bank + 2).unwrap(), 0xC0);
        assert_eq!(
            rom.read_pointer(&layout.map_data, 2).unwrap(),
            RomAddress::new(0x40, 0xA100)
        );
        assert_eq!(rom.read_byte(layout.map_tilesets + 2).unwrap(), 0x0C);
        assert!(load_level(&rom, &layout, 2).unwrap().no_return);
    }

    #[test]
    fn test_invalid_size_on_load() {
        let (mut rom, layout) = setup();
        let mut raw = vec![0u8; 0xDA + 192];
        raw[0] = 5;
        raw[1] = 4;
        let packed = codec::pack(&raw).unwrap();
        let addr = RomAddress::new(0x40, 0xA000);
        rom.write_to_pointer(&layout.map_data, 1, addr, &packed).unwrap();
        assert!(matches!(
            load_level(&rom, &layout, 1),
            Err(RomError::InvalidLevelSize { level: 1, .. })
        ));
        assert!(matches!(
            load_level(&rom, &layout, 0),
            Err(RomError::MissingLevel { level: 0 })
        ));
    }

    #[test]
    fn test_exit_pointer_deltas() {
        let (mut rom, layout) = setup();
        let counts = [3usize, 0, 1, 4, 0, 2];
        let header = LevelHeader {
            screens_h: 1,
            screens_v: 1,
            ..Default::default()
        };
        rom.write_short_pointer(&layout.exits, 0, layout.exit_data_start())
            .unwrap();
        for (num, &count) in counts.iter().enumerate() {
            let mut level = LevelData::new(header);
            for i in 0..count {
                level.exits.push(Exit {
                    exit_type: 0,
                    x: i as u16,
                    y: 0,
                    dest: num as u16,
                    dest_screen: 0,
                    dest_x: 0,
                    dest_y: 0,
                    boss: None,
                });
            }
            save_exits(&mut rom, &layout, &level, num).unwrap();
        }

        for (num, &count) in counts.iter().enumerate() {
            let this = rom.read_short_pointer(&layout.exits, num).unwrap();
            let next = rom.read_short_pointer(&layout.exits, num + 1).unwrap();
            assert_eq!((next.offset - this.offset) as usize / EXIT_RECORD_SIZE, count);
            assert_eq!(load_exits(&rom, &layout, num, &header).unwrap().len(), count);
        }
        let end = rom.read_short_pointer(&layout.exits, counts.len()).unwrap();
        assert_eq!(end, layout.exit_data_start() + (10 * EXIT_RECORD_SIZE) as u32);
    }

    #[test]
    fn test_bad_exit_pointers() {
        let (mut rom, layout) = setup();
        let header = LevelData::empty().header;
        rom.write_short_pointer(&layout.exits, 4, RomAddress::new(0x12, 0x9300))
            .unwrap();
        rom.write_short_pointer(&layout.exits, 5, RomAddress::new(0x12, 0x92FB))
            .unwrap();
        assert!(matches!(
            load_exits(&rom, &layout, 4, &header),
            Err(RomError::BadExitPointers { level: 4, .. })
        ));
    }

    fn boss_exit(exit_type: u8) -> Exit {
        Exit {
            exit_type,
            x: 1,
            y: 1,
            dest: 0,
            dest_screen: 0,
            dest_x: 0,
            dest_y: 0,
            boss: Some(BossDestination {
                level: 0x105,
                screen: 2,
                x: 3,
                y: 4,
            }),
        }
    }

    #[test]
    fn test_boss_record_written_when_gated() {
        let (mut rom, layout) = setup();
        let mut level = LevelData::empty();
        level.exits.push(boss_exit(BOSS_DOOR_TYPE));
        rom.write_short_pointer(&layout.exits, 3, layout.exit_data_start())
            .unwrap();
        save_exits(&mut rom, &layout, &level, 3).unwrap();

        assert_eq!(
            rom.read_bytes(layout.boss_exits + 9, 3).unwrap(),
            &[0x05, 0x82, 0x34]
        );
        let exits = load_exits(&rom, &layout, 3, &level.header).unwrap();
        assert_eq!(exits, level.exits);
    }

    #[test]
    fn test_boss_record_not_written_otherwise() {
        let (mut rom, layout) = setup();
        let before = rom.read_bytes(layout.boss_exits, 8 * 3).unwrap().to_vec();

        // Right type, level past the threshold
        let mut level = LevelData::empty();
        level.exits.push(boss_exit(BOSS_DOOR_TYPE));
        rom.write_short_pointer(&layout.exits, BOSS_LEVELS, layout.exit_data_start())
            .unwrap();
        save_exits(&mut rom, &layout, &level, BOSS_LEVELS).unwrap();
        let exits = load_exits(&rom, &layout, BOSS_LEVELS, &level.header).unwrap();
        assert_eq!(exits[0].boss, None);

        // Boss level, wrong type
        let mut level = LevelData::empty();
        level.exits.push(boss_exit(0x1E));
        rom.write_short_pointer(&layout.exits, 2, layout.exit_data_start())
            .unwrap();
        save_exits(&mut rom, &layout, &level, 2).unwrap();
        let exits = load_exits(&rom, &layout, 2, &level.header).unwrap();
        assert_eq!(exits[0].boss, None);

        assert_eq!(rom.read_bytes(layout.boss_exits, 8 * 3).unwrap(), &before[..]);
        assert_eq!(
            rom.read_bytes(layout.boss_exits + (BOSS_LEVELS * 3) as u32, 3).unwrap(),
            &[0, 0, 0]
        );
    }

    #[test]
    fn test_validate() {
        let mut level = level_2x2();
        level.validate(0).unwrap();
        level.exits[0].dest_y = 0x10;
        assert!(level.validate(0).is_err());
        let mut level = level_2x2();
        level.sprites = vec![Sprite { sprite_type: 0, x: 0, y: 0 }; 256];
        assert!(level.validate(0).is_err());
        assert!(pack_sprites(&level, 0).is_err());
    }
}
