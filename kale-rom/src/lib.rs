// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! kale-rom
//!
//! Reads and writes the level data in a Kirby's Adventure (NES) ROM image.
//!
//! The game keeps levels, sprites, exits, tilesets, palettes and CHR bank
//! tables in pointer-indexed tables spread across its 8KB PRG banks.  This
//! crate
//! - decodes each of these into plain Rust values
//! - re-encodes edited values, compressing where the game expects it
//! - packs the resulting chunks into free banks and rewrites the pointer
//!   tables that the game uses to find them
//!
//! Typically used like this:
//!
//! ```rust ignore
//! use kale_rom::{GameData, LoadPolicy, RomFile, RomLayout};
//!
//! let mut rom = RomFile::open("kirby.nes")?;
//! let mut game = GameData::open(&rom, RomLayout::default(), LoadPolicy::Abort)?;
//!
//! let mut level = game.level(0)?.clone();
//! level.set_tile(3, 4, 0x21)?;
//! game.commit_level(0, level)?;
//!
//! let report = game.save(&mut rom, None)?;
//! rom.save("kirby-edited.nes")?;
//! ```
//!
//! The ROM must have the map expansion patch applied (see [`patch`]) so
//! that banks 0x40 onwards are free for repacked data.

pub mod address;
pub mod chunk;
pub mod codec;
pub mod course;
pub mod error;
pub mod game;
pub mod graphics;
pub mod layout;
pub mod level;
pub mod mapclear;
pub mod names;
pub mod patch;
pub mod romfile;
pub mod tileset;

#[cfg(test)]
mod test_rom;

pub use address::RomAddress;
pub use chunk::{ChunkKind, DataChunk, Placement};
pub use course::CourseFile;
pub use error::{CodecError, Result, RomError};
pub use game::{GameData, LoadPolicy, SaveProgress, SaveReport};
pub use layout::RomLayout;
pub use level::{Exit, LevelData, LevelHeader, Sprite};
pub use romfile::RomFile;

/// Level slots
pub const NUM_LEVELS: usize = 0x147;
pub const NUM_TILESETS: usize = 0x31;
/// Overworld maps
pub const NUM_MAPS: usize = 7;
/// Map clear entries per overworld map
pub const NUM_STAGES: usize = 16;

/// Levels whose boss doors have a second destination
pub const BOSS_LEVELS: usize = 8;
pub const BOSS_DOOR_TYPE: u8 = 0x1F;

/// Screen size in metatiles
pub const SCREEN_WIDTH: usize = 16;
pub const SCREEN_HEIGHT: usize = 12;
