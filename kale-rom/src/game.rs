// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Everything the editor works on, decoded from one ROM.
//!
//! [`GameData::open`] runs every loader once.  Edits are made on copies and
//! swapped back in with the `commit_*` methods.  [`GameData::save`] packs
//! and places all chunks, then rewrites the ROM image.  Every capacity and
//! range check runs before the first byte is written, and if a write still
//! fails the image is put back the way it was.

use log::{debug, info, warn};

use crate::chunk::{self, ChunkKind, DataChunk, Placement};
use crate::error::{Result, RomError};
use crate::graphics::{self, BankTables, ChrBank, Palettes};
use crate::layout::RomLayout;
use crate::level::{self, LevelData};
use crate::mapclear::{self, MapClearTable};
use crate::romfile::RomFile;
use crate::tileset::{self, Tileset};
use crate::{NUM_LEVELS, NUM_TILESETS};

/// What to do when a level fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadPolicy {
    /// Fail the whole load
    #[default]
    Abort,
    /// Log a warning and use an empty 1x1 level instead
    Substitute,
}

/// Reported to the progress callback as a save runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveProgress {
    LevelPacked { level: usize },
    TilesetPacked { tileset: usize },
    ChunkPlaced {
        placement: Placement,
        done: usize,
        total: usize,
    },
    ExitsWritten { count: usize },
    MapClearWritten { bytes: usize },
    PalettesWritten,
}

/// Summary of a completed save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    /// Every chunk, in the order it was written
    pub placements: Vec<Placement>,
    pub bytes_used: usize,
    pub bytes_free: usize,
    /// Highest bank any chunk went into
    pub last_bank: u8,
}

#[derive(Debug, Clone)]
pub struct GameData {
    layout: RomLayout,
    levels: Vec<LevelData>,
    tilesets: Vec<Tileset>,
    map_clear: MapClearTable,
    palettes: Palettes,
    bank_tables: BankTables,
    chr_banks: Vec<ChrBank>,
    /// Non-level data changed since the last save
    dirty: bool,
    saving: bool,
}

impl GameData {
    pub fn open(rom: &RomFile, layout: RomLayout, policy: LoadPolicy) -> Result<Self> {
        layout.validate()?;
        rom.require_bank(layout.last_data_bank)?;

        let mut levels = Vec::with_capacity(NUM_LEVELS);
        let mut substituted = 0;
        for num in 0..NUM_LEVELS {
            match level::load_level(rom, &layout, num) {
                Ok(level) => levels.push(level),
                Err(e) if policy == LoadPolicy::Substitute => {
                    warn!("Level 0x{:03X} failed to load, using an empty level: {}", num, e);
                    substituted += 1;
                    levels.push(LevelData::empty());
                }
                Err(e) => return Err(e),
            }
        }

        let data = Self {
            tilesets: tileset::load_tilesets(rom, &layout)?,
            map_clear: mapclear::load_map_clear_data(rom, &layout)?,
            palettes: graphics::load_palettes(rom, &layout)?,
            bank_tables: graphics::load_bank_tables(rom, &layout)?,
            chr_banks: graphics::load_chr_banks(rom)?,
            levels,
            layout,
            dirty: false,
            saving: false,
        };
        info!(
            "Loaded {} levels ({} substituted), {} tilesets, {} CHR banks",
            data.levels.len(),
            substituted,
            data.tilesets.len(),
            data.chr_banks.len()
        );
        Ok(data)
    }

    pub fn layout(&self) -> &RomLayout {
        &self.layout
    }

    pub fn levels(&self) -> &[LevelData] {
        &self.levels
    }

    pub fn level(&self, num: usize) -> Result<&LevelData> {
        self.levels.get(num).ok_or(RomError::BadIndex {
            what: "level",
            index: num,
            count: NUM_LEVELS,
        })
    }

    pub fn tilesets(&self) -> &[Tileset] {
        &self.tilesets
    }

    pub fn tileset(&self, num: usize) -> Result<&Tileset> {
        self.tilesets.get(num).ok_or(RomError::BadIndex {
            what: "tileset",
            index: num,
            count: NUM_TILESETS,
        })
    }

    pub fn map_clear(&self) -> &MapClearTable {
        &self.map_clear
    }

    pub fn palettes(&self) -> &Palettes {
        &self.palettes
    }

    pub fn bank_tables(&self) -> &BankTables {
        &self.bank_tables
    }

    pub fn chr_banks(&self) -> &[ChrBank] {
        &self.chr_banks
    }

    /// CHR bank `n`, wrapping past the last bank.
    pub fn chr_bank(&self, n: usize) -> Option<&ChrBank> {
        if self.chr_banks.is_empty() {
            None
        } else {
            self.chr_banks.get(n % self.chr_banks.len())
        }
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    /// Whether anything has changed since the last save.
    pub fn is_modified(&self) -> bool {
        self.dirty || self.levels.iter().any(|l| l.modified_recently)
    }

    fn check_editable(&self) -> Result<()> {
        if self.saving {
            Err(RomError::SaveInProgress)
        } else {
            Ok(())
        }
    }

    /// Replaces level `num`.
    pub fn commit_level(&mut self, num: usize, mut level: LevelData) -> Result<()> {
        self.check_editable()?;
        self.level(num)?;
        level.validate(num)?;
        level.modified = true;
        level.modified_recently = true;
        debug!("Committed level 0x{:03X}", num);
        self.levels[num] = level;
        Ok(())
    }

    pub fn commit_tileset(&mut self, num: usize, tileset: Tileset) -> Result<()> {
        self.check_editable()?;
        self.tileset(num)?;
        tileset.to_bytes()?;
        self.tilesets[num] = tileset;
        self.dirty = true;
        Ok(())
    }

    pub fn commit_map_clear(&mut self, table: MapClearTable) -> Result<()> {
        self.check_editable()?;
        self.check_map_clear(&table)?;
        self.map_clear = table;
        self.dirty = true;
        Ok(())
    }

    pub fn commit_palettes(&mut self, palettes: Palettes) -> Result<()> {
        self.check_editable()?;
        palettes.validate()?;
        self.palettes = palettes;
        self.dirty = true;
        Ok(())
    }

    fn check_map_clear(&self, table: &MapClearTable) -> Result<usize> {
        let needed = table.encoded_size(&self.layout.map_widths)?;
        let available =
            (self.layout.map_clear_end.offset - self.layout.map_clear_data.offset) as usize;
        if needed > available {
            Err(RomError::MapClearTooLarge { needed, available })
        } else {
            Ok(needed)
        }
    }

    /// Repacks everything into `rom`.
    ///
    /// Editing is refused until this returns.  On error `rom` is left as
    /// it was.
    pub fn save(
        &mut self,
        rom: &mut RomFile,
        mut progress: Option<&mut dyn FnMut(SaveProgress)>,
    ) -> Result<SaveReport> {
        self.check_editable()?;
        self.saving = true;
        let mut report = |event: SaveProgress| {
            if let Some(cb) = progress.as_mut() {
                cb(event);
            }
        };
        let result = self.save_inner(rom, &mut report);
        self.saving = false;

        let report = result?;
        for level in &mut self.levels {
            level.modified_recently = false;
        }
        self.dirty = false;
        Ok(report)
    }

    fn save_inner(
        &self,
        rom: &mut RomFile,
        progress: &mut dyn FnMut(SaveProgress),
    ) -> Result<SaveReport> {
        let layout = &self.layout;
        rom.require_bank(layout.last_data_bank)?;

        let chunks = self.pack_all(progress)?;

        // Everything below must pass before the image is touched
        let exits: usize = self.levels.iter().map(|l| l.exits.len()).sum();
        if exits > layout.max_exits() {
            return Err(RomError::TooManyExits {
                count: exits,
                max: layout.max_exits(),
            });
        }
        self.check_map_clear(&self.map_clear)?;
        self.palettes.validate()?;
        let placements = chunk::allocate(&chunks, layout.data_start, layout.last_data_bank)?;

        let snapshot = rom.snapshot();
        if let Err(e) = self.write_all(rom, &chunks, &placements, progress) {
            warn!("Save failed, restoring ROM image: {}", e);
            rom.restore(snapshot);
            return Err(e);
        }

        let bytes_used: usize = chunks.iter().map(DataChunk::size).sum();
        let report = SaveReport {
            last_bank: placements
                .iter()
                .map(|p| p.addr.bank)
                .max()
                .unwrap_or(layout.data_start.bank),
            bytes_used,
            bytes_free: layout.free_space() - bytes_used,
            placements,
        };
        info!(
            "Saved {} chunks, {} bytes used, {} bytes free, last bank 0x{:02X}",
            report.placements.len(),
            report.bytes_used,
            report.bytes_free,
            report.last_bank
        );
        Ok(report)
    }

    fn pack_all(&self, progress: &mut dyn FnMut(SaveProgress)) -> Result<Vec<DataChunk>> {
        let mut chunks = Vec::with_capacity(self.levels.len() * 2 + self.tilesets.len() + 1);
        for (num, level) in self.levels.iter().enumerate() {
            level.validate(num)?;
            chunks.push(level::pack_level(level, num)?);
            chunks.push(level::pack_sprites(level, num)?);
            progress(SaveProgress::LevelPacked { level: num });
        }
        for (num, set) in self.tilesets.iter().enumerate() {
            chunks.push(tileset::pack_tileset(set, num)?);
            progress(SaveProgress::TilesetPacked { tileset: num });
        }
        chunks.push(DataChunk::new(
            ChunkKind::BankTables,
            0,
            &self.bank_tables.to_bytes(),
        )?);
        Ok(chunks)
    }

    fn write_all(
        &self,
        rom: &mut RomFile,
        chunks: &[DataChunk],
        placements: &[Placement],
        progress: &mut dyn FnMut(SaveProgress),
    ) -> Result<()> {
        let layout = &self.layout;
        for (done, placement) in placements.iter().enumerate() {
            let chunk = &chunks[placement.index];
            let addr = placement.addr;
            match chunk.kind {
                ChunkKind::LevelMap => {
                    level::save_level(rom, layout, chunk, &self.levels[chunk.owner], addr)?
                }
                ChunkKind::Sprites => level::save_sprites(rom, layout, chunk, addr)?,
                ChunkKind::Tileset => {
                    tileset::save_tileset(rom, layout, chunk, &self.tilesets[chunk.owner], addr)?
                }
                ChunkKind::BankTables => {
                    graphics::save_bank_tables(rom, layout, chunk.data(), addr)?
                }
            }
            progress(SaveProgress::ChunkPlaced {
                placement: *placement,
                done: done + 1,
                total: placements.len(),
            });
        }

        // Exit lists are written back to back from the start of the region
        rom.write_short_pointer(&layout.exits, 0, layout.exit_data_start())?;
        let mut end = layout.exit_data_start();
        for (num, level) in self.levels.iter().enumerate() {
            end = level::save_exits(rom, layout, level, num)?;
        }
        let count = (end.offset - layout.exit_data_start().offset) as usize / level::EXIT_RECORD_SIZE;
        progress(SaveProgress::ExitsWritten { count });

        let bytes = mapclear::save_map_clear_data(rom, layout, &self.map_clear)?;
        progress(SaveProgress::MapClearWritten { bytes });

        graphics::save_palettes(rom, layout, &self.palettes)?;
        progress(SaveProgress::PalettesWritten);
        Ok(())
    }
}
