// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Course files: a single level exported as JSON, so it can be moved
//! between ROMs or slots.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Result, RomError};
use crate::level::{Exit, LevelData, LevelHeader, Sprite};

pub const COURSE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseFile {
    pub version: u32,
    pub header: LevelHeader,
    pub tileset: u8,
    #[serde(default)]
    pub no_return: bool,
    /// One row per tile row, each as wide as the level
    pub tiles: Vec<Vec<u8>>,
    #[serde(default)]
    pub sprites: Vec<Sprite>,
    #[serde(default)]
    pub exits: Vec<Exit>,
}

impl CourseFile {
    pub fn from_level(level: &LevelData) -> Self {
        Self {
            version: COURSE_VERSION,
            header: level.header,
            tileset: level.tileset,
            no_return: level.no_return,
            tiles: (0..level.header.height())
                .map(|y| level.row(y).to_vec())
                .collect(),
            sprites: level.sprites.clone(),
            exits: level.exits.clone(),
        }
    }

    /// Builds a level for slot `num`, checked the same way it would be on
    /// save.
    pub fn to_level(&self, num: usize) -> Result<LevelData> {
        if self.version != COURSE_VERSION {
            return Err(RomError::Parse(format!(
                "course file version {} (expected {})",
                self.version, COURSE_VERSION
            )));
        }
        self.header.validate(num)?;

        let (width, height) = (self.header.width(), self.header.height());
        if self.tiles.len() != height {
            return Err(RomError::Parse(format!(
                "course file has {} tile rows, level is {} tall",
                self.tiles.len(),
                height
            )));
        }

        let mut level = LevelData::new(self.header);
        for (y, row) in self.tiles.iter().enumerate() {
            if row.len() != width {
                return Err(RomError::Parse(format!(
                    "course file row {} has {} tiles, level is {} wide",
                    y,
                    row.len(),
                    width
                )));
            }
            for (x, &tile) in row.iter().enumerate() {
                level.set_tile(x, y, tile)?;
            }
        }
        level.tileset = self.tileset;
        level.no_return = self.no_return;
        level.sprites = self.sprites.clone();
        level.exits = self.exits.clone();

        level.validate(num)?;
        Ok(level)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| RomError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?).map_err(|source| RomError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
