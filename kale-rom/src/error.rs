// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Error types returned by `kale-rom`.

use std::path::PathBuf;
use thiserror::Error;

use crate::chunk::ChunkKind;

pub type Result<T, E = RomError> = std::result::Result<T, E>;

/// Failures from the compression codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("compressed stream ended unexpectedly at input byte {0}")]
    Truncated(usize),

    #[error("back-reference to 0x{offset:04X} (length {length}) outside the {produced} bytes produced")]
    BadReference {
        offset: usize,
        length: usize,
        produced: usize,
    },

    #[error("decompressed data exceeds {max} bytes")]
    OutputOverflow { max: usize },

    #[error("input of {size} bytes exceeds the {max} byte limit")]
    InputTooLarge { size: usize, max: usize },
}

#[derive(Debug, Error)]
pub enum RomError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid iNES header: {0}")]
    BadHeader(String),

    #[error("failed to parse {0}")]
    Parse(String),

    #[error("ROM has {found} PRG banks, but the layout needs bank 0x{needed:02X} - apply the map expansion patch first")]
    RomTooSmall { found: usize, needed: u8 },

    #[error("access of {len} bytes at file offset 0x{offset:06X} is outside the {file_len} byte ROM")]
    OutOfBounds {
        offset: usize,
        len: usize,
        file_len: usize,
    },

    #[error("write of {len} bytes at {addr} would cross a bank boundary")]
    BankOverflow { addr: String, len: usize },

    #[error("decompression failed at {addr}: {source}")]
    Codec {
        addr: String,
        #[source]
        source: CodecError,
    },

    #[error("compression failed: {0}")]
    Pack(#[from] CodecError),

    #[error("level 0x{level:03X} has an invalid size ({screens_h}x{screens_v} screens)")]
    InvalidLevelSize {
        level: usize,
        screens_h: u8,
        screens_v: u8,
    },

    #[error("level 0x{level:03X} has no map data")]
    MissingLevel { level: usize },

    #[error("level 0x{level:03X} exit pointers are out of order (0x{this:04X} then 0x{next:04X})")]
    BadExitPointers { level: usize, this: u32, next: u32 },

    #[error("{what} is out of range ({value}, maximum {max})")]
    OutOfRange {
        what: String,
        value: u32,
        max: u32,
    },

    #[error("index {index} is out of range for {what} (count {count})")]
    BadIndex {
        what: &'static str,
        index: usize,
        count: usize,
    },

    #[error("too many exits: {count} total, maximum is {max}")]
    TooManyExits { count: usize, max: usize },

    #[error("not enough free space: {needed} bytes needed, {available} bytes available")]
    OutOfSpace { needed: usize, available: usize },

    #[error("{kind} chunk for 0x{owner:03X} is {size} bytes, larger than a bank")]
    ChunkTooLarge {
        kind: ChunkKind,
        owner: usize,
        size: usize,
    },

    #[error("ran out of banks placing {kind} chunk for 0x{owner:03X} ({size} bytes)")]
    AllocationFailed {
        kind: ChunkKind,
        owner: usize,
        size: usize,
    },

    #[error("map clear data is {needed} bytes, only {available} bytes available")]
    MapClearTooLarge { needed: usize, available: usize },

    #[error("a save is in progress, editing is disabled")]
    SaveInProgress,

    #[error("invalid IPS patch: {0}")]
    BadPatch(String),

    #[error("invalid layout: {0}")]
    BadLayout(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RomError {
    /// Helper used when a value does not fit in its packed ROM field.
    pub(crate) fn range(what: impl Into<String>, value: u32, max: u32) -> Self {
        RomError::OutOfRange {
            what: what.into(),
            value,
            max,
        }
    }
}
