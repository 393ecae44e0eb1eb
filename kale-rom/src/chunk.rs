// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Data chunks and the bank packer.
//!
//! Every level map, sprite table and tileset, plus the CHR bank tables, is
//! stored as one chunk.  Chunks cannot span banks, so on save they are
//! packed into the free banks with a largest-first fit and the pointer
//! tables rewritten to match.

use log::trace;
use std::cmp::Ordering;
use std::fmt;

use crate::address::{BANK_SIZE, RomAddress};
use crate::codec;
use crate::error::{Result, RomError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChunkKind {
    LevelMap,
    Tileset,
    Sprites,
    BankTables,
}

impl ChunkKind {
    /// Level maps and tilesets are compressed, everything else is stored
    /// as is.
    pub const fn is_compressed(self) -> bool {
        matches!(self, ChunkKind::LevelMap | ChunkKind::Tileset)
    }
}

impl fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChunkKind::LevelMap => "level map",
            ChunkKind::Tileset => "tileset",
            ChunkKind::Sprites => "sprite",
            ChunkKind::BankTables => "bank table",
        };
        f.write_str(name)
    }
}

/// One unit of packing: an encoded (and, if the kind requires it,
/// compressed) payload plus the index of the entity it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataChunk {
    pub kind: ChunkKind,
    pub owner: usize,
    data: Vec<u8>,
}

impl DataChunk {
    /// Builds a chunk from raw entity bytes, compressing them if `kind` is
    /// a compressed kind.
    pub fn new(kind: ChunkKind, owner: usize, raw: &[u8]) -> Result<Self> {
        let data = if kind.is_compressed() {
            codec::pack(raw)?
        } else {
            raw.to_vec()
        };
        Ok(Self { kind, owner, data })
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl Ord for DataChunk {
    fn cmp(&self, other: &Self) -> Ordering {
        self.size()
            .cmp(&other.size())
            .then(self.owner.cmp(&other.owner))
            .then(self.kind.cmp(&other.kind))
    }
}

impl PartialOrd for DataChunk {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Where the packer put a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Index into the slice passed to [`allocate`]
    pub index: usize,
    pub kind: ChunkKind,
    pub owner: usize,
    pub size: usize,
    /// Bank and position in the bank (0-0x1FFF)
    pub addr: RomAddress,
}

impl Placement {
    pub fn end(&self) -> usize {
        self.addr.bank_offset() + self.size
    }
}

/// Bytes from `start` to the end of `last_bank`.
pub fn free_space(start: RomAddress, last_bank: u8) -> usize {
    let banks = (last_bank as usize + 1).saturating_sub(start.bank as usize);
    (banks * BANK_SIZE).saturating_sub(start.bank_offset())
}

/// Assigns every chunk an address between `start` and the end of
/// `last_bank`.  Nothing is written; the result is returned in placement
/// order.
///
/// Chunks are sorted by (size, owner).  Each step places the largest
/// pending chunk that fits in what is left of the current bank, and moves
/// to the next bank once even the smallest pending chunk would not fit.
pub fn allocate(chunks: &[DataChunk], start: RomAddress, last_bank: u8) -> Result<Vec<Placement>> {
    let needed: usize = chunks.iter().map(DataChunk::size).sum();
    let available = free_space(start, last_bank);
    if needed > available {
        return Err(RomError::OutOfSpace { needed, available });
    }

    let mut pending: Vec<usize> = (0..chunks.len()).collect();
    pending.sort_by(|&a, &b| chunks[a].cmp(&chunks[b]));

    if let Some(&largest) = pending.last() {
        let chunk = &chunks[largest];
        if chunk.size() > BANK_SIZE {
            return Err(RomError::ChunkTooLarge {
                kind: chunk.kind,
                owner: chunk.owner,
                size: chunk.size(),
            });
        }
    }

    let mut bank = start.bank;
    let mut used = start.bank_offset();
    let mut placements = Vec::with_capacity(chunks.len());

    while !pending.is_empty() {
        let left = BANK_SIZE - used;
        if let Some(pos) = pending.iter().rposition(|&i| chunks[i].size() <= left) {
            let index = pending.remove(pos);
            let chunk = &chunks[index];
            let addr = RomAddress::new(bank, used as u32);
            trace!(
                "{} chunk 0x{:03X} ({} bytes) -> {}",
                chunk.kind,
                chunk.owner,
                chunk.size(),
                addr
            );
            placements.push(Placement {
                index,
                kind: chunk.kind,
                owner: chunk.owner,
                size: chunk.size(),
                addr,
            });
            used += chunk.size();

            let smallest_fits = pending
                .first()
                .is_none_or(|&i| chunks[i].size() <= BANK_SIZE - used);
            if smallest_fits {
                continue;
            }
        }

        if pending.is_empty() {
            break;
        }
        if bank >= last_bank {
            // Report the chunk that could not be placed
            let chunk = &chunks[pending[pending.len() - 1]];
            return Err(RomError::AllocationFailed {
                kind: chunk.kind,
                owner: chunk.owner,
                size: chunk.size(),
            });
        }
        bank += 1;
        used = 0;
    }

    Ok(placements)
}
