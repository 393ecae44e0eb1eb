// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Compression codec used for level maps and tilesets.
//!
//! This is the HAL Laboratory scheme the game decompresses at runtime.  A
//! stream is a sequence of commands terminated by `0xFF`.  Each command
//! starts with a header byte:
//!
//! ```text
//! cccnnnnn             short form, length = n + 1 (1-32)
//! 111cccnn nnnnnnnn    long form, length = n + 1 (1-1024)
//! ```
//!
//! | cmd | operand      | output                                        |
//! |-----|--------------|-----------------------------------------------|
//! | 0   | `length` raw | the raw bytes                                 |
//! | 1   | byte         | byte repeated `length` times                  |
//! | 2   | 2 bytes      | the pair repeated `length` times              |
//! | 3   | byte         | byte, byte+1, ... (`length` bytes)            |
//! | 4   | offset (BE)  | copy of earlier output from `offset`          |
//! | 5   | offset (BE)  | as 4, with the bit order of each byte reversed |
//! | 6   | offset (BE)  | copy of earlier output running backwards      |

use std::collections::HashMap;

use crate::error::CodecError;

/// Largest buffer the codec handles, in either direction.
pub const DATA_SIZE: usize = 0x10000;

const END_OF_STREAM: u8 = 0xFF;
const SHORT_RUN: usize = 32;
const MAX_RUN: usize = 1024;

// How far back along a hash chain the packer looks for copies.
const MAX_CHAIN: usize = 64;

const CMD_RAW: u8 = 0;
const CMD_FILL: u8 = 1;
const CMD_WORD_FILL: u8 = 2;
const CMD_INCREMENT: u8 = 3;
const CMD_COPY: u8 = 4;
const CMD_COPY_REVERSED_BITS: u8 = 5;
const CMD_COPY_BACKWARDS: u8 = 6;

/// Worst case packed size for `len` input bytes.  The allocator may rely
/// on [`pack`] never exceeding this.
pub const fn max_packed_size(len: usize) -> usize {
    len + 2 * len.div_ceil(MAX_RUN) + 1
}

/// Decompresses a stream.  `src` may extend past the end of the stream;
/// everything after the terminator is ignored.
pub fn unpack(src: &[u8]) -> Result<Vec<u8>, CodecError> {
    Ok(unpack_with_len(src)?.0)
}

/// As [`unpack`], also returning the number of input bytes consumed
/// (including the terminator).
pub fn unpack_with_len(src: &[u8]) -> Result<(Vec<u8>, usize), CodecError> {
    let mut out: Vec<u8> = Vec::with_capacity(0x1000);
    let mut pos = 0;

    loop {
        let header = read(src, pos)?;
        pos += 1;
        if header == END_OF_STREAM {
            return Ok((out, pos));
        }

        let (mut command, length) = if header & 0xE0 == 0xE0 {
            let low = read(src, pos)?;
            pos += 1;
            (
                (header >> 2) & 0x07,
                ((((header & 0x03) as usize) << 8) | low as usize) + 1,
            )
        } else {
            (header >> 5, (header & 0x1F) as usize + 1)
        };
        // The game treats the (otherwise unused) long-form command 7 as a
        // plain copy.
        if command == 7 {
            command = CMD_COPY;
        }

        let produced = if command == CMD_WORD_FILL {
            length * 2
        } else {
            length
        };
        if out.len() + produced > DATA_SIZE {
            return Err(CodecError::OutputOverflow { max: DATA_SIZE });
        }

        match command {
            CMD_RAW => {
                let bytes = src
                    .get(pos..pos + length)
                    .ok_or(CodecError::Truncated(src.len()))?;
                out.extend_from_slice(bytes);
                pos += length;
            }
            CMD_FILL => {
                let byte = read(src, pos)?;
                pos += 1;
                out.resize(out.len() + length, byte);
            }
            CMD_WORD_FILL => {
                let first = read(src, pos)?;
                let second = read(src, pos + 1)?;
                pos += 2;
                for _ in 0..length {
                    out.push(first);
                    out.push(second);
                }
            }
            CMD_INCREMENT => {
                let start = read(src, pos)?;
                pos += 1;
                out.extend((0..length).map(|i| start.wrapping_add(i as u8)));
            }
            _ => {
                let offset = ((read(src, pos)? as usize) << 8) | read(src, pos + 1)? as usize;
                pos += 2;
                copy_from_output(&mut out, command, offset, length)?;
            }
        }
    }
}

fn read(src: &[u8], pos: usize) -> Result<u8, CodecError> {
    src.get(pos).copied().ok_or(CodecError::Truncated(pos))
}

fn copy_from_output(
    out: &mut Vec<u8>,
    command: u8,
    offset: usize,
    length: usize,
) -> Result<(), CodecError> {
    let produced = out.len();
    let bad = CodecError::BadReference {
        offset,
        length,
        produced,
    };

    match command {
        CMD_COPY | CMD_COPY_REVERSED_BITS => {
            // Copies may overlap the bytes they produce, so go one at a time
            if offset >= produced {
                return Err(bad);
            }
            for i in 0..length {
                let byte = out[offset + i];
                out.push(if command == CMD_COPY {
                    byte
                } else {
                    byte.reverse_bits()
                });
            }
        }
        _ => {
            if offset >= produced || offset + 1 < length {
                return Err(bad);
            }
            for i in 0..length {
                out.push(out[offset - i]);
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operand {
    Byte(u8),
    Word(u8, u8),
    Offset(u16),
}

impl Operand {
    fn len(&self) -> usize {
        match self {
            Operand::Byte(_) => 1,
            Operand::Word(..) | Operand::Offset(_) => 2,
        }
    }
}

// A command the packer could emit at the current position.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    command: u8,
    // Command length field (words for a word fill)
    length: usize,
    // Input bytes covered
    covers: usize,
    operand: Operand,
}

impl Candidate {
    fn cost(&self) -> usize {
        header_len(self.length) + self.operand.len()
    }

    fn saving(&self) -> isize {
        self.covers as isize - self.cost() as isize
    }
}

fn header_len(length: usize) -> usize {
    if length <= SHORT_RUN { 1 } else { 2 }
}

fn put_header(out: &mut Vec<u8>, command: u8, length: usize) {
    debug_assert!(length >= 1 && length <= MAX_RUN);
    let n = length - 1;
    if length <= SHORT_RUN {
        out.push((command << 5) | n as u8);
    } else {
        out.push(0xE0 | (command << 2) | (n >> 8) as u8);
        out.push((n & 0xFF) as u8);
    }
}

fn flush_raw(out: &mut Vec<u8>, raw: &mut Vec<u8>) {
    for run in raw.chunks(MAX_RUN) {
        put_header(out, CMD_RAW, run.len());
        out.extend_from_slice(run);
    }
    raw.clear();
}

fn key(a: u8, b: u8, c: u8) -> u32 {
    ((a as u32) << 16) | ((b as u32) << 8) | c as u32
}

// Earlier positions indexed by the three bytes a copy starting there
// would produce.
#[derive(Default)]
struct MatchIndex {
    forward: HashMap<u32, Vec<usize>>,
    backward: HashMap<u32, Vec<usize>>,
}

impl MatchIndex {
    fn insert(&mut self, src: &[u8], pos: usize) {
        if pos + 2 < src.len() {
            self.forward
                .entry(key(src[pos], src[pos + 1], src[pos + 2]))
                .or_default()
                .push(pos);
        }
        if pos >= 2 {
            self.backward
                .entry(key(src[pos], src[pos - 1], src[pos - 2]))
                .or_default()
                .push(pos);
        }
    }

    fn recent(map: &HashMap<u32, Vec<usize>>, k: u32) -> impl Iterator<Item = usize> + '_ {
        map.get(&k)
            .into_iter()
            .flat_map(|v| v.iter().rev().take(MAX_CHAIN).copied())
    }
}

fn best_candidate(src: &[u8], pos: usize, index: &MatchIndex) -> Option<Candidate> {
    let cap = (src.len() - pos).min(MAX_RUN);
    let first = src[pos];
    let mut best: Option<Candidate> = None;
    let mut consider = |cand: Candidate| {
        if cand.covers > 0 && best.is_none_or(|b| cand.saving() > b.saving()) {
            best = Some(cand);
        }
    };

    // Byte fill
    let run = src[pos..pos + cap].iter().take_while(|&&b| b == first).count();
    consider(Candidate {
        command: CMD_FILL,
        length: run,
        covers: run,
        operand: Operand::Byte(first),
    });

    // Incrementing run
    let run = (0..cap)
        .take_while(|&i| src[pos + i] == first.wrapping_add(i as u8))
        .count();
    consider(Candidate {
        command: CMD_INCREMENT,
        length: run,
        covers: run,
        operand: Operand::Byte(first),
    });

    // Word fill
    if pos + 1 < src.len() {
        let second = src[pos + 1];
        let words = (0..MAX_RUN)
            .take_while(|&k| {
                pos + 2 * k + 1 < src.len()
                    && src[pos + 2 * k] == first
                    && src[pos + 2 * k + 1] == second
            })
            .count();
        consider(Candidate {
            command: CMD_WORD_FILL,
            length: words,
            covers: words * 2,
            operand: Operand::Word(first, second),
        });
    }

    if pos + 2 < src.len() {
        let k = key(src[pos], src[pos + 1], src[pos + 2]);
        for start in MatchIndex::recent(&index.forward, k) {
            let run = (0..cap)
                .take_while(|&i| src[start + i] == src[pos + i])
                .count();
            consider(Candidate {
                command: CMD_COPY,
                length: run,
                covers: run,
                operand: Operand::Offset(start as u16),
            });
        }

        let k = key(
            src[pos].reverse_bits(),
            src[pos + 1].reverse_bits(),
            src[pos + 2].reverse_bits(),
        );
        for start in MatchIndex::recent(&index.forward, k) {
            let run = (0..cap)
                .take_while(|&i| src[start + i].reverse_bits() == src[pos + i])
                .count();
            consider(Candidate {
                command: CMD_COPY_REVERSED_BITS,
                length: run,
                covers: run,
                operand: Operand::Offset(start as u16),
            });
        }

        for start in MatchIndex::recent(&index.backward, k_plain(src, pos)) {
            let run = (0..cap.min(start + 1))
                .take_while(|&i| src[start - i] == src[pos + i])
                .count();
            consider(Candidate {
                command: CMD_COPY_BACKWARDS,
                length: run,
                covers: run,
                operand: Operand::Offset(start as u16),
            });
        }
    }

    best.filter(|b| b.saving() > 0)
}

fn k_plain(src: &[u8], pos: usize) -> u32 {
    key(src[pos], src[pos + 1], src[pos + 2])
}

/// Compresses `src` (at most [`DATA_SIZE`] bytes).  The output always
/// satisfies `unpack(pack(x)) == x` and is never longer than
/// [`max_packed_size`].
pub fn pack(src: &[u8]) -> Result<Vec<u8>, CodecError> {
    if src.len() > DATA_SIZE {
        return Err(CodecError::InputTooLarge {
            size: src.len(),
            max: DATA_SIZE,
        });
    }

    let mut out = Vec::with_capacity(max_packed_size(src.len()));
    let mut raw = Vec::new();
    let mut index = MatchIndex::default();
    let mut pos = 0;

    while pos < src.len() {
        match best_candidate(src, pos, &index) {
            Some(cand) => {
                flush_raw(&mut out, &mut raw);
                put_header(&mut out, cand.command, cand.length);
                match cand.operand {
                    Operand::Byte(b) => out.push(b),
                    Operand::Word(a, b) => out.extend_from_slice(&[a, b]),
                    Operand::Offset(o) => out.extend_from_slice(&o.to_be_bytes()),
                }
                for p in pos..pos + cand.covers {
                    index.insert(src, p);
                }
                pos += cand.covers;
            }
            None => {
                raw.push(src[pos]);
                index.insert(src, pos);
                pos += 1;
            }
        }
    }
    flush_raw(&mut out, &mut raw);
    out.push(END_OF_STREAM);

    // Breaking up literal runs can cost more than the copies save on
    // incompressible input, so fall back to plain literals.
    if out.len() > max_packed_size(src.len()) {
        out.clear();
        let mut raw = src.to_vec();
        flush_raw(&mut out, &mut raw);
        out.push(END_OF_STREAM);
    }

    Ok(out)
}
