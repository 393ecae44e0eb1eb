// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! In-memory access to an iNES ROM image by bank-relative address.

use deku::prelude::*;
use log::debug;
use static_assertions::const_assert_eq;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::address::{BANK_FLAG, BANK_MASK, BANK_SIZE, HEADER_SIZE, RomAddress};
use crate::codec::{self, DATA_SIZE};
use crate::error::{Result, RomError};
use crate::graphics::ChrBank;
use crate::layout::{LongPointerTable, ShortPointerTable};

/// Size of one CHR bank as counted by the loader (1KB).
pub const CHR_BANK_SIZE: usize = 0x400;

const INES_MAGIC: &[u8; 4] = b"NES\x1a";

const_assert_eq!(
    core::mem::size_of::<InesHeader>() + INES_MAGIC.len(),
    HEADER_SIZE
);

/// The 16 byte iNES header.
#[derive(Debug, Clone, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(magic = b"NES\x1a")]
pub struct InesHeader {
    /// PRG ROM size in 16KB units
    pub prg_16k: u8,
    /// CHR ROM size in 8KB units
    pub chr_8k: u8,
    pub flags6: u8,
    pub flags7: u8,
    pub padding: [u8; 8],
}

impl InesHeader {
    pub fn mapper(&self) -> u8 {
        (self.flags7 & 0xF0) | (self.flags6 >> 4)
    }
}

/// A ROM image held in memory.
///
/// All reads and writes go to the in-memory copy; nothing touches the disk
/// until [`RomFile::save`].
#[derive(Debug, Clone)]
pub struct RomFile {
    data: Vec<u8>,
    header: InesHeader,
    path: Option<PathBuf>,
}

impl RomFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|source| RomError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut rom = Self::from_bytes(data)?;
        rom.path = Some(path.to_path_buf());
        Ok(rom)
    }

    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let header = parse_header(&data)?;
        let rom = Self {
            data,
            header,
            path: None,
        };

        let needed = HEADER_SIZE + rom.num_prg_banks() * BANK_SIZE;
        if rom.data.len() < needed {
            return Err(RomError::BadHeader(format!(
                "header declares {} PRG banks but file is only {} bytes",
                rom.num_prg_banks(),
                rom.data.len()
            )));
        }

        debug!(
            "Loaded ROM: {} bytes, {} PRG banks, {} CHR banks, mapper {}",
            rom.data.len(),
            rom.num_prg_banks(),
            rom.num_chr_banks(),
            rom.header.mapper()
        );
        Ok(rom)
    }

    /// Writes the image to `path`.  The data goes to a temporary file in
    /// the same directory which then replaces the target.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let io_err = |source| RomError::Io {
            path: path.to_path_buf(),
            source,
        };
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(&self.data).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;

        debug!("Wrote {} bytes to {}", self.data.len(), path.display());
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn header(&self) -> &InesHeader {
        &self.header
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Number of 8KB PRG banks.
    pub fn num_prg_banks(&self) -> usize {
        self.header.prg_16k as usize * 2
    }

    /// Number of 1KB CHR banks.
    pub fn num_chr_banks(&self) -> usize {
        self.header.chr_8k as usize * 8
    }

    /// Fails unless the image has PRG banks up to and including `bank`.
    pub fn require_bank(&self, bank: u8) -> Result<()> {
        if (bank as usize) < self.num_prg_banks() {
            Ok(())
        } else {
            Err(RomError::RomTooSmall {
                found: self.num_prg_banks(),
                needed: bank,
            })
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<u8> {
        self.data.clone()
    }

    pub(crate) fn restore(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    fn span(&self, offset: usize, len: usize) -> Result<std::ops::Range<usize>> {
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(offset..end),
            _ => Err(RomError::OutOfBounds {
                offset,
                len,
                file_len: self.data.len(),
            }),
        }
    }

    /// Borrows `len` raw bytes at `addr`.
    pub fn read_bytes(&self, addr: RomAddress, len: usize) -> Result<&[u8]> {
        let range = self.span(addr.to_file_offset(), len)?;
        Ok(&self.data[range])
    }

    /// Reads `size` bytes at `addr` into `buf`, or if `size` is 0
    /// decompresses the block at `addr` into `buf`.
    ///
    /// Returns the number of bytes placed in `buf`.
    pub fn read_data(&self, addr: RomAddress, size: usize, buf: &mut [u8]) -> Result<usize> {
        if size == 0 {
            let offset = addr.to_file_offset();
            let range = self.span(offset, 0)?;
            let end = self.data.len().min(offset + DATA_SIZE);
            let (unpacked, _) =
                codec::unpack_with_len(&self.data[range.start..end]).map_err(|source| {
                    RomError::Codec {
                        addr: addr.to_string(),
                        source,
                    }
                })?;
            if unpacked.len() > buf.len() {
                return Err(RomError::Codec {
                    addr: addr.to_string(),
                    source: crate::error::CodecError::OutputOverflow { max: buf.len() },
                });
            }
            buf[..unpacked.len()].copy_from_slice(&unpacked);
            Ok(unpacked.len())
        } else {
            let src = self.read_bytes(addr, size)?;
            let len = size.min(buf.len());
            buf[..len].copy_from_slice(&src[..len]);
            Ok(len)
        }
    }

    /// Decompresses the block at `addr`.
    pub fn read_compressed(&self, addr: RomAddress) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; DATA_SIZE];
        let len = self.read_data(addr, 0, &mut buf)?;
        buf.truncate(len);
        Ok(buf)
    }

    pub fn read_byte(&self, addr: RomAddress) -> Result<u8> {
        Ok(self.read_bytes(addr, 1)?[0])
    }

    pub fn read_u16(&self, addr: RomAddress) -> Result<u16> {
        let b = self.read_bytes(addr, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&self, addr: RomAddress) -> Result<u32> {
        let b = self.read_bytes(addr, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Resolves entry `index` of a long pointer table.  The attribute bit
    /// of the bank byte is dropped.
    pub fn read_pointer(&self, table: &LongPointerTable, index: usize) -> Result<RomAddress> {
        let i = index as u32;
        let bank = self.read_byte(table.bank + i)? & BANK_MASK;
        let offset = (self.read_byte(table.high + i)? as u32) << 8 | self.read_byte(table.low + i)? as u32;
        Ok(RomAddress::new(bank, offset))
    }

    /// Whether the attribute bit is set in entry `index`'s bank byte.
    pub fn read_pointer_flag(&self, table: &LongPointerTable, index: usize) -> Result<bool> {
        Ok(self.read_byte(table.bank + index as u32)? & BANK_FLAG != 0)
    }

    pub fn read_short_pointer(&self, table: &ShortPointerTable, index: usize) -> Result<RomAddress> {
        let i = index as u32;
        let offset = (self.read_byte(table.high + i)? as u32) << 8 | self.read_byte(table.low + i)? as u32;
        Ok(RomAddress::new(table.bank, offset))
    }

    /// Reads through a long pointer.  `buf` is zeroed first; a null pointer
    /// leaves it alone and returns 0.
    pub fn read_from_pointer(
        &self,
        table: &LongPointerTable,
        index: usize,
        size: usize,
        buf: &mut [u8],
    ) -> Result<usize> {
        let addr = self.read_pointer(table, index)?;
        self.read_resolved(addr, size, buf)
    }

    pub fn read_from_short_pointer(
        &self,
        table: &ShortPointerTable,
        index: usize,
        size: usize,
        buf: &mut [u8],
    ) -> Result<usize> {
        let addr = self.read_short_pointer(table, index)?;
        self.read_resolved(addr, size, buf)
    }

    fn read_resolved(&self, addr: RomAddress, size: usize, buf: &mut [u8]) -> Result<usize> {
        if addr.is_null() {
            return Ok(0);
        }
        buf.fill(0);
        self.read_data(addr, size, buf)
    }

    /// Writes raw bytes.  The whole write must fit in the bank `addr` is
    /// in.
    pub fn write_bytes(&mut self, addr: RomAddress, data: &[u8]) -> Result<()> {
        if data.len() > addr.space_left() {
            return Err(RomError::BankOverflow {
                addr: addr.to_string(),
                len: data.len(),
            });
        }
        let range = self.span(addr.to_file_offset(), data.len())?;
        self.data[range].copy_from_slice(data);
        Ok(())
    }

    pub fn write_byte(&mut self, addr: RomAddress, value: u8) -> Result<()> {
        self.write_bytes(addr, &[value])
    }

    pub fn write_u16(&mut self, addr: RomAddress, value: u16) -> Result<()> {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    pub fn write_u32(&mut self, addr: RomAddress, value: u32) -> Result<()> {
        self.write_bytes(addr, &value.to_le_bytes())
    }

    /// Stores `addr` in entry `index` of a long pointer table.  The bank
    /// byte is written as given, attribute bit included.
    pub fn write_pointer(
        &mut self,
        table: &LongPointerTable,
        index: usize,
        addr: RomAddress,
    ) -> Result<()> {
        let i = index as u32;
        self.write_byte(table.low + i, addr.low())?;
        self.write_byte(table.high + i, addr.high())?;
        self.write_byte(table.bank + i, addr.bank)
    }

    pub fn write_short_pointer(
        &mut self,
        table: &ShortPointerTable,
        index: usize,
        addr: RomAddress,
    ) -> Result<()> {
        let i = index as u32;
        self.write_byte(table.low + i, addr.low())?;
        self.write_byte(table.high + i, addr.high())
    }

    /// Writes `data` at `addr` and points entry `index` of `table` at it.
    pub fn write_to_pointer(
        &mut self,
        table: &LongPointerTable,
        index: usize,
        addr: RomAddress,
        data: &[u8],
    ) -> Result<()> {
        self.write_bytes(addr, data)?;
        self.write_pointer(table, index, addr)
    }

    /// Decodes CHR bank `bank` (1KB, 64 tiles).
    pub fn read_chr_bank(&self, bank: usize) -> Result<ChrBank> {
        if bank >= self.num_chr_banks() {
            return Err(RomError::BadIndex {
                what: "CHR bank",
                index: bank,
                count: self.num_chr_banks(),
            });
        }
        let offset = HEADER_SIZE + self.num_prg_banks() * BANK_SIZE + bank * CHR_BANK_SIZE;
        let range = self.span(offset, CHR_BANK_SIZE)?;
        Ok(ChrBank::decode(&self.data[range]))
    }
}

fn parse_header(data: &[u8]) -> Result<InesHeader> {
    if data.len() < HEADER_SIZE {
        return Err(RomError::BadHeader(format!(
            "file is only {} bytes",
            data.len()
        )));
    }
    InesHeader::from_bytes((&data[..HEADER_SIZE], 0))
        .map(|(_, header)| header)
        .map_err(|e| RomError::BadHeader(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_rom::blank_rom;

    fn long_table() -> LongPointerTable {
        LongPointerTable {
            low: RomAddress::new(0x12, 0x8000),
            high: RomAddress::new(0x12, 0x8010),
            bank: RomAddress::new(0x12, 0x8020),
        }
    }

    fn short_table() -> ShortPointerTable {
        ShortPointerTable {
            low: RomAddress::new(0x12, 0x8100),
            high: RomAddress::new(0x12, 0x8110),
            bank: 0x12,
        }
    }

    #[test]
    fn test_header() {
        let rom = RomFile::from_bytes(blank_rom()).unwrap();
        assert_eq!(rom.num_prg_banks(), 128);
        assert_eq!(rom.num_chr_banks(), 128);
        assert_eq!(rom.header().mapper(), 4);
        rom.require_bank(0x7F).unwrap();
        assert!(matches!(
            rom.require_bank(0x80),
            Err(RomError::RomTooSmall { found: 128, .. })
        ));
    }

    #[test]
    fn test_bad_header() {
        let mut data = blank_rom();
        data[0] = b'X';
        assert!(matches!(RomFile::from_bytes(data), Err(RomError::BadHeader(_))));
        assert!(matches!(
            RomFile::from_bytes(vec![0; 8]),
            Err(RomError::BadHeader(_))
        ));
        let mut data = blank_rom();
        data.truncate(0x10000);
        assert!(matches!(RomFile::from_bytes(data), Err(RomError::BadHeader(_))));
    }

    #[test]
    fn test_scalar_reads_and_writes() {
        let mut rom = RomFile::from_bytes(blank_rom()).unwrap();
        let addr = RomAddress::new(0x20, 0xA100);
        rom.write_u32(addr, 0x1234_5678).unwrap();
        assert_eq!(rom.read_byte(addr).unwrap(), 0x78);
        assert_eq!(rom.read_u16(addr).unwrap(), 0x5678);
        assert_eq!(rom.read_u32(addr).unwrap(), 0x1234_5678);
        assert_eq!(rom.as_bytes()[addr.to_file_offset() + 3], 0x12);
    }

    #[test]
    fn test_write_refuses_bank_crossing() {
        let mut rom = RomFile::from_bytes(blank_rom()).unwrap();
        let addr = RomAddress::new(0x20, 0x1FFE);
        rom.write_bytes(addr, &[1, 2]).unwrap();
        assert!(matches!(
            rom.write_bytes(addr, &[1, 2, 3]),
            Err(RomError::BankOverflow { len: 3, .. })
        ));
        // Nothing spilled into the next bank
        assert_eq!(rom.read_byte(RomAddress::new(0x21, 0)).unwrap(), 0);
    }

    #[test]
    fn test_long_pointer_masks_flag() {
        let mut rom = RomFile::from_bytes(blank_rom()).unwrap();
        let table = long_table();
        rom.write_pointer(&table, 3, RomAddress::new(0x80 | 0x41, 0xA234))
            .unwrap();
        assert_eq!(rom.read_pointer(&table, 3).unwrap(), RomAddress::new(0x41, 0xA234));
        assert!(rom.read_pointer_flag(&table, 3).unwrap());
        assert!(!rom.read_pointer_flag(&table, 2).unwrap());
    }

    #[test]
    fn test_read_from_pointer_zero_fills() {
        let mut rom = RomFile::from_bytes(blank_rom()).unwrap();
        let table = long_table();
        rom.write_to_pointer(&table, 0, RomAddress::new(0x41, 0xA000), &[9, 8, 7])
            .unwrap();
        let mut buf = [0xEEu8; 6];
        assert_eq!(rom.read_from_pointer(&table, 0, 3, &mut buf).unwrap(), 3);
        assert_eq!(buf, [9, 8, 7, 0, 0, 0]);
    }

    #[test]
    fn test_null_pointer_reads_nothing() {
        let rom = RomFile::from_bytes(blank_rom()).unwrap();
        let mut buf = [0xEEu8; 4];
        assert_eq!(rom.read_from_short_pointer(&short_table(), 5, 4, &mut buf).unwrap(), 0);
        assert_eq!(buf, [0xEE; 4]);
    }

    #[test]
    fn test_compressed_read() {
        let mut rom = RomFile::from_bytes(blank_rom()).unwrap();
        let table = short_table();
        let raw: Vec<u8> = (0..300u32).map(|i| (i % 7) as u8).collect();
        let packed = codec::pack(&raw).unwrap();
        let addr = RomAddress::new(0x12, 0x9000);
        rom.write_bytes(addr, &packed).unwrap();
        rom.write_short_pointer(&table, 1, addr).unwrap();

        let mut buf = vec![0u8; DATA_SIZE];
        let len = rom.read_from_short_pointer(&table, 1, 0, &mut buf).unwrap();
        assert_eq!(&buf[..len], &raw[..]);
        assert_eq!(rom.read_compressed(addr).unwrap(), raw);

        let mut small = [0u8; 10];
        assert!(matches!(
            rom.read_data(addr, 0, &mut small),
            Err(RomError::Codec { .. })
        ));
    }

    #[test]
    fn test_out_of_bounds() {
        let mut data = blank_rom();
        // Header still claims the CHR banks that are no longer there
        data.truncate(HEADER_SIZE + 128 * BANK_SIZE);
        let rom = RomFile::from_bytes(data).unwrap();
        assert!(matches!(
            rom.read_chr_bank(0),
            Err(RomError::OutOfBounds { .. })
        ));
        let last = rom.as_bytes().len();
        assert!(matches!(
            rom.span(last - 1, 2),
            Err(RomError::OutOfBounds { len: 2, .. })
        ));
    }

    #[test]
    fn test_chr_bank_index() {
        let rom = RomFile::from_bytes(blank_rom()).unwrap();
        rom.read_chr_bank(0).unwrap();
        assert!(matches!(
            rom.read_chr_bank(rom.num_chr_banks()),
            Err(RomError::BadIndex { .. })
        ));
    }

    #[test]
    fn test_save_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kirby.nes");
        let mut rom = RomFile::from_bytes(blank_rom()).unwrap();
        rom.write_byte(RomAddress::new(0x30, 0x10), 0x5A).unwrap();
        rom.save(&path).unwrap();

        let reopened = RomFile::open(&path).unwrap();
        assert_eq!(reopened.path(), Some(path.as_path()));
        assert_eq!(reopened.read_byte(RomAddress::new(0x30, 0x10)).unwrap(), 0x5A);
        assert_eq!(reopened.as_bytes(), rom.as_bytes());
    }
}
