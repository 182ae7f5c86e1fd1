/*! Reader for OLE Compound File Binary Format containers.

The OLE CF format (also known as Compound File Binary Format or CFBF) is a
container format used by many Microsoft file formats including DOC, XLS, PPT,
and MSI. McAfee quarantine files are compound files too, and this module
implements just enough of the format for listing the streams in a file and
reading their content.

Read more about the Compound File Binary File format here:
  https://learn.microsoft.com/en-us/openspecs/windows_protocols/ms-cfb/53989ce4-7b05-4f8d-829b-d08d6148375b
*/

use indexmap::IndexMap;
use nom::{
    bytes::complete::take,
    combinator::verify,
    multi::count,
    number::complete::{le_u16, le_u32},
    sequence::tuple,
    IResult,
};
use thiserror::Error;

use crate::assembler::StreamSource;

#[cfg(test)]
mod tests;

const OLECF_SIGNATURE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const BYTE_ORDER_MARK: u16 = 0xFFFE;
const HEADER_DIFAT_ENTRIES: usize = 109;
const DIRECTORY_ENTRY_SIZE: usize = 128;

// Directory entry types
const STREAM_TYPE: u8 = 2;
const ROOT_STORAGE_TYPE: u8 = 5;

// Special sectors
const ENDOFCHAIN: u32 = 0xFFFFFFFE;
const MAX_REGULAR_SECTOR: u32 = 0xFFFFFFFA;

/// Error returned when a compound file can't be parsed, or when some of
/// its streams can't be read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CompoundFileError {
    /// The data doesn't start with the compound file signature.
    #[error("not an OLE compound file")]
    InvalidSignature,
    /// The header is truncated or has an invalid byte order mark.
    #[error("malformed compound file header")]
    InvalidHeader,
    /// The sector size is neither 512 nor 4096 bytes.
    #[error("unsupported sector shift: {0}")]
    UnsupportedSectorShift(u16),
    /// The directory doesn't contain any entry.
    #[error("the directory is empty")]
    EmptyDirectory,
    /// Some sector lies beyond the end of the file.
    #[error("sector {0} is out of bounds")]
    SectorOutOfBounds(u32),
    /// A sector chain is longer than the file itself, which means that the
    /// allocation table contains a loop.
    #[error("sector chain starting at {0} is circular")]
    CircularChain(u32),
    /// The requested stream doesn't exist.
    #[error("stream `{0}` not found")]
    StreamNotFound(String),
    /// The sector chain of the stream ends before reaching its size.
    #[error("stream `{name}` is truncated: expected {expected} bytes, got {actual}")]
    TruncatedStream {
        /// Stream name.
        name: String,
        /// Size declared in the directory entry.
        expected: u64,
        /// Number of bytes actually read.
        actual: u64,
    },
}

/// Fields of the compound file header that the reader needs.
struct Header {
    byte_order: u16,
    sector_shift: u16,
    mini_sector_shift: u16,
    first_dir_sector: u32,
    mini_stream_cutoff: u32,
    first_mini_fat_sector: u32,
    num_mini_fat_sectors: u32,
    first_difat_sector: u32,
    num_difat_sectors: u32,
    difat: Vec<u32>,
}

struct DirectoryEntry {
    size: u64,
    start_sector: u32,
}

/// A parsed OLE compound file.
///
/// The file content is borrowed, streams are read on demand.
///
/// ```
/// # use bup_summary::olecf::{CompoundFile, CompoundFileError};
/// assert!(matches!(
///     CompoundFile::parse(b"not a compound file"),
///     Err(CompoundFileError::InvalidSignature)
/// ));
/// ```
pub struct CompoundFile<'a> {
    data: &'a [u8],
    sector_size: usize,
    mini_sector_size: usize,
    mini_stream_cutoff: u64,
    fat_sectors: Vec<u32>,
    mini_fat_sectors: Vec<u32>,
    streams: IndexMap<String, DirectoryEntry>,
    // Content of the mini stream, read once while parsing. A broken mini
    // stream only affects the small streams stored in it.
    mini_stream: Result<Vec<u8>, CompoundFileError>,
}

impl<'a> CompoundFile<'a> {
    /// Parses the header and the directory of a compound file.
    pub fn parse(data: &'a [u8]) -> Result<Self, CompoundFileError> {
        if !data.starts_with(OLECF_SIGNATURE) {
            return Err(CompoundFileError::InvalidSignature);
        }

        let header = match parse_header(data) {
            Ok((_rest, header)) => header,
            Err(_) => return Err(CompoundFileError::InvalidHeader),
        };

        if header.byte_order != BYTE_ORDER_MARK {
            return Err(CompoundFileError::InvalidHeader);
        }

        // Version 3 files use 512-byte sectors, version 4 files use
        // 4096-byte sectors.
        if header.sector_shift != 9 && header.sector_shift != 12 {
            return Err(CompoundFileError::UnsupportedSectorShift(
                header.sector_shift,
            ));
        }

        if header.mini_sector_shift >= header.sector_shift {
            return Err(CompoundFileError::InvalidHeader);
        }

        let mut file = CompoundFile {
            data,
            sector_size: 1 << header.sector_shift,
            mini_sector_size: 1 << header.mini_sector_shift,
            mini_stream_cutoff: header.mini_stream_cutoff as u64,
            fat_sectors: Vec::new(),
            mini_fat_sectors: Vec::new(),
            streams: IndexMap::new(),
            mini_stream: Ok(Vec::new()),
        };

        file.load_fat(&header)?;

        if header.num_mini_fat_sectors > 0
            && header.first_mini_fat_sector < MAX_REGULAR_SECTOR
        {
            file.mini_fat_sectors =
                file.follow_chain(header.first_mini_fat_sector)?;
        }

        let root =
            file.load_directory(header.first_dir_sector, header.sector_shift)?;

        if let Some(root) = root {
            file.mini_stream =
                file.regular_stream_data(root.start_sector, root.size);
        }

        Ok(file)
    }

    /// Returns the names of the streams in the file, in directory order.
    pub fn stream_names(&self) -> Vec<String> {
        self.streams.keys().cloned().collect()
    }

    /// Returns the size of the stream with the given name.
    pub fn stream_size(&self, name: &str) -> Result<u64, CompoundFileError> {
        self.streams
            .get(name)
            .map(|entry| entry.size)
            .ok_or_else(|| CompoundFileError::StreamNotFound(name.to_string()))
    }

    /// Reads the content of the stream with the given name.
    pub fn stream_data(
        &self,
        name: &str,
    ) -> Result<Vec<u8>, CompoundFileError> {
        let entry = self.streams.get(name).ok_or_else(|| {
            CompoundFileError::StreamNotFound(name.to_string())
        })?;

        let data = if entry.size < self.mini_stream_cutoff {
            self.mini_stream_data(entry.start_sector, entry.size)?
        } else {
            self.regular_stream_data(entry.start_sector, entry.size)?
        };

        if data.len() as u64 != entry.size {
            return Err(CompoundFileError::TruncatedStream {
                name: name.to_string(),
                expected: entry.size,
                actual: data.len() as u64,
            });
        }

        Ok(data)
    }

    /// Collects the sectors that contain the FAT. The first 109 of them are
    /// listed in the header, the rest are listed in the DIFAT chain.
    fn load_fat(&mut self, header: &Header) -> Result<(), CompoundFileError> {
        self.fat_sectors.extend(
            header.difat.iter().copied().filter(|&s| s < MAX_REGULAR_SECTOR),
        );

        let entries_per_sector = self.sector_size / 4;
        let max_len = self.data.len() / self.sector_size + 1;
        let mut current = header.first_difat_sector;
        let mut visited = 0;

        while current < MAX_REGULAR_SECTOR
            && visited < header.num_difat_sectors
        {
            if visited as usize >= max_len {
                return Err(CompoundFileError::CircularChain(
                    header.first_difat_sector,
                ));
            }
            let sector = self.sector_data(current)?;
            // The last entry in a DIFAT sector points to the next one.
            for i in 0..entries_per_sector - 1 {
                let fat_sector = parse_u32_at(sector, i * 4)
                    .ok_or(CompoundFileError::SectorOutOfBounds(current))?;
                if fat_sector < MAX_REGULAR_SECTOR {
                    self.fat_sectors.push(fat_sector);
                }
            }
            current = parse_u32_at(sector, (entries_per_sector - 1) * 4)
                .ok_or(CompoundFileError::SectorOutOfBounds(current))?;
            visited += 1;
        }

        Ok(())
    }

    /// Loads the stream entries and returns the root entry, which tells
    /// where the mini stream is.
    fn load_directory(
        &mut self,
        first_dir_sector: u32,
        sector_shift: u16,
    ) -> Result<Option<DirectoryEntry>, CompoundFileError> {
        if first_dir_sector >= MAX_REGULAR_SECTOR {
            return Err(CompoundFileError::EmptyDirectory);
        }

        let mut num_entries = 0;
        let mut root = None;

        for sector in self.follow_chain(first_dir_sector)? {
            let sector_data = self.sector_data(sector)?;
            for raw_entry in sector_data.chunks_exact(DIRECTORY_ENTRY_SIZE) {
                let Some((name, entry_type, entry)) =
                    parse_directory_entry(raw_entry, sector_shift)
                else {
                    continue;
                };
                num_entries += 1;
                match entry_type {
                    ROOT_STORAGE_TYPE => {
                        root = Some(entry);
                    }
                    STREAM_TYPE => {
                        self.streams.insert(name, entry);
                    }
                    _ => {}
                }
            }
        }

        if num_entries == 0 {
            return Err(CompoundFileError::EmptyDirectory);
        }

        Ok(root)
    }

    fn sector_offset(&self, sector: u32) -> Option<usize> {
        // The header occupies the space of the first sector, so sector 0
        // starts right after it.
        (sector as usize).checked_add(1)?.checked_mul(self.sector_size)
    }

    /// Returns the content of a sector. The last sector in the file can be
    /// shorter than the sector size.
    fn sector_data(&self, sector: u32) -> Result<&'a [u8], CompoundFileError> {
        let offset = self
            .sector_offset(sector)
            .filter(|offset| *offset < self.data.len())
            .ok_or(CompoundFileError::SectorOutOfBounds(sector))?;
        let end = offset.saturating_add(self.sector_size).min(self.data.len());
        Ok(&self.data[offset..end])
    }

    fn fat_entry(&self, sector: u32) -> Result<u32, CompoundFileError> {
        let entries_per_sector = self.sector_size / 4;
        let fat_sector = self
            .fat_sectors
            .get(sector as usize / entries_per_sector)
            .ok_or(CompoundFileError::SectorOutOfBounds(sector))?;
        let fat = self.sector_data(*fat_sector)?;
        parse_u32_at(fat, (sector as usize % entries_per_sector) * 4)
            .ok_or(CompoundFileError::SectorOutOfBounds(*fat_sector))
    }

    fn mini_fat_entry(&self, mini_sector: u32) -> Result<u32, CompoundFileError> {
        let entries_per_sector = self.sector_size / 4;
        let Some(sector) = self
            .mini_fat_sectors
            .get(mini_sector as usize / entries_per_sector)
        else {
            return Ok(ENDOFCHAIN);
        };
        let mini_fat = self.sector_data(*sector)?;
        parse_u32_at(mini_fat, (mini_sector as usize % entries_per_sector) * 4)
            .ok_or(CompoundFileError::SectorOutOfBounds(*sector))
    }

    /// Returns the sectors in the chain that starts at `start_sector`.
    fn follow_chain(
        &self,
        start_sector: u32,
    ) -> Result<Vec<u32>, CompoundFileError> {
        let max_len = self.data.len() / self.sector_size + 1;
        let mut chain = Vec::new();
        let mut current = start_sector;

        while current < MAX_REGULAR_SECTOR {
            if chain.len() >= max_len {
                return Err(CompoundFileError::CircularChain(start_sector));
            }
            chain.push(current);
            current = self.fat_entry(current)?;
        }

        Ok(chain)
    }

    fn regular_stream_data(
        &self,
        start_sector: u32,
        size: u64,
    ) -> Result<Vec<u8>, CompoundFileError> {
        let size = size as usize;
        let max_len = self.data.len() / self.sector_size + 1;
        let mut data = Vec::with_capacity(size.min(self.data.len()));
        let mut current = start_sector;
        let mut visited = 0;

        while current < MAX_REGULAR_SECTOR && data.len() < size {
            if visited >= max_len {
                return Err(CompoundFileError::CircularChain(start_sector));
            }
            let sector = self.sector_data(current)?;
            let bytes_to_read = sector.len().min(size - data.len());
            data.extend_from_slice(&sector[..bytes_to_read]);
            if data.len() < size {
                current = self.fat_entry(current)?;
            }
            visited += 1;
        }

        Ok(data)
    }

    fn mini_stream_data(
        &self,
        start_mini_sector: u32,
        size: u64,
    ) -> Result<Vec<u8>, CompoundFileError> {
        let size = size as usize;
        let mini_stream = self.mini_stream.as_ref().map_err(Clone::clone)?;

        let max_len = mini_stream.len() / self.mini_sector_size + 1;
        let mut data = Vec::with_capacity(size.min(mini_stream.len()));
        let mut current = start_mini_sector;
        let mut visited = 0;

        while current < MAX_REGULAR_SECTOR && data.len() < size {
            if visited >= max_len {
                return Err(CompoundFileError::CircularChain(start_mini_sector));
            }
            let offset = current as usize * self.mini_sector_size;
            if offset >= mini_stream.len() {
                return Err(CompoundFileError::SectorOutOfBounds(current));
            }
            let bytes_to_read = self
                .mini_sector_size
                .min(size - data.len())
                .min(mini_stream.len() - offset);
            data.extend_from_slice(&mini_stream[offset..offset + bytes_to_read]);
            if data.len() < size {
                current = self.mini_fat_entry(current)?;
            }
            visited += 1;
        }

        Ok(data)
    }
}

impl StreamSource for CompoundFile<'_> {
    type Error = CompoundFileError;

    fn stream_names(&self) -> Vec<String> {
        CompoundFile::stream_names(self)
    }

    fn stream_size(&self, name: &str) -> Result<u64, Self::Error> {
        CompoundFile::stream_size(self, name)
    }

    fn read_stream(&self, name: &str) -> Result<Vec<u8>, Self::Error> {
        self.stream_data(name)
    }
}

fn parse_header(input: &[u8]) -> IResult<&[u8], Header> {
    let (
        input,
        (
            _signature,
            _clsid,
            _minor_version,
            _major_version,
            byte_order,
            sector_shift,
            mini_sector_shift,
            _reserved,
            _num_dir_sectors,
            _num_fat_sectors,
            first_dir_sector,
            _transaction_signature,
            mini_stream_cutoff,
            first_mini_fat_sector,
            num_mini_fat_sectors,
            first_difat_sector,
            num_difat_sectors,
        ),
    ) = tuple((
        verify(take(8_usize), |sig: &[u8]| sig == OLECF_SIGNATURE),
        take(16_usize), // CLSID, always zero
        le_u16,         // minor version
        le_u16,         // major version
        le_u16,         // byte order
        le_u16,         // sector shift
        le_u16,         // mini sector shift
        take(6_usize),  // reserved
        le_u32,         // number of directory sectors
        le_u32,         // number of FAT sectors
        le_u32,         // first directory sector
        le_u32,         // transaction signature
        le_u32,         // mini stream cutoff size
        le_u32,         // first mini FAT sector
        le_u32,         // number of mini FAT sectors
        le_u32,         // first DIFAT sector
        le_u32,         // number of DIFAT sectors
    ))(input)?;

    let (input, difat) = count(le_u32, HEADER_DIFAT_ENTRIES)(input)?;

    Ok((
        input,
        Header {
            byte_order,
            sector_shift,
            mini_sector_shift,
            first_dir_sector,
            mini_stream_cutoff,
            first_mini_fat_sector,
            num_mini_fat_sectors,
            first_difat_sector,
            num_difat_sectors,
            difat,
        },
    ))
}

/// Parses a 128-byte directory entry. Returns `None` for unused entries and
/// entries with an invalid name.
fn parse_directory_entry(
    raw: &[u8],
    sector_shift: u16,
) -> Option<(String, u8, DirectoryEntry)> {
    let name_len = parse_u16_at(raw, 64)? as usize;
    let entry_type = *raw.get(66)?;

    if entry_type == 0 || !(2..=64).contains(&name_len) {
        return None;
    }

    // The name is UTF-16LE, `name_len` includes the null terminator.
    let name_units: Vec<u16> = raw[..name_len]
        .chunks_exact(2)
        .map(|unit| u16::from_le_bytes([unit[0], unit[1]]))
        .take_while(|unit| *unit != 0)
        .collect();

    let start_sector = parse_u32_at(raw, 116)?;

    // In version 3 files the most significant 32 bits of the stream size
    // may contain garbage and must be ignored.
    let size_low = parse_u32_at(raw, 120)? as u64;
    let size = if sector_shift == 9 {
        size_low
    } else {
        size_low | ((parse_u32_at(raw, 124)? as u64) << 32)
    };

    Some((
        String::from_utf16_lossy(&name_units),
        entry_type,
        DirectoryEntry { size, start_sector },
    ))
}

fn parse_u16_at(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset.checked_add(2)?)?;
    le_u16::<&[u8], nom::error::Error<&[u8]>>(bytes).ok().map(|(_, v)| v)
}

fn parse_u32_at(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    le_u32::<&[u8], nom::error::Error<&[u8]>>(bytes).ok().map(|(_, v)| v)
}
