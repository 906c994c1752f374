//! OLE Compound File Binary (CFB) reader.
//! Legacy Excel workbooks (.xls) and encrypted Office files are stored as a
//! small file system of named streams inside one CFB container.

use crate::error::Sheet2SqlError;
use crate::helpers::string::to_u16;
use crate::helpers::string::to_u64;
use crate::helpers::string::to_usize;
use crate::helpers::string::to_usize_iter;
use encoding_rs::UTF_16LE;
use std::borrow::Cow;
use std::collections::HashMap;
use thiserror::Error;

const HEADER_SIZE: usize = 512;
const SIGNATURE: u64 = 0xE11A_B1A1_E011_CFD0;
/// Sector ids at or above this value are markers (end of chain, free...)
const MAX_REG_SECT: usize = 0xFFFF_FFFB;
const MINI_SECTOR_SIZE: usize = 64;
/// Streams smaller than this live in the mini stream
const MINI_STREAM_CUTOFF: u64 = 4096;
const DIRECTORY_ENTRY_SIZE: usize = 128;
/// Object type of an unallocated directory entry
const UNALLOCATED: u8 = 0;

/// Errors specific to Compound File Binary format parsing
#[derive(Error, Debug)]
pub enum CfbError {
    #[error("The file is corrupted or has an invalid compound file structure")]
    FileFormatError,

    #[error("Invalid compound file signature")]
    SignatureError,

    #[error("Invalid sector size '2 ^ {1}' for major version '{0}'")]
    SectorSizeError(u16, u16),

    #[error("Sector {0} lies outside the compound file")]
    SectorError(usize),

    #[error("Broken or cyclic sector chain starting at sector {0}")]
    SectorChainError(usize),

    #[error("The number of double indirect file allocation table sectors is wrong: expect '{0}', actual '{1}'")]
    DoubleIndirectFileAllocationTableError(usize, usize),

    #[error("The number of file allocation table sectors is wrong: expect '{0}', actual '{1}'")]
    FileAllocationTableError(usize, usize),

    #[error("Empty root directory")]
    RootDirectoryError,
}

/// A parsed compound file, borrowing the bytes it was read from.
pub(crate) struct Cfb<'a> {
    /// Stream name -> directory entry
    directories: HashMap<String, Directory>,
    file_allocation_table: Vec<usize>,
    sectors: Sectors<'a>,
    mini_file_allocation_table: Vec<usize>,
    mini_sectors: Sectors<'a>,
}

impl<'a> Cfb<'a> {
    /// Parses the header, allocation tables and directory.
    pub(crate) fn new(data: &'a [u8]) -> Result<Cfb<'a>, Sheet2SqlError> {
        if data.len() < HEADER_SIZE {
            Err(CfbError::FileFormatError)?
        }
        let header = Header::new(&data[..HEADER_SIZE])?;
        let size = header.sector_size()?;
        // The header occupies the first sector
        let sectors = Sectors {
            data: Cow::Borrowed(data),
            offset: size,
            size,
        };
        let file_allocation_table = load_file_allocation_table(&sectors, &header)?;
        let directories = load_directories(&file_allocation_table, &sectors, &header)?;
        let mini_file_allocation_table = if header.mini_file_allocation_table_sector_count > 0 {
            let bytes = read_chain(&file_allocation_table, &sectors, header.mini_file_allocation_table_sector_shift)?;
            to_usize_iter(&bytes).collect()
        } else {
            Vec::new()
        };
        let mini_data = match directories.get("Root Entry") {
            Some(root) => {
                let mut data = read_chain(&file_allocation_table, &sectors, root.index)?;
                data.truncate(root.len());
                data
            }
            None => Vec::new(),
        };

        Ok(Cfb {
            directories,
            file_allocation_table,
            sectors,
            mini_file_allocation_table,
            mini_sectors: Sectors {
                data: Cow::Owned(mini_data),
                offset: 0,
                size: MINI_SECTOR_SIZE,
            },
        })
    }

    /// Checks if a stream exists.
    pub(crate) fn exists(&self, name: &str) -> bool {
        self.directories.contains_key(name)
    }

    /// Reads a whole stream, or None when there is no stream by that name.
    pub(crate) fn read(&self, name: &str) -> Result<Option<Vec<u8>>, Sheet2SqlError> {
        match self.directories.get(name) {
            Some(directory) => {
                let mut bytes = if directory.count < MINI_STREAM_CUTOFF {
                    read_chain(&self.mini_file_allocation_table, &self.mini_sectors, directory.index)?
                } else {
                    read_chain(&self.file_allocation_table, &self.sectors, directory.index)?
                };
                bytes.truncate(directory.len());
                Ok(Some(bytes))
            }
            None => Ok(None),
        }
    }
}

/// Collects the file allocation table from the sectors the double indirect
/// table (DIFAT) lists: 109 entries in the header, the rest in a sector chain.
fn load_file_allocation_table(sectors: &Sectors, header: &Header) -> Result<Vec<usize>, Sheet2SqlError> {
    let mut double_indirect_file_allocation_table: Vec<usize> = to_usize_iter(&sectors.data[76..HEADER_SIZE]).collect();

    let mut count = 0usize;
    let mut index = header.double_indirect_file_allocation_table_shift;
    while index < MAX_REG_SECT {
        if count >= sectors.count() {
            Err(CfbError::SectorChainError(header.double_indirect_file_allocation_table_shift))?
        }
        let mut entries: Vec<usize> = to_usize_iter(sectors.get(index)?).collect();
        // The last entry links to the next DIFAT sector
        index = entries.pop().unwrap_or(MAX_REG_SECT);
        double_indirect_file_allocation_table.extend(entries);
        count += 1;
    }
    if count != header.double_indirect_file_allocation_table_count {
        Err(CfbError::DoubleIndirectFileAllocationTableError(
            header.double_indirect_file_allocation_table_count,
            count,
        ))?
    }

    let mut file_allocation_table = Vec::<usize>::new();
    let mut count = 0usize;
    for index in double_indirect_file_allocation_table.into_iter().filter(|index| *index < MAX_REG_SECT) {
        file_allocation_table.extend(to_usize_iter(sectors.get(index)?));
        count += 1;
    }
    if count != header.file_allocation_table_count {
        Err(CfbError::FileAllocationTableError(header.file_allocation_table_count, count))?
    }
    Ok(file_allocation_table)
}

fn load_directories(file_allocation_table: &[usize], sectors: &Sectors, header: &Header) -> Result<HashMap<String, Directory>, Sheet2SqlError> {
    let bytes = read_chain(file_allocation_table, sectors, header.directory_shift)?;
    let directories: HashMap<String, Directory> = bytes
        .chunks_exact(DIRECTORY_ENTRY_SIZE)
        .filter(|entry| entry[66] != UNALLOCATED)
        .map(|entry| Directory::new(entry, header.major_version))
        .collect();
    if directories.is_empty() {
        Err(CfbError::RootDirectoryError)?
    }
    Ok(directories)
}

/// Concatenates the sectors of a chain. A chain longer than the table has
/// entries must loop, and is rejected.
fn read_chain(file_allocation_table: &[usize], sectors: &Sectors, start: usize) -> Result<Vec<u8>, Sheet2SqlError> {
    let mut content = Vec::<u8>::new();
    let mut index = start;
    let mut length = 0usize;
    while index < MAX_REG_SECT {
        length += 1;
        if length > file_allocation_table.len() {
            Err(CfbError::SectorChainError(start))?
        }
        content.extend_from_slice(sectors.get(index)?);
        index = *file_allocation_table.get(index).ok_or(CfbError::SectorChainError(start))?;
    }
    Ok(content)
}

/// Fixed-size sectors laid out after `offset` bytes.
struct Sectors<'a> {
    data: Cow<'a, [u8]>,
    offset: usize,
    size: usize,
}

impl Sectors<'_> {
    /// Gets the bytes of one sector; the last sector may be short.
    fn get(&self, index: usize) -> Result<&[u8], Sheet2SqlError> {
        let source = index
            .checked_mul(self.size)
            .and_then(|start| start.checked_add(self.offset))
            .filter(|start| *start < self.data.len())
            .ok_or(CfbError::SectorError(index))?;
        let target = self.data.len().min(source + self.size);
        Ok(&self.data[source..target])
    }

    /// Number of (possibly partial) sectors.
    fn count(&self) -> usize {
        self.data.len().saturating_sub(self.offset).div_ceil(self.size)
    }
}

#[derive(Debug)]
struct Header {
    major_version: u16,
    sector_shift: u16,
    file_allocation_table_count: usize,
    directory_shift: usize,
    mini_file_allocation_table_sector_shift: usize,
    mini_file_allocation_table_sector_count: usize,
    double_indirect_file_allocation_table_shift: usize,
    double_indirect_file_allocation_table_count: usize,
}

impl Header {
    /// Parses the first 512 bytes of the file.
    fn new(data: &[u8]) -> Result<Self, Sheet2SqlError> {
        if to_u64(&data[0..8]) != SIGNATURE {
            Err(CfbError::SignatureError)?
        }
        Ok(Header {
            major_version: to_u16(&data[26..28]),
            sector_shift: to_u16(&data[30..32]),
            file_allocation_table_count: to_usize(&data[44..48]),
            directory_shift: to_usize(&data[48..52]),
            mini_file_allocation_table_sector_shift: to_usize(&data[60..64]),
            mini_file_allocation_table_sector_count: to_usize(&data[64..68]),
            double_indirect_file_allocation_table_shift: to_usize(&data[68..72]),
            double_indirect_file_allocation_table_count: to_usize(&data[72..76]),
        })
    }

    fn sector_size(&self) -> Result<usize, Sheet2SqlError> {
        match (self.major_version, self.sector_shift) {
            (3, 9) => Ok(512),
            // Version 4 pads the header with zeroes up to a full sector
            (4, 12) => Ok(4096),
            (version, shift) => Err(CfbError::SectorSizeError(version, shift).into()),
        }
    }
}

/// Directory entry of a stream or storage.
#[derive(Debug)]
struct Directory {
    /// First sector
    index: usize,
    /// Stream size in bytes
    count: u64,
}

impl Directory {
    /// Reads a 128-byte directory entry as (name, entry).
    fn new(bytes: &[u8], major_version: u16) -> (String, Directory) {
        let size = (to_u16(&bytes[64..66]) as usize).min(64);
        let (name, _) = UTF_16LE.decode_without_bom_handling(&bytes[..size]);
        let name = match name.find('\0') {
            Some(position) => name[..position].to_owned(),
            None => name.into_owned(),
        };
        let index = to_usize(&bytes[116..120]);
        let mut count = to_u64(&bytes[120..128]);
        if major_version == 3 {
            // Version 3 writers may leave garbage in the high half
            count &= 0xFFFF_FFFF;
        }
        (name, Directory { index, count })
    }

    fn len(&self) -> usize {
        usize::try_from(self.count).unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::testing;

    #[test]
    fn reads_streams() {
        let workbook: Vec<u8> = (0..5000u32).map(|value| value as u8).collect();
        let bytes = testing::cfb(&[("Workbook", workbook.to_owned()), ("Other", vec![7; 4096])]);
        let cfb = Cfb::new(&bytes).unwrap();
        assert!(cfb.exists("Workbook"));
        assert!(cfb.exists("Root Entry"));
        assert!(!cfb.exists("Book"));
        assert_eq!(cfb.read("Workbook").unwrap(), Some(workbook));
        assert_eq!(cfb.read("Other").unwrap(), Some(vec![7; 4096]));
        assert_eq!(cfb.read("Book").unwrap(), None);
    }

    #[test]
    fn rejects_broken_files() {
        let bytes = testing::cfb(&[("Workbook", vec![1; 4096])]);

        assert!(matches!(Cfb::new(&bytes[..100]), Err(Sheet2SqlError::CfbError(CfbError::FileFormatError))));

        let mut wrong_signature = bytes.to_owned();
        wrong_signature[7] = 0;
        assert!(matches!(Cfb::new(&wrong_signature), Err(Sheet2SqlError::CfbError(CfbError::SignatureError))));

        let mut wrong_version = bytes.to_owned();
        wrong_version[26] = 4;
        assert!(matches!(Cfb::new(&wrong_version), Err(Sheet2SqlError::CfbError(CfbError::SectorSizeError(4, 9)))));

        // Point the last sector of the stream back at its first one
        let mut cyclic = bytes.to_owned();
        let last = 512 + 9 * 4;
        cyclic[last..last + 4].copy_from_slice(&2u32.to_le_bytes());
        let cfb = Cfb::new(&cyclic).unwrap();
        assert!(matches!(cfb.read("Workbook"), Err(Sheet2SqlError::CfbError(CfbError::SectorChainError(2)))));

        // A directory that starts past the end of the file
        let mut outside = bytes.to_owned();
        outside[48..52].copy_from_slice(&1000u32.to_le_bytes());
        assert!(matches!(Cfb::new(&outside), Err(Sheet2SqlError::CfbError(CfbError::SectorError(1000)))));
    }
}
