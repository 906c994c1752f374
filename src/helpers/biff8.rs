//! Binary Interchange File Format (BIFF8) record reader.
//! The workbook stream of an Excel 97-2003 file is a sequence of records;
//! long records spill into CONTINUE records, which this reader stitches
//! back together.

use crate::error::Sheet2SqlError;
use crate::helpers::string::to_f64;
use crate::helpers::string::to_u16;
use crate::helpers::string::to_u32;
use crate::helpers::string::to_u64;
use crate::helpers::string::to_usize;
use encoding_rs::Encoding;
use encoding_rs::UTF_16LE;
use thiserror::Error;

const CONTINUE: u16 = 60;

#[derive(Error, Debug)]
pub enum Biff8Error {
    #[error("Fewer than {0} bytes remaining in record")]
    NoEnoughDataError(usize),
}

/// Record reader over a whole workbook stream.
pub(crate) struct Biff8Reader {
    /// Code page of 8-bit strings, from the CODEPAGE record
    pub(crate) encoding: &'static Encoding,
    buffer: Vec<u8>,
    /// Position of the next record header
    pointer: usize,
    /// Payload ranges of the current record and its CONTINUE records
    chunks: Vec<(usize, usize)>,
    index: usize,
    /// Read position within the current chunk
    offset: usize,
}

impl Biff8Reader {
    pub(crate) fn new(data: Vec<u8>) -> Biff8Reader {
        Biff8Reader {
            encoding: UTF_16LE,
            buffer: data,
            pointer: 0,
            chunks: Vec::new(),
            index: 0,
            offset: 0,
        }
    }

    /// Moves to the next record and returns its type, None at the end of the
    /// stream.
    pub(crate) fn next(&mut self) -> Result<Option<u16>, Sheet2SqlError> {
        if self.pointer + 4 > self.buffer.len() {
            return Ok(None);
        }
        self.index = 0;
        self.offset = 0;
        self.chunks.clear();

        let kind = self.get_u16_at(self.pointer)?;
        self.push_chunk()?;
        while self.pointer + 4 <= self.buffer.len() && self.get_u16_at(self.pointer)? == CONTINUE {
            self.push_chunk()?;
        }
        Ok(Some(kind))
    }

    /// Records the payload of the record at `pointer` and steps past it.
    fn push_chunk(&mut self) -> Result<(), Sheet2SqlError> {
        let size = self.get_u16_at(self.pointer + 2)? as usize;
        let lower = self.pointer + 4;
        let upper = (lower + size).min(self.buffer.len());
        self.chunks.push((lower, upper));
        self.pointer = lower + size;
        Ok(())
    }

    /// Positions the reader at a record header, e.g. a sheet's BOF.
    pub(crate) fn goto(&mut self, pointer: usize) {
        self.pointer = pointer;
        self.chunks.clear();
    }

    /// Reads up to `length` bytes without crossing into the next chunk.
    fn read(&mut self, length: usize) -> &[u8] {
        while let Some(&(lower, upper)) = self.chunks.get(self.index) {
            let source = lower + self.offset;
            if source >= upper {
                self.index += 1;
                self.offset = 0;
                continue;
            }
            let target = upper.min(source.saturating_add(length));
            if target == upper {
                self.index += 1;
                self.offset = 0;
            } else {
                self.offset += target - source;
            }
            return &self.buffer[source..target];
        }
        &[]
    }

    /// Reads exactly `length` bytes from the current chunk.
    fn read_exact(&mut self, length: usize) -> Result<&[u8], Sheet2SqlError> {
        let data = self.read(length);
        if data.len() == length {
            Ok(data)
        } else {
            Err(Biff8Error::NoEnoughDataError(length).into())
        }
    }

    /// Skips `length` bytes, following CONTINUE records.
    pub(crate) fn skip(&mut self, length: usize) -> Result<(), Sheet2SqlError> {
        let mut remaining = length;
        while remaining > 0 {
            let size = self.read(remaining).len();
            if size == 0 {
                Err(Biff8Error::NoEnoughDataError(length))?
            }
            remaining -= size;
        }
        Ok(())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, Sheet2SqlError> {
        self.read_exact(1).map(|data| data[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, Sheet2SqlError> {
        self.read_exact(2).map(to_u16)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, Sheet2SqlError> {
        self.read_exact(4).map(to_u32)
    }

    pub(crate) fn read_usize(&mut self) -> Result<usize, Sheet2SqlError> {
        self.read_exact(4).map(to_usize)
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, Sheet2SqlError> {
        self.read_exact(8).map(to_u64)
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64, Sheet2SqlError> {
        self.read_exact(8).map(to_f64)
    }

    /// Gets the 16-bit value `offset` bytes before the end of the record.
    pub(crate) fn get_u16_back(&self, offset: usize) -> Result<u16, Sheet2SqlError> {
        let mut offset = offset;
        for (lower, upper) in self.chunks.iter().rev() {
            if upper - lower >= offset {
                return self.get_u16_at(upper - offset);
            }
            offset -= upper - lower;
        }
        Err(Biff8Error::NoEnoughDataError(2).into())
    }

    fn get_u16_at(&self, index: usize) -> Result<u16, Sheet2SqlError> {
        match self.buffer.get(index..index + 2) {
            Some(bytes) => Ok(to_u16(bytes)),
            None => Err(Biff8Error::NoEnoughDataError(2).into()),
        }
    }

    /// Reads an RK number: a 30-bit integer or the high 30 bits of a double,
    /// optionally divided by 100.
    pub(crate) fn read_rk_number(&mut self) -> Result<String, Sheet2SqlError> {
        let value = self.read_u32()?;
        let is_percentage = (value & 0x01) != 0;
        let is_integer = (value & 0x02) != 0;
        Ok(match (is_integer, is_percentage) {
            (true, false) => ((value as i32) >> 2).to_string(),
            (true, true) => (((value as i32) >> 2) as f64 / 100.0).to_string(),
            (false, _) => {
                let mut number = f64::from_bits(((value >> 2) as u64) << 34);
                if is_percentage {
                    number /= 100.0;
                }
                number.to_string()
            }
        })
    }

    /// Reads a ShortXLUnicodeString (8-bit character count).
    pub(crate) fn read_short_xl_unicode_string(&mut self) -> Result<String, Sheet2SqlError> {
        let chars = self.read_u8()? as usize;
        self.read_string(chars, false)
    }

    /// Reads an XLUnicodeString (16-bit character count).
    pub(crate) fn read_xl_unicode_string(&mut self) -> Result<String, Sheet2SqlError> {
        let chars = self.read_u16()? as usize;
        self.read_string(chars, false)
    }

    /// Reads an XLUnicodeRichExtendedString, dropping formatting runs and
    /// phonetic data.
    pub(crate) fn read_xl_unicode_rich_extended_string(&mut self) -> Result<String, Sheet2SqlError> {
        let chars = self.read_u16()? as usize;
        self.read_string(chars, true)
    }

    fn read_string(&mut self, chars: usize, is_extended: bool) -> Result<String, Sheet2SqlError> {
        let mut flag = self.read_u8()?;
        let rich_run_count = if is_extended && (flag & 0x8) != 0 { self.read_u16()? as usize } else { 0 };
        let phonetic_size = if is_extended && (flag & 0x4) != 0 { self.read_usize()? } else { 0 };

        let encoding = self.encoding;
        let mut string = String::new();
        let mut remaining = chars;
        while remaining > 0 {
            let is_high_byte = (flag & 0x1) != 0;
            let bytes = self.read(if is_high_byte { remaining.saturating_mul(2) } else { remaining });
            let read = if is_high_byte { bytes.len() / 2 } else { bytes.len() };
            decode_into(encoding, is_high_byte, bytes, &mut string);
            remaining -= read.min(remaining);
            if remaining > 0 {
                // The rest sits in the next CONTINUE record behind a fresh flag byte
                flag = self.read_u8()?;
            }
        }
        self.skip(4 * rich_run_count)?;
        self.skip(phonetic_size)?;
        Ok(string)
    }
}

/// Appends string bytes: UTF-16LE when `is_high_byte`, otherwise one byte per
/// character in the workbook code page (Latin-1 for Unicode workbooks).
fn decode_into(encoding: &'static Encoding, is_high_byte: bool, bytes: &[u8], string: &mut String) {
    if is_high_byte {
        string.push_str(&UTF_16LE.decode_without_bom_handling(bytes).0);
    } else if encoding.is_single_byte() {
        string.push_str(&encoding.decode_without_bom_handling(bytes).0);
    } else {
        string.extend(bytes.iter().map(|byte| char::from(*byte)));
    }
}

/// Loops over the remaining records, matching on the record type.
#[macro_export]
macro_rules! match_biff8_record {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(kind) = $reader.next()? {
            match kind {
                $($arms)*
                _ => (),
            }
        }
    };
}
