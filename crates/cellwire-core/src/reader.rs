//! Decoder — forward-only, one-cell-at-a-time access to a sealed buffer.
//!
//! The reader borrows the buffer and never copies it. Field accessors hand
//! out slices bounded by the buffer's lifetime and describe the record
//! most recently reached by [`CellsReader::has_next`]. Decoding is a single
//! linear pass; a reader cannot be rewound, so build a fresh one per buffer.
//!
//! ```
//! use cellwire_core::{CellFlag, CellsReader, CellsWriter, SEAL_EOS};
//!
//! let mut writer = CellsWriter::new(256, true);
//! writer.add(b"row0", "col", "qly0", 0, b"v0", 2, CellFlag::INSERT).unwrap();
//! writer.finalize(SEAL_EOS).unwrap();
//!
//! let buf = writer.get().unwrap();
//! let mut reader = CellsReader::new(buf, buf.len()).unwrap();
//! while reader.has_next().unwrap() {
//!     assert_eq!(reader.row().unwrap(), b"row0");
//! }
//! assert!(reader.eos());
//! ```

use std::borrow::Cow;

use bytes::{Buf, Bytes};
use zerocopy::FromBytes;

use crate::cell::{Cell, CellFlag};
use crate::wire::{
    BufferHeader, CodecError, MalformedReason, Sentinel, SentinelRecord, FORMAT_VERSION,
    HEADER_LEN, RECORD_CELL, RECORD_SENTINEL,
};

/// A borrowed view of one decoded cell record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRef<'a> {
    pub row: &'a [u8],
    pub column_family: &'a [u8],
    pub column_qualifier: &'a [u8],
    pub timestamp: i64,
    pub value: &'a [u8],
    pub flag: CellFlag,
}

impl<'a> CellRef<'a> {
    pub fn value_as_string(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.value)
    }

    /// Copy into an owned [`Cell`]. Family and qualifier must be UTF-8.
    ///
    /// A view carries no buffer position, so a UTF-8 failure reports its
    /// offset within the offending field.
    pub fn to_cell(&self) -> Result<Cell, CodecError> {
        self.to_cell_at(0, 0)
    }

    fn to_cell_at(&self, family_at: usize, qualifier_at: usize) -> Result<Cell, CodecError> {
        Ok(Cell {
            row: Bytes::copy_from_slice(self.row),
            column_family: utf8("column_family", family_at, self.column_family)?.to_owned(),
            column_qualifier: utf8("column_qualifier", qualifier_at, self.column_qualifier)?
                .to_owned(),
            timestamp: self.timestamp,
            value: Bytes::copy_from_slice(self.value),
            flag: self.flag,
        })
    }
}

impl Cell {
    /// Borrow this cell in its decoded form.
    pub fn as_cell_ref(&self) -> CellRef<'_> {
        CellRef {
            row: &self.row,
            column_family: self.column_family.as_bytes(),
            column_qualifier: self.column_qualifier.as_bytes(),
            timestamp: self.timestamp,
            value: &self.value,
            flag: self.flag,
        }
    }
}

fn utf8<'a>(field: &'static str, base: usize, bytes: &'a [u8]) -> Result<&'a str, CodecError> {
    std::str::from_utf8(bytes).map_err(|e| CodecError::MalformedBuffer {
        offset: base + e.valid_up_to(),
        reason: MalformedReason::InvalidUtf8(field),
    })
}

#[derive(Debug)]
enum Cursor<'a> {
    /// No record decoded yet.
    Start,
    Record(Decoded<'a>),
    Sealed { sentinel: Sentinel, seal: u8 },
    Failed(CodecError),
}

/// A decoded record plus where its text fields start in the buffer.
#[derive(Debug, Clone, Copy)]
struct Decoded<'a> {
    cell: CellRef<'a>,
    family_at: usize,
    qualifier_at: usize,
}

pub struct CellsReader<'a> {
    buf: &'a [u8],
    pos: usize,
    records: usize,
    cursor: Cursor<'a>,
}

impl<'a> CellsReader<'a> {
    /// Wrap the first `len` bytes of `buf`.
    ///
    /// The explicit length lets callers reuse an over-allocated buffer.
    /// The header is validated here; records are validated as they are
    /// reached.
    pub fn new(buf: &'a [u8], len: usize) -> Result<Self, CodecError> {
        if len > buf.len() {
            return Err(CodecError::malformed(
                0,
                MalformedReason::LengthExceedsBuffer {
                    declared: len,
                    actual: buf.len(),
                },
            ));
        }
        let buf = &buf[..len];
        let header = BufferHeader::read_from_prefix(buf)
            .ok_or(CodecError::malformed(0, MalformedReason::MissingHeader))?;
        if header.version() != FORMAT_VERSION {
            return Err(CodecError::malformed(
                0,
                MalformedReason::UnsupportedVersion(header.version()),
            ));
        }
        Ok(Self {
            buf,
            pos: HEADER_LEN,
            records: 0,
            cursor: Cursor::Start,
        })
    }

    pub fn from_slice(buf: &'a [u8]) -> Result<Self, CodecError> {
        Self::new(buf, buf.len())
    }

    /// Advance to the next cell.
    ///
    /// Returns `Ok(false)` once the sentinel has been consumed; the
    /// sentinel itself is never exposed as a cell. After an error every
    /// further call returns the same error.
    pub fn has_next(&mut self) -> Result<bool, CodecError> {
        match &self.cursor {
            Cursor::Sealed { .. } => return Ok(false),
            Cursor::Failed(e) => return Err(e.clone()),
            Cursor::Start | Cursor::Record(_) => {}
        }
        match self.decode_next() {
            Ok(Some(record)) => {
                self.records += 1;
                self.cursor = Cursor::Record(record);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => {
                self.cursor = Cursor::Failed(e.clone());
                Err(e)
            }
        }
    }

    fn decode_next(&mut self) -> Result<Option<Decoded<'a>>, CodecError> {
        let offset = self.pos;
        let record_type = match self.buf.get(offset) {
            Some(b) => *b,
            None => {
                return Err(CodecError::malformed(
                    offset,
                    MalformedReason::MissingSentinel,
                ))
            }
        };

        match record_type {
            RECORD_SENTINEL => {
                let record = self.take(std::mem::size_of::<SentinelRecord>(), "sentinel")?;
                let seal = SentinelRecord::read_from(record)
                    .map(|s| s.seal)
                    .ok_or(CodecError::malformed(offset, MalformedReason::MissingSentinel))?;
                let trailing = self.buf.len() - self.pos;
                if trailing > 0 {
                    return Err(CodecError::malformed(
                        self.pos,
                        MalformedReason::TrailingBytes(trailing),
                    ));
                }
                self.cursor = Cursor::Sealed {
                    sentinel: Sentinel::from_seal(seal),
                    seal,
                };
                Ok(None)
            }
            RECORD_CELL => {
                self.pos += 1;
                let row = self.take_prefixed("row")?;
                let column_family = self.take_prefixed("column_family")?;
                let family_at = self.pos - column_family.len();
                let column_qualifier = self.take_prefixed("column_qualifier")?;
                let qualifier_at = self.pos - column_qualifier.len();
                let timestamp = self.take(8, "timestamp")?.get_i64_le();
                let value = self.take_prefixed("value")?;
                let flag = CellFlag(self.take(1, "flag")?[0]);
                Ok(Some(Decoded {
                    cell: CellRef {
                        row,
                        column_family,
                        column_qualifier,
                        timestamp,
                        value,
                        flag,
                    },
                    family_at,
                    qualifier_at,
                }))
            }
            other => Err(CodecError::malformed(
                offset,
                MalformedReason::UnknownRecordType(other),
            )),
        }
    }

    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], CodecError> {
        let buf = self.buf;
        let remaining = buf.len() - self.pos;
        if n > remaining {
            return Err(CodecError::malformed(
                self.pos,
                MalformedReason::Truncated {
                    field,
                    needed: n,
                    remaining,
                },
            ));
        }
        let bytes = &buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn take_prefixed(&mut self, field: &'static str) -> Result<&'a [u8], CodecError> {
        let len = self.take(4, field)?.get_u32_le() as usize;
        self.take(len, field)
    }

    fn current(&self) -> Result<&CellRef<'a>, CodecError> {
        self.current_record().map(|record| &record.cell)
    }

    fn current_record(&self) -> Result<&Decoded<'a>, CodecError> {
        match &self.cursor {
            Cursor::Record(record) => Ok(record),
            _ => Err(CodecError::NoCurrentRecord),
        }
    }

    // ── Field accessors ──────────────────────────────────────────────────────

    pub fn row(&self) -> Result<&'a [u8], CodecError> {
        Ok(self.current()?.row)
    }

    pub fn column_family(&self) -> Result<&'a [u8], CodecError> {
        Ok(self.current()?.column_family)
    }

    pub fn column_qualifier(&self) -> Result<&'a [u8], CodecError> {
        Ok(self.current()?.column_qualifier)
    }

    pub fn value(&self) -> Result<&'a [u8], CodecError> {
        Ok(self.current()?.value)
    }

    /// The value decoded as UTF-8, with invalid sequences replaced.
    pub fn value_as_string(&self) -> Result<Cow<'a, str>, CodecError> {
        Ok(self.current()?.value_as_string())
    }

    pub fn value_length(&self) -> Result<usize, CodecError> {
        Ok(self.current()?.value.len())
    }

    pub fn timestamp(&self) -> Result<i64, CodecError> {
        Ok(self.current()?.timestamp)
    }

    pub fn flag(&self) -> Result<CellFlag, CodecError> {
        Ok(self.current()?.flag)
    }

    /// The whole current record as a borrowed view.
    pub fn current_cell(&self) -> Result<CellRef<'a>, CodecError> {
        self.current().copied()
    }

    /// The current record copied into an owned [`Cell`].
    ///
    /// A UTF-8 failure reports the offending byte's offset in the buffer.
    pub fn get_cell(&self) -> Result<Cell, CodecError> {
        let record = self.current_record()?;
        record.cell.to_cell_at(record.family_at, record.qualifier_at)
    }

    // ── Sentinel inspection ──────────────────────────────────────────────────

    /// The sentinel, once [`has_next`](Self::has_next) has reached it.
    pub fn sentinel(&self) -> Option<Sentinel> {
        match self.cursor {
            Cursor::Sealed { sentinel, .. } => Some(sentinel),
            _ => None,
        }
    }

    /// The raw seal byte, once reached.
    pub fn seal_flag(&self) -> Option<u8> {
        match self.cursor {
            Cursor::Sealed { seal, .. } => Some(seal),
            _ => None,
        }
    }

    /// True iff the buffer ended with an EOS sentinel.
    pub fn eos(&self) -> bool {
        self.sentinel() == Some(Sentinel::Eos)
    }

    /// True iff the buffer ended with a FLUSH sentinel.
    pub fn flush(&self) -> bool {
        self.sentinel() == Some(Sentinel::Flush)
    }

    /// Cells decoded so far.
    pub fn records_read(&self) -> usize {
        self.records
    }

    /// Byte offset of the cursor.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Length of the wrapped buffer.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Yields each cell once; an error is yielded once and ends iteration.
impl<'a> Iterator for CellsReader<'a> {
    type Item = Result<CellRef<'a>, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if matches!(self.cursor, Cursor::Failed(_)) {
            return None;
        }
        match self.has_next() {
            Ok(true) => self.current_cell().ok().map(Ok),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
