//! Serialized cells wire format.
//!
//! This layout IS the protocol between client and server. Every byte here
//! must stay stable across versions; bump [`FORMAT_VERSION`] instead of
//! changing the meaning of an existing field.
//!
//! ```text
//! buffer   := header record* sentinel
//! header   := version:u32
//! record   := 0x01 row_len:u32 row cf_len:u32 cf cq_len:u32 cq
//!                  timestamp:i64 value_len:u32 value flag:u8
//! sentinel := 0xff seal:u8          (0 = EOS, anything else = FLUSH)
//! ```
//!
//! All integers are little-endian. Length prefixes are explicit byte
//! counts, so rows, qualifiers and values may hold any byte including 0.

use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

// ── Fixed-layout pieces ──────────────────────────────────────────────────────

/// Leading header of every buffer.
///
/// Wire size: 4 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct BufferHeader {
    /// [`FORMAT_VERSION`], little-endian.
    pub version: [u8; 4],
}

assert_eq_size!(BufferHeader, [u8; 4]);

impl BufferHeader {
    pub fn current() -> Self {
        Self {
            version: FORMAT_VERSION.to_le_bytes(),
        }
    }

    pub fn version(&self) -> u32 {
        u32::from_le_bytes(self.version)
    }
}

/// Terminal record of every buffer.
///
/// Wire size: 2 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct SentinelRecord {
    /// Always [`RECORD_SENTINEL`].
    pub record_type: u8,
    /// Opaque seal byte supplied by the writer. Only zero vs non-zero
    /// matters to a reader.
    pub seal: u8,
}

assert_eq_size!(SentinelRecord, [u8; 2]);

impl SentinelRecord {
    pub fn new(seal: u8) -> Self {
        Self {
            record_type: RECORD_SENTINEL,
            seal,
        }
    }
}

// ── Constants ─────────────────────────────────────────────────────────────────

/// Current buffer format version.
pub const FORMAT_VERSION: u32 = 1;

/// Record type byte of a cell record.
pub const RECORD_CELL: u8 = 0x01;

/// Record type byte of the sentinel.
pub const RECORD_SENTINEL: u8 = 0xff;

/// Seal byte meaning "no more data for this stream".
pub const SEAL_EOS: u8 = 0x00;

/// Conventional seal byte meaning "buffer full, fetch the next one".
/// Any non-zero seal is read back as FLUSH.
pub const SEAL_FLUSH: u8 = 0x01;

pub const HEADER_LEN: usize = std::mem::size_of::<BufferHeader>();

pub const SENTINEL_LEN: usize = std::mem::size_of::<SentinelRecord>();

/// Size of a buffer holding nothing but the header and the sentinel.
/// Fetched buffers at or below this size carry no cells.
pub const EMPTY_BUFFER_LEN: usize = HEADER_LEN + SENTINEL_LEN;

/// Bytes of a cell record that do not depend on field sizes:
/// type, four length prefixes, timestamp, flag.
pub const CELL_FIXED_LEN: usize = 1 + 4 + 4 + 4 + 8 + 4 + 1;

/// Encoded size of a cell record with the given field lengths.
pub fn cell_record_len(row: usize, family: usize, qualifier: usize, value: usize) -> usize {
    CELL_FIXED_LEN + row + family + qualifier + value
}

// ── Sentinel ──────────────────────────────────────────────────────────────────

/// How a buffer ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    /// The logical stream is complete.
    Eos,
    /// More buffers follow; fetch the next one.
    Flush,
}

impl Sentinel {
    /// Classify an opaque seal byte.
    pub fn from_seal(seal: u8) -> Self {
        if seal == SEAL_EOS {
            Sentinel::Eos
        } else {
            Sentinel::Flush
        }
    }

    /// The seal byte conventionally written for this variant.
    pub fn seal(self) -> u8 {
        match self {
            Sentinel::Eos => SEAL_EOS,
            Sentinel::Flush => SEAL_FLUSH,
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors raised by the writer and the reader.
///
/// None of these are retried by the codec. The buffer being built or read
/// must be abandoned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("cannot encode cell: {0}")]
    Encoding(#[from] EncodingFault),

    #[error("writer capacity exceeded: {required} bytes required, capacity {capacity}")]
    CapacityExceeded { required: usize, capacity: usize },

    #[error("writer is already finalized")]
    AlreadyFinalized,

    #[error("buffer requested before finalize")]
    NotFinalized,

    #[error("malformed buffer at offset {offset}: {reason}")]
    MalformedBuffer {
        offset: usize,
        reason: MalformedReason,
    },

    #[error("no current record; has_next() has not returned true")]
    NoCurrentRecord,
}

impl CodecError {
    pub(crate) fn malformed(offset: usize, reason: MalformedReason) -> Self {
        CodecError::MalformedBuffer { offset, reason }
    }
}

/// Why a cell was refused by the writer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingFault {
    #[error("row key is empty")]
    EmptyRow,

    #[error("column family is empty")]
    EmptyColumnFamily,

    #[error("value_length {declared} does not match value size {actual}")]
    ValueLengthMismatch { declared: usize, actual: usize },

    #[error("{field} is {len} bytes, larger than a u32 length prefix allows")]
    FieldTooLong { field: &'static str, len: usize },
}

/// Why a buffer could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedReason {
    #[error("declared length {declared} exceeds buffer size {actual}")]
    LengthExceedsBuffer { declared: usize, actual: usize },

    #[error("buffer shorter than the {}-byte header", HEADER_LEN)]
    MissingHeader,

    #[error("unsupported format version {0}")]
    UnsupportedVersion(u32),

    #[error("{field} needs {needed} bytes, {remaining} remain")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },

    #[error("unknown record type 0x{0:02x}")]
    UnknownRecordType(u8),

    #[error("buffer ends without a sentinel")]
    MissingSentinel,

    #[error("{0} bytes follow the sentinel")]
    TrailingBytes(usize),

    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
