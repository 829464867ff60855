//! Cell records — the unit of transfer between client and server.
//!
//! A cell is one mutation or one query result: a row key, a column
//! family, a column qualifier, a timestamp, a value and a mutation flag.
//! Inside a serialized buffer cells only exist as byte ranges; [`Cell`] is
//! the owned form used when a caller wants to keep one around.

use std::fmt;

use bytes::Bytes;

/// Timestamp value asking the server to assign the time at apply time.
pub const AUTO_TIMESTAMP: i64 = 0;

// ── Mutation flag ────────────────────────────────────────────────────────────

/// Mutation opcode carried by every cell.
///
/// The opcode space is defined by the server, so this is an open byte
/// rather than a closed enum. `INSERT` sits at the top; delete scopes
/// widen as the value shrinks towards `DELETE_ROW`. The codec never
/// interprets the flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellFlag(pub u8);

impl CellFlag {
    /// Row is pending delete.
    pub const DELETE_ROW: CellFlag = CellFlag(0);
    /// Column family is pending delete.
    pub const DELETE_CF: CellFlag = CellFlag(1);
    /// Delete every version of the cell at or below the timestamp.
    ///
    /// Wire value 2, the opcode protocol documents call "delete-cell-version".
    /// The at/below cutoff is what it means there too; the exact-version
    /// delete is the separate [`DELETE_CELL_VERSION`](Self::DELETE_CELL_VERSION).
    pub const DELETE_CELL: CellFlag = CellFlag(2);
    /// Delete exactly the version carrying the timestamp.
    pub const DELETE_CELL_VERSION: CellFlag = CellFlag(3);
    /// Insert or update.
    pub const INSERT: CellFlag = CellFlag(255);

    pub fn is_insert(self) -> bool {
        self == Self::INSERT
    }

    pub fn is_delete(self) -> bool {
        self < Self::INSERT
    }
}

impl Default for CellFlag {
    fn default() -> Self {
        Self::INSERT
    }
}

impl From<u8> for CellFlag {
    fn from(value: u8) -> Self {
        CellFlag(value)
    }
}

impl From<CellFlag> for u8 {
    fn from(flag: CellFlag) -> u8 {
        flag.0
    }
}

impl fmt::Display for CellFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::DELETE_ROW => f.write_str("DELETE_ROW"),
            Self::DELETE_CF => f.write_str("DELETE_CF"),
            Self::DELETE_CELL => f.write_str("DELETE_CELL"),
            Self::DELETE_CELL_VERSION => f.write_str("DELETE_CELL_VERSION"),
            Self::INSERT => f.write_str("INSERT"),
            CellFlag(other) => write!(f, "0x{other:02x}"),
        }
    }
}

// ── Cell ─────────────────────────────────────────────────────────────────────

/// An owned cell record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell {
    /// Client-supplied primary key. Must be non-empty to be encoded.
    pub row: Bytes,
    /// Must be non-empty to be encoded.
    pub column_family: String,
    /// May be empty.
    pub column_qualifier: String,
    /// Nanoseconds. [`AUTO_TIMESTAMP`] lets the server pick.
    pub timestamp: i64,
    /// Arbitrary bytes. Empty for delete-style records.
    pub value: Bytes,
    pub flag: CellFlag,
}

impl Cell {
    /// An insert with an auto-assigned timestamp.
    pub fn insert(
        row: impl Into<Bytes>,
        column_family: impl Into<String>,
        column_qualifier: impl Into<String>,
        value: impl Into<Bytes>,
    ) -> Self {
        Self {
            row: row.into(),
            column_family: column_family.into(),
            column_qualifier: column_qualifier.into(),
            timestamp: AUTO_TIMESTAMP,
            value: value.into(),
            flag: CellFlag::INSERT,
        }
    }

    /// A delete of the given scope. The value is always empty.
    pub fn delete(
        row: impl Into<Bytes>,
        column_family: impl Into<String>,
        column_qualifier: impl Into<String>,
        timestamp: i64,
        flag: CellFlag,
    ) -> Self {
        Self {
            row: row.into(),
            column_family: column_family.into(),
            column_qualifier: column_qualifier.into(),
            timestamp,
            value: Bytes::new(),
            flag,
        }
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Number of bytes this cell occupies once encoded.
    pub fn encoded_len(&self) -> usize {
        crate::wire::cell_record_len(
            self.row.len(),
            self.column_family.len(),
            self.column_qualifier.len(),
            self.value.len(),
        )
    }
}
