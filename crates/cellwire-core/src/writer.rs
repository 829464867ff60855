//! Encoder — appends cells into one contiguous buffer and seals it.
//!
//! A writer is built once per payload. Cells are appended with
//! [`CellsWriter::add`], the buffer is sealed with exactly one sentinel by
//! [`CellsWriter::finalize`], and only then can the bytes be taken with
//! [`CellsWriter::get`] or [`CellsWriter::into_bytes`].
//!
//! Room for the sentinel is reserved on every `add`, so a fixed-capacity
//! writer that refuses a cell can always still be finalized. This is what
//! lets a server fill a buffer up to its threshold, seal it FLUSH and
//! carry the refused cell over into the next buffer.
//!
//! Not synchronized. Callers that share a writer serialize access.

use bytes::{BufMut, Bytes, BytesMut};
use zerocopy::AsBytes;

use crate::cell::{Cell, CellFlag};
use crate::wire::{
    cell_record_len, BufferHeader, CodecError, EncodingFault, SentinelRecord, EMPTY_BUFFER_LEN,
    HEADER_LEN, RECORD_CELL, SENTINEL_LEN,
};

/// What happens when an `add` would overflow the current capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Growth {
    /// Reallocate, doubling the capacity until the record fits. The
    /// initial capacity is only a preallocation hint.
    Grow,
    /// Refuse the record with [`CodecError::CapacityExceeded`].
    Fixed,
}

impl From<bool> for Growth {
    fn from(grow: bool) -> Self {
        if grow {
            Growth::Grow
        } else {
            Growth::Fixed
        }
    }
}

pub struct CellsWriter {
    buf: BytesMut,
    /// Logical capacity. Hard ceiling under [`Growth::Fixed`].
    capacity: usize,
    growth: Growth,
    records: usize,
    finalized: bool,
}

impl CellsWriter {
    /// Create a writer with `capacity` bytes preallocated. `grow` selects
    /// [`Growth::Grow`] when true and [`Growth::Fixed`] when false.
    pub fn new(capacity: usize, grow: bool) -> Self {
        Self::with_growth(capacity, Growth::from(grow))
    }

    /// Capacities smaller than an empty sealed buffer are raised to
    /// [`EMPTY_BUFFER_LEN`] so the writer can always be finalized.
    pub fn with_growth(capacity: usize, growth: Growth) -> Self {
        let capacity = capacity.max(EMPTY_BUFFER_LEN);
        let mut buf = BytesMut::with_capacity(capacity);
        buf.put_slice(BufferHeader::current().as_bytes());
        Self {
            buf,
            capacity,
            growth,
            records: 0,
            finalized: false,
        }
    }

    /// Append one cell record.
    ///
    /// `value_length` must equal `value.len()`; it is kept as an explicit
    /// argument so callers handing over a length-delimited value catch a
    /// mismatch here instead of on the server.
    #[allow(clippy::too_many_arguments)]
    pub fn add(
        &mut self,
        row: &[u8],
        column_family: &str,
        column_qualifier: &str,
        timestamp: i64,
        value: &[u8],
        value_length: usize,
        flag: CellFlag,
    ) -> Result<(), CodecError> {
        if self.finalized {
            return Err(CodecError::AlreadyFinalized);
        }
        if row.is_empty() {
            return Err(EncodingFault::EmptyRow.into());
        }
        if column_family.is_empty() {
            return Err(EncodingFault::EmptyColumnFamily.into());
        }
        if value_length != value.len() {
            return Err(EncodingFault::ValueLengthMismatch {
                declared: value_length,
                actual: value.len(),
            }
            .into());
        }
        let row_len = prefix_len("row", row.len())?;
        let family_len = prefix_len("column_family", column_family.len())?;
        let qualifier_len = prefix_len("column_qualifier", column_qualifier.len())?;
        let value_len = prefix_len("value", value.len())?;

        let record_len = cell_record_len(
            row.len(),
            column_family.len(),
            column_qualifier.len(),
            value.len(),
        );
        self.reserve(record_len)?;

        self.buf.put_u8(RECORD_CELL);
        self.buf.put_u32_le(row_len);
        self.buf.put_slice(row);
        self.buf.put_u32_le(family_len);
        self.buf.put_slice(column_family.as_bytes());
        self.buf.put_u32_le(qualifier_len);
        self.buf.put_slice(column_qualifier.as_bytes());
        self.buf.put_i64_le(timestamp);
        self.buf.put_u32_le(value_len);
        self.buf.put_slice(value);
        self.buf.put_u8(flag.0);

        self.records += 1;
        Ok(())
    }

    /// Append an owned [`Cell`].
    pub fn add_cell(&mut self, cell: &Cell) -> Result<(), CodecError> {
        self.add(
            &cell.row,
            &cell.column_family,
            &cell.column_qualifier,
            cell.timestamp,
            &cell.value,
            cell.value.len(),
            cell.flag,
        )
    }

    /// Seal the buffer with one sentinel carrying `seal`, and freeze it.
    ///
    /// The seal byte is opaque: readers classify zero as EOS and anything
    /// else as FLUSH (see [`crate::wire::Sentinel::from_seal`]).
    pub fn finalize(&mut self, seal: u8) -> Result<(), CodecError> {
        if self.finalized {
            return Err(CodecError::AlreadyFinalized);
        }
        self.buf.put_slice(SentinelRecord::new(seal).as_bytes());
        self.finalized = true;
        tracing::trace!(
            records = self.records,
            bytes = self.buf.len(),
            seal,
            "serialized cells buffer sealed"
        );
        Ok(())
    }

    /// The sealed buffer.
    pub fn get(&self) -> Result<&[u8], CodecError> {
        if !self.finalized {
            return Err(CodecError::NotFinalized);
        }
        Ok(&self.buf)
    }

    /// Hand the sealed buffer off without copying.
    pub fn into_bytes(self) -> Result<Bytes, CodecError> {
        if !self.finalized {
            return Err(CodecError::NotFinalized);
        }
        Ok(self.buf.freeze())
    }

    /// Current size in bytes, header and (once finalized) sentinel included.
    pub fn length(&self) -> usize {
        self.buf.len()
    }

    /// True while no cell has been appended.
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    pub fn record_count(&self) -> usize {
        self.records
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn growth(&self) -> Growth {
        self.growth
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Drop every record and the sentinel, keeping the allocation.
    pub fn clear(&mut self) {
        self.buf.truncate(HEADER_LEN);
        self.records = 0;
        self.finalized = false;
    }

    /// Make room for a record of `record_len` bytes plus the sentinel.
    fn reserve(&mut self, record_len: usize) -> Result<(), CodecError> {
        let required = self.buf.len() + record_len + SENTINEL_LEN;
        if required <= self.capacity {
            return Ok(());
        }
        match self.growth {
            Growth::Fixed => Err(CodecError::CapacityExceeded {
                required,
                capacity: self.capacity,
            }),
            Growth::Grow => {
                let mut capacity = self.capacity;
                while capacity < required {
                    capacity = capacity.saturating_mul(2);
                }
                self.buf.reserve(capacity - self.buf.len());
                tracing::trace!(from = self.capacity, to = capacity, "cells writer grew");
                self.capacity = capacity;
                Ok(())
            }
        }
    }
}

fn prefix_len(field: &'static str, len: usize) -> Result<u32, CodecError> {
    u32::try_from(len).map_err(|_| EncodingFault::FieldTooLong { field, len }.into())
}
