//! Bulk mutator — batches cell mutations into serialized buffers.
//!
//! Cells accumulate in one writer. Once the pending buffer passes
//! `flush_bytes` it is sealed EOS and submitted through
//! [`SetCellsSerialized`]; a fresh writer takes over.

use cellwire_core::config::{CellwireConfig, WriterConfig};
use cellwire_core::{Cell, CellFlag, CellsWriter, CodecError, SEAL_EOS};

use crate::fetch::SetCellsSerialized;

/// Counters for one mutator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutatorStats {
    pub buffers: u64,
    pub cells: u64,
    pub bytes: u64,
}

pub struct BulkMutator<S: SetCellsSerialized> {
    sink: S,
    writer: CellsWriter,
    writer_config: WriterConfig,
    flush_bytes: usize,
    stats: MutatorStats,
}

impl<S: SetCellsSerialized> BulkMutator<S> {
    pub fn new(sink: S, config: &CellwireConfig) -> Self {
        Self {
            sink,
            writer: config.writer.build(),
            writer_config: config.writer.clone(),
            flush_bytes: config.mutator.flush_bytes,
            stats: MutatorStats::default(),
        }
    }

    /// Queue one mutation. May submit the pending buffer.
    pub fn set_cell(&mut self, cell: &Cell) -> Result<(), MutatorError<S::Error>> {
        match self.writer.add_cell(cell) {
            Ok(()) => {}
            Err(CodecError::CapacityExceeded { .. }) if !self.writer.is_empty() => {
                // fixed-size writer is full: ship it and retry on a fresh one
                self.flush()?;
                self.writer.add_cell(cell)?;
            }
            Err(e) => return Err(e.into()),
        }
        if self.writer.length() >= self.flush_bytes {
            self.flush()?;
        }
        Ok(())
    }

    /// Queue one mutation from its parts.
    #[allow(clippy::too_many_arguments)]
    pub fn set(
        &mut self,
        row: &[u8],
        column_family: &str,
        column_qualifier: &str,
        timestamp: i64,
        value: &[u8],
        flag: CellFlag,
    ) -> Result<(), MutatorError<S::Error>> {
        let cell = Cell {
            row: bytes::Bytes::copy_from_slice(row),
            column_family: column_family.to_owned(),
            column_qualifier: column_qualifier.to_owned(),
            timestamp,
            value: bytes::Bytes::copy_from_slice(value),
            flag,
        };
        self.set_cell(&cell)
    }

    /// Cells queued but not yet submitted.
    pub fn pending_cells(&self) -> usize {
        self.writer.record_count()
    }

    pub fn stats(&self) -> MutatorStats {
        self.stats
    }

    /// Submit the pending buffer, if any.
    ///
    /// A buffer whose submission fails is dropped; its cells are not
    /// retried.
    pub fn flush(&mut self) -> Result<(), MutatorError<S::Error>> {
        if self.writer.is_empty() {
            return Ok(());
        }
        let mut writer = std::mem::replace(&mut self.writer, self.writer_config.build());
        writer.finalize(SEAL_EOS)?;
        let cells = writer.record_count() as u64;
        let buffer = writer.into_bytes()?;
        let len = buffer.len() as u64;

        self.sink
            .set_cells_serialized(buffer)
            .map_err(MutatorError::Submit)?;

        self.stats.buffers += 1;
        self.stats.cells += cells;
        self.stats.bytes += len;
        tracing::debug!(cells, bytes = len, "mutation buffer submitted");
        Ok(())
    }

    /// Flush and hand the sink back.
    pub fn close(mut self) -> Result<S, MutatorError<S::Error>> {
        self.flush()?;
        Ok(self.sink)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum MutatorError<E> {
    #[error("cannot serialize mutation: {0}")]
    Codec(#[from] CodecError),

    #[error("submitting mutation buffer failed: {0}")]
    Submit(#[source] E),
}
