//! Chunk producer — the server side of the continuation protocol.
//!
//! Packs a stream of cells into buffers of at most `next_threshold` bytes.
//! Every buffer but the last is sealed FLUSH; the last is sealed EOS. A
//! record is never split across buffers.
//!
//! A cell the writer refuses stays at the head of the source. Cells packed
//! ahead of it still go out, sealed FLUSH, and the refusal is reported by
//! the following call.

use std::iter::Peekable;

use bytes::Bytes;
use cellwire_core::{
    Cell, CellsWriter, CodecError, Growth, EMPTY_BUFFER_LEN, SEAL_EOS, SEAL_FLUSH,
};

/// Serialize every cell into one growable buffer sealed EOS.
pub fn serialize_cells<I>(cells: I, initial_capacity: usize) -> Result<Bytes, CodecError>
where
    I: IntoIterator<Item = Cell>,
{
    let mut writer = CellsWriter::with_growth(initial_capacity, Growth::Grow);
    for cell in cells {
        writer.add_cell(&cell)?;
    }
    writer.finalize(SEAL_EOS)?;
    writer.into_bytes()
}

/// Hands out successive sealed buffers for one scan.
pub struct ChunkProducer<I: Iterator<Item = Cell>> {
    cells: Peekable<I>,
    threshold: usize,
    buffers: u64,
    exhausted: bool,
    failed: bool,
}

impl<I: Iterator<Item = Cell>> ChunkProducer<I> {
    pub fn new<C>(cells: C, next_threshold: usize) -> Self
    where
        C: IntoIterator<IntoIter = I>,
    {
        Self {
            cells: cells.into_iter().peekable(),
            threshold: next_threshold.max(EMPTY_BUFFER_LEN),
            buffers: 0,
            exhausted: false,
            failed: false,
        }
    }

    /// True once the EOS buffer has been handed out.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// True once a cell has been refused; the producer cannot get past it.
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Buffers handed out so far.
    pub fn buffers_produced(&self) -> u64 {
        self.buffers
    }

    /// The next buffer of at most `next_threshold` bytes.
    ///
    /// A single cell larger than the threshold goes out alone in a buffer
    /// of its own size, so every call makes progress. Once exhausted,
    /// every call returns an empty EOS buffer.
    pub fn next_buffer(&mut self) -> Result<Bytes, CodecError> {
        let mut writer = CellsWriter::with_growth(self.threshold, Growth::Fixed);
        while let Some(cell) = self.cells.peek() {
            match writer.add_cell(cell) {
                Ok(()) => {
                    self.cells.next();
                }
                Err(CodecError::CapacityExceeded { required, .. }) if writer.is_empty() => {
                    tracing::debug!(
                        required,
                        threshold = self.threshold,
                        "cell larger than scan threshold goes out alone"
                    );
                    let mut alone = CellsWriter::with_growth(required, Growth::Fixed);
                    if let Err(e) = alone.add_cell(cell) {
                        return Err(self.refuse(e));
                    }
                    self.cells.next();
                    return self.seal(alone);
                }
                Err(CodecError::CapacityExceeded { .. }) => return self.seal(writer),
                Err(e) if writer.is_empty() => return Err(self.refuse(e)),
                Err(e) => {
                    tracing::debug!(error = %e, "sealing packed cells ahead of a refused cell");
                    return self.seal(writer);
                }
            }
        }
        self.seal(writer)
    }

    /// The next buffer holding exactly one row, grown to fit it.
    pub fn next_row_buffer(&mut self) -> Result<Bytes, CodecError> {
        let mut writer = CellsWriter::with_growth(self.threshold, Growth::Grow);
        let row = match self.cells.peek() {
            Some(cell) => cell.row.clone(),
            None => return self.seal(writer),
        };
        while let Some(cell) = self.cells.peek() {
            if cell.row != row {
                break;
            }
            match writer.add_cell(cell) {
                Ok(()) => {
                    self.cells.next();
                }
                Err(e) if writer.is_empty() => return Err(self.refuse(e)),
                Err(e) => {
                    tracing::debug!(error = %e, "sealing packed cells ahead of a refused cell");
                    break;
                }
            }
        }
        tracing::trace!(
            row = hex::encode(&row),
            cells = writer.record_count(),
            "row buffer packed"
        );
        self.seal(writer)
    }

    fn refuse(&mut self, error: CodecError) -> CodecError {
        if !self.failed {
            self.failed = true;
            tracing::warn!(error = %error, buffers = self.buffers, "scan producer refused a cell");
        }
        error
    }

    /// Seal FLUSH if cells remain, EOS otherwise.
    fn seal(&mut self, mut writer: CellsWriter) -> Result<Bytes, CodecError> {
        let more = self.cells.peek().is_some();
        writer.finalize(if more { SEAL_FLUSH } else { SEAL_EOS })?;
        self.buffers += 1;
        if !more && !self.exhausted {
            self.exhausted = true;
            tracing::debug!(buffers = self.buffers, "scan producer exhausted");
        }
        writer.into_bytes()
    }
}

/// Yields buffers up to and including the EOS one. An error is yielded
/// once and ends iteration.
impl<I: Iterator<Item = Cell>> Iterator for ChunkProducer<I> {
    type Item = Result<Bytes, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted || self.failed {
            return None;
        }
        Some(self.next_buffer())
    }
}
