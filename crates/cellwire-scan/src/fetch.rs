//! Collaborator seams: the two store operations the codec rides on.
//!
//! The transport behind them (framing, connections, timeouts) is not this
//! crate's concern. Implementations only move opaque buffers.

use std::collections::VecDeque;

use bytes::Bytes;

/// The "fetch serialized cells" operation against an open scan.
///
/// Each call returns the next sealed buffer of the scan. Errors are
/// handed back to the caller unchanged; the scan protocol never retries.
pub trait FetchCells {
    type Error: std::error::Error + Send + Sync + 'static;

    fn fetch_cells(&mut self) -> Result<Bytes, Self::Error>;
}

/// The "bulk-set-cells" operation: submit one sealed buffer of mutations.
pub trait SetCellsSerialized {
    type Error: std::error::Error + Send + Sync + 'static;

    fn set_cells_serialized(&mut self, buffer: Bytes) -> Result<(), Self::Error>;
}

impl<T: FetchCells + ?Sized> FetchCells for &mut T {
    type Error = T::Error;

    fn fetch_cells(&mut self) -> Result<Bytes, Self::Error> {
        (**self).fetch_cells()
    }
}

impl<T: SetCellsSerialized + ?Sized> SetCellsSerialized for &mut T {
    type Error = T::Error;

    fn set_cells_serialized(&mut self, buffer: Bytes) -> Result<(), Self::Error> {
        (**self).set_cells_serialized(buffer)
    }
}

// ── Closure adapter ───────────────────────────────────────────────────────────

/// Adapts a closure into a [`FetchCells`].
pub struct FetchFn<F>(pub F);

impl<F, E> FetchCells for FetchFn<F>
where
    F: FnMut() -> Result<Bytes, E>,
    E: std::error::Error + Send + Sync + 'static,
{
    type Error = E;

    fn fetch_cells(&mut self) -> Result<Bytes, E> {
        (self.0)()
    }
}

// ── Prepared buffers ──────────────────────────────────────────────────────────

/// Hands out a fixed sequence of buffers, in order.
///
/// Useful for replaying a captured scan or for driving the protocol from
/// buffers produced in-process.
#[derive(Debug, Default)]
pub struct BufferQueue {
    buffers: VecDeque<Bytes>,
    served: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no buffer left after {served} fetches")]
pub struct QueueDrained {
    pub served: usize,
}

impl BufferQueue {
    pub fn new(buffers: impl IntoIterator<Item = Bytes>) -> Self {
        Self {
            buffers: buffers.into_iter().collect(),
            served: 0,
        }
    }

    pub fn push(&mut self, buffer: Bytes) {
        self.buffers.push_back(buffer);
    }

    /// Buffers not yet fetched.
    pub fn remaining(&self) -> usize {
        self.buffers.len()
    }

    pub fn served(&self) -> usize {
        self.served
    }
}

impl FetchCells for BufferQueue {
    type Error = QueueDrained;

    fn fetch_cells(&mut self) -> Result<Bytes, QueueDrained> {
        let buffer = self.buffers.pop_front().ok_or(QueueDrained {
            served: self.served,
        })?;
        self.served += 1;
        Ok(buffer)
    }
}

/// Collects submitted buffers in memory.
#[derive(Debug, Default)]
pub struct BufferSink {
    pub buffers: Vec<Bytes>,
}

impl SetCellsSerialized for BufferSink {
    type Error = std::convert::Infallible;

    fn set_cells_serialized(&mut self, buffer: Bytes) -> Result<(), Self::Error> {
        self.buffers.push(buffer);
        Ok(())
    }
}
