//! Chunked scan — the client side of the continuation protocol.
//!
//! A scan is a loop of fetches. Each fetched buffer is decoded to
//! exhaustion; its sentinel then says whether to fetch again (FLUSH) or
//! stop (EOS). A buffer no longer than an empty one also ends the scan.
//!
//! ```text
//!            start_fetch + decode_buffer
//!   FETCHING ───────────────────────────▶ DECODING
//!      ▲                                     │
//!      └──────────── FLUSH ──────────────────┤
//!                                            │ EOS
//!   (len <= EMPTY_BUFFER_LEN) ──────────▶  DONE
//! ```
//!
//! [`ChunkedScan`] is the bare state machine. [`CellScanner`] and
//! [`scan_async`] drive it against a fetcher.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::future::Future;

use bytes::Bytes;
use cellwire_core::config::ScanConfig;
use cellwire_core::wire::MalformedReason;
use cellwire_core::{Cell, CellRef, CellsReader, CodecError, Sentinel, EMPTY_BUFFER_LEN};

use crate::fetch::FetchCells;

// ── State ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Waiting for the next buffer.
    Fetching,
    /// A buffer is being decoded.
    Decoding,
    /// Terminal. No further fetch is issued.
    Done,
}

/// Bounds applied to one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanLimits {
    /// Fetches allowed before the scan is declared runaway.
    pub max_fetches: u64,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self::from(&ScanConfig::default())
    }
}

impl From<&ScanConfig> for ScanLimits {
    fn from(config: &ScanConfig) -> Self {
        Self {
            max_fetches: config.max_fetches,
        }
    }
}

/// Counters for one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub fetches: u64,
    pub cells: u64,
    pub bytes: u64,
}

/// The continuation state machine, independent of any transport.
///
/// Every cell of every buffer is handed out exactly once, in buffer order
/// then record order. A buffer that fails to decode hands out nothing.
#[derive(Debug)]
pub struct ChunkedScan {
    state: ScanState,
    limits: ScanLimits,
    summary: ScanSummary,
}

impl ChunkedScan {
    pub fn new(limits: ScanLimits) -> Self {
        Self {
            state: ScanState::Fetching,
            limits,
            summary: ScanSummary::default(),
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == ScanState::Done
    }

    pub fn summary(&self) -> ScanSummary {
        self.summary
    }

    /// Account for one fetch about to be issued.
    pub fn start_fetch(&mut self) -> Result<(), ProtocolViolation> {
        if self.state != ScanState::Fetching {
            return Err(ProtocolViolation::FetchWhile(self.state));
        }
        if self.summary.fetches >= self.limits.max_fetches {
            self.state = ScanState::Done;
            tracing::warn!(
                fetches = self.summary.fetches,
                cells = self.summary.cells,
                "scan exceeded its fetch budget"
            );
            return Err(ProtocolViolation::TooManyFetches(self.limits.max_fetches));
        }
        self.summary.fetches += 1;
        Ok(())
    }

    /// Take delivery of a fetched buffer of `len` bytes.
    ///
    /// Returns [`ScanState::Done`] when the buffer is too short to hold a
    /// cell, otherwise [`ScanState::Decoding`].
    pub fn begin_buffer(&mut self, len: usize) -> Result<ScanState, ProtocolViolation> {
        if self.state != ScanState::Fetching {
            return Err(ProtocolViolation::BufferWhile(self.state));
        }
        self.summary.bytes += len as u64;
        self.state = if len <= EMPTY_BUFFER_LEN {
            tracing::debug!(
                len,
                fetches = self.summary.fetches,
                "empty buffer ends scan"
            );
            ScanState::Done
        } else {
            ScanState::Decoding
        };
        Ok(self.state)
    }

    /// Record that the current buffer was decoded up to `sentinel`.
    pub fn end_buffer(
        &mut self,
        sentinel: Sentinel,
        cells: u64,
    ) -> Result<ScanState, ProtocolViolation> {
        if self.state != ScanState::Decoding {
            return Err(ProtocolViolation::SentinelWhile(self.state));
        }
        self.summary.cells += cells;
        self.state = match sentinel {
            Sentinel::Flush => ScanState::Fetching,
            Sentinel::Eos => {
                tracing::debug!(
                    fetches = self.summary.fetches,
                    cells = self.summary.cells,
                    bytes = self.summary.bytes,
                    "scan complete"
                );
                ScanState::Done
            }
        };
        Ok(self.state)
    }

    /// Decode one fetched buffer to exhaustion and advance the state.
    ///
    /// The whole buffer is validated before any cell is returned. Any
    /// error ends the scan.
    pub fn decode_buffer<'b>(&mut self, buf: &'b [u8]) -> Result<Vec<CellRef<'b>>, ScanError> {
        if self.begin_buffer(buf.len())? == ScanState::Done {
            return Ok(Vec::new());
        }
        let (cells, sentinel) = match decode_all(buf) {
            Ok(decoded) => decoded,
            Err(e) => {
                self.state = ScanState::Done;
                tracing::warn!(
                    fetch = self.summary.fetches,
                    len = buf.len(),
                    error = %e,
                    "scan buffer rejected"
                );
                return Err(ScanError::from_codec(e));
            }
        };
        self.end_buffer(sentinel, cells.len() as u64)?;
        Ok(cells)
    }
}

fn decode_all(buf: &[u8]) -> Result<(Vec<CellRef<'_>>, Sentinel), CodecError> {
    let mut reader = CellsReader::from_slice(buf)?;
    let mut cells = Vec::new();
    while reader.has_next()? {
        cells.push(reader.current_cell()?);
    }
    let sentinel = reader.sentinel().ok_or(CodecError::MalformedBuffer {
        offset: reader.position(),
        reason: MalformedReason::MissingSentinel,
    })?;
    Ok((cells, sentinel))
}

// ── Blocking driver ───────────────────────────────────────────────────────────

/// Runs a chunked scan against a [`FetchCells`], yielding owned cells.
///
/// Iteration stops after the final buffer or the first error.
pub struct CellScanner<F> {
    fetcher: F,
    scan: ChunkedScan,
    pending: VecDeque<Cell>,
    failed: bool,
}

impl<F: FetchCells> CellScanner<F> {
    pub fn new(fetcher: F, limits: ScanLimits) -> Self {
        Self {
            fetcher,
            scan: ChunkedScan::new(limits),
            pending: VecDeque::new(),
            failed: false,
        }
    }

    pub fn state(&self) -> ScanState {
        self.scan.state()
    }

    pub fn summary(&self) -> ScanSummary {
        self.scan.summary()
    }

    /// Hand every remaining cell to `f` without copying it out of its buffer.
    pub fn for_each_cell<S>(mut self, mut f: S) -> Result<ScanSummary, ScanError<F::Error>>
    where
        S: FnMut(CellRef<'_>),
    {
        for cell in self.pending.drain(..) {
            f(cell.as_cell_ref());
        }
        while !self.failed && !self.scan.is_done() {
            let buffer = self.fetch()?;
            let cells = self.scan.decode_buffer(&buffer).map_err(ScanError::widen)?;
            for cell in cells {
                f(cell);
            }
        }
        Ok(self.scan.summary())
    }

    /// Run the scan to completion and keep every cell.
    pub fn collect_cells(self) -> Result<Vec<Cell>, ScanError<F::Error>> {
        self.collect()
    }

    /// Give the fetcher back, e.g. to close the server-side scanner.
    pub fn into_inner(self) -> F {
        self.fetcher
    }

    fn fetch(&mut self) -> Result<Bytes, ScanError<F::Error>> {
        self.scan.start_fetch()?;
        self.fetcher.fetch_cells().map_err(ScanError::Fetch)
    }

    fn fill(&mut self) -> Result<(), ScanError<F::Error>> {
        let buffer = self.fetch()?;
        for cell in self.scan.decode_buffer(&buffer).map_err(ScanError::widen)? {
            self.pending.push_back(cell.to_cell()?);
        }
        Ok(())
    }
}

impl<F: FetchCells> Iterator for CellScanner<F> {
    type Item = Result<Cell, ScanError<F::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(cell) = self.pending.pop_front() {
                return Some(Ok(cell));
            }
            if self.failed || self.scan.is_done() {
                return None;
            }
            if let Err(e) = self.fill() {
                self.failed = true;
                self.pending.clear();
                return Some(Err(e));
            }
        }
    }
}

// ── Async driver ──────────────────────────────────────────────────────────────

/// Run a chunked scan where each fetch is a future.
///
/// `fetch` is called once per FLUSH. Dropping the returned future cancels
/// the scan at its current fetch; no cell is delivered twice.
pub async fn scan_async<Fetch, Fut, E, S>(
    mut fetch: Fetch,
    limits: ScanLimits,
    mut sink: S,
) -> Result<ScanSummary, ScanError<E>>
where
    Fetch: FnMut() -> Fut,
    Fut: Future<Output = Result<Bytes, E>>,
    S: FnMut(CellRef<'_>),
{
    let mut scan = ChunkedScan::new(limits);
    while !scan.is_done() {
        scan.start_fetch()?;
        let buffer = fetch().await.map_err(ScanError::Fetch)?;
        for cell in scan.decode_buffer(&buffer).map_err(ScanError::widen)? {
            sink(cell);
        }
    }
    Ok(scan.summary())
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// The server or the driver broke the continuation protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    #[error("buffer ended without a sentinel")]
    MissingSentinel,

    #[error("scan still unfinished after {0} fetches")]
    TooManyFetches(u64),

    #[error("fetch issued while scan is {0:?}")]
    FetchWhile(ScanState),

    #[error("buffer delivered while scan is {0:?}")]
    BufferWhile(ScanState),

    #[error("sentinel reached while scan is {0:?}")]
    SentinelWhile(ScanState),
}

/// Errors ending a scan. `E` is the fetcher's own error type.
#[derive(Debug, thiserror::Error)]
pub enum ScanError<E = Infallible> {
    #[error("scan protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    #[error("scan buffer could not be decoded: {0}")]
    Codec(CodecError),

    #[error("fetch failed: {0}")]
    Fetch(#[source] E),
}

impl<E> ScanError<E> {
    /// Sort a decode error: a buffer cut before its sentinel is the
    /// server's fault, anything else is a codec error.
    pub fn from_codec(error: CodecError) -> Self {
        match error {
            CodecError::MalformedBuffer {
                reason: MalformedReason::MissingSentinel,
                ..
            } => ScanError::Protocol(ProtocolViolation::MissingSentinel),
            other => ScanError::Codec(other),
        }
    }
}

impl<E> From<CodecError> for ScanError<E> {
    fn from(error: CodecError) -> Self {
        ScanError::from_codec(error)
    }
}

impl ScanError<Infallible> {
    /// Lift a fetch-free error into any driver's error type.
    pub fn widen<E>(self) -> ScanError<E> {
        match self {
            ScanError::Protocol(p) => ScanError::Protocol(p),
            ScanError::Codec(c) => ScanError::Codec(c),
            ScanError::Fetch(never) => match never {},
        }
    }
}
