//! In-memory store speaking the serialized cells protocol.
//!
//! Implements both collaborator operations in-process: bulk mutations
//! arrive as serialized buffers, scans are served as a sequence of
//! FLUSH-sealed buffers ending in EOS. Used to exercise the codec end to
//! end without a real server.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use cellwire_core::config::ScanConfig;
use cellwire_core::{Cell, CellFlag, CellsReader, CodecError, AUTO_TIMESTAMP};
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::fetch::{FetchCells, SetCellsSerialized};
use crate::producer::{serialize_cells, ChunkProducer};

/// (row, column family, column qualifier)
type CellKey = (Bytes, String, String);

/// Versions of one cell, newest first.
type Versions = BTreeMap<Reverse<i64>, Bytes>;

type Producer = ChunkProducer<std::vec::IntoIter<Cell>>;

/// What a scanner returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSpec {
    /// First row, inclusive. `None` starts at the beginning.
    pub start_row: Option<Bytes>,
    /// Last row, inclusive. `None` runs to the end.
    pub end_row: Option<Bytes>,
    /// Column families to return. Empty returns all.
    pub columns: Vec<String>,
    /// Newest versions kept per cell. Zero keeps all.
    pub max_versions: usize,
}

impl ScanSpec {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn rows(start: impl Into<Bytes>, end: impl Into<Bytes>) -> Self {
        Self {
            start_row: Some(start.into()),
            end_row: Some(end.into()),
            ..Self::default()
        }
    }

    pub fn max_versions(mut self, n: usize) -> Self {
        self.max_versions = n;
        self
    }

    pub fn column(mut self, family: impl Into<String>) -> Self {
        self.columns.push(family.into());
        self
    }
}

#[derive(Default)]
struct Table {
    cells: BTreeMap<CellKey, Versions>,
}

impl Table {
    /// Drop versions of one cell matching `doomed`.
    fn trim(&mut self, key: &CellKey, doomed: impl Fn(i64) -> bool) {
        if let Some(versions) = self.cells.get_mut(key) {
            versions.retain(|Reverse(ts), _| !doomed(*ts));
            if versions.is_empty() {
                self.cells.remove(key);
            }
        }
    }

    /// Drop versions at or below `cutoff` for every cell of a row, or of
    /// one family within it.
    fn delete_prefix(&mut self, row: &Bytes, family: Option<&str>, cutoff: i64) {
        let start = (row.clone(), family.unwrap_or_default().to_owned(), String::new());
        let keys: Vec<CellKey> = self
            .cells
            .range(start..)
            .take_while(|((r, f, _), _)| r == row && family.map_or(true, |family| f == family))
            .map(|(key, _)| key.clone())
            .collect();
        for key in keys {
            self.trim(&key, |ts| ts <= cutoff);
        }
    }
}

/// Shared handle to one in-memory table. Clones see the same data.
#[derive(Clone)]
pub struct MemoryStore {
    table: Arc<RwLock<Table>>,
    /// scanner id → producer
    scanners: Arc<DashMap<u64, Producer>>,
    next_scanner: Arc<AtomicU64>,
    clock: Arc<AtomicI64>,
    next_threshold: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(&ScanConfig::default())
    }
}

impl MemoryStore {
    pub fn new(config: &ScanConfig) -> Self {
        Self {
            table: Arc::new(RwLock::new(Table::default())),
            scanners: Arc::new(DashMap::new()),
            next_scanner: Arc::new(AtomicU64::new(0)),
            clock: Arc::new(AtomicI64::new(0)),
            next_threshold: config.next_threshold,
        }
    }

    // ── Mutations ────────────────────────────────────────────────────────────

    /// Apply every cell of a serialized buffer. Returns the cell count.
    ///
    /// The buffer is decoded and checked in full first; a rejected buffer
    /// changes nothing.
    pub fn apply_serialized(&self, buffer: &[u8]) -> Result<usize, StoreError> {
        let mut cells = Vec::new();
        for cell in CellsReader::from_slice(buffer)? {
            let cell = cell?.to_cell()?;
            if !is_supported(cell.flag) {
                return Err(StoreError::UnsupportedFlag(cell.flag));
            }
            cells.push(cell);
        }

        let count = cells.len();
        let mut table = self.table.write();
        for cell in cells {
            self.apply(&mut table, cell);
        }
        tracing::debug!(cells = count, bytes = buffer.len(), "mutation buffer applied");
        Ok(count)
    }

    /// Row deletes ignore family and qualifier; family deletes ignore the
    /// qualifier.
    fn apply(&self, table: &mut Table, cell: Cell) {
        let ts = if cell.timestamp == AUTO_TIMESTAMP {
            self.tick()
        } else {
            cell.timestamp
        };
        let key = (cell.row, cell.column_family, cell.column_qualifier);
        match cell.flag {
            CellFlag::INSERT => {
                table.cells.entry(key).or_default().insert(Reverse(ts), cell.value);
            }
            CellFlag::DELETE_ROW => table.delete_prefix(&key.0, None, ts),
            CellFlag::DELETE_CF => table.delete_prefix(&key.0, Some(&key.1), ts),
            CellFlag::DELETE_CELL => table.trim(&key, |v| v <= ts),
            CellFlag::DELETE_CELL_VERSION => table.trim(&key, |v| v == ts),
            _ => {}
        }
    }

    /// Strictly increasing nanosecond clock for auto-assigned timestamps.
    fn tick(&self) -> i64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        let mut prev = self.clock.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match self
                .clock
                .compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    /// Matching cells in row, family, qualifier order, newest version first.
    pub fn cells(&self, spec: &ScanSpec) -> Vec<Cell> {
        let table = self.table.read();
        let start = (
            spec.start_row.clone().unwrap_or_default(),
            String::new(),
            String::new(),
        );
        let limit = match spec.max_versions {
            0 => usize::MAX,
            n => n,
        };

        let mut out = Vec::new();
        for ((row, family, qualifier), versions) in table.cells.range(start..) {
            if spec.end_row.as_ref().is_some_and(|end| row > end) {
                break;
            }
            if !spec.columns.is_empty() && !spec.columns.iter().any(|c| c == family) {
                continue;
            }
            for (Reverse(ts), value) in versions.iter().take(limit) {
                out.push(Cell {
                    row: row.clone(),
                    column_family: family.clone(),
                    column_qualifier: qualifier.clone(),
                    timestamp: *ts,
                    value: value.clone(),
                    flag: CellFlag::INSERT,
                });
            }
        }
        out
    }

    /// Every matching cell in one EOS buffer.
    pub fn get_cells_serialized(&self, spec: &ScanSpec) -> Result<Bytes, StoreError> {
        Ok(serialize_cells(self.cells(spec), self.next_threshold)?)
    }

    // ── Scanners ─────────────────────────────────────────────────────────────

    /// Open a scanner over a snapshot of the matching cells.
    pub fn open_scanner(&self, spec: &ScanSpec) -> u64 {
        let cells = self.cells(spec);
        let id = self.next_scanner.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(
            scanner = id,
            cells = cells.len(),
            start_row = spec.start_row.as_ref().map(hex::encode).unwrap_or_default(),
            "scanner opened"
        );
        self.scanners
            .insert(id, ChunkProducer::new(cells, self.next_threshold));
        id
    }

    /// The scanner's next buffer, at most `next_threshold` bytes unless a
    /// single cell is larger.
    pub fn scanner_get_cells_serialized(&self, id: u64) -> Result<Bytes, StoreError> {
        let mut producer = self
            .scanners
            .get_mut(&id)
            .ok_or(StoreError::UnknownScanner(id))?;
        let buffer = producer.next_buffer()?;
        tracing::trace!(scanner = id, bytes = buffer.len(), "scanner buffer served");
        Ok(buffer)
    }

    /// The scanner's next row, alone in one buffer.
    pub fn scanner_get_row_serialized(&self, id: u64) -> Result<Bytes, StoreError> {
        let mut producer = self
            .scanners
            .get_mut(&id)
            .ok_or(StoreError::UnknownScanner(id))?;
        Ok(producer.next_row_buffer()?)
    }

    pub fn close_scanner(&self, id: u64) -> Result<(), StoreError> {
        match self.scanners.remove(&id) {
            Some((_, producer)) => {
                tracing::debug!(
                    scanner = id,
                    buffers = producer.buffers_produced(),
                    "scanner closed"
                );
                Ok(())
            }
            None => Err(StoreError::UnknownScanner(id)),
        }
    }

    pub fn open_scanners(&self) -> usize {
        self.scanners.len()
    }

    /// Open a scanner wrapped as a [`FetchCells`]. The scanner closes when
    /// the handle is dropped.
    pub fn scanner(&self, spec: &ScanSpec) -> StoreScanner {
        StoreScanner {
            id: self.open_scanner(spec),
            store: self.clone(),
        }
    }
}

fn is_supported(flag: CellFlag) -> bool {
    matches!(
        flag,
        CellFlag::INSERT
            | CellFlag::DELETE_ROW
            | CellFlag::DELETE_CF
            | CellFlag::DELETE_CELL
            | CellFlag::DELETE_CELL_VERSION
    )
}

impl SetCellsSerialized for MemoryStore {
    type Error = StoreError;

    fn set_cells_serialized(&mut self, buffer: Bytes) -> Result<(), StoreError> {
        self.apply_serialized(&buffer).map(|_| ())
    }
}

/// One open scanner on a [`MemoryStore`].
pub struct StoreScanner {
    store: MemoryStore,
    id: u64,
}

impl StoreScanner {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl FetchCells for StoreScanner {
    type Error = StoreError;

    fn fetch_cells(&mut self) -> Result<Bytes, StoreError> {
        self.store.scanner_get_cells_serialized(self.id)
    }
}

impl Drop for StoreScanner {
    fn drop(&mut self) {
        self.store.scanners.remove(&self.id);
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("no open scanner with id {0}")]
    UnknownScanner(u64),

    #[error("unsupported mutation flag {0}")]
    UnsupportedFlag(CellFlag),

    #[error(transparent)]
    Codec(#[from] CodecError),
}
