//! cellwire integration test harness.
//!
//! Everything runs in-process: the loopback store plays the server, so no
//! network or external service is needed.
//!
//!   cargo test --test integration
//!   RUST_LOG=cellwire_scan=debug cargo test --test integration -- --nocapture
//!
//! Each test builds its own store; nothing is shared between tests.

use std::sync::Once;

use cellwire_core::config::ScanConfig;
use cellwire_core::{Cell, CellsReader, Sentinel};
use cellwire_scan::loopback::MemoryStore;

mod cancellation;
mod chunked;
mod config;
mod scale;
mod write_path;

// ── Harness ───────────────────────────────────────────────────────────────────

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once per process, filtered by RUST_LOG.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A store whose scanners cut buffers at `next_threshold` bytes.
pub fn store_with_threshold(next_threshold: usize) -> MemoryStore {
    MemoryStore::new(&ScanConfig {
        next_threshold,
        ..ScanConfig::default()
    })
}

/// `n` inserts over `n / per_row` rows, with explicit timestamps.
pub fn sample_cells(n: usize, per_row: usize) -> Vec<Cell> {
    (0..n)
        .map(|i| {
            Cell::insert(
                format!("row-{:06}", i / per_row),
                "col",
                format!("q{:03}", i % per_row),
                format!("value-{i}"),
            )
            .with_timestamp(1_000 + i as i64)
        })
        .collect()
}

/// Decode one buffer fully, returning its cells and how it was sealed.
pub fn decode(buffer: &[u8]) -> anyhow::Result<(Vec<Cell>, Sentinel)> {
    let mut reader = CellsReader::from_slice(buffer)?;
    let mut cells = Vec::new();
    while reader.has_next()? {
        cells.push(reader.get_cell()?);
    }
    let sentinel = reader
        .sentinel()
        .ok_or_else(|| anyhow::anyhow!("reader finished without a sentinel"))?;
    Ok((cells, sentinel))
}
