use cellwire_core::Sentinel;
use cellwire_scan::loopback::ScanSpec;
use cellwire_scan::{serialize_cells, CellScanner, ScanLimits, ScanState};

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Chunked scans — results spread over many buffers
// ══════════════════════════════════════════════════════════════════════════════

fn loaded_store(threshold: usize, cells: usize) -> anyhow::Result<MemoryStore> {
    let store = store_with_threshold(threshold);
    store.apply_serialized(&serialize_cells(sample_cells(cells, 10), 4096)?)?;
    Ok(store)
}

/// Every cell comes back exactly once, in store order, over several fetches.
#[test]
fn test_chunked_scan_yields_every_cell_once() -> anyhow::Result<()> {
    init_tracing();
    let store = loaded_store(2048, 2_000)?;
    let expected = store.cells(&ScanSpec::all());
    assert_eq!(expected.len(), 2_000);

    let mut scanner = CellScanner::new(store.scanner(&ScanSpec::all()), ScanLimits::default());
    let mut scanned = Vec::new();
    for cell in scanner.by_ref() {
        scanned.push(cell?);
    }

    assert_eq!(scanned, expected);
    assert_eq!(scanner.state(), ScanState::Done);
    let summary = scanner.summary();
    assert!(summary.fetches >= 2, "expected several buffers, got {}", summary.fetches);
    assert_eq!(summary.cells, 2_000);
    Ok(())
}

/// Buffers served by a scanner stay under the threshold, never split a
/// record, and are sealed FLUSH until the last one.
#[test]
fn test_scanner_buffers_are_self_contained() -> anyhow::Result<()> {
    init_tracing();
    let threshold = 1500;
    let store = loaded_store(threshold, 500)?;
    let id = store.open_scanner(&ScanSpec::all());

    let mut total = 0;
    let mut buffers = 0;
    loop {
        let buffer = store.scanner_get_cells_serialized(id)?;
        assert!(buffer.len() <= threshold, "buffer of {} bytes", buffer.len());
        let (cells, sentinel) = decode(&buffer)?;
        buffers += 1;
        total += cells.len();
        if sentinel == Sentinel::Eos {
            break;
        }
        assert!(!cells.is_empty(), "FLUSH buffer carried no cells");
    }
    store.close_scanner(id)?;

    assert_eq!(total, 500);
    assert!(buffers >= 2);
    Ok(())
}

/// A scan over a row range only sees those rows, still chunked.
#[test]
fn test_row_range_scan() -> anyhow::Result<()> {
    init_tracing();
    let store = loaded_store(512, 1_000)?;
    let spec = ScanSpec::rows("row-000010", "row-000019");

    let cells = CellScanner::new(store.scanner(&spec), ScanLimits::default()).collect_cells()?;

    assert_eq!(cells.len(), 100);
    assert_eq!(cells.first().map(|c| c.row.as_ref()), Some(&b"row-000010"[..]));
    assert_eq!(cells.last().map(|c| c.row.as_ref()), Some(&b"row-000019"[..]));
    Ok(())
}

/// Scanning an empty store takes one fetch of an empty EOS buffer.
#[test]
fn test_empty_scan_finishes_after_one_fetch() -> anyhow::Result<()> {
    init_tracing();
    let store = store_with_threshold(1024);
    let mut scanner = CellScanner::new(store.scanner(&ScanSpec::all()), ScanLimits::default());
    assert!(scanner.next().is_none());
    assert_eq!(scanner.summary().fetches, 1);
    assert_eq!(scanner.summary().cells, 0);
    Ok(())
}

/// The scanner on the store side is released when the client drops it.
#[test]
fn test_dropping_scanner_closes_it() -> anyhow::Result<()> {
    init_tracing();
    let store = loaded_store(256, 50)?;
    {
        let mut scanner = CellScanner::new(store.scanner(&ScanSpec::all()), ScanLimits::default());
        assert!(scanner.next().is_some());
        assert_eq!(store.open_scanners(), 1);
    }
    assert_eq!(store.open_scanners(), 0);
    Ok(())
}
