use cellwire_core::{CellFlag, CellwireConfig, CellsWriter, AUTO_TIMESTAMP, SEAL_EOS};
use cellwire_scan::loopback::ScanSpec;
use cellwire_scan::{BulkMutator, CellScanner, ScanLimits, SetCellsSerialized};

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Write path — mutations in, scan out
// ══════════════════════════════════════════════════════════════════════════════

/// Cells written through the bulk mutator come back through a chunked scan.
#[test]
fn test_mutator_then_scan() -> anyhow::Result<()> {
    init_tracing();
    let store = store_with_threshold(1024);

    let mut config = CellwireConfig::default();
    config.mutator.flush_bytes = 4096;
    let mut mutator = BulkMutator::new(store.clone(), &config);
    let input = sample_cells(1_000, 4);
    for cell in &input {
        mutator.set_cell(cell)?;
    }
    let stats = mutator.stats();
    mutator.close()?;
    assert!(stats.buffers >= 1, "flush_bytes should have forced early submits");

    let scanned = CellScanner::new(store.scanner(&ScanSpec::all()), ScanLimits::default())
        .collect_cells()?;
    assert_eq!(scanned, input);
    Ok(())
}

/// Auto timestamps order versions; deletes of each scope remove what they cover.
#[test]
fn test_mutations_and_deletes() -> anyhow::Result<()> {
    init_tracing();
    let store = store_with_threshold(1024);
    let mut mutator = BulkMutator::new(store.clone(), &CellwireConfig::default());

    mutator.set(b"user-1", "profile", "name", AUTO_TIMESTAMP, b"ada", CellFlag::INSERT)?;
    mutator.set(b"user-1", "profile", "name", AUTO_TIMESTAMP, b"ada l.", CellFlag::INSERT)?;
    mutator.set(b"user-1", "profile", "email", 50, b"a@x", CellFlag::INSERT)?;
    mutator.set(b"user-1", "stats", "visits", 50, b"7", CellFlag::INSERT)?;
    mutator.set(b"user-2", "profile", "name", 50, b"bob", CellFlag::INSERT)?;
    mutator.flush()?;

    let names = store.cells(&ScanSpec::rows("user-1", "user-1").column("profile"));
    let values: Vec<_> = names.iter().map(|c| c.value.as_ref()).collect();
    assert_eq!(values, [&b"a@x"[..], &b"ada l."[..], &b"ada"[..]]);

    mutator.set(b"user-1", "stats", "", 100, b"", CellFlag::DELETE_CF)?;
    mutator.set(b"user-2", "profile", "", AUTO_TIMESTAMP, b"", CellFlag::DELETE_ROW)?;
    mutator.close()?;

    let left = store.cells(&ScanSpec::all());
    assert!(left.iter().all(|c| c.row.as_ref() == b"user-1"));
    assert!(left.iter().all(|c| c.column_family == "profile"));
    assert_eq!(left.len(), 3);
    Ok(())
}

/// The empty qualifier and empty value case survives the whole path.
#[test]
fn test_empty_qualifier_and_value() -> anyhow::Result<()> {
    init_tracing();
    let mut store = store_with_threshold(1024);

    let mut writer = CellsWriter::new(64, true);
    writer.add(b"row0", "col", "", 7, b"", 0, CellFlag::INSERT)?;
    writer.finalize(SEAL_EOS)?;
    store.set_cells_serialized(writer.into_bytes()?)?;

    let cells = CellScanner::new(store.scanner(&ScanSpec::all()), ScanLimits::default())
        .collect_cells()?;
    assert_eq!(cells.len(), 1);
    let cell = &cells[0];
    assert_eq!(cell.row.as_ref(), b"row0");
    assert_eq!(cell.column_family, "col");
    assert_eq!(cell.column_qualifier, "");
    assert!(cell.value.is_empty());
    assert_eq!(cell.timestamp, 7);
    assert_eq!(cell.flag, CellFlag(255));
    Ok(())
}
