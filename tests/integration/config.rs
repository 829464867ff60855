use cellwire_core::CellwireConfig;
use cellwire_scan::loopback::ScanSpec;
use cellwire_scan::{serialize_cells, BulkMutator, CellScanner, ScanLimits};

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Configuration — file values reach writers, scanners and mutators
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_config_file_drives_scan_and_mutator() -> anyhow::Result<()> {
    init_tracing();
    let dir = std::env::temp_dir().join(format!("cellwire-it-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("config.toml");
    std::fs::write(
        &path,
        "[writer]\n\
         initial_capacity = 256\n\
         \n\
         [scan]\n\
         next_threshold = 700\n\
         max_fetches = 4\n\
         \n\
         [mutator]\n\
         flush_bytes = 1000\n",
    )?;

    let config = CellwireConfig::from_file(&path)?;
    assert!(config.writer.grow);
    assert_eq!(config.writer.build().capacity(), 256);

    let store = MemoryStore::new(&config.scan);
    let mut mutator = BulkMutator::new(store.clone(), &config);
    for cell in sample_cells(200, 10) {
        mutator.set_cell(&cell)?;
    }
    mutator.close()?;
    assert_eq!(store.cells(&ScanSpec::all()).len(), 200);

    // 200 cells at 700 bytes a buffer need far more than four fetches
    let limits = ScanLimits::from(&config.scan);
    let err = CellScanner::new(store.scanner(&ScanSpec::all()), limits)
        .collect_cells()
        .unwrap_err();
    assert!(err.to_string().contains("4 fetches"), "unexpected error: {err}");

    let single = serialize_cells(store.cells(&ScanSpec::all()), config.writer.initial_capacity)?;
    let (cells, _) = decode(&single)?;
    assert_eq!(cells.len(), 200);

    let _ = std::fs::remove_dir_all(&dir);
    Ok(())
}
