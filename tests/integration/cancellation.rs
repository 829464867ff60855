use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cellwire_scan::loopback::ScanSpec;
use cellwire_scan::{scan_async, serialize_cells, ScanLimits};

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Async scans and cancellation
// ══════════════════════════════════════════════════════════════════════════════

fn loaded_store() -> anyhow::Result<MemoryStore> {
    let store = store_with_threshold(1024);
    store.apply_serialized(&serialize_cells(sample_cells(1_000, 5), 4096)?)?;
    Ok(store)
}

/// An async scan over the loopback store sees every cell.
#[tokio::test]
async fn test_async_scan_completes() -> anyhow::Result<()> {
    init_tracing();
    let store = loaded_store()?;
    let id = store.open_scanner(&ScanSpec::all());

    let mut rows = Vec::new();
    let summary = scan_async(
        || {
            let store = store.clone();
            async move {
                tokio::task::yield_now().await;
                store.scanner_get_cells_serialized(id)
            }
        },
        ScanLimits::default(),
        |cell| rows.push(cell.row.to_vec()),
    )
    .await?;

    assert_eq!(rows.len(), 1_000);
    assert_eq!(summary.cells, 1_000);
    assert!(summary.fetches >= 2);
    store.close_scanner(id)?;
    Ok(())
}

/// Dropping a scan while it waits on a fetch leaves exactly the cells of
/// the buffers already decoded, in order, with nothing repeated.
#[tokio::test]
async fn test_cancel_between_fetches() -> anyhow::Result<()> {
    init_tracing();
    let store = loaded_store()?;
    let expected = store.cells(&ScanSpec::all());
    let id = store.open_scanner(&ScanSpec::all());
    let fetches = Arc::new(AtomicUsize::new(0));

    let mut seen = Vec::new();
    let scan = scan_async(
        || {
            let store = store.clone();
            let call = fetches.fetch_add(1, Ordering::SeqCst);
            async move {
                if call >= 2 {
                    // third fetch never completes
                    std::future::pending::<()>().await;
                }
                store.scanner_get_cells_serialized(id)
            }
        },
        ScanLimits::default(),
        |cell| seen.push(cell.to_cell()),
    );
    let outcome = tokio::time::timeout(Duration::from_millis(200), scan).await;
    assert!(outcome.is_err(), "scan should still be waiting on its third fetch");

    let seen = seen.into_iter().collect::<Result<Vec<_>, _>>()?;
    assert_eq!(fetches.load(Ordering::SeqCst), 3);
    assert!(!seen.is_empty());
    assert!(seen.len() < expected.len());
    assert_eq!(seen[..], expected[..seen.len()]);

    store.close_scanner(id)?;
    Ok(())
}

/// A spawned scan can be aborted mid-fetch; the store keeps serving
/// other scanners.
#[tokio::test]
async fn test_abort_spawned_scan() -> anyhow::Result<()> {
    init_tracing();
    let store = loaded_store()?;
    let id = store.open_scanner(&ScanSpec::all());

    let handle = tokio::spawn({
        let store = store.clone();
        async move {
            scan_async(
                move || {
                    let store = store.clone();
                    async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        store.scanner_get_cells_serialized(id)
                    }
                },
                ScanLimits::default(),
                |_| {},
            )
            .await
        }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());

    store.close_scanner(id)?;
    let other = store.open_scanner(&ScanSpec::all());
    assert!(store.scanner_get_cells_serialized(other)?.len() > 6);
    store.close_scanner(other)?;
    Ok(())
}
