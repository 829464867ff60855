use cellwire_core::{CellFlag, CellsReader, CellsWriter, CodecError, Growth, SEAL_EOS};

use crate::*;

// ══════════════════════════════════════════════════════════════════════════════
//  Scale — one growable writer, a million records
// ══════════════════════════════════════════════════════════════════════════════

const RECORDS: usize = 1_000_000;

/// Rows are written in a scrambled order so sorting is meaningful.
fn record(i: usize) -> (String, i64, String) {
    let key = (i * 7919) % RECORDS;
    (format!("r{key:07}"), key as i64, format!("{i:06}"))
}

/// A writer started at 32,896 bytes must absorb 1,000,000 ~40-byte
/// records and give every one of them back.
#[test]
fn test_million_records_round_trip() -> anyhow::Result<()> {
    init_tracing();

    let mut writer = CellsWriter::new(32_896, true);
    let mut expected = Vec::with_capacity(RECORDS);
    for i in 0..RECORDS {
        let (row, ts, value) = record(i);
        writer.add(
            row.as_bytes(),
            "col",
            "q",
            ts,
            value.as_bytes(),
            value.len(),
            CellFlag::INSERT,
        )?;
        expected.push((row, ts, value));
    }
    writer.finalize(SEAL_EOS)?;
    assert_eq!(writer.record_count(), RECORDS);
    assert!(writer.capacity() > 32_896);

    let buffer = writer.get()?;
    let mut reader = CellsReader::new(buffer, buffer.len())?;
    let mut decoded = Vec::with_capacity(RECORDS);
    while reader.has_next()? {
        let cell = reader.current_cell()?;
        assert_eq!(cell.column_family, b"col");
        assert_eq!(cell.flag, CellFlag::INSERT);
        decoded.push((
            String::from_utf8(cell.row.to_vec())?,
            cell.timestamp,
            cell.value_as_string().into_owned(),
        ));
    }
    assert!(reader.eos());
    assert!(!reader.flush());
    assert_eq!(decoded.len(), RECORDS);

    expected.sort();
    decoded.sort();
    assert_eq!(decoded, expected);
    Ok(())
}

/// A fixed writer refuses the overflowing cell and keeps what it had.
#[test]
fn test_fixed_capacity_rejects_overflow() -> anyhow::Result<()> {
    init_tracing();

    let mut writer = CellsWriter::with_growth(128, Growth::Fixed);
    let mut accepted = 0;
    let err = loop {
        let row = format!("row{accepted}");
        match writer.add(row.as_bytes(), "col", "q", 1, b"0123456789", 10, CellFlag::INSERT) {
            Ok(()) => accepted += 1,
            Err(e) => break e,
        }
    };
    assert!(matches!(err, CodecError::CapacityExceeded { capacity: 128, .. }));
    assert!(accepted > 0);
    assert_eq!(writer.capacity(), 128);

    writer.finalize(SEAL_EOS)?;
    let (cells, sentinel) = decode(writer.get()?)?;
    assert_eq!(cells.len(), accepted);
    assert_eq!(sentinel, cellwire_core::Sentinel::Eos);
    assert!(writer.length() <= 128);
    Ok(())
}
