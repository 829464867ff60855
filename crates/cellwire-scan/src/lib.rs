//! cellwire-scan — moving serialized cells buffers between client and store.
//!
//! The client side drives the chunked-scan continuation protocol
//! ([`CellScanner`], [`scan_async`]) and batches mutations
//! ([`BulkMutator`]). The server side packs scan results into sealed
//! buffers ([`ChunkProducer`]). [`loopback::MemoryStore`] wires both ends
//! together in-process.

pub mod fetch;
pub mod loopback;
pub mod mutator;
pub mod producer;
pub mod scan;

pub use fetch::{BufferQueue, BufferSink, FetchCells, FetchFn, SetCellsSerialized};
pub use mutator::{BulkMutator, MutatorError, MutatorStats};
pub use producer::{serialize_cells, ChunkProducer};
pub use scan::{
    scan_async, CellScanner, ChunkedScan, ProtocolViolation, ScanError, ScanLimits, ScanState,
    ScanSummary,
};
