//! cellwire-core — the serialized cells codec.
//!
//! Cells travel between client and server packed into one buffer per
//! payload instead of one round-trip per cell. [`CellsWriter`] builds such
//! a buffer, [`CellsReader`] walks it. The layout itself lives in [`wire`].

pub mod cell;
pub mod config;
pub mod reader;
pub mod wire;
pub mod writer;

pub use cell::{Cell, CellFlag, AUTO_TIMESTAMP};
pub use config::CellwireConfig;
pub use reader::{CellRef, CellsReader};
pub use wire::{
    CodecError, EncodingFault, MalformedReason, Sentinel, EMPTY_BUFFER_LEN, SEAL_EOS, SEAL_FLUSH,
};
pub use writer::{CellsWriter, Growth};
