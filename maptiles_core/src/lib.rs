//! Contains the tile coordinate model, metatile decomposition, byte blobs and the
//! request/result types exchanged between renderers, caches and the dispatcher.

pub mod types;
pub use types::*;
