//! Content-addressed tile cache in an MBTiles 1.2 compatible SQLite file.
//!
//! - [`TileStore`]: synchronous reads and writes guarded by one reader/writer lock,
//! - [`TileDb`]: asynchronous fetch and insert pipelines on top of a store,
//! - [`CacheStats`]: what a cache file holds.
//!
//! Identical tile images are stored once, keyed by the SHA-256 of their bytes. The
//! `default` layer is also readable as a plain MBTiles `tiles` table.

mod checksum;
pub use checksum::checksum;

mod schema;

mod stats;
pub use stats::*;

mod store;
pub use store::*;

mod tile_db;
pub use tile_db::*;
