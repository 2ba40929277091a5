//! # maptiles
//!
//! Serves map tiles addressed by layer, zoom level, column and row. Tiles are read from a
//! content-addressed SQLite cache when present and rendered on a miss by a pool of workers
//! per layer, each owning its own renderer.
//!
//! ```no_run
//! use maptiles::{multiplex::LayerMultiplex, render::dummy_renderer_factory, server::TileServer};
//! use maptiles_cache::TileDb;
//! use maptiles_core::TileCoord;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let multiplex = LayerMultiplex::default_render_multiplex("#dde4ee", 4, dummy_renderer_factory());
//!     let cache = TileDb::open(Path::new("cache.mbtiles"))?;
//!     let server = TileServer::new(Some(cache), multiplex);
//!
//!     let tile = server.get_tile(TileCoord::new(3, 4, 2)?).await?;
//!     println!("{} bytes", tile.map_or(0, |blob| blob.len()));
//!
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod multiplex;
pub mod render;
pub mod server;

pub use maptiles_cache as cache;
pub use maptiles_core as core;
