//! The rendering capability used by the worker pools.
//!
//! A [`Renderer`] turns a tile or a block of tiles into encoded images. Instances are not
//! required to be thread safe: every worker owns exactly one and only ever calls it from
//! the blocking thread pool, one request at a time.

mod dummy;
mod raster;

pub use dummy::DummyRasterizer;
pub use raster::{BUFFER_SIZE, RasterRenderer, Rasterizer, RenderArea, TILE_SIZE, encode_png};

use anyhow::Result;
use maptiles_core::{Blob, MetaTileCoord, TileCoord, TileError, TileFetchResult};
use std::sync::Arc;

pub trait Renderer: Send {
	/// Renders one tile.
	fn render_tile(&mut self, coord: &TileCoord) -> Result<Blob, TileError>;

	/// Renders a block and returns exactly `coord.count()` results in `coord.tile_coords()` order.
	///
	/// An `Err` fails the whole block; per-tile failures go into the individual results.
	fn render_meta_tile(&mut self, coord: &MetaTileCoord) -> Result<Vec<TileFetchResult>, TileError>;
}

/// Builds a renderer for a stylesheet. Called once per worker, and again if the worker lost it.
pub type RendererFactory = Arc<dyn Fn(&str) -> Result<Box<dyn Renderer>> + Send + Sync>;

/// Factory for [`RasterRenderer`]s over a [`DummyRasterizer`], with the stylesheet as colour.
pub fn dummy_renderer_factory() -> RendererFactory {
	Arc::new(|style: &str| {
		let renderer: Box<dyn Renderer> = Box::new(RasterRenderer::new(DummyRasterizer::from_style(style)?));
		Ok(renderer)
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn dummy_factory() {
		let factory = dummy_renderer_factory();
		assert!(factory("#ff0000").is_ok());
		assert!(factory("mapnik.xml").is_err());

		let mut renderer = factory("#00ff00").unwrap();
		let blob = renderer.render_tile(&TileCoord::new(1, 0, 0).unwrap()).unwrap();
		assert_eq!(&blob.as_slice()[1..4], b"PNG");
	}
}
