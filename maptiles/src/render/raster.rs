//! Block rendering on top of a raster engine.
//!
//! [`RasterRenderer`] asks a [`Rasterizer`] for one image covering a whole block of tiles
//! and cuts it into tile sized PNGs. The rasterizer is told the area in geographic and
//! Web Mercator coordinates, the output size in pixels, and how many pixels of context
//! to render around the edges so labels and symbols line up across tiles.

use super::Renderer;
use anyhow::{Context, Result, ensure};
use image::{ExtendedColorType, ImageEncoder, RgbaImage, codecs::png::PngEncoder, imageops};
use log::trace;
use maptiles_core::{Blob, GeoBBox, MetaTileCoord, TileCoord, TileError, TileFetchResult, TileScheme};

/// Edge length of one tile in pixels.
pub const TILE_SIZE: u32 = 256;
/// Pixels rendered around a block but not included in it.
pub const BUFFER_SIZE: u32 = 128;

/// Area handed to a [`Rasterizer`]. North is up, so pixel row 0 is the northern edge.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderArea {
	pub level: u8,
	pub bbox: GeoBBox,
	/// `bbox` in EPSG:3857 meters.
	pub mercator: [f64; 4],
	pub width: u32,
	pub height: u32,
	pub buffer: u32,
}

/// A raster engine producing one image of exactly `width` × `height` pixels per call.
pub trait Rasterizer: Send {
	fn rasterize(&mut self, area: &RenderArea) -> Result<RgbaImage>;
}

pub struct RasterRenderer<R: Rasterizer> {
	rasterizer: R,
	tile_size: u32,
	buffer_size: u32,
}

impl<R: Rasterizer> RasterRenderer<R> {
	pub fn new(rasterizer: R) -> RasterRenderer<R> {
		RasterRenderer {
			rasterizer,
			tile_size: TILE_SIZE,
			buffer_size: BUFFER_SIZE,
		}
	}

	fn rasterize_block(&mut self, block: &MetaTileCoord) -> Result<RgbaImage> {
		let bbox = block.to_geo_bbox();
		let area = RenderArea {
			level: block.level(),
			bbox,
			mercator: bbox.to_mercator(),
			width: block.x_size() * self.tile_size,
			height: block.y_size() * self.tile_size,
			buffer: self.buffer_size,
		};
		trace!("rasterize {block:?} as {}x{} px", area.width, area.height);

		let image = self
			.rasterizer
			.rasterize(&area)
			.with_context(|| format!("rasterizing {block:?}"))?;
		ensure!(
			image.dimensions() == (area.width, area.height),
			"rasterizer returned {}x{} px instead of {}x{} px",
			image.width(),
			image.height(),
			area.width,
			area.height
		);
		Ok(image)
	}
}

impl<R: Rasterizer> Renderer for RasterRenderer<R> {
	fn render_tile(&mut self, coord: &TileCoord) -> Result<Blob, TileError> {
		let image = self
			.rasterize_block(&MetaTileCoord::from_tile(coord))
			.map_err(TileError::render)?;
		encode_png(&image).map_err(TileError::render)
	}

	fn render_meta_tile(&mut self, coord: &MetaTileCoord) -> Result<Vec<TileFetchResult>, TileError> {
		let image = self.rasterize_block(coord).map_err(TileError::render)?;

		let coords = coord.tile_coords();
		if let [single] = coords.as_slice() {
			return Ok(vec![TileFetchResult::from_result(
				single.clone(),
				encode_png(&image).map_err(TileError::render),
			)]);
		}

		// pixel offsets are counted from the north-west corner
		let origin = coord.to_scheme(TileScheme::Xyz);
		let size = self.tile_size;
		Ok(coords
			.into_iter()
			.map(|tile| {
				let xyz = tile.to_scheme(TileScheme::Xyz);
				let left = (xyz.x - origin.x_min()) * size;
				let top = (xyz.y - origin.y_min()) * size;
				let slice = imageops::crop_imm(&image, left, top, size, size).to_image();
				TileFetchResult::from_result(tile, encode_png(&slice).map_err(TileError::render))
			})
			.collect())
	}
}

/// Encodes an RGBA image as PNG.
pub fn encode_png(image: &RgbaImage) -> Result<Blob> {
	let mut buffer: Vec<u8> = Vec::new();
	PngEncoder::new(&mut buffer)
		.write_image(image.as_raw(), image.width(), image.height(), ExtendedColorType::Rgba8)
		.context("encoding PNG")?;
	Ok(Blob::from(buffer))
}

#[cfg(test)]
mod tests {
	use super::*;
	use image::{ImageFormat, Rgba, load_from_memory_with_format};
	use std::sync::{Arc, Mutex};

	/// Paints every pixel with the index of the tile it falls into: red = column, green = row.
	#[derive(Default)]
	struct Quadrants {
		areas: Arc<Mutex<Vec<RenderArea>>>,
	}

	impl Rasterizer for Quadrants {
		fn rasterize(&mut self, area: &RenderArea) -> Result<RgbaImage> {
			self.areas.lock().unwrap().push(area.clone());
			Ok(RgbaImage::from_fn(area.width, area.height, |x, y| {
				Rgba([(x / TILE_SIZE) as u8, (y / TILE_SIZE) as u8, 0, 255])
			}))
		}
	}

	struct WrongSize;

	impl Rasterizer for WrongSize {
		fn rasterize(&mut self, _area: &RenderArea) -> Result<RgbaImage> {
			Ok(RgbaImage::new(10, 10))
		}
	}

	fn decode(result: &TileFetchResult) -> RgbaImage {
		let blob = result.blob.as_ref().unwrap();
		load_from_memory_with_format(blob.as_slice(), ImageFormat::Png)
			.unwrap()
			.to_rgba8()
	}

	#[test]
	fn single_tile() {
		let quadrants = Quadrants::default();
		let areas = quadrants.areas.clone();
		let mut renderer = RasterRenderer::new(quadrants);

		let coord = TileCoord::new(2, 1, 1).unwrap();
		let blob = renderer.render_tile(&coord).unwrap();
		let image = decode(&TileFetchResult::found(coord.clone(), blob));
		assert_eq!(image.dimensions(), (256, 256));

		let area = areas.lock().unwrap()[0].clone();
		assert_eq!((area.width, area.height, area.buffer), (256, 256, 128));
		assert_eq!(area.bbox, coord.to_geo_bbox());
	}

	#[test]
	fn block_is_sliced_in_decomposition_order() {
		let quadrants = Quadrants::default();
		let areas = quadrants.areas.clone();
		let mut renderer = RasterRenderer::new(quadrants);

		let block = MetaTileCoord::new("osm", 3, 1, 1, 2, 2, TileScheme::Xyz).unwrap();
		let results = renderer.render_meta_tile(&block).unwrap();

		let coords: Vec<TileCoord> = results.iter().map(|r| r.coord.clone()).collect();
		assert_eq!(coords, block.tile_coords());

		let pixels: Vec<[u8; 2]> = results
			.iter()
			.map(|r| {
				let image = decode(r);
				assert_eq!(image.dimensions(), (256, 256));
				let Rgba([red, green, ..]) = *image.get_pixel(128, 128);
				[red, green]
			})
			.collect();
		assert_eq!(pixels, vec![[0, 0], [0, 1], [1, 0], [1, 1]]);

		let area = areas.lock().unwrap()[0].clone();
		assert_eq!((area.width, area.height), (512, 512));
		assert_eq!(area.bbox, block.to_geo_bbox());
	}

	#[test]
	fn tms_block_slices_from_the_north() {
		let mut renderer = RasterRenderer::new(Quadrants::default());

		// tms rows 5..=6 at level 3 are xyz rows 1..=2
		let block = MetaTileCoord::new("", 3, 0, 5, 0, 6, TileScheme::Tms).unwrap();
		let results = renderer.render_meta_tile(&block).unwrap();
		assert_eq!(results[0].coord.y, 5);
		assert_eq!(results[1].coord.y, 6);

		// tms row 5 is the southern tile, so it is the lower half of the image
		assert_eq!(decode(&results[0]).get_pixel(0, 0).0[1], 1);
		assert_eq!(decode(&results[1]).get_pixel(0, 0).0[1], 0);
	}

	#[test]
	fn single_tile_block_matches_tile() {
		let mut renderer = RasterRenderer::new(Quadrants::default());
		let coord = TileCoord::new(4, 3, 9).unwrap();
		let results = renderer.render_meta_tile(&MetaTileCoord::from_tile(&coord)).unwrap();
		assert_eq!(results.len(), 1);
		assert_eq!(results[0].coord, coord);
		assert_eq!(results[0].blob, Some(renderer.render_tile(&coord).unwrap()));
	}

	#[test]
	fn wrong_image_size_fails_the_block() {
		let mut renderer = RasterRenderer::new(WrongSize);
		let block = MetaTileCoord::new("", 2, 0, 0, 1, 1, TileScheme::Xyz).unwrap();
		let err = renderer.render_meta_tile(&block).unwrap_err();
		assert!(matches!(err, TileError::Render(message) if message.contains("10x10 px instead of 512x512 px")));
	}
}
