//! Rectangular blocks of tiles ("metatiles") rendered in one pass.
//!
//! A [`MetaTileCoord`] covers the inclusive column range `x_min..=x_max` and row range
//! `y_min..=y_max` of one zoom level and layer. The bounds are private so that
//! `x_max >= x_min` and `y_max >= y_min` hold for the whole life of the value.
//!
//! Decomposition into single tiles is column-major: columns ascend in the outer loop,
//! rows ascend in the inner loop.

use crate::{GeoBBox, TileCoord, TileScheme};
use anyhow::{Result, ensure};
use std::fmt::{self, Debug};

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MetaTileCoord {
	level: u8,
	x_min: u32,
	y_min: u32,
	x_max: u32,
	y_max: u32,
	scheme: TileScheme,
	layer: String,
}

impl MetaTileCoord {
	/// Creates a block with rows given in `scheme`.
	///
	/// # Errors
	/// Fails if a maximum is below its minimum or a bound lies outside the level.
	///
	/// # Examples
	/// ```
	/// use maptiles_core::{MetaTileCoord, TileScheme};
	///
	/// let meta = MetaTileCoord::new("osm", 3, 1, 1, 2, 2, TileScheme::Xyz).unwrap();
	/// assert_eq!(meta.count(), 4);
	/// assert!(MetaTileCoord::new("osm", 3, 2, 1, 1, 2, TileScheme::Xyz).is_err());
	/// ```
	pub fn new(
		layer: &str,
		level: u8,
		x_min: u32,
		y_min: u32,
		x_max: u32,
		y_max: u32,
		scheme: TileScheme,
	) -> Result<MetaTileCoord> {
		ensure!(level <= 31, "level ({level}) must be <= 31");
		ensure!(x_max >= x_min, "x_max ({x_max}) must be >= x_min ({x_min})");
		ensure!(y_max >= y_min, "y_max ({y_max}) must be >= y_min ({y_min})");
		let max = (1u64 << level) - 1;
		ensure!(u64::from(x_max) <= max, "x_max ({x_max}) out of bounds for level {level}");
		ensure!(u64::from(y_max) <= max, "y_max ({y_max}) out of bounds for level {level}");
		Ok(MetaTileCoord {
			level,
			x_min,
			y_min,
			x_max,
			y_max,
			scheme,
			layer: layer.to_string(),
		})
	}

	/// The block of one single tile.
	#[must_use]
	pub fn from_tile(coord: &TileCoord) -> MetaTileCoord {
		MetaTileCoord {
			level: coord.level,
			x_min: coord.x,
			y_min: coord.y,
			x_max: coord.x,
			y_max: coord.y,
			scheme: coord.scheme,
			layer: coord.layer.clone(),
		}
	}

	/// The `size` × `size` block that contains `coord`, aligned to multiples of `size`
	/// in XYZ rows and clamped to the edge of the level.
	///
	/// The result uses the scheme and layer of `coord`.
	///
	/// # Examples
	/// ```
	/// use maptiles_core::{MetaTileCoord, TileCoord};
	///
	/// let meta = MetaTileCoord::around(&TileCoord::new(4, 9, 14).unwrap(), 8);
	/// assert_eq!((meta.x_min(), meta.y_min(), meta.x_max(), meta.y_max()), (8, 8, 15, 15));
	/// ```
	#[must_use]
	pub fn around(coord: &TileCoord, size: u32) -> MetaTileCoord {
		let size = size.max(1);
		let xyz = coord.to_scheme(TileScheme::Xyz);
		let max = xyz.max_value();
		let x_min = xyz.x - xyz.x % size;
		let y_min = xyz.y - xyz.y % size;
		let mut meta = MetaTileCoord {
			level: xyz.level,
			x_min,
			y_min,
			x_max: x_min.saturating_add(size - 1).min(max),
			y_max: y_min.saturating_add(size - 1).min(max),
			scheme: TileScheme::Xyz,
			layer: coord.layer.clone(),
		};
		meta.set_scheme(coord.scheme);
		meta
	}

	#[must_use]
	pub fn level(&self) -> u8 {
		self.level
	}
	#[must_use]
	pub fn x_min(&self) -> u32 {
		self.x_min
	}
	#[must_use]
	pub fn y_min(&self) -> u32 {
		self.y_min
	}
	#[must_use]
	pub fn x_max(&self) -> u32 {
		self.x_max
	}
	#[must_use]
	pub fn y_max(&self) -> u32 {
		self.y_max
	}
	#[must_use]
	pub fn scheme(&self) -> TileScheme {
		self.scheme
	}
	#[must_use]
	pub fn layer(&self) -> &str {
		&self.layer
	}

	#[must_use]
	pub fn with_layer(mut self, layer: &str) -> MetaTileCoord {
		self.layer = layer.to_string();
		self
	}

	#[must_use]
	pub fn x_size(&self) -> u32 {
		self.x_max - self.x_min + 1
	}

	#[must_use]
	pub fn y_size(&self) -> u32 {
		self.y_max - self.y_min + 1
	}

	/// Number of tiles in the block.
	#[must_use]
	pub fn count(&self) -> usize {
		self.x_size() as usize * self.y_size() as usize
	}

	/// Converts the rows into `scheme`: each bound is flipped and the row bounds swap.
	pub fn set_scheme(&mut self, scheme: TileScheme) {
		if self.scheme != scheme {
			let y_min = TileScheme::flip_row(self.level, self.y_max);
			let y_max = TileScheme::flip_row(self.level, self.y_min);
			self.y_min = y_min;
			self.y_max = y_max;
			self.scheme = scheme;
		}
	}

	#[must_use]
	pub fn to_scheme(&self, scheme: TileScheme) -> MetaTileCoord {
		let mut meta = self.clone();
		meta.set_scheme(scheme);
		meta
	}

	/// The tiles of the block, columns in the outer loop and rows in the inner loop.
	#[must_use]
	pub fn tile_coords(&self) -> Vec<TileCoord> {
		let mut coords = Vec::with_capacity(self.count());
		for x in self.x_min..=self.x_max {
			for y in self.y_min..=self.y_max {
				coords.push(TileCoord {
					level: self.level,
					x,
					y,
					scheme: self.scheme,
					layer: self.layer.clone(),
				});
			}
		}
		coords
	}

	/// Whether `coord` lies inside the block, regardless of its scheme.
	#[must_use]
	pub fn contains(&self, coord: &TileCoord) -> bool {
		if coord.level != self.level {
			return false;
		}
		let coord = coord.to_scheme(self.scheme);
		(self.x_min..=self.x_max).contains(&coord.x) && (self.y_min..=self.y_max).contains(&coord.y)
	}

	/// Geographic area covered by the whole block.
	#[must_use]
	pub fn to_geo_bbox(&self) -> GeoBBox {
		let xyz = self.to_scheme(TileScheme::Xyz);
		let [x_min, y_max] = TileCoord::coord_to_geo(xyz.level, xyz.x_min, xyz.y_min);
		let [x_max, y_min] = TileCoord::coord_to_geo(xyz.level, xyz.x_max + 1, xyz.y_max + 1);
		GeoBBox::from_edges(x_min, y_min, x_max, y_max)
	}
}

impl Debug for MetaTileCoord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"MetaTileCoord('{}', {}, [{}, {}, {}, {}], {})",
			self.layer, self.level, self.x_min, self.y_min, self.x_max, self.y_max, self.scheme
		)
	}
}
