//! Layered tile coordinates in a Web Mercator tile pyramid
//!
//! This module provides the [`TileCoord`] type that identifies one raster tile of one
//! layer. It includes methods for:
//! - Creating and validating tile coordinates
//! - Converting rows between the XYZ and TMS schemes
//! - Converting between tile and geographic coordinates
//!
//! # Examples
//!
//! ```
//! use maptiles_core::{TileCoord, TileScheme};
//!
//! let coord = TileCoord::new(3, 1, 2).unwrap().with_layer("osm");
//! assert_eq!(coord.layer, "osm");
//!
//! let tms = coord.to_scheme(TileScheme::Tms);
//! assert_eq!(tms.y, 5);
//! assert_eq!(tms.to_scheme(TileScheme::Xyz), coord);
//! ```

use crate::{GeoBBox, TileScheme};
use anyhow::{Result, ensure};
use std::{
	f64::consts::PI,
	fmt::{self, Debug},
};

/// Name of the layer that requests without a layer name resolve to.
pub const DEFAULT_LAYER: &str = "default";

/// A tile coordinate with zoom level, column, row, row scheme and layer name.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TileCoord {
	/// The zoom level of the tile.
	pub level: u8,
	/// The column of the tile.
	pub x: u32,
	/// The row of the tile, interpreted according to `scheme`.
	pub y: u32,
	/// The row convention of `y`.
	pub scheme: TileScheme,
	/// The layer this tile belongs to. May be empty.
	pub layer: String,
}

impl TileCoord {
	/// Create a new XYZ `TileCoord` without a layer.
	///
	/// # Errors
	/// Returns an error if `level` > 31 or `x`/`y` are outside the level.
	pub fn new(level: u8, x: u32, y: u32) -> Result<TileCoord> {
		ensure!(level <= 31, "level ({level}) must be <= 31");
		let max = 1u64 << level;
		ensure!(u64::from(x) < max, "x ({x}) out of bounds for level {level}");
		ensure!(u64::from(y) < max, "y ({y}) out of bounds for level {level}");
		Ok(TileCoord {
			level,
			x,
			y,
			scheme: TileScheme::Xyz,
			layer: String::new(),
		})
	}

	/// Create a new `TileCoord` for a layer, with `y` given in `scheme`.
	pub fn new_in(layer: &str, level: u8, x: u32, y: u32, scheme: TileScheme) -> Result<TileCoord> {
		let mut coord = TileCoord::new(level, x, y)?;
		coord.scheme = scheme;
		coord.layer = layer.to_string();
		Ok(coord)
	}

	/// Create a `TileCoord` from geographic coordinates (longitude, latitude) at a given zoom level.
	///
	/// Uses the Web Mercator projection and returns an XYZ coordinate.
	///
	/// # Examples
	///
	/// ```
	/// use maptiles_core::TileCoord;
	///
	/// // Berlin at zoom 10
	/// let coord = TileCoord::from_geo(13.404954, 52.520008, 10).unwrap();
	/// assert_eq!((coord.x, coord.y), (550, 335));
	/// ```
	pub fn from_geo(lon: f64, lat: f64, level: u8) -> Result<TileCoord> {
		ensure!(level <= 31, "level ({level}) must be <= 31");
		ensure!((-180.0..=180.0).contains(&lon), "longitude ({lon}) must be within [-180, 180]");
		ensure!((-90.0..=90.0).contains(&lat), "latitude ({lat}) must be within [-90, 90]");

		let zoom = 2.0f64.powi(i32::from(level));
		let x = zoom * (lon / 360.0 + 0.5);
		let y = zoom * (0.5 - 0.5 * (lat * PI / 360.0 + PI / 4.0).tan().ln() / PI);

		TileCoord::new(
			level,
			x.min(zoom - 1.0).max(0.0).floor() as u32,
			y.min(zoom - 1.0).max(0.0).floor() as u32,
		)
	}

	/// Convert the north-west corner of an XYZ tile to `[longitude, latitude]` in degrees.
	///
	/// `x` and `y` may equal `2^level` to address the far edge of the pyramid.
	#[must_use]
	pub fn coord_to_geo(level: u8, x: u32, y: u32) -> [f64; 2] {
		let zoom = 2.0f64.powi(i32::from(level));
		[
			(f64::from(x) / zoom - 0.5) * 360.0,
			((PI * (1.0 - 2.0 * f64::from(y) / zoom)).exp().atan() / PI - 0.25) * 360.0,
		]
	}

	/// Return a copy assigned to `layer`.
	#[must_use]
	pub fn with_layer(mut self, layer: &str) -> TileCoord {
		self.layer = layer.to_string();
		self
	}

	/// Get the maximum valid column or row for this tile's zoom level.
	#[must_use]
	pub fn max_value(&self) -> u32 {
		((1u64 << self.level) - 1) as u32
	}

	/// Convert the row into `scheme`. Does nothing if the coordinate already uses it.
	pub fn set_scheme(&mut self, scheme: TileScheme) {
		if self.scheme != scheme {
			self.y = TileScheme::flip_row(self.level, self.y);
			self.scheme = scheme;
		}
	}

	/// Return a copy with the row expressed in `scheme`.
	#[must_use]
	pub fn to_scheme(&self, scheme: TileScheme) -> TileCoord {
		let mut coord = self.clone();
		coord.set_scheme(scheme);
		coord
	}

	/// The layer name, with an empty name resolved to [`DEFAULT_LAYER`].
	#[must_use]
	pub fn layer_or_default(&self) -> &str {
		if self.layer.is_empty() { DEFAULT_LAYER } else { &self.layer }
	}

	/// The slippy-map path of this tile, `{z}/{x}/{y}.png`, with `y` as stored.
	#[must_use]
	pub fn osm_filename(&self) -> String {
		format!("{}/{}/{}.png", self.level, self.x, self.y)
	}

	/// Geographic area covered by this tile.
	#[must_use]
	pub fn to_geo_bbox(&self) -> GeoBBox {
		let xyz = self.to_scheme(TileScheme::Xyz);
		let [x_min, y_max] = TileCoord::coord_to_geo(xyz.level, xyz.x, xyz.y);
		let [x_max, y_min] = TileCoord::coord_to_geo(xyz.level, xyz.x + 1, xyz.y + 1);
		GeoBBox::from_edges(x_min, y_min, x_max, y_max)
	}
}

/// Format as `TileCoord(layer, z, [x, y], scheme)`.
impl Debug for TileCoord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"TileCoord('{}', {}, [{}, {}], {})",
			self.layer, self.level, self.x, self.y, self.scheme
		)
	}
}
