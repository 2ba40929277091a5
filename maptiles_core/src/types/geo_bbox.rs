use anyhow::{Context, Result, ensure};
use std::{fmt, str::FromStr};

static MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;
static MAX_MERCATOR_LNG: f64 = 180.0;
static RADIUS: f64 = 6_378_137.0; // meters

/// A geographic bounding box in degrees: west, south, east, north.
///
/// # Examples
/// ```
/// use maptiles_core::GeoBBox;
///
/// let bbox: GeoBBox = "-10,-5,10,5".parse().unwrap();
/// assert_eq!(bbox.as_array(), [-10.0, -5.0, 10.0, 5.0]);
/// assert!(bbox.contains(0.0, 0.0));
/// ```
#[derive(Clone, Copy, PartialEq)]
pub struct GeoBBox {
	pub x_min: f64,
	pub y_min: f64,
	pub x_max: f64,
	pub y_max: f64,
}

impl GeoBBox {
	/// Creates a validated `GeoBBox` from `west, south, east, north`.
	pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Result<GeoBBox> {
		GeoBBox::from_edges(x_min, y_min, x_max, y_max).checked()
	}

	/// Creates a `GeoBBox` from edges that are already known to be ordered.
	#[must_use]
	pub fn from_edges(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> GeoBBox {
		GeoBBox {
			x_min,
			y_min,
			x_max,
			y_max,
		}
	}

	/// The whole world as covered by the Web Mercator pyramid.
	#[must_use]
	pub fn world() -> GeoBBox {
		GeoBBox::from_edges(-MAX_MERCATOR_LNG, -MAX_MERCATOR_LAT, MAX_MERCATOR_LNG, MAX_MERCATOR_LAT)
	}

	#[must_use]
	pub fn as_array(&self) -> [f64; 4] {
		[self.x_min, self.y_min, self.x_max, self.y_max]
	}

	#[must_use]
	pub fn contains(&self, lon: f64, lat: f64) -> bool {
		(self.x_min..=self.x_max).contains(&lon) && (self.y_min..=self.y_max).contains(&lat)
	}

	/// Projects the box to Web Mercator meters (EPSG:3857), clamping to the projection limits.
	#[must_use]
	pub fn to_mercator(&self) -> [f64; 4] {
		fn x_from_lon(lon_deg: f64) -> f64 {
			RADIUS * lon_deg.clamp(-MAX_MERCATOR_LNG, MAX_MERCATOR_LNG).to_radians()
		}
		fn y_from_lat(lat_deg: f64) -> f64 {
			let phi = lat_deg.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
			RADIUS * ((std::f64::consts::FRAC_PI_4 + phi / 2.0).tan()).ln()
		}

		[
			x_from_lon(self.x_min),
			y_from_lat(self.y_min),
			x_from_lon(self.x_max),
			y_from_lat(self.y_max),
		]
	}

	fn checked(self) -> Result<Self> {
		ensure!(self.x_min >= -180.0, "x_min ({}) must be >= -180", self.x_min);
		ensure!(self.y_min >= -90.0, "y_min ({}) must be >= -90", self.y_min);
		ensure!(self.x_max <= 180.0, "x_max ({}) must be <= 180", self.x_max);
		ensure!(self.y_max <= 90.0, "y_max ({}) must be <= 90", self.y_max);
		ensure!(self.x_min <= self.x_max, "x_min ({}) must be <= x_max ({})", self.x_min, self.x_max);
		ensure!(self.y_min <= self.y_max, "y_min ({}) must be <= y_max ({})", self.y_min, self.y_max);
		Ok(self)
	}
}

impl fmt::Debug for GeoBBox {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "GeoBBox({}, {}, {}, {})", self.x_min, self.y_min, self.x_max, self.y_max)
	}
}

/// Formats as the comma separated list used by MBTiles `bounds`.
impl fmt::Display for GeoBBox {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{},{},{},{}", self.x_min, self.y_min, self.x_max, self.y_max)
	}
}

impl FromStr for GeoBBox {
	type Err = anyhow::Error;

	fn from_str(value: &str) -> Result<Self> {
		let parts = value
			.split(',')
			.map(|part| {
				part
					.trim()
					.parse::<f64>()
					.with_context(|| format!("invalid number '{part}' in bbox '{value}'"))
			})
			.collect::<Result<Vec<f64>>>()?;
		ensure!(parts.len() == 4, "bbox '{value}' must have 4 values: west,south,east,north");
		GeoBBox::new(parts[0], parts[1], parts[2], parts[3])
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn creation_and_checks() {
		let bbox = GeoBBox::new(-10.0, -5.0, 10.0, 5.0).unwrap();
		assert_eq!(bbox.as_array(), [-10.0, -5.0, 10.0, 5.0]);
		assert!(GeoBBox::new(-190.0, 0.0, 0.0, 1.0).is_err());
		assert!(GeoBBox::new(0.0, 0.0, 0.0, 91.0).is_err());
		assert!(GeoBBox::new(10.0, 0.0, -10.0, 1.0).is_err());
		assert!(GeoBBox::new(0.0, 5.0, 1.0, -5.0).is_err());
	}

	#[test]
	fn parse_and_display() {
		let bbox: GeoBBox = " 13.0, 52.3 ,13.8,52.7".parse().unwrap();
		assert_eq!(bbox.as_array(), [13.0, 52.3, 13.8, 52.7]);
		assert_eq!(bbox.to_string(), "13,52.3,13.8,52.7");
		assert_eq!(format!("{bbox:?}"), "GeoBBox(13, 52.3, 13.8, 52.7)");

		assert!("1,2,3".parse::<GeoBBox>().is_err());
		assert!("a,2,3,4".parse::<GeoBBox>().is_err());
	}

	#[test]
	fn world_as_mercator() {
		let [x0, y0, x1, y1] = GeoBBox::world().to_mercator();
		let half = 20_037_508.342_789_244;
		assert!((x0 + half).abs() < 1e-6);
		assert!((y0 + half).abs() < 1e-6);
		assert!((x1 - half).abs() < 1e-6);
		assert!((y1 - half).abs() < 1e-6);
	}
}
