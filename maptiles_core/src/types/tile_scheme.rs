//! Vertical row conventions of a tile pyramid.
//!
//! Both schemes share the same column index. They differ in the direction of the
//! row index:
//! - [`TileScheme::Xyz`]: row 0 is the northernmost row (OSM / Google / "slippy map").
//! - [`TileScheme::Tms`]: row 0 is the southernmost row (TMS / MBTiles storage).
//!
//! Converting between them is the fixed flip `row' = 2^level - row - 1`.

use anyhow::{Result, bail};
use std::{fmt, str::FromStr};

/// The row convention a coordinate is expressed in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TileScheme {
	#[default]
	Xyz,
	Tms,
}

impl TileScheme {
	/// Flip a row index at `level` into the other scheme.
	///
	/// Applying the flip twice returns the original row. Rows outside `0..2^level` do not
	/// exist at that level; they flip to row 0.
	///
	/// # Examples
	///
	/// ```
	/// use maptiles_core::TileScheme;
	///
	/// assert_eq!(TileScheme::flip_row(3, 2), 5);
	/// assert_eq!(TileScheme::flip_row(3, 5), 2);
	/// ```
	#[must_use]
	pub fn flip_row(level: u8, row: u32) -> u32 {
		let max = (1u64 << level.min(32)) - 1;
		max.saturating_sub(u64::from(row)) as u32
	}

	#[must_use]
	pub fn from_tms_flag(tms: bool) -> TileScheme {
		if tms { TileScheme::Tms } else { TileScheme::Xyz }
	}
}

impl fmt::Display for TileScheme {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			TileScheme::Xyz => "xyz",
			TileScheme::Tms => "tms",
		})
	}
}

impl FromStr for TileScheme {
	type Err = anyhow::Error;

	fn from_str(value: &str) -> Result<Self> {
		Ok(match value.trim().to_lowercase().as_str() {
			"xyz" => TileScheme::Xyz,
			"tms" => TileScheme::Tms,
			_ => bail!("unknown tile scheme '{value}', expected 'xyz' or 'tms'"),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case(0, 0, 0)]
	#[case(1, 0, 1)]
	#[case(3, 2, 5)]
	#[case(3, 7, 0)]
	#[case(31, 0, 2_147_483_647)]
	fn flip_row_cases(#[case] level: u8, #[case] row: u32, #[case] expected: u32) {
		assert_eq!(TileScheme::flip_row(level, row), expected);
		assert_eq!(TileScheme::flip_row(level, expected), row);
	}

	#[rstest]
	#[case(0, 1, 0)]
	#[case(3, 8, 0)]
	#[case(3, u32::MAX, 0)]
	#[case(40, 0, u32::MAX)]
	fn flip_row_out_of_range(#[case] level: u8, #[case] row: u32, #[case] expected: u32) {
		assert_eq!(TileScheme::flip_row(level, row), expected);
	}

	#[test]
	fn tms_flag() {
		assert_eq!(TileScheme::from_tms_flag(true), TileScheme::Tms);
		assert_eq!(TileScheme::from_tms_flag(false), TileScheme::Xyz);
	}

	#[test]
	fn parse_and_display() -> Result<()> {
		assert_eq!("XYZ".parse::<TileScheme>()?, TileScheme::Xyz);
		assert_eq!(" tms ".parse::<TileScheme>()?, TileScheme::Tms);
		assert!("google".parse::<TileScheme>().is_err());
		assert_eq!(TileScheme::Tms.to_string(), "tms");
		Ok(())
	}
}
