use crate::{Blob, TileCoord, TileError};

/// The outcome of fetching or rendering one tile.
///
/// | `blob`  | `error` | meaning |
/// |---------|---------|---------|
/// | `Some`  | `None`  | hit     |
/// | `None`  | `None`  | miss    |
/// | `None`  | `Some`  | failure |
#[derive(Clone, Debug, PartialEq)]
pub struct TileFetchResult {
	pub coord: TileCoord,
	pub blob: Option<Blob>,
	pub error: Option<TileError>,
}

impl TileFetchResult {
	#[must_use]
	pub fn found(coord: TileCoord, blob: Blob) -> TileFetchResult {
		TileFetchResult {
			coord,
			blob: Some(blob),
			error: None,
		}
	}

	#[must_use]
	pub fn missing(coord: TileCoord) -> TileFetchResult {
		TileFetchResult {
			coord,
			blob: None,
			error: None,
		}
	}

	#[must_use]
	pub fn failed(coord: TileCoord, error: TileError) -> TileFetchResult {
		TileFetchResult {
			coord,
			blob: None,
			error: Some(error),
		}
	}

	/// Builds a result from a fallible render of `coord`.
	#[must_use]
	pub fn from_result(coord: TileCoord, result: Result<Blob, TileError>) -> TileFetchResult {
		match result {
			Ok(blob) => TileFetchResult::found(coord, blob),
			Err(err) => TileFetchResult::failed(coord, err),
		}
	}

	#[must_use]
	pub fn is_hit(&self) -> bool {
		self.blob.is_some() && self.error.is_none()
	}

	#[must_use]
	pub fn is_miss(&self) -> bool {
		self.blob.is_none() && self.error.is_none()
	}
}
