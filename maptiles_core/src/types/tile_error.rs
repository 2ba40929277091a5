//! Per-tile failures delivered through reply channels.

use thiserror::Error;

/// A failure attached to one tile result.
///
/// A cache miss is not an error; it is a result without bytes and without error.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TileError {
	/// The renderer could not produce the tile or block.
	#[error("render failed: {0}")]
	Render(String),

	/// A tile record references a blob that is not stored.
	#[error("tile references missing blob {checksum}")]
	Integrity { checksum: String },

	/// No worker pool is registered under the requested layer.
	#[error("no renderer registered for layer '{0}'")]
	UnknownLayer(String),

	/// The renderer returned a different number of results than the block holds.
	#[error("renderer returned {actual} results for a block of {expected} tiles")]
	CountMismatch { expected: usize, actual: usize },

	/// The cache storage failed.
	#[error("storage error: {0}")]
	Storage(String),

	/// The named component was already closed.
	#[error("{0} is closed")]
	Closed(&'static str),

	/// The producer went away before sending a result.
	#[error("request abandoned before a result was delivered")]
	Abandoned,
}

impl TileError {
	/// Wraps any error chain as a render failure.
	pub fn render(err: impl std::fmt::Display) -> TileError {
		TileError::Render(format!("{err:#}"))
	}

	/// Wraps any error chain as a storage failure.
	pub fn storage(err: impl std::fmt::Display) -> TileError {
		TileError::Storage(format!("{err:#}"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use anyhow::anyhow;

	#[test]
	fn messages() {
		assert_eq!(
			TileError::UnknownLayer("sat".into()).to_string(),
			"no renderer registered for layer 'sat'"
		);
		assert_eq!(
			TileError::CountMismatch { expected: 4, actual: 3 }.to_string(),
			"renderer returned 3 results for a block of 4 tiles"
		);
		assert_eq!(TileError::Closed("tile cache").to_string(), "tile cache is closed");
	}

	#[test]
	fn wraps_error_chains() {
		let err = anyhow!("disk full").context("writing blob");
		assert_eq!(TileError::storage(&err), TileError::Storage("writing blob: disk full".into()));
		assert_eq!(TileError::render("no style"), TileError::Render("no style".into()));
	}
}
