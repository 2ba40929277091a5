//! This module provides the [`Blob`] struct, a wrapper around [`Vec<u8>`] holding the
//! encoded bytes of one tile image.
//!
//! # Examples
//!
//! ```rust
//! use maptiles_core::Blob;
//!
//! let blob = Blob::from(vec![0x89, b'P', b'N', b'G']);
//! assert_eq!(blob.len(), 4);
//! assert_eq!(blob.as_slice()[1..], *b"PNG");
//! ```

use std::fmt::Debug;

/// Encoded tile bytes.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Blob(Vec<u8>);

impl Blob {
	#[must_use]
	pub fn as_slice(&self) -> &[u8] {
		self.0.as_slice()
	}

	#[must_use]
	pub fn len(&self) -> u64 {
		self.0.len() as u64
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl From<Vec<u8>> for Blob {
	fn from(item: Vec<u8>) -> Self {
		Blob(item)
	}
}

impl From<&[u8]> for Blob {
	fn from(item: &[u8]) -> Self {
		Blob(item.to_vec())
	}
}

impl<const N: usize> From<&[u8; N]> for Blob {
	fn from(item: &[u8; N]) -> Self {
		Blob(item.to_vec())
	}
}

impl From<&str> for Blob {
	fn from(item: &str) -> Self {
		Blob(item.as_bytes().to_vec())
	}
}

impl AsRef<[u8]> for Blob {
	fn as_ref(&self) -> &[u8] {
		&self.0
	}
}

/// Prints the length and the first bytes, not the whole image.
impl Debug for Blob {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		const PREVIEW: usize = 8;
		let head = &self.0[..self.0.len().min(PREVIEW)];
		let ellipsis = if self.0.len() > PREVIEW { " ..." } else { "" };
		write!(f, "Blob({}): {:02x?}{}", self.0.len(), head, ellipsis)
	}
}
