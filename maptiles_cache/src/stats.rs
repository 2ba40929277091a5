use std::fmt;

/// Number of tiles stored for one layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayerStats {
	pub name: String,
	pub tiles: u64,
}

/// Summary of what a cache file holds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
	pub layers: Vec<LayerStats>,
	pub blobs: u64,
	pub blob_bytes: u64,
}

impl CacheStats {
	#[must_use]
	pub fn tiles(&self) -> u64 {
		self.layers.iter().map(|layer| layer.tiles).sum()
	}
}

impl fmt::Display for CacheStats {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f, "layers:")?;
		for layer in &self.layers {
			writeln!(f, "  {}: {} tiles", layer.name, layer.tiles)?;
		}
		writeln!(f, "tiles: {}", self.tiles())?;
		write!(f, "blobs: {} ({} bytes)", self.blobs, self.blob_bytes)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn display() {
		let stats = CacheStats {
			layers: vec![
				LayerStats {
					name: "default".into(),
					tiles: 3,
				},
				LayerStats {
					name: "osm".into(),
					tiles: 2,
				},
			],
			blobs: 4,
			blob_bytes: 1024,
		};
		assert_eq!(stats.tiles(), 5);
		assert_eq!(
			stats.to_string(),
			"layers:\n  default: 3 tiles\n  osm: 2 tiles\ntiles: 5\nblobs: 4 (1024 bytes)"
		);
	}
}
