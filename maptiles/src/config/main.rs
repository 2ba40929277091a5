use super::LayerConfig;
use anyhow::{Context, Result, ensure};
use maptiles_core::{DEFAULT_LAYER, TileScheme};
use serde::Deserialize;
use std::{
	fs::File,
	io::{BufReader, Read},
	path::{Path, PathBuf},
};

#[derive(Default, Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
	/// SQLite file used as tile cache. Without it every request is rendered.
	#[serde(default)]
	pub cache_file: Option<PathBuf>,

	/// Render workers per layer. Defaults to the number of CPUs.
	#[serde(default)]
	pub renderers: Option<usize>,

	/// Whether tile rows are given in the TMS scheme.
	#[serde(default)]
	pub tms: Option<bool>,

	/// Edge length of the block rendered on a cache miss.
	#[serde(default)]
	pub metatile_size: Option<u32>,

	#[serde(default)]
	pub layers: Vec<LayerConfig>,
}

impl Config {
	pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
		let config: Config = serde_yaml_ng::from_reader(reader)?;
		config.validate()?;
		Ok(config)
	}

	pub fn from_string(text: &str) -> Result<Self> {
		let config: Config = serde_yaml_ng::from_str(text)?;
		config.validate()?;
		Ok(config)
	}

	/// Parses a file and resolves `cache_file` relative to it.
	pub fn from_path(path: &Path) -> Result<Self> {
		let file = File::open(path).with_context(|| format!("opening config {path:?}"))?;
		let mut config = Config::from_reader(BufReader::new(file)).with_context(|| format!("parsing config {path:?}"))?;
		if let Some(base) = path.parent() {
			config.resolve_paths(base);
		}
		Ok(config)
	}

	pub fn resolve_paths(&mut self, base: &Path) {
		if let Some(cache_file) = self.cache_file.as_ref().filter(|path| path.is_relative()) {
			self.cache_file = Some(base.join(cache_file));
		}
	}

	fn validate(&self) -> Result<()> {
		for (index, layer) in self.layers.iter().enumerate() {
			ensure!(
				!self.layers[..index].iter().any(|l| l.name == layer.name),
				"layer '{}' is configured twice",
				layer.name
			);
		}
		if let Some(size) = self.metatile_size {
			ensure!(size >= 1, "metatile_size must be at least 1");
		}
		Ok(())
	}

	pub fn override_optional_cache_file(&mut self, cache_file: &Option<PathBuf>) {
		if cache_file.is_some() {
			self.cache_file = cache_file.clone();
		}
	}
	pub fn override_optional_renderers(&mut self, renderers: &Option<usize>) {
		if renderers.is_some() {
			self.renderers = *renderers;
		}
	}
	pub fn override_optional_tms(&mut self, tms: &Option<bool>) {
		if tms.is_some() {
			self.tms = *tms;
		}
	}
	pub fn override_optional_metatile_size(&mut self, metatile_size: &Option<u32>) {
		if metatile_size.is_some() {
			self.metatile_size = *metatile_size;
		}
	}

	#[must_use]
	pub fn scheme(&self) -> TileScheme {
		TileScheme::from_tms_flag(self.tms.unwrap_or(false))
	}

	#[must_use]
	pub fn metatile_size(&self) -> u32 {
		self.metatile_size.unwrap_or(1).max(1)
	}

	/// Workers per layer, `0` meaning one per CPU.
	#[must_use]
	pub fn renderers(&self) -> usize {
		self.renderers.unwrap_or(0)
	}

	#[must_use]
	pub fn layer(&self, name: &str) -> Option<&LayerConfig> {
		let name = if name.is_empty() { DEFAULT_LAYER } else { name };
		self.layers.iter().find(|l| l.name == name)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use assert_fs::{NamedTempFile, prelude::*};
	use pretty_assertions::assert_eq;

	#[test]
	fn parse_config() {
		let config = Config::from_string(
			"cache_file: /data/cache.mbtiles\nrenderers: 3\ntms: true\nmetatile_size: 8\nlayers:\n  - name: default\n    style: '#ffffff'\n  - name: night\n    style: '#000000'\n",
		)
		.unwrap();
		assert_eq!(
			config,
			Config {
				cache_file: Some(PathBuf::from("/data/cache.mbtiles")),
				renderers: Some(3),
				tms: Some(true),
				metatile_size: Some(8),
				layers: vec![
					LayerConfig::from(("default", "#ffffff")),
					LayerConfig::from(("night", "#000000"))
				],
			}
		);
		assert_eq!(config.scheme(), TileScheme::Tms);
		assert_eq!(config.layer("").unwrap().style, "#ffffff");
		assert_eq!(config.layer("night").unwrap().style, "#000000");
		assert!(config.layer("day").is_none());
	}

	#[test]
	fn parse_empty_config() {
		let config = Config::from_string("").unwrap();
		assert_eq!(config, Config::default());
		assert_eq!(config.scheme(), TileScheme::Xyz);
		assert_eq!(config.metatile_size(), 1);
		assert_eq!(config.renderers(), 0);
	}

	#[test]
	fn parse_invalid_config() {
		assert!(Config::from_string("renderer: 3").is_err());
		assert!(Config::from_string("metatile_size: 0").is_err());
		assert!(Config::from_string("layers:\n  - name: a\n    style: x\n  - name: a\n    style: y\n").is_err());
		assert!(Config::from_string("layers:\n  - name: a\n").is_err());
	}

	#[test]
	fn cache_file_is_relative_to_config() {
		let file = NamedTempFile::new("maptiles.yml").unwrap();
		file.write_str("cache_file: tiles.mbtiles\n").unwrap();
		let config = Config::from_path(file.path()).unwrap();
		assert_eq!(config.cache_file, Some(file.path().parent().unwrap().join("tiles.mbtiles")));
	}

	#[test]
	fn overrides() {
		let mut config = Config::from_string("renderers: 2\nmetatile_size: 4\n").unwrap();
		config.override_optional_renderers(&None);
		config.override_optional_metatile_size(&Some(2));
		config.override_optional_tms(&Some(true));
		config.override_optional_cache_file(&Some(PathBuf::from("x.mbtiles")));
		assert_eq!(config.renderers(), 2);
		assert_eq!(config.metatile_size(), 2);
		assert_eq!(config.scheme(), TileScheme::Tms);
		assert_eq!(config.cache_file, Some(PathBuf::from("x.mbtiles")));
	}
}
