use anyhow::{Context, Result, ensure};
use futures::{StreamExt, stream};
use log::{info, warn};
use maptiles::{config::Config, render::dummy_renderer_factory, server::TileServer};
use maptiles_core::{DEFAULT_LAYER, GeoBBox, MetaTileCoord, TileCoord, TileScheme};
use std::path::PathBuf;

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
pub struct Subcommand {
	/// configuration file (YAML)
	#[arg(long, short)]
	config: PathBuf,

	/// layer to render
	#[arg(long, short, default_value = DEFAULT_LAYER)]
	layer: String,

	/// minimum zoom level
	#[arg(long, default_value_t = 0)]
	min_zoom: u8,

	/// maximum zoom level
	#[arg(long)]
	max_zoom: u8,

	/// only render tiles intersecting this area: west,south,east,north
	#[arg(long, allow_hyphen_values = true)]
	bbox: Option<GeoBBox>,

	/// use this cache file instead of the configured one
	#[arg(long)]
	cache_file: Option<PathBuf>,

	/// render workers for the layer
	#[arg(long)]
	renderers: Option<usize>,

	/// edge length of the rendered blocks
	#[arg(long)]
	metatile_size: Option<u32>,
}

#[tokio::main]
pub async fn run(arguments: &Subcommand) -> Result<()> {
	let mut config = Config::from_path(&arguments.config)?;
	config.override_optional_cache_file(&arguments.cache_file);
	config.override_optional_renderers(&arguments.renderers);
	config.override_optional_metatile_size(&arguments.metatile_size);

	ensure!(config.cache_file.is_some(), "seeding needs a cache_file");
	ensure!(
		config.layer(&arguments.layer).is_some(),
		"layer '{}' is not configured",
		arguments.layer
	);
	ensure!(
		arguments.min_zoom <= arguments.max_zoom,
		"min_zoom ({}) must not exceed max_zoom ({})",
		arguments.min_zoom,
		arguments.max_zoom
	);

	let bbox = arguments.bbox.unwrap_or_else(GeoBBox::world);
	let blocks = seed_blocks(&arguments.layer, arguments.min_zoom, arguments.max_zoom, &bbox, config.metatile_size())?;

	let server = TileServer::from_config(&config, dummy_renderer_factory())?;
	let parallel = server.multiplex().num_renderers() * 2;
	info!("seeding {} blocks of layer '{}'", blocks.len(), arguments.layer);

	let mut rendered = 0usize;
	let mut failed = 0usize;
	let mut outcomes = stream::iter(blocks)
		.map(|block| server.render_meta_tile(block))
		.buffer_unordered(parallel);
	while let Some(outcome) = outcomes.next().await {
		match outcome {
			Ok(results) => {
				for result in results {
					if result.is_hit() {
						rendered += 1;
					} else if let Some(err) = result.error {
						warn!("{:?} failed: {err}", result.coord);
						failed += 1;
					}
				}
			}
			Err(err) => {
				warn!("storing a block failed: {err:#}");
				failed += 1;
			}
		}
	}
	drop(outcomes);
	server.shutdown().await;

	println!("rendered {rendered} tiles, {failed} failed");
	ensure!(failed == 0, "{failed} tiles could not be seeded");
	Ok(())
}

/// Aligned blocks covering `bbox` on every level from `min_zoom` to `max_zoom`.
fn seed_blocks(layer: &str, min_zoom: u8, max_zoom: u8, bbox: &GeoBBox, size: u32) -> Result<Vec<MetaTileCoord>> {
	let mut blocks = Vec::new();
	for level in min_zoom..=max_zoom {
		let north_west = TileCoord::from_geo(bbox.x_min, bbox.y_max, level).context("bbox corner")?;
		let south_east = TileCoord::from_geo(bbox.x_max, bbox.y_min, level).context("bbox corner")?;
		let size = size.max(1);

		let columns = (north_west.x - north_west.x % size..=south_east.x).step_by(size as usize);
		for x in columns {
			for y in (north_west.y - north_west.y % size..=south_east.y).step_by(size as usize) {
				let corner = TileCoord::new_in(layer, level, x, y, TileScheme::Xyz)?;
				blocks.push(MetaTileCoord::around(&corner, size));
			}
		}
	}
	Ok(blocks)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tests::run_command;
	use assert_fs::{TempDir, prelude::*};
	use maptiles_cache::TileStore;

	#[test]
	fn blocks_cover_the_world() {
		let blocks = seed_blocks("osm", 0, 3, &GeoBBox::world(), 4).unwrap();
		// one block per level up to 2, four blocks at level 3
		assert_eq!(blocks.len(), 7);
		let tiles: usize = blocks.iter().map(MetaTileCoord::count).sum();
		assert_eq!(tiles, 1 + 4 + 16 + 64);
		assert!(blocks.iter().all(|b| b.layer() == "osm"));
	}

	#[test]
	fn blocks_within_bbox() {
		let bbox: GeoBBox = "13.0,52.3,13.8,52.7".parse().unwrap();
		let blocks = seed_blocks("", 10, 10, &bbox, 1).unwrap();
		assert!(!blocks.is_empty());
		assert!(blocks.iter().all(|b| b.count() == 1));
		assert!(blocks.iter().any(|b| b.contains(&TileCoord::from_geo(13.404954, 52.520008, 10).unwrap())));
	}

	#[test]
	fn seeds_into_cache() {
		let dir = TempDir::new().unwrap();
		let config = dir.child("maptiles.yml");
		config
			.write_str("cache_file: seeded.mbtiles\nrenderers: 2\nmetatile_size: 2\nlayers:\n  - name: default\n    style: '#808080'\n")
			.unwrap();

		run_command(vec![
			"maptiles",
			"-q",
			"seed",
			"-c",
			config.path().to_str().unwrap(),
			"--max-zoom",
			"2",
		])
		.unwrap();

		let store = TileStore::open(&dir.path().join("seeded.mbtiles")).unwrap();
		let stats = store.stats().unwrap();
		assert_eq!(stats.tiles(), 1 + 4 + 16);
		store.close();
	}
}
