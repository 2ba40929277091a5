use anyhow::{Context, Result, bail, ensure};
use maptiles::{config::Config, render::dummy_renderer_factory, server::TileServer};
use maptiles_core::{DEFAULT_LAYER, TileCoord};
use std::path::PathBuf;

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
pub struct Subcommand {
	/// configuration file (YAML)
	#[arg(long, short)]
	config: PathBuf,

	/// tile to fetch, as "layer/z/x/y" or "z/x/y" for the default layer
	#[arg(required = true)]
	tile: String,

	/// file the tile is written to
	#[arg(required = true)]
	output: PathBuf,

	/// rows are given in the TMS scheme
	#[arg(long)]
	tms: bool,

	/// use this cache file instead of the configured one
	#[arg(long)]
	cache_file: Option<PathBuf>,
}

#[tokio::main]
pub async fn run(arguments: &Subcommand) -> Result<()> {
	let mut config = Config::from_path(&arguments.config)?;
	config.override_optional_cache_file(&arguments.cache_file);
	if arguments.tms {
		config.override_optional_tms(&Some(true));
	}

	let (layer, level, x, y) = parse_tile(&arguments.tile)?;
	let coord = TileCoord::new_in(layer, level, x, y, config.scheme())?;

	let server = TileServer::from_config(&config, dummy_renderer_factory())?;
	let result = server.get_tile(coord.clone()).await;
	server.shutdown().await;

	let Some(blob) = result.with_context(|| format!("fetching {coord:?}"))? else {
		bail!("tile {coord:?} not found");
	};
	std::fs::write(&arguments.output, blob.as_slice()).with_context(|| format!("writing {:?}", arguments.output))?;
	log::info!("wrote {} bytes to {:?}", blob.len(), arguments.output);
	Ok(())
}

fn parse_tile(text: &str) -> Result<(&str, u8, u32, u32)> {
	let parts: Vec<&str> = text.split('/').collect();
	let (layer, numbers) = match parts.as_slice() {
		[layer, rest @ ..] if rest.len() == 3 => (*layer, rest),
		rest if rest.len() == 3 => (DEFAULT_LAYER, rest),
		_ => bail!("tile '{text}' must look like 'layer/z/x/y' or 'z/x/y'"),
	};
	ensure!(!layer.is_empty(), "layer of tile '{text}' is empty");
	let level = numbers[0].parse().with_context(|| format!("invalid level in '{text}'"))?;
	let x = numbers[1].parse().with_context(|| format!("invalid column in '{text}'"))?;
	let y = numbers[2].parse().with_context(|| format!("invalid row in '{text}'"))?;
	Ok((layer, level, x, y))
}
