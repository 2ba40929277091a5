//! Read-through tile serving.
//!
//! A [`TileServer`] answers a tile request from the cache if it can. On a miss it asks the
//! [`LayerMultiplex`] to render, returns the bytes and writes them back in the background.
//! With a metatile size above 1 the whole aligned block around the tile is rendered and
//! stored in one batch.

use crate::{config::Config, multiplex::LayerMultiplex, render::RendererFactory};
use anyhow::{Context, Result};
use log::{debug, info, trace, warn};
use maptiles_cache::TileDb;
use maptiles_core::{Blob, DEFAULT_LAYER, MetaTileCoord, TileCoord, TileError, TileFetchResult};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinSet;

struct WriteBacks {
	tasks: JoinSet<()>,
	closing: bool,
}

pub struct TileServer {
	cache: Option<Arc<TileDb>>,
	multiplex: LayerMultiplex,
	metatile_size: u32,
	write_back: Mutex<WriteBacks>,
}

impl TileServer {
	pub fn new(cache: Option<TileDb>, multiplex: LayerMultiplex) -> TileServer {
		TileServer {
			cache: cache.map(Arc::new),
			multiplex,
			metatile_size: 1,
			write_back: Mutex::new(WriteBacks {
				tasks: JoinSet::new(),
				closing: false,
			}),
		}
	}

	#[must_use]
	pub fn with_metatile_size(mut self, metatile_size: u32) -> TileServer {
		self.metatile_size = metatile_size.max(1);
		self
	}

	/// Starts one worker pool per configured layer and opens the cache, if any.
	///
	/// A layer named `default` also serves requests without a layer name.
	pub fn from_config(config: &Config, factory: RendererFactory) -> Result<TileServer> {
		let mut multiplex = LayerMultiplex::new(config.renderers(), factory);
		for layer in &config.layers {
			let queue = multiplex.add_renderer(&layer.name, &layer.style);
			if layer.name == DEFAULT_LAYER {
				multiplex.add_source("", queue);
			}
		}

		let cache = match &config.cache_file {
			Some(path) => Some(TileDb::open(path).with_context(|| format!("opening cache {path:?}"))?),
			None => None,
		};
		info!(
			"serving layers {:?} with {} renderers each, cache: {:?}",
			multiplex.layer_names(),
			multiplex.num_renderers(),
			config.cache_file
		);

		Ok(TileServer::new(cache, multiplex).with_metatile_size(config.metatile_size()))
	}

	#[must_use]
	pub fn multiplex(&self) -> &LayerMultiplex {
		&self.multiplex
	}

	#[must_use]
	pub fn cache(&self) -> Option<&Arc<TileDb>> {
		self.cache.as_ref()
	}

	#[must_use]
	pub fn metatile_size(&self) -> u32 {
		self.metatile_size
	}

	/// Looks the tile up in the cache and renders it on a miss.
	pub async fn fetch_tile(&self, coord: TileCoord) -> TileFetchResult {
		if let Some(cache) = &self.cache {
			let cached = cache.fetch(coord.clone()).await;
			if cached.is_hit() {
				trace!("cache hit for {coord:?}");
				return cached;
			}
			if let Some(err) = &cached.error {
				warn!("cache lookup of {coord:?} failed, rendering instead: {err}");
			}
		}

		if self.metatile_size > 1 {
			return self.fetch_from_block(coord).await;
		}

		let result = self.multiplex.submit_tile(coord).await;
		if let Some(cache) = self.cache.as_ref().filter(|_| result.is_hit()) {
			let cache = cache.clone();
			let stored = result.clone();
			self.spawn_write_back(async move {
				if let Err(err) = cache.insert(stored).await {
					warn!("writing back a tile failed: {err}");
				}
			});
		}
		result
	}

	/// The bytes of a tile, `None` if it could not be found or rendered without an error.
	pub async fn get_tile(&self, coord: TileCoord) -> Result<Option<Blob>, TileError> {
		let result = self.fetch_tile(coord).await;
		match (result.blob, result.error) {
			(_, Some(err)) => Err(err),
			(blob, None) => Ok(blob),
		}
	}

	async fn fetch_from_block(&self, coord: TileCoord) -> TileFetchResult {
		let block = MetaTileCoord::around(&coord, self.metatile_size);
		debug!("rendering {block:?} for {coord:?}");
		let results = self.multiplex.submit_meta_tile(block).await;

		let wanted = results
			.iter()
			.find(|r| r.coord == coord)
			.cloned()
			.unwrap_or_else(|| TileFetchResult::missing(coord));

		if let Some(cache) = &self.cache {
			let cache = cache.clone();
			self.spawn_write_back(async move {
				match cache.batch_insert(results).await {
					Ok(blobs) => trace!("wrote back a block with {blobs} new blobs"),
					Err(err) => warn!("writing back a block failed: {err:#}"),
				}
			});
		}
		wanted
	}

	/// Renders a whole block and stores every rendered tile before returning.
	pub async fn render_meta_tile(&self, block: MetaTileCoord) -> Result<Vec<TileFetchResult>> {
		let results = self.multiplex.submit_meta_tile(block).await;
		if let Some(cache) = &self.cache {
			let blobs = cache.batch_insert(results.clone()).await?;
			trace!("stored a block with {blobs} new blobs");
		}
		Ok(results)
	}

	/// Runs `task` in the background. Dropped once shutdown has begun.
	fn spawn_write_back<F>(&self, task: F)
	where
		F: Future<Output = ()> + Send + 'static,
	{
		let mut write_back = self.write_back.lock();
		if write_back.closing {
			debug!("server is shutting down, skipping a write back");
			return;
		}
		while let Some(finished) = write_back.tasks.try_join_next() {
			if let Err(err) = finished {
				warn!("write back task failed: {err}");
			}
		}
		write_back.tasks.spawn(task);
	}

	/// Waits for pending write backs, stops the workers and closes the cache.
	///
	/// Tiles served after shutdown has begun are not written back.
	pub async fn shutdown(&self) {
		let mut tasks = {
			let mut write_back = self.write_back.lock();
			write_back.closing = true;
			std::mem::take(&mut write_back.tasks)
		};
		debug!("waiting for {} write backs", tasks.len());
		while let Some(finished) = tasks.join_next().await {
			if let Err(err) = finished {
				warn!("write back task failed: {err}");
			}
		}
		self.multiplex.shutdown().await;
		if let Some(cache) = &self.cache {
			cache.close().await;
		}
	}
}

impl std::fmt::Debug for TileServer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TileServer")
			.field("cache", &self.cache.as_ref().map(|c| c.store().name().to_string()))
			.field("multiplex", &self.multiplex)
			.field("metatile_size", &self.metatile_size)
			.finish()
	}
}
