//! Routes render requests to per-layer worker pools.
//!
//! Each registered layer name points to a [`LayerQueue`]. Several names may share one
//! queue, which is how the default layer is reachable both as `""` and as `"default"`.

mod layer_queue;

pub use layer_queue::LayerQueue;

use crate::render::RendererFactory;
use log::{debug, warn};
use maptiles_core::{DEFAULT_LAYER, FetchRequest, MetaTileCoord, TileCoord, TileError, TileFetchResult};
use std::collections::{BTreeSet, HashMap};

pub struct LayerMultiplex {
	layers: HashMap<String, LayerQueue>,
	num_renderers: usize,
	factory: RendererFactory,
}

impl LayerMultiplex {
	/// A multiplex without layers. `num_renderers == 0` means one worker per CPU.
	pub fn new(num_renderers: usize, factory: RendererFactory) -> LayerMultiplex {
		let num_renderers = if num_renderers == 0 {
			num_cpus::get()
		} else {
			num_renderers
		};
		LayerMultiplex {
			layers: HashMap::new(),
			num_renderers,
			factory,
		}
	}

	/// A multiplex serving `stylesheet` as the default layer, under `""` and `"default"`.
	pub fn default_render_multiplex(stylesheet: &str, num_renderers: usize, factory: RendererFactory) -> LayerMultiplex {
		let mut multiplex = LayerMultiplex::new(num_renderers, factory);
		let queue = multiplex.create_renderer(stylesheet);
		multiplex.add_source("", queue.clone());
		multiplex.add_source(DEFAULT_LAYER, queue);
		multiplex
	}

	/// Starts a worker pool for `stylesheet` without registering it.
	pub fn create_renderer(&self, stylesheet: &str) -> LayerQueue {
		LayerQueue::spawn(stylesheet, self.num_renderers, self.factory.clone())
	}

	/// Registers `queue` under `name`, replacing a previous registration.
	pub fn add_source(&mut self, name: &str, queue: LayerQueue) {
		if let Some(previous) = self.layers.insert(name.to_string(), queue) {
			debug!("layer '{name}' no longer uses '{}'", previous.stylesheet());
		}
	}

	pub fn add_renderer(&mut self, name: &str, stylesheet: &str) -> LayerQueue {
		let queue = self.create_renderer(stylesheet);
		self.add_source(name, queue.clone());
		queue
	}

	#[must_use]
	pub fn num_renderers(&self) -> usize {
		self.num_renderers
	}

	#[must_use]
	pub fn layer_names(&self) -> Vec<String> {
		let mut names: Vec<String> = self.layers.keys().cloned().collect();
		names.sort();
		names
	}

	/// Routes `request` to the queue of its layer, waiting for an idle worker.
	///
	/// Returns `false` if the request could not be handed over. Its receiver still gets
	/// an answer: [`TileError::UnknownLayer`] for an unregistered layer, or
	/// [`TileError::Closed`] after shutdown.
	pub async fn submit_request(&self, request: FetchRequest) -> bool {
		let Some(queue) = self.layers.get(request.layer()) else {
			let layer = request.layer().to_string();
			warn!("no renderer for layer '{layer}'");
			request.fail(TileError::UnknownLayer(layer));
			return false;
		};
		queue.submit(request).await
	}

	/// Renders one tile and waits for the result.
	pub async fn submit_tile(&self, coord: TileCoord) -> TileFetchResult {
		let (request, receiver) = FetchRequest::tile(coord);
		self.submit_request(request).await;
		receiver.result().await
	}

	/// Renders a block and waits for all `coord.count()` results.
	pub async fn submit_meta_tile(&self, coord: MetaTileCoord) -> Vec<TileFetchResult> {
		let (request, receiver) = FetchRequest::meta_tile(coord);
		self.submit_request(request).await;
		receiver.collect().await
	}

	/// Closes every queue and waits for the workers to finish.
	pub async fn shutdown(&self) {
		let mut seen: Vec<&LayerQueue> = Vec::new();
		for queue in self.layers.values() {
			if !seen.iter().any(|q| q.same_queue(queue)) {
				seen.push(queue);
			}
		}
		debug!("shutting down {} render queues", seen.len());
		for queue in seen {
			queue.close().await;
		}
	}

	/// Distinct stylesheets in use.
	#[must_use]
	pub fn stylesheets(&self) -> BTreeSet<&str> {
		self.layers.values().map(LayerQueue::stylesheet).collect()
	}
}

impl std::fmt::Debug for LayerMultiplex {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LayerMultiplex")
			.field("layers", &self.layer_names())
			.field("num_renderers", &self.num_renderers)
			.finish()
	}
}
