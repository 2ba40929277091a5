//! A queue feeding a fixed set of render workers.
//!
//! Every worker owns one [`Renderer`], built through the factory when the worker starts and
//! rebuilt when it was lost to a construction failure or a panic. Submitting waits until one
//! of the workers is idle, so at most `workers` requests are admitted at any time.

use crate::render::{Renderer, RendererFactory};
use log::{debug, error, trace, warn};
use maptiles_core::{FetchRequest, TileError, TileFetchResult};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::{
	sync::{Mutex as AsyncMutex, OwnedSemaphorePermit, Semaphore, mpsc},
	task::JoinHandle,
};

struct Job {
	request: FetchRequest,
	// released when the worker is done with the request
	_permit: OwnedSemaphorePermit,
}

struct Inner {
	stylesheet: String,
	sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
	idle: Arc<Semaphore>,
	workers: Mutex<Vec<JoinHandle<()>>>,
}

/// Handle to the worker pool of one stylesheet. Cloning shares the same pool.
#[derive(Clone)]
pub struct LayerQueue {
	inner: Arc<Inner>,
}

impl LayerQueue {
	/// Starts `workers` workers for `stylesheet`. Must run inside a tokio runtime.
	pub fn spawn(stylesheet: &str, workers: usize, factory: RendererFactory) -> LayerQueue {
		let workers = workers.max(1);
		let (sender, receiver) = mpsc::unbounded_channel();
		let receiver = Arc::new(AsyncMutex::new(receiver));
		let stylesheet: Arc<str> = Arc::from(stylesheet);

		let handles = (0..workers)
			.map(|id| {
				tokio::spawn(run_worker(
					id,
					stylesheet.clone(),
					factory.clone(),
					receiver.clone(),
				))
			})
			.collect();
		debug!("started {workers} render workers for '{stylesheet}'");

		LayerQueue {
			inner: Arc::new(Inner {
				stylesheet: stylesheet.to_string(),
				sender: Mutex::new(Some(sender)),
				idle: Arc::new(Semaphore::new(workers)),
				workers: Mutex::new(handles),
			}),
		}
	}

	#[must_use]
	pub fn stylesheet(&self) -> &str {
		&self.inner.stylesheet
	}

	/// Whether both handles drive the same workers.
	#[must_use]
	pub fn same_queue(&self, other: &LayerQueue) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}

	/// Hands `request` to the next idle worker, waiting for one if all are busy.
	///
	/// Returns `false` if the queue is closed; the request is then failed with
	/// [`TileError::Closed`].
	pub async fn submit(&self, request: FetchRequest) -> bool {
		let Ok(permit) = self.inner.idle.clone().acquire_owned().await else {
			request.fail(TileError::Closed("layer queue"));
			return false;
		};
		let sender = self.inner.sender.lock().clone();
		let Some(sender) = sender else {
			request.fail(TileError::Closed("layer queue"));
			return false;
		};
		if let Err(err) = sender.send(Job {
			request,
			_permit: permit,
		}) {
			err.0.request.fail(TileError::Closed("layer queue"));
			return false;
		}
		true
	}

	/// Stops accepting requests and waits until every worker has finished its queue.
	pub async fn close(&self) {
		self.inner.idle.close();
		drop(self.inner.sender.lock().take());
		let handles = std::mem::take(&mut *self.inner.workers.lock());
		for handle in handles {
			if let Err(err) = handle.await {
				error!("render worker of '{}' failed: {err}", self.inner.stylesheet);
			}
		}
	}
}

impl std::fmt::Debug for LayerQueue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LayerQueue")
			.field("stylesheet", &self.inner.stylesheet)
			.field("idle", &self.inner.idle.available_permits())
			.finish()
	}
}

async fn run_worker(
	id: usize,
	stylesheet: Arc<str>,
	factory: RendererFactory,
	receiver: Arc<AsyncMutex<mpsc::UnboundedReceiver<Job>>>,
) {
	let mut renderer = build_renderer(id, &stylesheet, &factory).await.ok();

	loop {
		let job = receiver.lock().await.recv().await;
		let Some(Job { request, _permit }) = job else {
			break;
		};

		if renderer.is_none() {
			renderer = match build_renderer(id, &stylesheet, &factory).await {
				Ok(renderer) => Some(renderer),
				Err(err) => {
					request.fail(err);
					continue;
				}
			};
		}
		let Some(mut current) = renderer.take() else {
			continue;
		};

		let outcome = tokio::task::spawn_blocking(move || {
			process(current.as_mut(), request);
			current
		})
		.await;

		match outcome {
			Ok(current) => renderer = Some(current),
			Err(err) => error!("render worker {id} of '{stylesheet}' lost its renderer: {err}"),
		}
	}
	trace!("render worker {id} of '{stylesheet}' stopped");
}

async fn build_renderer(id: usize, stylesheet: &Arc<str>, factory: &RendererFactory) -> Result<Box<dyn Renderer>, TileError> {
	let factory = factory.clone();
	let style = stylesheet.clone();
	let built = tokio::task::spawn_blocking(move || (factory)(&*style)).await;
	match built {
		Ok(Ok(renderer)) => {
			trace!("render worker {id} built a renderer for '{stylesheet}'");
			Ok(renderer)
		}
		Ok(Err(err)) => {
			error!("render worker {id} could not build a renderer for '{stylesheet}': {err:#}");
			Err(TileError::render(err.context("building renderer")))
		}
		Err(err) => {
			error!("render worker {id} panicked building a renderer for '{stylesheet}': {err}");
			Err(TileError::Render(format!("building renderer panicked: {err}")))
		}
	}
}

/// Renders one request and delivers exactly the number of results the requester expects.
fn process(renderer: &mut dyn Renderer, request: FetchRequest) {
	match request {
		FetchRequest::Tile { coord, reply } => {
			let result = renderer.render_tile(&coord);
			if let Err(err) = &result {
				warn!("rendering {coord:?} failed: {err}");
			}
			if reply.send(TileFetchResult::from_result(coord, result)).is_err() {
				trace!("tile requester went away");
			}
		}
		FetchRequest::MetaTile { coord, reply } => {
			let expected = coord.count();
			match renderer.render_meta_tile(&coord) {
				Err(err) => {
					warn!("rendering {coord:?} failed: {err}");
					FetchRequest::MetaTile { coord, reply }.fail(err);
				}
				Ok(results) if results.len() != expected => {
					error!("renderer returned {} results for {coord:?}", results.len());
					let err = TileError::CountMismatch {
						expected,
						actual: results.len(),
					};
					FetchRequest::MetaTile { coord, reply }.fail(err);
				}
				Ok(results) => {
					for result in results {
						if reply.send(result).is_err() {
							trace!("block requester of {coord:?} went away");
							break;
						}
					}
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use anyhow::{Result, bail};
	use maptiles_core::{Blob, MetaTileCoord, TileCoord, TileScheme};
	use std::{
		sync::{
			atomic::{AtomicUsize, Ordering},
			mpsc as std_mpsc,
		},
		time::Duration,
	};
	use tokio::time::timeout;

	struct Fixed {
		calls: Arc<AtomicUsize>,
		results: Option<usize>,
	}

	impl Renderer for Fixed {
		fn render_tile(&mut self, coord: &TileCoord) -> Result<Blob, TileError> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			if coord.x == 99 {
				panic!("renderer crashed");
			}
			Ok(Blob::from(format!("{}/{}/{}", coord.level, coord.x, coord.y).as_str()))
		}

		fn render_meta_tile(&mut self, coord: &MetaTileCoord) -> Result<Vec<TileFetchResult>, TileError> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			let take = self.results.unwrap_or(coord.count());
			Ok(coord
				.tile_coords()
				.into_iter()
				.take(take)
				.map(|c| TileFetchResult::found(c, Blob::from("meta")))
				.collect())
		}
	}

	fn factory(calls: Arc<AtomicUsize>, builds: Arc<AtomicUsize>, results: Option<usize>) -> RendererFactory {
		Arc::new(move |style: &str| {
			builds.fetch_add(1, Ordering::SeqCst);
			if style == "broken" {
				bail!("cannot load style");
			}
			let renderer: Box<dyn Renderer> = Box::new(Fixed {
				calls: calls.clone(),
				results,
			});
			Ok(renderer)
		})
	}

	#[tokio::test]
	async fn renders_tiles_and_blocks() {
		let calls = Arc::new(AtomicUsize::new(0));
		let queue = LayerQueue::spawn("style", 2, factory(calls.clone(), Arc::default(), None));

		let coord = TileCoord::new(3, 1, 2).unwrap();
		let (request, receiver) = FetchRequest::tile(coord.clone());
		assert!(queue.submit(request).await);
		assert_eq!(receiver.result().await.blob, Some(Blob::from("3/1/2")));

		let block = MetaTileCoord::new("", 3, 1, 1, 2, 2, TileScheme::Xyz).unwrap();
		let (request, receiver) = FetchRequest::meta_tile(block.clone());
		assert!(queue.submit(request).await);
		let results = receiver.collect().await;
		assert_eq!(results.len(), 4);
		assert!(results.iter().all(TileFetchResult::is_hit));

		assert_eq!(calls.load(Ordering::SeqCst), 2);
		queue.close().await;
	}

	#[tokio::test]
	async fn count_mismatch_fails_only_that_block() {
		let queue = LayerQueue::spawn("style", 1, factory(Arc::default(), Arc::default(), Some(3)));

		let block = MetaTileCoord::new("", 3, 1, 1, 2, 2, TileScheme::Xyz).unwrap();
		let (request, receiver) = FetchRequest::meta_tile(block);
		assert!(queue.submit(request).await);
		let results = receiver.collect().await;
		assert_eq!(results.len(), 4);
		assert!(
			results
				.iter()
				.all(|r| r.error == Some(TileError::CountMismatch { expected: 4, actual: 3 }))
		);

		// the worker keeps serving
		let (request, receiver) = FetchRequest::tile(TileCoord::new(0, 0, 0).unwrap());
		assert!(queue.submit(request).await);
		assert!(receiver.result().await.is_hit());
		queue.close().await;
	}

	#[tokio::test]
	async fn broken_factory_fails_requests() {
		let builds = Arc::new(AtomicUsize::new(0));
		let queue = LayerQueue::spawn("broken", 1, factory(Arc::default(), builds.clone(), None));

		let (request, receiver) = FetchRequest::tile(TileCoord::new(1, 0, 0).unwrap());
		assert!(queue.submit(request).await);
		let result = receiver.result().await;
		assert!(matches!(result.error, Some(TileError::Render(message)) if message.contains("cannot load style")));

		// once at start, once more for the request
		assert_eq!(builds.load(Ordering::SeqCst), 2);
		queue.close().await;
	}

	#[tokio::test]
	async fn panicking_renderer_is_rebuilt() {
		let builds = Arc::new(AtomicUsize::new(0));
		let queue = LayerQueue::spawn("style", 1, factory(Arc::default(), builds.clone(), None));

		let (request, receiver) = FetchRequest::tile(TileCoord::new(7, 99, 0).unwrap());
		assert!(queue.submit(request).await);
		assert_eq!(receiver.result().await.error, Some(TileError::Abandoned));

		let (request, receiver) = FetchRequest::tile(TileCoord::new(7, 1, 0).unwrap());
		assert!(queue.submit(request).await);
		assert!(receiver.result().await.is_hit());
		assert_eq!(builds.load(Ordering::SeqCst), 2);
		queue.close().await;
	}

	#[tokio::test]
	async fn closed_queue_rejects_requests() {
		let queue = LayerQueue::spawn("style", 1, factory(Arc::default(), Arc::default(), None));
		queue.close().await;

		let (request, receiver) = FetchRequest::tile(TileCoord::new(1, 0, 0).unwrap());
		let accepted = timeout(Duration::from_secs(5), queue.submit(request)).await.unwrap();
		assert!(!accepted);
		assert_eq!(receiver.result().await.error, Some(TileError::Closed("layer queue")));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn workers_become_idle_again() {
		let queue = LayerQueue::spawn("style", 3, factory(Arc::default(), Arc::default(), None));
		let mut receivers = Vec::new();
		for x in 0..12 {
			let (request, receiver) = FetchRequest::tile(TileCoord::new(4, x, 0).unwrap());
			assert!(queue.submit(request).await);
			receivers.push(receiver);
		}
		for receiver in receivers {
			assert!(receiver.result().await.is_hit());
		}
		queue.close().await;
		assert_eq!(queue.inner.idle.available_permits(), 3);
	}

	/// Blocks every render until the test lets it through.
	struct Gated {
		gate: Arc<Mutex<std_mpsc::Receiver<()>>>,
	}

	impl Renderer for Gated {
		fn render_tile(&mut self, coord: &TileCoord) -> Result<Blob, TileError> {
			// a dropped sender opens the gate for good
			let _ = self.gate.lock().recv();
			Ok(Blob::from(format!("{}/{}/{}", coord.level, coord.x, coord.y).as_str()))
		}

		fn render_meta_tile(&mut self, _coord: &MetaTileCoord) -> Result<Vec<TileFetchResult>, TileError> {
			Err(TileError::Render("single tiles only".into()))
		}
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
	async fn submit_waits_for_an_idle_worker() {
		let (open, gate) = std_mpsc::channel();
		let gate = Arc::new(Mutex::new(gate));
		let factory: RendererFactory = Arc::new(move |_: &str| {
			let renderer: Box<dyn Renderer> = Box::new(Gated { gate: gate.clone() });
			Ok(renderer)
		});
		let queue = LayerQueue::spawn("style", 1, factory);

		let (first, first_result) = FetchRequest::tile(TileCoord::new(2, 0, 0).unwrap());
		assert!(queue.submit(first).await);

		let (second, second_result) = FetchRequest::tile(TileCoord::new(2, 1, 0).unwrap());
		let submit = queue.submit(second);
		tokio::pin!(submit);
		assert!(timeout(Duration::from_millis(100), &mut submit).await.is_err());
		assert_eq!(queue.inner.idle.available_permits(), 0);

		open.send(()).unwrap();
		assert!(first_result.result().await.is_hit());
		assert!(timeout(Duration::from_secs(5), &mut submit).await.unwrap());

		open.send(()).unwrap();
		assert_eq!(second_result.result().await.blob, Some(Blob::from("2/1/0")));
		queue.close().await;
	}
}
