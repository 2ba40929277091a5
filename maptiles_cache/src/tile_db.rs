//! Asynchronous front end of a [`TileStore`].
//!
//! A [`TileDb`] owns two bounded queues, one for fetches and one for inserts. A single
//! dispatcher task drains both and runs every item as an independent blocking task, so
//! many fetches proceed in parallel while inserts serialize on the store's exclusive lock.
//!
//! ```no_run
//! use maptiles_cache::TileDb;
//! use maptiles_core::{Blob, TileCoord, TileFetchResult};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db = TileDb::open(Path::new("/tmp/cache.mbtiles"))?;
//!     let coord = TileCoord::new(3, 1, 2)?.with_layer("osm");
//!     db.insert_wait(TileFetchResult::found(coord.clone(), Blob::from("png"))).await?;
//!     assert!(db.fetch(coord).await.is_hit());
//!     db.close().await;
//!     Ok(())
//! }
//! ```

use crate::{PreparedTile, TileStore};
use anyhow::{Context, Result, ensure};
use futures::future::join_all;
use log::{debug, error, trace, warn};
use maptiles_core::{TileCoord, TileError, TileFetchResult};
use parking_lot::Mutex;
use std::{path::Path, sync::Arc};
use tokio::{
	sync::{mpsc, oneshot},
	task::{JoinHandle, JoinSet},
};

const QUEUE_CAPACITY: usize = 64;
const NAME: &str = "tile cache";

struct FetchJob {
	coord: TileCoord,
	reply: oneshot::Sender<TileFetchResult>,
}

struct InsertJob {
	result: TileFetchResult,
	ack: Option<oneshot::Sender<Result<(), TileError>>>,
}

pub struct TileDb {
	store: Arc<TileStore>,
	fetch_tx: Mutex<Option<mpsc::Sender<FetchJob>>>,
	insert_tx: Mutex<Option<mpsc::Sender<InsertJob>>>,
	dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl TileDb {
	/// Opens the cache file and starts the dispatcher. Must run inside a tokio runtime.
	pub fn open(path: &Path) -> Result<TileDb> {
		let store = TileStore::open(path)?;
		Ok(TileDb::from_store(store))
	}

	pub fn from_store(store: TileStore) -> TileDb {
		let store = Arc::new(store);
		let (fetch_tx, fetch_rx) = mpsc::channel(QUEUE_CAPACITY);
		let (insert_tx, insert_rx) = mpsc::channel(QUEUE_CAPACITY);
		let dispatcher = tokio::spawn(dispatch(store.clone(), fetch_rx, insert_rx));

		TileDb {
			store,
			fetch_tx: Mutex::new(Some(fetch_tx)),
			insert_tx: Mutex::new(Some(insert_tx)),
			dispatcher: Mutex::new(Some(dispatcher)),
		}
	}

	#[must_use]
	pub fn store(&self) -> &Arc<TileStore> {
		&self.store
	}

	/// Looks up one tile. The result always carries `coord` as given.
	pub async fn fetch(&self, coord: TileCoord) -> TileFetchResult {
		let Some(tx) = self.fetch_tx.lock().clone() else {
			return TileFetchResult::failed(coord, TileError::Closed(NAME));
		};
		let (reply, rx) = oneshot::channel();
		let job = FetchJob {
			coord: coord.clone(),
			reply,
		};
		if tx.send(job).await.is_err() {
			return TileFetchResult::failed(coord, TileError::Closed(NAME));
		}
		match rx.await {
			Ok(result) => result,
			Err(_) => {
				warn!("{NAME} dropped the fetch of {coord:?}");
				TileFetchResult::failed(coord, TileError::Abandoned)
			}
		}
	}

	/// Queues `result` for storage without waiting for it to be written.
	///
	/// Results without bytes are accepted and ignored.
	pub async fn insert(&self, result: TileFetchResult) -> Result<(), TileError> {
		self.enqueue_insert(InsertJob { result, ack: None }).await
	}

	/// Queues `result` for storage and waits until it is written.
	pub async fn insert_wait(&self, result: TileFetchResult) -> Result<(), TileError> {
		let (ack, rx) = oneshot::channel();
		self
			.enqueue_insert(InsertJob {
				result,
				ack: Some(ack),
			})
			.await?;
		rx.await.unwrap_or(Err(TileError::Abandoned))
	}

	async fn enqueue_insert(&self, job: InsertJob) -> Result<(), TileError> {
		let Some(tx) = self.insert_tx.lock().clone() else {
			return Err(TileError::Closed(NAME));
		};
		tx.send(job).await.map_err(|_| TileError::Closed(NAME))
	}

	/// Stores many results in one transaction.
	///
	/// Checksums and scheme conversion run concurrently before the store is locked.
	/// Returns the number of new blobs written.
	pub async fn batch_insert(&self, results: Vec<TileFetchResult>) -> Result<usize> {
		ensure!(!self.store.is_closed(), "{NAME} '{}' is closed", self.store.name());

		let prepared = join_all(
			results
				.into_iter()
				.map(|result| tokio::task::spawn_blocking(move || PreparedTile::from_result(&result))),
		)
		.await
		.into_iter()
		.collect::<Result<Vec<Option<PreparedTile>>, _>>()
		.context("preparing tiles for batch insert")?
		.into_iter()
		.flatten()
		.collect::<Vec<_>>();

		trace!("batch insert of {} tiles", prepared.len());
		let store = self.store.clone();
		tokio::task::spawn_blocking(move || store.batch_insert(&prepared))
			.await
			.context("batch insert task failed")?
	}

	/// Stops accepting work, waits for every queued and running item to finish, then
	/// marks the store closed. Calling it again does nothing.
	pub async fn close(&self) {
		drop(self.fetch_tx.lock().take());
		drop(self.insert_tx.lock().take());
		let dispatcher = self.dispatcher.lock().take();
		if let Some(dispatcher) = dispatcher {
			if let Err(err) = dispatcher.await {
				error!("{NAME} dispatcher failed: {err}");
			}
			self.store.close();
		}
	}

	#[must_use]
	pub fn is_closed(&self) -> bool {
		self.store.is_closed()
	}
}

/// Runs until both queues are closed and drained, then waits for every spawned task.
async fn dispatch(
	store: Arc<TileStore>,
	mut fetch_rx: mpsc::Receiver<FetchJob>,
	mut insert_rx: mpsc::Receiver<InsertJob>,
) {
	let mut tasks = JoinSet::new();
	let mut fetch_open = true;
	let mut insert_open = true;

	while fetch_open || insert_open {
		tokio::select! {
			job = fetch_rx.recv(), if fetch_open => match job {
				Some(job) => {
					let store = store.clone();
					tasks.spawn_blocking(move || run_fetch(&store, job));
				}
				None => fetch_open = false,
			},
			job = insert_rx.recv(), if insert_open => match job {
				Some(job) => {
					let store = store.clone();
					tasks.spawn_blocking(move || run_insert(&store, job));
				}
				None => insert_open = false,
			},
			Some(done) = tasks.join_next(), if !tasks.is_empty() => {
				if let Err(err) = done {
					error!("{NAME} task failed: {err}");
				}
			}
		}
	}

	while let Some(done) = tasks.join_next().await {
		if let Err(err) = done {
			error!("{NAME} task failed: {err}");
		}
	}
	debug!("{NAME} dispatcher finished");
}

fn run_fetch(store: &TileStore, job: FetchJob) {
	let result = store.fetch(&job.coord);
	if job.reply.send(result).is_err() {
		trace!("fetch requester of {:?} went away", job.coord);
	}
}

fn run_insert(store: &TileStore, job: InsertJob) {
	let outcome = store.insert(&job.result).map(|_| ()).map_err(|err| {
		error!("storing {:?} failed: {err:#}", job.result.coord);
		TileError::storage(err)
	});
	if let Some(ack) = job.ack {
		if ack.send(outcome).is_err() {
			trace!("insert requester of {:?} went away", job.result.coord);
		}
	}
}
