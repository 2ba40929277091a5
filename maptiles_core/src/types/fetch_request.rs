//! Render requests and their reply channels.
//!
//! A [`FetchRequest`] carries the coordinate to render and the channel the answer goes
//! back on. A single tile request is answered exactly once through a one-shot channel.
//! A metatile request is answered with exactly `count()` results through a stream.
//!
//! # Examples
//!
//! ```
//! use maptiles_core::{FetchRequest, TileCoord, TileError};
//!
//! # tokio_test();
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn tokio_test() {
//! let (request, receiver) = FetchRequest::tile(TileCoord::new(2, 1, 1).unwrap());
//! request.fail(TileError::UnknownLayer(String::new()));
//! let result = receiver.result().await;
//! assert!(result.error.is_some());
//! # }
//! ```

use crate::{MetaTileCoord, TileCoord, TileError, TileFetchResult};
use log::debug;
use tokio::sync::{mpsc, oneshot};

/// A request for one tile or one block of tiles.
#[derive(Debug)]
pub enum FetchRequest {
	Tile {
		coord: TileCoord,
		reply: oneshot::Sender<TileFetchResult>,
	},
	MetaTile {
		coord: MetaTileCoord,
		reply: mpsc::UnboundedSender<TileFetchResult>,
	},
}

impl FetchRequest {
	/// A single tile request and the receiver of its only result.
	#[must_use]
	pub fn tile(coord: TileCoord) -> (FetchRequest, TileReceiver) {
		let (tx, rx) = oneshot::channel();
		let receiver = TileReceiver {
			coord: coord.clone(),
			rx,
		};
		(FetchRequest::Tile { coord, reply: tx }, receiver)
	}

	/// A metatile request and the receiver of its `count()` results.
	#[must_use]
	pub fn meta_tile(coord: MetaTileCoord) -> (FetchRequest, MetaTileReceiver) {
		let (tx, rx) = mpsc::unbounded_channel();
		let receiver = MetaTileReceiver {
			coord: coord.clone(),
			rx,
		};
		(FetchRequest::MetaTile { coord, reply: tx }, receiver)
	}

	/// The layer name used for routing.
	#[must_use]
	pub fn layer(&self) -> &str {
		match self {
			FetchRequest::Tile { coord, .. } => &coord.layer,
			FetchRequest::MetaTile { coord, .. } => coord.layer(),
		}
	}

	/// How many results the requester waits for.
	#[must_use]
	pub fn expected_count(&self) -> usize {
		match self {
			FetchRequest::Tile { .. } => 1,
			FetchRequest::MetaTile { coord, .. } => coord.count(),
		}
	}

	/// Answers the request with `error`, once per expected result, in `tile_coords()` order.
	pub fn fail(self, error: TileError) {
		match self {
			FetchRequest::Tile { coord, reply } => {
				if reply.send(TileFetchResult::failed(coord, error)).is_err() {
					debug!("requester of a failed tile went away");
				}
			}
			FetchRequest::MetaTile { coord, reply } => {
				for tile in coord.tile_coords() {
					if reply.send(TileFetchResult::failed(tile, error.clone())).is_err() {
						debug!("requester of failed block {coord:?} went away");
						break;
					}
				}
			}
		}
	}
}

/// Receives the result of a single tile request.
#[derive(Debug)]
pub struct TileReceiver {
	coord: TileCoord,
	rx: oneshot::Receiver<TileFetchResult>,
}

impl TileReceiver {
	#[must_use]
	pub fn coord(&self) -> &TileCoord {
		&self.coord
	}

	/// Waits for the result. A dropped reply slot yields [`TileError::Abandoned`].
	pub async fn result(self) -> TileFetchResult {
		match self.rx.await {
			Ok(result) => result,
			Err(_) => TileFetchResult::failed(self.coord, TileError::Abandoned),
		}
	}
}

/// Receives the results of a metatile request.
#[derive(Debug)]
pub struct MetaTileReceiver {
	coord: MetaTileCoord,
	rx: mpsc::UnboundedReceiver<TileFetchResult>,
}

impl MetaTileReceiver {
	#[must_use]
	pub fn coord(&self) -> &MetaTileCoord {
		&self.coord
	}

	/// Receives the next result, or `None` once the sender is gone.
	pub async fn recv(&mut self) -> Option<TileFetchResult> {
		self.rx.recv().await
	}

	/// Collects exactly `count()` results.
	///
	/// If the sender goes away early, the missing positions are filled with
	/// [`TileError::Abandoned`] for the remaining coordinates in `tile_coords()` order.
	pub async fn collect(mut self) -> Vec<TileFetchResult> {
		let count = self.coord.count();
		let mut results = Vec::with_capacity(count);
		while results.len() < count {
			match self.rx.recv().await {
				Some(result) => results.push(result),
				None => break,
			}
		}
		if results.len() < count {
			debug!("block {:?} abandoned after {} of {count} results", self.coord, results.len());
			let missing = self.coord.tile_coords().into_iter().skip(results.len());
			results.extend(missing.map(|coord| TileFetchResult::failed(coord, TileError::Abandoned)));
		}
		results
	}
}
