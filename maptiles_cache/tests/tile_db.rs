use assert_fs::NamedTempFile;
use maptiles_cache::{TileDb, checksum};
use maptiles_core::{Blob, TileCoord, TileError, TileFetchResult, TileScheme};
use std::sync::Arc;
use tokio::task::JoinSet;

fn open() -> (NamedTempFile, TileDb) {
	let file = NamedTempFile::new("cache.mbtiles").unwrap();
	let db = TileDb::open(file.path()).unwrap();
	(file, db)
}

fn coord(layer: &str, level: u8, x: u32, y: u32) -> TileCoord {
	TileCoord::new(level, x, y).unwrap().with_layer(layer)
}

#[tokio::test]
async fn fetch_after_insert_wait() {
	let (_file, db) = open();
	let c = coord("osm", 5, 3, 4);

	assert!(db.fetch(c.clone()).await.is_miss());

	db.insert_wait(TileFetchResult::found(c.clone(), Blob::from("png")))
		.await
		.unwrap();

	let result = db.fetch(c.clone()).await;
	assert_eq!(result.coord, c);
	assert_eq!(result.blob, Some(Blob::from("png")));

	let tms = c.to_scheme(TileScheme::Tms);
	assert_eq!(db.fetch(tms.clone()).await.coord, tms);
	db.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_fetches_and_inserts() {
	let (_file, db) = open();
	let db = Arc::new(db);

	let mut tasks = JoinSet::new();
	for i in 0..64u32 {
		let db = db.clone();
		tasks.spawn(async move {
			let c = coord(["a", "b"][(i % 2) as usize], 8, i, i);
			db.insert_wait(TileFetchResult::found(c.clone(), Blob::from(format!("tile {}", i % 4).as_str())))
				.await
				.unwrap();
			db.fetch(c).await
		});
	}
	while let Some(result) = tasks.join_next().await {
		assert!(result.unwrap().is_hit());
	}

	let stats = db.store().stats().unwrap();
	assert_eq!(stats.tiles(), 64);
	assert_eq!(stats.blobs, 4);
	db.close().await;
}

#[tokio::test]
async fn close_waits_for_queued_inserts() {
	let file = NamedTempFile::new("cache.mbtiles").unwrap();
	{
		let db = TileDb::open(file.path()).unwrap();
		for x in 0..16 {
			db.insert(TileFetchResult::found(coord("osm", 4, x, 0), Blob::from("sea")))
				.await
				.unwrap();
		}
		db.close().await;
		assert!(db.is_closed());
	}

	let db = TileDb::open(file.path()).unwrap();
	assert_eq!(db.store().stats().unwrap().tiles(), 16);
	db.close().await;
}

#[tokio::test]
async fn closed_cache_rejects_work() {
	let (_file, db) = open();
	db.close().await;
	db.close().await;

	let c = coord("osm", 1, 0, 0);
	assert_eq!(db.fetch(c.clone()).await.error, Some(TileError::Closed("tile cache")));
	assert_eq!(
		db.insert(TileFetchResult::found(c.clone(), Blob::from("x"))).await,
		Err(TileError::Closed("tile cache"))
	);
	assert!(db.batch_insert(vec![TileFetchResult::found(c, Blob::from("x"))]).await.is_err());
}

#[tokio::test]
async fn batch_insert_skips_results_without_bytes() {
	let (_file, db) = open();
	let results = vec![
		TileFetchResult::found(coord("", 2, 0, 0), Blob::from("one")),
		TileFetchResult::found(coord("", 2, 0, 1), Blob::from("one")),
		TileFetchResult::found(coord("", 2, 1, 0), Blob::from("two")),
		TileFetchResult::missing(coord("", 2, 1, 1)),
		TileFetchResult::failed(coord("", 2, 2, 2), TileError::Render("boom".into())),
	];
	assert_eq!(db.batch_insert(results).await.unwrap(), 2);

	assert!(db.fetch(coord("", 2, 0, 1)).await.is_hit());
	assert!(db.fetch(coord("default", 2, 1, 0)).await.is_hit());
	assert!(db.fetch(coord("", 2, 1, 1)).await.is_miss());
	assert!(db.fetch(coord("", 2, 2, 2)).await.is_miss());

	let view = db.store().read_default_tile(&coord("", 2, 0, 0)).unwrap();
	assert_eq!(view, Some(Blob::from("one")));
	assert_eq!(checksum(b"one").len(), 64);
	db.close().await;
}
