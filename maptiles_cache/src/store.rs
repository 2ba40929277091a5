//! Synchronous access to a content-addressed tile cache file.
//!
//! [`TileStore`] maps `(layer, zoom, column, row)` to a checksum and each checksum to the
//! tile bytes, so identical images are stored once. Rows are stored in the TMS scheme;
//! every call converts the caller's coordinate before touching SQLite and answers with the
//! caller's original coordinate.
//!
//! One reader/writer lock per store guards the layer registry together with the tables:
//! fetches share it, while layer creation and every insert hold it exclusively.
//!
//! [`TileStore::open_read_only`] inspects a file without creating tables or touching its
//! metadata.

use crate::{CacheStats, LayerStats, checksum, schema};
use anyhow::{Context, Result, ensure};
use itertools::Itertools;
use log::{debug, trace, warn};
use maptiles_core::{Blob, TileCoord, TileError, TileFetchResult, TileScheme};
use parking_lot::RwLock;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::{
	SqliteConnectionManager,
	rusqlite::{Connection, OpenFlags, OptionalExtension, ToSql, params, params_from_iter},
};
use std::{collections::HashMap, iter::repeat_n, path::Path};

// SQLite's historical limit is 999 bound parameters per statement.
const BLOB_ROWS_PER_STATEMENT: usize = 499;
const TILE_ROWS_PER_STATEMENT: usize = 199;

const NAME: &str = "tile cache";

/// A tile ready to be written: TMS row, resolved layer name and checksum.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedTile {
	pub layer: String,
	pub level: u8,
	pub x: u32,
	pub y: u32,
	pub checksum: String,
	pub data: Vec<u8>,
}

impl PreparedTile {
	/// Returns `None` for results that carry no bytes.
	pub fn from_result(result: &TileFetchResult) -> Option<PreparedTile> {
		if result.error.is_some() {
			return None;
		}
		let blob = result.blob.as_ref()?;
		let coord = result.coord.to_scheme(TileScheme::Tms);
		Some(PreparedTile {
			layer: coord.layer_or_default().to_string(),
			level: coord.level,
			x: coord.x,
			y: coord.y,
			checksum: checksum(blob.as_slice()),
			data: blob.as_slice().to_vec(),
		})
	}
}

pub struct TileStore {
	name: String,
	pool: RwLock<Option<Pool<SqliteConnectionManager>>>,
	layers: RwLock<HashMap<String, i64>>,
	read_only: bool,
}

impl TileStore {
	/// Opens or creates the cache file at `path`.
	pub fn open(path: &Path) -> Result<TileStore> {
		debug!("open tile cache {path:?}");

		let manager = SqliteConnectionManager::file(path).with_init(schema::configure_connection);
		let pool = Pool::builder()
			.max_size(10)
			.build(manager)
			.with_context(|| format!("opening tile cache '{}'", path.display()))?;

		let conn = pool.get()?;
		schema::initialize(&conn).with_context(|| format!("initializing tile cache '{}'", path.display()))?;
		let layers = read_layers(&conn)?;
		drop(conn);

		Ok(TileStore::with_pool(path, pool, layers, false))
	}

	/// Opens an existing cache file without creating tables or rewriting its metadata.
	///
	/// Every insert on the returned store fails.
	pub fn open_read_only(path: &Path) -> Result<TileStore> {
		debug!("open tile cache {path:?} read only");
		ensure!(path.is_file(), "tile cache '{}' does not exist", path.display());

		let manager = SqliteConnectionManager::file(path)
			.with_flags(OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI)
			.with_init(schema::configure_read_only);
		let pool = Pool::builder()
			.max_size(2)
			.build(manager)
			.with_context(|| format!("opening tile cache '{}'", path.display()))?;

		let conn = pool.get()?;
		let layers = read_layers(&conn).with_context(|| format!("'{}' is not a tile cache", path.display()))?;
		drop(conn);

		Ok(TileStore::with_pool(path, pool, layers, true))
	}

	fn with_pool(
		path: &Path,
		pool: Pool<SqliteConnectionManager>,
		layers: HashMap<String, i64>,
		read_only: bool,
	) -> TileStore {
		TileStore {
			name: path.display().to_string(),
			pool: RwLock::new(Some(pool)),
			layers: RwLock::new(layers),
			read_only,
		}
	}

	/// A pooled connection, or an error once the store is closed.
	fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
		let pool = self
			.pool
			.read()
			.clone()
			.with_context(|| format!("{NAME} '{}' is closed", self.name))?;
		Ok(pool.get()?)
	}

	fn ensure_writable(&self) -> Result<()> {
		ensure!(!self.is_closed(), "{NAME} '{}' is closed", self.name);
		ensure!(!self.read_only, "{NAME} '{}' is read only", self.name);
		Ok(())
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Looks up one tile.
	///
	/// Unknown layers and absent records are misses. A record whose blob is gone is an
	/// [`TileError::Integrity`] failure.
	pub fn fetch(&self, coord: &TileCoord) -> TileFetchResult {
		if self.is_closed() {
			return TileFetchResult::failed(coord.clone(), TileError::Closed(NAME));
		}
		let tms = coord.to_scheme(TileScheme::Tms);

		let layers = self.layers.read();
		let Some(&layer_id) = layers.get(tms.layer_or_default()) else {
			trace!("unknown layer for {coord:?}");
			return TileFetchResult::missing(coord.clone());
		};

		match self.lookup(layer_id, &tms) {
			Ok(None) => TileFetchResult::missing(coord.clone()),
			Ok(Some((_, Some(data)))) => TileFetchResult::found(coord.clone(), Blob::from(data)),
			Ok(Some((checksum, None))) => {
				warn!("{coord:?} references missing blob {checksum}");
				TileFetchResult::failed(coord.clone(), TileError::Integrity { checksum })
			}
			Err(err) => {
				warn!("fetching {coord:?} from '{}' failed: {err:#}", self.name);
				TileFetchResult::failed(coord.clone(), TileError::storage(err))
			}
		}
	}

	fn lookup(&self, layer_id: i64, tms: &TileCoord) -> Result<Option<(String, Option<Vec<u8>>)>> {
		let conn = self.connection()?;
		let mut stmt = conn.prepare_cached(
			"SELECT layered_tiles.checksum, tile_blobs.tile_data
			FROM layered_tiles
			LEFT JOIN tile_blobs ON tile_blobs.checksum = layered_tiles.checksum
			WHERE layer_id = ?1 AND zoom_level = ?2 AND tile_column = ?3 AND tile_row = ?4",
		)?;
		let row = stmt
			.query_row(params![layer_id, tms.level, tms.x, tms.y], |row| {
				Ok((row.get(0)?, row.get(1)?))
			})
			.optional()?;
		Ok(row)
	}

	/// Stores one result. Returns `false` if the result had no bytes to store.
	///
	/// Inserting the same result twice leaves the cache unchanged.
	pub fn insert(&self, result: &TileFetchResult) -> Result<bool> {
		let Some(tile) = PreparedTile::from_result(result) else {
			trace!("nothing to store for {:?}", result.coord);
			return Ok(false);
		};
		self.insert_prepared(&tile)?;
		Ok(true)
	}

	pub fn insert_prepared(&self, tile: &PreparedTile) -> Result<()> {
		self.ensure_writable()?;

		let mut layers = self.layers.write();
		let mut conn = self.connection()?;
		let layer_id = ensure_layer_locked(&conn, &mut layers, &tile.layer)?;

		let tx = conn.transaction()?;
		tx.execute(
			"INSERT OR IGNORE INTO tile_blobs (checksum, tile_data) VALUES (?1, ?2)",
			params![tile.checksum, tile.data],
		)?;
		tx.execute(
			"REPLACE INTO layered_tiles (layer_id, zoom_level, tile_column, tile_row, checksum) VALUES (?1, ?2, ?3, ?4, ?5)",
			params![layer_id, tile.level, tile.x, tile.y, tile.checksum],
		)?;
		tx.commit()
			.with_context(|| format!("storing tile {}/{}/{} of layer '{}'", tile.level, tile.x, tile.y, tile.layer))?;
		Ok(())
	}

	/// Stores many tiles in one transaction with the same end state as inserting them one by one.
	///
	/// Returns the number of new blobs written.
	pub fn batch_insert(&self, tiles: &[PreparedTile]) -> Result<usize> {
		self.ensure_writable()?;
		if tiles.is_empty() {
			return Ok(0);
		}

		let mut layers = self.layers.write();
		let mut conn = self.connection()?;

		let mut layer_ids: HashMap<&str, i64> = HashMap::new();
		for name in tiles.iter().map(|tile| tile.layer.as_str()).unique() {
			layer_ids.insert(name, ensure_layer_locked(&conn, &mut layers, name)?);
		}

		let tx = conn.transaction()?;

		let fresh: Vec<&PreparedTile> = {
			let mut exists = tx.prepare_cached("SELECT 1 FROM tile_blobs WHERE checksum = ?1")?;
			let mut fresh = Vec::new();
			for tile in tiles.iter().unique_by(|tile| tile.checksum.as_str()) {
				if !exists.exists(params![tile.checksum])? {
					fresh.push(tile);
				}
			}
			fresh
		};

		for chunk in fresh.chunks(BLOB_ROWS_PER_STATEMENT) {
			let sql = format!(
				"INSERT INTO tile_blobs (checksum, tile_data) VALUES {}",
				repeat_n("(?, ?)", chunk.len()).join(", ")
			);
			let args: Vec<&dyn ToSql> = chunk
				.iter()
				.flat_map(|tile| [&tile.checksum as &dyn ToSql, &tile.data])
				.collect();
			tx.execute(&sql, params_from_iter(args))?;
		}

		for chunk in tiles.chunks(TILE_ROWS_PER_STATEMENT) {
			let sql = format!(
				"REPLACE INTO layered_tiles (layer_id, zoom_level, tile_column, tile_row, checksum) VALUES {}",
				repeat_n("(?, ?, ?, ?, ?)", chunk.len()).join(", ")
			);
			let args: Vec<&dyn ToSql> = chunk
				.iter()
				.flat_map(|tile| {
					[
						&layer_ids[tile.layer.as_str()] as &dyn ToSql,
						&tile.level,
						&tile.x,
						&tile.y,
						&tile.checksum,
					]
				})
				.collect();
			tx.execute(&sql, params_from_iter(args))?;
		}

		tx.commit()
			.with_context(|| format!("storing a batch of {} tiles in '{}'", tiles.len(), self.name))?;
		debug!("stored {} tiles with {} new blobs", tiles.len(), fresh.len());
		Ok(fresh.len())
	}

	/// Returns the id of `name`, registering the layer if needed.
	pub fn ensure_layer(&self, name: &str) -> Result<i64> {
		if let Some(&id) = self.layers.read().get(name) {
			return Ok(id);
		}
		self.ensure_writable()?;
		let mut layers = self.layers.write();
		let conn = self.connection()?;
		ensure_layer_locked(&conn, &mut layers, name)
	}

	#[must_use]
	pub fn layer_id(&self, name: &str) -> Option<i64> {
		self.layers.read().get(name).copied()
	}

	#[must_use]
	pub fn layer_names(&self) -> Vec<String> {
		self.layers.read().keys().sorted().cloned().collect()
	}

	/// Reads a tile of the `default` layer through the plain MBTiles `tiles` view.
	pub fn read_default_tile(&self, coord: &TileCoord) -> Result<Option<Blob>> {
		let tms = coord.to_scheme(TileScheme::Tms);
		let _layers = self.layers.read();
		let conn = self.connection()?;
		let data: Option<Option<Vec<u8>>> = conn
			.query_row(
				"SELECT tile_data FROM tiles WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
				params![tms.level, tms.x, tms.y],
				|row| row.get(0),
			)
			.optional()
			.with_context(|| format!("reading {coord:?} through the tiles view"))?;
		Ok(data.flatten().map(Blob::from))
	}

	pub fn stats(&self) -> Result<CacheStats> {
		let _layers = self.layers.read();
		let conn = self.connection()?;

		let mut stmt = conn.prepare(
			"SELECT layers.layer_name, COUNT(layered_tiles.layer_id)
			FROM layers
			LEFT JOIN layered_tiles ON layered_tiles.layer_id = layers.rowid
			GROUP BY layers.rowid
			ORDER BY layers.layer_name",
		)?;
		let layers = stmt
			.query_map([], |row| {
				Ok(LayerStats {
					name: row.get(0)?,
					tiles: row.get(1)?,
				})
			})?
			.collect::<Result<Vec<_>, _>>()?;

		let (blobs, blob_bytes) = conn.query_row(
			"SELECT COUNT(*), COALESCE(SUM(LENGTH(tile_data)), 0) FROM tile_blobs",
			[],
			|row| Ok((row.get(0)?, row.get(1)?)),
		)?;

		Ok(CacheStats {
			layers,
			blobs,
			blob_bytes,
		})
	}

	/// The `metadata` table as name/value pairs, sorted by name.
	pub fn metadata(&self) -> Result<Vec<(String, String)>> {
		let conn = self.connection()?;
		let mut stmt = conn.prepare("SELECT name, value FROM metadata ORDER BY name")?;
		let entries = stmt
			.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
			.collect::<Result<Vec<_>, _>>()?;
		Ok(entries)
	}

	/// Drops the connection pool. Later fetches fail with [`TileError::Closed`] and inserts fail.
	///
	/// Connections still checked out close as soon as their call returns.
	pub fn close(&self) {
		if self.pool.write().take().is_some() {
			debug!("closed tile cache '{}'", self.name);
		}
	}

	#[must_use]
	pub fn is_closed(&self) -> bool {
		self.pool.read().is_none()
	}

	#[must_use]
	pub fn is_read_only(&self) -> bool {
		self.read_only
	}
}

impl std::fmt::Debug for TileStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TileStore")
			.field("name", &self.name)
			.field("closed", &self.is_closed())
			.field("read_only", &self.read_only)
			.finish()
	}
}

fn read_layers(conn: &Connection) -> Result<HashMap<String, i64>> {
	let mut stmt = conn.prepare("SELECT rowid, layer_name FROM layers")?;
	let layers = stmt
		.query_map([], |row| Ok((row.get(1)?, row.get(0)?)))?
		.collect::<Result<HashMap<_, _>, _>>()
		.context("reading layer registry")?;
	Ok(layers)
}

/// Resolves `name` while the caller holds the registry exclusively.
fn ensure_layer_locked(conn: &Connection, layers: &mut HashMap<String, i64>, name: &str) -> Result<i64> {
	if let Some(&id) = layers.get(name) {
		return Ok(id);
	}
	conn
		.execute("INSERT OR IGNORE INTO layers (layer_name) VALUES (?1)", params![name])
		.with_context(|| format!("registering layer '{name}'"))?;
	*layers = read_layers(conn)?;
	debug!("registered layer '{name}'");
	layers
		.get(name)
		.copied()
		.with_context(|| format!("layer '{name}' missing after registration"))
}
