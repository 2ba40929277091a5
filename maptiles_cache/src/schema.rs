//! SQLite layout of the tile cache.
//!
//! - `layers`: registry of layer names, the implicit `rowid` is the layer id
//! - `metadata`: MBTiles 1.2 key/value pairs
//! - `layered_tiles`: one record per (layer, zoom, column, TMS row), pointing at a checksum
//! - `tile_blobs`: deduplicated tile bytes keyed by checksum
//! - `tiles`: view exposing the `default` layer in plain MBTiles shape

use anyhow::{Context, Result};
use maptiles_core::{DEFAULT_LAYER, GeoBBox};
use r2d2_sqlite::rusqlite::{self, Connection, params};
use std::time::Duration;

/// Applied to every pooled connection.
pub fn configure_connection(conn: &mut Connection) -> rusqlite::Result<()> {
	conn.busy_timeout(Duration::from_secs(5))?;
	conn.pragma_update(None, "synchronous", "OFF")?;
	conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
	Ok(())
}

/// Applied to connections of a read only store.
pub fn configure_read_only(conn: &mut Connection) -> rusqlite::Result<()> {
	conn.busy_timeout(Duration::from_secs(5))
}

const TABLES: &str = "CREATE TABLE IF NOT EXISTS layers (layer_name TEXT PRIMARY KEY NOT NULL);
	CREATE TABLE IF NOT EXISTS metadata (name TEXT PRIMARY KEY NOT NULL, value TEXT NOT NULL);
	CREATE TABLE IF NOT EXISTS tile_blobs (checksum TEXT PRIMARY KEY NOT NULL, tile_data BLOB);
	CREATE TABLE IF NOT EXISTS layered_tiles (
		layer_id INTEGER,
		zoom_level INTEGER,
		tile_column INTEGER,
		tile_row INTEGER,
		checksum TEXT,
		PRIMARY KEY (layer_id, zoom_level, tile_column, tile_row),
		FOREIGN KEY (checksum) REFERENCES tile_blobs (checksum)
	);
	CREATE VIEW IF NOT EXISTS tiles AS
		SELECT
			layered_tiles.zoom_level AS zoom_level,
			layered_tiles.tile_column AS tile_column,
			layered_tiles.tile_row AS tile_row,
			(SELECT tile_data FROM tile_blobs WHERE checksum = layered_tiles.checksum) AS tile_data
		FROM layered_tiles
		WHERE layered_tiles.layer_id = (SELECT rowid FROM layers WHERE layer_name = 'default');";

const DESCRIPTION: &str = "Compatible with MBTiles spec 1.2. This file may contain multiple overlay layers, \
	but only the layer called default is exported as MBTiles";

/// Creates missing tables, refreshes the metadata and registers the default layer.
pub fn initialize(conn: &Connection) -> Result<()> {
	conn.execute_batch(TABLES).context("creating cache tables")?;

	let bounds = GeoBBox::from_edges(-180.0, -85.0, 180.0, 85.0).to_string();
	let entries = [
		("name", "maptiles cache file"),
		("type", "overlay"),
		("version", "0"),
		("description", DESCRIPTION),
		("format", "png"),
		("bounds", bounds.as_str()),
	];
	for (name, value) in entries {
		conn
			.execute("REPLACE INTO metadata (name, value) VALUES (?1, ?2)", params![name, value])
			.with_context(|| format!("setting metadata '{name}'"))?;
	}

	conn
		.execute("INSERT OR IGNORE INTO layers (layer_name) VALUES (?1)", params![DEFAULT_LAYER])
		.context("registering the default layer")?;
	Ok(())
}
