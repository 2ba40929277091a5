use anyhow::{Result, ensure};
use maptiles_cache::TileStore;
use std::path::PathBuf;

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
pub struct Subcommand {
	/// cache file to inspect
	#[arg(required = true)]
	filename: PathBuf,
}

pub fn run(arguments: &Subcommand) -> Result<()> {
	let path = &arguments.filename;
	ensure!(path.is_file(), "cache file {path:?} does not exist");
	log::info!("probe {path:?}");

	let store = TileStore::open_read_only(path)?;
	println!("cache: {path:?}");
	println!("{}", store.stats()?);
	println!("metadata:");
	for (name, value) in store.metadata()? {
		println!("  {name}: {value}");
	}
	store.close();
	Ok(())
}

#[cfg(test)]
mod tests {
	use crate::tests::run_command;
	use assert_fs::NamedTempFile;
	use maptiles_cache::TileStore;

	#[test]
	fn missing_file() {
		let err = run_command(vec!["maptiles", "probe", "/does/not/exist.mbtiles"]).unwrap_err();
		assert!(err.to_string().contains("does not exist"));
	}

	#[test]
	fn empty_cache() {
		let file = NamedTempFile::new("probe.mbtiles").unwrap();
		TileStore::open(file.path()).unwrap().close();
		run_command(vec!["maptiles", "-q", "probe", file.path().to_str().unwrap()]).unwrap();
	}

	#[test]
	fn metadata_is_left_untouched() {
		let file = NamedTempFile::new("named.mbtiles").unwrap();
		let store = TileStore::open(file.path()).unwrap();
		store.close();
		let conn = r2d2_sqlite::rusqlite::Connection::open(file.path()).unwrap();
		conn
			.execute("UPDATE metadata SET value = 'my tileset' WHERE name = 'name'", [])
			.unwrap();
		drop(conn);

		run_command(vec!["maptiles", "-q", "probe", file.path().to_str().unwrap()]).unwrap();

		let store = TileStore::open_read_only(file.path()).unwrap();
		assert!(store.metadata().unwrap().contains(&("name".to_string(), "my tileset".to_string())));
		store.close();
	}
}
