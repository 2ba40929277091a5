//! Configuration of the render and cache setup.
//!
//! Deserialized from a YAML file, for example:
//!
//! ```yaml
//! cache_file: cache.mbtiles
//! renderers: 4
//! metatile_size: 8
//! layers:
//!   - name: default
//!     style: "#e0e8f0"
//!   - name: night
//!     style: "#102030"
//! ```

mod layer;
mod main;

pub use layer::LayerConfig;
pub use main::Config;
