//! Contains types like coordinates, metatiles, bounding boxes, blobs and fetch results.

mod blob;
pub use blob::*;

mod fetch_request;
pub use fetch_request::*;

mod fetch_result;
pub use fetch_result::*;

mod geo_bbox;
pub use geo_bbox::*;

mod meta_tile_coord;
pub use meta_tile_coord::*;

mod tile_coord;
pub use tile_coord::*;

mod tile_error;
pub use tile_error::*;

mod tile_scheme;
pub use tile_scheme::*;
