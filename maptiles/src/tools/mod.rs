pub mod probe;
pub mod seed;
pub mod tile;
