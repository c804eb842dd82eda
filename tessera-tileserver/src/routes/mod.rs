//! HTTP routes of the tile server.
//!
//! There is a single endpoint; it is installed as the router fallback so every
//! path, valid or not, reaches the tile handler and gets its plain-text 404.

pub mod tile;

pub use tile::{serve_tile, ACCESS_COOKIE};
