//! Tile data model.
//!
//! This module defines what the blob store stores and how callers address it.
//!
//! # Components
//!
//! - [`TileKey`]: Composite identity of one tile (layer, grid set, x/y/z, format, parameters id)
//! - [`TileBlob`]: A tile payload with its key and creation timestamp
//! - [`TileRange`]: Per-zoom rectangles of tiles, used by bulk deletion
//! - [`MimeType`]: Tile format to file extension mapping
//! - [`ParameterSet`] / [`ParameterHasher`]: Non-default rendering parameters and their ids
//! - [`GridRegistry`]: Tile row counts per grid set and zoom level
//!
//! # Example
//!
//! ```
//! use tile_store::tile::{RangeBounds, TileKey, TileRange};
//!
//! let key = TileKey::new("africa", "EPSG:4326", (10, 50, 5), "image/png");
//! assert_eq!(key.xyz(), (10, 50, 5));
//!
//! let range = TileRange::new("africa", "EPSG:4326", 5, 5, "image/png")
//!     .unwrap()
//!     .with_bounds(5, RangeBounds::new(0, 0, 15, 63));
//! assert!(range.contains(10, 50, 5));
//! ```

mod grid;
mod key;
mod mime;
mod params;
mod range;

pub use grid::{GridDefinition, GridRegistry, StaticGridRegistry};
pub use key::{TileBlob, TileKey};
pub use mime::MimeType;
pub use params::{ParameterHasher, ParameterSet, Sha256ParameterHasher};
pub use range::{RangeBounds, TileRange};
