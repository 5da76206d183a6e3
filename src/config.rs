//! Configuration for the tile store.
//!
//! [`StoreConfig`] holds everything [`FileBlobStore::open`] needs. It can be
//! built in code with the `with_*` methods, deserialized with serde, or
//! produced from the command line through [`Cli`].
//!
//! # Example
//!
//! ```
//! use tile_store::config::{Layout, StoreConfig};
//! use tile_store::path::Convention;
//!
//! let config = StoreConfig::new("/var/cache/tiles")
//!     .with_layout(Layout::Xyz { convention: Convention::Xyz })
//!     .with_lock_shards(64);
//! assert!(config.validate().is_ok());
//! ```
//!
//! # Environment Variables
//!
//! Every global CLI option can also be set via an environment variable with
//! the `TILE_STORE_` prefix:
//!
//! - `TILE_STORE_ROOT` - Store root directory (required)
//! - `TILE_STORE_LAYOUT` - `sharded` (default) or `xyz`
//! - `TILE_STORE_CONVENTION` - Row numbering for the xyz layout: `tms` (default) or `xyz`
//! - `TILE_STORE_BLOCK_SIZE` - Disk block size used to pad reported sizes (default: 4096)
//! - `TILE_STORE_LOCK_SHARDS` - Number of metadata lock shards (default: 32)
//! - `TILE_STORE_SUITABILITY` - Root check: `none`, `empty` or `existing` (default)
//!
//! [`FileBlobStore::open`]: crate::store::FileBlobStore::open

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::path::Convention;
use crate::store::{
    DEFAULT_LOCK_SHARDS, DEFAULT_METADATA_MAX_ATTEMPTS, DEFAULT_WAIT_AFTER_RENAME,
};
use crate::tile::RangeBounds;

// =============================================================================
// Default Values
// =============================================================================

/// Default disk block size used to pad reported tile sizes.
pub const DEFAULT_DISK_BLOCK_SIZE: u64 = 4096;

/// Default grid set for CLI tile arguments.
pub const DEFAULT_GRIDSET: &str = "EPSG:4326";

/// Default tile format for CLI tile arguments.
pub const DEFAULT_FORMAT: &str = "image/png";

// =============================================================================
// Store Configuration
// =============================================================================

/// Directory layout of tiles under the store root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Layout {
    /// `<gridset>_<zz>/<halfX>_<halfY>/<x>_<y>.<ext>`
    #[default]
    Sharded,
    /// `<gridset>/<z>/<x>/<y>.<ext>`
    Xyz {
        #[serde(default)]
        convention: Convention,
    },
}

/// How strictly the store root is checked before use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SuitabilityCheck {
    /// Accept any root
    None,
    /// The root must be missing or empty
    Empty,
    /// The root must be missing, empty, or already hold a file blob store
    #[default]
    Existing,
}

impl SuitabilityCheck {
    pub fn name(&self) -> &'static str {
        match self {
            SuitabilityCheck::None => "none",
            SuitabilityCheck::Empty => "empty",
            SuitabilityCheck::Existing => "existing",
        }
    }
}

/// Settings of a [`FileBlobStore`](crate::store::FileBlobStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store root directory
    pub root: PathBuf,

    #[serde(default)]
    pub layout: Layout,

    /// Block size tile sizes are rounded up to in listener events
    #[serde(default = "default_disk_block_size")]
    pub disk_block_size: u64,

    /// Number of read/write locks guarding metadata files
    #[serde(default = "default_lock_shards")]
    pub lock_shards: usize,

    /// Attempts of an optimistic metadata read or write
    #[serde(default = "default_metadata_max_attempts")]
    pub metadata_max_attempts: u32,

    /// Pause between a metadata rename and its verification, in milliseconds
    #[serde(default = "default_wait_after_rename_ms")]
    pub wait_after_rename_ms: u64,

    #[serde(default)]
    pub suitability: SuitabilityCheck,
}

fn default_disk_block_size() -> u64 {
    DEFAULT_DISK_BLOCK_SIZE
}

fn default_lock_shards() -> usize {
    DEFAULT_LOCK_SHARDS
}

fn default_metadata_max_attempts() -> u32 {
    DEFAULT_METADATA_MAX_ATTEMPTS
}

fn default_wait_after_rename_ms() -> u64 {
    DEFAULT_WAIT_AFTER_RENAME.as_millis() as u64
}

impl StoreConfig {
    /// Configuration with default settings for `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            layout: Layout::default(),
            disk_block_size: DEFAULT_DISK_BLOCK_SIZE,
            lock_shards: DEFAULT_LOCK_SHARDS,
            metadata_max_attempts: DEFAULT_METADATA_MAX_ATTEMPTS,
            wait_after_rename_ms: default_wait_after_rename_ms(),
            suitability: SuitabilityCheck::default(),
        }
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_disk_block_size(mut self, block_size: u64) -> Self {
        self.disk_block_size = block_size;
        self
    }

    pub fn with_lock_shards(mut self, lock_shards: usize) -> Self {
        self.lock_shards = lock_shards;
        self
    }

    pub fn with_metadata_max_attempts(mut self, attempts: u32) -> Self {
        self.metadata_max_attempts = attempts;
        self
    }

    pub fn with_wait_after_rename(mut self, wait: Duration) -> Self {
        self.wait_after_rename_ms = wait.as_millis() as u64;
        self
    }

    pub fn with_suitability(mut self, suitability: SuitabilityCheck) -> Self {
        self.suitability = suitability;
        self
    }

    pub fn wait_after_rename(&self) -> Duration {
        Duration::from_millis(self.wait_after_rename_ms)
    }

    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.root.as_os_str().is_empty() {
            return Err("Store root is required. Set --root or TILE_STORE_ROOT".to_string());
        }
        if self.disk_block_size == 0 {
            return Err("disk_block_size must be greater than 0".to_string());
        }
        if self.lock_shards == 0 {
            return Err("lock_shards must be greater than 0".to_string());
        }
        if self.metadata_max_attempts == 0 {
            return Err("metadata_max_attempts must be greater than 0".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// Tile store - a file system cache for map tiles.
///
/// Stores, reads and deletes tiles and per-layer metadata under a cache root
/// shared safely between threads and cooperating processes.
#[derive(Parser, Debug, Clone)]
#[command(name = "tile-store")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Store root directory.
    #[arg(long, env = "TILE_STORE_ROOT")]
    pub root: PathBuf,

    /// Directory layout of tiles under the root.
    #[arg(long, value_enum, default_value_t = LayoutArg::Sharded, env = "TILE_STORE_LAYOUT")]
    pub layout: LayoutArg,

    /// Row numbering of the xyz layout.
    #[arg(long, value_enum, default_value_t = ConventionArg::Tms, env = "TILE_STORE_CONVENTION")]
    pub convention: ConventionArg,

    /// Disk block size used to pad reported sizes.
    #[arg(long, default_value_t = DEFAULT_DISK_BLOCK_SIZE, env = "TILE_STORE_BLOCK_SIZE")]
    pub block_size: u64,

    /// Number of metadata lock shards.
    #[arg(long, default_value_t = DEFAULT_LOCK_SHARDS, env = "TILE_STORE_LOCK_SHARDS")]
    pub lock_shards: usize,

    /// Check applied to the root before use.
    #[arg(long, value_enum, default_value_t = SuitabilityCheck::Existing, env = "TILE_STORE_SUITABILITY")]
    pub suitability: SuitabilityCheck,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LayoutArg {
    Sharded,
    Xyz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConventionArg {
    Tms,
    Xyz,
}

impl Cli {
    /// Store configuration described by the global options.
    pub fn store_config(&self) -> StoreConfig {
        let layout = match self.layout {
            LayoutArg::Sharded => Layout::Sharded,
            LayoutArg::Xyz => Layout::Xyz {
                convention: match self.convention {
                    ConventionArg::Tms => Convention::Tms,
                    ConventionArg::Xyz => Convention::Xyz,
                },
            },
        };
        StoreConfig::new(&self.root)
            .with_layout(layout)
            .with_disk_block_size(self.block_size)
            .with_lock_shards(self.lock_shards)
            .with_suitability(self.suitability)
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Store a tile read from a file, or from stdin when no file is given.
    Put {
        #[command(flatten)]
        tile: TileArgs,

        /// File holding the tile payload.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Rendering parameter as `KEY=VALUE`; repeatable.
        #[arg(long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,
    },

    /// Read a tile into a file, or report whether it exists.
    Get {
        #[command(flatten)]
        tile: TileArgs,

        /// Write the payload here.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Delete one tile.
    Delete {
        #[command(flatten)]
        tile: TileArgs,
    },

    /// Delete every tile of a range.
    Truncate {
        #[arg(long)]
        layer: String,

        #[arg(long, default_value = DEFAULT_GRIDSET)]
        gridset: String,

        #[arg(long, default_value = DEFAULT_FORMAT)]
        format: String,

        /// First zoom level; -1 with --zoom-stop -1 selects all levels.
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        zoom_start: i32,

        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        zoom_stop: i32,

        /// Rectangle of one zoom level as `Z:MINX,MINY,MAXX,MAXY`; repeatable.
        #[arg(long = "bounds", value_parser = parse_zoom_bounds)]
        bounds: Vec<(i32, RangeBounds)>,

        #[arg(long)]
        params_id: Option<String>,
    },

    /// Delete a layer.
    DeleteLayer { layer: String },

    /// Delete the tiles of a layer in one grid set.
    DeleteGridset { layer: String, gridset: String },

    /// Delete the tiles of a layer with one parameters id.
    DeleteParams { layer: String, params_id: String },

    /// Rename a layer.
    Rename { old_name: String, new_name: String },

    /// Check whether a layer exists.
    Exists { layer: String },

    /// Report tile count and padded size of a layer.
    Size { layer: String },

    /// List parameter ids of a layer and their parameters.
    Params { layer: String },

    /// Read or write layer metadata.
    Metadata {
        #[command(subcommand)]
        command: MetadataCommand,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum MetadataCommand {
    /// Print one entry.
    Get { layer: String, key: String },

    /// Set an entry; omit the value to remove it.
    Put {
        layer: String,
        key: String,
        value: Option<String>,
    },

    /// Print every entry.
    List { layer: String },
}

/// Tile address options shared by tile commands.
#[derive(Args, Debug, Clone)]
pub struct TileArgs {
    #[arg(long)]
    pub layer: String,

    #[arg(long, default_value = DEFAULT_GRIDSET)]
    pub gridset: String,

    #[arg(short)]
    pub x: i64,

    #[arg(short)]
    pub y: i64,

    #[arg(short)]
    pub z: i32,

    #[arg(long, default_value = DEFAULT_FORMAT)]
    pub format: String,

    #[arg(long)]
    pub params_id: Option<String>,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

fn parse_zoom_bounds(s: &str) -> Result<(i32, RangeBounds), String> {
    let (zoom, rect) = s
        .split_once(':')
        .ok_or_else(|| format!("expected Z:MINX,MINY,MAXX,MAXY, got '{}'", s))?;
    let zoom: i32 = zoom
        .trim()
        .parse()
        .map_err(|_| format!("invalid zoom level in '{}'", s))?;
    let values = rect
        .split(',')
        .map(|v| v.trim().parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| format!("invalid coordinate in '{}'", s))?;
    match values.as_slice() {
        [min_x, min_y, max_x, max_y] if min_x <= max_x && min_y <= max_y => {
            Ok((zoom, RangeBounds::new(*min_x, *min_y, *max_x, *max_y)))
        }
        [_, _, _, _] => Err(format!("minimum exceeds maximum in '{}'", s)),
        _ => Err(format!("expected four coordinates in '{}'", s)),
    }
}

// =============================================================================
// Tests
// =============================================================================
