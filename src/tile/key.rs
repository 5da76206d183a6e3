//! Tile identity and tile payloads.

use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;

use super::params::ParameterSet;

// =============================================================================
// Tile Key
// =============================================================================

/// Identifies at most one stored tile blob.
///
/// A key is immutable once built; the builder-style methods consume `self`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileKey {
    layer_name: Arc<str>,
    gridset_id: Arc<str>,
    x: i64,
    y: i64,
    z: i32,
    format: Arc<str>,
    parameters_id: Option<Arc<str>>,
}

impl TileKey {
    /// Create a key for the default parameterization of a layer.
    ///
    /// # Arguments
    ///
    /// * `layer_name` - Name of the tile layer
    /// * `gridset_id` - Grid set the tile belongs to (e.g. `EPSG:4326`)
    /// * `xyz` - Tile column, row and zoom level
    /// * `format` - Mime format of the tile (e.g. `image/png`)
    pub fn new(
        layer_name: impl Into<Arc<str>>,
        gridset_id: impl Into<Arc<str>>,
        xyz: (i64, i64, i32),
        format: impl Into<Arc<str>>,
    ) -> Self {
        let (x, y, z) = xyz;
        Self {
            layer_name: layer_name.into(),
            gridset_id: gridset_id.into(),
            x,
            y,
            z,
            format: format.into(),
            parameters_id: None,
        }
    }

    /// Set the parameters id partitioning this tile from the default cache.
    pub fn with_parameters_id(mut self, parameters_id: impl Into<Arc<str>>) -> Self {
        self.parameters_id = Some(parameters_id.into());
        self
    }

    pub fn layer_name(&self) -> &str {
        &self.layer_name
    }

    pub fn gridset_id(&self) -> &str {
        &self.gridset_id
    }

    pub fn x(&self) -> i64 {
        self.x
    }

    pub fn y(&self) -> i64 {
        self.y
    }

    pub fn z(&self) -> i32 {
        self.z
    }

    /// Column, row and zoom level.
    pub fn xyz(&self) -> (i64, i64, i32) {
        (self.x, self.y, self.z)
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn parameters_id(&self) -> Option<&str> {
        self.parameters_id.as_deref()
    }
}

// =============================================================================
// Tile Blob
// =============================================================================

/// A tile payload together with the key it is stored under.
#[derive(Debug, Clone)]
pub struct TileBlob {
    key: TileKey,
    data: Bytes,
    created: Option<SystemTime>,
    parameters: Option<ParameterSet>,
}

impl TileBlob {
    pub fn new(key: TileKey, data: impl Into<Bytes>) -> Self {
        Self {
            key,
            data: data.into(),
            created: None,
            parameters: None,
        }
    }

    /// Set the creation timestamp, stored as the file modification time.
    pub fn with_created(mut self, created: SystemTime) -> Self {
        self.created = Some(created);
        self
    }

    /// Attach the rendering parameters the tile was produced with.
    ///
    /// When the key has no parameters id, the store derives one from these.
    pub fn with_parameters(mut self, parameters: ParameterSet) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn key(&self) -> &TileKey {
        &self.key
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Payload size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn created(&self) -> Option<SystemTime> {
        self.created
    }

    pub fn parameters(&self) -> Option<&ParameterSet> {
        self.parameters.as_ref()
    }

    pub(crate) fn with_key(mut self, key: TileKey) -> Self {
        self.key = key;
        self
    }

    pub fn into_data(self) -> Bytes {
        self.data
    }
}
