use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Result, SiftError};
use crate::osm::{ClosureMode, Compression};
use crate::region::DEFAULT_CITY_TILE_SIZE;
use crate::tiles::DEFAULT_TILE_SIZE;

/// Run settings. Every field has a default, so an empty file is valid.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Degrees per tile of the road index
    pub tile_size: f64,
    /// Degrees per tile of the city index
    pub city_tile_size: f64,
    /// Report progress every this many nodes; 0 disables it
    pub progress_every: u64,
    /// Keep every node, not only those something else needs
    pub retain_all_nodes: bool,
    pub retain_relations: bool,
    pub input_compression: Compression,
    pub output: OutputConfig,
    pub interest: InterestSet,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            city_tile_size: DEFAULT_CITY_TILE_SIZE,
            progress_every: 1_000_000,
            retain_all_nodes: true,
            retain_relations: false,
            input_compression: Compression::Auto,
            output: OutputConfig::default(),
            interest: InterestSet::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct OutputConfig {
    pub compression: Compression,
    pub closure: ClosureMode,
}

/// Which stashed entities seed the subset written out
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct InterestSet {
    pub amenities: bool,
    pub places: bool,
    pub buildings: bool,
    pub roads: bool,
}

impl Default for InterestSet {
    fn default() -> Self {
        Self {
            amenities: true,
            places: false,
            buildings: false,
            roads: false,
        }
    }
}

impl ExtractionConfig {
    /// Read and validate a TOML file. Unreadable files are `Io` errors,
    /// bad TOML or values are `Config` errors.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config: ExtractionConfig = toml::from_str(&content)
            .map_err(|e| SiftError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("tile_size", self.tile_size),
            ("city_tile_size", self.city_tile_size),
        ];
        for (name, size) in sizes {
            if !size.is_finite() || size <= 0.0 {
                return Err(SiftError::Config(format!(
                    "{} must be a positive number of degrees, got {}",
                    name, size
                )));
            }
        }
        Ok(())
    }
}
