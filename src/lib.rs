//! Sift - selective extraction from OpenStreetMap data
//!
//! Streams OSM XML (or PBF), keeps only what the classifiers care about,
//! assigns buildings and amenities to their closest city, indexes road
//! geometry in tiles and writes back a referentially closed subset.

pub mod config;
pub mod display;
pub mod error;
pub mod extraction;
pub mod models;
pub mod osm;
pub mod region;
pub mod tiles;

pub use error::{Result, SiftError};
pub use extraction::{Extraction, Extractor, InputFormat};
pub use models::{Entity, EntityId, EntityRegistry, LatLon, PlaceTier};
pub use region::{City, Region};
