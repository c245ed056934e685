//! Core data models for the extractor.

pub mod admin;
pub mod amenity;
pub mod entity;

pub use admin::PlaceTier;
pub use amenity::{Amenity, AmenityCategory, AmenityType};
pub use entity::{
    BoundingBox, Entity, EntityId, EntityKind, EntityRef, EntityRegistry, LatLon, Member, Node,
    Relation, Tags, Way,
};
