//! Settlements and what gets attached to them.

use serde::Serialize;

use crate::models::{Amenity, Entity, LatLon, Node, PlaceTier};
use crate::osm::classify::NAME;

/// A building assigned to a city
#[derive(Debug, Clone, PartialEq)]
pub struct Building {
    pub location: LatLon,
    pub entity: Entity,
}

impl Building {
    pub fn house_number(&self) -> Option<&str> {
        self.entity.tag("addr:housenumber")
    }

    pub fn street(&self) -> Option<&str> {
        self.entity.tag("addr:street")
    }
}

#[derive(Debug, Clone)]
pub struct City {
    node: Node,
    tier: PlaceTier,
    buildings: Vec<Building>,
    amenities: Vec<Amenity>,
}

impl City {
    pub fn new(node: Node, tier: PlaceTier) -> Self {
        Self {
            node,
            tier,
            buildings: Vec::new(),
            amenities: Vec::new(),
        }
    }

    pub fn id(&self) -> i64 {
        self.node.id
    }

    /// `name` tag, or empty if the place is unnamed
    pub fn name(&self) -> &str {
        self.node.tags.get(NAME).unwrap_or("")
    }

    pub fn tier(&self) -> PlaceTier {
        self.tier
    }

    pub fn location(&self) -> LatLon {
        self.node.location
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Duplicates are kept: registering the same building twice lists it twice.
    pub fn register_building(&mut self, location: LatLon, entity: Entity) {
        self.buildings.push(Building { location, entity });
    }

    pub fn register_amenity(&mut self, amenity: Amenity) {
        self.amenities.push(amenity);
    }

    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    pub fn amenities(&self) -> &[Amenity] {
        &self.amenities
    }
}

/// Serializable view of a city for reports
#[derive(Debug, Clone, Serialize)]
pub struct CitySummary {
    pub id: i64,
    pub name: String,
    pub tier: PlaceTier,
    pub location: LatLon,
    pub buildings: usize,
    pub amenities: usize,
}

impl From<&City> for CitySummary {
    fn from(city: &City) -> Self {
        Self {
            id: city.id(),
            name: city.name().to_string(),
            tier: city.tier(),
            location: city.location(),
            buildings: city.buildings().len(),
            amenities: city.amenities().len(),
        }
    }
}
