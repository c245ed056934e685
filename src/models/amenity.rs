//! Points of interest and their categories.

use serde::{Deserialize, Serialize};

use super::entity::{LatLon, Node};

/// Broad amenity group, derived from the amenity/shop/tourism/leisure tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmenityType {
    Sustenance,
    Education,
    Transportation,
    Finance,
    Healthcare,
    Entertainment,
    Shop,
    Tourism,
    Leisure,
    Other,
}

impl AmenityType {
    /// Group for an `amenity=*` value
    pub fn from_amenity_value(value: &str) -> Self {
        match value {
            "restaurant" | "cafe" | "fast_food" | "bar" | "pub" | "biergarten" | "food_court"
            | "ice_cream" => AmenityType::Sustenance,
            "school" | "university" | "college" | "kindergarten" | "library" => {
                AmenityType::Education
            }
            "bus_station" | "fuel" | "parking" | "taxi" | "ferry_terminal" | "bicycle_rental"
            | "car_rental" => AmenityType::Transportation,
            "bank" | "atm" | "bureau_de_change" => AmenityType::Finance,
            "hospital" | "clinic" | "doctors" | "dentist" | "pharmacy" => AmenityType::Healthcare,
            "cinema" | "theatre" | "nightclub" | "arts_centre" | "casino" => {
                AmenityType::Entertainment
            }
            _ => AmenityType::Other,
        }
    }
}

/// Category of an amenity: group plus the raw tag value (e.g. "restaurant")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmenityCategory {
    pub kind: AmenityType,
    pub sub_type: String,
}

/// A classified point of interest
#[derive(Debug, Clone, PartialEq)]
pub struct Amenity {
    pub node: Node,
    pub category: AmenityCategory,
}

impl Amenity {
    pub fn new(node: Node, category: AmenityCategory) -> Self {
        Self { node, category }
    }

    pub fn location(&self) -> LatLon {
        self.node.location
    }

    pub fn name(&self) -> Option<&str> {
        self.node.tags.get("name")
    }
}
