//! Tag classification: which entities are buildings, amenities, places
//! and drivable roads.
//!
//! The rest of the crate only sees these through [`Classifier`], so the
//! vocabulary can be swapped without touching the pipeline.

use crate::models::{AmenityCategory, AmenityType, PlaceTier, Tags};

pub const PLACE: &str = "place";
pub const NAME: &str = "name";
pub const BUILDING: &str = "building";
pub const HIGHWAY: &str = "highway";
pub const AMENITY: &str = "amenity";
pub const ADDR_HOUSE_NUMBER: &str = "addr:housenumber";
pub const ADDR_STREET: &str = "addr:street";

/// The four classification functions, as plain function pointers.
#[derive(Clone, Copy)]
pub struct Classifier {
    pub is_building: fn(&Tags) -> bool,
    pub amenity: fn(&Tags) -> Option<AmenityCategory>,
    pub place_tier: fn(&str) -> Option<PlaceTier>,
    pub is_drivable_way: fn(&Tags) -> bool,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            is_building,
            amenity: amenity_category,
            place_tier: place_tier_of,
            is_drivable_way,
        }
    }
}

/// An addressed building: any `building` value except "no", plus
/// house number and street.
pub fn is_building(tags: &Tags) -> bool {
    match tags.get(BUILDING) {
        Some("no") | None => false,
        Some(_) => tags.contains_key(ADDR_HOUSE_NUMBER) && tags.contains_key(ADDR_STREET),
    }
}

/// Category of a point of interest, if it is one
pub fn amenity_category(tags: &Tags) -> Option<AmenityCategory> {
    if let Some(value) = tags.get(AMENITY) {
        return Some(AmenityCategory {
            kind: AmenityType::from_amenity_value(value),
            sub_type: value.to_string(),
        });
    }

    let grouped = [
        ("shop", AmenityType::Shop),
        ("tourism", AmenityType::Tourism),
        ("leisure", AmenityType::Leisure),
    ];
    for (key, kind) in grouped {
        if let Some(value) = tags.get(key) {
            return Some(AmenityCategory {
                kind,
                sub_type: value.to_string(),
            });
        }
    }

    None
}

pub fn place_tier_of(value: &str) -> Option<PlaceTier> {
    PlaceTier::from_place_value(value)
}

/// Roads a car may use
pub fn is_drivable_way(tags: &Tags) -> bool {
    matches!(
        tags.get(HIGHWAY),
        Some(
            "motorway"
                | "motorway_link"
                | "trunk"
                | "trunk_link"
                | "primary"
                | "primary_link"
                | "secondary"
                | "secondary_link"
                | "tertiary"
                | "tertiary_link"
                | "unclassified"
                | "residential"
                | "living_street"
                | "service"
                | "road"
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_building_needs_address() {
        let mut tags = Tags::new();
        tags.insert("building", "yes");
        assert!(!is_building(&tags));

        tags.insert("addr:housenumber", "12");
        tags.insert("addr:street", "Main Street");
        assert!(is_building(&tags));

        tags.insert("building", "no");
        assert!(!is_building(&tags));
    }

    #[test]
    fn test_amenity_category() {
        let mut tags = Tags::new();
        tags.insert("amenity", "restaurant");
        let category = amenity_category(&tags).unwrap();
        assert_eq!(category.kind, AmenityType::Sustenance);
        assert_eq!(category.sub_type, "restaurant");

        let mut shop = Tags::new();
        shop.insert("shop", "bakery");
        assert_eq!(amenity_category(&shop).unwrap().kind, AmenityType::Shop);

        let mut plain = Tags::new();
        plain.insert("name", "Nothing");
        assert!(amenity_category(&plain).is_none());
    }

    #[test]
    fn test_drivable_way() {
        let mut tags = Tags::new();
        tags.insert("highway", "residential");
        assert!(is_drivable_way(&tags));

        tags.insert("highway", "footway");
        assert!(!is_drivable_way(&tags));
    }
}
