//! Settlement tiers used to rank places.

use serde::{Deserialize, Serialize};

/// Tier of a `place=*` node, most significant first.
/// See: https://wiki.openstreetmap.org/wiki/Key:place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PlaceTier {
    /// place=country (top-level unit, never a City)
    Country,
    /// place=state / province
    State,
    /// place=region
    Region,
    /// place=county / district
    County,
    /// place=municipality
    Municipality,
    /// place=city
    City,
    /// place=town
    Town,
    /// place=village
    Village,
    /// place=hamlet / isolated_dwelling
    Hamlet,
    /// place=suburb / borough
    Suburb,
    /// place=neighbourhood / quarter
    Neighbourhood,
}

impl PlaceTier {
    /// Map a `place` tag value to its tier
    pub fn from_place_value(value: &str) -> Option<Self> {
        match value {
            "country" => Some(PlaceTier::Country),
            "state" | "province" => Some(PlaceTier::State),
            "region" => Some(PlaceTier::Region),
            "county" | "district" => Some(PlaceTier::County),
            "municipality" => Some(PlaceTier::Municipality),
            "city" => Some(PlaceTier::City),
            "town" => Some(PlaceTier::Town),
            "village" => Some(PlaceTier::Village),
            "hamlet" | "isolated_dwelling" => Some(PlaceTier::Hamlet),
            "suburb" | "borough" => Some(PlaceTier::Suburb),
            "neighbourhood" | "neighborhood" | "quarter" => Some(PlaceTier::Neighbourhood),
            _ => None,
        }
    }

    /// Canonical `place` value for this tier
    pub fn place_value(&self) -> &'static str {
        match self {
            PlaceTier::Country => "country",
            PlaceTier::State => "state",
            PlaceTier::Region => "region",
            PlaceTier::County => "county",
            PlaceTier::Municipality => "municipality",
            PlaceTier::City => "city",
            PlaceTier::Town => "town",
            PlaceTier::Village => "village",
            PlaceTier::Hamlet => "hamlet",
            PlaceTier::Suburb => "suburb",
            PlaceTier::Neighbourhood => "neighbourhood",
        }
    }

    /// Rank number; lower is more significant
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    /// Get all tiers in hierarchical order (country first)
    pub fn all() -> &'static [PlaceTier] {
        &[
            PlaceTier::Country,
            PlaceTier::State,
            PlaceTier::Region,
            PlaceTier::County,
            PlaceTier::Municipality,
            PlaceTier::City,
            PlaceTier::Town,
            PlaceTier::Village,
            PlaceTier::Hamlet,
            PlaceTier::Suburb,
            PlaceTier::Neighbourhood,
        ]
    }
}

impl std::fmt::Display for PlaceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.place_value())
    }
}
