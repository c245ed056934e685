//! Hand-off of a finished region to whatever presents it.

use std::io::{self, Write};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::models::PlaceTier;
use crate::region::{CitySummary, Region};

pub trait RegionDisplay {
    fn display(&mut self, region: &Region) -> Result<()>;
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionSummary {
    pub name: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub buildings: usize,
    pub amenities: usize,
    pub diagnostics: usize,
    pub cities: Vec<CitySummary>,
}

impl RegionSummary {
    /// Cities ordered by tier, then by name
    pub fn from_region(region: &Region) -> Self {
        let mut cities: Vec<CitySummary> = region.cities().iter().map(CitySummary::from).collect();
        cities.sort_by(|a, b| a.tier.cmp(&b.tier).then_with(|| a.name.cmp(&b.name)));

        Self {
            name: region.name().map(str::to_string),
            generated_at: Utc::now(),
            buildings: cities.iter().map(|c| c.buildings).sum(),
            amenities: cities.iter().map(|c| c.amenities).sum(),
            diagnostics: region.diagnostics().len(),
            cities,
        }
    }

    pub fn count_of_tier(&self, tier: PlaceTier) -> usize {
        self.cities.iter().filter(|c| c.tier == tier).count()
    }
}

/// Writes a [`RegionSummary`] as JSON
pub struct JsonSummary<W: Write> {
    out: W,
    pretty: bool,
}

impl<W: Write> JsonSummary<W> {
    pub fn new(out: W) -> Self {
        Self { out, pretty: false }
    }

    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> RegionDisplay for JsonSummary<W> {
    fn display(&mut self, region: &Region) -> Result<()> {
        let summary = RegionSummary::from_region(region);
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.out, &summary).map_err(io::Error::from)?;
        } else {
            serde_json::to_writer(&mut self.out, &summary).map_err(io::Error::from)?;
        }
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Logs one line per tier and the totals
pub struct LogSummary;

impl RegionDisplay for LogSummary {
    fn display(&mut self, region: &Region) -> Result<()> {
        let summary = RegionSummary::from_region(region);
        info!(
            "Region {}: {} cities, {} buildings, {} amenities",
            summary.name.as_deref().unwrap_or("<unnamed>"),
            summary.cities.len(),
            summary.buildings,
            summary.amenities
        );
        for tier in PlaceTier::all() {
            let count = summary.count_of_tier(*tier);
            if count > 0 {
                info!("  {}: {}", tier, count);
            }
        }
        if summary.diagnostics > 0 {
            info!("  {} diagnostics", summary.diagnostics);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entity, LatLon, Node};

    fn place(id: i64, lat: f64, lon: f64, place: &str, name: &str) -> Node {
        let mut node = Node::new(id, lat, lon);
        node.tags.insert("place", place);
        node.tags.insert("name", name);
        node
    }

    fn region() -> Region {
        let mut region = Region::new();
        region.register_city(place(1, 39.8, -98.6, "country", "United States"));
        region.register_city(place(2, 40.0, -90.0, "village", "Springfield"));
        region.register_city(place(3, 39.0, -89.0, "city", "Capital City"));
        region.register_building(
            LatLon::new(40.01, -90.01),
            Entity::Node(Node::new(9, 40.01, -90.01)),
        );
        region
    }

    #[test]
    fn test_summary_orders_by_tier() {
        let summary = RegionSummary::from_region(&region());
        assert_eq!(summary.name.as_deref(), Some("United States"));
        let names: Vec<&str> = summary.cities.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Capital City", "Springfield"]);
        assert_eq!(summary.buildings, 1);
        assert_eq!(summary.count_of_tier(PlaceTier::Village), 1);
    }

    #[test]
    fn test_json_summary() {
        let mut display = JsonSummary::new(Vec::new());
        display.display(&region()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&display.into_inner()).unwrap();

        assert_eq!(value["name"], "United States");
        assert_eq!(value["cities"].as_array().unwrap().len(), 2);
        assert_eq!(value["cities"][1]["name"], "Springfield");
        assert_eq!(value["cities"][1]["buildings"], 1);
        assert!(value["generated_at"].is_string());
    }
}
