//! Region: the top-level unit plus every city registered under it.

use geo::{Distance, Haversine};
use hashbrown::HashMap;
use tracing::debug;

use super::city::City;
use super::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::Result;
use crate::models::{Amenity, BoundingBox, Entity, LatLon, Node, PlaceTier};
use crate::osm::classify::{self, NAME, PLACE};
use crate::tiles::{TileIndex, TileKey};

/// Tile size of the city index. Cities are sparse, so tiles are coarser
/// than for road geometry.
pub const DEFAULT_CITY_TILE_SIZE: f64 = 0.25;

/// Distances closer than this are ties
const DISTANCE_TOLERANCE_M: f64 = 1e-6;

/// Mean earth radius, same as the haversine metric
const EARTH_RADIUS_M: f64 = 6_371_008.8;

pub struct Region {
    top_level: Option<Node>,
    cities: Vec<City>,
    by_node: HashMap<i64, usize>,
    city_tiles: TileIndex<usize>,
    place_tier: fn(&str) -> Option<PlaceTier>,
    diagnostics: Vec<Diagnostic>,
}

impl Default for Region {
    fn default() -> Self {
        Self {
            top_level: None,
            cities: Vec::new(),
            by_node: HashMap::new(),
            city_tiles: TileIndex::with_known_size(DEFAULT_CITY_TILE_SIZE),
            place_tier: classify::place_tier_of,
            diagnostics: Vec::new(),
        }
    }
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    /// Region whose city index uses `tile_size` degrees per tile
    pub fn with_tile_size(tile_size: f64) -> Result<Self> {
        Ok(Self {
            city_tiles: TileIndex::new(tile_size)?,
            ..Self::default()
        })
    }

    /// Replace the `place` value classifier
    pub fn with_place_classifier(mut self, place_tier: fn(&str) -> Option<PlaceTier>) -> Self {
        self.place_tier = place_tier;
        self
    }

    /// Set the top-level unit (country). The last call wins.
    pub fn set_top_level(&mut self, node: Node) {
        if let Some(previous) = &self.top_level {
            debug!("Top-level unit {} replaced by {}", previous.id, node.id);
        }
        self.top_level = Some(node);
    }

    pub fn top_level(&self) -> Option<&Node> {
        self.top_level.as_ref()
    }

    /// Name of the top-level unit
    pub fn name(&self) -> Option<&str> {
        self.top_level.as_ref().and_then(|n| n.tags.get(NAME))
    }

    /// Register a place node as a city.
    ///
    /// Returns `None` for an unrecognized `place` value (recorded as a
    /// diagnostic) and for countries, which become the top-level unit
    /// instead. A node registered twice yields the existing city.
    pub fn register_city(&mut self, node: Node) -> Option<&City> {
        let value = node.tags.get(PLACE).unwrap_or("");
        let Some(tier) = (self.place_tier)(value) else {
            debug!("Unrecognized place '{}' on node {}", value, node.id);
            let kind = DiagnosticKind::UnrecognizedPlaceTier(value.to_string());
            self.diagnostics.push(Diagnostic::new(kind, node.entity_id()));
            return None;
        };

        if tier == PlaceTier::Country {
            self.set_top_level(node);
            return None;
        }

        if let Some(&idx) = self.by_node.get(&node.id) {
            return Some(&self.cities[idx]);
        }

        let idx = self.cities.len();
        let location = node.location;
        self.by_node.insert(node.id, idx);
        self.city_tiles.register_object(location.lat, location.lon, idx);
        self.cities.push(City::new(node, tier));
        Some(&self.cities[idx])
    }

    /// The city nearest to `point` by great-circle distance. Equal
    /// distances go to the more significant tier, then to the city
    /// registered first.
    ///
    /// Searches rings of tiles outward from the point's tile and stops once
    /// no unsearched tile can hold anything closer than the best match.
    /// Once the searched square would hold more tiles than there are
    /// cities, scans the cities instead, so a query never costs more than
    /// O(N) however far the nearest city is.
    pub fn closest_city(&self, point: LatLon) -> Option<&City> {
        self.closest_city_index(point).map(|idx| &self.cities[idx])
    }

    /// Same answer as [`Region::closest_city`] by scanning every city, O(N).
    pub fn closest_city_linear(&self, point: LatLon) -> Option<&City> {
        self.scan_index(point).map(|idx| &self.cities[idx])
    }

    fn scan_index(&self, point: LatLon) -> Option<usize> {
        let mut best = None;
        for idx in 0..self.cities.len() {
            best = self.better(best, idx, point);
        }
        best.map(|(idx, _)| idx)
    }

    fn closest_city_index(&self, point: LatLon) -> Option<usize> {
        let center = self.city_tiles.tile_key(point.lat, point.lon);
        let mut best: Option<(usize, f64)> = None;
        let mut k = 0;

        loop {
            for (_, bucket) in self.city_tiles.ring(center, k) {
                for &idx in bucket {
                    best = self.better(best, idx, point);
                }
            }
            if self.city_tiles.covers_all(center, k) {
                break;
            }
            if let Some((_, distance)) = best {
                match self.unsearched_lower_bound(point, center, k) {
                    Some(bound) if bound <= distance + DISTANCE_TOLERANCE_M => {}
                    _ => break,
                }
            }
            k += 1;
            let side = 2 * u128::from(k) + 1;
            if side * side > self.cities.len() as u128 {
                return self.scan_index(point);
            }
        }

        best.map(|(idx, _)| idx)
    }

    fn better(
        &self,
        best: Option<(usize, f64)>,
        idx: usize,
        point: LatLon,
    ) -> Option<(usize, f64)> {
        let distance = Haversine.distance(point.to_point(), self.cities[idx].location().to_point());
        match best {
            None => Some((idx, distance)),
            Some((best_idx, best_distance)) => {
                if distance < best_distance - DISTANCE_TOLERANCE_M {
                    return Some((idx, distance));
                }
                if distance > best_distance + DISTANCE_TOLERANCE_M {
                    return best;
                }
                let candidate = (self.cities[idx].tier(), idx);
                let current = (self.cities[best_idx].tier(), best_idx);
                if candidate < current {
                    Some((idx, distance))
                } else {
                    best
                }
            }
        }
    }

    /// Smallest possible distance from `point` to anything outside the
    /// tiles within `k` rings of `center`. `None` means nothing is outside.
    fn unsearched_lower_bound(&self, point: LatLon, center: TileKey, k: u64) -> Option<f64> {
        let t = self.city_tiles.tile_size();
        let k = k as f64;
        let south = (center.lat as f64 - k) * t;
        let north = (center.lat as f64 + k + 1.0) * t;
        let west = ((center.lon as f64 - k) * t).max(-180.0);
        let east = ((center.lon as f64 + k + 1.0) * t).min(180.0);

        let mut bound: Option<f64> = None;
        let mut consider = |d: f64| bound = Some(bound.map_or(d, |b: f64| b.min(d)));

        // Anything beyond a parallel is at least the latitude difference away.
        if south > -90.0 {
            consider((point.lat - south).to_radians() * EARTH_RADIUS_M);
        }
        if north < 90.0 {
            consider((north - point.lat).to_radians() * EARTH_RADIUS_M);
        }
        // Beyond a meridian: at least the distance to its great circle.
        if !(west <= -180.0 && east >= 180.0) {
            let cos_lat = point.lat.to_radians().cos();
            for edge in [west, east] {
                let s = (cos_lat * (point.lon - edge).to_radians().sin().abs()).min(1.0);
                consider(s.asin() * EARTH_RADIUS_M);
            }
        }

        bound
    }

    /// Cities whose location falls inside `bbox`
    pub fn cities_in(&self, bbox: &BoundingBox) -> Vec<&City> {
        let mut found: Vec<usize> = self
            .city_tiles
            .query(bbox)
            .into_iter()
            .flat_map(|(_, bucket)| bucket.iter().copied())
            .filter(|&idx| bbox.contains(self.cities[idx].location()))
            .collect();
        found.sort_unstable();
        found.into_iter().map(|idx| &self.cities[idx]).collect()
    }

    /// Attach a building to its closest city. With no city yet the
    /// building is dropped, a diagnostic is recorded and `false` returned.
    pub fn register_building(&mut self, location: LatLon, entity: Entity) -> bool {
        match self.closest_city_index(location) {
            Some(idx) => {
                self.cities[idx].register_building(location, entity);
                true
            }
            None => {
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::UnassignedBuilding,
                    entity.entity_id(),
                ));
                false
            }
        }
    }

    /// Attach an amenity to its closest city; same rules as buildings.
    pub fn register_amenity(&mut self, amenity: Amenity) -> bool {
        match self.closest_city_index(amenity.location()) {
            Some(idx) => {
                self.cities[idx].register_amenity(amenity);
                true
            }
            None => {
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::UnassignedAmenity,
                    amenity.node.entity_id(),
                ));
                false
            }
        }
    }

    pub fn record(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Cities in registration order
    pub fn cities(&self) -> &[City] {
        &self.cities
    }

    pub fn cities_of_tier(&self, tier: PlaceTier) -> impl Iterator<Item = &City> {
        self.cities.iter().filter(move |c| c.tier() == tier)
    }

    pub fn city(&self, node_id: i64) -> Option<&City> {
        self.by_node.get(&node_id).map(|&idx| &self.cities[idx])
    }

    pub fn city_count(&self) -> usize {
        self.cities.len()
    }
}
