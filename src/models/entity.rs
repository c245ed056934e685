//! OSM entities (nodes, ways, relations) and the registry of retained ones.

use std::collections::BTreeMap;

use geo::{Centroid, MultiPoint, Point};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Type of OSM object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Node,
    Way,
    Relation,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Node => "node",
            EntityKind::Way => "way",
            EntityKind::Relation => "relation",
        }
    }

    /// Parse the `type` attribute of a relation member.
    pub fn from_member_type(value: &str) -> Option<Self> {
        match value {
            "node" => Some(EntityKind::Node),
            "way" => Some(EntityKind::Way),
            "relation" => Some(EntityKind::Relation),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of an entity, unique within its kind.
///
/// Orders nodes before ways before relations, then by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    pub kind: EntityKind,
    pub id: i64,
}

impl EntityId {
    pub fn node(id: i64) -> Self {
        Self {
            kind: EntityKind::Node,
            id,
        }
    }

    pub fn way(id: i64) -> Self {
        Self {
            kind: EntityKind::Way,
            id,
        }
    }

    pub fn relation(id: i64) -> Self {
        Self {
            kind: EntityKind::Relation,
            id,
        }
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Geographic point (lat/lon) in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// geo uses x = lon, y = lat
    pub fn to_point(self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }
}

impl From<Point<f64>> for LatLon {
    fn from(p: Point<f64>) -> Self {
        Self { lat: p.y(), lon: p.x() }
    }
}

/// Bounding box in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// Square box of `half_size` degrees around a point.
    pub fn around(center: LatLon, half_size: f64) -> Self {
        Self::new(
            center.lat - half_size,
            center.lon - half_size,
            center.lat + half_size,
            center.lon + half_size,
        )
    }

    pub fn contains(&self, p: LatLon) -> bool {
        p.lat >= self.min_lat
            && p.lat <= self.max_lat
            && p.lon >= self.min_lon
            && p.lon <= self.max_lon
    }
}

/// Tag map of an entity. Keys are unique; stored sorted so output is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tag; a repeated key overwrites the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// True when `key` is present with exactly `value`.
    pub fn contains(&self, key: &str, value: &str) -> bool {
        self.get(key) == Some(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: i64,
    pub location: LatLon,
    pub tags: Tags,
}

impl Node {
    pub fn new(id: i64, lat: f64, lon: f64) -> Self {
        Self {
            id,
            location: LatLon::new(lat, lon),
            tags: Tags::new(),
        }
    }

    pub fn entity_id(&self) -> EntityId {
        EntityId::node(self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Way {
    pub id: i64,
    /// Node ids in order. Any of them may be missing from the registry.
    pub node_refs: Vec<i64>,
    pub tags: Tags,
}

impl Way {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            node_refs: Vec::new(),
            tags: Tags::new(),
        }
    }

    pub fn entity_id(&self) -> EntityId {
        EntityId::way(self.id)
    }
}

/// Relation member: reference (kind + id) and role label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub member: EntityId,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub id: i64,
    pub members: Vec<Member>,
    pub tags: Tags,
}

impl Relation {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            members: Vec::new(),
            tags: Tags::new(),
        }
    }

    pub fn entity_id(&self) -> EntityId {
        EntityId::relation(self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Node(Node),
    Way(Way),
    Relation(Relation),
}

impl Entity {
    pub fn entity_id(&self) -> EntityId {
        match self {
            Entity::Node(n) => n.entity_id(),
            Entity::Way(w) => w.entity_id(),
            Entity::Relation(r) => r.entity_id(),
        }
    }

    pub fn tags(&self) -> &Tags {
        match self {
            Entity::Node(n) => &n.tags,
            Entity::Way(w) => &w.tags,
            Entity::Relation(r) => &r.tags,
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags().get(key)
    }
}

/// Borrowed view of a registered entity.
#[derive(Debug, Clone, Copy)]
pub enum EntityRef<'a> {
    Node(&'a Node),
    Way(&'a Way),
    Relation(&'a Relation),
}

impl EntityRef<'_> {
    pub fn to_entity(&self) -> Entity {
        match *self {
            EntityRef::Node(n) => Entity::Node(n.clone()),
            EntityRef::Way(w) => Entity::Way(w.clone()),
            EntityRef::Relation(r) => Entity::Relation(r.clone()),
        }
    }
}

/// Entities accepted by the ingestor, keyed by id within each kind.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    nodes: HashMap<i64, Node>,
    ways: HashMap<i64, Way>,
    relations: HashMap<i64, Relation>,
    /// `<bounds>` of the source dataset, if it declared one
    pub bounds: Option<BoundingBox>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity; an entity with the same id replaces the old one.
    pub fn insert(&mut self, entity: Entity) {
        match entity {
            Entity::Node(n) => {
                self.nodes.insert(n.id, n);
            }
            Entity::Way(w) => {
                self.ways.insert(w.id, w);
            }
            Entity::Relation(r) => {
                self.relations.insert(r.id, r);
            }
        }
    }

    pub fn get(&self, id: EntityId) -> Option<EntityRef<'_>> {
        match id.kind {
            EntityKind::Node => self.nodes.get(&id.id).map(EntityRef::Node),
            EntityKind::Way => self.ways.get(&id.id).map(EntityRef::Way),
            EntityKind::Relation => self.relations.get(&id.id).map(EntityRef::Relation),
        }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        match id.kind {
            EntityKind::Node => self.nodes.contains_key(&id.id),
            EntityKind::Way => self.ways.contains_key(&id.id),
            EntityKind::Relation => self.relations.contains_key(&id.id),
        }
    }

    pub fn node(&self, id: i64) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn way(&self, id: i64) -> Option<&Way> {
        self.ways.get(&id)
    }

    pub fn relation(&self, id: i64) -> Option<&Relation> {
        self.relations.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn ways(&self) -> impl Iterator<Item = &Way> {
        self.ways.values()
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn way_count(&self) -> usize {
        self.ways.len()
    }

    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    pub fn len(&self) -> usize {
        self.nodes.len() + self.ways.len() + self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Coordinates of the way's nodes in order, skipping nodes that were
    /// never retained. An empty result is valid.
    pub fn resolve(&self, way: &Way) -> Vec<LatLon> {
        way.node_refs
            .iter()
            .filter_map(|id| self.nodes.get(id).map(|n| n.location))
            .collect()
    }

    /// Representative location: the node itself, or the centroid of what
    /// resolves. Relations only look at direct node and way members.
    pub fn location(&self, entity: &Entity) -> Option<LatLon> {
        match entity {
            Entity::Node(n) => Some(n.location),
            Entity::Way(w) => centroid(&self.resolve(w)),
            Entity::Relation(r) => {
                let points: Vec<LatLon> = r
                    .members
                    .iter()
                    .filter_map(|m| match m.member.kind {
                        EntityKind::Node => self.nodes.get(&m.member.id).map(|n| n.location),
                        EntityKind::Way => self
                            .ways
                            .get(&m.member.id)
                            .and_then(|w| centroid(&self.resolve(w))),
                        EntityKind::Relation => None,
                    })
                    .collect();
                centroid(&points)
            }
        }
    }
}

fn centroid(points: &[LatLon]) -> Option<LatLon> {
    if points.is_empty() {
        return None;
    }
    let multi: MultiPoint<f64> = points.iter().map(|p| p.to_point()).collect();
    multi.centroid().map(LatLon::from)
}
