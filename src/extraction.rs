//! End-to-end extraction: ingest, build the region, index roads.
//!
//! Filters stash what they classify while the input streams past. Places
//! are registered before any building or amenity is assigned, so nothing
//! is dropped for arriving ahead of its city in the input.

use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::path::Path;

use geo::{Distance, Haversine};
use tracing::{debug, info};

use crate::config::{ExtractionConfig, InterestSet};
use crate::error::Result;
use crate::models::{
    Amenity, AmenityCategory, EntityId, EntityRegistry, LatLon, Node, Relation, Way,
};
use crate::osm::classify::{Classifier, PLACE};
use crate::osm::{IngestStats, OsmIngestor, SubsetWriter, WriteSummary};
use crate::region::{Diagnostic, DiagnosticKind, Region};
use crate::tiles::TileIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Xml,
    Pbf,
}

impl InputFormat {
    /// `.pbf` is PBF, anything else XML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("pbf") => InputFormat::Pbf,
            _ => InputFormat::Xml,
        }
    }
}

/// Ids stashed by the filters, in input order per kind
#[derive(Debug, Default)]
struct Stash {
    places: Vec<i64>,
    amenities: Vec<(i64, AmenityCategory)>,
    building_nodes: Vec<i64>,
    building_ways: Vec<i64>,
    building_relations: Vec<i64>,
    roads: Vec<i64>,
}

pub struct Extractor {
    config: ExtractionConfig,
    classifier: Classifier,
    progress: Option<Box<dyn FnMut(&IngestStats)>>,
}

impl Extractor {
    pub fn new(config: ExtractionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            classifier: Classifier::default(),
            progress: None,
        })
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Called every `progress_every` nodes during ingestion
    pub fn with_progress(mut self, callback: impl FnMut(&IngestStats) + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn run<R: Read>(self, input: R, format: InputFormat) -> Result<Extraction> {
        let Extractor {
            config,
            classifier,
            progress,
        } = self;
        let retain_all_nodes = config.retain_all_nodes;
        let retain_relations = config.retain_relations;
        let mut stash = Stash::default();

        let node_filter = |node: &Node| {
            let mut keep = retain_all_nodes;
            if let Some(category) = (classifier.amenity)(&node.tags) {
                stash.amenities.push((node.id, category));
                keep = true;
            }
            if node.tags.contains_key(PLACE) {
                stash.places.push(node.id);
                keep = true;
            }
            if (classifier.is_building)(&node.tags) {
                stash.building_nodes.push(node.id);
                keep = true;
            }
            keep
        };
        let way_filter = |way: &Way| {
            let mut keep = false;
            if (classifier.is_building)(&way.tags) {
                stash.building_ways.push(way.id);
                keep = true;
            }
            if (classifier.is_drivable_way)(&way.tags) {
                stash.roads.push(way.id);
                keep = true;
            }
            keep
        };
        let relation_filter = |relation: &Relation| {
            if (classifier.is_building)(&relation.tags) {
                stash.building_relations.push(relation.id);
                return true;
            }
            retain_relations
        };

        let mut ingestor = OsmIngestor::new(node_filter, way_filter, relation_filter);
        if let Some(callback) = progress {
            ingestor = ingestor.with_progress(config.progress_every, callback);
        }
        match format {
            InputFormat::Xml => ingestor.parse(input, config.input_compression)?,
            InputFormat::Pbf => ingestor.parse_pbf(input)?,
        }
        let stats = ingestor.stats();
        let registry = ingestor.into_registry();
        info!(
            "Ingested {} entities, kept {} ({} nodes, {} ways, {} relations)",
            stats.seen(),
            stats.kept(),
            registry.node_count(),
            registry.way_count(),
            registry.relation_count()
        );

        let region = build_region(&registry, &stash, &config, classifier)?;

        let mut road_tiles = TileIndex::new(config.tile_size)?;
        for way in stash.roads.iter().filter_map(|&id| registry.way(id)) {
            for location in registry.resolve(way) {
                road_tiles.register_object(location.lat, location.lon, location);
            }
        }
        info!(
            "Indexed {} road points in {} tiles",
            road_tiles.len(),
            road_tiles.bucket_count()
        );

        Ok(Extraction {
            registry,
            region,
            road_tiles,
            stats,
            stash,
        })
    }
}

fn build_region(
    registry: &EntityRegistry,
    stash: &Stash,
    config: &ExtractionConfig,
    classifier: Classifier,
) -> Result<Region> {
    let mut region = Region::with_tile_size(config.city_tile_size)?
        .with_place_classifier(classifier.place_tier);

    for node in stash.places.iter().filter_map(|&id| registry.node(id)) {
        region.register_city(node.clone());
    }
    info!(
        "Registered {} cities under {}",
        region.city_count(),
        region.name().unwrap_or("<no top-level unit>")
    );

    let buildings = stash
        .building_nodes
        .iter()
        .map(|&id| EntityId::node(id))
        .chain(stash.building_ways.iter().map(|&id| EntityId::way(id)))
        .chain(stash.building_relations.iter().map(|&id| EntityId::relation(id)));
    let mut assigned = 0;
    for id in buildings {
        let Some(entity) = registry.get(id).map(|e| e.to_entity()) else {
            continue;
        };
        match registry.location(&entity) {
            Some(location) => {
                if region.register_building(location, entity) {
                    assigned += 1;
                }
            }
            None => {
                debug!("No location for building {}", id);
                region.record(Diagnostic::new(DiagnosticKind::UnresolvedLocation, id));
            }
        }
    }
    info!("Assigned {} buildings", assigned);

    let mut assigned = 0;
    for (id, category) in &stash.amenities {
        if let Some(node) = registry.node(*id) {
            if region.register_amenity(Amenity::new(node.clone(), category.clone())) {
                assigned += 1;
            }
        }
    }
    info!("Assigned {} amenities", assigned);

    Ok(region)
}

/// Everything a run produced
pub struct Extraction {
    pub registry: EntityRegistry,
    pub region: Region,
    /// Resolved points of drivable ways
    pub road_tiles: TileIndex<LatLon>,
    pub stats: IngestStats,
    stash: Stash,
}

impl Extraction {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.region.diagnostics()
    }

    /// Ids selected by `interest`, before closure
    pub fn interesting_ids(&self, interest: InterestSet) -> BTreeSet<EntityId> {
        let mut ids = BTreeSet::new();
        if interest.amenities {
            ids.extend(self.stash.amenities.iter().map(|(id, _)| EntityId::node(*id)));
        }
        if interest.places {
            ids.extend(self.stash.places.iter().map(|&id| EntityId::node(id)));
        }
        if interest.buildings {
            ids.extend(self.stash.building_nodes.iter().map(|&id| EntityId::node(id)));
            ids.extend(self.stash.building_ways.iter().map(|&id| EntityId::way(id)));
            ids.extend(
                self.stash
                    .building_relations
                    .iter()
                    .map(|&id| EntityId::relation(id)),
            );
        }
        if interest.roads {
            ids.extend(self.stash.roads.iter().map(|&id| EntityId::way(id)));
        }
        ids
    }

    /// Write the subset selected by `config` to `out`.
    pub fn write_subset<W: Write>(
        &self,
        out: W,
        config: &ExtractionConfig,
    ) -> Result<WriteSummary> {
        SubsetWriter::new(&self.registry).write(
            out,
            self.interesting_ids(config.interest),
            config.output.closure,
        )
    }

    /// Closest road point within `depth` tile rings of `point`
    pub fn nearest_road_point(&self, point: LatLon, depth: u64) -> Option<LatLon> {
        self.road_tiles
            .closest_objects(point.lat, point.lon, depth)
            .into_iter()
            .copied()
            .min_by(|a, b| {
                let da = Haversine.distance(point.to_point(), a.to_point());
                let db = Haversine.distance(point.to_point(), b.to_point());
                da.total_cmp(&db)
            })
    }
}
