//! Streaming OSM ingestor.
//!
//! Decodes OSM XML (or PBF) one entity at a time. Each complete entity is
//! handed to the caller's filter for its kind; only accepted entities are
//! kept in the [`EntityRegistry`]. Nothing else is buffered, so peak
//! memory follows what the filters retain, not the input size.

use std::io::{BufRead, Read};
use std::str::FromStr;

use osmpbfreader::{OsmId, OsmObj, OsmPbfReader};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, info};

use super::compression::{open_reader, Compression};
use crate::error::{Result, SiftError};
use crate::models::{
    BoundingBox, Entity, EntityId, EntityKind, EntityRegistry, LatLon, Member, Node, Relation,
    Tags, Way,
};

/// Per-kind counters. "Seen" counts every decoded entity, "kept" only
/// those the filter accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub nodes_seen: u64,
    pub nodes_kept: u64,
    pub ways_seen: u64,
    pub ways_kept: u64,
    pub relations_seen: u64,
    pub relations_kept: u64,
}

impl IngestStats {
    pub fn seen(&self) -> u64 {
        self.nodes_seen + self.ways_seen + self.relations_seen
    }

    pub fn kept(&self) -> u64 {
        self.nodes_kept + self.ways_kept + self.relations_kept
    }
}

/// Filter that keeps everything
pub fn accept_all<T>(_: &T) -> bool {
    true
}

/// Filter that keeps nothing
pub fn reject_all<T>(_: &T) -> bool {
    false
}

type ProgressFn = Box<dyn FnMut(&IngestStats)>;

/// Entity being assembled between its start and end element
enum Pending {
    Node(Node),
    Way(Way),
    Relation(Relation),
}

impl Pending {
    fn element(&self) -> &'static str {
        match self {
            Pending::Node(_) => "node",
            Pending::Way(_) => "way",
            Pending::Relation(_) => "relation",
        }
    }

    fn tags_mut(&mut self) -> &mut Tags {
        match self {
            Pending::Node(n) => &mut n.tags,
            Pending::Way(w) => &mut w.tags,
            Pending::Relation(r) => &mut r.tags,
        }
    }
}

pub struct OsmIngestor<N, W, R> {
    node_filter: N,
    way_filter: W,
    relation_filter: R,
    registry: EntityRegistry,
    stats: IngestStats,
    progress: Option<(u64, ProgressFn)>,
}

impl<N, W, R> OsmIngestor<N, W, R>
where
    N: FnMut(&Node) -> bool,
    W: FnMut(&Way) -> bool,
    R: FnMut(&Relation) -> bool,
{
    pub fn new(node_filter: N, way_filter: W, relation_filter: R) -> Self {
        Self {
            node_filter,
            way_filter,
            relation_filter,
            registry: EntityRegistry::new(),
            stats: IngestStats::default(),
            progress: None,
        }
    }

    /// Call `callback` after every `every` decoded nodes.
    pub fn with_progress(
        mut self,
        every: u64,
        callback: impl FnMut(&IngestStats) + 'static,
    ) -> Self {
        if every > 0 {
            self.progress = Some((every, Box::new(callback)));
        }
        self
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn into_registry(self) -> EntityRegistry {
        self.registry
    }

    /// Decode a possibly compressed OSM XML stream.
    pub fn parse<I: Read>(&mut self, input: I, compression: Compression) -> Result<()> {
        let reader = open_reader(input, compression)?;
        self.parse_xml(reader)
    }

    /// Decode an uncompressed OSM XML stream.
    pub fn parse_xml<B: BufRead>(&mut self, input: B) -> Result<()> {
        let mut reader = Reader::from_reader(input);
        reader.trim_text(true);

        let mut pending: Option<Pending> = None;
        let mut depth = 0usize;
        let mut buf = Vec::new();

        loop {
            let event = reader
                .read_event_into(&mut buf)
                .map_err(|e| SiftError::format(reader.buffer_position() as u64, e.to_string()))?;
            let pos = reader.buffer_position() as u64;

            match event {
                Event::Eof => break,
                Event::Start(e) => {
                    depth += 1;
                    self.handle_element(&e, false, &mut pending, pos)?
                }
                Event::Empty(e) => self.handle_element(&e, true, &mut pending, pos)?,
                Event::End(e) => {
                    depth = depth.saturating_sub(1);
                    let name = e.name();
                    let name = name.as_ref();
                    if matches!(name, b"node" | b"way" | b"relation") {
                        match pending.take() {
                            Some(entity) if entity.element().as_bytes() == name => {
                                self.commit(entity)
                            }
                            _ => {
                                return Err(SiftError::format(
                                    pos,
                                    format!("unexpected </{}>", String::from_utf8_lossy(name)),
                                ))
                            }
                        }
                    }
                }
                _ => {}
            }
            buf.clear();
        }

        if let Some(entity) = pending {
            return Err(SiftError::format(
                reader.buffer_position() as u64,
                format!("input ended inside <{}>", entity.element()),
            ));
        }
        if depth > 0 {
            return Err(SiftError::format(
                reader.buffer_position() as u64,
                "input ended before the document was closed",
            ));
        }

        info!(
            "Parsed {} entities, kept {} ({} nodes, {} ways, {} relations)",
            self.stats.seen(),
            self.stats.kept(),
            self.stats.nodes_kept,
            self.stats.ways_kept,
            self.stats.relations_kept
        );
        Ok(())
    }

    fn handle_element(
        &mut self,
        e: &BytesStart<'_>,
        is_empty: bool,
        pending: &mut Option<Pending>,
        pos: u64,
    ) -> Result<()> {
        let name = e.name();
        match name.as_ref() {
            b"node" | b"way" | b"relation" => {
                if let Some(open) = pending {
                    return Err(SiftError::format(
                        pos,
                        format!(
                            "<{}> nested inside <{}>",
                            String::from_utf8_lossy(name.as_ref()),
                            open.element()
                        ),
                    ));
                }
                let id: i64 = required(e, "id", pos)?;
                let entity = match name.as_ref() {
                    b"node" => {
                        let lat: f64 = required(e, "lat", pos)?;
                        let lon: f64 = required(e, "lon", pos)?;
                        Pending::Node(Node::new(id, lat, lon))
                    }
                    b"way" => Pending::Way(Way::new(id)),
                    _ => Pending::Relation(Relation::new(id)),
                };
                if is_empty {
                    self.commit(entity);
                } else {
                    *pending = Some(entity);
                }
            }
            b"tag" => {
                let key = attr(e, "k", pos)?;
                let value = attr(e, "v", pos)?;
                let (Some(key), Some(value)) = (key, value) else {
                    return Err(SiftError::format(pos, "<tag> without k or v"));
                };
                match pending {
                    Some(entity) => entity.tags_mut().insert(key, value),
                    None => return Err(SiftError::format(pos, "<tag> outside of an entity")),
                }
            }
            b"nd" => match pending {
                Some(Pending::Way(way)) => {
                    let node_ref: i64 = required(e, "ref", pos)?;
                    way.node_refs.push(node_ref);
                }
                _ => return Err(SiftError::format(pos, "<nd> outside of a way")),
            },
            b"member" => match pending {
                Some(Pending::Relation(rel)) => {
                    let kind_str: String = required(e, "type", pos)?;
                    let kind = EntityKind::from_member_type(&kind_str).ok_or_else(|| {
                        SiftError::format(pos, format!("unknown member type '{}'", kind_str))
                    })?;
                    let id: i64 = required(e, "ref", pos)?;
                    let role = attr(e, "role", pos)?.unwrap_or_default();
                    rel.members.push(Member {
                        member: EntityId { kind, id },
                        role,
                    });
                }
                _ => return Err(SiftError::format(pos, "<member> outside of a relation")),
            },
            b"bounds" => {
                let bounds = (
                    attr(e, "minlat", pos)?,
                    attr(e, "minlon", pos)?,
                    attr(e, "maxlat", pos)?,
                    attr(e, "maxlon", pos)?,
                );
                if let (Some(min_lat), Some(min_lon), Some(max_lat), Some(max_lon)) = bounds {
                    self.registry.bounds = Some(BoundingBox::new(
                        parse_number(&min_lat, "minlat", pos)?,
                        parse_number(&min_lon, "minlon", pos)?,
                        parse_number(&max_lat, "maxlat", pos)?,
                        parse_number(&max_lon, "maxlon", pos)?,
                    ));
                }
            }
            // osm root, changesets, notes and anything newer: not our business
            _ => {}
        }
        Ok(())
    }

    /// Decode an OSM PBF stream with the same filters.
    pub fn parse_pbf<I: Read>(&mut self, input: I) -> Result<()> {
        let mut reader = OsmPbfReader::new(input);

        for obj in reader.iter() {
            let obj = obj.map_err(|e| SiftError::format(0, e.to_string()))?;
            let entity = match obj {
                OsmObj::Node(node) => Pending::Node(Node {
                    id: node.id.0,
                    location: LatLon::new(node.lat(), node.lon()),
                    tags: convert_tags(&node.tags),
                }),
                OsmObj::Way(way) => Pending::Way(Way {
                    id: way.id.0,
                    node_refs: way.nodes.iter().map(|n| n.0).collect(),
                    tags: convert_tags(&way.tags),
                }),
                OsmObj::Relation(rel) => Pending::Relation(Relation {
                    id: rel.id.0,
                    members: rel
                        .refs
                        .iter()
                        .map(|r| Member {
                            member: match r.member {
                                OsmId::Node(id) => EntityId::node(id.0),
                                OsmId::Way(id) => EntityId::way(id.0),
                                OsmId::Relation(id) => EntityId::relation(id.0),
                            },
                            role: r.role.to_string(),
                        })
                        .collect(),
                    tags: convert_tags(&rel.tags),
                }),
            };
            self.commit(entity);
        }

        info!(
            "Parsed {} PBF entities, kept {}",
            self.stats.seen(),
            self.stats.kept()
        );
        Ok(())
    }

    fn commit(&mut self, entity: Pending) {
        match entity {
            Pending::Node(node) => {
                self.stats.nodes_seen += 1;
                if (self.node_filter)(&node) {
                    self.stats.nodes_kept += 1;
                    self.registry.insert(Entity::Node(node));
                }
                if let Some((every, callback)) = self.progress.as_mut() {
                    if self.stats.nodes_seen % *every == 0 {
                        callback(&self.stats);
                    }
                }
            }
            Pending::Way(way) => {
                self.stats.ways_seen += 1;
                if (self.way_filter)(&way) {
                    self.stats.ways_kept += 1;
                    self.registry.insert(Entity::Way(way));
                }
            }
            Pending::Relation(rel) => {
                self.stats.relations_seen += 1;
                if (self.relation_filter)(&rel) {
                    self.stats.relations_kept += 1;
                    self.registry.insert(Entity::Relation(rel));
                } else {
                    debug!("Skipping relation {}", rel.id);
                }
            }
        }
    }
}

fn convert_tags(tags: &osmpbfreader::Tags) -> Tags {
    tags.iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn attr(e: &BytesStart<'_>, key: &str, pos: u64) -> Result<Option<String>> {
    for attr in e.attributes().with_checks(false) {
        let attr = attr.map_err(|err| SiftError::format(pos, err.to_string()))?;
        if attr.key.as_ref() == key.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|err| SiftError::format(pos, err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn required<T: FromStr>(e: &BytesStart<'_>, key: &str, pos: u64) -> Result<T> {
    let element = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let value = attr(e, key, pos)?.ok_or_else(|| {
        SiftError::format(pos, format!("<{}> is missing attribute '{}'", element, key))
    })?;
    value.parse().map_err(|_| {
        SiftError::format(
            pos,
            format!("<{}> has invalid {}='{}'", element, key, value),
        )
    })
}

fn parse_number(value: &str, key: &str, pos: u64) -> Result<f64> {
    value
        .parse()
        .map_err(|_| SiftError::format(pos, format!("invalid {}='{}'", key, value)))
}
