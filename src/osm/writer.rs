//! Re-emit a referentially closed subset of a registry as OSM XML.

use std::collections::BTreeSet;
use std::io::{self, Write};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SiftError};
use crate::models::{EntityId, EntityKind, EntityRegistry, Node, Relation, Tags, Way};

pub const GENERATOR: &str = "sift";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosureMode {
    /// Ways pull in their nodes, relations their members, recursively
    #[default]
    Transitive,
    /// Write exactly the given ids
    InterestingOnly,
}

/// Result of a closure walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Ordered nodes, then ways, then relations, each by id
    pub entities: BTreeSet<EntityId>,
    /// Referenced ids missing from the registry
    pub missing: BTreeSet<EntityId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub nodes: usize,
    pub ways: usize,
    pub relations: usize,
    pub unresolved: usize,
}

pub struct SubsetWriter<'a> {
    registry: &'a EntityRegistry,
}

impl<'a> SubsetWriter<'a> {
    pub fn new(registry: &'a EntityRegistry) -> Self {
        Self { registry }
    }

    /// Everything needed to write `interesting` under `mode`.
    ///
    /// Fails with [`SiftError::CyclicReference`] when a relation reaches
    /// itself through its members. Shared sub-relations are not cycles.
    pub fn closure(
        &self,
        interesting: impl IntoIterator<Item = EntityId>,
        mode: ClosureMode,
    ) -> Result<Selection> {
        let mut selection = Selection::default();

        for id in interesting {
            match mode {
                ClosureMode::InterestingOnly => {
                    if self.registry.contains(id) {
                        selection.entities.insert(id);
                    } else {
                        selection.missing.insert(id);
                    }
                }
                ClosureMode::Transitive => match id.kind {
                    EntityKind::Node => self.expand_node(id.id, &mut selection),
                    EntityKind::Way => self.expand_way(id.id, &mut selection),
                    EntityKind::Relation => self.expand_relation(id, &mut selection)?,
                },
            }
        }

        Ok(selection)
    }

    fn expand_node(&self, id: i64, selection: &mut Selection) {
        let key = EntityId::node(id);
        if self.registry.node(id).is_some() {
            selection.entities.insert(key);
        } else {
            selection.missing.insert(key);
        }
    }

    /// The way and every node it references
    fn expand_way(&self, id: i64, selection: &mut Selection) {
        let key = EntityId::way(id);
        if selection.entities.contains(&key) {
            return;
        }
        match self.registry.way(id) {
            Some(way) => {
                selection.entities.insert(key);
                for &node_ref in &way.node_refs {
                    self.expand_node(node_ref, selection);
                }
            }
            None => {
                selection.missing.insert(key);
            }
        }
    }

    /// Depth-first over relation members with an explicit stack. A
    /// relation is "in progress" while it is on the stack; meeting one
    /// again before it finishes is a cycle.
    fn expand_relation(&self, root: EntityId, selection: &mut Selection) -> Result<()> {
        if selection.entities.contains(&root) {
            return Ok(());
        }
        let Some(relation) = self.registry.relation(root.id) else {
            selection.missing.insert(root);
            return Ok(());
        };

        let mut in_progress: BTreeSet<i64> = BTreeSet::new();
        let mut stack: Vec<(&Relation, usize)> = vec![(relation, 0)];
        in_progress.insert(root.id);

        while let Some(&(relation, next)) = stack.last() {
            if next == relation.members.len() {
                stack.pop();
                in_progress.remove(&relation.id);
                selection.entities.insert(relation.entity_id());
                continue;
            }
            let top = stack.len() - 1;
            stack[top].1 += 1;

            let member = relation.members[next].member;
            match member.kind {
                EntityKind::Node => {
                    self.expand_node(member.id, selection);
                    continue;
                }
                EntityKind::Way => {
                    self.expand_way(member.id, selection);
                    continue;
                }
                EntityKind::Relation => {}
            }
            if in_progress.contains(&member.id) {
                return Err(SiftError::CyclicReference(member));
            }
            if selection.entities.contains(&member) {
                continue;
            }
            match self.registry.relation(member.id) {
                Some(child) => {
                    in_progress.insert(child.id);
                    stack.push((child, 0));
                }
                None => {
                    selection.missing.insert(member);
                }
            }
        }

        Ok(())
    }

    /// Write `interesting` (expanded per `mode`) to `out` as OSM XML.
    pub fn write<W: Write>(
        &self,
        out: W,
        interesting: impl IntoIterator<Item = EntityId>,
        mode: ClosureMode,
    ) -> Result<WriteSummary> {
        let selection = self.closure(interesting, mode)?;
        let mut summary = WriteSummary {
            unresolved: selection.missing.len(),
            ..WriteSummary::default()
        };
        if summary.unresolved > 0 {
            debug!("{} referenced entities are not in the registry", summary.unresolved);
        }

        let mut writer = Writer::new_with_indent(out, b' ', 2);
        emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new("osm");
        root.push_attribute(("version", "0.6"));
        root.push_attribute(("generator", GENERATOR));
        emit(&mut writer, Event::Start(root))?;

        if let Some(bounds) = &self.registry.bounds {
            let mut el = BytesStart::new("bounds");
            el.push_attribute(("minlat", bounds.min_lat.to_string().as_str()));
            el.push_attribute(("minlon", bounds.min_lon.to_string().as_str()));
            el.push_attribute(("maxlat", bounds.max_lat.to_string().as_str()));
            el.push_attribute(("maxlon", bounds.max_lon.to_string().as_str()));
            emit(&mut writer, Event::Empty(el))?;
        }

        for id in &selection.entities {
            match id.kind {
                EntityKind::Node => {
                    if let Some(node) = self.registry.node(id.id) {
                        write_node(&mut writer, node)?;
                        summary.nodes += 1;
                    }
                }
                EntityKind::Way => {
                    if let Some(way) = self.registry.way(id.id) {
                        write_way(&mut writer, way)?;
                        summary.ways += 1;
                    }
                }
                EntityKind::Relation => {
                    if let Some(relation) = self.registry.relation(id.id) {
                        write_relation(&mut writer, relation)?;
                        summary.relations += 1;
                    }
                }
            }
        }

        emit(&mut writer, Event::End(BytesEnd::new("osm")))?;
        writer.into_inner().flush()?;

        info!(
            "Wrote {} nodes, {} ways, {} relations",
            summary.nodes, summary.ways, summary.relations
        );
        Ok(summary)
    }
}

fn emit<W: Write>(writer: &mut Writer<W>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| SiftError::Io(io::Error::other(e)))
}

fn write_node<W: Write>(writer: &mut Writer<W>, node: &Node) -> Result<()> {
    let mut el = BytesStart::new("node");
    el.push_attribute(("id", node.id.to_string().as_str()));
    el.push_attribute(("lat", node.location.lat.to_string().as_str()));
    el.push_attribute(("lon", node.location.lon.to_string().as_str()));

    if node.tags.is_empty() {
        return emit(writer, Event::Empty(el));
    }
    emit(writer, Event::Start(el))?;
    write_tags(writer, &node.tags)?;
    emit(writer, Event::End(BytesEnd::new("node")))
}

fn write_way<W: Write>(writer: &mut Writer<W>, way: &Way) -> Result<()> {
    let mut el = BytesStart::new("way");
    el.push_attribute(("id", way.id.to_string().as_str()));

    if way.node_refs.is_empty() && way.tags.is_empty() {
        return emit(writer, Event::Empty(el));
    }
    emit(writer, Event::Start(el))?;
    for node_ref in &way.node_refs {
        let mut nd = BytesStart::new("nd");
        nd.push_attribute(("ref", node_ref.to_string().as_str()));
        emit(writer, Event::Empty(nd))?;
    }
    write_tags(writer, &way.tags)?;
    emit(writer, Event::End(BytesEnd::new("way")))
}

fn write_relation<W: Write>(writer: &mut Writer<W>, relation: &Relation) -> Result<()> {
    let mut el = BytesStart::new("relation");
    el.push_attribute(("id", relation.id.to_string().as_str()));

    if relation.members.is_empty() && relation.tags.is_empty() {
        return emit(writer, Event::Empty(el));
    }
    emit(writer, Event::Start(el))?;
    for member in &relation.members {
        let mut m = BytesStart::new("member");
        m.push_attribute(("type", member.member.kind.as_str()));
        m.push_attribute(("ref", member.member.id.to_string().as_str()));
        m.push_attribute(("role", member.role.as_str()));
        emit(writer, Event::Empty(m))?;
    }
    write_tags(writer, &relation.tags)?;
    emit(writer, Event::End(BytesEnd::new("relation")))
}

fn write_tags<W: Write>(writer: &mut Writer<W>, tags: &Tags) -> Result<()> {
    for (k, v) in tags.iter() {
        let mut tag = BytesStart::new("tag");
        tag.push_attribute(("k", k));
        tag.push_attribute(("v", v));
        emit(writer, Event::Empty(tag))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entity, Member};
    use crate::osm::compression::{Compression, OutputStream};
    use crate::osm::reader::{accept_all, OsmIngestor};
    use std::io::Cursor;

    const STREETS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="test">
  <bounds minlat="39.9" minlon="-90.1" maxlat="40.1" maxlon="-89.9"/>
  <node id="1" lat="40.0" lon="-90.0"/>
  <node id="2" lat="40.001" lon="-90.001"/>
  <node id="3" lat="40.002" lon="-90.002"/>
  <node id="4" lat="40.003" lon="-90.003">
    <tag k="amenity" v="cafe"/>
    <tag k="name" v="Moe's &amp; Co"/>
  </node>
  <node id="5" lat="40.5" lon="-90.5"/>
  <way id="10">
    <nd ref="3"/>
    <nd ref="1"/>
    <nd ref="2"/>
    <nd ref="99"/>
    <tag k="highway" v="residential"/>
  </way>
  <way id="11">
    <nd ref="5"/>
  </way>
  <relation id="20">
    <member type="way" ref="10" role="street"/>
    <member type="node" ref="4" role="house"/>
  </relation>
  <relation id="21">
    <member type="relation" ref="20" role=""/>
  </relation>
</osm>
"#;

    fn registry(input: &str) -> EntityRegistry {
        let mut ingestor = OsmIngestor::new(accept_all, accept_all, accept_all);
        ingestor.parse_xml(Cursor::new(input.as_bytes())).unwrap();
        ingestor.into_registry()
    }

    fn ids(selection: &Selection) -> Vec<String> {
        selection.entities.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_transitive_closure_is_complete() {
        let registry = registry(STREETS);
        let writer = SubsetWriter::new(&registry);
        let selection = writer
            .closure([EntityId::relation(21)], ClosureMode::Transitive)
            .unwrap();

        assert_eq!(
            ids(&selection),
            vec![
                "node/1",
                "node/2",
                "node/3",
                "node/4",
                "way/10",
                "relation/20",
                "relation/21"
            ]
        );
        assert_eq!(selection.missing, BTreeSet::from([EntityId::node(99)]));
    }

    #[test]
    fn test_transitive_closure_from_each_kind() {
        let registry = registry(STREETS);
        let writer = SubsetWriter::new(&registry);
        let selection = writer
            .closure(
                [
                    EntityId::node(5),
                    EntityId::way(11),
                    EntityId::relation(20),
                    EntityId::way(12),
                    EntityId::node(42),
                ],
                ClosureMode::Transitive,
            )
            .unwrap();

        assert_eq!(
            ids(&selection),
            vec![
                "node/1",
                "node/2",
                "node/3",
                "node/4",
                "node/5",
                "way/10",
                "way/11",
                "relation/20"
            ]
        );
        assert_eq!(
            selection.missing,
            BTreeSet::from([EntityId::node(42), EntityId::node(99), EntityId::way(12)])
        );
    }

    #[test]
    fn test_interesting_only_does_not_expand() {
        let registry = registry(STREETS);
        let writer = SubsetWriter::new(&registry);
        let selection = writer
            .closure(
                [EntityId::way(10), EntityId::node(42)],
                ClosureMode::InterestingOnly,
            )
            .unwrap();
        assert_eq!(ids(&selection), vec!["way/10"]);
        assert_eq!(selection.missing, BTreeSet::from([EntityId::node(42)]));
    }

    #[test]
    fn test_round_trip_preserves_references() {
        let source = registry(STREETS);
        let mut out = Vec::new();
        let summary = SubsetWriter::new(&source)
            .write(&mut out, [EntityId::relation(20)], ClosureMode::Transitive)
            .unwrap();
        assert_eq!(
            summary,
            WriteSummary {
                nodes: 4,
                ways: 1,
                relations: 1,
                unresolved: 1
            }
        );

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(r#"generator="sift""#));
        assert!(text.contains("<bounds"));

        let copy = registry(&text);
        assert_eq!(copy.way(10).unwrap().node_refs, vec![3, 1, 2, 99]);
        assert_eq!(copy.way(10).unwrap().tags.get("highway"), Some("residential"));
        assert_eq!(copy.node(4).unwrap().tags.get("name"), Some("Moe's & Co"));
        assert_eq!(copy.relation(20).unwrap().members, source.relation(20).unwrap().members);
        assert!(copy.node(5).is_none());
        assert!(copy.way(11).is_none());
        assert_eq!(copy.bounds, source.bounds);
    }

    #[test]
    fn test_output_is_ordered_by_kind_then_id() {
        let source = registry(STREETS);
        let mut out = Vec::new();
        SubsetWriter::new(&source)
            .write(
                &mut out,
                [EntityId::relation(21), EntityId::way(11)],
                ClosureMode::Transitive,
            )
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let pos = |needle: &str| text.find(needle).unwrap();
        assert!(pos(r#"<node id="1""#) < pos(r#"<node id="5""#));
        assert!(pos(r#"<node id="5""#) < pos(r#"<way id="10""#));
        assert!(pos(r#"<way id="10""#) < pos(r#"<way id="11""#));
        assert!(pos(r#"<way id="11""#) < pos(r#"<relation id="20""#));
        assert!(pos(r#"<relation id="20""#) < pos(r#"<relation id="21""#));
    }

    fn relation(id: i64, members: &[EntityId]) -> Entity {
        let mut relation = Relation::new(id);
        relation.members = members
            .iter()
            .map(|&member| Member {
                member,
                role: String::new(),
            })
            .collect();
        Entity::Relation(relation)
    }

    #[test]
    fn test_cycle_is_detected() {
        let mut registry = EntityRegistry::new();
        registry.insert(relation(1, &[EntityId::relation(2)]));
        registry.insert(relation(2, &[EntityId::relation(1)]));

        let err = SubsetWriter::new(&registry)
            .closure([EntityId::relation(1)], ClosureMode::Transitive)
            .unwrap_err();
        assert!(matches!(err, SiftError::CyclicReference(id) if id == EntityId::relation(1)));

        let err = SubsetWriter::new(&registry)
            .write(Vec::new(), [EntityId::relation(2)], ClosureMode::Transitive)
            .unwrap_err();
        assert!(matches!(err, SiftError::CyclicReference(_)));
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let mut registry = EntityRegistry::new();
        registry.insert(relation(7, &[EntityId::relation(7)]));
        let err = SubsetWriter::new(&registry)
            .closure([EntityId::relation(7)], ClosureMode::Transitive)
            .unwrap_err();
        assert!(matches!(err, SiftError::CyclicReference(id) if id == EntityId::relation(7)));
    }

    #[test]
    fn test_shared_member_is_not_a_cycle() {
        let mut registry = EntityRegistry::new();
        registry.insert(Entity::Node(Node::new(1, 0.0, 0.0)));
        registry.insert(relation(4, &[EntityId::node(1)]));
        registry.insert(relation(2, &[EntityId::relation(4)]));
        registry.insert(relation(3, &[EntityId::relation(4)]));
        registry.insert(relation(
            1,
            &[EntityId::relation(2), EntityId::relation(3), EntityId::relation(4)],
        ));

        let selection = SubsetWriter::new(&registry)
            .closure([EntityId::relation(1)], ClosureMode::Transitive)
            .unwrap();
        assert_eq!(selection.entities.len(), 5);
        assert!(selection.missing.is_empty());
    }

    #[test]
    fn test_bzip2_output_round_trips() {
        let source = registry(STREETS);
        let mut stream = OutputStream::new(Vec::new(), Compression::Bzip2);
        SubsetWriter::new(&source)
            .write(&mut stream, [EntityId::way(10)], ClosureMode::Transitive)
            .unwrap();
        let bytes = stream.finish().unwrap();
        assert_eq!(&bytes[..2], b"BZ");

        let mut ingestor = OsmIngestor::new(accept_all, accept_all, accept_all);
        ingestor
            .parse(Cursor::new(bytes), Compression::Bzip2)
            .unwrap();
        assert_eq!(ingestor.registry().way_count(), 1);
        assert_eq!(ingestor.registry().node_count(), 3);
    }
}
