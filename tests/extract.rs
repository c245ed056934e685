use std::fs::{self, File};
use std::io::{BufReader, Cursor, Write};
use std::path::Path;
use std::process::Command;

use sift::config::ExtractionConfig;
use sift::display::{JsonSummary, RegionDisplay};
use sift::osm::{accept_all, Compression, OsmIngestor, OutputStream};
use sift::{EntityId, Extractor, InputFormat, LatLon, SiftError};

const TOWN: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="test">
  <bounds minlat="39.0" minlon="-91.0" maxlat="41.0" maxlon="-89.0"/>
  <node id="1" lat="39.8" lon="-89.6">
    <tag k="place" v="country"/>
    <tag k="name" v="United States"/>
  </node>
  <node id="30" lat="40.001" lon="-90.001">
    <tag k="amenity" v="bar"/>
    <tag k="name" v="Moe's Tavern"/>
  </node>
  <node id="31" lat="39.601" lon="-89.501">
    <tag k="shop" v="convenience"/>
    <tag k="name" v="Kwik-E-Mart"/>
  </node>
  <node id="2" lat="40.0" lon="-90.0">
    <tag k="place" v="city"/>
    <tag k="name" v="Springfield"/>
  </node>
  <node id="3" lat="39.6" lon="-89.5">
    <tag k="place" v="town"/>
    <tag k="name" v="Shelbyville"/>
  </node>
  <node id="11" lat="40.0" lon="-90.0"/>
  <node id="12" lat="40.0" lon="-90.02"/>
  <node id="13" lat="40.02" lon="-90.02"/>
  <node id="14" lat="40.02" lon="-90.0"/>
  <node id="15" lat="39.61" lon="-89.51">
    <tag k="building" v="yes"/>
    <tag k="addr:housenumber" v="1"/>
    <tag k="addr:street" v="Main Street"/>
  </node>
  <way id="100">
    <nd ref="11"/>
    <nd ref="12"/>
    <nd ref="13"/>
    <nd ref="14"/>
    <nd ref="11"/>
    <tag k="building" v="house"/>
    <tag k="addr:housenumber" v="742"/>
    <tag k="addr:street" v="Evergreen Terrace"/>
  </way>
  <way id="200">
    <nd ref="12"/>
    <nd ref="13"/>
    <tag k="highway" v="primary"/>
  </way>
</osm>
"#;

fn bzip2(text: &str) -> Vec<u8> {
    let mut stream = OutputStream::new(Vec::new(), Compression::Bzip2);
    stream.write_all(text.as_bytes()).unwrap();
    stream.finish().unwrap()
}

#[test]
fn extracts_compressed_input() {
    let extraction = Extractor::new(ExtractionConfig::default())
        .unwrap()
        .run(Cursor::new(bzip2(TOWN)), InputFormat::Xml)
        .unwrap();
    let region = &extraction.region;

    assert_eq!(region.name(), Some("United States"));
    assert_eq!(region.city_count(), 2);

    let springfield = region.closest_city(LatLon::new(40.01, -90.01)).unwrap();
    assert_eq!(springfield.name(), "Springfield");
    assert_eq!(springfield.buildings().len(), 1);
    assert_eq!(springfield.amenities().len(), 1);

    let shelbyville = region.closest_city(LatLon::new(39.6, -89.5)).unwrap();
    assert_eq!(shelbyville.name(), "Shelbyville");
    assert_eq!(shelbyville.buildings().len(), 1);
    assert_eq!(shelbyville.amenities()[0].name(), Some("Kwik-E-Mart"));

    assert!(extraction.diagnostics().is_empty());
    assert_eq!(extraction.road_tiles.len(), 2);
}

#[test]
fn extracts_pbf_input() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/springfield.osm.pbf");
    assert_eq!(InputFormat::from_path(&path), InputFormat::Pbf);

    let extraction = Extractor::new(ExtractionConfig::default())
        .unwrap()
        .run(BufReader::new(File::open(&path).unwrap()), InputFormat::Pbf)
        .unwrap();

    assert_eq!(extraction.stats.nodes_seen, 4);
    assert_eq!(extraction.stats.ways_kept, 1);
    // relations are dropped unless they are addressed buildings
    assert_eq!(extraction.stats.relations_seen, 1);
    assert_eq!(extraction.stats.relations_kept, 0);

    let springfield = extraction
        .region
        .closest_city(LatLon::new(40.001, -90.001))
        .unwrap();
    assert_eq!(springfield.name(), "Springfield");
    assert_eq!(springfield.amenities().len(), 1);
    assert_eq!(extraction.road_tiles.len(), 3);
    assert!(extraction.diagnostics().is_empty());
}

#[test]
fn declared_compression_must_match() {
    let result = Extractor::new(ExtractionConfig {
        input_compression: Compression::Bzip2,
        ..ExtractionConfig::default()
    })
    .unwrap()
    .run(Cursor::new(TOWN.as_bytes().to_vec()), InputFormat::Xml);
    assert!(matches!(result, Err(SiftError::Format { position: 0, .. })));
}

#[test]
fn truncated_input_fails() {
    let cut = &TOWN[..TOWN.find("<way id=\"200\">").unwrap()];
    let result = Extractor::new(ExtractionConfig::default())
        .unwrap()
        .run(Cursor::new(cut.as_bytes().to_vec()), InputFormat::Xml);
    assert!(matches!(result, Err(SiftError::Format { .. })));
}

#[test]
fn subset_round_trips_through_the_ingestor() {
    let config = ExtractionConfig::default();
    let extraction = Extractor::new(config.clone())
        .unwrap()
        .run(Cursor::new(TOWN.as_bytes().to_vec()), InputFormat::Xml)
        .unwrap();

    let mut out = Vec::new();
    let summary = extraction.write_subset(&mut out, &config).unwrap();
    assert_eq!(summary.nodes, 2);
    assert_eq!(summary.ways, 0);

    let mut ingestor = OsmIngestor::new(accept_all, accept_all, accept_all);
    ingestor.parse(Cursor::new(out), Compression::Auto).unwrap();
    let copy = ingestor.into_registry();
    assert!(copy.contains(EntityId::node(30)));
    assert!(copy.contains(EntityId::node(31)));
    assert_eq!(copy.bounds, extraction.registry.bounds);
}

#[test]
fn json_summary_lists_cities() {
    let extraction = Extractor::new(ExtractionConfig::default())
        .unwrap()
        .run(Cursor::new(TOWN.as_bytes().to_vec()), InputFormat::Xml)
        .unwrap();

    let mut display = JsonSummary::new(Vec::new());
    display.display(&extraction.region).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&display.into_inner()).unwrap();
    assert_eq!(value["cities"][0]["name"], "Springfield");
    assert_eq!(value["cities"][0]["tier"], "city");
    assert_eq!(value["cities"][1]["name"], "Shelbyville");
    assert_eq!(value["amenities"], 2);
}

#[test]
fn cli_writes_all_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("town.osm.bz2");
    fs::write(&input, bzip2(TOWN)).unwrap();

    let config = dir.path().join("sift.toml");
    fs::write(&config, "[interest]\namenities = true\nbuildings = true\n").unwrap();

    let output = dir.path().join("subset.osm.bz2");
    let summary = dir.path().join("summary.json");
    let diagnostics = dir.path().join("diagnostics.csv");

    let status = Command::new(env!("CARGO_BIN_EXE_extract"))
        .arg("--file")
        .arg(&input)
        .arg("--compressed")
        .arg("--config")
        .arg(&config)
        .arg("--output")
        .arg(&output)
        .arg("--summary")
        .arg(&summary)
        .arg("--diagnostics")
        .arg(&diagnostics)
        .status()
        .unwrap();
    assert!(status.success());

    // extension picks bzip2 for the subset
    let bytes = fs::read(&output).unwrap();
    assert_eq!(&bytes[..2], b"BZ");
    let mut ingestor = OsmIngestor::new(accept_all, accept_all, accept_all);
    ingestor
        .parse(BufReader::new(File::open(&output).unwrap()), Compression::Auto)
        .unwrap();
    let copy = ingestor.into_registry();
    assert_eq!(copy.way(100).unwrap().node_refs, vec![11, 12, 13, 14, 11]);
    assert!(copy.contains(EntityId::node(15)));
    assert!(!copy.contains(EntityId::way(200)));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&summary).unwrap()).unwrap();
    assert_eq!(json["name"], "United States");
    assert_eq!(json["buildings"], 2);

    let csv = fs::read_to_string(&diagnostics).unwrap();
    assert_eq!(csv, "kind,id,reason,detail\n");
}

#[test]
fn cli_rejects_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let status = Command::new(env!("CARGO_BIN_EXE_extract"))
        .arg("--file")
        .arg(dir.path().join("nope.osm"))
        .status()
        .unwrap();
    assert!(!status.success());
}

#[test]
fn cli_rejects_bad_config() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("town.osm");
    fs::write(&input, TOWN).unwrap();
    let config = dir.path().join("sift.toml");
    fs::write(&config, "city_tile_size = 0.0\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_extract"))
        .arg("--file")
        .arg(&input)
        .arg("--config")
        .arg(&config)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("city_tile_size"), "{}", stderr);
}
