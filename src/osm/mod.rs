//! OSM data plumbing: classification, compression framing, reading and writing.

pub mod classify;
pub mod compression;
pub mod reader;
pub mod writer;

pub use classify::Classifier;
pub use compression::{open_reader, Compression, OutputStream};
pub use reader::{accept_all, reject_all, IngestStats, OsmIngestor};
pub use writer::{ClosureMode, Selection, SubsetWriter, WriteSummary};
