//! Administrative hierarchy: a region, its cities and what belongs to them.

pub mod city;
pub mod diagnostics;
pub mod hierarchy;

pub use city::{Building, City, CitySummary};
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use hierarchy::{Region, DEFAULT_CITY_TILE_SIZE};
