//! Non-fatal anomalies found while building the hierarchy.

use serde::Serialize;

use crate::models::EntityId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// `place` value the classifier does not know (the value, possibly empty)
    UnrecognizedPlaceTier(String),
    /// Building seen before any city existed
    UnassignedBuilding,
    /// Amenity seen before any city existed
    UnassignedAmenity,
    /// Entity whose location could not be resolved from retained nodes
    UnresolvedLocation,
}

impl DiagnosticKind {
    pub fn reason(&self) -> &'static str {
        match self {
            DiagnosticKind::UnrecognizedPlaceTier(_) => "unrecognized_place_tier",
            DiagnosticKind::UnassignedBuilding => "unassigned_building",
            DiagnosticKind::UnassignedAmenity => "unassigned_amenity",
            DiagnosticKind::UnresolvedLocation => "unresolved_location",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            DiagnosticKind::UnrecognizedPlaceTier(value) => value,
            _ => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub entity: EntityId,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, entity: EntityId) -> Self {
        Self { kind, entity }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            DiagnosticKind::UnrecognizedPlaceTier(value) => {
                write!(f, "{}: unrecognized place '{}'", self.entity, value)
            }
            kind => write!(f, "{}: {}", self.entity, kind.reason()),
        }
    }
}
