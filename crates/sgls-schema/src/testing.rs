//! Shared schema fixture for tests across the workspace.

use crate::Schema;

pub const SAMPLE_GRAPH: &str = include_str!("../fixtures/graph.json");

/// Person, Property, Relationship and User, with a Person <-> Property
/// relation cycle.
///
/// # Panics
///
/// Panics if the bundled fixture does not parse.
#[must_use]
pub fn sample_schema() -> Schema {
    Schema::from_json(SAMPLE_GRAPH).expect("bundled fixture is valid")
}
