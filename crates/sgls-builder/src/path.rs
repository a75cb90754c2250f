use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// A node of the selection tree: the root entity followed by relation
/// names, dot-joined (`Person.owned_properties.owner`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(String);

impl Path {
    #[must_use]
    pub fn root(entity: &str) -> Self {
        Path(entity.to_string())
    }

    /// Parse a dot-joined path such as `Person.owned_properties`.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        Path(text.to_string())
    }

    #[must_use]
    pub fn child(&self, relation: &str) -> Self {
        Path(format!("{}.{relation}", self.0))
    }

    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0
            .rsplit_once('.')
            .map(|(parent, _)| Path(parent.to_string()))
    }

    /// Number of relation hops below the root.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.matches('.').count()
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    #[must_use]
    pub fn root_entity(&self) -> &str {
        self.segments().next().unwrap_or_default()
    }

    /// The relation names after the root.
    pub fn relations(&self) -> impl Iterator<Item = &str> {
        self.segments().skip(1)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
