use std::fmt;
use std::str::FromStr;

use crate::DocumentError;

/// The kind of request being edited. Each mode keeps its own document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Mode {
    #[default]
    Query,
    Create,
    Update,
    Rewrite,
    Delete,
    Transaction,
}

impl Mode {
    pub const ALL: [Mode; 6] = [
        Mode::Query,
        Mode::Create,
        Mode::Update,
        Mode::Rewrite,
        Mode::Delete,
        Mode::Transaction,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Query => "query",
            Mode::Create => "create",
            Mode::Update => "update",
            Mode::Rewrite => "rewrite",
            Mode::Delete => "delete",
            Mode::Transaction => "transaction",
        }
    }

    #[must_use]
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            Mode::Create | Mode::Update | Mode::Rewrite | Mode::Delete
        )
    }

    /// The single-entity mutation this mode edits, if any.
    #[must_use]
    pub fn mutation(self) -> Option<MutationKind> {
        match self {
            Mode::Create => Some(MutationKind::Create),
            Mode::Update => Some(MutationKind::Update),
            Mode::Rewrite => Some(MutationKind::Rewrite),
            Mode::Delete => Some(MutationKind::Delete),
            Mode::Query | Mode::Transaction => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| DocumentError::UnknownMode(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Create,
    Update,
    Rewrite,
    Delete,
    GetOrCreate,
}

impl MutationKind {
    pub const ALL: [MutationKind; 5] = [
        MutationKind::Create,
        MutationKind::Update,
        MutationKind::Rewrite,
        MutationKind::Delete,
        MutationKind::GetOrCreate,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MutationKind::Create => "create",
            MutationKind::Update => "update",
            MutationKind::Rewrite => "rewrite",
            MutationKind::Delete => "delete",
            MutationKind::GetOrCreate => "get_or_create",
        }
    }

    /// Resolve a request key, accepting the HTTP method aliases.
    #[must_use]
    pub fn from_keyword(key: &str) -> Option<Self> {
        MutationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == key)
            .or_else(|| {
                crate::keywords::HTTP_ALIASES
                    .iter()
                    .find(|(alias, _)| *alias == key)
                    .map(|(_, kind)| *kind)
            })
    }

    #[must_use]
    pub fn mode(self) -> Mode {
        match self {
            MutationKind::Create | MutationKind::GetOrCreate => Mode::Create,
            MutationKind::Update => Mode::Update,
            MutationKind::Rewrite => Mode::Rewrite,
            MutationKind::Delete => Mode::Delete,
        }
    }

    /// Whether the operation writes `data` (everything except delete).
    #[must_use]
    pub fn writes_data(self) -> bool {
        self != MutationKind::Delete
    }

    /// Whether the operation targets existing rows by id or filters.
    #[must_use]
    pub fn targets_existing(self) -> bool {
        matches!(
            self,
            MutationKind::Update | MutationKind::Rewrite | MutationKind::Delete
        )
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
