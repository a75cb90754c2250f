//! Reserved keys of the request language.

use crate::MutationKind;

/// Keys with structural meaning inside an entity body or transaction.
pub const STRUCTURAL: &[&str] = &[
    "query",
    "fields",
    "filters",
    "relations",
    "data",
    "response",
    "order",
    "limit",
    "offset",
    "select",
    "transaction",
    "steps",
    "as",
    "on_error",
    "depends_on",
    "optional",
];

/// Keys usable inside an entity body, in the order they are suggested.
pub const QUERY_BODY_KEYS: &[&str] = &["fields", "filters", "order", "limit", "offset", "relations"];

pub const MUTATION_BODY_KEYS: &[&str] = &["data", "filters", "response"];

pub const MUTATION_KEYWORDS: &[&str] = &["create", "update", "rewrite", "delete", "get_or_create"];

pub const HTTP_ALIASES: &[(&str, MutationKind)] = &[
    ("POST", MutationKind::Create),
    ("PATCH", MutationKind::Update),
    ("PUT", MutationKind::Rewrite),
    ("DELETE", MutationKind::Delete),
];

#[must_use]
pub fn is_structural(key: &str) -> bool {
    STRUCTURAL.contains(&key)
}

#[must_use]
pub fn is_mutation_keyword(key: &str) -> bool {
    MUTATION_KEYWORDS.contains(&key) || HTTP_ALIASES.iter().any(|(alias, _)| *alias == key)
}

/// Whether `key` can never name an entity.
#[must_use]
pub fn is_reserved(key: &str) -> bool {
    is_structural(key) || is_mutation_keyword(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved() {
        assert!(is_reserved("fields"));
        assert!(is_reserved("get_or_create"));
        assert!(is_reserved("PATCH"));
        assert!(!is_reserved("Person"));
        assert!(!is_reserved("name"));
    }
}
