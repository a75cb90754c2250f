use serde_json::Map;
use serde_json::Value;
use sgls_schema::Entity;
use sgls_schema::Schema;

use crate::Path;
use crate::SelectionState;

/// Hard stop for relation nesting, independent of builder state.
pub const MAX_DEPTH: usize = 32;

pub const DEFAULT_LIMIT: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynthesisOptions {
    /// Applied to the root node when the builder set no limit.
    pub default_limit: Option<u64>,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            default_limit: Some(DEFAULT_LIMIT),
        }
    }
}

/// Build the query document described by `state`.
///
/// Returns `None` without a root entity or when the root is not in the
/// schema. Relations are only entered when their node selects fields or is
/// expanded, so cyclic schemas terminate.
#[must_use]
pub fn synthesize(
    root: Option<&str>,
    state: &SelectionState,
    schema: &Schema,
    options: &SynthesisOptions,
) -> Option<Value> {
    let root = root?;
    let entity = schema.entity(root)?;
    let body = node(entity, &Path::root(root), state, schema, options);

    let mut document = Map::new();
    document.insert(root.to_string(), body);
    Some(Value::Object(document))
}

fn node(
    entity: &Entity,
    path: &Path,
    state: &SelectionState,
    schema: &Schema,
    options: &SynthesisOptions,
) -> Value {
    let mut body = Map::new();

    let fields = state.fields(path);
    if !fields.is_empty() {
        body.insert("fields".to_string(), Value::from(fields.to_vec()));
    }

    if let Some(filters) = state.filters(path) {
        let filters = filters
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        body.insert("filters".to_string(), Value::Object(filters));
    }

    let pagination = state.pagination(path);
    let limit = match pagination.limit {
        Some(limit) => Some(limit),
        None if path.depth() == 0 => options.default_limit,
        None => None,
    };
    if let Some(limit) = limit {
        body.insert("limit".to_string(), Value::from(limit));
    }
    if let Some(offset) = pagination.offset {
        body.insert("offset".to_string(), Value::from(offset));
    }

    if path.depth() < MAX_DEPTH {
        let mut relations = Map::new();
        for (name, relation) in &entity.relations {
            let child = path.child(name);
            if !state.has_selection(&child) && !state.is_expanded(&child) {
                continue;
            }
            let Some(target) = schema.entity(&relation.target) else {
                tracing::trace!(%child, target = %relation.target, "relation target missing");
                continue;
            };
            relations.insert(name.clone(), node(target, &child, state, schema, options));
        }
        if !relations.is_empty() {
            body.insert("relations".to_string(), Value::Object(relations));
        }
    }

    Value::Object(body)
}
