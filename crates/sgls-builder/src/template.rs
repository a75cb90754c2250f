//! Starter documents for an entity in each mode.

use serde_json::json;
use serde_json::Map;
use serde_json::Value;
use sgls_document::Mode;
use sgls_document::MutationKind;
use sgls_schema::Entity;
use sgls_schema::Schema;
use sgls_transaction::Transaction;

use crate::SynthesisOptions;

fn required_data(entity: &Entity) -> Value {
    let data: Map<String, Value> = entity
        .required_fields()
        .into_iter()
        .filter_map(|name| Some((name.to_string(), entity.field(name)?.default_value())))
        .collect();
    Value::Object(data)
}

/// The body placed under the entity key for a query.
#[must_use]
pub fn query_skeleton(options: &SynthesisOptions) -> Value {
    match options.default_limit {
        Some(limit) => json!({"fields": ["id"], "limit": limit}),
        None => json!({"fields": ["id"]}),
    }
}

/// The body placed under the entity key for a mutation.
#[must_use]
pub fn mutation_skeleton(kind: MutationKind, entity: &Entity) -> Value {
    match kind {
        MutationKind::Create | MutationKind::GetOrCreate => json!({
            "data": required_data(entity),
            "response": ["id"],
        }),
        MutationKind::Update => json!({
            "filters": {"id__eq": 0},
            "data": {},
            "response": ["id"],
        }),
        MutationKind::Rewrite => json!({
            "filters": {"id__eq": 0},
            "data": required_data(entity),
            "response": ["id"],
        }),
        MutationKind::Delete => json!({
            "filters": {"id__eq": 0},
        }),
    }
}

/// A complete document for `entity` in `mode`, or `None` for an unknown
/// entity.
#[must_use]
pub fn document_template(
    mode: Mode,
    entity: &str,
    schema: &Schema,
    options: &SynthesisOptions,
) -> Option<Value> {
    let definition = schema.entity(entity)?;
    let document = match mode {
        Mode::Query => json!({ entity: query_skeleton(options) }),
        Mode::Transaction => {
            let mut transaction = Transaction::new();
            transaction.add_step(entity, schema).ok()?;
            transaction.to_document()
        }
        Mode::Create | Mode::Update | Mode::Rewrite | Mode::Delete => {
            let kind = mode.mutation()?;
            json!({ kind.as_str(): { entity: mutation_skeleton(kind, definition) } })
        }
    };
    Some(document)
}

/// [`document_template`] rendered as editor text.
#[must_use]
pub fn template_text(
    mode: Mode,
    entity: &str,
    schema: &Schema,
    options: &SynthesisOptions,
) -> Option<String> {
    let document = document_template(mode, entity, schema, options)?;
    serde_json::to_string_pretty(&document).ok()
}
