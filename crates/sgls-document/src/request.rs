use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Map;
use serde_json::Value;

use crate::DocumentError;
use crate::MutationKind;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawNode {
    fields: Option<Vec<String>>,
    filters: IndexMap<String, Value>,
    order: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    relations: IndexMap<String, RawNode>,
    select: Option<Box<RawNode>>,
}

/// One node of a query: an entity at the root, a relation below it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityQuery {
    /// Entity name at the root, relation name when nested.
    pub name: String,
    pub fields: Option<Vec<String>>,
    pub filters: IndexMap<String, Value>,
    pub order: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub relations: IndexMap<String, EntityQuery>,
}

impl EntityQuery {
    /// Parse a query body. Both the flat layout and the nested `select`
    /// layout are accepted; filters always live next to `select`.
    pub fn from_value(name: &str, value: &Value) -> Result<Self, DocumentError> {
        let raw: RawNode = serde_json::from_value(value.clone())
            .map_err(|err| DocumentError::shape(name, err))?;
        Ok(Self::from_raw(name, raw))
    }

    fn from_raw(name: &str, mut raw: RawNode) -> Self {
        let filters = std::mem::take(&mut raw.filters);
        let node = match raw.select.take() {
            Some(select) => *select,
            None => raw,
        };
        EntityQuery {
            name: name.to_string(),
            fields: node.fields,
            filters: if filters.is_empty() {
                node.filters
            } else {
                filters
            },
            order: node.order,
            limit: node.limit,
            offset: node.offset,
            relations: node
                .relations
                .into_iter()
                .map(|(relation, child)| {
                    let query = Self::from_raw(&relation, child);
                    (relation, query)
                })
                .collect(),
        }
    }

    /// The body of this node in flat layout.
    #[must_use]
    pub fn body(&self) -> Value {
        let mut node = Map::new();
        if let Some(fields) = &self.fields {
            node.insert("fields".into(), Value::from(fields.clone()));
        }
        if !self.filters.is_empty() {
            node.insert(
                "filters".into(),
                Value::Object(self.filters.clone().into_iter().collect()),
            );
        }
        if !self.order.is_empty() {
            node.insert("order".into(), Value::from(self.order.clone()));
        }
        if let Some(limit) = self.limit {
            node.insert("limit".into(), Value::from(limit));
        }
        if let Some(offset) = self.offset {
            node.insert("offset".into(), Value::from(offset));
        }
        if !self.relations.is_empty() {
            let relations = self
                .relations
                .iter()
                .map(|(name, child)| (name.clone(), child.body()))
                .collect();
            node.insert("relations".into(), Value::Object(relations));
        }
        Value::Object(node)
    }

    /// All field names this node references, for diagnostics.
    #[must_use]
    pub fn field_names(&self) -> &[String] {
        self.fields.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMutation {
    data: IndexMap<String, Value>,
    filters: IndexMap<String, Value>,
    response: Option<Vec<String>>,
    #[serde(rename = "as")]
    alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityMutation {
    pub entity: String,
    pub kind: MutationKind,
    pub data: IndexMap<String, Value>,
    pub filters: IndexMap<String, Value>,
    pub response: Option<Vec<String>>,
    /// Variable the result is bound to inside a transaction (`"as"`).
    pub alias: Option<String>,
}

impl EntityMutation {
    pub fn from_value(entity: &str, kind: MutationKind, value: &Value) -> Result<Self, DocumentError> {
        let raw: RawMutation = serde_json::from_value(value.clone())
            .map_err(|err| DocumentError::shape(entity, err))?;
        Ok(EntityMutation {
            entity: entity.to_string(),
            kind,
            data: raw.data,
            filters: raw.filters,
            response: raw.response,
            alias: raw.alias,
        })
    }
}

/// What the gateway does when a transaction step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnError {
    #[default]
    Rollback,
    Stop,
    Continue,
}

impl OnError {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OnError::Rollback => "rollback",
            OnError::Stop => "stop",
            OnError::Continue => "continue",
        }
    }
}

impl fmt::Display for OnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OnError {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rollback" => Ok(OnError::Rollback),
            "stop" => Ok(OnError::Stop),
            "continue" => Ok(OnError::Continue),
            other => Err(DocumentError::UnknownOnError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepDoc {
    pub mutation: EntityMutation,
    pub depends_on: Vec<String>,
    /// A failing optional step does not trigger `on_error`.
    pub optional: bool,
}

impl StepDoc {
    /// Parse `{"create": {"Person": {...}}, "as": "$person1"}`.
    fn from_value(index: usize, value: &Value) -> Result<Self, DocumentError> {
        let Some(object) = value.as_object() else {
            return Err(DocumentError::InvalidStep {
                index,
                reason: "expected an object".to_string(),
            });
        };

        let (kind, body) = object
            .iter()
            .find_map(|(key, body)| MutationKind::from_keyword(key).map(|kind| (kind, body)))
            .ok_or_else(|| DocumentError::InvalidStep {
                index,
                reason: "missing operation".to_string(),
            })?;

        let entities = body.as_object().filter(|entities| entities.len() == 1);
        let Some((entity, entity_body)) = entities.and_then(|entities| entities.iter().next())
        else {
            return Err(DocumentError::InvalidStep {
                index,
                reason: format!("'{kind}' must name exactly one entity"),
            });
        };

        let mut mutation = EntityMutation::from_value(entity, kind, entity_body)?;
        if let Some(alias) = object.get("as").and_then(Value::as_str) {
            mutation.alias = Some(alias.to_string());
        }

        let depends_on = object
            .get("depends_on")
            .and_then(Value::as_array)
            .map(|deps| {
                deps.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(StepDoc {
            mutation,
            depends_on,
            optional: object
                .get("optional")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionDoc {
    pub steps: Vec<StepDoc>,
    pub on_error: OnError,
}

impl TransactionDoc {
    pub fn from_value(value: &Value) -> Result<Self, DocumentError> {
        let steps = value
            .get("steps")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(index, step)| StepDoc::from_value(index, step))
            .collect::<Result<Vec<_>, _>>()?;

        let on_error = match value.get("on_error").and_then(Value::as_str) {
            Some(policy) => policy.parse()?,
            None => OnError::default(),
        };

        Ok(TransactionDoc { steps, on_error })
    }

    /// Aliases declared by the steps, in step order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.steps
            .iter()
            .filter_map(|step| step.mutation.alias.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_flat_and_select_layouts_agree() {
        let flat = json!({
            "filters": {"name__icontains": "a"},
            "fields": ["id", "name"],
            "limit": 10,
            "relations": {"owned_properties": {"fields": ["id"]}}
        });
        let nested = json!({
            "filters": {"name__icontains": "a"},
            "select": {
                "fields": ["id", "name"],
                "limit": 10,
                "relations": {"owned_properties": {"select": {"fields": ["id"]}}}
            }
        });

        let a = EntityQuery::from_value("Person", &flat).unwrap();
        let b = EntityQuery::from_value("Person", &nested).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.relations["owned_properties"].field_names(), ["id"]);
    }

    #[test]
    fn test_body_omits_empty_parts() {
        let query = EntityQuery::from_value("Person", &json!({"fields": ["id"], "limit": 5})).unwrap();
        insta::assert_snapshot!(query.body().to_string(), @r#"{"fields":["id"],"limit":5}"#);
    }

    #[test]
    fn test_wrong_shape_is_reported() {
        let err = EntityQuery::from_value("Person", &json!({"fields": "id"})).unwrap_err();
        assert!(matches!(err, DocumentError::InvalidShape { .. }));
    }

    #[test]
    fn test_step_parsing() {
        let doc = TransactionDoc::from_value(&json!({
            "steps": [
                {"create": {"Person": {"data": {"name": "Ann"}}}, "as": "$person1"},
                {"create": {"Property": {"data": {"owner_id": "$person1.id"}}}, "as": "$property1", "depends_on": ["$person1"], "optional": true}
            ],
            "on_error": "continue"
        }))
        .unwrap();

        assert_eq!(doc.on_error, OnError::Continue);
        assert_eq!(doc.aliases().collect::<Vec<_>>(), ["$person1", "$property1"]);
        assert_eq!(doc.steps[1].depends_on, ["$person1"]);
        assert!(doc.steps[1].optional);
        assert_eq!(doc.steps[1].mutation.entity, "Property");
    }

    #[test]
    fn test_step_without_operation() {
        let err = TransactionDoc::from_value(&json!({"steps": [{"as": "$x"}]})).unwrap_err();
        assert!(matches!(err, DocumentError::InvalidStep { index: 0, .. }));
    }
}
