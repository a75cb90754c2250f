use indexmap::IndexMap;
use serde_json::Map;
use serde_json::Value;
use sgls_document::MutationKind;
use sgls_schema::Entity;

/// One mutation inside a transaction.
///
/// The alias is owned by the [`Transaction`](crate::Transaction) and is
/// rewritten whenever steps move; there is no setter.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub(crate) operation: MutationKind,
    pub(crate) entity: String,
    pub(crate) data: IndexMap<String, Value>,
    pub(crate) id: Option<i64>,
    pub(crate) filters: IndexMap<String, Value>,
    pub(crate) response: Vec<String>,
    pub(crate) alias: String,
    pub(crate) optional: bool,
}

impl Step {
    /// A create step pre-filled with defaults for every required field.
    pub(crate) fn new(entity: &Entity) -> Self {
        let mut step = Step {
            operation: MutationKind::Create,
            entity: entity.name.clone(),
            data: IndexMap::new(),
            id: None,
            filters: IndexMap::new(),
            response: vec!["id".to_string()],
            alias: String::new(),
            optional: false,
        };
        step.fill_required(entity);
        step
    }

    #[must_use]
    pub fn operation(&self) -> MutationKind {
        self.operation
    }

    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    #[must_use]
    pub fn data(&self) -> &IndexMap<String, Value> {
        &self.data
    }

    #[must_use]
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    #[must_use]
    pub fn filters(&self) -> &IndexMap<String, Value> {
        &self.filters
    }

    #[must_use]
    pub fn response(&self) -> &[String] {
        &self.response
    }

    /// `$<entity><ordinal>`, e.g. `$person2`.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    #[must_use]
    pub fn optional(&self) -> bool {
        self.optional
    }

    /// Operations that write a whole record keep every required field.
    pub(crate) fn locks_required(&self) -> bool {
        matches!(
            self.operation,
            MutationKind::Create | MutationKind::GetOrCreate | MutationKind::Rewrite
        )
    }

    pub(crate) fn fill_required(&mut self, entity: &Entity) {
        if !self.locks_required() {
            return;
        }
        for name in entity.required_fields() {
            if !self.data.contains_key(name) {
                if let Some(field) = entity.field(name) {
                    self.data.insert(name.to_string(), field.default_value());
                }
            }
        }
    }

    /// Filters as sent to the gateway, with the id folded in as `id__eq`.
    pub(crate) fn effective_filters(&self) -> Map<String, Value> {
        let mut filters = Map::new();
        if let Some(id) = self.id.filter(|_| self.operation.targets_existing()) {
            filters.insert("id__eq".to_string(), Value::from(id));
        }
        for (key, value) in &self.filters {
            filters.entry(key.clone()).or_insert_with(|| value.clone());
        }
        filters
    }

    pub(crate) fn to_value(&self) -> Value {
        let mut body = Map::new();
        if self.operation.writes_data() {
            body.insert(
                "data".to_string(),
                Value::Object(self.data.clone().into_iter().collect()),
            );
        }
        let filters = self.effective_filters();
        if !filters.is_empty() {
            body.insert("filters".to_string(), Value::Object(filters));
        }
        if self.operation.writes_data() && !self.response.is_empty() {
            body.insert("response".to_string(), Value::from(self.response.clone()));
        }

        let mut entity = Map::new();
        entity.insert(self.entity.clone(), Value::Object(body));

        let mut step = Map::new();
        step.insert(self.operation.as_str().to_string(), Value::Object(entity));
        step.insert("as".to_string(), Value::String(self.alias.clone()));
        if self.optional {
            step.insert("optional".to_string(), Value::Bool(true));
        }
        Value::Object(step)
    }
}

/// Changes to apply to a step. `None` leaves the part untouched.
#[derive(Debug, Clone, Default)]
pub struct StepPatch {
    pub operation: Option<MutationKind>,
    pub entity: Option<String>,
    pub data: Option<IndexMap<String, Value>>,
    /// `Some(None)` clears the id.
    pub id: Option<Option<i64>>,
    pub filters: Option<IndexMap<String, Value>>,
    pub response: Option<Vec<String>>,
    pub optional: Option<bool>,
}

impl StepPatch {
    #[must_use]
    pub fn operation(operation: MutationKind) -> Self {
        StepPatch {
            operation: Some(operation),
            ..StepPatch::default()
        }
    }

    #[must_use]
    pub fn entity(entity: impl Into<String>) -> Self {
        StepPatch {
            entity: Some(entity.into()),
            ..StepPatch::default()
        }
    }

    #[must_use]
    pub fn id(id: i64) -> Self {
        StepPatch {
            id: Some(Some(id)),
            ..StepPatch::default()
        }
    }
}
