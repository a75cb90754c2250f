use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

/// Filter operators the gateway understands, in the order they are offered.
pub const SUPPORTED_OPS: &[&str] = &["eq", "in", "icontains", "gte", "lte", "isnull"];

/// The entity graph published by the gateway.
///
/// Maps keep declaration order, which drives the order of synthesized
/// relations and of completion candidates.
#[derive(Debug, Clone, Deserialize)]
pub struct Schema {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub services: IndexMap<String, Service>,
    pub entities: IndexMap<String, Entity>,
}

fn default_version() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entity {
    /// Filled from the map key after loading.
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub service: String,
    #[serde(default = "default_keys", alias = "primaryKeys")]
    pub keys: Vec<String>,
    #[serde(default)]
    pub fields: IndexMap<String, Field>,
    #[serde(default)]
    pub relations: IndexMap<String, Relation>,
    #[serde(default)]
    pub access: Option<AccessPolicy>,
}

fn default_keys() -> Vec<String> {
    vec!["id".to_string()]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Float,
    String,
    Bool,
    Date,
    Datetime,
    Json,
    Enum,
    Other(String),
}

impl FieldType {
    fn parse(raw: &str) -> Self {
        match raw {
            "int" | "integer" => FieldType::Int,
            "float" | "number" => FieldType::Float,
            "string" | "str" | "text" => FieldType::String,
            "bool" | "boolean" => FieldType::Bool,
            "date" => FieldType::Date,
            "datetime" => FieldType::Datetime,
            "json" => FieldType::Json,
            "enum" => FieldType::Enum,
            other => FieldType::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::String => "string",
            FieldType::Bool => "bool",
            FieldType::Date => "date",
            FieldType::Datetime => "datetime",
            FieldType::Json => "json",
            FieldType::Enum => "enum",
            FieldType::Other(name) => name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawField {
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    nullable: Option<bool>,
    #[serde(default)]
    sortable: bool,
    #[serde(default, alias = "enum", alias = "enumValues")]
    enum_values: Option<Vec<String>>,
    #[serde(default, alias = "filterOps")]
    filters: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(from = "RawField")]
pub struct Field {
    pub ty: FieldType,
    pub nullable: bool,
    pub sortable: bool,
    pub enum_values: Option<Vec<String>>,
    pub filters: Vec<String>,
}

impl From<RawField> for Field {
    fn from(raw: RawField) -> Self {
        // "string?" is shorthand for a nullable string.
        let (ty, optional) = match raw.ty.strip_suffix('?') {
            Some(base) => (base, true),
            None => (raw.ty.as_str(), false),
        };
        Field {
            ty: FieldType::parse(ty),
            nullable: optional || raw.nullable.unwrap_or(true),
            sortable: raw.sortable,
            enum_values: raw.enum_values,
            filters: raw.filters,
        }
    }
}

impl Field {
    #[must_use]
    pub fn allows(&self, op: &str) -> bool {
        self.filters.iter().any(|allowed| allowed == op)
    }

    #[must_use]
    pub fn enum_values(&self) -> &[String] {
        self.enum_values.as_deref().unwrap_or_default()
    }

    /// Placeholder used when a template has to fill in this field.
    #[must_use]
    pub fn default_value(&self) -> Value {
        match self.ty {
            FieldType::Int => Value::from(0),
            FieldType::Float => Value::from(0.0),
            FieldType::Bool => Value::Bool(false),
            FieldType::Json => Value::Object(serde_json::Map::new()),
            FieldType::Enum => self
                .enum_values()
                .first()
                .map_or_else(|| Value::String(String::new()), |v| Value::String(v.clone())),
            FieldType::String
            | FieldType::Date
            | FieldType::Datetime
            | FieldType::Other(_) => Value::String(String::new()),
        }
    }

    /// Short description shown next to completion candidates.
    #[must_use]
    pub fn describe(&self) -> String {
        if self.nullable {
            format!("{}?", self.ty.as_str())
        } else {
            self.ty.as_str().to_string()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    Many,
}

impl Cardinality {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Cardinality::One => "one",
            Cardinality::Many => "many",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Relation {
    pub target: String,
    pub cardinality: Cardinality,
    #[serde(default, rename = "ref", alias = "reference", alias = "referenceInfo")]
    pub reference: Option<Reference>,
    #[serde(default, alias = "throughInfo")]
    pub through: Option<Through>,
}

/// A direct foreign key: `from_field` on this entity points at `to_field`
/// on the target.
#[derive(Debug, Clone, Deserialize)]
pub struct Reference {
    #[serde(alias = "fromField")]
    pub from_field: String,
    #[serde(default = "default_to_field", alias = "toField")]
    pub to_field: String,
}

fn default_to_field() -> String {
    "id".to_string()
}

/// A relation resolved through an intermediate link model.
#[derive(Debug, Clone, Deserialize)]
pub struct Through {
    pub model: String,
    pub relationship_type: String,
    pub parent_match_field: String,
    pub target_key_field: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStrategy {
    #[default]
    None,
    Direct,
    ViaRelations,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessPolicy {
    #[serde(default)]
    pub tenant_strategy: TenantStrategy,
    #[serde(default)]
    pub tenant_field: Option<String>,
}

impl Entity {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    #[must_use]
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.get(name)
    }

    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Fields a create must supply: not nullable, and not `id`.
    #[must_use]
    pub fn required_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(name, field)| !field.nullable && name.as_str() != "id")
            .map(|(name, _)| name.as_str())
            .collect()
    }

    #[must_use]
    pub fn is_required(&self, name: &str) -> bool {
        name != "id" && self.field(name).is_some_and(|field| !field.nullable)
    }

    /// Field names with `id` first, the rest alphabetical.
    #[must_use]
    pub fn sorted_field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.fields.keys().map(String::as_str).collect();
        names.sort_by(|a, b| (*a != "id", *a).cmp(&(*b != "id", *b)));
        names
    }

    /// Every `field__op` key this entity accepts, in declaration order.
    #[must_use]
    pub fn filter_keys(&self) -> Vec<String> {
        self.fields
            .iter()
            .flat_map(|(name, field)| field.filters.iter().map(move |op| format!("{name}__{op}")))
            .collect()
    }
}

/// Split a filter key into field and operator. Keys without `__` mean `eq`.
#[must_use]
pub fn split_filter_key(key: &str) -> (&str, &str) {
    key.rsplit_once("__").unwrap_or((key, "eq"))
}
