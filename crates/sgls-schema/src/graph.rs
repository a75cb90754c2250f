use std::fmt;

use serde_json::Value;

use crate::model::Entity;
use crate::model::Schema;
use crate::model::SUPPORTED_OPS;
use crate::SchemaError;

/// Foreign-key names that do not follow the `<entity>_id` convention.
const REFERENCE_EXCEPTIONS: &[(&str, Option<&str>)] = &[
    ("parent", None),
    ("owner", Some("User")),
    ("author", Some("User")),
    ("created_by", Some("User")),
    ("user", Some("User")),
];

/// A dangling reference inside an otherwise loadable schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityIssue {
    pub entity: String,
    pub member: Option<String>,
    pub message: String,
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.member {
            Some(member) => write!(f, "{}.{}: {}", self.entity, member, self.message),
            None => write!(f, "{}: {}", self.entity, self.message),
        }
    }
}

impl Schema {
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        let schema: Schema = serde_json::from_str(text).map_err(SchemaError::Parse)?;
        Ok(schema.finish())
    }

    pub fn from_value(value: Value) -> Result<Self, SchemaError> {
        let schema: Schema = serde_json::from_value(value).map_err(SchemaError::Parse)?;
        Ok(schema.finish())
    }

    fn finish(mut self) -> Self {
        for (name, entity) in &mut self.entities {
            entity.name.clone_from(name);
        }
        tracing::debug!(
            entities = self.entities.len(),
            services = self.services.len(),
            "schema loaded"
        );
        self
    }

    #[must_use]
    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    #[must_use]
    pub fn contains_entity(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Follow `relations` from `root`, returning the entity at the end of
    /// the walk.
    #[must_use]
    pub fn resolve_path<'a, I>(&self, root: &str, relations: I) -> Option<&Entity>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut entity = self.entity(root)?;
        for relation in relations {
            entity = self.entity(&entity.relation(relation)?.target)?;
        }
        Some(entity)
    }

    /// Best-effort guess of the entity a foreign-key field points at.
    ///
    /// Declared references win; otherwise `<name>_id`/`<name>Id` is matched
    /// against entity names, then against a few well-known exceptions.
    #[must_use]
    pub fn infer_reference_target(&self, entity: &str, field: &str) -> Option<&str> {
        let owner = self.entity(entity)?;

        let declared = owner.relations.values().find(|relation| {
            relation
                .reference
                .as_ref()
                .is_some_and(|reference| reference.from_field == field)
        });
        if let Some(relation) = declared {
            return self
                .entities
                .get_key_value(relation.target.as_str())
                .map(|(name, _)| name.as_str());
        }

        let stem = field
            .strip_suffix("_id")
            .or_else(|| field.strip_suffix("Id"))
            .filter(|stem| !stem.is_empty())?;

        let candidate = pascal_case(stem);
        if let Some((name, _)) = self.entities.get_key_value(candidate.as_str()) {
            return Some(name.as_str());
        }

        let snake = snake_case(stem);
        let (_, target) = REFERENCE_EXCEPTIONS
            .iter()
            .find(|(exception, _)| *exception == snake)?;
        let target = target.unwrap_or(owner.name.as_str());
        self.entities
            .get_key_value(target)
            .map(|(name, _)| name.as_str())
    }

    /// Dangling names the loader tolerates but tooling may want to report.
    #[must_use]
    pub fn integrity_issues(&self) -> Vec<IntegrityIssue> {
        let mut issues = Vec::new();
        let mut push = |entity: &str, member: Option<&str>, message: String| {
            issues.push(IntegrityIssue {
                entity: entity.to_string(),
                member: member.map(str::to_string),
                message,
            });
        };

        for (name, entity) in &self.entities {
            if !entity.service.is_empty() && !self.services.contains_key(&entity.service) {
                push(name, None, format!("unknown service '{}'", entity.service));
            }
            for key in &entity.keys {
                if !entity.has_field(key) {
                    push(name, None, format!("key '{key}' is not a field"));
                }
            }
            for (field_name, field) in &entity.fields {
                for op in &field.filters {
                    if !SUPPORTED_OPS.contains(&op.as_str()) {
                        push(
                            name,
                            Some(field_name),
                            format!("unsupported filter operator '{op}'"),
                        );
                    }
                }
            }
            for (relation_name, relation) in &entity.relations {
                let Some(target) = self.entity(&relation.target) else {
                    push(
                        name,
                        Some(relation_name),
                        format!("unknown target entity '{}'", relation.target),
                    );
                    continue;
                };
                if let Some(reference) = &relation.reference {
                    if !entity.has_field(&reference.from_field) {
                        push(
                            name,
                            Some(relation_name),
                            format!("reference field '{}' is not a field", reference.from_field),
                        );
                    }
                    if !target.has_field(&reference.to_field) {
                        push(
                            name,
                            Some(relation_name),
                            format!(
                                "target field '{}' is not a field of {}",
                                reference.to_field, relation.target
                            ),
                        );
                    }
                }
            }
        }

        issues
    }
}

fn pascal_case(stem: &str) -> String {
    let mut out = String::with_capacity(stem.len());
    let mut upper = true;
    for ch in stem.chars() {
        if ch == '_' || ch == '-' {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

fn snake_case(stem: &str) -> String {
    let mut out = String::with_capacity(stem.len() + 4);
    for (i, ch) in stem.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_schema;
    use crate::Cardinality;

    #[test]
    fn test_entity_names_keep_declaration_order() {
        let schema = sample_schema();
        let names: Vec<_> = schema.entity_names().collect();
        assert_eq!(names, ["Person", "Property", "Relationship", "User"]);
        assert_eq!(schema.entity("Person").unwrap().name, "Person");
    }

    #[test]
    fn test_entity_queries() {
        let schema = sample_schema();
        let person = schema.entity("Person").unwrap();

        assert_eq!(person.required_fields(), ["name", "status"]);
        assert_eq!(
            person.sorted_field_names(),
            ["id", "age", "created_at", "name", "status"]
        );
        assert!(person.filter_keys().contains(&"name__icontains".to_string()));
        assert_eq!(
            person.relation("owned_properties").unwrap().cardinality,
            Cardinality::Many
        );
    }

    #[test]
    fn test_resolve_path_follows_relations() {
        let schema = sample_schema();
        let entity = schema
            .resolve_path("Person", ["owned_properties", "owner"])
            .unwrap();
        assert_eq!(entity.name, "Person");
        assert!(schema.resolve_path("Person", ["nope"]).is_none());
    }

    mod reference_inference {
        use super::*;

        #[test]
        fn test_declared_reference_wins() {
            let schema = sample_schema();
            assert_eq!(
                schema.infer_reference_target("Property", "owner_id"),
                Some("Person")
            );
            assert_eq!(
                schema.infer_reference_target("Relationship", "subject_id"),
                Some("Property")
            );
        }

        #[test]
        fn test_naming_convention() {
            let json = r#"{"entities": {
                "Order": {"fields": {"id": {"type": "int"}, "customer_id": {"type": "int"}, "lineItemId": {"type": "int"}}},
                "Customer": {"fields": {"id": {"type": "int"}}},
                "LineItem": {"fields": {"id": {"type": "int"}}}
            }}"#;
            let schema = Schema::from_json(json).unwrap();
            assert_eq!(
                schema.infer_reference_target("Order", "customer_id"),
                Some("Customer")
            );
            assert_eq!(
                schema.infer_reference_target("Order", "lineItemId"),
                Some("LineItem")
            );
        }

        #[test]
        fn test_exceptions() {
            let schema = sample_schema();
            assert_eq!(
                schema.infer_reference_target("Property", "parent_id"),
                Some("Property")
            );
            assert_eq!(
                schema.infer_reference_target("Property", "author_id"),
                Some("User")
            );
        }

        #[test]
        fn test_unresolvable() {
            let schema = sample_schema();
            assert_eq!(schema.infer_reference_target("Relationship", "object_id"), None);
            assert_eq!(schema.infer_reference_target("Person", "name"), None);
            assert_eq!(schema.infer_reference_target("Nope", "owner_id"), None);
        }
    }

    mod integrity {
        use super::*;

        #[test]
        fn test_sample_is_clean() {
            assert!(sample_schema().integrity_issues().is_empty());
        }

        #[test]
        fn test_dangling_names_are_reported() {
            let json = r#"{"entities": {
                "A": {
                    "service": "missing",
                    "fields": {"id": {"type": "int", "filters": ["like"]}},
                    "relations": {
                        "b": {"target": "B", "cardinality": "one"},
                        "self_ref": {"target": "A", "cardinality": "one", "ref": {"from_field": "a_id"}}
                    }
                }
            }}"#;
            let issues: Vec<String> = Schema::from_json(json)
                .unwrap()
                .integrity_issues()
                .iter()
                .map(ToString::to_string)
                .collect();
            assert_eq!(
                issues,
                [
                    "A: unknown service 'missing'",
                    "A.id: unsupported filter operator 'like'",
                    "A.b: unknown target entity 'B'",
                    "A.self_ref: reference field 'a_id' is not a field",
                ]
            );
        }
    }

    #[test]
    fn test_parse_error() {
        let err = Schema::from_json("{\"entities\": [").unwrap_err();
        assert!(matches!(err, SchemaError::Parse(_)));
    }
}
