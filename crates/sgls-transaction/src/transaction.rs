use rustc_hash::FxHashMap;
use serde_json::json;
use serde_json::Value;
use sgls_document::MutationKind;
use sgls_document::OnError;
use sgls_document::TransactionDoc;
use sgls_schema::Entity;
use sgls_schema::Schema;

use crate::references;
use crate::references::VariableRef;
use crate::Step;
use crate::StepPatch;
use crate::TransactionError;

/// An ordered list of mutation steps submitted atomically.
///
/// Every mutation re-derives the step aliases, so a step can only ever see
/// the aliases of the steps before it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    steps: Vec<Step>,
    on_error: OnError,
}

fn lookup<'a>(schema: &'a Schema, entity: &str) -> Result<&'a Entity, TransactionError> {
    schema
        .entity(entity)
        .ok_or_else(|| TransactionError::UnknownEntity(entity.to_string()))
}

impl Transaction {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a transaction from a parsed document. Aliases are re-derived
    /// and references to the document's own aliases follow them.
    pub fn from_doc(doc: &TransactionDoc, schema: &Schema) -> Result<Self, TransactionError> {
        let mut transaction = Transaction {
            steps: Vec::with_capacity(doc.steps.len()),
            on_error: doc.on_error,
        };

        for step_doc in &doc.steps {
            let mutation = &step_doc.mutation;
            lookup(schema, &mutation.entity)?;

            let mut filters = mutation.filters.clone();
            let id = filters.get("id__eq").and_then(Value::as_i64);
            if id.is_some() {
                filters.shift_remove("id__eq");
            }

            transaction.steps.push(Step {
                operation: mutation.kind,
                entity: mutation.entity.clone(),
                data: mutation.data.clone(),
                id,
                filters,
                response: mutation.response.clone().unwrap_or_default(),
                alias: mutation.alias.clone().unwrap_or_default(),
                optional: step_doc.optional,
            });
        }

        transaction.realias();
        Ok(transaction)
    }

    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    #[must_use]
    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub fn on_error(&self) -> OnError {
        self.on_error
    }

    pub fn set_on_error(&mut self, on_error: OnError) {
        self.on_error = on_error;
    }

    pub fn add_step(&mut self, entity: &str, schema: &Schema) -> Result<usize, TransactionError> {
        let index = self.steps.len();
        self.insert_step(index, entity, schema)?;
        Ok(index)
    }

    pub fn insert_step(
        &mut self,
        index: usize,
        entity: &str,
        schema: &Schema,
    ) -> Result<(), TransactionError> {
        if index > self.steps.len() {
            return Err(self.out_of_range(index));
        }
        let step = Step::new(lookup(schema, entity)?);
        self.steps.insert(index, step);
        self.realias();
        Ok(())
    }

    pub fn update_step(
        &mut self,
        index: usize,
        patch: StepPatch,
        schema: &Schema,
    ) -> Result<(), TransactionError> {
        let out_of_range = self.out_of_range(index);
        let step = self.steps.get_mut(index).ok_or(out_of_range)?;

        if let Some(entity_name) = patch.entity.filter(|name| *name != step.entity) {
            let entity = lookup(schema, &entity_name)?;
            step.entity = entity_name;
            step.data.clear();
            step.filters.clear();
            step.id = None;
            step.response = vec!["id".to_string()];
            step.fill_required(entity);
        }

        if let Some(operation) = patch.operation.filter(|op| *op != step.operation) {
            let was_delete = step.operation == MutationKind::Delete;
            step.operation = operation;
            if operation == MutationKind::Delete {
                step.data.clear();
                step.response.clear();
            } else {
                if was_delete {
                    step.response = vec!["id".to_string()];
                }
                let entity = lookup(schema, &step.entity)?;
                step.fill_required(entity);
            }
        }

        if let Some(data) = patch.data {
            if step.operation.writes_data() {
                step.data = data;
                let entity = lookup(schema, &step.entity)?;
                step.fill_required(entity);
            }
        }
        if let Some(id) = patch.id {
            step.id = id;
        }
        if let Some(filters) = patch.filters {
            step.filters = filters;
        }
        if let Some(response) = patch.response {
            if step.operation.writes_data() {
                step.response = response;
            }
        }
        if let Some(optional) = patch.optional {
            step.optional = optional;
        }

        self.realias();
        Ok(())
    }

    pub fn remove_step(&mut self, index: usize) -> Result<Step, TransactionError> {
        if index >= self.steps.len() {
            return Err(self.out_of_range(index));
        }
        let mut removed = self.steps.remove(index);
        let mut renames = FxHashMap::default();
        renames.insert(alias_name(&removed.alias).to_string(), None);
        self.realias_with(renames);
        removed.alias.clear();
        Ok(removed)
    }

    pub fn move_step(&mut self, from: usize, to: usize) -> Result<(), TransactionError> {
        if from >= self.steps.len() {
            return Err(self.out_of_range(from));
        }
        if to >= self.steps.len() {
            return Err(self.out_of_range(to));
        }
        let step = self.steps.remove(from);
        self.steps.insert(to, step);
        self.realias();
        Ok(())
    }

    /// Toggle `field` in a step's data and report whether it is now present.
    ///
    /// Required fields of full-record writes cannot be switched off; the call
    /// leaves them in place.
    pub fn toggle_data_field(
        &mut self,
        index: usize,
        field: &str,
        schema: &Schema,
    ) -> Result<bool, TransactionError> {
        let out_of_range = self.out_of_range(index);
        let step = self.steps.get_mut(index).ok_or(out_of_range)?;
        let entity = lookup(schema, &step.entity)?;
        let Some(definition) = entity.field(field) else {
            return Err(TransactionError::UnknownField {
                entity: entity.name.clone(),
                field: field.to_string(),
            });
        };
        if !step.operation.writes_data() {
            return Ok(false);
        }

        if step.data.contains_key(field) {
            if step.locks_required() && entity.is_required(field) {
                tracing::trace!(field, "required field stays selected");
                return Ok(true);
            }
            step.data.shift_remove(field);
            Ok(false)
        } else {
            step.data.insert(field.to_string(), definition.default_value());
            Ok(true)
        }
    }

    /// Set a data value. References may only name earlier steps.
    pub fn set_data_value(
        &mut self,
        index: usize,
        field: &str,
        value: Value,
        schema: &Schema,
    ) -> Result<(), TransactionError> {
        let available: Vec<String> = self
            .available_variables(index)
            .iter()
            .map(|alias| alias_name(alias).to_string())
            .collect();

        let out_of_range = self.out_of_range(index);
        let step = self.steps.get_mut(index).ok_or(out_of_range)?;
        let entity = lookup(schema, &step.entity)?;
        if !entity.has_field(field) {
            return Err(TransactionError::UnknownField {
                entity: entity.name.clone(),
                field: field.to_string(),
            });
        }

        let mut refs = Vec::new();
        references::collect(&value, &mut refs);
        if let Some(unavailable) = refs.iter().find(|r| !available.contains(&r.name)) {
            return Err(TransactionError::UnavailableVariable(format!(
                "${}",
                unavailable.name
            )));
        }

        step.data.insert(field.to_string(), value);
        Ok(())
    }

    /// Aliases a step may reference: those of strictly earlier steps.
    #[must_use]
    pub fn available_variables(&self, index: usize) -> Vec<&str> {
        self.steps
            .iter()
            .take(index)
            .map(|step| step.alias.as_str())
            .collect()
    }

    /// Values of the form `$alias.<key>` that can fill a foreign-key field.
    #[must_use]
    pub fn reference_candidates(&self, index: usize, field: &str, schema: &Schema) -> Vec<String> {
        let Some(step) = self.steps.get(index) else {
            return Vec::new();
        };
        let Some(target) = schema.infer_reference_target(&step.entity, field) else {
            return Vec::new();
        };
        let to_field = schema
            .entity(&step.entity)
            .and_then(|entity| {
                entity.relations.values().find_map(|relation| {
                    relation
                        .reference
                        .as_ref()
                        .filter(|reference| reference.from_field == field)
                })
            })
            .map_or("id", |reference| reference.to_field.as_str());

        self.steps
            .iter()
            .take(index)
            .filter(|earlier| earlier.entity == target && earlier.operation.writes_data())
            .map(|earlier| format!("{}.{to_field}", earlier.alias))
            .collect()
    }

    /// Messages blocking submission, in step order.
    #[must_use]
    pub fn validate(&self, schema: &Schema) -> Vec<String> {
        let mut messages = Vec::new();
        if self.steps.is_empty() {
            messages.push("Transaction has no steps".to_string());
        }

        for (index, step) in self.steps.iter().enumerate() {
            let label = format!("Step {} ({} {})", index + 1, step.operation, step.entity);
            let Some(entity) = schema.entity(&step.entity) else {
                messages.push(format!("{label}: unknown entity '{}'", step.entity));
                continue;
            };

            if step.locks_required() {
                for field in entity.required_fields() {
                    if is_blank(step.data.get(field)) {
                        messages.push(format!("{label}: missing required field '{field}'"));
                    }
                }
            }

            if step.operation.targets_existing() && step.id.is_none() && step.filters.is_empty() {
                messages.push(format!("{label}: {} requires an id or filters", step.operation));
            }

            let mut refs = Vec::new();
            for value in step.data.values().chain(step.filters.values()) {
                references::collect(value, &mut refs);
            }
            for reference in refs {
                if let Some(message) = self.check_reference(index, &reference, schema) {
                    messages.push(format!("{label}: {message}"));
                }
            }
        }

        messages
    }

    fn check_reference(&self, index: usize, reference: &VariableRef, schema: &Schema) -> Option<String> {
        let position = self
            .steps
            .iter()
            .position(|step| alias_name(&step.alias) == reference.name);
        match position {
            None => Some(format!("unknown variable '${}'", reference.name)),
            Some(position) if position >= index => {
                Some(format!("'${}' is not defined before this step", reference.name))
            }
            Some(position) => {
                let field = reference.field.as_deref()?;
                let target = schema.entity(&self.steps[position].entity)?;
                (!target.has_field(field))
                    .then(|| format!("'${}' has no field '{field}'", reference.name))
            }
        }
    }

    /// The transaction document sent to the gateway.
    #[must_use]
    pub fn to_document(&self) -> Value {
        let steps: Vec<Value> = self.steps.iter().map(Step::to_value).collect();
        json!({
            "transaction": {
                "steps": steps,
                "on_error": self.on_error.as_str(),
            }
        })
    }

    /// Validate, then build the document; refuses while anything is invalid.
    pub fn prepare_submission(&self, schema: &Schema) -> Result<Value, TransactionError> {
        let messages = self.validate(schema);
        if !messages.is_empty() {
            return Err(TransactionError::Invalid(messages));
        }
        Ok(self.to_document())
    }

    fn out_of_range(&self, index: usize) -> TransactionError {
        TransactionError::StepOutOfRange {
            index,
            len: self.steps.len(),
        }
    }

    fn realias(&mut self) {
        self.realias_with(FxHashMap::default());
    }

    /// Re-derive every alias from position, then rewrite references so they
    /// keep pointing at the same steps.
    fn realias_with(&mut self, mut renames: FxHashMap<String, Option<String>>) {
        let mut ordinals: FxHashMap<String, usize> = FxHashMap::default();
        for step in &mut self.steps {
            let base = step.entity.to_lowercase();
            let ordinal = ordinals.entry(base.clone()).or_insert(0);
            *ordinal += 1;
            let alias = format!("${base}{ordinal}");
            if !step.alias.is_empty() && step.alias != alias {
                renames.insert(
                    alias_name(&step.alias).to_string(),
                    Some(alias_name(&alias).to_string()),
                );
            }
            step.alias = alias;
        }

        if renames.is_empty() {
            return;
        }
        tracing::debug!(renamed = renames.len(), "step aliases changed");
        for step in &mut self.steps {
            for value in step.data.values_mut().chain(step.filters.values_mut()) {
                references::remap(value, &renames);
            }
        }
    }
}

fn alias_name(alias: &str) -> &str {
    alias.strip_prefix('$').unwrap_or(alias)
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.trim().is_empty(),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use sgls_schema::testing::sample_schema;

    use super::*;

    fn aliases(transaction: &Transaction) -> Vec<&str> {
        transaction.steps().iter().map(Step::alias).collect()
    }

    mod aliases {
        use super::*;

        #[test]
        fn test_alias_derivation() {
            let schema = sample_schema();
            let mut tx = Transaction::new();
            tx.add_step("Person", &schema).unwrap();
            tx.add_step("Person", &schema).unwrap();
            tx.add_step("Property", &schema).unwrap();

            assert_eq!(aliases(&tx), ["$person1", "$person2", "$property1"]);
        }

        #[test]
        fn test_aliases_follow_position() {
            let schema = sample_schema();
            let mut tx = Transaction::new();
            tx.add_step("Person", &schema).unwrap();
            tx.add_step("Property", &schema).unwrap();
            tx.insert_step(0, "Person", &schema).unwrap();
            assert_eq!(aliases(&tx), ["$person1", "$person2", "$property1"]);

            tx.move_step(2, 0).unwrap();
            assert_eq!(aliases(&tx), ["$property1", "$person1", "$person2"]);

            tx.remove_step(1).unwrap();
            assert_eq!(aliases(&tx), ["$property1", "$person1"]);
        }

        #[test]
        fn test_references_follow_renamed_steps() {
            let schema = sample_schema();
            let mut tx = Transaction::new();
            tx.add_step("Person", &schema).unwrap();
            tx.add_step("Person", &schema).unwrap();
            tx.add_step("Property", &schema).unwrap();
            tx.set_data_value(2, "owner_id", Value::from("$person2.id"), &schema)
                .unwrap();

            tx.remove_step(0).unwrap();
            assert_eq!(tx.steps()[1].data()["owner_id"], "$person1.id");
        }

        #[test]
        fn test_references_to_removed_steps_are_cleared() {
            let schema = sample_schema();
            let mut tx = Transaction::new();
            tx.add_step("Person", &schema).unwrap();
            tx.add_step("Property", &schema).unwrap();
            tx.set_data_value(1, "owner_id", Value::from("$person1.id"), &schema)
                .unwrap();

            tx.remove_step(0).unwrap();
            assert_eq!(tx.steps()[0].data()["owner_id"], Value::Null);
        }
    }

    mod variables {
        use super::*;

        #[test]
        fn test_forward_reference_prevention() {
            let schema = sample_schema();
            let mut tx = Transaction::new();
            for entity in ["Person", "Property", "Relationship"] {
                tx.add_step(entity, &schema).unwrap();
            }

            assert_eq!(tx.available_variables(0), Vec::<&str>::new());
            assert_eq!(tx.available_variables(1), ["$person1"]);
            assert_eq!(tx.available_variables(2), ["$person1", "$property1"]);
        }

        #[test]
        fn test_set_data_value_rejects_later_steps() {
            let schema = sample_schema();
            let mut tx = Transaction::new();
            tx.add_step("Property", &schema).unwrap();
            tx.add_step("Person", &schema).unwrap();

            let err = tx
                .set_data_value(0, "owner_id", Value::from("$person1.id"), &schema)
                .unwrap_err();
            assert_eq!(err, TransactionError::UnavailableVariable("$person1".to_string()));
        }

        #[test]
        fn test_reference_candidates() {
            let schema = sample_schema();
            let mut tx = Transaction::new();
            tx.add_step("Person", &schema).unwrap();
            tx.add_step("Property", &schema).unwrap();
            tx.add_step("Relationship", &schema).unwrap();

            assert_eq!(
                tx.reference_candidates(1, "owner_id", &schema),
                ["$person1.id"]
            );
            assert_eq!(
                tx.reference_candidates(2, "subject_id", &schema),
                ["$property1.id"]
            );
            assert!(tx.reference_candidates(0, "owner_id", &schema).is_empty());
            assert!(tx.reference_candidates(2, "object_id", &schema).is_empty());
        }
    }

    mod operations {
        use super::*;

        #[test]
        fn test_new_step_has_required_defaults() {
            let schema = sample_schema();
            let mut tx = Transaction::new();
            tx.add_step("Person", &schema).unwrap();

            let step = &tx.steps()[0];
            assert_eq!(step.operation(), MutationKind::Create);
            assert_eq!(step.data()["name"], "");
            assert_eq!(step.data()["status"], "active");
            assert_eq!(step.response(), ["id"]);
        }

        #[test]
        fn test_required_field_lock() {
            let schema = sample_schema();
            let mut tx = Transaction::new();
            tx.add_step("Person", &schema).unwrap();

            let present = tx.toggle_data_field(0, "name", &schema).unwrap();
            assert!(present);
            assert!(tx.steps()[0].data().contains_key("name"));
        }

        #[test]
        fn test_optional_field_toggles() {
            let schema = sample_schema();
            let mut tx = Transaction::new();
            tx.add_step("Person", &schema).unwrap();

            assert!(tx.toggle_data_field(0, "age", &schema).unwrap());
            assert_eq!(tx.steps()[0].data()["age"], 0);
            assert!(!tx.toggle_data_field(0, "age", &schema).unwrap());
            assert!(!tx.steps()[0].data().contains_key("age"));
        }

        #[test]
        fn test_unknown_field() {
            let schema = sample_schema();
            let mut tx = Transaction::new();
            tx.add_step("Person", &schema).unwrap();
            assert!(matches!(
                tx.toggle_data_field(0, "email", &schema),
                Err(TransactionError::UnknownField { .. })
            ));
        }

        #[test]
        fn test_switch_to_delete_and_back() {
            let schema = sample_schema();
            let mut tx = Transaction::new();
            tx.add_step("Person", &schema).unwrap();

            tx.update_step(0, StepPatch::operation(MutationKind::Delete), &schema)
                .unwrap();
            assert!(tx.steps()[0].data().is_empty());
            assert!(tx.steps()[0].response().is_empty());
            assert_eq!(
                tx.validate(&schema),
                ["Step 1 (delete Person): delete requires an id or filters"]
            );

            tx.update_step(0, StepPatch::id(7), &schema).unwrap();
            assert!(tx.validate(&schema).is_empty());

            tx.update_step(0, StepPatch::operation(MutationKind::Create), &schema)
                .unwrap();
            assert_eq!(
                tx.steps()[0].data().keys().collect::<Vec<_>>(),
                ["name", "status"]
            );
            assert_eq!(tx.steps()[0].response(), ["id"]);
        }

        #[test]
        fn test_entity_change_resets_step() {
            let schema = sample_schema();
            let mut tx = Transaction::new();
            tx.add_step("Person", &schema).unwrap();
            tx.update_step(0, StepPatch::entity("User"), &schema).unwrap();

            let step = &tx.steps()[0];
            assert_eq!(step.entity(), "User");
            assert_eq!(step.alias(), "$user1");
            assert_eq!(step.data().keys().collect::<Vec<_>>(), ["email"]);
        }

        #[test]
        fn test_data_patch_keeps_required_fields() {
            let schema = sample_schema();
            let mut tx = Transaction::new();
            tx.add_step("Person", &schema).unwrap();
            let data = [("age".to_string(), Value::from(30))].into_iter().collect();
            tx.update_step(
                0,
                StepPatch {
                    data: Some(data),
                    ..StepPatch::default()
                },
                &schema,
            )
            .unwrap();
            assert_eq!(
                tx.steps()[0].data().keys().collect::<Vec<_>>(),
                ["age", "name", "status"]
            );
        }

        #[test]
        fn test_out_of_range() {
            let schema = sample_schema();
            let mut tx = Transaction::new();
            assert_eq!(
                tx.remove_step(0).unwrap_err(),
                TransactionError::StepOutOfRange { index: 0, len: 0 }
            );
            assert_eq!(
                tx.add_step("Nope", &schema).unwrap_err(),
                TransactionError::UnknownEntity("Nope".to_string())
            );
        }
    }

    mod submission {
        use super::*;

        fn filled(schema: &Schema) -> Transaction {
            let mut tx = Transaction::new();
            tx.add_step("Person", schema).unwrap();
            tx.set_data_value(0, "name", Value::from("Ann"), schema).unwrap();
            tx.add_step("Property", schema).unwrap();
            tx.set_data_value(1, "address", Value::from("1 Main St"), schema)
                .unwrap();
            tx.set_data_value(1, "owner_id", Value::from("$person1.id"), schema)
                .unwrap();
            tx
        }

        #[test]
        fn test_missing_required_values_block_submission() {
            let schema = sample_schema();
            let mut tx = Transaction::new();
            tx.add_step("Person", &schema).unwrap();

            let err = tx.prepare_submission(&schema).unwrap_err();
            assert_eq!(
                err,
                TransactionError::Invalid(vec![
                    "Step 1 (create Person): missing required field 'name'".to_string()
                ])
            );
        }

        #[test]
        fn test_reference_problems() {
            let schema = sample_schema();
            let mut tx = filled(&schema);
            tx.move_step(1, 0).unwrap();
            tx.update_step(
                0,
                StepPatch {
                    filters: Some([("note".to_string(), Value::from("$ghost"))].into_iter().collect()),
                    ..StepPatch::default()
                },
                &schema,
            )
            .unwrap();

            assert_eq!(
                tx.validate(&schema),
                [
                    "Step 1 (create Property): '$person1' is not defined before this step",
                    "Step 1 (create Property): unknown variable '$ghost'",
                ]
            );
        }

        #[test]
        fn test_reference_to_missing_field() {
            let schema = sample_schema();
            let mut tx = filled(&schema);
            tx.set_data_value(1, "owner_id", Value::from("$person1.email"), &schema)
                .unwrap();
            assert_eq!(
                tx.validate(&schema),
                ["Step 2 (create Property): '$person1' has no field 'email'"]
            );
        }

        #[test]
        fn test_document_shape() {
            let schema = sample_schema();
            let mut tx = filled(&schema);
            tx.add_step("Person", &schema).unwrap();
            tx.update_step(2, StepPatch::operation(MutationKind::Delete), &schema)
                .unwrap();
            tx.update_step(2, StepPatch::id(9), &schema).unwrap();
            tx.set_on_error(OnError::Stop);

            let document = tx.prepare_submission(&schema).unwrap();
            insta::assert_snapshot!(serde_json::to_string_pretty(&document).unwrap(), @r#"
            {
              "transaction": {
                "steps": [
                  {
                    "create": {
                      "Person": {
                        "data": {
                          "name": "Ann",
                          "status": "active"
                        },
                        "response": [
                          "id"
                        ]
                      }
                    },
                    "as": "$person1"
                  },
                  {
                    "create": {
                      "Property": {
                        "data": {
                          "address": "1 Main St",
                          "owner_id": "$person1.id"
                        },
                        "response": [
                          "id"
                        ]
                      }
                    },
                    "as": "$property1"
                  },
                  {
                    "delete": {
                      "Person": {
                        "filters": {
                          "id__eq": 9
                        }
                      }
                    },
                    "as": "$person2"
                  }
                ],
                "on_error": "stop"
              }
            }
            "#);
        }

        #[test]
        fn test_round_trip_through_document() {
            let schema = sample_schema();
            let tx = filled(&schema);
            let document = tx.to_document();
            let doc = match sgls_document::Document::from_value(&document).unwrap() {
                sgls_document::Document::Transaction(doc) => doc,
                other => panic!("expected a transaction, got {other:?}"),
            };
            assert_eq!(Transaction::from_doc(&doc, &schema).unwrap(), tx);
        }

        #[test]
        fn test_from_doc_rederives_aliases() {
            let schema = sample_schema();
            let doc = sgls_document::TransactionDoc::from_value(&serde_json::json!({
                "steps": [
                    {"create": {"Person": {"data": {"name": "A", "status": "active"}}}, "as": "$owner"},
                    {"update": {"Property": {"filters": {"id__eq": 3}, "data": {"owner_id": "$owner.id"}}}, "as": "$p"}
                ]
            }))
            .unwrap();

            let tx = Transaction::from_doc(&doc, &schema).unwrap();
            assert_eq!(aliases(&tx), ["$person1", "$property1"]);
            assert_eq!(tx.steps()[1].id(), Some(3));
            assert_eq!(tx.steps()[1].data()["owner_id"], "$person1.id");
            assert!(tx.validate(&schema).is_empty());
        }
    }
}
