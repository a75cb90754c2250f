//! Completion candidates for a detected cursor context.

use serde_json::Value;
use sgls_builder::template;
use sgls_builder::SynthesisOptions;
use sgls_document::keywords;
use sgls_document::Mode;
use sgls_document::MutationKind;
use sgls_schema::split_filter_key;
use sgls_schema::Entity;
use sgls_schema::Schema;
use sgls_source::LineIndex;
use sgls_source::PositionEncoding;
use sgls_source::Span;
use tower_lsp_server::ls_types;

use crate::context::CompletionContext;
use crate::context::ContextKind;
use crate::context::Slot;
use crate::ext::SpanExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionKind {
    Entity,
    Field,
    Filter,
    Relation,
    Keyword,
    Value,
    Variable,
    Operation,
}

impl SuggestionKind {
    fn to_lsp(self) -> ls_types::CompletionItemKind {
        match self {
            SuggestionKind::Entity => ls_types::CompletionItemKind::CLASS,
            SuggestionKind::Field => ls_types::CompletionItemKind::FIELD,
            SuggestionKind::Filter => ls_types::CompletionItemKind::OPERATOR,
            SuggestionKind::Relation => ls_types::CompletionItemKind::REFERENCE,
            SuggestionKind::Keyword => ls_types::CompletionItemKind::KEYWORD,
            SuggestionKind::Value => ls_types::CompletionItemKind::ENUM_MEMBER,
            SuggestionKind::Variable => ls_types::CompletionItemKind::VARIABLE,
            SuggestionKind::Operation => ls_types::CompletionItemKind::FUNCTION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub span: Span,
    pub new_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub label: String,
    pub insert_text: String,
    pub detail: Option<String>,
    pub sort_text: String,
    pub kind: SuggestionKind,
    pub replace: Span,
    /// Edits elsewhere in the document, such as a missing `,` after the
    /// previous entry.
    pub additional_edits: Vec<TextEdit>,
}

/// A suggestion before it is placed in the document.
struct Candidate {
    label: String,
    /// Inserted when the cursor is not inside a string.
    fragment: String,
    detail: Option<String>,
    kind: SuggestionKind,
}

impl Candidate {
    fn new(label: impl Into<String>, fragment: impl Into<String>, kind: SuggestionKind) -> Self {
        Self {
            label: label.into(),
            fragment: fragment.into(),
            detail: None,
            kind,
        }
    }

    /// `"label"` as an array element or string value.
    fn quoted(label: &str, kind: SuggestionKind) -> Self {
        Self::new(label, quote(label), kind)
    }

    /// `"label": value` as an object entry.
    fn entry(label: &str, value: &Value, kind: SuggestionKind) -> Self {
        Self::new(label, format!("{}: {value}", quote(label)), kind)
    }

    fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    fn relabel(mut self, label: &str) -> Self {
        label.clone_into(&mut self.label);
        self
    }
}

fn quote(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

/// Candidates for `context`, ordered best first.
///
/// Inside an open string the typed prefix filters the list and only the bare
/// label is inserted over it, so quotes are never doubled. Root query
/// templates carry the row limit from `options`.
#[must_use]
pub fn complete(
    context: &CompletionContext,
    schema: &Schema,
    mode: Mode,
    options: &SynthesisOptions,
) -> Vec<Suggestion> {
    let candidates = match &context.kind {
        ContextKind::RootLevel => root_candidates(schema, mode, options),
        ContextKind::MutationWrapper { operation } => entity_candidates(schema, *operation),
        ContextKind::EntityBody { .. } => body_candidates(context.operation),
        ContextKind::FieldsArray { .. } => context
            .target(schema)
            .map(field_candidates)
            .unwrap_or_default(),
        ContextKind::FiltersMap { value_of, .. } => match (context.target(schema), value_of) {
            (Some(entity), None) => filter_candidates(entity),
            (Some(entity), Some(key)) => filter_value_candidates(entity, key),
            (None, _) => Vec::new(),
        },
        ContextKind::RelationsMap { .. } => context
            .target(schema)
            .map(relation_candidates)
            .unwrap_or_default(),
        ContextKind::DataMap { value_of, .. } => match (context.target(schema), value_of) {
            (Some(entity), None) => data_candidates(entity, context.operation, mode),
            (Some(entity), Some(field)) => {
                data_value_candidates(schema, entity, field, &context.aliases)
            }
            (None, _) => Vec::new(),
        },
        ContextKind::TransactionStepBoundary => step_candidates(&context.slot),
        ContextKind::UnterminatedString | ContextKind::Unknown => Vec::new(),
    };

    place(context, candidates)
}

fn place(context: &CompletionContext, candidates: Vec<Candidate>) -> Vec<Suggestion> {
    let in_string = context.open_string.is_some();
    let partial = context.partial().to_lowercase();
    let replace = context.replace_span();

    let additional_edits: Vec<TextEdit> = match (&context.slot, context.separator_at) {
        (Slot::Key | Slot::Element, Some(at)) => vec![TextEdit {
            span: Span::empty(at),
            new_text: ",".to_string(),
        }],
        _ => Vec::new(),
    };

    candidates
        .into_iter()
        .filter(|candidate| !in_string || candidate.label.to_lowercase().starts_with(&partial))
        .enumerate()
        .map(|(rank, candidate)| Suggestion {
            insert_text: if in_string {
                candidate.label.clone()
            } else {
                candidate.fragment
            },
            label: candidate.label,
            detail: candidate.detail,
            sort_text: format!("{rank:04}"),
            kind: candidate.kind,
            replace,
            additional_edits: additional_edits.clone(),
        })
        .collect()
}

fn root_candidates(schema: &Schema, mode: Mode, options: &SynthesisOptions) -> Vec<Candidate> {
    if mode == Mode::Transaction {
        let body = serde_json::json!({"steps": [], "on_error": "rollback"});
        return vec![Candidate::entry("transaction", &body, SuggestionKind::Keyword)];
    }

    if let Some(operation) = mode.mutation() {
        return schema
            .entity_names()
            .filter_map(|name| schema.entity(name))
            .map(|entity| {
                let body = serde_json::json!({
                    entity.name.as_str(): template::mutation_skeleton(operation, entity)
                });
                Candidate::entry(operation.as_str(), &body, SuggestionKind::Entity)
                    .relabel(&entity.name)
                    .detail(format!("{} {}", operation.as_str(), entity.name))
            })
            .collect();
    }

    let skeleton = template::query_skeleton(options);
    schema
        .entity_names()
        .filter_map(|name| schema.entity(name))
        .map(|entity| {
            Candidate::entry(&entity.name, &skeleton, SuggestionKind::Entity).detail(&entity.service)
        })
        .collect()
}

fn entity_candidates(schema: &Schema, operation: MutationKind) -> Vec<Candidate> {
    schema
        .entity_names()
        .filter_map(|name| schema.entity(name))
        .map(|entity| {
            let body = template::mutation_skeleton(operation, entity);
            Candidate::entry(&entity.name, &body, SuggestionKind::Entity).detail(&entity.service)
        })
        .collect()
}

fn body_candidates(operation: Option<MutationKind>) -> Vec<Candidate> {
    let keys: &[&str] = match operation {
        Some(MutationKind::Delete) => &["filters"],
        Some(_) => keywords::MUTATION_BODY_KEYS,
        None => keywords::QUERY_BODY_KEYS,
    };

    keys.iter()
        .map(|&key| {
            let value = match key {
                "fields" | "response" => serde_json::json!(["id"]),
                "order" => serde_json::json!([]),
                "limit" => Value::from(sgls_builder::DEFAULT_LIMIT),
                "offset" => Value::from(0),
                _ => serde_json::json!({}),
            };
            Candidate::entry(key, &value, SuggestionKind::Keyword)
        })
        .collect()
}

fn field_candidates(entity: &Entity) -> Vec<Candidate> {
    entity
        .sorted_field_names()
        .into_iter()
        .filter_map(|name| {
            let field = entity.field(name)?;
            Some(Candidate::quoted(name, SuggestionKind::Field).detail(field.describe()))
        })
        .collect()
}

fn filter_candidates(entity: &Entity) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    for name in entity.sorted_field_names() {
        let Some(field) = entity.field(name) else {
            continue;
        };
        for op in &field.filters {
            let value = match op.as_str() {
                "in" => serde_json::json!([]),
                "isnull" => Value::Bool(true),
                _ => field.default_value(),
            };
            candidates.push(
                Candidate::entry(&format!("{name}__{op}"), &value, SuggestionKind::Filter)
                    .detail(field.describe()),
            );
        }
    }
    candidates
}

fn filter_value_candidates(entity: &Entity, key: &str) -> Vec<Candidate> {
    let (name, op) = split_filter_key(key);
    if op == "in" || op == "isnull" {
        return Vec::new();
    }
    entity
        .field(name)
        .map(|field| enum_candidates(field.enum_values()))
        .unwrap_or_default()
}

fn enum_candidates(values: &[String]) -> Vec<Candidate> {
    values
        .iter()
        .map(|value| Candidate::quoted(value, SuggestionKind::Value))
        .collect()
}

fn relation_candidates(entity: &Entity) -> Vec<Candidate> {
    let stub = serde_json::json!({"fields": ["id"]});
    entity
        .relations
        .iter()
        .map(|(name, relation)| {
            Candidate::entry(name, &stub, SuggestionKind::Relation).detail(format!(
                "{} {}",
                relation.cardinality.as_str(),
                relation.target
            ))
        })
        .collect()
}

fn data_candidates(entity: &Entity, operation: Option<MutationKind>, mode: Mode) -> Vec<Candidate> {
    let creating = match operation {
        Some(operation) => matches!(operation, MutationKind::Create | MutationKind::GetOrCreate),
        None => mode == Mode::Create,
    };

    let mut names: Vec<&str> = entity.required_fields();
    names.extend(
        entity
            .sorted_field_names()
            .into_iter()
            .filter(|name| !entity.is_required(name)),
    );

    names
        .into_iter()
        .filter(|name| !(creating && *name == "id"))
        .filter_map(|name| {
            let field = entity.field(name)?;
            let detail = if entity.is_required(name) {
                format!("{} (required)", field.describe())
            } else {
                field.describe()
            };
            Some(Candidate::entry(name, &field.default_value(), SuggestionKind::Field).detail(detail))
        })
        .collect()
}

fn data_value_candidates(
    schema: &Schema,
    entity: &Entity,
    field: &str,
    aliases: &[String],
) -> Vec<Candidate> {
    if let Some(definition) = entity.field(field) {
        if !definition.enum_values().is_empty() {
            return enum_candidates(definition.enum_values());
        }
    }

    let Some(target) = schema.infer_reference_target(&entity.name, field) else {
        return Vec::new();
    };
    let to_field = entity
        .relations
        .values()
        .filter_map(|relation| relation.reference.as_ref())
        .find(|reference| reference.from_field == field)
        .map_or("id", |reference| reference.to_field.as_str());
    let prefix = target.to_lowercase();

    aliases
        .iter()
        .filter(|alias| {
            alias
                .strip_prefix('$')
                .and_then(|rest| rest.strip_prefix(prefix.as_str()))
                .is_some_and(|ordinal| {
                    !ordinal.is_empty() && ordinal.bytes().all(|b| b.is_ascii_digit())
                })
        })
        .map(|alias| {
            Candidate::quoted(&format!("{alias}.{to_field}"), SuggestionKind::Variable)
                .detail(format!("{target} from an earlier step"))
        })
        .collect()
}

fn step_candidates(slot: &Slot) -> Vec<Candidate> {
    match slot {
        Slot::Element => MutationKind::ALL
            .iter()
            .map(|operation| {
                let step = serde_json::json!({ operation.as_str(): {} });
                Candidate::new(operation.as_str(), step.to_string(), SuggestionKind::Operation)
            })
            .collect(),
        Slot::Key => {
            let mut candidates: Vec<Candidate> = MutationKind::ALL
                .iter()
                .map(|operation| {
                    Candidate::entry(operation.as_str(), &serde_json::json!({}), SuggestionKind::Operation)
                })
                .collect();
            candidates.push(Candidate::entry("as", &Value::from(""), SuggestionKind::Keyword));
            candidates.push(Candidate::entry(
                "optional",
                &Value::Bool(true),
                SuggestionKind::Keyword,
            ));
            candidates.push(Candidate::entry(
                "depends_on",
                &serde_json::json!([]),
                SuggestionKind::Keyword,
            ));
            candidates
        }
        Slot::Value(_) | Slot::Outside => Vec::new(),
    }
}

/// Convert a suggestion into an LSP completion item.
#[must_use]
pub fn to_completion_item(
    suggestion: &Suggestion,
    text: &str,
    line_index: &LineIndex,
    encoding: PositionEncoding,
) -> ls_types::CompletionItem {
    let edit = |span: Span, new_text: &str| ls_types::TextEdit {
        range: span.to_lsp_range(text, line_index, encoding),
        new_text: new_text.to_string(),
    };

    let additional_text_edits: Vec<ls_types::TextEdit> = suggestion
        .additional_edits
        .iter()
        .map(|extra| edit(extra.span, &extra.new_text))
        .collect();

    ls_types::CompletionItem {
        label: suggestion.label.clone(),
        kind: Some(suggestion.kind.to_lsp()),
        detail: suggestion.detail.clone(),
        sort_text: Some(suggestion.sort_text.clone()),
        filter_text: Some(suggestion.label.clone()),
        insert_text_format: Some(ls_types::InsertTextFormat::PLAIN_TEXT),
        text_edit: Some(ls_types::CompletionTextEdit::Edit(edit(
            suggestion.replace,
            &suggestion.insert_text,
        ))),
        additional_text_edits: (!additional_text_edits.is_empty()).then_some(additional_text_edits),
        ..Default::default()
    }
}
