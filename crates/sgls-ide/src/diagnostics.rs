use serde_json::Map;
use serde_json::Value;
use sgls_conf::DiagnosticSeverity;
use sgls_conf::DiagnosticsConfig;
use sgls_document::keywords;
use sgls_document::locate_token;
use sgls_document::MutationKind;
use sgls_schema::split_filter_key;
use sgls_schema::Entity;
use sgls_schema::Schema;
use sgls_source::DiagnosticRenderer;
use sgls_source::LineCol;
use sgls_source::LineIndex;
use sgls_source::PositionEncoding;
use sgls_source::Report;
use sgls_source::Severity;
use sgls_source::Span;
use sgls_transaction::variable_refs;
use tower_lsp_server::ls_types;

use crate::ext::SpanExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FindingCode {
    UnknownEntity,
    UnknownField,
    UnknownRelation,
    UnknownFilterField,
    FilterOperatorNotAllowed,
    UnknownMutationField,
    UndeclaredVariable,
}

impl FindingCode {
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            FindingCode::UnknownEntity => "S100",
            FindingCode::UnknownField => "S101",
            FindingCode::UnknownRelation => "S102",
            FindingCode::UnknownFilterField => "S103",
            FindingCode::FilterOperatorNotAllowed => "S104",
            FindingCode::UnknownMutationField => "S105",
            FindingCode::UndeclaredVariable => "S106",
        }
    }

    /// Short text printed under the offending token.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            FindingCode::UnknownEntity => "not in the schema",
            FindingCode::UnknownField => "no such field",
            FindingCode::UnknownRelation => "no such relation",
            FindingCode::UnknownFilterField => "no such field to filter on",
            FindingCode::FilterOperatorNotAllowed => "operator not allowed here",
            FindingCode::UnknownMutationField => "not a field of this entity",
            FindingCode::UndeclaredVariable => "declared by no earlier step",
        }
    }

    /// Severity used unless configuration says otherwise.
    #[must_use]
    pub fn default_severity(self) -> DiagnosticSeverity {
        match self {
            FindingCode::UnknownEntity
            | FindingCode::UnknownRelation
            | FindingCode::UndeclaredVariable => DiagnosticSeverity::Error,
            FindingCode::UnknownField
            | FindingCode::UnknownFilterField
            | FindingCode::FilterOperatorNotAllowed
            | FindingCode::UnknownMutationField => DiagnosticSeverity::Warning,
        }
    }
}

/// A schema mismatch at a place in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub code: FindingCode,
    pub severity: DiagnosticSeverity,
    pub message: String,
    pub span: Span,
    /// What would have been accepted, when the schema can say.
    pub note: Option<String>,
}

impl Finding {
    fn new(text: &str, code: FindingCode, token: &str, message: String) -> Self {
        let span = locate_token(text, token).unwrap_or_default();
        Self {
            code,
            severity: code.default_severity(),
            message,
            span,
            note: None,
        }
    }

    #[must_use]
    pub fn range(
        &self,
        text: &str,
        index: &LineIndex,
        encoding: PositionEncoding,
    ) -> (LineCol, LineCol) {
        (
            index.to_line_col(self.span.start_offset(), text, encoding),
            index.to_line_col(self.span.end_offset(), text, encoding),
        )
    }

    #[must_use]
    pub fn to_lsp_diagnostic(
        &self,
        text: &str,
        index: &LineIndex,
        encoding: PositionEncoding,
    ) -> ls_types::Diagnostic {
        ls_types::Diagnostic {
            range: self.span.to_lsp_range(text, index, encoding),
            severity: self.severity.to_lsp_severity(),
            code: Some(ls_types::NumberOrString::String(self.code.code().to_string())),
            code_description: None,
            source: Some(crate::SOURCE_NAME.to_string()),
            message: self.message.clone(),
            related_information: None,
            tags: None,
            data: None,
        }
    }
}

/// Check `text` against `schema`.
///
/// Text that is not valid JSON yields nothing; syntax errors belong to
/// whatever JSON checking the editor already does. Each finding points at
/// the first occurrence of its token in the text.
#[must_use]
pub fn validate(text: &str, schema: &Schema) -> Vec<Finding> {
    let Ok(Value::Object(document)) = serde_json::from_str::<Value>(text) else {
        tracing::trace!("skipping schema checks; text is not a JSON object");
        return Vec::new();
    };

    let mut walker = Walker {
        text,
        schema,
        findings: Vec::new(),
    };
    walker.document(&document);
    tracing::debug!(count = walker.findings.len(), "validated document");
    walker.findings
}

/// Apply configured severities, dropping findings turned off.
#[must_use]
pub fn apply_config(findings: Vec<Finding>, config: &DiagnosticsConfig) -> Vec<Finding> {
    findings
        .into_iter()
        .filter_map(|mut finding| {
            let severity = config.get_severity(finding.code.code(), finding.severity);
            if severity == DiagnosticSeverity::Off {
                return None;
            }
            finding.severity = severity;
            Some(finding)
        })
        .collect()
}

/// Validate and convert to LSP diagnostics in one go.
#[must_use]
pub fn collect_diagnostics(
    text: &str,
    schema: &Schema,
    config: &DiagnosticsConfig,
    encoding: PositionEncoding,
) -> Vec<ls_types::Diagnostic> {
    let index = LineIndex::from_text(text);
    apply_config(validate(text, schema), config)
        .iter()
        .map(|finding| finding.to_lsp_diagnostic(text, &index, encoding))
        .collect()
}

fn to_render_severity(severity: DiagnosticSeverity) -> Severity {
    match severity {
        DiagnosticSeverity::Error => Severity::Error,
        DiagnosticSeverity::Warning => Severity::Warning,
        DiagnosticSeverity::Info => Severity::Info,
        DiagnosticSeverity::Hint | DiagnosticSeverity::Off => Severity::Hint,
    }
}

/// Render a finding as an annotated source snippet.
#[must_use]
pub fn render_finding(
    source: &str,
    path: &str,
    finding: &Finding,
    renderer: &DiagnosticRenderer,
) -> String {
    let mut report = Report::new(
        source,
        path,
        to_render_severity(finding.severity),
        finding.code.code(),
        &finding.message,
    )
    .at(finding.span, finding.code.label());
    if let Some(note) = &finding.note {
        report = report.note(note);
    }
    renderer.render(&report)
}

struct Walker<'a> {
    text: &'a str,
    schema: &'a Schema,
    findings: Vec<Finding>,
}

impl<'a> Walker<'a> {
    fn report(&mut self, code: FindingCode, token: &str, message: String) {
        self.findings
            .push(Finding::new(self.text, code, token, message));
    }

    /// Attach `note` to the finding just reported.
    fn note(&mut self, note: String) {
        if let Some(finding) = self.findings.last_mut() {
            finding.note = Some(note);
        }
    }

    fn document(&mut self, document: &Map<String, Value>) {
        for (key, value) in document {
            if key == "query" {
                if let Some(entities) = value.as_object() {
                    self.entities(entities);
                }
            } else if key == "transaction" {
                self.transaction(value);
            } else if let Some(kind) = MutationKind::from_keyword(key) {
                if let Some(entities) = value.as_object() {
                    self.mutation(kind, entities);
                }
            } else if is_entity_key(key) {
                self.query_root(key, value);
            }
        }
    }

    fn entities(&mut self, entities: &Map<String, Value>) {
        for (name, body) in entities {
            if is_entity_key(name) {
                self.query_root(name, body);
            }
        }
    }

    /// The named entity, reporting it when the schema lacks it.
    fn lookup(&mut self, name: &str) -> Option<&'a Entity> {
        let entity = self.schema.entity(name);
        if entity.is_none() {
            self.report(
                FindingCode::UnknownEntity,
                name,
                format!("Unknown entity '{name}'"),
            );
            let schema = self.schema;
            let known: Vec<&str> = schema.entity_names().collect();
            self.note(format!("known entities: {}", known.join(", ")));
        }
        entity
    }

    fn query_root(&mut self, name: &str, body: &Value) {
        if let Some(entity) = self.lookup(name) {
            self.query_body(entity, body);
        }
    }

    fn query_body(&mut self, entity: &Entity, body: &Value) {
        let Some(body) = body.as_object() else {
            return;
        };
        let body = body
            .get("select")
            .and_then(Value::as_object)
            .unwrap_or(body);

        if let Some(fields) = body.get("fields").and_then(Value::as_array) {
            for field in fields.iter().filter_map(Value::as_str) {
                if !entity.has_field(field) {
                    self.report(
                        FindingCode::UnknownField,
                        field,
                        format!("Unknown field '{field}' on {}", entity.name),
                    );
                    self.note(format!(
                        "fields of {}: {}",
                        entity.name,
                        entity.sorted_field_names().join(", ")
                    ));
                }
            }
        }

        self.filters(entity, body.get("filters"));

        let schema = self.schema;
        if let Some(relations) = body.get("relations").and_then(Value::as_object) {
            for (name, nested) in relations {
                let target = entity
                    .relation(name)
                    .and_then(|relation| schema.entity(&relation.target));
                match target {
                    Some(target) => self.query_body(target, nested),
                    None if entity.relation(name).is_some() => {}
                    None => {
                        self.report(
                            FindingCode::UnknownRelation,
                            name,
                            format!("Unknown relation '{name}' on {}", entity.name),
                        );
                        if !entity.relations.is_empty() {
                            let known: Vec<&str> =
                                entity.relations.keys().map(String::as_str).collect();
                            self.note(format!(
                                "relations of {}: {}",
                                entity.name,
                                known.join(", ")
                            ));
                        }
                    }
                }
            }
        }
    }

    fn filters(&mut self, entity: &Entity, filters: Option<&Value>) {
        let Some(filters) = filters.and_then(Value::as_object) else {
            return;
        };
        for key in filters.keys() {
            let (name, op) = split_filter_key(key);
            match entity.field(name) {
                None => self.report(
                    FindingCode::UnknownFilterField,
                    key,
                    format!("Unknown filter field '{name}' on {}", entity.name),
                ),
                Some(field) if !field.allows(op) => {
                    self.report(
                        FindingCode::FilterOperatorNotAllowed,
                        key,
                        format!("Operator '{op}' is not allowed for {}.{name}", entity.name),
                    );
                    self.note(if field.filters.is_empty() {
                        format!("{}.{name} cannot be filtered", entity.name)
                    } else {
                        format!("allowed operators: {}", field.filters.join(", "))
                    });
                }
                Some(_) => {}
            }
        }
    }

    fn mutation(&mut self, kind: MutationKind, entities: &Map<String, Value>) {
        for (name, body) in entities {
            if !is_entity_key(name) {
                continue;
            }
            let Some(entity) = self.lookup(name) else {
                continue;
            };
            let Some(body) = body.as_object() else {
                continue;
            };

            if kind.writes_data() {
                if let Some(data) = body.get("data").and_then(Value::as_object) {
                    for field in data.keys() {
                        self.mutation_field(entity, field, "data");
                    }
                }
                if let Some(response) = body.get("response").and_then(Value::as_array) {
                    for field in response.iter().filter_map(Value::as_str) {
                        self.mutation_field(entity, field, "response");
                    }
                }
            }
            self.filters(entity, body.get("filters"));
        }
    }

    fn mutation_field(&mut self, entity: &Entity, field: &str, section: &str) {
        if !entity.has_field(field) {
            self.report(
                FindingCode::UnknownMutationField,
                field,
                format!("Unknown {section} field '{field}' on {}", entity.name),
            );
        }
    }

    fn transaction(&mut self, transaction: &Value) {
        let Some(steps) = transaction.get("steps").and_then(Value::as_array) else {
            return;
        };

        let mut declared: Vec<&str> = Vec::new();
        for step in steps.iter().filter_map(Value::as_object) {
            for (key, value) in step {
                let Some(kind) = MutationKind::from_keyword(key) else {
                    continue;
                };
                let Some(entities) = value.as_object() else {
                    continue;
                };
                self.mutation(kind, entities);

                for reference in variable_refs(value) {
                    let alias = format!("${}", reference.name);
                    if declared.contains(&alias.as_str()) {
                        continue;
                    }
                    let token = match &reference.field {
                        Some(field) => format!("{alias}.{field}"),
                        None => alias.clone(),
                    };
                    self.report(
                        FindingCode::UndeclaredVariable,
                        &token,
                        format!("Variable '{alias}' is not declared by an earlier step"),
                    );
                }
            }
            if let Some(alias) = step.get("as").and_then(Value::as_str) {
                declared.push(alias);
            }
        }
    }
}

fn is_entity_key(key: &str) -> bool {
    key.starts_with(|c: char| c.is_ascii_uppercase()) && !keywords::is_reserved(key)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use sgls_schema::testing::sample_schema;

    use super::*;

    fn check(text: &str) -> Vec<Finding> {
        validate(text, &sample_schema())
    }

    fn codes(findings: &[Finding]) -> Vec<&'static str> {
        findings.iter().map(|f| f.code.code()).collect()
    }

    #[test]
    fn test_single_warning_for_unknown_field() {
        let text = r#"{"Person": {"fields": ["id", "email"]}}"#;
        let findings = check(text);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].code, FindingCode::UnknownField);
        assert_eq!(findings[0].severity, DiagnosticSeverity::Warning);
        assert_eq!(findings[0].message, "Unknown field 'email' on Person");
        let span = findings[0].span;
        assert_eq!(&text[span.start_usize()..span.end_usize()], "email");
    }

    #[test]
    fn test_malformed_text_has_no_findings() {
        assert!(check(r#"{"Persn": {"fields": ["#).is_empty());
        assert!(check("[1, 2]").is_empty());
    }

    #[test]
    fn test_unknown_entity_is_an_error() {
        let findings = check(r#"{"Persn": {"fields": ["id"]}}"#);
        assert_eq!(codes(&findings), ["S100"]);
        assert_eq!(findings[0].severity, DiagnosticSeverity::Error);
    }

    #[test]
    fn test_lowercase_and_structural_keys_are_not_entities() {
        assert!(check(r#"{"limit": 5, "query": {"Person": {}}}"#).is_empty());
    }

    #[test]
    fn test_unknown_relation_and_nested_fields() {
        let text = r#"{"Person": {"relations": {
            "owned_properties": {"fields": ["address", "zip"], "relations": {"owner": {}}},
            "friends": {}
        }}}"#;
        let findings = check(text);
        assert_eq!(codes(&findings), ["S101", "S102"]);
        assert_eq!(findings[0].message, "Unknown field 'zip' on Property");
        assert_eq!(findings[1].message, "Unknown relation 'friends' on Person");
    }

    #[test]
    fn test_select_layout_is_checked() {
        let findings = check(r#"{"Person": {"select": {"fields": ["nope"]}}}"#);
        assert_eq!(codes(&findings), ["S101"]);
    }

    #[test]
    fn test_filters() {
        let findings = check(
            r#"{"Person": {"filters": {"name__icontains": "a", "age__icontains": "1", "height__gte": 2, "status": "active"}}}"#,
        );
        assert_eq!(codes(&findings), ["S104", "S103"]);
        assert_eq!(
            findings[0].message,
            "Operator 'icontains' is not allowed for Person.age"
        );
    }

    #[test]
    fn test_mutation_fields() {
        let findings = check(
            r#"{"create": {"User": {"data": {"email": "a@b", "nickname": "x"}, "response": ["id", "token"]}}}"#,
        );
        assert_eq!(codes(&findings), ["S105", "S105"]);
        assert_eq!(findings[0].message, "Unknown data field 'nickname' on User");
        assert_eq!(findings[1].message, "Unknown response field 'token' on User");
    }

    #[test]
    fn test_unknown_mutation_entity() {
        let findings = check(r#"{"POST": {"Usr": {"data": {}}}}"#);
        assert_eq!(codes(&findings), ["S100"]);
    }

    #[test]
    fn test_transaction_variables() {
        let text = r#"{"transaction": {"steps": [
            {"create": {"Property": {"data": {"address": "x", "owner_id": "$person1.id"}}}, "as": "$property1"},
            {"create": {"Person": {"data": {"name": "A", "status": "active"}}}, "as": "$person1"},
            {"update": {"Property": {"filters": {"id__eq": "$property1.id"}, "data": {"owner_id": "$person1.id"}}}, "as": "$property2"}
        ]}}"#;
        let findings = check(text);
        assert_eq!(codes(&findings), ["S106"]);
        assert_eq!(
            findings[0].message,
            "Variable '$person1' is not declared by an earlier step"
        );
    }

    mod config {
        use super::*;

        #[test]
        fn test_override_and_off() {
            let text = r#"{"Persn": {}, "Person": {"fields": ["email"]}}"#;
            let config = DiagnosticsConfig {
                severity: HashMap::from([
                    ("S100".to_string(), DiagnosticSeverity::Off),
                    ("S101".to_string(), DiagnosticSeverity::Error),
                ]),
            };

            let findings = apply_config(check(text), &config);
            assert_eq!(codes(&findings), ["S101"]);
            assert_eq!(findings[0].severity, DiagnosticSeverity::Error);
        }

        #[test]
        fn test_lsp_conversion() {
            let text = "{\n  \"Person\": {\"fields\": [\"email\"]}\n}";
            let diagnostics = collect_diagnostics(
                text,
                &sample_schema(),
                &DiagnosticsConfig::default(),
                PositionEncoding::Utf16,
            );

            assert_eq!(diagnostics.len(), 1);
            let diagnostic = &diagnostics[0];
            assert_eq!(diagnostic.range.start, ls_types::Position::new(1, 25));
            assert_eq!(diagnostic.range.end, ls_types::Position::new(1, 30));
            assert_eq!(
                diagnostic.severity,
                Some(ls_types::DiagnosticSeverity::WARNING)
            );
            assert_eq!(
                diagnostic.code,
                Some(ls_types::NumberOrString::String("S101".to_string()))
            );
        }
    }

    #[test]
    fn test_render() {
        let text = "{\n  \"Person\": {\"fields\": [\"id\", \"email\"]}\n}\n";
        let findings = check(text);
        let rendered = render_finding(text, "query.json", &findings[0], &DiagnosticRenderer::plain());
        assert!(rendered.contains("warning[S101]: Unknown field 'email' on Person"));
        assert!(rendered.contains("query.json:2:32"));
        assert!(rendered.contains("^^^^^ no such field"), "{rendered}");
        assert!(rendered.contains("note: fields of Person: "), "{rendered}");
    }

    #[test]
    fn test_notes_name_the_alternatives() {
        let findings = check(r#"{"Persn": {"fields": ["id"]}}"#);
        assert_eq!(findings[0].code, FindingCode::UnknownEntity);
        assert_eq!(
            findings[0].note.as_deref(),
            Some("known entities: Person, Property, Relationship, User")
        );

        let findings = check(r#"{"Person": {"filters": {"name__gte": "a"}}}"#);
        assert_eq!(findings[0].code, FindingCode::FilterOperatorNotAllowed);
        assert!(findings[0]
            .note
            .as_deref()
            .is_some_and(|note| note.starts_with("allowed operators: ")));
    }
}
