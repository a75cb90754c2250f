//! Where the cursor sits inside a half-typed request document.
//!
//! This is a scan over the text before the cursor, not a parse: strings and
//! brackets are tracked, everything else is ignored. It misreads some
//! pathological inputs and that is accepted.

use std::sync::LazyLock;

use regex::Regex;
use sgls_document::keywords;
use sgls_document::MutationKind;
use sgls_schema::Entity;
use sgls_schema::Schema;
use sgls_source::Span;

static ENTITY_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([A-Z][A-Za-z0-9_]*)"\s*:"#).unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextKind {
    /// Directly inside the document object.
    RootLevel,
    /// Inside a `fields` or `response` array.
    FieldsArray { entity: String },
    FiltersMap {
        entity: String,
        /// The filter key whose value is being typed.
        value_of: Option<String>,
    },
    RelationsMap { entity: String },
    DataMap {
        entity: String,
        value_of: Option<String>,
    },
    /// Inside `{"create": {...}}` and friends, where entities go.
    MutationWrapper { operation: MutationKind },
    /// Between steps of a transaction or at the top of a step object.
    TransactionStepBoundary,
    /// Inside an entity or relation body, where structural keys go.
    EntityBody { entity: String },
    /// Inside a string opened on an earlier line.
    UnterminatedString,
    Unknown,
}

impl ContextKind {
    #[must_use]
    pub fn entity(&self) -> Option<&str> {
        match self {
            ContextKind::FieldsArray { entity }
            | ContextKind::FiltersMap { entity, .. }
            | ContextKind::RelationsMap { entity }
            | ContextKind::DataMap { entity, .. }
            | ContextKind::EntityBody { entity } => Some(entity),
            _ => None,
        }
    }
}

/// What the cursor is about to produce in its container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Key,
    Value(String),
    Element,
    /// Outside any bracket.
    Outside,
}

/// A string whose closing quote is not before the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenString {
    /// Byte offset just after the opening quote.
    pub start: usize,
    pub partial: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionContext {
    pub kind: ContextKind,
    pub slot: Slot,
    pub offset: usize,
    /// Relations walked from the entity key to the cursor.
    pub relation_path: Vec<String>,
    pub operation: Option<MutationKind>,
    pub open_string: Option<OpenString>,
    /// Transaction aliases (`"as": "$x"`) declared before the cursor.
    pub aliases: Vec<String>,
    /// Where a `,` must go before anything new can be inserted.
    pub separator_at: Option<usize>,
}

impl CompletionContext {
    /// The entity whose members are being completed, following
    /// `relation_path` from the entity in scope.
    #[must_use]
    pub fn target<'s>(&self, schema: &'s Schema) -> Option<&'s Entity> {
        let entity = self.kind.entity()?;
        schema.resolve_path(entity, self.relation_path.iter().map(String::as_str))
    }

    /// The range a suggestion replaces: the typed part of an open string, or
    /// nothing at the cursor.
    #[must_use]
    pub fn replace_span(&self) -> Span {
        match &self.open_string {
            Some(open) => Span::from_bounds(open.start, self.offset),
            None => Span::empty(self.offset),
        }
    }

    #[must_use]
    pub fn partial(&self) -> &str {
        self.open_string
            .as_ref()
            .map_or("", |open| open.partial.as_str())
    }
}

#[derive(Debug)]
struct Frame {
    bracket: u8,
    key: Option<String>,
}

#[derive(Debug, Default)]
struct Scanner {
    frames: Vec<Frame>,
    string_start: Option<usize>,
    escaped: bool,
    last_string: Option<String>,
    pending_key: Option<String>,
    aliases: Vec<String>,
}

impl Scanner {
    fn in_object(&self) -> bool {
        self.frames.last().is_some_and(|frame| frame.bracket == b'{')
    }

    fn step(&mut self, index: usize, byte: u8, text: &str) {
        if let Some(start) = self.string_start {
            if self.escaped {
                self.escaped = false;
            } else if byte == b'\\' {
                self.escaped = true;
            } else if byte == b'"' {
                self.string_start = None;
                self.close_string(&text[start + 1..index]);
            }
            return;
        }

        match byte {
            b'"' => self.string_start = Some(index),
            b':' if self.in_object() => self.pending_key = self.last_string.take(),
            b'{' | b'[' => {
                let key = self.pending_key.take();
                self.frames.push(Frame { bracket: byte, key });
                self.last_string = None;
            }
            b'}' | b']' => {
                self.frames.pop();
                self.pending_key = None;
                self.last_string = None;
            }
            b',' => {
                self.pending_key = None;
                self.last_string = None;
            }
            _ => {}
        }
    }

    fn close_string(&mut self, content: &str) {
        if let Some(key) = self.pending_key.take() {
            if key == "as" && content.starts_with('$') {
                self.aliases.push(content.to_string());
            }
        } else if self.in_object() {
            self.last_string = Some(content.to_string());
        }
    }

    fn slot(&self) -> Slot {
        match self.frames.last() {
            None => Slot::Outside,
            Some(frame) if frame.bracket == b'[' => Slot::Element,
            Some(_) => match &self.pending_key {
                Some(key) => Slot::Value(key.clone()),
                None => Slot::Key,
            },
        }
    }

    fn parent(&self) -> Option<&Frame> {
        let index = self.frames.len().checked_sub(2)?;
        self.frames.get(index)
    }

    fn relation_path(&self, entity: &str) -> Vec<String> {
        let Some(start) = self
            .frames
            .iter()
            .rposition(|frame| frame.key.as_deref() == Some(entity))
        else {
            return Vec::new();
        };

        self.frames[start..]
            .windows(2)
            .filter(|pair| pair[0].key.as_deref() == Some("relations") && pair[1].bracket == b'{')
            .filter_map(|pair| pair[1].key.clone())
            .collect()
    }

    fn operation(&self) -> Option<MutationKind> {
        self.frames
            .iter()
            .rev()
            .filter_map(|frame| frame.key.as_deref())
            .find_map(MutationKind::from_keyword)
    }
}

fn is_entity_key(key: &str) -> bool {
    key.starts_with(|c: char| c.is_ascii_uppercase()) && !keywords::is_reserved(key)
}

/// The most recent capitalized key before the cursor that is not reserved.
fn entity_in_scope(before: &str) -> Option<String> {
    ENTITY_KEY
        .captures_iter(before)
        .filter_map(|captures| captures.get(1))
        .map(|name| name.as_str())
        .filter(|name| !keywords::is_reserved(name))
        .last()
        .map(str::to_string)
}

/// Offset just after the last value in `before`, when nothing but
/// whitespace follows it.
fn separator_needed(before: &str) -> Option<usize> {
    let trimmed = before.trim_end();
    let ends_in_value = trimmed.ends_with(['"', '}', ']'])
        || trimmed.ends_with(|c: char| c.is_ascii_digit())
        || ["true", "false", "null"]
            .iter()
            .any(|literal| trimmed.ends_with(literal));
    ends_in_value.then_some(trimmed.len())
}

/// Classify the cursor at byte `offset` of `text`.
#[must_use]
pub fn detect_context(text: &str, offset: usize) -> CompletionContext {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    let before = &text[..offset];

    let mut scanner = Scanner::default();
    for (index, byte) in before.bytes().enumerate() {
        scanner.step(index, byte, before);
    }

    let open_string = scanner.string_start.map(|quote| OpenString {
        start: quote + 1,
        partial: before[quote + 1..].to_string(),
    });
    let insert_at = scanner.string_start.unwrap_or(offset);

    let entity = entity_in_scope(before);
    let slot = scanner.slot();
    let kind = if open_string
        .as_ref()
        .is_some_and(|open| open.partial.contains('\n'))
    {
        ContextKind::UnterminatedString
    } else {
        classify(&scanner, &slot, entity.as_deref())
    };

    let relation_path = entity
        .as_deref()
        .map(|entity| scanner.relation_path(entity))
        .unwrap_or_default();
    tracing::trace!(offset, ?kind, ?slot, ?relation_path, "classified cursor");

    CompletionContext {
        kind,
        operation: scanner.operation(),
        relation_path,
        open_string,
        aliases: scanner.aliases,
        separator_at: separator_needed(&before[..insert_at]),
        slot,
        offset,
    }
}

fn classify(scanner: &Scanner, slot: &Slot, entity: Option<&str>) -> ContextKind {
    let Some(top) = scanner.frames.last() else {
        return ContextKind::Unknown;
    };
    let key = top.key.as_deref();
    let parent = scanner.parent().and_then(|frame| frame.key.as_deref());
    let in_step_list = scanner
        .parent()
        .is_some_and(|frame| frame.bracket == b'[' && frame.key.as_deref() == Some("steps"));
    let entity = entity.map(str::to_string);

    match (top.bracket, key, slot) {
        (b'[', Some("fields" | "response"), Slot::Element) => {
            entity.map_or(ContextKind::Unknown, |entity| ContextKind::FieldsArray { entity })
        }
        (b'[', Some("steps"), Slot::Element) => ContextKind::TransactionStepBoundary,
        (b'{', _, Slot::Key) if in_step_list => ContextKind::TransactionStepBoundary,
        (b'{', None, Slot::Key) if scanner.frames.len() == 1 => ContextKind::RootLevel,
        (b'{', Some("query"), Slot::Key) => ContextKind::RootLevel,
        (b'{', Some("filters"), Slot::Key | Slot::Value(_)) => match entity {
            Some(entity) => ContextKind::FiltersMap {
                entity,
                value_of: value_of(slot),
            },
            None => ContextKind::Unknown,
        },
        (b'{', Some("data"), Slot::Key | Slot::Value(_)) => match entity {
            Some(entity) => ContextKind::DataMap {
                entity,
                value_of: value_of(slot),
            },
            None => ContextKind::Unknown,
        },
        (b'{', Some("relations"), Slot::Key) => {
            entity.map_or(ContextKind::Unknown, |entity| ContextKind::RelationsMap { entity })
        }
        (b'{', Some(key), Slot::Key) => {
            if let Some(operation) = MutationKind::from_keyword(key) {
                ContextKind::MutationWrapper { operation }
            } else if is_entity_key(key) || parent == Some("relations") {
                entity.map_or(ContextKind::Unknown, |entity| ContextKind::EntityBody { entity })
            } else {
                ContextKind::Unknown
            }
        }
        _ => ContextKind::Unknown,
    }
}

fn value_of(slot: &Slot) -> Option<String> {
    match slot {
        Slot::Value(key) => Some(key.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Detect at the `|` marker.
    fn detect(marked: &str) -> CompletionContext {
        let offset = marked.find('|').unwrap();
        detect_context(&marked.replace('|', ""), offset)
    }

    fn kind(marked: &str) -> ContextKind {
        detect(marked).kind
    }

    fn person() -> String {
        "Person".to_string()
    }

    #[test]
    fn test_root_level() {
        assert_eq!(kind("{|"), ContextKind::RootLevel);
        assert_eq!(kind(r#"{"Person": {"fields": ["id"]}, |"#), ContextKind::RootLevel);
        assert_eq!(kind(r#"{"query": {|"#), ContextKind::RootLevel);
    }

    #[test]
    fn test_outside_document() {
        let context = detect("|");
        assert_eq!(context.kind, ContextKind::Unknown);
        assert_eq!(context.slot, Slot::Outside);
    }

    #[test]
    fn test_fields_array() {
        assert_eq!(
            kind(r#"{"Person": {"fields": ["id", |"#),
            ContextKind::FieldsArray { entity: person() }
        );
        assert_eq!(
            kind(r#"{"create": {"Person": {"data": {}, "response": [|"#),
            ContextKind::FieldsArray { entity: person() }
        );
    }

    #[test]
    fn test_filters_key_and_value() {
        assert_eq!(
            kind(r#"{"Person": {"filters": {|"#),
            ContextKind::FiltersMap {
                entity: person(),
                value_of: None,
            }
        );

        let context = detect(r#"{"Person": {"filters": {"status__eq": "ac|"#);
        assert_eq!(
            context.kind,
            ContextKind::FiltersMap {
                entity: person(),
                value_of: Some("status__eq".to_string()),
            }
        );
        assert_eq!(context.partial(), "ac");
    }

    #[test]
    fn test_completed_value_returns_to_key_slot() {
        let context = detect(r#"{"Person": {"filters": {"status__eq": "active" |"#);
        assert_eq!(context.slot, Slot::Key);
    }

    #[test]
    fn test_relations_and_nested_path() {
        assert_eq!(
            kind(r#"{"Person": {"relations": {|"#),
            ContextKind::RelationsMap { entity: person() }
        );

        let context = detect(
            r#"{"Person": {"relations": {"owned_properties": {"relations": {"owner": {"fields": [|"#,
        );
        assert_eq!(context.kind, ContextKind::FieldsArray { entity: person() });
        assert_eq!(context.relation_path, ["owned_properties", "owner"]);
    }

    #[test]
    fn test_entity_body() {
        assert_eq!(
            kind(r#"{"Person": {|"#),
            ContextKind::EntityBody { entity: person() }
        );
        let context = detect(r#"{"Person": {"relations": {"owned_properties": {|"#);
        assert_eq!(context.kind, ContextKind::EntityBody { entity: person() });
        assert_eq!(context.relation_path, ["owned_properties"]);
    }

    #[test]
    fn test_mutation_wrapper() {
        assert_eq!(
            kind(r#"{"create": {|"#),
            ContextKind::MutationWrapper {
                operation: MutationKind::Create
            }
        );
        assert_eq!(
            kind(r#"{"PATCH": {|"#),
            ContextKind::MutationWrapper {
                operation: MutationKind::Update
            }
        );
    }

    #[test]
    fn test_data_value_in_mutation() {
        let context = detect(r#"{"create": {"Person": {"data": {"status": |"#);
        assert_eq!(
            context.kind,
            ContextKind::DataMap {
                entity: person(),
                value_of: Some("status".to_string()),
            }
        );
        assert_eq!(context.operation, Some(MutationKind::Create));
    }

    #[test]
    fn test_transaction_steps_and_aliases() {
        let text = r#"{"transaction": {"steps": [{"create": {"Person": {"data": {}}}, "as": "$person1"}, |"#;
        let context = detect(text);
        assert_eq!(context.kind, ContextKind::TransactionStepBoundary);
        assert_eq!(context.aliases, ["$person1"]);

        assert_eq!(
            kind(r#"{"transaction": {"steps": [{|"#),
            ContextKind::TransactionStepBoundary
        );
    }

    #[test]
    fn test_latest_entity_wins_across_steps() {
        let text = r#"{"transaction": {"steps": [{"create": {"Person": {"data": {}}}, "as": "$person1"}, {"create": {"Property": {"data": {"owner_id": "|"#;
        let context = detect(text);
        assert_eq!(
            context.kind,
            ContextKind::DataMap {
                entity: "Property".to_string(),
                value_of: Some("owner_id".to_string()),
            }
        );
        assert_eq!(context.aliases, ["$person1"]);
    }

    #[test]
    fn test_unterminated_string() {
        assert_eq!(
            kind("{\"Person\": {\"fields\": [\"na\n    |"),
            ContextKind::UnterminatedString
        );
    }

    #[test]
    fn test_escaped_quote_stays_in_string() {
        let context = detect(r#"{"Person": {"filters": {"name__eq": "a \"b|"#);
        assert_eq!(context.partial(), r#"a \"b"#);
    }

    mod open_strings {
        use super::*;

        #[test]
        fn test_replace_span_starts_after_quote() {
            let text = r#"{"Person": {"fields": ["na"#;
            let context = detect_context(text, text.len());
            let span = context.replace_span();
            assert_eq!(&text[span.start_usize()..span.end_usize()], "na");
        }

        #[test]
        fn test_no_open_string_means_empty_span() {
            let context = detect(r#"{"Person": {"fields": [|"#);
            assert!(context.replace_span().is_empty());
            assert_eq!(context.partial(), "");
        }
    }

    mod separators {
        use super::*;

        #[test]
        fn test_after_value_on_same_line() {
            let text = r#"{"Person": {"fields": ["id" "#;
            let context = detect_context(text, text.len());
            assert_eq!(context.separator_at, Some(text.trim_end().len()));
        }

        #[test]
        fn test_previous_line_when_cursor_line_is_blank() {
            let text = "{\"Person\": {\n  \"fields\": [\"id\"]\n  \n";
            let cursor = text.len() - 1;
            let context = detect_context(text, cursor);
            assert_eq!(context.separator_at, Some(text.find("]").unwrap() + 1));
        }

        #[test]
        fn test_not_after_existing_separator_or_opener() {
            assert_eq!(detect(r#"{"Person": {"fields": ["id", |"#).separator_at, None);
            assert_eq!(detect(r#"{"Person": {|"#).separator_at, None);
        }

        #[test]
        fn test_open_string_measured_from_its_quote() {
            let text = "{\"Person\": {\"limit\": 10\n  \"fi";
            let context = detect_context(text, text.len());
            assert_eq!(context.separator_at, Some(text.find("10").unwrap() + 2));
        }
    }
}
