use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::keywords;
use crate::DocumentError;
use crate::EntityMutation;
use crate::EntityQuery;
use crate::Mode;
use crate::MutationKind;
use crate::TransactionDoc;

static ENTITY_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([A-Z][A-Za-z0-9_]*)"\s*:"#).unwrap());

/// A parsed request. A document carries exactly one kind of operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Query(Vec<EntityQuery>),
    Mutation(MutationKind, Vec<EntityMutation>),
    Transaction(TransactionDoc),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Query,
    Mutation(MutationKind),
    Transaction,
}

impl Document {
    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        let value: Value = serde_json::from_str(text).map_err(DocumentError::Syntax)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, DocumentError> {
        let Some(object) = value.as_object() else {
            return Err(DocumentError::NotAnObject);
        };

        if let (Some(action), Some(Value::String(entity))) = (object.get("action"), object.get("entity")) {
            return Self::from_legacy(action, entity, value);
        }

        let mut kind: Option<Kind> = None;
        let mut queries = Vec::new();
        let mut mutations = Vec::new();
        let mut transaction = None;

        let mut claim = |next: Kind| -> Result<(), DocumentError> {
            match kind {
                Some(current) if current != next => Err(DocumentError::MixedOperations),
                _ => {
                    kind = Some(next);
                    Ok(())
                }
            }
        };

        for (key, body) in object {
            if key == "transaction" {
                claim(Kind::Transaction)?;
                if transaction.is_some() {
                    return Err(DocumentError::MixedOperations);
                }
                transaction = Some(TransactionDoc::from_value(body)?);
            } else if key == "query" {
                claim(Kind::Query)?;
                for (entity, entity_body) in entity_map(key, body)? {
                    queries.push(EntityQuery::from_value(entity, entity_body)?);
                }
            } else if let Some(mutation) = MutationKind::from_keyword(key) {
                claim(Kind::Mutation(mutation))?;
                for (entity, entity_body) in entity_map(key, body)? {
                    mutations.push(EntityMutation::from_value(entity, mutation, entity_body)?);
                }
            } else if keywords::is_reserved(key) || !body.is_object() {
                return Err(DocumentError::UnexpectedKey(key.clone()));
            } else {
                claim(Kind::Query)?;
                queries.push(EntityQuery::from_value(key, body)?);
            }
        }

        match kind {
            None => Err(DocumentError::Empty),
            Some(Kind::Query) => Ok(Document::Query(queries)),
            Some(Kind::Mutation(mutation)) => Ok(Document::Mutation(mutation, mutations)),
            Some(Kind::Transaction) => Ok(Document::Transaction(transaction.unwrap_or_default())),
        }
    }

    /// `{"action": "query", "entity": "Person", ...}`
    fn from_legacy(action: &Value, entity: &str, body: &Value) -> Result<Self, DocumentError> {
        match action.as_str() {
            Some("query") => Ok(Document::Query(vec![EntityQuery::from_value(entity, body)?])),
            Some(action) => {
                let kind = MutationKind::from_keyword(action)
                    .ok_or_else(|| DocumentError::UnexpectedKey(action.to_string()))?;
                Ok(Document::Mutation(
                    kind,
                    vec![EntityMutation::from_value(entity, kind, body)?],
                ))
            }
            None => Err(DocumentError::UnexpectedKey("action".to_string())),
        }
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        match self {
            Document::Query(_) => Mode::Query,
            Document::Mutation(kind, _) => kind.mode(),
            Document::Transaction(_) => Mode::Transaction,
        }
    }

    /// The entity the document is primarily about: the first one it names.
    #[must_use]
    pub fn active_entity(&self) -> Option<&str> {
        match self {
            Document::Query(queries) => queries.first().map(|query| query.name.as_str()),
            Document::Mutation(_, mutations) => mutations.first().map(|m| m.entity.as_str()),
            Document::Transaction(transaction) => transaction
                .steps
                .first()
                .map(|step| step.mutation.entity.as_str()),
        }
    }
}

fn entity_map<'a>(
    key: &str,
    body: &'a Value,
) -> Result<&'a serde_json::Map<String, Value>, DocumentError> {
    body.as_object()
        .ok_or_else(|| DocumentError::UnexpectedKey(key.to_string()))
}

/// The active entity of possibly half-typed text.
///
/// Valid documents answer from their structure; anything else falls back to
/// the first capitalized key that is not a keyword.
#[must_use]
pub fn active_entity(text: &str) -> Option<String> {
    if let Ok(document) = Document::parse(text) {
        return document.active_entity().map(str::to_string);
    }
    ENTITY_KEY
        .captures_iter(text)
        .filter_map(|captures| captures.get(1))
        .map(|name| name.as_str())
        .find(|name| !keywords::is_reserved(name))
        .map(str::to_string)
}
