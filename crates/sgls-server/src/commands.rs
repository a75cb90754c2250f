//! `workspace/executeCommand` handlers.
//!
//! Every command takes a single JSON argument and answers with JSON, so an
//! editor extension can drive the builder and the transaction step list
//! without reimplementing either.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::json;
use serde_json::Map;
use serde_json::Value;
use sgls_builder::synthesize;
use sgls_builder::Path;
use sgls_builder::Restored;
use sgls_builder::SelectionState;
use sgls_builder::SyncEvent;
use sgls_builder::SynthesisOptions;
use sgls_document::DocumentError;
use sgls_document::Mode;
use sgls_document::TransactionDoc;
use sgls_schema::Schema;
use sgls_transaction::Transaction;
use sgls_transaction::TransactionError;
use thiserror::Error;

use crate::session::Session;

pub const SYNTHESIZE: &str = "sgls.synthesize";
pub const TRANSACTION: &str = "sgls.transaction";
pub const SWITCH_MODE: &str = "sgls.switchMode";

pub const COMMANDS: [&str; 3] = [SYNTHESIZE, TRANSACTION, SWITCH_MODE];

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("no schema loaded")]
    NoSchema,
    #[error("invalid arguments: {0}")]
    Arguments(#[from] serde_json::Error),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

pub fn execute(
    command: &str,
    arguments: Vec<Value>,
    session: &mut Session,
) -> Result<Value, CommandError> {
    let argument = arguments.into_iter().next().unwrap_or(Value::Null);
    match command {
        SYNTHESIZE => {
            let request: BuilderRequest = serde_json::from_value(argument)?;
            let schema = session.schema().ok_or(CommandError::NoSchema)?;
            request.synthesize(schema, &session.synthesis_options())
        }
        TRANSACTION => transaction(&argument, session.schema().ok_or(CommandError::NoSchema)?),
        SWITCH_MODE => {
            let request: SwitchModeRequest = serde_json::from_value(argument)?;
            request.switch(session)
        }
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

/// The editor's current text and the mode it is moving to.
#[derive(Debug, Deserialize)]
struct SwitchModeRequest {
    mode: String,
    text: String,
}

impl SwitchModeRequest {
    /// Save `text` under the builder's current mode and answer with the
    /// document to show in the new one.
    fn switch(&self, session: &mut Session) -> Result<Value, CommandError> {
        let mode: Mode = self.mode.parse()?;
        let builder = session.builder_mut();
        builder.edit_text(&self.text);

        let Some(SyncEvent::ModeSwitched { text, restored, .. }) = builder.switch_mode(mode) else {
            return Ok(json!({ "mode": mode.as_str(), "text": self.text, "restored": null }));
        };
        let restored = match restored {
            Restored::Saved => "saved",
            Restored::Template => "template",
            Restored::Fallback => "fallback",
            Restored::Synthesized => "synthesized",
        };
        Ok(json!({ "mode": mode.as_str(), "text": text, "restored": restored }))
    }
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
struct PageRequest {
    limit: Option<u64>,
    offset: Option<u64>,
}

/// Builder state as sent by the client, every map keyed by dot-joined path
/// (`Person`, `Person.owned_properties`).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BuilderRequest {
    entity: Option<String>,
    fields: BTreeMap<String, Vec<String>>,
    filters: BTreeMap<String, Map<String, Value>>,
    pagination: BTreeMap<String, PageRequest>,
    expanded: Vec<String>,
}

impl BuilderRequest {
    fn state(&self) -> SelectionState {
        let mut state = SelectionState::new();
        for (path, fields) in &self.fields {
            state.set_fields(&Path::parse(path), fields.clone());
        }
        for (path, filters) in &self.filters {
            let path = Path::parse(path);
            for (key, value) in filters {
                state.set_filter(&path, key, value.clone());
            }
        }
        for (path, page) in &self.pagination {
            let path = Path::parse(path);
            state.set_limit(&path, page.limit);
            state.set_offset(&path, page.offset);
        }
        for path in &self.expanded {
            state.set_expanded(&Path::parse(path), true);
        }
        state
    }

    fn synthesize(&self, schema: &Schema, options: &SynthesisOptions) -> Result<Value, CommandError> {
        let document = synthesize(self.entity.as_deref(), &self.state(), schema, options);
        let text = document
            .as_ref()
            .map(serde_json::to_string_pretty)
            .transpose()?;
        Ok(json!({ "document": document, "text": text }))
    }
}

/// Validate a step list and build its submission document.
///
/// Accepts the bare `{"steps": [...]}` body or the full `{"transaction": ...}`
/// document. Validation problems are part of the answer, not an error.
fn transaction(argument: &Value, schema: &Schema) -> Result<Value, CommandError> {
    let body = argument.get("transaction").unwrap_or(argument);
    let doc = TransactionDoc::from_value(body)?;
    let transaction = Transaction::from_doc(&doc, schema)?;

    match transaction.prepare_submission(schema) {
        Ok(document) => Ok(json!({ "document": document, "errors": [] })),
        Err(TransactionError::Invalid(messages)) => {
            tracing::debug!(count = messages.len(), "transaction not ready");
            Ok(json!({ "document": null, "errors": messages }))
        }
        Err(err) => Err(err.into()),
    }
}
