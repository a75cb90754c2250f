mod document;
pub mod keywords;
mod locate;
mod mode;
mod page;
mod request;

use thiserror::Error;

pub use crate::document::active_entity;
pub use crate::document::Document;
pub use crate::locate::locate_token;
pub use crate::mode::Mode;
pub use crate::mode::MutationKind;
pub use crate::page::PageInfo;
pub use crate::page::QueryExecutor;
pub use crate::request::EntityMutation;
pub use crate::request::EntityQuery;
pub use crate::request::OnError;
pub use crate::request::StepDoc;
pub use crate::request::TransactionDoc;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("document is not valid JSON")]
    Syntax(#[source] serde_json::Error),
    #[error("document must be a JSON object")]
    NotAnObject,
    #[error("document is empty")]
    Empty,
    #[error("a document may contain only one kind of operation")]
    MixedOperations,
    #[error("unexpected key '{0}'")]
    UnexpectedKey(String),
    #[error("invalid body for '{name}': {message}")]
    InvalidShape { name: String, message: String },
    #[error("transaction step {index}: {reason}")]
    InvalidStep { index: usize, reason: String },
    #[error("unknown mode '{0}'")]
    UnknownMode(String),
    #[error("unknown on_error policy '{0}'")]
    UnknownOnError(String),
}

impl DocumentError {
    pub(crate) fn shape(name: &str, err: serde_json::Error) -> Self {
        DocumentError::InvalidShape {
            name: name.to_string(),
            message: err.to_string(),
        }
    }
}
