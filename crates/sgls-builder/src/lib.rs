mod lookup;
mod path;
mod selection;
mod store;
mod sync;
mod synthesize;
pub mod template;

use camino::Utf8PathBuf;
use sgls_document::DocumentError;
use thiserror::Error;

pub use crate::lookup::LookupTicket;
pub use crate::lookup::LookupTracker;
pub use crate::lookup::RecordLookup;
pub use crate::lookup::RecordSummary;
pub use crate::path::Path;
pub use crate::selection::Pagination;
pub use crate::selection::SelectionState;
pub use crate::store::FileModeStore;
pub use crate::store::MemoryModeStore;
pub use crate::store::ModeStore;
pub use crate::sync::Restored;
pub use crate::sync::Session;
pub use crate::sync::SyncEvent;
pub use crate::sync::Synchronizer;
pub use crate::synthesize::synthesize;
pub use crate::synthesize::SynthesisOptions;
pub use crate::synthesize::DEFAULT_LIMIT;
pub use crate::synthesize::MAX_DEPTH;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to access saved document {path}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum BuilderError {
    #[error("no schema loaded")]
    NoSchema,
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("only query documents can be imported into the builder")]
    NotAQuery,
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),
}
