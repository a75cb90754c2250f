mod graph;
mod model;
mod source;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

use camino::Utf8PathBuf;
use thiserror::Error;

pub use crate::graph::IntegrityIssue;
pub use crate::model::split_filter_key;
pub use crate::model::AccessPolicy;
pub use crate::model::Cardinality;
pub use crate::model::Entity;
pub use crate::model::Field;
pub use crate::model::FieldType;
pub use crate::model::Reference;
pub use crate::model::Relation;
pub use crate::model::Schema;
pub use crate::model::Service;
pub use crate::model::TenantStrategy;
pub use crate::model::Through;
pub use crate::model::SUPPORTED_OPS;
pub use crate::source::schema_source;
pub use crate::source::FileSchemaSource;
pub use crate::source::HttpSchemaSource;
pub use crate::source::SchemaSource;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("failed to read schema from {path}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to fetch schema")]
    Http(#[from] reqwest::Error),
    #[error("schema endpoint {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("schema is not a valid entity graph")]
    Parse(#[source] serde_json::Error),
}
