mod references;
mod step;
mod transaction;

use thiserror::Error;

pub use crate::references::variable_refs;
pub use crate::references::VariableRef;
pub use crate::step::Step;
pub use crate::step::StepPatch;
pub use crate::transaction::Transaction;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TransactionError {
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),
    #[error("'{field}' is not a field of {entity}")]
    UnknownField { entity: String, field: String },
    #[error("step {index} does not exist ({len} steps)")]
    StepOutOfRange { index: usize, len: usize },
    #[error("{0} is not available to this step")]
    UnavailableVariable(String),
    #[error("transaction is not ready to submit: {}", .0.join("; "))]
    Invalid(Vec<String>),
}
