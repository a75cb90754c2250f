//! Editor intelligence for request documents: cursor context, completion
//! and schema diagnostics. Nothing here knows about the LSP transport beyond
//! converting results into `ls_types`.

pub mod completions;
pub mod context;
pub mod diagnostics;
mod ext;

pub use completions::complete;
pub use completions::to_completion_item;
pub use completions::Suggestion;
pub use completions::SuggestionKind;
pub use completions::TextEdit;
pub use context::detect_context;
pub use context::CompletionContext;
pub use context::ContextKind;
pub use diagnostics::collect_diagnostics;
pub use diagnostics::validate;
pub use diagnostics::Finding;
pub use diagnostics::FindingCode;
pub use ext::SpanExt;

pub const SOURCE_NAME: &str = "sgls";
