mod position;
mod render;
mod span;

pub use position::LineCol;
pub use position::LineIndex;
pub use position::PositionEncoding;
pub use render::DiagnosticRenderer;
pub use render::Report;
pub use render::Severity;
pub use span::ByteOffset;
pub use span::Span;
