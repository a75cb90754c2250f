use sgls_source::LineCol;
use sgls_source::LineIndex;
use sgls_source::PositionEncoding;
use sgls_source::Span;
use tower_lsp_server::ls_types;

pub trait SpanExt {
    fn to_lsp_range(
        &self,
        text: &str,
        index: &LineIndex,
        encoding: PositionEncoding,
    ) -> ls_types::Range;
}

impl SpanExt for Span {
    fn to_lsp_range(
        &self,
        text: &str,
        index: &LineIndex,
        encoding: PositionEncoding,
    ) -> ls_types::Range {
        let start = index.to_line_col(self.start_offset(), text, encoding);
        let end = index.to_line_col(self.end_offset(), text, encoding);
        ls_types::Range::new(start.to_lsp(), end.to_lsp())
    }
}

pub trait LineColExt {
    fn to_lsp(&self) -> ls_types::Position;
}

impl LineColExt for LineCol {
    fn to_lsp(&self) -> ls_types::Position {
        ls_types::Position::new(self.line(), self.column())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_counts_utf16_units() {
        let text = "{\"naïve\": 1,\n \"😀x\": 2}";
        let index = LineIndex::from_text(text);
        let start = text.find('x').unwrap();
        let range = Span::from_parts(start, 1).to_lsp_range(text, &index, PositionEncoding::Utf16);

        assert_eq!(range.start, ls_types::Position::new(1, 4));
        assert_eq!(range.end, ls_types::Position::new(1, 5));
    }
}
