use anyhow::anyhow;
use anyhow::Result;
use rustc_hash::FxHashMap;
use sgls_document::Document;
use sgls_document::Mode;
use sgls_document::MutationKind;
use sgls_source::LineIndex;
use sgls_source::PositionEncoding;
use tower_lsp_server::ls_types::DidChangeTextDocumentParams;
use tower_lsp_server::ls_types::DidCloseTextDocumentParams;
use tower_lsp_server::ls_types::DidOpenTextDocumentParams;
use tower_lsp_server::ls_types::Range;
use tracing::debug;
use tracing::instrument;

use crate::ext::PositionExt;

/// Open request documents, keyed by URI.
#[derive(Debug, Default)]
pub struct Store {
    documents: FxHashMap<String, TextDocument>,
}

impl Store {
    #[instrument(skip(self, params), fields(uri = params.text_document.uri.as_str()))]
    pub fn handle_did_open(&mut self, params: &DidOpenTextDocumentParams) {
        let document = TextDocument::new(
            params.text_document.text.clone(),
            params.text_document.version,
        );
        debug!(version = document.version, mode = %document.mode, "opening document");
        self.documents
            .insert(params.text_document.uri.as_str().to_string(), document);
    }

    #[instrument(skip(self, params, encoding), fields(uri = params.text_document.uri.as_str()))]
    pub fn handle_did_change(
        &mut self,
        params: &DidChangeTextDocumentParams,
        encoding: PositionEncoding,
    ) -> Result<()> {
        let uri = params.text_document.uri.as_str();
        let document = self
            .documents
            .get_mut(uri)
            .ok_or_else(|| anyhow!("Document not found: {uri}"))?;

        for change in &params.content_changes {
            if let Some(range) = change.range {
                document.apply_change(range, &change.text, encoding);
            } else {
                document.set_content(change.text.clone());
            }
        }

        document.version = params.text_document.version;
        debug!(version = document.version, mode = %document.mode, "applied changes");
        Ok(())
    }

    pub fn handle_did_close(&mut self, params: &DidCloseTextDocumentParams) {
        self.documents.remove(params.text_document.uri.as_str());
    }

    pub fn get(&self, uri: &str) -> Option<&TextDocument> {
        self.documents.get(uri)
    }

    pub fn uris(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct TextDocument {
    text: String,
    version: i32,
    mode: Mode,
    line_index: LineIndex,
}

impl TextDocument {
    fn new(text: String, version: i32) -> Self {
        let mode = detect_mode(&text).unwrap_or_default();
        let line_index = LineIndex::from_text(&text);
        Self {
            text,
            version,
            mode,
            line_index,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    /// Kind of request the text holds. Half-typed text keeps the last mode
    /// that could be read from it.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn line_index(&self) -> &LineIndex {
        &self.line_index
    }

    fn set_content(&mut self, text: String) {
        self.text = text;
        self.refresh();
    }

    fn apply_change(&mut self, range: Range, new_text: &str, encoding: PositionEncoding) {
        let start = range
            .start
            .to_offset(&self.text, &self.line_index, encoding)
            .as_usize();
        let end = range
            .end
            .to_offset(&self.text, &self.line_index, encoding)
            .as_usize();
        let (start, end) = (start.min(end), end.max(start));
        self.text.replace_range(start..end, new_text);
        self.refresh();
    }

    fn refresh(&mut self) {
        self.line_index = LineIndex::from_text(&self.text);
        if let Some(mode) = detect_mode(&self.text) {
            self.mode = mode;
        }
    }
}

/// Mode of a document, from its parsed shape or, while it does not parse,
/// from its first key.
fn detect_mode(text: &str) -> Option<Mode> {
    if let Ok(document) = Document::parse(text) {
        return Some(document.mode());
    }

    let first_key = text
        .trim_start()
        .strip_prefix('{')?
        .trim_start()
        .strip_prefix('"')?
        .split('"')
        .next()?;

    match first_key {
        "transaction" => Some(Mode::Transaction),
        "query" => Some(Mode::Query),
        key => MutationKind::from_keyword(key).map(MutationKind::mode),
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use tower_lsp_server::ls_types::Position;
    use tower_lsp_server::ls_types::TextDocumentContentChangeEvent;
    use tower_lsp_server::ls_types::TextDocumentIdentifier;
    use tower_lsp_server::ls_types::TextDocumentItem;
    use tower_lsp_server::ls_types::Uri;
    use tower_lsp_server::ls_types::VersionedTextDocumentIdentifier;

    use super::*;

    const URI: &str = "file:///work/people.json";

    fn open(store: &mut Store, text: &str) {
        store.handle_did_open(&DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri: Uri::from_str(URI).unwrap(),
                language_id: "json".to_string(),
                version: 1,
                text: text.to_string(),
            },
        });
    }

    fn change(store: &mut Store, range: Option<Range>, text: &str) {
        store
            .handle_did_change(
                &DidChangeTextDocumentParams {
                    text_document: VersionedTextDocumentIdentifier {
                        uri: Uri::from_str(URI).unwrap(),
                        version: 2,
                    },
                    content_changes: vec![TextDocumentContentChangeEvent {
                        range,
                        range_length: None,
                        text: text.to_string(),
                    }],
                },
                PositionEncoding::Utf16,
            )
            .unwrap();
    }

    #[test]
    fn test_incremental_change() {
        let mut store = Store::default();
        open(&mut store, "{\"Person\": {\n  \"fields\": []\n}}");

        let range = Range::new(Position::new(1, 13), Position::new(1, 13));
        change(&mut store, Some(range), "\"id\"");

        let document = store.get(URI).unwrap();
        assert_eq!(document.text(), "{\"Person\": {\n  \"fields\": [\"id\"]\n}}");
        assert_eq!(document.version(), 2);
        assert_eq!(document.line_index().line_count(), 3);
    }

    #[test]
    fn test_full_change_replaces_text() {
        let mut store = Store::default();
        open(&mut store, "{}");
        change(&mut store, None, "{\"create\": {\"Person\": {\"data\": {}}}}");

        let document = store.get(URI).unwrap();
        assert_eq!(document.mode(), Mode::Create);
    }

    #[test]
    fn test_half_typed_text_keeps_mode() {
        let mut store = Store::default();
        open(&mut store, "{\"transaction\": {\"steps\": [");
        assert_eq!(store.get(URI).unwrap().mode(), Mode::Transaction);

        change(&mut store, None, "{\"steps");
        assert_eq!(store.get(URI).unwrap().mode(), Mode::Transaction);
    }

    #[test]
    fn test_http_alias_mode() {
        assert_eq!(detect_mode("{\"PATCH\": {"), Some(Mode::Update));
        assert_eq!(detect_mode("{\"Person\": {"), None);
    }

    #[test]
    fn test_change_to_unknown_document_fails() {
        let mut store = Store::default();
        let result = store.handle_did_change(
            &DidChangeTextDocumentParams {
                text_document: VersionedTextDocumentIdentifier {
                    uri: Uri::from_str(URI).unwrap(),
                    version: 1,
                },
                content_changes: Vec::new(),
            },
            PositionEncoding::Utf16,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_close_removes_document() {
        let mut store = Store::default();
        open(&mut store, "{}");
        store.handle_did_close(&DidCloseTextDocumentParams {
            text_document: TextDocumentIdentifier::new(Uri::from_str(URI).unwrap()),
        });
        assert!(store.get(URI).is_none());
    }
}
