use camino::Utf8PathBuf;
use percent_encoding::percent_decode_str;
use sgls_source::ByteOffset;
use sgls_source::LineCol;
use sgls_source::LineIndex;
use sgls_source::PositionEncoding;
use tower_lsp_server::ls_types;

pub(crate) trait PositionExt {
    fn to_offset(&self, text: &str, index: &LineIndex, encoding: PositionEncoding) -> ByteOffset;
}

impl PositionExt for ls_types::Position {
    fn to_offset(&self, text: &str, index: &LineIndex, encoding: PositionEncoding) -> ByteOffset {
        let line_col = LineCol::new(self.line, self.character);
        index.offset(line_col, text, encoding)
    }
}

pub(crate) trait PositionEncodingExt {
    fn to_lsp(&self) -> ls_types::PositionEncodingKind;
}

impl PositionEncodingExt for PositionEncoding {
    fn to_lsp(&self) -> ls_types::PositionEncodingKind {
        match self {
            PositionEncoding::Utf8 => ls_types::PositionEncodingKind::new("utf-8"),
            PositionEncoding::Utf16 => ls_types::PositionEncodingKind::new("utf-16"),
            PositionEncoding::Utf32 => ls_types::PositionEncodingKind::new("utf-32"),
        }
    }
}

pub(crate) trait PositionEncodingKindExt {
    fn to_position_encoding(&self) -> Option<PositionEncoding>;
}

impl PositionEncodingKindExt for ls_types::PositionEncodingKind {
    fn to_position_encoding(&self) -> Option<PositionEncoding> {
        match self.as_str() {
            "utf-8" => Some(PositionEncoding::Utf8),
            "utf-16" => Some(PositionEncoding::Utf16),
            "utf-32" => Some(PositionEncoding::Utf32),
            _ => None,
        }
    }
}

/// Pick the encoding for the session: UTF-8 when the client offers it (no
/// conversion needed), then UTF-32, then the protocol default UTF-16.
pub(crate) fn negotiate_encoding(capabilities: &ls_types::ClientCapabilities) -> PositionEncoding {
    let offered: Vec<PositionEncoding> = capabilities
        .general
        .as_ref()
        .and_then(|general| general.position_encodings.as_ref())
        .map(|kinds| {
            kinds
                .iter()
                .filter_map(PositionEncodingKindExt::to_position_encoding)
                .collect()
        })
        .unwrap_or_default();

    [PositionEncoding::Utf8, PositionEncoding::Utf32]
        .into_iter()
        .find(|preferred| offered.contains(preferred))
        .unwrap_or_default()
}

pub(crate) trait UriExt {
    /// Local path of a `file:` URI.
    fn to_utf8_path_buf(&self) -> Option<Utf8PathBuf>;
}

impl UriExt for ls_types::Uri {
    fn to_utf8_path_buf(&self) -> Option<Utf8PathBuf> {
        let Some(encoded) = self.as_str().strip_prefix("file://") else {
            tracing::trace!("URI conversion to path failed for: {} (non-file scheme)", self.as_str());
            return None;
        };

        let decoded = percent_decode_str(encoded).decode_utf8().ok()?;

        #[cfg(windows)]
        let decoded = {
            // `/C:/...` -> `C:/...`
            match decoded.strip_prefix('/') {
                Some(rest) => std::borrow::Cow::Owned(rest.to_string()),
                None => decoded,
            }
        };

        Some(Utf8PathBuf::from(decoded.as_ref()))
    }
}
