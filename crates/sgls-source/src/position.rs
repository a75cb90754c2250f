use crate::ByteOffset;

/// Character unit used by a client to express columns.
///
/// LSP defaults to UTF-16; everything internal is a UTF-8 byte offset.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PositionEncoding {
    Utf8,
    #[default]
    Utf16,
    Utf32,
}

impl PositionEncoding {
    fn width(self, ch: char) -> u32 {
        match self {
            PositionEncoding::Utf8 => u32::try_from(ch.len_utf8()).unwrap_or(1),
            PositionEncoding::Utf16 => u32::try_from(ch.len_utf16()).unwrap_or(1),
            PositionEncoding::Utf32 => 1,
        }
    }
}

/// A zero-based line and column position within a text document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineCol {
    line: u32,
    column: u32,
}

impl LineCol {
    #[must_use]
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    #[must_use]
    pub fn column(&self) -> u32 {
        self.column
    }
}

/// Byte offsets of every line start, for offset <-> line/column conversion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineIndex {
    line_starts: Vec<u32>,
    length: u32,
}

impl LineIndex {
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(u32::try_from(i + 1).unwrap_or(u32::MAX));
            }
        }

        Self {
            line_starts,
            length: u32::try_from(text.len()).unwrap_or(u32::MAX),
        }
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    #[must_use]
    pub fn line_start(&self, line: u32) -> Option<u32> {
        self.line_starts.get(line as usize).copied()
    }

    fn line_end(&self, line: usize) -> u32 {
        self.line_starts
            .get(line + 1)
            .copied()
            .unwrap_or(self.length)
    }

    /// Convert a byte offset to a line/column pair, with the column counted in
    /// units of `encoding`. Offsets past the end clamp to the end of the text.
    #[must_use]
    pub fn to_line_col(&self, offset: ByteOffset, text: &str, encoding: PositionEncoding) -> LineCol {
        let offset = offset.get().min(self.length);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        };
        let line_start = self.line_starts[line];

        let column = match encoding {
            PositionEncoding::Utf8 => offset - line_start,
            _ => text
                .get(line_start as usize..offset as usize)
                .map_or(offset - line_start, |prefix| {
                    prefix.chars().map(|ch| encoding.width(ch)).sum()
                }),
        };

        LineCol::new(u32::try_from(line).unwrap_or(u32::MAX), column)
    }

    /// Convert a line/column position back to a byte offset.
    ///
    /// Columns past the end of the line clamp to the line end (excluding the
    /// newline); lines past the end clamp to the end of the text.
    #[must_use]
    pub fn offset(&self, position: LineCol, text: &str, encoding: PositionEncoding) -> ByteOffset {
        let Some(&line_start) = self.line_starts.get(position.line() as usize) else {
            return ByteOffset::new(self.length);
        };
        let mut line_end = self.line_end(position.line() as usize);
        if text.as_bytes().get(line_end.saturating_sub(1) as usize) == Some(&b'\n')
            && line_end > line_start
        {
            line_end -= 1;
        }

        let Some(line_text) = text.get(line_start as usize..line_end as usize) else {
            return ByteOffset::new(line_start);
        };

        let mut units = 0;
        let mut bytes = 0;
        for ch in line_text.chars() {
            if units >= position.column() {
                break;
            }
            units += encoding.width(ch);
            bytes += u32::try_from(ch.len_utf8()).unwrap_or(1);
        }

        ByteOffset::new(line_start + bytes)
    }
}
