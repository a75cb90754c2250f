use sgls_source::Span;

/// Span of the first `"token"` in `text`, covering the characters between
/// the quotes.
///
/// Repeated names all resolve to the first occurrence. A string spelled
/// with escapes (`"em\u0061il"`) is found by its decoded value when no
/// literal spelling is present.
#[must_use]
pub fn locate_token(text: &str, token: &str) -> Option<Span> {
    let needle = format!("\"{token}\"");
    if let Some(found) = text.find(&needle) {
        return Some(Span::from_parts(found + 1, token.len()));
    }
    escaped_strings(text)
        .find(|&(start, end)| {
            serde_json::from_str::<String>(&text[start - 1..=end]).is_ok_and(|value| value == token)
        })
        .map(|(start, end)| Span::from_bounds(start, end))
}

/// Content bounds of every string literal holding a backslash escape.
fn escaped_strings(text: &str) -> impl Iterator<Item = (usize, usize)> + '_ {
    let bytes = text.as_bytes();
    let mut index = 0;
    std::iter::from_fn(move || {
        while index < bytes.len() {
            if bytes[index] != b'"' {
                index += 1;
                continue;
            }
            let start = index + 1;
            let mut escaped = false;
            let mut cursor = start;
            while cursor < bytes.len() && bytes[cursor] != b'"' {
                if bytes[cursor] == b'\\' {
                    escaped = true;
                    cursor += 1;
                }
                cursor += 1;
            }
            if cursor >= bytes.len() {
                return None;
            }
            index = cursor + 1;
            if escaped {
                return Some((start, cursor));
            }
        }
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_covers_token_without_quotes() {
        let text = r#"{"Person": {"fields": ["id", "email"]}}"#;
        let span = locate_token(text, "email").unwrap();
        assert_eq!(&text[span.start_usize()..span.end_usize()], "email");
    }

    #[test]
    fn test_first_occurrence_wins() {
        let text = r#"{"Person": {"fields": ["name"], "filters": {"name": "x"}}}"#;
        let span = locate_token(text, "name").unwrap();
        assert_eq!(span.start_usize(), text.find("name").unwrap());
    }

    #[test]
    fn test_partial_names_do_not_match() {
        assert_eq!(locate_token(r#"{"names": 1}"#, "name"), None);
    }

    #[test]
    fn test_escaped_spelling_is_found() {
        let text = r#"{"Person": {"fields": ["a\"b", "em\u0061il"]}}"#;
        let span = locate_token(text, "email").unwrap();
        assert_eq!(&text[span.start_usize()..span.end_usize()], r"em\u0061il");

        let span = locate_token(text, "a\"b").unwrap();
        assert_eq!(&text[span.start_usize()..span.end_usize()], r#"a\"b"#);
    }
}
