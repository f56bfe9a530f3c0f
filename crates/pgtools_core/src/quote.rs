//! SQL identifier and literal quoting for generated statements.

/// Wrap an identifier in double quotes, doubling embedded double quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a schema-qualified name as `"schema"."table"`.
pub fn quote_qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_identifier(schema), quote_identifier(table))
}

/// Render a value as a SQL string literal, or the bare `NULL` token.
pub fn escape_literal(value: Option<&str>) -> String {
    match value {
        Some(value) => format!("'{}'", value.replace('\'', "''")),
        None => "NULL".to_string(),
    }
}

/// Render a value for a dumped row.
///
/// Values containing line breaks use the `E'...'` escape-string form so the
/// statement stays on a single line; everything else goes through
/// [`escape_literal`].
pub fn render_value(value: Option<&str>) -> String {
    match value {
        Some(text) if text.contains(['\n', '\r']) => {
            let mut out = String::with_capacity(text.len() + 4);
            out.push_str("E'");
            for ch in text.chars() {
                match ch {
                    '\\' => out.push_str("\\\\"),
                    '\'' => out.push_str("''"),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    other => out.push(other),
                }
            }
            out.push('\'');
            out
        }
        other => escape_literal(other),
    }
}

/// Undo [`quote_identifier`] if `name` is wrapped in double quotes.
pub fn unquote_identifier(name: &str) -> String {
    match name.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')) {
        Some(inner) if name.len() >= 2 => inner.replace("\"\"", "\""),
        _ => name.to_string(),
    }
}
