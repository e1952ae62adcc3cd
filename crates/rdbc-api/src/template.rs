//! Statement templates with named `:name` placeholders.
//!
//! Placeholders start with an ASCII letter followed by letters, digits or
//! underscores. Text inside single-quoted strings, double-quoted
//! identifiers, `--` and `/* */` comments is left alone, as are `::` casts.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Param(usize),
}

/// A parsed SQL template. Parameters are ordered by first occurrence and a
/// repeated name is a single parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlTemplate {
    sql: String,
    parameters: Vec<String>,
    segments: Vec<Segment>,
}

impl SqlTemplate {
    pub fn parse(sql: impl Into<String>) -> Self {
        let sql = sql.into();
        let bytes = sql.as_bytes();
        let mut parameters: Vec<String> = Vec::new();
        let mut segments = Vec::new();
        let mut text_start = 0;
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\'' | b'"' => i = skip_quoted(bytes, i),
                b'-' if bytes.get(i + 1) == Some(&b'-') => i = skip_line_comment(bytes, i),
                b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
                b':' if bytes.get(i + 1) == Some(&b':') => i += 2,
                b':' if bytes.get(i + 1).is_some_and(u8::is_ascii_alphabetic) => {
                    let end = identifier_end(bytes, i + 1);
                    let name = &sql[i + 1..end];
                    if text_start < i {
                        segments.push(Segment::Text(sql[text_start..i].to_string()));
                    }
                    let index = match parameters.iter().position(|p| p == name) {
                        Some(index) => index,
                        None => {
                            parameters.push(name.to_string());
                            parameters.len() - 1
                        }
                    };
                    segments.push(Segment::Param(index));
                    text_start = end;
                    i = end;
                }
                _ => i += 1,
            }
        }
        if text_start < bytes.len() {
            segments.push(Segment::Text(sql[text_start..].to_string()));
        }
        Self {
            sql,
            parameters,
            segments,
        }
    }

    /// The template as written, placeholders included.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameter_names(&self) -> &[String] {
        &self.parameters
    }

    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    pub fn has_parameters(&self) -> bool {
        !self.parameters.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p == name)
    }

    /// Renders the template with PostgreSQL-style `$1..$n` markers.
    pub fn native_sql(&self) -> String {
        self.render(|index| format!("${}", index + 1))
    }

    /// Renders the template, replacing each placeholder occurrence with
    /// `marker(parameter_index)`.
    pub fn render(&self, marker: impl Fn(usize) -> String) -> String {
        let mut out = String::with_capacity(self.sql.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Param(index) => out.push_str(&marker(*index)),
            }
        }
        out
    }
}

impl fmt::Display for SqlTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

fn skip_quoted(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        if bytes[i] == quote {
            // doubled quote is an escaped quote
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn skip_line_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|b| *b == b'\n')
        .map_or(bytes.len(), |offset| start + offset + 1)
}

fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map_or(bytes.len(), |offset| start + 2 + offset + 2)
}

fn identifier_end(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|b| !(b.is_ascii_alphanumeric() || *b == b'_'))
        .map_or(bytes.len(), |offset| start + offset)
}

#[cfg(test)]
mod tests {
    use super::SqlTemplate;

    #[test]
    fn collects_names_in_first_occurrence_order() {
        let template =
            SqlTemplate::parse("select * from t where a = :b and c = :a or d = :b");
        assert_eq!(template.parameter_names(), ["b", "a"]);
        assert_eq!(
            template.native_sql(),
            "select * from t where a = $1 and c = $2 or d = $1"
        );
    }

    #[test]
    fn skips_quotes_comments_and_casts() {
        let template = SqlTemplate::parse(
            "select ':no', \"x:no\", v::int -- :no\n, /* :no */ :yes_1 from t where s = 'it''s :no'",
        );
        assert_eq!(template.parameter_names(), ["yes_1"]);
        assert!(template.native_sql().contains("v::int"));
        assert!(template.native_sql().contains("$1 from t"));
    }

    #[test]
    fn placeholder_must_start_with_letter() {
        let template = SqlTemplate::parse("select :1, :_x, :ok9");
        assert_eq!(template.parameter_names(), ["ok9"]);
        assert_eq!(template.native_sql(), "select :1, :_x, $1");
    }

    #[test]
    fn template_without_placeholders() {
        let template = SqlTemplate::parse("select 1");
        assert!(!template.has_parameters());
        assert_eq!(template.native_sql(), "select 1");
        assert_eq!(template.render(|_| "?".into()), "select 1");
    }
}
