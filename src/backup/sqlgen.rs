use serde_json::Value;

/// Quote a SQL identifier, doubling embedded double quotes.
pub fn sql_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render a JSON value as a SQL literal.
///
/// Nulls become `NULL`, booleans `TRUE`/`FALSE`, numbers print unquoted,
/// strings are single-quoted with embedded quotes doubled, and anything
/// else (arrays, objects) is JSON-stringified first and quoted like a
/// string. These rules must hold exactly or the dump stops being valid SQL.
pub fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_string(s),
        other => quote_string(&other.to_string()),
    }
}

fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Render one row as a single INSERT statement. Columns missing from the
/// row map become NULL.
pub fn insert_statement(
    table: &str,
    columns: &[String],
    row: &serde_json::Map<String, Value>,
) -> String {
    let column_list = columns
        .iter()
        .map(|c| sql_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let value_list = columns
        .iter()
        .map(|c| sql_literal(row.get(c).unwrap_or(&Value::Null)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({});",
        sql_ident(table),
        column_list,
        value_list
    )
}

/// Ordered assembly of the dump text: header comments, safety pragmas,
/// BEGIN, the sections the generator appends, COMMIT.
pub struct SqlScript {
    buf: String,
    finished: bool,
}

impl SqlScript {
    pub fn new(backup_type: &str, source_label: &str) -> Self {
        let mut script = Self {
            buf: String::new(),
            finished: false,
        };
        script.comment("VidGro database backup");
        script.comment(&format!("Type: {}", backup_type));
        script.comment(&format!("Source: {}", source_label));
        script.comment(&format!("Generated at: {}", chrono::Utc::now().to_rfc3339()));
        script.blank();
        script
    }

    /// Transaction-safety pragmas followed by BEGIN.
    pub fn preamble(&mut self) {
        self.raw("SET statement_timeout = 0;");
        self.raw("SET lock_timeout = 0;");
        self.raw("SET client_encoding = 'UTF8';");
        self.raw("SET standard_conforming_strings = on;");
        self.blank();
        self.raw("BEGIN;");
        self.blank();
    }

    pub fn comment(&mut self, text: &str) {
        for line in text.lines() {
            self.buf.push_str("-- ");
            self.buf.push_str(line);
            self.buf.push('\n');
        }
    }

    pub fn section(&mut self, title: &str) {
        self.comment(&format!("=== {} ===", title));
    }

    pub fn raw(&mut self, sql: &str) {
        self.buf.push_str(sql.trim_end());
        self.buf.push('\n');
    }

    pub fn blank(&mut self) {
        self.buf.push('\n');
    }

    /// Append COMMIT and return the assembled text.
    pub fn finish(mut self, committed: bool) -> String {
        if committed && !self.finished {
            self.blank();
            self.raw("COMMIT;");
            self.finished = true;
        }
        self.buf
    }
}
