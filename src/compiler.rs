// MIT License
//
// Copyright (c) 2021 Hajime Nakagami<nakagami@gmail.com>
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! SELECT rewriting: `FIRST`/`SKIP` pagination and explicit casts for
//! select items built only from parameters.

use super::error::Error;
use super::options::BackendOptions;
use super::quoting::quote_identifier;
use super::sql::SqlFragment;
use super::value::Value;
use super::version::EngineCapabilities;

/// Rows to skip and, if bounded, rows to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageWindow {
    pub offset: u64,
    pub limit: Option<u64>,
}

impl PageWindow {
    pub fn new(offset: u64, limit: Option<u64>) -> Self {
        Self { offset, limit }
    }

    /// From slice marks `[low, high)`.
    pub fn from_marks(low: u64, high: Option<u64>) -> Self {
        Self {
            offset: low,
            limit: high.map(|h| h.saturating_sub(low)),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.offset == 0 && self.limit.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub sql: SqlFragment,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn new(sql: impl Into<SqlFragment>) -> Self {
        Self {
            sql: sql.into(),
            alias: None,
        }
    }

    pub fn alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }
}

/// A dialect-neutral SELECT split into the parts the compiler rewrites.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectQuery {
    pub distinct: bool,
    pub columns: Vec<SelectItem>,
    /// Everything after the select list: `FROM ... WHERE ... ORDER BY ...`
    pub from_clause: SqlFragment,
    pub window: PageWindow,
}

const PARAMETER_ONLY_WORDS: [&str; 9] = ["CASE", "WHEN", "THEN", "ELSE", "END", "NULL", "AND", "OR", "NOT"];

/// True when `sql` binds parameters but references no column, so the
/// engine has nothing to infer the result type from.
fn is_parameter_only(sql: &SqlFragment) -> bool {
    if sql.params.is_empty() || sql.template.contains('"') {
        return false;
    }
    let mut in_literal = false;
    let mut word = String::new();
    let mut words = Vec::new();
    for c in sql.template.chars().chain(std::iter::once(' ')) {
        if c == '\'' {
            in_literal = !in_literal;
            continue;
        }
        if in_literal {
            continue;
        }
        if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
            word.push(c);
        } else if !word.is_empty() {
            words.push(std::mem::take(&mut word));
        }
    }
    words.iter().all(|w| {
        w.chars().all(|c| c.is_ascii_digit()) || PARAMETER_ONLY_WORDS.contains(&w.to_ascii_uppercase().as_str())
    })
}

/// Column type for `CAST(item AS ...)` chosen from the bound values.
fn cast_type(params: &[Value], caps: &EngineCapabilities) -> String {
    let widest_text = params
        .iter()
        .filter_map(|p| p.as_str().map(|s| s.chars().count()))
        .max();
    if let Some(len) = widest_text {
        return format!("VARCHAR({})", len.max(1));
    }
    let sample = params.iter().rev().find(|p| !p.is_null());
    match sample {
        Some(Value::Bool(_)) if caps.supports_boolean_type => "BOOLEAN".to_string(),
        Some(Value::Bool(_)) => "SMALLINT".to_string(),
        Some(Value::Int(_)) => "BIGINT".to_string(),
        Some(Value::Float(_)) => "DOUBLE PRECISION".to_string(),
        Some(Value::Decimal(d)) => format!("DECIMAL(18, {})", d.scale()),
        Some(Value::Date(_)) => "DATE".to_string(),
        Some(Value::Time(_)) => "TIME".to_string(),
        Some(Value::Timestamp(_)) => "TIMESTAMP".to_string(),
        Some(Value::Bytes(b)) => format!("VARCHAR({}) CHARACTER SET OCTETS", b.len().max(1)),
        Some(Value::Uuid(_)) => "CHAR(32)".to_string(),
        Some(Value::Text(_)) | Some(Value::Null) | None => "VARCHAR(1)".to_string(),
    }
}

/// Splice `FIRST`/`SKIP` right after the leading `SELECT`.
pub fn paginate(sql: &SqlFragment, window: PageWindow, no_limit_value: Option<u64>) -> Result<SqlFragment, Error> {
    let trimmed = sql.template.trim_start();
    let is_select = trimmed
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("SELECT"))
        && trimmed[6..].starts_with(|c: char| c.is_whitespace());
    if !is_select {
        return Err(Error::not_supported("pagination of a statement that is not a SELECT"));
    }

    let mut limits = Vec::new();
    if let Some(limit) = window.limit {
        limits.push(format!("FIRST {}", limit));
    }
    if window.offset > 0 {
        if window.limit.is_none() {
            if let Some(n) = no_limit_value {
                limits.push(format!("FIRST {}", n));
            }
        }
        limits.push(format!("SKIP {}", window.offset));
    }
    if limits.is_empty() {
        return Ok(sql.clone());
    }
    Ok(SqlFragment::with_params(
        format!("SELECT {} {}", limits.join(" "), trimmed[6..].trim()),
        sql.params.clone(),
    ))
}

/// The compiler hook.
pub struct Compiler<'a> {
    caps: &'a EngineCapabilities,
    options: &'a BackendOptions,
}

impl<'a> Compiler<'a> {
    pub fn new(caps: &'a EngineCapabilities, options: &'a BackendOptions) -> Self {
        Self { caps, options }
    }

    /// Rewrite an already compiled SELECT for `window`.
    pub fn compile(&self, sql: &SqlFragment, window: PageWindow) -> Result<SqlFragment, Error> {
        let out = paginate(sql, window, self.options.no_limit_value)?;
        out.validate()?;
        Ok(out)
    }

    pub fn select_item_sql(&self, item: &SelectItem) -> SqlFragment {
        let mut out = if is_parameter_only(&item.sql) {
            let db_type = cast_type(&item.sql.params, self.caps);
            SqlFragment::format(&format!("CAST({{}} AS {})", db_type), &[&item.sql])
        } else {
            item.sql.clone()
        };
        if let Some(alias) = &item.alias {
            out.push_sql(&format!(" AS {}", quote_identifier(alias, self.caps)));
        }
        out
    }

    pub fn as_sql(&self, query: &SelectQuery) -> Result<SqlFragment, Error> {
        if query.columns.is_empty() {
            return Err(Error::not_supported("SELECT without columns"));
        }
        let mut sql = SqlFragment::new(if query.distinct { "SELECT DISTINCT " } else { "SELECT " });
        let items: Vec<SqlFragment> = query.columns.iter().map(|c| self.select_item_sql(c)).collect();
        sql.push_fragment(&SqlFragment::join(&items, ", "));
        if query.from_clause.is_empty() {
            sql.push_sql(" FROM RDB$DATABASE");
        } else {
            sql.push_sql(" ");
            sql.push_fragment(&query.from_clause);
        }
        self.compile(&sql, query.window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::ServerVersion;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn caps() -> EngineCapabilities {
        EngineCapabilities::new(ServerVersion([3, 0, 5, 0]))
    }

    fn select() -> SqlFragment {
        SqlFragment::with_params(
            "SELECT \"ID\", \"NAME\" FROM \"AUTHOR\" WHERE \"AGE\" > ? ORDER BY \"ID\"",
            vec![Value::Int(18)],
        )
    }

    #[test]
    fn test_paginate() {
        let sql = paginate(&select(), PageWindow::new(20, Some(10)), None).unwrap();
        assert_eq!(
            sql.template,
            "SELECT FIRST 10 SKIP 20 \"ID\", \"NAME\" FROM \"AUTHOR\" WHERE \"AGE\" > ? ORDER BY \"ID\""
        );
        assert_eq!(sql.params, vec![Value::Int(18)]);

        let sql = paginate(&select(), PageWindow::new(0, Some(5)), None).unwrap();
        assert!(sql.template.starts_with("SELECT FIRST 5 \"ID\""));
        assert!(!sql.template.contains("SKIP"));

        let sql = paginate(&select(), PageWindow::default(), None).unwrap();
        assert_eq!(sql, select());
    }

    #[test]
    fn test_paginate_offset_only() {
        let sql = paginate(&select(), PageWindow::new(3, None), None).unwrap();
        assert!(sql.template.starts_with("SELECT SKIP 3 \"ID\""));

        let sql = paginate(&select(), PageWindow::new(3, None), Some(1_000_000)).unwrap();
        assert!(sql.template.starts_with("SELECT FIRST 1000000 SKIP 3 \"ID\""));
    }

    #[test]
    fn test_paginate_window_properties() {
        for offset in [0u64, 1, 7] {
            for limit in [None, Some(0u64), Some(4)] {
                let sql = paginate(&select(), PageWindow::new(offset, limit), None).unwrap();
                assert_eq!(sql.template.contains(&format!("SKIP {}", offset)), offset > 0);
                assert_eq!(sql.template.contains("FIRST"), limit.is_some());
                sql.validate().unwrap();
            }
        }
    }

    #[test]
    fn test_paginate_rejects_non_select() {
        let update = SqlFragment::new("UPDATE \"AUTHOR\" SET \"AGE\" = 1");
        assert!(paginate(&update, PageWindow::new(1, Some(1)), None).is_err());
        let selected = SqlFragment::new("SELECTED");
        assert!(paginate(&selected, PageWindow::new(1, Some(1)), None).is_err());
    }

    #[test]
    fn test_from_marks() {
        assert_eq!(PageWindow::from_marks(10, Some(15)), PageWindow::new(10, Some(5)));
        assert!(PageWindow::from_marks(0, None).is_unbounded());
    }

    #[test]
    fn test_parameter_only_items_are_cast() {
        let (caps, options) = (caps(), BackendOptions::default());
        let compiler = Compiler::new(&caps, &options);
        let query = SelectQuery {
            distinct: false,
            columns: vec![
                SelectItem::new("\"ID\""),
                SelectItem::new(SqlFragment::param("hello")).alias("greeting"),
                SelectItem::new(SqlFragment::with_params(
                    "CASE WHEN \"AGE\" > ? THEN ? ELSE ? END",
                    vec![Value::Int(1), Value::from("a"), Value::from("b")],
                )),
                SelectItem::new(SqlFragment::with_params(
                    "CASE WHEN ? = 1 THEN ? ELSE NULL END",
                    vec![Value::Int(1), Value::Decimal(dec!(2.50))],
                )),
            ],
            from_clause: SqlFragment::new("FROM \"AUTHOR\""),
            window: PageWindow::new(0, Some(1)),
        };
        let sql = compiler.as_sql(&query).unwrap();
        assert_eq!(
            sql.template,
            "SELECT FIRST 1 \"ID\", CAST(? AS VARCHAR(5)) AS \"GREETING\", \
             CASE WHEN \"AGE\" > ? THEN ? ELSE ? END, \
             CAST(CASE WHEN ? = 1 THEN ? ELSE NULL END AS DECIMAL(18, 2)) FROM \"AUTHOR\""
        );
        assert_eq!(sql.params.len(), 6);
    }

    #[test]
    fn test_select_without_from() {
        let (caps, options) = (caps(), BackendOptions::default());
        let compiler = Compiler::new(&caps, &options);
        let query = SelectQuery {
            columns: vec![SelectItem::new(SqlFragment::param(Value::Int(1)))],
            ..SelectQuery::default()
        };
        let sql = compiler.as_sql(&query).unwrap();
        assert_eq!(sql.template, "SELECT CAST(? AS BIGINT) FROM RDB$DATABASE");
    }
}
