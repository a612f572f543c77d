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

//! Parameterised SQL assembly.
//!
//! A [`SqlFragment`] is a template with positional `?` placeholders plus the
//! values bound to them, in order. Identifiers never travel as parameters; they
//! are rendered through [`crate::quoting`] before they reach a template.

use std::fmt;

use super::error::Error;
use super::value::Value;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlFragment {
    pub template: String,
    pub params: Vec<Value>,
}

impl SqlFragment {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(template: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            template: template.into(),
            params,
        }
    }

    /// A single bound value.
    pub fn param(value: impl Into<Value>) -> Self {
        Self::with_params("?", vec![value.into()])
    }

    pub fn push_sql(&mut self, sql: &str) -> &mut Self {
        self.template.push_str(sql);
        self
    }

    pub fn push_param(&mut self, value: impl Into<Value>) -> &mut Self {
        self.template.push('?');
        self.params.push(value.into());
        self
    }

    pub fn push_fragment(&mut self, other: &SqlFragment) -> &mut Self {
        self.template.push_str(&other.template);
        self.params.extend(other.params.iter().cloned());
        self
    }

    /// Join fragments with `sep`, concatenating their parameters in order.
    pub fn join(parts: &[SqlFragment], sep: &str) -> SqlFragment {
        let mut out = SqlFragment::default();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                out.push_sql(sep);
            }
            out.push_fragment(part);
        }
        out
    }

    /// Substitute each `{}` in `pattern` with the next fragment.
    pub fn format(pattern: &str, args: &[&SqlFragment]) -> SqlFragment {
        let mut out = SqlFragment::default();
        let mut rest = pattern;
        let mut args = args.iter();
        while let Some(pos) = rest.find("{}") {
            out.push_sql(&rest[..pos]);
            if let Some(arg) = args.next() {
                out.push_fragment(arg);
            }
            rest = &rest[pos + 2..];
        }
        out.push_sql(rest);
        out
    }

    pub fn placeholder_count(&self) -> usize {
        count_placeholders(&self.template)
    }

    /// Placeholders and parameters must pair up exactly before execution.
    pub fn validate(&self) -> Result<(), Error> {
        let placeholders = self.placeholder_count();
        if placeholders != self.params.len() {
            return Err(Error::ParameterMismatch {
                placeholders,
                params: self.params.len(),
            });
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.template.trim().is_empty()
    }
}

impl From<&str> for SqlFragment {
    fn from(sql: &str) -> Self {
        SqlFragment::new(sql)
    }
}

impl From<String> for SqlFragment {
    fn from(sql: String) -> Self {
        SqlFragment::new(sql)
    }
}

impl fmt::Display for SqlFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

/// Count `?` placeholders outside string literals and quoted identifiers.
pub fn count_placeholders(sql: &str) -> usize {
    placeholder_positions(sql).len()
}

/// Byte offsets of the `?` placeholders outside literals.
pub fn placeholder_positions(sql: &str) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut quote: Option<char> = None;
    for (i, c) in sql.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '?' => positions.push(i),
                _ => {}
            },
        }
    }
    positions
}
