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

//! In-memory [`Cursor`] used by the unit tests.

use std::collections::VecDeque;

use crate::cursor::Cursor;
use crate::error::Error;
use crate::transaction::TransactionOptions;
use crate::value::{Row, Value};

struct Response {
    sql_contains: String,
    first_param: Option<Value>,
    rows: Vec<Row>,
}

struct Failure {
    sql_contains: String,
    sqlcode: i32,
    gdscode: u32,
    message: String,
    remaining: Option<usize>,
}

/// Records every statement and answers catalog queries from scripted rows.
pub(crate) struct MockCursor {
    log: Vec<(String, Vec<Value>)>,
    responses: Vec<Response>,
    failures: Vec<Failure>,
    pending: VecDeque<Row>,
    banner: String,
}

impl MockCursor {
    pub(crate) fn new() -> Self {
        Self::with_banner("WI-V3.0.5.33220 Firebird 3.0")
    }

    pub(crate) fn with_banner(banner: &str) -> Self {
        Self {
            log: Vec::new(),
            responses: Vec::new(),
            failures: Vec::new(),
            pending: VecDeque::new(),
            banner: banner.to_string(),
        }
    }

    /// Answer statements containing `sql_contains` with `rows`.
    pub(crate) fn on(&mut self, sql_contains: &str, rows: Vec<Vec<Value>>) -> &mut Self {
        self.responses.push(Response {
            sql_contains: sql_contains.to_string(),
            first_param: None,
            rows: rows.into_iter().map(Row::new).collect(),
        });
        self
    }

    /// Like `on`, but only when the first bound parameter equals `param`.
    pub(crate) fn on_param(&mut self, sql_contains: &str, param: &str, rows: Vec<Vec<Value>>) -> &mut Self {
        self.responses.push(Response {
            sql_contains: sql_contains.to_string(),
            first_param: Some(Value::from(param)),
            rows: rows.into_iter().map(Row::new).collect(),
        });
        self
    }

    /// Fail the next statement containing `sql_contains`.
    pub(crate) fn fail_once(&mut self, sql_contains: &str, gdscode: u32, message: &str) -> &mut Self {
        self.failures.push(Failure {
            sql_contains: sql_contains.to_string(),
            sqlcode: -607,
            gdscode,
            message: message.to_string(),
            remaining: Some(1),
        });
        self
    }

    /// Fail every statement containing `sql_contains`.
    pub(crate) fn fail_always(&mut self, sql_contains: &str, sqlcode: i32, gdscode: u32, message: &str) -> &mut Self {
        self.failures.push(Failure {
            sql_contains: sql_contains.to_string(),
            sqlcode,
            gdscode,
            message: message.to_string(),
            remaining: None,
        });
        self
    }

    /// Every statement, including BEGIN/COMMIT/ROLLBACK markers.
    pub(crate) fn statements(&self) -> Vec<String> {
        self.log.iter().map(|(sql, _)| sql.clone()).collect()
    }

    pub(crate) fn params_of(&self, sql_contains: &str) -> Vec<Vec<Value>> {
        self.log
            .iter()
            .filter(|(sql, _)| sql.contains(sql_contains))
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Statements that change data or metadata (catalog reads and
    /// transaction markers filtered out).
    pub(crate) fn ddl(&self) -> Vec<String> {
        self.log
            .iter()
            .map(|(sql, _)| sql.clone())
            .filter(|sql| {
                let head = sql.trim_start().to_ascii_uppercase();
                !(head.starts_with("SELECT") || head == "BEGIN" || head == "COMMIT" || head == "ROLLBACK")
            })
            .collect()
    }

    pub(crate) fn clear_log(&mut self) {
        self.log.clear();
    }
}

impl Cursor for MockCursor {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<(), Error> {
        self.log.push((sql.to_string(), params.to_vec()));
        self.pending.clear();

        if let Some(pos) = self.failures.iter().position(|f| sql.contains(&f.sql_contains)) {
            let failure = &mut self.failures[pos];
            let err = Error::database(failure.sqlcode, failure.gdscode, failure.message.clone());
            if let Some(remaining) = failure.remaining.as_mut() {
                *remaining -= 1;
                if *remaining == 0 {
                    self.failures.remove(pos);
                }
            }
            return Err(err);
        }

        let matched = self.responses.iter().find(|r| {
            sql.contains(&r.sql_contains)
                && r.first_param.as_ref().is_none_or(|p| params.first() == Some(p))
        });
        if let Some(response) = matched {
            self.pending = response.rows.iter().cloned().collect();
        }
        Ok(())
    }

    fn fetchone(&mut self) -> Result<Option<Row>, Error> {
        Ok(self.pending.pop_front())
    }

    fn fetchall(&mut self) -> Result<Vec<Row>, Error> {
        Ok(self.pending.drain(..).collect())
    }

    fn begin(&mut self, _options: &TransactionOptions) -> Result<(), Error> {
        self.log.push(("BEGIN".to_string(), Vec::new()));
        Ok(())
    }

    fn commit(&mut self) -> Result<(), Error> {
        self.log.push(("COMMIT".to_string(), Vec::new()));
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), Error> {
        self.log.push(("ROLLBACK".to_string(), Vec::new()));
        Ok(())
    }

    fn server_version(&mut self) -> Result<String, Error> {
        Ok(self.banner.clone())
    }
}
