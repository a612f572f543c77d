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

//! Sequence plus BEFORE INSERT trigger standing in for autoincrement keys.

use log::debug;

use super::cursor::Cursor;
use super::error::Error;
use super::model::Model;
use super::quoting::{quote_identifier, truncate_name};
use super::version::EngineCapabilities;

/// Names of the objects backing one table's autoincrement column, already
/// quoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceBinding {
    pub table_name: String,
    pub sequence_name: String,
    pub trigger_name: String,
    pub reset_procedure_name: String,
}

impl SequenceBinding {
    pub fn new(table: &str, caps: &EngineCapabilities) -> Self {
        let base = truncate_name(&table.to_uppercase(), caps.max_identifier_length - 3);
        Self {
            table_name: quote_identifier(table, caps),
            sequence_name: quote_identifier(&format!("{}_SQ", base), caps),
            trigger_name: quote_identifier(&format!("{}_PK", base), caps),
            reset_procedure_name: quote_identifier(&format!("{}_RS", base), caps),
        }
    }

    /// Sequence name as stored in `RDB$GENERATORS`.
    pub fn sequence_catalog_name(&self) -> &str {
        self.sequence_name.trim_matches('"')
    }

    pub fn trigger_catalog_name(&self) -> &str {
        self.trigger_name.trim_matches('"')
    }

    /// `(CREATE SEQUENCE, CREATE TRIGGER)` for `column`.
    pub fn autoinc_sql(&self, column: &str, caps: &EngineCapabilities) -> (String, String) {
        let column = quote_identifier(column, caps);
        let sequence_sql = format!("CREATE SEQUENCE {}", self.sequence_name);
        let trigger_sql = [
            format!("CREATE TRIGGER {} FOR {}", self.trigger_name, self.table_name),
            "BEFORE INSERT AS".to_string(),
            "BEGIN".to_string(),
            format!("   IF (new.{} IS NULL) THEN", column),
            format!("      new.{} = NEXT VALUE FOR {};", column, self.sequence_name),
            "END".to_string(),
        ]
        .join("\n");
        (sequence_sql, trigger_sql)
    }

    pub fn drop_sequence_sql(&self) -> String {
        format!("DROP SEQUENCE {}", self.sequence_name)
    }

    pub fn drop_trigger_sql(&self) -> String {
        format!("DROP TRIGGER {}", self.trigger_name)
    }

    pub fn restart_sql(&self, value: i64) -> String {
        format!("ALTER SEQUENCE {} RESTART WITH {}", self.sequence_name, value)
    }

    pub fn last_insert_id_sql(&self) -> String {
        format!("SELECT GEN_ID({}, 0) FROM RDB$DATABASE", self.sequence_name)
    }

    /// Moves the counter by the difference between `MAX(column)` and its
    /// current value; `GEN_ID` only adjusts by a relative step.
    pub fn reset_sql(&self, column: &str, caps: &EngineCapabilities) -> String {
        format!(
            "SELECT GEN_ID({seq}, COALESCE(MAX({col}), 0) - GEN_ID({seq}, 0)) FROM {table}",
            seq = self.sequence_name,
            col = quote_identifier(column, caps),
            table = self.table_name,
        )
    }

    /// Reset through a throwaway procedure: create, execute, drop.
    pub fn reset_procedure_sql(&self, column: &str, caps: &EngineCapabilities) -> Vec<String> {
        let create = [
            format!("CREATE PROCEDURE {}", self.reset_procedure_name),
            "AS".to_string(),
            "DECLARE VARIABLE start_value BIGINT;".to_string(),
            "BEGIN".to_string(),
            format!(
                "   SELECT GEN_ID({seq}, COALESCE(MAX({col}), 0) - GEN_ID({seq}, 0))",
                seq = self.sequence_name,
                col = quote_identifier(column, caps),
            ),
            format!("   FROM {} INTO :start_value;", self.table_name),
            format!(
                "   EXECUTE STATEMENT 'ALTER SEQUENCE {} RESTART WITH ' || :start_value;",
                self.sequence_name
            ),
            "END".to_string(),
        ]
        .join("\n");
        vec![
            create,
            format!("EXECUTE PROCEDURE {}", self.reset_procedure_name),
            format!("DROP PROCEDURE {}", self.reset_procedure_name),
        ]
    }

    /// Current counter value, the id of the last row inserted through the
    /// trigger.
    pub fn last_insert_id<C: Cursor + ?Sized>(&self, cursor: &mut C) -> Result<i64, Error> {
        let sql = self.last_insert_id_sql();
        debug!("{}", sql);
        cursor.execute(&sql, &[])?;
        match cursor.fetchone()? {
            Some(row) => row.get::<i64>(0),
            None => Err(Error::CatalogInconsistency(format!(
                "sequence {} returned no row",
                self.sequence_name
            ))),
        }
    }
}

/// Sequence and trigger DDL for `model`, empty when it has no
/// autoincrement field.
pub fn autoinc_ddl(model: &Model, caps: &EngineCapabilities) -> Vec<String> {
    match model.auto_field() {
        Some(field) => {
            let (sequence, trigger) = SequenceBinding::new(&model.table, caps).autoinc_sql(&field.column, caps);
            vec![sequence, trigger]
        }
        None => Vec::new(),
    }
}

/// Reset statements for every model with an autoincrement field.
pub fn sequence_reset_sql(models: &[Model], caps: &EngineCapabilities) -> Vec<String> {
    models
        .iter()
        .filter_map(|m| {
            m.auto_field()
                .map(|f| SequenceBinding::new(&m.table, caps).reset_sql(&f.column, caps))
        })
        .collect()
}
