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

//! The connection-level entry point an ORM talks to.

use log::{debug, info};

use super::compiler::Compiler;
use super::cursor::Cursor;
use super::error::Error;
use super::introspection::{CatalogCache, Introspection};
use super::model::Model;
use super::operations::Operations;
use super::options::BackendOptions;
use super::schema::SchemaEditor;
use super::sequence::{SequenceBinding, sequence_reset_sql};
use super::shadow::ShadowStore;
use super::sql::SqlFragment;
use super::transaction::{Transaction, TransactionOptions};
use super::value::Row;
use super::version::EngineCapabilities;

/// Wraps a driver cursor with the capabilities of the server behind it.
///
/// The version banner is read once on construction, unless
/// [`BackendOptions::server_version`] overrides it, and every helper handed
/// out by the wrapper shares the resulting [`EngineCapabilities`].
pub struct DatabaseWrapper<C: Cursor> {
    cursor: C,
    options: BackendOptions,
    caps: EngineCapabilities,
    cache: CatalogCache,
}

impl<C: Cursor> DatabaseWrapper<C> {
    pub fn new(mut cursor: C, options: BackendOptions) -> Result<Self, Error> {
        let banner = match &options.server_version {
            Some(banner) => banner.clone(),
            None => cursor.server_version()?,
        };
        let caps = EngineCapabilities::from_banner(&banner)?;
        info!("Firebird {} ({})", caps.version, banner.trim());
        Ok(Self {
            cursor,
            options,
            caps,
            cache: CatalogCache::new(),
        })
    }

    pub fn capabilities(&self) -> &EngineCapabilities {
        &self.caps
    }

    pub fn options(&self) -> &BackendOptions {
        &self.options
    }

    pub fn cursor(&mut self) -> &mut C {
        &mut self.cursor
    }

    pub fn into_cursor(self) -> C {
        self.cursor
    }

    /// Validate and run one statement; integrity failures come back as
    /// [`Error::Integrity`].
    pub fn execute(&mut self, sql: &SqlFragment) -> Result<(), Error> {
        sql.validate()?;
        debug!("{}; (params {:?})", sql.template, sql.params);
        self.cursor.execute(&sql.template, &sql.params).map_err(Error::classify)
    }

    pub fn query(&mut self, sql: &SqlFragment) -> Result<Vec<Row>, Error> {
        self.execute(sql)?;
        self.cursor.fetchall()
    }

    pub fn last_insert_id(&mut self, table: &str) -> Result<i64, Error> {
        SequenceBinding::new(table, &self.caps).last_insert_id(&mut self.cursor)
    }

    pub fn transaction(&mut self) -> Result<Transaction<'_, C>, Error> {
        Transaction::new(&mut self.cursor)
    }

    pub fn transaction_with(&mut self, options: &TransactionOptions) -> Result<Transaction<'_, C>, Error> {
        Transaction::with_options(&mut self.cursor, options)
    }

    pub fn ops(&self) -> Operations<'_> {
        Operations::new(&self.caps, &self.options)
    }

    pub fn compiler(&self) -> Compiler<'_> {
        Compiler::new(&self.caps, &self.options)
    }

    pub fn schema_editor(&mut self) -> SchemaEditor<'_, C> {
        SchemaEditor::new(&mut self.cursor, &self.caps, &self.options, &mut self.cache)
    }

    pub fn introspection(&mut self) -> Introspection<'_, C> {
        Introspection::new(&mut self.cursor, &self.caps).with_cache(&mut self.cache)
    }

    /// Shadow and drop every FK, CHECK and UNIQUE constraint.
    pub fn disable_constraint_checking(&mut self) -> Result<usize, Error> {
        let dropped = ShadowStore::new(&mut self.cursor, &self.caps).disable_constraints();
        self.cache.clear();
        dropped
    }

    /// Recreate the constraints shadowed by [`disable_constraint_checking`](Self::disable_constraint_checking).
    pub fn enable_constraint_checking(&mut self) -> Result<usize, Error> {
        let restored = ShadowStore::new(&mut self.cursor, &self.caps).enable_constraints();
        self.cache.clear();
        restored
    }

    /// Empty `tables` and restart the sequences of `sequence_tables`.
    pub fn flush(&mut self, tables: &[&str], sequence_tables: &[&str]) -> Result<(), Error> {
        let statements = self.ops().sql_flush(tables, sequence_tables);
        for sql in statements {
            self.execute(&SqlFragment::new(sql))?;
        }
        self.cursor.commit()
    }

    /// Move each model's sequence up to the largest key in its table.
    pub fn reset_sequences(&mut self, models: &[Model]) -> Result<(), Error> {
        for sql in sequence_reset_sql(models, &self.caps) {
            self.query(&SqlFragment::new(sql))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::PageWindow;
    use crate::model::{Field, FieldType};
    use crate::testing::MockCursor;
    use crate::value::Value;
    use maplit::hashset;
    use std::collections::HashSet;

    #[test]
    fn test_capabilities_from_banner() {
        let wrapper = DatabaseWrapper::new(MockCursor::new(), BackendOptions::default()).unwrap();
        assert!(wrapper.capabilities().supports_boolean_type);
        assert_eq!(wrapper.capabilities().max_identifier_length, 63);

        let old = DatabaseWrapper::new(MockCursor::with_banner("WI-V2.5.9.27139 Firebird 2.5"), BackendOptions::default())
            .unwrap();
        assert!(!old.capabilities().supports_set_null_syntax);
        assert_eq!(old.capabilities().max_identifier_length, 31);
    }

    #[test]
    fn test_server_version_override() {
        let options = BackendOptions::default().server_version("WI-V2.5.9.27139 Firebird 2.5");
        let wrapper = DatabaseWrapper::new(MockCursor::new(), options).unwrap();
        assert!(!wrapper.capabilities().supports_boolean_type);
    }

    #[test]
    fn test_bad_banner() {
        let result = DatabaseWrapper::new(MockCursor::with_banner("not a firebird"), BackendOptions::default());
        assert!(matches!(result, Err(Error::InvalidVersion(_))));
    }

    #[test]
    fn test_execute_validates_placeholders() {
        let mut wrapper = DatabaseWrapper::new(MockCursor::new(), BackendOptions::default()).unwrap();
        let sql = SqlFragment::with_params("DELETE FROM \"BOOK\" WHERE \"ID\" = ? OR \"ID\" = ?", vec![Value::Int(1)]);
        assert!(matches!(wrapper.execute(&sql), Err(Error::ParameterMismatch { .. })));
        assert!(wrapper.cursor().statements().is_empty());
    }

    #[test]
    fn test_execute_classifies_integrity_errors() {
        let mut cursor = MockCursor::new();
        cursor.fail_always("INSERT", -803, 335544665, "violation of PRIMARY or UNIQUE KEY constraint");
        let mut wrapper = DatabaseWrapper::new(cursor, BackendOptions::default()).unwrap();
        let sql = SqlFragment::with_params("INSERT INTO \"BOOK\" (\"ID\") VALUES (?)", vec![Value::Int(1)]);
        assert!(matches!(wrapper.execute(&sql), Err(Error::Integrity { .. })));
    }

    #[test]
    fn test_last_insert_id_reads_sequence() {
        let mut cursor = MockCursor::new();
        cursor.on("GEN_ID(\"BOOK_SQ\", 0)", vec![vec![Value::Int(41)]]);
        let mut wrapper = DatabaseWrapper::new(cursor, BackendOptions::default()).unwrap();
        assert_eq!(wrapper.last_insert_id("book").unwrap(), 41);
    }

    #[test]
    fn test_compiler_uses_configured_no_limit_value() {
        let options = BackendOptions::default().no_limit_value(Some(1_000_000));
        let wrapper = DatabaseWrapper::new(MockCursor::new(), options).unwrap();
        let sql = SqlFragment::new("SELECT \"ID\" FROM \"BOOK\"");
        let compiled = wrapper.compiler().compile(&sql, PageWindow::new(10, None)).unwrap();
        assert_eq!(compiled.template, "SELECT FIRST 1000000 SKIP 10 \"ID\" FROM \"BOOK\"");
    }

    #[test]
    fn test_flush_and_reset_sequences() {
        let mut wrapper = DatabaseWrapper::new(MockCursor::new(), BackendOptions::default()).unwrap();
        wrapper.flush(&["book", "author"], &["book"]).unwrap();
        let model = Model::new("book").field(Field::auto_pk("id")).field(Field::new("title", FieldType::Text));
        wrapper.reset_sequences(&[model, Model::new("tag")]).unwrap();

        let statements: HashSet<String> = wrapper.cursor().statements().into_iter().collect();
        let expected = hashset! {
            "DELETE FROM \"BOOK\"".to_string(),
            "DELETE FROM \"AUTHOR\"".to_string(),
            "ALTER SEQUENCE \"BOOK_SQ\" RESTART WITH 0".to_string(),
            "COMMIT".to_string(),
            "SELECT GEN_ID(\"BOOK_SQ\", COALESCE(MAX(\"ID\"), 0) - GEN_ID(\"BOOK_SQ\", 0)) FROM \"BOOK\"".to_string(),
        };
        assert_eq!(statements, expected);
    }

    #[test]
    fn test_schema_editor_cache_shared_with_introspection() {
        let mut wrapper = DatabaseWrapper::new(MockCursor::new(), BackendOptions::default()).unwrap();
        wrapper.introspection().describe_table("book").unwrap();
        wrapper.cursor().clear_log();
        wrapper.introspection().describe_table("book").unwrap();
        assert!(wrapper.cursor().statements().is_empty());

        let model = Model::new("book");
        let field = Field::new("isbn", FieldType::Char { max_length: 13 }).null(true);
        wrapper.schema_editor().add_field(&model, &field).unwrap();
        wrapper.cursor().clear_log();
        wrapper.introspection().describe_table("book").unwrap();
        assert_eq!(wrapper.cursor().statements().len(), 1);
    }

    #[test]
    fn test_disable_constraint_checking_clears_cache() {
        let mut wrapper = DatabaseWrapper::new(MockCursor::new(), BackendOptions::default()).unwrap();
        wrapper.introspection().get_constraints("book").unwrap();
        wrapper.disable_constraint_checking().unwrap();
        wrapper.cursor().clear_log();
        wrapper.introspection().get_constraints("book").unwrap();
        assert!(!wrapper.cursor().statements().is_empty());
    }
}
