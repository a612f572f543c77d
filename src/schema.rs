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

//! Schema editor: turns model and field changes into Firebird DDL.
//!
//! Firebird applies DDL at commit, so each statement is committed on its
//! own (see [`BackendOptions::commit_after_ddl`]) and a failed statement is
//! rolled back before the error reaches the caller. The only recovery
//! attempted is the hash-expression index for keys that exceed the engine's
//! index key size.

use log::{debug, warn};

use super::cursor::Cursor;
use super::error::Error;
use super::introspection::{CatalogCache, ConstraintDescriptor, ConstraintKind, IncomingForeignKey, Introspection};
use super::model::{Field, ForeignKey, Index, Model, OnDelete};
use super::options::BackendOptions;
use super::quoting::{catalog_name, index_name, quote_identifier, quote_literal};
use super::sequence::{SequenceBinding, autoinc_ddl};
use super::sql::{SqlFragment, placeholder_positions};
use super::value::Value;
use super::version::EngineCapabilities;

/// Inline parameters for display in collected SQL.
fn render_inline(sql: &SqlFragment, caps: &EngineCapabilities) -> String {
    let mut out = String::with_capacity(sql.template.len());
    let mut last = 0;
    for (pos, value) in placeholder_positions(&sql.template).into_iter().zip(&sql.params) {
        out.push_str(&sql.template[last..pos]);
        out.push_str(&quote_literal(value, caps));
        last = pos + 1;
    }
    out.push_str(&sql.template[last..]);
    out
}

/// Expression the hash-index fallback is computed by.
pub fn hash_source(columns: &[&str], caps: &EngineCapabilities) -> String {
    let quoted: Vec<String> = columns.iter().map(|c| quote_identifier(c, caps)).collect();
    format!("HASH({})", quoted.join(" || "))
}

pub struct SchemaEditor<'a, C: Cursor + ?Sized> {
    cursor: &'a mut C,
    caps: &'a EngineCapabilities,
    options: &'a BackendOptions,
    cache: &'a mut CatalogCache,
    collect_sql: bool,
    collected_sql: Vec<String>,
    deferred_sql: Vec<String>,
}

impl<'a, C: Cursor + ?Sized> SchemaEditor<'a, C> {
    pub fn new(
        cursor: &'a mut C,
        caps: &'a EngineCapabilities,
        options: &'a BackendOptions,
        cache: &'a mut CatalogCache,
    ) -> Self {
        Self {
            cursor,
            caps,
            options,
            cache,
            collect_sql: false,
            collected_sql: Vec::new(),
            deferred_sql: Vec::new(),
        }
    }

    /// Render statements into [`collected_sql`](Self::collected_sql)
    /// instead of executing them.
    pub fn collect_sql(mut self, collect: bool) -> Self {
        self.collect_sql = collect;
        self
    }

    pub fn collected_sql(&self) -> &[String] {
        &self.collected_sql
    }

    /// Run the deferred statements and hand back the collected SQL.
    pub fn finish(mut self) -> Result<Vec<String>, Error> {
        for sql in std::mem::take(&mut self.deferred_sql) {
            self.execute(SqlFragment::new(sql))?;
        }
        Ok(std::mem::take(&mut self.collected_sql))
    }

    pub fn introspection(&mut self) -> Introspection<'_, C> {
        Introspection::new(&mut *self.cursor, self.caps).with_cache(&mut *self.cache)
    }

    fn qn(&self, name: &str) -> String {
        quote_identifier(name, self.caps)
    }

    /// Run one statement. With `commit_after_ddl` every statement is its
    /// own transaction and a failure rolls it back; otherwise the caller's
    /// transaction is left for the caller to finish.
    pub fn execute(&mut self, sql: impl Into<SqlFragment>) -> Result<(), Error> {
        let sql = sql.into();
        sql.validate()?;
        debug!("{}; (params {:?})", sql.template, sql.params);
        if self.collect_sql {
            self.collected_sql.push(format!("{};", render_inline(&sql, self.caps)));
            return Ok(());
        }

        let mut result = self.cursor.execute(&sql.template, &sql.params);
        if result.is_ok() && self.options.commit_after_ddl {
            result = self.cursor.commit();
        }
        if let Err(e) = result {
            if self.options.commit_after_ddl {
                if let Err(rollback) = self.cursor.rollback() {
                    warn!("rollback after failed statement failed: {}", rollback);
                }
            }
            return Err(e.classify());
        }
        Ok(())
    }

    /// Execute a statement that changes `table` and drop its cached catalog.
    fn run(&mut self, table: &str, sql: impl Into<SqlFragment>) -> Result<(), Error> {
        let result = self.execute(sql);
        self.cache.invalidate(table);
        result
    }

    fn post_cleanup(&mut self) -> Result<(), Error> {
        if self.options.connection_persists_old_columns && !self.collect_sql {
            self.cursor.commit()?;
        }
        Ok(())
    }

    // ============================================================================
    // Column definitions
    // ============================================================================

    /// Type, default, nullability, key and check for one column.
    pub fn column_sql(&self, field: &Field, include_default: bool) -> String {
        let mut sql = field.field_type.db_type(self.caps);
        if include_default {
            if let Some(default) = &field.default {
                sql.push_str(&format!(" DEFAULT {}", quote_literal(default, self.caps)));
            }
        }
        if !field.null || field.primary_key {
            sql.push_str(" NOT NULL");
        }
        if field.primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if let Some(check) = field.check_sql(self.caps) {
            sql.push_str(&format!(" CHECK ({})", check));
        }
        sql
    }

    fn foreign_key_sql(&self, table: &str, column: &str, fk: &ForeignKey) -> String {
        let name = index_name(table, &[column], "_fk", self.caps);
        let mut sql = format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.qn(table),
            self.qn(&name),
            self.qn(column),
            self.qn(&fk.table),
            self.qn(&fk.column),
        );
        if fk.on_delete != OnDelete::NoAction {
            sql.push_str(&format!(" ON DELETE {}", fk.on_delete.as_sql()));
        }
        sql
    }

    // ============================================================================
    // Indexes
    // ============================================================================

    /// `CREATE [UNIQUE] INDEX`, retried once as a `HASH(...)` expression
    /// index when the key is too big for the engine.
    pub fn create_index(&mut self, table: &str, name: &str, columns: &[&str], unique: bool) -> Result<(), Error> {
        let unique_sql = if unique { "UNIQUE " } else { "" };
        let quoted: Vec<String> = columns.iter().map(|c| self.qn(c)).collect();
        let sql = format!(
            "CREATE {}INDEX {} ON {} ({})",
            unique_sql,
            self.qn(name),
            self.qn(table),
            quoted.join(", ")
        );
        match self.run(table, sql) {
            Err(e) if e.is_key_too_big() => {
                warn!("index {} on {} exceeds the key size, using a hash expression index", name, table);
                let sql = format!(
                    "CREATE {}INDEX {} ON {} COMPUTED BY ({})",
                    unique_sql,
                    self.qn(name),
                    self.qn(table),
                    hash_source(columns, self.caps)
                );
                self.run(table, sql)
            }
            other => other,
        }
    }

    fn create_unique(&mut self, table: &str, columns: &[&str]) -> Result<(), Error> {
        let name = index_name(table, columns, "_uniq", self.caps);
        self.create_index(table, &name, columns, true)
    }

    fn create_plain_index(&mut self, table: &str, columns: &[&str]) -> Result<(), Error> {
        let name = index_name(table, columns, "_idx", self.caps);
        self.create_index(table, &name, columns, false)
    }

    pub fn add_index(&mut self, model: &Model, index: &Index) -> Result<(), Error> {
        let columns: Vec<&str> = index.columns.iter().map(String::as_str).collect();
        self.create_index(&model.table, &index.name, &columns, false)
    }

    pub fn remove_index(&mut self, model: &Model, index: &Index) -> Result<(), Error> {
        let sql = format!("DROP INDEX {}", self.qn(&index.name));
        self.run(&model.table, sql)
    }

    fn drop_constraint(&mut self, table: &str, constraint: &ConstraintDescriptor) -> Result<(), Error> {
        let sql = match constraint.kind {
            ConstraintKind::Index => format!("DROP INDEX {}", self.qn(&constraint.name)),
            _ => format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                self.qn(table),
                self.qn(&constraint.name)
            ),
        };
        self.run(table, sql)
    }

    fn drop_incoming(&mut self, incoming: &[IncomingForeignKey]) -> Result<(), Error> {
        for fk in incoming {
            let sql = format!(
                "ALTER TABLE {} DROP CONSTRAINT {}",
                self.qn(&fk.table),
                self.qn(&fk.constraint_name)
            );
            self.run(&fk.table, sql)?;
        }
        Ok(())
    }

    /// Recreate foreign keys of other tables against `table.target`,
    /// keeping their update and delete rules.
    fn add_incoming(&mut self, table: &str, incoming: &[IncomingForeignKey], target: &str) -> Result<(), Error> {
        for fk in incoming {
            let mut sql = format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                self.qn(&fk.table),
                self.qn(&fk.constraint_name),
                self.qn(&fk.column),
                self.qn(table),
                self.qn(target)
            );
            for (verb, rule) in [("UPDATE", &fk.update_rule), ("DELETE", &fk.delete_rule)] {
                if rule != "RESTRICT" && rule != "NO ACTION" {
                    sql.push_str(&format!(" ON {} {}", verb, rule));
                }
            }
            self.run(&fk.table, sql)?;
        }
        Ok(())
    }

    fn constraints_where(
        &mut self,
        table: &str,
        filter: impl Fn(&ConstraintDescriptor) -> bool,
    ) -> Result<Vec<ConstraintDescriptor>, Error> {
        Ok(self
            .introspection()
            .get_constraints(table)?
            .into_values()
            .filter(|c| filter(c))
            .collect())
    }

    /// Drop the unique constraint or index over exactly `columns`, falling
    /// back to the hash expression index created for oversized keys.
    fn delete_composed_index(&mut self, table: &str, columns: &[&str], unique: bool) -> Result<(), Error> {
        let found = self.constraints_where(table, |c| {
            c.covers(columns)
                && match c.kind {
                    ConstraintKind::Unique => unique,
                    ConstraintKind::Index => c.unique == unique,
                    _ => false,
                }
        })?;
        if !found.is_empty() {
            for constraint in &found {
                self.drop_constraint(table, constraint)?;
            }
            return Ok(());
        }

        let source = hash_source(columns, self.caps);
        match self.introspection().find_expression_index(table, &source)? {
            Some(name) => {
                let sql = format!("DROP INDEX {}", self.qn(&name));
                self.run(table, sql)
            }
            None => Err(Error::CatalogInconsistency(format!(
                "found no {} for {}({})",
                if unique { "unique constraint" } else { "index" },
                table,
                columns.join(", ")
            ))),
        }
    }

    // ============================================================================
    // Models
    // ============================================================================

    pub fn create_model(&mut self, model: &Model) -> Result<(), Error> {
        let mut definitions = Vec::with_capacity(model.fields.len());
        for field in &model.fields {
            definitions.push(format!("{} {}", self.qn(&field.column), self.column_sql(field, true)));
            if let Some(fk) = &field.foreign_key {
                let sql = self.foreign_key_sql(&model.table, &field.column, fk);
                self.deferred_sql.push(sql);
            }
        }
        let sql = format!("CREATE TABLE {} ({})", self.qn(&model.table), definitions.join(", "));
        self.run(&model.table, sql)?;

        for sql in autoinc_ddl(model, self.caps) {
            self.run(&model.table, sql)?;
        }

        for field in &model.fields {
            if field.unique && !field.primary_key {
                self.create_unique(&model.table, &[&field.column])?;
            } else if field.db_index && !field.primary_key && field.foreign_key.is_none() {
                self.create_plain_index(&model.table, &[&field.column])?;
            }
        }
        for columns in &model.unique_together {
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            self.create_unique(&model.table, &columns)?;
        }
        for columns in &model.index_together {
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            self.create_plain_index(&model.table, &columns)?;
        }
        for index in &model.indexes {
            self.add_index(model, index)?;
        }
        Ok(())
    }

    /// Drop the table and its autoincrement sequence; a missing sequence is
    /// not an error.
    pub fn delete_model(&mut self, model: &Model) -> Result<(), Error> {
        let sql = format!("DROP TABLE {}", self.qn(&model.table));
        self.run(&model.table, sql)?;

        let binding = SequenceBinding::new(&model.table, self.caps);
        if self.collect_sql || self.introspection().sequence_exists(&model.table)? {
            self.run(&model.table, binding.drop_sequence_sql())?;
        } else {
            debug!("no sequence {} to drop", binding.sequence_name);
        }
        Ok(())
    }

    pub fn rename_model(&mut self, _model: &Model, _new_table: &str) -> Result<(), Error> {
        Err(Error::not_supported("renaming a table"))
    }

    pub fn alter_db_table(&mut self, model: &Model, new_table: &str) -> Result<(), Error> {
        self.rename_model(model, new_table)
    }

    pub fn alter_unique_together(&mut self, model: &Model, old: &[Vec<String>], new: &[Vec<String>]) -> Result<(), Error> {
        for columns in old.iter().filter(|c| !new.contains(c)) {
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            self.delete_composed_index(&model.table, &columns, true)?;
        }
        for columns in new.iter().filter(|c| !old.contains(c)) {
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            self.create_unique(&model.table, &columns)?;
        }
        Ok(())
    }

    pub fn alter_index_together(&mut self, model: &Model, old: &[Vec<String>], new: &[Vec<String>]) -> Result<(), Error> {
        for columns in old.iter().filter(|c| !new.contains(c)) {
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            self.delete_composed_index(&model.table, &columns, false)?;
        }
        for columns in new.iter().filter(|c| !old.contains(c)) {
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            self.create_plain_index(&model.table, &columns)?;
        }
        Ok(())
    }

    // ============================================================================
    // Fields
    // ============================================================================

    pub fn add_field(&mut self, model: &Model, field: &Field) -> Result<(), Error> {
        let table = model.table.as_str();
        let sql = format!(
            "ALTER TABLE {} ADD {} {}",
            self.qn(table),
            self.qn(&field.column),
            self.column_sql(field, true)
        );
        self.run(table, sql)?;

        if field.default.is_some() && !self.options.keep_db_defaults {
            let has_default = self.collect_sql || self.introspection().column_has_default(table, &field.column)?;
            if has_default {
                let sql = format!("ALTER TABLE {} ALTER {} DROP DEFAULT", self.qn(table), self.qn(&field.column));
                self.run(table, sql)?;
            }
        }

        if field.field_type.is_auto() {
            let (sequence, trigger) = SequenceBinding::new(table, self.caps).autoinc_sql(&field.column, self.caps);
            self.run(table, sequence)?;
            self.run(table, trigger)?;
        }
        if field.unique && !field.primary_key {
            self.create_unique(table, &[&field.column])?;
        } else if field.db_index && field.foreign_key.is_none() {
            self.create_plain_index(table, &[&field.column])?;
        }
        if let Some(fk) = &field.foreign_key {
            let sql = self.foreign_key_sql(table, &field.column, fk);
            self.deferred_sql.push(sql);
        }
        self.post_cleanup()
    }

    pub fn remove_field(&mut self, model: &Model, field: &Field) -> Result<(), Error> {
        let table = model.table.as_str();
        if field.field_type.is_auto() {
            self.drop_autoincrement(table)?;
        }

        let column = field.column.as_str();
        let foreign_keys = self.constraints_where(table, |c| {
            c.kind == ConstraintKind::ForeignKey && c.columns.iter().any(|col| col.eq_ignore_ascii_case(column))
        })?;
        for fk in &foreign_keys {
            self.drop_constraint(table, fk)?;
        }
        for index in self.introspection().field_indexes(table, column)? {
            let sql = format!("DROP INDEX {}", self.qn(&index));
            self.run(table, sql)?;
        }

        let sql = format!("ALTER TABLE {} DROP {}", self.qn(table), self.qn(column));
        self.run(table, sql)?;
        self.post_cleanup()
    }

    fn drop_autoincrement(&mut self, table: &str) -> Result<(), Error> {
        let binding = SequenceBinding::new(table, self.caps);
        if self.collect_sql || self.introspection().trigger_exists(table)? {
            self.run(table, binding.drop_trigger_sql())?;
        }
        if self.collect_sql || self.introspection().sequence_exists(table)? {
            self.run(table, binding.drop_sequence_sql())?;
        }
        Ok(())
    }

    fn set_nullable(&mut self, table: &str, column: &str, nullable: bool) -> Result<(), Error> {
        if self.caps.supports_set_null_syntax {
            let verb = if nullable { "DROP" } else { "SET" };
            let sql = format!("ALTER TABLE {} ALTER {} {} NOT NULL", self.qn(table), self.qn(column), verb);
            return self.run(table, sql);
        }
        let flag = if nullable { "NULL" } else { "1" };
        let sql = SqlFragment::with_params(
            format!(
                "UPDATE RDB$RELATION_FIELDS SET RDB$NULL_FLAG = {} WHERE RDB$FIELD_NAME = ? AND RDB$RELATION_NAME = ?",
                flag
            ),
            vec![
                Value::Text(catalog_name(column, self.caps)),
                Value::Text(catalog_name(table, self.caps)),
            ],
        );
        self.run(table, sql)
    }

    /// Change `old` into `new`, one phase after another: drop what blocks
    /// the change, rename, retype, defaults, nullability, then recreate
    /// indexes, keys and checks on the final column.
    pub fn alter_field(&mut self, model: &Model, old: &Field, new: &Field) -> Result<(), Error> {
        let table = model.table.as_str();
        let caps = self.caps;
        let old_type = old.field_type.db_type(caps);
        let new_type = new.field_type.db_type(caps);
        let type_changed = old_type != new_type;
        let renamed = !old.column.eq_ignore_ascii_case(&new.column);
        let old_check = old.check_sql(caps);
        let new_check = new.check_sql(caps);
        let check_changed = old_check != new_check || (type_changed && old_check.is_some());

        // 1. drop what would block the change
        let mut dropped_own_fk = false;
        if old.foreign_key.is_some() && (old.foreign_key != new.foreign_key || type_changed) {
            let column = old.column.as_str();
            for fk in self.constraints_where(table, |c| c.kind == ConstraintKind::ForeignKey && c.covers(&[column]))? {
                self.drop_constraint(table, &fk)?;
            }
            dropped_own_fk = true;
        }

        let key_changes = old.is_unique() && (type_changed || (old.primary_key && !new.primary_key));
        let incoming = if key_changes && !self.collect_sql {
            self.introspection().referencing_foreign_keys(table, &old.column)?
        } else {
            Vec::new()
        };
        self.drop_incoming(&incoming)?;

        let drop_unique = old.unique && !old.primary_key && (!new.unique || type_changed);
        if drop_unique {
            self.delete_composed_index(table, &[&old.column], true)?;
        }
        if old.db_index && !old.unique && old.foreign_key.is_none() && (!new.db_index || type_changed) {
            self.delete_composed_index(table, &[&old.column], false)?;
        }
        let drop_pk = old.primary_key && (!new.primary_key || type_changed);
        if drop_pk {
            let column = old.column.as_str();
            for pk in self.constraints_where(table, |c| c.kind == ConstraintKind::PrimaryKey && c.covers(&[column]))? {
                self.drop_constraint(table, &pk)?;
            }
        }
        if old_check.is_some() && check_changed {
            let column = old.column.as_str();
            for check in self.constraints_where(table, |c| {
                c.kind == ConstraintKind::Check && c.columns.iter().any(|col| col.eq_ignore_ascii_case(column))
            })? {
                self.drop_constraint(table, &check)?;
            }
        }

        // 2. rename
        if renamed {
            let auto = old.field_type.is_auto() && new.field_type.is_auto();
            let binding = SequenceBinding::new(table, caps);
            if auto {
                self.run(table, binding.drop_trigger_sql())?;
            }
            let sql = format!(
                "ALTER TABLE {} ALTER {} TO {}",
                self.qn(table),
                self.qn(&old.column),
                self.qn(&new.column)
            );
            self.run(table, sql)?;
            if auto {
                let (_, trigger) = binding.autoinc_sql(&new.column, caps);
                self.run(table, trigger)?;
            }
        }

        // 3. type
        let column = new.column.as_str();
        let mut currently_nullable = old.null && !old.primary_key;
        let mut column_rebuilt = false;
        if type_changed {
            if old.field_type.is_blob() || new.field_type.is_blob() {
                let temp = format!("{}_tmp", column);
                let statements = [
                    format!("ALTER TABLE {} ADD {} {}", self.qn(table), self.qn(&temp), new_type),
                    format!("UPDATE {} SET {} = {}", self.qn(table), self.qn(&temp), self.qn(column)),
                    format!("ALTER TABLE {} DROP {}", self.qn(table), self.qn(column)),
                    format!("ALTER TABLE {} ALTER {} TO {}", self.qn(table), self.qn(&temp), self.qn(column)),
                ];
                for sql in statements {
                    self.run(table, sql)?;
                }
                currently_nullable = true;
                column_rebuilt = true;
            } else {
                let sql = format!("ALTER TABLE {} ALTER {} TYPE {}", self.qn(table), self.qn(column), new_type);
                self.run(table, sql)?;
            }
        }

        // 4. default
        let wants_not_null = !new.null || new.primary_key;
        let backfill = currently_nullable && wants_not_null && new.default.is_some();
        let mut default_set = false;
        if let Some(default) = &new.default {
            let kept_default_lost = column_rebuilt && self.options.keep_db_defaults;
            if old.default.as_ref() != Some(default) || backfill || kept_default_lost {
                let sql = format!(
                    "ALTER TABLE {} ALTER {} SET DEFAULT {}",
                    self.qn(table),
                    self.qn(column),
                    quote_literal(default, caps)
                );
                self.run(table, sql)?;
                default_set = true;
            }
            if backfill {
                let sql = SqlFragment::with_params(
                    format!(
                        "UPDATE {} SET {} = ? WHERE {} IS NULL",
                        self.qn(table),
                        self.qn(column),
                        self.qn(column)
                    ),
                    vec![default.clone()],
                );
                self.run(table, sql)?;
            }
        }

        // 5. nullability
        if currently_nullable != !wants_not_null {
            self.set_nullable(table, column, !wants_not_null)?;
        }
        let drop_default = (default_set && !self.options.keep_db_defaults)
            || (self.options.keep_db_defaults && old.default.is_some() && new.default.is_none());
        if drop_default {
            let sql = format!("ALTER TABLE {} ALTER {} DROP DEFAULT", self.qn(table), self.qn(column));
            self.run(table, sql)?;
        }

        // 6. unique and index
        if new.unique && !new.primary_key && (!old.unique || old.primary_key || drop_unique) {
            self.create_unique(table, &[column])?;
        }
        let had_index = old.db_index && !old.unique && old.foreign_key.is_none() && !type_changed;
        if new.db_index && !new.unique && new.foreign_key.is_none() && !had_index {
            self.create_plain_index(table, &[column])?;
        }

        // 7. primary key
        let mut displaced = Vec::new();
        if new.primary_key && (!old.primary_key || drop_pk) {
            if !old.primary_key {
                for pk in self.constraints_where(table, |c| c.kind == ConstraintKind::PrimaryKey)? {
                    let mut referencing = Vec::new();
                    if !self.collect_sql {
                        for pk_column in &pk.columns {
                            referencing.extend(self.introspection().referencing_foreign_keys(table, pk_column)?);
                        }
                    }
                    self.drop_incoming(&referencing)?;
                    self.drop_constraint(table, &pk)?;
                    displaced.extend(referencing);
                }
            }
            let name = index_name(table, &[column], "_pk", caps);
            let sql = format!(
                "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({})",
                self.qn(table),
                self.qn(&name),
                self.qn(column)
            );
            self.run(table, sql)?;
        }
        let target = if new.is_unique() {
            Some(new.column.clone())
        } else {
            model.pk().filter(|pk| pk.column != old.column).map(|pk| pk.column.clone())
        };
        match &target {
            Some(target) => self.add_incoming(table, &incoming, target)?,
            None => {
                for fk in &incoming {
                    warn!(
                        "foreign key {} on {} lost its target {}.{}",
                        fk.constraint_name, fk.table, table, old.column
                    );
                }
            }
        }
        self.add_incoming(table, &displaced, column)?;

        // 8. foreign key and check
        if let Some(fk) = &new.foreign_key {
            if dropped_own_fk || old.foreign_key.is_none() {
                let sql = self.foreign_key_sql(table, column, fk);
                self.run(table, sql)?;
            }
        }
        if let Some(check) = &new_check {
            if check_changed {
                let name = index_name(table, &[column], "_check", caps);
                let sql = format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} CHECK ({})",
                    self.qn(table),
                    self.qn(&name),
                    check
                );
                self.run(table, sql)?;
            }
        }

        // autoincrement gained or lost
        if new.field_type.is_auto() && !old.field_type.is_auto() {
            let (sequence, trigger) = SequenceBinding::new(table, caps).autoinc_sql(column, caps);
            self.run(table, sequence)?;
            self.run(table, trigger)?;
        } else if old.field_type.is_auto() && !new.field_type.is_auto() {
            self.drop_autoincrement(table)?;
        }

        // 9. cleanup
        self.post_cleanup()
    }
}
