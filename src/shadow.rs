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

//! Constraint shadow store.
//!
//! Firebird cannot switch constraint enforcement off, so "disabling"
//! constraints means copying every FK, CHECK and UNIQUE definition into two
//! regular tables and dropping the constraints. Enabling replays the copies
//! and empties the tables again.

use std::collections::HashMap;

use log::{debug, info, warn};

use super::cursor::Cursor;
use super::error::Error;
use super::introspection::ConstraintKind;
use super::transaction::{Transaction, TransactionOptions};
use super::value::{Row, Value};
use super::version::EngineCapabilities;

pub const CONSTRAINT_TABLE: &str = "DJANGO$CONSTRAINT";
pub const SEGMENT_TABLE: &str = "DJANGO$CONSTRAINT_SEGMENT";

/// Quote a name exactly as the catalog stores it.
fn delimit(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// One captured constraint with its columns in key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowConstraint {
    pub name: String,
    pub kind: ConstraintKind,
    pub relation_name: String,
    pub index_name: Option<String>,
    /// The unique or primary key a foreign key references.
    pub const_name_uq: Option<String>,
    pub update_rule: Option<String>,
    pub delete_rule: Option<String>,
    /// Body of a CHECK constraint, `CHECK (...)`.
    pub source: Option<String>,
    pub columns: Vec<String>,
}

impl ShadowConstraint {
    /// `ALTER TABLE ... ADD CONSTRAINT` recreating this constraint.
    /// `referenced` is the target table and columns of a foreign key.
    pub fn create_sql(&self, referenced: Option<(&str, &[String])>) -> Result<String, Error> {
        let head = format!(
            "ALTER TABLE {} ADD CONSTRAINT {}",
            delimit(&self.relation_name),
            delimit(&self.name)
        );
        let columns = || self.columns.iter().map(|c| delimit(c)).collect::<Vec<_>>().join(", ");
        match self.kind {
            ConstraintKind::Unique => {
                if self.columns.is_empty() {
                    return Err(Error::CatalogInconsistency(format!("unique {} has no columns", self.name)));
                }
                Ok(format!("{} UNIQUE ({})", head, columns()))
            }
            ConstraintKind::Check => {
                let source = self.source.as_deref().map(str::trim).unwrap_or_default();
                if source.is_empty() {
                    return Err(Error::CatalogInconsistency(format!("check {} has no source", self.name)));
                }
                if source.get(..5).is_some_and(|prefix| prefix.eq_ignore_ascii_case("CHECK")) {
                    Ok(format!("{} {}", head, source))
                } else {
                    Ok(format!("{} CHECK ({})", head, source))
                }
            }
            ConstraintKind::ForeignKey => {
                let Some((table, target)) = referenced.filter(|(_, target)| target.len() == self.columns.len())
                else {
                    return Err(Error::CatalogInconsistency(format!(
                        "foreign key {} has no matching referenced key {:?}",
                        self.name, self.const_name_uq
                    )));
                };
                let target: Vec<String> = target.iter().map(|c| delimit(c)).collect();
                let mut sql = format!(
                    "{} FOREIGN KEY ({}) REFERENCES {} ({})",
                    head,
                    columns(),
                    delimit(table),
                    target.join(", ")
                );
                for (verb, rule) in [("UPDATE", &self.update_rule), ("DELETE", &self.delete_rule)] {
                    if let Some(rule) = rule.as_deref().filter(|r| *r != "RESTRICT" && *r != "NO ACTION") {
                        sql.push_str(&format!(" ON {} {}", verb, rule));
                    }
                }
                Ok(sql)
            }
            ConstraintKind::PrimaryKey | ConstraintKind::Index => Err(Error::not_supported(format!(
                "shadowing {:?} {}",
                self.kind, self.name
            ))),
        }
    }
}

/// Drop order: foreign keys first so the uniques they reference can go.
fn drop_rank(kind: ConstraintKind) -> u8 {
    match kind {
        ConstraintKind::ForeignKey => 0,
        ConstraintKind::Check => 1,
        _ => 2,
    }
}

/// Replay order, the reverse of [`drop_rank`].
fn replay_rank(kind: ConstraintKind) -> u8 {
    2 - drop_rank(kind)
}

pub struct ShadowStore<'a, C: Cursor + ?Sized> {
    cursor: &'a mut C,
    caps: &'a EngineCapabilities,
}

impl<'a, C: Cursor + ?Sized> ShadowStore<'a, C> {
    pub fn new(cursor: &'a mut C, caps: &'a EngineCapabilities) -> Self {
        Self { cursor, caps }
    }

    fn run(&mut self, sql: &str) -> Result<(), Error> {
        debug!("{}; (params [])", sql);
        let mut result = self.cursor.execute(sql, &[]);
        if result.is_ok() {
            result = self.cursor.commit();
        }
        if let Err(e) = result {
            if let Err(rollback) = self.cursor.rollback() {
                warn!("rollback after failed statement failed: {}", rollback);
            }
            return Err(e.classify());
        }
        Ok(())
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Error> {
        debug!("{}; (params {:?})", sql.trim(), params);
        self.cursor.query(sql, params)
    }

    fn table_exists(&mut self, table: &str) -> Result<bool, Error> {
        let sql = "SELECT r.RDB$RELATION_NAME FROM RDB$RELATIONS r WHERE r.RDB$RELATION_NAME = ?";
        Ok(!self.query(sql, &[Value::from(table)])?.is_empty())
    }

    /// Create the two shadow tables when missing.
    pub fn ensure_tables(&mut self) -> Result<(), Error> {
        let name_len = self.caps.max_identifier_length;
        if !self.table_exists(CONSTRAINT_TABLE)? {
            let sql = format!(
                "CREATE TABLE {} (\"NAME\" VARCHAR({n}) NOT NULL PRIMARY KEY, \"TYPE\" VARCHAR(11) NOT NULL, \
                 \"RELATION_NAME\" VARCHAR({n}) NOT NULL, \"INDEX_NAME\" VARCHAR({n}), \
                 \"CONST_NAME_UQ\" VARCHAR({n}), \"UPDATE_RULE\" VARCHAR(11), \"DELETE_RULE\" VARCHAR(11), \
                 \"SOURCE\" BLOB SUB_TYPE 1)",
                delimit(CONSTRAINT_TABLE),
                n = name_len
            );
            self.run(&sql)?;
        }
        if !self.table_exists(SEGMENT_TABLE)? {
            let sql = format!(
                "CREATE TABLE {} (\"CONSTRAINT_NAME\" VARCHAR({n}) NOT NULL, \"FIELD_NAME\" VARCHAR({n}) NOT NULL, \
                 \"POSITION\" SMALLINT NOT NULL, PRIMARY KEY (\"CONSTRAINT_NAME\", \"FIELD_NAME\"))",
                delimit(SEGMENT_TABLE),
                n = name_len
            );
            self.run(&sql)?;
        }
        Ok(())
    }

    /// Upsert every user FK/CHECK/UNIQUE definition into the shadow tables.
    fn capture(&mut self) -> Result<(), Error> {
        let constraints = format!(
            r#"
            MERGE INTO {table} dc
            USING (
                SELECT rc.RDB$CONSTRAINT_NAME AS NAME,
                       rc.RDB$CONSTRAINT_TYPE AS CTYPE,
                       rc.RDB$RELATION_NAME AS RELATION_NAME,
                       rc.RDB$INDEX_NAME AS INDEX_NAME,
                       refc.RDB$CONST_NAME_UQ AS CONST_NAME_UQ,
                       refc.RDB$UPDATE_RULE AS UPDATE_RULE,
                       refc.RDB$DELETE_RULE AS DELETE_RULE,
                       (SELECT FIRST 1 t.RDB$TRIGGER_SOURCE
                        FROM RDB$CHECK_CONSTRAINTS cc
                        JOIN RDB$TRIGGERS t ON t.RDB$TRIGGER_NAME = cc.RDB$TRIGGER_NAME
                        WHERE cc.RDB$CONSTRAINT_NAME = rc.RDB$CONSTRAINT_NAME
                          AND t.RDB$TRIGGER_TYPE = 1) AS SOURCE
                FROM RDB$RELATION_CONSTRAINTS rc
                JOIN RDB$RELATIONS r ON r.RDB$RELATION_NAME = rc.RDB$RELATION_NAME
                LEFT JOIN RDB$REF_CONSTRAINTS refc ON refc.RDB$CONSTRAINT_NAME = rc.RDB$CONSTRAINT_NAME
                WHERE {filter}
            ) src
            ON dc."NAME" = src.NAME
            WHEN MATCHED THEN UPDATE SET
                dc."TYPE" = src.CTYPE,
                dc."RELATION_NAME" = src.RELATION_NAME,
                dc."INDEX_NAME" = src.INDEX_NAME,
                dc."CONST_NAME_UQ" = src.CONST_NAME_UQ,
                dc."UPDATE_RULE" = src.UPDATE_RULE,
                dc."DELETE_RULE" = src.DELETE_RULE,
                dc."SOURCE" = src.SOURCE
            WHEN NOT MATCHED THEN INSERT
                ("NAME", "TYPE", "RELATION_NAME", "INDEX_NAME", "CONST_NAME_UQ", "UPDATE_RULE", "DELETE_RULE", "SOURCE")
                VALUES (src.NAME, src.CTYPE, src.RELATION_NAME, src.INDEX_NAME, src.CONST_NAME_UQ,
                        src.UPDATE_RULE, src.DELETE_RULE, src.SOURCE)
        "#,
            table = delimit(CONSTRAINT_TABLE),
            filter = capture_filter(),
        );
        let segments = format!(
            r#"
            MERGE INTO {table} ds
            USING (
                SELECT rc.RDB$CONSTRAINT_NAME AS CONSTRAINT_NAME,
                       s.RDB$FIELD_NAME AS FIELD_NAME,
                       s.RDB$FIELD_POSITION AS FIELD_POSITION
                FROM RDB$RELATION_CONSTRAINTS rc
                JOIN RDB$RELATIONS r ON r.RDB$RELATION_NAME = rc.RDB$RELATION_NAME
                JOIN RDB$INDEX_SEGMENTS s ON s.RDB$INDEX_NAME = rc.RDB$INDEX_NAME
                WHERE {filter}
            ) src
            ON ds."CONSTRAINT_NAME" = src.CONSTRAINT_NAME AND ds."FIELD_NAME" = src.FIELD_NAME
            WHEN MATCHED THEN UPDATE SET ds."POSITION" = src.FIELD_POSITION
            WHEN NOT MATCHED THEN INSERT ("CONSTRAINT_NAME", "FIELD_NAME", "POSITION")
                VALUES (src.CONSTRAINT_NAME, src.FIELD_NAME, src.FIELD_POSITION)
        "#,
            table = delimit(SEGMENT_TABLE),
            filter = capture_filter(),
        );

        debug!("{}; (params [])", constraints.trim());
        debug!("{}; (params [])", segments.trim());
        let mut trans = Transaction::with_options(&mut *self.cursor, &TransactionOptions::snapshot())?;
        trans.execute(&constraints, &[]).map_err(Error::classify)?;
        trans.execute(&segments, &[]).map_err(Error::classify)?;
        trans.commit()
    }

    /// Live user constraints, `(name, kind, relation)` in drop order.
    fn live_constraints(&mut self) -> Result<Vec<(String, ConstraintKind, String)>, Error> {
        let sql = format!(
            r#"
            SELECT rc.RDB$CONSTRAINT_NAME, rc.RDB$CONSTRAINT_TYPE, rc.RDB$RELATION_NAME
            FROM RDB$RELATION_CONSTRAINTS rc
            JOIN RDB$RELATIONS r ON r.RDB$RELATION_NAME = rc.RDB$RELATION_NAME
            WHERE {}
            ORDER BY rc.RDB$CONSTRAINT_NAME
        "#,
            capture_filter()
        );
        let mut live = Vec::new();
        for row in self.query(&sql, &[])? {
            let constraint_type = row.get_name(1)?;
            let Some(kind) = ConstraintKind::from_catalog(&constraint_type) else {
                continue;
            };
            live.push((row.get_name(0)?, kind, row.get_name(2)?));
        }
        live.sort_by_key(|(_, kind, _)| drop_rank(*kind));
        Ok(live)
    }

    /// Shadow the constraints and drop them. Returns how many were dropped.
    pub fn disable_constraints(&mut self) -> Result<usize, Error> {
        self.ensure_tables()?;
        self.capture()?;

        let live = self.live_constraints()?;
        for (name, _, relation) in &live {
            let sql = format!("ALTER TABLE {} DROP CONSTRAINT {}", delimit(relation), delimit(name));
            self.run(&sql)?;
        }
        info!("disabled {} constraints", live.len());
        Ok(live.len())
    }

    /// Shadowed constraints in replay order, columns sorted by position.
    pub fn shadowed(&mut self) -> Result<Vec<ShadowConstraint>, Error> {
        let sql = format!(
            r#"
            SELECT c."NAME", c."TYPE", c."RELATION_NAME", c."INDEX_NAME", c."CONST_NAME_UQ",
                   c."UPDATE_RULE", c."DELETE_RULE", c."SOURCE"
            FROM {} c
            ORDER BY c."NAME"
        "#,
            delimit(CONSTRAINT_TABLE)
        );
        let mut constraints = Vec::new();
        for row in self.query(&sql, &[])? {
            let constraint_type = row.get_name(1)?;
            let Some(kind) = ConstraintKind::from_catalog(&constraint_type) else {
                warn!("skipping shadowed constraint of unknown type {}", constraint_type);
                continue;
            };
            constraints.push(ShadowConstraint {
                name: row.get_name(0)?,
                kind,
                relation_name: row.get_name(2)?,
                index_name: row.get_opt_name(3)?,
                const_name_uq: row.get_opt_name(4)?,
                update_rule: row.get_opt_name(5)?,
                delete_rule: row.get_opt_name(6)?,
                source: row.get::<Option<String>>(7)?,
                columns: Vec::new(),
            });
        }

        let sql = format!(
            r#"
            SELECT s."CONSTRAINT_NAME", s."FIELD_NAME", s."POSITION"
            FROM {} s
            ORDER BY s."CONSTRAINT_NAME", s."POSITION"
        "#,
            delimit(SEGMENT_TABLE)
        );
        let mut segments: HashMap<String, Vec<(i16, String)>> = HashMap::new();
        for row in self.query(&sql, &[])? {
            segments
                .entry(row.get_name(0)?)
                .or_default()
                .push((row.get::<i16>(2)?, row.get_name(1)?));
        }
        for constraint in constraints.iter_mut() {
            if let Some(mut columns) = segments.remove(&constraint.name) {
                columns.sort_by_key(|(position, _)| *position);
                constraint.columns = columns.into_iter().map(|(_, name)| name).collect();
            }
        }

        constraints.sort_by_key(|c| replay_rank(c.kind));
        Ok(constraints)
    }

    /// Table and columns of the key named `constraint_name`.
    fn referenced_key(&mut self, constraint_name: &str) -> Result<Option<(String, Vec<String>)>, Error> {
        let sql = r#"
            SELECT rc.RDB$RELATION_NAME, s.RDB$FIELD_NAME
            FROM RDB$RELATION_CONSTRAINTS rc
            JOIN RDB$INDEX_SEGMENTS s ON s.RDB$INDEX_NAME = rc.RDB$INDEX_NAME
            WHERE rc.RDB$CONSTRAINT_NAME = ?
            ORDER BY s.RDB$FIELD_POSITION
        "#;
        let rows = self.query(sql, &[Value::from(constraint_name)])?;
        let Some(first) = rows.first() else {
            return Ok(None);
        };
        let table = first.get_name(0)?;
        let columns = rows.iter().map(|r| r.get_name(1)).collect::<Result<Vec<_>, _>>()?;
        Ok(Some((table, columns)))
    }

    fn restore(&mut self, constraint: &ShadowConstraint) -> Result<(), Error> {
        let referenced = match (constraint.kind, &constraint.const_name_uq) {
            (ConstraintKind::ForeignKey, Some(uq)) => self.referenced_key(uq)?,
            _ => None,
        };
        let sql = constraint.create_sql(referenced.as_ref().map(|(t, c)| (t.as_str(), c.as_slice())))?;
        self.run(&sql)
    }

    /// Recreate every shadowed constraint and clear the shadow tables.
    /// A constraint that cannot be recreated is logged and skipped. Returns
    /// how many were restored.
    pub fn enable_constraints(&mut self) -> Result<usize, Error> {
        if !self.table_exists(CONSTRAINT_TABLE)? {
            info!("no shadowed constraints to enable");
            return Ok(0);
        }
        let constraints = self.shadowed()?;
        let mut restored = 0;
        for constraint in &constraints {
            match self.restore(constraint) {
                Ok(()) => restored += 1,
                Err(e) => warn!(
                    "could not recreate {:?} {} on {}: {}",
                    constraint.kind, constraint.name, constraint.relation_name, e
                ),
            }
        }

        self.run(&format!("DELETE FROM {}", delimit(SEGMENT_TABLE)))?;
        self.run(&format!("DELETE FROM {}", delimit(CONSTRAINT_TABLE)))?;
        info!("enabled {} of {} constraints", restored, constraints.len());
        Ok(restored)
    }
}

/// User FK/CHECK/UNIQUE constraints, never those of system relations or of
/// the shadow tables themselves.
fn capture_filter() -> &'static str {
    "rc.RDB$CONSTRAINT_TYPE IN ('FOREIGN KEY', 'CHECK', 'UNIQUE') \
     AND COALESCE(r.RDB$SYSTEM_FLAG, 0) = 0 \
     AND rc.RDB$RELATION_NAME NOT STARTING WITH 'DJANGO$'"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCursor;
    use crate::version::ServerVersion;
    use pretty_assertions::assert_eq;

    fn caps() -> EngineCapabilities {
        EngineCapabilities::new(ServerVersion([3, 0, 5, 0]))
    }

    fn text(s: &str) -> Value {
        Value::from(s)
    }

    fn shadow_tables_exist(cursor: &mut MockCursor) {
        cursor.on_param("FROM RDB$RELATIONS r", CONSTRAINT_TABLE, vec![vec![text(CONSTRAINT_TABLE)]]);
        cursor.on_param("FROM RDB$RELATIONS r", SEGMENT_TABLE, vec![vec![text(SEGMENT_TABLE)]]);
    }

    #[test]
    fn test_disable_creates_tables_captures_and_drops_in_order() {
        let caps = caps();
        let mut cursor = MockCursor::new();
        cursor.on(
            "SELECT rc.RDB$CONSTRAINT_NAME, rc.RDB$CONSTRAINT_TYPE, rc.RDB$RELATION_NAME",
            vec![
                vec![text("BOOK_TS_UNIQ"), text("UNIQUE     "), text("BOOK")],
                vec![text("CHAPTER_BOOK_FK"), text("FOREIGN KEY"), text("CHAPTER")],
                vec![text("INTEG_5"), text("CHECK"), text("BOOK")],
            ],
        );
        let dropped = ShadowStore::new(&mut cursor, &caps).disable_constraints().unwrap();
        assert_eq!(dropped, 3);

        let ddl = cursor.ddl();
        assert_eq!(ddl.len(), 7);
        assert!(ddl[0].starts_with("CREATE TABLE \"DJANGO$CONSTRAINT\" (\"NAME\" VARCHAR(63) NOT NULL PRIMARY KEY"));
        assert!(ddl[1].ends_with("PRIMARY KEY (\"CONSTRAINT_NAME\", \"FIELD_NAME\"))"));
        assert!(ddl[2].trim_start().starts_with("MERGE INTO \"DJANGO$CONSTRAINT\" dc"));
        assert!(ddl[3].trim_start().starts_with("MERGE INTO \"DJANGO$CONSTRAINT_SEGMENT\" ds"));
        assert_eq!(
            ddl[4..].to_vec(),
            vec![
                "ALTER TABLE \"CHAPTER\" DROP CONSTRAINT \"CHAPTER_BOOK_FK\"",
                "ALTER TABLE \"BOOK\" DROP CONSTRAINT \"INTEG_5\"",
                "ALTER TABLE \"BOOK\" DROP CONSTRAINT \"BOOK_TS_UNIQ\"",
            ]
        );
    }

    #[test]
    fn test_capture_excludes_system_and_shadow_relations() {
        let caps = caps();
        let mut cursor = MockCursor::new();
        shadow_tables_exist(&mut cursor);
        ShadowStore::new(&mut cursor, &caps).disable_constraints().unwrap();

        let statements = cursor.statements();
        let merges: Vec<&String> = statements.iter().filter(|s| s.contains("MERGE INTO")).collect();
        assert_eq!(merges.len(), 2);
        for merge in merges {
            assert!(merge.contains("COALESCE(r.RDB$SYSTEM_FLAG, 0) = 0"));
            assert!(merge.contains("NOT STARTING WITH 'DJANGO$'"));
        }
        // both upserts share one snapshot transaction
        let begin = statements.iter().position(|s| s == "BEGIN").unwrap();
        assert!(statements[begin + 1].contains("MERGE INTO"));
        assert!(statements[begin + 2].contains("MERGE INTO"));
        assert_eq!(statements[begin + 3], "COMMIT");
    }

    fn scripted_shadow(cursor: &mut MockCursor) {
        shadow_tables_exist(cursor);
        cursor.on(
            "FROM \"DJANGO$CONSTRAINT\" c",
            vec![
                vec![
                    text("CHAPTER_BOOK_FK"),
                    text("FOREIGN KEY"),
                    text("CHAPTER"),
                    text("CHAPTER_BOOK_FK"),
                    text("INTEG_2"),
                    text("RESTRICT"),
                    text("CASCADE"),
                    Value::Null,
                ],
                vec![
                    text("INTEG_5"),
                    text("CHECK"),
                    text("BOOK"),
                    Value::Null,
                    Value::Null,
                    Value::Null,
                    Value::Null,
                    text("CHECK (\"PAGES\" >= 0)"),
                ],
                vec![
                    text("BOOK_TS_UNIQ"),
                    text("UNIQUE"),
                    text("BOOK"),
                    text("BOOK_TS_UNIQ"),
                    Value::Null,
                    Value::Null,
                    Value::Null,
                    Value::Null,
                ],
            ],
        );
        cursor.on(
            "FROM \"DJANGO$CONSTRAINT_SEGMENT\" s",
            vec![
                vec![text("BOOK_TS_UNIQ"), text("SUBTITLE"), Value::Int(1)],
                vec![text("BOOK_TS_UNIQ"), text("TITLE"), Value::Int(0)],
                vec![text("CHAPTER_BOOK_FK"), text("BOOK_ID"), Value::Int(0)],
            ],
        );
        cursor.on_param("WHERE rc.RDB$CONSTRAINT_NAME = ?", "INTEG_2", vec![vec![text("BOOK"), text("ID")]]);
    }

    #[test]
    fn test_enable_replays_in_dependency_order() {
        let caps = caps();
        let mut cursor = MockCursor::new();
        scripted_shadow(&mut cursor);
        let restored = ShadowStore::new(&mut cursor, &caps).enable_constraints().unwrap();
        assert_eq!(restored, 3);

        assert_eq!(
            cursor.ddl(),
            vec![
                "ALTER TABLE \"BOOK\" ADD CONSTRAINT \"BOOK_TS_UNIQ\" UNIQUE (\"TITLE\", \"SUBTITLE\")",
                "ALTER TABLE \"BOOK\" ADD CONSTRAINT \"INTEG_5\" CHECK (\"PAGES\" >= 0)",
                "ALTER TABLE \"CHAPTER\" ADD CONSTRAINT \"CHAPTER_BOOK_FK\" FOREIGN KEY (\"BOOK_ID\") \
                 REFERENCES \"BOOK\" (\"ID\") ON DELETE CASCADE",
                "DELETE FROM \"DJANGO$CONSTRAINT_SEGMENT\"",
                "DELETE FROM \"DJANGO$CONSTRAINT\"",
            ]
        );
    }

    #[test]
    fn test_enable_skips_constraints_that_fail() {
        let caps = caps();
        let mut cursor = MockCursor::new();
        scripted_shadow(&mut cursor);
        cursor.fail_always("CHECK (", -607, 335544351, "unsuccessful metadata update");
        let restored = ShadowStore::new(&mut cursor, &caps).enable_constraints().unwrap();
        assert_eq!(restored, 2);

        let statements = cursor.statements();
        assert!(statements.iter().any(|s| s == "ROLLBACK"));
        assert_eq!(statements.last().map(String::as_str), Some("COMMIT"));
        assert!(statements.iter().any(|s| s == "DELETE FROM \"DJANGO$CONSTRAINT\""));
    }

    #[test]
    fn test_enable_without_shadow_tables_is_noop() {
        let caps = caps();
        let mut cursor = MockCursor::new();
        assert_eq!(ShadowStore::new(&mut cursor, &caps).enable_constraints().unwrap(), 0);
        assert!(cursor.ddl().is_empty());
    }

    #[test]
    fn test_foreign_key_without_target_is_inconsistent() {
        let fk = ShadowConstraint {
            name: "CHAPTER_BOOK_FK".to_string(),
            kind: ConstraintKind::ForeignKey,
            relation_name: "CHAPTER".to_string(),
            index_name: None,
            const_name_uq: Some("INTEG_2".to_string()),
            update_rule: None,
            delete_rule: None,
            source: None,
            columns: vec!["BOOK_ID".to_string()],
        };
        assert!(matches!(fk.create_sql(None), Err(Error::CatalogInconsistency(_))));
    }
}
