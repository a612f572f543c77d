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

//! Catalog introspection for Firebird - reads the RDB$ system tables
//!
//! Reconstructs tables, columns, indexes and constraints in the shape the
//! schema editor diffs against. Absent tables and columns are a normal
//! state while planning a migration: queries that match nothing return
//! empty collections.

use std::collections::{BTreeMap, HashMap};

use log::debug;

use crate::cursor::Cursor;
use crate::error::Error;
use crate::model::FieldKind;
use crate::quoting::catalog_name;
use crate::sequence::SequenceBinding;
use crate::value::{Row, Value};
use crate::version::EngineCapabilities;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Table,
    View,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub kind: TableKind,
}

/// One column as described by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    /// `RDB$FIELD_TYPE` after the NUMERIC/DECIMAL and BLOB remap
    pub type_code: i32,
    pub field_type: i32,
    pub sub_type: i32,
    pub display_size: Option<i32>,
    pub internal_size: i32,
    pub precision: Option<i32>,
    pub scale: Option<i32>,
    pub nullable: bool,
    pub default_source: Option<String>,
}

impl ColumnDescriptor {
    pub fn kind(&self) -> Option<FieldKind> {
        field_kind(self.type_code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    ForeignKey,
    Check,
    Index,
}

impl ConstraintKind {
    pub(crate) fn from_catalog(constraint_type: &str) -> Option<ConstraintKind> {
        match constraint_type {
            "PRIMARY KEY" => Some(ConstraintKind::PrimaryKey),
            "UNIQUE" => Some(ConstraintKind::Unique),
            "FOREIGN KEY" => Some(ConstraintKind::ForeignKey),
            "CHECK" => Some(ConstraintKind::Check),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintDescriptor {
    pub name: String,
    pub kind: ConstraintKind,
    pub columns: Vec<String>,
    pub referenced_table: Option<String>,
    pub referenced_column: Option<String>,
    pub orders: Vec<SortOrder>,
    /// Backing index; a PK and a UNIQUE may share one.
    pub index_name: Option<String>,
    pub unique: bool,
    /// `COMPUTED BY` source of an expression index
    pub expression: Option<String>,
    /// Body of a CHECK constraint
    pub check_source: Option<String>,
}

impl ConstraintDescriptor {
    fn new(name: &str, kind: ConstraintKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            columns: Vec::new(),
            referenced_table: None,
            referenced_column: None,
            orders: Vec::new(),
            index_name: None,
            unique: matches!(kind, ConstraintKind::PrimaryKey | ConstraintKind::Unique),
            expression: None,
            check_source: None,
        }
    }

    pub fn covers(&self, columns: &[&str]) -> bool {
        self.columns.len() == columns.len()
            && self.columns.iter().zip(columns).all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

/// A foreign key on another table pointing at one of ours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingForeignKey {
    pub table: String,
    pub constraint_name: String,
    pub column: String,
    pub referenced_column: String,
    pub update_rule: String,
    pub delete_rule: String,
}

/// Synthetic code for integer-stored NUMERIC/DECIMAL and typed BLOBs.
pub fn remap_type_code(field_type: i32, sub_type: i32) -> i32 {
    match field_type {
        7 | 8 | 16 if sub_type > 0 => 160 + sub_type,
        261 => 260 + sub_type,
        _ => field_type,
    }
}

/// Field kind a (remapped) type code reads back as.
pub fn field_kind(type_code: i32) -> Option<FieldKind> {
    Some(match type_code {
        7 => FieldKind::SmallInteger,
        8 => FieldKind::Integer,
        10 | 27 => FieldKind::Float,
        12 => FieldKind::Date,
        13 => FieldKind::Time,
        14 | 37 => FieldKind::Char,
        16 => FieldKind::BigInteger,
        23 => FieldKind::Boolean,
        35 => FieldKind::DateTime,
        40 | 261 => FieldKind::Text,
        161 | 162 => FieldKind::Decimal,
        260 => FieldKind::Binary,
        _ => return None,
    })
}

/// Normalised text of an index expression, for comparing sources that
/// differ only in spacing, case or wrapping parentheses.
pub fn normalize_expression(source: &str) -> String {
    let mut s: String = source.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_uppercase();
    if let Some(rest) = s.strip_prefix("COMPUTEDBY") {
        s = rest.to_string();
    }
    while s.starts_with('(') && s.ends_with(')') && balanced(&s[1..s.len() - 1]) {
        s = s[1..s.len() - 1].to_string();
    }
    s
}

fn balanced(s: &str) -> bool {
    let mut depth = 0i32;
    for c in s.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

fn lower(name: String) -> String {
    name.to_lowercase()
}

/// Per-table catalog results, dropped whenever the table is altered.
#[derive(Debug, Default)]
pub struct CatalogCache {
    columns: HashMap<String, Vec<ColumnDescriptor>>,
    constraints: HashMap<String, BTreeMap<String, ConstraintDescriptor>>,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&mut self, table: &str) {
        let key = table.to_uppercase();
        self.columns.remove(&key);
        self.constraints.remove(&key);
    }

    pub fn clear(&mut self) {
        self.columns.clear();
        self.constraints.clear();
    }

    pub fn is_cached(&self, table: &str) -> bool {
        let key = table.to_uppercase();
        self.columns.contains_key(&key) || self.constraints.contains_key(&key)
    }
}

/// The introspection hook set.
pub struct Introspection<'a, C: Cursor + ?Sized> {
    cursor: &'a mut C,
    caps: &'a EngineCapabilities,
    cache: Option<&'a mut CatalogCache>,
}

impl<'a, C: Cursor + ?Sized> Introspection<'a, C> {
    pub fn new(cursor: &'a mut C, caps: &'a EngineCapabilities) -> Self {
        Self {
            cursor,
            caps,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: &'a mut CatalogCache) -> Self {
        self.cache = Some(cache);
        self
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Error> {
        debug!("{}; (params {:?})", sql.trim(), params);
        self.cursor.query(sql, params)
    }

    fn relation(&self, table: &str) -> Value {
        Value::Text(catalog_name(table, self.caps))
    }

    // ============================================================================
    // 1. TABLES
    // ============================================================================
    pub fn list_tables(&mut self) -> Result<Vec<TableInfo>, Error> {
        let sql = r#"
            SELECT r.RDB$RELATION_NAME,
                   CASE WHEN r.RDB$VIEW_BLR IS NULL THEN 0 ELSE 1 END
            FROM RDB$RELATIONS r
            WHERE COALESCE(r.RDB$SYSTEM_FLAG, 0) = 0
              AND r.RDB$RELATION_NAME NOT STARTING WITH 'DJANGO$'
            ORDER BY r.RDB$RELATION_NAME
        "#;
        let rows = self.query(sql, &[])?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let kind = if row.get::<i64>(1)? == 1 {
                TableKind::View
            } else {
                TableKind::Table
            };
            tables.push(TableInfo {
                name: lower(row.get_name(0)?),
                kind,
            });
        }
        Ok(tables)
    }

    pub fn table_names(&mut self) -> Result<Vec<String>, Error> {
        Ok(self
            .list_tables()?
            .into_iter()
            .filter(|t| t.kind == TableKind::Table)
            .map(|t| t.name)
            .collect())
    }

    // ============================================================================
    // 2. COLUMNS
    // ============================================================================
    pub fn describe_table(&mut self, table: &str) -> Result<Vec<ColumnDescriptor>, Error> {
        let key = catalog_name(table, self.caps);
        let cache_key = table.to_uppercase();
        if let Some(columns) = self.cache.as_ref().and_then(|c| c.columns.get(&cache_key)) {
            return Ok(columns.clone());
        }

        let sql = r#"
            SELECT rf.RDB$FIELD_NAME,
                   f.RDB$FIELD_TYPE,
                   f.RDB$FIELD_SUB_TYPE,
                   f.RDB$FIELD_LENGTH,
                   f.RDB$CHARACTER_LENGTH,
                   f.RDB$FIELD_PRECISION,
                   f.RDB$FIELD_SCALE,
                   rf.RDB$NULL_FLAG,
                   rf.RDB$DEFAULT_SOURCE
            FROM RDB$RELATION_FIELDS rf
            JOIN RDB$FIELDS f ON f.RDB$FIELD_NAME = rf.RDB$FIELD_SOURCE
            WHERE rf.RDB$RELATION_NAME = ?
            ORDER BY rf.RDB$FIELD_POSITION
        "#;
        let rows = self.query(sql, &[Value::Text(key.clone())])?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let field_type = row.get::<i32>(1)?;
            let sub_type = row.get::<Option<i32>>(2)?.unwrap_or(0);
            let default_source = row.get::<Option<String>>(8)?.map(|s| {
                let s = s.trim();
                s.strip_prefix("DEFAULT")
                    .or_else(|| s.strip_prefix("default"))
                    .unwrap_or(s)
                    .trim()
                    .to_string()
            });
            columns.push(ColumnDescriptor {
                name: lower(row.get_name(0)?),
                type_code: remap_type_code(field_type, sub_type),
                field_type,
                sub_type,
                display_size: row.get::<Option<i32>>(4)?,
                internal_size: row.get::<Option<i32>>(3)?.unwrap_or(0),
                precision: row.get::<Option<i32>>(5)?,
                scale: row.get::<Option<i32>>(6)?.map(|s| -s),
                nullable: row.get::<Option<i32>>(7)?.unwrap_or(0) != 1,
                default_source,
            });
        }

        if let Some(cache) = self.cache.as_mut() {
            cache.columns.insert(cache_key, columns.clone());
        }
        Ok(columns)
    }

    pub fn column_has_default(&mut self, table: &str, column: &str) -> Result<bool, Error> {
        let sql = r#"
            SELECT rf.RDB$DEFAULT_SOURCE
            FROM RDB$RELATION_FIELDS rf
            WHERE rf.RDB$RELATION_NAME = ? AND rf.RDB$FIELD_NAME = ?
        "#;
        let params = [self.relation(table), Value::Text(catalog_name(column, self.caps))];
        let rows = self.query(sql, &params)?;
        match rows.first() {
            Some(row) => Ok(row.get_opt_name(0)?.is_some()),
            None => Ok(false),
        }
    }

    // ============================================================================
    // 3. INDEXES AND CONSTRAINTS
    // ============================================================================
    pub fn get_constraints(&mut self, table: &str) -> Result<BTreeMap<String, ConstraintDescriptor>, Error> {
        let key = catalog_name(table, self.caps);
        let cache_key = table.to_uppercase();
        if let Some(constraints) = self.cache.as_ref().and_then(|c| c.constraints.get(&cache_key)) {
            return Ok(constraints.clone());
        }

        let sql = r#"
            SELECT rc.RDB$CONSTRAINT_NAME,
                   rc.RDB$CONSTRAINT_TYPE,
                   i.RDB$INDEX_NAME,
                   s.RDB$FIELD_NAME,
                   i.RDB$UNIQUE_FLAG,
                   i.RDB$INDEX_TYPE,
                   i2.RDB$RELATION_NAME,
                   s2.RDB$FIELD_NAME,
                   i.RDB$EXPRESSION_SOURCE
            FROM RDB$INDICES i
            LEFT JOIN RDB$INDEX_SEGMENTS s ON s.RDB$INDEX_NAME = i.RDB$INDEX_NAME
            LEFT JOIN RDB$RELATION_CONSTRAINTS rc ON rc.RDB$INDEX_NAME = i.RDB$INDEX_NAME
            LEFT JOIN RDB$REF_CONSTRAINTS refc ON refc.RDB$CONSTRAINT_NAME = rc.RDB$CONSTRAINT_NAME
            LEFT JOIN RDB$RELATION_CONSTRAINTS rc2 ON rc2.RDB$CONSTRAINT_NAME = refc.RDB$CONST_NAME_UQ
            LEFT JOIN RDB$INDICES i2 ON i2.RDB$INDEX_NAME = rc2.RDB$INDEX_NAME
            LEFT JOIN RDB$INDEX_SEGMENTS s2 ON s2.RDB$INDEX_NAME = i2.RDB$INDEX_NAME
                  AND s2.RDB$FIELD_POSITION = s.RDB$FIELD_POSITION
            WHERE i.RDB$RELATION_NAME = ?
            ORDER BY i.RDB$INDEX_NAME, s.RDB$FIELD_POSITION
        "#;
        let rows = self.query(sql, &[Value::Text(key.clone())])?;

        let mut constraints: BTreeMap<String, ConstraintDescriptor> = BTreeMap::new();
        for row in rows {
            let index_name = lower(row.get_name(2)?);
            let kind = match row.get_opt_name(1)? {
                Some(t) => ConstraintKind::from_catalog(&t).unwrap_or(ConstraintKind::Index),
                None => ConstraintKind::Index,
            };
            let name = match row.get_opt_name(0)? {
                Some(n) => lower(n),
                None => index_name.clone(),
            };
            let entry = constraints.entry(name.clone()).or_insert_with(|| {
                let mut c = ConstraintDescriptor::new(&name, kind);
                c.index_name = Some(index_name.clone());
                c
            });
            if kind == ConstraintKind::Index {
                entry.unique = row.get::<Option<i32>>(4)?.unwrap_or(0) == 1;
                entry.expression = row.get_opt_name(8)?;
            }
            if let Some(column) = row.get_opt_name(3)? {
                let column = lower(column);
                if !entry.columns.contains(&column) {
                    entry.columns.push(column);
                    let desc = row.get::<Option<i32>>(5)?.unwrap_or(0) == 1;
                    entry.orders.push(if desc { SortOrder::Desc } else { SortOrder::Asc });
                }
            }
            if kind == ConstraintKind::ForeignKey && entry.referenced_table.is_none() {
                entry.referenced_table = row.get_opt_name(6)?.map(lower);
                entry.referenced_column = row.get_opt_name(7)?.map(lower);
            }
        }

        for check in self.check_constraints(&key)? {
            constraints.insert(check.name.clone(), check);
        }

        if let Some(cache) = self.cache.as_mut() {
            cache.constraints.insert(cache_key, constraints.clone());
        }
        Ok(constraints)
    }

    fn check_constraints(&mut self, relation: &str) -> Result<Vec<ConstraintDescriptor>, Error> {
        let sql = r#"
            SELECT rc.RDB$CONSTRAINT_NAME, t.RDB$TRIGGER_SOURCE, d.RDB$FIELD_NAME
            FROM RDB$RELATION_CONSTRAINTS rc
            JOIN RDB$CHECK_CONSTRAINTS cc ON cc.RDB$CONSTRAINT_NAME = rc.RDB$CONSTRAINT_NAME
            JOIN RDB$TRIGGERS t ON t.RDB$TRIGGER_NAME = cc.RDB$TRIGGER_NAME
            LEFT JOIN RDB$DEPENDENCIES d ON d.RDB$DEPENDENT_NAME = t.RDB$TRIGGER_NAME
                  AND d.RDB$DEPENDED_ON_NAME = rc.RDB$RELATION_NAME
                  AND d.RDB$FIELD_NAME IS NOT NULL
            WHERE rc.RDB$RELATION_NAME = ?
              AND rc.RDB$CONSTRAINT_TYPE = 'CHECK'
              AND t.RDB$TRIGGER_TYPE = 1
            ORDER BY rc.RDB$CONSTRAINT_NAME
        "#;
        let rows = self.query(sql, &[Value::Text(relation.to_string())])?;

        let mut checks: Vec<ConstraintDescriptor> = Vec::new();
        for row in rows {
            let name = lower(row.get_name(0)?);
            if checks.last().is_none_or(|c| c.name != name) {
                let mut check = ConstraintDescriptor::new(&name, ConstraintKind::Check);
                check.check_source = row.get_opt_name(1)?;
                checks.push(check);
            }
            if let (Some(check), Some(column)) = (checks.last_mut(), row.get_opt_name(2)?) {
                let column = lower(column);
                if !check.columns.contains(&column) {
                    check.columns.push(column);
                }
            }
        }
        Ok(checks)
    }

    /// Indexes on `column` that no declared constraint owns.
    pub fn field_indexes(&mut self, table: &str, column: &str) -> Result<Vec<String>, Error> {
        let sql = r#"
            SELECT i.RDB$INDEX_NAME
            FROM RDB$INDICES i
            JOIN RDB$INDEX_SEGMENTS s ON s.RDB$INDEX_NAME = i.RDB$INDEX_NAME
            LEFT JOIN RDB$RELATION_CONSTRAINTS rc ON rc.RDB$INDEX_NAME = i.RDB$INDEX_NAME
            WHERE i.RDB$RELATION_NAME = ?
              AND s.RDB$FIELD_NAME = ?
              AND rc.RDB$CONSTRAINT_NAME IS NULL
            ORDER BY i.RDB$INDEX_NAME
        "#;
        let params = [self.relation(table), Value::Text(catalog_name(column, self.caps))];
        let rows = self.query(sql, &params)?;
        rows.iter().map(|r| r.get_name(0).map(lower)).collect()
    }

    /// `(column, referenced table, referenced column)` for every FK of `table`.
    pub fn get_key_columns(&mut self, table: &str) -> Result<Vec<(String, String, String)>, Error> {
        let constraints = self.get_constraints(table)?;
        let mut keys = Vec::new();
        for c in constraints.values().filter(|c| c.kind == ConstraintKind::ForeignKey) {
            if let (Some(column), Some(to_table), Some(to_column)) =
                (c.columns.first(), &c.referenced_table, &c.referenced_column)
            {
                keys.push((column.clone(), to_table.clone(), to_column.clone()));
            }
        }
        Ok(keys)
    }

    pub fn get_primary_key_column(&mut self, table: &str) -> Result<Option<String>, Error> {
        let constraints = self.get_constraints(table)?;
        Ok(constraints
            .values()
            .find(|c| c.kind == ConstraintKind::PrimaryKey)
            .and_then(|c| c.columns.first().cloned()))
    }

    /// Foreign keys on other tables referencing `table.column`.
    pub fn referencing_foreign_keys(&mut self, table: &str, column: &str) -> Result<Vec<IncomingForeignKey>, Error> {
        let sql = r#"
            SELECT rc.RDB$RELATION_NAME,
                   rc.RDB$CONSTRAINT_NAME,
                   s.RDB$FIELD_NAME,
                   s2.RDB$FIELD_NAME,
                   refc.RDB$UPDATE_RULE,
                   refc.RDB$DELETE_RULE
            FROM RDB$REF_CONSTRAINTS refc
            JOIN RDB$RELATION_CONSTRAINTS rc ON rc.RDB$CONSTRAINT_NAME = refc.RDB$CONSTRAINT_NAME
            JOIN RDB$INDEX_SEGMENTS s ON s.RDB$INDEX_NAME = rc.RDB$INDEX_NAME
            JOIN RDB$RELATION_CONSTRAINTS uq ON uq.RDB$CONSTRAINT_NAME = refc.RDB$CONST_NAME_UQ
            JOIN RDB$INDEX_SEGMENTS s2 ON s2.RDB$INDEX_NAME = uq.RDB$INDEX_NAME
                  AND s2.RDB$FIELD_POSITION = s.RDB$FIELD_POSITION
            WHERE uq.RDB$RELATION_NAME = ? AND s2.RDB$FIELD_NAME = ?
            ORDER BY rc.RDB$RELATION_NAME, rc.RDB$CONSTRAINT_NAME
        "#;
        let params = [self.relation(table), Value::Text(catalog_name(column, self.caps))];
        let rows = self.query(sql, &params)?;

        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            keys.push(IncomingForeignKey {
                table: lower(row.get_name(0)?),
                constraint_name: lower(row.get_name(1)?),
                column: lower(row.get_name(2)?),
                referenced_column: lower(row.get_name(3)?),
                update_rule: row.get_opt_name(4)?.unwrap_or_else(|| "RESTRICT".to_string()),
                delete_rule: row.get_opt_name(5)?.unwrap_or_else(|| "RESTRICT".to_string()),
            });
        }
        Ok(keys)
    }

    /// Name of the expression index on `table` computed by `source`.
    pub fn find_expression_index(&mut self, table: &str, source: &str) -> Result<Option<String>, Error> {
        let sql = r#"
            SELECT i.RDB$INDEX_NAME, i.RDB$EXPRESSION_SOURCE
            FROM RDB$INDICES i
            WHERE i.RDB$RELATION_NAME = ? AND i.RDB$EXPRESSION_SOURCE IS NOT NULL
            ORDER BY i.RDB$INDEX_NAME
        "#;
        let params = [self.relation(table)];
        let rows = self.query(sql, &params)?;
        let wanted = normalize_expression(source);
        for row in rows {
            if let Some(expression) = row.get_opt_name(1)? {
                if normalize_expression(&expression) == wanted {
                    return Ok(Some(lower(row.get_name(0)?)));
                }
            }
        }
        Ok(None)
    }

    // ============================================================================
    // 4. SEQUENCES
    // ============================================================================
    pub fn sequence_exists(&mut self, table: &str) -> Result<bool, Error> {
        let sql = r#"
            SELECT g.RDB$GENERATOR_ID
            FROM RDB$GENERATORS g
            WHERE g.RDB$GENERATOR_NAME = ?
        "#;
        let binding = SequenceBinding::new(table, self.caps);
        let params = [Value::Text(binding.sequence_catalog_name().to_string())];
        Ok(!self.query(sql, &params)?.is_empty())
    }

    pub fn trigger_exists(&mut self, table: &str) -> Result<bool, Error> {
        let sql = r#"
            SELECT t.RDB$TRIGGER_NAME
            FROM RDB$TRIGGERS t
            WHERE t.RDB$TRIGGER_NAME = ?
        "#;
        let binding = SequenceBinding::new(table, self.caps);
        let params = [Value::Text(binding.trigger_catalog_name().to_string())];
        Ok(!self.query(sql, &params)?.is_empty())
    }
}
