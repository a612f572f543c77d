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

//! Field and model descriptors consumed by the schema editor.

use super::quoting::quote_identifier;
use super::value::Value;
use super::version::EngineCapabilities;

/// Logical field type, the ORM-side view of a column.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Auto,
    BigAuto,
    Boolean,
    Char { max_length: u32 },
    Text,
    Binary,
    Date,
    Time,
    DateTime,
    Decimal { max_digits: u32, decimal_places: u32 },
    Float,
    Integer,
    BigInteger,
    SmallInteger,
    PositiveInteger,
    PositiveSmallInteger,
    Uuid,
    /// Microseconds stored as BIGINT
    Duration,
    GenericIpAddress,
}

/// Parameter-free classification of a column, shared by the read-side
/// conversions and the introspection reverse map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Auto,
    BigAuto,
    Boolean,
    Char,
    Text,
    Binary,
    Date,
    Time,
    DateTime,
    Decimal,
    Float,
    Integer,
    BigInteger,
    SmallInteger,
    Uuid,
    Duration,
}

impl FieldType {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldType::Auto => FieldKind::Auto,
            FieldType::BigAuto => FieldKind::BigAuto,
            FieldType::Boolean => FieldKind::Boolean,
            FieldType::Char { .. } | FieldType::GenericIpAddress => FieldKind::Char,
            FieldType::Text => FieldKind::Text,
            FieldType::Binary => FieldKind::Binary,
            FieldType::Date => FieldKind::Date,
            FieldType::Time => FieldKind::Time,
            FieldType::DateTime => FieldKind::DateTime,
            FieldType::Decimal { .. } => FieldKind::Decimal,
            FieldType::Float => FieldKind::Float,
            FieldType::Integer | FieldType::PositiveInteger => FieldKind::Integer,
            FieldType::BigInteger => FieldKind::BigInteger,
            FieldType::SmallInteger | FieldType::PositiveSmallInteger => FieldKind::SmallInteger,
            FieldType::Uuid => FieldKind::Uuid,
            FieldType::Duration => FieldKind::Duration,
        }
    }

    /// Column type as written in DDL.
    pub fn db_type(&self, caps: &EngineCapabilities) -> String {
        match self {
            FieldType::Auto | FieldType::Integer | FieldType::PositiveInteger => "INTEGER".to_string(),
            FieldType::BigAuto | FieldType::BigInteger | FieldType::Duration => "BIGINT".to_string(),
            FieldType::Boolean if caps.supports_boolean_type => "BOOLEAN".to_string(),
            FieldType::Boolean | FieldType::SmallInteger | FieldType::PositiveSmallInteger => {
                "SMALLINT".to_string()
            }
            FieldType::Char { max_length } => format!("VARCHAR({})", max_length),
            FieldType::GenericIpAddress => "VARCHAR(39)".to_string(),
            FieldType::Text => "BLOB SUB_TYPE 1".to_string(),
            FieldType::Binary => "BLOB SUB_TYPE 0".to_string(),
            FieldType::Date => "DATE".to_string(),
            FieldType::Time => "TIME".to_string(),
            FieldType::DateTime => "TIMESTAMP".to_string(),
            FieldType::Decimal {
                max_digits,
                decimal_places,
            } => format!("DECIMAL({}, {})", max_digits, decimal_places),
            FieldType::Float => "DOUBLE PRECISION".to_string(),
            FieldType::Uuid => "CHAR(32)".to_string(),
        }
    }

    /// Column-level CHECK body, if the type needs one.
    pub fn check_sql(&self, column: &str, caps: &EngineCapabilities) -> Option<String> {
        let quoted = quote_identifier(column, caps);
        match self {
            FieldType::PositiveInteger | FieldType::PositiveSmallInteger => Some(format!("{} >= 0", quoted)),
            FieldType::Boolean if !caps.supports_boolean_type => Some(format!("{} IN (0,1)", quoted)),
            _ => None,
        }
    }

    pub fn is_blob(&self) -> bool {
        matches!(self, FieldType::Text | FieldType::Binary)
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, FieldType::Auto | FieldType::BigAuto)
    }

    pub fn decimal_places(&self) -> Option<u32> {
        match self {
            FieldType::Decimal { decimal_places, .. } => Some(*decimal_places),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnDelete {
    #[default]
    NoAction,
    Cascade,
    SetNull,
    SetDefault,
}

impl OnDelete {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OnDelete::NoAction => "NO ACTION",
            OnDelete::Cascade => "CASCADE",
            OnDelete::SetNull => "SET NULL",
            OnDelete::SetDefault => "SET DEFAULT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    pub on_delete: OnDelete,
}

/// A column of a model.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub column: String,
    pub field_type: FieldType,
    pub null: bool,
    pub unique: bool,
    pub primary_key: bool,
    pub db_index: bool,
    pub default: Option<Value>,
    pub foreign_key: Option<ForeignKey>,
    /// Extra CHECK body appended to the type's own check.
    pub check: Option<String>,
}

impl Field {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            column: name.to_string(),
            field_type,
            null: false,
            unique: false,
            primary_key: false,
            db_index: false,
            default: None,
            foreign_key: None,
            check: None,
        }
    }

    /// The conventional `id` autoincrement primary key.
    pub fn auto_pk(name: &str) -> Self {
        Self::new(name, FieldType::Auto).primary_key(true)
    }

    pub fn column(mut self, column: &str) -> Self {
        self.column = column.to_string();
        self
    }

    pub fn null(mut self, null: bool) -> Self {
        self.null = null;
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn primary_key(mut self, primary_key: bool) -> Self {
        self.primary_key = primary_key;
        self
    }

    pub fn db_index(mut self, db_index: bool) -> Self {
        self.db_index = db_index;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn foreign_key(mut self, table: &str, column: &str, on_delete: OnDelete) -> Self {
        self.foreign_key = Some(ForeignKey {
            table: table.to_string(),
            column: column.to_string(),
            on_delete,
        });
        self
    }

    pub fn check(mut self, body: &str) -> Self {
        self.check = Some(body.to_string());
        self
    }

    pub fn is_unique(&self) -> bool {
        self.unique || self.primary_key
    }

    /// Combined CHECK body from the type and the explicit check.
    pub fn check_sql(&self, caps: &EngineCapabilities) -> Option<String> {
        match (self.field_type.check_sql(&self.column, caps), &self.check) {
            (Some(a), Some(b)) => Some(format!("{} AND ({})", a, b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b.clone()),
            (None, None) => None,
        }
    }
}

/// Named index over one or more columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
}

impl Index {
    pub fn new(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    pub table: String,
    pub fields: Vec<Field>,
    pub unique_together: Vec<Vec<String>>,
    pub index_together: Vec<Vec<String>>,
    pub indexes: Vec<Index>,
}

impl Model {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            fields: Vec::new(),
            unique_together: Vec::new(),
            index_together: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn unique_together(mut self, columns: &[&str]) -> Self {
        self.unique_together.push(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn index_together(mut self, columns: &[&str]) -> Self {
        self.index_together.push(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name || f.column == name)
    }

    pub fn pk(&self) -> Option<&Field> {
        self.fields.iter().find(|f| f.primary_key)
    }

    pub fn auto_field(&self) -> Option<&Field> {
        self.fields.iter().find(|f| f.field_type.is_auto())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::ServerVersion;

    fn fb25() -> EngineCapabilities {
        EngineCapabilities::new(ServerVersion([2, 5, 9, 0]))
    }

    fn fb30() -> EngineCapabilities {
        EngineCapabilities::new(ServerVersion([3, 0, 5, 0]))
    }

    #[test]
    fn test_db_type() {
        let caps = fb30();
        assert_eq!(FieldType::Char { max_length: 100 }.db_type(&caps), "VARCHAR(100)");
        assert_eq!(FieldType::Text.db_type(&caps), "BLOB SUB_TYPE 1");
        assert_eq!(FieldType::Binary.db_type(&caps), "BLOB SUB_TYPE 0");
        assert_eq!(FieldType::DateTime.db_type(&caps), "TIMESTAMP");
        assert_eq!(
            FieldType::Decimal {
                max_digits: 10,
                decimal_places: 2
            }
            .db_type(&caps),
            "DECIMAL(10, 2)"
        );
        assert_eq!(FieldType::Uuid.db_type(&caps), "CHAR(32)");
        assert_eq!(FieldType::Float.db_type(&caps), "DOUBLE PRECISION");
    }

    #[test]
    fn test_boolean_depends_on_engine() {
        assert_eq!(FieldType::Boolean.db_type(&fb30()), "BOOLEAN");
        assert_eq!(FieldType::Boolean.db_type(&fb25()), "SMALLINT");
        assert_eq!(FieldType::Boolean.check_sql("flag", &fb30()), None);
        assert_eq!(
            FieldType::Boolean.check_sql("flag", &fb25()),
            Some("\"FLAG\" IN (0,1)".to_string())
        );
    }

    #[test]
    fn test_field_check_combines() {
        let field = Field::new("qty", FieldType::PositiveInteger).check("\"QTY\" < 100");
        assert_eq!(
            field.check_sql(&fb30()),
            Some("\"QTY\" >= 0 AND (\"QTY\" < 100)".to_string())
        );
    }

    #[test]
    fn test_model_lookup() {
        let model = Model::new("book")
            .field(Field::auto_pk("id"))
            .field(Field::new("author", FieldType::Integer).column("author_id"));
        assert_eq!(model.pk().map(|f| f.column.as_str()), Some("id"));
        assert_eq!(model.auto_field().map(|f| f.name.as_str()), Some("id"));
        assert!(model.get_field("author_id").is_some());
        assert!(model.get_field("title").is_none());
    }
}
