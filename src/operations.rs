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

//! Lookup operators, date arithmetic and value coercion for Firebird.

use chrono::{DateTime, FixedOffset, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

use super::error::Error;
use super::model::{FieldKind, FieldType};
use super::options::BackendOptions;
use super::quoting::{quote_identifier, quote_literal};
use super::sql::SqlFragment;
use super::value::Value;
use super::version::EngineCapabilities;

const LIKE_ESCAPE: &str = "ESCAPE '\\'";

/// Comparison lookups understood by [`Operations::lookup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Exact,
    IExact,
    Contains,
    IContains,
    Gt,
    Gte,
    Lt,
    Lte,
    StartsWith,
    EndsWith,
    IStartsWith,
    IEndsWith,
    Regex,
    IRegex,
}

impl Lookup {
    pub fn parse(name: &str) -> Result<Lookup, Error> {
        Ok(match name {
            "exact" => Lookup::Exact,
            "iexact" => Lookup::IExact,
            "contains" => Lookup::Contains,
            "icontains" => Lookup::IContains,
            "gt" => Lookup::Gt,
            "gte" => Lookup::Gte,
            "lt" => Lookup::Lt,
            "lte" => Lookup::Lte,
            "startswith" => Lookup::StartsWith,
            "endswith" => Lookup::EndsWith,
            "istartswith" => Lookup::IStartsWith,
            "iendswith" => Lookup::IEndsWith,
            "regex" => Lookup::Regex,
            "iregex" => Lookup::IRegex,
            _ => return Err(Error::not_supported(format!("lookup {}", name))),
        })
    }

    pub fn is_case_insensitive(&self) -> bool {
        matches!(
            self,
            Lookup::IExact | Lookup::IContains | Lookup::IStartsWith | Lookup::IEndsWith
        )
    }

    pub fn is_pattern(&self) -> bool {
        matches!(
            self,
            Lookup::Contains
                | Lookup::IContains
                | Lookup::StartsWith
                | Lookup::IStartsWith
                | Lookup::EndsWith
                | Lookup::IEndsWith
        )
    }
}

/// Right-hand side of a lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Rhs {
    /// A bound value.
    Value(Value),
    /// Another column or expression.
    Expr(SqlFragment),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    Year,
    Quarter,
    Month,
    Week,
    WeekDay,
    Day,
    Hour,
    Minute,
    Second,
}

impl DatePart {
    pub fn parse(name: &str) -> Result<DatePart, Error> {
        Ok(match name {
            "year" => DatePart::Year,
            "quarter" => DatePart::Quarter,
            "month" => DatePart::Month,
            "week" => DatePart::Week,
            "week_day" => DatePart::WeekDay,
            "day" => DatePart::Day,
            "hour" => DatePart::Hour,
            "minute" => DatePart::Minute,
            "second" => DatePart::Second,
            _ => return Err(Error::not_supported(format!("date part {}", name))),
        })
    }

    fn keyword(&self) -> &'static str {
        match self {
            DatePart::Year => "YEAR",
            DatePart::Quarter => "QUARTER",
            DatePart::Month => "MONTH",
            DatePart::Week => "WEEK",
            DatePart::WeekDay => "WEEKDAY",
            DatePart::Day => "DAY",
            DatePart::Hour => "HOUR",
            DatePart::Minute => "MINUTE",
            DatePart::Second => "SECOND",
        }
    }
}

/// Temporal type a truncation casts back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncTarget {
    Date,
    Time,
    Timestamp,
}

/// A duration split the way DATEADD consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interval {
    pub negative: bool,
    pub days: i64,
    pub seconds: i64,
    pub microseconds: i64,
}

impl Interval {
    pub fn from_delta(delta: TimeDelta) -> Result<Interval, Error> {
        let total = delta
            .num_microseconds()
            .ok_or_else(|| Error::Conversion(format!("interval {} out of range", delta)))?;
        let magnitude = total.unsigned_abs() as i64;
        Ok(Interval {
            negative: total < 0,
            days: magnitude / 86_400_000_000,
            seconds: (magnitude % 86_400_000_000) / 1_000_000,
            microseconds: magnitude % 1_000_000,
        })
    }

    pub fn is_zero(&self) -> bool {
        self.days == 0 && self.seconds == 0 && self.microseconds == 0
    }
}

/// Aggregate functions with a Firebird spelling to check.
const UNSUPPORTED_AGGREGATES: [&str; 4] = ["STDDEV_SAMP", "STDDEV_POP", "VAR_SAMP", "VAR_POP"];

/// Escape `\`, `%` and `_` in a literal used with LIKE.
pub fn prep_for_like_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn escaped_pattern(rhs: &SqlFragment) -> SqlFragment {
    SqlFragment::format(
        "REPLACE(REPLACE(REPLACE({}, '\\', '\\\\'), '%', '\\%'), '_', '\\_')",
        &[rhs],
    )
}

/// The operations hook set: everything the ORM asks the backend to spell.
pub struct Operations<'a> {
    caps: &'a EngineCapabilities,
    options: &'a BackendOptions,
}

impl<'a> Operations<'a> {
    pub fn new(caps: &'a EngineCapabilities, options: &'a BackendOptions) -> Self {
        Self { caps, options }
    }

    pub fn capabilities(&self) -> &EngineCapabilities {
        self.caps
    }

    pub fn quote_name(&self, name: &str) -> String {
        quote_identifier(name, self.caps)
    }

    pub fn quote_value(&self, value: &Value) -> String {
        quote_literal(value, self.caps)
    }

    pub fn max_name_length(&self) -> usize {
        self.caps.max_identifier_length
    }

    // ============================================================================
    // Lookups
    // ============================================================================

    /// Parameterised operator template for a bound right-hand side.
    pub fn lookup_operator(&self, lookup: Lookup) -> &'static str {
        match lookup {
            Lookup::Exact => "= ?",
            Lookup::IExact => "= UPPER(?)",
            Lookup::Contains => "LIKE ? ESCAPE '\\'",
            Lookup::IContains => "LIKE UPPER(?) ESCAPE '\\'",
            Lookup::Gt => "> ?",
            Lookup::Gte => ">= ?",
            Lookup::Lt => "< ?",
            Lookup::Lte => "<= ?",
            Lookup::StartsWith => "LIKE ? ESCAPE '\\'",
            Lookup::EndsWith => "LIKE ? ESCAPE '\\'",
            Lookup::IStartsWith => "LIKE UPPER(?) ESCAPE '\\'",
            Lookup::IEndsWith => "LIKE UPPER(?) ESCAPE '\\'",
            Lookup::Regex | Lookup::IRegex => "SIMILAR TO ?",
        }
    }

    /// Operator applied to an expression right-hand side, which must be
    /// escaped in SQL because it cannot be escaped before binding.
    pub fn pattern_operator(&self, lookup: Lookup, rhs: &SqlFragment) -> SqlFragment {
        let escaped = escaped_pattern(rhs);
        let pattern = match lookup {
            Lookup::Contains => "LIKE '%' || {} || '%' ",
            Lookup::IContains => "LIKE '%' || UPPER({}) || '%' ",
            Lookup::StartsWith => "LIKE {} || '%' ",
            Lookup::IStartsWith => "LIKE UPPER({}) || '%' ",
            Lookup::EndsWith => "LIKE '%' || {} ",
            Lookup::IEndsWith => "LIKE '%' || UPPER({}) ",
            _ => {
                let template = self.lookup_operator(lookup).replace('?', "{}");
                return SqlFragment::format(&template, &[rhs]);
            }
        };
        let mut out = SqlFragment::format(pattern, &[&escaped]);
        out.push_sql(LIKE_ESCAPE);
        out
    }

    /// `UPPER(...)` around the left-hand side of case-insensitive lookups.
    pub fn lookup_cast(&self, lookup: Lookup, lhs: &SqlFragment) -> SqlFragment {
        if lookup.is_case_insensitive() {
            SqlFragment::format("UPPER({})", &[lhs])
        } else {
            lhs.clone()
        }
    }

    /// Complete `lhs <op> rhs` condition.
    pub fn lookup(&self, lookup: Lookup, lhs: &SqlFragment, rhs: Rhs) -> SqlFragment {
        let mut out = self.lookup_cast(lookup, lhs);
        out.push_sql(" ");
        match rhs {
            Rhs::Expr(expr) => {
                out.push_fragment(&self.pattern_operator(lookup, &expr));
            }
            Rhs::Value(value) => {
                let value = match (&value, lookup) {
                    (Value::Text(s), Lookup::Contains | Lookup::IContains) => {
                        Value::Text(format!("%{}%", prep_for_like_query(s)))
                    }
                    (Value::Text(s), Lookup::StartsWith | Lookup::IStartsWith) => {
                        Value::Text(format!("{}%", prep_for_like_query(s)))
                    }
                    (Value::Text(s), Lookup::EndsWith | Lookup::IEndsWith) => {
                        Value::Text(format!("%{}", prep_for_like_query(s)))
                    }
                    _ => value,
                };
                out.push_fragment(&SqlFragment::with_params(self.lookup_operator(lookup), vec![value]));
            }
        }
        out
    }

    /// `col CONTAINING ?`
    pub fn fulltext_search_sql(&self, column: &str) -> String {
        format!("{} CONTAINING ?", self.quote_name(column))
    }

    pub fn max_in_list_size(&self) -> usize {
        1500
    }

    // ============================================================================
    // Dates and times
    // ============================================================================

    pub fn date_extract_sql(&self, part: DatePart, expr: &SqlFragment) -> SqlFragment {
        match part {
            DatePart::WeekDay => SqlFragment::format("EXTRACT(WEEKDAY FROM {}) + 1", &[expr]),
            DatePart::Quarter => SqlFragment::format("((EXTRACT(MONTH FROM {}) + 2) / 3)", &[expr]),
            _ => SqlFragment::format(&format!("EXTRACT({} FROM {{}})", part.keyword()), &[expr]),
        }
    }

    pub fn datetime_extract_sql(&self, part: DatePart, expr: &SqlFragment) -> SqlFragment {
        self.date_extract_sql(part, expr)
    }

    /// Truncate `expr` to `part` and cast the result to `target`.
    pub fn trunc_sql(&self, part: DatePart, expr: &SqlFragment, target: TruncTarget) -> Result<SqlFragment, Error> {
        match target {
            TruncTarget::Time => self.time_trunc_sql(part, expr),
            TruncTarget::Date => match part {
                DatePart::Year | DatePart::Quarter | DatePart::Month | DatePart::Week | DatePart::Day => {
                    Ok(self.date_trunc_sql(part, expr, "DATE"))
                }
                _ => Err(Error::not_supported(format!("truncating a DATE to {:?}", part))),
            },
            TruncTarget::Timestamp => self.datetime_trunc_sql(part, expr),
        }
    }

    fn date_trunc_sql(&self, part: DatePart, expr: &SqlFragment, cast: &str) -> SqlFragment {
        let date_only = cast == "DATE";
        let midnight = if date_only { "" } else { " 00:00:00" };
        let body = match part {
            DatePart::Year => format!("EXTRACT(year FROM {{}})||'-01-01{}'", midnight),
            DatePart::Quarter => format!(
                "EXTRACT(year FROM {{}})||'-'||(((EXTRACT(month FROM {{}}) - 1) / 3) * 3 + 1)||'-01{}'",
                midnight
            ),
            DatePart::Month => format!(
                "EXTRACT(year FROM {{}})||'-'||EXTRACT(month FROM {{}})||'-01{}'",
                midnight
            ),
            DatePart::Week => {
                let monday = SqlFragment::format(
                    "DATEADD(-MOD(EXTRACT(WEEKDAY FROM {}) + 6, 7) DAY TO CAST({} AS DATE))",
                    &[expr, expr],
                );
                return SqlFragment::format(&format!("CAST({{}} AS {})", cast), &[&monday]);
            }
            _ => format!(
                "EXTRACT(year FROM {{}})||'-'||EXTRACT(month FROM {{}})||'-'||EXTRACT(day FROM {{}})||'{}'",
                midnight
            ),
        };
        let n = body.matches("{}").count();
        let args = vec![expr; n];
        let inner = SqlFragment::format(&body, &args);
        SqlFragment::format(&format!("CAST({{}} AS {})", cast), &[&inner])
    }

    pub fn datetime_trunc_sql(&self, part: DatePart, expr: &SqlFragment) -> Result<SqlFragment, Error> {
        let date = "EXTRACT(year FROM {})||'-'||EXTRACT(month FROM {})||'-'||EXTRACT(day FROM {})";
        let body = match part {
            DatePart::Year | DatePart::Quarter | DatePart::Month | DatePart::Week | DatePart::Day => {
                return Ok(self.date_trunc_sql(part, expr, "TIMESTAMP"));
            }
            DatePart::Hour => format!("{}||' '||EXTRACT(hour FROM {{}})||':00:00'", date),
            DatePart::Minute => format!(
                "{}||' '||EXTRACT(hour FROM {{}})||':'||EXTRACT(minute FROM {{}})||':00'",
                date
            ),
            DatePart::Second => format!(
                "{}||' '||EXTRACT(hour FROM {{}})||':'||EXTRACT(minute FROM {{}})||':'||TRUNC(EXTRACT(second FROM {{}}))",
                date
            ),
            DatePart::WeekDay => return Err(Error::not_supported("truncating to week_day")),
        };
        let n = body.matches("{}").count();
        let inner = SqlFragment::format(&body, &vec![expr; n]);
        Ok(SqlFragment::format("CAST({} AS TIMESTAMP)", &[&inner]))
    }

    pub fn time_trunc_sql(&self, part: DatePart, expr: &SqlFragment) -> Result<SqlFragment, Error> {
        let body = match part {
            DatePart::Hour => "EXTRACT(hour FROM {}) || ':00:00'",
            DatePart::Minute => "EXTRACT(hour FROM {}) || ':' || EXTRACT(minute FROM {}) || ':00'",
            DatePart::Second => {
                "EXTRACT(hour FROM {}) || ':' || EXTRACT(minute FROM {}) || ':' || TRUNC(EXTRACT(second FROM {}))"
            }
            _ => return Err(Error::not_supported(format!("truncating a TIME to {:?}", part))),
        };
        let n = body.matches("{}").count();
        let inner = SqlFragment::format(body, &vec![expr; n]);
        Ok(SqlFragment::format("CAST({} AS TIME)", &[&inner]))
    }

    pub fn datetime_cast_date_sql(&self, expr: &SqlFragment) -> SqlFragment {
        SqlFragment::format("CAST({} AS DATE)", &[expr])
    }

    pub fn datetime_cast_time_sql(&self, expr: &SqlFragment) -> SqlFragment {
        SqlFragment::format("CAST({} AS TIME)", &[expr])
    }

    /// `DATEADD(n unit TO sql)` for `sql +/- delta`.
    ///
    /// Only the most significant non-zero component of the interval is used
    /// (days, then seconds, then milliseconds), so mixed-unit intervals lose
    /// their smaller components.
    pub fn combine_duration(&self, connector: &str, sql: &SqlFragment, delta: TimeDelta) -> Result<SqlFragment, Error> {
        let connector_sign = match connector {
            "+" => 1,
            "-" => -1,
            _ => return Err(Error::not_supported(format!("interval connector {}", connector))),
        };
        let interval = Interval::from_delta(delta)?;
        if interval.is_zero() {
            return Ok(sql.clone());
        }
        let sign = if interval.negative { -connector_sign } else { connector_sign };
        let (value, unit) = if interval.days != 0 {
            (interval.days, "DAY")
        } else if interval.seconds != 0 {
            (interval.seconds, "SECOND")
        } else {
            (interval.microseconds / 1000, "MILLISECOND")
        };
        Ok(SqlFragment::format(&format!("DATEADD({} {} TO {{}})", value * sign, unit), &[sql]))
    }

    pub fn year_lookup_bounds(&self, year: i32) -> [String; 2] {
        [format!("{}-01-01 00:00:00", year), format!("{}-12-31 23:59:59.9999", year)]
    }

    pub fn year_lookup_bounds_for_date_field(&self, year: i32) -> [String; 2] {
        [format!("{}-01-01", year), format!("{}-12-31", year)]
    }

    // ============================================================================
    // Arithmetic and aggregates
    // ============================================================================

    pub fn combine_expression(&self, connector: &str, operands: &[SqlFragment]) -> SqlFragment {
        let function = match connector {
            "^" => "POWER",
            "%" => "MOD",
            "&" => "BIN_AND",
            "|" => "BIN_OR",
            "#" => "BIN_XOR",
            "<<" => "BIN_SHL",
            ">>" => "BIN_SHR",
            _ => return SqlFragment::join(operands, &format!(" {} ", connector)),
        };
        let mut out = SqlFragment::new(format!("{}(", function));
        out.push_fragment(&SqlFragment::join(operands, ", "));
        out.push_sql(")");
        out
    }

    /// Render `FUNCTION(expr)`, rejecting aggregates the engine lacks.
    pub fn aggregate_sql(&self, function: &str, expr: &SqlFragment, distinct: bool) -> Result<SqlFragment, Error> {
        let function = function.to_ascii_uppercase();
        if UNSUPPORTED_AGGREGATES.contains(&function.as_str()) {
            return Err(Error::not_supported(format!("aggregate {}", function)));
        }
        let distinct = if distinct { "DISTINCT " } else { "" };
        if function == "AVG" {
            return Ok(SqlFragment::format(
                &format!("AVG({}CAST({{}} AS DOUBLE PRECISION))", distinct),
                &[expr],
            ));
        }
        Ok(SqlFragment::format(&format!("{}({}{{}})", function, distinct), &[expr]))
    }

    pub fn random_function_sql(&self) -> &'static str {
        "RAND()"
    }

    // ============================================================================
    // Statement helpers
    // ============================================================================

    /// NOWAIT belongs to the transaction's lock resolution, not the clause.
    pub fn for_update_sql(&self, nowait: bool) -> Result<&'static str, Error> {
        if nowait {
            return Err(Error::not_supported(
                "FOR UPDATE NOWAIT; use TransactionOptions::lock_wait(LockWait::NoWait)",
            ));
        }
        Ok("FOR UPDATE WITH LOCK")
    }

    pub fn pk_default_value(&self) -> &'static str {
        "NULL"
    }

    pub fn deferrable_sql(&self) -> &'static str {
        ""
    }

    pub fn no_limit_value(&self) -> Option<u64> {
        self.options.no_limit_value
    }

    pub fn return_insert_id(&self, column: &str) -> Option<String> {
        if self.caps.can_return_id_from_insert {
            Some(format!("RETURNING {}", self.quote_name(column)))
        } else {
            None
        }
    }

    pub fn savepoint_create_sql(&self, sid: &str) -> String {
        format!("SAVEPOINT {}", self.quote_name(sid))
    }

    pub fn savepoint_commit_sql(&self, sid: &str) -> String {
        format!("RELEASE SAVEPOINT {}", self.quote_name(sid))
    }

    pub fn savepoint_rollback_sql(&self, sid: &str) -> String {
        format!("ROLLBACK TO {}", self.quote_name(sid))
    }

    /// Empty `tables` and restart the sequences of `sequence_tables`.
    pub fn sql_flush(&self, tables: &[&str], sequence_tables: &[&str]) -> Vec<String> {
        if tables.is_empty() {
            return Vec::new();
        }
        let mut sql: Vec<String> = tables
            .iter()
            .map(|t| format!("DELETE FROM {}", self.quote_name(t)))
            .collect();
        for table in sequence_tables {
            sql.push(super::sequence::SequenceBinding::new(table, self.caps).restart_sql(0));
        }
        sql
    }

    // ============================================================================
    // Values
    // ============================================================================

    /// Datetime ready for binding: at most 4 fractional digits, and no
    /// offset.
    pub fn adapt_datetime(&self, value: &NaiveDateTime) -> Value {
        Value::Timestamp(truncate_to_tenth_millis(*value))
    }

    pub fn adapt_datetime_tz(&self, value: &DateTime<FixedOffset>) -> Result<Value, Error> {
        if !self.options.use_tz {
            return Err(Error::Conversion(
                "Firebird does not support timezone-aware datetimes when use_tz is false".to_string(),
            ));
        }
        Ok(self.adapt_datetime(&value.naive_utc()))
    }

    pub fn adapt_time(&self, value: &NaiveTime) -> Value {
        let nanos = value.nanosecond() / 100_000 * 100_000;
        Value::Time(value.with_nanosecond(nanos).unwrap_or(*value))
    }

    /// Times carry no date to resolve an offset against.
    pub fn adapt_time_tz(&self, _value: &NaiveTime, _offset: &FixedOffset) -> Result<Value, Error> {
        Err(Error::Conversion(
            "Firebird does not support timezone-aware times".to_string(),
        ))
    }

    /// Coerce a fetched value to what `field` expects.
    pub fn convert_value(&self, value: Value, field: &FieldType) -> Result<Value, Error> {
        if value.is_null() {
            return Ok(value);
        }
        let converted = match (field.kind(), value) {
            (FieldKind::Decimal, v) => {
                let d = match v {
                    Value::Decimal(d) => d,
                    Value::Int(i) => Decimal::from(i),
                    Value::Float(f) => Decimal::from_f64(f).ok_or_else(|| conversion(&Value::Float(f), "decimal"))?,
                    Value::Text(s) => s
                        .trim()
                        .parse::<Decimal>()
                        .map_err(|_| conversion(&Value::Text(s.clone()), "decimal"))?,
                    other => return Err(conversion(&other, "decimal")),
                };
                match field.decimal_places() {
                    Some(dp) => {
                        let mut d = d.round_dp(dp);
                        d.rescale(dp);
                        Value::Decimal(d)
                    }
                    None => Value::Decimal(d),
                }
            }
            (FieldKind::Boolean, Value::Int(0)) => Value::Bool(false),
            (FieldKind::Boolean, Value::Int(1)) => Value::Bool(true),
            (FieldKind::Float, Value::Int(i)) => Value::Float(i as f64),
            (FieldKind::Float, Value::Decimal(d)) => {
                Value::Float(d.to_f64().ok_or_else(|| conversion(&Value::Decimal(d), "float"))?)
            }
            (
                FieldKind::Auto
                | FieldKind::BigAuto
                | FieldKind::Integer
                | FieldKind::BigInteger
                | FieldKind::SmallInteger
                | FieldKind::Duration,
                v @ (Value::Decimal(_) | Value::Float(_) | Value::Text(_)),
            ) => {
                let i = match &v {
                    Value::Float(f) => f.to_i64(),
                    Value::Text(s) => s.trim().parse::<i64>().ok(),
                    other => other.as_i64(),
                };
                Value::Int(i.ok_or_else(|| conversion(&v, "integer"))?)
            }
            (FieldKind::Uuid, Value::Text(s)) => {
                Value::Uuid(uuid::Uuid::parse_str(s.trim()).map_err(|_| conversion(&Value::Text(s.clone()), "uuid"))?)
            }
            (FieldKind::Binary, Value::Text(s)) => Value::Bytes(s.into_bytes()),
            (FieldKind::Text | FieldKind::Char, Value::Bytes(b)) => {
                Value::Text(String::from_utf8(b).map_err(|e| Error::Conversion(e.to_string()))?)
            }
            (_, v) => v,
        };
        Ok(converted)
    }
}

fn conversion(value: &Value, to: &str) -> Error {
    Error::Conversion(format!("cannot convert {:?} to {}", value, to))
}

fn truncate_to_tenth_millis(value: NaiveDateTime) -> NaiveDateTime {
    let nanos = value.nanosecond() / 100_000 * 100_000;
    value.with_nanosecond(nanos).unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::ServerVersion;
    use chrono::{NaiveDate, TimeZone};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn caps() -> EngineCapabilities {
        EngineCapabilities::new(ServerVersion([3, 0, 5, 0]))
    }

    fn field(name: &str) -> SqlFragment {
        SqlFragment::new(name)
    }

    #[test]
    fn test_date_trunc_sql() {
        let (caps, options) = (caps(), BackendOptions::default());
        let ops = Operations::new(&caps, &options);
        let f = field("DATE_FIELD");

        let sql = ops.datetime_trunc_sql(DatePart::Year, &f).unwrap();
        assert_eq!(
            sql.template,
            "CAST(EXTRACT(year FROM DATE_FIELD)||'-01-01 00:00:00' AS TIMESTAMP)"
        );
        let sql = ops.datetime_trunc_sql(DatePart::Month, &f).unwrap();
        assert_eq!(
            sql.template,
            "CAST(EXTRACT(year FROM DATE_FIELD)||'-'||EXTRACT(month FROM DATE_FIELD)||'-01 00:00:00' AS TIMESTAMP)"
        );
        let sql = ops.datetime_trunc_sql(DatePart::Day, &f).unwrap();
        assert_eq!(
            sql.template,
            "CAST(EXTRACT(year FROM DATE_FIELD)||'-'||EXTRACT(month FROM DATE_FIELD)||'-'||EXTRACT(day FROM DATE_FIELD)||' 00:00:00' AS TIMESTAMP)"
        );
    }

    #[test]
    fn test_datetime_trunc_sql() {
        let (caps, options) = (caps(), BackendOptions::default());
        let ops = Operations::new(&caps, &options);
        let f = field("DATE_FIELD");

        let sql = ops.datetime_trunc_sql(DatePart::Hour, &f).unwrap();
        assert_eq!(
            sql.template,
            "CAST(EXTRACT(year FROM DATE_FIELD)||'-'||EXTRACT(month FROM DATE_FIELD)||'-'||EXTRACT(day FROM DATE_FIELD)||' '||EXTRACT(hour FROM DATE_FIELD)||':00:00' AS TIMESTAMP)"
        );
        let sql = ops.datetime_trunc_sql(DatePart::Minute, &f).unwrap();
        assert_eq!(
            sql.template,
            "CAST(EXTRACT(year FROM DATE_FIELD)||'-'||EXTRACT(month FROM DATE_FIELD)||'-'||EXTRACT(day FROM DATE_FIELD)||' '||EXTRACT(hour FROM DATE_FIELD)||':'||EXTRACT(minute FROM DATE_FIELD)||':00' AS TIMESTAMP)"
        );
        let sql = ops.datetime_trunc_sql(DatePart::Second, &f).unwrap();
        assert_eq!(
            sql.template,
            "CAST(EXTRACT(year FROM DATE_FIELD)||'-'||EXTRACT(month FROM DATE_FIELD)||'-'||EXTRACT(day FROM DATE_FIELD)||' '||EXTRACT(hour FROM DATE_FIELD)||':'||EXTRACT(minute FROM DATE_FIELD)||':'||TRUNC(EXTRACT(second FROM DATE_FIELD)) AS TIMESTAMP)"
        );
    }

    #[test]
    fn test_time_trunc_sql() {
        let (caps, options) = (caps(), BackendOptions::default());
        let ops = Operations::new(&caps, &options);
        let f = field("TIME_FIELD");

        assert_eq!(
            ops.time_trunc_sql(DatePart::Hour, &f).unwrap().template,
            "CAST(EXTRACT(hour FROM TIME_FIELD) || ':00:00' AS TIME)"
        );
        assert_eq!(
            ops.time_trunc_sql(DatePart::Minute, &f).unwrap().template,
            "CAST(EXTRACT(hour FROM TIME_FIELD) || ':' || EXTRACT(minute FROM TIME_FIELD) || ':00' AS TIME)"
        );
        assert_eq!(
            ops.time_trunc_sql(DatePart::Second, &f).unwrap().template,
            "CAST(EXTRACT(hour FROM TIME_FIELD) || ':' || EXTRACT(minute FROM TIME_FIELD) || ':' || TRUNC(EXTRACT(second FROM TIME_FIELD)) AS TIME)"
        );
        assert!(ops.time_trunc_sql(DatePart::Day, &f).is_err());
    }

    #[test]
    fn test_trunc_to_date_target() {
        let (caps, options) = (caps(), BackendOptions::default());
        let ops = Operations::new(&caps, &options);
        let f = field("D");

        let sql = ops.trunc_sql(DatePart::Month, &f, TruncTarget::Date).unwrap();
        assert_eq!(sql.template, "CAST(EXTRACT(year FROM D)||'-'||EXTRACT(month FROM D)||'-01' AS DATE)");
        assert!(ops.trunc_sql(DatePart::Hour, &f, TruncTarget::Date).is_err());
    }

    #[test]
    fn test_trunc_repeats_parameters() {
        let (caps, options) = (caps(), BackendOptions::default());
        let ops = Operations::new(&caps, &options);
        let d = NaiveDate::from_ymd_opt(2024, 5, 17).unwrap();
        let sql = ops
            .datetime_trunc_sql(DatePart::Day, &SqlFragment::param(Value::Date(d)))
            .unwrap();
        assert_eq!(sql.params.len(), 3);
        sql.validate().unwrap();
    }

    #[test]
    fn test_extract() {
        let (caps, options) = (caps(), BackendOptions::default());
        let ops = Operations::new(&caps, &options);
        let f = field("\"PUB_DATE\"");
        assert_eq!(
            ops.date_extract_sql(DatePart::WeekDay, &f).template,
            "EXTRACT(WEEKDAY FROM \"PUB_DATE\") + 1"
        );
        assert_eq!(
            ops.date_extract_sql(DatePart::Year, &f).template,
            "EXTRACT(YEAR FROM \"PUB_DATE\")"
        );
        assert_eq!(
            ops.datetime_extract_sql(DatePart::Quarter, &f).template,
            "((EXTRACT(MONTH FROM \"PUB_DATE\") + 2) / 3)"
        );
        assert!(DatePart::parse("iso_year").is_err());
    }

    #[test]
    fn test_lookup_with_value() {
        let (caps, options) = (caps(), BackendOptions::default());
        let ops = Operations::new(&caps, &options);
        let lhs = field("\"NAME\"");

        let sql = ops.lookup(Lookup::IContains, &lhs, Rhs::Value(Value::from("50%_off")));
        assert_eq!(sql.template, "UPPER(\"NAME\") LIKE UPPER(?) ESCAPE '\\'");
        assert_eq!(sql.params, vec![Value::from("%50\\%\\_off%")]);

        let sql = ops.lookup(Lookup::StartsWith, &lhs, Rhs::Value(Value::from("Jo")));
        assert_eq!(sql.params, vec![Value::from("Jo%")]);

        let sql = ops.lookup(Lookup::Exact, &lhs, Rhs::Value(Value::from("Jo")));
        assert_eq!(sql.template, "\"NAME\" = ?");
        assert_eq!(sql.params, vec![Value::from("Jo")]);

        let sql = ops.lookup(Lookup::Regex, &lhs, Rhs::Value(Value::from("J%")));
        assert_eq!(sql.template, "\"NAME\" SIMILAR TO ?");
    }

    #[test]
    fn test_lookup_with_expression_escapes_in_sql() {
        let (caps, options) = (caps(), BackendOptions::default());
        let ops = Operations::new(&caps, &options);
        let sql = ops.lookup(Lookup::Contains, &field("\"A\""), Rhs::Expr(field("\"B\"")));
        assert_eq!(
            sql.template,
            "\"A\" LIKE '%' || REPLACE(REPLACE(REPLACE(\"B\", '\\', '\\\\'), '%', '\\%'), '_', '\\_') || '%' ESCAPE '\\'"
        );
        assert!(sql.params.is_empty());

        let sql = ops.lookup(Lookup::Gte, &field("\"A\""), Rhs::Expr(field("\"B\"")));
        assert_eq!(sql.template, "\"A\" >= \"B\"");
    }

    #[test]
    fn test_lookup_parse() {
        assert_eq!(Lookup::parse("iendswith").unwrap(), Lookup::IEndsWith);
        assert!(matches!(Lookup::parse("search"), Err(Error::NotSupported(_))));
    }

    #[test]
    fn test_combine_expression() {
        let (caps, options) = (caps(), BackendOptions::default());
        let ops = Operations::new(&caps, &options);
        let operands = [field("\"A\""), field("\"B\"")];
        assert_eq!(ops.combine_expression("^", &operands).template, "POWER(\"A\", \"B\")");
        assert_eq!(ops.combine_expression("%", &operands).template, "MOD(\"A\", \"B\")");
        assert_eq!(ops.combine_expression("&", &operands).template, "BIN_AND(\"A\", \"B\")");
        assert_eq!(ops.combine_expression("|", &operands).template, "BIN_OR(\"A\", \"B\")");
        assert_eq!(ops.combine_expression("+", &operands).template, "\"A\" + \"B\"");
    }

    #[test]
    fn test_combine_duration() {
        let (caps, options) = (caps(), BackendOptions::default());
        let ops = Operations::new(&caps, &options);
        let f = field("\"START\"");

        let sql = ops.combine_duration("+", &f, TimeDelta::days(3)).unwrap();
        assert_eq!(sql.template, "DATEADD(3 DAY TO \"START\")");
        let sql = ops.combine_duration("-", &f, TimeDelta::seconds(90)).unwrap();
        assert_eq!(sql.template, "DATEADD(-90 SECOND TO \"START\")");
        let sql = ops.combine_duration("+", &f, TimeDelta::microseconds(2500)).unwrap();
        assert_eq!(sql.template, "DATEADD(2 MILLISECOND TO \"START\")");
        let sql = ops.combine_duration("+", &f, TimeDelta::seconds(-30)).unwrap();
        assert_eq!(sql.template, "DATEADD(-30 SECOND TO \"START\")");
        let sql = ops.combine_duration("+", &f, TimeDelta::zero()).unwrap();
        assert_eq!(sql.template, "\"START\"");
        assert!(ops.combine_duration("*", &f, TimeDelta::days(1)).is_err());
    }

    /// Known discrepancy: only the largest non-zero unit survives, so
    /// "1 day 2 hours" adds exactly one day. Confirm against a live engine
    /// before relying on mixed-unit intervals.
    #[test]
    fn test_combine_duration_drops_smaller_units_known_discrepancy() {
        let (caps, options) = (caps(), BackendOptions::default());
        let ops = Operations::new(&caps, &options);
        let delta = TimeDelta::days(1) + TimeDelta::hours(2);
        let sql = ops.combine_duration("+", &field("T"), delta).unwrap();
        assert_eq!(sql.template, "DATEADD(1 DAY TO T)");

        let delta = TimeDelta::seconds(5) + TimeDelta::milliseconds(750);
        let sql = ops.combine_duration("+", &field("T"), delta).unwrap();
        assert_eq!(sql.template, "DATEADD(5 SECOND TO T)");
    }

    #[test]
    fn test_aggregates() {
        let (caps, options) = (caps(), BackendOptions::default());
        let ops = Operations::new(&caps, &options);
        let f = field("\"PRICE\"");
        assert_eq!(
            ops.aggregate_sql("avg", &f, false).unwrap().template,
            "AVG(CAST(\"PRICE\" AS DOUBLE PRECISION))"
        );
        assert_eq!(ops.aggregate_sql("COUNT", &f, true).unwrap().template, "COUNT(DISTINCT \"PRICE\")");
        for name in ["STDDEV_SAMP", "STDDEV_POP", "VAR_SAMP", "VAR_POP"] {
            let err = ops.aggregate_sql(name, &f, false).unwrap_err();
            assert_eq!(err.kind(), crate::error::ErrorKind::Translation);
        }
    }

    #[test]
    fn test_misc_operations() {
        let (caps, options) = (caps(), BackendOptions::default());
        let ops = Operations::new(&caps, &options);
        assert_eq!(ops.fulltext_search_sql("body"), "\"BODY\" CONTAINING ?");
        assert_eq!(ops.random_function_sql(), "RAND()");
        assert_eq!(ops.for_update_sql(false).unwrap(), "FOR UPDATE WITH LOCK");
        assert!(ops.for_update_sql(true).is_err());
        assert_eq!(ops.max_in_list_size(), 1500);
        assert_eq!(ops.pk_default_value(), "NULL");
        assert_eq!(ops.return_insert_id("id").as_deref(), Some("RETURNING \"ID\""));
        assert_eq!(ops.savepoint_create_sql("s1"), "SAVEPOINT \"S1\"");
        assert_eq!(ops.savepoint_commit_sql("s1"), "RELEASE SAVEPOINT \"S1\"");
        assert_eq!(ops.savepoint_rollback_sql("s1"), "ROLLBACK TO \"S1\"");
        assert_eq!(
            ops.year_lookup_bounds(2024),
            ["2024-01-01 00:00:00".to_string(), "2024-12-31 23:59:59.9999".to_string()]
        );
        assert_eq!(
            ops.year_lookup_bounds_for_date_field(2024),
            ["2024-01-01".to_string(), "2024-12-31".to_string()]
        );
    }

    #[test]
    fn test_sql_flush() {
        let (caps, options) = (caps(), BackendOptions::default());
        let ops = Operations::new(&caps, &options);
        assert!(ops.sql_flush(&[], &["author"]).is_empty());
        assert_eq!(
            ops.sql_flush(&["author", "book"], &["author"]),
            vec![
                "DELETE FROM \"AUTHOR\"".to_string(),
                "DELETE FROM \"BOOK\"".to_string(),
                "ALTER SEQUENCE \"AUTHOR_SQ\" RESTART WITH 0".to_string(),
            ]
        );
    }

    #[test]
    fn test_adapt_datetime() {
        let caps = caps();
        let options = BackendOptions::default();
        let ops = Operations::new(&caps, &options);
        let dt = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_micro_opt(3, 4, 5, 123_456)
            .unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_micro_opt(3, 4, 5, 123_400)
            .unwrap();
        assert_eq!(ops.adapt_datetime(&dt), Value::Timestamp(expected));

        let aware = FixedOffset::east_opt(3600).unwrap().from_local_datetime(&dt).unwrap();
        assert!(ops.adapt_datetime_tz(&aware).is_err());

        let options = BackendOptions::default().use_tz(true);
        let ops = Operations::new(&caps, &options);
        let utc = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_micro_opt(2, 4, 5, 123_400)
            .unwrap();
        assert_eq!(ops.adapt_datetime_tz(&aware).unwrap(), Value::Timestamp(utc));

        let offset = FixedOffset::east_opt(0).unwrap();
        assert!(ops.adapt_time_tz(&dt.time(), &offset).is_err());
    }

    #[test]
    fn test_convert_value() {
        let (caps, options) = (caps(), BackendOptions::default());
        let ops = Operations::new(&caps, &options);
        let decimal = FieldType::Decimal {
            max_digits: 10,
            decimal_places: 2,
        };
        assert_eq!(
            ops.convert_value(Value::Decimal(dec!(1.5)), &decimal).unwrap(),
            Value::Decimal(dec!(1.50))
        );
        assert_eq!(ops.convert_value(Value::Int(3), &decimal).unwrap(), Value::Decimal(dec!(3.00)));
        assert_eq!(ops.convert_value(Value::Int(1), &FieldType::Boolean).unwrap(), Value::Bool(true));
        assert_eq!(ops.convert_value(Value::Int(0), &FieldType::Boolean).unwrap(), Value::Bool(false));
        assert_eq!(ops.convert_value(Value::Int(2), &FieldType::Float).unwrap(), Value::Float(2.0));
        assert_eq!(
            ops.convert_value(Value::Decimal(dec!(42)), &FieldType::BigInteger).unwrap(),
            Value::Int(42)
        );
        assert_eq!(ops.convert_value(Value::Null, &FieldType::Integer).unwrap(), Value::Null);

        let id = uuid::Uuid::parse_str("67e55044-10b1-426f-9247-bb680e5fe0c8").unwrap();
        assert_eq!(
            ops.convert_value(Value::Text(id.simple().to_string()), &FieldType::Uuid).unwrap(),
            Value::Uuid(id)
        );
        assert_eq!(
            ops.convert_value(Value::Bytes(b"hello".to_vec()), &FieldType::Text).unwrap(),
            Value::from("hello")
        );
        assert!(ops.convert_value(Value::from("nope"), &FieldType::Uuid).is_err());
    }
}
