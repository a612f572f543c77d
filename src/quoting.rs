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

//! Identifier and literal rendering.

use chrono::{NaiveDateTime, NaiveTime, Timelike};
use sha2::{Digest, Sha256};

use super::version::EngineCapabilities;
use super::value::Value;

const NAME_HASH_LEN: usize = 4;

/// Shorten `name` to `length` characters, replacing the tail with a short
/// digest of the full name so that distinct long names stay distinct.
pub fn truncate_name(name: &str, length: usize) -> String {
    if name.chars().count() <= length {
        return name.to_string();
    }
    let digest = names_digest(&[name], NAME_HASH_LEN);
    let keep: String = name.chars().take(length.saturating_sub(NAME_HASH_LEN)).collect();
    format!("{}{}", keep, digest)
}

/// Hex digest of the given parts, cut to `length` characters.
pub fn names_digest(parts: &[&str], length: usize) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(length);
    digest
}

fn is_delimited(name: &str) -> bool {
    name.len() >= 2 && name.starts_with('"') && name.ends_with('"')
}

/// `"NAME"`: upper-cased, then truncated to the identifier limit, so every
/// spelling of a name maps to the same identifier. Already delimited names
/// are returned untouched.
pub fn quote_identifier(name: &str, caps: &EngineCapabilities) -> String {
    if is_delimited(name) {
        return name.to_string();
    }
    format!("\"{}\"", truncate_name(&name.to_uppercase(), caps.max_identifier_length).to_uppercase())
}

/// The form the catalog stores a name in: same truncation and case as
/// [`quote_identifier`], without the quotes.
pub fn catalog_name(name: &str, caps: &EngineCapabilities) -> String {
    let quoted = quote_identifier(name, caps);
    quoted[1..quoted.len() - 1].to_string()
}

/// Deterministic constraint/index name for `columns` of `table`, e.g.
/// `BOOK_AUTHOR_ID_1A2B3C4D_FK`, kept inside the identifier limit.
pub fn index_name(table: &str, columns: &[&str], suffix: &str, caps: &EngineCapabilities) -> String {
    let max_length = caps.max_identifier_length;
    let mut parts = vec![table];
    parts.extend_from_slice(columns);
    let hash_suffix = format!("{}{}", names_digest(&parts, 8), suffix);

    let joined = columns.join("_");
    let mut name = format!("{}_{}_{}", table, joined, hash_suffix);
    if name.chars().count() > max_length {
        let other = (max_length.saturating_sub(hash_suffix.len()) / 2).saturating_sub(1);
        let t: String = table.chars().take(other).collect();
        let c: String = joined.chars().take(other).collect();
        name = format!("{}_{}_{}", t, c, hash_suffix);
    }
    // identifiers may not start with an underscore or a digit
    if name.starts_with('_') || name.starts_with(|c: char| c.is_ascii_digit()) {
        let mut shortened: String = name.chars().take(max_length - 1).collect();
        shortened.insert(0, 'D');
        name = shortened;
    }
    name.to_uppercase()
}

/// Timestamps carry at most four fractional digits in Firebird.
pub fn format_timestamp(value: &NaiveDateTime) -> String {
    let base = value.format("%Y-%m-%d %H:%M:%S").to_string();
    with_fraction(base, value.nanosecond())
}

pub fn format_time(value: &NaiveTime) -> String {
    let base = value.format("%H:%M:%S").to_string();
    with_fraction(base, value.nanosecond())
}

fn with_fraction(base: String, nanos: u32) -> String {
    let ten_thousandths = (nanos % 1_000_000_000) / 100_000;
    if ten_thousandths == 0 {
        base
    } else {
        format!("{}.{:04}", base, ten_thousandths)
    }
}

fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Render a value for inline embedding in generated SQL text.
pub fn quote_literal(value: &Value, caps: &EngineCapabilities) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) if caps.supports_boolean_type => (if *b { "True" } else { "False" }).to_string(),
        Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Decimal(v) => v.to_string(),
        Value::Text(s) => quote_string(s),
        Value::Bytes(b) => format!("x'{}'", hex::encode(b)),
        Value::Date(d) => format!("'{}'", d.format("%Y-%m-%d")),
        Value::Time(t) => format!("'{}'", format_time(t)),
        Value::Timestamp(ts) => format!("'{}'", format_timestamp(ts)),
        Value::Uuid(u) => quote_string(&u.simple().to_string()),
    }
}
