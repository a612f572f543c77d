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

//! Function rendering: one closed dispatch over the functions whose
//! Firebird spelling differs from the generic one.

use super::error::Error;
use super::sql::SqlFragment;

#[derive(Debug, Clone, PartialEq)]
pub enum Function {
    Length(SqlFragment),
    Lower(SqlFragment),
    Upper(SqlFragment),
    Substr {
        expr: SqlFragment,
        pos: SqlFragment,
        len: Option<SqlFragment>,
    },
    Concat(Vec<SqlFragment>),
    Greatest(Vec<SqlFragment>),
    Least(Vec<SqlFragment>),
    Coalesce(Vec<SqlFragment>),
    Cast {
        expr: SqlFragment,
        db_type: String,
    },
    Now,
    Random,
}

impl Function {
    pub fn name(&self) -> &'static str {
        match self {
            Function::Length(_) => "CHAR_LENGTH",
            Function::Lower(_) => "LOWER",
            Function::Upper(_) => "UPPER",
            Function::Substr { .. } => "SUBSTRING",
            Function::Concat(_) => "CONCAT",
            Function::Greatest(_) => "MAXVALUE",
            Function::Least(_) => "MINVALUE",
            Function::Coalesce(_) => "COALESCE",
            Function::Cast { .. } => "CAST",
            Function::Now => "CURRENT_TIMESTAMP",
            Function::Random => "RAND",
        }
    }

    pub fn as_sql(&self) -> Result<SqlFragment, Error> {
        let sql = match self {
            Function::Length(expr) | Function::Lower(expr) | Function::Upper(expr) => {
                SqlFragment::format(&format!("{}({{}})", self.name()), &[expr])
            }
            Function::Substr { expr, pos, len } => match len {
                Some(len) => SqlFragment::format("SUBSTRING({} FROM {} FOR {})", &[expr, pos, len]),
                None => SqlFragment::format("SUBSTRING({} FROM {})", &[expr, pos]),
            },
            Function::Concat(args) => {
                if args.len() < 2 {
                    return Err(Error::not_supported("CONCAT with fewer than two arguments"));
                }
                SqlFragment::join(args, " || ")
            }
            Function::Greatest(args) | Function::Least(args) | Function::Coalesce(args) => {
                if args.is_empty() {
                    return Err(Error::not_supported(format!("{} without arguments", self.name())));
                }
                let mut out = SqlFragment::new(format!("{}(", self.name()));
                out.push_fragment(&SqlFragment::join(args, ", "));
                out.push_sql(")");
                out
            }
            Function::Cast { expr, db_type } => SqlFragment::format(&format!("CAST({{}} AS {})", db_type), &[expr]),
            Function::Now => SqlFragment::new("CURRENT_TIMESTAMP"),
            Function::Random => SqlFragment::new("RAND()"),
        };
        Ok(sql)
    }
}
