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

//! The narrow slice of a Firebird driver this crate needs.
//!
//! Any driver (firebirust, rsfbclient, ...) can be plugged in by implementing
//! [`Cursor`]. Placeholders are always `?` (qmark style).

use super::error::Error;
use super::transaction::TransactionOptions;
use super::value::{Row, Value};

pub trait Cursor {
    /// Run one statement. A following `fetchone`/`fetchall` reads its result set.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<(), Error>;

    fn fetchone(&mut self) -> Result<Option<Row>, Error>;

    fn fetchall(&mut self) -> Result<Vec<Row>, Error>;

    fn begin(&mut self, options: &TransactionOptions) -> Result<(), Error>;

    fn commit(&mut self) -> Result<(), Error>;

    fn rollback(&mut self) -> Result<(), Error>;

    /// Raw version banner, e.g. `WI-V3.0.5.33220 Firebird 3.0`
    fn server_version(&mut self) -> Result<String, Error>;

    /// Execute and collect every row.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Error> {
        self.execute(sql, params)?;
        self.fetchall()
    }
}

impl<C: Cursor + ?Sized> Cursor for &mut C {
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<(), Error> {
        (**self).execute(sql, params)
    }

    fn fetchone(&mut self) -> Result<Option<Row>, Error> {
        (**self).fetchone()
    }

    fn fetchall(&mut self) -> Result<Vec<Row>, Error> {
        (**self).fetchall()
    }

    fn begin(&mut self, options: &TransactionOptions) -> Result<(), Error> {
        (**self).begin(options)
    }

    fn commit(&mut self) -> Result<(), Error> {
        (**self).commit()
    }

    fn rollback(&mut self) -> Result<(), Error> {
        (**self).rollback()
    }

    fn server_version(&mut self) -> Result<String, Error> {
        (**self).server_version()
    }
}
