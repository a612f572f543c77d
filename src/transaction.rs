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

use log::warn;

use super::cursor::Cursor;
use super::error::Error;
use super::value::{Row, Value};

/// Firebird isolation levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// `READ COMMITTED`; `record_version` reads the latest committed
    /// version instead of waiting on uncommitted ones.
    ReadCommitted { record_version: bool },
    /// `SNAPSHOT` (concurrency)
    Snapshot,
    /// `SNAPSHOT TABLE STABILITY` (consistency)
    TableStability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockWait {
    #[default]
    Wait,
    NoWait,
    /// Seconds to wait for a conflicting lock
    Timeout(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOptions {
    pub isolation_level: IsolationLevel,
    pub lock_wait: LockWait,
    pub read_only: bool,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            isolation_level: IsolationLevel::ReadCommitted { record_version: true },
            lock_wait: LockWait::Wait,
            read_only: false,
        }
    }
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }

    pub fn lock_wait(mut self, wait: LockWait) -> Self {
        self.lock_wait = wait;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Used when the catalog must not move under a multi-statement read such
    /// as the constraint capture.
    pub fn snapshot() -> Self {
        Self::default().isolation_level(IsolationLevel::Snapshot)
    }

    pub fn table_stability() -> Self {
        Self::default().isolation_level(IsolationLevel::TableStability)
    }

    /// `SET TRANSACTION` statement for drivers that start transactions in SQL.
    pub fn to_sql(&self) -> String {
        let access = if self.read_only { "READ ONLY" } else { "READ WRITE" };
        let wait = match self.lock_wait {
            LockWait::Wait => "WAIT".to_string(),
            LockWait::NoWait => "NO WAIT".to_string(),
            LockWait::Timeout(seconds) => format!("WAIT LOCK TIMEOUT {}", seconds),
        };
        let isolation = match self.isolation_level {
            IsolationLevel::ReadCommitted { record_version: true } => "READ COMMITTED RECORD_VERSION",
            IsolationLevel::ReadCommitted { record_version: false } => "READ COMMITTED NO RECORD_VERSION",
            IsolationLevel::Snapshot => "SNAPSHOT",
            IsolationLevel::TableStability => "SNAPSHOT TABLE STABILITY",
        };
        format!("SET TRANSACTION {} {} ISOLATION LEVEL {}", access, wait, isolation)
    }
}

/// Open transaction on a [`Cursor`]; rolled back on drop unless `commit()`
/// or `rollback()` went through.
pub struct Transaction<'c, C: Cursor + ?Sized> {
    cursor: &'c mut C,
    finished: bool,
}

impl<'c, C: Cursor + ?Sized> Transaction<'c, C> {
    pub fn new(cursor: &'c mut C) -> Result<Self, Error> {
        Self::with_options(cursor, &TransactionOptions::default())
    }

    pub fn with_options(cursor: &'c mut C, options: &TransactionOptions) -> Result<Self, Error> {
        cursor.begin(options)?;
        Ok(Transaction { cursor, finished: false })
    }

    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<(), Error> {
        self.cursor.execute(sql, params)
    }

    pub fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Error> {
        self.cursor.query(sql, params)
    }

    pub fn commit(mut self) -> Result<(), Error> {
        self.cursor.commit()?;
        self.finished = true;
        Ok(())
    }

    pub fn rollback(mut self) -> Result<(), Error> {
        self.cursor.rollback()?;
        self.finished = true;
        Ok(())
    }
}

impl<C: Cursor + ?Sized> Drop for Transaction<'_, C> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.cursor.rollback() {
            warn!("rollback of abandoned transaction failed: {}", e);
        }
    }
}
