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

//! Error type shared by every layer of the dialect.

use thiserror::Error;

/// `isc_keytoobig`: key size exceeds implementation restriction for index
pub const GDS_KEY_TOO_BIG: u32 = 335544434;

const INTEGRITY_SQLCODES: [i32; 4] = [-803, -625, -530, -297];
const INTEGRITY_GDSCODES: [u32; 5] = [
    335544349, // isc_no_dup
    335544665, // isc_unique_key_violation
    335544466, // isc_foreign_key
    335544558, // isc_check_constraint
    335544347, // isc_not_valid
];

#[derive(Debug, Error)]
pub enum Error {
    /// A lookup, function or aggregate that has no Firebird rendition.
    #[error("not supported by Firebird: {0}")]
    NotSupported(String),

    #[error("integrity error (SQLCODE {sqlcode}, GDSCODE {gdscode}): {message}")]
    Integrity {
        sqlcode: i32,
        gdscode: u32,
        message: String,
    },

    /// Raw engine failure as reported by the driver.
    #[error("database error (SQLCODE {sqlcode}, GDSCODE {gdscode}): {message}")]
    Database {
        sqlcode: i32,
        gdscode: u32,
        message: String,
    },

    #[error("catalog inconsistency: {0}")]
    CatalogInconsistency(String),

    #[error("statement has {placeholders} placeholders but {params} parameters")]
    ParameterMismatch { placeholders: usize, params: usize },

    #[error("cannot parse server version banner {0:?}")]
    InvalidVersion(String),

    #[error("invalid option {name}={value:?}")]
    InvalidOption { name: String, value: String },

    #[error("invalid connection url: {0}")]
    Url(#[from] url::ParseError),

    #[error("value conversion failed: {0}")]
    Conversion(String),
}

/// Coarse classification used by callers that only care about recovery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Translation,
    Integrity,
    SchemaConflict,
    CatalogInconsistency,
    Generic,
}

impl Error {
    pub fn database(sqlcode: i32, gdscode: u32, message: impl Into<String>) -> Self {
        Error::Database {
            sqlcode,
            gdscode,
            message: message.into(),
        }
    }

    pub fn not_supported(what: impl Into<String>) -> Self {
        Error::NotSupported(what.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotSupported(_) => ErrorKind::Translation,
            Error::Integrity { .. } => ErrorKind::Integrity,
            Error::CatalogInconsistency(_) => ErrorKind::CatalogInconsistency,
            Error::Database { .. } if self.is_key_too_big() => ErrorKind::SchemaConflict,
            _ => ErrorKind::Generic,
        }
    }

    /// True for the "key size too big for index" failure that triggers the
    /// hash-expression index fallback.
    pub fn is_key_too_big(&self) -> bool {
        match self {
            Error::Database { gdscode, message, .. } => {
                *gdscode == GDS_KEY_TOO_BIG
                    || message
                        .to_ascii_lowercase()
                        .contains("key size exceeds implementation restriction")
            }
            _ => false,
        }
    }

    /// Re-signal engine errors carrying a known integrity code as `Integrity`.
    pub fn classify(self) -> Self {
        match self {
            Error::Database {
                sqlcode,
                gdscode,
                message,
            } if INTEGRITY_SQLCODES.contains(&sqlcode) || INTEGRITY_GDSCODES.contains(&gdscode) => {
                Error::Integrity {
                    sqlcode,
                    gdscode,
                    message,
                }
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_duplicate_key() {
        let err = Error::database(-803, 335544665, "violation of PRIMARY or UNIQUE KEY").classify();
        assert_eq!(err.kind(), ErrorKind::Integrity);
    }

    #[test]
    fn test_classify_by_gdscode_only() {
        let err = Error::database(-901, 335544466, "violation of FOREIGN KEY constraint").classify();
        assert!(matches!(err, Error::Integrity { gdscode: 335544466, .. }));
    }

    #[test]
    fn test_classify_keeps_generic_errors() {
        let err = Error::database(-204, 335544580, "Table unknown").classify();
        assert_eq!(err.kind(), ErrorKind::Generic);
    }

    #[test]
    fn test_key_too_big_is_schema_conflict() {
        let by_code = Error::database(-607, GDS_KEY_TOO_BIG, "unsuccessful metadata update");
        assert_eq!(by_code.kind(), ErrorKind::SchemaConflict);

        let by_message = Error::database(
            -607,
            335544351,
            "key size exceeds implementation restriction for index \"T_A_B_UNIQ\"",
        );
        assert!(by_message.is_key_too_big());
    }

    #[test]
    fn test_not_supported_is_translation() {
        assert_eq!(Error::not_supported("STDDEV_POP").kind(), ErrorKind::Translation);
    }
}
