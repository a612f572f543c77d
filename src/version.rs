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

//! Server version banner parsing and the capability flags derived from it.

use std::fmt;

use super::error::Error;

/// `[major, minor, patch, build]` as reported by the server banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ServerVersion(pub [u32; 4]);

impl ServerVersion {
    /// Parse a raw banner such as `WI-V3.0.5.33220 Firebird 3.0`.
    ///
    /// The `XX-V` token carries the full four-part number. Old servers report
    /// an InterBase-compatible number there (`WI-V6.3.5.4926 Firebird 1.5`), in
    /// which case the trailing product version wins.
    pub fn parse(banner: &str) -> Result<ServerVersion, Error> {
        let tokens: Vec<&str> = banner.split_whitespace().collect();

        let build_token = tokens
            .iter()
            .find_map(|t| t.split_once("-V").map(|(_, v)| v))
            .and_then(parse_numbers);

        let product = tokens
            .iter()
            .position(|t| t.eq_ignore_ascii_case("firebird"))
            .and_then(|i| tokens.get(i + 1))
            .and_then(|t| parse_numbers(t))
            .or_else(|| tokens.last().and_then(|t| parse_numbers(t)));

        let parts = match (build_token, product) {
            (Some(full), Some(prod)) if full[0] != prod[0] || full[1] != prod[1] => prod,
            (Some(full), _) => full,
            (None, Some(prod)) => prod,
            (None, None) => return Err(Error::InvalidVersion(banner.to_string())),
        };
        Ok(ServerVersion(parts))
    }

    pub fn major(&self) -> u32 {
        self.0[0]
    }

    pub fn minor(&self) -> u32 {
        self.0[1]
    }
}

fn parse_numbers(token: &str) -> Option<[u32; 4]> {
    let mut parts = [0u32; 4];
    let mut count = 0;
    for (i, piece) in token.split('.').enumerate() {
        if i >= 4 {
            break;
        }
        parts[i] = piece.parse().ok()?;
        count += 1;
    }
    if count < 2 { None } else { Some(parts) }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{}.{}.{}.{}", a, b, c, d)
    }
}

/// Feature switches computed once from the server version and handed to
/// every component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCapabilities {
    pub version: ServerVersion,
    /// Native BOOLEAN column type and TRUE/FALSE literals
    pub supports_boolean_type: bool,
    /// `ALTER TABLE t ALTER c {SET|DROP} NOT NULL`
    pub supports_set_null_syntax: bool,
    pub max_identifier_length: usize,
    /// `RETURNING` on INSERT
    pub can_return_id_from_insert: bool,
}

impl EngineCapabilities {
    pub fn new(version: ServerVersion) -> Self {
        let modern = version.major() >= 3;
        Self {
            version,
            supports_boolean_type: modern,
            supports_set_null_syntax: modern,
            max_identifier_length: if modern { 63 } else { 31 },
            can_return_id_from_insert: version.major() >= 2,
        }
    }

    pub fn from_banner(banner: &str) -> Result<Self, Error> {
        Ok(Self::new(ServerVersion::parse(banner)?))
    }
}
