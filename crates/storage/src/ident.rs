//! Validated SQL identifiers.
//!
//! Table, schema and column names come from configuration files, so they
//! are checked against a conservative allow-list before being placed in a
//! statement. Values are never formatted into SQL; they are always bound.

use serde::{Deserialize, Serialize};
use std::fmt;

use hydro_common::{HydroError, HydroResult};

/// PostgreSQL truncates identifiers longer than this.
const MAX_IDENT_LEN: usize = 63;

/// A lowercase ASCII identifier safe to use unquoted in SQL.
///
/// Accepts `[a-z_][a-z0-9_]*`, at most 63 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SqlIdent(String);

impl SqlIdent {
    pub fn new(name: impl Into<String>) -> HydroResult<Self> {
        let name = name.into();
        if is_valid(&name) {
            Ok(Self(name))
        } else {
            Err(HydroError::InvalidIdentifier(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_valid(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_IDENT_LEN
        && (first.is_ascii_lowercase() || first == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

impl fmt::Display for SqlIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SqlIdent {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SqlIdent {
    type Error = HydroError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SqlIdent::new(value)
    }
}

impl From<SqlIdent> for String {
    fn from(ident: SqlIdent) -> Self {
        ident.0
    }
}
