//! LDAP filter construction
//!
//! Octet-string literals for binary identifiers, the fixed filter templates
//! used by the directory service, and the configurable DN escape table.

use std::fmt::Write as _;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{DirectoryError, DirectoryResult};
use crate::identity::{encode_guid, encode_sid};

/// `LDAP_MATCHING_RULE_IN_CHAIN`: transitive evaluation of a DN-valued attribute.
pub const MATCHING_RULE_IN_CHAIN: &str = "1.2.840.113556.1.4.1941";

/// Render bytes as an LDAP filter octet string (`\HH` per byte, uppercase).
pub fn octet_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for byte in bytes {
        let _ = write!(out, "\\{byte:02X}");
    }
    out
}

/// Filter templates.
pub struct LdapFilter;

impl LdapFilter {
    /// `(objectSid=<octet>)` for a SID string.
    ///
    /// Fails when the SID does not encode; an empty octet string would turn the
    /// lookup into a presence test against every entry.
    pub fn by_sid(sid: &str) -> DirectoryResult<String> {
        let bytes = encode_sid(sid);
        if bytes.is_empty() {
            return Err(DirectoryError::InvalidIdentifier {
                message: format!("'{sid}' is not a valid SID"),
            });
        }
        Ok(format!("(objectSid={})", octet_string(&bytes)))
    }

    /// `(objectGUID=<octet>)` for a GUID string.
    pub fn by_guid(guid: &str) -> DirectoryResult<String> {
        let bytes = encode_guid(guid)?;
        Ok(format!("(objectGUID={})", octet_string(&bytes)))
    }

    /// Groups whose `member` chain reaches `sanitized_dn`, i.e. every group the
    /// entry belongs to directly or through nesting.
    pub fn ancestors_of(sanitized_dn: &str) -> String {
        format!("(member:{MATCHING_RULE_IN_CHAIN}:={sanitized_dn})")
    }

    /// Entries whose `memberOf` chain reaches the group `sanitized_dn`.
    pub fn members_of(sanitized_dn: &str) -> String {
        format!("(memberOf:{MATCHING_RULE_IN_CHAIN}:={sanitized_dn})")
    }
}

/// Ordered substring replacements applied to DNs before filter interpolation.
///
/// Configured as `find:replace` pairs joined by `|` and parsed once when the
/// settings are loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EscapeTable {
    pairs: Vec<(String, String)>,
}

impl EscapeTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a replacement.
    pub fn with_pair(mut self, find: impl Into<String>, replace: impl Into<String>) -> Self {
        self.pairs.push((find.into(), replace.into()));
        self
    }

    /// Replacement pairs in application order.
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Apply every replacement in order, then trim surrounding whitespace.
    pub fn sanitize(&self, dn: &str) -> String {
        let mut sanitized = dn.to_string();
        for (find, replace) in &self.pairs {
            sanitized = sanitized.replace(find.as_str(), replace);
        }
        sanitized.trim().to_string()
    }
}

impl FromStr for EscapeTable {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut pairs = Vec::new();
        for entry in s.split('|').filter(|e| !e.is_empty()) {
            let parts: Vec<&str> = entry.split(':').collect();
            match parts.as_slice() {
                [find, replace] if !find.is_empty() => {
                    pairs.push(((*find).to_string(), (*replace).to_string()));
                }
                _ => warn!(entry = %entry, "Ignoring malformed DN escape pair"),
            }
        }
        Ok(Self { pairs })
    }
}

impl TryFrom<String> for EscapeTable {
    type Error = DirectoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EscapeTable> for String {
    fn from(table: EscapeTable) -> Self {
        table
            .pairs
            .iter()
            .map(|(find, replace)| format!("{find}:{replace}"))
            .collect::<Vec<_>>()
            .join("|")
    }
}
