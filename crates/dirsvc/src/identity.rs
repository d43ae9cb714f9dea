//! Binary identity codec
//!
//! Converts Security Identifiers (SIDs) and object GUIDs between the binary
//! layout stored in the directory and their canonical string forms.
//!
//! ## SID layout
//!
//! | bytes        | field                                      |
//! |--------------|--------------------------------------------|
//! | `0`          | revision                                   |
//! | `1`          | sub-authority count `n`                    |
//! | `2..8`       | identifier authority, 48-bit big-endian    |
//! | `8..8+4n`    | `n` sub-authorities, 32-bit little-endian  |
//!
//! ## GUID layout
//!
//! The first three groups are stored little-endian (`[3,2,1,0]`, `[5,4]`,
//! `[7,6]`), the trailing eight bytes verbatim. This is the mixed-endian
//! layout `uuid` exposes through `from_bytes_le`/`to_bytes_le`.

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use uuid::Uuid;

/// Largest identifier authority a SID can carry (6 bytes).
const MAX_AUTHORITY: u64 = 0xFFFF_FFFF_FFFF;

/// Maximum number of sub-authorities in a SID.
pub const MAX_SUB_AUTHORITIES: usize = 15;

/// Length of a binary GUID.
pub const GUID_LENGTH: usize = 16;

static SID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[sS]-(\d)-(\d{1,13}|0[xX][0-9a-fA-F]{1,12})((?:-\d{1,10})*)$")
        .expect("SID_PATTERN is a valid regex pattern")
});

/// Error raised while decoding or encoding an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// SID buffer shorter than its header claims.
    #[error("SID buffer truncated: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },

    /// GUID buffer is not exactly 16 bytes.
    #[error("GUID must be {GUID_LENGTH} bytes, got {actual}")]
    InvalidGuidLength { actual: usize },

    /// GUID string could not be parsed.
    #[error("invalid GUID string: '{value}'")]
    InvalidGuid { value: String },
}

/// Decode a binary SID into its `S-R-A-S1-S2-...` string form.
///
/// The authority is rendered in decimal when it fits in 32 bits and as
/// `0x` followed by twelve uppercase hex digits otherwise, the same
/// convention Windows uses.
pub fn decode_sid(bytes: &[u8]) -> Result<String, IdentityError> {
    if bytes.len() < 8 {
        return Err(IdentityError::Truncated {
            needed: 8,
            actual: bytes.len(),
        });
    }

    let revision = bytes[0];
    let count = usize::from(bytes[1]);
    let needed = 8 + 4 * count;
    if bytes.len() < needed {
        return Err(IdentityError::Truncated {
            needed,
            actual: bytes.len(),
        });
    }

    let authority = bytes[2..8]
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));

    let mut sid = format!("S-{revision}-");
    if authority <= u64::from(u32::MAX) {
        let _ = write!(sid, "{authority}");
    } else {
        let _ = write!(sid, "0x{authority:012X}");
    }

    for chunk in bytes[8..needed].chunks_exact(4) {
        let mut word = [0u8; 4];
        word.copy_from_slice(chunk);
        let _ = write!(sid, "-{}", u32::from_le_bytes(word));
    }

    Ok(sid)
}

/// Encode a SID string into its binary layout.
///
/// Input that does not match `S-<digit>-<authority>(-<sub>)*`, or whose
/// numbers overflow their fields, yields an empty vector.
pub fn encode_sid(sid: &str) -> Vec<u8> {
    let Some(captures) = SID_PATTERN.captures(sid.trim()) else {
        return Vec::new();
    };

    let Ok(revision) = captures[1].parse::<u8>() else {
        return Vec::new();
    };

    let authority_text = &captures[2];
    let authority = match authority_text
        .strip_prefix("0x")
        .or_else(|| authority_text.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => authority_text.parse::<u64>(),
    };
    let authority = match authority {
        Ok(value) if value <= MAX_AUTHORITY => value,
        _ => return Vec::new(),
    };

    let mut sub_authorities = Vec::new();
    for part in captures[3].split('-').filter(|p| !p.is_empty()) {
        match part.parse::<u32>() {
            Ok(value) => sub_authorities.push(value),
            Err(_) => return Vec::new(),
        }
    }
    if sub_authorities.len() > MAX_SUB_AUTHORITIES {
        return Vec::new();
    }

    // Authority occupies bytes 2..8; the two high bytes are always zero and
    // are overwritten by the revision and count below.
    let mut bytes = authority.to_be_bytes().to_vec();
    for sub in &sub_authorities {
        bytes.extend_from_slice(&sub.to_le_bytes());
    }
    bytes[0] = revision;
    // Bounded by MAX_SUB_AUTHORITIES above.
    bytes[1] = sub_authorities.len() as u8;

    bytes
}

/// Decode a 16-byte binary GUID into lowercase hyphenated form.
pub fn decode_guid(bytes: &[u8]) -> Result<String, IdentityError> {
    let raw: [u8; GUID_LENGTH] = bytes
        .try_into()
        .map_err(|_| IdentityError::InvalidGuidLength {
            actual: bytes.len(),
        })?;

    Ok(Uuid::from_bytes_le(raw).hyphenated().to_string())
}

/// Encode a GUID string into the 16-byte directory layout.
///
/// Accepts the hyphenated, simple and braced forms, in any case.
pub fn encode_guid(guid: &str) -> Result<[u8; GUID_LENGTH], IdentityError> {
    Uuid::parse_str(guid.trim())
        .map(|uuid| uuid.to_bytes_le())
        .map_err(|_| IdentityError::InvalidGuid {
            value: guid.to_string(),
        })
}
