//! Attribute bag to domain model mapping
//!
//! Every recognized attribute is read on its own: an absent attribute leaves
//! the field at its default and a malformed one is recorded as a
//! [`FieldFault`] without affecting the other fields. Mapping always yields an
//! entity.

use thiserror::Error;
use tracing::{debug, warn};

use crate::bag::{AttributeBag, AttributeValue};
use crate::identity::{decode_guid, decode_sid, encode_guid, encode_sid, IdentityError};
use crate::models::{Group, LdapEntity, User, UserAccountControl};

/// Failure to extract a single attribute.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldFault {
    /// `objectSid`/`objectGUID` payload could not be decoded.
    #[error("attribute '{attribute}' holds an invalid identifier: {source}")]
    InvalidIdentifier {
        attribute: &'static str,
        #[source]
        source: IdentityError,
    },

    /// Value is not a 32-bit integer.
    #[error("attribute '{attribute}' is not an integer: '{value}'")]
    NotAnInteger {
        attribute: &'static str,
        value: String,
    },

    /// Binary value where text was expected.
    #[error("attribute '{attribute}' is not valid UTF-8 text")]
    NotText { attribute: &'static str },
}

impl FieldFault {
    /// Attribute the fault belongs to.
    pub fn attribute(&self) -> &'static str {
        match self {
            FieldFault::InvalidIdentifier { attribute, .. }
            | FieldFault::NotAnInteger { attribute, .. }
            | FieldFault::NotText { attribute } => attribute,
        }
    }
}

/// A mapped entity together with the faults met while mapping it.
#[derive(Debug, Clone)]
pub struct Mapped<T> {
    pub entity: T,
    pub faults: Vec<FieldFault>,
}

impl<T> Mapped<T> {
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }

    pub fn into_entity(self) -> T {
        self.entity
    }
}

/// Map a raw entry to a [`User`].
pub fn map_user(bag: &AttributeBag) -> Mapped<User> {
    let mut reader = FieldReader::new(bag);
    let entity = reader.entity();

    let username = reader.text("sAMAccountName");
    let uid = reader.text("uid");
    let user_account_control = reader
        .read("userAccountControl", extract_account_control)
        .unwrap_or_default();

    let user = User {
        entity,
        display_name: reader.text("displayName"),
        email: reader.text("mail"),
        first_name: reader.text("givenName"),
        last_name: reader.text("sn"),
        phone: reader.text("telephoneNumber"),
        // Directories without sAMAccountName use the POSIX uid as login name.
        username: username.or_else(|| uid.clone()),
        uid,
        user_account_control,
        groups: Default::default(),
    };

    reader.finish(user)
}

/// Map a raw entry to a [`Group`].
pub fn map_group(bag: &AttributeBag) -> Mapped<Group> {
    let mut reader = FieldReader::new(bag);
    let group = Group {
        entity: reader.entity(),
        members: Default::default(),
        ancestors: Default::default(),
    };

    reader.finish(group)
}

type Extract<T> = fn(&'static str, &AttributeValue) -> Result<T, FieldFault>;

struct FieldReader<'a> {
    bag: &'a AttributeBag,
    dn: String,
    faults: Vec<FieldFault>,
}

impl<'a> FieldReader<'a> {
    fn new(bag: &'a AttributeBag) -> Self {
        let dn = bag
            .get_text("distinguishedName")
            .or_else(|| bag.dn())
            .unwrap_or("<unknown>")
            .to_string();

        Self {
            bag,
            dn,
            faults: Vec::new(),
        }
    }

    fn entity(&mut self) -> LdapEntity {
        LdapEntity {
            sid: self.read("objectSid", extract_sid),
            guid: self.read("objectGUID", extract_guid),
            distinguished_name: self
                .text("distinguishedName")
                .or_else(|| self.bag.dn().map(str::to_string)),
            name: self.text("name"),
            common_name: self.text("cn"),
        }
    }

    fn text(&mut self, attribute: &'static str) -> Option<String> {
        self.read(attribute, extract_text)
    }

    fn read<T>(&mut self, attribute: &'static str, extract: Extract<T>) -> Option<T> {
        let Some(value) = self.bag.first(attribute) else {
            debug!(dn = %self.dn, attribute, "Attribute not present");
            return None;
        };

        match extract(attribute, value) {
            Ok(parsed) => Some(parsed),
            Err(fault) => {
                warn!(dn = %self.dn, attribute, error = %fault, "Failed to map attribute");
                self.faults.push(fault);
                None
            }
        }
    }

    fn finish<T>(self, entity: T) -> Mapped<T> {
        Mapped {
            entity,
            faults: self.faults,
        }
    }
}

fn extract_text(attribute: &'static str, value: &AttributeValue) -> Result<String, FieldFault> {
    match value {
        AttributeValue::Text(s) => Ok(s.clone()),
        AttributeValue::Binary(b) => {
            String::from_utf8(b.clone()).map_err(|_| FieldFault::NotText { attribute })
        }
    }
}

fn extract_sid(attribute: &'static str, value: &AttributeValue) -> Result<String, FieldFault> {
    // Some backends hand out the string form already.
    if let AttributeValue::Text(s) = value {
        let bytes = encode_sid(s);
        if !bytes.is_empty() {
            return decode_sid(&bytes)
                .map_err(|source| FieldFault::InvalidIdentifier { attribute, source });
        }
    }

    decode_sid(value.as_bytes()).map_err(|source| FieldFault::InvalidIdentifier { attribute, source })
}

fn extract_guid(attribute: &'static str, value: &AttributeValue) -> Result<String, FieldFault> {
    let bytes = value.as_bytes();
    if bytes.len() == crate::identity::GUID_LENGTH {
        return decode_guid(bytes)
            .map_err(|source| FieldFault::InvalidIdentifier { attribute, source });
    }

    let text = value.as_text().ok_or(FieldFault::InvalidIdentifier {
        attribute,
        source: IdentityError::InvalidGuidLength {
            actual: bytes.len(),
        },
    })?;
    let raw = encode_guid(text).map_err(|source| FieldFault::InvalidIdentifier { attribute, source })?;
    decode_guid(&raw).map_err(|source| FieldFault::InvalidIdentifier { attribute, source })
}

fn extract_account_control(
    attribute: &'static str,
    value: &AttributeValue,
) -> Result<UserAccountControl, FieldFault> {
    let text = extract_text(attribute, value)?;
    let trimmed = text.trim();

    // Stored as a signed 32-bit integer; reinterpret negative values as bits.
    let parsed = trimmed
        .parse::<u32>()
        .ok()
        .or_else(|| trimmed.parse::<i32>().ok().map(|v| v as u32));

    parsed
        .map(UserAccountControl::from_value)
        .ok_or(FieldFault::NotAnInteger {
            attribute,
            value: text,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SID_BYTES: [u8; 24] = [
        0x01, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x15, 0x00, 0x00, 0x00, 0xC1, 0xD1, 0x4A,
        0xCF, 0xD5, 0xA6, 0x6B, 0x30, 0xC5, 0x6F, 0x76, 0x3C,
    ];
    const GUID_BYTES: [u8; 16] = [
        0xF5, 0xE2, 0xD0, 0x18, 0xB8, 0xDE, 0x0C, 0x4E, 0xA4, 0x83, 0x13, 0x13, 0xD6, 0x08, 0x63,
        0xFA,
    ];

    fn sample_user_bag() -> AttributeBag {
        AttributeBag::for_entry("CN=John Doe,OU=Users,DC=example,DC=com")
            .with("objectSid", SID_BYTES.to_vec())
            .with("objectGUID", GUID_BYTES.to_vec())
            .with("distinguishedName", "CN=John Doe,OU=Users,DC=example,DC=com")
            .with("name", "John Doe")
            .with("cn", "John Doe")
            .with("displayName", "John Doe")
            .with("givenName", "John")
            .with("sn", "Doe")
            .with("mail", "john.doe@example.com")
            .with("sAMAccountName", "john.doe")
            .with("telephoneNumber", "+1-555-0100")
            .with("userAccountControl", "512")
    }

    #[test]
    fn test_map_user_all_attributes() {
        let mapped = map_user(&sample_user_bag());
        assert!(mapped.is_clean());

        let user = mapped.into_entity();
        assert_eq!(
            user.entity.sid.as_deref(),
            Some("S-1-5-21-3477787073-812361429-1014394821")
        );
        assert_eq!(
            user.entity.guid.as_deref(),
            Some("18d0e2f5-deb8-4e0c-a483-1313d60863fa")
        );
        assert_eq!(user.entity.name.as_deref(), Some("John Doe"));
        assert_eq!(user.entity.common_name.as_deref(), Some("John Doe"));
        assert_eq!(user.first_name.as_deref(), Some("John"));
        assert_eq!(user.last_name.as_deref(), Some("Doe"));
        assert_eq!(user.email.as_deref(), Some("john.doe@example.com"));
        assert_eq!(user.username.as_deref(), Some("john.doe"));
        assert_eq!(user.phone.as_deref(), Some("+1-555-0100"));
        assert!(user.user_account_control.is_active());
        assert!(user.groups.is_empty());
    }

    #[test]
    fn test_map_user_partial_bag() {
        let bag = AttributeBag::new()
            .with("name", "Jane")
            .with("sAMAccountName", "jane");

        let mapped = map_user(&bag);
        assert!(mapped.is_clean());

        let user = mapped.entity;
        assert_eq!(user.entity.name.as_deref(), Some("Jane"));
        assert_eq!(user.username.as_deref(), Some("jane"));
        assert_eq!(
            user,
            User {
                entity: LdapEntity {
                    name: Some("Jane".to_string()),
                    ..Default::default()
                },
                username: Some("jane".to_string()),
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_map_user_empty_bag() {
        let mapped = map_user(&AttributeBag::new());
        assert!(mapped.is_clean());
        assert_eq!(mapped.entity, User::default());
    }

    #[test]
    fn test_map_user_isolates_bad_fields() {
        let bag = sample_user_bag();
        let mut broken = AttributeBag::for_entry("CN=Broken,DC=example,DC=com")
            .with("objectSid", vec![0x01, 0x05, 0x00])
            .with("objectGUID", vec![0xAA; 7])
            .with("userAccountControl", "enabled")
            .with("displayName", vec![0xFF, 0xFE]);
        for name in ["mail", "sAMAccountName", "givenName"] {
            broken.push(name, bag.get_text(name).unwrap());
        }

        let mapped = map_user(&broken);
        let attributes: Vec<&str> = mapped.faults.iter().map(FieldFault::attribute).collect();
        assert_eq!(
            attributes,
            vec!["objectSid", "objectGUID", "userAccountControl", "displayName"]
        );

        let user = mapped.entity;
        assert!(user.entity.sid.is_none());
        assert!(user.entity.guid.is_none());
        assert!(user.display_name.is_none());
        assert_eq!(user.user_account_control, UserAccountControl::default());
        assert_eq!(user.email.as_deref(), Some("john.doe@example.com"));
        assert_eq!(user.username.as_deref(), Some("john.doe"));
        assert_eq!(user.first_name.as_deref(), Some("John"));
        assert_eq!(
            user.entity.distinguished_name.as_deref(),
            Some("CN=Broken,DC=example,DC=com")
        );
    }

    #[test]
    fn test_map_user_textual_identifiers() {
        let bag = AttributeBag::new()
            .with("objectSid", "S-1-5-21-1-2-3-500")
            .with("objectGUID", "18D0E2F5-DEB8-4E0C-A483-1313D60863FA");

        let user = map_user(&bag).entity;
        assert_eq!(user.entity.sid.as_deref(), Some("S-1-5-21-1-2-3-500"));
        assert_eq!(
            user.entity.guid.as_deref(),
            Some("18d0e2f5-deb8-4e0c-a483-1313d60863fa")
        );
    }

    #[test]
    fn test_map_user_uid_fallback() {
        let bag = AttributeBag::new().with("uid", "jdoe");
        let user = map_user(&bag).entity;
        assert_eq!(user.uid.as_deref(), Some("jdoe"));
        assert_eq!(user.username.as_deref(), Some("jdoe"));
    }

    #[test]
    fn test_map_user_negative_account_control() {
        let bag = AttributeBag::new().with("userAccountControl", "-2147483136");
        let user = map_user(&bag).entity;
        assert_eq!(user.user_account_control.value(), 0x8000_0200);
    }

    #[test]
    fn test_map_group() {
        let bag = AttributeBag::for_entry("CN=Admins,OU=Groups,DC=example,DC=com")
            .with("objectSid", SID_BYTES.to_vec())
            .with("name", "Admins")
            .with("cn", "Admins")
            .with("member", "CN=John Doe,OU=Users,DC=example,DC=com");

        let mapped = map_group(&bag);
        assert!(mapped.is_clean());

        let group = mapped.entity;
        assert_eq!(group.entity.name.as_deref(), Some("Admins"));
        assert_eq!(
            group.entity.distinguished_name.as_deref(),
            Some("CN=Admins,OU=Groups,DC=example,DC=com")
        );
        assert!(group.entity.guid.is_none());
        assert!(group.members.is_empty());
        assert!(group.ancestors.is_empty());
    }
}
