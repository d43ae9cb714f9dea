//! Directory domain models
//!
//! `User` and `Group` share the identity fields in [`LdapEntity`]. Identity is
//! the SID or GUID; the name fields are informational only.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Fields every directory principal carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LdapEntity {
    pub sid: Option<String>,
    pub guid: Option<String>,
    pub distinguished_name: Option<String>,
    pub name: Option<String>,
    pub common_name: Option<String>,
}

/// A user account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(flatten)]
    pub entity: LdapEntity,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub username: Option<String>,
    pub uid: Option<String>,
    #[serde(default)]
    pub user_account_control: UserAccountControl,
    /// Groups the user belongs to, directly or through nesting, keyed by SID.
    /// Only populated when ancestors were requested.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub groups: HashMap<String, Group>,
}

/// A group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(flatten)]
    pub entity: LdapEntity,
    /// Transitive members keyed by SID.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub members: HashMap<String, User>,
    /// Groups containing this group, keyed by SID.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub ancestors: HashMap<String, Group>,
}

/// Access to the shared identity fields.
pub trait Principal {
    fn entity(&self) -> &LdapEntity;

    fn sid(&self) -> Option<&str> {
        self.entity().sid.as_deref()
    }

    fn distinguished_name(&self) -> Option<&str> {
        self.entity().distinguished_name.as_deref()
    }
}

impl Principal for User {
    fn entity(&self) -> &LdapEntity {
        &self.entity
    }
}

impl Principal for Group {
    fn entity(&self) -> &LdapEntity {
        &self.entity
    }
}

/// Parsed `userAccountControl` bitfield.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserAccountControl(u32);

impl UserAccountControl {
    pub const SCRIPT: u32 = 0x0000_0001;
    pub const ACCOUNT_DISABLED: u32 = 0x0000_0002;
    pub const HOMEDIR_REQUIRED: u32 = 0x0000_0008;
    pub const LOCKOUT: u32 = 0x0000_0010;
    pub const PASSWD_NOTREQD: u32 = 0x0000_0020;
    pub const PASSWD_CANT_CHANGE: u32 = 0x0000_0040;
    pub const ENCRYPTED_TEXT_PASSWORD_ALLOWED: u32 = 0x0000_0080;
    pub const TEMP_DUPLICATE_ACCOUNT: u32 = 0x0000_0100;
    pub const NORMAL_ACCOUNT: u32 = 0x0000_0200;
    pub const INTERDOMAIN_TRUST_ACCOUNT: u32 = 0x0000_0800;
    pub const WORKSTATION_TRUST_ACCOUNT: u32 = 0x0000_1000;
    pub const SERVER_TRUST_ACCOUNT: u32 = 0x0000_2000;
    pub const DONT_EXPIRE_PASSWORD: u32 = 0x0001_0000;
    pub const MNS_LOGON_ACCOUNT: u32 = 0x0002_0000;
    pub const SMARTCARD_REQUIRED: u32 = 0x0004_0000;
    pub const TRUSTED_FOR_DELEGATION: u32 = 0x0008_0000;
    pub const NOT_DELEGATED: u32 = 0x0010_0000;
    pub const USE_DES_KEY_ONLY: u32 = 0x0020_0000;
    pub const DONT_REQUIRE_PREAUTH: u32 = 0x0040_0000;
    pub const PASSWORD_EXPIRED: u32 = 0x0080_0000;
    pub const TRUSTED_TO_AUTHENTICATE_FOR_DELEGATION: u32 = 0x0100_0000;
    pub const PARTIAL_SECRETS_ACCOUNT: u32 = 0x0400_0000;
    pub const USE_AES_KEYS: u32 = 0x0800_0000;

    const NAMES: &'static [(u32, &'static str)] = &[
        (Self::SCRIPT, "SCRIPT"),
        (Self::ACCOUNT_DISABLED, "ACCOUNT_DISABLED"),
        (Self::HOMEDIR_REQUIRED, "HOMEDIR_REQUIRED"),
        (Self::LOCKOUT, "LOCKOUT"),
        (Self::PASSWD_NOTREQD, "PASSWD_NOTREQD"),
        (Self::PASSWD_CANT_CHANGE, "PASSWD_CANT_CHANGE"),
        (
            Self::ENCRYPTED_TEXT_PASSWORD_ALLOWED,
            "ENCRYPTED_TEXT_PASSWORD_ALLOWED",
        ),
        (Self::TEMP_DUPLICATE_ACCOUNT, "TEMP_DUPLICATE_ACCOUNT"),
        (Self::NORMAL_ACCOUNT, "NORMAL_ACCOUNT"),
        (Self::INTERDOMAIN_TRUST_ACCOUNT, "INTERDOMAIN_TRUST_ACCOUNT"),
        (Self::WORKSTATION_TRUST_ACCOUNT, "WORKSTATION_TRUST_ACCOUNT"),
        (Self::SERVER_TRUST_ACCOUNT, "SERVER_TRUST_ACCOUNT"),
        (Self::DONT_EXPIRE_PASSWORD, "DONT_EXPIRE_PASSWORD"),
        (Self::MNS_LOGON_ACCOUNT, "MNS_LOGON_ACCOUNT"),
        (Self::SMARTCARD_REQUIRED, "SMARTCARD_REQUIRED"),
        (Self::TRUSTED_FOR_DELEGATION, "TRUSTED_FOR_DELEGATION"),
        (Self::NOT_DELEGATED, "NOT_DELEGATED"),
        (Self::USE_DES_KEY_ONLY, "USE_DES_KEY_ONLY"),
        (Self::DONT_REQUIRE_PREAUTH, "DONT_REQUIRE_PREAUTH"),
        (Self::PASSWORD_EXPIRED, "PASSWORD_EXPIRED"),
        (
            Self::TRUSTED_TO_AUTHENTICATE_FOR_DELEGATION,
            "TRUSTED_TO_AUTHENTICATE_FOR_DELEGATION",
        ),
        (Self::PARTIAL_SECRETS_ACCOUNT, "PARTIAL_SECRETS_ACCOUNT"),
        (Self::USE_AES_KEYS, "USE_AES_KEYS"),
    ];

    /// Wrap a raw attribute value. Unknown bits are kept.
    pub fn from_value(value: u32) -> Self {
        Self(value)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    pub fn contains(self, flag: u32) -> bool {
        flag != 0 && self.0 & flag == flag
    }

    pub fn is_disabled(self) -> bool {
        self.contains(Self::ACCOUNT_DISABLED)
    }

    pub fn is_active(self) -> bool {
        !self.is_disabled()
    }

    pub fn is_locked_out(self) -> bool {
        self.contains(Self::LOCKOUT)
    }

    /// Names of the known flags that are set.
    pub fn flag_names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl From<u32> for UserAccountControl {
    fn from(value: u32) -> Self {
        Self::from_value(value)
    }
}

impl From<UserAccountControl> for u32 {
    fn from(uac: UserAccountControl) -> Self {
        uac.0
    }
}
