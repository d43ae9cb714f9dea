//! Directory service settings
//!
//! Deserialized from the host application's configuration (camelCase keys).
//! The DN escape table is parsed once here rather than on every lookup.

use serde::{Deserialize, Serialize};

use crate::error::{DirectoryError, DirectoryResult};
use crate::filter::EscapeTable;
use crate::paging::AD_LIMIT;

const REDACTED: &str = "***REDACTED***";

/// Port used for plain LDAP when none is configured.
pub const DEFAULT_PORT: u16 = 389;

/// Port used for LDAPS when none is configured.
pub const DEFAULT_SECURE_PORT: u16 = 636;

/// Settings shared by every backend.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectorySettings {
    /// Bind DN (or UPN) for simple bind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_distinguished_name: Option<String>,

    /// Bind password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    /// Search base for user queries that do not name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_users_search_base: Option<String>,

    /// Search base for group queries that do not name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_groups_search_base: Option<String>,

    /// Replacements applied to DNs before they are put into a filter,
    /// written as `find:replace` pairs joined by `|`.
    #[serde(
        default = "default_escape_table",
        rename = "distinguishedNameEscapeCharacters"
    )]
    pub escape_table: EscapeTable,

    /// Directory server host name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_server: Option<String>,

    /// Directory server port; defaults to 389, or 636 when `secure`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_port: Option<u16>,

    /// Full connection URL that takes precedence over server and port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_override: Option<String>,

    /// Connection URL used when nothing else resolves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_fallback: Option<String>,

    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Page size for ancestor and member sub-searches.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Chase referrals returned by the server.
    #[serde(default)]
    pub follow_referrals: bool,

    /// Use LDAPS.
    #[serde(default)]
    pub secure: bool,

    /// Bind with Kerberos instead of a password.
    #[serde(default)]
    pub kerberos_bind: bool,

    /// Maximum concurrent enrichment sub-searches.
    #[serde(default = "default_threads")]
    pub threads: usize,
}

impl std::fmt::Debug for DirectorySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectorySettings")
            .field("bind_distinguished_name", &self.bind_distinguished_name)
            .field("bind_password", &self.bind_password.as_ref().map(|_| REDACTED))
            .field("default_users_search_base", &self.default_users_search_base)
            .field(
                "default_groups_search_base",
                &self.default_groups_search_base,
            )
            .field("escape_table", &self.escape_table)
            .field("connection_server", &self.connection_server)
            .field("connection_port", &self.connection_port)
            .field("connection_override", &self.connection_override)
            .field("connection_fallback", &self.connection_fallback)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("page_size", &self.page_size)
            .field("follow_referrals", &self.follow_referrals)
            .field("secure", &self.secure)
            .field("kerberos_bind", &self.kerberos_bind)
            .field("threads", &self.threads)
            .finish()
    }
}

fn default_escape_table() -> EscapeTable {
    EscapeTable::new()
        .with_pair("\\", "\\5C")
        .with_pair("*", "\\2A")
        .with_pair("(", "\\28")
        .with_pair(")", "\\29")
        .with_pair("\0", "\\00")
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> u32 {
    AD_LIMIT
}

fn default_threads() -> usize {
    4
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            bind_distinguished_name: None,
            bind_password: None,
            default_users_search_base: None,
            default_groups_search_base: None,
            escape_table: default_escape_table(),
            connection_server: None,
            connection_port: None,
            connection_override: None,
            connection_fallback: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            page_size: default_page_size(),
            follow_referrals: false,
            secure: false,
            kerberos_bind: false,
            threads: default_threads(),
        }
    }
}

impl DirectorySettings {
    /// Settings pointing at `server`.
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            connection_server: Some(server.into()),
            ..Self::default()
        }
    }

    /// Set bind credentials.
    pub fn with_credentials(
        mut self,
        bind_dn: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.bind_distinguished_name = Some(bind_dn.into());
        self.bind_password = Some(password.into());
        self
    }

    /// Set the default search bases.
    pub fn with_search_bases(
        mut self,
        users: impl Into<String>,
        groups: impl Into<String>,
    ) -> Self {
        self.default_users_search_base = Some(users.into());
        self.default_groups_search_base = Some(groups.into());
        self
    }

    /// Enable LDAPS.
    #[must_use]
    pub fn with_secure(mut self) -> Self {
        self.secure = true;
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.connection_port = Some(port);
        self
    }

    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    #[must_use]
    pub fn with_escape_table(mut self, table: EscapeTable) -> Self {
        self.escape_table = table;
        self
    }

    pub fn with_fallback(mut self, url: impl Into<String>) -> Self {
        self.connection_fallback = Some(url.into());
        self
    }

    pub fn with_override(mut self, url: impl Into<String>) -> Self {
        self.connection_override = Some(url.into());
        self
    }

    /// Resolve the LDAP URL: override, then server and port, then fallback.
    pub fn connection_url(&self) -> DirectoryResult<String> {
        if let Some(url) = non_empty(&self.connection_override) {
            return Ok(url.to_string());
        }

        if let Some(server) = non_empty(&self.connection_server) {
            let scheme = if self.secure { "ldaps" } else { "ldap" };
            return Ok(format!("{scheme}://{server}:{}", self.port()));
        }

        non_empty(&self.connection_fallback)
            .map(str::to_string)
            .ok_or_else(|| DirectoryError::InvalidConfiguration {
                message: "no connection override, server or fallback configured".to_string(),
            })
    }

    /// Configured port, or the default for the chosen transport.
    pub fn port(&self) -> u16 {
        self.connection_port.unwrap_or(if self.secure {
            DEFAULT_SECURE_PORT
        } else {
            DEFAULT_PORT
        })
    }

    /// Enrichment concurrency, never below one.
    pub fn worker_count(&self) -> usize {
        self.threads.max(1)
    }

    /// Check the settings before a backend is built from them.
    pub fn validate(&self) -> DirectoryResult<()> {
        self.connection_url()?;

        if self.connection_port == Some(0) {
            return Err(DirectoryError::InvalidConfiguration {
                message: "connection_port must be non-zero".to_string(),
            });
        }

        if self.page_size == 0 {
            return Err(DirectoryError::InvalidConfiguration {
                message: "page_size must be at least 1".to_string(),
            });
        }

        if self.threads == 0 {
            return Err(DirectoryError::InvalidConfiguration {
                message: "threads must be at least 1".to_string(),
            });
        }

        if self.bind_password.is_some() && non_empty(&self.bind_distinguished_name).is_none() {
            return Err(DirectoryError::InvalidConfiguration {
                message: "bind_password is set without bind_distinguished_name".to_string(),
            });
        }

        Ok(())
    }

    /// Copy with secrets masked, for logging.
    pub fn redacted(&self) -> Self {
        let mut settings = self.clone();
        if settings.bind_password.is_some() {
            settings.bind_password = Some(REDACTED.to_string());
        }
        settings
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
