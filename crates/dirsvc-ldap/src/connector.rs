//! LDAP backend
//!
//! Implements [`DirectoryBackend`] over `ldap3`. Every search opens its own
//! connection, binds, sends the VLV and sort controls, and streams entries
//! back; the connection is released when the cursor is finished.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::controls::RawControl;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry, SearchOptions, SearchStream};
use tracing::{debug, info, instrument, warn};

use dirsvc::bag::AttributeBag;
use dirsvc::error::{DirectoryError, DirectoryResult};
use dirsvc::paging::{SearchRequest, SearchSummary};
use dirsvc::settings::DirectorySettings;
use dirsvc::traits::{DirectoryBackend, EntryCursor};

use crate::controls;

/// Result codes a search may end with and still count as successful.
const RC_SUCCESS: u32 = 0;
const RC_SIZE_LIMIT_EXCEEDED: u32 = 4;
const RC_REFERRAL: u32 = 10;
const RC_INVALID_CREDENTIALS: u32 = 49;

/// Attributes always delivered as raw bytes.
const BINARY_ATTRIBUTES: &[&str] = &["objectSid", "objectGUID"];

/// Everything a search needs that does not depend on the connection.
#[derive(Debug)]
struct PreparedSearch {
    base: String,
    attributes: Vec<String>,
    size_limit: Option<i32>,
    controls: Vec<RawControl>,
}

/// LDAP backend for Active Directory and other LDAPv3 servers.
pub struct LdapBackend {
    settings: DirectorySettings,
    url: String,
    default_base: String,
}

impl LdapBackend {
    /// Create a backend from validated settings.
    pub fn new(settings: DirectorySettings) -> DirectoryResult<Self> {
        settings.validate()?;

        if settings.kerberos_bind && !cfg!(feature = "gssapi") {
            return Err(DirectoryError::InvalidConfiguration {
                message: "kerberos_bind requires the gssapi feature".to_string(),
            });
        }

        if settings.follow_referrals {
            warn!("Referral chasing is not supported; referrals will be skipped");
        }

        let url = settings.connection_url()?;
        let default_base = base_from_url(&url).unwrap_or_default();

        info!(url = %url, base = %default_base, "LDAP backend configured");

        Ok(Self {
            settings,
            url,
            default_base,
        })
    }

    /// Resolved connection URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Base used when a request carries none.
    pub fn default_base(&self) -> &str {
        &self.default_base
    }

    /// Connection-independent parts of a search: base, attributes and controls.
    fn prepare(&self, request: &SearchRequest) -> DirectoryResult<PreparedSearch> {
        let controls = vec![
            controls::sort_request(&request.sort)?,
            controls::vlv_request(&request.window)?,
        ];

        let attributes = if request.attributes.is_empty() {
            vec!["*".to_string()]
        } else {
            request.attributes.clone()
        };

        Ok(PreparedSearch {
            base: request
                .base
                .clone()
                .unwrap_or_else(|| self.default_base.clone()),
            attributes,
            size_limit: request
                .size_limit
                .map(|limit| i32::try_from(limit).unwrap_or(i32::MAX)),
            controls,
        })
    }

    /// Open a connection and bind it.
    async fn connect(&self) -> DirectoryResult<Ldap> {
        debug!(url = %self.url, "Connecting to LDAP server");

        let conn_settings = LdapConnSettings::new()
            .set_conn_timeout(Duration::from_secs(self.settings.connect_timeout_secs));

        let (conn, mut ldap) = LdapConnAsync::with_settings(conn_settings, &self.url)
            .await
            .map_err(|e| {
                DirectoryError::connection_failed_with_source(
                    format!("Failed to connect to LDAP server at {}", self.url),
                    e,
                )
            })?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        if let Err(e) = self.bind(&mut ldap).await {
            release(&mut ldap).await;
            return Err(e);
        }
        Ok(ldap)
    }

    #[cfg(feature = "gssapi")]
    async fn bind(&self, ldap: &mut Ldap) -> DirectoryResult<()> {
        if self.settings.kerberos_bind {
            let fqdn = self.settings.connection_server.as_deref().unwrap_or_default();
            debug!(server = %fqdn, "Performing GSSAPI bind");

            let result = ldap.sasl_gssapi_bind(fqdn).await.map_err(|e| {
                DirectoryError::connection_failed_with_source("GSSAPI bind failed", e)
            })?;
            return check_bind(result.rc, &result.text);
        }

        self.simple_bind(ldap).await
    }

    #[cfg(not(feature = "gssapi"))]
    async fn bind(&self, ldap: &mut Ldap) -> DirectoryResult<()> {
        self.simple_bind(ldap).await
    }

    async fn simple_bind(&self, ldap: &mut Ldap) -> DirectoryResult<()> {
        let bind_dn = self.settings.bind_distinguished_name.as_deref().unwrap_or("");
        let bind_password = self.settings.bind_password.as_deref().unwrap_or("");

        debug!(bind_dn = %bind_dn, "Performing LDAP bind");

        let result = ldap.simple_bind(bind_dn, bind_password).await.map_err(|e| {
            DirectoryError::connection_failed_with_source(
                format!("LDAP bind failed for {}", bind_dn),
                e,
            )
        })?;

        check_bind(result.rc, &result.text)
    }
}

fn check_bind(rc: u32, text: &str) -> DirectoryResult<()> {
    match rc {
        RC_SUCCESS => Ok(()),
        RC_INVALID_CREDENTIALS => Err(DirectoryError::AuthenticationFailed),
        _ => Err(DirectoryError::connection_failed(format!(
            "LDAP bind failed with code {}: {}",
            rc, text
        ))),
    }
}

/// DN path of an `ldap://host:port/DN` URL, if it has one.
fn base_from_url(url: &str) -> Option<String> {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let (_, path) = rest.split_once('/')?;
    let path = path.split('?').next().unwrap_or_default().trim();
    (!path.is_empty()).then(|| path.to_string())
}

/// Convert a search entry, forcing identifier attributes to bytes.
///
/// The server returns binary values through `bin_attrs` only when they are not
/// valid UTF-8, so an objectGUID can still land in `attrs` as text.
fn entry_to_bag(entry: SearchEntry) -> AttributeBag {
    let mut bag = AttributeBag::for_entry(entry.dn);

    for (name, values) in entry.attrs {
        if BINARY_ATTRIBUTES.iter().any(|b| b.eq_ignore_ascii_case(&name)) {
            bag.extend(name, values.into_iter().map(String::into_bytes));
        } else {
            bag.extend(name, values);
        }
    }

    for (name, values) in entry.bin_attrs {
        bag.extend(name, values);
    }

    bag
}

impl fmt::Debug for LdapBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LdapBackend")
            .field("url", &self.url)
            .field("default_base", &self.default_base)
            .field("settings", &self.settings.redacted())
            .finish()
    }
}

#[async_trait]
impl DirectoryBackend for LdapBackend {
    fn backend_name(&self) -> &str {
        "ldap"
    }

    #[instrument(skip(self, request), fields(filter = %request.filter))]
    async fn open_search(&self, request: &SearchRequest) -> DirectoryResult<Box<dyn EntryCursor>> {
        let prepared = self.prepare(request)?;
        let mut ldap = self.connect().await?;

        debug!(
            base = %prepared.base,
            offset = request.window.offset,
            page_size = request.window.page_size,
            "Sending LDAP search"
        );

        let mut options = SearchOptions::new();
        if let Some(limit) = prepared.size_limit {
            options = options.sizelimit(limit);
        }

        let started = ldap
            .with_search_options(options)
            .with_controls(prepared.controls)
            .streaming_search(
                &prepared.base,
                Scope::Subtree,
                &request.filter,
                prepared.attributes,
            )
            .await;

        match started {
            Ok(stream) => Ok(Box::new(LdapCursor { stream, ldap })),
            Err(e) => {
                release(&mut ldap).await;
                Err(DirectoryError::search_failed_with_source(
                    "Failed to start LDAP search",
                    e,
                ))
            }
        }
    }
}

async fn release(ldap: &mut Ldap) {
    if let Err(e) = ldap.unbind().await {
        warn!(error = %e, "Error during LDAP unbind");
    }
}

/// Cursor over a streaming LDAP search.
pub struct LdapCursor {
    stream: SearchStream<'static, String, Vec<String>>,
    ldap: Ldap,
}

#[async_trait]
impl EntryCursor for LdapCursor {
    async fn next_entry(&mut self) -> DirectoryResult<Option<AttributeBag>> {
        loop {
            let entry = self
                .stream
                .next()
                .await
                .map_err(|e| DirectoryError::search_failed_with_source("LDAP search stream failed", e))?;

            let Some(entry) = entry else {
                return Ok(None);
            };

            if entry.is_ref() {
                debug!("Skipping referral entry");
                continue;
            }
            if entry.is_intermediate() {
                continue;
            }

            return Ok(Some(entry_to_bag(SearchEntry::construct(entry))));
        }
    }

    async fn finish(self: Box<Self>) -> DirectoryResult<SearchSummary> {
        let LdapCursor { mut stream, mut ldap } = *self;
        let result = stream.finish().await;
        release(&mut ldap).await;

        match result.rc {
            RC_SUCCESS | RC_SIZE_LIMIT_EXCEEDED => {}
            RC_REFERRAL => warn!(text = %result.text, "LDAP search ended with a referral"),
            rc => {
                return Err(DirectoryError::search_failed(format!(
                    "LDAP search failed with code {}: {}",
                    rc, result.text
                )));
            }
        }

        Ok(SearchSummary {
            total_count: controls::total_count(&result.ctrls),
        })
    }
}
