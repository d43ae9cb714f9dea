//! ADSI backend
//!
//! Drives a blocking [`DirectorySearcher`] from the async runtime. Entries are
//! enumerated on a blocking thread and handed to the cursor over a bounded
//! channel, so a failure mid-enumeration keeps the entries already read.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, instrument};

use dirsvc::bag::AttributeBag;
use dirsvc::error::{DirectoryError, DirectoryResult};
use dirsvc::paging::{SearchRequest, SearchSummary};
use dirsvc::settings::DirectorySettings;
use dirsvc::traits::{DirectoryBackend, EntryCursor};

use super::searcher::{
    AuthenticationTypes, DirectoryEntryProperties, DirectorySearch, DirectorySearcher,
    DirectoryVirtualListView, PropertyValue, ResultEnumerator, SearchScope, SortDirection,
    SortOption,
};

const ADS_PREFIX: &str = "LDAP://";

/// Entries buffered between the enumerating thread and the cursor.
const CHANNEL_CAPACITY: usize = 64;

/// Backend over an OS directory searcher.
pub struct AdsiBackend<S> {
    searcher: Arc<S>,
    settings: DirectorySettings,
    authentication: AuthenticationTypes,
}

impl<S: DirectorySearcher> AdsiBackend<S> {
    pub fn new(searcher: S, settings: DirectorySettings) -> DirectoryResult<Self> {
        settings.validate()?;
        Ok(Self {
            searcher: Arc::new(searcher),
            settings,
            authentication: AuthenticationTypes::default(),
        })
    }

    pub fn with_authentication(mut self, authentication: AuthenticationTypes) -> Self {
        self.authentication = authentication;
        self
    }

    pub fn authentication(&self) -> AuthenticationTypes {
        self.authentication
    }

    pub fn searcher(&self) -> &S {
        &self.searcher
    }

    /// ADsPath for a search rooted at `base`.
    pub fn root_path(&self, base: Option<&str>) -> DirectoryResult<String> {
        let server = self
            .settings
            .connection_server
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match (base, server) {
            (Some(base), Some(server)) => Ok(format!("{ADS_PREFIX}{server}/{base}")),
            (Some(base), None) => Ok(format!("{ADS_PREFIX}{base}")),
            (None, _) => {
                if let Some(url) = non_empty(&self.settings.connection_override) {
                    return Ok(url.to_string());
                }
                if let Some(server) = server {
                    return Ok(format!("{ADS_PREFIX}{server}"));
                }
                non_empty(&self.settings.connection_fallback)
                    .map(str::to_string)
                    .ok_or_else(|| DirectoryError::InvalidConfiguration {
                        message: "no search base, server or fallback path configured".to_string(),
                    })
            }
        }
    }

    fn build_search(&self, request: &SearchRequest) -> DirectoryResult<DirectorySearch> {
        Ok(DirectorySearch {
            root_path: self.root_path(request.base.as_deref())?,
            username: self.settings.bind_distinguished_name.clone(),
            password: self.settings.bind_password.clone(),
            authentication: self.authentication,
            filter: request.filter.clone(),
            properties: request.attributes.clone(),
            scope: SearchScope::Subtree,
            sort: SortOption {
                property_name: request.sort.attribute.clone(),
                direction: if request.sort.reverse {
                    SortDirection::Descending
                } else {
                    SortDirection::Ascending
                },
            },
            virtual_list_view: DirectoryVirtualListView {
                before_count: request.window.before,
                after_count: request.window.after,
                offset: request.window.offset,
            },
            size_limit: request.size_limit,
            referral_chasing: self.settings.follow_referrals,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// DN part of an ADsPath, with `\/` escapes undone.
fn path_to_dn(path: &str) -> &str {
    let rest = path.strip_prefix(ADS_PREFIX).unwrap_or(path);
    match rest.split_once('/') {
        Some((server, dn)) if !server.contains('=') => dn,
        _ => rest,
    }
}

fn entry_to_bag(entry: DirectoryEntryProperties) -> AttributeBag {
    let mut bag = AttributeBag::for_entry(path_to_dn(&entry.path).replace("\\/", "/"));

    for (name, values) in entry.properties {
        for value in values {
            match value {
                PropertyValue::Text(s) => bag.push(name.as_str(), s),
                PropertyValue::Bytes(b) => bag.push(name.as_str(), b),
                PropertyValue::Integer(i) => bag.push(name.as_str(), i.to_string()),
                PropertyValue::Boolean(b) => {
                    bag.push(name.as_str(), if b { "TRUE" } else { "FALSE" })
                }
            }
        }
    }

    bag
}

impl<S> fmt::Debug for AdsiBackend<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdsiBackend")
            .field("settings", &self.settings.redacted())
            .field("authentication", &self.authentication)
            .finish_non_exhaustive()
    }
}

enum Fetched {
    Entry(AttributeBag),
    Failed {
        error: DirectoryError,
        total: Option<u64>,
    },
    Done(Option<u64>),
}

/// Enumerate `results` into `tx` until exhausted, failed, or the cursor is gone.
fn pump(mut results: Box<dyn ResultEnumerator>, tx: mpsc::Sender<Fetched>) {
    let mut sent = 0usize;
    loop {
        let (message, last) = match results.next_entry() {
            Ok(Some(entry)) => (Fetched::Entry(entry_to_bag(entry)), false),
            Ok(None) => (Fetched::Done(results.approximate_total()), true),
            Err(error) => (
                Fetched::Failed {
                    error,
                    total: results.approximate_total(),
                },
                true,
            ),
        };

        if tx.blocking_send(message).is_err() {
            debug!(sent, "Cursor closed before enumeration ended");
            return;
        }
        if last {
            debug!(sent, "Directory search enumerated");
            return;
        }
        sent += 1;
    }
}

/// Cursor fed by [`pump`].
struct AdsiCursor {
    rx: mpsc::Receiver<Fetched>,
    total: Option<u64>,
    ended: bool,
}

#[async_trait]
impl EntryCursor for AdsiCursor {
    async fn next_entry(&mut self) -> DirectoryResult<Option<AttributeBag>> {
        if self.ended {
            return Ok(None);
        }

        match self.rx.recv().await {
            Some(Fetched::Entry(bag)) => Ok(Some(bag)),
            Some(Fetched::Done(total)) => {
                self.ended = true;
                self.total = total;
                Ok(None)
            }
            Some(Fetched::Failed { error, total }) => {
                self.ended = true;
                self.total = total;
                Err(error)
            }
            None => {
                self.ended = true;
                Err(DirectoryError::internal(
                    "Directory search enumeration stopped without a result",
                ))
            }
        }
    }

    /// Dropping the receiver stops an enumeration still in progress.
    async fn finish(self: Box<Self>) -> DirectoryResult<SearchSummary> {
        Ok(SearchSummary {
            total_count: self.total,
        })
    }
}

#[async_trait]
impl<S: DirectorySearcher> DirectoryBackend for AdsiBackend<S> {
    fn backend_name(&self) -> &str {
        "adsi"
    }

    #[instrument(skip(self, request), fields(filter = %request.filter))]
    async fn open_search(&self, request: &SearchRequest) -> DirectoryResult<Box<dyn EntryCursor>> {
        let search = self.build_search(request)?;
        debug!(
            root = %search.root_path,
            offset = search.virtual_list_view.offset,
            "Running directory search"
        );

        let searcher = Arc::clone(&self.searcher);
        let results = tokio::task::spawn_blocking(move || searcher.find_all(&search))
            .await
            .map_err(|e| DirectoryError::internal_with_source("Directory search task failed", e))??;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::task::spawn_blocking(move || pump(results, tx));

        Ok(Box::new(AdsiCursor {
            rx,
            total: None,
            ended: false,
        }))
    }
}
