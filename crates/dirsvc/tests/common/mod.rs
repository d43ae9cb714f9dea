//! Integration test helpers for dirsvc.
//!
//! Provides an in-memory directory backend that answers searches from canned
//! responses keyed by filter, and builders for raw user and group entries.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Mutex, Once};

use async_trait::async_trait;
use dirsvc::prelude::*;

static INIT: Once = Once::new();

/// Initialize logging for tests (once).
pub fn init_test_logging() {
    INIT.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::fmt()
                .with_test_writer()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .try_init()
                .ok();
        }
    });
}

pub const USERS_BASE: &str = "OU=Users,DC=example,DC=com";
pub const GROUPS_BASE: &str = "OU=Groups,DC=example,DC=com";

/// Settings pointing at a fake server with both default bases set.
pub fn test_settings() -> DirectorySettings {
    DirectorySettings::new("dc01.example.com")
        .with_credentials("CN=svc,DC=example,DC=com", "secret")
        .with_search_bases(USERS_BASE, GROUPS_BASE)
        .with_threads(2)
}

/// Directory answering each filter with a canned list of entries.
#[derive(Default)]
pub struct InMemoryDirectory {
    responses: HashMap<String, Vec<AttributeBag>>,
    failing: Vec<String>,
    requests: Mutex<Vec<SearchRequest>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `filter` with `entries`.
    pub fn respond(mut self, filter: impl Into<String>, entries: Vec<AttributeBag>) -> Self {
        self.responses.insert(filter.into(), entries);
        self
    }

    /// Fail any search for `filter`.
    pub fn fail(mut self, filter: impl Into<String>) -> Self {
        self.failing.push(filter.into());
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_for(&self, filter: &str) -> Option<SearchRequest> {
        self.requests().into_iter().find(|r| r.filter == filter)
    }
}

#[async_trait]
impl DirectoryBackend for InMemoryDirectory {
    fn backend_name(&self) -> &str {
        "in-memory"
    }

    async fn open_search(&self, request: &SearchRequest) -> DirectoryResult<Box<dyn EntryCursor>> {
        self.requests.lock().unwrap().push(request.clone());

        if self.failing.contains(&request.filter) {
            return Err(DirectoryError::connection_failed("directory unreachable"));
        }

        let entries = self
            .responses
            .get(&request.filter)
            .cloned()
            .unwrap_or_default();
        let total = entries.len() as u64;

        // Serve the requested window the way a VLV-capable server would.
        let start = (request.window.offset as usize).saturating_sub(1);
        let len = request.window.after as usize + 1;
        let window: Vec<AttributeBag> = entries.into_iter().skip(start).take(len).collect();

        Ok(Box::new(BufferedCursor::new(
            window,
            SearchSummary {
                total_count: Some(total),
            },
        )))
    }
}

pub fn user_dn(name: &str) -> String {
    format!("CN={name},{USERS_BASE}")
}

pub fn group_dn(name: &str) -> String {
    format!("CN={name},{GROUPS_BASE}")
}

/// A user entry with a binary SID.
pub fn user_entry(name: &str, sid: &str) -> AttributeBag {
    AttributeBag::for_entry(user_dn(name))
        .with("distinguishedName", user_dn(name))
        .with("objectSid", dirsvc::identity::encode_sid(sid))
        .with("name", name)
        .with("cn", name)
        .with("sAMAccountName", name.to_lowercase())
        .with("userAccountControl", "512")
}

/// A group entry with a binary SID.
pub fn group_entry(name: &str, sid: &str) -> AttributeBag {
    AttributeBag::for_entry(group_dn(name))
        .with("distinguishedName", group_dn(name))
        .with("objectSid", dirsvc::identity::encode_sid(sid))
        .with("name", name)
        .with("cn", name)
}

/// `entry` with a binary objectGUID.
pub fn with_guid(entry: AttributeBag, guid: &str) -> AttributeBag {
    let bytes = dirsvc::identity::encode_guid(guid).map(|g| g.to_vec()).unwrap_or_default();
    entry.with("objectGUID", bytes)
}
