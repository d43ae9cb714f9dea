//! Integration test helpers for dirsvc-ldap.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Mutex, Once};

use dirsvc::error::{DirectoryError, DirectoryResult};
use dirsvc::identity::{encode_guid, encode_sid};
use dirsvc_ldap::ad::{
    DirectoryEntryProperties, DirectorySearch, DirectorySearcher, PropertyValue, ResultEnumerator,
    SearcherResults,
};

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

pub const SERVER: &str = "dc01.example.com";
pub const USERS_BASE: &str = "OU=Users,DC=example,DC=com";
pub const GROUPS_BASE: &str = "OU=Groups,DC=example,DC=com";

/// Searcher answering each filter with canned entries, windowed like a VLV.
#[derive(Default)]
pub struct FakeSearcher {
    responses: HashMap<String, Vec<DirectoryEntryProperties>>,
    unreachable: Vec<String>,
    fail_after: HashMap<String, usize>,
    searches: Mutex<Vec<DirectorySearch>>,
}

impl FakeSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(
        mut self,
        filter: impl Into<String>,
        entries: Vec<DirectoryEntryProperties>,
    ) -> Self {
        self.responses.insert(filter.into(), entries);
        self
    }

    pub fn unreachable(mut self, filter: impl Into<String>) -> Self {
        self.unreachable.push(filter.into());
        self
    }

    /// Drop the connection after `count` entries of the window for `filter`.
    pub fn fail_after(mut self, filter: impl Into<String>, count: usize) -> Self {
        self.fail_after.insert(filter.into(), count);
        self
    }

    pub fn searches(&self) -> Vec<DirectorySearch> {
        self.searches.lock().unwrap().clone()
    }
}

impl DirectorySearcher for FakeSearcher {
    fn find_all(&self, search: &DirectorySearch) -> DirectoryResult<Box<dyn ResultEnumerator>> {
        self.searches.lock().unwrap().push(search.clone());

        if self.unreachable.contains(&search.filter) {
            return Err(DirectoryError::connection_failed("The server is not operational."));
        }

        let entries = self.responses.get(&search.filter).cloned().unwrap_or_default();
        let total = entries.len() as u64;
        let view = search.virtual_list_view;
        let window = entries
            .into_iter()
            .skip((view.offset as usize).saturating_sub(1))
            .take(view.after_count as usize + 1);

        let results = match self.fail_after.get(&search.filter) {
            Some(&count) => SearcherResults::new(window.take(count), Some(total))
                .then_fail(DirectoryError::connection_failed("The server is not operational.")),
            None => SearcherResults::new(window, Some(total)),
        };
        Ok(Box::new(results))
    }
}

pub fn ads_path(dn: &str) -> String {
    format!("LDAP://{SERVER}/{dn}")
}

pub fn user_dn(name: &str) -> String {
    format!("CN={name},{USERS_BASE}")
}

pub fn group_dn(name: &str) -> String {
    format!("CN={name},{GROUPS_BASE}")
}

/// A user as ADSI returns it: binary identifiers, integer flags.
pub fn user_properties(name: &str, sid: &str, guid: &str) -> DirectoryEntryProperties {
    DirectoryEntryProperties::new(ads_path(&user_dn(name)))
        .with("distinguishedName", PropertyValue::Text(user_dn(name)))
        .with("objectSid", PropertyValue::Bytes(encode_sid(sid)))
        .with(
            "objectGUID",
            PropertyValue::Bytes(encode_guid(guid).map(|g| g.to_vec()).unwrap_or_default()),
        )
        .with("name", PropertyValue::Text(name.to_string()))
        .with("cn", PropertyValue::Text(name.to_string()))
        .with("sAMAccountName", PropertyValue::Text(name.to_lowercase()))
        .with("mail", PropertyValue::Text(format!("{}@example.com", name.to_lowercase())))
        .with("userAccountControl", PropertyValue::Integer(512))
}

pub fn group_properties(name: &str, sid: &str) -> DirectoryEntryProperties {
    DirectoryEntryProperties::new(ads_path(&group_dn(name)))
        .with("distinguishedName", PropertyValue::Text(group_dn(name)))
        .with("objectSid", PropertyValue::Bytes(encode_sid(sid)))
        .with("name", PropertyValue::Text(name.to_string()))
        .with("cn", PropertyValue::Text(name.to_string()))
}
