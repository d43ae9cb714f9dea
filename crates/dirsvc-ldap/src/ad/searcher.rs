//! OS directory-searcher seam
//!
//! Models the request and result shapes of an ADSI-style `DirectorySearcher`
//! so the platform binding can be supplied from outside this crate.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::BitOr;

use dirsvc::error::{DirectoryError, DirectoryResult};

/// ADSI authentication flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AuthenticationTypes(u32);

impl AuthenticationTypes {
    pub const NONE: Self = Self(0);
    pub const SECURE: Self = Self(0x0001);
    pub const SECURE_SOCKETS_LAYER: Self = Self(0x0002);
    pub const READONLY_SERVER: Self = Self(0x0004);
    pub const ANONYMOUS: Self = Self(0x0010);
    pub const FAST_BIND: Self = Self(0x0020);
    pub const SIGNING: Self = Self(0x0040);
    pub const SEALING: Self = Self(0x0080);
    pub const DELEGATION: Self = Self(0x0100);
    pub const SERVER_BIND: Self = Self(0x0200);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for AuthenticationTypes {
    /// Kerberos with integrity and confidentiality, any replica.
    fn default() -> Self {
        Self::SECURE | Self::SEALING | Self::READONLY_SERVER | Self::SIGNING
    }
}

impl BitOr for AuthenticationTypes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchScope {
    Base,
    OneLevel,
    #[default]
    Subtree,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOption {
    pub property_name: String,
    pub direction: SortDirection,
}

/// Offset-targeted virtual list view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryVirtualListView {
    pub before_count: u32,
    pub after_count: u32,
    pub offset: u32,
}

/// One `FindAll` invocation.
#[derive(Clone)]
pub struct DirectorySearch {
    /// ADsPath of the search root, e.g. `LDAP://dc01/OU=Users,DC=example,DC=com`.
    pub root_path: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub authentication: AuthenticationTypes,
    pub filter: String,
    /// Properties to load; empty loads all.
    pub properties: Vec<String>,
    pub scope: SearchScope,
    pub sort: SortOption,
    pub virtual_list_view: DirectoryVirtualListView,
    pub size_limit: Option<u32>,
    pub referral_chasing: bool,
}

impl fmt::Debug for DirectorySearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectorySearch")
            .field("root_path", &self.root_path)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***REDACTED***"))
            .field("authentication", &self.authentication)
            .field("filter", &self.filter)
            .field("properties", &self.properties)
            .field("scope", &self.scope)
            .field("sort", &self.sort)
            .field("virtual_list_view", &self.virtual_list_view)
            .field("size_limit", &self.size_limit)
            .field("referral_chasing", &self.referral_chasing)
            .finish()
    }
}

/// A property value as surfaced by the searcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Text(String),
    Bytes(Vec<u8>),
    Integer(i64),
    Boolean(bool),
}

/// One search result: its ADsPath and loaded properties.
#[derive(Debug, Clone, Default)]
pub struct DirectoryEntryProperties {
    pub path: String,
    pub properties: HashMap<String, Vec<PropertyValue>>,
}

impl DirectoryEntryProperties {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            properties: HashMap::new(),
        }
    }

    /// Add a value using builder pattern.
    pub fn with(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.entry(name.into()).or_default().push(value);
        self
    }
}

/// Enumerates the results of one `FindAll`, one entry at a time.
///
/// An error ends the enumeration; entries returned before it stay valid.
pub trait ResultEnumerator: Send {
    /// Next entry, or `None` once the results are exhausted.
    fn next_entry(&mut self) -> DirectoryResult<Option<DirectoryEntryProperties>>;

    /// The view's `ApproximateTotal`, known once enumeration has started.
    fn approximate_total(&self) -> Option<u64>;
}

/// Results already held in memory.
#[derive(Debug, Default)]
pub struct SearcherResults {
    entries: VecDeque<DirectoryResult<DirectoryEntryProperties>>,
    approximate_total: Option<u64>,
}

impl SearcherResults {
    pub fn new(
        entries: impl IntoIterator<Item = DirectoryEntryProperties>,
        approximate_total: Option<u64>,
    ) -> Self {
        Self {
            entries: entries.into_iter().map(Ok).collect(),
            approximate_total,
        }
    }

    /// End the enumeration with `error` after the entries added so far.
    pub fn then_fail(mut self, error: DirectoryError) -> Self {
        self.entries.push_back(Err(error));
        self
    }

    pub fn remaining(&self) -> usize {
        self.entries.len()
    }
}

impl ResultEnumerator for SearcherResults {
    fn next_entry(&mut self) -> DirectoryResult<Option<DirectoryEntryProperties>> {
        self.entries.pop_front().transpose()
    }

    fn approximate_total(&self) -> Option<u64> {
        self.approximate_total
    }
}

/// Blocking directory searcher, e.g. a binding to ADSI `DirectorySearcher`.
pub trait DirectorySearcher: Send + Sync + 'static {
    /// Start the search. Failing here means nothing was returned.
    fn find_all(&self, search: &DirectorySearch) -> DirectoryResult<Box<dyn ResultEnumerator>>;
}
