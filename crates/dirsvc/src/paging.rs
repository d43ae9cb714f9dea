//! Search requests and virtual-list-view paging
//!
//! Backends translate these into their own control types; the arithmetic
//! lives here so both wire formats agree on what a page is.

use serde::{Deserialize, Serialize};

/// First page number.
pub const PAGE_ONE: u32 = 1;

/// Window size for single-identifier lookups: enough to tell one match from many.
pub const SINGLE_LIMIT: u32 = 2;

/// Page size used by ancestor and member sub-searches unless configured.
pub const AD_LIMIT: u32 = 1000;

/// Attribute the result window is ordered by.
pub const DEFAULT_SORT_ATTRIBUTE: &str = "cn";

/// Attributes requested for user searches.
pub const USER_ATTRIBUTES: &[&str] = &[
    "cn",
    "displayName",
    "distinguishedName",
    "givenName",
    "mail",
    "member",
    "memberOf",
    "name",
    "objectGUID",
    "objectSid",
    "sAMAccountName",
    "sn",
    "telephoneNumber",
    "uid",
    "userAccountControl",
    "userPrincipalName",
];

/// Attributes requested for group searches.
pub const GROUP_ATTRIBUTES: &[&str] = &[
    "cn",
    "distinguishedName",
    "member",
    "memberOf",
    "name",
    "objectGUID",
    "objectSid",
];

/// Virtual-list-view window for a 1-based page.
///
/// `offset` is the 1-based index of the first entry in the window, `before`
/// and `after` the number of entries returned around it. `content_count` is
/// the client's estimate of the list size; zero means unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageWindow {
    pub page: u32,
    pub page_size: u32,
    pub offset: u32,
    pub before: u32,
    pub after: u32,
    pub content_count: u32,
}

impl PageWindow {
    /// Window for `page` of `page_size` entries. Page 0 is read as page 1 and
    /// a page size of 0 as 1.
    pub fn new(page: u32, page_size: u32) -> Self {
        let page = page.max(PAGE_ONE);
        let page_size = page_size.max(1);
        let offset = (page - 1).saturating_mul(page_size).saturating_add(1);

        Self {
            page,
            page_size,
            offset,
            before: 0,
            after: page_size - 1,
            content_count: 0,
        }
    }

    /// Window used to resolve a single identifier.
    pub fn single() -> Self {
        Self::new(PAGE_ONE, SINGLE_LIMIT)
    }
}

/// Server-side sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub attribute: String,
    pub reverse: bool,
}

impl SortKey {
    pub fn ascending(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            reverse: false,
        }
    }

    pub fn descending(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            reverse: true,
        }
    }
}

impl Default for SortKey {
    fn default() -> Self {
        Self::ascending(DEFAULT_SORT_ATTRIBUTE)
    }
}

/// A fully built subtree search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Base DN; `None` searches from the backend's default root.
    pub base: Option<String>,
    pub filter: String,
    pub attributes: Vec<String>,
    pub window: PageWindow,
    pub sort: SortKey,
    /// Hard cap on returned entries, when the backend supports one.
    pub size_limit: Option<u32>,
}

impl SearchRequest {
    /// Create a request with no attribute list and the default sort.
    pub fn new(base: Option<String>, filter: impl Into<String>, window: PageWindow) -> Self {
        Self {
            base: base.filter(|b| !b.trim().is_empty()),
            filter: filter.into(),
            attributes: Vec::new(),
            window,
            sort: SortKey::default(),
            size_limit: None,
        }
    }

    /// Request for user entries.
    pub fn users(base: Option<String>, filter: impl Into<String>, window: PageWindow) -> Self {
        Self::new(base, filter, window).with_attributes(USER_ATTRIBUTES)
    }

    /// Request for group entries.
    pub fn groups(base: Option<String>, filter: impl Into<String>, window: PageWindow) -> Self {
        Self::new(base, filter, window).with_attributes(GROUP_ATTRIBUTES)
    }

    pub fn with_attributes(mut self, attributes: &[&str]) -> Self {
        self.attributes = attributes.iter().map(|a| (*a).to_string()).collect();
        self
    }

    pub fn with_sort(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_size_limit(mut self, limit: u32) -> Self {
        self.size_limit = Some(limit);
        self
    }

    /// Narrow this request to a single-identifier lookup.
    pub fn single(mut self) -> Self {
        self.window = PageWindow::single();
        self.size_limit = Some(SINGLE_LIMIT);
        self
    }
}

/// What a backend reports once a search has been drained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchSummary {
    /// Total size of the result list, when the server returned it.
    pub total_count: Option<u64>,
}

/// One page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
}

impl<T> SearchPage<T> {
    pub fn new(items: Vec<T>, total_count: Option<u64>) -> Self {
        Self { items, total_count }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total_count: None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for SearchPage<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> IntoIterator for SearchPage<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
