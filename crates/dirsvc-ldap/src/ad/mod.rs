//! Active Directory through the OS directory-searcher API.

pub mod backend;
pub mod searcher;

pub use backend::AdsiBackend;
pub use searcher::{
    AuthenticationTypes, DirectoryEntryProperties, DirectorySearch, DirectorySearcher,
    DirectoryVirtualListView, PropertyValue, ResultEnumerator, SearchScope, SearcherResults,
    SortDirection, SortOption,
};
