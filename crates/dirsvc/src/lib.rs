//! # Directory Service Core
//!
//! Backend-neutral identity queries over Active Directory and LDAP
//! directories.
//!
//! ## Features
//!
//! - SID and objectGUID binary codec
//! - Filter templates with octet-string identifiers and DN escaping
//! - Virtual-list-view paging sorted on `cn`
//! - Fault-isolating attribute mapping into `User` and `Group`
//! - Bounded-concurrency ancestor and member resolution
//!
//! Backends implement [`traits::DirectoryBackend`]; the `dirsvc-ldap` crate
//! provides the LDAP and ADSI ones.
//!
//! ## Example
//!
//! ```ignore
//! use dirsvc::prelude::*;
//! use dirsvc_ldap::LdapBackend;
//!
//! let settings = DirectorySettings::new("dc01.example.com")
//!     .with_credentials("CN=svc,OU=Service,DC=example,DC=com", "secret")
//!     .with_search_bases("OU=Users,DC=example,DC=com", "OU=Groups,DC=example,DC=com");
//!
//! let service = DirectoryService::new(LdapBackend::new(settings.clone())?, settings)?;
//! let admins = service
//!     .search_group_by_sid("S-1-5-32-544", &GroupSearchOptions::new().with_members(None))
//!     .await?;
//! ```

pub mod bag;
pub mod error;
pub mod filter;
pub mod identity;
pub mod mapping;
pub mod models;
pub mod paging;
pub mod search;
pub mod service;
pub mod settings;
pub mod traits;

/// Prelude module for convenient imports.
///
/// ```
/// use dirsvc::prelude::*;
/// ```
pub mod prelude {
    // Error handling
    pub use crate::error::{DirectoryError, DirectoryResult};

    // Models
    pub use crate::models::{Group, LdapEntity, Principal, User, UserAccountControl};

    // Raw entries and mapping
    pub use crate::bag::{AttributeBag, AttributeValue};
    pub use crate::mapping::{map_group, map_user, FieldFault, Mapped};

    // Queries
    pub use crate::filter::{octet_string, EscapeTable, LdapFilter};
    pub use crate::paging::{PageWindow, SearchPage, SearchRequest, SearchSummary, SortKey};

    // Backends and service
    pub use crate::service::{
        DirectoryService, GroupSearchOptions, IdentityDirectory, UserSearchOptions,
    };
    pub use crate::settings::DirectorySettings;
    pub use crate::traits::{BufferedCursor, DirectoryBackend, EntryCursor};
}
