//! # Directory Backends
//!
//! LDAP and Active Directory backends for [`dirsvc`].
//!
//! ## Features
//!
//! - LDAPv3 over `ldap3`, plain or `ldaps://`
//! - Virtual-list-view and server-side sort request controls
//! - Total-count hint from the VLV response control
//! - Kerberos (GSSAPI) bind behind the `gssapi` feature
//! - ADSI-style searcher seam for the Windows directory API
//!
//! ## Example
//!
//! ```ignore
//! use dirsvc::prelude::*;
//! use dirsvc_ldap::LdapBackend;
//!
//! let settings = DirectorySettings::new("dc01.example.com")
//!     .with_secure()
//!     .with_credentials("CN=svc,OU=Service,DC=example,DC=com", "secret")
//!     .with_search_bases("OU=Users,DC=example,DC=com", "OU=Groups,DC=example,DC=com");
//!
//! let service = DirectoryService::new(LdapBackend::new(settings.clone())?, settings)?;
//! let page = service
//!     .search_users_by_ldap_query("(sn=Smith)", 1, 50, &UserSearchOptions::new())
//!     .await;
//! ```

pub mod ad;
pub mod connector;
pub mod controls;

// Re-exports
pub use ad::{AdsiBackend, DirectorySearcher};
pub use connector::LdapBackend;
