//! Directory service façade
//!
//! [`IdentityDirectory`] is the query contract callers program against;
//! [`DirectoryService`] implements it over any [`DirectoryBackend`].

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::error::DirectoryResult;
use crate::filter::LdapFilter;
use crate::mapping::{map_group, map_user};
use crate::models::{Group, Principal, User};
use crate::paging::{PageWindow, SearchPage, SearchRequest, PAGE_ONE};
use crate::search::{self, fan_out};
use crate::settings::DirectorySettings;
use crate::traits::DirectoryBackend;

/// Options for user queries.
#[derive(Debug, Clone, Default)]
pub struct UserSearchOptions {
    /// Base DN for the query itself; defaults to the configured users base.
    pub search_base: Option<String>,
    /// Base DN for ancestor sub-searches; defaults to the configured groups base.
    pub ancestor_search_base: Option<String>,
    /// Fill [`User::groups`].
    pub include_ancestors: bool,
}

impl UserSearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_base(mut self, base: impl Into<String>) -> Self {
        self.search_base = Some(base.into());
        self
    }

    pub fn with_ancestors(mut self, ancestor_search_base: Option<String>) -> Self {
        self.include_ancestors = true;
        self.ancestor_search_base = ancestor_search_base;
        self
    }
}

/// Options for group queries.
#[derive(Debug, Clone, Default)]
pub struct GroupSearchOptions {
    /// Base DN for the query itself; defaults to the configured groups base.
    pub search_base: Option<String>,
    /// Base DN for member sub-searches; defaults to the configured users base.
    pub member_search_base: Option<String>,
    /// Base DN for ancestor sub-searches; defaults to the configured groups base.
    pub ancestor_search_base: Option<String>,
    /// Fill [`Group::members`].
    pub include_members: bool,
    /// Fill [`Group::ancestors`].
    pub include_ancestors: bool,
}

impl GroupSearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_base(mut self, base: impl Into<String>) -> Self {
        self.search_base = Some(base.into());
        self
    }

    pub fn with_members(mut self, member_search_base: Option<String>) -> Self {
        self.include_members = true;
        self.member_search_base = member_search_base;
        self
    }

    pub fn with_ancestors(mut self, ancestor_search_base: Option<String>) -> Self {
        self.include_ancestors = true;
        self.ancestor_search_base = ancestor_search_base;
        self
    }
}

/// Uniform identity query contract.
///
/// Paged queries degrade to fewer (or no) results when the backend fails.
/// Single-identifier lookups return exactly one entity or an error:
/// `NotFound`, `Ambiguous`, or the backend failure itself.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Users matching a raw LDAP filter, one page at a time.
    async fn search_users_by_ldap_query(
        &self,
        query: &str,
        page: u32,
        page_size: u32,
        options: &UserSearchOptions,
    ) -> SearchPage<User>;

    /// Groups matching a raw LDAP filter, one page at a time.
    async fn search_groups_by_ldap_query(
        &self,
        query: &str,
        page: u32,
        page_size: u32,
        options: &GroupSearchOptions,
    ) -> SearchPage<Group>;

    async fn search_user_by_sid(&self, sid: &str, options: &UserSearchOptions)
        -> DirectoryResult<User>;

    async fn search_user_by_guid(
        &self,
        guid: &str,
        options: &UserSearchOptions,
    ) -> DirectoryResult<User>;

    async fn search_group_by_sid(
        &self,
        sid: &str,
        options: &GroupSearchOptions,
    ) -> DirectoryResult<Group>;

    async fn search_group_by_guid(
        &self,
        guid: &str,
        options: &GroupSearchOptions,
    ) -> DirectoryResult<Group>;

    /// Every group that contains `distinguished_name`, directly or nested.
    async fn get_ancestors(
        &self,
        distinguished_name: &str,
        ancestor_search_base: Option<&str>,
    ) -> Vec<Group>;

    /// Every user inside the group `distinguished_name`, directly or nested.
    async fn get_members(
        &self,
        distinguished_name: &str,
        member_search_base: Option<&str>,
    ) -> Vec<User>;
}

/// [`IdentityDirectory`] over a backend.
pub struct DirectoryService<B: DirectoryBackend> {
    backend: Arc<B>,
    settings: Arc<DirectorySettings>,
}

impl<B: DirectoryBackend> Clone for DirectoryService<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<B: DirectoryBackend> std::fmt::Debug for DirectoryService<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryService")
            .field("backend", &self.backend.backend_name())
            .field("settings", &self.settings.redacted())
            .finish()
    }
}

impl<B: DirectoryBackend> DirectoryService<B> {
    /// Create a service; the settings are validated first.
    pub fn new(backend: B, settings: DirectorySettings) -> DirectoryResult<Self> {
        settings.validate()?;
        info!(backend = backend.backend_name(), "Directory service ready");

        Ok(Self {
            backend: Arc::new(backend),
            settings: Arc::new(settings),
        })
    }

    pub fn settings(&self) -> &DirectorySettings {
        &self.settings
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn users_base(&self, base: Option<&str>) -> Option<String> {
        base.map(str::to_string)
            .or_else(|| self.settings.default_users_search_base.clone())
    }

    fn groups_base(&self, base: Option<&str>) -> Option<String> {
        base.map(str::to_string)
            .or_else(|| self.settings.default_groups_search_base.clone())
    }

    fn related_window(&self) -> PageWindow {
        PageWindow::new(PAGE_ONE, self.settings.page_size)
    }

    async fn ancestors(&self, distinguished_name: &str, base: Option<&str>) -> Vec<Group> {
        let sanitized = self.settings.escape_table.sanitize(distinguished_name);
        let request = SearchRequest::groups(
            self.groups_base(base),
            LdapFilter::ancestors_of(&sanitized),
            self.related_window(),
        );
        search::drain(&*self.backend, &request, map_group)
            .await
            .into_items()
    }

    async fn members(&self, distinguished_name: &str, base: Option<&str>) -> Vec<User> {
        let sanitized = self.settings.escape_table.sanitize(distinguished_name);
        let request = SearchRequest::users(
            self.users_base(base),
            LdapFilter::members_of(&sanitized),
            self.related_window(),
        );
        search::drain(&*self.backend, &request, map_user)
            .await
            .into_items()
    }

    async fn enrich_users(&self, users: &mut [User], options: &UserSearchOptions) {
        if !options.include_ancestors || users.is_empty() {
            return;
        }

        debug!(count = users.len(), "Resolving user ancestors");
        let targets = dn_targets(users);
        let base = options.ancestor_search_base.clone();
        let service = self.clone();
        let resolved = fan_out(targets, self.settings.worker_count(), move |dn| {
            let service = service.clone();
            let base = base.clone();
            async move { service.ancestors(&dn, base.as_deref()).await }
        })
        .await;

        for (user, groups) in users.iter_mut().zip(resolved) {
            user.groups = groups;
        }
    }

    async fn enrich_groups(&self, groups: &mut [Group], options: &GroupSearchOptions) {
        if groups.is_empty() {
            return;
        }

        if options.include_members {
            debug!(count = groups.len(), "Resolving group members");
            let base = options.member_search_base.clone();
            let service = self.clone();
            let resolved = fan_out(dn_targets(groups), self.settings.worker_count(), move |dn| {
                let service = service.clone();
                let base = base.clone();
                async move { service.members(&dn, base.as_deref()).await }
            })
            .await;

            for (group, members) in groups.iter_mut().zip(resolved) {
                group.members = members;
            }
        }

        if options.include_ancestors {
            debug!(count = groups.len(), "Resolving group ancestors");
            let base = options.ancestor_search_base.clone();
            let service = self.clone();
            let resolved = fan_out(dn_targets(groups), self.settings.worker_count(), move |dn| {
                let service = service.clone();
                let base = base.clone();
                async move { service.ancestors(&dn, base.as_deref()).await }
            })
            .await;

            for (group, ancestors) in groups.iter_mut().zip(resolved) {
                group.ancestors = ancestors;
            }
        }
    }

    async fn single_user(
        &self,
        filter: String,
        options: &UserSearchOptions,
    ) -> DirectoryResult<User> {
        let request = SearchRequest::users(
            self.users_base(options.search_base.as_deref()),
            filter,
            PageWindow::single(),
        );
        let user = search::resolve_single(&*self.backend, request, map_user).await?;

        let mut users = [user];
        self.enrich_users(&mut users, options).await;
        let [user] = users;
        Ok(user)
    }

    async fn single_group(
        &self,
        filter: String,
        options: &GroupSearchOptions,
    ) -> DirectoryResult<Group> {
        let request = SearchRequest::groups(
            self.groups_base(options.search_base.as_deref()),
            filter,
            PageWindow::single(),
        );
        let group = search::resolve_single(&*self.backend, request, map_group).await?;

        let mut groups = [group];
        self.enrich_groups(&mut groups, options).await;
        let [group] = groups;
        Ok(group)
    }
}

fn dn_targets<P: Principal>(entities: &[P]) -> Vec<Option<String>> {
    entities
        .iter()
        .map(|e| e.distinguished_name().map(str::to_string))
        .collect()
}

#[async_trait]
impl<B: DirectoryBackend> IdentityDirectory for DirectoryService<B> {
    #[instrument(skip(self, options))]
    async fn search_users_by_ldap_query(
        &self,
        query: &str,
        page: u32,
        page_size: u32,
        options: &UserSearchOptions,
    ) -> SearchPage<User> {
        let request = SearchRequest::users(
            self.users_base(options.search_base.as_deref()),
            query,
            PageWindow::new(page, page_size),
        );
        let mut result = search::drain(&*self.backend, &request, map_user)
            .await
            .into_page();

        self.enrich_users(&mut result.items, options).await;
        result
    }

    #[instrument(skip(self, options))]
    async fn search_groups_by_ldap_query(
        &self,
        query: &str,
        page: u32,
        page_size: u32,
        options: &GroupSearchOptions,
    ) -> SearchPage<Group> {
        let request = SearchRequest::groups(
            self.groups_base(options.search_base.as_deref()),
            query,
            PageWindow::new(page, page_size),
        );
        let mut result = search::drain(&*self.backend, &request, map_group)
            .await
            .into_page();

        self.enrich_groups(&mut result.items, options).await;
        result
    }

    #[instrument(skip(self, options))]
    async fn search_user_by_sid(
        &self,
        sid: &str,
        options: &UserSearchOptions,
    ) -> DirectoryResult<User> {
        self.single_user(LdapFilter::by_sid(sid)?, options).await
    }

    #[instrument(skip(self, options))]
    async fn search_user_by_guid(
        &self,
        guid: &str,
        options: &UserSearchOptions,
    ) -> DirectoryResult<User> {
        self.single_user(LdapFilter::by_guid(guid)?, options).await
    }

    #[instrument(skip(self, options))]
    async fn search_group_by_sid(
        &self,
        sid: &str,
        options: &GroupSearchOptions,
    ) -> DirectoryResult<Group> {
        self.single_group(LdapFilter::by_sid(sid)?, options).await
    }

    #[instrument(skip(self, options))]
    async fn search_group_by_guid(
        &self,
        guid: &str,
        options: &GroupSearchOptions,
    ) -> DirectoryResult<Group> {
        self.single_group(LdapFilter::by_guid(guid)?, options).await
    }

    #[instrument(skip(self))]
    async fn get_ancestors(
        &self,
        distinguished_name: &str,
        ancestor_search_base: Option<&str>,
    ) -> Vec<Group> {
        self.ancestors(distinguished_name, ancestor_search_base)
            .await
    }

    #[instrument(skip(self))]
    async fn get_members(
        &self,
        distinguished_name: &str,
        member_search_base: Option<&str>,
    ) -> Vec<User> {
        self.members(distinguished_name, member_search_base).await
    }
}
