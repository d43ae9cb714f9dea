//! Search orchestration
//!
//! Drives one search from request to closed cursor, mapping entries as they
//! stream in, and runs the bounded enrichment fan-out.
//!
//! A search moves through `built -> sent -> draining -> closed`. A failure
//! while sending is reported with no entries; a failure while draining keeps
//! every entry mapped so far.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, instrument, warn};

use crate::bag::AttributeBag;
use crate::error::{DirectoryError, DirectoryResult};
use crate::mapping::Mapped;
use crate::models::Principal;
use crate::paging::{SearchPage, SearchRequest};
use crate::traits::DirectoryBackend;

/// Maps one raw entry to a domain entity.
pub type MapFn<T> = fn(&AttributeBag) -> Mapped<T>;

/// Outcome of draining a search.
#[derive(Debug)]
pub struct Drained<T> {
    /// Entities mapped before the search ended.
    pub items: Vec<T>,
    /// Total-count hint from the response controls.
    pub total_count: Option<u64>,
    /// Backend failure that ended the search early, if any.
    pub error: Option<DirectoryError>,
}

impl<T> Drained<T> {
    fn failed(error: DirectoryError) -> Self {
        Self {
            items: Vec::new(),
            total_count: None,
            error: Some(error),
        }
    }

    /// Degrade to a page, logging any backend failure.
    pub fn into_page(self) -> SearchPage<T> {
        if let Some(err) = &self.error {
            warn!(
                error = %err,
                returned = self.items.len(),
                "Directory search failed, returning partial results"
            );
        }
        SearchPage::new(self.items, self.total_count)
    }

    /// Entities only, logging any backend failure.
    pub fn into_items(self) -> Vec<T> {
        self.into_page().items
    }
}

/// Run `request` and map every returned entry with `map`.
#[instrument(skip(backend, request, map), fields(backend = backend.backend_name(), filter = %request.filter))]
pub async fn drain<B, T>(backend: &B, request: &SearchRequest, map: MapFn<T>) -> Drained<T>
where
    B: DirectoryBackend + ?Sized,
{
    let mut cursor = match backend.open_search(request).await {
        Ok(cursor) => cursor,
        Err(err) => return Drained::failed(err),
    };

    let mut items = Vec::new();
    let mut failure = None;

    loop {
        match cursor.next_entry().await {
            Ok(Some(bag)) => {
                let mapped = map(&bag);
                if !mapped.is_clean() {
                    debug!(
                        dn = bag.dn().unwrap_or_default(),
                        faults = mapped.faults.len(),
                        "Entry mapped with faults"
                    );
                }
                items.push(mapped.into_entity());
            }
            Ok(None) => break,
            Err(err) => {
                failure = Some(err);
                break;
            }
        }
    }

    // Always close, even after a failure, so the connection is released.
    let total_count = match cursor.finish().await {
        Ok(summary) => summary.total_count,
        Err(err) => {
            if failure.is_none() {
                failure = Some(err);
            } else {
                debug!(error = %err, "Error closing search after earlier failure");
            }
            None
        }
    };

    debug!(returned = items.len(), total_count = ?total_count, "Search drained");

    Drained {
        items,
        total_count,
        error: failure,
    }
}

/// Resolve a request that must match exactly one entry.
///
/// The request is narrowed to a two-entry window: one match is returned,
/// none is `NotFound`, two is `Ambiguous`. Backend failures are returned as
/// they are, since an empty result would read as `NotFound`.
pub async fn resolve_single<B, T>(
    backend: &B,
    request: SearchRequest,
    map: MapFn<T>,
) -> DirectoryResult<T>
where
    B: DirectoryBackend + ?Sized,
{
    let request = request.single();
    let drained = drain(backend, &request, map).await;

    if let Some(err) = drained.error {
        return Err(err);
    }

    let mut items = drained.items;
    match items.len() {
        0 => Err(DirectoryError::NotFound {
            query: request.filter,
        }),
        1 => Ok(items.remove(0)),
        _ => Err(DirectoryError::Ambiguous {
            query: request.filter,
        }),
    }
}

/// Key entities by SID. Entities without one are dropped; a repeated SID
/// keeps the later entity.
pub fn index_by_sid<V: Principal>(items: Vec<V>) -> HashMap<String, V> {
    let mut indexed = HashMap::with_capacity(items.len());
    for item in items {
        match item.sid() {
            Some(sid) => {
                let sid = sid.to_string();
                indexed.insert(sid, item);
            }
            None => debug!(
                dn = item.distinguished_name().unwrap_or_default(),
                "Skipping related entry without a SID"
            ),
        }
    }
    indexed
}

/// Run `lookup` once per target DN with at most `workers` running at a time,
/// and wait for all of them.
///
/// The result has one map per target, in target order. Targets without a DN
/// get an empty map, as do lookups whose task fails.
pub async fn fan_out<V, F, Fut>(
    targets: Vec<Option<String>>,
    workers: usize,
    lookup: F,
) -> Vec<HashMap<String, V>>
where
    V: Principal + Send + 'static,
    F: Fn(String) -> Fut,
    Fut: Future<Output = Vec<V>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut results: Vec<HashMap<String, V>> = targets.iter().map(|_| HashMap::new()).collect();
    let mut join_set = JoinSet::new();

    for (index, dn) in targets.into_iter().enumerate() {
        let Some(dn) = dn else {
            debug!(index, "Skipping enrichment for entry without a distinguished name");
            continue;
        };

        let semaphore = Arc::clone(&semaphore);
        let pending = lookup(dn);
        join_set.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return (index, HashMap::new());
            };
            (index, index_by_sid(pending.await))
        });
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, related)) => results[index] = related,
            Err(e) => error!(error = %e, "Enrichment task panicked"),
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{map_group, map_user};
    use crate::models::{Group, LdapEntity};
    use crate::paging::{PageWindow, SearchSummary};
    use crate::traits::{BufferedCursor, EntryCursor};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Backend returning a fixed set of entries, optionally failing.
    struct FixedBackend {
        entries: Vec<AttributeBag>,
        fail_open: bool,
        fail_after: Option<usize>,
        requests: Mutex<Vec<SearchRequest>>,
    }

    impl FixedBackend {
        fn with_entries(entries: Vec<AttributeBag>) -> Self {
            Self {
                entries,
                fail_open: false,
                fail_after: None,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    struct FailingCursor {
        inner: BufferedCursor,
        left: usize,
    }

    #[async_trait]
    impl EntryCursor for FailingCursor {
        async fn next_entry(&mut self) -> DirectoryResult<Option<AttributeBag>> {
            if self.left == 0 {
                return Err(DirectoryError::search_failed("connection reset"));
            }
            self.left -= 1;
            self.inner.next_entry().await
        }

        async fn finish(self: Box<Self>) -> DirectoryResult<SearchSummary> {
            Ok(SearchSummary::default())
        }
    }

    #[async_trait]
    impl DirectoryBackend for FixedBackend {
        fn backend_name(&self) -> &str {
            "fixed"
        }

        async fn open_search(
            &self,
            request: &SearchRequest,
        ) -> DirectoryResult<Box<dyn EntryCursor>> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail_open {
                return Err(DirectoryError::connection_failed("unreachable"));
            }
            let inner = BufferedCursor::new(
                self.entries.clone(),
                SearchSummary {
                    total_count: Some(self.entries.len() as u64),
                },
            );
            match self.fail_after {
                Some(left) => Ok(Box::new(FailingCursor { inner, left })),
                None => Ok(Box::new(inner)),
            }
        }
    }

    fn user_entry(name: &str, sid: &str) -> AttributeBag {
        AttributeBag::for_entry(format!("CN={name},DC=example,DC=com"))
            .with("name", name)
            .with("objectSid", sid)
    }

    fn request() -> SearchRequest {
        SearchRequest::users(None, "(objectClass=user)", PageWindow::new(1, 10))
    }

    #[tokio::test]
    async fn test_drain_maps_every_entry() {
        let backend = FixedBackend::with_entries(vec![
            user_entry("a", "S-1-5-21-1-2-3-1001"),
            user_entry("b", "S-1-5-21-1-2-3-1002"),
        ]);

        let drained = drain(&backend, &request(), map_user).await;
        assert!(drained.error.is_none());
        assert_eq!(drained.total_count, Some(2));
        assert_eq!(drained.items.len(), 2);
        assert_eq!(drained.items[1].entity.name.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_drain_keeps_entries_before_failure() {
        let mut backend = FixedBackend::with_entries(vec![
            user_entry("a", "S-1-5-21-1-2-3-1001"),
            user_entry("b", "S-1-5-21-1-2-3-1002"),
            user_entry("c", "S-1-5-21-1-2-3-1003"),
        ]);
        backend.fail_after = Some(2);

        let drained = drain(&backend, &request(), map_user).await;
        assert_eq!(drained.items.len(), 2);
        assert!(drained.error.is_some());

        let page = drained.into_page();
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn test_drain_open_failure_degrades_to_empty_page() {
        let mut backend = FixedBackend::with_entries(vec![user_entry("a", "S-1-5-21-1-2-3-1001")]);
        backend.fail_open = true;

        let page = drain(&backend, &request(), map_user).await.into_page();
        assert!(page.is_empty());
        assert_eq!(page.total_count, None);
    }

    #[tokio::test]
    async fn test_resolve_single_outcomes() {
        let none = FixedBackend::with_entries(vec![]);
        let err = resolve_single(&none, request(), map_user).await.unwrap_err();
        assert!(matches!(err, DirectoryError::NotFound { ref query } if query == "(objectClass=user)"));

        let one = FixedBackend::with_entries(vec![user_entry("a", "S-1-5-21-1-2-3-1001")]);
        let user = resolve_single(&one, request(), map_user).await.unwrap();
        assert_eq!(user.entity.name.as_deref(), Some("a"));

        let two = FixedBackend::with_entries(vec![
            user_entry("a", "S-1-5-21-1-2-3-1001"),
            user_entry("b", "S-1-5-21-1-2-3-1002"),
        ]);
        let err = resolve_single(&two, request(), map_user).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Ambiguous { .. }));
    }

    #[tokio::test]
    async fn test_resolve_single_narrows_window() {
        let backend = FixedBackend::with_entries(vec![user_entry("a", "S-1-5-21-1-2-3-1001")]);
        resolve_single(&backend, request(), map_user).await.unwrap();

        let sent = backend.requests.lock().unwrap();
        assert_eq!(sent[0].window, PageWindow::single());
        assert_eq!(sent[0].size_limit, Some(2));
    }

    #[tokio::test]
    async fn test_resolve_single_surfaces_backend_failure() {
        let mut backend = FixedBackend::with_entries(vec![]);
        backend.fail_open = true;

        let err = resolve_single(&backend, request(), map_group).await.unwrap_err();
        assert_eq!(err.error_code(), "CONNECTION_FAILED");
    }

    fn group(sid: Option<&str>, name: &str) -> Group {
        Group {
            entity: LdapEntity {
                sid: sid.map(str::to_string),
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_index_by_sid_last_write_wins() {
        let indexed = index_by_sid(vec![
            group(Some("S-1-5-32-544"), "first"),
            group(None, "anonymous"),
            group(Some("S-1-5-32-545"), "users"),
            group(Some("S-1-5-32-544"), "second"),
        ]);

        assert_eq!(indexed.len(), 2);
        assert_eq!(
            indexed["S-1-5-32-544"].entity.name.as_deref(),
            Some("second")
        );
    }

    #[tokio::test]
    async fn test_fan_out_attaches_results_per_target() {
        let targets = vec![
            Some("CN=a".to_string()),
            None,
            Some("CN=c".to_string()),
        ];

        let results = fan_out(targets, 2, |dn: String| async move {
            vec![group(Some(&format!("S-1-5-21-{}", dn.len())), &dn)]
        })
        .await;

        assert_eq!(results.len(), 3);
        assert_eq!(
            results[0]["S-1-5-21-4"].entity.name.as_deref(),
            Some("CN=a")
        );
        assert!(results[1].is_empty());
        assert_eq!(
            results[2]["S-1-5-21-4"].entity.name.as_deref(),
            Some("CN=c")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fan_out_respects_worker_bound() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let targets: Vec<Option<String>> = (0..12).map(|i| Some(format!("CN={i}"))).collect();

        let results = fan_out(targets, 3, |dn: String| {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                vec![group(Some("S-1-5-32-544"), &dn)]
            }
        })
        .await;

        assert_eq!(results.len(), 12);
        assert!(results.iter().all(|r| r.len() == 1));
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }
}
