//! Backend traits
//!
//! A backend turns a [`SearchRequest`] into a stream of raw entries. Each
//! search owns its connection: `open_search` connects and binds, the cursor
//! yields entries, and `finish` reads the response controls and releases the
//! connection.

use std::collections::VecDeque;

use async_trait::async_trait;

use crate::bag::AttributeBag;
use crate::error::DirectoryResult;
use crate::paging::{SearchRequest, SearchSummary};

/// A directory protocol the service can query.
#[async_trait]
pub trait DirectoryBackend: Send + Sync + 'static {
    /// Short name used in logs.
    fn backend_name(&self) -> &str;

    /// Send the search and return a cursor over its results.
    async fn open_search(&self, request: &SearchRequest) -> DirectoryResult<Box<dyn EntryCursor>>;
}

/// Streaming view over one search's results.
#[async_trait]
pub trait EntryCursor: Send {
    /// Next entry, or `None` once the result set is exhausted.
    async fn next_entry(&mut self) -> DirectoryResult<Option<AttributeBag>>;

    /// Close the search and report what the server said about it.
    async fn finish(self: Box<Self>) -> DirectoryResult<SearchSummary>;
}

/// Cursor over entries a backend already holds in memory.
#[derive(Debug, Default)]
pub struct BufferedCursor {
    entries: VecDeque<AttributeBag>,
    summary: SearchSummary,
}

impl BufferedCursor {
    pub fn new(entries: impl IntoIterator<Item = AttributeBag>, summary: SearchSummary) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            summary,
        }
    }

    pub fn remaining(&self) -> usize {
        self.entries.len()
    }
}

#[async_trait]
impl EntryCursor for BufferedCursor {
    async fn next_entry(&mut self) -> DirectoryResult<Option<AttributeBag>> {
        Ok(self.entries.pop_front())
    }

    async fn finish(self: Box<Self>) -> DirectoryResult<SearchSummary> {
        Ok(self.summary)
    }
}
