//! Bounded, resumable delivery of a match sequence.
//!
//! The cursor is a thin forward-only wrapper: it holds at most one
//! look-ahead record (to answer `has_more` honestly) and never a copy of the
//! result set. Dropping it drops the underlying row stream, which returns
//! the store connection to the pool.

use crate::error::{LocateError, Result};
use crate::models::EntryRecord;
use crate::query::MatchSequence;

/// One batch of results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub records: Vec<EntryRecord>,
    /// True iff at least one more record remains after this page, or a read
    /// error is waiting to be reported by the next call.
    pub has_more: bool,
}

pub struct PaginationCursor<'a> {
    matches: MatchSequence<'a>,
    lookahead: Option<EntryRecord>,
    /// Read error hit after some records of a page were already pulled.
    deferred: Option<LocateError>,
    pages: u64,
}

impl<'a> PaginationCursor<'a> {
    pub fn new(matches: MatchSequence<'a>) -> Self {
        Self {
            matches,
            lookahead: None,
            deferred: None,
            pages: 0,
        }
    }

    /// Pulls up to `page_size` records.
    ///
    /// `page_size` must be positive; anything else fails with
    /// `InvalidPageSize` without advancing the cursor. When a read fails
    /// partway through a page, the records already pulled are returned with
    /// `has_more` set and the error is returned by the following call.
    pub async fn next_page(&mut self, page_size: i64) -> Result<Page> {
        if page_size <= 0 {
            return Err(LocateError::InvalidPageSize(page_size));
        }
        if let Some(err) = self.deferred.take() {
            return Err(err);
        }
        let limit = usize::try_from(page_size).unwrap_or(usize::MAX);

        let mut records = Vec::with_capacity(limit.min(1024));
        if let Some(first) = self.lookahead.take() {
            records.push(first);
        }
        while records.len() < limit {
            match self.matches.next_match().await {
                Some(Ok(record)) => records.push(record),
                Some(Err(e)) => return self.partial_page(records, e),
                None => break,
            }
        }

        match self.matches.next_match().await {
            Some(Ok(record)) => self.lookahead = Some(record),
            Some(Err(e)) => return self.partial_page(records, e),
            None => {}
        }
        self.pages += 1;

        Ok(Page {
            records,
            has_more: self.lookahead.is_some(),
        })
    }

    fn partial_page(&mut self, records: Vec<EntryRecord>, err: LocateError) -> Result<Page> {
        if records.is_empty() {
            return Err(err);
        }
        self.deferred = Some(err);
        self.pages += 1;
        Ok(Page {
            records,
            has_more: true,
        })
    }

    /// Pages handed out so far.
    pub fn pages_served(&self) -> u64 {
        self.pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{search, Query};
    use crate::store::IndexStore;
    use futures::StreamExt;
    use tempfile::TempDir;

    async fn store_with(n: usize) -> (TempDir, IndexStore) {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::open(tmp.path().join("index.db")).await.unwrap();
        let entries: Vec<EntryRecord> = (0..n)
            .map(|i| EntryRecord::file(format!("/data/file{:03}.log", i), i as u64, 0).unwrap())
            .collect();
        store.upsert(&entries).await.unwrap();
        (tmp, store)
    }

    #[tokio::test]
    async fn rejects_non_positive_page_size() {
        let (_tmp, store) = store_with(3).await;
        let mut cursor = search(&store, &Query::substring("")).unwrap().into_cursor();

        for bad in [0, -1, i64::MIN] {
            assert!(matches!(
                cursor.next_page(bad).await,
                Err(LocateError::InvalidPageSize(n)) if n == bad
            ));
        }

        // Invalid sizes did not consume anything
        let page = cursor.next_page(10).await.unwrap();
        assert_eq!(page.records.len(), 3);
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn exact_multiple_has_no_trailing_empty_page() {
        let (_tmp, store) = store_with(4).await;
        let mut cursor = search(&store, &Query::substring("file")).unwrap().into_cursor();

        let first = cursor.next_page(2).await.unwrap();
        assert_eq!(first.records.len(), 2);
        assert!(first.has_more);

        let second = cursor.next_page(2).await.unwrap();
        assert_eq!(second.records.len(), 2);
        assert!(!second.has_more);
        assert_eq!(cursor.pages_served(), 2);
    }

    #[tokio::test]
    async fn empty_result_is_single_empty_page() {
        let (_tmp, store) = store_with(4).await;
        let mut cursor = search(&store, &Query::substring("nomatch")).unwrap().into_cursor();

        let page = cursor.next_page(5).await.unwrap();
        assert!(page.records.is_empty());
        assert!(!page.has_more);

        // Exhausted cursors keep answering with empty pages
        let again = cursor.next_page(5).await.unwrap();
        assert!(again.records.is_empty());
        assert!(!again.has_more);
    }

    #[tokio::test]
    async fn abandoned_cursor_releases_connection() {
        let (_tmp, store) = store_with(10).await;
        {
            let mut cursor = search(&store, &Query::substring("")).unwrap().into_cursor();
            let page = cursor.next_page(1).await.unwrap();
            assert!(page.has_more);
        }

        // Writes still go through once the cursor is gone
        store
            .delete(&["/data/file000.log".to_string()])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap().total(), 9);
    }

    fn failing_after(good: usize) -> PaginationCursor<'static> {
        let mut items: Vec<Result<EntryRecord>> = (0..good)
            .map(|i| Ok(EntryRecord::file(format!("/r/{}", i), 1, 0).unwrap()))
            .collect();
        items.push(Err(LocateError::StorageUnavailable("disk I/O error".to_string())));
        let stream = futures::stream::iter(items).boxed();
        MatchSequence::from_stream(stream).into_cursor()
    }

    #[tokio::test]
    async fn read_error_mid_page_keeps_pulled_records() {
        let mut cursor = failing_after(2);

        let page = cursor.next_page(5).await.unwrap();
        assert_eq!(page.records.len(), 2);
        assert!(page.has_more);

        assert!(matches!(
            cursor.next_page(5).await,
            Err(LocateError::StorageUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn read_error_on_lookahead_keeps_full_page() {
        let mut cursor = failing_after(3);

        let page = cursor.next_page(3).await.unwrap();
        assert_eq!(page.records.len(), 3);
        assert!(page.has_more);
        assert!(cursor.next_page(3).await.is_err());
    }

    #[tokio::test]
    async fn read_error_before_any_record_is_immediate() {
        let mut cursor = failing_after(0);
        assert!(cursor.next_page(3).await.is_err());
        assert_eq!(cursor.pages_served(), 0);
    }
}
