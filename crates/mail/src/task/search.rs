//! Metadata search task
//!
//! Turns a search query into a sequence of page fetches. Creating the task
//! issues the first (id-only) search call; every step then fetches metadata
//! for one page of ids, appends the resulting emails in the order the
//! service returned them, and moves on to the next page if there is one.

use log::debug;
use std::sync::Arc;

use super::{LongTask, StepProgress, StepResult};
use crate::error::TaskError;
use crate::models::{Email, MessageId};
use crate::remote::{MailSearch, PageCursor};

/// Number of message ids requested per search page
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Everything a search has discovered so far
///
/// Owned by a single [`MetadataSearchTask`]; a new search starts from an
/// empty state rather than reusing an old one.
#[derive(Debug, Default)]
pub struct SearchState {
    emails: Vec<Email>,
    /// Ids from the latest page whose metadata hasn't been fetched yet
    pending_ids: Option<Vec<MessageId>>,
    cursor: Option<PageCursor>,
    batches_done: usize,
}

impl SearchState {
    pub fn emails(&self) -> &[Email] {
        &self.emails
    }

    /// Whether another page remains to be fetched
    pub fn has_more_pages(&self) -> bool {
        self.pending_ids.is_some() || self.cursor.is_some()
    }

    pub fn batches_done(&self) -> usize {
        self.batches_done
    }
}

/// Pages through search results, accumulating email metadata
pub struct MetadataSearchTask {
    search: Arc<dyn MailSearch>,
    query: String,
    page_size: usize,
    estimated_steps: usize,
    state: SearchState,
    failed: bool,
}

impl MetadataSearchTask {
    /// Issue the initial search call and build the task from its answer
    ///
    /// When the service reports zero matches the task has no steps at all.
    pub fn start(
        search: Arc<dyn MailSearch>,
        query: impl Into<String>,
        page_size: usize,
    ) -> Result<Self, TaskError> {
        let query = query.into();
        let page_size = page_size.max(1);

        let page = search
            .search(&query, page_size, None)
            .map_err(|source| TaskError::Search { batch: 0, source })?;

        let first_page_len = page.message_ids.len() as u64;
        let estimate = page.match_estimate.unwrap_or(first_page_len).max(first_page_len);
        let estimated_steps = estimate.div_ceil(page_size as u64) as usize;

        debug!(
            "Search '{}' matched ~{} messages ({} batches)",
            query, estimate, estimated_steps
        );

        let state = SearchState {
            emails: Vec::new(),
            pending_ids: (!page.message_ids.is_empty()).then_some(page.message_ids),
            cursor: page.next_cursor,
            batches_done: 0,
        };

        Ok(Self {
            search,
            query,
            page_size,
            estimated_steps,
            state,
            failed: false,
        })
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    /// Emails discovered so far, in arrival order
    pub fn emails(&self) -> &[Email] {
        self.state.emails()
    }

    /// Take the discovered emails, e.g. after the driver stopped early
    pub fn into_emails(self) -> Vec<Email> {
        self.state.emails
    }

    pub fn progress(&self) -> StepProgress {
        StepProgress::new(self.state.batches_done, self.number_of_steps())
    }

    /// Human-readable status fragment for a progress bar
    pub fn status_text(&self) -> String {
        if self.number_of_steps() == 0 {
            return "no emails matched the query".to_string();
        }
        let progress = self.progress();
        format!(
            "completed {} of {} batches, {}%",
            progress.current,
            progress.total,
            progress.percent()
        )
    }

    fn next_page_ids(&mut self, batch: usize) -> Result<Vec<MessageId>, TaskError> {
        if let Some(ids) = self.state.pending_ids.take() {
            return Ok(ids);
        }

        let page = self
            .search
            .search(&self.query, self.page_size, self.state.cursor.as_ref())
            .map_err(|source| TaskError::Search { batch, source })?;
        self.state.cursor = page.next_cursor;
        Ok(page.message_ids)
    }

    fn fetch_batch(&mut self, batch: usize) -> Result<(), TaskError> {
        let ids = self.next_page_ids(batch)?;
        if ids.is_empty() {
            return Ok(());
        }

        let metadata = self
            .search
            .fetch_metadata(&ids)
            .map_err(|source| TaskError::Search { batch, source })?;

        debug!("Batch {}: {} ids, {} with metadata", batch, ids.len(), metadata.len());
        self.state.emails.extend(metadata.into_iter().map(Email::from));
        Ok(())
    }
}

impl LongTask for MetadataSearchTask {
    type Output = Vec<Email>;

    fn number_of_steps(&self) -> usize {
        let known = self.state.batches_done + usize::from(self.has_more_steps());
        self.estimated_steps.max(known)
    }

    fn has_more_steps(&self) -> bool {
        !self.failed && self.state.has_more_pages()
    }

    fn take_step(&mut self) -> Result<StepResult<Vec<Email>>, TaskError> {
        if !self.has_more_steps() {
            return Err(TaskError::Exhausted);
        }

        let batch = self.state.batches_done + 1;
        if let Err(err) = self.fetch_batch(batch) {
            self.failed = true;
            return Err(err);
        }
        self.state.batches_done = batch;

        if self.has_more_steps() {
            Ok(StepResult::Continue(self.progress()))
        } else {
            Ok(StepResult::Complete(self.state.emails.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BYTES_IN_MEGABYTE, EmailAddress};
    use crate::remote::{MessageMetadata, SearchPage};
    use anyhow::{Result, bail};
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves fixed pages; each page is (ids, sizes in MB)
    struct PagedSearch {
        pages: Vec<Vec<(&'static str, u64)>>,
        estimate: Option<u64>,
        fail_metadata_on_page: Option<usize>,
        calls: Mutex<Vec<String>>,
    }

    impl PagedSearch {
        fn new(pages: Vec<Vec<(&'static str, u64)>>) -> Self {
            let total = pages.iter().map(|p| p.len() as u64).sum();
            Self {
                pages,
                estimate: Some(total),
                fail_metadata_on_page: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn sizes(&self) -> HashMap<&'static str, u64> {
            self.pages.iter().flatten().copied().collect()
        }

        fn page_of(&self, id: &str) -> usize {
            self.pages
                .iter()
                .position(|p| p.iter().any(|(i, _)| *i == id))
                .unwrap_or(usize::MAX)
        }
    }

    impl MailSearch for PagedSearch {
        fn search(
            &self,
            _query: &str,
            _page_size: usize,
            cursor: Option<&PageCursor>,
        ) -> Result<SearchPage> {
            let index: usize = cursor.map(|c| c.as_str().parse().unwrap()).unwrap_or(0);
            self.calls.lock().unwrap().push(format!("search:{}", index));
            let ids = self
                .pages
                .get(index)
                .map(|p| p.iter().map(|(id, _)| MessageId::new(*id)).collect())
                .unwrap_or_default();
            Ok(SearchPage {
                match_estimate: self.estimate,
                message_ids: ids,
                next_cursor: (index + 1 < self.pages.len())
                    .then(|| PageCursor::new((index + 1).to_string())),
            })
        }

        fn fetch_metadata(&self, ids: &[MessageId]) -> Result<Vec<MessageMetadata>> {
            self.calls.lock().unwrap().push(format!("metadata:{}", ids.len()));
            if let Some(page) = self.fail_metadata_on_page
                && ids.iter().any(|id| self.page_of(id.as_str()) == page)
            {
                bail!("backend unavailable");
            }
            let sizes = self.sizes();
            Ok(ids
                .iter()
                .map(|id| MessageMetadata {
                    id: id.clone(),
                    from: EmailAddress::new("sender@example.com"),
                    subject: format!("Subject {}", id),
                    received_at: Utc::now(),
                    size_bytes: sizes[id.as_str()] * BYTES_IN_MEGABYTE,
                    label_ids: vec!["INBOX".to_string()],
                })
                .collect())
        }
    }

    fn ids(emails: &[Email]) -> Vec<&str> {
        emails.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_zero_matches_has_no_steps() {
        let search = Arc::new(PagedSearch::new(vec![]));
        let mut task = MetadataSearchTask::start(search, "has:attachment", 2).unwrap();

        assert_eq!(task.number_of_steps(), 0);
        assert!(!task.has_more_steps());
        assert_eq!(task.status_text(), "no emails matched the query");
        assert!(matches!(task.take_step(), Err(TaskError::Exhausted)));
    }

    #[test]
    fn test_two_pages_keep_arrival_order() {
        let search = Arc::new(PagedSearch::new(vec![
            vec![("m11", 11), ("m20", 20)],
            vec![("m5", 5)],
        ]));
        let mut task =
            MetadataSearchTask::start(search.clone(), "has:attachment size:10m", 2).unwrap();
        assert_eq!(task.number_of_steps(), 2);

        let first = task.take_step().unwrap();
        assert_eq!(first, StepResult::Continue(StepProgress::new(1, 2)));
        assert_eq!(task.status_text(), "completed 1 of 2 batches, 50%");

        match task.take_step().unwrap() {
            StepResult::Complete(emails) => assert_eq!(ids(&emails), vec!["m11", "m20", "m5"]),
            other => panic!("expected completion, got {:?}", other),
        }
        assert!(!task.has_more_steps());
        assert_eq!(task.emails()[1].size_in_megabytes(), 20);
        assert_eq!(
            *search.calls.lock().unwrap(),
            vec!["search:0", "metadata:2", "search:1", "metadata:1"]
        );
    }

    #[test]
    fn test_stop_after_first_batch_keeps_partial_results() {
        let search = Arc::new(PagedSearch::new(vec![
            vec![("a", 1), ("b", 1)],
            vec![("c", 1), ("d", 1)],
            vec![("e", 1)],
        ]));
        let mut task = MetadataSearchTask::start(search, "q", 2).unwrap();
        task.take_step().unwrap();

        assert!(task.has_more_steps());
        assert_eq!(ids(&task.into_emails()), vec!["a", "b"]);
    }

    #[test]
    fn test_underestimate_grows_total() {
        let mut paged = PagedSearch::new(vec![vec![("a", 1)], vec![("b", 1)], vec![("c", 1)]]);
        paged.estimate = Some(1);
        let mut task = MetadataSearchTask::start(Arc::new(paged), "q", 1).unwrap();
        assert_eq!(task.number_of_steps(), 1);

        let mut last = 0;
        while task.has_more_steps() {
            if let StepResult::Continue(p) = task.take_step().unwrap() {
                assert!(p.current > last);
                assert!(p.total >= p.current);
                last = p.current;
            }
        }
        assert_eq!(task.emails().len(), 3);
    }

    #[test]
    fn test_failed_batch_ends_task() {
        let mut paged = PagedSearch::new(vec![vec![("a", 1)], vec![("b", 1)], vec![("c", 1)]]);
        paged.fail_metadata_on_page = Some(1);
        let mut task = MetadataSearchTask::start(Arc::new(paged), "q", 1).unwrap();

        task.take_step().unwrap();
        let err = task.take_step().unwrap_err();
        assert!(matches!(err, TaskError::Search { batch: 2, .. }));
        assert!(!task.has_more_steps());
        assert!(matches!(task.take_step(), Err(TaskError::Exhausted)));
        assert_eq!(ids(task.emails()), vec!["a"]);
    }
}
