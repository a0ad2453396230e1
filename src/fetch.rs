//! Paginated fetching with stale-result arbitration.
//!
//! Every dispatched fetch gets a fresh task id which is recorded on the
//! feed before the request runs. A result is applied only if its id is
//! still the recorded one, so a slow early response can never overwrite
//! a later one.

use std::collections::HashSet;
use std::future::Future;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tracing::debug;

use crate::action::{Action, Cmd, SectionMsg, TaskResult};
use crate::error::Result;
use crate::section::SectionId;
use crate::task::Task;
use crate::types::{Page, PageInfo, Row, RowId};

/// A page tagged with the fetch that produced it.
#[derive(Debug, Clone)]
pub struct Fetched<R> {
    pub task_id: String,
    pub page: Page<R>,
    /// The request continued from a cursor, so rows are appended.
    pub appending: bool,
}

/// Parameters for one dispatched fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub task_id: String,
    pub cursor: Option<String>,
}

impl FetchTicket {
    pub fn appending(&self) -> bool {
        self.cursor.is_some()
    }
}

/// Outcome of delivering a result to a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Applied,
    Stale,
}

/// Rows of one section plus their pagination state.
#[derive(Debug, Clone)]
pub struct Feed<R> {
    pub rows: Vec<R>,
    pub total_count: usize,
    pub page_info: Option<PageInfo>,
    pub last_fetch_task_id: Option<String>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    seq: u64,
}

impl<R> Default for Feed<R> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            total_count: 0,
            page_info: None,
            last_fetch_task_id: None,
            is_loading: false,
            error: None,
            last_updated: None,
            seq: 0,
        }
    }
}

impl<R> Feed<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_next_page(&self) -> bool {
        self.page_info.as_ref().map_or(true, |p| p.has_next_page)
    }

    /// Claim the next fetch. Returns `None` once pagination is exhausted.
    ///
    /// `prefix` identifies the section, e.g. `fetching_prs_1`.
    pub fn begin(&mut self, prefix: &str) -> Option<FetchTicket> {
        if !self.has_next_page() {
            return None;
        }

        self.seq += 1;
        let cursor = self.page_info.as_ref().and_then(|p| p.end_cursor.clone());
        let task_id = format!(
            "{}_{}_{}_{}",
            prefix,
            cursor.as_deref().unwrap_or("start"),
            Utc::now().timestamp_millis(),
            self.seq
        );

        self.last_fetch_task_id = Some(task_id.clone());
        self.is_loading = true;
        Some(FetchTicket { task_id, cursor })
    }

    /// Record a failed fetch. Existing rows are left as they were.
    pub fn fail(&mut self, task_id: &str, error: String) -> Delivery {
        if self.last_fetch_task_id.as_deref() != Some(task_id) {
            return Delivery::Stale;
        }
        self.is_loading = false;
        self.error = Some(error);
        Delivery::Applied
    }

    /// Empty the feed with an error when the current filters cannot be fetched at all.
    /// Nothing more is fetched until the next reset.
    pub fn reject(&mut self, error: String) {
        self.rows.clear();
        self.total_count = 0;
        self.page_info = Some(PageInfo::default());
        self.last_fetch_task_id = None;
        self.is_loading = false;
        self.error = Some(error);
    }

    /// Forget rows and cursor, as on a filter change or manual refresh.
    pub fn reset(&mut self) {
        self.rows.clear();
        self.total_count = 0;
        self.page_info = None;
        self.error = None;
    }

    /// Start pagination over while keeping the visible rows until the new first page lands.
    pub fn restart(&mut self) {
        self.page_info = None;
    }
}

impl<R: Row> Feed<R> {
    /// Apply a fetched page if it belongs to the authoritative fetch.
    ///
    /// Appended rows already present by identity are dropped, since a page
    /// can repeat threads that were pulled in individually earlier.
    pub fn deliver(&mut self, fetched: Fetched<R>) -> Delivery {
        if self.last_fetch_task_id.as_deref() != Some(fetched.task_id.as_str()) {
            debug!(task_id = %fetched.task_id, "discarding stale fetch result");
            return Delivery::Stale;
        }

        let Fetched { page, appending, .. } = fetched;
        if appending {
            let seen: HashSet<RowId> = self.rows.iter().map(Row::identity).collect();
            let incoming = page.rows.len();
            let before = self.rows.len();
            self.rows
                .extend(page.rows.into_iter().filter(|r| !seen.contains(&r.identity())));
            let kept = self.rows.len() - before;
            if kept < incoming {
                debug!(dropped = incoming - kept, "dropping rows already on screen");
            }
        } else {
            self.rows = page.rows;
        }
        self.total_count = page.total_count;
        self.page_info = Some(page.page_info);
        self.is_loading = false;
        self.error = None;
        self.last_updated = Some(Utc::now());
        Delivery::Applied
    }
}

/// Build the task entry and worker for one fetch.
///
/// `wrap` turns the fetched page into the variant's section message.
pub fn fetch_cmds<R, Fut>(
    section: SectionId,
    ticket: &FetchTicket,
    start_text: String,
    finished_text: String,
    request: Fut,
    wrap: fn(Fetched<R>) -> SectionMsg,
) -> Vec<Cmd>
where
    R: Send + 'static,
    Fut: Future<Output = Result<Page<R>>> + Send + 'static,
{
    let task_id = ticket.task_id.clone();
    let appending = ticket.appending();
    debug!(%task_id, ?section, appending, "dispatching fetch");

    let job = async move {
        let (error, msg) = match request.await {
            Ok(page) => (
                None,
                wrap(Fetched {
                    task_id: task_id.clone(),
                    page,
                    appending,
                }),
            ),
            Err(err) => {
                let error = err.to_string();
                (
                    Some(error.clone()),
                    SectionMsg::FetchFailed {
                        task_id: task_id.clone(),
                        error,
                    },
                )
            }
        };
        Action::TaskFinished(TaskResult {
            task_id,
            generation: None,
            section: Some(section),
            error,
            msg: Some(msg),
        })
    };

    vec![
        Cmd::StartTask(Task::new(ticket.task_id.clone(), start_text, finished_text)),
        Cmd::Spawn(job.boxed()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::testing::pr;
    use crate::types::PullRequest;

    fn page(numbers: Vec<u64>, next: Option<&str>) -> Page<PullRequest> {
        Page {
            total_count: 100,
            page_info: PageInfo {
                end_cursor: next.map(str::to_string),
                has_next_page: next.is_some(),
            },
            rows: numbers.into_iter().map(pr).collect(),
        }
    }

    fn numbers(feed: &Feed<PullRequest>) -> Vec<u64> {
        feed.rows.iter().map(|r| r.number).collect()
    }

    fn fetched(ticket: &FetchTicket, page: Page<PullRequest>) -> Fetched<PullRequest> {
        Fetched {
            task_id: ticket.task_id.clone(),
            page,
            appending: ticket.appending(),
        }
    }

    #[test]
    fn later_fetch_wins_regardless_of_arrival_order() {
        let mut feed = Feed::new();
        let a = feed.begin("fetching_prs_1").unwrap();
        let b = feed.begin("fetching_prs_1").unwrap();
        assert_ne!(a.task_id, b.task_id);

        assert_eq!(feed.deliver(fetched(&b, page(vec![2], None))), Delivery::Applied);
        assert_eq!(feed.deliver(fetched(&a, page(vec![1], None))), Delivery::Stale);
        assert_eq!(numbers(&feed), vec![2]);

        let mut feed = Feed::new();
        let a = feed.begin("fetching_prs_1").unwrap();
        let b = feed.begin("fetching_prs_1").unwrap();
        assert_eq!(feed.deliver(fetched(&a, page(vec![1], None))), Delivery::Stale);
        assert!(feed.is_loading);
        assert_eq!(feed.deliver(fetched(&b, page(vec![2], None))), Delivery::Applied);
        assert_eq!(numbers(&feed), vec![2]);
        assert!(!feed.is_loading);
    }

    #[test]
    fn pagination_appends_until_exhausted() {
        let mut feed = Feed::new();

        let first = feed.begin("p").unwrap();
        assert_eq!(first.cursor, None);
        feed.deliver(fetched(&first, page(vec![1, 2], Some("c1"))));
        assert_eq!(feed.rows.len(), 2);

        let second = feed.begin("p").unwrap();
        assert_eq!(second.cursor.as_deref(), Some("c1"));
        assert!(second.appending());
        feed.deliver(fetched(&second, page(vec![3], None)));
        assert_eq!(numbers(&feed), vec![1, 2, 3]);

        assert!(!feed.has_next_page());
        assert!(feed.begin("p").is_none());
        assert!(feed.begin("p").is_none());
    }

    #[test]
    fn appended_page_skips_rows_already_listed() {
        let mut feed = Feed::new();
        let first = feed.begin("p").unwrap();
        feed.deliver(fetched(&first, page(vec![1, 2, 4], Some("c1"))));

        let second = feed.begin("p").unwrap();
        feed.deliver(fetched(&second, page(vec![3, 4], None)));
        assert_eq!(numbers(&feed), vec![1, 2, 4, 3]);

        let mut other_repo = pr(4);
        other_repo.repo = "acme/gadgets".into();
        feed.restart();
        let t = feed.begin("p").unwrap();
        feed.deliver(fetched(&t, page(vec![4], Some("c2"))));
        let t = feed.begin("p").unwrap();
        feed.deliver(Fetched {
            task_id: t.task_id.clone(),
            page: Page {
                total_count: 2,
                page_info: PageInfo::default(),
                rows: vec![pr(4), other_repo],
            },
            appending: true,
        });
        assert_eq!(feed.rows.len(), 2);
        assert_eq!(feed.rows[1].repo, "acme/gadgets");
    }

    #[test]
    fn failure_keeps_rows() {
        let mut feed = Feed::new();
        let first = feed.begin("p").unwrap();
        feed.deliver(fetched(&first, page(vec![1, 2], Some("c1"))));

        let second = feed.begin("p").unwrap();
        assert_eq!(feed.fail(&second.task_id, "rate limited".into()), Delivery::Applied);
        assert_eq!(numbers(&feed), vec![1, 2]);
        assert!(!feed.is_loading);
        assert_eq!(feed.error.as_deref(), Some("rate limited"));
    }

    #[test]
    fn stale_failure_is_ignored() {
        let mut feed: Feed<u32> = Feed::new();
        let old = feed.begin("p").unwrap();
        feed.begin("p").unwrap();
        assert_eq!(feed.fail(&old.task_id, "boom".into()), Delivery::Stale);
        assert!(feed.error.is_none());
        assert!(feed.is_loading);
    }

    #[test]
    fn reset_allows_fetching_again() {
        let mut feed = Feed::new();
        let t = feed.begin("p").unwrap();
        feed.deliver(fetched(&t, page(vec![1], None)));
        assert!(feed.begin("p").is_none());

        feed.reset();
        assert!(feed.rows.is_empty());
        assert!(feed.begin("p").is_some());
    }

    #[test]
    fn restart_replaces_rows_on_arrival() {
        let mut feed = Feed::new();
        let t = feed.begin("p").unwrap();
        feed.deliver(fetched(&t, page(vec![1, 2], Some("c"))));
        let t = feed.begin("p").unwrap();
        feed.deliver(fetched(&t, page(vec![3], None)));

        feed.restart();
        assert_eq!(numbers(&feed), vec![1, 2, 3]);
        let t = feed.begin("p").unwrap();
        assert!(!t.appending());
        feed.deliver(fetched(&t, page(vec![9], Some("c"))));
        assert_eq!(numbers(&feed), vec![9]);
    }

    #[test]
    fn rejected_feed_stays_empty_until_reset() {
        let mut feed: Feed<u32> = Feed::new();
        feed.reject("unsupported filter".into());
        assert!(feed.rows.is_empty());
        assert_eq!(feed.error.as_deref(), Some("unsupported filter"));
        assert!(feed.begin("p").is_none());

        feed.reset();
        assert!(feed.begin("p").is_some());
    }

    #[tokio::test]
    async fn fetch_cmds_report_through_task_result() {
        let mut feed: Feed<u32> = Feed::new();
        let ticket = feed.begin("p").unwrap();
        let section = SectionId::new(1, crate::section::SectionKind::Prs);

        let cmds = fetch_cmds(
            section,
            &ticket,
            "Fetching".into(),
            "Fetched".into(),
            async { Err::<Page<u32>, _>(crate::error::DashError::Api("offline".into())) },
            |_f: Fetched<u32>| unreachable!(),
        );
        assert_eq!(cmds.len(), 2);
        assert!(matches!(&cmds[0], Cmd::StartTask(t) if t.id == ticket.task_id));

        let Some(Cmd::Spawn(job)) = cmds.into_iter().nth(1) else {
            panic!("expected a job");
        };
        match job.await {
            Action::TaskFinished(result) => {
                assert_eq!(result.task_id, ticket.task_id);
                assert_eq!(result.section, Some(section));
                assert_eq!(result.error.as_deref(), Some("API error: offline"));
                assert!(matches!(result.msg, Some(SectionMsg::FetchFailed { .. })));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
