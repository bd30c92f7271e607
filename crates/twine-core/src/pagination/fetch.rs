use async_trait::async_trait;
use thiserror::Error;

use crate::models::{AccountId, Cursor, Direction, PaginationRequest, StatusId, StatusItem, TaskId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("account is not authorized")]
    Unauthorized,
    #[error("fetch cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedPage {
    pub items: Vec<StatusItem>,
    /// Cursor for the next page in the same direction, when upstream has more
    pub next_cursor: Option<StatusId>,
}

/// Network side of pagination: one page of one account's timeline.
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    async fn fetch_statuses(
        &self,
        account_id: AccountId,
        cursor: Cursor,
        direction: Direction,
        page_size: usize,
    ) -> Result<FetchedPage, FetchError>;
}

/// Per-account outcomes of one pagination request.
#[derive(Debug, Clone)]
pub struct FetchCompletion {
    pub task_id: TaskId,
    pub direction: Direction,
    pub results: Vec<(AccountId, FetchedPage)>,
    pub errors: Vec<(AccountId, FetchError)>,
}

impl FetchCompletion {
    pub fn new(task_id: TaskId, direction: Direction) -> Self {
        Self {
            task_id,
            direction,
            results: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn with_page(mut self, account_id: AccountId, items: Vec<StatusItem>) -> Self {
        self.results.push((
            account_id,
            FetchedPage {
                items,
                next_cursor: None,
            },
        ));
        self
    }

    pub fn with_error(mut self, account_id: AccountId, error: FetchError) -> Self {
        self.errors.push((account_id, error));
        self
    }
}

/// Fetches every account of `request` concurrently and collects the
/// outcomes. One account failing never affects the others.
pub async fn fetch_all<F>(fetcher: &F, request: &PaginationRequest) -> FetchCompletion
where
    F: StatusFetcher + ?Sized,
{
    let fetches = request.cursors.iter().map(|(account_id, cursor)| async move {
        let result = fetcher
            .fetch_statuses(*account_id, *cursor, request.direction, request.page_size)
            .await;
        (*account_id, result)
    });

    let mut completion = FetchCompletion::new(request.task_id, request.direction);
    for (account_id, result) in futures::future::join_all(fetches).await {
        match result {
            Ok(page) => completion.results.push((account_id, page)),
            Err(e) => completion.errors.push((account_id, e)),
        }
    }
    completion
}
