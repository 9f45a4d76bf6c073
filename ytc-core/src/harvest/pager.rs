use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error};

use crate::json_tree;

use super::continuation::{
    request_continuation, ContinuationEndpoint, CursorClass, CursorState, SortMode,
};
use super::error::{HarvestError, HarvestResult};
use super::error_handler::{report_failure, RemediationAction};
use super::metrics::PagerMetrics;
use super::normalizer::{EntityIndex, RawEntry};
use super::retry::RetryPolicy;
use super::session::{Session, SessionContext};
use super::transport::Transport;

/// One batch of raw entries, in receipt order, for one cursor.
#[derive(Debug, Clone)]
pub struct Page {
    pub class: CursorClass,
    pub entries: Vec<RawEntry>,
}

#[derive(Debug, Clone)]
struct Cursor {
    state: CursorState,
    next: Option<ContinuationEndpoint>,
}

impl Cursor {
    fn seeded(endpoint: ContinuationEndpoint) -> Self {
        Self {
            state: CursorState::Init,
            next: Some(endpoint),
        }
    }
}

/// Drives the top-level cursor and any number of reply cursors of one session.
/// Every cursor advances only when pulled, one request at a time.
pub struct ContinuationPager {
    transport: Arc<dyn Transport>,
    base_url: String,
    context: SessionContext,
    sort: SortMode,
    retry: RetryPolicy,
    top_level: Cursor,
    replies: HashMap<String, Cursor>,
    spent_tokens: HashSet<String>,
    metrics: PagerMetrics,
}

impl ContinuationPager {
    pub fn new(
        transport: Arc<dyn Transport>,
        base_url: impl Into<String>,
        session: Session,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            context: session.context,
            sort: session.sort,
            retry,
            top_level: Cursor::seeded(session.seed.endpoint),
            replies: HashMap::new(),
            spent_tokens: HashSet::new(),
            metrics: PagerMetrics::default(),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Fixed for the pager's lifetime; a different order needs a new session.
    pub fn sort(&self) -> SortMode {
        self.sort
    }

    pub fn metrics(&self) -> &PagerMetrics {
        &self.metrics
    }

    pub fn top_level_state(&self) -> CursorState {
        self.top_level.state
    }

    pub fn reply_state(&self, thread_id: &str) -> Option<CursorState> {
        self.replies.get(thread_id).map(|cursor| cursor.state)
    }

    /// Pulls the next page of threads. `Ok(None)` once the cursor is exhausted
    /// or has failed.
    pub async fn next_threads(&mut self) -> HarvestResult<Option<Page>> {
        self.step(CursorClass::TopLevel).await
    }

    /// Creates the reply cursor for `thread_id` from the thread's reply seed.
    /// Returns `false` when the cursor already exists.
    pub fn open_replies(
        &mut self,
        thread_id: &str,
        seed: ContinuationEndpoint,
    ) -> HarvestResult<bool> {
        if self.replies.contains_key(thread_id) {
            return Ok(false);
        }
        if self.spent_tokens.contains(&seed.token) {
            return Err(HarvestError::TokenReused {
                cursor: CursorClass::replies(thread_id).to_string(),
                token: seed.token,
            });
        }
        self.replies
            .insert(thread_id.to_string(), Cursor::seeded(seed));
        self.metrics.record_reply_cursor();
        debug!(thread = thread_id, "reply cursor opened");
        Ok(true)
    }

    pub async fn next_replies(&mut self, thread_id: &str) -> HarvestResult<Option<Page>> {
        self.step(CursorClass::replies(thread_id)).await
    }

    fn cursor_mut(&mut self, class: &CursorClass) -> HarvestResult<&mut Cursor> {
        match class {
            CursorClass::TopLevel => Ok(&mut self.top_level),
            CursorClass::Replies { thread_id } => {
                self.replies.get_mut(thread_id).ok_or_else(|| {
                    HarvestError::Unexpected(format!("no reply cursor open for {thread_id}"))
                })
            }
        }
    }

    fn fail(&mut self, class: &CursorClass) {
        if let Ok(cursor) = self.cursor_mut(class) {
            cursor.state = CursorState::Failed;
            cursor.next = None;
        }
        self.metrics.record_failure();
    }

    async fn step(&mut self, class: CursorClass) -> HarvestResult<Option<Page>> {
        let interrupted = {
            let cursor = self.cursor_mut(&class)?;
            if cursor.state.is_terminal() {
                return Ok(None);
            }
            cursor.state == CursorState::Fetching
        };
        // The previous step was dropped mid-request: its token is spent and the
        // follow-up token was never received, so the cursor cannot resume.
        if interrupted {
            error!(cursor = %class, "continuation step was dropped before completion");
            self.fail(&class);
            return Err(HarvestError::Unexpected(format!(
                "continuation step for {class} was interrupted"
            )));
        }

        let endpoint = {
            let cursor = self.cursor_mut(&class)?;
            match cursor.next.take() {
                Some(endpoint) => endpoint,
                None => {
                    cursor.state = CursorState::Exhausted;
                    return Ok(None);
                }
            }
        };

        if !self.spent_tokens.insert(endpoint.token.clone()) {
            error!(cursor = %class, "continuation token would be submitted twice");
            self.fail(&class);
            return Err(HarvestError::TokenReused {
                cursor: class.to_string(),
                token: endpoint.token,
            });
        }
        self.cursor_mut(&class)?.state = CursorState::Fetching;

        let operation = format!("continuation {class}");
        let transport = self.transport.as_ref();
        let base_url = self.base_url.as_str();
        let context = &self.context;
        let request = &endpoint;
        let outcome = self
            .retry
            .run(&operation, |_| async move {
                request_continuation(transport, base_url, context, request).await
            })
            .await;
        let response = match outcome {
            Ok(outcome) => {
                self.metrics.record_requests(outcome.attempts);
                outcome.result
            }
            Err(err) => {
                self.fail(&class);
                return Err(err);
            }
        };

        let (entries, next) = match parse_page(&response, &class) {
            Ok(parsed) => parsed,
            Err(err) => {
                report_failure(&operation, &err, 1, &RemediationAction::Abort);
                self.fail(&class);
                return Err(err);
            }
        };

        self.metrics.record_page(entries.len());
        let cursor = self.cursor_mut(&class)?;
        cursor.state = if next.is_some() {
            CursorState::HasMore
        } else {
            CursorState::Exhausted
        };
        cursor.next = next;
        debug!(
            cursor = %class,
            entries = entries.len(),
            state = ?cursor.state,
            "continuation page received"
        );
        Ok(Some(Page { class, entries }))
    }
}

/// Splits a continuation response into the entries addressed to `class` and
/// the next endpoint of that same cursor.
pub(crate) fn parse_page(
    response: &Value,
    class: &CursorClass,
) -> HarvestResult<(Vec<RawEntry>, Option<ContinuationEndpoint>)> {
    if let Some(message) = json_tree::first_key(response, "externalErrorMessage")
        .and_then(Value::as_str)
    {
        return Err(HarvestError::Upstream(message.to_string()));
    }

    let actions: Vec<&Value> = json_tree::find_all(response, |key, _| {
        key == "reloadContinuationItemsCommand" || key == "appendContinuationItemsAction"
    })
    .collect();
    if actions.is_empty() {
        return Err(HarvestError::Parse(format!(
            "continuation response for {class} carries no continuation items"
        )));
    }

    let entities = Arc::new(EntityIndex::from_response(response));
    let parent_id = class.thread_id();
    let mut entries = Vec::new();
    let mut next = None;
    for action in actions {
        let target_id = action
            .get("targetId")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !class.accepts_target(target_id) {
            continue;
        }
        let items = action
            .get("continuationItems")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for item in items {
            if let Some(renderer) = item.get("continuationItemRenderer") {
                if next.is_none() {
                    next = ContinuationEndpoint::from_item_renderer(renderer);
                }
                continue;
            }
            if let Some(entry) = RawEntry::from_item(item, parent_id, &entities) {
                entries.push(entry);
            }
        }
    }
    Ok((entries, next))
}
