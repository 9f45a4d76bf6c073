use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use super::error::{HarvestError, HarvestResult};
use super::session::SessionContext;
use super::transport::{check_status, Transport};
use crate::json_tree;

const DEFAULT_API_URL: &str = "/youtubei/v1/next";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    Popular,
    #[default]
    Recent,
}

impl SortMode {
    /// Position of this mode in the page's sort menu.
    pub fn menu_index(&self) -> usize {
        match self {
            SortMode::Popular => 0,
            SortMode::Recent => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Popular => "popular",
            SortMode::Recent => "recent",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SortMode {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "popular" | "top" => Ok(SortMode::Popular),
            "recent" | "newest" => Ok(SortMode::Recent),
            other => Err(HarvestError::InvalidTarget(format!(
                "invalid sort mode: {other}"
            ))),
        }
    }
}

/// A continuation command as embedded in pages and responses: the opaque token
/// plus the internal endpoint it must be posted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationEndpoint {
    pub token: String,
    pub api_url: String,
}

impl ContinuationEndpoint {
    pub fn from_value(value: &Value) -> Option<Self> {
        let token = value
            .get("continuationCommand")
            .and_then(|command| command.get("token"))
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())?;
        let api_url = value
            .pointer("/commandMetadata/webCommandMetadata/apiUrl")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_API_URL);
        Some(Self {
            token: token.to_string(),
            api_url: api_url.to_string(),
        })
    }

    /// Reads the endpoint of a `continuationItemRenderer`, which carries it either
    /// directly or behind a "show more" button.
    pub fn from_item_renderer(renderer: &Value) -> Option<Self> {
        if let Some(endpoint) = renderer.get("continuationEndpoint") {
            return Self::from_value(endpoint);
        }
        json_tree::first_key(renderer, "buttonRenderer")
            .and_then(|button| button.get("command"))
            .and_then(Self::from_value)
    }
}

/// Single-use cursor position together with the parameters it was issued under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationState {
    pub endpoint: ContinuationEndpoint,
    pub sort: SortMode,
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CursorClass {
    TopLevel,
    Replies { thread_id: String },
}

impl CursorClass {
    pub fn replies(thread_id: impl Into<String>) -> Self {
        CursorClass::Replies {
            thread_id: thread_id.into(),
        }
    }

    pub fn thread_id(&self) -> Option<&str> {
        match self {
            CursorClass::TopLevel => None,
            CursorClass::Replies { thread_id } => Some(thread_id),
        }
    }

    /// Whether a response action addressed to `target_id` feeds this cursor.
    pub(crate) fn accepts_target(&self, target_id: &str) -> bool {
        if target_id.is_empty() {
            return true;
        }
        match self {
            CursorClass::TopLevel => matches!(
                target_id,
                "comments-section"
                    | "engagement-panel-comments-section"
                    | "shorts-engagement-panel-comments-section"
            ),
            CursorClass::Replies { .. } => target_id.starts_with("comment-replies-item"),
        }
    }
}

impl fmt::Display for CursorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorClass::TopLevel => f.write_str("top-level"),
            CursorClass::Replies { thread_id } => write!(f, "replies:{thread_id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Init,
    Fetching,
    HasMore,
    Exhausted,
    Failed,
}

impl CursorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CursorState::Exhausted | CursorState::Failed)
    }
}

/// Posts one continuation request and returns the decoded response body.
pub(crate) async fn request_continuation(
    transport: &dyn Transport,
    base_url: &str,
    context: &SessionContext,
    endpoint: &ContinuationEndpoint,
) -> HarvestResult<Value> {
    let url = format!("{}{}", base_url.trim_end_matches('/'), endpoint.api_url);
    let query = vec![
        ("key".to_string(), context.api_key.clone()),
        ("prettyPrint".to_string(), "false".to_string()),
    ];
    let body = context.request_body(&endpoint.token);
    let response = check_status(transport.post_json(&url, &query, &body).await?)?;
    response.json()
}
