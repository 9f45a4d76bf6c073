use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::json_tree::{self, flatten_text};

use super::continuation::ContinuationEndpoint;
use super::error::{HarvestError, HarvestResult};
use super::models::CommentRecord;

const HEARTED_STATE: &str = "TOOLBAR_HEART_STATE_HEARTED";

/// Entity payloads of one response, keyed by entity key. Newer responses keep the
/// comment body and its toolbar state here and reference them from view models.
#[derive(Debug, Clone, Default)]
pub struct EntityIndex {
    comments: HashMap<String, Value>,
    toolbar_states: HashMap<String, Value>,
}

impl EntityIndex {
    pub fn from_response(response: &Value) -> Self {
        let mut index = EntityIndex::default();
        let payloads = json_tree::find_all(response, |key, _| {
            key == "commentEntityPayload" || key == "engagementToolbarStateEntityPayload"
        });
        for payload in payloads {
            let Some(key) = payload.get("key").and_then(Value::as_str) else {
                continue;
            };
            if payload.get("properties").is_some() {
                index.comments.insert(key.to_string(), payload.clone());
            } else {
                index.toolbar_states.insert(key.to_string(), payload.clone());
            }
        }
        index
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty() && self.toolbar_states.is_empty()
    }

    pub fn comment(&self, key: &str) -> Option<&Value> {
        self.comments.get(key)
    }

    pub fn toolbar_state(&self, key: &str) -> Option<&Value> {
        self.toolbar_states.get(key)
    }
}

/// The two observed upstream encodings of one comment.
#[derive(Debug, Clone)]
pub enum RawShape {
    /// Self-contained `commentRenderer` object.
    Renderer(Value),
    /// `commentViewModel` whose data lives in the response's entity payloads.
    Entity {
        view_model: Value,
        entities: Arc<EntityIndex>,
    },
}

/// One comment as received, before normalization.
#[derive(Debug, Clone)]
pub struct RawEntry {
    pub shape: RawShape,
    /// Owning thread id for replies.
    pub parent_id: Option<String>,
    /// Seed of this thread's reply cursor, present on top-level entries with replies.
    pub replies: Option<ContinuationEndpoint>,
}

impl RawEntry {
    /// Builds an entry from a `continuationItems` element, or `None` when the item
    /// is not a comment (headers, spinners, continuation buttons).
    pub fn from_item(item: &Value, parent_id: Option<&str>, entities: &Arc<EntityIndex>) -> Option<Self> {
        let (body, replies) = match item.get("commentThreadRenderer") {
            Some(thread) => {
                let replies = thread.get("replies").and_then(|replies| {
                    json_tree::first_key(replies, "continuationEndpoint")
                        .and_then(ContinuationEndpoint::from_value)
                        .or_else(|| {
                            json_tree::first_key(replies, "buttonRenderer")
                                .and_then(|button| button.get("command"))
                                .and_then(ContinuationEndpoint::from_value)
                        })
                });
                (thread, replies)
            }
            None => (item, None),
        };

        let shape = if let Some(renderer) = body
            .get("comment")
            .and_then(|comment| comment.get("commentRenderer"))
            .or_else(|| body.get("commentRenderer"))
        {
            RawShape::Renderer(renderer.clone())
        } else {
            let view_model = body.get("commentViewModel")?;
            let view_model = view_model.get("commentViewModel").unwrap_or(view_model);
            RawShape::Entity {
                view_model: view_model.clone(),
                entities: Arc::clone(entities),
            }
        };

        Some(Self {
            shape,
            parent_id: parent_id.map(str::to_string),
            replies,
        })
    }
}

/// Maps raw entries of either shape onto [`CommentRecord`].
#[derive(Debug, Clone, Default)]
pub struct CommentNormalizer {
    target_channel_id: Option<String>,
}

impl CommentNormalizer {
    pub fn new(target_channel_id: Option<String>) -> Self {
        Self {
            target_channel_id: target_channel_id.filter(|id| !id.is_empty()),
        }
    }

    pub fn normalize(&self, entry: &RawEntry) -> HarvestResult<CommentRecord> {
        let mut record = match &entry.shape {
            RawShape::Renderer(renderer) => from_renderer(renderer)?,
            RawShape::Entity {
                view_model,
                entities,
            } => from_entities(view_model, entities)?,
        };
        if let Some(parent_id) = &entry.parent_id {
            record.parent_id = parent_id.clone();
        }
        record.is_reply = !record.parent_id.is_empty();
        record.author_is_target = self
            .target_channel_id
            .as_deref()
            .is_some_and(|target| target == record.channel_id);
        Ok(record)
    }
}

fn from_renderer(renderer: &Value) -> HarvestResult<CommentRecord> {
    let id = str_at(renderer, "/commentId")
        .ok_or_else(|| HarvestError::Parse("commentRenderer without commentId".to_string()))?;
    let photo_url = renderer
        .pointer("/authorThumbnail/thumbnails")
        .and_then(Value::as_array)
        .and_then(|thumbnails| thumbnails.last())
        .and_then(|thumbnail| str_at(thumbnail, "/url"))
        .unwrap_or_default();

    Ok(CommentRecord {
        id,
        text: text_at(renderer, "contentText"),
        time: text_at(renderer, "publishedTimeText"),
        author: text_at(renderer, "authorText"),
        channel_id: str_at(renderer, "/authorEndpoint/browseEndpoint/browseId").unwrap_or_default(),
        votes: count_at(renderer.get("voteCount")),
        reply_count: count_at(renderer.get("replyCount")),
        heart: renderer_hearted(renderer),
        photo_url,
        ..CommentRecord::default()
    })
}

fn from_entities(view_model: &Value, entities: &EntityIndex) -> HarvestResult<CommentRecord> {
    let comment_key = str_at(view_model, "/commentKey")
        .ok_or_else(|| HarvestError::Parse("commentViewModel without commentKey".to_string()))?;
    let payload = entities.comment(&comment_key).ok_or_else(|| {
        HarvestError::Parse(format!("comment entity {comment_key} missing from response"))
    })?;
    let properties = payload
        .get("properties")
        .ok_or_else(|| HarvestError::Parse("comment entity without properties".to_string()))?;

    let id = str_at(properties, "/commentId")
        .or_else(|| str_at(view_model, "/commentId"))
        .ok_or_else(|| HarvestError::Parse("comment entity without commentId".to_string()))?;
    let toolbar_key =
        str_at(view_model, "/toolbarStateKey").or_else(|| str_at(properties, "/toolbarStateKey"));
    let heart = toolbar_key
        .and_then(|key| entities.toolbar_state(&key))
        .and_then(|state| state.get("heartState"))
        .and_then(Value::as_str)
        == Some(HEARTED_STATE);

    Ok(CommentRecord {
        id,
        text: str_at(properties, "/content/content").unwrap_or_default(),
        time: str_at(properties, "/publishedTime").unwrap_or_default(),
        author: str_at(payload, "/author/displayName").unwrap_or_default(),
        channel_id: str_at(payload, "/author/channelId").unwrap_or_default(),
        votes: count_at(payload.pointer("/toolbar/likeCountNotliked")),
        reply_count: count_at(payload.pointer("/toolbar/replyCount")),
        heart,
        photo_url: str_at(payload, "/author/avatarThumbnailUrl").unwrap_or_default(),
        ..CommentRecord::default()
    })
}

/// Creator hearts sit in the renderer's action-button toolbar.
fn renderer_hearted(renderer: &Value) -> bool {
    renderer
        .get("actionButtons")
        .and_then(|toolbar| json_tree::first_key(toolbar, "creatorHeartRenderer"))
        .is_some_and(|heart| heart.get("isHearted").and_then(Value::as_bool) != Some(false))
}

fn str_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn text_at(value: &Value, key: &str) -> String {
    value.get(key).and_then(flatten_text).unwrap_or_default()
}

fn count_at(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(number)) => number.as_u64().unwrap_or_default(),
        Some(other) => flatten_text(other)
            .map(|text| parse_count(&text))
            .unwrap_or_default(),
        None => 0,
    }
}

/// Parses vote and reply counts as displayed upstream: `"1,234"`, `"1.2K"`,
/// `"3M"`, `" "`. Unparseable text counts as zero.
pub fn parse_count(text: &str) -> u64 {
    let compact: String = text
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();
    if compact.is_empty() {
        return 0;
    }
    let (digits, multiplier) = match compact.chars().last() {
        Some('K' | 'k') => (&compact[..compact.len() - 1], 1_000.0),
        Some('M' | 'm') => (&compact[..compact.len() - 1], 1_000_000.0),
        Some('B' | 'b') => (&compact[..compact.len() - 1], 1_000_000_000.0),
        _ => (compact.as_str(), 1.0),
    };
    digits
        .parse::<f64>()
        .map(|value| (value * multiplier).round() as u64)
        .unwrap_or_default()
}
