use serde_json::{json, Value};
use tracing::{debug, info};

use crate::json_tree::{self, flatten_text};

use super::continuation::{request_continuation, ContinuationEndpoint, ContinuationState, SortMode};
use super::error::{HarvestError, HarvestResult};
use super::models::PostMetadata;
use super::page::PageFetcher;
use super::target::Target;

const POST_TITLE_CHARS: usize = 100;
const POST_TITLE_FALLBACK: &str = "Community Post";

/// Client identity extracted from a page's embedded configuration. Lives only in
/// memory for one retrieval session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub api_key: String,
    pub client_name: String,
    pub client_version: String,
    pub visitor_data: Option<String>,
    pub language: Option<String>,
    /// Channel that owns the video, when the page exposes it.
    pub owner_channel_id: Option<String>,
    innertube_context: Value,
}

impl SessionContext {
    pub fn from_client_config(config: &Value, language: Option<&str>) -> HarvestResult<Self> {
        let api_key = config
            .get("INNERTUBE_API_KEY")
            .and_then(Value::as_str)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| HarvestError::Parse("INNERTUBE_API_KEY missing".to_string()))?
            .to_string();
        let mut innertube_context = config
            .get("INNERTUBE_CONTEXT")
            .filter(|context| context.is_object())
            .cloned()
            .ok_or_else(|| HarvestError::Parse("INNERTUBE_CONTEXT missing".to_string()))?;

        if let Some(language) = language {
            if let Some(client) = innertube_context
                .get_mut("client")
                .and_then(Value::as_object_mut)
            {
                client.insert("hl".to_string(), Value::String(language.to_string()));
            }
        }

        let client = innertube_context.get("client");
        let client_field = |name: &str| {
            client
                .and_then(|client| client.get(name))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let client_name = client_field("clientName")
            .or_else(|| {
                config
                    .get("INNERTUBE_CLIENT_NAME")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_default();
        let client_version = client_field("clientVersion")
            .or_else(|| {
                config
                    .get("INNERTUBE_CLIENT_VERSION")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_default();
        let visitor_data = client_field("visitorData").or_else(|| {
            config
                .get("VISITOR_DATA")
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        let language = client_field("hl");

        Ok(Self {
            api_key,
            client_name,
            client_version,
            visitor_data,
            language,
            owner_channel_id: None,
            innertube_context,
        })
    }

    pub fn request_body(&self, token: &str) -> Value {
        json!({
            "context": self.innertube_context,
            "continuation": token,
        })
    }
}

/// A bootstrapped session: the client context plus the token seeding the
/// top-level cursor for the chosen sort mode.
#[derive(Debug, Clone)]
pub struct Session {
    pub target: Target,
    pub context: SessionContext,
    pub sort: SortMode,
    pub seed: ContinuationState,
    /// Header of the commented community post; `None` for videos.
    pub post: Option<PostMetadata>,
}

pub struct Bootstrapper {
    pages: PageFetcher,
}

impl Bootstrapper {
    pub fn new(pages: PageFetcher) -> Self {
        Self { pages }
    }

    pub async fn bootstrap(
        &self,
        target: &Target,
        sort: SortMode,
        language: Option<&str>,
    ) -> HarvestResult<Session> {
        let url = target
            .comments_page_url(self.pages.base_url())
            .ok_or_else(|| {
                HarvestError::InvalidTarget(format!(
                    "{} does not reference a single video or post",
                    target.label()
                ))
            })?;
        let html = self.pages.fetch(&url).await?;
        let extractor = self.pages.extractor();

        let client_config = extractor.client_config(&html)?;
        let mut context = SessionContext::from_client_config(&client_config, language)?;
        let data = extractor.initial_data(&html)?;
        context.owner_channel_id = owner_channel_id(&data);

        let section = comment_entry_point(&data).ok_or_else(|| {
            HarvestError::NotFound(format!(
                "comments unavailable for {} (missing, disabled or gated)",
                target.label()
            ))
        })?;

        let post = match target {
            Target::Post { post_id } => post_metadata(&data, post_id),
            _ => None,
        };
        let endpoint = match target {
            Target::Post { .. } => {
                debug!(post = target.label(), sort = %sort, "posts expose no sort menu");
                ContinuationEndpoint::from_item_renderer(section).ok_or_else(|| {
                    HarvestError::Parse("post comment section carries no continuation".into())
                })?
            }
            _ => self.sorted_endpoint(&data, &context, sort).await?,
        };

        info!(
            video = target.label(),
            sort = %sort,
            client_version = %context.client_version,
            "session bootstrapped"
        );
        Ok(Session {
            target: target.clone(),
            seed: ContinuationState {
                endpoint,
                sort,
                language: context.language.clone(),
            },
            context,
            sort,
            post,
        })
    }

    async fn sorted_endpoint(
        &self,
        data: &Value,
        context: &SessionContext,
        sort: SortMode,
    ) -> HarvestResult<ContinuationEndpoint> {
        let mut menu = sort_menu(data);
        if menu.is_empty() {
            // Some layouts only ship the sort menu with the first section continuation.
            let section_list = json_tree::first_key(data, "sectionListRenderer");
            if let Some(endpoint) = section_list
                .and_then(|list| json_tree::first_key(list, "continuationEndpoint"))
                .and_then(ContinuationEndpoint::from_value)
            {
                debug!("sort menu absent from page, requesting section continuation");
                let transport = self.pages.transport().as_ref();
                let base_url = self.pages.base_url();
                let endpoint = &endpoint;
                let response = self
                    .pages
                    .retry()
                    .run("sort-menu", |_| async move {
                        request_continuation(transport, base_url, context, endpoint).await
                    })
                    .await?
                    .result;
                menu = sort_menu(&response);
            }
        }

        menu.get(sort.menu_index())
            .and_then(|item| item.get("serviceEndpoint"))
            .and_then(ContinuationEndpoint::from_value)
            .ok_or_else(|| {
                HarvestError::Parse(format!("sort menu entry for {sort} not found"))
            })
    }
}

fn sort_menu(data: &Value) -> Vec<Value> {
    json_tree::first_key(data, "sortFilterSubMenuRenderer")
        .and_then(|menu| menu.get("subMenuItems"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// The `continuationItemRenderer` opening the comment section. A section tagged
/// as the comment section is authoritative: without a continuation the comments
/// are off. Untagged layouts use the first item section.
fn comment_entry_point(data: &Value) -> Option<&Value> {
    let section = json_tree::search_key(data, "itemSectionRenderer")
        .find(|section| {
            section.get("sectionIdentifier").and_then(Value::as_str)
                == Some("comment-item-section")
        })
        .or_else(|| json_tree::first_key(data, "itemSectionRenderer"))?;
    json_tree::first_key(section, "continuationItemRenderer")
}

/// Community post header: text, author and attached images.
fn post_metadata(data: &Value, post_id: &str) -> Option<PostMetadata> {
    let renderer = json_tree::first_key(data, "backstagePostRenderer")?;
    let content = renderer
        .get("contentText")
        .and_then(flatten_text)
        .unwrap_or_default();
    let title = if content.is_empty() {
        POST_TITLE_FALLBACK.to_string()
    } else {
        content.chars().take(POST_TITLE_CHARS).collect()
    };
    let images = renderer
        .get("backstageAttachment")
        .map(|attachment| {
            json_tree::search_key(attachment, "backstageImageRenderer")
                .filter_map(|image| last_thumbnail(image.get("image")?))
                .collect()
        })
        .unwrap_or_default();

    Some(PostMetadata {
        post_id: post_id.to_string(),
        title,
        content,
        channel_name: renderer
            .get("authorText")
            .and_then(flatten_text)
            .unwrap_or_default(),
        channel_id: renderer
            .pointer("/authorEndpoint/browseEndpoint/browseId")
            .and_then(Value::as_str)
            .map(str::to_string),
        channel_thumbnail: renderer.get("authorThumbnail").and_then(last_thumbnail),
        images,
    })
}

fn last_thumbnail(image: &Value) -> Option<String> {
    image
        .get("thumbnails")
        .and_then(Value::as_array)
        .and_then(|thumbnails| thumbnails.last())
        .and_then(|thumbnail| thumbnail.get("url"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn owner_channel_id(data: &Value) -> Option<String> {
    json_tree::first_key(data, "videoOwnerRenderer")
        .and_then(|owner| json_tree::first_key(owner, "browseId"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_config() -> Value {
        json!({
            "INNERTUBE_API_KEY": "AIza-test",
            "INNERTUBE_CONTEXT": {
                "client": {
                    "hl": "en",
                    "clientName": "WEB",
                    "clientVersion": "2.20240101.00.00",
                    "visitorData": "CgtWaXNpdG9y"
                }
            }
        })
    }

    #[test]
    fn context_reads_client_identity() {
        let context = SessionContext::from_client_config(&client_config(), None).unwrap();
        assert_eq!(context.api_key, "AIza-test");
        assert_eq!(context.client_name, "WEB");
        assert_eq!(context.client_version, "2.20240101.00.00");
        assert_eq!(context.visitor_data.as_deref(), Some("CgtWaXNpdG9y"));
        assert_eq!(context.language.as_deref(), Some("en"));
    }

    #[test]
    fn language_override_lands_in_request_body() {
        let context = SessionContext::from_client_config(&client_config(), Some("de")).unwrap();
        let body = context.request_body("tok");
        assert_eq!(body["context"]["client"]["hl"], "de");
        assert_eq!(body["continuation"], "tok");
        assert_eq!(context.language.as_deref(), Some("de"));
    }

    #[test]
    fn missing_api_key_is_format_drift() {
        let config = json!({"INNERTUBE_CONTEXT": {"client": {}}});
        assert!(matches!(
            SessionContext::from_client_config(&config, None),
            Err(HarvestError::Parse(_))
        ));
    }

    #[test]
    fn tagged_comment_section_wins() {
        let data = json!({
            "a": {"itemSectionRenderer": {"contents": [
                {"continuationItemRenderer": {"id": "related"}}
            ]}},
            "b": {"itemSectionRenderer": {
                "sectionIdentifier": "comment-item-section",
                "contents": [{"continuationItemRenderer": {"id": "comments"}}]
            }}
        });
        assert_eq!(comment_entry_point(&data).unwrap()["id"], "comments");
        assert!(comment_entry_point(&json!({"contents": []})).is_none());
    }

    #[test]
    fn tagged_section_without_continuation_is_not_replaced() {
        let data = json!({
            "results": {"itemSectionRenderer": {
                "sectionIdentifier": "comment-item-section",
                "contents": [{"messageRenderer": {"text": {"simpleText": "Comments are turned off."}}}]
            }},
            "secondaryResults": {"itemSectionRenderer": {
                "sectionIdentifier": "watch-next-feed",
                "contents": [{"continuationItemRenderer": {"id": "related"}}]
            }}
        });
        assert!(comment_entry_point(&data).is_none());
    }

    #[test]
    fn untagged_layout_uses_first_section_only() {
        let data = json!({
            "a": {"itemSectionRenderer": {"contents": [{"messageRenderer": {}}]}},
            "b": {"itemSectionRenderer": {"contents": [{"continuationItemRenderer": {"id": "later"}}]}}
        });
        assert!(comment_entry_point(&data).is_none());
    }

    #[test]
    fn post_header_is_extracted() {
        let data = json!({"contents": {"backstagePostThreadRenderer": {"post": {
            "backstagePostRenderer": {
                "postId": "UgkxPost",
                "authorText": {"runs": [{"text": "Channel Name"}]},
                "authorEndpoint": {"browseEndpoint": {"browseId": "UCposter"}},
                "authorThumbnail": {"thumbnails": [{"url": "s.jpg"}, {"url": "l.jpg"}]},
                "contentText": {"runs": [{"text": "New video "}, {"text": "tomorrow"}]},
                "backstageAttachment": {"postMultiImageRenderer": {"images": [
                    {"backstageImageRenderer": {"image": {"thumbnails": [{"url": "a1.jpg"}, {"url": "a2.jpg"}]}}},
                    {"backstageImageRenderer": {"image": {"thumbnails": [{"url": "b1.jpg"}]}}}
                ]}}
            }
        }}}});
        let post = post_metadata(&data, "UgkxPost").unwrap();
        assert_eq!(post.post_id, "UgkxPost");
        assert_eq!(post.content, "New video tomorrow");
        assert_eq!(post.title, "New video tomorrow");
        assert_eq!(post.channel_name, "Channel Name");
        assert_eq!(post.channel_id.as_deref(), Some("UCposter"));
        assert_eq!(post.channel_thumbnail.as_deref(), Some("l.jpg"));
        assert_eq!(post.images, ["a2.jpg", "b1.jpg"]);
    }

    #[test]
    fn post_without_text_gets_placeholder_title() {
        let long = "x".repeat(150);
        let data = json!({"backstagePostRenderer": {"contentText": {"runs": [{"text": long}]}}});
        assert_eq!(post_metadata(&data, "p").unwrap().title.len(), 100);

        let data = json!({"backstagePostRenderer": {"authorText": {"simpleText": "c"}}});
        let post = post_metadata(&data, "p").unwrap();
        assert_eq!(post.title, "Community Post");
        assert!(post.images.is_empty());
        assert!(post_metadata(&json!({"contents": {}}), "p").is_none());
    }
}
