#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use ytc_core::harvest::{HarvestError, HarvestResult, HttpResponse, Transport};
use ytc_core::{ClientSection, FetchSection, HarvesterConfig, RetrySection};

pub const BASE_URL: &str = "https://yt.test";
pub const CONSENT_URL: &str = "https://consent.yt.test/save";
pub const NEXT_URL: &str = "https://yt.test/youtubei/v1/next";
pub const VIDEO_ID: &str = "dQw4w9WgXcQ";
pub const OWNER_CHANNEL: &str = "UCowner";
pub const POPULAR_TOKEN: &str = "popular-token";
pub const RECENT_TOKEN: &str = "recent-token";

pub fn watch_url() -> String {
    format!("{BASE_URL}/watch?v={VIDEO_ID}")
}

pub fn test_config() -> HarvesterConfig {
    HarvesterConfig {
        client: ClientSection {
            base_url: BASE_URL.to_string(),
            consent_url: CONSENT_URL.to_string(),
            ..ClientSection::default()
        },
        retry: RetrySection {
            max_attempts: 3,
            schedule_ms: vec![10, 20],
            jitter_ms: 0,
        },
        fetch: FetchSection {
            page_delay_ms: 0,
            ..FetchSection::default()
        },
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    Page { url: String, body: String },
    Json(Value),
    Status(u16),
    Timeout,
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub token: Option<String>,
    pub body: Option<Value>,
    pub params: Vec<(String, String)>,
}

/// Transport double: GET replies are scripted per URL (the last one repeats),
/// POST replies per continuation token (each consumed once).
#[derive(Default)]
pub struct ScriptedTransport {
    gets: Mutex<HashMap<String, VecDeque<Reply>>>,
    posts: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<RecordedRequest>>,
    in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn page(&self, url: &str, body: String) {
        self.get_reply(
            url,
            Reply::Page {
                url: url.to_string(),
                body,
            },
        )
        .await;
    }

    pub async fn get_reply(&self, url: &str, reply: Reply) {
        self.gets
            .lock()
            .await
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
    }

    pub async fn continuation(&self, token: &str, reply: Reply) {
        self.posts
            .lock()
            .await
            .entry(token.to_string())
            .or_default()
            .push_back(reply);
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn posted_tokens(&self) -> Vec<String> {
        self.requests()
            .await
            .into_iter()
            .filter_map(|request| request.token)
            .collect()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    async fn answer(&self, url: &str, reply: Option<Reply>) -> HarvestResult<HttpResponse> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match reply {
            Some(Reply::Page { url, body }) => Ok(HttpResponse {
                status: 200,
                url,
                body,
            }),
            Some(Reply::Json(value)) => Ok(HttpResponse {
                status: 200,
                url: url.to_string(),
                body: value.to_string(),
            }),
            Some(Reply::Status(status)) => Ok(HttpResponse {
                status,
                url: url.to_string(),
                body: String::new(),
            }),
            Some(Reply::Timeout) => Err(HarvestError::Timeout(url.to_string())),
            None => Ok(HttpResponse {
                status: 404,
                url: url.to_string(),
                body: String::new(),
            }),
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str) -> HarvestResult<HttpResponse> {
        self.requests.lock().await.push(RecordedRequest {
            method: "GET",
            url: url.to_string(),
            token: None,
            body: None,
            params: Vec::new(),
        });
        let reply = {
            let mut gets = self.gets.lock().await;
            gets.get_mut(url).and_then(|queue| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            })
        };
        self.answer(url, reply).await
    }

    async fn post_params(
        &self,
        url: &str,
        params: &[(String, String)],
    ) -> HarvestResult<HttpResponse> {
        self.requests.lock().await.push(RecordedRequest {
            method: "POST",
            url: url.to_string(),
            token: None,
            body: None,
            params: params.to_vec(),
        });
        let reply = {
            let mut gets = self.gets.lock().await;
            gets.get_mut(url).and_then(|queue| queue.front().cloned())
        };
        self.answer(url, reply).await
    }

    async fn post_json(
        &self,
        url: &str,
        query: &[(String, String)],
        body: &Value,
    ) -> HarvestResult<HttpResponse> {
        let token = body["continuation"].as_str().unwrap_or_default().to_string();
        self.requests.lock().await.push(RecordedRequest {
            method: "POST",
            url: url.to_string(),
            token: Some(token.clone()),
            body: Some(body.clone()),
            params: query.to_vec(),
        });
        let reply = {
            let mut posts = self.posts.lock().await;
            posts.get_mut(&token).and_then(VecDeque::pop_front)
        };
        self.answer(url, reply).await
    }
}

pub fn endpoint(token: &str) -> Value {
    json!({
        "clickTrackingParams": "CAAQ",
        "commandMetadata": {"webCommandMetadata": {
            "sendPost": true,
            "apiUrl": "/youtubei/v1/next"
        }},
        "continuationCommand": {"token": token, "request": "CONTINUATION_REQUEST_TYPE_WATCH_NEXT"}
    })
}

pub fn sort_menu() -> Value {
    json!({"sortFilterSubMenuRenderer": {"subMenuItems": [
        {"title": "Top comments", "selected": true, "serviceEndpoint": endpoint(POPULAR_TOKEN)},
        {"title": "Newest first", "selected": false, "serviceEndpoint": endpoint(RECENT_TOKEN)}
    ]}})
}

pub fn client_config() -> Value {
    json!({
        "INNERTUBE_API_KEY": "AIza-test-key",
        "INNERTUBE_CONTEXT": {"client": {
            "hl": "en",
            "gl": "US",
            "clientName": "WEB",
            "clientVersion": "2.20240101.00.00",
            "visitorData": "CgtWaXNpdG9y"
        }},
        "INNERTUBE_CLIENT_NAME": "WEB"
    })
}

/// Watch page data with the owner, the comment section entry point and the
/// sort menu.
pub fn initial_data() -> Value {
    let section_header = json!({"commentsHeaderRenderer": {"sortMenu": sort_menu()}});
    json!({
        "contents": {"twoColumnWatchNextResults": {
            "results": {"results": {"contents": [
                {"videoPrimaryInfoRenderer": {"title": {"runs": [{"text": "Fixture"}]}}},
                {"videoSecondaryInfoRenderer": {"owner": {"videoOwnerRenderer": {
                    "title": {"runs": [{"text": "Owner"}]},
                    "navigationEndpoint": {"browseEndpoint": {"browseId": OWNER_CHANNEL}}
                }}}},
                {"itemSectionRenderer": {
                    "sectionIdentifier": "comment-item-section",
                    "contents": [
                        section_header,
                        {"continuationItemRenderer": {
                            "trigger": "CONTINUATION_TRIGGER_ON_ITEM_SHOWN",
                            "continuationEndpoint": endpoint("section-token")
                        }}
                    ]
                }}
            ]}},
            "secondaryResults": {"secondaryResults": {"results": []}}
        }}
    })
}

pub fn html_page(config: &Value, data: &Value) -> String {
    format!(
        "<!DOCTYPE html><html><head><script>ytcfg.set({config});</script></head>\
         <body><script>var ytInitialData = {data};</script></body></html>"
    )
}

pub fn watch_page() -> String {
    html_page(&client_config(), &initial_data())
}

pub async fn serve_watch_page(transport: &ScriptedTransport) {
    transport.page(&watch_url(), watch_page()).await;
}

pub fn comment(id: &str, author_channel: &str) -> Value {
    json!({"commentRenderer": {
        "authorText": {"simpleText": format!("@{author_channel}")},
        "authorThumbnail": {"thumbnails": [{"url": format!("https://yt3.test/{author_channel}.jpg")}]},
        "authorEndpoint": {"browseEndpoint": {"browseId": author_channel}},
        "contentText": {"runs": [{"text": format!("comment {id}")}]},
        "publishedTimeText": {"runs": [{"text": "2 days ago"}]},
        "commentId": id,
        "voteCount": {"simpleText": "12"},
        "replyCount": 0,
        "actionButtons": {"commentActionButtonsRenderer": {}}
    }})
}

pub fn thread(id: &str, replies_token: Option<&str>) -> Value {
    let mut thread = json!({
        "comment": comment(id, "UCviewer"),
        "isModeratedElqComment": false
    });
    if let Some(token) = replies_token {
        thread["replies"] = json!({"commentRepliesRenderer": {"contents": [
            {"continuationItemRenderer": {
                "trigger": "CONTINUATION_TRIGGER_ON_ITEM_SHOWN",
                "continuationEndpoint": endpoint(token)
            }}
        ]}});
    }
    json!({"commentThreadRenderer": thread})
}

pub fn threads_response(items: Vec<Value>, next: Option<&str>) -> Value {
    let mut items = items;
    if let Some(token) = next {
        items.push(json!({"continuationItemRenderer": {
            "trigger": "CONTINUATION_TRIGGER_ON_ITEM_SHOWN",
            "continuationEndpoint": endpoint(token)
        }}));
    }
    json!({
        "responseContext": {"visitorData": "CgtWaXNpdG9y"},
        "onResponseReceivedEndpoints": [
            {"appendContinuationItemsAction": {
                "targetId": "comments-section",
                "continuationItems": items
            }}
        ]
    })
}

pub fn replies_response(thread_id: &str, reply_ids: &[&str], next: Option<&str>) -> Value {
    let mut items: Vec<Value> = reply_ids
        .iter()
        .map(|id| comment(id, "UCreplier"))
        .collect();
    if let Some(token) = next {
        items.push(json!({"continuationItemRenderer": {
            "button": {"buttonRenderer": {
                "text": {"runs": [{"text": "Show more replies"}]},
                "command": endpoint(token)
            }}
        }}));
    }
    json!({
        "responseContext": {},
        "onResponseReceivedEndpoints": [
            {"appendContinuationItemsAction": {
                "targetId": format!("comment-replies-item-{thread_id}"),
                "continuationItems": items
            }}
        ]
    })
}

pub fn thread_ids(prefix: &str, count: usize) -> Vec<Value> {
    (0..count)
        .map(|index| thread(&format!("{prefix}{index}"), None))
        .collect()
}
