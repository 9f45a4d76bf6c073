use url::Url;

use super::error::{HarvestError, HarvestResult};

const VIDEO_ID_LEN: usize = 11;

/// What an input string refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Video {
        video_id: String,
    },
    Playlist {
        playlist_id: String,
        video_id: Option<String>,
    },
    Post {
        post_id: String,
    },
}

impl Target {
    /// Accepts a bare video id or any watch, short-link, shorts, embed, live,
    /// playlist or community-post URL.
    pub fn parse(input: &str) -> HarvestResult<Self> {
        let input = input.trim();
        if is_video_id(input) {
            return Ok(Target::Video {
                video_id: input.to_string(),
            });
        }

        let url = parse_url(input)
            .ok_or_else(|| HarvestError::InvalidTarget(format!("not a video id or url: {input}")))?;
        let host = url.host_str().unwrap_or_default().to_lowercase();
        let short_host = host == "youtu.be";
        if !short_host && !host.ends_with("youtube.com") && !host.ends_with("youtube-nocookie.com") {
            return Err(HarvestError::InvalidTarget(format!(
                "unsupported host: {host}"
            )));
        }

        let query_value = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
                .filter(|value| !value.is_empty())
        };
        let segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.filter(|segment| !segment.is_empty()).collect())
            .unwrap_or_default();

        let video_id = if short_host {
            segments.first().map(|segment| segment.to_string())
        } else {
            match segments.as_slice() {
                ["watch", ..] => query_value("v"),
                ["shorts" | "embed" | "live" | "v", id, ..] => Some(id.to_string()),
                _ => None,
            }
        }
        .filter(|id| is_video_id(id));

        if let Some(playlist_id) = query_value("list") {
            return Ok(Target::Playlist {
                playlist_id,
                video_id,
            });
        }
        if let Some(video_id) = video_id {
            return Ok(Target::Video { video_id });
        }
        if let ["post", post_id, ..] = segments.as_slice() {
            return Ok(Target::Post {
                post_id: post_id.to_string(),
            });
        }
        Err(HarvestError::InvalidTarget(format!(
            "no video, playlist or post reference in {input}"
        )))
    }

    pub fn video_id(&self) -> Option<&str> {
        match self {
            Target::Video { video_id } => Some(video_id),
            Target::Playlist { video_id, .. } => video_id.as_deref(),
            Target::Post { .. } => None,
        }
    }

    /// Page whose embedded configuration seeds a comment session.
    pub fn comments_page_url(&self, base_url: &str) -> Option<String> {
        let base = base_url.trim_end_matches('/');
        match self {
            Target::Post { post_id } => Some(format!("{base}/post/{post_id}")),
            _ => self
                .video_id()
                .map(|video_id| format!("{base}/watch?v={video_id}")),
        }
    }

    pub fn playlist_url(&self, base_url: &str) -> Option<String> {
        match self {
            Target::Playlist { playlist_id, .. } => Some(format!(
                "{}/playlist?list={playlist_id}",
                base_url.trim_end_matches('/')
            )),
            _ => None,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Target::Video { video_id } => video_id,
            Target::Playlist { playlist_id, .. } => playlist_id,
            Target::Post { post_id } => post_id,
        }
    }
}

pub fn is_playlist_url(input: &str) -> bool {
    matches!(Target::parse(input), Ok(Target::Playlist { .. }))
}

pub fn watch_url(base_url: &str, video_id: &str) -> String {
    format!("{}/watch?v={video_id}", base_url.trim_end_matches('/'))
}

fn is_video_id(candidate: &str) -> bool {
    candidate.len() == VIDEO_ID_LEN
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn parse_url(input: &str) -> Option<Url> {
    Url::parse(input)
        .ok()
        .filter(|url| url.has_host())
        .or_else(|| Url::parse(&format!("https://{input}")).ok())
}
