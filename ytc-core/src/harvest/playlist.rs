use serde_json::Value;
use tracing::info;

use crate::json_tree::{self, flatten_text};

use super::error::{HarvestError, HarvestResult};
use super::models::PlaylistEntry;
use super::page::{PageExtractor, PageFetcher};
use super::target::{watch_url, Target};

const UNKNOWN_TITLE: &str = "Unknown";

/// Expands a playlist reference into its videos, in playlist order.
pub struct PlaylistResolver {
    pages: PageFetcher,
}

impl PlaylistResolver {
    pub fn new(pages: PageFetcher) -> Self {
        Self { pages }
    }

    pub async fn resolve(&self, input: &str) -> HarvestResult<Vec<PlaylistEntry>> {
        let target = Target::parse(input)?;
        let url = target.playlist_url(self.pages.base_url()).ok_or_else(|| {
            HarvestError::InvalidTarget(format!("{input} carries no playlist reference"))
        })?;
        let html = self.pages.fetch(&url).await?;
        let entries = parse_playlist_page(&html, self.pages.extractor(), self.pages.base_url())?;
        info!(playlist = target.label(), videos = entries.len(), "playlist resolved");
        Ok(entries)
    }
}

/// Only the first served page of entries is read; longer playlists are truncated
/// to what the page embeds.
pub fn parse_playlist_page(
    html: &str,
    extractor: &PageExtractor,
    base_url: &str,
) -> HarvestResult<Vec<PlaylistEntry>> {
    let data = extractor.initial_data(html)?;
    Ok(json_tree::search_key(&data, "playlistVideoRenderer")
        .filter_map(|renderer| entry_from_renderer(renderer, base_url))
        .collect())
}

fn entry_from_renderer(renderer: &Value, base_url: &str) -> Option<PlaylistEntry> {
    let video_id = renderer
        .get("videoId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())?;
    let title = renderer
        .get("title")
        .and_then(flatten_text)
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string());
    Some(PlaylistEntry {
        video_id: video_id.to_string(),
        title,
        url: watch_url(base_url, video_id),
    })
}
