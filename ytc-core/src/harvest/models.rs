use serde::{Deserialize, Serialize};

/// Canonical comment record handed to downstream consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: String,
    pub text: String,
    /// Platform-relative timestamp, e.g. "3 days ago".
    pub time: String,
    pub author: String,
    pub channel_id: String,
    pub votes: u64,
    pub reply_count: u64,
    /// The content creator hearted this comment.
    pub heart: bool,
    pub photo_url: String,
    /// Empty for top-level comments, the owning thread's id for replies.
    pub parent_id: String,
    pub is_reply: bool,
    /// Author is the target channel (configured, or else the video owner).
    pub author_is_target: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub video_id: String,
    pub title: String,
    pub url: String,
}

/// Header of a community post whose comments are retrieved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostMetadata {
    pub post_id: String,
    /// First 100 characters of the content, or a placeholder for image-only posts.
    pub title: String,
    pub content: String,
    pub channel_name: String,
    pub channel_id: Option<String>,
    pub channel_thumbnail: Option<String>,
    /// Largest rendition of each attached image.
    pub images: Vec<String>,
}
