pub mod config;
pub mod error;
pub mod harvest;
pub mod json_tree;

pub use config::{
    load_harvester_config, ClientSection, FetchSection, HarvesterConfig, RetrySection,
};
pub use error::{ConfigError, Result};
pub use harvest::{
    CommentHarvester, CommentRecord, CommentStream, ContinuationPager, FetchOptions,
    HarvestError, HarvestResult, PlaylistEntry, PostMetadata, Session, SessionContext, SortMode,
    Target,
};
