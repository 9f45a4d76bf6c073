mod continuation;
mod error;
mod error_handler;
mod metrics;
mod models;
mod normalizer;
mod page;
mod pager;
mod playlist;
mod retry;
mod session;
mod stream;
mod target;
mod transport;

pub use continuation::{ContinuationEndpoint, ContinuationState, CursorClass, CursorState, SortMode};
pub use error::{HarvestError, HarvestResult};
pub use error_handler::{report_failure, ErrorCategorizer, ErrorCategory, RemediationAction};
pub use metrics::PagerMetrics;
pub use models::{CommentRecord, PlaylistEntry, PostMetadata};
pub use normalizer::{parse_count, CommentNormalizer, EntityIndex, RawEntry, RawShape};
pub use page::{PageExtractor, PageFetcher};
pub use pager::{ContinuationPager, Page};
pub use playlist::{parse_playlist_page, PlaylistResolver};
pub use retry::{RetryOutcome, RetryPolicy};
pub use session::{Bootstrapper, Session, SessionContext};
pub use stream::{CommentHarvester, CommentStream, FetchOptions};
pub use target::{is_playlist_url, watch_url, Target};
pub use transport::{check_status, HttpResponse, ReqwestTransport, Transport};
