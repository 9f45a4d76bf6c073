use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::config::{FetchSection, HarvesterConfig};

use super::continuation::{CursorState, SortMode};
use super::error::{HarvestError, HarvestResult};
use super::models::{CommentRecord, PlaylistEntry};
use super::normalizer::CommentNormalizer;
use super::page::PageFetcher;
use super::pager::ContinuationPager;
use super::playlist::PlaylistResolver;
use super::retry::RetryPolicy;
use super::session::{Bootstrapper, Session};
use super::target::Target;
use super::transport::{ReqwestTransport, Transport};

/// Per-call retrieval parameters.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub sort: SortMode,
    pub language: Option<String>,
    pub limit: Option<usize>,
    /// Channel whose comments are flagged `author_is_target`; defaults to the video owner.
    pub target_channel_id: Option<String>,
    pub include_replies: bool,
    pub channel_capacity: usize,
    pub page_delay: Duration,
}

impl From<&FetchSection> for FetchOptions {
    fn from(section: &FetchSection) -> Self {
        Self {
            sort: section.sort,
            language: section.language.clone(),
            limit: section.limit,
            target_channel_id: section.target_channel_id.clone(),
            include_replies: section.include_replies,
            channel_capacity: section.channel_capacity.max(1),
            page_delay: Duration::from_millis(section.page_delay_ms),
        }
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self::from(&FetchSection::default())
    }
}

/// Entry point of the engine. Cheap to clone; every retrieval call builds its own
/// session, so concurrent calls share nothing but the transport.
#[derive(Clone)]
pub struct CommentHarvester {
    transport: Arc<dyn Transport>,
    config: HarvesterConfig,
    retry: RetryPolicy,
}

impl CommentHarvester {
    pub fn new(config: HarvesterConfig) -> HarvestResult<Self> {
        config.validate()?;
        let transport = ReqwestTransport::new(&config.client)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: HarvesterConfig, transport: Arc<dyn Transport>) -> Self {
        let retry = RetryPolicy::new(config.retry.clone());
        Self {
            transport,
            config,
            retry,
        }
    }

    pub fn config(&self) -> &HarvesterConfig {
        &self.config
    }

    pub fn default_options(&self) -> FetchOptions {
        FetchOptions::from(&self.config.fetch)
    }

    fn pages(&self) -> PageFetcher {
        PageFetcher::new(
            Arc::clone(&self.transport),
            self.config.client.clone(),
            self.retry.clone(),
        )
    }

    /// Fetches the target's page and seeds a session for `sort`.
    pub async fn bootstrap(
        &self,
        input: &str,
        sort: SortMode,
        language: Option<&str>,
    ) -> HarvestResult<Session> {
        let target = Target::parse(input)?;
        Bootstrapper::new(self.pages())
            .bootstrap(&target, sort, language)
            .await
    }

    pub fn pager(&self, session: Session) -> ContinuationPager {
        ContinuationPager::new(
            Arc::clone(&self.transport),
            self.config.client.base_url.clone(),
            session,
            self.retry.clone(),
        )
    }

    pub async fn resolve_playlist(&self, input: &str) -> HarvestResult<Vec<PlaylistEntry>> {
        PlaylistResolver::new(self.pages()).resolve(input).await
    }

    /// Starts retrieval on a background task and returns the consuming end.
    /// Must be called from within a tokio runtime.
    pub fn stream_comments(&self, input: &str, options: FetchOptions) -> CommentStream {
        let (tx, rx) = mpsc::channel(options.channel_capacity.max(1));
        let limit = options.limit;
        let producer = tokio::spawn(produce(self.clone(), input.to_string(), options, tx));
        CommentStream {
            receiver: ReceiverStream::new(rx),
            producer: Some(producer),
            remaining: limit,
            done: false,
        }
    }
}

/// Lazy sequence of comment records. A failed retrieval ends with its error as
/// the last item; a finished one simply ends. Dropping the stream cancels the
/// producer at its next step boundary.
pub struct CommentStream {
    receiver: ReceiverStream<HarvestResult<CommentRecord>>,
    producer: Option<JoinHandle<()>>,
    remaining: Option<usize>,
    done: bool,
}

impl CommentStream {
    /// Cancels retrieval and waits for the producer to wind down. Any request in
    /// flight completes first; none is left pending afterwards.
    pub async fn close(mut self) -> HarvestResult<()> {
        self.receiver.close();
        self.done = true;
        if let Some(producer) = self.producer.take() {
            producer.await?;
        }
        Ok(())
    }
}

impl Stream for CommentStream {
    type Item = HarvestResult<CommentRecord>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done || this.remaining == Some(0) {
            return Poll::Ready(None);
        }
        match Pin::new(&mut this.receiver).poll_next(cx) {
            Poll::Ready(Some(Ok(record))) => {
                if let Some(remaining) = this.remaining.as_mut() {
                    *remaining -= 1;
                }
                Poll::Ready(Some(Ok(record)))
            }
            Poll::Ready(Some(Err(err))) => {
                this.done = true;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Producer side of the channel, counting down the caller's limit.
struct Emitter {
    tx: mpsc::Sender<HarvestResult<CommentRecord>>,
    remaining: Option<usize>,
}

impl Emitter {
    fn stopped(&self) -> bool {
        self.tx.is_closed() || self.remaining == Some(0)
    }

    /// Returns whether more records are wanted.
    async fn emit(&mut self, record: CommentRecord) -> bool {
        if self.stopped() || self.tx.send(Ok(record)).await.is_err() {
            return false;
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        !self.stopped()
    }

    async fn fail(&self, err: HarvestError) {
        if self.tx.send(Err(err)).await.is_err() {
            debug!("consumer gone before terminal error could be delivered");
        }
    }
}

async fn produce(
    harvester: CommentHarvester,
    input: String,
    options: FetchOptions,
    tx: mpsc::Sender<HarvestResult<CommentRecord>>,
) {
    let mut emitter = Emitter {
        tx,
        remaining: options.limit,
    };
    if let Err(err) = harvest(&harvester, &input, &options, &mut emitter).await {
        emitter.fail(err).await;
    }
}

async fn harvest(
    harvester: &CommentHarvester,
    input: &str,
    options: &FetchOptions,
    emitter: &mut Emitter,
) -> HarvestResult<()> {
    if emitter.stopped() {
        return Ok(());
    }
    let session = harvester
        .bootstrap(input, options.sort, options.language.as_deref())
        .await?;
    let target_channel = options
        .target_channel_id
        .clone()
        .or_else(|| session.context.owner_channel_id.clone());
    let normalizer = CommentNormalizer::new(target_channel);
    let mut pager = harvester.pager(session);
    let mut emitted = 0usize;

    'pages: loop {
        if emitter.stopped() {
            break;
        }
        let Some(page) = pager.next_threads().await? else {
            break;
        };

        let mut threads = Vec::new();
        for entry in &page.entries {
            let record = normalizer.normalize(entry)?;
            if let Some(seed) = entry.replies.clone() {
                threads.push((record.id.clone(), seed));
            }
            emitted += 1;
            if !emitter.emit(record).await {
                break 'pages;
            }
        }

        if options.include_replies {
            for (thread_id, seed) in threads {
                pager.open_replies(&thread_id, seed)?;
                loop {
                    if emitter.stopped() {
                        break 'pages;
                    }
                    let Some(page) = pager.next_replies(&thread_id).await? else {
                        break;
                    };
                    for entry in &page.entries {
                        emitted += 1;
                        if !emitter.emit(normalizer.normalize(entry)?).await {
                            break 'pages;
                        }
                    }
                    if pager.reply_state(&thread_id) == Some(CursorState::HasMore) {
                        pause(options.page_delay).await;
                    }
                }
            }
        }

        if pager.top_level_state() == CursorState::HasMore {
            pause(options.page_delay).await;
        }
    }

    let metrics = pager.metrics();
    info!(
        records = emitted,
        requests = metrics.requests_sent,
        retries = metrics.retries,
        pages = metrics.pages_fetched,
        reply_cursors = metrics.reply_cursors_opened,
        "comment stream finished"
    );
    Ok(())
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        sleep(delay).await;
    }
}
