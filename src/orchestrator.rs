//! Per-source scraping pipelines.
//!
//! [`ScrapeOrchestrator::scrape_source`] spawns one pipeline task per call and
//! hands back the receiving end of a bounded channel as a stream of
//! [`ScrapeEvent`]s. The pipeline suspends whenever the channel is full and
//! stops at its next emission once the stream is dropped.
//!
//! # Pipeline Flow
//!
//! ```text
//! HTML index:  index page ─▶ links ─▶ fetch + extract (N workers) ─▶ dedup ─▶ validate ─▶ emit
//! RSS:         feed ─▶ parse ─▶ entry per item ─▶ dedup ─▶ validate ─▶ emit
//! Hybrid:      RSS as above, then API pages 1..cap ─▶ entry per post ─▶ dedup ─▶ validate ─▶ emit
//! ```
//!
//! Index sources emit in completion order. Feed and API entries keep document
//! and page order. A feed that cannot be parsed or fails validation ends its
//! source; an unreachable feed on a hybrid source still leaves the API pass.

use crate::config::HarvestConfig;
use crate::dedup::EntryDeduplicator;
use crate::error::{ApiError, ScrapeError};
use crate::feed::{FeedReader, ParsedFeed};
use crate::fetch::HttpFetcher;
use crate::models::{
    BlogEntry, Channel, PipelineStage, PostMetadata, RunReport, SkipReason, SkippedItem,
    SourceSummary,
};
use crate::paginated::{ApiEndpoint, DEFAULT_PAGE_CAP, DEFAULT_PAGE_SIZE, PaginatedApiReader};
use crate::scrapers::{
    FeedStrategy, IndexStrategy, SourceDescriptor, SourceRegistry, SourceStrategy,
};
use futures::channel::mpsc;
use futures::stream::{self, BoxStream, StreamExt};
use futures::SinkExt;
use std::future::Future;
use std::pin::{Pin, pin};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

/// Scheduling knobs shared by every pipeline of one orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Concurrent post fetches for index sources.
    pub workers: usize,
    /// Delay between consecutive completions on index sources.
    pub pacing: Duration,
    pub api_page_size: u32,
    pub api_page_cap: u32,
    /// Events buffered ahead of the consumer.
    pub channel_capacity: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            pacing: Duration::from_millis(500),
            api_page_size: DEFAULT_PAGE_SIZE,
            api_page_cap: DEFAULT_PAGE_CAP,
            channel_capacity: 32,
        }
    }
}

/// What a source pipeline reports, in order.
///
/// Every pipeline ends with exactly one [`ScrapeEvent::Finished`] unless its
/// consumer hung up first.
#[derive(Debug)]
pub enum ScrapeEvent {
    Entry(BlogEntry),
    Skipped(SkippedItem),
    /// A whole channel of the source could not be read (index page, feed).
    SourceFailed { source: String, error: ScrapeError },
    Finished(SourceSummary),
}

#[derive(Debug, Clone)]
pub struct ScrapeOrchestrator {
    fetcher: Arc<HttpFetcher>,
    registry: Arc<SourceRegistry>,
    settings: OrchestratorSettings,
}

impl ScrapeOrchestrator {
    pub fn new(
        fetcher: Arc<HttpFetcher>,
        registry: Arc<SourceRegistry>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            fetcher,
            registry,
            settings,
        }
    }

    /// Registry, rate limiter, HTTP session and scheduling, all from `config`.
    ///
    /// # Errors
    ///
    /// Fails on an invalid source URL override or if the HTTP client cannot be built.
    pub fn from_config(config: &HarvestConfig) -> Result<Self, ScrapeError> {
        let registry = SourceRegistry::from_config(config)?;
        let rate_limiter = config.rate_limiter(&registry);
        let fetcher = HttpFetcher::new(config.fetch_settings(), rate_limiter)?;
        Ok(Self::new(
            Arc::new(fetcher),
            Arc::new(registry),
            config.orchestrator_settings(),
        ))
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Start the pipeline for one source.
    ///
    /// `limit` bounds discovered links for index sources and emitted entries
    /// for feed and API channels. Each call deduplicates against a fresh
    /// seen-set. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`ScrapeError::UnknownSource`] if `name` is not registered.
    pub fn scrape_source(
        &self,
        name: &str,
        limit: Option<usize>,
    ) -> Result<BoxStream<'static, ScrapeEvent>, ScrapeError> {
        self.spawn_pipeline(name, limit, SharedSeen::default())
    }

    fn spawn_pipeline(
        &self,
        name: &str,
        limit: Option<usize>,
        dedup: SharedSeen,
    ) -> Result<BoxStream<'static, ScrapeEvent>, ScrapeError> {
        let source = self
            .registry
            .get(name)
            .cloned()
            .ok_or_else(|| ScrapeError::UnknownSource(name.to_string()))?;

        let (tx, rx) = mpsc::channel(self.settings.channel_capacity.max(1));
        let pipeline = SourcePipeline {
            summary: SourceSummary {
                source: source.name.clone(),
                ..SourceSummary::default()
            },
            source,
            fetcher: Arc::clone(&self.fetcher),
            settings: self.settings.clone(),
            limit,
            dedup,
            tx,
        };
        tokio::spawn(pipeline.run());
        Ok(rx.boxed())
    }

    /// Only the entries of [`Self::scrape_source`].
    ///
    /// # Errors
    ///
    /// [`ScrapeError::UnknownSource`] if `name` is not registered.
    pub fn entries(
        &self,
        name: &str,
        limit: Option<usize>,
    ) -> Result<BoxStream<'static, BlogEntry>, ScrapeError> {
        let events = self.scrape_source(name, limit)?;
        Ok(events
            .filter_map(|event| async move {
                match event {
                    ScrapeEvent::Entry(entry) => Some(entry),
                    _ => None,
                }
            })
            .boxed())
    }

    /// Scrape `names` one after another and collect everything.
    ///
    /// All sources share one seen-set, so a URL is emitted at most once per
    /// run. An unknown or failing source is recorded in the report; it never
    /// stops the remaining sources.
    #[instrument(level = "info", skip(self))]
    pub async fn run(&self, names: &[String], limit: Option<usize>) -> RunReport {
        let mut report = RunReport::default();
        let dedup = SharedSeen::default();
        for name in names {
            let mut events = match self.spawn_pipeline(name, limit, Arc::clone(&dedup)) {
                Ok(events) => events,
                Err(e) => {
                    error!(source = %name, error = %e, "Cannot scrape source");
                    report.record_failure(name, &e);
                    continue;
                }
            };
            while let Some(event) = events.next().await {
                match event {
                    ScrapeEvent::Entry(entry) => report.entries.push(entry),
                    ScrapeEvent::Skipped(item) => report.skipped.push(item),
                    // Already carried in the summary's failures.
                    ScrapeEvent::SourceFailed { .. } => {}
                    ScrapeEvent::Finished(summary) => {
                        info!(
                            source = %summary.source,
                            attempted = summary.attempted,
                            emitted = summary.emitted,
                            skipped = summary.skipped,
                            duplicates = summary.duplicates,
                            failures = summary.failures.len(),
                            "Source finished"
                        );
                        report.sources.push(summary);
                    }
                }
            }
        }
        info!(
            attempted = report.attempted(),
            successful = report.successful(),
            skipped = report.skipped.len(),
            "Run complete"
        );
        report
    }
}

/// The consumer dropped its stream.
struct Closed;

/// Seen-set shared by the pipelines of one run.
type SharedSeen = Arc<Mutex<EntryDeduplicator>>;

/// A spawned fetch that is aborted if dropped before it completes.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Future for AbortOnDrop<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct SourcePipeline {
    source: SourceDescriptor,
    fetcher: Arc<HttpFetcher>,
    settings: OrchestratorSettings,
    limit: Option<usize>,
    dedup: SharedSeen,
    summary: SourceSummary,
    tx: mpsc::Sender<ScrapeEvent>,
}

impl SourcePipeline {
    async fn run(mut self) {
        info!(
            source = %self.source.name,
            mode = ?self.source.mode(),
            limit = ?self.limit,
            "Source pipeline starting"
        );
        let outcome = match self.source.strategy.clone() {
            SourceStrategy::Index(strategy) => self.run_index(strategy).await,
            SourceStrategy::Feed(strategy) => self.run_feed(strategy).await,
        };
        if outcome.is_err() {
            debug!(source = %self.source.name, "Consumer hung up; stopping pipeline");
            return;
        }
        self.enter(PipelineStage::Done);
        let summary = self.summary.clone();
        let _ = self.send(ScrapeEvent::Finished(summary)).await;
    }

    async fn run_index(&mut self, strategy: Arc<dyn IndexStrategy>) -> Result<(), Closed> {
        self.enter(PipelineStage::Discovering);
        let index_url = strategy.index_url().to_string();
        let index = match self.fetcher.fetch(&index_url, None).await {
            Ok(page) => page,
            Err(e) => return self.fail(e.into()).await,
        };

        let mut links = strategy.discover_links(&index.body);
        if let Some(limit) = self.limit {
            links.truncate(limit);
        }
        info!(source = %self.source.name, count = links.len(), "Discovered post links");
        if links.is_empty() {
            return Ok(());
        }

        self.enter(PipelineStage::Fetching);
        let fetcher = Arc::clone(&self.fetcher);
        let extractor = Arc::clone(&strategy);
        let mut posts = stream::iter(links)
            .map(move |url| {
                let fetcher = Arc::clone(&fetcher);
                let strategy = Arc::clone(&extractor);
                // Spawned so in-flight fetches progress while the consumer paces.
                AbortOnDrop(tokio::spawn(async move {
                    let outcome = fetcher
                        .fetch(&url, None)
                        .await
                        .map(|page| strategy.extract_metadata(&page.body, &url));
                    (url, outcome)
                }))
            })
            .buffer_unordered(self.settings.workers.max(1));

        let mut first = true;
        while let Some(joined) = posts.next().await {
            if !first && !self.settings.pacing.is_zero() {
                sleep(self.settings.pacing).await;
            }
            first = false;
            self.summary.attempted += 1;

            match joined {
                Ok((_, Ok(metadata))) => self.accept(metadata, Channel::Index).await?,
                Ok((url, Err(e))) => {
                    self.skip(
                        Some(url),
                        Channel::Index,
                        PipelineStage::Fetching,
                        SkipReason::Fetch(e),
                    )
                    .await?
                }
                Err(e) => {
                    self.skip(
                        None,
                        Channel::Index,
                        PipelineStage::Extracting,
                        SkipReason::Parse(format!("worker task failed: {e}")),
                    )
                    .await?
                }
            }
        }
        Ok(())
    }

    async fn run_feed(&mut self, strategy: Arc<dyn FeedStrategy>) -> Result<(), Closed> {
        self.enter(PipelineStage::Fetching);
        match self.read_feed(strategy.as_ref()).await {
            Ok(feed) => {
                info!(source = %self.source.name, items = feed.entries.len(), "Parsed feed");
                self.enter(PipelineStage::Extracting);
                for raw in &feed.entries {
                    if self.limit_reached() {
                        return Ok(());
                    }
                    self.summary.attempted += 1;
                    self.accept(strategy.entry_from_feed(raw), Channel::Feed).await?;
                }
            }
            Err(e) => {
                // An unreachable feed still leaves the API; an invalid one ends the source.
                let unreachable = matches!(e, ScrapeError::Fetch(_));
                self.fail(e).await?;
                if !unreachable {
                    return Ok(());
                }
            }
        }

        if let Some(endpoint) = strategy.paginated_api() {
            if !self.limit_reached() {
                self.run_api(strategy.as_ref(), endpoint.clone()).await?;
            }
        }
        Ok(())
    }

    async fn read_feed(&self, strategy: &dyn FeedStrategy) -> Result<ParsedFeed, ScrapeError> {
        let page = self.fetcher.fetch(strategy.feed_url().as_str(), None).await?;
        let feed = FeedReader::parse(&page.body)?;
        if strategy.strict_feed() {
            feed.validate()?;
        }
        Ok(feed)
    }

    async fn run_api(
        &mut self,
        strategy: &dyn FeedStrategy,
        endpoint: ApiEndpoint,
    ) -> Result<(), Closed> {
        self.enter(PipelineStage::Fetching);
        let reader = PaginatedApiReader::new(
            Arc::clone(&self.fetcher),
            endpoint,
            self.settings.api_page_size,
            self.settings.api_page_cap,
        );
        let mut pages = pin!(reader.pages());

        while let Some(page) = pages.next().await {
            match page {
                Ok(page) => {
                    for _ in 0..page.malformed {
                        self.summary.attempted += 1;
                        self.skip(
                            None,
                            Channel::Api,
                            PipelineStage::Extracting,
                            SkipReason::Parse(format!("malformed post on API page {}", page.page)),
                        )
                        .await?;
                    }
                    for post in page.posts {
                        if self.limit_reached() {
                            return Ok(());
                        }
                        self.summary.attempted += 1;
                        let metadata =
                            post.into_metadata(&self.source.name, |raw| strategy.clean_text(raw));
                        self.accept(metadata, Channel::Api).await?;
                    }
                }
                Err(ApiError::Fetch(e)) => {
                    let url = e.url().to_string();
                    self.skip(
                        Some(url),
                        Channel::Api,
                        PipelineStage::Fetching,
                        SkipReason::Fetch(e),
                    )
                    .await?;
                }
                Err(e @ ApiError::Json { .. }) => {
                    self.skip(
                        None,
                        Channel::Api,
                        PipelineStage::Extracting,
                        SkipReason::Parse(e.to_string()),
                    )
                    .await?;
                }
            }
            if self.limit_reached() {
                break;
            }
        }
        Ok(())
    }

    /// Deduplicate, validate and emit one extracted post.
    async fn accept(&mut self, metadata: PostMetadata, channel: Channel) -> Result<(), Closed> {
        let url = metadata.url.trim().to_string();
        let already_seen = !url.is_empty() && self.seen_set().seen(&url);
        if already_seen {
            self.duplicate(&url, channel);
            return Ok(());
        }

        let entry = match metadata.into_entry() {
            Ok(entry) => entry,
            Err(e) => {
                return self
                    .skip(
                        Some(url).filter(|u| !u.is_empty()),
                        channel,
                        PipelineStage::Extracting,
                        SkipReason::Validation(e),
                    )
                    .await;
            }
        };

        let first = self.seen_set().first_sighting(&entry.url);
        if !first {
            self.duplicate(&entry.url, channel);
            return Ok(());
        }
        self.enter(PipelineStage::Emitting);
        self.summary.emitted += 1;
        debug!(source = %self.source.name, url = %entry.url, ?channel, "Emitting entry");
        self.send(ScrapeEvent::Entry(entry)).await
    }

    fn duplicate(&mut self, url: &str, channel: Channel) {
        self.summary.duplicates += 1;
        debug!(source = %self.source.name, url, ?channel, "Duplicate entry suppressed");
    }

    fn seen_set(&self) -> MutexGuard<'_, EntryDeduplicator> {
        self.dedup.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn skip(
        &mut self,
        url: Option<String>,
        channel: Channel,
        stage: PipelineStage,
        reason: SkipReason,
    ) -> Result<(), Closed> {
        self.summary.skipped += 1;
        warn!(
            source = %self.source.name,
            url = url.as_deref().unwrap_or("-"),
            ?channel,
            %stage,
            reason = %reason,
            "Skipping item"
        );
        let item = SkippedItem {
            source: self.source.name.clone(),
            url,
            channel,
            stage,
            reason,
        };
        self.send(ScrapeEvent::Skipped(item)).await
    }

    async fn fail(&mut self, error: ScrapeError) -> Result<(), Closed> {
        error!(source = %self.source.name, error = %error, "Source channel failed");
        self.summary.failures.push(error.to_string());
        let source = self.source.name.clone();
        self.send(ScrapeEvent::SourceFailed { source, error }).await
    }

    async fn send(&mut self, event: ScrapeEvent) -> Result<(), Closed> {
        self.tx.send(event).await.map_err(|_| Closed)
    }

    fn enter(&self, stage: PipelineStage) {
        debug!(source = %self.source.name, %stage, "Pipeline stage");
    }

    fn limit_reached(&self) -> bool {
        self.limit.is_some_and(|limit| self.summary.emitted >= limit)
    }
}
