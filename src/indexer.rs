//! Background crawl of every indexable channel the bot can see.
//!
//! A sweep walks servers concurrently (bounded by a semaphore) and the
//! channels of one server sequentially. Each channel pass is
//! fetch → privacy filter → normalize → correlate → commit, and the channel's
//! watermark only moves once the commit transaction has gone through.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serenity::model::id::{ChannelId, MessageId};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::correlate::correlate_solutions;
use crate::db::{ChannelCommit, Database};
use crate::error::{IndexError, PlatformError};
use crate::fetcher::{fetch_channel_messages, FetchOptions};
use crate::model::{ChannelRecord, RawChannel, RawServer, ServerRecord};
use crate::normalize::normalize_messages;
use crate::platform::ChatPlatform;
use crate::privacy;
use crate::settings::ChannelSettings;

#[derive(Debug, Clone)]
pub struct IndexerOptions {
    pub interval: Duration,
    pub max_concurrent_servers: usize,
    /// Per-channel cap on fetched messages.
    pub message_limit: Option<usize>,
}

impl IndexerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.indexing_interval,
            max_concurrent_servers: config.indexing_max_concurrent_servers.max(1),
            message_limit: config.indexing_message_limit,
        }
    }
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(6 * 60 * 60),
            max_concurrent_servers: 2,
            message_limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    UnsupportedKind,
    IndexingDisabled,
    /// Another pass over the same channel is still running.
    InFlight,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutcome {
    Indexed {
        messages: usize,
        /// `None` when the pass only caught up on unfinished threads.
        watermark: Option<MessageId>,
    },
    /// Nothing newer than the watermark.
    UpToDate,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub servers: usize,
    pub indexed_channels: usize,
    pub up_to_date_channels: usize,
    pub skipped_channels: usize,
    pub failed_channels: usize,
    pub failed_servers: usize,
    pub messages: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: &Result<ChannelOutcome, IndexError>) {
        match outcome {
            Ok(ChannelOutcome::Indexed { messages, .. }) => {
                self.indexed_channels += 1;
                self.messages += messages;
            }
            Ok(ChannelOutcome::UpToDate) => self.up_to_date_channels += 1,
            Ok(ChannelOutcome::Skipped(_)) => self.skipped_channels += 1,
            Err(_) => self.failed_channels += 1,
        }
    }

    fn merge(&mut self, other: SweepReport) {
        self.servers += other.servers;
        self.indexed_channels += other.indexed_channels;
        self.up_to_date_channels += other.up_to_date_channels;
        self.skipped_channels += other.skipped_channels;
        self.failed_channels += other.failed_channels;
        self.failed_servers += other.failed_servers;
        self.messages += other.messages;
    }
}

pub struct Indexer<P: ChatPlatform> {
    platform: Arc<P>,
    db: Database,
    options: IndexerOptions,
    sweeping: AtomicBool,
    in_flight: Mutex<HashSet<ChannelId>>,
}

/// Releases a channel claimed by [`Indexer::claim`].
struct ChannelClaim<'a> {
    in_flight: &'a Mutex<HashSet<ChannelId>>,
    channel_id: ChannelId,
}

impl Drop for ChannelClaim<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(&self.channel_id);
        }
    }
}

struct SweepClaim<'a>(&'a AtomicBool);

impl Drop for SweepClaim<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<P: ChatPlatform + 'static> Indexer<P> {
    pub fn new(platform: Arc<P>, db: Database, options: IndexerOptions) -> Self {
        Self {
            platform,
            db,
            options,
            sweeping: AtomicBool::new(false),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub async fn run(self: Arc<Self>) {
        info!(
            "Channel indexer: sweeping every {}",
            humantime::format_duration(self.options.interval)
        );
        let mut ticker = tokio::time::interval(self.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match self.sweep().await {
                Some(report) if report.failed_channels > 0 || report.failed_servers > 0 => warn!(
                    servers = report.servers,
                    indexed = report.indexed_channels,
                    failed_channels = report.failed_channels,
                    failed_servers = report.failed_servers,
                    messages = report.messages,
                    "Channel indexer: sweep finished with failures"
                ),
                Some(report) => info!(
                    servers = report.servers,
                    indexed = report.indexed_channels,
                    up_to_date = report.up_to_date_channels,
                    skipped = report.skipped_channels,
                    messages = report.messages,
                    "Channel indexer: sweep finished"
                ),
                None => warn!("Channel indexer: previous sweep still running, skipping tick"),
            }
        }
    }

    /// One pass over every server. Returns `None` without doing anything when
    /// a sweep is already running.
    pub async fn sweep(self: &Arc<Self>) -> Option<SweepReport> {
        if self.sweeping.swap(true, Ordering::AcqRel) {
            return None;
        }
        let _claim = SweepClaim(&self.sweeping);

        let mut report = SweepReport::default();
        let servers = match self.platform.list_servers().await {
            Ok(servers) => servers,
            Err(e) => {
                error!("Channel indexer: failed to list servers: {}", e);
                report.failed_servers += 1;
                return Some(report);
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_servers.max(1)));
        let mut tasks = JoinSet::new();
        for server in servers {
            let indexer = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return SweepReport::default();
                };
                indexer.index_server(&server).await
            });
        }

        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(server_report) => report.merge(server_report),
                Err(e) => {
                    error!("Channel indexer: server task failed: {}", e);
                    report.failed_servers += 1;
                }
            }
        }
        Some(report)
    }

    /// Channels of one server, one after another. A failing channel is logged
    /// and the rest of the server still runs.
    pub async fn index_server(&self, server: &RawServer) -> SweepReport {
        let mut report = SweepReport {
            servers: 1,
            ..Default::default()
        };
        let channels = match self.platform.list_channels(server.id).await {
            Ok(channels) => channels,
            Err(e) => {
                warn!(server = server.id.get(), "Channel indexer: failed to list channels: {}", e);
                report.failed_servers += 1;
                return report;
            }
        };

        for channel in channels {
            let outcome = self.index_channel(server, &channel).await;
            match &outcome {
                Ok(ChannelOutcome::Skipped(reason)) => {
                    debug!(channel = channel.id.get(), ?reason, "Channel indexer: skipped")
                }
                Ok(_) => {}
                Err(e) if e.is_configuration() => {
                    error!(channel = channel.id.get(), "Channel indexer: {}", e)
                }
                Err(e) if e.is_retryable() => warn!(
                    channel = channel.id.get(),
                    "Channel indexer: transient failure, retrying next sweep: {}", e
                ),
                Err(e) => warn!(channel = channel.id.get(), "Channel indexer: pass failed: {}", e),
            }
            report.record(&outcome);
        }
        report
    }

    pub async fn index_channel(
        &self,
        server: &RawServer,
        channel: &RawChannel,
    ) -> Result<ChannelOutcome, IndexError> {
        if !channel.kind.is_indexable() {
            return Ok(ChannelOutcome::Skipped(SkipReason::UnsupportedKind));
        }
        let channel_id = channel.id;
        let settings = self
            .db
            .run_blocking(move |db| db.find_channel_settings(channel_id))
            .await?;
        let Some(settings) = settings.filter(|s| s.indexing_enabled) else {
            return Ok(ChannelOutcome::Skipped(SkipReason::IndexingDisabled));
        };
        let Some(_claim) = self.claim(channel.id) else {
            return Ok(ChannelOutcome::Skipped(SkipReason::InFlight));
        };
        self.run_pass(server, channel, settings).await
    }

    /// Indexes one channel right away, outside the sweep schedule. The
    /// channel must already have settings.
    pub async fn index_channel_now(&self, channel_id: ChannelId) -> Result<ChannelOutcome, IndexError> {
        let settings = self
            .db
            .run_blocking(move |db| db.find_channel_settings(channel_id))
            .await?
            .ok_or(IndexError::MissingChannelSettings(channel_id.get()))?;
        if !settings.indexing_enabled {
            return Ok(ChannelOutcome::Skipped(SkipReason::IndexingDisabled));
        }

        let channel = self.platform.fetch_channel(channel_id).await?;
        if !channel.kind.is_indexable() {
            return Ok(ChannelOutcome::Skipped(SkipReason::UnsupportedKind));
        }
        let server_id = channel
            .guild_id
            .ok_or_else(|| PlatformError::NotFound(format!("server of channel {}", channel_id)))?;
        let server = self.platform.fetch_server(server_id).await?;

        let Some(_claim) = self.claim(channel.id) else {
            return Ok(ChannelOutcome::Skipped(SkipReason::InFlight));
        };
        self.run_pass(&server, &channel, settings).await
    }

    fn claim(&self, channel_id: ChannelId) -> Option<ChannelClaim<'_>> {
        let mut set = self.in_flight.lock().ok()?;
        if !set.insert(channel_id) {
            return None;
        }
        Some(ChannelClaim {
            in_flight: &self.in_flight,
            channel_id,
        })
    }

    async fn run_pass(
        &self,
        server: &RawServer,
        channel: &RawChannel,
        settings: ChannelSettings,
    ) -> Result<ChannelOutcome, IndexError> {
        let channel_id = channel.id;
        let backlog = self
            .db
            .run_blocking(move |db| db.find_thread_backlog(channel_id))
            .await?;
        let options = FetchOptions::after(settings.last_indexed_snowflake)
            .with_limit(self.options.message_limit);
        let history =
            fetch_channel_messages(self.platform.as_ref(), channel, options, &backlog).await?;
        if history.messages.is_empty() && history.unfinished == backlog {
            debug!(channel = channel.id.get(), "Channel indexer: up to date");
            return Ok(ChannelOutcome::UpToDate);
        }
        let watermark = history.watermark;
        if !history.unfinished.is_empty() {
            debug!(
                channel = channel.id.get(),
                threads = history.unfinished.len(),
                "Channel indexer: message limit reached, deferring threads"
            );
        }

        let messages = privacy::filter_messages(&self.db, history.messages, server.id).await?;
        let mut batch = normalize_messages(&messages, server.id);
        let bot_id = self
            .platform
            .bot_user_id()
            .ok_or(IndexError::MissingBotAccount)?;
        correlate_solutions(&messages, &mut batch, bot_id);

        let record = self.channel_record(server, channel).await?;
        let count = batch.messages.len();
        let commit = ChannelCommit {
            server: ServerRecord::from(server),
            channel: record,
            batch,
            watermark,
            backlog: Some(history.unfinished),
        };
        self.db
            .run_blocking(move |db| db.commit_channel_batch(&commit))
            .await?;

        info!(
            server = server.id.get(),
            channel = channel.id.get(),
            messages = count,
            watermark = watermark.map(|id| id.get()),
            "Channel indexer: indexed channel"
        );
        Ok(ChannelOutcome::Indexed {
            messages: count,
            watermark,
        })
    }

    /// The stored channel record, refreshed from `channel`, with an invite
    /// created if it never had one. Invite failures only get logged.
    async fn channel_record(
        &self,
        server: &RawServer,
        channel: &RawChannel,
    ) -> Result<ChannelRecord, IndexError> {
        let channel_id = channel.id;
        let existing = self
            .db
            .run_blocking(move |db| db.find_channel(channel_id))
            .await?;

        let mut record = ChannelRecord::from_raw(channel, server.id);
        record.invite_code = existing.and_then(|c| c.invite_code);
        if record.invite_code.is_none() {
            match self.platform.create_invite(channel.id).await {
                Ok(code) => record.invite_code = Some(code),
                Err(e) => warn!(
                    channel = channel.id.get(),
                    "Channel indexer: failed to create invite: {}", e
                ),
            }
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChannelKind;
    use crate::settings::{ChannelSettingsChange, UserSettingsChange};
    use crate::testing::{self, Call, Failure, FakePlatform};
    use serenity::model::id::{GuildId, UserId};

    const BOT: u64 = 999;

    fn test_db() -> Database {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        db
    }

    fn enable(db: &Database, channel: u64) {
        db.update_channel_settings(ChannelId::new(channel), ChannelSettingsChange::EnableIndexing)
            .unwrap();
    }

    fn server() -> RawServer {
        RawServer {
            id: GuildId::new(1),
            name: "Rust Help".to_string(),
            icon: None,
        }
    }

    fn platform_with(ids: std::ops::RangeInclusive<u64>) -> FakePlatform {
        let mut platform = FakePlatform::new(BOT);
        platform.add_server(1, "Rust Help");
        platform.add_channel(testing::channel(10, 1, ChannelKind::Text));
        platform.add_messages(ids.map(|i| testing::message(i, 10, 5 + i % 3)));
        platform
    }

    fn indexer(platform: FakePlatform, db: &Database) -> Arc<Indexer<FakePlatform>> {
        Arc::new(Indexer::new(Arc::new(platform), db.clone(), IndexerOptions::default()))
    }

    fn watermark(db: &Database, channel: u64) -> Option<MessageId> {
        db.find_channel_settings(ChannelId::new(channel))
            .unwrap()
            .and_then(|s| s.last_indexed_snowflake)
    }

    #[tokio::test]
    async fn test_second_pass_is_idempotent() {
        let db = test_db();
        enable(&db, 10);
        let indexer = indexer(platform_with(100..=349), &db);
        let channel = testing::channel(10, 1, ChannelKind::Text);

        let first = indexer.index_channel(&server(), &channel).await.unwrap();
        assert_eq!(
            first,
            ChannelOutcome::Indexed {
                messages: 250,
                watermark: Some(MessageId::new(349))
            }
        );
        let second = indexer.index_channel(&server(), &channel).await.unwrap();
        assert_eq!(second, ChannelOutcome::UpToDate);

        assert_eq!(db.count_rows("messages"), 250);
        assert_eq!(db.count_rows("accounts"), 3);
        assert_eq!(watermark(&db, 10), Some(MessageId::new(349)));
    }

    #[tokio::test]
    async fn test_opted_out_authors_are_not_committed() {
        let db = test_db();
        enable(&db, 10);
        db.update_user_server_settings(UserId::new(6), GuildId::new(1), UserSettingsChange::DisableIndexing)
            .unwrap();

        let mut platform = platform_with(100..=102);
        let mut notice = testing::message(103, 10, 6);
        notice.system = true;
        platform.add_messages([notice]);
        let indexer = indexer(platform, &db);

        indexer
            .index_channel(&server(), &testing::channel(10, 1, ChannelKind::Text))
            .await
            .unwrap();

        let stored = db.find_messages_in_channel(ChannelId::new(10)).unwrap();
        let ids: Vec<u64> = stored.iter().map(|m| m.id.get()).collect();
        // 100 % 3 == 1 → author 6 is dropped; the system notice stays.
        assert_eq!(ids, vec![101, 102, 103]);
        assert_eq!(watermark(&db, 10), Some(MessageId::new(103)));
    }

    #[tokio::test]
    async fn test_failed_pass_leaves_watermark_and_next_pass_advances() {
        let db = test_db();
        enable(&db, 10);
        let channel = testing::channel(10, 1, ChannelKind::Text);
        indexer(platform_with(100..=110), &db)
            .index_channel(&server(), &channel)
            .await
            .unwrap();
        assert_eq!(watermark(&db, 10), Some(MessageId::new(110)));

        let platform = platform_with(100..=120);
        platform.fail_pages(10, Failure::Timeout);
        let failing = indexer(platform, &db);
        let err = failing.index_channel(&server(), &channel).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(watermark(&db, 10), Some(MessageId::new(110)));

        let platform = platform_with(100..=120);
        platform.fail_pages(10, Failure::Api);
        let err = indexer(platform, &db)
            .index_channel(&server(), &channel)
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(watermark(&db, 10), Some(MessageId::new(110)));

        let recovered = indexer(platform_with(100..=120), &db);
        let outcome = recovered.index_channel(&server(), &channel).await.unwrap();
        assert_eq!(
            outcome,
            ChannelOutcome::Indexed {
                messages: 10,
                watermark: Some(MessageId::new(120))
            }
        );
        assert_eq!(db.count_rows("messages"), 21);
    }

    #[tokio::test]
    async fn test_skip_checks() {
        let db = test_db();
        let indexer = indexer(platform_with(100..=101), &db);

        let voice = testing::channel(11, 1, ChannelKind::Other);
        assert_eq!(
            indexer.index_channel(&server(), &voice).await.unwrap(),
            ChannelOutcome::Skipped(SkipReason::UnsupportedKind)
        );

        let channel = testing::channel(10, 1, ChannelKind::Text);
        assert_eq!(
            indexer.index_channel(&server(), &channel).await.unwrap(),
            ChannelOutcome::Skipped(SkipReason::IndexingDisabled)
        );

        enable(&db, 10);
        let claim = indexer.claim(ChannelId::new(10)).unwrap();
        assert_eq!(
            indexer.index_channel(&server(), &channel).await.unwrap(),
            ChannelOutcome::Skipped(SkipReason::InFlight)
        );
        drop(claim);
        assert!(matches!(
            indexer.index_channel(&server(), &channel).await.unwrap(),
            ChannelOutcome::Indexed { .. }
        ));
        assert_eq!(db.count_rows("messages"), 2);
    }

    #[tokio::test]
    async fn test_missing_bot_account_fails_pass() {
        let db = test_db();
        enable(&db, 10);
        let mut platform = platform_with(100..=101);
        platform.bot_id = None;
        let indexer = indexer(platform, &db);

        let err = indexer
            .index_channel(&server(), &testing::channel(10, 1, ChannelKind::Text))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::MissingBotAccount));
        assert!(err.is_configuration());
        assert_eq!(watermark(&db, 10), None);
        assert_eq!(db.count_rows("messages"), 0);
    }

    #[tokio::test]
    async fn test_solutions_backfilled_from_bot_embeds() {
        let db = test_db();
        enable(&db, 10);
        let mut platform = platform_with(100..=101);
        platform.add_messages([testing::solution_embed_message(102, 10, BOT, 100, 101)]);
        let indexer = indexer(platform, &db);

        indexer
            .index_channel(&server(), &testing::channel(10, 1, ChannelKind::Text))
            .await
            .unwrap();
        let question = db.find_message_by_id(MessageId::new(100)).unwrap().unwrap();
        assert_eq!(question.solutions, vec![MessageId::new(101)]);
    }

    #[tokio::test]
    async fn test_sweep_covers_servers_and_creates_invites_once() {
        let db = test_db();
        enable(&db, 10);
        enable(&db, 20);
        let mut platform = platform_with(100..=104);
        platform.add_server(2, "Other");
        platform.add_channel(testing::channel(20, 2, ChannelKind::Forum));
        platform.add_channel(testing::thread(200, 20, 2));
        platform.add_messages([testing::message(200, 200, 7), testing::message(201, 200, 8)]);
        platform.add_channel(testing::channel(30, 2, ChannelKind::Text));
        let indexer = indexer(platform, &db);

        let report = indexer.sweep().await.unwrap();
        assert_eq!(report.servers, 2);
        assert_eq!(report.indexed_channels, 2);
        assert_eq!(report.skipped_channels, 1);
        assert_eq!(report.failed_channels, 0);
        assert_eq!(report.messages, 7);
        assert_eq!(watermark(&db, 20), Some(MessageId::new(201)));

        let report = indexer.sweep().await.unwrap();
        assert_eq!(report.up_to_date_channels, 2);
        let invites = indexer
            .platform
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Invite { .. }))
            .count();
        assert_eq!(invites, 2);
        let forum = db.find_channel(ChannelId::new(20)).unwrap().unwrap();
        assert_eq!(forum.invite_code.as_deref(), Some("invite-20"));
    }

    #[tokio::test]
    async fn test_sweeps_do_not_overlap() {
        let db = test_db();
        let indexer = indexer(platform_with(100..=101), &db);
        indexer.sweeping.store(true, Ordering::Release);
        assert!(indexer.sweep().await.is_none());
        indexer.sweeping.store(false, Ordering::Release);
        assert!(indexer.sweep().await.is_some());
    }

    #[tokio::test]
    async fn test_index_now_requires_settings() {
        let db = test_db();
        let indexer = indexer(platform_with(100..=101), &db);
        let err = indexer.index_channel_now(ChannelId::new(10)).await.unwrap_err();
        assert!(matches!(err, IndexError::MissingChannelSettings(10)));

        enable(&db, 10);
        let outcome = indexer.index_channel_now(ChannelId::new(10)).await.unwrap();
        assert!(matches!(outcome, ChannelOutcome::Indexed { messages: 2, .. }));

        // Disabled channels are turned away before the platform is asked.
        db.update_channel_settings(ChannelId::new(404), ChannelSettingsChange::DisableIndexing)
            .unwrap();
        assert_eq!(
            indexer.index_channel_now(ChannelId::new(404)).await.unwrap(),
            ChannelOutcome::Skipped(SkipReason::IndexingDisabled)
        );
    }

    #[tokio::test]
    async fn test_message_limit_resumes_long_threads() {
        let db = test_db();
        enable(&db, 20);
        let mut platform = FakePlatform::new(BOT);
        platform.add_server(1, "Rust Help");
        let forum = testing::channel(20, 1, ChannelKind::Forum);
        platform.add_channel(forum.clone());
        let mut thread = testing::thread(1000, 20, 1);
        thread.last_message_id = Some(MessageId::new(1149));
        platform.add_channel(thread);
        platform.add_messages((1000..1150).map(|i| testing::message(i, 1000, 5)));
        let options = IndexerOptions {
            message_limit: Some(100),
            ..Default::default()
        };
        let indexer = Indexer::new(Arc::new(platform), db.clone(), options);

        let mut outcomes = Vec::new();
        for _ in 0..4 {
            outcomes.push(indexer.index_channel(&server(), &forum).await.unwrap());
        }
        assert_eq!(
            outcomes,
            vec![
                ChannelOutcome::Indexed {
                    messages: 100,
                    watermark: Some(MessageId::new(1099))
                },
                ChannelOutcome::Indexed {
                    messages: 50,
                    watermark: Some(MessageId::new(1149))
                },
                ChannelOutcome::UpToDate,
                ChannelOutcome::UpToDate,
            ]
        );
        assert_eq!(db.find_messages_in_channel(ChannelId::new(20)).unwrap().len(), 150);
        assert!(db.find_thread_backlog(ChannelId::new(20)).unwrap().is_empty());
        assert_eq!(watermark(&db, 20), Some(MessageId::new(1149)));
    }

    #[tokio::test]
    async fn test_message_limit_resumes_text_threads() {
        let db = test_db();
        enable(&db, 10);
        let mut platform = platform_with(100..=104);
        platform.add_channel(testing::thread(105, 10, 1));
        let mut starter = testing::message(105, 10, 5);
        starter.thread = Some(testing::thread(105, 10, 1));
        platform.add_messages([starter]);
        platform.add_messages((500..530).map(|i| testing::message(i, 105, 6)));
        let options = IndexerOptions {
            message_limit: Some(20),
            ..Default::default()
        };
        let indexer = Indexer::new(Arc::new(platform), db.clone(), options);
        let channel = testing::channel(10, 1, ChannelKind::Text);

        let first = indexer.index_channel(&server(), &channel).await.unwrap();
        assert_eq!(
            first,
            ChannelOutcome::Indexed {
                messages: 20,
                watermark: Some(MessageId::new(105))
            }
        );
        let second = indexer.index_channel(&server(), &channel).await.unwrap();
        assert_eq!(
            second,
            ChannelOutcome::Indexed {
                messages: 16,
                watermark: None
            }
        );
        assert_eq!(
            indexer.index_channel(&server(), &channel).await.unwrap(),
            ChannelOutcome::UpToDate
        );
        assert_eq!(db.find_messages_in_channel(ChannelId::new(10)).unwrap().len(), 36);
        assert_eq!(watermark(&db, 10), Some(MessageId::new(105)));
    }
}
