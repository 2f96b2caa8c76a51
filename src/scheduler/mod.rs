//! Per-channel purge scheduling.
//!
//! Each active channel owns one spawned trigger loop that fires every poll
//! interval and runs a purge walk. The [`TaskRegistry`] decides which loops
//! are alive; the repository only mirrors it so schedules survive restarts.

pub mod purge;
pub mod registry;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use poise::serenity_prelude::{ChannelId, GuildId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::PurgeSettings;
use crate::error::Result;
use crate::models::Task;
use crate::platform::{ChatPlatform, SharedPlatform};
use crate::state::SharedRepository;

use registry::{ScheduleHandle, TaskRegistry};

/// Channels with a walk currently running
type InFlight = Arc<DashMap<ChannelId, ()>>;

/// Per-channel lock held across the registry and repository writes of one
/// start, stop or forget, so the persisted task always matches the last one
type ChannelLocks = DashMap<ChannelId, Arc<Mutex<()>>>;

/// Result of startup reconciliation
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub resumed: usize,
    pub removed: usize,
}

pub struct Scheduler {
    registry: TaskRegistry,
    repository: SharedRepository,
    platform: SharedPlatform,
    settings: PurgeSettings,
    in_flight: InFlight,
    channel_locks: ChannelLocks,
}

impl Scheduler {
    pub fn new(
        platform: SharedPlatform,
        repository: SharedRepository,
        settings: PurgeSettings,
    ) -> Self {
        Self {
            registry: TaskRegistry::new(),
            repository,
            platform,
            settings,
            in_flight: Arc::new(DashMap::new()),
            channel_locks: DashMap::new(),
        }
    }

    fn channel_lock(&self, channel_id: ChannelId) -> Arc<Mutex<()>> {
        self.channel_locks.entry(channel_id).or_default().clone()
    }

    /// Start purging `channel_id`, replacing any existing schedule.
    ///
    /// Returns the effective (clamped) retention.
    pub async fn start_or_replace(&self, channel_id: ChannelId, requested: Duration) -> Duration {
        let retention = self.settings.clamp_retention(requested);
        if retention != requested {
            debug!(
                "Clamped retention for channel {} from {:?} to {:?}",
                channel_id, requested, retention
            );
        }

        let lock = self.channel_lock(channel_id);
        let _serialized = lock.lock().await;

        let (handle, cancelled) = ScheduleHandle::new(retention);
        if self.registry.replace(channel_id, handle) {
            info!("Replaced purge task for channel {}", channel_id);
        }

        tokio::spawn(run_trigger(
            self.platform.clone(),
            self.in_flight.clone(),
            channel_id,
            retention,
            self.settings.poll_interval,
            cancelled,
        ));
        info!(
            "Purging channel {} every {:?}, retention {:?}",
            channel_id, self.settings.poll_interval, retention
        );

        if let Err(e) = self
            .repository
            .upsert_task(Task::new(channel_id, retention))
            .await
        {
            error!("Failed to persist purge task for channel {}: {}", channel_id, e);
        }

        retention
    }

    /// Stop purging `channel_id`. Returns whether a schedule was running.
    pub async fn stop(&self, channel_id: ChannelId) -> bool {
        let lock = self.channel_lock(channel_id);
        let _serialized = lock.lock().await;

        let was_running = self.registry.remove(channel_id).is_some();
        if was_running {
            info!("Stopped purge task for channel {}", channel_id);
        }

        if let Err(e) = self.repository.delete_task(channel_id).await {
            error!("Failed to delete purge task for channel {}: {}", channel_id, e);
        }
        was_running
    }

    /// Resume every persisted task whose channel is still a text channel.
    ///
    /// Tasks for channels that cannot be resolved are deleted.
    pub async fn reconcile(&self) -> Result<ReconcileSummary> {
        let tasks = self.repository.find_tasks().await?;
        let mut summary = ReconcileSummary::default();

        for task in tasks {
            let channel_id = task.channel_id;
            match self.platform.channel(channel_id).await {
                Ok(channel) if channel.is_text => {
                    self.start_or_replace(channel_id, task.retention()).await;
                    summary.resumed += 1;
                }
                Ok(_) => {
                    warn!("Channel {} is not a text channel, dropping its task", channel_id);
                    self.forget(channel_id).await;
                    summary.removed += 1;
                }
                Err(e) => {
                    warn!("Error fetching channel {}: {}, dropping its task", channel_id, e);
                    self.forget(channel_id).await;
                    summary.removed += 1;
                }
            }
        }

        info!(
            "Reconciled purge tasks: {} resumed, {} removed",
            summary.resumed, summary.removed
        );
        Ok(summary)
    }

    async fn forget(&self, channel_id: ChannelId) {
        let lock = self.channel_lock(channel_id);
        let _serialized = lock.lock().await;

        if let Err(e) = self.repository.delete_task(channel_id).await {
            error!("Failed to delete stale task for channel {}: {}", channel_id, e);
        }
    }

    #[cfg(test)]
    pub fn is_running(&self, channel_id: ChannelId) -> bool {
        self.registry.contains(channel_id)
    }

    #[cfg(test)]
    pub fn retention_of(&self, channel_id: ChannelId) -> Option<Duration> {
        self.registry.retention(channel_id)
    }

    /// Active channels and their retention, ordered by channel ID
    pub fn active_channels(&self) -> Vec<(ChannelId, Duration)> {
        self.registry.snapshot()
    }

    /// Active tasks whose channel belongs to `guild_id`
    pub async fn tasks_in_guild(&self, guild_id: GuildId) -> Vec<Task> {
        let mut tasks = Vec::new();
        for (channel_id, retention) in self.active_channels() {
            match self.platform.channel(channel_id).await {
                Ok(channel) if channel.guild_id == Some(guild_id) => {
                    tasks.push(Task::new(channel_id, retention));
                }
                Ok(_) => {}
                Err(e) => debug!("Error fetching channel {}: {}", channel_id, e),
            }
        }
        tasks
    }

    /// Cancel every trigger without touching persisted tasks
    pub fn shutdown(&self) {
        let cancelled = self.registry.clear();
        info!("Cancelled {} purge trigger(s)", cancelled);
    }
}

/// Marks a channel as busy for the lifetime of one walk
struct WalkGuard {
    in_flight: InFlight,
    channel_id: ChannelId,
}

impl WalkGuard {
    fn acquire(in_flight: &InFlight, channel_id: ChannelId) -> Option<Self> {
        match in_flight.entry(channel_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(Self {
                    in_flight: in_flight.clone(),
                    channel_id,
                })
            }
        }
    }
}

impl Drop for WalkGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.channel_id);
    }
}

async fn run_trigger(
    platform: SharedPlatform,
    in_flight: InFlight,
    channel_id: ChannelId,
    retention: Duration,
    poll_interval: Duration,
    mut cancelled: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + poll_interval, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = cancelled.changed() => {
                if changed.is_err() || *cancelled.borrow() {
                    break;
                }
                continue;
            }
        }

        if *cancelled.borrow() {
            break;
        }

        let Some(_guard) = WalkGuard::acquire(&in_flight, channel_id) else {
            warn!(
                "Previous purge walk for channel {} still running, skipping tick",
                channel_id
            );
            continue;
        };

        run_walk(platform.as_ref(), channel_id, retention).await;
    }

    debug!("Purge trigger for channel {} stopped", channel_id);
}

async fn run_walk(platform: &dyn ChatPlatform, channel_id: ChannelId, retention: Duration) {
    match purge::purge_channel(platform, channel_id, retention).await {
        Ok(report) if report.deleted > 0 || report.failed > 0 => info!(
            "Purged channel {}: {} deleted, {} failed, {} scanned over {} page(s)",
            channel_id, report.deleted, report.failed, report.scanned, report.pages
        ),
        Ok(report) => debug!(
            "Nothing to purge in channel {} ({} scanned)",
            channel_id, report.scanned
        ),
        Err(e) => error!("Purge walk for channel {} aborted: {}", channel_id, e),
    }
}

pub type SharedScheduler = Arc<Scheduler>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::FakePlatform;
    use crate::models::{GuildGrants, RolePermission, UserPermission};
    use crate::state::{PurgeRepository, PurgeStore};
    use async_trait::async_trait;
    use chrono::Utc;
    use poise::serenity_prelude::{MessageId, RoleId, UserId};

    /// Store whose task upserts take `delay` to land
    struct SlowTaskWrites {
        inner: PurgeStore,
        delay: Duration,
    }

    #[async_trait]
    impl PurgeRepository for SlowTaskWrites {
        async fn upsert_task(&self, task: Task) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.upsert_task(task).await
        }

        async fn delete_task(&self, channel_id: ChannelId) -> Result<()> {
            self.inner.delete_task(channel_id).await
        }

        async fn find_tasks(&self) -> Result<Vec<Task>> {
            self.inner.find_tasks().await
        }

        async fn upsert_user_grant(&self, grant: UserPermission) -> Result<()> {
            self.inner.upsert_user_grant(grant).await
        }

        async fn delete_user_grant(&self, guild_id: GuildId, user_id: UserId) -> Result<bool> {
            self.inner.delete_user_grant(guild_id, user_id).await
        }

        async fn upsert_role_grant(&self, grant: RolePermission) -> Result<()> {
            self.inner.upsert_role_grant(grant).await
        }

        async fn delete_role_grant(&self, guild_id: GuildId, role_id: RoleId) -> Result<bool> {
            self.inner.delete_role_grant(guild_id, role_id).await
        }

        async fn find_grants(&self, guild_id: GuildId) -> Result<GuildGrants> {
            self.inner.find_grants(guild_id).await
        }
    }

    fn guild() -> GuildId {
        GuildId::new(1)
    }

    fn setup() -> (Arc<FakePlatform>, Arc<PurgeStore>, Scheduler) {
        let platform = Arc::new(FakePlatform::new());
        let store = Arc::new(PurgeStore::in_memory());
        let scheduler = Scheduler::new(
            platform.clone(),
            store.clone(),
            PurgeSettings::default(),
        );
        (platform, store, scheduler)
    }

    #[tokio::test]
    async fn test_start_persists_clamped_task() {
        let (_, store, scheduler) = setup();
        let channel = ChannelId::new(10);

        let retention = scheduler
            .start_or_replace(channel, Duration::from_secs(5))
            .await;

        assert_eq!(retention, Duration::from_secs(30));
        assert!(scheduler.is_running(channel));
        assert_eq!(
            store.find_tasks().await.unwrap(),
            vec![Task::new(channel, Duration::from_secs(30))]
        );
    }

    #[tokio::test]
    async fn test_reissue_replaces_single_entry() {
        let (_, store, scheduler) = setup();
        let channel = ChannelId::new(10);

        scheduler
            .start_or_replace(channel, Duration::from_secs(3600))
            .await;
        scheduler
            .start_or_replace(channel, Duration::from_secs(172_800))
            .await;

        assert_eq!(scheduler.active_channels().len(), 1);
        assert_eq!(
            scheduler.retention_of(channel),
            Some(Duration::from_secs(172_800))
        );
        let tasks = store.find_tasks().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].retention_secs, 172_800);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (_, store, scheduler) = setup();
        let channel = ChannelId::new(10);

        assert!(!scheduler.stop(channel).await);

        scheduler
            .start_or_replace(channel, Duration::from_secs(60))
            .await;
        assert!(scheduler.stop(channel).await);
        assert!(!scheduler.stop(channel).await);

        assert!(!scheduler.is_running(channel));
        assert!(store.find_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_drops_missing_and_non_text_channels() {
        let (platform, store, scheduler) = setup();
        let alive = ChannelId::new(1);
        let voice = ChannelId::new(2);
        let gone = ChannelId::new(3);
        platform.add_channel(guild(), alive, true);
        platform.add_channel(guild(), voice, false);
        for channel in [alive, voice, gone] {
            store
                .upsert_task(Task::new(channel, Duration::from_secs(120)))
                .await
                .unwrap();
        }

        let summary = scheduler.reconcile().await.unwrap();

        assert_eq!(summary, ReconcileSummary { resumed: 1, removed: 2 });
        assert!(scheduler.is_running(alive));
        assert!(!scheduler.is_running(voice));
        assert!(!scheduler.is_running(gone));
        assert_eq!(
            store.find_tasks().await.unwrap(),
            vec![Task::new(alive, Duration::from_secs(120))]
        );
    }

    #[tokio::test]
    async fn test_tasks_in_guild_filters_other_guilds() {
        let (platform, _, scheduler) = setup();
        platform.add_channel(guild(), ChannelId::new(1), true);
        platform.add_channel(GuildId::new(2), ChannelId::new(2), true);
        scheduler
            .start_or_replace(ChannelId::new(1), Duration::from_secs(60))
            .await;
        scheduler
            .start_or_replace(ChannelId::new(2), Duration::from_secs(60))
            .await;

        let tasks = scheduler.tasks_in_guild(guild()).await;
        assert_eq!(tasks, vec![Task::new(ChannelId::new(1), Duration::from_secs(60))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_purges_on_poll_interval() {
        let (platform, _, scheduler) = setup();
        let channel = ChannelId::new(10);
        platform.add_channel(guild(), channel, true);
        platform.add_message(channel, 1, Utc::now() - chrono::Duration::hours(2));
        platform.add_message(channel, 2, Utc::now());

        scheduler
            .start_or_replace(channel, Duration::from_secs(3600))
            .await;

        // Nothing happens before the first poll interval elapses
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(platform.fetch_calls(), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(platform.deleted(), vec![MessageId::new(1)]);
        assert_eq!(platform.remaining(channel), vec![MessageId::new(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_future_ticks() {
        let (platform, _, scheduler) = setup();
        let channel = ChannelId::new(10);
        platform.add_channel(guild(), channel, true);

        scheduler
            .start_or_replace(channel, Duration::from_secs(60))
            .await;
        tokio::time::sleep(Duration::from_secs(40)).await;
        let calls = platform.fetch_calls();
        assert_eq!(calls, 1);

        scheduler.stop(channel).await;
        tokio::time::sleep(Duration::from_secs(200)).await;
        assert_eq!(platform.fetch_calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_lets_in_flight_walk_finish() {
        let (platform, store, scheduler) = setup();
        let channel = ChannelId::new(10);
        platform.add_channel(guild(), channel, true);
        platform.add_message(channel, 1, Utc::now() - chrono::Duration::hours(3));
        platform.add_message(channel, 2, Utc::now() - chrono::Duration::hours(2));
        platform.set_fetch_delay(Duration::from_secs(100));

        scheduler
            .start_or_replace(channel, Duration::from_secs(60))
            .await;
        // the walk starts at 33s and sits in its first fetch until 133s
        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(platform.fetch_calls(), 1);

        assert!(scheduler.stop(channel).await);
        assert!(!scheduler.is_running(channel));
        assert!(store.find_tasks().await.unwrap().is_empty());

        // first page at 133s, terminating empty page at 233s
        tokio::time::sleep(Duration::from_secs(260)).await;
        assert_eq!(platform.deleted(), vec![MessageId::new(2), MessageId::new(1)]);
        assert!(platform.remaining(channel).is_empty());
        assert_eq!(platform.fetch_calls(), 2);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(platform.fetch_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_start_and_stop_leave_nothing_persisted() {
        let platform = Arc::new(FakePlatform::new());
        let store = Arc::new(SlowTaskWrites {
            inner: PurgeStore::in_memory(),
            delay: Duration::from_secs(5),
        });
        let scheduler = Scheduler::new(platform, store.clone(), PurgeSettings::default());
        let channel = ChannelId::new(10);

        // the start is polled first and parks in its slow upsert
        let (_, was_running) = tokio::join!(
            scheduler.start_or_replace(channel, Duration::from_secs(3600)),
            scheduler.stop(channel),
        );

        assert!(was_running);
        assert!(!scheduler.is_running(channel));
        assert!(store.find_tasks().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_walks_are_skipped() {
        let (platform, _, scheduler) = setup();
        let channel = ChannelId::new(10);
        platform.add_channel(guild(), channel, true);
        platform.set_fetch_delay(Duration::from_secs(100));

        scheduler
            .start_or_replace(channel, Duration::from_secs(60))
            .await;
        // first walk starts at 33s and blocks in its fetch until 133s
        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(platform.fetch_calls(), 1);

        // a replacement trigger ticks at 73s while the old walk is still in flight
        scheduler
            .start_or_replace(channel, Duration::from_secs(120))
            .await;
        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(platform.fetch_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_keeps_persisted_tasks() {
        let (_, store, scheduler) = setup();
        scheduler
            .start_or_replace(ChannelId::new(1), Duration::from_secs(60))
            .await;

        scheduler.shutdown();

        assert!(scheduler.active_channels().is_empty());
        assert_eq!(store.find_tasks().await.unwrap().len(), 1);
    }
}
