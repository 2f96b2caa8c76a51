use parking_lot::Mutex;
use poise::serenity_prelude::ChannelId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::watch;

/// Handle to one channel's running trigger
#[derive(Debug)]
pub struct ScheduleHandle {
    retention: Duration,
    cancel: watch::Sender<bool>,
}

impl ScheduleHandle {
    /// Create a handle plus the receiver its trigger loop watches
    pub fn new(retention: Duration) -> (Self, watch::Receiver<bool>) {
        let (cancel, cancelled) = watch::channel(false);
        (Self { retention, cancel }, cancelled)
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Stop all future ticks. A walk already running is left to finish.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }
}

/// Channel -> active trigger. Every access goes through one lock.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    entries: Mutex<HashMap<ChannelId, ScheduleHandle>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handle` for `channel_id`, cancelling whatever was there
    pub fn replace(&self, channel_id: ChannelId, handle: ScheduleHandle) -> bool {
        let previous = self.entries.lock().insert(channel_id, handle);
        match previous {
            Some(old) => {
                old.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove and cancel the trigger for `channel_id`, if any
    pub fn remove(&self, channel_id: ChannelId) -> Option<Duration> {
        let removed = self.entries.lock().remove(&channel_id);
        removed.map(|handle| {
            handle.cancel();
            handle.retention()
        })
    }

    #[cfg(test)]
    pub fn retention(&self, channel_id: ChannelId) -> Option<Duration> {
        self.entries.lock().get(&channel_id).map(|h| h.retention())
    }

    #[cfg(test)]
    pub fn contains(&self, channel_id: ChannelId) -> bool {
        self.entries.lock().contains_key(&channel_id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Snapshot of every active channel and its retention, ordered by channel
    pub fn snapshot(&self) -> Vec<(ChannelId, Duration)> {
        let mut entries: Vec<_> = self
            .entries
            .lock()
            .iter()
            .map(|(id, h)| (*id, h.retention()))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }

    /// Cancel and drop every trigger
    pub fn clear(&self) -> usize {
        let drained: Vec<_> = self.entries.lock().drain().collect();
        for (_, handle) in &drained {
            handle.cancel();
        }
        drained.len()
    }
}
