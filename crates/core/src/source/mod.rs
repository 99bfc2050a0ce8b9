//! Facades over the shared channel and its file fallback.
//!
//! Consumers read through [`EventSource`], the producer writes through
//! [`EventSink`]. Both prefer the mapped region and quietly fall back to the
//! [`FallbackStore`] when it is not available.

use std::path::{Path, PathBuf};

use crate::{
    config::ChannelConfig, event::unix_now, BandEvent, FallbackStore, Publisher, Subscriber,
};

/// Poll counters kept by an [`EventSource`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub polls: u64,
    pub channel_hits: u64,
    pub fallback_hits: u64,
}

impl SourceStats {
    /// Share of polls answered by the mapped region, in percent.
    pub fn channel_hit_rate(&self) -> f32 {
        if self.polls == 0 {
            0.0
        } else {
            self.channel_hits as f32 / self.polls as f32 * 100.0
        }
    }
}

/// "Latest event, or nothing if unchanged" for a consumer process.
#[derive(Debug)]
pub struct EventSource {
    shm_path: PathBuf,
    subscriber: Option<Subscriber>,
    fallback: FallbackStore,
    stats: SourceStats,
}

impl EventSource {
    pub fn new(config: &ChannelConfig) -> Self {
        Self::with_paths(&config.shm_path, &config.fallback_path)
    }

    /// Opens the region at `shm_path` if it exists. A missing region is not
    /// an error; the source then serves events from the fallback file.
    pub fn with_paths(shm_path: impl AsRef<Path>, fallback_path: impl Into<PathBuf>) -> Self {
        let shm_path = shm_path.as_ref().to_path_buf();
        let subscriber = open_subscriber(&shm_path);
        Self {
            shm_path,
            subscriber,
            fallback: FallbackStore::new(fallback_path),
            stats: SourceStats::default(),
        }
    }

    /// True when the mapped region is in use.
    pub fn is_available(&self) -> bool {
        self.subscriber.is_some()
    }

    /// Tries to open the region again if it was unavailable. A fresh
    /// subscriber starts with an empty cursor.
    pub fn reconnect(&mut self) -> bool {
        if self.subscriber.is_none() {
            self.subscriber = open_subscriber(&self.shm_path);
        }
        self.is_available()
    }

    /// Path events are currently read from: the region while it is open,
    /// otherwise the fallback file.
    pub fn active_path(&self) -> &Path {
        match &self.subscriber {
            Some(subscriber) => subscriber.path(),
            None => self.fallback.path(),
        }
    }

    pub fn stats(&self) -> SourceStats {
        self.stats
    }

    pub fn poll(&mut self) -> Option<BandEvent> {
        self.stats.polls += 1;

        if let Some(event) = self.subscriber.as_mut().and_then(Subscriber::poll) {
            self.stats.channel_hits += 1;
            return Some(event);
        }

        let event = self.fallback.read_fresh()?;
        self.stats.fallback_hits += 1;
        Some(event)
    }
}

fn open_subscriber(path: &Path) -> Option<Subscriber> {
    match Subscriber::open(path) {
        Ok(subscriber) => Some(subscriber),
        Err(err) => {
            tracing::debug!(path = %path.display(), %err, "shared region unavailable, using fallback file");
            None
        }
    }
}

/// Producer-side counterpart of [`EventSource`].
#[derive(Debug)]
pub struct EventSink {
    publisher: Option<Publisher>,
    fallback: FallbackStore,
}

impl EventSink {
    pub fn new(config: &ChannelConfig) -> Self {
        Self::with_paths(&config.shm_path, &config.fallback_path)
    }

    pub fn with_paths(shm_path: impl AsRef<Path>, fallback_path: impl Into<PathBuf>) -> Self {
        let shm_path = shm_path.as_ref();
        let publisher = match Publisher::create(shm_path) {
            Ok(publisher) => Some(publisher),
            Err(err) => {
                tracing::warn!(path = %shm_path.display(), %err, "shared memory unavailable, using fallback file");
                None
            }
        };
        Self {
            publisher,
            fallback: FallbackStore::new(fallback_path),
        }
    }

    /// True when events go through the mapped region.
    pub fn is_shared(&self) -> bool {
        self.publisher.is_some()
    }

    /// Path events are currently written to.
    pub fn active_path(&self) -> &Path {
        match &self.publisher {
            Some(publisher) => publisher.path(),
            None => self.fallback.path(),
        }
    }

    /// Publishes through the region, or writes the fallback file when the
    /// region is unavailable or the publish fails.
    pub fn publish(&mut self, event: &BandEvent) -> bool {
        if let Some(publisher) = self.publisher.as_mut() {
            if publisher.publish(event) {
                return true;
            }
        }

        let mut event = event.clone();
        event.timestamp.get_or_insert_with(unix_now);
        self.fallback.write(&event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BandLevels;

    fn event(bass: f32) -> BandEvent {
        BandEvent::from_levels(BandLevels {
            bass,
            total: 0.6,
            ..Default::default()
        })
    }

    #[test]
    fn prefers_the_shared_region() {
        let dir = tempfile::tempdir().unwrap();
        let shm = dir.path().join("region");
        let file = dir.path().join("last_event.json");

        let mut sink = EventSink::with_paths(&shm, &file);
        assert!(sink.is_shared());
        assert_eq!(sink.active_path(), shm);
        let mut source = EventSource::with_paths(&shm, &file);
        assert!(source.is_available());
        assert_eq!(source.active_path(), shm);

        assert!(sink.publish(&event(0.8)));
        let received = source.poll().unwrap();
        assert_eq!(received.bands.bass, 0.8);
        assert!(source.poll().is_none());
        assert!(!file.exists());

        let stats = source.stats();
        assert_eq!(stats.polls, 2);
        assert_eq!(stats.channel_hits, 1);
        assert_eq!(stats.channel_hit_rate(), 50.0);
    }

    #[test]
    fn falls_back_to_the_file_when_region_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let shm = dir.path().join("no-such-dir").join("region");
        let file = dir.path().join("last_event.json");

        let mut sink = EventSink::with_paths(&shm, &file);
        assert!(!sink.is_shared());
        assert_eq!(sink.active_path(), file);
        let mut source = EventSource::with_paths(&shm, &file);
        assert!(!source.is_available());
        assert_eq!(source.active_path(), file);

        assert!(sink.publish(&event(0.4)));
        let received = source.poll().unwrap();
        assert_eq!(received.bands.bass, 0.4);
        assert!(received.timestamp.is_some());
        assert!(source.poll().is_none());
        assert_eq!(source.stats().fallback_hits, 1);
    }

    #[test]
    fn reconnect_picks_up_a_late_publisher() {
        let dir = tempfile::tempdir().unwrap();
        let shm = dir.path().join("region");
        let file = dir.path().join("last_event.json");

        let mut source = EventSource::with_paths(&shm, &file);
        assert!(!source.is_available());
        assert_eq!(source.active_path(), file);
        assert!(source.poll().is_none());

        let mut sink = EventSink::with_paths(&shm, &file);
        assert!(source.reconnect());
        assert_eq!(source.active_path(), shm);
        sink.publish(&event(0.5));
        assert_eq!(source.poll().unwrap().bands.bass, 0.5);
    }
}
