use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

use crate::BandEvent;

/// Last-value store in a plain file, used when the shared region cannot be
/// opened.
///
/// Writers overwrite the file on every event; readers use its modification
/// time as the freshness signal. There is no locking, so a reader can catch
/// a half-written file. That read fails to decode, is not counted as
/// consumed, and is retried on the next poll.
#[derive(Debug, Clone)]
pub struct FallbackStore {
    path: PathBuf,
    last_modified: Option<SystemTime>,
}

impl FallbackStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_modified: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the stored event. Returns `false` if it could not be written.
    pub fn write(&self, event: &BandEvent) -> bool {
        let result = event
            .encode()
            .map_err(|err| err.to_string())
            .and_then(|bytes| fs::write(&self.path, bytes).map_err(|err| err.to_string()));

        match result {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(path = %self.path.display(), %err, "fallback write failed");
                false
            }
        }
    }

    /// Returns the stored event if the file changed since the last
    /// successful read.
    ///
    /// The modification time is checked again after reading. If a write
    /// landed in between, the read is not counted and the next call picks
    /// up the settled file, so one write is never returned twice.
    pub fn read_fresh(&mut self) -> Option<BandEvent> {
        self.read_fresh_with(|| {})
    }

    /// `read_fresh` with a hook that runs between reading the file and
    /// re-checking its modification time.
    fn read_fresh_with(&mut self, between_reads: impl FnOnce()) -> Option<BandEvent> {
        let modified = self.modified()?;
        if self.last_modified.is_some_and(|seen| modified <= seen) {
            return None;
        }

        let bytes = fs::read(&self.path).ok()?;
        between_reads();

        if self.modified()? != modified {
            tracing::debug!(path = %self.path.display(), "fallback file replaced mid-read");
            return None;
        }

        match BandEvent::decode(&bytes) {
            Ok(event) => {
                self.last_modified = Some(modified);
                Some(event)
            }
            Err(err) => {
                tracing::debug!(path = %self.path.display(), %err, "fallback file unreadable");
                None
            }
        }
    }

    fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).ok()?.modified().ok()
    }
}
