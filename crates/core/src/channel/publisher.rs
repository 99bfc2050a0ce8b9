use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
    sync::atomic::Ordering,
};

use memmap2::MmapMut;

use super::{sequence_cell, ChannelHeader, HEADER_SIZE, MAX_PAYLOAD, REGION_SIZE, SEQUENCE_OFFSET};
use crate::{event::unix_now, AetherError, BandEvent, Result};

/// Writing side of the channel. There must be exactly one per region.
pub struct Publisher {
    path: PathBuf,
    map: MmapMut,
    sequence: u64,
    last_timestamp: f64,
}

impl Publisher {
    /// Creates (or takes over) the region at `path` and clears its header, so
    /// readers see "never published" until the first frame lands.
    ///
    /// The file is resized in place rather than truncated: a reader that
    /// still maps it must never touch pages past the end of the file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }
        let file = options.open(&path)?;
        file.set_len(REGION_SIZE as u64)?;

        // SAFETY: the file is REGION_SIZE bytes long and only this process
        // writes to it; readers map it read-only.
        let mut map = unsafe { MmapMut::map_mut(&file)? };
        if map.len() < REGION_SIZE {
            return Err(AetherError::RegionTooSmall {
                required: REGION_SIZE,
                actual: map.len(),
            });
        }
        map[..HEADER_SIZE].fill(0);

        tracing::info!(path = %path.display(), "shared region ready");

        Ok(Self {
            path,
            map,
            sequence: 0,
            last_timestamp: 0.0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sequence of the last committed frame, 0 before the first publish.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Stamps `event` with the current time and commits it as the next frame.
    ///
    /// Payloads larger than [`MAX_PAYLOAD`] are cut to fit. Returns `false`,
    /// leaving the region untouched, only when the event cannot be encoded.
    pub fn publish(&mut self, event: &BandEvent) -> bool {
        let mut event = event.clone();
        event.timestamp = Some(self.next_timestamp());

        match event.encode() {
            Ok(payload) => self.publish_payload(payload),
            Err(err) => {
                tracing::debug!(%err, "event could not be encoded");
                false
            }
        }
    }

    pub(crate) fn publish_payload(&mut self, mut payload: Vec<u8>) -> bool {
        if payload.len() > MAX_PAYLOAD {
            tracing::debug!(len = payload.len(), "payload truncated to region capacity");
            payload.truncate(MAX_PAYLOAD);
        }

        self.sequence += 1;
        self.commit(self.sequence, &payload);
        true
    }

    fn commit(&mut self, sequence: u64, payload: &[u8]) {
        self.map[HEADER_SIZE..HEADER_SIZE + payload.len()].copy_from_slice(payload);

        // Everything but the sequence goes in first; the release store below
        // publishes the payload and these fields together.
        let header = ChannelHeader::new(sequence, payload.len() as u32).to_bytes();
        self.map[..SEQUENCE_OFFSET].copy_from_slice(&header[..SEQUENCE_OFFSET]);
        self.map[SEQUENCE_OFFSET + 8..HEADER_SIZE].copy_from_slice(&header[SEQUENCE_OFFSET + 8..]);

        // SAFETY: the mapping is page aligned and REGION_SIZE bytes long.
        let cell = unsafe { sequence_cell(self.map.as_mut_ptr() as *const u8) };
        cell.store(sequence, Ordering::Release);
    }

    /// Wall-clock seconds, never earlier than the previous stamp.
    fn next_timestamp(&mut self) -> f64 {
        self.last_timestamp = self.last_timestamp.max(unix_now());
        self.last_timestamp
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("path", &self.path)
            .field("sequence", &self.sequence)
            .finish()
    }
}
