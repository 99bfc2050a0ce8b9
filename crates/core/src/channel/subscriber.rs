use std::{
    fs::File,
    ops::Range,
    path::{Path, PathBuf},
    ptr,
    sync::atomic::{fence, AtomicU64, Ordering},
};

use memmap2::Mmap;

use super::{sequence_cell, ChannelHeader, HEADER_SIZE, MAX_PAYLOAD, REGION_SIZE};
use crate::{AetherError, BandEvent, Result};

/// Reading side of the channel. Each instance keeps its own cursor, so any
/// number of subscribers can poll the same region without affecting each
/// other or the publisher.
pub struct Subscriber {
    path: PathBuf,
    map: Mmap,
    last_sequence: u64,
}

impl Subscriber {
    /// Maps an existing region read-only. Fails when the publisher has not
    /// created it yet or it cannot be accessed; callers fall back to the
    /// file store in that case.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;

        // SAFETY: the mapping is read-only; the publisher never shrinks the
        // file below REGION_SIZE.
        let map = unsafe { Mmap::map(&file)? };
        if map.len() < REGION_SIZE {
            return Err(AetherError::RegionTooSmall {
                required: REGION_SIZE,
                actual: map.len(),
            });
        }

        Ok(Self {
            path,
            map,
            last_sequence: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sequence of the last frame this subscriber returned.
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Returns the newest frame if it is newer than the last one consumed.
    ///
    /// Never blocks and never errors: a missing, foreign, torn or
    /// undecodable frame all read as `None`. A frame overwritten mid-read is
    /// not retried; the next poll picks up its successor.
    pub fn poll(&mut self) -> Option<BandEvent> {
        self.poll_with(|| {})
    }

    /// `poll` with a hook that runs between copying the payload and
    /// re-checking the sequence.
    fn poll_with(&mut self, between_reads: impl FnOnce()) -> Option<BandEvent> {
        let sequence = self.sequence().load(Ordering::Acquire);
        if sequence == 0 {
            return None;
        }

        let header = ChannelHeader::parse(&self.copy_out(0..HEADER_SIZE)?)?;
        if !header.is_compatible() {
            tracing::debug!(
                magic = ?header.magic,
                version = header.version,
                "protocol mismatch on shared region"
            );
            return None;
        }
        if sequence <= self.last_sequence {
            return None;
        }

        let length = header.length as usize;
        if length == 0 || length > MAX_PAYLOAD {
            tracing::debug!(length, "payload length out of bounds");
            return None;
        }
        let payload = self.copy_out(HEADER_SIZE..HEADER_SIZE + length)?;

        between_reads();

        fence(Ordering::Acquire);
        let confirmed = self.sequence().load(Ordering::Relaxed);
        if confirmed != sequence {
            tracing::debug!(sequence, confirmed, "frame replaced mid-read, dropped");
            return None;
        }

        match BandEvent::decode(&payload) {
            Ok(event) => {
                self.last_sequence = sequence;
                Some(event)
            }
            Err(err) => {
                tracing::debug!(sequence, %err, "undecodable payload");
                None
            }
        }
    }

    /// Copies bytes out of the region without ever forming a shared slice
    /// over memory the publisher may be rewriting. Whatever was copied is
    /// only trusted once the sequence re-check passes.
    fn copy_out(&self, range: Range<usize>) -> Option<Vec<u8>> {
        if range.start > range.end || range.end > self.map.len() {
            return None;
        }
        let mut bytes = vec![0u8; range.len()];
        // SAFETY: `range` lies inside the mapping, which outlives this call,
        // and `bytes` is a separate allocation of the same length.
        unsafe {
            ptr::copy_nonoverlapping(
                self.map.as_ptr().add(range.start),
                bytes.as_mut_ptr(),
                bytes.len(),
            );
        }
        Some(bytes)
    }

    fn sequence(&self) -> &AtomicU64 {
        // SAFETY: the mapping is page aligned, at least REGION_SIZE bytes,
        // and lives as long as `self`.
        unsafe { sequence_cell(self.map.as_ptr()) }
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("path", &self.path)
            .field("last_sequence", &self.last_sequence)
            .finish()
    }
}
