//! Lock-free single-writer, multi-reader channel over a memory-mapped file.
//!
//! Region layout (native endian, 4096 bytes):
//!
//! | offset | size | field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 4    | magic `AEHR`                            |
//! | 4      | 4    | protocol version                        |
//! | 8      | 8    | sequence, 0 = never published           |
//! | 16     | 4    | payload length                          |
//! | 20     | ..   | JSON-encoded [`BandEvent`](crate::BandEvent) |
//!
//! The publisher writes the payload first and commits it by storing the new
//! sequence last, with release ordering. A subscriber loads the sequence with
//! acquire ordering, copies the payload, then loads the sequence again after
//! an acquire fence; if the two loads differ the copy may be torn and is
//! dropped.
//!
//! Both roles map the same file with `MAP_SHARED`, so they see the same
//! physical pages and the store/load ordering above carries across process
//! boundaries. Platforms whose file mappings are not coherent between
//! processes cannot host this channel.

use std::sync::atomic::AtomicU64;

mod publisher;
mod subscriber;

pub use publisher::Publisher;
pub use subscriber::Subscriber;

/// Fixed size of the mapped region.
pub const REGION_SIZE: usize = 4096;
/// Protocol tag, identical for every version of this header shape.
pub const MAGIC: [u8; 4] = *b"AEHR";
pub const PROTOCOL_VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 20;
/// Largest payload that fits behind the header.
pub const MAX_PAYLOAD: usize = REGION_SIZE - HEADER_SIZE;

const VERSION_OFFSET: usize = 4;
const SEQUENCE_OFFSET: usize = 8;
const LENGTH_OFFSET: usize = 16;

/// Decoded view of the 20-byte region header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub sequence: u64,
    pub length: u32,
}

impl ChannelHeader {
    pub fn new(sequence: u64, length: u32) -> Self {
        Self {
            magic: MAGIC,
            version: PROTOCOL_VERSION,
            sequence,
            length,
        }
    }

    /// Parses the first [`HEADER_SIZE`] bytes of `bytes`.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let header = bytes.get(..HEADER_SIZE)?;
        Some(Self {
            magic: header[..VERSION_OFFSET].try_into().ok()?,
            version: u32::from_ne_bytes(
                header[VERSION_OFFSET..SEQUENCE_OFFSET].try_into().ok()?,
            ),
            sequence: u64::from_ne_bytes(
                header[SEQUENCE_OFFSET..LENGTH_OFFSET].try_into().ok()?,
            ),
            length: u32::from_ne_bytes(header[LENGTH_OFFSET..HEADER_SIZE].try_into().ok()?),
        })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[..VERSION_OFFSET].copy_from_slice(&self.magic);
        bytes[VERSION_OFFSET..SEQUENCE_OFFSET].copy_from_slice(&self.version.to_ne_bytes());
        bytes[SEQUENCE_OFFSET..LENGTH_OFFSET].copy_from_slice(&self.sequence.to_ne_bytes());
        bytes[LENGTH_OFFSET..HEADER_SIZE].copy_from_slice(&self.length.to_ne_bytes());
        bytes
    }

    /// Magic and version match this build.
    pub fn is_compatible(&self) -> bool {
        self.magic == MAGIC && self.version == PROTOCOL_VERSION
    }
}

/// Views the sequence field of a mapped region as an atomic.
///
/// # Safety
///
/// `base` must be the start of a live mapping of at least [`HEADER_SIZE`]
/// bytes, aligned to 8 bytes, that outlives `'a`. Page-aligned mappings
/// satisfy the alignment.
unsafe fn sequence_cell<'a>(base: *const u8) -> &'a AtomicU64 {
    &*(base.add(SEQUENCE_OFFSET) as *const AtomicU64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_fixed() {
        let header = ChannelHeader::new(7, 321);
        let bytes = header.to_bytes();

        assert_eq!(&bytes[..4], b"AEHR");
        assert_eq!(u64::from_ne_bytes(bytes[8..16].try_into().unwrap()), 7);
        assert_eq!(ChannelHeader::parse(&bytes), Some(header));
        assert!(header.is_compatible());
    }

    #[test]
    fn foreign_headers_are_incompatible() {
        let mut header = ChannelHeader::new(1, 10);
        header.version = 2;
        assert!(!header.is_compatible());

        let mut header = ChannelHeader::new(1, 10);
        header.magic = *b"XXXX";
        assert!(!header.is_compatible());

        assert_eq!(ChannelHeader::parse(&[0u8; 8]), None);
    }
}
