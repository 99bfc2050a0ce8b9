//! Core library for the Aether audio visualiser.
//!
//! One producer process turns captured audio into [`BandEvent`]s with the
//! [`BandAnalyzer`] and publishes them through a memory-mapped [`channel`].
//! Any number of consumer processes (renderer, lighting controller, status
//! queries) read them back through an [`EventSource`] and animate from them
//! with [`SmoothedLevels`]. Nothing in the data path blocks or locks.

pub mod analysis;
pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod fallback;
pub mod smoothing;
pub mod source;

pub use analysis::BandAnalyzer;
pub use channel::{ChannelHeader, Publisher, Subscriber};
pub use client::QueryClient;
pub use config::{AetherConfig, AnalysisConfig, ChannelConfig, SmoothingConfig};
pub use error::{AetherError, Result};
pub use event::{Band, BandEvent, BandLevels, EventKind};
pub use fallback::FallbackStore;
pub use smoothing::{DecayPolicy, LevelSnapshot, SmoothedLevels, SmoothingState};
pub use source::{EventSink, EventSource, SourceStats};
