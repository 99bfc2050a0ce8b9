//! Consumer-side interpolation between irregular events.
//!
//! Each animated quantity is a [`SmoothingState`]: events overwrite its
//! target, every render tick moves the current value part of the way there,
//! and decay pulls the target back to silence when the events stop.

use crate::{config::SmoothingConfig, BandEvent, EventKind};

/// Current/target pair for one animated value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingState {
    current: f32,
    target: f32,
    smoothing: f32,
    decay: f32,
}

impl SmoothingState {
    /// Both coefficients are clamped to `[0, 1]`.
    pub fn new(smoothing: f32, decay: f32) -> Self {
        Self {
            current: 0.0,
            target: 0.0,
            smoothing: unit(smoothing),
            decay: unit(decay),
        }
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    /// Replaces the target. Negative and NaN targets become 0.
    pub fn on_event(&mut self, target: f32) {
        self.target = target.max(0.0);
    }

    /// Closes `smoothing` of the gap between current and target.
    pub fn tick(&mut self) -> f32 {
        self.current += (self.target - self.current) * self.smoothing;
        self.current
    }

    /// Scales the target toward zero.
    pub fn decay(&mut self) {
        self.target *= self.decay;
    }
}

fn unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// When a consumer decays its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecayPolicy {
    /// After every rendered frame, fresh event or not. Used by the terminal
    /// visualizer, whose levels fall back between events.
    EveryFrame,
    /// Only once more than `hold_frames` consecutive frames passed without a
    /// fresh event. Used by the lighting controller so LEDs hold steady
    /// through short gaps.
    WhenIdle { hold_frames: u32 },
}

/// Smoothed values a consumer renders from.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LevelSnapshot {
    pub amplitude: f32,
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

/// Amplitude plus the low/mid/high aggregates, smoothed together.
#[derive(Debug, Clone)]
pub struct SmoothedLevels {
    pub amplitude: SmoothingState,
    pub low: SmoothingState,
    pub mid: SmoothingState,
    pub high: SmoothingState,
    policy: DecayPolicy,
    idle_frames: u32,
}

impl SmoothedLevels {
    pub fn new(config: &SmoothingConfig, policy: DecayPolicy) -> Self {
        let state = SmoothingState::new(config.smooth_factor, config.decay_factor);
        Self {
            amplitude: state,
            low: state,
            mid: state,
            high: state,
            policy,
            idle_frames: 0,
        }
    }

    pub fn visualizer(config: &SmoothingConfig) -> Self {
        Self::new(config, DecayPolicy::EveryFrame)
    }

    pub fn lighting(config: &SmoothingConfig) -> Self {
        Self::new(
            config,
            DecayPolicy::WhenIdle {
                hold_frames: config.silence_hold_frames,
            },
        )
    }

    pub fn policy(&self) -> DecayPolicy {
        self.policy
    }

    /// Sets all targets from an event. Returns `false`, leaving the targets
    /// alone, for kinds this consumer does not render.
    ///
    /// Audio events drive amplitude from the dominant band, and the
    /// aggregates are band means: low = sub_bass, bass; mid = low_mid, mid,
    /// high_mid; high = treble, sparkle. Key presses carry no bands, so their
    /// amplitude goes to the one aggregate their frequency falls in.
    pub fn apply(&mut self, event: &BandEvent) -> bool {
        match event.kind {
            EventKind::Audio => self.apply_bands(event),
            EventKind::KeyPress => self.apply_tone(event.frequency, event.amplitude),
            EventKind::Other => return false,
        }
        true
    }

    fn apply_bands(&mut self, event: &BandEvent) {
        let bands = &event.bands;
        let amplitude = if bands.is_silent() {
            event.amplitude
        } else {
            bands.dominant().1
        };

        self.amplitude.on_event(amplitude.clamp(0.0, 1.0));
        self.low.on_event((bands.sub_bass + bands.bass) / 2.0);
        self.mid
            .on_event((bands.low_mid + bands.mid + bands.high_mid) / 3.0);
        self.high.on_event((bands.treble + bands.sparkle) / 2.0);
    }

    /// Low takes 130..=250 Hz, mid 250..600 Hz exclusive at both ends, high
    /// 600..=1100 Hz. Anything else leaves all three at zero.
    fn apply_tone(&mut self, frequency: u32, amplitude: f32) {
        let amplitude = amplitude.clamp(0.0, 1.0);
        let level = |hit: bool| if hit { amplitude } else { 0.0 };

        self.amplitude.on_event(amplitude);
        self.low.on_event(level((130..=250).contains(&frequency)));
        self.mid.on_event(level(frequency > 250 && frequency < 600));
        self.high.on_event(level((600..=1100).contains(&frequency)));
    }

    /// Runs one render frame: apply the fresh event if any, tick every
    /// channel, then decay according to the policy. An event `apply` skips
    /// counts as an idle frame.
    pub fn frame(&mut self, event: Option<&BandEvent>) -> LevelSnapshot {
        if event.is_some_and(|event| self.apply(event)) {
            self.idle_frames = 0;
        } else {
            self.idle_frames = self.idle_frames.saturating_add(1);
        }

        let snapshot = LevelSnapshot {
            amplitude: self.amplitude.tick(),
            low: self.low.tick(),
            mid: self.mid.tick(),
            high: self.high.tick(),
        };

        let decay = match self.policy {
            DecayPolicy::EveryFrame => true,
            DecayPolicy::WhenIdle { hold_frames } => self.idle_frames > hold_frames,
        };
        if decay {
            for state in self.states_mut() {
                state.decay();
            }
        }

        snapshot
    }

    pub fn snapshot(&self) -> LevelSnapshot {
        LevelSnapshot {
            amplitude: self.amplitude.current(),
            low: self.low.current(),
            mid: self.mid.current(),
            high: self.high.current(),
        }
    }

    fn states_mut(&mut self) -> [&mut SmoothingState; 4] {
        [
            &mut self.amplitude,
            &mut self.low,
            &mut self.mid,
            &mut self.high,
        ]
    }
}
