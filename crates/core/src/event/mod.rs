//! The band event exchanged between the daemon and every consumer.
//!
//! On the wire an event is a JSON object:
//!
//! ```json
//! {"type": "audio",
//!  "bands": {"sub_bass": 0.1, "bass": 0.9, ..., "sparkle": 0.0, "total": 0.8},
//!  "frequency": 150, "amplitude": 0.9, "timestamp": 1718000000.25}
//! ```
//!
//! Unknown keys are ignored and missing keys default to zero or absent, so a
//! reader from a different release can still make sense of the payload.

use std::{
    fmt,
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

use crate::{AetherError, Result};

/// Seconds since the Unix epoch, as carried in `timestamp`.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}

/// Named frequency range of the analysed spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    SubBass,
    Bass,
    LowMid,
    Mid,
    HighMid,
    Treble,
    Sparkle,
}

impl Band {
    /// All bands, lowest first. This order is also the tie-break order when
    /// picking the dominant band.
    pub const ALL: [Band; 7] = [
        Band::SubBass,
        Band::Bass,
        Band::LowMid,
        Band::Mid,
        Band::HighMid,
        Band::Treble,
        Band::Sparkle,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Band::SubBass => "sub_bass",
            Band::Bass => "bass",
            Band::LowMid => "low_mid",
            Band::Mid => "mid",
            Band::HighMid => "high_mid",
            Band::Treble => "treble",
            Band::Sparkle => "sparkle",
        }
    }

    /// Half-open `[low, high)` range in Hz.
    pub fn range_hz(self) -> (f32, f32) {
        match self {
            Band::SubBass => (20.0, 60.0),
            Band::Bass => (60.0, 250.0),
            Band::LowMid => (250.0, 500.0),
            Band::Mid => (500.0, 1000.0),
            Band::HighMid => (1000.0, 2000.0),
            Band::Treble => (2000.0, 4000.0),
            Band::Sparkle => (4000.0, 8000.0),
        }
    }

    /// Frequency reported in an event's `frequency` field when this band
    /// dominates.
    pub fn center_frequency(self) -> u32 {
        match self {
            Band::SubBass => 40,
            Band::Bass => 150,
            Band::LowMid => 375,
            Band::Mid => 750,
            Band::HighMid => 1500,
            Band::Treble => 3000,
            Band::Sparkle => 6000,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Band {
    type Err = AetherError;

    fn from_str(s: &str) -> Result<Self> {
        Band::ALL
            .into_iter()
            .find(|band| band.as_str() == s)
            .ok_or_else(|| AetherError::msg(format!("unknown band `{s}`")))
    }
}

/// Normalised energy per band plus the overall energy, all in `[0, 1]`.
///
/// `total` is normalised on its own scale and is not the sum of the bands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandLevels {
    pub sub_bass: f32,
    pub bass: f32,
    pub low_mid: f32,
    pub mid: f32,
    pub high_mid: f32,
    pub treble: f32,
    pub sparkle: f32,
    pub total: f32,
}

impl BandLevels {
    pub fn get(&self, band: Band) -> f32 {
        self.as_array()[band.index()]
    }

    pub fn set(&mut self, band: Band, value: f32) {
        let slot = match band {
            Band::SubBass => &mut self.sub_bass,
            Band::Bass => &mut self.bass,
            Band::LowMid => &mut self.low_mid,
            Band::Mid => &mut self.mid,
            Band::HighMid => &mut self.high_mid,
            Band::Treble => &mut self.treble,
            Band::Sparkle => &mut self.sparkle,
        };
        *slot = value;
    }

    /// Looks a level up by its wire name, `total` included.
    pub fn by_name(&self, name: &str) -> Option<f32> {
        if name == "total" {
            return Some(self.total);
        }
        name.parse::<Band>().ok().map(|band| self.get(band))
    }

    pub fn as_array(&self) -> [f32; 7] {
        [
            self.sub_bass,
            self.bass,
            self.low_mid,
            self.mid,
            self.high_mid,
            self.treble,
            self.sparkle,
        ]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Band, f32)> + '_ {
        Band::ALL.into_iter().map(|band| (band, self.get(band)))
    }

    /// The band with the most energy, `total` excluded. Ties go to the
    /// lowest band.
    pub fn dominant(&self) -> (Band, f32) {
        let mut best = (Band::SubBass, self.sub_bass);
        for (band, value) in self.iter().skip(1) {
            if value > best.1 {
                best = (band, value);
            }
        }
        best
    }

    /// True when every band and the total are zero.
    pub fn is_silent(&self) -> bool {
        self.total == 0.0 && self.as_array().iter().all(|value| *value == 0.0)
    }
}

/// Kind tag carried in the `type` key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Multi-band analysis from the audio daemon.
    #[default]
    Audio,
    /// Single-frequency event without bands.
    KeyPress,
    /// Any kind this build does not know about.
    #[serde(other)]
    Other,
}

/// One published analysis result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandEvent {
    #[serde(rename = "type", default)]
    pub kind: EventKind,
    #[serde(default)]
    pub bands: BandLevels,
    /// Centre frequency of the dominant band.
    #[serde(default)]
    pub frequency: u32,
    /// `max(total, dominant band)`.
    #[serde(default)]
    pub amplitude: f32,
    /// Seconds since the Unix epoch, stamped by the publisher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl BandEvent {
    /// Builds an audio event from analysed levels, deriving the dominant
    /// frequency and the amplitude. When every band is zero the tie goes to
    /// `sub_bass`, so the frequency is still a band centre.
    pub fn from_levels(bands: BandLevels) -> Self {
        let (band, value) = bands.dominant();
        Self {
            kind: EventKind::Audio,
            bands,
            frequency: band.center_frequency(),
            amplitude: bands.total.max(value),
            timestamp: None,
        }
    }

    pub fn total(&self) -> f32 {
        self.bands.total
    }

    pub fn dominant_band(&self) -> (Band, f32) {
        self.bands.dominant()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn levels(bass: f32, treble: f32, total: f32) -> BandLevels {
        BandLevels {
            bass,
            treble,
            total,
            ..Default::default()
        }
    }

    #[test]
    fn event_from_levels_uses_dominant_band() {
        let event = BandEvent::from_levels(levels(0.9, 0.1, 0.8));
        assert_eq!(event.kind, EventKind::Audio);
        assert_eq!(event.frequency, 150);
        assert_eq!(event.amplitude, 0.9);
    }

    #[test]
    fn amplitude_prefers_total_when_larger() {
        let event = BandEvent::from_levels(levels(0.2, 0.1, 0.7));
        assert_eq!(event.amplitude, 0.7);
    }

    #[test]
    fn zero_bands_report_the_sub_bass_centre() {
        let event = BandEvent::from_levels(levels(0.0, 0.0, 0.3));
        assert_eq!(event.dominant_band(), (Band::SubBass, 0.0));
        assert_eq!(event.frequency, 40);
        assert_eq!(event.amplitude, 0.3);
    }

    #[test]
    fn dominant_tie_goes_to_lowest_band() {
        let mut bands = BandLevels::default();
        bands.mid = 0.5;
        bands.treble = 0.5;
        assert_eq!(bands.dominant(), (Band::Mid, 0.5));

        assert_eq!(BandLevels::default().dominant().0, Band::SubBass);
    }

    #[test]
    fn wire_format_keeps_total_inside_bands() {
        let event = BandEvent::from_levels(levels(0.9, 0.1, 0.8));
        let value: serde_json::Value = serde_json::from_slice(&event.encode().unwrap()).unwrap();

        assert_eq!(value["type"], "audio");
        assert!(value["bands"]["total"].is_number());
        assert!(value["bands"]["sparkle"].is_number());
        assert!(value.get("timestamp").is_none());
    }

    #[test]
    fn decode_ignores_unknown_keys_and_defaults_missing_ones() {
        let raw = br#"{"type": "key_press", "frequency": 262, "extra": [1, 2],
                       "bands": {"bass": 0.4, "presence": 0.9}}"#;
        let event = BandEvent::decode(raw).unwrap();

        assert_eq!(event.kind, EventKind::KeyPress);
        assert_eq!(event.frequency, 262);
        assert_eq!(event.amplitude, 0.0);
        assert_eq!(event.bands.bass, 0.4);
        assert_eq!(event.bands.total, 0.0);
        assert_eq!(event.timestamp, None);
    }

    #[test]
    fn unknown_kind_decodes_as_other() {
        let event = BandEvent::decode(br#"{"type": "beat"}"#).unwrap();
        assert_eq!(event.kind, EventKind::Other);
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(BandEvent::decode(b"{\"type\": \"aud").is_err());
    }

    #[test]
    fn band_names_parse() {
        for band in Band::ALL {
            assert_eq!(band.as_str().parse::<Band>().unwrap(), band);
        }
        assert!("presence".parse::<Band>().is_err());

        let bands = levels(0.3, 0.0, 0.6);
        assert_eq!(bands.by_name("bass"), Some(0.3));
        assert_eq!(bands.by_name("total"), Some(0.6));
        assert_eq!(bands.by_name("nope"), None);
    }

    fn unit() -> impl Strategy<Value = f32> {
        0.0f32..=1.0
    }

    proptest! {
        #[test]
        fn encode_decode_round_trips(
            values in proptest::array::uniform7(unit()),
            total in unit(),
            timestamp in proptest::option::of(0.0f64..4.0e9),
        ) {
            let mut bands = BandLevels { total, ..Default::default() };
            for (band, value) in Band::ALL.into_iter().zip(values) {
                bands.set(band, value);
            }
            let mut event = BandEvent::from_levels(bands);
            event.timestamp = timestamp;

            let decoded = BandEvent::decode(&event.encode().unwrap()).unwrap();
            prop_assert_eq!(decoded, event);
        }
    }
}
