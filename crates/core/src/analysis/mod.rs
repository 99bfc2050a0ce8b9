use std::{fmt, ops::Range, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{config::AnalysisConfig, AetherError, Band, BandEvent, BandLevels, Result};

/// Lower edge of the range summed into the total energy.
const AUDIBLE_MIN_HZ: f32 = 20.0;
/// Upper edge of the total-energy range; content above it is mostly noise.
const AUDIBLE_MAX_HZ: f32 = 8000.0;
/// Float samples in `[-1, 1]` are scaled to the 16-bit range the log floors
/// are calibrated for.
const FLOAT_TO_PCM: f32 = 32768.0;

/// Turns fixed-size mono PCM frames into normalised band energies.
///
/// Every frame is analysed on its own: the only state kept between calls is
/// the FFT plan and its buffers. The magnitude spectrum is unwindowed, which
/// is what the log floor and range constants are tuned against.
pub struct BandAnalyzer {
    config: AnalysisConfig,
    fft: FftResources,
    band_bins: [Range<usize>; 7],
    audible_bins: Range<usize>,
}

impl BandAnalyzer {
    /// Creates an analyser for frames of `config.chunk_size` samples.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        let size = config.chunk_size;
        if size < 2 {
            return Err(AetherError::InvalidFrame {
                expected: 2,
                actual: size,
            });
        }

        let fft = FftResources::new(size);
        let bins = fft.spectrum.len();
        let bin_hz = config.sample_rate as f32 / size as f32;
        let band_bins = Band::ALL.map(|band| {
            let (low, high) = band.range_hz();
            bin_range(low, high, bin_hz, bins)
        });
        let audible_bins = bin_range(AUDIBLE_MIN_HZ, AUDIBLE_MAX_HZ, bin_hz, bins);

        tracing::debug!(
            sample_rate = config.sample_rate,
            chunk_size = size,
            bin_hz,
            "band analyser ready"
        );

        Ok(Self {
            config,
            fft,
            band_bins,
            audible_bins,
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Number of samples every frame must contain.
    pub fn frame_len(&self) -> usize {
        self.config.chunk_size
    }

    /// Analyses a 16-bit frame and returns the event to publish, or `None`
    /// when the frame is too quiet to be worth publishing.
    pub fn analyze(&mut self, frame: &[i16]) -> Result<Option<BandEvent>> {
        let levels = self.measure(frame)?;
        Ok(self.event_for(levels))
    }

    /// Same as [`BandAnalyzer::analyze`] for float samples in `[-1, 1]`.
    pub fn analyze_float(&mut self, frame: &[f32]) -> Result<Option<BandEvent>> {
        let levels = self.measure_float(frame)?;
        Ok(self.event_for(levels))
    }

    /// Computes band levels for a 16-bit frame without applying the
    /// publish thresholds.
    pub fn measure(&mut self, frame: &[i16]) -> Result<BandLevels> {
        self.check_len(frame.len())?;
        for (slot, sample) in self.fft.input.iter_mut().zip(frame) {
            *slot = f32::from(*sample);
        }
        self.levels_from_input()
    }

    pub fn measure_float(&mut self, frame: &[f32]) -> Result<BandLevels> {
        self.check_len(frame.len())?;
        for (slot, sample) in self.fft.input.iter_mut().zip(frame) {
            *slot = *sample * FLOAT_TO_PCM;
        }
        self.levels_from_input()
    }

    /// Applies the gate and noise-floor rules to measured levels.
    pub fn event_for(&self, levels: BandLevels) -> Option<BandEvent> {
        let (_, dominant) = levels.dominant();
        if levels.total <= self.config.gate_threshold {
            return None;
        }
        if levels.total < self.config.suppress_total && dominant < self.config.suppress_band {
            return None;
        }
        Some(BandEvent::from_levels(levels))
    }

    fn check_len(&self, actual: usize) -> Result<()> {
        if actual != self.config.chunk_size {
            return Err(AetherError::InvalidFrame {
                expected: self.config.chunk_size,
                actual,
            });
        }
        Ok(())
    }

    fn levels_from_input(&mut self) -> Result<BandLevels> {
        let fft = &mut self.fft;
        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)
            .map_err(|err| AetherError::Fft(err.to_string()))?;

        for (magnitude, bin) in fft.magnitudes.iter_mut().zip(&fft.spectrum) {
            *magnitude = bin.norm();
        }

        let mut levels = BandLevels::default();
        for (band, bins) in Band::ALL.into_iter().zip(&self.band_bins) {
            let energy: f32 = fft.magnitudes[bins.clone()].iter().sum();
            levels.set(
                band,
                log_scale(
                    energy,
                    self.config.band_log_floor,
                    self.config.band_log_range,
                ),
            );
        }

        let total: f32 = fft.magnitudes[self.audible_bins.clone()].iter().sum();
        levels.total = log_scale(
            total,
            self.config.total_log_floor,
            self.config.total_log_range,
        );

        Ok(levels)
    }
}

impl fmt::Debug for BandAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BandAnalyzer")
            .field("config", &self.config)
            .field("fft", &self.fft)
            .field("band_bins", &self.band_bins)
            .field("audible_bins", &self.audible_bins)
            .finish()
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    magnitudes: Vec<f32>,
    input: Vec<f32>,
}

impl FftResources {
    fn new(size: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let plan = planner.plan_fft_forward(size);
        let scratch = plan.make_scratch_vec();
        let spectrum = plan.make_output_vec();
        let input = plan.make_input_vec();
        let magnitudes = vec![0.0; spectrum.len()];
        Self {
            size,
            plan,
            scratch,
            spectrum,
            magnitudes,
            input,
        }
    }
}

impl fmt::Debug for FftResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftResources")
            .field("size", &self.size)
            .finish()
    }
}

/// Bins whose centre frequency lies in `[low, high)`.
fn bin_range(low: f32, high: f32, bin_hz: f32, bins: usize) -> Range<usize> {
    let start = (0..bins)
        .find(|i| *i as f32 * bin_hz >= low)
        .unwrap_or(bins);
    let end = (start..bins)
        .find(|i| *i as f32 * bin_hz >= high)
        .unwrap_or(bins);
    start..end
}

/// Maps a magnitude sum onto `[0, 1]` through a log10 window. Zero, negative
/// and NaN sums map to 0.
fn log_scale(energy: f32, floor: f32, range: f32) -> f32 {
    if !(energy > 0.0) {
        return 0.0;
    }
    let scaled = (energy.log10() - floor) / range.max(f32::EPSILON);
    if scaled.is_nan() {
        0.0
    } else {
        scaled.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use proptest::prelude::*;

    use super::*;
    use crate::EventKind;

    const CHUNK: usize = 2048;

    fn analyzer() -> BandAnalyzer {
        BandAnalyzer::new(AnalysisConfig::default()).unwrap()
    }

    /// Sine sitting exactly on FFT bin `bin`, so it does not leak into
    /// neighbouring bands.
    fn sine_on_bin(bin: usize, amplitude: f32) -> Vec<i16> {
        (0..CHUNK)
            .map(|n| (amplitude * (2.0 * PI * bin as f32 * n as f32 / CHUNK as f32).sin()) as i16)
            .collect()
    }

    #[test]
    fn silence_yields_zero_levels_and_no_event() {
        let mut analyzer = analyzer();
        let silence = vec![0_i16; CHUNK];

        let levels = analyzer.measure(&silence).unwrap();
        assert!(levels.is_silent());
        assert!(analyzer.analyze(&silence).unwrap().is_none());
    }

    #[test]
    fn bass_tone_dominates_bass_band() {
        let mut analyzer = analyzer();
        // bin 6 is 140.625 Hz at 48 kHz / 2048
        let event = analyzer
            .analyze(&sine_on_bin(6, 10_000.0))
            .unwrap()
            .expect("loud tone should be published");

        assert_eq!(event.kind, EventKind::Audio);
        assert_eq!(event.dominant_band().0, Band::Bass);
        assert_eq!(event.frequency, 150);
        assert!(event.bands.bass > 0.5);
        assert!(event.bands.treble < event.bands.bass);
        assert!(event.total() > 0.0);
        assert_eq!(event.amplitude, event.total().max(event.bands.bass));
    }

    #[test]
    fn treble_tone_reports_treble_frequency() {
        let mut analyzer = analyzer();
        // bin 128 is 3 kHz
        let event = analyzer.analyze(&sine_on_bin(128, 10_000.0)).unwrap().unwrap();
        assert_eq!(event.dominant_band().0, Band::Treble);
        assert_eq!(event.frequency, 3000);
    }

    #[test]
    fn quiet_tone_is_suppressed() {
        let mut analyzer = analyzer();
        assert!(analyzer.analyze(&sine_on_bin(6, 20.0)).unwrap().is_none());
    }

    #[test]
    fn broadband_hum_below_every_band_floor_reports_sub_bass() {
        let mut analyzer = analyzer();
        let mut frame = vec![0_i16; CHUNK];
        // One bin per band, each just under the band floor.
        for bin in [1, 6, 16, 32, 64, 128, 256] {
            for (sample, tone) in frame.iter_mut().zip(sine_on_bin(bin, 290.0)) {
                *sample += tone;
            }
        }

        let event = analyzer
            .analyze(&frame)
            .unwrap()
            .expect("total clears the gate");
        assert!(event.bands.as_array().iter().all(|level| *level == 0.0));
        assert!(event.total() > analyzer.config().suppress_total);
        assert_eq!(event.frequency, Band::SubBass.center_frequency());
        assert_eq!(event.frequency, 40);
        assert_eq!(event.amplitude, event.total());
    }

    #[test]
    fn float_frames_match_pcm_scale() {
        let mut analyzer = analyzer();
        let pcm = sine_on_bin(6, 10_000.0);
        let float: Vec<f32> = pcm.iter().map(|s| *s as f32 / FLOAT_TO_PCM).collect();

        let a = analyzer.measure(&pcm).unwrap();
        let b = analyzer.measure_float(&float).unwrap();
        assert!((a.bass - b.bass).abs() < 1e-3);
        assert!((a.total - b.total).abs() < 1e-3);
    }

    #[test]
    fn rejects_short_frames() {
        let mut analyzer = analyzer();
        let err = analyzer.analyze(&[0_i16; 100]).unwrap_err();
        assert!(matches!(
            err,
            AetherError::InvalidFrame {
                expected: CHUNK,
                actual: 100
            }
        ));
    }

    #[test]
    fn rejects_degenerate_chunk_size() {
        let config = AnalysisConfig {
            chunk_size: 1,
            ..Default::default()
        };
        assert!(BandAnalyzer::new(config).is_err());
    }

    #[test]
    fn nan_samples_stay_in_range() {
        let mut analyzer = analyzer();
        let mut frame = vec![0.25_f32; CHUNK];
        frame[10] = f32::NAN;
        frame[11] = f32::INFINITY;

        let levels = analyzer.measure_float(&frame).unwrap();
        for (_, value) in levels.iter() {
            assert!((0.0..=1.0).contains(&value));
        }
        assert!((0.0..=1.0).contains(&levels.total));
    }

    #[test]
    fn band_bins_follow_band_edges() {
        let analyzer = analyzer();
        let bin_hz = 48_000.0 / CHUNK as f32;
        for (band, bins) in Band::ALL.into_iter().zip(&analyzer.band_bins) {
            let (low, high) = band.range_hz();
            for bin in bins.clone() {
                let hz = bin as f32 * bin_hz;
                assert!(hz >= low && hz < high, "{band} bin {bin} at {hz} Hz");
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn levels_are_always_normalised(frame in proptest::collection::vec(any::<i16>(), CHUNK)) {
            let mut analyzer = analyzer();
            let levels = analyzer.measure(&frame).unwrap();
            for (_, value) in levels.iter() {
                prop_assert!((0.0..=1.0).contains(&value));
            }
            prop_assert!((0.0..=1.0).contains(&levels.total));
        }
    }
}
