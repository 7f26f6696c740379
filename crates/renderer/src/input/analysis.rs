//! Spectrum analysis and beat tracking shared by the audio sources.

use std::collections::VecDeque;
use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::error::AudioError;

use super::{UniformMap, UniformValue};

pub const DEFAULT_FFT_SIZE: usize = 512;
pub const DEFAULT_SMOOTHING: f32 = 0.5;
pub const DEFAULT_BPM: f32 = 120.0;

const BEAT_RATIO: f32 = 1.3;
const AVERAGE_RETENTION: f32 = 0.9;
const ENERGY_FLOOR: f32 = 1e-4;
const MIN_BEAT_GAP: f32 = 0.3;
const MIN_INTERVAL: f32 = 0.3;
const MAX_INTERVAL: f32 = 2.0;
const INTERVAL_HISTORY: usize = 8;
const INTERVALS_FOR_TEMPO: usize = 3;
const PULSE_DECAY_RATE: f32 = 6.0;

/// Hann-windowed magnitude spectrum with exponential smoothing between frames.
pub struct SpectrumAnalyzer {
    fft_size: usize,
    smoothing: f32,
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    output: Vec<Complex32>,
    scratch: Vec<Complex32>,
    window: Vec<f32>,
    smoothed: Vec<f32>,
}

impl SpectrumAnalyzer {
    pub fn new(fft_size: usize, smoothing: f32) -> Result<Self, AudioError> {
        if fft_size < 16 || !fft_size.is_power_of_two() {
            return Err(AudioError::InvalidFftSize(fft_size));
        }
        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(fft_size);
        let input = plan.make_input_vec();
        let output = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();
        let bins = output.len();
        Ok(Self {
            fft_size,
            smoothing: smoothing.clamp(0.0, 0.999),
            plan,
            input,
            output,
            scratch,
            window: (0..fft_size).map(|i| hann_value(i, fft_size)).collect(),
            smoothed: vec![0.0; bins],
        })
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn bins(&self) -> usize {
        self.smoothed.len()
    }

    pub fn spectrum(&self) -> &[f32] {
        &self.smoothed
    }

    /// Analyses the last `fft_size` samples of `samples`, zero-padding the front
    /// when fewer are supplied, and returns the smoothed spectrum.
    pub fn analyze(&mut self, samples: &[f32]) -> &[f32] {
        let take = samples.len().min(self.fft_size);
        let pad = self.fft_size - take;
        self.input[..pad].fill(0.0);
        for ((slot, sample), weight) in self.input[pad..]
            .iter_mut()
            .zip(&samples[samples.len() - take..])
            .zip(&self.window[pad..])
        {
            *slot = sample * weight;
        }

        if let Err(error) =
            self.plan
                .process_with_scratch(&mut self.input, &mut self.output, &mut self.scratch)
        {
            tracing::debug!(%error, "fft failed; keeping previous spectrum");
            return &self.smoothed;
        }

        let norm = (self.fft_size / 2) as f32;
        let alpha = self.smoothing;
        for (smoothed, bin) in self.smoothed.iter_mut().zip(&self.output) {
            let magnitude = bin.norm() / norm;
            *smoothed = alpha * *smoothed + (1.0 - alpha) * magnitude;
        }
        &self.smoothed
    }

    /// Mean magnitude of the lowest tenth of the spectrum (at least one bin).
    pub fn low_band_energy(&self) -> f32 {
        let count = (self.smoothed.len() / 10).max(1);
        self.smoothed[..count].iter().sum::<f32>() / count as f32
    }
}

impl fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("fft_size", &self.fft_size)
            .field("smoothing", &self.smoothing)
            .finish()
    }
}

/// Tempo estimate and beat envelope after one tracker update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatState {
    pub bpm: f32,
    /// 0 until enough intervals exist to trust `bpm`.
    pub confidence: f32,
    /// Position inside the current beat, in `[0, 1)`.
    pub phase: f32,
    /// 1.0 on a beat, decaying toward 0.
    pub pulse: f32,
    /// A beat fired during this update.
    pub beat: bool,
}

impl Default for BeatState {
    fn default() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            confidence: 0.0,
            phase: 0.0,
            pulse: 0.0,
            beat: false,
        }
    }
}

/// Onset detector over low-band energy with a median-interval tempo estimate.
#[derive(Debug, Clone)]
pub struct BeatTracker {
    time: f32,
    average: f32,
    previous_energy: f32,
    previous_threshold: f32,
    last_beat: Option<f32>,
    intervals: VecDeque<f32>,
    state: BeatState,
}

impl BeatTracker {
    pub fn new() -> Self {
        Self {
            time: 0.0,
            average: 0.0,
            previous_energy: 0.0,
            previous_threshold: 0.0,
            last_beat: None,
            intervals: VecDeque::with_capacity(INTERVAL_HISTORY),
            state: BeatState::default(),
        }
    }

    pub fn state(&self) -> BeatState {
        self.state
    }

    pub fn update(&mut self, energy: f32, dt: f32) -> BeatState {
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        let energy = if energy.is_finite() { energy.max(0.0) } else { 0.0 };
        self.time += dt;

        let threshold = BEAT_RATIO * self.average;
        let rested = self
            .last_beat
            .map_or(true, |last| self.time - last > MIN_BEAT_GAP);
        let beat = energy > threshold
            && self.previous_energy <= self.previous_threshold
            && energy > ENERGY_FLOOR
            && rested;

        self.average = AVERAGE_RETENTION * self.average + (1.0 - AVERAGE_RETENTION) * energy;
        self.previous_energy = energy;
        self.previous_threshold = threshold;

        self.state.pulse *= (-PULSE_DECAY_RATE * dt).exp();
        if beat {
            self.register_beat();
        }
        self.state.beat = beat;
        self.state.phase = match self.last_beat {
            Some(last) => {
                let interval = 60.0 / self.state.bpm;
                ((self.time - last) / interval).rem_euclid(1.0)
            }
            None => 0.0,
        };
        self.state
    }

    fn register_beat(&mut self) {
        if let Some(last) = self.last_beat {
            let interval = self.time - last;
            if (MIN_INTERVAL..=MAX_INTERVAL).contains(&interval) {
                if self.intervals.len() == INTERVAL_HISTORY {
                    self.intervals.pop_front();
                }
                self.intervals.push_back(interval);
            }
        }
        self.last_beat = Some(self.time);
        self.state.pulse = 1.0;

        if self.intervals.len() >= INTERVALS_FOR_TEMPO {
            let median = median(self.intervals.iter().copied());
            self.state.bpm = 60.0 / median;
            self.state.confidence = self.intervals.len() as f32 / INTERVAL_HISTORY as f32;
            tracing::trace!(bpm = self.state.bpm, "tempo updated");
        }
    }
}

impl Default for BeatTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Analyzer plus tracker, the common core of the audio sources.
#[derive(Debug)]
pub(crate) struct AudioAnalysis {
    analyzer: SpectrumAnalyzer,
    tracker: BeatTracker,
}

impl AudioAnalysis {
    pub(crate) fn new(fft_size: usize, smoothing: f32) -> Result<Self, AudioError> {
        Ok(Self {
            analyzer: SpectrumAnalyzer::new(fft_size, smoothing)?,
            tracker: BeatTracker::new(),
        })
    }

    pub(crate) fn fft_size(&self) -> usize {
        self.analyzer.fft_size()
    }

    pub(crate) fn process(&mut self, window: &[f32], dt: f32) -> BeatState {
        self.analyzer.analyze(window);
        let energy = self.analyzer.low_band_energy();
        self.tracker.update(energy, dt)
    }

    pub(crate) fn state(&self) -> BeatState {
        self.tracker.state()
    }

    pub(crate) fn uniforms(&self) -> UniformMap {
        let state = self.tracker.state();
        let mut map = UniformMap::new();
        map.insert("iBPM".to_string(), UniformValue::Float(state.bpm));
        map.insert("iBeatPhase".to_string(), UniformValue::Float(state.phase));
        map.insert("iBeatPulse".to_string(), UniformValue::Float(state.pulse));
        map
    }
}

fn median(values: impl Iterator<Item = f32>) -> f32 {
    let mut sorted: Vec<f32> = values.collect();
    sorted.sort_by(f32::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) * 0.5
    } else {
        sorted[mid]
    }
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }
    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

/// Synthetic click track: a decaying 100 Hz burst every `period` seconds.
#[cfg(test)]
pub(crate) fn click_track(sample_rate: u32, seconds: f32, period: f32) -> Vec<f32> {
    let total = (sample_rate as f32 * seconds) as usize;
    let burst = 0.05;
    (0..total)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let local = t.rem_euclid(period);
            if local < burst {
                (2.0 * PI * 100.0 * local).sin() * (-local / 0.015).exp()
            } else {
                0.0
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_fft_sizes() {
        assert!(matches!(
            SpectrumAnalyzer::new(500, 0.5),
            Err(AudioError::InvalidFftSize(500))
        ));
        assert!(SpectrumAnalyzer::new(8, 0.5).is_err());
        assert!(SpectrumAnalyzer::new(512, 0.5).is_ok());
    }

    #[test]
    fn silence_yields_empty_spectrum() {
        let mut analyzer = SpectrumAnalyzer::new(512, 0.5).unwrap();
        let spectrum = analyzer.analyze(&[0.0; 512]);
        assert_eq!(spectrum.len(), 257);
        assert!(spectrum.iter().all(|bin| *bin == 0.0));
        assert_eq!(analyzer.low_band_energy(), 0.0);
    }

    #[test]
    fn low_tone_lands_in_low_band_and_smooths() {
        let mut analyzer = SpectrumAnalyzer::new(512, 0.5).unwrap();
        let tone: Vec<f32> = (0..512)
            .map(|i| (2.0 * PI * 8.0 * i as f32 / 512.0).sin())
            .collect();
        analyzer.analyze(&tone);
        let first = analyzer.spectrum()[8];
        assert!(first > 0.1);
        analyzer.analyze(&tone);
        let second = analyzer.spectrum()[8];
        assert!(second > first);
        assert!(analyzer.low_band_energy() > ENERGY_FLOOR);
    }

    #[test]
    fn reports_default_tempo_until_enough_beats() {
        let mut tracker = BeatTracker::new();
        let state = tracker.update(0.0, 1.0 / 60.0);
        assert_eq!(state.bpm, DEFAULT_BPM);
        assert_eq!(state.confidence, 0.0);
        assert_eq!(state.phase, 0.0);

        // Three beats give two intervals: still not trusted.
        for _ in 0..3 {
            tracker.update(1.0, 1.0 / 60.0);
            for _ in 0..29 {
                tracker.update(0.0, 1.0 / 60.0);
            }
        }
        assert_eq!(tracker.state().confidence, 0.0);
        assert_eq!(tracker.state().bpm, DEFAULT_BPM);
    }

    #[test]
    fn pulse_fires_and_decays() {
        let mut tracker = BeatTracker::new();
        let state = tracker.update(1.0, 1.0 / 60.0);
        assert!(state.beat);
        assert_eq!(state.pulse, 1.0);
        let later = tracker.update(0.0, 0.5);
        assert!(!later.beat);
        assert!((later.pulse - (-3.0f32).exp()).abs() < 1e-5);
        assert!((0.0..1.0).contains(&later.phase));
    }

    #[test]
    fn click_track_converges_to_120_bpm() {
        let sample_rate = 44_100;
        let track = click_track(sample_rate, 6.0, 0.5);
        let mut analysis = AudioAnalysis::new(DEFAULT_FFT_SIZE, DEFAULT_SMOOTHING).unwrap();
        let dt = 1.0 / 60.0;
        let step = sample_rate as f64 / 60.0;
        let mut playhead = 0.0f64;
        let mut state = BeatState::default();
        for _ in 0..300 {
            playhead += step;
            let end = (playhead as usize).min(track.len());
            state = analysis.process(&track[..end], dt);
        }
        assert!(state.confidence > 0.0, "tempo never locked: {state:?}");
        assert!((118.0..=122.0).contains(&state.bpm), "bpm {}", state.bpm);
        assert!((0.0..1.0).contains(&state.phase));
    }
}
