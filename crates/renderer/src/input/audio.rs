use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crossbeam_channel::{Receiver, Sender};

use crate::error::AudioError;

use super::analysis::{AudioAnalysis, BeatState, DEFAULT_FFT_SIZE, DEFAULT_SMOOTHING};
use super::{SourceKind, UniformMap, UniformSource};

/// Analysis parameters shared by the file and microphone sources.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioSettings {
    pub fft_size: usize,
    /// Spectrum smoothing factor `α` in `[0, 1)`.
    pub smoothing: f32,
    /// Restart file playback at the end instead of falling silent.
    pub looping: bool,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            smoothing: DEFAULT_SMOOTHING,
            looping: true,
        }
    }
}

/// Beat/BPM uniforms from a WAV file played back in step with the render clock.
pub struct AudioFileSource {
    label: String,
    samples: Vec<f32>,
    sample_rate: u32,
    playhead: f64,
    wrapped: bool,
    looping: bool,
    window: Vec<f32>,
    analysis: AudioAnalysis,
}

impl AudioFileSource {
    /// Decodes `path` once, mixing every channel down to mono.
    pub fn open(path: &Path, settings: AudioSettings) -> Result<Self, AudioError> {
        let (samples, sample_rate) = decode_wav(path)?;
        if samples.is_empty() {
            return Err(AudioError::Empty {
                path: path.to_path_buf(),
            });
        }
        tracing::info!(
            path = %path.display(),
            sample_rate,
            seconds = samples.len() as f32 / sample_rate as f32,
            "decoded audio file"
        );
        let label = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        Self::build(label, samples, sample_rate, settings)
    }

    /// Uses already-decoded mono samples.
    pub fn from_samples(
        samples: Vec<f32>,
        sample_rate: u32,
        settings: AudioSettings,
    ) -> Result<Self, AudioError> {
        if samples.is_empty() {
            return Err(AudioError::Empty {
                path: PathBuf::from("<memory>"),
            });
        }
        Self::build("audio".to_string(), samples, sample_rate, settings)
    }

    fn build(
        label: String,
        samples: Vec<f32>,
        sample_rate: u32,
        settings: AudioSettings,
    ) -> Result<Self, AudioError> {
        if sample_rate == 0 {
            return Err(AudioError::InvalidSampleRate);
        }
        let analysis = AudioAnalysis::new(settings.fft_size, settings.smoothing)?;
        Ok(Self {
            label,
            samples,
            sample_rate,
            playhead: 0.0,
            wrapped: false,
            looping: settings.looping,
            window: vec![0.0; settings.fft_size],
            analysis,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Playhead position in seconds.
    pub fn position(&self) -> f64 {
        self.playhead / f64::from(self.sample_rate)
    }

    pub fn beat(&self) -> BeatState {
        self.analysis.state()
    }

    fn advance_playhead(&mut self, dt: f32) {
        let len = self.samples.len() as f64;
        self.playhead += f64::from(dt) * f64::from(self.sample_rate);
        if self.playhead >= len {
            if self.looping {
                self.playhead %= len;
                self.wrapped = true;
            } else {
                self.playhead = len;
            }
        }
    }

    /// Fills `window` with the `fft_size` samples ending at the playhead.
    fn fill_window(&mut self) {
        let len = self.samples.len() as i64;
        let end = self.playhead as i64;
        let size = self.window.len() as i64;
        for (offset, slot) in self.window.iter_mut().enumerate() {
            let index = end - size + offset as i64;
            *slot = if (0..len).contains(&index) {
                self.samples[index as usize]
            } else if index < 0 && self.wrapped {
                self.samples[index.rem_euclid(len) as usize]
            } else {
                0.0
            };
        }
    }
}

impl UniformSource for AudioFileSource {
    fn name(&self) -> &str {
        &self.label
    }

    fn kind(&self) -> SourceKind {
        SourceKind::AudioFile
    }

    fn step(&mut self, dt: f32) {
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        self.advance_playhead(dt);
        self.fill_window();
        self.analysis.process(&self.window, dt);
    }

    fn uniforms(&self) -> UniformMap {
        self.analysis.uniforms()
    }
}

fn decode_wav(path: &Path) -> Result<(Vec<f32>, u32), AudioError> {
    let decode_error = |source| AudioError::Decode {
        path: path.to_path_buf(),
        source,
    };
    let reader = hound::WavReader::open(path).map_err(decode_error)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(decode_error)?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 * scale))
                .collect::<Result<_, _>>()
                .map_err(decode_error)?
        }
    };

    let mono = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();
    Ok((mono, spec.sample_rate))
}

const MICROPHONE_QUEUE: usize = 64;

/// Sender half handed to an external capture thread.
#[derive(Debug, Clone)]
pub struct MicrophoneHandle {
    sender: Sender<Vec<f32>>,
}

impl MicrophoneHandle {
    /// Queues a block of mono samples. Returns `false` if the source is gone or saturated.
    pub fn push(&self, block: Vec<f32>) -> bool {
        self.sender.try_send(block).is_ok()
    }
}

/// Beat/BPM uniforms from live samples pushed by a capture thread.
pub struct MicrophoneSource {
    receiver: Receiver<Vec<f32>>,
    ring: VecDeque<f32>,
    window: Vec<f32>,
    analysis: AudioAnalysis,
}

impl MicrophoneSource {
    pub fn new(settings: AudioSettings) -> Result<(Self, MicrophoneHandle), AudioError> {
        let analysis = AudioAnalysis::new(settings.fft_size, settings.smoothing)?;
        let (sender, receiver) = crossbeam_channel::bounded(MICROPHONE_QUEUE);
        let source = Self {
            receiver,
            ring: VecDeque::with_capacity(analysis.fft_size()),
            window: Vec::with_capacity(analysis.fft_size()),
            analysis,
        };
        Ok((source, MicrophoneHandle { sender }))
    }

    pub fn beat(&self) -> BeatState {
        self.analysis.state()
    }
}

impl UniformSource for MicrophoneSource {
    fn name(&self) -> &str {
        "microphone"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Microphone
    }

    fn step(&mut self, dt: f32) {
        let capacity = self.analysis.fft_size();
        while let Ok(block) = self.receiver.try_recv() {
            self.ring.extend(block);
        }
        if self.ring.len() > capacity {
            let excess = self.ring.len() - capacity;
            self.ring.drain(..excess);
        }
        self.window.clear();
        self.window.extend(self.ring.iter().copied());
        self.analysis.process(&self.window, dt);
    }

    fn uniforms(&self) -> UniformMap {
        self.analysis.uniforms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::analysis::click_track;
    use crate::input::UniformValue;

    fn write_wav(path: &Path, samples: &[f32], sample_rate: u32, channels: u16) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for sample in samples {
            for _ in 0..channels {
                writer
                    .write_sample((sample * i16::MAX as f32) as i16)
                    .unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn wav_file_drives_beat_uniforms() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clicks.wav");
        write_wav(&path, &click_track(44_100, 6.0, 0.5), 44_100, 2);

        let mut source = AudioFileSource::open(&path, AudioSettings::default()).unwrap();
        assert_eq!(source.sample_rate(), 44_100);
        for _ in 0..300 {
            source.step(1.0 / 60.0);
        }
        let beat = source.beat();
        assert!((118.0..=122.0).contains(&beat.bpm), "bpm {}", beat.bpm);
        let uniforms = source.uniforms();
        assert_eq!(uniforms["iBPM"], UniformValue::Float(beat.bpm));
        assert!(uniforms.contains_key("iBeatPhase"));
        assert!(uniforms.contains_key("iBeatPulse"));
    }

    #[test]
    fn missing_file_fails_construction() {
        let error = AudioFileSource::open(Path::new("/nonexistent/track.wav"), AudioSettings::default());
        assert!(matches!(error, Err(AudioError::Decode { .. })));
    }

    #[test]
    fn playhead_loops_or_holds() {
        let settings = AudioSettings {
            looping: false,
            ..AudioSettings::default()
        };
        let mut held = AudioFileSource::from_samples(vec![0.0; 1000], 1000, settings).unwrap();
        held.step(2.5);
        assert_eq!(held.position(), 1.0);

        let mut looped =
            AudioFileSource::from_samples(vec![0.0; 1000], 1000, AudioSettings::default())
                .unwrap();
        looped.step(2.5);
        assert!((looped.position() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(
            AudioFileSource::from_samples(Vec::new(), 44_100, AudioSettings::default()),
            Err(AudioError::Empty { .. })
        ));
        assert!(matches!(
            AudioFileSource::from_samples(vec![0.0; 16], 0, AudioSettings::default()),
            Err(AudioError::InvalidSampleRate)
        ));
    }

    #[test]
    fn microphone_drains_pushed_blocks() {
        let (mut source, handle) = MicrophoneSource::new(AudioSettings::default()).unwrap();
        let track = click_track(44_100, 6.0, 0.5);
        for chunk in track.chunks(735).take(300) {
            assert!(handle.push(chunk.to_vec()));
            source.step(1.0 / 60.0);
        }
        let beat = source.beat();
        assert!((118.0..=122.0).contains(&beat.bpm), "bpm {}", beat.bpm);
        assert!(source.ring.len() <= DEFAULT_FFT_SIZE);
    }
}
