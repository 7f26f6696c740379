//! Translation from `shaderconfig` values into renderer types.

use std::io::{self, Read};
use std::path::Path;
use std::thread;

use renderer::{
    AudioFileSource, AudioSettings, CameraConfig, CameraSource, ContextBackend, ContextRequest,
    Dialect, DialectPreference, InputHandle, KeyboardHandle, KeyboardSource, MicrophoneHandle,
    MicrophoneSource, MidiHandle, MidiSettings, MidiSource, UniformBus,
};
use shaderconfig::{
    AudioSection, BackendSetting, CameraSection, DialectSetting, EngineConfig, SourceName,
};

use crate::cli::RenderOverrides;

/// Samples per block handed from the stdin reader to the microphone source.
const CAPTURE_BLOCK: usize = 256;

pub fn backend(setting: BackendSetting) -> ContextBackend {
    match setting {
        BackendSetting::Windowed => ContextBackend::Windowed,
        BackendSetting::Hidden => ContextBackend::HiddenWindow,
        BackendSetting::Headless => ContextBackend::Headless,
    }
}

pub fn dialect_preference(setting: DialectSetting) -> DialectPreference {
    match setting {
        DialectSetting::Auto => DialectPreference::Auto,
        DialectSetting::Glsl120 => DialectPreference::Exact(Dialect::Glsl120),
        DialectSetting::Glsl330 => DialectPreference::Exact(Dialect::Glsl330),
        DialectSetting::Gles300 => DialectPreference::Exact(Dialect::Gles300),
    }
}

pub fn context_request(config: &EngineConfig, overrides: &RenderOverrides) -> ContextRequest {
    let (width, height) = overrides
        .size
        .unwrap_or((config.render.width, config.render.height));
    let dialect = overrides
        .dialect
        .unwrap_or_else(|| dialect_preference(config.render.dialect));
    ContextRequest::new(width, height, backend(config.render.backend))
        .with_dialect(dialect)
        .with_vsync(config.render.vsync)
}

/// Effective frame rate; `None` means uncapped.
pub fn frame_rate(config: &EngineConfig, overrides: &RenderOverrides) -> Option<f32> {
    let fps = overrides.fps.unwrap_or(config.render.fps as f32);
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

pub fn camera_config(section: &CameraSection) -> CameraConfig {
    CameraConfig {
        distance: section.distance as f32,
        yaw: section.yaw as f32,
        pitch: section.pitch as f32,
        min_distance: section.min_distance as f32,
        max_distance: section.max_distance as f32,
        damping: section.damping as f32,
        yaw_acceleration: section.yaw_acceleration as f32,
        pitch_acceleration: section.pitch_acceleration as f32,
        zoom_acceleration: section.zoom_acceleration as f32,
    }
}

pub fn audio_settings(section: &AudioSection) -> AudioSettings {
    AudioSettings {
        fft_size: section.fft_size,
        smoothing: section.smoothing as f32,
        looping: section.looping,
    }
}

pub fn midi_settings(config: &EngineConfig) -> MidiSettings {
    MidiSettings {
        channel: config.midi_channel_index(),
        controllers: config.midi.cc,
        smoothing_rate: config.midi.smoothing as f32,
    }
}

/// A bus plus the producer handles that must outlive it.
#[derive(Default)]
pub struct BusParts {
    pub bus: UniformBus,
    pub keyboard: Option<KeyboardHandle>,
    pub microphone: Option<MicrophoneHandle>,
    pub midi: Option<MidiHandle>,
}

/// Builds the bus in `config.sources` order. Sources that fail to start are
/// logged and skipped.
///
/// Relative audio paths resolve against `base_dir` (the config file's directory).
pub fn build_bus(config: &EngineConfig, base_dir: &Path) -> BusParts {
    let mut parts = BusParts::default();
    // The camera reads the keyboard's axes wherever either sits in the order.
    let mut keyboard = config
        .has_source(SourceName::Keyboard)
        .then(KeyboardSource::new);
    let input: Option<InputHandle> = keyboard
        .as_ref()
        .map(|(source, _)| source.input_handle());

    for source in &config.sources {
        match source {
            SourceName::Keyboard => {
                if let Some((source, handle)) = keyboard.take() {
                    parts.keyboard = Some(handle);
                    parts.bus.register(Box::new(source));
                }
            }
            SourceName::Camera => {
                let input = input.clone().unwrap_or_default();
                let camera = CameraSource::new(camera_config(&config.camera), input);
                parts.bus.register(Box::new(camera));
            }
            SourceName::Audio => {
                let Some(file) = config.audio.file.as_ref() else {
                    tracing::warn!("audio source enabled without audio.file; skipping");
                    continue;
                };
                let path = if file.is_absolute() {
                    file.clone()
                } else {
                    base_dir.join(file)
                };
                match AudioFileSource::open(&path, audio_settings(&config.audio)) {
                    Ok(audio) => parts.bus.register(Box::new(audio)),
                    Err(error) => {
                        tracing::warn!(path = %path.display(), %error, "audio source unavailable; skipping");
                    }
                }
            }
            SourceName::Microphone => match MicrophoneSource::new(audio_settings(&config.audio)) {
                Ok((microphone, handle)) => {
                    parts.microphone = Some(handle);
                    parts.bus.register(Box::new(microphone));
                }
                Err(error) => {
                    tracing::warn!(%error, "microphone source unavailable; skipping");
                }
            },
            SourceName::Midi => {
                let (midi, handle) = MidiSource::new(midi_settings(config));
                parts.midi = Some(handle);
                parts.bus.register(Box::new(midi));
            }
        }
    }
    if input.is_none() && config.has_source(SourceName::Camera) {
        tracing::debug!("camera source has no keyboard input; it will hold still");
    }
    parts
}

/// Feeds raw little-endian `f32` mono samples from stdin into `handle`,
/// e.g. `arecord -t raw -f FLOAT_LE -c 1 -r 44100 | ledshader preview ...`.
pub fn spawn_stdin_capture(handle: MicrophoneHandle) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("ledshader-capture".into())
        .spawn(move || {
            let mut stdin = io::stdin().lock();
            let mut bytes = vec![0u8; CAPTURE_BLOCK * 4];
            loop {
                match stdin.read_exact(&mut bytes) {
                    Ok(()) => {
                        let block = decode_f32_le(&bytes);
                        if !handle.push(block) {
                            tracing::trace!("microphone queue full; dropping block");
                        }
                    }
                    Err(error) => {
                        tracing::debug!(%error, "stdin capture ended");
                        break;
                    }
                }
            }
        })
}

fn decode_f32_le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Connects the MIDI handle to a hardware port when the build supports it.
#[cfg(feature = "midi")]
pub fn connect_midi(config: &EngineConfig, handle: MidiHandle) -> Option<renderer::MidiConnection> {
    match renderer::connect_midi_input(config.midi.port.as_deref(), handle) {
        Ok(connection) => Some(connection),
        Err(error) => {
            tracing::warn!(%error, "MIDI input unavailable; iParam uniforms stay at zero");
            None
        }
    }
}

#[cfg(not(feature = "midi"))]
pub fn connect_midi(_config: &EngineConfig, _handle: MidiHandle) -> Option<()> {
    tracing::warn!("built without MIDI support; iParam uniforms stay at zero");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderer::{Key, SourceKind, UniformValue};

    #[test]
    fn overrides_win_over_config() {
        let config = EngineConfig::default();
        let overrides = RenderOverrides {
            size: Some((16, 8)),
            dialect: Some(DialectPreference::Exact(Dialect::Gles300)),
            fps: Some(0.0),
        };
        let request = context_request(&config, &overrides);
        assert_eq!(request.size(), (16, 8));
        assert_eq!(request.dialect, DialectPreference::Exact(Dialect::Gles300));
        assert_eq!(request.backend, ContextBackend::Headless);
        assert_eq!(frame_rate(&config, &overrides), None);
        assert_eq!(frame_rate(&config, &RenderOverrides::default()), Some(60.0));
    }

    #[test]
    fn camera_section_maps_field_for_field() {
        let section = CameraSection {
            distance: 4.0,
            min_distance: 2.0,
            ..CameraSection::default()
        };
        let camera = camera_config(&section);
        assert_eq!(camera.distance, 4.0);
        assert_eq!(camera.min_distance, 2.0);
        assert_eq!(camera.max_distance, section.max_distance as f32);
    }

    #[test]
    fn bus_follows_source_order_and_skips_missing_audio() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.audio.file = Some("missing.wav".into());
        config.sources = vec![
            SourceName::Keyboard,
            SourceName::Camera,
            SourceName::Audio,
            SourceName::Microphone,
            SourceName::Midi,
        ];
        let parts = build_bus(&config, dir.path());
        assert!(parts.keyboard.is_some());
        assert!(parts.microphone.is_some());
        assert!(parts.midi.is_some());
        assert_eq!(parts.bus.len(), 4);
        assert!(!parts.bus.has_source(SourceKind::AudioFile));
        assert!(parts.bus.has_source(SourceKind::Camera));
    }

    #[test]
    fn camera_listed_before_keyboard_still_follows_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.sources = vec![SourceName::Camera, SourceName::Keyboard];
        let BusParts {
            mut bus, keyboard, ..
        } = build_bus(&config, dir.path());
        assert_eq!(bus.source_names().count(), 2);

        let start = bus.advance(1.0 / 60.0);
        assert_eq!(
            start.get("iCameraPos"),
            Some(&UniformValue::Vec3([0.0, 0.0, 10.0]))
        );

        assert!(keyboard.unwrap().send(Key::Right, true));
        let mut latest = start;
        for _ in 0..60 {
            latest = bus.advance(1.0 / 60.0);
        }
        assert_eq!(
            latest.get("iInput"),
            Some(&UniformValue::Vec4([1.0, 0.0, 0.0, 0.0]))
        );
        let Some(UniformValue::Vec3(position)) = latest.get("iCameraPos") else {
            panic!("camera uniforms missing: {latest:?}");
        };
        assert!(position[0].abs() > 0.1, "camera did not orbit: {position:?}");
    }

    #[test]
    fn decodes_little_endian_floats() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0.5f32.to_le_bytes());
        bytes.extend_from_slice(&(-1.0f32).to_le_bytes());
        bytes.push(7);
        assert_eq!(decode_f32_le(&bytes), vec![0.5, -1.0]);
    }
}
