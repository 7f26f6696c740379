use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: u32 = 1;
/// Largest accepted render dimension on either axis.
pub const MAX_DIMENSION: u32 = 8192;
/// Number of MIDI controllers mapped onto `iParam0..3`.
pub const CONTROLLER_COUNT: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialise configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    pub version: u32,
    #[serde(default)]
    pub render: RenderSection,
    #[serde(default)]
    pub camera: CameraSection,
    #[serde(default)]
    pub audio: AudioSection,
    #[serde(default)]
    pub midi: MidiSection,
    /// Uniform sources in registration order; later entries win on collisions.
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceName>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendSetting {
    Windowed,
    #[serde(alias = "hidden-window", alias = "hidden_window")]
    Hidden,
    #[default]
    Headless,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum DialectSetting {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "120")]
    Glsl120,
    #[serde(rename = "330")]
    Glsl330,
    #[serde(rename = "300es")]
    Gles300,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceName {
    Keyboard,
    Camera,
    Audio,
    Microphone,
    Midi,
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceName::Keyboard => "keyboard",
            SourceName::Camera => "camera",
            SourceName::Audio => "audio",
            SourceName::Microphone => "microphone",
            SourceName::Midi => "midi",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderSection {
    pub width: u32,
    pub height: u32,
    pub backend: BackendSetting,
    #[serde(deserialize_with = "deserialize_dialect")]
    pub dialect: DialectSetting,
    /// Target frame rate; 0 means uncapped.
    pub fps: f64,
    /// Frames written by offline renders when the CLI does not say otherwise.
    pub frames: u32,
    pub vsync: bool,
}

impl Default for RenderSection {
    fn default() -> Self {
        Self {
            width: 64,
            height: 32,
            backend: BackendSetting::Headless,
            dialect: DialectSetting::Auto,
            fps: 60.0,
            frames: 1,
            vsync: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CameraSection {
    pub distance: f64,
    pub yaw: f64,
    pub pitch: f64,
    pub min_distance: f64,
    pub max_distance: f64,
    pub damping: f64,
    pub yaw_acceleration: f64,
    pub pitch_acceleration: f64,
    pub zoom_acceleration: f64,
}

impl Default for CameraSection {
    fn default() -> Self {
        Self {
            distance: 10.0,
            yaw: 0.0,
            pitch: 0.0,
            min_distance: 1.0,
            max_distance: 50.0,
            damping: 0.9,
            yaw_acceleration: 4.0,
            pitch_acceleration: 4.0,
            zoom_acceleration: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AudioSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    pub fft_size: usize,
    pub smoothing: f64,
    pub looping: bool,
}

impl Default for AudioSection {
    fn default() -> Self {
        Self {
            file: None,
            fft_size: 512,
            smoothing: 0.5,
            looping: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MidiSection {
    /// Substring of the input port name; the first port is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// MIDI channel as printed on devices (1-16); unset accepts all channels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,
    /// Controller numbers driving `iParam0..3`.
    pub cc: [u8; CONTROLLER_COUNT],
    /// Easing rate toward new controller values, per second.
    pub smoothing: f64,
}

impl Default for MidiSection {
    fn default() -> Self {
        Self {
            port: None,
            channel: None,
            cc: [1, 2, 3, 4],
            smoothing: 12.0,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            render: RenderSection::default(),
            camera: CameraSection::default(),
            audio: AudioSection::default(),
            midi: MidiSection::default(),
            sources: default_sources(),
        }
    }
}

fn default_sources() -> Vec<SourceName> {
    vec![SourceName::Keyboard, SourceName::Camera]
}

fn deserialize_dialect<'de, D>(deserializer: D) -> Result<DialectSetting, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Helper {
        Str(String),
        Num(i64),
    }

    match Helper::deserialize(deserializer)? {
        Helper::Str(raw) => parse_dialect(&raw).map_err(de::Error::custom),
        Helper::Num(value) => parse_dialect(&value.to_string()).map_err(de::Error::custom),
    }
}

fn parse_dialect(raw: &str) -> Result<DialectSetting, String> {
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "auto" | "default" => Ok(DialectSetting::Auto),
        "120" | "glsl120" => Ok(DialectSetting::Glsl120),
        "330" | "glsl330" => Ok(DialectSetting::Glsl330),
        "300es" | "300 es" | "es300" | "gles300" => Ok(DialectSetting::Gles300),
        other => Err(format!(
            "invalid dialect '{other}'; expected auto, 120, 330 or 300es"
        )),
    }
}

impl EngineConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: EngineConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    /// Loads `path` when it exists and falls back to defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.is_file() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    pub fn has_source(&self, source: SourceName) -> bool {
        self.sources.contains(&source)
    }

    /// Zero-based MIDI channel filter.
    pub fn midi_channel_index(&self) -> Option<u8> {
        self.midi.channel.map(|channel| channel.saturating_sub(1))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != CONFIG_VERSION {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected {CONFIG_VERSION}",
                self.version
            )));
        }

        let render = &self.render;
        for (axis, value) in [("width", render.width), ("height", render.height)] {
            if value == 0 || value > MAX_DIMENSION {
                return Err(ConfigError::Invalid(format!(
                    "render.{axis} must be between 1 and {MAX_DIMENSION}, got {value}"
                )));
            }
        }
        if !render.fps.is_finite() || render.fps < 0.0 {
            return Err(ConfigError::Invalid("render.fps must be >= 0".into()));
        }
        if render.frames == 0 {
            return Err(ConfigError::Invalid("render.frames must be at least 1".into()));
        }

        let camera = &self.camera;
        let finite = [
            camera.distance,
            camera.yaw,
            camera.pitch,
            camera.min_distance,
            camera.max_distance,
            camera.damping,
            camera.yaw_acceleration,
            camera.pitch_acceleration,
            camera.zoom_acceleration,
        ];
        if finite.iter().any(|value| !value.is_finite()) {
            return Err(ConfigError::Invalid("camera values must be finite".into()));
        }
        if camera.min_distance <= 0.0 || camera.min_distance > camera.max_distance {
            return Err(ConfigError::Invalid(format!(
                "camera distance bounds are inverted or non-positive: {}..{}",
                camera.min_distance, camera.max_distance
            )));
        }
        if camera.distance < camera.min_distance || camera.distance > camera.max_distance {
            return Err(ConfigError::Invalid(format!(
                "camera.distance {} lies outside {}..{}",
                camera.distance, camera.min_distance, camera.max_distance
            )));
        }
        if camera.damping <= 0.0 || camera.damping > 1.0 {
            return Err(ConfigError::Invalid("camera.damping must be in (0, 1]".into()));
        }

        let audio = &self.audio;
        if audio.fft_size < 16 || !audio.fft_size.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "audio.fft_size must be a power of two >= 16, got {}",
                audio.fft_size
            )));
        }
        if !(0.0..1.0).contains(&audio.smoothing) {
            return Err(ConfigError::Invalid("audio.smoothing must be in [0, 1)".into()));
        }

        let midi = &self.midi;
        if let Some(channel) = midi.channel {
            if !(1..=16).contains(&channel) {
                return Err(ConfigError::Invalid(format!(
                    "midi.channel must be between 1 and 16, got {channel}"
                )));
            }
        }
        if let Some(cc) = midi.cc.iter().find(|cc| **cc > 127) {
            return Err(ConfigError::Invalid(format!(
                "midi.cc entries must be 0-127, got {cc}"
            )));
        }
        if !midi.smoothing.is_finite() || midi.smoothing < 0.0 {
            return Err(ConfigError::Invalid("midi.smoothing must be >= 0".into()));
        }

        let mut seen = BTreeSet::new();
        for source in &self.sources {
            if !seen.insert(*source) {
                return Err(ConfigError::Invalid(format!(
                    "source '{source}' is listed more than once"
                )));
            }
        }
        if self.has_source(SourceName::Audio) && audio.file.is_none() {
            return Err(ConfigError::Invalid(
                "source 'audio' requires audio.file".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
version = 1
sources = ["keyboard", "camera", "audio", "midi"]

[render]
width = 128
height = 64
backend = "hidden-window"
dialect = 330
fps = 30

[camera]
distance = 6.0
damping = 0.85

[audio]
file = "loops/drums.wav"
fft_size = 1024
looping = false

[midi]
port = "nanoKONTROL"
channel = 10
cc = [14, 15, 16, 17]
"#;

    #[test]
    fn parses_sample_config() {
        let config = EngineConfig::from_toml_str(SAMPLE).expect("parse config");
        assert_eq!(config.render.width, 128);
        assert_eq!(config.render.backend, BackendSetting::Hidden);
        assert_eq!(config.render.dialect, DialectSetting::Glsl330);
        assert_eq!(config.render.frames, 1);
        assert_eq!(config.camera.distance, 6.0);
        assert_eq!(config.camera.max_distance, 50.0);
        assert_eq!(config.audio.file.as_deref(), Some(Path::new("loops/drums.wav")));
        assert_eq!(config.midi.cc, [14, 15, 16, 17]);
        assert_eq!(config.midi_channel_index(), Some(9));
        assert!(config.has_source(SourceName::Midi));
        assert!(!config.has_source(SourceName::Microphone));
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("version = 1\n").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.sources, vec![SourceName::Keyboard, SourceName::Camera]);
    }

    #[test]
    fn dialect_accepts_names_and_numbers() {
        for (raw, expected) in [
            ("\"auto\"", DialectSetting::Auto),
            ("120", DialectSetting::Glsl120),
            ("\"300es\"", DialectSetting::Gles300),
            ("\"GLSL330\"", DialectSetting::Glsl330),
        ] {
            let config =
                EngineConfig::from_toml_str(&format!("version = 1\n[render]\ndialect = {raw}\n"))
                    .unwrap();
            assert_eq!(config.render.dialect, expected, "{raw}");
        }
        let err = EngineConfig::from_toml_str("version = 1\n[render]\ndialect = 450\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_audio_source_without_file() {
        let err = EngineConfig::from_toml_str("version = 1\nsources = [\"audio\"]\n").unwrap_err();
        match err {
            ConfigError::Invalid(message) => assert!(message.contains("audio.file")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_out_of_range_values() {
        let cases = [
            "version = 2\n",
            "version = 1\n[render]\nwidth = 0\n",
            "version = 1\n[camera]\nmin_distance = 5.0\nmax_distance = 2.0\n",
            "version = 1\n[camera]\ndistance = 80.0\n",
            "version = 1\n[audio]\nfft_size = 500\n",
            "version = 1\n[midi]\nchannel = 17\n",
            "version = 1\n[midi]\ncc = [1, 2, 3, 200]\n",
            "version = 1\nsources = [\"camera\", \"camera\"]\n",
        ];
        for case in cases {
            let err = EngineConfig::from_toml_str(case).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{case}: {err}");
        }
    }

    #[test]
    fn serialised_config_reloads() {
        let config = EngineConfig::from_toml_str(SAMPLE).unwrap();
        let text = config.to_toml_string().unwrap();
        assert!(text.contains("dialect = \"330\""));
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn load_or_default_tolerates_missing_file() {
        let missing = Path::new("/nonexistent/ledshader/config.toml");
        assert_eq!(
            EngineConfig::load_or_default(missing).unwrap(),
            EngineConfig::default()
        );
        assert!(matches!(
            EngineConfig::load(missing),
            Err(ConfigError::Io { .. })
        ));
    }
}
