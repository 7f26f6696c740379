//! Per-frame uniform producers and the bus that merges them.
//!
//! Every [`UniformSource`] advances on the render thread via `step(dt)` and
//! then reports a name → value map. The [`UniformBus`] walks its sources in
//! registration order and lets later sources overwrite earlier ones on key
//! collisions.

use std::collections::BTreeMap;
use std::fmt;

pub mod analysis;
pub mod audio;
pub mod camera;
pub mod keyboard;
pub mod midi;

pub use analysis::{BeatState, BeatTracker, SpectrumAnalyzer};
pub use audio::{AudioFileSource, AudioSettings, MicrophoneHandle, MicrophoneSource};
pub use camera::CameraSource;
pub use keyboard::{InputAxes, InputHandle, KeyInput, Key, KeyboardHandle, KeyboardSource};
pub use midi::{MidiHandle, MidiSettings, MidiSource};
#[cfg(feature = "midi")]
pub use midi::{connect_midi_input, MidiConnection};

/// GLSL type tag of a [`UniformValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Int,
}

impl fmt::Display for UniformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniformKind::Float => f.write_str("float"),
            UniformKind::Vec2 => f.write_str("vec2"),
            UniformKind::Vec3 => f.write_str("vec3"),
            UniformKind::Vec4 => f.write_str("vec4"),
            UniformKind::Int => f.write_str("int"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Int(i32),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Int(_) => UniformKind::Int,
        }
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        UniformValue::Float(value)
    }
}

impl From<i32> for UniformValue {
    fn from(value: i32) -> Self {
        UniformValue::Int(value)
    }
}

impl From<glam::Vec3> for UniformValue {
    fn from(value: glam::Vec3) -> Self {
        UniformValue::Vec3(value.to_array())
    }
}

impl From<[f32; 4]> for UniformValue {
    fn from(value: [f32; 4]) -> Self {
        UniformValue::Vec4(value)
    }
}

/// Uniform name → value for one tick. Ordered so uploads are deterministic.
pub type UniformMap = BTreeMap<String, UniformValue>;

/// Family a source belongs to; the renderer asks the bus about these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Keyboard,
    Camera,
    AudioFile,
    Microphone,
    Midi,
    Custom,
}

/// A continuously-updating producer of shader inputs.
///
/// `step` runs on the render thread once per frame and must not block or
/// touch the GPU.
pub trait UniformSource: Send {
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind {
        SourceKind::Custom
    }

    fn step(&mut self, dt: f32);

    fn uniforms(&self) -> UniformMap;
}

/// Ordered collection of sources merged with last-writer-wins.
#[derive(Default)]
pub struct UniformBus {
    sources: Vec<Box<dyn UniformSource>>,
}

impl UniformBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Box<dyn UniformSource>) {
        tracing::debug!(source = source.name(), kind = ?source.kind(), "registered uniform source");
        self.sources.push(source);
    }

    pub fn with_source(mut self, source: impl UniformSource + 'static) -> Self {
        self.register(Box::new(source));
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn has_source(&self, kind: SourceKind) -> bool {
        self.sources.iter().any(|source| source.kind() == kind)
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|source| source.name())
    }

    /// Steps every source by `dt`, then merges their outputs in registration order.
    pub fn advance(&mut self, dt: f32) -> UniformMap {
        for source in &mut self.sources {
            source.step(dt);
        }
        let mut merged = UniformMap::new();
        for source in &self.sources {
            merged.extend(source.uniforms());
        }
        merged
    }
}

impl fmt::Debug for UniformBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.source_names()).finish()
    }
}
