//! Shadertoy-style fragment shader engine for LED matrices.
//!
//! Shaders are written against the familiar `mainImage(out vec4, in vec2)`
//! contract. The crate wraps them for the GLSL dialect the driver offers,
//! drives a full-screen quad through OpenGL, and hands the finished frame
//! back as tightly packed RGB bytes.
//!
//! ```text
//!   ContextProvider ──▶ GlContext ──▶ Renderer::new
//!                                        │
//!   UniformBus (keyboard, camera,        │ load_shader ─▶ ShaderWrapper ─▶ link
//!    audio, microphone, midi) ──────────▶│ render(dt)  ─▶ builtins + bus ─▶ draw
//!                                        │ read_pixels ─▶ RGB8 rows
//!                                        ▼
//!                                     FrameSink / window
//! ```
//!
//! A [`ValidationService`] owns a second, tiny context so shaders can be
//! compile-checked from any thread without disturbing the render thread.

mod camera;
mod compile;
mod dialect;
mod error;
mod gpu;
pub mod input;
mod runtime;
mod sink;
mod types;
mod validation;
mod window;

pub use camera::{Basis, CameraConfig, CameraModel, InputDelta};
pub use compile::{channel_uniform_name, wrap, ShaderWrapper, WrappedShader, FIXED_UNIFORMS};
pub use dialect::{Dialect, DialectDescriptor, DialectPreference, Polyfills};
pub use error::{AudioError, CompileError, ContextError, RenderError, ShaderStage};
pub use gpu::{ContextProvider, GlContext, Renderer, RendererState};
pub use input::{
    AudioFileSource, AudioSettings, BeatState, CameraSource, InputAxes, InputHandle, Key,
    KeyInput, KeyboardHandle, KeyboardSource, MicrophoneHandle, MicrophoneSource, MidiHandle,
    MidiSettings, MidiSource, SourceKind, UniformBus, UniformKind, UniformMap, UniformSource,
    UniformValue,
};
#[cfg(feature = "midi")]
pub use input::{connect_midi_input, MidiConnection};
pub use runtime::{ClockMode, FrameClock};
pub use sink::{Frame, FrameSink, PngSequenceSink};
pub use types::{ChannelBindings, ChannelSource, ContextBackend, ContextRequest, CHANNEL_COUNT};
pub use validation::{CompileCheck, ValidationService};
pub use window::{map_key, run_preview, PreviewOptions};
