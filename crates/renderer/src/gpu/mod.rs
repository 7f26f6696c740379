//! OpenGL orchestration.
//!
//! - `context` owns glutin contexts/surfaces and the thread-ownership guard
//!   every GL call goes through.
//! - `pipeline` compiles wrapped GLSL into linked programs and owns the
//!   full-screen quad.
//! - `channels` decodes `iChannel0..3` images and uploads them.
//! - `uniforms` builds the builtin uniform set and caches locations.
//! - `target` is the offscreen framebuffer used by non-windowed backends.
//! - `state` glues everything together into the public [`Renderer`].

mod channels;
pub mod context;
pub(crate) mod pipeline;
mod state;
mod target;
mod uniforms;

pub use context::{ContextProvider, GlContext};
pub use state::{Renderer, RendererState};
