use std::fmt;
use std::path::Path;

use glow::HasContext;
use tracing::{debug, info, warn};

use crate::camera::{Basis, CameraModel};
use crate::compile::ShaderWrapper;
use crate::dialect::Dialect;
use crate::error::RenderError;
use crate::input::UniformBus;
use crate::types::{ChannelBindings, ContextBackend, ContextRequest};

use super::channels::ChannelTextures;
use super::context::{ContextProvider, GlContext};
use super::pipeline::{CompileLabel, QuadGeometry, ShaderProgram};
use super::target::{rgba_to_rgb_flipped, RenderTarget};
use super::uniforms::{builtin_uniforms, FrameTiming, UniformLocations};

/// Lifecycle of a [`Renderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    /// Context and quad exist; no shader yet.
    ContextReady,
    /// A program is linked but no frame has been drawn with it.
    ShaderLoaded,
    /// At least one frame has been drawn with the current program.
    Rendering,
    Destroyed,
}

/// Everything tied to one successfully linked shader.
struct LoadedShader {
    name: String,
    program: ShaderProgram,
    channels: ChannelTextures,
    locations: UniformLocations,
}

/// Draws a wrapped fragment shader over a full-screen quad each frame.
///
/// The renderer owns its [`GlContext`] exclusively and reactivates it on the
/// calling thread before every GL operation.
pub struct Renderer {
    context: GlContext,
    wrapper: ShaderWrapper,
    bus: UniformBus,
    quad: Option<QuadGeometry>,
    target: Option<RenderTarget>,
    shader: Option<LoadedShader>,
    default_camera: Basis,
    time: f32,
    frame: u64,
    pixels_read: bool,
    state: RendererState,
}

impl Renderer {
    /// Wraps an existing context. It must be current on the calling thread
    /// (or activatable there).
    pub fn new(context: GlContext, bus: UniformBus) -> Result<Self, RenderError> {
        let dialect = context.dialect();
        let (width, height) = context.size();
        let gl = current(&context, "Renderer::new")?;
        // SAFETY: `current` verified the context is current on this thread.
        let quad = unsafe { QuadGeometry::new(gl, dialect)? };
        let target = if context.backend().is_offscreen() {
            // SAFETY: as above.
            match unsafe { RenderTarget::new(gl, width, height) } {
                Ok(target) => Some(target),
                Err(error) => {
                    // SAFETY: as above.
                    unsafe { quad.delete(gl) };
                    return Err(error);
                }
            }
        } else {
            None
        };

        info!(
            backend = %context.backend(),
            %dialect,
            width,
            height,
            sources = bus.len(),
            "renderer ready"
        );
        Ok(Self {
            context,
            wrapper: ShaderWrapper::new(dialect),
            bus,
            quad: Some(quad),
            target,
            shader: None,
            default_camera: CameraModel::default().basis(),
            time: 0.0,
            frame: 0,
            pixels_read: false,
            state: RendererState::ContextReady,
        })
    }

    /// Creates an offscreen context (headless EGL) for `request` and wraps it.
    pub fn offscreen(request: &ContextRequest, bus: UniformBus) -> Result<Self, RenderError> {
        let request = ContextRequest {
            backend: ContextBackend::Headless,
            ..request.clone()
        };
        let context = ContextProvider::create_offscreen::<()>(&request, None)?;
        Self::new(context, bus)
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    pub fn dialect(&self) -> Dialect {
        self.wrapper.dialect()
    }

    /// The wrapper every compile on this renderer goes through.
    pub fn wrapper(&self) -> ShaderWrapper {
        self.wrapper
    }

    pub fn context(&self) -> &GlContext {
        &self.context
    }

    pub fn bus_mut(&mut self) -> &mut UniformBus {
        &mut self.bus
    }

    pub fn size(&self) -> (u32, u32) {
        match &self.target {
            Some(target) => target.size(),
            None => self.context.size(),
        }
    }

    pub fn shader_name(&self) -> Option<&str> {
        self.shader.as_ref().map(|shader| shader.name.as_str())
    }

    /// Seconds of shader time accumulated so far.
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Used when no camera source is registered on the bus.
    pub fn set_default_camera(&mut self, camera: &CameraModel) {
        self.default_camera = camera.basis();
    }

    pub fn load_shader(&mut self, source: &str) -> Result<(), RenderError> {
        self.load_shader_named("inline", source, &ChannelBindings::default())
    }

    /// Reads `path`, binds sibling `*.channelN` textures, and loads the shader.
    pub fn load_shader_file(&mut self, path: &Path) -> Result<(), RenderError> {
        let source = std::fs::read_to_string(path).map_err(|source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let channels = ChannelBindings::discover(path);
        self.load_shader_named(&name, &source, &channels)
    }

    /// Compiles and links `source`, replacing the current program only on success.
    pub fn load_shader_named(
        &mut self,
        name: &str,
        source: &str,
        channels: &ChannelBindings,
    ) -> Result<(), RenderError> {
        self.check_alive()?;
        let gl = current(&self.context, "load_shader")?;
        let wrapped = self.wrapper.wrap(source);
        let label = CompileLabel {
            operation: "load_shader",
            shader: name,
            dialect: self.wrapper.dialect(),
        };

        // SAFETY: `current` verified the context is current on this thread.
        let program = unsafe { ShaderProgram::build(gl, &wrapped, label) }.map_err(|error| {
            warn!(shader = name, dialect = %label.dialect, "shader failed to build; keeping previous program");
            error
        })?;
        // SAFETY: as above.
        let channels = match unsafe { ChannelTextures::load(gl, channels) } {
            Ok(channels) => channels,
            Err(error) => {
                // SAFETY: as above.
                unsafe { program.delete(gl) };
                return Err(error);
            }
        };

        let mut locations = UniformLocations::new();
        // SAFETY: as above; the new program is bound before sampler setup.
        unsafe {
            gl.use_program(Some(program.program));
            locations.bind_samplers(gl, program.program);
            gl.use_program(None);
        }

        if let Some(previous) = self.shader.take() {
            // SAFETY: as above.
            unsafe {
                previous.program.delete(gl);
                previous.channels.delete(gl);
            }
        }
        self.shader = Some(LoadedShader {
            name: name.to_string(),
            program,
            channels,
            locations,
        });
        self.state = RendererState::ShaderLoaded;
        info!(shader = name, dialect = %self.wrapper.dialect(), "shader loaded");
        Ok(())
    }

    /// Advances the uniform bus by `dt` and draws one frame.
    pub fn render(&mut self, dt: f32) -> Result<(), RenderError> {
        self.check_alive()?;
        let gl = current(&self.context, "render")?;
        let shader = self.shader.as_mut().ok_or(RenderError::NoProgram)?;
        let quad = self.quad.as_ref().ok_or(RenderError::Destroyed)?;

        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        self.time += dt;
        let (width, height) = match &self.target {
            Some(target) => target.size(),
            None => self.context.size(),
        };
        let timing = FrameTiming {
            time: self.time,
            delta: dt,
            frame: self.frame.min(i32::MAX as u64) as i32,
        };
        let mut uniforms = builtin_uniforms(width, height, timing, &self.default_camera);
        uniforms.extend(self.bus.advance(dt));

        // SAFETY: `current` verified the context is current on this thread.
        unsafe {
            bind_target(gl, self.target.as_ref());
            gl.viewport(0, 0, width as i32, height as i32);
            gl.disable(glow::DEPTH_TEST);
            gl.disable(glow::BLEND);
            gl.use_program(Some(shader.program.program));
            shader.locations.upload(gl, shader.program.program, &uniforms);
            shader.channels.bind(gl);
            quad.draw(gl);
            gl.use_program(None);
        }

        self.frame += 1;
        self.pixels_read = false;
        self.state = RendererState::Rendering;
        tracing::trace!(frame = self.frame, time = self.time, "frame rendered");
        Ok(())
    }

    /// Fills the render target with one colour.
    pub fn clear(&mut self, color: [f32; 4]) -> Result<(), RenderError> {
        self.check_alive()?;
        let gl = current(&self.context, "clear")?;
        let (width, height) = self.size();
        // SAFETY: `current` verified the context is current on this thread.
        unsafe {
            bind_target(gl, self.target.as_ref());
            gl.viewport(0, 0, width as i32, height as i32);
            gl.clear_color(color[0], color[1], color[2], color[3]);
            gl.clear(glow::COLOR_BUFFER_BIT);
        }
        self.pixels_read = false;
        Ok(())
    }

    /// Reads the frame back as tightly packed RGB8 rows, top row first.
    ///
    /// Allowed once per drawn (or cleared) frame.
    pub fn read_pixels(&mut self) -> Result<Vec<u8>, RenderError> {
        self.check_alive()?;
        if self.pixels_read {
            return Err(RenderError::AlreadyRead);
        }
        let gl = current(&self.context, "read_pixels")?;
        let (width, height) = self.size();
        let mut rgba = vec![0u8; width as usize * height as usize * 4];
        // SAFETY: `current` verified the context is current on this thread.
        unsafe {
            bind_target(gl, self.target.as_ref());
            gl.pixel_store_i32(glow::PACK_ALIGNMENT, 1);
            gl.finish();
            gl.read_pixels(
                0,
                0,
                width as i32,
                height as i32,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelPackData::Slice(&mut rgba),
            );
            let error = gl.get_error();
            if error != glow::NO_ERROR {
                return Err(RenderError::gl(
                    "read_pixels",
                    format!("glReadPixels raised 0x{error:x}"),
                ));
            }
        }
        self.pixels_read = true;
        Ok(rgba_to_rgb_flipped(&rgba, width as usize, height as usize))
    }

    /// Swaps buffers on windowed backends.
    pub fn present(&mut self) -> Result<(), RenderError> {
        self.check_alive()?;
        current(&self.context, "present")?;
        self.context.swap_buffers()
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        self.check_alive()?;
        let (width, height) = (width.max(1), height.max(1));
        let gl = current(&self.context, "resize")?;
        self.context.resize(width, height)?;
        if let Some(target) = self.target.as_mut() {
            // SAFETY: `current` verified the context is current on this thread.
            unsafe { target.resize(gl, width, height) };
        }
        debug!(width, height, "renderer resized");
        Ok(())
    }

    /// Frees GPU resources and destroys the context. Safe to call repeatedly.
    pub fn cleanup(&mut self) {
        if self.state == RendererState::Destroyed {
            return;
        }
        match current(&self.context, "cleanup") {
            Ok(gl) => {
                // SAFETY: `current` verified the context is current on this thread.
                unsafe {
                    if let Some(shader) = self.shader.take() {
                        shader.program.delete(gl);
                        shader.channels.delete(gl);
                    }
                    if let Some(quad) = self.quad.take() {
                        quad.delete(gl);
                    }
                    if let Some(target) = self.target.take() {
                        target.delete(gl);
                    }
                }
            }
            Err(error) => {
                warn!(%error, "cannot activate context for cleanup; GPU objects go with the context");
                self.shader = None;
                self.quad = None;
                self.target = None;
            }
        }
        self.context.release();
        self.context.destroy();
        self.state = RendererState::Destroyed;
        debug!("renderer cleaned up");
    }

    fn check_alive(&self) -> Result<(), RenderError> {
        if self.state == RendererState::Destroyed {
            Err(RenderError::Destroyed)
        } else {
            Ok(())
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("context", &self.context)
            .field("state", &self.state)
            .field("shader", &self.shader_name())
            .field("sources", &self.bus)
            .field("frame", &self.frame)
            .finish()
    }
}

/// Activates `context` on this thread and returns its function table.
fn current<'a>(context: &'a GlContext, operation: &'static str) -> Result<&'a glow::Context, RenderError> {
    if !context.make_current() {
        return Err(if context.is_destroyed() {
            RenderError::Destroyed
        } else {
            RenderError::NotCurrent { operation }
        });
    }
    context.gl(operation)
}

unsafe fn bind_target(gl: &glow::Context, target: Option<&RenderTarget>) {
    match target {
        Some(target) => target.bind(gl),
        None => gl.bind_framebuffer(glow::FRAMEBUFFER, None),
    }
}
