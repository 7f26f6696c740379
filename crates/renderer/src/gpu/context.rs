use std::ffi::CString;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use glutin::config::{Config, ConfigTemplateBuilder};
use glutin::context::{
    ContextAttributesBuilder, NotCurrentContext, PossiblyCurrentContext,
};
use glutin::display::{Display, GetGlDisplay};
use glutin::prelude::*;
use glutin::surface::{Surface, SurfaceAttributesBuilder, SwapInterval, WindowSurface};
use glutin_winit::DisplayBuilder;
use raw_window_handle::HasRawWindowHandle;
use winit::dpi::PhysicalSize;
use winit::event_loop::EventLoopWindowTarget;
use winit::window::{Window, WindowBuilder};

use crate::dialect::Dialect;
use crate::error::{ContextError, RenderError};
use crate::types::{ContextBackend, ContextRequest};

/// What a context draws into.
enum Drawable {
    Window(Surface<WindowSurface>),
    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    Pbuffer(Surface<glutin::surface::PbufferSurface>),
    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    Surfaceless,
}

enum Slot {
    Idle(NotCurrentContext),
    Active {
        context: PossiblyCurrentContext,
        owner: ThreadId,
    },
    Destroyed,
}

struct Inner {
    slot: Slot,
    drawable: Option<Drawable>,
    size: (u32, u32),
}

/// One GL context plus the surface it renders into.
///
/// The raw glutin context never leaves this handle. Activation goes through
/// [`GlContext::make_current`], and every GL entry point is reached through
/// [`GlContext::gl`], which refuses unless the calling thread owns the context.
pub struct GlContext {
    backend: ContextBackend,
    dialect: Dialect,
    gl: glow::Context,
    inner: Mutex<Inner>,
    window: Option<Window>,
}

// SAFETY: the glutin context is only made current, released, or destroyed
// while holding `inner`, and `gl()` hands out the function table only to the
// thread recorded as owner, so no GL call can race across threads.
unsafe impl Send for GlContext {}
unsafe impl Sync for GlContext {}

impl GlContext {
    pub fn backend(&self) -> ContextBackend {
        self.backend
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn size(&self) -> (u32, u32) {
        self.lock().size
    }

    /// The preview window, for windowed and hidden-window backends.
    pub fn window(&self) -> Option<&Window> {
        self.window.as_ref()
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(self.lock().slot, Slot::Destroyed)
    }

    /// Whether the calling thread currently owns the context.
    pub fn is_current(&self) -> bool {
        let me = thread::current().id();
        matches!(self.lock().slot, Slot::Active { owner, .. } if owner == me)
    }

    /// Makes the context current on the calling thread.
    ///
    /// Returns `false` if the context is destroyed, owned by another thread,
    /// or the driver refuses. A driver refusal consumes the context, which is
    /// then treated as destroyed.
    pub fn make_current(&self) -> bool {
        let me = thread::current().id();
        let mut inner = self.lock();
        match &inner.slot {
            Slot::Destroyed => return false,
            Slot::Active { owner, .. } => return *owner == me,
            Slot::Idle(_) => {}
        }

        let Slot::Idle(context) = std::mem::replace(&mut inner.slot, Slot::Destroyed) else {
            return false;
        };
        match activate(context, inner.drawable.as_ref()) {
            Ok(context) => {
                inner.slot = Slot::Active { context, owner: me };
                true
            }
            Err(error) => {
                tracing::warn!(backend = %self.backend, %error, "driver refused to make context current");
                inner.drawable = None;
                false
            }
        }
    }

    /// Makes the context not current if the calling thread holds it.
    pub fn release(&self) {
        let me = thread::current().id();
        let mut inner = self.lock();
        if !matches!(inner.slot, Slot::Active { owner, .. } if owner == me) {
            return;
        }
        let Slot::Active { context, .. } = std::mem::replace(&mut inner.slot, Slot::Destroyed) else {
            return;
        };
        match context.make_not_current() {
            Ok(context) => inner.slot = Slot::Idle(context),
            Err(error) => {
                tracing::warn!(backend = %self.backend, %error, "failed to release context; destroying it");
                inner.drawable = None;
            }
        }
    }

    /// Tears the context and its surface down. Safe to call repeatedly.
    pub fn destroy(&self) {
        let mut inner = self.lock();
        if matches!(inner.slot, Slot::Destroyed) {
            return;
        }
        inner.slot = Slot::Destroyed;
        inner.drawable = None;
        tracing::debug!(backend = %self.backend, "destroyed GL context");
    }

    /// GL function table, available only while this thread owns the context.
    pub fn gl(&self, operation: &'static str) -> Result<&glow::Context, RenderError> {
        let me = thread::current().id();
        match &self.lock().slot {
            Slot::Active { owner, .. } if *owner == me => Ok(&self.gl),
            Slot::Destroyed => Err(RenderError::Destroyed),
            _ => Err(RenderError::NotCurrent { operation }),
        }
    }

    /// Presents the back buffer. No-op for offscreen backends.
    pub fn swap_buffers(&self) -> Result<(), RenderError> {
        let me = thread::current().id();
        let inner = self.lock();
        let context = match &inner.slot {
            Slot::Active { context, owner } if *owner == me => context,
            Slot::Destroyed => return Err(RenderError::Destroyed),
            _ => return Err(RenderError::NotCurrent { operation: "swap_buffers" }),
        };
        match &inner.drawable {
            Some(Drawable::Window(surface)) => surface
                .swap_buffers(context)
                .map_err(|error| RenderError::gl("swap_buffers", error)),
            _ => Ok(()),
        }
    }

    /// Records the new size and resizes window surfaces. Offscreen targets are
    /// resized by their owner.
    pub fn resize(&self, width: u32, height: u32) -> Result<(), RenderError> {
        let (width, height) = (width.max(1), height.max(1));
        let me = thread::current().id();
        let mut inner = self.lock();
        inner.size = (width, height);
        let Inner { slot, drawable, .. } = &*inner;
        if let (Some(Drawable::Window(surface)), Slot::Active { context, owner }) = (drawable, slot) {
            if *owner != me {
                return Err(RenderError::NotCurrent { operation: "resize" });
            }
            surface.resize(context, non_zero(width), non_zero(height));
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for GlContext {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for GlContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        let state = match inner.slot {
            Slot::Idle(_) => "idle",
            Slot::Active { .. } => "active",
            Slot::Destroyed => "destroyed",
        };
        f.debug_struct("GlContext")
            .field("backend", &self.backend)
            .field("dialect", &self.dialect)
            .field("size", &inner.size)
            .field("state", &state)
            .finish()
    }
}

fn activate(
    context: NotCurrentContext,
    drawable: Option<&Drawable>,
) -> glutin::error::Result<PossiblyCurrentContext> {
    match drawable {
        Some(Drawable::Window(surface)) => context.make_current(surface),
        #[cfg(not(any(target_os = "macos", target_os = "ios")))]
        Some(Drawable::Pbuffer(surface)) => context.make_current(surface),
        #[cfg(not(any(target_os = "macos", target_os = "ios")))]
        Some(Drawable::Surfaceless) => headless::make_current_surfaceless(context),
        None => Err(glutin::error::ErrorKind::BadSurface.into()),
    }
}

fn non_zero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}

fn load_gl(display: &Display) -> glow::Context {
    // SAFETY: the display outlives the returned table through the context
    // that owns it, and symbols are only resolved against a current context.
    unsafe {
        glow::Context::from_loader_function(|symbol| {
            CString::new(symbol)
                .map(|symbol| display.get_proc_address(&symbol))
                .unwrap_or(std::ptr::null())
        })
    }
}

/// Creates GL contexts for a [`ContextRequest`] on the calling thread.
pub struct ContextProvider;

impl ContextProvider {
    /// Creates a context for exactly the requested backend.
    ///
    /// Windowed and hidden-window backends need `target`; the new context is
    /// current on the calling thread.
    pub fn create<T>(
        request: &ContextRequest,
        target: Option<&EventLoopWindowTarget<T>>,
    ) -> Result<GlContext, ContextError> {
        let context = match request.backend {
            ContextBackend::Headless => Self::create_headless(request),
            backend => {
                let target = target.ok_or(ContextError::EventLoopRequired { backend })?;
                create_windowed(request, target, backend)
            }
        }?;
        tracing::info!(
            backend = %context.backend,
            dialect = %context.dialect,
            width = request.size().0,
            height = request.size().1,
            "created GL context"
        );
        Ok(context)
    }

    /// Headless EGL context; needs no windowing system.
    pub fn create_headless(request: &ContextRequest) -> Result<GlContext, ContextError> {
        #[cfg(not(any(target_os = "macos", target_os = "ios")))]
        {
            headless::create(request)
        }
        #[cfg(any(target_os = "macos", target_os = "ios"))]
        {
            let _ = request;
            Err(ContextError::Unsupported {
                backend: ContextBackend::Headless,
            })
        }
    }

    /// Tries headless first, then a hidden window when an event loop is at hand.
    pub fn create_offscreen<T>(
        request: &ContextRequest,
        target: Option<&EventLoopWindowTarget<T>>,
    ) -> Result<GlContext, ContextError> {
        let mut failures = Vec::new();
        for backend in [ContextBackend::Headless, ContextBackend::HiddenWindow] {
            let attempt = ContextRequest {
                backend,
                ..request.clone()
            };
            match Self::create(&attempt, target) {
                Ok(context) => return Ok(context),
                Err(error) => {
                    tracing::debug!(%backend, %error, "offscreen backend unavailable");
                    failures.push(error);
                }
            }
        }
        Err(ContextError::Unavailable(failures))
    }
}

fn pick_config(configs: Box<dyn Iterator<Item = Config> + '_>) -> Config {
    // Readback wants a single-sampled surface, so prefer the fewest samples.
    configs
        .reduce(|best, next| {
            if next.num_samples() < best.num_samples() {
                next
            } else {
                best
            }
        })
        .expect("glutin-winit only calls the picker with at least one config")
}

fn create_windowed<T>(
    request: &ContextRequest,
    target: &EventLoopWindowTarget<T>,
    backend: ContextBackend,
) -> Result<GlContext, ContextError> {
    let visible = backend == ContextBackend::Windowed;
    let (width, height) = request.size();
    let window_builder = WindowBuilder::new()
        .with_title(request.title.as_str())
        .with_inner_size(PhysicalSize::new(width, height))
        .with_visible(visible)
        .with_resizable(visible);
    let template = ConfigTemplateBuilder::new().with_alpha_size(8);
    let (window, config) = DisplayBuilder::new()
        .with_window_builder(Some(window_builder))
        .build(target, template, pick_config)
        .map_err(|error| ContextError::backend(backend, error))?;
    let window =
        window.ok_or_else(|| ContextError::backend(backend, "display builder produced no window"))?;
    let raw_window = window.raw_window_handle();
    let display = config.display();

    let mut failures = Vec::new();
    let mut created = None;
    for dialect in request.dialect.candidates() {
        let mut attributes = ContextAttributesBuilder::new().with_context_api(dialect.context_api());
        if let Some(profile) = dialect.profile() {
            attributes = attributes.with_profile(profile);
        }
        // SAFETY: `raw_window` belongs to `window`, which outlives the context.
        match unsafe { display.create_context(&config, &attributes.build(Some(raw_window))) } {
            Ok(context) => {
                created = Some((dialect, context));
                break;
            }
            Err(error) => {
                tracing::debug!(%dialect, %error, "context creation failed; trying next dialect");
                failures.push(format!("{dialect}: {error}"));
            }
        }
    }
    let (dialect, context) = created.ok_or_else(|| {
        ContextError::backend(
            backend,
            format!("no dialect accepted ({})", failures.join("; ")),
        )
    })?;

    let surface_attributes = SurfaceAttributesBuilder::<WindowSurface>::new().build(
        raw_window,
        non_zero(width),
        non_zero(height),
    );
    // SAFETY: as above, the window outlives its surface.
    let surface = unsafe { display.create_window_surface(&config, &surface_attributes) }
        .map_err(|error| ContextError::backend(backend, error))?;
    let context = context
        .make_current(&surface)
        .map_err(|error| ContextError::backend(backend, error))?;

    let interval = if request.vsync && visible {
        SwapInterval::Wait(NonZeroU32::MIN)
    } else {
        SwapInterval::DontWait
    };
    if let Err(error) = surface.set_swap_interval(&context, interval) {
        tracing::debug!(%error, "swap interval not supported");
    }

    Ok(GlContext {
        backend,
        dialect,
        gl: load_gl(&display),
        inner: Mutex::new(Inner {
            slot: Slot::Active {
                context,
                owner: thread::current().id(),
            },
            drawable: Some(Drawable::Window(surface)),
            size: (width, height),
        }),
        window: Some(window),
    })
}

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
mod headless {
    use glutin::api::egl;
    use glutin::config::{Api, ConfigSurfaceTypes, ConfigTemplateBuilder};
    use glutin::context::{ContextAttributesBuilder, NotCurrentContext, PossiblyCurrentContext};
    use glutin::display::Display;
    use glutin::prelude::*;
    use glutin::surface::{PbufferSurface, Surface, SurfaceAttributesBuilder};

    use super::{load_gl, non_zero, Drawable, GlContext, Inner, Slot};
    use crate::dialect::Dialect;
    use crate::error::ContextError;
    use crate::types::{ContextBackend, ContextRequest};

    const BACKEND: ContextBackend = ContextBackend::Headless;

    pub(super) fn make_current_surfaceless(
        context: NotCurrentContext,
    ) -> glutin::error::Result<PossiblyCurrentContext> {
        match context {
            NotCurrentContext::Egl(context) => context
                .make_current_surfaceless()
                .map(PossiblyCurrentContext::Egl),
            #[allow(unreachable_patterns)]
            _ => Err(glutin::error::ErrorKind::NotSupported(
                "surfaceless contexts require EGL",
            )
            .into()),
        }
    }

    fn api_for(dialect: Dialect) -> Api {
        if dialect.is_embedded() {
            Api::GLES3
        } else {
            Api::OPENGL
        }
    }

    pub(super) fn create(request: &ContextRequest) -> Result<GlContext, ContextError> {
        let devices = egl::device::Device::query_devices()
            .map_err(|error| ContextError::backend(BACKEND, format!("EGL device query failed: {error}")))?;

        let mut failures = Vec::new();
        for device in devices {
            // SAFETY: no native display is passed; EGL owns the device display.
            let display = match unsafe { egl::display::Display::with_device(&device, None) } {
                Ok(display) => display,
                Err(error) => {
                    failures.push(format!("device display: {error}"));
                    continue;
                }
            };
            for dialect in request.dialect.candidates() {
                match create_on_display(&display, dialect, request) {
                    Ok(context) => return Ok(context),
                    Err(message) => {
                        tracing::debug!(%dialect, %message, "headless attempt failed");
                        failures.push(format!("{dialect}: {message}"));
                    }
                }
            }
        }

        if failures.is_empty() {
            failures.push("no EGL devices found".to_string());
        }
        Err(ContextError::backend(BACKEND, failures.join("; ")))
    }

    fn create_on_display(
        display: &egl::display::Display,
        dialect: Dialect,
        request: &ContextRequest,
    ) -> Result<GlContext, String> {
        let (width, height) = request.size();
        let api = api_for(dialect);

        let pbuffer_template = ConfigTemplateBuilder::new()
            .with_surface_type(ConfigSurfaceTypes::PBUFFER)
            .with_api(api)
            .build();
        // SAFETY: the template only describes attributes; no handles are involved.
        let pbuffer_config = unsafe { display.find_configs(pbuffer_template) }
            .map_err(|error| error.to_string())?
            .next();

        let (config, pbuffer) = match pbuffer_config {
            Some(config) => (config, true),
            None => {
                let template = ConfigTemplateBuilder::new()
                    .with_surface_type(ConfigSurfaceTypes::empty())
                    .with_api(api)
                    .build();
                // SAFETY: as above.
                let config = unsafe { display.find_configs(template) }
                    .map_err(|error| error.to_string())?
                    .next()
                    .ok_or_else(|| format!("no EGL config supports {api:?}"))?;
                (config, false)
            }
        };

        let mut attributes = ContextAttributesBuilder::new().with_context_api(dialect.context_api());
        if let Some(profile) = dialect.profile() {
            attributes = attributes.with_profile(profile);
        }
        // SAFETY: headless contexts are not tied to any window handle.
        let context = unsafe { display.create_context(&config, &attributes.build(None)) }
            .map_err(|error| error.to_string())?;

        let (context, drawable) = if pbuffer {
            let surface_attributes = SurfaceAttributesBuilder::<PbufferSurface>::new()
                .build(non_zero(width), non_zero(height));
            // SAFETY: pbuffer surfaces own their storage.
            let surface = unsafe { display.create_pbuffer_surface(&config, &surface_attributes) }
                .map_err(|error| error.to_string())?;
            let context = context
                .make_current(&surface)
                .map_err(|error| error.to_string())?;
            (
                PossiblyCurrentContext::Egl(context),
                Drawable::Pbuffer(Surface::Egl(surface)),
            )
        } else {
            tracing::debug!("EGL display has no pbuffer configs; using a surfaceless context");
            let context = context
                .make_current_surfaceless()
                .map_err(|error| error.to_string())?;
            (PossiblyCurrentContext::Egl(context), Drawable::Surfaceless)
        };

        let display = Display::Egl(display.clone());
        Ok(GlContext {
            backend: BACKEND,
            dialect,
            gl: load_gl(&display),
            inner: std::sync::Mutex::new(Inner {
                slot: Slot::Active {
                    context,
                    owner: std::thread::current().id(),
                },
                drawable: Some(drawable),
                size: (width, height),
            }),
            window: None,
        })
    }
}
