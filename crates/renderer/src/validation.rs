//! Compile checks against a private offscreen context.
//!
//! The service owns its own minimal context, independent of any renderer,
//! so shaders can be checked from a worker thread while the primary context
//! stays current on the render thread.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};
use winit::event_loop::EventLoopWindowTarget;

use crate::compile::ShaderWrapper;
use crate::dialect::{Dialect, DialectPreference};
use crate::error::{ContextError, RenderError};
use crate::gpu::pipeline::{CompileLabel, ShaderProgram};
use crate::gpu::{ContextProvider, GlContext, Renderer};
use crate::types::{ContextBackend, ContextRequest};

/// Side length of the validation surface; it is never drawn to.
const VALIDATION_SIZE: u32 = 16;

/// Outcome of [`ValidationService::test_compile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileCheck {
    Compiled,
    /// The driver rejected the shader; `diagnostics` is its log, unmodified.
    Failed { diagnostics: String },
    /// No check happened. Callers must not read this as pass or fail.
    Unavailable { reason: String },
}

impl CompileCheck {
    pub fn is_ok(&self) -> bool {
        matches!(self, CompileCheck::Compiled)
    }

    /// Whether the driver actually ran.
    pub fn is_known(&self) -> bool {
        !matches!(self, CompileCheck::Unavailable { .. })
    }

    pub fn diagnostics(&self) -> &str {
        match self {
            CompileCheck::Compiled => "",
            CompileCheck::Failed { diagnostics } => diagnostics,
            CompileCheck::Unavailable { reason } => reason,
        }
    }

    /// `(ok, diagnostics)`. `Unavailable` maps to `false` with a message
    /// prefixed `validation unavailable:`.
    pub fn as_tuple(&self) -> (bool, String) {
        match self {
            CompileCheck::Compiled => (true, String::new()),
            CompileCheck::Failed { diagnostics } => (false, diagnostics.clone()),
            CompileCheck::Unavailable { reason } => (false, format!("validation unavailable: {reason}")),
        }
    }
}

impl fmt::Display for CompileCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileCheck::Compiled => f.write_str("compiled"),
            CompileCheck::Failed { diagnostics } => write!(f, "failed:\n{diagnostics}"),
            CompileCheck::Unavailable { reason } => write!(f, "validation unavailable: {reason}"),
        }
    }
}

/// Checks shader sources with the same wrapper the renderer uses.
pub struct ValidationService {
    context: Mutex<Option<GlContext>>,
    wrapper: ShaderWrapper,
    reason: Option<String>,
}

impl ValidationService {
    /// Creates a headless validation context for `dialect`.
    ///
    /// Never fails: without a usable backend the service is returned in
    /// unavailable mode and a single warning is logged.
    pub fn new(dialect: Dialect) -> Self {
        let request = validation_request(dialect, ContextBackend::Headless);
        Self::from_result(dialect, ContextProvider::create_headless(&request))
    }

    /// Headless validation context for the first dialect in `preference`
    /// the driver accepts.
    pub fn negotiate(preference: DialectPreference) -> Self {
        let fallback = preference
            .candidates()
            .first()
            .copied()
            .unwrap_or(Dialect::Glsl330);
        let request = ContextRequest::new(VALIDATION_SIZE, VALIDATION_SIZE, ContextBackend::Headless)
            .with_dialect(preference)
            .with_title("ledshader validation");
        let result = ContextProvider::create_headless(&request);
        let dialect = result.as_ref().map(GlContext::dialect).unwrap_or(fallback);
        Self::from_result(dialect, result)
    }

    /// Like [`ValidationService::new`], falling back to a hidden window.
    ///
    /// Call on the thread that owns `target`.
    pub fn with_event_loop<T>(dialect: Dialect, target: &EventLoopWindowTarget<T>) -> Self {
        let request = validation_request(dialect, ContextBackend::Headless);
        Self::from_result(dialect, ContextProvider::create_offscreen(&request, Some(target)))
    }

    /// Validates with the dialect `renderer` compiles for.
    pub fn for_renderer(renderer: &Renderer) -> Self {
        Self::new(renderer.dialect())
    }

    /// Adopts an existing context, releasing it from the calling thread.
    pub fn from_context(context: GlContext) -> Self {
        context.release();
        Self {
            wrapper: ShaderWrapper::new(context.dialect()),
            context: Mutex::new(Some(context)),
            reason: None,
        }
    }

    /// A service that answers every check with [`CompileCheck::Unavailable`].
    pub fn unavailable(dialect: Dialect, reason: impl Into<String>) -> Self {
        Self {
            context: Mutex::new(None),
            wrapper: ShaderWrapper::new(dialect),
            reason: Some(reason.into()),
        }
    }

    fn from_result(dialect: Dialect, result: Result<GlContext, ContextError>) -> Self {
        match result {
            Ok(context) => {
                debug!(backend = %context.backend(), %dialect, "validation context ready");
                Self::from_context(context)
            }
            Err(error) => {
                warn!(%dialect, %error, "no validation context; compile checks are disabled");
                Self::unavailable(dialect, error.to_string())
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.lock()
            .as_ref()
            .map(|context| !context.is_destroyed())
            .unwrap_or(false)
    }

    pub fn dialect(&self) -> Dialect {
        self.wrapper.dialect()
    }

    /// Compiles and links `source` once on the calling thread.
    ///
    /// The service lock is held for the whole compile. All GL objects are
    /// deleted and the context released before returning.
    pub fn test_compile(&self, source: &str) -> CompileCheck {
        let guard = self.lock();
        let Some(context) = guard.as_ref() else {
            return CompileCheck::Unavailable {
                reason: self
                    .reason
                    .clone()
                    .unwrap_or_else(|| "no validation context".to_string()),
            };
        };
        if !context.make_current() {
            let reason = if context.is_destroyed() {
                "validation context was destroyed"
            } else {
                "validation context is current on another thread"
            };
            warn!(reason, "compile check skipped");
            return CompileCheck::Unavailable {
                reason: reason.to_string(),
            };
        }

        let check = match context.gl("test_compile") {
            Ok(gl) => {
                let wrapped = self.wrapper.wrap(source);
                let label = CompileLabel {
                    operation: "test_compile",
                    shader: "validation",
                    dialect: self.wrapper.dialect(),
                };
                // SAFETY: `make_current` succeeded on this thread and the
                // service lock keeps other callers out until release.
                match unsafe { ShaderProgram::build(gl, &wrapped, label) } {
                    Ok(program) => {
                        // SAFETY: as above.
                        unsafe { program.delete(gl) };
                        CompileCheck::Compiled
                    }
                    Err(RenderError::Compile(error)) => CompileCheck::Failed {
                        diagnostics: error.log,
                    },
                    Err(error) => CompileCheck::Unavailable {
                        reason: error.to_string(),
                    },
                }
            }
            Err(error) => CompileCheck::Unavailable {
                reason: error.to_string(),
            },
        };
        context.release();
        debug!(ok = check.is_ok(), known = check.is_known(), "compile check finished");
        check
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<GlContext>> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ValidationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationService")
            .field("dialect", &self.wrapper.dialect())
            .field("available", &self.is_available())
            .finish()
    }
}

fn validation_request(dialect: Dialect, backend: ContextBackend) -> ContextRequest {
    ContextRequest::new(VALIDATION_SIZE, VALIDATION_SIZE, backend)
        .with_dialect(DialectPreference::Exact(dialect))
        .with_title("ledshader validation")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuples_follow_outcome() {
        assert_eq!(CompileCheck::Compiled.as_tuple(), (true, String::new()));
        let failed = CompileCheck::Failed {
            diagnostics: "0:3(1): error: `foo' undeclared".to_string(),
        };
        assert_eq!(failed.as_tuple(), (false, "0:3(1): error: `foo' undeclared".to_string()));
        assert!(failed.is_known());
        assert!(!failed.is_ok());
    }

    #[test]
    fn unavailable_is_not_a_verdict() {
        let check = CompileCheck::Unavailable {
            reason: "no EGL device".to_string(),
        };
        assert!(!check.is_known());
        let (ok, diagnostics) = check.as_tuple();
        assert!(!ok);
        assert!(diagnostics.starts_with("validation unavailable:"));
    }

    #[test]
    fn unavailable_service_never_touches_gl() {
        let service = ValidationService::unavailable(Dialect::Glsl330, "disabled in test");
        assert!(!service.is_available());
        assert_eq!(service.dialect(), Dialect::Glsl330);
        assert_eq!(
            service.test_compile("void mainImage(out vec4 c, in vec2 p) { c = vec4(1.0); }"),
            CompileCheck::Unavailable {
                reason: "disabled in test".to_string()
            }
        );
    }
}
