use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::dialect::Dialect;
use crate::types::ContextBackend;

/// Pipeline stage a compiler log came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Link,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
            ShaderStage::Link => f.write_str("link"),
        }
    }
}

/// A shader failed to compile or link. `log` is the driver's text, unmodified.
#[derive(Debug, Clone, Error)]
#[error("{operation}: {stage} stage failed for shader '{shader}' ({dialect}):\n{log}")]
pub struct CompileError {
    pub stage: ShaderStage,
    pub log: String,
    pub operation: &'static str,
    pub shader: String,
    pub dialect: Dialect,
}

/// Why a GL context could not be produced.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("{backend} backend requires an event loop target")]
    EventLoopRequired { backend: ContextBackend },
    #[error("{backend} backend failed: {message}")]
    Backend {
        backend: ContextBackend,
        message: String,
    },
    #[error("{backend} backend is not supported on this platform")]
    Unsupported { backend: ContextBackend },
    #[error("no offscreen GL context available: {}", format_failures(.0))]
    Unavailable(Vec<ContextError>),
}

impl ContextError {
    pub(crate) fn backend(backend: ContextBackend, message: impl fmt::Display) -> Self {
        ContextError::Backend {
            backend,
            message: message.to_string(),
        }
    }
}

fn format_failures(failures: &[ContextError]) -> String {
    if failures.is_empty() {
        return "no backend attempted".to_string();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors surfaced by [`crate::Renderer`] and the GL context guard.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Environment(#[from] ContextError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("{operation} requires the GL context to be current on this thread")]
    NotCurrent { operation: &'static str },
    #[error("GL context has been destroyed")]
    Destroyed,
    #[error("no shader program loaded")]
    NoProgram,
    #[error("pixels for this frame were already read back")]
    AlreadyRead,
    #[error("{operation} failed: {message}")]
    Gl {
        operation: &'static str,
        message: String,
    },
    #[error("failed to read shader {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RenderError {
    pub(crate) fn gl(operation: &'static str, message: impl fmt::Display) -> Self {
        RenderError::Gl {
            operation,
            message: message.to_string(),
        }
    }
}

/// Audio decoding and analysis setup failures.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("failed to decode audio file {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    #[error("audio file {path} contains no samples")]
    Empty { path: PathBuf },
    #[error("fft size must be a power of two >= 16 (got {0})")]
    InvalidFftSize(usize),
    #[error("sample rate must be positive")]
    InvalidSampleRate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_keeps_log_verbatim() {
        let log = "0:3(12): error: `foo' undeclared\n";
        let error = CompileError {
            stage: ShaderStage::Fragment,
            log: log.to_string(),
            operation: "load_shader",
            shader: "plasma".to_string(),
            dialect: Dialect::Gles300,
        };
        let rendered = error.to_string();
        assert!(rendered.contains(log));
        assert!(rendered.contains("plasma"));
        assert!(rendered.contains("gles300"));
        assert!(rendered.contains("fragment"));
    }

    #[test]
    fn unavailable_lists_each_backend() {
        let error = ContextError::Unavailable(vec![
            ContextError::backend(ContextBackend::Headless, "no EGL devices"),
            ContextError::EventLoopRequired {
                backend: ContextBackend::HiddenWindow,
            },
        ]);
        let text = error.to_string();
        assert!(text.contains("headless backend failed: no EGL devices"));
        assert!(text.contains("hidden-window backend requires an event loop"));
    }
}
