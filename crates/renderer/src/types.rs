use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Result;

use crate::dialect::DialectPreference;

/// Shadertoy exposes four optional input channels (`iChannel0-3`).
pub const CHANNEL_COUNT: usize = 4;

/// Describes how a channel should be populated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelSource {
    Texture { path: PathBuf },
}

/// Channel texture assignments for one shader.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelBindings {
    sources: [Option<ChannelSource>; CHANNEL_COUNT],
}

impl ChannelBindings {
    /// Creates an empty bindings table with all channels unassigned.
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates a texture path with the given channel.
    pub fn set_texture(&mut self, channel: usize, path: PathBuf) -> Result<()> {
        if channel >= CHANNEL_COUNT {
            anyhow::bail!(
                "channel {} exceeds supported channel count ({})",
                channel,
                CHANNEL_COUNT
            );
        }
        self.sources[channel] = Some(ChannelSource::Texture { path });
        Ok(())
    }

    /// Finds `x.channel0` .. `x.channel3` next to the shader file `x.glsl`.
    ///
    /// The image format is sniffed from file content at load time, so the
    /// sibling files carry no extension of their own.
    pub fn discover(shader_path: &Path) -> Self {
        let mut bindings = Self::default();
        let Some(stem) = shader_path.file_stem() else {
            return bindings;
        };
        let directory = shader_path.parent().unwrap_or_else(|| Path::new(""));
        for (index, slot) in bindings.sources.iter_mut().enumerate() {
            let mut name = stem.to_os_string();
            name.push(format!(".channel{index}"));
            let candidate = directory.join(name);
            if candidate.is_file() {
                tracing::debug!(channel = index, path = %candidate.display(), "found channel texture");
                *slot = Some(ChannelSource::Texture { path: candidate });
            }
        }
        bindings
    }

    pub fn is_empty(&self) -> bool {
        self.sources.iter().all(Option::is_none)
    }

    /// Exposes the underlying channel slots for GPU resource creation.
    pub(crate) fn slots(&self) -> &[Option<ChannelSource>; CHANNEL_COUNT] {
        &self.sources
    }
}

/// Surface kind backing a GL context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextBackend {
    /// Visible desktop window; the owner pumps OS events.
    Windowed,
    /// Never-shown window that only exists to own a context.
    HiddenWindow,
    /// EGL device display with a pbuffer or surfaceless context.
    Headless,
}

impl ContextBackend {
    pub fn is_offscreen(self) -> bool {
        !matches!(self, ContextBackend::Windowed)
    }

    pub fn needs_event_loop(self) -> bool {
        !matches!(self, ContextBackend::Headless)
    }
}

impl fmt::Display for ContextBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextBackend::Windowed => f.write_str("windowed"),
            ContextBackend::HiddenWindow => f.write_str("hidden-window"),
            ContextBackend::Headless => f.write_str("headless"),
        }
    }
}

impl FromStr for ContextBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "windowed" | "window" => Ok(ContextBackend::Windowed),
            "hidden" | "hidden-window" | "hidden_window" => Ok(ContextBackend::HiddenWindow),
            "headless" | "egl" => Ok(ContextBackend::Headless),
            other => Err(format!(
                "unknown context backend '{other}' (expected windowed, hidden-window, or headless)"
            )),
        }
    }
}

/// Parameters for creating a GL context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextRequest {
    /// Surface size in physical pixels.
    pub width: u32,
    pub height: u32,
    pub backend: ContextBackend,
    pub dialect: DialectPreference,
    /// Synchronise swaps with the display refresh (windowed only).
    pub vsync: bool,
    /// Window title for the windowed backend.
    pub title: String,
}

impl ContextRequest {
    pub fn new(width: u32, height: u32, backend: ContextBackend) -> Self {
        Self {
            width,
            height,
            backend,
            ..Self::default()
        }
    }

    pub fn with_dialect(mut self, dialect: DialectPreference) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Width and height clamped to at least one pixel.
    pub fn size(&self) -> (u32, u32) {
        (self.width.max(1), self.height.max(1))
    }
}

impl Default for ContextRequest {
    /// A 64×32 headless surface matching common LED matrix panels.
    fn default() -> Self {
        Self {
            width: 64,
            height: 32,
            backend: ContextBackend::Headless,
            dialect: DialectPreference::Auto,
            vsync: false,
            title: "ledshader".to_string(),
        }
    }
}
