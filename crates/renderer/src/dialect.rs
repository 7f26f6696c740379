//! GLSL dialects the renderer can target.
//!
//! Each [`Dialect`] maps to one context API request and one [`DialectDescriptor`]
//! describing the template differences the wrapper has to paper over. Nothing
//! outside this module and `compile` should branch on GLSL versions.

use std::fmt;
use std::str::FromStr;

use glutin::context::{ContextApi, GlProfile, Version};

/// A concrete GLSL version/profile pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Desktop OpenGL 2.1 / GLSL 1.20 (legacy macOS and old Mesa drivers).
    Glsl120,
    /// Desktop OpenGL 3.3 core / GLSL 3.30.
    Glsl330,
    /// OpenGL ES 3.0 / GLSL ES 3.00 (Raspberry Pi, EGL headless).
    Gles300,
}

/// Builtin functions a dialect lacks and the wrapper must provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Polyfills {
    pub tanh: bool,
    pub round: bool,
}

impl Polyfills {
    pub const NONE: Self = Self {
        tanh: false,
        round: false,
    };

    pub fn any(self) -> bool {
        self.tanh || self.round
    }
}

/// Template fragments that differ between dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialectDescriptor {
    /// Full `#version` directive line.
    pub version: &'static str,
    /// Keyword used for vertex inputs (`attribute` or `in`).
    pub attribute_keyword: &'static str,
    /// Default precision statements emitted ahead of the uniform block.
    pub precision_preamble: &'static str,
    /// Whether `precision` statements are legal at all (GLSL 1.30+ and ES).
    pub precision_qualifiers: bool,
    /// Whether the overloaded `texture()` sampler call exists.
    pub unified_texture: bool,
    /// Builtins to inject ahead of user code.
    pub polyfills: Polyfills,
    /// Name of the user-declared fragment output, or `None` for `gl_FragColor`.
    pub fragment_output: Option<&'static str>,
    /// Argument to `#line` that numbers the following line 1. GLSL before 3.30
    /// applies the directive to the line after it.
    pub line_base: u32,
}

const GLSL_120: DialectDescriptor = DialectDescriptor {
    version: "#version 120",
    attribute_keyword: "attribute",
    precision_preamble: "",
    precision_qualifiers: false,
    unified_texture: false,
    polyfills: Polyfills {
        tanh: true,
        round: true,
    },
    fragment_output: None,
    line_base: 0,
};

const GLSL_330: DialectDescriptor = DialectDescriptor {
    version: "#version 330 core",
    attribute_keyword: "in",
    precision_preamble: "",
    precision_qualifiers: true,
    unified_texture: true,
    polyfills: Polyfills::NONE,
    fragment_output: Some("ledshader_FragColor"),
    line_base: 1,
};

const GLES_300: DialectDescriptor = DialectDescriptor {
    version: "#version 300 es",
    attribute_keyword: "in",
    precision_preamble: "precision highp float;\nprecision highp int;\nprecision mediump sampler2D;",
    precision_qualifiers: true,
    unified_texture: true,
    polyfills: Polyfills::NONE,
    fragment_output: Some("ledshader_FragColor"),
    line_base: 1,
};

impl Dialect {
    pub const ALL: [Dialect; 3] = [Dialect::Glsl120, Dialect::Glsl330, Dialect::Gles300];

    pub fn descriptor(self) -> &'static DialectDescriptor {
        match self {
            Dialect::Glsl120 => &GLSL_120,
            Dialect::Glsl330 => &GLSL_330,
            Dialect::Gles300 => &GLES_300,
        }
    }

    /// Context API glutin should request for this dialect.
    pub fn context_api(self) -> ContextApi {
        match self {
            Dialect::Glsl120 => ContextApi::OpenGl(Some(Version::new(2, 1))),
            Dialect::Glsl330 => ContextApi::OpenGl(Some(Version::new(3, 3))),
            Dialect::Gles300 => ContextApi::Gles(Some(Version::new(3, 0))),
        }
    }

    pub fn profile(self) -> Option<GlProfile> {
        match self {
            Dialect::Glsl330 => Some(GlProfile::Core),
            Dialect::Glsl120 | Dialect::Gles300 => None,
        }
    }

    pub fn is_embedded(self) -> bool {
        matches!(self, Dialect::Gles300)
    }

    /// Vertex array objects are mandatory in core/ES3 contexts and absent from GL 2.1.
    pub fn uses_vertex_arrays(self) -> bool {
        !matches!(self, Dialect::Glsl120)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Glsl120 => f.write_str("glsl120"),
            Dialect::Glsl330 => f.write_str("glsl330"),
            Dialect::Gles300 => f.write_str("gles300"),
        }
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "glsl120" | "gl21" | "120" => Ok(Dialect::Glsl120),
            "glsl330" | "gl33" | "330" => Ok(Dialect::Glsl330),
            "gles300" | "gles3" | "300es" => Ok(Dialect::Gles300),
            other => Err(format!(
                "unknown GLSL dialect '{other}' (expected glsl120, glsl330, or gles300)"
            )),
        }
    }
}

/// Which dialect(s) a context request may settle on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialectPreference {
    /// Try the platform's preferred order until a context is created.
    #[default]
    Auto,
    /// Only accept this dialect.
    Exact(Dialect),
}

impl DialectPreference {
    /// Ordered list of dialects to attempt.
    pub fn candidates(self) -> Vec<Dialect> {
        match self {
            DialectPreference::Exact(dialect) => vec![dialect],
            DialectPreference::Auto => {
                if cfg!(target_os = "macos") {
                    vec![Dialect::Glsl120, Dialect::Glsl330]
                } else {
                    vec![Dialect::Gles300, Dialect::Glsl330, Dialect::Glsl120]
                }
            }
        }
    }
}

impl FromStr for DialectPreference {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.trim().eq_ignore_ascii_case("auto") {
            Ok(DialectPreference::Auto)
        } else {
            value.parse().map(DialectPreference::Exact)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_dialect_needs_polyfills_and_aliasing() {
        let descriptor = Dialect::Glsl120.descriptor();
        assert!(descriptor.polyfills.tanh);
        assert!(descriptor.polyfills.round);
        assert!(!descriptor.unified_texture);
        assert!(descriptor.fragment_output.is_none());
        assert!(!descriptor.precision_qualifiers);
    }

    #[test]
    fn modern_dialects_skip_polyfills() {
        for dialect in [Dialect::Glsl330, Dialect::Gles300] {
            let descriptor = dialect.descriptor();
            assert!(!descriptor.polyfills.any());
            assert!(descriptor.unified_texture);
            assert!(descriptor.precision_qualifiers);
        }
    }

    #[test]
    fn parses_dialect_names() {
        assert_eq!("gles300".parse::<Dialect>().unwrap(), Dialect::Gles300);
        assert_eq!("GL21".parse::<Dialect>().unwrap(), Dialect::Glsl120);
        assert!("glsl450".parse::<Dialect>().is_err());
        assert_eq!(
            "auto".parse::<DialectPreference>().unwrap(),
            DialectPreference::Auto
        );
        assert_eq!(
            "glsl330".parse::<DialectPreference>().unwrap(),
            DialectPreference::Exact(Dialect::Glsl330)
        );
    }

    #[test]
    fn exact_preference_has_single_candidate() {
        assert_eq!(
            DialectPreference::Exact(Dialect::Glsl330).candidates(),
            vec![Dialect::Glsl330]
        );
        assert!(DialectPreference::Auto.candidates().len() >= 2);
    }
}
