use std::fmt::Write as _;

use crate::dialect::{Dialect, DialectDescriptor, Polyfills};
use crate::types::CHANNEL_COUNT;

/// Name of the single vertex input carrying quad corners.
pub const POSITION_ATTRIBUTE: &str = "a_position";

/// Attribute slot bound to [`POSITION_ATTRIBUTE`] before linking.
pub const POSITION_LOCATION: u32 = 0;

/// Fixed uniform surface every wrapped shader can rely on, as `(name, glsl type)`.
pub const FIXED_UNIFORMS: &[(&str, &str)] = &[
    ("iResolution", "vec3"),
    ("iTime", "float"),
    ("iTimeDelta", "float"),
    ("iFrame", "int"),
    ("iMouse", "vec4"),
    ("iChannel0", "sampler2D"),
    ("iChannel1", "sampler2D"),
    ("iChannel2", "sampler2D"),
    ("iChannel3", "sampler2D"),
    ("iInput", "vec4"),
    ("iCameraPos", "vec3"),
    ("iCameraRight", "vec3"),
    ("iCameraUp", "vec3"),
    ("iCameraForward", "vec3"),
    ("iBPM", "float"),
    ("iBeatPhase", "float"),
    ("iBeatPulse", "float"),
    ("iParam0", "float"),
    ("iParam1", "float"),
    ("iParam2", "float"),
    ("iParam3", "float"),
];

/// Complete vertex + fragment sources ready for `glShaderSource`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedShader {
    pub vertex: String,
    pub fragment: String,
}

/// Turns Shadertoy-style `mainImage` bodies into full programs for one dialect.
///
/// The live renderer and the validation service must both wrap through the
/// same `ShaderWrapper` value (or one built from the same [`Dialect`]); the
/// wrapper is a pure function of `(source, dialect)` so equal inputs always
/// produce byte-identical programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderWrapper {
    dialect: Dialect,
}

impl ShaderWrapper {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn wrap(&self, source: &str) -> WrappedShader {
        WrappedShader {
            vertex: vertex_source(self.dialect.descriptor()),
            fragment: wrap_fragment(source, self.dialect.descriptor()),
        }
    }
}

/// Convenience form of [`ShaderWrapper::wrap`].
pub fn wrap(source: &str, dialect: Dialect) -> WrappedShader {
    ShaderWrapper::new(dialect).wrap(source)
}

fn vertex_source(descriptor: &DialectDescriptor) -> String {
    let mut out = String::with_capacity(256);
    let _ = writeln!(out, "{}", descriptor.version);
    if !descriptor.precision_preamble.is_empty() {
        let _ = writeln!(out, "{}", descriptor.precision_preamble);
    }
    let _ = writeln!(
        out,
        "{} vec2 {POSITION_ATTRIBUTE};",
        descriptor.attribute_keyword
    );
    out.push_str("void main() {\n");
    let _ = writeln!(out, "    gl_Position = vec4({POSITION_ATTRIBUTE}, 0.0, 1.0);");
    out.push_str("}\n");
    out
}

/// Produces a self-contained fragment shader from raw Shadertoy code.
///
/// 1. Strip `#version` directives, uniform declarations that shadow the
///    fixed surface, and (for GLSL 1.20) precision statements.
/// 2. Emit the dialect header: version, precision, output declaration,
///    texture alias, polyfills, and the fixed uniform block.
/// 3. Reset line numbering so compiler logs point into the user's code.
/// 4. Append `main()` which calls `mainImage` with the window-space pixel.
fn wrap_fragment(source: &str, descriptor: &DialectDescriptor) -> String {
    let sanitized = sanitize_user_source(source, descriptor);

    let mut out = String::with_capacity(sanitized.len() + 2048);
    let _ = writeln!(out, "{}", descriptor.version);
    if !descriptor.precision_preamble.is_empty() {
        let _ = writeln!(out, "{}", descriptor.precision_preamble);
    }
    if let Some(output) = descriptor.fragment_output {
        let _ = writeln!(out, "out vec4 {output};");
    }
    if !descriptor.unified_texture {
        out.push_str("#define texture texture2D\n");
    }
    push_polyfills(&mut out, descriptor.polyfills);
    for (name, ty) in FIXED_UNIFORMS {
        let _ = writeln!(out, "uniform {ty} {name};");
    }
    let _ = writeln!(out, "#line {}", descriptor.line_base);
    out.push_str(&sanitized);
    if !sanitized.ends_with('\n') {
        out.push('\n');
    }

    let target = descriptor.fragment_output.unwrap_or("gl_FragColor");
    let _ = write!(
        out,
        "void main() {{\n    vec4 color = vec4(0.0);\n    mainImage(color, gl_FragCoord.xy);\n    {target} = vec4(color.rgb, 1.0);\n}}\n"
    );
    out
}

/// Removed lines stay behind as blanks so diagnostics keep the user's numbering.
fn sanitize_user_source(source: &str, descriptor: &DialectDescriptor) -> String {
    let mut sanitized = String::with_capacity(source.len());
    for line in source.lines() {
        let trimmed = line.trim_start();
        let drop = trimmed.starts_with("#version")
            || (!descriptor.precision_qualifiers && trimmed.starts_with("precision "));
        if !drop {
            match trimmed
                .starts_with("uniform ")
                .then(|| strip_fixed_uniforms(line))
                .flatten()
            {
                Some(rewritten) => sanitized.push_str(&rewritten),
                None => sanitized.push_str(line),
            }
        }
        sanitized.push('\n');
    }
    sanitized
}

/// Rewrites a single-line `uniform` declaration without the declarators that
/// shadow [`FIXED_UNIFORMS`]. `None` leaves the line untouched; declarations
/// spanning lines are left for the driver to judge.
fn strip_fixed_uniforms(line: &str) -> Option<String> {
    let body = line.trim_start();
    let indent = &line[..line.len() - body.len()];
    let end = body.find(';')?;
    let declaration = body[..end].strip_prefix("uniform")?;
    let trailing = body[end + 1..].trim_start();

    let mut parts = declaration.split(',');
    let first = parts.next()?;
    let head = declarator_name_region(first).trim_end();
    let name_start = head.rfind(char::is_whitespace)? + 1;
    let type_prefix = first[..name_start].trim();

    let declarators: Vec<&str> = std::iter::once(&first[name_start..])
        .chain(parts)
        .map(str::trim)
        .collect();
    let kept: Vec<&str> = declarators
        .iter()
        .copied()
        .filter(|declarator| !is_fixed_uniform(declarator_name_region(declarator).trim()))
        .collect();
    if kept.len() == declarators.len() {
        return None;
    }
    if kept.is_empty() {
        return Some(format!("{indent}{trailing}"));
    }
    let mut rewritten = format!("{indent}uniform {type_prefix} {};", kept.join(", "));
    if !trailing.is_empty() {
        rewritten.push(' ');
        rewritten.push_str(trailing);
    }
    Some(rewritten)
}

/// Text of a declarator before any array size or initialiser.
fn declarator_name_region(declarator: &str) -> &str {
    declarator
        .split(|c: char| c == '[' || c == '=')
        .next()
        .unwrap_or(declarator)
}

fn is_fixed_uniform(name: &str) -> bool {
    FIXED_UNIFORMS.iter().any(|(fixed, _)| *fixed == name)
}

fn push_polyfills(out: &mut String, polyfills: Polyfills) {
    const GEN_TYPES: [&str; 4] = ["float", "vec2", "vec3", "vec4"];
    if polyfills.tanh {
        for ty in GEN_TYPES {
            let _ = writeln!(
                out,
                "{ty} tanh({ty} x) {{ {ty} e = exp(2.0 * clamp(x, -10.0, 10.0)); return (e - 1.0) / (e + 1.0); }}"
            );
        }
    }
    if polyfills.round {
        for ty in GEN_TYPES {
            let _ = writeln!(out, "{ty} round({ty} x) {{ return floor(x + 0.5); }}");
        }
    }
}

/// Sampler uniform name for a channel slot.
pub fn channel_uniform_name(index: usize) -> Option<&'static str> {
    const NAMES: [&str; CHANNEL_COUNT] = ["iChannel0", "iChannel1", "iChannel2", "iChannel3"];
    NAMES.get(index).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"
        void mainImage(out vec4 fragColor, in vec2 fragCoord) {
            vec2 uv = fragCoord / iResolution.xy;
            fragColor = vec4(uv, tanh(iTime), 1.0) * texture(iChannel0, uv);
        }
    "#;

    fn version_lines(text: &str) -> usize {
        text.lines()
            .filter(|line| line.trim_start().starts_with("#version"))
            .count()
    }

    #[test]
    fn every_dialect_emits_exactly_one_version_directive() {
        let with_user_version = format!("#version 300 es\n{BODY}");
        for dialect in Dialect::ALL {
            for source in [BODY, with_user_version.as_str()] {
                let wrapped = wrap(source, dialect);
                assert_eq!(version_lines(&wrapped.fragment), 1, "{dialect} fragment");
                assert_eq!(version_lines(&wrapped.vertex), 1, "{dialect} vertex");
                assert!(wrapped
                    .fragment
                    .starts_with(dialect.descriptor().version));
            }
        }
    }

    #[test]
    fn strips_shadowed_uniform_declarations() {
        let source = r#"
            uniform float iTime;
            uniform vec3 iResolution;
            uniform float myOwnKnob;
            void mainImage(out vec4 fragColor, in vec2 fragCoord) {
                fragColor = vec4(fragCoord, myOwnKnob, 1.0);
            }
        "#;

        let wrapped = wrap(source, Dialect::Gles300);
        assert_eq!(wrapped.fragment.matches("uniform float iTime;").count(), 1);
        assert_eq!(wrapped.fragment.matches("uniform vec3 iResolution;").count(), 1);
        assert!(wrapped.fragment.contains("uniform float myOwnKnob;"));
    }

    #[test]
    fn multi_declarations_keep_user_names() {
        let source = "uniform vec3 iResolution, myExtra; // like iResolution\n\
                      uniform float iTime, iTimeDelta;\n\
                      uniform float knob; // scaled like iTime\n\
                      uniform sampler2D iChannel0[1], detail;\n";
        let sanitized = sanitize_user_source(source, Dialect::Glsl330.descriptor());
        let lines: Vec<&str> = sanitized.lines().collect();
        assert_eq!(
            lines,
            vec![
                "uniform vec3 myExtra; // like iResolution",
                "",
                "uniform float knob; // scaled like iTime",
                "uniform sampler2D detail;",
            ]
        );
    }

    #[test]
    fn stripped_lines_keep_user_numbering() {
        let source = "#version 330 core\nprecision mediump float;\nuniform float iTime;\nfloat marker;\n";
        let sanitized = sanitize_user_source(source, Dialect::Glsl120.descriptor());
        assert_eq!(sanitized.lines().position(|line| line == "float marker;"), Some(3));
        assert_eq!(sanitized.lines().count(), 4);
    }

    #[test]
    fn line_directive_base_follows_dialect() {
        assert!(wrap(BODY, Dialect::Glsl120).fragment.contains("\n#line 0\n"));
        for dialect in [Dialect::Glsl330, Dialect::Gles300] {
            assert!(wrap(BODY, dialect).fragment.contains("\n#line 1\n"));
        }
    }

    #[test]
    fn legacy_dialect_aliases_texture_and_injects_polyfills() {
        let wrapped = wrap(BODY, Dialect::Glsl120);
        assert!(wrapped.fragment.contains("#define texture texture2D"));
        assert!(wrapped.fragment.contains("float tanh(float x)"));
        assert!(wrapped.fragment.contains("vec4 tanh(vec4 x)"));
        assert!(wrapped.fragment.contains("vec3 round(vec3 x) { return floor(x + 0.5); }"));
        assert!(wrapped.fragment.contains("gl_FragColor = vec4(color.rgb, 1.0);"));
        assert!(wrapped.vertex.contains("attribute vec2 a_position;"));
    }

    #[test]
    fn modern_dialects_use_native_builtins() {
        for dialect in [Dialect::Glsl330, Dialect::Gles300] {
            let wrapped = wrap(BODY, dialect);
            assert!(!wrapped.fragment.contains("#define texture"));
            assert!(!wrapped.fragment.contains("tanh(float x)"));
            assert!(wrapped.fragment.contains("out vec4 ledshader_FragColor;"));
            assert!(wrapped.vertex.contains("in vec2 a_position;"));
        }
    }

    #[test]
    fn legacy_dialect_drops_precision_statements() {
        let source = format!("precision mediump float;\n{BODY}");
        let legacy = wrap(&source, Dialect::Glsl120);
        assert!(!legacy.fragment.contains("precision mediump float;"));
        let es = wrap(&source, Dialect::Gles300);
        assert!(es.fragment.contains("precision mediump float;"));
        assert!(es.fragment.contains("precision highp float;"));
    }

    #[test]
    fn declares_full_uniform_surface_before_user_code() {
        let wrapped = wrap(BODY, Dialect::Glsl330);
        let line_marker = wrapped.fragment.find("#line 1").expect("line marker");
        for (name, ty) in FIXED_UNIFORMS {
            let declaration = format!("uniform {ty} {name};");
            let position = wrapped
                .fragment
                .find(&declaration)
                .unwrap_or_else(|| panic!("missing {declaration}"));
            assert!(position < line_marker);
        }
        assert!(wrapped.fragment.trim_end().ends_with('}'));
        assert!(wrapped.fragment.contains("mainImage(color, gl_FragCoord.xy);"));
    }

    #[test]
    fn wrapping_is_deterministic() {
        let wrapper = ShaderWrapper::new(Dialect::Gles300);
        assert_eq!(wrapper.wrap(BODY), wrap(BODY, Dialect::Gles300));
    }

    #[test]
    fn channel_names_cover_all_slots() {
        assert_eq!(channel_uniform_name(0), Some("iChannel0"));
        assert_eq!(channel_uniform_name(3), Some("iChannel3"));
        assert_eq!(channel_uniform_name(4), None);
    }
}
