use std::collections::HashMap;

use glow::HasContext;

use crate::camera::Basis;
use crate::compile::channel_uniform_name;
use crate::input::camera::basis_uniforms;
use crate::input::analysis::DEFAULT_BPM;
use crate::input::midi::PARAM_COUNT;
use crate::input::{UniformMap, UniformValue};
use crate::types::CHANNEL_COUNT;

/// Clock values fed to the builtin uniforms for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FrameTiming {
    pub time: f32,
    pub delta: f32,
    pub frame: i32,
}

/// Builtin uniforms for a frame, before bus values are layered on top.
pub(crate) fn builtin_uniforms(
    width: u32,
    height: u32,
    timing: FrameTiming,
    default_camera: &Basis,
) -> UniformMap {
    let mut map = basis_uniforms(default_camera);
    map.insert(
        "iResolution".to_string(),
        UniformValue::Vec3([width as f32, height as f32, 1.0]),
    );
    map.insert("iTime".to_string(), UniformValue::Float(timing.time));
    map.insert("iTimeDelta".to_string(), UniformValue::Float(timing.delta));
    map.insert("iFrame".to_string(), UniformValue::Int(timing.frame));
    map.insert("iMouse".to_string(), UniformValue::Vec4([0.0; 4]));
    map.insert("iInput".to_string(), UniformValue::Vec4([0.0; 4]));
    map.insert("iBPM".to_string(), UniformValue::Float(DEFAULT_BPM));
    map.insert("iBeatPhase".to_string(), UniformValue::Float(0.0));
    map.insert("iBeatPulse".to_string(), UniformValue::Float(0.0));
    for index in 0..PARAM_COUNT {
        map.insert(format!("iParam{index}"), UniformValue::Float(0.0));
    }
    map
}

/// Cached uniform locations for one linked program.
///
/// Uniforms the compiler optimised away resolve to `None` and are skipped.
#[derive(Debug, Default)]
pub(crate) struct UniformLocations {
    cache: HashMap<String, Option<glow::UniformLocation>>,
}

impl UniformLocations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points `iChannelN` at texture unit `N`.
    ///
    /// # Safety
    /// `gl` must belong to the context current on this thread with `program` in use.
    pub unsafe fn bind_samplers(&mut self, gl: &glow::Context, program: glow::Program) {
        for index in 0..CHANNEL_COUNT {
            if let Some(name) = channel_uniform_name(index) {
                if let Some(location) = self.location(gl, program, name) {
                    gl.uniform_1_i32(Some(&location), index as i32);
                }
            }
        }
    }

    /// # Safety
    /// `gl` must belong to the context current on this thread with `program` in use.
    pub unsafe fn upload(&mut self, gl: &glow::Context, program: glow::Program, values: &UniformMap) {
        for (name, value) in values {
            let Some(location) = self.location(gl, program, name) else {
                continue;
            };
            let location = Some(&location);
            match *value {
                UniformValue::Float(x) => gl.uniform_1_f32(location, x),
                UniformValue::Vec2([x, y]) => gl.uniform_2_f32(location, x, y),
                UniformValue::Vec3([x, y, z]) => gl.uniform_3_f32(location, x, y, z),
                UniformValue::Vec4([x, y, z, w]) => gl.uniform_4_f32(location, x, y, z, w),
                UniformValue::Int(x) => gl.uniform_1_i32(location, x),
            }
        }
    }

    unsafe fn location(
        &mut self,
        gl: &glow::Context,
        program: glow::Program,
        name: &str,
    ) -> Option<glow::UniformLocation> {
        if let Some(cached) = self.cache.get(name) {
            return cached.clone();
        }
        let location = gl.get_uniform_location(program, name);
        if location.is_none() {
            tracing::trace!(uniform = name, "uniform not active in program");
        }
        self.cache.insert(name.to_string(), location.clone());
        location
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraModel;
    use crate::compile::FIXED_UNIFORMS;

    #[test]
    fn builtins_cover_non_sampler_surface() {
        let timing = FrameTiming {
            time: 1.5,
            delta: 0.25,
            frame: 6,
        };
        let map = builtin_uniforms(64, 32, timing, &CameraModel::default().basis());
        for (name, ty) in FIXED_UNIFORMS {
            if *ty == "sampler2D" {
                continue;
            }
            let value = map.get(*name).unwrap_or_else(|| panic!("missing {name}"));
            assert_eq!(value.kind().to_string(), *ty, "{name}");
        }
        assert_eq!(map["iResolution"], UniformValue::Vec3([64.0, 32.0, 1.0]));
        assert_eq!(map["iMouse"], UniformValue::Vec4([0.0; 4]));
        assert_eq!(map["iFrame"], UniformValue::Int(6));
    }
}
