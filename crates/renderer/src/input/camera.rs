use crate::camera::{Basis, CameraConfig, CameraModel, InputDelta};

use super::keyboard::InputHandle;
use super::{SourceKind, UniformMap, UniformSource, UniformValue};

/// Publishes the orbit camera basis as `iCameraPos/Right/Up/Forward`.
pub struct CameraSource {
    model: CameraModel,
    input: InputHandle,
}

impl CameraSource {
    pub fn new(config: CameraConfig, input: InputHandle) -> Self {
        Self {
            model: CameraModel::new(config),
            input,
        }
    }

    pub fn model(&self) -> &CameraModel {
        &self.model
    }
}

impl UniformSource for CameraSource {
    fn name(&self) -> &str {
        "camera"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Camera
    }

    fn step(&mut self, dt: f32) {
        let axes = self.input.get();
        let delta = InputDelta {
            horizontal: axes.horizontal,
            vertical: axes.vertical,
            depth: axes.depth,
        };
        self.model.update(delta, dt, axes.modifier);
    }

    fn uniforms(&self) -> UniformMap {
        basis_uniforms(&self.model.basis())
    }
}

/// Camera uniforms for a basis; also used for the default camera.
pub(crate) fn basis_uniforms(basis: &Basis) -> UniformMap {
    let mut map = UniformMap::new();
    map.insert("iCameraPos".to_string(), UniformValue::from(basis.position));
    map.insert("iCameraRight".to_string(), UniformValue::from(basis.right));
    map.insert("iCameraUp".to_string(), UniformValue::from(basis.up));
    map.insert("iCameraForward".to_string(), UniformValue::from(basis.forward));
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::keyboard::InputAxes;

    #[test]
    fn follows_shared_input_axes() {
        let input = InputHandle::new();
        let mut source = CameraSource::new(CameraConfig::default(), input.clone());
        let start = source.uniforms()["iCameraPos"];
        assert_eq!(start, UniformValue::Vec3([0.0, 0.0, 10.0]));

        input.set(InputAxes {
            horizontal: 1.0,
            ..InputAxes::default()
        });
        for _ in 0..30 {
            source.step(1.0 / 60.0);
        }
        assert!(source.model().yaw() > 0.0);
        match source.uniforms()["iCameraPos"] {
            UniformValue::Vec3([x, _, _]) => assert!(x > 0.0),
            other => panic!("unexpected value {other:?}"),
        }
    }
}
