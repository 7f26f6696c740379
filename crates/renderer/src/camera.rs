//! Orbit camera driven by spherical coordinates.
//!
//! The basis is built from the analytic partial derivatives of the orbit
//! position rather than from cross products against a fixed world up, so it
//! stays orthonormal at every pitch including the poles.

use glam::Vec3;

/// Tunables for [`CameraModel`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraConfig {
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    /// Per-tick velocity retention at 60 Hz, in `(0, 1]`.
    pub damping: f32,
    /// Radians per second² per unit of horizontal input.
    pub yaw_acceleration: f32,
    /// Radians per second² per unit of vertical input.
    pub pitch_acceleration: f32,
    /// Units per second² per unit of depth (or zoom-modified vertical) input.
    pub zoom_acceleration: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            distance: 10.0,
            yaw: 0.0,
            pitch: 0.0,
            min_distance: 1.0,
            max_distance: 50.0,
            damping: 0.9,
            yaw_acceleration: 4.0,
            pitch_acceleration: 4.0,
            zoom_acceleration: 20.0,
        }
    }
}

/// Normalised input for one tick, each axis in `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputDelta {
    pub horizontal: f32,
    pub vertical: f32,
    pub depth: f32,
}

/// Orthonormal camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Basis {
    pub position: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    pub forward: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraModel {
    config: CameraConfig,
    distance: f32,
    yaw: f32,
    pitch: f32,
    distance_velocity: f32,
    yaw_velocity: f32,
    pitch_velocity: f32,
}

impl CameraModel {
    pub fn new(config: CameraConfig) -> Self {
        let (min, max) = ordered_bounds(&config);
        Self {
            config,
            distance: config.distance.clamp(min, max),
            yaw: config.yaw,
            pitch: config.pitch,
            distance_velocity: 0.0,
            yaw_velocity: 0.0,
            pitch_velocity: 0.0,
        }
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Advances the camera by `dt` seconds.
    ///
    /// With `zoom_modifier` held the vertical axis drives distance instead of pitch.
    pub fn update(&mut self, input: InputDelta, dt: f32, zoom_modifier: bool) {
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        let horizontal = sanitize_axis(input.horizontal);
        let vertical = sanitize_axis(input.vertical);
        let depth = sanitize_axis(input.depth);

        self.yaw_velocity += horizontal * self.config.yaw_acceleration * dt;
        if zoom_modifier {
            self.distance_velocity += vertical * self.config.zoom_acceleration * dt;
        } else {
            self.pitch_velocity += vertical * self.config.pitch_acceleration * dt;
        }
        self.distance_velocity += depth * self.config.zoom_acceleration * dt;

        self.yaw += self.yaw_velocity * dt;
        self.pitch += self.pitch_velocity * dt;
        self.distance += self.distance_velocity * dt;

        let decay = self.config.damping.clamp(0.0, 1.0).powf(dt * 60.0);
        self.yaw_velocity *= decay;
        self.pitch_velocity *= decay;
        self.distance_velocity *= decay;

        let (min, max) = ordered_bounds(&self.config);
        if !self.distance.is_finite() || self.distance <= min {
            self.distance = min;
            self.distance_velocity = 0.0;
        } else if self.distance >= max {
            self.distance = max;
            self.distance_velocity = 0.0;
        }
    }

    pub fn basis(&self) -> Basis {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();

        let direction = Vec3::new(cos_pitch * sin_yaw, sin_pitch, cos_pitch * cos_yaw);
        Basis {
            position: direction * self.distance,
            right: Vec3::new(cos_yaw, 0.0, -sin_yaw),
            up: Vec3::new(-sin_pitch * sin_yaw, cos_pitch, -sin_pitch * cos_yaw),
            forward: -direction,
        }
    }
}

impl Default for CameraModel {
    fn default() -> Self {
        Self::new(CameraConfig::default())
    }
}

fn ordered_bounds(config: &CameraConfig) -> (f32, f32) {
    let min = config.min_distance.min(config.max_distance);
    let max = config.min_distance.max(config.max_distance);
    (min, max)
}

fn sanitize_axis(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}
