//! Camera pose for a viewer standing at the centre of the panorama

use std::f32::consts::{PI, TAU};

use glam::{Mat4, Vec2, Vec3};

/// Rotation and zoom of the interior camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    /// Horizontal angle in radians, kept in (-π, π]
    pub yaw: f32,
    /// Vertical angle in radians, clamped to ±max pitch
    pub pitch: f32,
    /// Vertical field of view in degrees
    pub field_of_view: f32,
    /// Release velocity while momentum runs; zero at rest
    pub momentum_velocity: Vec2,
}

impl CameraState {
    pub fn new(field_of_view: f32) -> Self {
        Self {
            yaw: 0.0,
            pitch: 0.0,
            field_of_view,
            momentum_velocity: Vec2::ZERO,
        }
    }

    /// Unit look direction: -Z rotated by yaw, then pitch
    pub fn forward(&self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        Vec3::new(-sy * cp, sp, -cy * cp)
    }

    /// View matrix for a camera at the origin
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(Vec3::ZERO, self.forward(), Vec3::Y)
    }

    pub fn projection_matrix(&self, aspect: f32, near: f32, far: f32) -> Mat4 {
        Mat4::perspective_rh(self.field_of_view.to_radians(), aspect, near, far)
    }

    pub fn view_projection_matrix(&self, aspect: f32, near: f32, far: f32) -> Mat4 {
        self.projection_matrix(aspect, near, far) * self.view_matrix()
    }
}

/// Wrap an angle into (-π, π]
pub fn wrap_angle(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }
    if angle > -PI && angle <= PI {
        return angle;
    }
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_angle_range() {
        assert_eq!(wrap_angle(0.0), 0.0);
        assert!((wrap_angle(3.0 * PI + 0.1) - (0.1 - PI)).abs() < 1e-5);
        assert!((wrap_angle(-PI) - PI).abs() < 1e-6);
        assert!((wrap_angle(TAU + 0.5) - 0.5).abs() < 1e-5);
        for i in -100..100 {
            let w = wrap_angle(i as f32 * 0.37);
            assert!(w > -PI && w <= PI, "{} out of range", w);
        }
    }

    #[test]
    fn test_default_looks_down_negative_z() {
        let camera = CameraState::new(75.0);
        assert!((camera.forward() - Vec3::NEG_Z).length() < 1e-6);

        let p = camera.view_matrix().transform_point3(Vec3::new(0.0, 0.0, -5.0));
        assert!((p - Vec3::new(0.0, 0.0, -5.0)).length() < 1e-5);
    }

    #[test]
    fn test_pitch_looks_up() {
        let mut camera = CameraState::new(75.0);
        camera.pitch = 0.5;
        assert!(camera.forward().y > 0.0);
        assert!((camera.forward().length() - 1.0).abs() < 1e-6);
    }
}
