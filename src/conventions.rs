//! Axis-convention corrections between the pose service and an OpenGL renderer.
//!
//! The pose service uses a right-handed Z-up world and a camera looking down
//! +Z with +Y down. OpenGL uses a Y-up world and a camera looking down -Z
//! with +Y up. Both corrections are pure rotations.

use nalgebra::Matrix4;

/// Start-of-service frame expressed in the OpenGL world: -90 degrees about X.
pub fn opengl_world_t_start_of_service() -> Matrix4<f64> {
    Matrix4::new(
        1.0, 0.0, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0,
        0.0, -1.0, 0.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    )
}

/// OpenGL camera expressed in the color camera frame: 180 degrees about X.
pub fn color_camera_t_opengl_camera() -> Matrix4<f64> {
    Matrix4::new(
        1.0, 0.0, 0.0, 0.0,
        0.0, -1.0, 0.0, 0.0,
        0.0, 0.0, -1.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    )
}
