//! C FFI layer for arpose.
//!
//! Flat entry points over the transform math for C/C++ render hosts.
//! Matrices are 16 `double`s in column-major order, the layout OpenGL expects.
//! Quaternions use the pose service's `[x, y, z, w]` order.
//! The generated C header is written to `include/arpose.h` by cbindgen.

use crate::composer::{compose_camera_transform, Extrinsics};
use crate::error::LastError;
use crate::math;
use crate::types::{
    quaternion_from_xyzw, quaternion_to_xyzw, CameraId, CameraIntrinsics, FramePair, Pose,
};
use crate::PoseError;
use nalgebra::{Isometry3, Matrix4, Translation3};
use std::ffi::{c_char, c_int};

static LAST_ERROR: LastError = LastError::new();

/// Rigid transform in C-compatible layout.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ApRigid {
    /// Translation [x, y, z] in meters.
    pub translation: [f64; 3],
    /// Quaternion [qx, qy, qz, qw].
    pub orientation: [f64; 4],
}

/// Decomposed transform in C-compatible layout.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ApDecomposed {
    pub translation: [f64; 3],
    /// Quaternion [qx, qy, qz, qw].
    pub rotation: [f64; 4],
    pub scale: [f64; 3],
}

impl ApRigid {
    fn isometry(&self) -> Isometry3<f64> {
        let [x, y, z] = self.translation;
        Isometry3::from_parts(Translation3::new(x, y, z), quaternion_from_xyzw(self.orientation))
    }
}

/// # Safety
/// `m` must be non-null and point to 16 doubles.
unsafe fn read_matrix(m: *const f64) -> Matrix4<f64> {
    Matrix4::from_column_slice(std::slice::from_raw_parts(m, 16))
}

/// # Safety
/// `out` must be non-null and point to 16 doubles.
unsafe fn write_matrix(m: &Matrix4<f64>, out: *mut f64) {
    std::slice::from_raw_parts_mut(out, 16).copy_from_slice(m.as_slice());
}

/// Compose the render camera transform.
///
/// `world_correction` and `camera_correction` may be null for identity.
/// Writes 16 doubles to `out`. Returns 0 on success, -1 on null arguments.
///
/// # Safety
/// `device_pose`, `imu_t_device` and `imu_t_color_camera` must point to valid
/// `ApRigid` values; matrix pointers must reference 16 doubles or be null.
#[no_mangle]
pub unsafe extern "C" fn ap_compose_camera_transform(
    device_pose: *const ApRigid,
    imu_t_device: *const ApRigid,
    imu_t_color_camera: *const ApRigid,
    world_correction: *const f64,
    camera_correction: *const f64,
    out: *mut f64,
) -> c_int {
    if device_pose.is_null() || imu_t_device.is_null() || imu_t_color_camera.is_null() || out.is_null()
    {
        return -1;
    }

    let device = (*device_pose).isometry();
    let pose = Pose {
        timestamp: 0.0,
        frame: FramePair::device(false),
        translation: device.translation.vector,
        rotation: device.rotation,
    };
    let extrinsics = Extrinsics {
        imu_t_device: (*imu_t_device).isometry(),
        imu_t_color_camera: (*imu_t_color_camera).isometry(),
    };
    let world = if world_correction.is_null() {
        Matrix4::identity()
    } else {
        read_matrix(world_correction)
    };
    let camera = if camera_correction.is_null() {
        Matrix4::identity()
    } else {
        read_matrix(camera_correction)
    };

    write_matrix(&compose_camera_transform(&pose, &extrinsics, &world, &camera), out);
    0
}

/// Decompose a column-major 4x4 matrix.
///
/// # Safety
/// `m` must point to 16 doubles and `out` to a valid `ApDecomposed`, or be null.
#[no_mangle]
pub unsafe extern "C" fn ap_decompose_matrix(m: *const f64, out: *mut ApDecomposed) -> c_int {
    if m.is_null() || out.is_null() {
        return -1;
    }
    let d = math::decompose_matrix(&read_matrix(m));
    out.write(ApDecomposed {
        translation: [d.translation.x, d.translation.y, d.translation.z],
        rotation: quaternion_to_xyzw(&d.rotation),
        scale: [d.scale.x, d.scale.y, d.scale.z],
    });
    0
}

/// Invert a column-major 4x4 matrix, e.g. to turn a camera transform into a view matrix.
/// Returns -1 if the matrix is singular (check `ap_last_error()`).
///
/// # Safety
/// `m` and `out` must each point to 16 doubles, or be null.
#[no_mangle]
pub unsafe extern "C" fn ap_invert_matrix(m: *const f64, out: *mut f64) -> c_int {
    if m.is_null() || out.is_null() {
        return -1;
    }
    match read_matrix(m).try_inverse() {
        Some(inv) => {
            write_matrix(&inv, out);
            0
        }
        None => {
            LAST_ERROR.set(&PoseError::Singular);
            -1
        }
    }
}

/// First-person projection from color camera intrinsics.
///
/// # Safety
/// `intrinsics` must point to a valid `CameraIntrinsics` and `out` to 16 doubles, or be null.
#[no_mangle]
pub unsafe extern "C" fn ap_projection_from_intrinsics(
    intrinsics: *const CameraIntrinsics,
    near_scale: f64,
    far: f64,
    out: *mut f64,
) -> c_int {
    if intrinsics.is_null() || out.is_null() {
        return -1;
    }
    let intrinsics = &*intrinsics;
    if intrinsics.width == 0 || intrinsics.height == 0 {
        LAST_ERROR.set(&PoseError::IntrinsicsUnavailable(CameraId::Color));
        return -1;
    }
    write_matrix(
        &math::projection_from_intrinsics(intrinsics, near_scale, far),
        out,
    );
    0
}

/// Write the start-of-service to OpenGL world correction (16 doubles).
///
/// # Safety
/// `out` must point to 16 doubles, or be null.
#[no_mangle]
pub unsafe extern "C" fn ap_opengl_world_t_start_of_service(out: *mut f64) {
    if !out.is_null() {
        write_matrix(&crate::conventions::opengl_world_t_start_of_service(), out);
    }
}

/// Write the OpenGL camera to color camera correction (16 doubles).
///
/// # Safety
/// `out` must point to 16 doubles, or be null.
#[no_mangle]
pub unsafe extern "C" fn ap_color_camera_t_opengl_camera(out: *mut f64) {
    if !out.is_null() {
        write_matrix(&crate::conventions::color_camera_t_opengl_camera(), out);
    }
}

/// Get the last error message. Returns NULL if no error.
/// The returned pointer is valid until the next arpose API call.
#[no_mangle]
pub extern "C" fn ap_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    const IDENTITY: ApRigid = ApRigid {
        translation: [0.0; 3],
        orientation: [0.0, 0.0, 0.0, 1.0],
    };

    #[test]
    fn test_compose_matches_library() {
        let pose = ApRigid {
            translation: [1.0, 2.0, 3.0],
            orientation: [0.0, 0.0, 0.0, 1.0],
        };
        let mut world = [0.0; 16];
        let mut out = [0.0; 16];
        let rc = unsafe {
            ap_opengl_world_t_start_of_service(world.as_mut_ptr());
            ap_compose_camera_transform(
                &pose,
                &IDENTITY,
                &IDENTITY,
                world.as_ptr(),
                std::ptr::null(),
                out.as_mut_ptr(),
            )
        };
        assert_eq!(rc, 0);
        // Column-major: translation lives in elements 12..15.
        assert_relative_eq!(out[12], 1.0, epsilon = 1e-12);
        assert_relative_eq!(out[13], 3.0, epsilon = 1e-12);
        assert_relative_eq!(out[14], -2.0, epsilon = 1e-12);
        assert_relative_eq!(out[15], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_compose_rejects_null() {
        let mut out = [0.0; 16];
        let rc = unsafe {
            ap_compose_camera_transform(
                std::ptr::null(),
                &IDENTITY,
                &IDENTITY,
                std::ptr::null(),
                std::ptr::null(),
                out.as_mut_ptr(),
            )
        };
        assert_eq!(rc, -1);
    }

    #[test]
    fn test_decompose_scaled() {
        let m = Matrix4::new_nonuniform_scaling(&Vector3::new(2.0, 2.0, 2.0));
        let mut out = ApDecomposed {
            translation: [9.0; 3],
            rotation: [9.0; 4],
            scale: [9.0; 3],
        };
        let rc = unsafe { ap_decompose_matrix(m.as_slice().as_ptr(), &mut out) };
        assert_eq!(rc, 0);
        assert_eq!(out.scale, [2.0, 2.0, 2.0]);
        assert_eq!(out.translation, [0.0, 0.0, 0.0]);
        assert_relative_eq!(out.rotation[3].abs(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_projection_rejects_empty_image_plane() {
        let intrinsics = CameraIntrinsics {
            width: 0,
            height: 720,
            fx: 1042.0,
            fy: 1042.0,
            cx: 637.0,
            cy: 357.0,
            distortion: [0.0; 5],
        };
        let mut out = [7.0; 16];
        let rc = unsafe { ap_projection_from_intrinsics(&intrinsics, 0.1, 100.0, out.as_mut_ptr()) };
        assert_eq!(rc, -1);
        assert_eq!(out, [7.0; 16]);
        assert!(!ap_last_error().is_null());
    }

    #[test]
    fn test_invert_singular_sets_error() {
        let zeros = [0.0; 16];
        let mut out = [0.0; 16];
        let rc = unsafe { ap_invert_matrix(zeros.as_ptr(), out.as_mut_ptr()) };
        assert_eq!(rc, -1);
        assert!(!ap_last_error().is_null());
    }
}
