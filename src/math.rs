use crate::types::{quaternion_from_xyzw, CameraIntrinsics};
use nalgebra::{Matrix3, Matrix4, Rotation3, Translation3, UnitQuaternion, Vector3};

/// Near-plane scale applied to the first-person frustum.
pub const FOV_SCALER: f64 = 0.1;

/// Far clipping distance of the first-person frustum, in meters.
pub const CAMERA_VIEW_MAX_DIST: f64 = 100.0;

/// Result of [`decompose_matrix`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decomposed {
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
    /// Per-axis scale. `x` carries the sign of the determinant.
    pub scale: Vector3<f64>,
}

impl Decomposed {
    /// Rebuild `translate * rotate * scale`.
    pub fn to_matrix(&self) -> Matrix4<f64> {
        Translation3::from(self.translation).to_homogeneous()
            * self.rotation.to_homogeneous()
            * Matrix4::new_nonuniform_scaling(&self.scale)
    }
}

/// Homogeneous `translate * rotate` from a service translation and [x, y, z, w] quaternion.
pub fn pose_matrix(translation: [f64; 3], orientation_xyzw: [f64; 4]) -> Matrix4<f64> {
    let [x, y, z] = translation;
    Translation3::new(x, y, z).to_homogeneous()
        * quaternion_from_xyzw(orientation_xyzw).to_homogeneous()
}

/// Split an affine 4x4 transform into translation, rotation and scale.
///
/// Scale is the length of each basis column; a negative determinant is
/// attributed to the x axis. The rotation comes from the basis with that
/// scale divided out, so non-uniform scale does not leak into it. A sheared
/// basis yields the closest rotation.
pub fn decompose_matrix(m: &Matrix4<f64>) -> Decomposed {
    let basis: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();

    let mut scale = Vector3::new(
        basis.column(0).norm(),
        basis.column(1).norm(),
        basis.column(2).norm(),
    );
    if m.determinant() < 0.0 {
        scale.x = -scale.x;
    }

    let translation = Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]);

    let unscaled = Matrix3::from_columns(&[
        basis.column(0) / scale.x,
        basis.column(1) / scale.y,
        basis.column(2) / scale.z,
    ]);
    // Closed-form guess, then refined to the nearest rotation when the basis is sheared.
    let guess = UnitQuaternion::new_normalize(
        UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(unscaled))
            .into_inner(),
    );
    let rotation = UnitQuaternion::from_matrix_eps(&unscaled, f64::EPSILON, 100, guess);

    Decomposed {
        translation,
        rotation,
        scale,
    }
}

/// OpenGL-style off-center perspective frustum.
pub fn frustum(left: f64, right: f64, bottom: f64, top: f64, near: f64, far: f64) -> Matrix4<f64> {
    let mut m = Matrix4::zeros();
    m[(0, 0)] = 2.0 * near / (right - left);
    m[(1, 1)] = 2.0 * near / (top - bottom);
    m[(0, 2)] = (right + left) / (right - left);
    m[(1, 2)] = (top + bottom) / (top - bottom);
    m[(2, 2)] = -(far + near) / (far - near);
    m[(3, 2)] = -1.0;
    m[(2, 3)] = -2.0 * far * near / (far - near);
    m
}

/// First-person projection matching the color camera's field of view.
///
/// The image plane sits at `2 fx / width` for a half-width of one, so the
/// horizontal extent is `[-s, s]` and the vertical `[-s h/w, s h/w]` with
/// `s = near_scale`.
pub fn projection_from_intrinsics(
    intrinsics: &CameraIntrinsics,
    near_scale: f64,
    far: f64,
) -> Matrix4<f64> {
    let width = intrinsics.width as f64;
    let height = intrinsics.height as f64;
    let image_plane_ratio = height / width;
    let image_plane_distance = 2.0 * intrinsics.fx / width;
    frustum(
        -near_scale,
        near_scale,
        -image_plane_ratio * near_scale,
        image_plane_ratio * near_scale,
        image_plane_distance * near_scale,
        far,
    )
}
