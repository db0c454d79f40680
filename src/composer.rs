use crate::math;
use crate::service::{PoseService, LATEST};
use crate::types::{CameraId, CameraIntrinsics, CoordinateFrame, FramePair, Pose};
use crate::{PoseError, Result};
use nalgebra::{Isometry3, Matrix4};

/// Fixed sensor calibration, fetched once per session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extrinsics {
    /// Device frame expressed in the IMU frame.
    pub imu_t_device: Isometry3<f64>,
    /// Color camera frame expressed in the IMU frame.
    pub imu_t_color_camera: Isometry3<f64>,
}

impl Extrinsics {
    /// Color camera expressed in the device frame.
    pub fn device_t_color_camera(&self) -> Matrix4<f64> {
        (self.imu_t_device.inverse() * self.imu_t_color_camera).to_homogeneous()
    }
}

/// Query both extrinsics. Either failure is fatal.
pub fn fetch_extrinsics<S: PoseService + ?Sized>(service: &S) -> Result<Extrinsics> {
    let device_pair = FramePair::new(CoordinateFrame::Imu, CoordinateFrame::Device);
    let camera_pair = FramePair::new(CoordinateFrame::Imu, CoordinateFrame::CameraColor);

    let imu_t_device = fetch_rigid(service, device_pair)?;
    let imu_t_color_camera = fetch_rigid(service, camera_pair)?;

    log::info!(
        "Extrinsics: imu->device t={:?}, imu->color t={:?}",
        imu_t_device.translation.vector.as_slice(),
        imu_t_color_camera.translation.vector.as_slice(),
    );

    Ok(Extrinsics {
        imu_t_device,
        imu_t_color_camera,
    })
}

fn fetch_rigid<S: PoseService + ?Sized>(service: &S, pair: FramePair) -> Result<Isometry3<f64>> {
    match service.pose_at_time(LATEST, pair) {
        Ok(data) => Ok(Pose::from(&data).isometry()),
        Err(e) => {
            log::error!("Extrinsics query {} failed: {}", pair, e);
            Err(PoseError::ExtrinsicsUnavailable { pair })
        }
    }
}

/// Query the color camera calibration. A zero-sized image plane is rejected.
pub fn fetch_intrinsics<S: PoseService + ?Sized>(service: &S) -> Result<CameraIntrinsics> {
    let intrinsics = service.camera_intrinsics(CameraId::Color).map_err(|e| {
        log::error!("Color camera intrinsics query failed: {}", e);
        PoseError::IntrinsicsUnavailable(CameraId::Color)
    })?;
    if intrinsics.width == 0 || intrinsics.height == 0 {
        log::error!(
            "Color camera intrinsics report a {}x{} image plane",
            intrinsics.width,
            intrinsics.height
        );
        return Err(PoseError::IntrinsicsUnavailable(CameraId::Color));
    }
    log::info!(
        "Intrinsics: {}x{} fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
        intrinsics.width,
        intrinsics.height,
        intrinsics.fx,
        intrinsics.fy,
        intrinsics.cx,
        intrinsics.cy,
    );
    Ok(intrinsics)
}

/// Render camera expressed in the render world.
///
/// `world_correction * device_pose * inverse(imu_t_device) * imu_t_color_camera * camera_correction`
pub fn compose_camera_transform(
    pose: &Pose,
    extrinsics: &Extrinsics,
    world_correction: &Matrix4<f64>,
    camera_correction: &Matrix4<f64>,
) -> Matrix4<f64> {
    let base_t_device = math::pose_matrix(
        [pose.translation.x, pose.translation.y, pose.translation.z],
        crate::types::quaternion_to_xyzw(&pose.rotation),
    );
    world_correction
        * base_t_device
        * extrinsics.imu_t_device.inverse().to_homogeneous()
        * extrinsics.imu_t_color_camera.to_homogeneous()
        * camera_correction
}

/// Per-frame composition with the corrections fixed and the last result retained.
#[derive(Debug, Clone)]
pub struct TransformComposer {
    world_correction: Matrix4<f64>,
    camera_correction: Matrix4<f64>,
    world_t_camera: Matrix4<f64>,
    composed: bool,
}

impl TransformComposer {
    pub fn new(world_correction: Matrix4<f64>, camera_correction: Matrix4<f64>) -> Self {
        Self {
            world_correction,
            camera_correction,
            world_t_camera: Matrix4::identity(),
            composed: false,
        }
    }

    /// Recompose from `pose`, or keep the previous transform when no pose is available.
    ///
    /// Returns whether the transform changed.
    pub fn update(&mut self, pose: Option<&Pose>, extrinsics: &Extrinsics) -> bool {
        match pose {
            Some(pose) => {
                self.world_t_camera = compose_camera_transform(
                    pose,
                    extrinsics,
                    &self.world_correction,
                    &self.camera_correction,
                );
                self.composed = true;
                true
            }
            None => false,
        }
    }

    /// Render camera in render world. Identity until the first pose arrives.
    pub fn world_t_camera(&self) -> &Matrix4<f64> {
        &self.world_t_camera
    }

    /// View matrix: the inverse of [`Self::world_t_camera`].
    pub fn view_matrix(&self) -> Result<Matrix4<f64>> {
        self.world_t_camera.try_inverse().ok_or(PoseError::Singular)
    }

    pub fn has_composed(&self) -> bool {
        self.composed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conventions;
    use crate::sim::ScriptedService;
    use crate::types::{PoseData, PoseStatus};
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion, Vector3};

    fn extrinsics() -> Extrinsics {
        Extrinsics {
            imu_t_device: Isometry3::from_parts(
                Translation3::new(0.01, -0.02, 0.0),
                UnitQuaternion::from_euler_angles(0.0, 0.0, 0.1),
            ),
            imu_t_color_camera: Isometry3::from_parts(
                Translation3::new(0.05, 0.0, 0.004),
                UnitQuaternion::from_euler_angles(0.02, -0.01, 1.57),
            ),
        }
    }

    fn device_pose() -> Pose {
        Pose {
            timestamp: 3.0,
            frame: FramePair::device(false),
            translation: Vector3::new(1.0, 2.0, 3.0),
            rotation: UnitQuaternion::from_euler_angles(0.4, 0.1, -0.7),
        }
    }

    fn raw(pair: FramePair, translation: [f64; 3], orientation: [f64; 4]) -> PoseData {
        PoseData {
            status: PoseStatus::Valid,
            timestamp: 0.0,
            frame: pair,
            translation,
            orientation,
        }
    }

    #[test]
    fn test_identity_corrections_reduce_chain() {
        let pose = device_pose();
        let ext = extrinsics();
        let composed =
            compose_camera_transform(&pose, &ext, &Matrix4::identity(), &Matrix4::identity());
        let expected = pose.isometry().to_homogeneous()
            * ext.imu_t_device.inverse().to_homogeneous()
            * ext.imu_t_color_camera.to_homogeneous();
        assert_relative_eq!(composed, expected, epsilon = 1e-12);
        assert_relative_eq!(
            composed,
            pose.isometry().to_homogeneous() * ext.device_t_color_camera(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_corrections_wrap_chain() {
        let pose = device_pose();
        let ext = extrinsics();
        let world = conventions::opengl_world_t_start_of_service();
        let camera = conventions::color_camera_t_opengl_camera();
        let bare = compose_camera_transform(&pose, &ext, &Matrix4::identity(), &Matrix4::identity());
        let composed = compose_camera_transform(&pose, &ext, &world, &camera);
        assert_relative_eq!(composed, world * bare * camera, epsilon = 1e-12);
    }

    #[test]
    fn test_identity_extrinsics_gives_pose_matrix() {
        let pose = Pose {
            rotation: UnitQuaternion::identity(),
            ..device_pose()
        };
        let ext = Extrinsics {
            imu_t_device: Isometry3::identity(),
            imu_t_color_camera: Isometry3::identity(),
        };
        let m = compose_camera_transform(&pose, &ext, &Matrix4::identity(), &Matrix4::identity());
        assert_relative_eq!(m.column(3).xyz(), Vector3::new(1.0, 2.0, 3.0), epsilon = 1e-12);
        assert_relative_eq!(
            m.fixed_view::<3, 3>(0, 0).into_owned(),
            nalgebra::Matrix3::identity(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_composer_keeps_previous_transform() {
        let ext = extrinsics();
        let mut composer = TransformComposer::new(
            conventions::opengl_world_t_start_of_service(),
            conventions::color_camera_t_opengl_camera(),
        );
        assert!(!composer.has_composed());
        assert_eq!(*composer.world_t_camera(), Matrix4::identity());

        assert!(composer.update(Some(&device_pose()), &ext));
        let first = *composer.world_t_camera();

        assert!(!composer.update(None, &ext));
        assert_eq!(*composer.world_t_camera(), first);
        assert!(composer.has_composed());
    }

    #[test]
    fn test_view_matrix_inverts_camera() {
        let mut composer = TransformComposer::new(Matrix4::identity(), Matrix4::identity());
        composer.update(Some(&device_pose()), &extrinsics());
        let view = composer.view_matrix().unwrap();
        assert_relative_eq!(view * composer.world_t_camera(), Matrix4::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_fetch_extrinsics() {
        let mut service = ScriptedService::new();
        let device_pair = FramePair::new(CoordinateFrame::Imu, CoordinateFrame::Device);
        let camera_pair = FramePair::new(CoordinateFrame::Imu, CoordinateFrame::CameraColor);
        let h = std::f64::consts::FRAC_1_SQRT_2;
        service.script_pose(LATEST, device_pair, raw(device_pair, [0.0, 0.0, 0.0], [0.0, 0.0, h, h]));
        service.script_pose(LATEST, camera_pair, raw(camera_pair, [0.1, 0.2, 0.3], [0.0, 0.0, 0.0, 1.0]));

        let ext = fetch_extrinsics(&service).unwrap();
        assert_relative_eq!(
            ext.imu_t_device.rotation.angle(),
            std::f64::consts::FRAC_PI_2,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            ext.imu_t_color_camera.translation.vector,
            Vector3::new(0.1, 0.2, 0.3),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_fetch_extrinsics_fails_on_missing_camera() {
        let mut service = ScriptedService::new();
        let device_pair = FramePair::new(CoordinateFrame::Imu, CoordinateFrame::Device);
        service.script_pose(LATEST, device_pair, raw(device_pair, [0.0; 3], [0.0, 0.0, 0.0, 1.0]));

        match fetch_extrinsics(&service) {
            Err(PoseError::ExtrinsicsUnavailable { pair }) => {
                assert_eq!(pair.target, CoordinateFrame::CameraColor);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_fetch_intrinsics_fails_without_calibration() {
        let service = ScriptedService::new();
        assert!(matches!(
            fetch_intrinsics(&service),
            Err(PoseError::IntrinsicsUnavailable(CameraId::Color))
        ));
    }

    #[test]
    fn test_fetch_intrinsics_rejects_empty_image_plane() {
        let mut service = ScriptedService::new();
        service.script_intrinsics(
            CameraId::Color,
            CameraIntrinsics {
                width: 1280,
                height: 0,
                fx: 1042.0,
                fy: 1042.0,
                cx: 637.0,
                cy: 357.0,
                distortion: [0.0; 5],
            },
        );
        assert!(matches!(
            fetch_intrinsics(&service),
            Err(PoseError::IntrinsicsUnavailable(CameraId::Color))
        ));
    }
}
