use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion, Vector3};
use std::fmt;

/// Named reference frames reported by the pose service.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinateFrame {
    /// Origin where motion tracking started.
    StartOfService = 0,
    /// Origin of the loaded persisted map.
    AreaDescription = 1,
    Device = 2,
    Imu = 3,
    CameraColor = 4,
}

/// A (base, target) frame pair: a pose of `target` expressed in `base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramePair {
    pub base: CoordinateFrame,
    pub target: CoordinateFrame,
}

impl FramePair {
    pub const fn new(base: CoordinateFrame, target: CoordinateFrame) -> Self {
        Self { base, target }
    }

    /// Device pose relative to the map if localized, else to start of service.
    pub const fn device(is_localized: bool) -> Self {
        let base = if is_localized {
            CoordinateFrame::AreaDescription
        } else {
            CoordinateFrame::StartOfService
        };
        Self::new(base, CoordinateFrame::Device)
    }

    /// Pair whose pose becomes valid only once localized against a map.
    pub const fn localization_check() -> Self {
        Self::new(CoordinateFrame::AreaDescription, CoordinateFrame::StartOfService)
    }
}

impl fmt::Display for FramePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}->{:?}", self.base, self.target)
    }
}

/// Status code attached to every pose the service reports.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoseStatus {
    Initializing = 0,
    Valid = 1,
    Invalid = 2,
    Unknown = 3,
}

/// Camera selector for intrinsics and texture queries.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraId {
    Color = 0,
    Fisheye = 1,
    Depth = 2,
}

/// Raw pose answer from the service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseData {
    pub status: PoseStatus,
    /// Seconds on the service clock.
    pub timestamp: f64,
    pub frame: FramePair,
    /// Translation in meters [x, y, z].
    pub translation: [f64; 3],
    /// Hamilton quaternion [qx, qy, qz, qw], the service's wire order.
    pub orientation: [f64; 4],
}

impl PoseData {
    pub fn is_valid(&self) -> bool {
        self.status == PoseStatus::Valid
    }
}

/// Convert a service quaternion [x, y, z, w] into a rotation.
///
/// The fourth component is the scalar part; nalgebra takes it first.
pub fn quaternion_from_xyzw(q: [f64; 4]) -> UnitQuaternion<f64> {
    UnitQuaternion::from_quaternion(Quaternion::new(q[3], q[0], q[1], q[2]))
}

/// Inverse of [`quaternion_from_xyzw`].
pub fn quaternion_to_xyzw(q: &UnitQuaternion<f64>) -> [f64; 4] {
    [q.i, q.j, q.k, q.w]
}

/// A sampled device pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub timestamp: f64,
    pub frame: FramePair,
    pub translation: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
}

impl Pose {
    pub fn isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.translation), self.rotation)
    }
}

impl From<&PoseData> for Pose {
    fn from(data: &PoseData) -> Self {
        let [x, y, z] = data.translation;
        Pose {
            timestamp: data.timestamp,
            frame: data.frame,
            translation: Vector3::new(x, y, z),
            rotation: quaternion_from_xyzw(data.orientation),
        }
    }
}

/// Fixed color-camera calibration.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    /// Image plane width in pixels.
    pub width: u32,
    /// Image plane height in pixels.
    pub height: u32,
    pub fx: f64,
    pub fy: f64,
    /// Principal point.
    pub cx: f64,
    pub cy: f64,
    pub distortion: [f64; 5],
}

/// Diagnostic event pushed by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEvent {
    pub key: String,
    pub value: String,
}

impl fmt::Display for ServiceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.value)
    }
}
