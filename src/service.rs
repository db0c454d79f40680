//! The pose-service interface consumed by the pipeline.
//!
//! An SDK binding implements [`PoseService`]; [`crate::sim::ScriptedService`]
//! is an in-process implementation for tests and demos.

use crate::types::{CameraId, CameraIntrinsics, FramePair, PoseData, ServiceEvent};
use crate::Result;

/// Invoked on a service-owned thread whenever a pose for a registered pair updates.
pub type PoseCallback = Box<dyn Fn(&PoseData) + Send + Sync + 'static>;

/// Invoked on a service-owned thread for each diagnostic event.
pub type EventCallback = Box<dyn Fn(&ServiceEvent) + Send + Sync + 'static>;

// -- Configuration keys --
pub const KEY_ENABLE_COLOR_CAMERA: &str = "config_enable_color_camera";
pub const KEY_ENABLE_AUTO_RECOVERY: &str = "config_enable_auto_recovery";
pub const KEY_LOW_LATENCY_IMU: &str = "config_enable_low_latency_imu_integration";
pub const KEY_LOAD_AREA_DESCRIPTION: &str = "config_load_area_description_UUID";
pub const KEY_LIBRARY_VERSION: &str = "tango_service_library_version";

/// Timestamp meaning "most recent pose available".
pub const LATEST: f64 = 0.0;

/// A motion-tracking service.
///
/// Every call reports failure through `Err`; implementations must not panic.
pub trait PoseService {
    /// Bind to the service and check API/service version compatibility.
    fn initialize(&mut self) -> Result<()>;

    fn set_bool(&mut self, key: &str, value: bool) -> Result<()>;

    fn set_string(&mut self, key: &str, value: &str) -> Result<()>;

    fn get_string(&self, key: &str) -> Result<String>;

    /// Start motion tracking with the current configuration.
    fn connect(&mut self) -> Result<()>;

    /// Stop the service. Callbacks and configuration are reset.
    fn disconnect(&mut self);

    fn reset_motion_tracking(&mut self);

    /// Query the pose of `pair.target` in `pair.base` at `timestamp` ([`LATEST`] for now).
    fn pose_at_time(&self, timestamp: f64, pair: FramePair) -> Result<PoseData>;

    fn camera_intrinsics(&self, camera: CameraId) -> Result<CameraIntrinsics>;

    fn connect_on_pose_available(&mut self, pairs: &[FramePair], callback: PoseCallback)
        -> Result<()>;

    fn connect_on_event(&mut self, callback: EventCallback) -> Result<()>;

    /// Attach a render texture that receives the live camera feed.
    fn connect_texture(&mut self, camera: CameraId, texture_id: u32) -> Result<()>;

    /// Latch the newest camera frame into the texture and return its timestamp.
    fn update_texture(&mut self, camera: CameraId) -> Result<f64>;

    /// Comma-separated UUIDs of persisted maps.
    fn area_description_uuids(&self) -> Result<String>;
}

/// Pick the active map from a comma-separated UUID list: the last non-empty entry.
pub fn select_area_description(uuid_list: &str) -> Option<&str> {
    uuid_list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .last()
}
