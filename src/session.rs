//! Session lifecycle and the per-frame update.

use crate::composer::{fetch_extrinsics, fetch_intrinsics, Extrinsics, TransformComposer};
use crate::config::{AreaDescription, SessionConfig};
use crate::conventions;
use crate::math::{self, Decomposed, CAMERA_VIEW_MAX_DIST, FOV_SCALER};
use crate::sampler::{sample_latest_pose, EventFeed, LocalizationFlag};
use crate::service::{
    select_area_description, PoseService, KEY_LIBRARY_VERSION, KEY_LOAD_AREA_DESCRIPTION, LATEST,
};
use crate::types::{CameraId, CameraIntrinsics, FramePair, Pose, PoseData, ServiceEvent};
use crate::Result;
use nalgebra::Matrix4;

/// Everything the renderer needs for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTransforms {
    /// Render camera in render world.
    pub world_t_camera: Matrix4<f64>,
    /// Inverse of `world_t_camera`.
    pub view: Matrix4<f64>,
    pub projection: Matrix4<f64>,
    /// `world_t_camera` split into position, orientation and scale.
    pub camera: Decomposed,
    /// Pose sampled this frame; `None` means the transforms are from an earlier frame.
    pub pose: Option<Pose>,
}

/// Counters over the frames run by a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames: u64,
    /// Frames that reused the previous transform.
    pub stale: u64,
    pub texture_failures: u64,
}

/// A connected pose-service session.
///
/// Owns the service, the calibration snapshot and the last composed
/// transform. Callbacks reach it only through the localization flag and the
/// event feed.
pub struct Session<S: PoseService> {
    service: S,
    connected: bool,
    texture_connected: bool,
    library_version: Option<String>,
    active_map: Option<String>,
    extrinsics: Extrinsics,
    intrinsics: CameraIntrinsics,
    projection: Matrix4<f64>,
    localization: LocalizationFlag,
    events: EventFeed,
    composer: TransformComposer,
    view: Matrix4<f64>,
    frame_timestamp: f64,
    stats: FrameStats,
}

impl<S: PoseService> Session<S> {
    /// Initialize, configure and connect the service, then fetch calibration.
    ///
    /// Any failure here is fatal: the session cannot produce a calibrated view.
    pub fn start(mut service: S, config: &SessionConfig) -> Result<Session<S>> {
        service.initialize().map_err(|e| {
            log::error!("Pose service initialize failed: {}", e);
            e
        })?;

        config.apply_flags(&mut service)?;

        let library_version = match service.get_string(KEY_LIBRARY_VERSION) {
            Ok(version) => {
                log::info!("Pose service library version: {}", version);
                Some(version)
            }
            Err(e) => {
                log::warn!("Could not read service library version: {}", e);
                None
            }
        };

        let localization = LocalizationFlag::new();
        let writer = localization.clone();
        service.connect_on_pose_available(
            &[FramePair::localization_check()],
            Box::new(move |pose: &PoseData| writer.on_pose_available(pose)),
        )?;

        let (sink, events) = EventFeed::channel();
        service.connect_on_event(Box::new(move |event: &ServiceEvent| sink.on_event(event)))?;

        let active_map = load_area_description(&mut service, &config.area_description)?;

        service.connect()?;
        log::info!("Pose service connected");

        let texture_connected = match config.texture_id {
            Some(texture_id) => match service.connect_texture(CameraId::Color, texture_id) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("Failed to connect texture {}: {}", texture_id, e);
                    false
                }
            },
            None => false,
        };
        if !texture_connected {
            log::info!("No camera texture bound, sampling the latest pose only");
        }

        let calibration = fetch_extrinsics(&service)
            .and_then(|extrinsics| Ok((extrinsics, fetch_intrinsics(&service)?)));
        let (extrinsics, intrinsics) = match calibration {
            Ok(calibration) => calibration,
            Err(e) => {
                service.disconnect();
                return Err(e);
            }
        };

        let projection =
            math::projection_from_intrinsics(&intrinsics, FOV_SCALER, CAMERA_VIEW_MAX_DIST);

        Ok(Session {
            service,
            connected: true,
            texture_connected,
            library_version,
            active_map,
            extrinsics,
            intrinsics,
            projection,
            localization,
            events,
            composer: TransformComposer::new(
                conventions::opengl_world_t_start_of_service(),
                conventions::color_camera_t_opengl_camera(),
            ),
            view: Matrix4::identity(),
            frame_timestamp: LATEST,
            stats: FrameStats::default(),
        })
    }

    /// Like [`Session::start`], but logs the failure and returns `None` so the
    /// caller can keep running without AR.
    pub fn start_degraded(service: S, config: &SessionConfig) -> Option<Session<S>> {
        match Session::start(service, config) {
            Ok(session) => Some(session),
            Err(e) => {
                log::error!("Pose session unavailable, running without AR: {}", e);
                None
            }
        }
    }

    /// Run one frame: latch the camera texture, sample the pose, recompose.
    ///
    /// Without a bound texture the frame timestamp stays at [`LATEST`].
    pub fn frame(&mut self) -> FrameTransforms {
        self.events.poll();
        self.stats.frames += 1;

        if self.texture_connected {
            match self.service.update_texture(CameraId::Color) {
                Ok(timestamp) => self.frame_timestamp = timestamp,
                Err(e) => {
                    self.stats.texture_failures += 1;
                    log::warn!("{} (reusing t={:.6})", e, self.frame_timestamp);
                }
            }
        }

        let pose = sample_latest_pose(
            &self.service,
            self.localization.is_localized(),
            self.frame_timestamp,
        );

        if self.composer.update(pose.as_ref(), &self.extrinsics) {
            match self.composer.view_matrix() {
                Ok(view) => self.view = view,
                Err(e) => log::warn!("Keeping previous view matrix: {}", e),
            }
        } else {
            self.stats.stale += 1;
        }

        let world_t_camera = *self.composer.world_t_camera();
        FrameTransforms {
            world_t_camera,
            view: self.view,
            projection: self.projection,
            camera: math::decompose_matrix(&world_t_camera),
            pose,
        }
    }

    pub fn reset_motion_tracking(&mut self) {
        log::info!("Resetting motion tracking");
        self.service.reset_motion_tracking();
    }

    pub fn is_localized(&self) -> bool {
        self.localization.is_localized()
    }

    /// Latest diagnostic event as `"key: value"`.
    pub fn last_event(&self) -> Option<&str> {
        self.events.latest()
    }

    pub fn extrinsics(&self) -> &Extrinsics {
        &self.extrinsics
    }

    pub fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    pub fn projection(&self) -> &Matrix4<f64> {
        &self.projection
    }

    pub fn active_map(&self) -> Option<&str> {
        self.active_map.as_deref()
    }

    pub fn library_version(&self) -> Option<&str> {
        self.library_version.as_deref()
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn service_mut(&mut self) -> &mut S {
        &mut self.service
    }

    /// Disconnect from the service.
    pub fn disconnect(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.connected {
            self.service.disconnect();
            self.connected = false;
            log::info!("Pose service disconnected after {} frames", self.stats.frames);
        }
    }
}

impl<S: PoseService> Drop for Session<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Configure the persisted map to load. Returns the UUID in use, if any.
fn load_area_description<S: PoseService + ?Sized>(
    service: &mut S,
    area: &AreaDescription,
) -> Result<Option<String>> {
    let uuid = match area {
        AreaDescription::None => return Ok(None),
        AreaDescription::Uuid(uuid) => uuid.clone(),
        AreaDescription::Latest => {
            let list = match service.area_description_uuids() {
                Ok(list) => list,
                Err(e) => {
                    log::warn!("Area description list unavailable: {}", e);
                    return Ok(None);
                }
            };
            match select_area_description(&list) {
                Some(uuid) => uuid.to_string(),
                None => {
                    log::warn!("No area description available, tracking without a map");
                    return Ok(None);
                }
            }
        }
    };

    service.set_string(KEY_LOAD_AREA_DESCRIPTION, &uuid)?;
    log::info!("Loading area description {}", uuid);
    Ok(Some(uuid))
}
