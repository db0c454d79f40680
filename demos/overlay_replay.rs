//! Replay a scripted walk through a session and print the render camera per frame.
//!
//! Usage: cargo run --example overlay_replay
//! Set RUST_LOG=debug to see sampler fallbacks and service events.

use arpose::service::LATEST;
use arpose::sim::ScriptedService;
use arpose::{
    CameraId, CameraIntrinsics, CoordinateFrame, FramePair, PoseData, PoseStatus, Session,
    SessionConfig,
};
use std::f64::consts::TAU;

const FRAMES: usize = 120;
const FRAME_PERIOD_S: f64 = 1.0 / 30.0;
const WALK_RADIUS_M: f64 = 1.5;

fn valid(pair: FramePair, timestamp: f64, translation: [f64; 3], orientation: [f64; 4]) -> PoseData {
    PoseData {
        status: PoseStatus::Valid,
        timestamp,
        frame: pair,
        translation,
        orientation,
    }
}

fn calibrated_service() -> ScriptedService {
    let mut service = ScriptedService::new();

    let imu_device = FramePair::new(CoordinateFrame::Imu, CoordinateFrame::Device);
    service.script_pose(
        LATEST,
        imu_device,
        valid(imu_device, 0.0, [0.0, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0]),
    );
    let imu_camera = FramePair::new(CoordinateFrame::Imu, CoordinateFrame::CameraColor);
    service.script_pose(
        LATEST,
        imu_camera,
        valid(imu_camera, 0.0, [0.061, 0.004, -0.001], [0.0, 0.0, 0.0, 1.0]),
    );
    service.script_intrinsics(
        CameraId::Color,
        CameraIntrinsics {
            width: 1280,
            height: 720,
            fx: 1042.0,
            fy: 1042.0,
            cx: 637.0,
            cy: 357.0,
            distortion: [0.228, -0.686, 0.0, 0.0, 0.673],
        },
    );
    service.script_area_descriptions(Some("7d8b1c2e-office,9a3f5e10-lab"));
    service
}

fn main() {
    env_logger::init();

    let config = SessionConfig {
        texture_id: Some(1),
        ..SessionConfig::from_env()
    };

    let mut session = match Session::start(calibrated_service(), &config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to start session: {}", e);
            std::process::exit(1);
        }
    };

    println!("Map:        {:?}", session.active_map());
    println!("Intrinsics: {:?}", session.intrinsics());
    println!();

    let callbacks = session.service().callback_handle();
    let pairs = [FramePair::device(false), FramePair::device(true)];

    for i in 0..FRAMES {
        let t = (i + 1) as f64 * FRAME_PERIOD_S;
        let angle = TAU * i as f64 / FRAMES as f64;
        let (s, c) = (angle / 2.0).sin_cos();
        let position = [WALK_RADIUS_M * angle.cos(), WALK_RADIUS_M * angle.sin(), 0.0];
        // Yaw about the service's up axis.
        let orientation = [0.0, 0.0, s, c];

        let service = session.service_mut();
        service.script_frame_timestamp(Some(t));
        for pair in pairs {
            // Every tenth frame the service cannot serve the frame timestamp yet.
            if i % 10 != 9 {
                service.script_pose(t, pair, valid(pair, t, position, orientation));
            }
            service.script_pose(LATEST, pair, valid(pair, t, position, orientation));
        }

        if i == FRAMES / 2 {
            let handle = callbacks.clone();
            std::thread::spawn(move || {
                handle.emit_event("TooFewFeaturesTracked", "false");
                handle.emit_pose(&valid(
                    FramePair::localization_check(),
                    t,
                    [0.0; 3],
                    [0.0, 0.0, 0.0, 1.0],
                ));
            })
            .join()
            .ok();
        }

        let frame = session.frame();
        if i % 10 == 0 {
            let p = frame.camera.translation;
            let q = frame.camera.rotation;
            println!(
                "t={:.3}  cam=[{:+.3}, {:+.3}, {:+.3}]  quat=[{:+.3}, {:+.3}, {:+.3}, {:+.3}]  fresh={}",
                t,
                p.x, p.y, p.z,
                q.i, q.j, q.k, q.w,
                frame.pose.is_some(),
            );
        }
    }

    let stats = session.stats();
    println!();
    println!(
        "{} frames, {} stale, localized={}, last event={:?}",
        stats.frames,
        stats.stale,
        session.is_localized(),
        session.last_event(),
    );
    session.disconnect();
}
