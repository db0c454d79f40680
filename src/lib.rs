//! # arpose - pose pipeline for AR video overlay
//!
//! Turns a motion-tracking service's output into render-ready camera
//! matrices:
//! - Per-frame device pose sampling with localization tracking
//! - One-time extrinsics/intrinsics fetch and first-person projection
//! - Render camera composition and 4x4 transform decomposition
//! - C FFI over the transform math for C/C++ render hosts
//!
//! ## Quick Start
//! ```no_run
//! use arpose::{PoseService, Session, SessionConfig};
//!
//! fn run<S: PoseService>(service: S) {
//!     let Some(mut session) = Session::start_degraded(service, &SessionConfig::from_env()) else {
//!         return;
//!     };
//!     for _ in 0..100 {
//!         let frame = session.frame();
//!         println!("camera at {:?}", frame.camera.translation);
//!     }
//! }
//! ```

pub mod error;
pub mod types;
pub mod service;
pub mod config;
pub mod math;
pub mod conventions;
pub mod sampler;
pub mod composer;
pub mod session;
pub mod sim;
pub mod ffi;

pub use error::PoseError;
pub use types::*;
pub use service::PoseService;
pub use config::{AreaDescription, ConfigFlags, SessionConfig};
pub use composer::{compose_camera_transform, Extrinsics, TransformComposer};
pub use math::{decompose_matrix, Decomposed};
pub use sampler::sample_latest_pose;
pub use session::{FrameTransforms, Session};

/// Result type alias for arpose operations.
pub type Result<T> = std::result::Result<T, PoseError>;
