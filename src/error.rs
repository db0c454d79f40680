use crate::types::{CameraId, FramePair};
use std::fmt;

/// Errors reported by the pose service or the transform pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PoseError {
    #[error("Pose service version mismatch")]
    ServiceVersionMismatch,

    #[error("Pose service internal error: {0}")]
    ServiceInternal(String),

    #[error("Configuration option rejected: {key}")]
    ConfigRejected { key: String },

    #[error("Failed to connect to pose service: {0}")]
    ConnectFailed(String),

    #[error("Pose query failed for {pair} at t={timestamp}")]
    QueryFailed { pair: FramePair, timestamp: f64 },

    #[error("Extrinsics unavailable for {pair}")]
    ExtrinsicsUnavailable { pair: FramePair },

    #[error("Intrinsics unavailable for {0:?} camera")]
    IntrinsicsUnavailable(CameraId),

    #[error("Texture update failed for {0:?} camera")]
    TextureUpdateFailed(CameraId),

    #[error("Callback registration failed: {0}")]
    CallbackRejected(String),

    #[error("Matrix is not invertible")]
    Singular,
}

/// Thread-safe last-error storage for the C FFI layer.
pub(crate) struct LastError {
    message: std::sync::Mutex<String>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: std::sync::Mutex::new(String::new()),
        }
    }

    pub fn set(&self, err: &PoseError) {
        if let Ok(mut msg) = self.message.lock() {
            *msg = fmt::format(format_args!("{}\0", err));
        }
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        match self.message.lock() {
            Ok(msg) if !msg.is_empty() => msg.as_ptr() as *const std::ffi::c_char,
            _ => std::ptr::null(),
        }
    }
}
