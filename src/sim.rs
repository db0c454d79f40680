//! In-process scripted pose service.
//!
//! Answers are scripted per (timestamp, frame pair). Callbacks registered by
//! the session can be fired from any thread through a [`CallbackHandle`],
//! the way a real service delivers them on its own threads.

use crate::service::{
    EventCallback, PoseCallback, PoseService, KEY_LIBRARY_VERSION,
};
use crate::types::{CameraId, CameraIntrinsics, FramePair, PoseData, ServiceEvent};
use crate::{PoseError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Bool(bool),
    Text(String),
}

#[derive(Default)]
struct Callbacks {
    pose: Vec<(Vec<FramePair>, PoseCallback)>,
    event: Vec<EventCallback>,
}

/// Fires registered callbacks, from any thread.
#[derive(Clone, Default)]
pub struct CallbackHandle {
    callbacks: Arc<Mutex<Callbacks>>,
}

impl CallbackHandle {
    /// Deliver `pose` to every callback registered for its frame pair.
    pub fn emit_pose(&self, pose: &PoseData) {
        if let Ok(callbacks) = self.callbacks.lock() {
            for (pairs, callback) in &callbacks.pose {
                if pairs.contains(&pose.frame) {
                    callback(pose);
                }
            }
        }
    }

    pub fn emit_event(&self, key: &str, value: &str) {
        let event = ServiceEvent {
            key: key.to_string(),
            value: value.to_string(),
        };
        if let Ok(callbacks) = self.callbacks.lock() {
            for callback in &callbacks.event {
                callback(&event);
            }
        }
    }

    fn clear(&self) {
        if let Ok(mut callbacks) = self.callbacks.lock() {
            callbacks.pose.clear();
            callbacks.event.clear();
        }
    }
}

/// A [`PoseService`] driven entirely by scripted answers.
pub struct ScriptedService {
    version_ok: bool,
    initialized: bool,
    connected: bool,
    connect_error: Option<String>,
    config: HashMap<String, ConfigValue>,
    rejected_keys: HashSet<String>,
    poses: HashMap<(u64, FramePair), PoseData>,
    query_counts: Mutex<HashMap<FramePair, usize>>,
    intrinsics: HashMap<u32, CameraIntrinsics>,
    intrinsics_queries: Mutex<usize>,
    frame_timestamp: Option<f64>,
    texture: Option<(CameraId, u32)>,
    uuid_list: Option<String>,
    resets: usize,
    callbacks: CallbackHandle,
}

impl Default for ScriptedService {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedService {
    pub fn new() -> Self {
        let mut config = HashMap::new();
        config.insert(
            KEY_LIBRARY_VERSION.to_string(),
            ConfigValue::Text("scripted-1.0".to_string()),
        );
        Self {
            version_ok: true,
            initialized: false,
            connected: false,
            connect_error: None,
            config,
            rejected_keys: HashSet::new(),
            poses: HashMap::new(),
            query_counts: Mutex::new(HashMap::new()),
            intrinsics: HashMap::new(),
            intrinsics_queries: Mutex::new(0),
            frame_timestamp: Some(0.0),
            texture: None,
            uuid_list: Some(String::new()),
            resets: 0,
            callbacks: CallbackHandle::default(),
        }
    }

    // -- Scripting --

    pub fn script_pose(&mut self, timestamp: f64, pair: FramePair, pose: PoseData) {
        self.poses.insert((timestamp.to_bits(), pair), pose);
    }

    pub fn clear_pose(&mut self, timestamp: f64, pair: FramePair) {
        self.poses.remove(&(timestamp.to_bits(), pair));
    }

    pub fn script_intrinsics(&mut self, camera: CameraId, intrinsics: CameraIntrinsics) {
        self.intrinsics.insert(camera as u32, intrinsics);
    }

    /// Timestamp returned by the next `update_texture`; `None` makes it fail.
    pub fn script_frame_timestamp(&mut self, timestamp: Option<f64>) {
        self.frame_timestamp = timestamp;
    }

    /// Comma-separated map list; `None` makes the enumeration fail.
    pub fn script_area_descriptions(&mut self, uuid_list: Option<&str>) {
        self.uuid_list = uuid_list.map(str::to_string);
    }

    pub fn reject_key(&mut self, key: &str) {
        self.rejected_keys.insert(key.to_string());
    }

    pub fn set_version_mismatch(&mut self) {
        self.version_ok = false;
    }

    pub fn script_connect_error(&mut self, message: &str) {
        self.connect_error = Some(message.to_string());
    }

    // -- Inspection --

    pub fn callback_handle(&self) -> CallbackHandle {
        self.callbacks.clone()
    }

    pub fn config_value(&self, key: &str) -> Option<&ConfigValue> {
        self.config.get(key)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn connected_texture(&self) -> Option<(CameraId, u32)> {
        self.texture
    }

    pub fn query_count(&self, pair: FramePair) -> usize {
        self.query_counts
            .lock()
            .map(|counts| counts.get(&pair).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn intrinsics_query_count(&self) -> usize {
        self.intrinsics_queries.lock().map(|n| *n).unwrap_or(0)
    }

    pub fn reset_count(&self) -> usize {
        self.resets
    }

    fn check_key(&self, key: &str) -> Result<()> {
        if self.rejected_keys.contains(key) {
            return Err(PoseError::ConfigRejected {
                key: key.to_string(),
            });
        }
        Ok(())
    }
}

impl PoseService for ScriptedService {
    fn initialize(&mut self) -> Result<()> {
        if !self.version_ok {
            return Err(PoseError::ServiceVersionMismatch);
        }
        self.initialized = true;
        Ok(())
    }

    fn set_bool(&mut self, key: &str, value: bool) -> Result<()> {
        self.check_key(key)?;
        self.config.insert(key.to_string(), ConfigValue::Bool(value));
        Ok(())
    }

    fn set_string(&mut self, key: &str, value: &str) -> Result<()> {
        self.check_key(key)?;
        self.config
            .insert(key.to_string(), ConfigValue::Text(value.to_string()));
        Ok(())
    }

    fn get_string(&self, key: &str) -> Result<String> {
        match self.config.get(key) {
            Some(ConfigValue::Text(s)) => Ok(s.clone()),
            _ => Err(PoseError::ConfigRejected {
                key: key.to_string(),
            }),
        }
    }

    fn connect(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(PoseError::ConnectFailed("service not initialized".into()));
        }
        if let Some(message) = &self.connect_error {
            return Err(PoseError::ConnectFailed(message.clone()));
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
        self.texture = None;
        self.callbacks.clear();
        self.config
            .retain(|key, _| key.as_str() == KEY_LIBRARY_VERSION);
    }

    fn reset_motion_tracking(&mut self) {
        self.resets += 1;
    }

    fn pose_at_time(&self, timestamp: f64, pair: FramePair) -> Result<PoseData> {
        if let Ok(mut counts) = self.query_counts.lock() {
            *counts.entry(pair).or_insert(0) += 1;
        }
        self.poses
            .get(&(timestamp.to_bits(), pair))
            .copied()
            .ok_or(PoseError::QueryFailed { pair, timestamp })
    }

    fn camera_intrinsics(&self, camera: CameraId) -> Result<CameraIntrinsics> {
        if let Ok(mut n) = self.intrinsics_queries.lock() {
            *n += 1;
        }
        self.intrinsics
            .get(&(camera as u32))
            .copied()
            .ok_or(PoseError::IntrinsicsUnavailable(camera))
    }

    fn connect_on_pose_available(
        &mut self,
        pairs: &[FramePair],
        callback: PoseCallback,
    ) -> Result<()> {
        let mut callbacks = self
            .callbacks
            .callbacks
            .lock()
            .map_err(|_| PoseError::CallbackRejected("callback table poisoned".into()))?;
        callbacks.pose.push((pairs.to_vec(), callback));
        Ok(())
    }

    fn connect_on_event(&mut self, callback: EventCallback) -> Result<()> {
        let mut callbacks = self
            .callbacks
            .callbacks
            .lock()
            .map_err(|_| PoseError::CallbackRejected("callback table poisoned".into()))?;
        callbacks.event.push(callback);
        Ok(())
    }

    fn connect_texture(&mut self, camera: CameraId, texture_id: u32) -> Result<()> {
        self.texture = Some((camera, texture_id));
        Ok(())
    }

    fn update_texture(&mut self, camera: CameraId) -> Result<f64> {
        match (self.texture, self.frame_timestamp) {
            (Some((bound, _)), Some(timestamp)) if bound == camera => Ok(timestamp),
            _ => Err(PoseError::TextureUpdateFailed(camera)),
        }
    }

    fn area_description_uuids(&self) -> Result<String> {
        self.uuid_list
            .clone()
            .ok_or_else(|| PoseError::ServiceInternal("area description list unavailable".into()))
    }
}
