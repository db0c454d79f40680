use crate::service::{
    PoseService, KEY_ENABLE_AUTO_RECOVERY, KEY_ENABLE_COLOR_CAMERA, KEY_LOW_LATENCY_IMU,
};
use crate::Result;

bitflags::bitflags! {
    /// Boolean service options applied at session start.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ConfigFlags: u32 {
        const COLOR_CAMERA    = 1 << 0;
        const AUTO_RECOVERY   = 1 << 1;
        const LOW_LATENCY_IMU = 1 << 2;
    }
}

impl ConfigFlags {
    /// Service configuration key for each flag.
    pub const KEYS: [(ConfigFlags, &'static str); 3] = [
        (ConfigFlags::COLOR_CAMERA, KEY_ENABLE_COLOR_CAMERA),
        (ConfigFlags::AUTO_RECOVERY, KEY_ENABLE_AUTO_RECOVERY),
        (ConfigFlags::LOW_LATENCY_IMU, KEY_LOW_LATENCY_IMU),
    ];
}

/// Which persisted map to load at session start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AreaDescription {
    /// Track without a map; localization never becomes valid.
    None,
    /// Load the last entry of the service's map list.
    Latest,
    Uuid(String),
}

/// Session options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub flags: ConfigFlags,
    pub area_description: AreaDescription,
    /// Render texture receiving the color camera feed, if any.
    pub texture_id: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            flags: ConfigFlags::all(),
            area_description: AreaDescription::Latest,
            texture_id: None,
        }
    }
}

impl SessionConfig {
    /// Defaults overridden by environment variables:
    /// - `ARPOSE_COLOR_CAMERA`, `ARPOSE_AUTO_RECOVERY`, `ARPOSE_LOW_LATENCY_IMU`
    /// - `ARPOSE_LOAD_LATEST_MAP` (ignored when `ARPOSE_AREA_UUID` is set)
    /// - `ARPOSE_AREA_UUID`
    /// - `ARPOSE_TEXTURE_ID`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut flags = defaults.flags;
        flags.set(
            ConfigFlags::COLOR_CAMERA,
            read_env_bool("ARPOSE_COLOR_CAMERA", true),
        );
        flags.set(
            ConfigFlags::AUTO_RECOVERY,
            read_env_bool("ARPOSE_AUTO_RECOVERY", true),
        );
        flags.set(
            ConfigFlags::LOW_LATENCY_IMU,
            read_env_bool("ARPOSE_LOW_LATENCY_IMU", true),
        );

        let area_description = match read_env_string("ARPOSE_AREA_UUID") {
            Some(uuid) => AreaDescription::Uuid(uuid),
            None if read_env_bool("ARPOSE_LOAD_LATEST_MAP", true) => AreaDescription::Latest,
            None => AreaDescription::None,
        };

        let texture_id = std::env::var("ARPOSE_TEXTURE_ID")
            .ok()
            .and_then(|v| v.trim().parse::<u32>().ok());

        let config = Self {
            flags,
            area_description,
            texture_id,
        };
        log::info!(
            "Session config: flags={:?} area={:?} texture={:?}",
            config.flags,
            config.area_description,
            config.texture_id,
        );
        config
    }

    /// Push the boolean options to the service.
    pub fn apply_flags<S: PoseService + ?Sized>(&self, service: &mut S) -> Result<()> {
        for (flag, key) in ConfigFlags::KEYS {
            let value = self.flags.contains(flag);
            service.set_bool(key, value).map_err(|e| {
                log::error!("{}={} rejected: {}", key, value, e);
                e
            })?;
        }
        Ok(())
    }
}

fn read_env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| parse_bool(&v))
        .unwrap_or(default)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    let v = value.trim().to_ascii_lowercase();
    match v.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
