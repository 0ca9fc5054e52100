//! Negotiated and persisted configuration types (spec §3, §6).
//!
//! `Settings` is the snapshot negotiated at handshake and re-sent whole on
//! `settings_changed`; `PersistedConfig` is what actually lives in the JSON
//! file under the user config directory. Both derive `SettingsSchema` so
//! their shape stays introspectable the way the rest of the `alvr_session`
//! crate expects, even though the GUI that would read it is out of scope.

use serde::{Deserialize, Serialize};
use settings_schema::SettingsSchema;

pub use alvr_common::Fov;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SettingsSchema)]
pub enum VideoCodec {
    H264,
    H265,
    Av1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SettingsSchema)]
pub enum FaceTrackingCapability {
    None,
    FbV2,
    Htc,
    Android,
    Pico,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SettingsSchema)]
pub enum LinuxAudioBackend {
    Alsa,
    Jack,
    Pipewire,
}

/// One eye's resolution, received as part of `HeadsetInfo` at handshake.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeResolution {
    pub width: u32,
    pub height: u32,
}

/// Sent once by the headset right after the handshake completes (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadsetInfo {
    pub eye_resolution: EyeResolution,
    pub available_refresh_rates: Vec<f32>,
    pub preferred_refresh_rate: f32,
    pub microphone_sample_rate: u32,
    pub microphone_channels: u8,
    pub hand_tracking: bool,
    pub eye_gaze: bool,
    pub face_tracking: FaceTrackingCapability,
    pub palm_pose: bool,
    pub generic_tracker_count: u8,
    pub locale: String,
}

/// Negotiated settings snapshot (spec §6), sent at handshake and whenever it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SettingsSchema)]
pub struct Settings {
    pub bitrate_bps: u64,
    pub minimum_refresh_rate: f32,
    pub preferred_refresh_rate: f32,
    pub codec_preference: VideoCodec,
    pub foveation_override: Option<f32>,
    pub hid_forwarding: bool,
    pub hand_tracking_enabled: bool,
    pub body_tracking_enabled: bool,
    pub eye_tracking_enabled: bool,
    pub face_tracking_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bitrate_bps: 50_000_000,
            minimum_refresh_rate: 60.0,
            preferred_refresh_rate: 90.0,
            codec_preference: VideoCodec::H264,
            foveation_override: None,
            hid_forwarding: true,
            hand_tracking_enabled: true,
            body_tracking_enabled: false,
            eye_tracking_enabled: true,
            face_tracking_enabled: false,
        }
    }
}

/// One entry of the `known_servers` persisted list (spec §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownServer {
    pub cookie: String,
    pub name: String,
    pub hostname: String,
    pub port: u16,
    pub tcp_only: bool,
    pub autoconnect: bool,
    pub manual: bool,
}

/// The full JSON configuration file described in spec §6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedConfig {
    pub known_servers: Vec<KnownServer>,
    pub minimum_refresh_rate: f32,
    pub resolution_scale: f32,
    pub passthrough_enabled: bool,
    pub mic_unprocessed_audio: bool,
    pub codec_preference: VideoCodec,
    pub bitrate_override_bps: Option<u64>,
    pub first_run: bool,
    pub locale: String,
}

impl Default for PersistedConfig {
    fn default() -> Self {
        Self {
            known_servers: Vec::new(),
            minimum_refresh_rate: 60.0,
            resolution_scale: 1.0,
            passthrough_enabled: false,
            mic_unprocessed_audio: false,
            codec_preference: VideoCodec::H264,
            bitrate_override_bps: None,
            first_run: true,
            locale: "en_US".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_roundtrip_json() {
        let settings = Settings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let decoded: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(settings, decoded);
    }

    #[test]
    fn schema_is_introspectable_independent_of_serde_names() {
        use settings_schema::SchemaNode;
        let SchemaNode::Section(fields) = Settings::schema() else {
            panic!("expected section");
        };
        // the schema tree renames to camelCase; serde field names (used on
        // the wire) are untouched snake_case.
        assert!(fields.iter().any(|(name, _)| name == "bitrateBps"));
        let json = serde_json::to_string(&Settings::default()).unwrap();
        assert!(json.contains("\"bitrate_bps\""));
    }
}
