//! The wire packet catalog (spec §3, §6).
//!
//! Both directions are split into a control union (reliable channel) and a
//! stream union (datagram channel), matching spec §4.1/§9 ("Packet
//! unions... two top-level tagged unions each"). Variant declaration order
//! is the wire discriminant order and is frozen: new variants are appended
//! at the end, never inserted, so existing deployments stay
//! interoperable (spec §9 open question on discriminant order).

use alvr_common::{ids::DeviceId, Fov, MotionData, MotionFlags};
use alvr_session::{HeadsetInfo, Settings, VideoCodec};
use serde::{Deserialize, Serialize};

pub const CONTROL_PORT: u16 = 9757;
pub const STREAM_PORT: u16 = 9757;
pub const PROTOCOL_VERSION: u32 = 1;

pub type FrameIndex = u64;
pub type StreamItemIdx = u8;

// ---------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToHeadsetHandshake {
    pub version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FromHeadsetHandshake {
    pub version: u32,
}

// ---------------------------------------------------------------------
// Video stream description (host -> headset, control)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStreamItem {
    pub width: u16,
    pub height: u16,
    pub offset_x: u16,
    pub offset_y: u16,
    pub codec: VideoCodec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoveationTable {
    pub x: Vec<u16>,
    pub y: Vec<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStreamDescription {
    pub width: u16,
    pub height: u16,
    pub fps: f32,
    pub items: Vec<VideoStreamItem>,
    pub foveation: [FoveationTable; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioStreamDescription {
    pub sample_rate: u32,
    pub channels: u8,
}

// ---------------------------------------------------------------------
// Tracking control (host -> headset, control) — spec §4.5
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrackingControlSample {
    pub device: DeviceId,
    pub prediction_ns: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackingControl {
    pub pattern: Vec<TrackingControlSample>,
    pub motions_to_photons: i64,
}

// ---------------------------------------------------------------------
// Application / session bookkeeping (thin: out of the algorithmic core,
// but still part of the stable wire catalog per spec §6)
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationInfo {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationIcon {
    pub id: String,
    pub png_bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Connecting,
    Streaming,
    Stopping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinRequest {
    pub pin: String,
}

// ---------------------------------------------------------------------
// Host -> Headset: control channel union
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ToHeadsetControlPacket {
    Handshake(ToHeadsetHandshake),
    VideoStreamDescription(VideoStreamDescription),
    AudioStreamDescription(AudioStreamDescription),
    TrackingControl(TrackingControl),
    RefreshRateChange { fps: f32 },
    ApplicationList(Vec<ApplicationInfo>),
    ApplicationIcon(ApplicationIcon),
    RunningApplications(Vec<String>),
    SessionStateChanged(SessionState),
    PinRequest(PinRequest),
}

// ---------------------------------------------------------------------
// Host -> Headset: stream channel union — spec §4.2, §3
// ---------------------------------------------------------------------

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct ShardFlags: u8 {
        const START_OF_SLICE = 1;
        const END_OF_SLICE   = 1 << 1;
        const END_OF_FRAME   = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ViewInfo {
    /// headset-clock nanoseconds
    pub display_time: u64,
    pub pose: [MotionData; 2],
    pub fov: [Fov; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStreamDataShard {
    pub stream_item_idx: StreamItemIdx,
    pub frame_idx: FrameIndex,
    pub shard_idx: u16,
    pub flags: ShardFlags,
    pub payload: Vec<u8>,
    pub view_info: Option<ViewInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStreamParityShard {
    pub stream_item_idx: StreamItemIdx,
    pub frame_idx: FrameIndex,
    pub data_shard_count: u16,
    pub num_parity_elements: u8,
    pub parity_element: u8,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Haptics {
    pub device_id: DeviceId,
    pub duration_ns: u64,
    pub frequency: f32,
    pub amplitude: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimesyncQuery {
    /// host-monotonic nanoseconds at send time
    pub t_query: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioData {
    pub timestamp: u64,
    pub payload: Vec<i16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ToHeadsetStreamPacket {
    VideoStreamDataShard(VideoStreamDataShard),
    VideoStreamParityShard(VideoStreamParityShard),
    Haptics(Haptics),
    TimesyncQuery(TimesyncQuery),
    AudioData(AudioData),
}

// ---------------------------------------------------------------------
// Headset -> Host: control channel union
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Battery {
    pub device_id: DeviceId,
    pub gauge_value: f32,
    pub is_plugged: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Feedback {
    pub frame_index: FrameIndex,
    pub stream_index: StreamItemIdx,

    pub received_first_packet: u64,
    pub received_last_packet: u64,
    pub reconstructed: u64,
    pub sent_to_decoder: u64,
    pub received_from_decoder: u64,
    pub blitted: u64,
    pub displayed: u64,

    pub data_packets: u8,
    pub parity_packets: u8,
    pub received_data_packets: u8,
    pub received_parity_packets: u8,

    pub received_pose: [MotionData; 2],
    pub real_pose: [MotionData; 2],
}

impl Feedback {
    /// Per spec §4.6/§4.7: a feedback report is only useful to the idr
    /// handler/pacer once the frame actually reached the decoder.
    pub fn was_sent_to_decoder(&self) -> bool {
        self.sent_to_decoder != 0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VisibilityMaskChanged {
    pub view_index: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HidInputReport {
    pub device_id: DeviceId,
    pub value: f32,
    pub last_change_time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FromHeadsetControlPacket {
    Handshake(FromHeadsetHandshake),
    HeadsetInfoPacket(HeadsetInfo),
    Feedback(Feedback),
    Battery(Battery),
    VisibilityMaskChanged(VisibilityMaskChanged),
    UserPresenceChanged { present: bool },
    RefreshRateChanged { fps: f32 },
    GetApplicationList,
    StartApp { id: String },
    StopApplication,
    SettingsChanged(Settings),
    HidInput(HidInputReport),
}

// ---------------------------------------------------------------------
// Headset -> Host: stream channel union — spec §3, §6
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrackingView {
    /// Relative to the view reference space.
    pub pose: MotionData,
    pub fov: Fov,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DevicePose {
    pub device: DeviceId,
    pub pose: MotionData,
    pub flags: MotionFlags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tracking {
    /// headset-clock nanoseconds
    pub timestamp: u64,
    pub production_timestamp: u64,
    pub view_state_flags: u8,
    pub views: [TrackingView; 2],
    pub device_poses: Vec<DevicePose>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JointPose {
    pub pose: MotionData,
    pub radius: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandTracking {
    pub timestamp: u64,
    pub production_timestamp: u64,
    pub is_left: bool,
    pub joints: Vec<JointPose>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyTracking {
    pub timestamp: u64,
    pub production_timestamp: u64,
    pub joints: Vec<JointPose>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FaceExpressionVariant {
    FbV2(Vec<f32>),
    Htc(Vec<f32>),
    Android(Vec<f32>),
    Pico(Vec<f32>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceExpression {
    pub timestamp: u64,
    pub production_timestamp: u64,
    pub expression: FaceExpressionVariant,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EyeGaze {
    pub timestamp: u64,
    pub production_timestamp: u64,
    pub pose: MotionData,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InputValue {
    pub device_id: DeviceId,
    pub value: f32,
    pub last_change_time: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inputs {
    pub values: Vec<InputValue>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimesyncResponse {
    /// echoes the query's `t_query`
    pub query: i64,
    /// headset-monotonic nanoseconds at receipt
    pub t_headset: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DerivedPose {
    pub device: DeviceId,
    pub pose: MotionData,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OverrideFoveationCenter {
    pub view_index: u8,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FromHeadsetStreamPacket {
    Tracking(Tracking),
    HandTracking(HandTracking),
    BodyTracking(BodyTracking),
    FaceExpression(FaceExpression),
    EyeGaze(EyeGaze),
    Inputs(Inputs),
    TimesyncResponse(TimesyncResponse),
    AudioData(AudioData),
    DerivedPose(DerivedPose),
    OverrideFoveationCenter(OverrideFoveationCenter),
    SessionStateChanged(SessionState),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};
    use alvr_common::glam;

    #[test]
    fn control_packet_roundtrip() {
        let packet = ToHeadsetControlPacket::RefreshRateChange { fps: 90.0 };
        let bytes = encode(&packet).unwrap();
        let decoded: ToHeadsetControlPacket = decode(&bytes).unwrap();
        assert!(matches!(
            decoded,
            ToHeadsetControlPacket::RefreshRateChange { fps } if fps == 90.0
        ));
    }

    #[test]
    fn feedback_roundtrip_with_poses() {
        let mut feedback = Feedback {
            frame_index: 42,
            ..Default::default()
        };
        feedback.received_pose[0].position = glam::Vec3::new(1.0, 2.0, 3.0);
        let packet = FromHeadsetControlPacket::Feedback(feedback.clone());
        let bytes = encode(&packet).unwrap();
        let decoded: FromHeadsetControlPacket = decode(&bytes).unwrap();
        let FromHeadsetControlPacket::Feedback(decoded_feedback) = decoded else {
            panic!("wrong variant");
        };
        assert_eq!(decoded_feedback.frame_index, 42);
        assert_eq!(
            decoded_feedback.received_pose[0].position,
            feedback.received_pose[0].position
        );
    }

    #[test]
    fn shard_flags_roundtrip() {
        let shard = VideoStreamDataShard {
            stream_item_idx: 1,
            frame_idx: 7,
            shard_idx: 3,
            flags: ShardFlags::END_OF_SLICE | ShardFlags::END_OF_FRAME,
            payload: vec![1, 2, 3],
            view_info: None,
        };
        let packet = ToHeadsetStreamPacket::VideoStreamDataShard(shard);
        let bytes = encode(&packet).unwrap();
        let decoded: ToHeadsetStreamPacket = decode(&bytes).unwrap();
        let ToHeadsetStreamPacket::VideoStreamDataShard(decoded_shard) = decoded else {
            panic!("wrong variant");
        };
        assert!(decoded_shard.flags.contains(ShardFlags::END_OF_FRAME));
        assert_eq!(decoded_shard.payload, vec![1, 2, 3]);
    }
}
