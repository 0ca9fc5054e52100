//! Host-side session orchestrator (spec §5): owns the two channels, the
//! per-session state machines built up in this crate, and drives the
//! net/worker/encoder split the teacher's driver uses — a thread (here, a
//! tokio task) per concern rather than one monolithic poll loop.

use crate::foveation::{build_axis_table, FoveationComputer};
use crate::idr::{FrameDecision, FrameType, IdrHandler};
use crate::pacing::{FramePacer, RefreshRateChooser};
use crate::pose::{FrameViewHistory, FrameViewSample, MotionSample, PoseHistory};
use crate::tracking::TrackingController;
use alvr_common::ids::DeviceId;
use alvr_common::{ConError, ConResult};
use alvr_session::{HeadsetInfo, Settings};
use alvr_sockets::{
    ClockSynchronizer, ControlChannel, FoveationTable, FromHeadsetControlPacket,
    FromHeadsetHandshake, FromHeadsetStreamPacket, StreamChannel, ToHeadsetControlPacket,
    ToHeadsetHandshake, ViewInfo, VideoStreamDescription, VideoStreamItem, PROTOCOL_VERSION,
};
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

/// Builds the `video_stream_description` the host must send within a
/// second of handshake completing (spec §8 scenario 1), before any real
/// per-frame gaze data exists: an identity foveation table (no
/// downscaling) side by side per eye at the headset's reported
/// resolution.
fn initial_video_stream_description(headset_info: &HeadsetInfo) -> VideoStreamDescription {
    let w = headset_info.eye_resolution.width as u16;
    let h = headset_info.eye_resolution.height as u16;
    let codec = Settings::default().codec_preference;
    let identity = FoveationTable {
        x: build_axis_table(0.0, w as usize, w as usize),
        y: build_axis_table(0.0, h as usize, h as usize),
    };

    VideoStreamDescription {
        width: w.saturating_mul(2),
        height: h,
        fps: headset_info.preferred_refresh_rate,
        items: vec![
            VideoStreamItem {
                width: w,
                height: h,
                offset_x: 0,
                offset_y: 0,
                codec,
            },
            VideoStreamItem {
                width: w,
                height: h,
                offset_x: w,
                offset_y: 0,
                codec,
            },
        ],
        foveation: [identity.clone(), identity],
    }
}

/// Capability the encoder thread must provide; kept as a trait so this
/// crate never has to link a concrete codec (out of scope per spec
/// Non-goals — the wire and session logic only need *a* producer of
/// encoded bytes, not a specific one).
pub trait VideoEncoder: Send {
    fn submit(&mut self, frame_index: u64, image: &[u8], frame_type: FrameType) -> ConResult<Vec<u8>>;
}

const TIMESYNC_POLL: Duration = Duration::from_millis(500);
const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// One connected headset's session state: everything the net/worker
/// threads need, gathered so `HostSession` methods can be unit-driven
/// without spinning up real sockets.
pub struct HostSession {
    control: ControlChannel,
    stream: StreamChannel,
    clock: ClockSynchronizer,
    tracking: TrackingController,
    idr: IdrHandler,
    pacer: FramePacer,
    refresh_rate: RefreshRateChooser,
    foveation: FoveationComputer,
    pose_histories: HashMap<DeviceId, PoseHistory>,
    frame_views: FrameViewHistory,
    num_parity_elements: u8,
    headset_info: HeadsetInfo,
    min_refresh_rate: f32,
}

impl HostSession {
    /// Performs the version handshake over `control` and returns a fresh
    /// session. `period_ns` seeds the frame pacer with the headset's
    /// preferred refresh rate.
    pub async fn handshake(
        mut control: ControlChannel,
        stream: StreamChannel,
        period_ns: i64,
        num_parity_elements: u8,
    ) -> ConResult<Self> {
        control
            .send(&ToHeadsetControlPacket::Handshake(ToHeadsetHandshake {
                version: PROTOCOL_VERSION,
            }))
            .await?;

        let reply: FromHeadsetControlPacket =
            tokio::time::timeout(CONTROL_TIMEOUT, control.recv())
                .await
                .map_err(|_| ConError::HandshakeTimeout)??;

        match reply {
            FromHeadsetControlPacket::Handshake(FromHeadsetHandshake { version })
                if version == PROTOCOL_VERSION => {}
            FromHeadsetControlPacket::Handshake(FromHeadsetHandshake { version }) => {
                return Err(ConError::ProtocolVersion(format!(
                    "headset sent version {version}, host supports {PROTOCOL_VERSION}"
                )));
            }
            _ => return Err(ConError::ProtocolVersion("unexpected first packet".into())),
        }

        // spec §8 scenario 1: the headset replies with its headset_info
        // right after the handshake, and the host answers within the same
        // round trip with the initial video_stream_description.
        let info_packet: FromHeadsetControlPacket =
            tokio::time::timeout(CONTROL_TIMEOUT, control.recv())
                .await
                .map_err(|_| ConError::HandshakeTimeout)??;
        let headset_info = match info_packet {
            FromHeadsetControlPacket::HeadsetInfoPacket(info) => info,
            _ => return Err(ConError::ProtocolVersion("expected headset_info_packet".into())),
        };

        control
            .send(&ToHeadsetControlPacket::VideoStreamDescription(
                initial_video_stream_description(&headset_info),
            ))
            .await?;

        let min_refresh_rate = Settings::default().minimum_refresh_rate;

        Ok(Self {
            control,
            stream,
            clock: ClockSynchronizer::new(),
            tracking: TrackingController::new(),
            idr: IdrHandler::new(),
            pacer: FramePacer::new(period_ns),
            refresh_rate: RefreshRateChooser::new(),
            foveation: FoveationComputer::new(),
            pose_histories: HashMap::new(),
            frame_views: FrameViewHistory::new(),
            num_parity_elements,
            headset_info,
            min_refresh_rate,
        })
    }

    pub async fn connect(peer_ip: IpAddr, period_ns: i64, num_parity_elements: u8) -> ConResult<Self> {
        let control = ControlChannel::connect(peer_ip, alvr_sockets::CONTROL_PORT).await?;
        let mut stream = StreamChannel::bind(alvr_sockets::STREAM_PORT).await?;
        stream
            .connect(std::net::SocketAddr::new(peer_ip, alvr_sockets::STREAM_PORT))
            .await?;
        Self::handshake(control, stream, period_ns, num_parity_elements).await
    }

    /// Worker-thread tick: sends a timesync query and resolves the
    /// tracking-control pattern built up since the last call.
    pub async fn worker_tick(&mut self, now_headset_clock: i64, frame_duration: i64) -> ConResult<()> {
        self.stream
            .send(&alvr_sockets::ToHeadsetStreamPacket::TimesyncQuery(
                alvr_sockets::TimesyncQuery {
                    t_query: now_headset_clock,
                },
            ))
            .await?;

        let tracking_latency = self.pacer.frame_time_ns() as i64;
        let control = self.tracking.resolve(frame_duration, tracking_latency);
        self.control
            .send(&ToHeadsetControlPacket::TrackingControl(control))
            .await?;

        let advertised = self.headset_info.available_refresh_rates.clone();
        if let Some(fps) = self.choose_refresh_rate(&advertised, self.min_refresh_rate) {
            self.control
                .send(&ToHeadsetControlPacket::RefreshRateChange { fps })
                .await?;
        }
        Ok(())
    }

    /// Net-thread tick: drains whatever is ready on the stream channel and
    /// folds it into clock/pose/idr/pacer state. Returns once a poll times
    /// out with nothing available.
    pub async fn poll_stream(&mut self, receipt_time: i64) -> ConResult<()> {
        while let Some(packet) = self
            .stream
            .poll::<FromHeadsetStreamPacket>(TIMESYNC_POLL)
            .await?
        {
            self.handle_stream_packet(packet, receipt_time);
        }
        Ok(())
    }

    fn handle_stream_packet(&mut self, packet: FromHeadsetStreamPacket, receipt_time: i64) {
        match packet {
            FromHeadsetStreamPacket::TimesyncResponse(r) => {
                self.clock.record_sample(r.query, r.t_headset, receipt_time);
            }
            FromHeadsetStreamPacket::Tracking(tracking) => {
                let host_t = self.clock.current().to_headset(receipt_time);
                self.frame_views.insert(FrameViewSample {
                    timestamp: host_t,
                    views: tracking.views,
                });
                for dp in tracking.device_poses {
                    self.pose_histories
                        .entry(dp.device)
                        .or_default()
                        .insert(MotionSample {
                            timestamp: host_t,
                            motion: dp.pose,
                            flags: dp.flags,
                        });
                }
            }
            FromHeadsetStreamPacket::DerivedPose(_)
            | FromHeadsetStreamPacket::HandTracking(_)
            | FromHeadsetStreamPacket::BodyTracking(_)
            | FromHeadsetStreamPacket::FaceExpression(_)
            | FromHeadsetStreamPacket::EyeGaze(_)
            | FromHeadsetStreamPacket::Inputs(_)
            | FromHeadsetStreamPacket::AudioData(_)
            | FromHeadsetStreamPacket::OverrideFoveationCenter(_)
            | FromHeadsetStreamPacket::SessionStateChanged(_) => {}
        }
    }

    /// Net-thread tick (control side): routes feedback into the idr
    /// handler and frame pacer.
    pub async fn poll_control(&mut self) -> ConResult<Option<FromHeadsetControlPacket>> {
        match tokio::time::timeout(Duration::from_millis(1), self.control.recv()).await {
            Ok(Ok(packet)) => {
                if let FromHeadsetControlPacket::Feedback(ref feedback) = packet {
                    self.idr
                        .on_feedback(feedback.frame_index, feedback.was_sent_to_decoder());
                }
                Ok(Some(packet))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }

    /// Encoder-thread tick: asks the idr handler whether `frame_index`
    /// should be encoded at all, runs it through `encoder` if so, shards
    /// the result and sends it on the stream channel.
    pub async fn encode_and_send(
        &mut self,
        frame_index: u64,
        image: &[u8],
        view_info: ViewInfo,
        encoder: &mut dyn VideoEncoder,
    ) -> ConResult<()> {
        let decision = self.idr.next_frame(frame_index);
        let frame_type = match decision {
            FrameDecision::Skip => return Ok(()),
            FrameDecision::Encode(frame_type, _) => frame_type,
        };

        let encoded = encoder.submit(frame_index, image, frame_type)?;
        let (data_shards, parity_shards) =
            alvr_sockets::shard::encode(frame_index, 0, &encoded, view_info, self.num_parity_elements);

        for shard in data_shards {
            self.stream
                .send(&alvr_sockets::ToHeadsetStreamPacket::VideoStreamDataShard(shard))
                .await?;
        }
        for shard in parity_shards {
            self.stream
                .send(&alvr_sockets::ToHeadsetStreamPacket::VideoStreamParityShard(shard))
                .await?;
        }
        Ok(())
    }

    /// Recalls `device`'s predicted pose at `host_t`, queried at
    /// `now_host`. The first time a device is requested it can't wait for
    /// the next periodic tracking-control resolution, so this dispatches
    /// an immediate out-of-band pattern for it (spec §C.3).
    pub async fn predicted_pose(
        &mut self,
        device: DeviceId,
        now_host: i64,
        host_t: i64,
    ) -> ConResult<Option<MotionSample>> {
        if let Some(immediate) = self.tracking.add_request(device, now_host, host_t, None) {
            self.control
                .send(&ToHeadsetControlPacket::TrackingControl(immediate))
                .await?;
        }
        Ok(self.pose_histories.get(&device).map(|h| h.get_at(host_t)))
    }

    /// The recorded `view_info` nearest to `host_t`, recalled to compare
    /// against a frame's `Feedback.real_pose` once it arrives.
    pub fn frame_view_at(&self, host_t: i64) -> Option<FrameViewSample> {
        self.frame_views.nearest(host_t)
    }

    pub fn choose_refresh_rate(&mut self, advertised: &[f32], min_refresh: f32) -> Option<f32> {
        let frame_time = self.pacer.frame_time_ns();
        self.refresh_rate.choose(advertised, min_refresh, frame_time)
    }

    pub fn foveation(&mut self) -> &mut FoveationComputer {
        &mut self.foveation
    }

    pub fn pacer(&mut self) -> &mut FramePacer {
        &mut self.pacer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alvr_common::glam::{Quat, Vec3};
    use alvr_common::MotionData;
    use alvr_sockets::{CONTROL_PORT, STREAM_PORT};
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    struct StubEncoder;
    impl VideoEncoder for StubEncoder {
        fn submit(&mut self, _frame_index: u64, image: &[u8], _frame_type: FrameType) -> ConResult<Vec<u8>> {
            Ok(image.to_vec())
        }
    }

    fn loopback() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    fn stub_headset_info() -> HeadsetInfo {
        HeadsetInfo {
            eye_resolution: alvr_session::EyeResolution {
                width: 1024,
                height: 1024,
            },
            available_refresh_rates: vec![72.0, 90.0, 120.0],
            preferred_refresh_rate: 90.0,
            microphone_sample_rate: 48_000,
            microphone_channels: 1,
            hand_tracking: false,
            eye_gaze: false,
            face_tracking: alvr_session::FaceTrackingCapability::None,
            palm_pose: false,
            generic_tracker_count: 0,
            locale: "en".into(),
        }
    }

    async fn connected_pair() -> (HostSession, ControlChannel, StreamChannel) {
        let listener = alvr_sockets::transport::tcp::bind(CONTROL_PORT).await.unwrap();

        let client_stream = StreamChannel::bind(0).await.unwrap();
        let client_port = client_stream.local_port().unwrap();

        let host_task = tokio::spawn(async move {
            let control = ControlChannel::accept(&listener, loopback()).await.unwrap();
            let mut stream = StreamChannel::bind(STREAM_PORT).await.unwrap();
            stream
                .connect(SocketAddr::new(loopback(), client_port))
                .await
                .unwrap();
            HostSession::handshake(control, stream, 11_111_111, 2)
                .await
                .unwrap()
        });

        let mut client_control = ControlChannel::connect(loopback(), CONTROL_PORT).await.unwrap();
        let handshake: ToHeadsetControlPacket = client_control.recv().await.unwrap();
        assert!(matches!(handshake, ToHeadsetControlPacket::Handshake(_)));
        client_control
            .send(&FromHeadsetControlPacket::Handshake(FromHeadsetHandshake {
                version: PROTOCOL_VERSION,
            }))
            .await
            .unwrap();
        client_control
            .send(&FromHeadsetControlPacket::HeadsetInfoPacket(
                stub_headset_info(),
            ))
            .await
            .unwrap();
        let description: ToHeadsetControlPacket = client_control.recv().await.unwrap();
        assert!(matches!(
            description,
            ToHeadsetControlPacket::VideoStreamDescription(_)
        ));

        let host = host_task.await.unwrap();
        (host, client_control, client_stream)
    }

    #[tokio::test]
    async fn handshake_establishes_a_session() {
        let (_host, _control, _stream) = connected_pair().await;
    }

    #[tokio::test]
    async fn worker_tick_sends_refresh_rate_change_when_load_drops() {
        let (mut host, mut control, _stream) = connected_pair().await;

        // converge the pacer's EWMA to a ~10ms frame time (spec §4.6's
        // sustained-load reaction), the same way pacing.rs's own tests do.
        let period_ns = 11_111_111i64;
        let mu_cpu = 4_000_000.0;
        let mu_gpu = 10_000_000.0;
        let mut now = 0i64;
        for _ in 0..500 {
            let prediction = host.pacer().predict(now);
            let delivered = prediction.wake_up + mu_cpu as i64;
            host.pacer().mark_delivered(prediction.frame_id, delivered);
            host.pacer()
                .mark_gpu_done(prediction.frame_id, delivered + mu_gpu as i64);
            now += period_ns;
        }

        host.worker_tick(now, period_ns).await.unwrap();

        let tracking: ToHeadsetControlPacket = control.recv().await.unwrap();
        assert!(matches!(tracking, ToHeadsetControlPacket::TrackingControl(_)));

        let packet: ToHeadsetControlPacket = control.recv().await.unwrap();
        match packet {
            ToHeadsetControlPacket::RefreshRateChange { fps } => assert_eq!(fps, 90.0),
            other => panic!("expected a RefreshRateChange, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn predicted_pose_dispatches_immediate_tracking_control_on_first_sight() {
        let (mut host, mut control, _stream) = connected_pair().await;

        let result = host
            .predicted_pose(DeviceId::Head, 0, 11_000_000)
            .await
            .unwrap();
        assert!(result.is_none()); // no pose ever recorded for this device yet

        let packet: ToHeadsetControlPacket = control.recv().await.unwrap();
        match packet {
            ToHeadsetControlPacket::TrackingControl(tracking) => {
                assert_eq!(tracking.pattern.len(), 1);
                assert_eq!(tracking.pattern[0].device, DeviceId::Head);
                assert_eq!(tracking.pattern[0].prediction_ns, 11_000_000);
            }
            other => panic!("expected an immediate TrackingControl, got {other:?}"),
        }

        // a second request for the same device doesn't dispatch again.
        host.predicted_pose(DeviceId::Head, 1_000_000, 12_000_000)
            .await
            .unwrap();
        let drained =
            tokio::time::timeout(Duration::from_millis(50), control.recv::<ToHeadsetControlPacket>())
                .await;
        assert!(drained.is_err(), "no second immediate dispatch expected");
    }

    #[tokio::test]
    async fn tracking_packet_feeds_the_frame_view_history() {
        let (mut host, _control, _stream) = connected_pair().await;

        let view = alvr_sockets::TrackingView {
            pose: MotionData {
                orientation: Quat::IDENTITY,
                position: Vec3::new(1.0, 0.0, 0.0),
                linear_velocity: Vec3::ZERO,
                angular_velocity: Vec3::ZERO,
            },
            fov: alvr_common::Fov {
                angle_left: -1.0,
                angle_right: 1.0,
                angle_up: 1.0,
                angle_down: -1.0,
            },
        };
        let tracking = alvr_sockets::Tracking {
            timestamp: 0,
            production_timestamp: 0,
            view_state_flags: 0,
            views: [view; 2],
            device_poses: Vec::new(),
        };

        host.handle_stream_packet(FromHeadsetStreamPacket::Tracking(tracking), 0);

        let recalled = host.frame_view_at(0).expect("frame view should be recorded");
        assert_eq!(recalled.views[0].pose.position.x, 1.0);
    }

    #[tokio::test]
    async fn encode_and_send_delivers_shards_client_can_reassemble() {
        let (mut host, _control, mut client_stream) = connected_pair().await;
        client_stream.connect(SocketAddr::new(loopback(), STREAM_PORT)).await.unwrap();

        let view_info = ViewInfo {
            display_time: 1,
            pose: [MotionData {
                orientation: Quat::IDENTITY,
                position: Vec3::ZERO,
                linear_velocity: Vec3::ZERO,
                angular_velocity: Vec3::ZERO,
            }; 2],
            fov: [alvr_common::Fov {
                angle_left: -1.0,
                angle_right: 1.0,
                angle_up: 1.0,
                angle_down: -1.0,
            }; 2],
        };

        let payload = vec![7u8; 5000];
        host.encode_and_send(0, &payload, view_info, &mut StubEncoder)
            .await
            .unwrap();

        let mut assembler = alvr_sockets::shard::ShardAssembler::new();
        let mut reassembled = None;
        for _ in 0..8 {
            match client_stream
                .poll::<alvr_sockets::ToHeadsetStreamPacket>(Duration::from_millis(200))
                .await
                .unwrap()
            {
                Some(alvr_sockets::ToHeadsetStreamPacket::VideoStreamDataShard(shard)) => {
                    let (frame, _) = assembler.ingest_data(shard);
                    if let Some(frame) = frame {
                        reassembled = Some(frame);
                        break;
                    }
                }
                Some(alvr_sockets::ToHeadsetStreamPacket::VideoStreamParityShard(shard)) => {
                    assembler.ingest_parity(shard);
                }
                _ => {}
            }
        }

        let frame = reassembled.expect("frame should reassemble");
        assert_eq!(frame.bytes, payload);
    }
}
