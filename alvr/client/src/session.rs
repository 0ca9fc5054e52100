//! Headset-side session orchestrator (spec §5/§A): accepts the dual
//! channels, reassembles video shards, and produces the feedback/tracking
//! stream the host's pacer/idr/clock-sync logic consumes.

use crate::scheduler::DeviceSampler;
use alvr_common::{ConError, ConResult};
use alvr_session::HeadsetInfo;
use alvr_sockets::shard::{EvictedFrame, ReassembledFrame, ShardAssembler};
use alvr_sockets::{
    ControlChannel, Feedback, FromHeadsetControlPacket, FromHeadsetHandshake,
    FromHeadsetStreamPacket, StreamChannel, TimesyncResponse, ToHeadsetControlPacket,
    ToHeadsetHandshake, ToHeadsetStreamPacket, VideoStreamDescription, PROTOCOL_VERSION,
};
use std::net::IpAddr;
use std::time::Duration;

const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

const STREAM_POLL: Duration = Duration::from_millis(500);

/// Per-frame receipt bookkeeping that seeds the [`Feedback`] report sent
/// back once a frame reassembles (spec §3's feedback timestamp fields).
#[derive(Default, Clone, Copy)]
struct FrameReceipt {
    received_first_packet: u64,
    received_last_packet: u64,
}

pub struct ClientSession {
    control: ControlChannel,
    stream: StreamChannel,
    assembler: ShardAssembler,
    sampler: DeviceSampler,
    receipts: std::collections::HashMap<u64, FrameReceipt>,
    video_stream: Option<VideoStreamDescription>,
}

impl ClientSession {
    pub async fn accept(peer_ip: IpAddr, headset_info: HeadsetInfo) -> ConResult<Self> {
        let listener = alvr_sockets::transport::tcp::bind(alvr_sockets::CONTROL_PORT).await?;
        let mut control = ControlChannel::accept(&listener, peer_ip).await?;

        let handshake: ToHeadsetControlPacket = control.recv().await?;
        match handshake {
            ToHeadsetControlPacket::Handshake(ToHeadsetHandshake { version })
                if version == PROTOCOL_VERSION => {}
            ToHeadsetControlPacket::Handshake(ToHeadsetHandshake { version }) => {
                return Err(ConError::ProtocolVersion(format!(
                    "host sent version {version}, headset supports {PROTOCOL_VERSION}"
                )));
            }
            _ => return Err(ConError::ProtocolVersion("unexpected first packet".into())),
        }
        control
            .send(&FromHeadsetControlPacket::Handshake(FromHeadsetHandshake {
                version: PROTOCOL_VERSION,
            }))
            .await?;

        // spec §8 scenario 1: reply with headset_info right away and wait
        // for the host's initial video_stream_description.
        control
            .send(&FromHeadsetControlPacket::HeadsetInfoPacket(headset_info))
            .await?;
        let description: ToHeadsetControlPacket =
            tokio::time::timeout(CONTROL_TIMEOUT, control.recv())
                .await
                .map_err(|_| ConError::HandshakeTimeout)??;
        let video_stream = match description {
            ToHeadsetControlPacket::VideoStreamDescription(desc) => Some(desc),
            _ => return Err(ConError::ProtocolVersion("expected video_stream_description".into())),
        };

        let mut stream = StreamChannel::bind(alvr_sockets::STREAM_PORT).await?;
        stream
            .connect(std::net::SocketAddr::new(
                peer_ip,
                alvr_sockets::STREAM_PORT,
            ))
            .await?;

        Ok(Self {
            control,
            stream,
            assembler: ShardAssembler::new(),
            sampler: DeviceSampler::new(),
            receipts: std::collections::HashMap::new(),
            video_stream,
        })
    }

    pub fn video_stream(&self) -> Option<&VideoStreamDescription> {
        self.video_stream.as_ref()
    }

    pub async fn send_tracking(&mut self, tracking: alvr_sockets::Tracking) -> ConResult<()> {
        self.stream
            .send(&FromHeadsetStreamPacket::Tracking(tracking))
            .await
    }

    pub fn due_samples(&self, frame_start: i64) -> Vec<(alvr_common::ids::DeviceId, i64)> {
        self.sampler.due_samples(frame_start)
    }

    /// Drains whatever is ready on the control channel, applying a new
    /// tracking-control pattern if one arrives. Returns the other control
    /// packets for the caller to handle.
    pub async fn poll_control(&mut self) -> ConResult<Option<ToHeadsetControlPacket>> {
        match tokio::time::timeout(Duration::from_millis(1), self.control.recv()).await {
            Ok(Ok(ToHeadsetControlPacket::TrackingControl(control))) => {
                self.sampler.apply(&control);
                Ok(None)
            }
            Ok(Ok(packet)) => Ok(Some(packet)),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }

    /// Drains the stream channel once, reassembling video shards and
    /// answering timesync queries immediately (spec §4.3: the query must
    /// be echoed with minimal added latency). Returns any frame that
    /// became ready, and any frame that was evicted unreconstructed
    /// (caller should request a keyframe in response).
    pub async fn poll_stream(
        &mut self,
        receipt_time: u64,
    ) -> ConResult<(Option<ReassembledFrame>, Option<EvictedFrame>)> {
        let Some(packet) = self.stream.poll::<ToHeadsetStreamPacket>(STREAM_POLL).await? else {
            return Ok((None, None));
        };

        match packet {
            ToHeadsetStreamPacket::TimesyncQuery(query) => {
                self.stream
                    .send(&FromHeadsetStreamPacket::TimesyncResponse(TimesyncResponse {
                        query: query.t_query,
                        t_headset: receipt_time as i64,
                    }))
                    .await?;
                Ok((None, None))
            }
            ToHeadsetStreamPacket::VideoStreamDataShard(shard) => {
                let frame_idx = shard.frame_idx;
                self.note_receipt(frame_idx, receipt_time);
                let (ready, evicted) = self.assembler.ingest_data(shard);
                if let Some(frame) = &ready {
                    self.send_feedback(frame, receipt_time).await?;
                }
                Ok((ready, evicted))
            }
            ToHeadsetStreamPacket::VideoStreamParityShard(shard) => {
                let frame_idx = shard.frame_idx;
                self.note_receipt(frame_idx, receipt_time);
                let (ready, evicted) = self.assembler.ingest_parity(shard);
                if let Some(frame) = &ready {
                    self.send_feedback(frame, receipt_time).await?;
                }
                Ok((ready, evicted))
            }
            ToHeadsetStreamPacket::Haptics(_) | ToHeadsetStreamPacket::AudioData(_) => {
                Ok((None, None))
            }
        }
    }

    fn note_receipt(&mut self, frame_idx: u64, receipt_time: u64) {
        let entry = self.receipts.entry(frame_idx).or_insert(FrameReceipt {
            received_first_packet: receipt_time,
            received_last_packet: receipt_time,
        });
        entry.received_last_packet = receipt_time;
    }

    /// Reports what actually arrived for `frame` (spec §3/§4.7): shard
    /// counts straight from the assembler, and `sent_to_decoder` set to a
    /// real timestamp the moment the frame reassembles — `decode` itself
    /// is out of scope, but the host's idr handler reads
    /// `was_sent_to_decoder()` to know whether a P-frame actually reached
    /// this far, and a frame that reassembled here did. `received_pose` is
    /// the pose the host attached to this frame's `view_info`; decode/
    /// present never happening here means `received_from_decoder`,
    /// `blitted`, `displayed` and `real_pose` stay at their honest zero
    /// defaults.
    async fn send_feedback(&mut self, frame: &ReassembledFrame, reconstructed_at: u64) -> ConResult<()> {
        let receipt = self.receipts.remove(&frame.frame_idx).unwrap_or_default();
        let received_pose = frame.view_info.map(|v| v.pose).unwrap_or_default();
        self.control
            .send(&FromHeadsetControlPacket::Feedback(Feedback {
                frame_index: frame.frame_idx,
                received_first_packet: receipt.received_first_packet,
                received_last_packet: receipt.received_last_packet,
                reconstructed: reconstructed_at,
                sent_to_decoder: reconstructed_at,
                data_packets: frame.data_packets,
                parity_packets: frame.parity_packets,
                received_data_packets: frame.received_data_packets,
                received_parity_packets: frame.received_parity_packets,
                received_pose,
                ..Default::default()
            }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alvr_session::{EyeResolution, FaceTrackingCapability};
    use alvr_sockets::{FoveationTable, VideoStreamItem};
    use std::net::Ipv4Addr;

    fn loopback() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    fn stub_headset_info() -> HeadsetInfo {
        HeadsetInfo {
            eye_resolution: EyeResolution {
                width: 1024,
                height: 1024,
            },
            available_refresh_rates: vec![72.0, 90.0],
            preferred_refresh_rate: 90.0,
            microphone_sample_rate: 48_000,
            microphone_channels: 1,
            hand_tracking: false,
            eye_gaze: false,
            face_tracking: FaceTrackingCapability::None,
            palm_pose: false,
            generic_tracker_count: 0,
            locale: "en".into(),
        }
    }

    fn stub_video_stream_description() -> VideoStreamDescription {
        let table = FoveationTable {
            x: vec![1024],
            y: vec![1024],
        };
        VideoStreamDescription {
            width: 2048,
            height: 1024,
            fps: 90.0,
            items: vec![VideoStreamItem {
                width: 1024,
                height: 1024,
                offset_x: 0,
                offset_y: 0,
                codec: alvr_session::VideoCodec::H264,
            }],
            foveation: [table.clone(), table],
        }
    }

    #[tokio::test]
    async fn accept_exchanges_headset_info_for_video_stream_description() {
        // ClientSession::accept is the TCP listener side (it binds and
        // accepts), so the host role here connects out, retrying until
        // the listener is up.
        let client_task = tokio::spawn(ClientSession::accept(loopback(), stub_headset_info()));

        let mut control = loop {
            match ControlChannel::connect(loopback(), alvr_sockets::CONTROL_PORT).await {
                Ok(control) => break control,
                Err(_) => tokio::time::sleep(Duration::from_millis(5)).await,
            }
        };

        control
            .send(&ToHeadsetControlPacket::Handshake(ToHeadsetHandshake {
                version: PROTOCOL_VERSION,
            }))
            .await
            .unwrap();

        let reply: FromHeadsetControlPacket = control.recv().await.unwrap();
        assert!(matches!(reply, FromHeadsetControlPacket::Handshake(_)));

        let info: FromHeadsetControlPacket = control.recv().await.unwrap();
        let FromHeadsetControlPacket::HeadsetInfoPacket(info) = info else {
            panic!("expected headset_info_packet");
        };
        assert_eq!(info.preferred_refresh_rate, 90.0);

        control
            .send(&ToHeadsetControlPacket::VideoStreamDescription(
                stub_video_stream_description(),
            ))
            .await
            .unwrap();

        let session = client_task.await.unwrap().unwrap();
        assert_eq!(session.video_stream().unwrap().fps, 90.0);
    }
}
