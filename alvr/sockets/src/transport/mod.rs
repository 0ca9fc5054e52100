//! Dual-channel session transport (spec §4.1): a reliable TCP control
//! channel plus an unreliable UDP stream channel, each bound to the same
//! local port and tuned for low-latency real-time delivery the way the
//! teacher's `stream_socket` tuned its sockets.

pub mod tcp;
pub mod udp;

use socket2::Socket;
use std::net::IpAddr;

pub const LOCAL_IP: IpAddr = IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED);

/// DSCP Expedited Forwarding: ask routers along the path to prioritize
/// this traffic the way real-time voice/video traffic is conventionally
/// marked.
pub(crate) const IPTOS_DSCP_EF: u32 = 0xb8;

/// spec §4.1: datagram receive buffer sized >= 5 MiB so a burst of shards
/// doesn't get dropped by the kernel before the stream channel drains it.
pub(crate) const RECV_BUFFER_BYTES: usize = 5 * 1024 * 1024;

pub(crate) fn tune_for_realtime(socket: &Socket) {
    socket.set_tos(IPTOS_DSCP_EF).ok();
    socket.set_recv_buffer_size(RECV_BUFFER_BYTES).ok();
}
