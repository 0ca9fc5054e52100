//! UDP stream channel: unreliable, unordered datagrams carrying tracking,
//! shards, haptics and timesync (spec §4.1). One packet per datagram — no
//! framing, the shard codec owns fragmentation above this layer. The peer
//! address is learned implicitly from the first datagram received from
//! it, the way a headset's stream socket only knows the host's address
//! once traffic actually arrives.

use super::{tune_for_realtime, LOCAL_IP};
use crate::codec;
use alvr_common::{ConError, ConResult};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

const MAX_DATAGRAM: usize = 1500;

pub struct StreamChannel {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
}

impl StreamChannel {
    pub async fn bind(port: u16) -> ConResult<Self> {
        let socket = UdpSocket::bind((LOCAL_IP, port)).await?;
        let socket2 = socket2::Socket::from(socket.into_std()?);
        tune_for_realtime(&socket2);
        let socket = UdpSocket::from_std(socket2.into())?;
        Ok(Self { socket, peer: None })
    }

    pub async fn connect(&mut self, peer: SocketAddr) -> ConResult<()> {
        self.socket.connect(peer).await?;
        self.peer = Some(peer);
        Ok(())
    }

    pub fn local_port(&self) -> ConResult<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    pub async fn send<T: serde::Serialize>(&self, packet: &T) -> ConResult<()> {
        let bytes = codec::encode(packet).map_err(|e| ConError::Decode(e.to_string()))?;
        if bytes.len() > MAX_DATAGRAM {
            return Err(ConError::EncodeFailure(format!(
                "packet of {} bytes exceeds MTU budget",
                bytes.len()
            )));
        }
        self.socket.send(&bytes).await?;
        Ok(())
    }

    /// Waits up to `timeout` for the next datagram, decoding it as `T`.
    /// Learns the peer address on the first datagram seen if not already
    /// connected (implicit datagram-connect, spec §4.1).
    pub async fn poll<T: serde::de::DeserializeOwned>(
        &mut self,
        timeout: Duration,
    ) -> ConResult<Option<T>> {
        let mut buf = [0u8; MAX_DATAGRAM];
        let recv = tokio::time::timeout(timeout, self.socket.recv_from(&mut buf)).await;
        let (len, from) = match recv {
            Ok(result) => result?,
            Err(_) => return Ok(None),
        };

        if self.peer.is_none() {
            self.socket.connect(from).await?;
            self.peer = Some(from);
        } else if self.peer != Some(from) {
            // datagram from an unexpected source; ignore rather than tear
            // down the session.
            return Ok(None);
        }

        let packet = codec::decode(&buf[..len]).map_err(|e| ConError::Decode(e.to_string()))?;
        Ok(Some(packet))
    }

    pub fn shutdown(self) {
        drop(self.socket);
    }
}
