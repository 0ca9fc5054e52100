//! TCP control channel: reliable, ordered delivery of the handshake and
//! the control packet unions (spec §4.1). Framed with the shared [`Ldc`]
//! length-delimited codec, tuned the way the teacher's TCP stream socket
//! was (`TCP_NODELAY` + DSCP EF marking).

use super::{tune_for_realtime, LOCAL_IP};
use crate::codec::{self, Ldc};
use alvr_common::{ConError, ConResult};
use bytes::{Bytes, BytesMut};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use std::net::IpAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

pub struct ControlChannel {
    send: SplitSink<Framed<TcpStream, Ldc>, Bytes>,
    recv: SplitStream<Framed<TcpStream, Ldc>>,
}

impl ControlChannel {
    fn from_stream(stream: TcpStream) -> ConResult<Self> {
        stream.set_nodelay(true)?;
        let socket = socket2::Socket::from(stream.into_std()?);
        tune_for_realtime(&socket);
        let stream = TcpStream::from_std(socket.into())?;

        let framed = Framed::new(stream, Ldc::new());
        let (send, recv) = framed.split();
        Ok(Self { send, recv })
    }

    pub async fn accept(listener: &TcpListener, expected_peer: IpAddr) -> ConResult<Self> {
        let (stream, peer_addr) = listener.accept().await?;
        if peer_addr.ip() != expected_peer {
            return Err(ConError::PeerRefused);
        }
        Self::from_stream(stream)
    }

    pub async fn connect(peer_ip: IpAddr, port: u16) -> ConResult<Self> {
        let stream = TcpStream::connect((peer_ip, port)).await?;
        Self::from_stream(stream)
    }

    pub async fn send<T: serde::Serialize>(&mut self, packet: &T) -> ConResult<()> {
        let bytes = codec::encode(packet).map_err(|e| ConError::Decode(e.to_string()))?;
        self.send
            .send(Bytes::from(bytes))
            .await
            .map_err(ConError::Io)
    }

    pub async fn recv<T: serde::de::DeserializeOwned>(&mut self) -> ConResult<T> {
        let packet = self.recv.next().await.ok_or(ConError::PeerGone)??;
        decode_packet(packet)
    }
}

pub async fn bind(port: u16) -> ConResult<TcpListener> {
    Ok(TcpListener::bind((LOCAL_IP, port)).await?)
}

fn decode_packet<T: serde::de::DeserializeOwned>(bytes: BytesMut) -> ConResult<T> {
    codec::decode(&bytes).map_err(|e| ConError::Decode(e.to_string()))
}
