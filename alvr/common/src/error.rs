//! Typed error ladder for the connection core (spec §7).
//!
//! Every kind enumerated in the spec's error-handling section gets its own
//! variant so callers can match on it instead of grepping a string, the way
//! `ServerError`/`ClientError` are split by failure domain in the rest of
//! the workspace.

use std::io;

pub type ConResult<T> = Result<T, ConError>;

#[derive(Debug, thiserror::Error)]
pub enum ConError {
    /// Transient or fatal socket error, depending on which channel raised it
    /// (caller decides: drop on datagram, tear down session on reliable).
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Handshake rejected due to a wire-format version mismatch.
    #[error("incompatible protocol version: {0}")]
    ProtocolVersion(String),

    /// Handshake did not complete within the timeout.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// Peer actively rejected the connection at handshake.
    #[error("peer refused connection")]
    PeerRefused,

    /// A frame could not be reassembled from the shards received (loss
    /// beyond what FEC, if any, could recover).
    #[error("shard reassembly failed for frame {frame_index}")]
    ShardReassembly { frame_index: u64 },

    /// The clock offset estimator has not received a sample recently
    /// enough to be trusted.
    #[error("clock offset unstable")]
    ClockUnstable,

    /// The video encoder collaborator failed to produce a frame.
    #[error("encode failed: {0}")]
    EncodeFailure(String),

    /// The video decoder collaborator failed to consume a frame.
    #[error("decode failed: {0}")]
    DecodeFailure(String),

    /// The peer is gone: reliable channel closed or stopped responding.
    #[error("peer gone")]
    PeerGone,

    /// Packet carried a bincode-incompatible payload.
    #[error("packet decode error: {0}")]
    Decode(String),
}
