//! Wire packet catalog, codec and channel plumbing shared by the host and
//! headset session orchestrators (spec §3, §4.1–§4.3).

pub mod clock;
pub mod codec;
pub mod packets;
pub mod shard;
pub mod transport;

pub use clock::{ClockOffset, ClockSynchronizer};
pub use packets::*;
pub use transport::{tcp::ControlChannel, udp::StreamChannel};
