//! bincode v2 serde encode/decode helpers shared by the control and stream
//! channels, plus the length-delimited framing codec used on the TCP
//! control channel (grounded on the teacher's `Ldc` type).

use bincode::error::{DecodeError, EncodeError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

fn config() -> bincode::config::Configuration {
    bincode::config::standard()
}

pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(value, config())
}

pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(bytes, config()).map(|(value, _)| value)
}

/// Length-delimited codec for the TCP control channel: a u32 length prefix
/// followed by the bincode-encoded payload. Named after the teacher's own
/// length-delimited codec wrapper.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ldc {
    next_len: Option<u32>,
}

impl Ldc {
    pub fn new() -> Self {
        Self::default()
    }
}

const MAX_PACKET_SIZE: u32 = 64 * 1024 * 1024;

impl Decoder for Ldc {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<BytesMut>> {
        let len = match self.next_len {
            Some(len) => len,
            None => {
                if src.len() < 4 {
                    return Ok(None);
                }
                let len = (&src[..4]).get_u32();
                if len > MAX_PACKET_SIZE {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "packet too large"));
                }
                src.advance(4);
                self.next_len = Some(len);
                len
            }
        };

        if src.len() < len as usize {
            src.reserve(len as usize - src.len());
            return Ok(None);
        }

        self.next_len = None;
        Ok(Some(src.split_to(len as usize)))
    }
}

impl Encoder<Bytes> for Ldc {
    type Error = io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> io::Result<()> {
        if item.len() > MAX_PACKET_SIZE as usize {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "packet too large"));
        }
        dst.reserve(4 + item.len());
        dst.put_u32(item.len() as u32);
        dst.put_slice(&item);
        Ok(())
    }
}
