//! Frame shard codec (spec §4.2): fragments an encoded frame into
//! MTU-sized shards on send, reassembles them (tolerating loss within the
//! configured parity budget) on receive.
//!
//! FEC choice (spec §9 open question): since the original material
//! reserves `num_parity_elements`/`parity_element` fields but does not
//! publish a polynomial, this implementation picks an explicit,
//! documented scheme rather than guessing at Reed-Solomon: parity element
//! `i` is the XOR of every data shard whose `shard_idx % num_parity_elements
//! == i`. A single missing data shard within a parity group is recoverable
//! by XOR-ing the parity element against the group's other members. This
//! only recovers non-terminal shards, which matches the protocol: the
//! frame's `data_shard_count` is only known once the terminal
//! (`end_of_frame`) shard itself has been received, so a missing terminal
//! shard can never be the one being reconstructed.

use crate::packets::{ShardFlags, ViewInfo, VideoStreamDataShard, VideoStreamParityShard};
use std::collections::{HashMap, VecDeque};

pub const MAX_PAYLOAD: usize = 1400;
pub const IN_FLIGHT: usize = 6;

/// Splits `encoded_bytes` into data shards (and, if `num_parity_elements >
/// 0`, parity shards) ready to send on the stream channel.
pub fn encode(
    frame_idx: u64,
    stream_item_idx: u8,
    encoded_bytes: &[u8],
    view_info: ViewInfo,
    num_parity_elements: u8,
) -> (Vec<VideoStreamDataShard>, Vec<VideoStreamParityShard>) {
    let chunks: Vec<&[u8]> = if encoded_bytes.is_empty() {
        vec![&[]]
    } else {
        encoded_bytes.chunks(MAX_PAYLOAD).collect()
    };
    let data_shard_count = chunks.len() as u16;

    let mut data_shards = Vec::with_capacity(chunks.len());
    for (idx, chunk) in chunks.iter().enumerate() {
        let idx = idx as u16;
        let mut flags = ShardFlags::empty();
        if idx == 0 {
            flags |= ShardFlags::START_OF_SLICE;
        }
        if idx == data_shard_count - 1 {
            flags |= ShardFlags::END_OF_SLICE | ShardFlags::END_OF_FRAME;
        }

        data_shards.push(VideoStreamDataShard {
            stream_item_idx,
            frame_idx,
            shard_idx: idx,
            flags,
            payload: chunk.to_vec(),
            view_info: if idx == data_shard_count - 1 {
                Some(view_info)
            } else {
                None
            },
        });
    }

    let mut parity_shards = Vec::new();
    if num_parity_elements > 0 {
        let mut groups = vec![vec![0u8; MAX_PAYLOAD]; num_parity_elements as usize];
        for (idx, chunk) in chunks.iter().enumerate() {
            let group = idx % num_parity_elements as usize;
            xor_into(&mut groups[group], chunk);
        }
        for (element, payload) in groups.into_iter().enumerate() {
            parity_shards.push(VideoStreamParityShard {
                stream_item_idx,
                frame_idx,
                data_shard_count,
                num_parity_elements,
                parity_element: element as u8,
                payload,
            });
        }
    }

    (data_shards, parity_shards)
}

fn xor_into(dst: &mut [u8], src: &[u8]) {
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        *d ^= s;
    }
}

/// A frame reassembled from shards, ready to hand to a decoder.
pub struct ReassembledFrame {
    pub frame_idx: u64,
    pub bytes: Vec<u8>,
    pub view_info: Option<ViewInfo>,
    pub data_packets: u8,
    pub parity_packets: u8,
    pub received_data_packets: u8,
    pub received_parity_packets: u8,
}

/// Result of an eviction: the frame never reassembled and the idr handler
/// should be told to request a fresh keyframe.
pub struct EvictedFrame {
    pub frame_idx: u64,
}

struct PendingFrame {
    frame_idx: u64,
    data: HashMap<u16, Vec<u8>>,
    parity: HashMap<u8, Vec<u8>>,
    data_shard_count: Option<u16>,
    num_parity_elements: u8,
    view_info: Option<ViewInfo>,
    /// Count of data shards actually received over the wire, distinct from
    /// `data.len()` once parity recovery synthesizes an entry: telemetry
    /// reports what arrived, not what got reconstructed.
    received_data_count: u8,
}

impl PendingFrame {
    fn new(frame_idx: u64) -> Self {
        Self {
            frame_idx,
            data: HashMap::new(),
            parity: HashMap::new(),
            data_shard_count: None,
            num_parity_elements: 0,
            view_info: None,
            received_data_count: 0,
        }
    }

    fn try_reconstruct(&mut self) -> Option<ReassembledFrame> {
        let data_shard_count = self.data_shard_count?;

        if (self.data.len() as u16) < data_shard_count {
            if self.num_parity_elements == 0 {
                return None;
            }
            self.recover_via_parity(data_shard_count);
            if (self.data.len() as u16) < data_shard_count {
                return None;
            }
        }

        let mut bytes = Vec::new();
        for idx in 0..data_shard_count {
            bytes.extend_from_slice(self.data.get(&idx)?);
        }

        Some(ReassembledFrame {
            frame_idx: self.frame_idx,
            bytes,
            view_info: self.view_info,
            data_packets: data_shard_count as u8,
            parity_packets: self.num_parity_elements,
            received_data_packets: self.received_data_count,
            received_parity_packets: self.parity.len() as u8,
        })
    }

    fn recover_via_parity(&mut self, data_shard_count: u16) {
        let groups = self.num_parity_elements as usize;
        if groups == 0 {
            return;
        }

        for group in 0..groups {
            let missing: Vec<u16> = (0..data_shard_count)
                .filter(|idx| *idx as usize % groups == group && !self.data.contains_key(idx))
                .collect();
            if missing.len() != 1 {
                continue;
            }
            let Some(parity) = self.parity.get(&(group as u8)) else {
                continue;
            };

            let mut recovered = parity.clone();
            let mut ok = true;
            for idx in 0..data_shard_count {
                if idx as usize % groups != group || idx == missing[0] {
                    continue;
                }
                let Some(shard) = self.data.get(&idx) else {
                    ok = false;
                    break;
                };
                xor_into(&mut recovered, shard);
            }
            if ok {
                self.data.insert(missing[0], recovered);
            }
        }
    }
}

/// Accumulates shards across up to [`IN_FLIGHT`] concurrent frames and
/// emits reassembled frames (or eviction notices) as they become ready.
pub struct ShardAssembler {
    frames: HashMap<u64, PendingFrame>,
    order: VecDeque<u64>,
    highest_frame_idx: u64,
}

impl Default for ShardAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardAssembler {
    pub fn new() -> Self {
        Self {
            frames: HashMap::new(),
            order: VecDeque::new(),
            highest_frame_idx: 0,
        }
    }

    fn frame_mut(&mut self, frame_idx: u64) -> &mut PendingFrame {
        match self.frames.entry(frame_idx) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                self.order.push_back(frame_idx);
                e.insert(PendingFrame::new(frame_idx))
            }
        }
    }

    /// Evicts the oldest in-flight frame if we're at capacity, returning
    /// it if it never reassembled.
    fn evict_if_needed(&mut self) -> Option<EvictedFrame> {
        if self.order.len() <= IN_FLIGHT {
            return None;
        }
        let oldest = self.order.pop_front()?;
        self.frames.remove(&oldest);
        Some(EvictedFrame { frame_idx: oldest })
    }

    pub fn ingest_data(
        &mut self,
        shard: VideoStreamDataShard,
    ) -> (Option<ReassembledFrame>, Option<EvictedFrame>) {
        self.highest_frame_idx = self.highest_frame_idx.max(shard.frame_idx);
        let frame_idx = shard.frame_idx;
        let frame = self.frame_mut(frame_idx);

        let is_terminal = shard.flags.contains(ShardFlags::END_OF_FRAME);
        if is_terminal {
            match frame.data_shard_count {
                Some(known) if shard.shard_idx >= known => {}
                _ => {
                    let corrected = shard.shard_idx + 1;
                    frame.data.retain(|idx, _| *idx < corrected);
                    frame.data_shard_count = Some(corrected);
                }
            }
            frame.view_info = shard.view_info;
        }

        if let std::collections::hash_map::Entry::Vacant(e) = frame.data.entry(shard.shard_idx) {
            frame.received_data_count += 1;
            e.insert(shard.payload);
        }

        let ready = frame.try_reconstruct();
        self.settle(frame_idx, ready)
    }

    pub fn ingest_parity(
        &mut self,
        shard: VideoStreamParityShard,
    ) -> (Option<ReassembledFrame>, Option<EvictedFrame>) {
        self.highest_frame_idx = self.highest_frame_idx.max(shard.frame_idx);
        let frame_idx = shard.frame_idx;
        let frame = self.frame_mut(frame_idx);
        frame.num_parity_elements = shard.num_parity_elements;
        if frame.data_shard_count.is_none() {
            frame.data_shard_count = Some(shard.data_shard_count);
        }
        frame
            .parity
            .entry(shard.parity_element)
            .or_insert(shard.payload);

        let ready = frame.try_reconstruct();
        self.settle(frame_idx, ready)
    }

    /// A frame that reconstructed is only torn down once every advertised
    /// parity shard has also been accounted for — a redundant parity shard
    /// that arrives after reconstruction still counts as received
    /// (`received_parity_packets` is receipt telemetry, not a "shards used"
    /// counter; spec's worked FEC example requires this).
    fn settle(
        &mut self,
        frame_idx: u64,
        ready: Option<ReassembledFrame>,
    ) -> (Option<ReassembledFrame>, Option<EvictedFrame>) {
        let fully_settled = ready.is_some()
            && matches!(
                self.frames.get(&frame_idx),
                Some(f) if f.parity.len() >= f.num_parity_elements as usize
            );

        if fully_settled {
            self.order.retain(|idx| *idx != frame_idx);
            self.frames.remove(&frame_idx);
            (ready, None)
        } else {
            (ready, self.evict_if_needed())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alvr_common::{Fov, MotionData};

    fn view_info() -> ViewInfo {
        ViewInfo {
            display_time: 0,
            pose: [MotionData::default(), MotionData::default()],
            fov: [Fov {
                angle_left: -1.0,
                angle_right: 1.0,
                angle_up: 1.0,
                angle_down: -1.0,
            }; 2],
        }
    }

    #[test]
    fn lossless_roundtrip() {
        let original: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let (data, parity) = encode(0, 0, &original, view_info(), 0);
        assert_eq!(data.len(), 4);
        assert!(parity.is_empty());
        assert!(data[3].flags.contains(ShardFlags::END_OF_FRAME));

        let mut assembler = ShardAssembler::new();
        let mut result = None;
        for shard in data {
            let (ready, _) = assembler.ingest_data(shard);
            if ready.is_some() {
                result = ready;
            }
        }
        let frame = result.expect("frame should reassemble");
        assert_eq!(frame.bytes, original);
    }

    #[test]
    fn recovers_single_loss_per_group_with_parity() {
        let original: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let (mut data, parity) = encode(0, 0, &original, view_info(), 2);
        assert_eq!(data.len(), 4);
        assert_eq!(parity.len(), 2);

        data.remove(2); // drop shard 2 (spec worked example)

        let mut assembler = ShardAssembler::new();
        let mut result = None;
        for shard in data {
            let (ready, _) = assembler.ingest_data(shard);
            if ready.is_some() {
                result = ready;
            }
        }
        for shard in parity {
            let (ready, _) = assembler.ingest_parity(shard);
            if ready.is_some() {
                result = ready;
            }
        }
        let frame = result.expect("frame should reconstruct via parity");
        assert_eq!(frame.bytes, original);
        assert_eq!(frame.received_data_packets, 3);
        // both parity shards arrived over the wire; the frame stays
        // tracked past reconstruction so the second, merely redundant one
        // still counts in the receipt telemetry.
        assert_eq!(frame.received_parity_packets, 2);
    }

    #[test]
    fn unrecoverable_loss_never_emits() {
        let original: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let (mut data, _parity) = encode(0, 0, &original, view_info(), 2);
        data.remove(3); // the terminal shard itself
        data.remove(2);

        let mut assembler = ShardAssembler::new();
        let mut result = None;
        for shard in data {
            let (ready, _) = assembler.ingest_data(shard);
            if ready.is_some() {
                result = ready;
            }
        }
        assert!(result.is_none());
    }

    #[test]
    fn eviction_of_oldest_incomplete_frame() {
        let mut assembler = ShardAssembler::new();
        for frame_idx in 0..(IN_FLIGHT as u64 + 1) {
            let shard = VideoStreamDataShard {
                stream_item_idx: 0,
                frame_idx,
                shard_idx: 0,
                flags: ShardFlags::START_OF_SLICE,
                payload: vec![1, 2, 3],
                view_info: None,
            };
            let (_ready, evicted) = assembler.ingest_data(shard);
            if frame_idx == IN_FLIGHT as u64 {
                assert_eq!(evicted.unwrap().frame_idx, 0);
            } else {
                assert!(evicted.is_none());
            }
        }
    }
}
