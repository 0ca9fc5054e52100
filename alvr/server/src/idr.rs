//! Per-stream IDR (keyframe) handler (spec §4.7): a small state machine
//! deciding whether the next frame submitted to the encoder must be an
//! I-frame, and reacting to feedback that says a P-frame never reached the
//! decoder.
//!
//! Grounded on the "stuck in `WaitIdrFeedback`" escape hatch from
//! `original_source/server/encoder/idr_handler.cpp`: if feedback for the
//! requested keyframe never arrives (client gone quiet, not dropped
//! outright), the handler re-requests a keyframe after a bound instead of
//! stalling the stream forever.

/// Frames waited in `WaitIdrFeedback` before the handler gives up and
/// re-requests a fresh keyframe, per the original's stuck-detector.
const STUCK_AFTER_FRAMES: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    I,
    P,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDecision {
    Encode(FrameType, u64),
    /// The encoder must not emit this frame; held back while waiting for
    /// the previous keyframe to be confirmed.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    NeedIdr,
    WaitIdrFeedback { idr_frame_id: u64, frames_waited: u32 },
    IdrReceived,
    Running { first_p_frame_id: u64 },
}

pub struct IdrHandler {
    state: State,
}

impl Default for IdrHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl IdrHandler {
    pub fn new() -> Self {
        Self {
            state: State::NeedIdr,
        }
    }

    /// Called by the encoder thread when it's about to submit
    /// `frame_id`. Returns whether to encode it as I/P, or skip it
    /// outright.
    pub fn next_frame(&mut self, frame_id: u64) -> FrameDecision {
        match self.state {
            State::NeedIdr => {
                self.state = State::WaitIdrFeedback {
                    idr_frame_id: frame_id,
                    frames_waited: 0,
                };
                FrameDecision::Encode(FrameType::I, frame_id)
            }
            State::WaitIdrFeedback {
                idr_frame_id,
                frames_waited,
            } => {
                if frames_waited + 1 >= STUCK_AFTER_FRAMES {
                    self.state = State::WaitIdrFeedback {
                        idr_frame_id: frame_id,
                        frames_waited: 0,
                    };
                    return FrameDecision::Encode(FrameType::I, frame_id);
                }
                self.state = State::WaitIdrFeedback {
                    idr_frame_id,
                    frames_waited: frames_waited + 1,
                };
                FrameDecision::Skip
            }
            State::IdrReceived => {
                self.state = State::Running {
                    first_p_frame_id: frame_id,
                };
                FrameDecision::Encode(FrameType::P, frame_id)
            }
            State::Running { .. } => FrameDecision::Encode(FrameType::P, frame_id),
        }
    }

    /// Routes one `Feedback.sent_to_decoder` observation for `frame_id`.
    pub fn on_feedback(&mut self, frame_id: u64, sent_to_decoder: bool) {
        match self.state {
            State::WaitIdrFeedback { idr_frame_id, .. }
                if frame_id == idr_frame_id && sent_to_decoder =>
            {
                self.state = State::IdrReceived;
            }
            State::Running { first_p_frame_id } if frame_id >= first_p_frame_id && !sent_to_decoder => {
                self.state = State::NeedIdr;
            }
            _ => {}
        }
    }

    #[cfg(test)]
    fn is_need_idr(&self) -> bool {
        matches!(self.state, State::NeedIdr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_is_always_i() {
        let mut handler = IdrHandler::new();
        assert_eq!(
            handler.next_frame(0),
            FrameDecision::Encode(FrameType::I, 0)
        );
    }

    #[test]
    fn suppresses_frames_until_idr_confirmed() {
        let mut handler = IdrHandler::new();
        handler.next_frame(0);
        assert_eq!(handler.next_frame(1), FrameDecision::Skip);
        assert_eq!(handler.next_frame(2), FrameDecision::Skip);

        handler.on_feedback(0, true);
        assert_eq!(
            handler.next_frame(3),
            FrameDecision::Encode(FrameType::P, 3)
        );
        assert_eq!(
            handler.next_frame(4),
            FrameDecision::Encode(FrameType::P, 4)
        );
    }

    #[test]
    fn dropped_p_frame_requests_new_idr() {
        let mut handler = IdrHandler::new();
        handler.next_frame(0);
        handler.on_feedback(0, true);
        handler.next_frame(1); // first_p_frame_id = 1

        handler.on_feedback(1, false);
        assert!(handler.is_need_idr());
        assert_eq!(
            handler.next_frame(2),
            FrameDecision::Encode(FrameType::I, 2)
        );
    }

    #[test]
    fn stuck_wait_self_resets_and_requests_fresh_idr() {
        let mut handler = IdrHandler::new();
        handler.next_frame(0);
        for frame_id in 1..100 {
            assert_eq!(handler.next_frame(frame_id), FrameDecision::Skip);
        }
        // the 100th frame waited in this state forces a fresh keyframe
        // request instead of skipping forever.
        assert_eq!(
            handler.next_frame(100),
            FrameDecision::Encode(FrameType::I, 100)
        );
    }

    #[test]
    fn feedback_for_old_frame_before_first_p_is_ignored() {
        let mut handler = IdrHandler::new();
        handler.next_frame(0);
        handler.on_feedback(0, true);
        handler.next_frame(5); // first_p_frame_id = 5

        // feedback for a frame older than first_p_frame_id must not reset us
        handler.on_feedback(3, false);
        assert!(!handler.is_need_idr());
    }
}
