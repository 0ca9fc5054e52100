//! Pose history and prediction (spec §4.4): a fixed-capacity ring per
//! device, answering "state at host_t" by interpolating between bracketing
//! samples or extrapolating past either end.

use alvr_common::glam::{Quat, Vec3};
use alvr_common::{MotionData, MotionFlags};
use alvr_sockets::TrackingView;
use std::collections::VecDeque;

pub const MAX_SAMPLES: usize = 10;
const MAX_EXTRAPOLATION_NS: i64 = 200_000_000;

/// Per-frame view history (spec §4.4): distinct from the per-device
/// [`PoseHistory`] ring above, this recalls what pose+FOV the host actually
/// attached to a frame's `view_info` at the predicted display time it was
/// encoded for, so a later `Feedback.real_pose` can be compared against it.
pub const MAX_FRAME_VIEWS: usize = 16;

#[derive(Debug, Clone, Copy)]
pub struct FrameViewSample {
    pub timestamp: i64,
    pub views: [TrackingView; 2],
}

pub struct FrameViewHistory {
    samples: VecDeque<FrameViewSample>,
}

impl Default for FrameViewHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameViewHistory {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(MAX_FRAME_VIEWS),
        }
    }

    pub fn insert(&mut self, sample: FrameViewSample) {
        self.samples.push_back(sample);
        if self.samples.len() > MAX_FRAME_VIEWS {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The recorded sample closest to `t`, used to recover what `view_info`
    /// was predicted for a frame whose feedback just arrived.
    pub fn nearest(&self, t: i64) -> Option<FrameViewSample> {
        self.samples
            .iter()
            .min_by_key(|s| (s.timestamp - t).abs())
            .copied()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionSample {
    pub timestamp: i64,
    pub motion: MotionData,
    pub flags: MotionFlags,
}

/// A fixed-capacity, timestamp-ordered ring of [`MotionSample`]s for one
/// device, implementing the `get_at` query from spec §4.4.
pub struct PoseHistory {
    samples: VecDeque<MotionSample>,
}

impl Default for PoseHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl PoseHistory {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(MAX_SAMPLES),
        }
    }

    /// Inserts a sample already converted into host-clock time. Samples
    /// sharing a timestamp with an existing entry replace it; the oldest
    /// sample is evicted once the ring is full.
    pub fn insert(&mut self, sample: MotionSample) {
        if let Some(existing) = self
            .samples
            .iter_mut()
            .find(|s| s.timestamp == sample.timestamp)
        {
            *existing = sample;
            return;
        }

        let pos = self
            .samples
            .iter()
            .position(|s| s.timestamp > sample.timestamp)
            .unwrap_or(self.samples.len());
        self.samples.insert(pos, sample);

        if self.samples.len() > MAX_SAMPLES {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get_at(&self, t: i64) -> MotionSample {
        match self.samples.len() {
            0 => MotionSample::default(),
            1 => self.samples[0],
            n => {
                let oldest = self.samples[0];
                let newest = self.samples[n - 1];

                if t <= oldest.timestamp {
                    if t == oldest.timestamp {
                        oldest
                    } else {
                        extrapolate(&oldest, &self.samples[1], t)
                    }
                } else if t >= newest.timestamp {
                    if t == newest.timestamp {
                        newest
                    } else {
                        extrapolate(&newest, &self.samples[n - 2], t)
                    }
                } else {
                    let idx = self
                        .samples
                        .iter()
                        .position(|s| s.timestamp > t)
                        .unwrap_or(n - 1);
                    let next = self.samples[idx];
                    let prev = self.samples[idx - 1];
                    let lambda =
                        (next.timestamp - t) as f64 / (next.timestamp - prev.timestamp) as f64;
                    interpolate(&prev, &next, lambda)
                }
            }
        }
    }
}

/// SLERP on orientation, LERP on position/velocities, AND of flags.
/// `lambda` is the weight on `prev` (1.0 at `prev`, 0.0 at `next`).
fn interpolate(prev: &MotionSample, next: &MotionSample, lambda: f64) -> MotionSample {
    let t = 1.0 - lambda.clamp(0.0, 1.0) as f32;
    let timestamp = prev.timestamp + ((next.timestamp - prev.timestamp) as f64 * (1.0 - lambda)) as i64;

    MotionSample {
        timestamp,
        motion: MotionData {
            orientation: prev.motion.orientation.slerp(next.motion.orientation, t),
            position: prev.motion.position.lerp(next.motion.position, t),
            linear_velocity: prev
                .motion
                .linear_velocity
                .lerp(next.motion.linear_velocity, t),
            angular_velocity: prev
                .motion
                .angular_velocity
                .lerp(next.motion.angular_velocity, t),
        },
        flags: prev.flags & next.flags,
    }
}

/// `quat_exp` of a pure rotation vector: the unit quaternion that rotates
/// by `|v|` radians about the axis `v/|v|`.
fn quat_exp(v: Vec3) -> Quat {
    let angle = v.length();
    if angle < 1e-8 {
        Quat::IDENTITY
    } else {
        Quat::from_axis_angle(v / angle, angle)
    }
}

/// Extrapolates from `anchor` (the sample closest to `t`) using `other` to
/// derive linear/angular acceleration, per spec §4.4. Works symmetrically
/// whether `t` lies before the oldest sample or after the newest: `dt_ref`
/// and `dt` simply carry whichever sign that direction implies.
fn extrapolate(anchor: &MotionSample, other: &MotionSample, t: i64) -> MotionSample {
    let dt_ref = (anchor.timestamp - other.timestamp) as f64;
    let raw_dt = (t - anchor.timestamp) as f64;
    let dt = raw_dt.clamp(-(MAX_EXTRAPOLATION_NS as f64), MAX_EXTRAPOLATION_NS as f64);
    let dt_s = dt / 1e9;
    let dt_ref_s = dt_ref / 1e9;

    if dt_ref_s.abs() < 1e-9 {
        return MotionSample {
            timestamp: anchor.timestamp + dt as i64,
            motion: anchor.motion,
            flags: anchor.flags,
        };
    }

    let linear_accel =
        (anchor.motion.linear_velocity - other.motion.linear_velocity) / dt_ref_s as f32;
    let angular_accel =
        (anchor.motion.angular_velocity - other.motion.angular_velocity) / dt_ref_s as f32;

    let dt_s = dt_s as f32;
    let position = anchor.motion.position
        + anchor.motion.linear_velocity * dt_s
        + 0.5 * linear_accel * dt_s * dt_s;
    let rotation_vec =
        anchor.motion.angular_velocity * dt_s + 0.5 * angular_accel * dt_s * dt_s;
    let orientation = anchor.motion.orientation * quat_exp(rotation_vec);

    MotionSample {
        timestamp: anchor.timestamp + dt as i64,
        motion: MotionData {
            orientation,
            position,
            linear_velocity: anchor.motion.linear_velocity + linear_accel * dt_s,
            angular_velocity: anchor.motion.angular_velocity + angular_accel * dt_s,
        },
        flags: anchor.flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(t: i64, px: f32, vx: f32) -> MotionSample {
        MotionSample {
            timestamp: t,
            motion: MotionData {
                orientation: Quat::IDENTITY,
                position: Vec3::new(px, 0.0, 0.0),
                linear_velocity: Vec3::new(vx, 0.0, 0.0),
                angular_velocity: Vec3::ZERO,
            },
            flags: MotionFlags::POSITION_VALID,
        }
    }

    #[test]
    fn empty_history_returns_zero_relation() {
        let history = PoseHistory::new();
        let result = history.get_at(0);
        assert_eq!(result.motion.position, Vec3::ZERO);
        assert!(result.flags.is_empty());
    }

    #[test]
    fn insert_evicts_oldest_beyond_capacity() {
        let mut history = PoseHistory::new();
        for i in 0..(MAX_SAMPLES as i64 + 3) {
            history.insert(sample(i * 1_000_000, i as f32, 0.0));
        }
        assert_eq!(history.len(), MAX_SAMPLES);
        assert_eq!(history.get_at(3_000_000).timestamp, 3_000_000);
        assert_eq!(history.get_at(3_000_000).motion.position.x, 3.0);
    }

    #[test]
    fn duplicate_timestamp_replaces() {
        let mut history = PoseHistory::new();
        history.insert(sample(0, 1.0, 0.0));
        history.insert(sample(0, 2.0, 0.0));
        assert_eq!(history.len(), 1);
        assert_eq!(history.get_at(0).motion.position.x, 2.0);
    }

    #[test]
    fn interpolation_identity_at_sample_timestamps() {
        let mut history = PoseHistory::new();
        history.insert(sample(0, 0.0, 1.0));
        history.insert(sample(10_000_000, 0.01, 1.0));
        assert_eq!(history.get_at(0).motion.position.x, 0.0);
        assert_eq!(history.get_at(10_000_000).motion.position.x, 0.01);
    }

    #[test]
    fn extrapolation_matches_worked_example() {
        let mut history = PoseHistory::new();
        history.insert(sample(0, 0.0, 1.0));
        history.insert(sample(10_000_000, 0.01, 1.0));

        let at_15ms = history.get_at(15_000_000);
        assert!((at_15ms.motion.position.x - 0.015).abs() < 1e-6);
        assert!((at_15ms.motion.linear_velocity.x - 1.0).abs() < 1e-6);

        let at_25ms = history.get_at(25_000_000);
        assert!((at_25ms.motion.position.x - 0.025).abs() < 1e-6);
    }

    #[test]
    fn extrapolation_at_zero_delta_equals_newest() {
        let mut history = PoseHistory::new();
        history.insert(sample(0, 0.0, 1.0));
        history.insert(sample(10_000_000, 0.01, 1.0));
        let at_newest = history.get_at(10_000_000);
        assert_eq!(at_newest.motion.position.x, 0.01);
    }

    #[test]
    fn backward_extrapolation_before_oldest() {
        let mut history = PoseHistory::new();
        history.insert(sample(0, 0.0, 1.0));
        history.insert(sample(10_000_000, 0.01, 1.0));
        let at_minus_5ms = history.get_at(-5_000_000);
        assert!((at_minus_5ms.motion.position.x - (-0.005)).abs() < 1e-6);
    }

    fn view(pose_x: f32) -> TrackingView {
        TrackingView {
            pose: MotionData {
                orientation: Quat::IDENTITY,
                position: Vec3::new(pose_x, 0.0, 0.0),
                linear_velocity: Vec3::ZERO,
                angular_velocity: Vec3::ZERO,
            },
            fov: alvr_common::Fov {
                angle_left: -1.0,
                angle_right: 1.0,
                angle_up: 1.0,
                angle_down: -1.0,
            },
        }
    }

    #[test]
    fn frame_view_history_evicts_oldest_beyond_capacity() {
        let mut history = FrameViewHistory::new();
        for i in 0..(MAX_FRAME_VIEWS as i64 + 5) {
            history.insert(FrameViewSample {
                timestamp: i,
                views: [view(i as f32); 2],
            });
        }
        assert_eq!(history.len(), MAX_FRAME_VIEWS);
        // the oldest 5 samples (timestamps 0..5) were evicted, so the
        // nearest match to 0 is now the oldest surviving sample.
        assert_eq!(history.nearest(0).unwrap().timestamp, 5);
        let newest = MAX_FRAME_VIEWS as i64 + 4;
        assert_eq!(history.nearest(newest).unwrap().timestamp, newest);
    }

    #[test]
    fn frame_view_history_recalls_nearest_sample() {
        let mut history = FrameViewHistory::new();
        history.insert(FrameViewSample {
            timestamp: 0,
            views: [view(0.0); 2],
        });
        history.insert(FrameViewSample {
            timestamp: 10_000_000,
            views: [view(1.0); 2],
        });
        let nearest = history.nearest(9_000_000).unwrap();
        assert_eq!(nearest.timestamp, 10_000_000);
    }
}
