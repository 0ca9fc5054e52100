//! Frame pacing (spec §4.6): predicts when the next image will be
//! displayed so the compositor knows when to wake up and render, and
//! tracks a refresh-rate chooser that reacts to sustained app load.

use std::collections::HashMap;

const EWMA_ALPHA: f64 = 0.1;
const WAKE_UP_MARGIN_NS: i64 = 1_000_000;

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePrediction {
    pub frame_id: u64,
    pub wake_up: i64,
    pub target_present: i64,
    pub target_display: i64,
    pub period: i64,
}

struct FrameRecord {
    wake_up: i64,
    delivered: Option<i64>,
}

/// One render target's pacer. Mirrors the original app-pacer's state:
/// running EWMAs of cpu/gpu/compositor time plus a phase-locked display
/// clock.
pub struct FramePacer {
    period_ns: i64,
    compositor_display_time: i64,
    last_display_time: i64,
    cpu_time_ns: f64,
    gpu_time_ns: f64,
    compositor_time_ns: f64,
    counter: u64,
    in_flight: HashMap<u64, FrameRecord>,
}

impl FramePacer {
    pub fn new(period_ns: i64) -> Self {
        Self {
            period_ns,
            compositor_display_time: 0,
            last_display_time: 0,
            cpu_time_ns: 0.0,
            gpu_time_ns: 0.0,
            compositor_time_ns: 0.0,
            counter: 0,
            in_flight: HashMap::new(),
        }
    }

    pub fn set_period(&mut self, period_ns: i64) {
        self.period_ns = period_ns;
    }

    pub fn notify_compositor_display_time(&mut self, t: i64) {
        self.compositor_display_time = t;
    }

    pub fn predict(&mut self, now: i64) -> FramePrediction {
        self.counter += 1;
        let frame_id = self.counter;

        let min_ready = now + self.cpu_time_ns as i64 + self.gpu_time_ns as i64 + self.compositor_time_ns as i64;

        self.last_display_time += self.period_ns;
        self.last_display_time = snap_to_phase(
            self.last_display_time,
            self.compositor_display_time,
            self.period_ns,
        );
        while self.last_display_time < min_ready {
            self.last_display_time += self.period_ns;
        }

        let app_limited = self.cpu_time_ns > self.period_ns as f64
            || self.gpu_time_ns > self.period_ns as f64
            || (min_ready > self.last_display_time
                && min_ready < self.last_display_time + self.period_ns);

        let wake_up = if app_limited {
            now
        } else {
            self.last_display_time
                - (self.cpu_time_ns as i64
                    + self.gpu_time_ns as i64
                    + self.compositor_time_ns as i64
                    + WAKE_UP_MARGIN_NS)
        };

        self.in_flight.insert(frame_id, FrameRecord { wake_up, delivered: None });

        FramePrediction {
            frame_id,
            wake_up,
            target_present: self.last_display_time - self.compositor_time_ns as i64,
            target_display: self.last_display_time,
            period: self.period_ns,
        }
    }

    /// The compositor finished CPU-side work and handed the frame to the
    /// GPU at `delivered`.
    pub fn mark_delivered(&mut self, frame_id: u64, delivered: i64) {
        if let Some(record) = self.in_flight.get_mut(&frame_id) {
            self.cpu_time_ns = lerp(self.cpu_time_ns, (delivered - record.wake_up) as f64, EWMA_ALPHA);
            record.delivered = Some(delivered);
        }
    }

    /// The GPU finished rendering the frame at `gpu_done`.
    pub fn mark_gpu_done(&mut self, frame_id: u64, gpu_done: i64) {
        if let Some(record) = self.in_flight.remove(&frame_id) {
            if let Some(delivered) = record.delivered {
                self.gpu_time_ns = lerp(self.gpu_time_ns, (gpu_done - delivered) as f64, EWMA_ALPHA);
            }
        }
    }

    pub fn frame_time_ns(&self) -> f64 {
        self.cpu_time_ns.max(self.gpu_time_ns)
    }
}

fn snap_to_phase(t: i64, phase_reference: i64, period: i64) -> i64 {
    if period == 0 {
        return t;
    }
    let offset = (t - phase_reference).rem_euclid(period);
    t - offset
}

/// One pacer per connected app; exposes the slowest app's frame time so
/// the refresh-rate chooser can react.
#[derive(Default)]
pub struct PacerFactory {
    pacers: HashMap<u64, FramePacer>,
}

impl PacerFactory {
    pub fn get_or_create(&mut self, app_id: u64, period_ns: i64) -> &mut FramePacer {
        self.pacers
            .entry(app_id)
            .or_insert_with(|| FramePacer::new(period_ns))
    }

    pub fn remove(&mut self, app_id: u64) {
        self.pacers.remove(&app_id);
    }

    pub fn get_frame_time_ns(&self) -> f64 {
        self.pacers
            .values()
            .map(FramePacer::frame_time_ns)
            .fold(0.0, f64::max)
    }
}

/// Picks the highest advertised refresh rate that keeps up with demand,
/// with hysteresis favoring the currently-chosen rate (spec §4.6).
#[derive(Default)]
pub struct RefreshRateChooser {
    current: Option<f32>,
}

impl RefreshRateChooser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `Some(fps)` if the chosen rate changed.
    pub fn choose(&mut self, advertised: &[f32], min_refresh: f32, frame_time_ns: f64) -> Option<f32> {
        if frame_time_ns <= 0.0 {
            return None;
        }
        let app_rate = 1.0e9 / frame_time_ns;

        let mut best: Option<f32> = None;
        for &rate in advertised {
            if rate < min_refresh {
                continue;
            }
            let hysteresis = if self.current == Some(rate) { 1.0 } else { 0.9 };
            if (rate as f64) <= app_rate * hysteresis && best.map_or(true, |b| rate > b) {
                best = Some(rate);
            }
        }

        if best.is_some() && best != self.current {
            self.current = best;
            best
        } else {
            None
        }
    }
}
