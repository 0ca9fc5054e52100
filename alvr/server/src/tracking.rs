//! Host-side tracking controller (spec §4.5): compresses "which devices
//! to sample, at what prediction horizons" into one periodic
//! `tracking_control` packet instead of streaming every device every
//! frame.

use alvr_common::ids::DeviceId;
use alvr_sockets::{TrackingControl, TrackingControlSample};
use std::collections::HashMap;

const HIGH_FREQUENCY_STEP_NS: i64 = 3_000_000;
const MAX_EXTRAPOLATION_NS: i64 = 50_000_000;

#[derive(Debug, Clone, Copy, Default)]
struct Window {
    min_prediction: i64,
    max_prediction: i64,
}

#[derive(Default)]
pub struct TrackingController {
    windows: HashMap<DeviceId, Window>,
    motions_to_photons: i64,
}

impl TrackingController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called whenever the render side reads `device`'s pose for display
    /// time `predicted_t_host`, itself queried at `now_host`.
    /// `produced_t_host`, when known, updates the global
    /// `motions_to_photons` estimate.
    ///
    /// The first request ever seen for a device can't wait for the next
    /// periodic `resolve()` — the headset wouldn't sample it at all until
    /// then. Returns an immediate single-sample pattern to send out of
    /// band in that case.
    pub fn add_request(
        &mut self,
        device: DeviceId,
        now_host: i64,
        predicted_t_host: i64,
        produced_t_host: Option<i64>,
    ) -> Option<TrackingControl> {
        let prediction = predicted_t_host - now_host;
        let first_sight = !self.windows.contains_key(&device);
        let window = self.windows.entry(device).or_insert(Window {
            min_prediction: prediction,
            max_prediction: prediction,
        });
        window.min_prediction = window.min_prediction.min(prediction);
        window.max_prediction = window.max_prediction.max(prediction);

        if let Some(produced) = produced_t_host {
            self.motions_to_photons = predicted_t_host - produced;
        }

        if first_sight {
            Some(TrackingControl {
                pattern: vec![TrackingControlSample {
                    device,
                    prediction_ns: prediction.clamp(0, MAX_EXTRAPOLATION_NS),
                }],
                motions_to_photons: self.motions_to_photons,
            })
        } else {
            None
        }
    }

    /// Emitted roughly every second: a `tracking_control` pattern that
    /// tells the headset, per device, which prediction horizons to
    /// sample at before the next resolution.
    pub fn resolve(&mut self, frame_duration: i64, tracking_latency: i64) -> TrackingControl {
        let mut pattern = Vec::new();

        for (&device, &window) in &self.windows {
            if device.is_face() {
                pattern.push(TrackingControlSample {
                    device,
                    prediction_ns: 0,
                });
                continue;
            }

            let step = if device.is_high_frequency() {
                HIGH_FREQUENCY_STEP_NS
            } else {
                frame_duration.max(1)
            };

            let lo = (window.min_prediction + tracking_latency).clamp(0, MAX_EXTRAPOLATION_NS);
            let hi = (window.max_prediction + tracking_latency).clamp(0, MAX_EXTRAPOLATION_NS);

            let mut t = lo;
            loop {
                pattern.push(TrackingControlSample {
                    device,
                    prediction_ns: t,
                });
                if t >= hi {
                    break;
                }
                t = (t + step).min(hi);
            }
        }

        self.windows.clear();

        TrackingControl {
            pattern,
            motions_to_photons: self.motions_to_photons,
        }
    }
}
