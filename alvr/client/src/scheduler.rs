//! Headset-side device sampling scheduler (spec §4.5): turns a received
//! `tracking_control` pattern into concrete "sample this device at this
//! absolute time" instructions, instead of sampling every device on every
//! frame.

use alvr_common::ids::DeviceId;
use alvr_sockets::TrackingControl;
use std::collections::HashMap;

/// Holds the most recently received pattern, expanding it against a given
/// frame-start time on demand.
#[derive(Default)]
pub struct DeviceSampler {
    predictions: HashMap<DeviceId, Vec<i64>>,
    motions_to_photons: i64,
}

impl DeviceSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, control: &TrackingControl) {
        self.predictions.clear();
        for sample in &control.pattern {
            self.predictions
                .entry(sample.device)
                .or_default()
                .push(sample.prediction_ns);
        }
        self.motions_to_photons = control.motions_to_photons;
    }

    pub fn motions_to_photons(&self) -> i64 {
        self.motions_to_photons
    }

    /// Returns `(device, absolute_sample_time)` pairs for the given
    /// `frame_start` (headset-clock nanoseconds), one per prediction
    /// horizon requested for that device.
    pub fn due_samples(&self, frame_start: i64) -> Vec<(DeviceId, i64)> {
        self.predictions
            .iter()
            .flat_map(|(&device, horizons)| {
                horizons
                    .iter()
                    .map(move |&h| (device, frame_start + h))
            })
            .collect()
    }
}
