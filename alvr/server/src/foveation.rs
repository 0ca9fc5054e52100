//! Foveation parameter computation (spec §4.8): per-eye, per-axis tables
//! mapping destination (foveated) pixel indices to source pixel counts,
//! concentrated around the gaze point.
//!
//! The boundary-value solve and discrete-table packing are ported from
//! `original_source/server/driver/wivrn_foveation.cpp`'s `solve_foveation`
//! and `fill_param_2d`, which the distilled spec only describes in prose.

use alvr_common::glam::Quat;
use alvr_common::Fov;
use alvr_sockets::FoveationTable;

/// `foveate(u) = λ/a · tan(a·u + b) + c`.
fn foveate(a: f64, b: f64, lambda: f64, c: f64, u: f64) -> f64 {
    if a.abs() < 1e-12 {
        lambda * u + c
    } else {
        lambda / a * (a * u + b).tan() + c
    }
}

/// Solves for `(a, b)` such that `foveate(-1) = -1`, `foveate(1) = 1`, and
/// the pixel ratio at the fovea is 1:1. `eq(a)` starts positive, has a
/// single root, then runs to `-∞`; bisect to bracket it, then refine with
/// secant iteration.
fn solve_foveation(lambda: f64, c: f64) -> (f64, f64) {
    let b_of = |a: f64| (a * (1.0 - c) / lambda).atan() - a;
    let eq = |a: f64| (a * (1.0 - c) / lambda).atan() + (a * (1.0 + c) / lambda).atan() - 2.0 * a;

    let mut a0 = 0.0;
    let mut a1 = 1.0;
    while eq(a1) > 0.0 {
        a1 *= 2.0;
    }

    let mut f_a0: Option<f64> = None;
    let mut f_a1 = eq(a1);
    let mut a = 0.0;
    let mut iterations = 0;
    while (a1 - a0).abs() > 1e-7 && iterations < 100 {
        iterations += 1;
        match f_a0 {
            None => {
                a = 0.5 * (a0 + a1);
                let val = eq(a);
                if val > 0.0 {
                    a0 = a;
                    f_a0 = Some(val);
                } else {
                    a1 = a;
                    f_a1 = val;
                }
            }
            Some(fa0) => {
                a = a1 - f_a1 * (a1 - a0) / (f_a1 - fa0);
                a0 = a1;
                a1 = a;
                f_a0 = Some(f_a1);
                f_a1 = eq(a);
            }
        }
    }

    (a, b_of(a))
}

/// Builds the run-length "counts per ratio" table for one axis: index `i`
/// holds how many destination pixels use source-pixel ratio `i+1` (in the
/// half closest to center first). Ratios strictly increase going outward,
/// guaranteeing encoder/decoder pixel-grid alignment.
pub fn build_axis_table(gaze_center: f64, foveated_dim: usize, source_dim: usize) -> Vec<u16> {
    if foveated_dim >= source_dim {
        return vec![source_dim as u16];
    }

    let scale = foveated_dim as f64 / source_dim as f64;
    let (a, b) = solve_foveation(scale, gaze_center);

    let mut last: u16 = 0;
    let mut left: Vec<u16> = Vec::new();
    let mut right: Vec<u16> = Vec::new();

    for i in 1..foveated_dim {
        let u = (i as f64 * 2.0) / foveated_dim as f64 - 1.0;
        let f = foveate(a, b, scale, gaze_center, u);
        let n = (((f * 0.5 + 0.5) * source_dim as f64 + 0.5) as i64).clamp(0, source_dim as i64) as u16;
        let count = n.saturating_sub(last).max(1) as usize;
        let bucket = if u < gaze_center { &mut left } else { &mut right };
        if count > bucket.len() {
            bucket.resize(count, 0);
        }
        bucket[count - 1] += 1;
        last = n;
    }

    let tail = (source_dim as u16).saturating_sub(last).max(1) as usize;
    if tail > right.len() {
        right.resize(tail, 0);
    }
    right[tail - 1] += 1;

    let count = left.len().max(right.len());
    let mut out = vec![0u16; count - left.len()];
    out.extend(left.iter().rev());
    if !right.is_empty() {
        *out.last_mut().unwrap() += right[0];
    }
    if right.len() > 1 {
        out.extend(&right[1..]);
    }
    out.resize(count * 2 - 1, 0);
    out
}

// --- gaze derivation, ported from the same file's `yaw_pitch` /
// `angles_to_center` / `convergence_angle` helpers ---

fn yaw_pitch(q: Quat) -> (f32, f32) {
    let sine_theta = (-2.0 * (q.y * q.z - q.w * q.x)).clamp(-1.0, 1.0);
    let pitch = sine_theta.asin();

    if sine_theta.abs() > 0.99999 {
        let scale = sine_theta.signum() * 2.0;
        (scale * (-q.z).atan2(q.w), pitch)
    } else {
        (
            (2.0 * (q.x * q.z + q.w * q.y)).atan2(q.w * q.w - q.x * q.x - q.y * q.y + q.z * q.z),
            pitch,
        )
    }
}

fn angles_to_center(e: f32, l: f32, r: f32) -> f32 {
    (e - l) / (r - l) * 2.0 - 1.0
}

/// Simulated convergence distance used to correct the per-eye X offset so
/// both eyes agree on where in world-space the gaze point is.
const CONVERGENCE_DISTANCE_M: f32 = 0.5;

fn convergence_angle(eye_x: f32, gaze_yaw: f32) -> f32 {
    let b = CONVERGENCE_DISTANCE_M * gaze_yaw.sin() - eye_x;
    (b / CONVERGENCE_DISTANCE_M).asin()
}

/// Derives one view's normalized gaze center `(x, y) ∈ [-1, 1]²` from head
/// orientation, eye-gaze orientation (both head-relative), this view's
/// orientation/position and FOV.
pub fn gaze_center(
    gaze_relative_to_head: Quat,
    view_orientation: Quat,
    view_position_x: f32,
    fov: Fov,
) -> (f32, f32) {
    let gaze = yaw_pitch(gaze_relative_to_head);
    let view = yaw_pitch(view_orientation);

    let angle_x = convergence_angle(view_position_x, gaze.0);
    let x = angles_to_center(view.0 + angle_x, fov.angle_left, fov.angle_right);

    let offset_y = (fov.angle_down + fov.angle_up) / 2.0;
    let y = angles_to_center(-view.1 - gaze.1, fov.angle_up, fov.angle_down) + offset_y;

    (x, y)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CacheKey {
    flip_y: bool,
    gaze: [(f32, f32); 2],
    source_dims: [(u32, u32); 2],
    foveated_dims: (u32, u32),
}

/// Recomputes the per-eye tables only when the inputs actually changed,
/// matching `update_foveation_buffer`'s "return `None`, reuse the previous
/// upload" contract (minus the GPU copy-command recording, which belongs
/// to the render backend, not this crate).
#[derive(Default)]
pub struct FoveationComputer {
    last: Option<CacheKey>,
}

impl FoveationComputer {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        flip_y: bool,
        gaze: [(f32, f32); 2],
        source_dims: [(u32, u32); 2],
        foveated_dims: (u32, u32),
    ) -> Option<[FoveationTable; 2]> {
        let key = CacheKey {
            flip_y,
            gaze,
            source_dims,
            foveated_dims,
        };
        if self.last == Some(key) {
            return None;
        }
        self.last = Some(key);

        let tables = std::array::from_fn(|view| FoveationTable {
            x: build_axis_table(
                gaze[view].0 as f64,
                foveated_dims.0 as usize,
                source_dims[view].0 as usize,
            ),
            y: build_axis_table(
                gaze[view].1 as f64,
                foveated_dims.1 as usize,
                source_dims[view].1 as usize,
            ),
        });
        Some(tables)
    }
}
