// Geodesic - a wavefront expanding from a random LED along the graph of
// physically adjacent LEDs, using the precomputed geodesic distance
// matrix. Each pass picks a new source and sweeps the distance threshold
// out to the furthest reachable LED.
use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::time::Duration;

use super::{Animation, AnimationDescriptor, ParamKind, ParamSpec, Params, SetupError, Tick};
use crate::calibration::geodesic::load_or_compute;
use crate::color::{ColorMode, OddBlackPolicy};
use crate::engine::Frame;
use crate::geometry::GeometryStore;

pub static DESCRIPTOR: AnimationDescriptor = AnimationDescriptor {
    name: "geodesic",
    label: "Geodesic",
    description: "A wave expanding from a random LED along the tree surface.",
    params: &[
        ParamSpec {
            name: "color",
            kind: ParamKind::Color {
                default: "fixed",
                presets: &["fixed", "rainbow"],
            },
        },
        ParamSpec {
            name: "duration",
            kind: ParamKind::Float {
                min: 1.0,
                max: 15.0,
                default: 3.0,
            },
        },
        ParamSpec {
            name: "k",
            kind: ParamKind::Int {
                min: 6,
                max: 20,
                default: 8,
            },
        },
        ParamSpec {
            name: "brightness",
            kind: ParamKind::Int {
                min: 0,
                max: 255,
                default: 255,
            },
        },
    ],
};

pub struct Geodesic {
    cache_dir: PathBuf,
    rng: StdRng,
    state: Option<GeoState>,
}

struct GeoState {
    dists: Vec<Vec<f64>>,
    color: ColorMode,
    duration: f64,
    iteration: u32,
    // Current wave
    order: Vec<usize>,
    sorted: Vec<f64>,
    max_dist: f64,
    step: f64,
    position: f64,
    idx: usize,
}

impl Geodesic {
    pub fn new(cache_dir: PathBuf) -> Geodesic {
        Geodesic {
            cache_dir,
            rng: StdRng::from_entropy(),
            state: None,
        }
    }
}

impl GeoState {
    /// Pick a new random source and rebuild the sweep over its distance row.
    fn start_wave<R: Rng>(&mut self, rng: &mut R) {
        let source = rng.gen_range(0..self.dists.len());
        let row = &self.dists[source];
        let mut order: Vec<usize> = (0..row.len()).collect();
        order.sort_by(|&a, &b| row[a].total_cmp(&row[b]));
        let sorted: Vec<f64> = order.iter().map(|&i| row[i]).collect();
        // Unreachable LEDs sort to the end and are never activated
        let max_dist = sorted
            .iter()
            .copied()
            .filter(|d| d.is_finite())
            .fold(0.0, f64::max);
        self.step = max_dist / (30.0 * self.duration);
        self.max_dist = max_dist;
        self.order = order;
        self.sorted = sorted;
        self.position = 0.0;
        self.idx = 0;
    }
}

impl Animation for Geodesic {
    fn setup(&mut self, params: &Params, geometry: &GeometryStore) -> Result<(), SetupError> {
        let spec = params.get_str("color");
        let color = ColorMode::resolve(
            spec,
            params.get_brightness("brightness"),
            OddBlackPolicy::LITERAL,
        )
        .ok_or_else(|| SetupError::InvalidColor(spec.to_string()))?;

        let matrix = load_or_compute(&self.cache_dir, geometry, params.get_i64("k") as usize)
            .map_err(|e| SetupError::Geometry(format!("{:#}", e)))?;

        let mut state = GeoState {
            dists: matrix.dists,
            color,
            duration: params.get_f64("duration"),
            iteration: 0,
            order: Vec::new(),
            sorted: Vec::new(),
            max_dist: 0.0,
            step: 0.0,
            position: 0.0,
            idx: 0,
        };
        state.start_wave(&mut self.rng);
        self.state = Some(state);
        Ok(())
    }

    fn tick(&mut self, frame: &mut Frame) -> Result<Tick> {
        let state = match self.state.as_mut() {
            Some(s) => s,
            None => bail!("tick before setup"),
        };
        state.position += state.step;
        while state.idx < state.sorted.len() && state.sorted[state.idx] <= state.position {
            let color = state
                .color
                .color_at(state.position, state.max_dist, state.iteration);
            frame.set(state.order[state.idx], color);
            state.idx += 1;
        }
        if state.position < state.max_dist {
            Ok(Tick::Continue)
        } else {
            state.iteration = state.iteration.wrapping_add(1);
            state.start_wave(&mut self.rng);
            // Let the finished wave linger before the next source lights up
            Ok(Tick::Pause(Duration::from_millis(300)))
        }
    }
}
