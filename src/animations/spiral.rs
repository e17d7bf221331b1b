// Spiral family - a point winding up a helix fitted to the tree cone.
// The spiral animation lights a moving band around the point (with an
// optional chase background that leaves a trail); the snake animation runs
// several staggered points up the helix at once.
use anyhow::{bail, Result};
use std::f64::consts::PI;

use super::{Animation, AnimationDescriptor, ParamKind, ParamSpec, Params, SetupError, Tick};
use crate::color::{adjust_brightness, parse_color_spec, ColorMode, OddBlackPolicy};
use crate::engine::Frame;
use crate::geometry::GeometryStore;

pub static SPIRAL: AnimationDescriptor = AnimationDescriptor {
    name: "spiral",
    label: "Spiral",
    description: "A glowing band winding up a helix around the tree.",
    params: &[
        ParamSpec {
            name: "color",
            kind: ParamKind::Color {
                default: "255,0,0",
                presets: &["fixed", "rainbow"],
            },
        },
        ParamSpec {
            name: "background",
            kind: ParamKind::Color {
                default: "0,0,0",
                presets: &["chase"],
            },
        },
        DURATION_PARAM,
        ParamSpec {
            name: "brightness",
            kind: ParamKind::Int {
                min: 0,
                max: 255,
                default: 255,
            },
        },
        ParamSpec {
            name: "back_brightness",
            kind: ParamKind::Int {
                min: 0,
                max: 255,
                default: 255,
            },
        },
        RADIUS_PARAM,
        INCLINATION_PARAM,
        ParamSpec {
            name: "invert",
            kind: ParamKind::Bool { default: false },
        },
    ],
};

pub static SNAKE: AnimationDescriptor = AnimationDescriptor {
    name: "snake",
    label: "Snake",
    description: "Several points chasing each other up the helix.",
    params: &[
        ParamSpec {
            name: "color",
            kind: ParamKind::Color {
                default: "255,0,0",
                presets: &["fixed", "rainbow"],
            },
        },
        DURATION_PARAM,
        ParamSpec {
            name: "brightness",
            kind: ParamKind::Int {
                min: 0,
                max: 255,
                default: 255,
            },
        },
        RADIUS_PARAM,
        INCLINATION_PARAM,
        ParamSpec {
            name: "amount",
            kind: ParamKind::Int {
                min: 1,
                max: 10,
                default: 4,
            },
        },
    ],
};

const DURATION_PARAM: ParamSpec = ParamSpec {
    name: "duration",
    kind: ParamKind::Float {
        min: 1.0,
        max: 15.0,
        default: 3.0,
    },
};
const RADIUS_PARAM: ParamSpec = ParamSpec {
    name: "radius",
    kind: ParamKind::Int {
        min: 10,
        max: 100,
        default: 50,
    },
};
const INCLINATION_PARAM: ParamSpec = ParamSpec {
    name: "inclination",
    kind: ParamKind::Float {
        min: 0.25,
        max: 3.0,
        default: 1.75,
    },
};

/// The helix fitted to the tree cone: phase winds around the trunk while
/// climbing, and the orbit radius shrinks toward the top following the
/// cone surface.
struct Helix {
    radius: f64,
    base_radius: f64,
    height: f64,
    vert_step: f64,
    max_phase: f64,
}

impl Helix {
    fn new(geometry: &GeometryStore, radius: f64, inclination: f64) -> Helix {
        let height = geometry.max_z();
        let base_radius = geometry
            .cylindrical_radius()
            .iter()
            .copied()
            .fold(0.0, f64::max);
        Helix {
            radius,
            base_radius,
            height,
            vert_step: inclination,
            max_phase: (height / (inclination * radius)) * 2.0 * PI,
        }
    }

    fn point(&self, phase: f64) -> [f64; 3] {
        let z = phase / (2.0 * PI) * self.vert_step * self.radius;
        let r = self.base_radius * (((self.height - z) / self.height).max(0.0)).sqrt();
        [r * phase.cos(), r * phase.sin(), z]
    }
}

fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

enum Background {
    /// Only paint the band; earlier colors stay lit behind it.
    Chase,
    Solid(u32),
}

pub struct Spiral {
    state: Option<SpiralState>,
}

struct SpiralState {
    helix: Helix,
    color: ColorMode,
    background: Background,
    phase: f64,
    init_phase: f64,
    step: f64,
    iteration: u32,
    points: Vec<[f64; 3]>,
}

impl Spiral {
    pub fn new() -> Spiral {
        Spiral { state: None }
    }
}

impl Animation for Spiral {
    fn setup(&mut self, params: &Params, geometry: &GeometryStore) -> Result<(), SetupError> {
        let color_spec = params.get_str("color");
        let color = ColorMode::resolve(
            color_spec,
            params.get_brightness("brightness"),
            OddBlackPolicy::NEVER,
        )
        .ok_or_else(|| SetupError::InvalidColor(color_spec.to_string()))?;

        let background = match params.get_str("background") {
            "chase" => {
                if !matches!(color_spec, "fixed" | "rainbow") {
                    return Err(SetupError::InvalidParams(
                        "Cannot play chase animation with static color.".to_string(),
                    ));
                }
                Background::Chase
            }
            spec => Background::Solid(
                parse_color_spec(spec, params.get_brightness("back_brightness"))
                    .ok_or_else(|| SetupError::InvalidColor(spec.to_string()))?,
            ),
        };

        let helix = Helix::new(geometry, params.get_i64("radius") as f64, params.get_f64("inclination"));
        let mut step = helix.max_phase / (30.0 * params.get_f64("duration"));
        let init_phase = if params.get_bool("invert") {
            step = -step;
            helix.max_phase
        } else {
            0.0
        };

        self.state = Some(SpiralState {
            phase: init_phase,
            init_phase,
            step,
            iteration: 0,
            color,
            background,
            helix,
            points: geometry.points().to_vec(),
        });
        Ok(())
    }

    fn tick(&mut self, frame: &mut Frame) -> Result<Tick> {
        let state = match self.state.as_mut() {
            Some(s) => s,
            None => bail!("tick before setup"),
        };
        state.phase += state.step;
        let loc = state.helix.point(state.phase);
        let color = state
            .color
            .color_at(state.phase, state.helix.max_phase, state.iteration);
        let radius = state.helix.radius;

        match state.background {
            Background::Chase => {
                for (i, &p) in state.points.iter().enumerate() {
                    if distance(loc, p) < radius {
                        frame.set(i, color);
                    }
                }
            }
            Background::Solid(background) => {
                for (i, &p) in state.points.iter().enumerate() {
                    let d = distance(loc, p);
                    if d > radius * 1.5 {
                        frame.set(i, background);
                    } else if d < radius * 0.5 {
                        frame.set(i, color);
                    } else {
                        // Soft edge between the band and the background
                        let falloff = (255.0 * (1.5 - d / radius)).clamp(0.0, 255.0);
                        frame.set(i, adjust_brightness(color, falloff as u8));
                    }
                }
            }
        }

        if state.phase < 0.0 || state.phase > state.helix.max_phase {
            state.iteration = state.iteration.wrapping_add(1);
            state.phase = state.init_phase;
        }
        Ok(Tick::Continue)
    }
}

struct Crawler {
    idx: u32,
    phase: f64,
}

pub struct Snake {
    state: Option<SnakeState>,
}

struct SnakeState {
    helix: Helix,
    color: ColorMode,
    step: f64,
    spawn_gap: f64,
    amount: usize,
    crawlers: Vec<Crawler>,
    next_idx: u32,
    points: Vec<[f64; 3]>,
}

impl Snake {
    pub fn new() -> Snake {
        Snake { state: None }
    }
}

impl Animation for Snake {
    fn setup(&mut self, params: &Params, geometry: &GeometryStore) -> Result<(), SetupError> {
        let color_spec = params.get_str("color");
        let color = ColorMode::resolve(
            color_spec,
            params.get_brightness("brightness"),
            OddBlackPolicy::NEVER,
        )
        .ok_or_else(|| SetupError::InvalidColor(color_spec.to_string()))?;

        let helix = Helix::new(geometry, params.get_i64("radius") as f64, params.get_f64("inclination"));
        let amount = params.get_i64("amount") as usize;
        self.state = Some(SnakeState {
            step: helix.max_phase / (30.0 * params.get_f64("duration")),
            spawn_gap: helix.max_phase / amount as f64,
            amount,
            crawlers: vec![Crawler { idx: 0, phase: 0.0 }],
            next_idx: 1,
            color,
            helix,
            points: geometry.points().to_vec(),
        });
        Ok(())
    }

    fn tick(&mut self, frame: &mut Frame) -> Result<Tick> {
        let state = match self.state.as_mut() {
            Some(s) => s,
            None => bail!("tick before setup"),
        };

        let spawn = match state.crawlers.last() {
            None => true,
            Some(last) => last.phase > state.spawn_gap && state.crawlers.len() < state.amount,
        };
        if spawn {
            state.crawlers.push(Crawler {
                idx: state.next_idx,
                phase: 0.0,
            });
            // Keep the wheel offset from growing without bound
            state.next_idx = (state.next_idx + 1) % 1000;
        }

        for crawler in &mut state.crawlers {
            crawler.phase += state.step;
            let loc = state.helix.point(crawler.phase);
            let color = state
                .color
                .color_at(crawler.phase, state.helix.max_phase, crawler.idx);
            let radius = state.helix.radius;
            for (i, &p) in state.points.iter().enumerate() {
                if distance(loc, p) < radius {
                    frame.set(i, color);
                }
            }
        }
        let max_phase = state.helix.max_phase;
        state.crawlers.retain(|c| c.phase <= max_phase);
        Ok(Tick::Continue)
    }
}
