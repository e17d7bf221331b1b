// Snow - falling balls of light that leave fading trails. Each ball drops
// along the cone surface at its own speed; LEDs it passes latch the ball's
// color and decay back to black over the fade time.
use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

use super::{
    sample_normal, Animation, AnimationDescriptor, ParamKind, ParamSpec, Params, SetupError, Tick,
};
use crate::color::{pack_color, parse_color_spec, unpack_color, ColorMode, OddBlackPolicy};
use crate::engine::Frame;
use crate::geometry::GeometryStore;

pub static DESCRIPTOR: AnimationDescriptor = AnimationDescriptor {
    name: "snow",
    label: "Snow",
    description: "Falling balls of light with fading trails.",
    params: &[
        ParamSpec {
            name: "color",
            kind: ParamKind::Color {
                default: "255,255,255",
                presets: &["fixed", "rainbow"],
            },
        },
        ParamSpec {
            name: "brightness",
            kind: ParamKind::Int {
                min: 0,
                max: 255,
                default: 150,
            },
        },
        ParamSpec {
            name: "background",
            kind: ParamKind::Color {
                default: "0,0,0",
                presets: &[],
            },
        },
        ParamSpec {
            name: "back_brightness",
            kind: ParamKind::Int {
                min: 0,
                max: 255,
                default: 0,
            },
        },
        ParamSpec {
            name: "speed",
            kind: ParamKind::Int {
                min: 1,
                max: 25,
                default: 6,
            },
        },
        ParamSpec {
            name: "speed_std",
            kind: ParamKind::Int {
                min: 0,
                max: 8,
                default: 3,
            },
        },
        ParamSpec {
            name: "radius",
            kind: ParamKind::Int {
                min: 5,
                max: 60,
                default: 33,
            },
        },
        ParamSpec {
            name: "randomness",
            kind: ParamKind::Int {
                min: 0,
                max: 20,
                default: 6,
            },
        },
        ParamSpec {
            name: "amount",
            kind: ParamKind::Int {
                min: 1,
                max: 15,
                default: 5,
            },
        },
        ParamSpec {
            name: "fade",
            kind: ParamKind::Float {
                min: 0.0,
                max: 1.0,
                default: 0.2,
            },
        },
    ],
};

/// Per-LED latched color with multiplicative decay. fade = 0 latches the
/// color permanently (used for the background fill).
struct LedFade {
    r: u8,
    g: u8,
    b: u8,
    fade: f64,
    time: f64,
    fading: bool,
}

impl LedFade {
    fn new(color: u32) -> LedFade {
        let (r, g, b) = unpack_color(color);
        LedFade {
            r,
            g,
            b,
            fade: 0.0,
            time: 0.0,
            fading: false,
        }
    }

    fn set(&mut self, color: u32, fade: f64) {
        let (r, g, b) = unpack_color(color);
        self.r = r;
        self.g = g;
        self.b = b;
        self.fade = fade;
        self.time = 0.0;
        self.fading = fade > 0.0;
    }

    fn update(&mut self, dt: f64) {
        if !self.fading {
            return;
        }
        self.time += dt;
        if self.time > self.fade {
            self.fading = false;
            self.r = 0;
            self.g = 0;
            self.b = 0;
        } else {
            let f = 1.0 - dt / self.fade;
            self.r = (self.r as f64 * f) as u8;
            self.g = (self.g as f64 * f) as u8;
            self.b = (self.b as f64 * f) as u8;
        }
    }

    fn color(&self) -> u32 {
        pack_color(self.r, self.g, self.b)
    }
}

struct Snowball {
    idx: u32,
    radius_sq: f64,
    phi: f64,
    z: f64,
    speed: f64,
}

pub struct Snow {
    state: Option<SnowState>,
    rng: StdRng,
}

struct SnowState {
    color: ColorMode,
    speed: f64,
    speed_std: f64,
    radius: f64,
    randomness: f64,
    amount: usize,
    fade: f64,
    top: f64,
    bottom: f64,
    base_radius: f64,
    points: Vec<[f64; 3]>,
    states: Vec<LedFade>,
    balls: Vec<Snowball>,
    next_idx: u32,
}

impl Snow {
    pub fn new() -> Snow {
        Snow {
            state: None,
            rng: StdRng::from_entropy(),
        }
    }
}

impl Animation for Snow {
    fn setup(&mut self, params: &Params, geometry: &GeometryStore) -> Result<(), SetupError> {
        let color_spec = params.get_str("color");
        let color = ColorMode::resolve(
            color_spec,
            params.get_brightness("brightness"),
            OddBlackPolicy::NEVER,
        )
        .ok_or_else(|| SetupError::InvalidColor(color_spec.to_string()))?;

        let background_spec = params.get_str("background");
        let background =
            parse_color_spec(background_spec, params.get_brightness("back_brightness"))
                .ok_or_else(|| SetupError::InvalidColor(background_spec.to_string()))?;

        let radius = params.get_i64("radius") as f64;
        let randomness = params.get_i64("randomness") as f64;
        // Balls spawn above the tree and fall until fully below it
        let top = geometry.max_z() + radius + randomness;
        let bottom = geometry.min_z() - 2.0 * radius;
        let base_radius = geometry
            .cylindrical_radius()
            .iter()
            .copied()
            .fold(0.0, f64::max);

        self.state = Some(SnowState {
            color,
            speed: params.get_i64("speed") as f64,
            speed_std: params.get_i64("speed_std") as f64,
            radius,
            randomness,
            amount: params.get_i64("amount") as usize,
            fade: params.get_f64("fade"),
            top,
            bottom,
            base_radius,
            points: geometry.points().to_vec(),
            states: (0..geometry.len()).map(|_| LedFade::new(background)).collect(),
            balls: Vec::new(),
            next_idx: 0,
        });
        Ok(())
    }

    fn tick(&mut self, frame: &mut Frame) -> Result<Tick> {
        let state = match self.state.as_mut() {
            Some(s) => s,
            None => bail!("tick before setup"),
        };

        if state.balls.len() < state.amount {
            let radius = sample_normal(&mut self.rng, state.radius, state.randomness).max(5.0);
            let speed = sample_normal(&mut self.rng, state.speed, state.speed_std).max(1.0);
            state.balls.push(Snowball {
                idx: state.next_idx,
                radius_sq: radius * radius,
                phi: self.rng.gen_range(0.0..2.0 * PI),
                z: state.top,
                speed,
            });
            state.next_idx = (state.next_idx + 1) % 1000;
        }

        for ball in &mut state.balls {
            ball.z -= ball.speed;
            // The ball tracks the cone surface on its way down
            let r = state.base_radius * (((state.top - ball.z) / state.top).max(0.0)).sqrt();
            let x = r * ball.phi.cos();
            let y = r * ball.phi.sin();
            let color = state.color.color_at(ball.z, state.top, ball.idx);
            for (i, p) in state.points.iter().enumerate() {
                let dx = x - p[0];
                let dy = y - p[1];
                let dz = ball.z - p[2];
                if dx * dx + dy * dy + dz * dz < ball.radius_sq {
                    state.states[i].set(color, state.fade);
                }
            }
        }
        let bottom = state.bottom;
        state.balls.retain(|b| b.z >= bottom);

        for (i, led) in state.states.iter_mut().enumerate() {
            led.update(1.0 / 30.0);
            frame.set(i, led.color());
        }
        Ok(Tick::Continue)
    }
}
