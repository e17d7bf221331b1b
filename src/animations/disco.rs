// Disco - LEDs flip color at Poisson-distributed random moments, tuned so
// the whole tree turns over once per duration. Fixed mode walks a random
// permutation with one wheel color per pass; random mode recolors random
// LEDs with random hues.
use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::{
    sample_poisson, Animation, AnimationDescriptor, ParamKind, ParamSpec, Params, SetupError, Tick,
};
use crate::color::{hsv_to_rgb, pack_color, wheel};
use crate::engine::Frame;
use crate::geometry::GeometryStore;

pub static DESCRIPTOR: AnimationDescriptor = AnimationDescriptor {
    name: "disco",
    label: "Disco",
    description: "Random LEDs flip color at a rate set by the duration.",
    params: &[
        ParamSpec {
            name: "color",
            kind: ParamKind::Enum {
                options: &["fixed", "random"],
                default: "random",
            },
        },
        ParamSpec {
            name: "duration",
            kind: ParamKind::Float {
                min: 0.5,
                max: 15.0,
                default: 5.0,
            },
        },
        ParamSpec {
            name: "min_brightness",
            kind: ParamKind::Int {
                min: 0,
                max: 255,
                default: 0,
            },
        },
        ParamSpec {
            name: "max_brightness",
            kind: ParamKind::Int {
                min: 0,
                max: 255,
                default: 255,
            },
        },
    ],
};

enum Mode {
    /// Random permutation, one wheel color per full pass.
    Fixed {
        order: Vec<usize>,
        idx: usize,
        pass: u64,
        color: u32,
    },
    Random,
}

pub struct Disco {
    rng: StdRng,
    state: Option<DiscoState>,
}

struct DiscoState {
    lambda: f64,
    min_brightness: u8,
    max_brightness: u8,
    led_count: usize,
    mode: Mode,
}

impl Disco {
    pub fn new() -> Disco {
        Disco {
            rng: StdRng::from_entropy(),
            state: None,
        }
    }
}

fn pass_color(pass: u64, brightness: u8) -> u32 {
    wheel((((pass + 1) * 40) % 255) as u8, brightness)
}

impl Animation for Disco {
    fn setup(&mut self, params: &Params, geometry: &GeometryStore) -> Result<(), SetupError> {
        let min_brightness = params.get_brightness("min_brightness");
        let max_brightness = params.get_brightness("max_brightness");
        if max_brightness < min_brightness {
            return Err(SetupError::InvalidParams(
                "Max brightness smaller than min brightness".to_string(),
            ));
        }

        let led_count = geometry.len();
        // Flips per frame so the whole tree turns over once per duration
        let lambda = led_count as f64 / (30.0 * params.get_f64("duration"));

        let mode = match params.get_str("color") {
            "fixed" => {
                let mut order: Vec<usize> = (0..led_count).collect();
                order.shuffle(&mut self.rng);
                Mode::Fixed {
                    order,
                    idx: 0,
                    pass: 0,
                    color: pass_color(0, max_brightness),
                }
            }
            _ => Mode::Random,
        };

        self.state = Some(DiscoState {
            lambda,
            min_brightness,
            max_brightness,
            led_count,
            mode,
        });
        Ok(())
    }

    fn tick(&mut self, frame: &mut Frame) -> Result<Tick> {
        let state = match self.state.as_mut() {
            Some(s) => s,
            None => bail!("tick before setup"),
        };
        let n = sample_poisson(&mut self.rng, state.lambda) as usize;

        match &mut state.mode {
            Mode::Fixed {
                order,
                idx,
                pass,
                color,
            } => {
                for _ in 0..n {
                    if *idx >= order.len() {
                        // Permutation exhausted: reshuffle and move the
                        // wheel on, never dropping a draw
                        *pass += 1;
                        *idx = 0;
                        order.shuffle(&mut self.rng);
                        *color = pass_color(*pass, state.max_brightness);
                    }
                    frame.set(order[*idx], *color);
                    *idx += 1;
                }
            }
            Mode::Random => {
                let value = self
                    .rng
                    .gen_range(state.min_brightness..=state.max_brightness)
                    as f64
                    / 255.0;
                let (r, g, b) = hsv_to_rgb(self.rng.gen_range(0.0..360.0), 1.0, value);
                let color = pack_color(r, g, b);
                for _ in 0..n {
                    frame.set(self.rng.gen_range(0..state.led_count), color);
                }
            }
        }
        Ok(Tick::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MockSink;
    use std::collections::HashSet;

    fn geometry(n: usize) -> GeometryStore {
        GeometryStore::new((0..n).map(|i| [0.0, 0.0, i as f64]).collect()).unwrap()
    }

    #[test]
    fn test_brightness_bounds_validated() {
        let mut supplied = Params::defaults(&DESCRIPTOR);
        supplied.insert("min_brightness".into(), serde_json::json!(200));
        supplied.insert("max_brightness".into(), serde_json::json!(100));
        let mut disco = Disco::new();
        let err = disco
            .setup(
                &Params::validate(&DESCRIPTOR, &supplied).unwrap(),
                &geometry(10),
            )
            .unwrap_err();
        assert!(matches!(err, SetupError::InvalidParams(_)));
    }

    #[test]
    fn test_fixed_mode_covers_every_led() {
        let mut supplied = Params::defaults(&DESCRIPTOR);
        supplied.insert("color".into(), serde_json::json!("fixed"));
        let mut disco = Disco::new();
        disco
            .setup(
                &Params::validate(&DESCRIPTOR, &supplied).unwrap(),
                &geometry(100),
            )
            .unwrap();

        // Default duration is 5s; 450 ticks is three full turnovers in
        // expectation, enough that missing an index would mean a dropped
        // draw rather than bad luck.
        let mut sink = MockSink::new(100);
        let mut buffer = vec![0u32; 100];
        for _ in 0..450 {
            let mut frame = Frame::new(&mut buffer, &mut sink);
            disco.tick(&mut frame).unwrap();
        }
        let state = sink.state();
        let state = state.lock().unwrap();
        let touched: HashSet<usize> = state.writes.iter().map(|&(i, _)| i).collect();
        assert_eq!(touched.len(), 100);
    }

    #[test]
    fn test_fixed_mode_single_color_per_pass() {
        let mut supplied = Params::defaults(&DESCRIPTOR);
        supplied.insert("color".into(), serde_json::json!("fixed"));
        let mut disco = Disco::new();
        disco
            .setup(
                &Params::validate(&DESCRIPTOR, &supplied).unwrap(),
                &geometry(50),
            )
            .unwrap();

        let mut sink = MockSink::new(50);
        let mut buffer = vec![0u32; 50];
        for _ in 0..600 {
            let mut frame = Frame::new(&mut buffer, &mut sink);
            disco.tick(&mut frame).unwrap();
        }
        // Multiple passes happened, each with its own wheel color
        let state = sink.state();
        let state = state.lock().unwrap();
        let colors: HashSet<u32> = state.writes.iter().map(|&(_, c)| c).collect();
        assert!(colors.len() >= 2);
    }

    #[test]
    fn test_random_mode_stays_in_range() {
        let mut disco = Disco::new();
        disco
            .setup(
                &Params::validate(&DESCRIPTOR, &Params::defaults(&DESCRIPTOR)).unwrap(),
                &geometry(20),
            )
            .unwrap();
        let mut sink = MockSink::new(20);
        let mut buffer = vec![0u32; 20];
        for _ in 0..100 {
            let mut frame = Frame::new(&mut buffer, &mut sink);
            disco.tick(&mut frame).unwrap();
        }
        let state = sink.state();
        let state = state.lock().unwrap();
        assert!(!state.writes.is_empty());
        assert!(state.writes.iter().all(|&(i, _)| i < 20));
    }
}
