// Sweep family - a moving threshold over some scalar projection of the
// LED coordinates. Vertical and horizontal sweeps, the rotating plane and
// the expanding sphere all share the same core: sort the LEDs along the
// projection, advance the threshold a fixed step per frame, and activate
// every LED the threshold has passed.
use anyhow::{bail, Result};
use std::f64::consts::PI;

use super::{Animation, AnimationDescriptor, ParamKind, ParamSpec, Params, SetupError, Tick};
use crate::color::{ColorMode, OddBlackPolicy};
use crate::engine::Frame;
use crate::geometry::GeometryStore;

pub static SWEEP_VERT: AnimationDescriptor = AnimationDescriptor {
    name: "sweep_vert",
    label: "Vertical sweep",
    description: "A color front sweeping down (or up) the tree.",
    params: &[
        COLOR_PARAM,
        DURATION_PARAM,
        INVERT_PARAM,
        BRIGHTNESS_PARAM,
    ],
};

pub static SWEEP_HORIZ: AnimationDescriptor = AnimationDescriptor {
    name: "sweep_horiz",
    label: "Horizontal sweep",
    description: "A color front sweeping across the tree at a chosen angle.",
    params: &[
        COLOR_PARAM,
        DURATION_PARAM,
        INVERT_PARAM,
        BRIGHTNESS_PARAM,
        ParamSpec {
            name: "angle",
            kind: ParamKind::Int {
                min: 0,
                max: 360,
                default: 0,
            },
        },
    ],
};

pub static ROTATE: AnimationDescriptor = AnimationDescriptor {
    name: "rotate",
    label: "Rotate",
    description: "A color front rotating around the trunk.",
    params: &[
        COLOR_PARAM,
        DURATION_PARAM,
        INVERT_PARAM,
        BRIGHTNESS_PARAM,
    ],
};

pub static SPHERE: AnimationDescriptor = AnimationDescriptor {
    name: "sphere",
    label: "Sphere",
    description: "A color front expanding as a sphere from the center.",
    params: &[
        COLOR_PARAM,
        DURATION_PARAM,
        INVERT_PARAM,
        BRIGHTNESS_PARAM,
    ],
};

const COLOR_PARAM: ParamSpec = ParamSpec {
    name: "color",
    kind: ParamKind::Color {
        default: "255,0,0",
        presets: &["fixed", "rainbow"],
    },
};
const DURATION_PARAM: ParamSpec = ParamSpec {
    name: "duration",
    kind: ParamKind::Float {
        min: 1.0,
        max: 15.0,
        default: 3.0,
    },
};
const INVERT_PARAM: ParamSpec = ParamSpec {
    name: "invert",
    kind: ParamKind::Bool { default: false },
};
const BRIGHTNESS_PARAM: ParamSpec = ParamSpec {
    name: "brightness",
    kind: ParamKind::Int {
        min: 0,
        max: 255,
        default: 255,
    },
};

enum Restart {
    /// Restart once every LED has been activated.
    OnExhaust,
    /// Restart once the threshold leaves this half-open range (rotate,
    /// whose threshold range is fixed at a full turn regardless of where
    /// the LEDs sit).
    OutsideRange(f64, f64),
}

struct SweepCore {
    order: Vec<usize>,
    values: Vec<f64>,
    threshold: f64,
    init: f64,
    step: f64,
    progress_max: f64,
    ascending: bool,
    restart: Restart,
    idx: usize,
    iteration: u32,
    color: ColorMode,
}

impl SweepCore {
    #[allow(clippy::too_many_arguments)]
    fn new(
        values_by_led: &[f64],
        ascending: bool,
        init: f64,
        end: f64,
        duration: f64,
        progress_max: f64,
        color: ColorMode,
        restart: Restart,
    ) -> SweepCore {
        let mut order: Vec<usize> = (0..values_by_led.len()).collect();
        order.sort_by(|&a, &b| {
            let cmp = values_by_led[a].total_cmp(&values_by_led[b]);
            if ascending {
                cmp
            } else {
                cmp.reverse()
            }
        });
        let values: Vec<f64> = order.iter().map(|&i| values_by_led[i]).collect();

        let magnitude = (init - end).abs() / (30.0 * duration);
        let step = if ascending { magnitude } else { -magnitude };

        SweepCore {
            order,
            values,
            threshold: init,
            init,
            step,
            progress_max,
            ascending,
            restart,
            idx: 0,
            iteration: 0,
            color,
        }
    }

    fn passed(&self, value: f64) -> bool {
        if self.ascending {
            value <= self.threshold
        } else {
            value >= self.threshold
        }
    }

    fn tick(&mut self, frame: &mut Frame) {
        self.threshold += self.step;
        while self.idx < self.order.len() && self.passed(self.values[self.idx]) {
            let color = self
                .color
                .color_at(self.threshold, self.progress_max, self.iteration);
            frame.set(self.order[self.idx], color);
            self.idx += 1;
        }
        let done = match self.restart {
            Restart::OnExhaust => self.idx >= self.order.len(),
            Restart::OutsideRange(lo, hi) => self.threshold < lo || self.threshold >= hi,
        };
        if done {
            self.iteration = self.iteration.wrapping_add(1);
            self.idx = 0;
            self.threshold = self.init;
        }
    }
}

fn resolve_color(params: &Params) -> Result<ColorMode, SetupError> {
    let spec = params.get_str("color");
    ColorMode::resolve(
        spec,
        params.get_brightness("brightness"),
        OddBlackPolicy::LITERAL,
    )
    .ok_or_else(|| SetupError::InvalidColor(spec.to_string()))
}

enum SweepAxis {
    Vertical,
    Horizontal,
}

pub struct Sweep {
    axis: SweepAxis,
    core: Option<SweepCore>,
}

impl Sweep {
    pub fn vertical() -> Sweep {
        Sweep {
            axis: SweepAxis::Vertical,
            core: None,
        }
    }

    pub fn horizontal() -> Sweep {
        Sweep {
            axis: SweepAxis::Horizontal,
            core: None,
        }
    }

    #[cfg(test)]
    fn iteration(&self) -> u32 {
        self.core.as_ref().map_or(0, |c| c.iteration)
    }
}

impl Animation for Sweep {
    fn setup(&mut self, params: &Params, geometry: &GeometryStore) -> Result<(), SetupError> {
        let values = match self.axis {
            SweepAxis::Vertical => geometry.z(),
            SweepAxis::Horizontal => geometry.axis_projection(params.get_i64("angle") as f64),
        };
        let min = values.iter().copied().fold(f64::MAX, f64::min);
        let max = values.iter().copied().fold(f64::MIN, f64::max);
        let color = resolve_color(params)?;
        let invert = params.get_bool("invert");
        // Default sweeps top-down; invert climbs from the bottom
        let (ascending, init, end) = if invert {
            (true, min, max)
        } else {
            (false, max, min)
        };
        self.core = Some(SweepCore::new(
            &values,
            ascending,
            init,
            end,
            params.get_f64("duration"),
            max,
            color,
            Restart::OnExhaust,
        ));
        Ok(())
    }

    fn tick(&mut self, frame: &mut Frame) -> Result<Tick> {
        match self.core.as_mut() {
            Some(core) => {
                core.tick(frame);
                Ok(Tick::Continue)
            }
            None => bail!("tick before setup"),
        }
    }
}

pub struct Rotate {
    core: Option<SweepCore>,
}

impl Rotate {
    pub fn new() -> Rotate {
        Rotate { core: None }
    }
}

impl Animation for Rotate {
    fn setup(&mut self, params: &Params, geometry: &GeometryStore) -> Result<(), SetupError> {
        let values = geometry.azimuth();
        let color = resolve_color(params)?;
        let invert = params.get_bool("invert");
        let (ascending, init, end) = if invert {
            (false, 2.0 * PI, 0.0)
        } else {
            (true, 0.0, 2.0 * PI)
        };
        self.core = Some(SweepCore::new(
            &values,
            ascending,
            init,
            end,
            params.get_f64("duration"),
            2.0 * PI,
            color,
            Restart::OutsideRange(0.0, 2.0 * PI),
        ));
        Ok(())
    }

    fn tick(&mut self, frame: &mut Frame) -> Result<Tick> {
        match self.core.as_mut() {
            Some(core) => {
                core.tick(frame);
                Ok(Tick::Continue)
            }
            None => bail!("tick before setup"),
        }
    }
}

pub struct Sphere {
    core: Option<SweepCore>,
}

impl Sphere {
    pub fn new() -> Sphere {
        Sphere { core: None }
    }
}

impl Animation for Sphere {
    fn setup(&mut self, params: &Params, geometry: &GeometryStore) -> Result<(), SetupError> {
        let values = geometry.centered_radius();
        let min = values.iter().copied().fold(f64::MAX, f64::min);
        let max = values.iter().copied().fold(f64::MIN, f64::max);
        let color = resolve_color(params)?;
        let invert = params.get_bool("invert");
        // Default expands from the center; invert collapses inward
        let (ascending, init, end) = if invert {
            (false, max, min)
        } else {
            (true, min, max)
        };
        self.core = Some(SweepCore::new(
            &values,
            ascending,
            init,
            end,
            params.get_f64("duration"),
            max,
            color,
            Restart::OnExhaust,
        ));
        Ok(())
    }

    fn tick(&mut self, frame: &mut Frame) -> Result<Tick> {
        match self.core.as_mut() {
            Some(core) => {
                core.tick(frame);
                Ok(Tick::Continue)
            }
            None => bail!("tick before setup"),
        }
    }
}
