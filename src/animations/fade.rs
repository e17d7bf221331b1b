// Fade - the whole tree cycles through the rainbow wheel in unison.
use anyhow::Result;

use super::{Animation, AnimationDescriptor, ParamKind, ParamSpec, Params, SetupError, Tick};
use crate::color::wheel;
use crate::engine::Frame;
use crate::geometry::GeometryStore;

pub static DESCRIPTOR: AnimationDescriptor = AnimationDescriptor {
    name: "fade",
    label: "Fade",
    description: "Cycles every LED through the rainbow together.",
    params: &[
        ParamSpec {
            name: "duration",
            kind: ParamKind::Float {
                min: 1.5,
                max: 15.0,
                default: 3.0,
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

pub struct Fade {
    position: f64,
    step: f64,
    brightness: u8,
}

impl Fade {
    pub fn new() -> Fade {
        Fade {
            position: 0.0,
            step: 0.0,
            brightness: 255,
        }
    }
}

impl Animation for Fade {
    fn setup(&mut self, params: &Params, _geometry: &GeometryStore) -> Result<(), SetupError> {
        // One full wheel revolution per duration
        self.step = 255.0 / (params.get_f64("duration") * 30.0);
        self.brightness = params.get_brightness("brightness");
        Ok(())
    }

    fn tick(&mut self, frame: &mut Frame) -> Result<Tick> {
        self.position = (self.position + self.step) % 255.0;
        let color = wheel(self.position as u8, self.brightness);
        for i in 0..frame.len() {
            frame.set(i, color);
        }
        Ok(Tick::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MockSink;

    #[test]
    fn test_fade_paints_uniformly() {
        let geometry = GeometryStore::new(vec![[0.0, 0.0, 0.0]; 8]).unwrap();
        let params = Params::validate(&DESCRIPTOR, &Params::defaults(&DESCRIPTOR)).unwrap();
        let mut fade = Fade::new();
        fade.setup(&params, &geometry).unwrap();

        let mut sink = MockSink::new(8);
        let mut buffer = vec![0u32; 8];
        let mut first = 0;
        for tick in 0..30 {
            let mut frame = Frame::new(&mut buffer, &mut sink);
            fade.tick(&mut frame).unwrap();
            assert!(frame.changed());
            drop(frame);
            if tick == 0 {
                first = buffer[0];
            }
        }
        // All LEDs share one color, and the color moved along the wheel
        assert!(buffer.iter().all(|&c| c == buffer[0]));
        assert_ne!(buffer[0], first);
    }
}
