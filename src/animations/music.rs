// Music - paints per-bin colors published by an external audio analyzer.
// The animation owns only the LED binning; beat detection and spectrum
// analysis live in whatever feeds the bin mailbox.
use anyhow::{bail, Result};
use std::f64::consts::PI;
use tracing::warn;

use super::disks::{ring_sections, stripe_sections};
use super::{
    Animation, AnimationDescriptor, BinFeed, ParamKind, ParamSpec, Params, SetupError, Tick,
};
use crate::color::adjust_brightness;
use crate::engine::Frame;
use crate::geometry::GeometryStore;

pub static DESCRIPTOR: AnimationDescriptor = AnimationDescriptor {
    name: "music",
    label: "Music",
    description: "Renders per-bin colors from an external audio analyzer.",
    params: &[
        ParamSpec {
            name: "bins",
            kind: ParamKind::Int {
                min: 6,
                max: 40,
                default: 10,
            },
        },
        ParamSpec {
            name: "direction",
            kind: ParamKind::Enum {
                options: &["disks", "stripes"],
                default: "disks",
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

pub struct Music {
    feed: BinFeed,
    state: Option<MusicState>,
}

struct MusicState {
    sections: Vec<Vec<usize>>,
    brightness: u8,
}

impl Music {
    pub fn new(feed: BinFeed) -> Music {
        Music { feed, state: None }
    }
}

impl Animation for Music {
    fn setup(&mut self, params: &Params, geometry: &GeometryStore) -> Result<(), SetupError> {
        let bins = params.get_i64("bins") as usize;
        let sections = match params.get_str("direction") {
            "disks" => ring_sections(geometry, bins),
            // Stripe zero faces the viewer, half a turn from the trunk axis
            _ => stripe_sections(geometry, bins, PI),
        };
        self.state = Some(MusicState {
            sections,
            brightness: params.get_brightness("brightness"),
        });
        Ok(())
    }

    fn tick(&mut self, frame: &mut Frame) -> Result<Tick> {
        let state = match self.state.as_ref() {
            Some(s) => s,
            None => bail!("tick before setup"),
        };
        // No new analyzer frame: hold the current picture
        let colors = match self.feed.take() {
            Some(colors) => colors,
            None => return Ok(Tick::Continue),
        };
        if colors.len() != state.sections.len() {
            warn!(
                got = colors.len(),
                expected = state.sections.len(),
                "dropping bin frame with wrong bin count"
            );
            return Ok(Tick::Continue);
        }
        for (section, &color) in state.sections.iter().zip(&colors) {
            let scaled = adjust_brightness(color, state.brightness);
            for &idx in section {
                frame.set(idx, scaled);
            }
        }
        Ok(Tick::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::pack_color;
    use crate::sink::MockSink;

    fn geometry() -> GeometryStore {
        GeometryStore::new((0..30).map(|i| [1.0, 0.0, i as f64]).collect()).unwrap()
    }

    fn setup_music(feed: BinFeed) -> Music {
        let mut music = Music::new(feed);
        music
            .setup(
                &Params::validate(&DESCRIPTOR, &Params::defaults(&DESCRIPTOR)).unwrap(),
                &geometry(),
            )
            .unwrap();
        music
    }

    #[test]
    fn test_holds_frame_without_feed() {
        let feed = BinFeed::default();
        let mut music = setup_music(feed);
        let mut sink = MockSink::new(30);
        let mut buffer = vec![0u32; 30];
        let mut frame = Frame::new(&mut buffer, &mut sink);
        music.tick(&mut frame).unwrap();
        assert!(!frame.changed());
    }

    #[test]
    fn test_paints_published_bins() {
        let feed = BinFeed::default();
        let mut music = setup_music(feed.clone());
        feed.publish(vec![pack_color(255, 0, 0); 10]);

        let mut sink = MockSink::new(30);
        let mut buffer = vec![0u32; 30];
        let mut frame = Frame::new(&mut buffer, &mut sink);
        music.tick(&mut frame).unwrap();
        drop(frame);
        assert_eq!(sink.state().lock().unwrap().writes.len(), 30);
        assert!(buffer.iter().all(|&c| c == pack_color(255, 0, 0)));

        // The mailbox is drained; the next tick paints nothing new
        let mut frame = Frame::new(&mut buffer, &mut sink);
        music.tick(&mut frame).unwrap();
        assert!(!frame.changed());
    }

    #[test]
    fn test_wrong_bin_count_dropped() {
        let feed = BinFeed::default();
        let mut music = setup_music(feed.clone());
        feed.publish(vec![pack_color(255, 0, 0); 3]);
        let mut sink = MockSink::new(30);
        let mut buffer = vec![0u32; 30];
        let mut frame = Frame::new(&mut buffer, &mut sink);
        music.tick(&mut frame).unwrap();
        assert!(!frame.changed());
    }
}
