// Disks - a static rainbow gradient across height rings or azimuthal
// stripes. Paints once and finishes; the binning helpers are shared with
// the music animation.
use anyhow::{bail, Result};
use std::f64::consts::PI;

use super::{Animation, AnimationDescriptor, ParamKind, ParamSpec, Params, SetupError, Tick};
use crate::color::wheel;
use crate::engine::Frame;
use crate::geometry::GeometryStore;

pub static DESCRIPTOR: AnimationDescriptor = AnimationDescriptor {
    name: "disks",
    label: "Disks",
    description: "Static rainbow bands across rings or stripes.",
    params: &[
        ParamSpec {
            name: "config",
            kind: ParamKind::Enum {
                options: &["rings", "stripes"],
                default: "rings",
            },
        },
        ParamSpec {
            name: "number",
            kind: ParamKind::Int {
                min: 4,
                max: 24,
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

/// Bucket every LED into `n` horizontal rings by normalized height.
pub(super) fn ring_sections(geometry: &GeometryStore, n: usize) -> Vec<Vec<usize>> {
    let z = geometry.z();
    let min = geometry.min_z();
    let span = geometry.max_z() - min;
    let mut sections = vec![Vec::new(); n];
    for (i, &zi) in z.iter().enumerate() {
        let normalized = if span > 0.0 {
            (zi - min) / span * n as f64
        } else {
            0.0
        };
        // The topmost LED lands exactly on n; fold it into the last ring
        let bucket = (normalized as usize).min(n - 1);
        sections[bucket].push(i);
    }
    sections
}

/// Bucket every LED into `n` azimuthal stripes, with an optional rotation
/// of the stripe origin.
pub(super) fn stripe_sections(geometry: &GeometryStore, n: usize, offset: f64) -> Vec<Vec<usize>> {
    let mut sections = vec![Vec::new(); n];
    for (i, angle) in geometry.azimuth().into_iter().enumerate() {
        let shifted = (angle + offset).rem_euclid(2.0 * PI);
        let bucket = ((shifted * n as f64 / (2.0 * PI)) as usize).min(n - 1);
        sections[bucket].push(i);
    }
    sections
}

pub struct Disks {
    state: Option<DisksState>,
}

struct DisksState {
    sections: Vec<Vec<usize>>,
    brightness: u8,
}

impl Disks {
    pub fn new() -> Disks {
        Disks { state: None }
    }
}

impl Animation for Disks {
    fn setup(&mut self, params: &Params, geometry: &GeometryStore) -> Result<(), SetupError> {
        let n = params.get_i64("number") as usize;
        let sections = match params.get_str("config") {
            "rings" => ring_sections(geometry, n),
            _ => stripe_sections(geometry, n, 0.0),
        };
        self.state = Some(DisksState {
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
        let n = state.sections.len();
        for (i, section) in state.sections.iter().enumerate() {
            let color = wheel((i as f64 / n as f64 * 255.0) as u8, state.brightness);
            for &idx in section {
                frame.set(idx, color);
            }
        }
        Ok(Tick::Finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MockSink;

    fn geometry() -> GeometryStore {
        let mut points = Vec::new();
        for i in 0..64 {
            let a = i as f64 / 64.0 * 2.0 * PI;
            points.push([a.cos(), a.sin(), i as f64]);
        }
        GeometryStore::new(points).unwrap()
    }

    #[test]
    fn test_ring_sections_partition() {
        let g = geometry();
        let sections = ring_sections(&g, 8);
        assert_eq!(sections.len(), 8);
        let total: usize = sections.iter().map(|s| s.len()).sum();
        assert_eq!(total, 64);
        // Evenly spaced heights bucket evenly
        assert!(sections.iter().all(|s| s.len() == 8));
        // The topmost LED folds into the last ring
        assert!(sections[7].contains(&63));
    }

    #[test]
    fn test_stripe_sections_partition() {
        let g = geometry();
        let sections = stripe_sections(&g, 4, 0.0);
        let total: usize = sections.iter().map(|s| s.len()).sum();
        assert_eq!(total, 64);
        assert!(sections.iter().all(|s| !s.is_empty()));
    }

    #[test]
    fn test_stripe_offset_rotates_bins() {
        let g = GeometryStore::new(vec![[1.0, 0.0, 0.0]]).unwrap();
        let plain = stripe_sections(&g, 4, 0.0);
        let rotated = stripe_sections(&g, 4, PI);
        let plain_bucket = plain.iter().position(|s| !s.is_empty()).unwrap();
        let rotated_bucket = rotated.iter().position(|s| !s.is_empty()).unwrap();
        assert_ne!(plain_bucket, rotated_bucket);
    }

    #[test]
    fn test_degenerate_flat_geometry() {
        let g = GeometryStore::new(vec![[1.0, 0.0, 5.0], [0.0, 1.0, 5.0]]).unwrap();
        let sections = ring_sections(&g, 4);
        // Zero height span: everything in the bottom ring
        assert_eq!(sections[0].len(), 2);
    }

    #[test]
    fn test_disks_paints_once_and_finishes() {
        let g = geometry();
        let mut disks = Disks::new();
        disks
            .setup(
                &Params::validate(&DESCRIPTOR, &Params::defaults(&DESCRIPTOR)).unwrap(),
                &g,
            )
            .unwrap();
        let mut sink = MockSink::new(64);
        let mut buffer = vec![0u32; 64];
        let mut frame = Frame::new(&mut buffer, &mut sink);
        let tick = disks.tick(&mut frame).unwrap();
        drop(frame);
        assert!(matches!(tick, Tick::Finished));
        assert_eq!(sink.state().lock().unwrap().writes.len(), 64);
    }
}
