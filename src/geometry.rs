// Geometry Module - Read-only store of calibrated LED coordinates
//
// Loaded once at startup from the JSON file the calibration pipeline
// produces, then shared read-only behind an Arc. Animations never mutate
// coordinates; they derive per-run projections from them.
use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::f64::consts::PI;
use std::path::Path;

pub struct GeometryStore {
    points: Vec<[f64; 3]>,
}

impl GeometryStore {
    pub fn new(points: Vec<[f64; 3]>) -> Result<Self> {
        if points.is_empty() {
            bail!("Geometry file contains no coordinates");
        }
        Ok(GeometryStore { points })
    }

    /// Load the LED coordinate array. A missing or malformed file is a
    /// configuration error: it fails the caller, there is no retry.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read geometry file {}", path.display()))?;
        let points: Vec<[f64; 3]> = serde_json::from_str(&raw)
            .with_context(|| format!("Malformed geometry file {}", path.display()))?;
        GeometryStore::new(points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    pub fn point(&self, index: usize) -> [f64; 3] {
        self.points[index]
    }

    /// Per-LED z coordinate.
    pub fn z(&self) -> Vec<f64> {
        self.points.iter().map(|p| p[2]).collect()
    }

    pub fn max_z(&self) -> f64 {
        self.points.iter().map(|p| p[2]).fold(f64::MIN, f64::max)
    }

    pub fn min_z(&self) -> f64 {
        self.points.iter().map(|p| p[2]).fold(f64::MAX, f64::min)
    }

    /// Projection of every LED onto a direction in the XY plane, given as an
    /// angle in degrees from the x-axis.
    pub fn axis_projection(&self, angle_deg: f64) -> Vec<f64> {
        let angle = angle_deg.to_radians();
        let (sin, cos) = angle.sin_cos();
        self.points.iter().map(|p| p[0] * cos + p[1] * sin).collect()
    }

    /// Azimuthal angle atan2(y, x) shifted into [0, 2pi).
    pub fn azimuth(&self) -> Vec<f64> {
        self.points.iter().map(|p| p[1].atan2(p[0]) + PI).collect()
    }

    /// Distance from the vertical axis.
    pub fn cylindrical_radius(&self) -> Vec<f64> {
        self.points
            .iter()
            .map(|p| (p[0] * p[0] + p[1] * p[1]).sqrt())
            .collect()
    }

    /// Euclidean radius from the z-centered origin, used by the sphere
    /// animation: z is shifted so the midpoint of [min_z, max_z] is 0.
    pub fn centered_radius(&self) -> Vec<f64> {
        let z_mid = (self.max_z() + self.min_z()) / 2.0;
        self.points
            .iter()
            .map(|p| {
                let z = p[2] - z_mid;
                (p[0] * p[0] + p[1] * p[1] + z * z).sqrt()
            })
            .collect()
    }

    /// SHA-256 over the little-endian coordinate bytes. Keys derived
    /// artifacts such as the geodesic cache.
    pub fn content_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for p in &self.points {
            for c in p {
                hasher.update(c.to_le_bytes());
            }
        }
        hasher.finalize().into()
    }
}
