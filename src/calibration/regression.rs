// Multi-angle regression: combines per-LED 2-D detections photographed at
// several known tree rotations into 3-D coordinates. Heights are averaged
// across angles with outlier reweighting; the horizontal position comes
// from a per-LED least squares fit of the projection model
// x(theta) = X*cos(theta) - Y*sin(theta).
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// All detections captured at one tree rotation. A point with a negative
/// coordinate means the LED was not found in that frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AngleDetections {
    pub angle_deg: f64,
    /// Per-LED (row, col) pixel coordinates.
    pub points: Vec<[f64; 2]>,
}

/// Per-angle height deviations above this (in pixels) trigger the
/// inverse-square reweighting for that LED.
const OUTLIER_THRESHOLD: f64 = 6.0;

fn present(point: &[f64; 2]) -> bool {
    point[0] >= 0.0 && point[1] >= 0.0
}

/// Robust per-LED height: the plain mean across angles, replaced by an
/// inverse-squared-deviation weighted mean when the angles disagree.
fn solve_height(rows: &[Option<f64>]) -> Option<f64> {
    let observed: Vec<f64> = rows.iter().flatten().copied().collect();
    if observed.is_empty() {
        return None;
    }
    let mean = observed.iter().sum::<f64>() / observed.len() as f64;
    let total_dev: f64 = observed.iter().map(|r| (r - mean).abs()).sum();
    if total_dev / rows.len() as f64 <= OUTLIER_THRESHOLD {
        return Some(mean);
    }
    // Angles disagree: trust the ones close to the consensus
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    for r in &observed {
        let dev = (r - mean).abs().max(1e-6);
        let w = 1.0 / (dev * dev);
        weighted += w * r;
        total_weight += w;
    }
    Some(weighted / total_weight)
}

/// Solve the 3-D position of every LED from detections at multiple known
/// rotations. `image_width` is the pixel width of the calibration frames;
/// horizontal pixel positions are normalized against its half before the
/// fit and scaled back after. z is rebased so the lowest LED sits at 0.
pub fn solve_positions(detections: &[AngleDetections], image_width: f64) -> Result<Vec<[f64; 3]>> {
    if detections.is_empty() {
        bail!("No detection sets supplied");
    }
    let led_count = detections[0].points.len();
    if detections.iter().any(|d| d.points.len() != led_count) {
        bail!("Detection sets disagree on the number of LEDs");
    }

    let half_width = image_width / 2.0;
    let mut heights = vec![0.0f64; led_count];
    let mut positions = vec![[0.0f64; 3]; led_count];

    for i in 0..led_count {
        let rows: Vec<Option<f64>> = detections
            .iter()
            .map(|d| present(&d.points[i]).then(|| d.points[i][0]))
            .collect();
        match solve_height(&rows) {
            Some(h) => heights[i] = h,
            None => {
                warn!(led = i, "no angle captured this LED; height defaults to 0");
                heights[i] = f64::NAN;
            }
        }

        // Least squares over the observed angles only: rows of
        // [cos(theta), -sin(theta)] against the normalized column.
        let mut a11 = 0.0;
        let mut a12 = 0.0;
        let mut a22 = 0.0;
        let mut b1 = 0.0;
        let mut b2 = 0.0;
        let mut observations = 0usize;
        for d in detections {
            if !present(&d.points[i]) {
                continue;
            }
            let theta = d.angle_deg.to_radians();
            let (sin, cos) = theta.sin_cos();
            let x = d.points[i][1] / half_width - 1.0;
            a11 += cos * cos;
            a12 += -cos * sin;
            a22 += sin * sin;
            b1 += cos * x;
            b2 += -sin * x;
            observations += 1;
        }
        let det = a11 * a22 - a12 * a12;
        if observations < 2 || det.abs() < 1e-9 {
            warn!(led = i, "underdetermined horizontal fit; position defaults to the axis");
            continue;
        }
        positions[i][0] = (a22 * b1 - a12 * b2) / det * half_width;
        positions[i][1] = (a11 * b2 - a12 * b1) / det * half_width;
    }

    // Image rows grow downward: flipping against the largest row puts the
    // lowest LED at z = 0
    let max_row = heights.iter().copied().filter(|h| h.is_finite()).fold(f64::MIN, f64::max);
    for (i, h) in heights.iter().enumerate() {
        positions[i][2] = if h.is_finite() { max_row - h } else { 0.0 };
    }
    Ok(positions)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Render a synthetic noiseless capture of known positions.
    fn capture(truth: &[[f64; 3]], angles: &[f64], width: f64) -> Vec<AngleDetections> {
        let max_z = truth.iter().map(|p| p[2]).fold(f64::MIN, f64::max);
        angles
            .iter()
            .map(|&angle_deg| {
                let theta = angle_deg.to_radians();
                let points = truth
                    .iter()
                    .map(|p| {
                        let col = p[0] * theta.cos() - p[1] * theta.sin() + width / 2.0;
                        let row = max_z - p[2];
                        [row, col]
                    })
                    .collect();
                AngleDetections { angle_deg, points }
            })
            .collect()
    }

    fn eight_angles() -> Vec<f64> {
        (0..8).map(|i| i as f64 * 45.0).collect()
    }

    #[test]
    fn test_recovers_noiseless_positions() {
        let truth = vec![
            [50.0, 0.0, 10.0],
            [0.0, -70.0, 100.0],
            [-30.0, 40.0, 250.0],
            [10.0, 10.0, 0.0],
        ];
        let detections = capture(&truth, &eight_angles(), 320.0);
        let solved = solve_positions(&detections, 320.0).unwrap();
        for (got, want) in solved.iter().zip(&truth) {
            assert!((got[0] - want[0]).abs() < 1e-6, "x: {} vs {}", got[0], want[0]);
            assert!((got[1] - want[1]).abs() < 1e-6, "y: {} vs {}", got[1], want[1]);
            assert!((got[2] - want[2]).abs() < 1e-6, "z: {} vs {}", got[2], want[2]);
        }
    }

    #[test]
    fn test_missing_angles_tolerated() {
        let truth = vec![[40.0, 20.0, 50.0], [0.0, 0.0, 0.0]];
        let mut detections = capture(&truth, &eight_angles(), 320.0);
        // LED 0 invisible from three angles
        for d in detections.iter_mut().take(3) {
            d.points[0] = [-1.0, -1.0];
        }
        let solved = solve_positions(&detections, 320.0).unwrap();
        assert!((solved[0][0] - 40.0).abs() < 1e-6);
        assert!((solved[0][1] - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_height_outlier_downweighted() {
        let rows: Vec<Option<f64>> = vec![
            Some(100.0),
            Some(101.0),
            Some(99.0),
            Some(100.0),
            Some(300.0), // one bad tag
            Some(100.0),
            Some(101.0),
            Some(99.0),
        ];
        let h = solve_height(&rows).unwrap();
        // Plain mean would be 125; the reweighted height stays near 100
        assert!((h - 100.0).abs() < 5.0, "height {}", h);
    }

    #[test]
    fn test_never_seen_led_defaults_to_origin() {
        let truth = vec![[40.0, 20.0, 50.0], [0.0, 0.0, 25.0]];
        let mut detections = capture(&truth, &eight_angles(), 320.0);
        for d in detections.iter_mut() {
            d.points[1] = [-1.0, -1.0];
        }
        let solved = solve_positions(&detections, 320.0).unwrap();
        assert_eq!(solved[1], [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_mismatched_sets_rejected() {
        let a = AngleDetections {
            angle_deg: 0.0,
            points: vec![[0.0, 0.0]; 3],
        };
        let b = AngleDetections {
            angle_deg: 45.0,
            points: vec![[0.0, 0.0]; 4],
        };
        assert!(solve_positions(&[a, b], 320.0).is_err());
    }
}
