// Planar unwrap of the solved coordinates: the convex hull of the 2-D
// projection is stretched onto an axis-aligned rectangle so 2-D content
// (text, images) can be mapped onto the tree surface without bunching at
// the edges.
use anyhow::{bail, Result};

fn orientation(p: [f64; 2], q: [f64; 2], r: [f64; 2]) -> f64 {
    (q[1] - p[1]) * (r[0] - q[0]) - (q[0] - p[0]) * (r[1] - q[1])
}

/// Graham scan anchored at the highest point. Returns the hull vertices as
/// indices into `points`, in rotational order starting at the anchor.
pub fn convex_hull(points: &[[f64; 2]]) -> Vec<usize> {
    if points.len() < 3 {
        return (0..points.len()).collect();
    }

    // Anchor at the rightmost of the highest points, so every other point
    // sits at a polar angle in (0, 2pi) and the ascending sort walks the
    // boundary counter-clockwise
    let anchor_idx = points
        .iter()
        .enumerate()
        .max_by(|a, b| a.1[1].total_cmp(&b.1[1]).then(a.1[0].total_cmp(&b.1[0])))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let anchor = points[anchor_idx];

    let mut sorted: Vec<usize> = (0..points.len()).filter(|&i| i != anchor_idx).collect();
    sorted.sort_by(|&a, &b| {
        let angle = |i: usize| {
            let p = points[i];
            (p[1] - anchor[1])
                .atan2(p[0] - anchor[0])
                .rem_euclid(2.0 * std::f64::consts::PI)
        };
        angle(a).total_cmp(&angle(b))
    });

    let mut hull = vec![anchor_idx, sorted[0]];
    for &i in &sorted[1..] {
        while hull.len() > 1 {
            let p = points[hull[hull.len() - 2]];
            let q = points[hull[hull.len() - 1]];
            if orientation(p, q, points[i]) < 0.0 {
                break;
            }
            hull.pop();
        }
        hull.push(i);
    }
    hull
}

/// The dividing line through two points as (normal, offset), oriented so
/// points left of the line satisfy normal . p < offset.
fn construct_line(p1: [f64; 2], p2: [f64; 2]) -> ([f64; 2], f64) {
    let dy = p1[1] - p2[1];
    let dx = p1[0] - p2[0];
    let c = [-dy, dx];
    let b = c[0] * p1[0] + c[1] * p1[1];
    let probe = [p1[0] - 1.0, p1[1]];
    if c[0] * probe[0] + c[1] * probe[1] < b {
        (c, b)
    } else {
        ([-c[0], -c[1]], -b)
    }
}

/// Where an edge crosses the horizontal line y. The edge must straddle y.
fn edge_x_at(edge: ([f64; 2], [f64; 2]), y: f64) -> f64 {
    let (p0, p1) = edge;
    let dy = p1[1] - p0[1];
    if dy == 0.0 {
        // Degenerate horizontal edge on the scan line
        return p0[0].min(p1[0]);
    }
    let t = (y - p0[1]) / dy;
    p0[0] + t * (p1[0] - p0[0])
}

/// Unwrap the hull interior onto an axis-aligned rectangle. Every interior
/// point is interpolated between the two hull edges its horizontal line
/// crosses; hull points snap to the rectangle sides. Both axes are then
/// normalized to [-1, 1].
pub fn project_to_rectangle(points: &[[f64; 2]]) -> Result<Vec<[f64; 2]>> {
    if points.len() < 3 {
        bail!("Too few points to unwrap");
    }
    let hull = convex_hull(points);
    let mut on_hull = vec![false; points.len()];
    for &i in &hull {
        on_hull[i] = true;
    }
    let edges: Vec<([f64; 2], [f64; 2])> = (0..hull.len())
        .map(|i| {
            let prev = hull[(i + hull.len() - 1) % hull.len()];
            (points[hull[i]], points[prev])
        })
        .collect();

    let xs: Vec<f64> = hull.iter().map(|&i| points[i][0]).collect();
    let ys: Vec<f64> = hull.iter().map(|&i| points[i][1]).collect();
    let left_bound = xs.iter().copied().fold(f64::MAX, f64::min);
    let right_bound = xs.iter().copied().fold(f64::MIN, f64::max);
    let lower_bound = ys.iter().copied().fold(f64::MAX, f64::min);
    let upper_bound = ys.iter().copied().fold(f64::MIN, f64::max);
    let width = right_bound - left_bound;

    let top = hull
        .iter()
        .map(|&i| points[i])
        .max_by(|a, b| a[1].total_cmp(&b[1]))
        .unwrap_or(points[hull[0]]);
    let bottom = hull
        .iter()
        .map(|&i| points[i])
        .min_by(|a, b| a[1].total_cmp(&b[1]))
        .unwrap_or(points[hull[0]]);
    let (spine, spine_offset) = construct_line(top, bottom);

    let mut projection = vec![[0.0f64; 2]; points.len()];
    for (i, &p) in points.iter().enumerate() {
        if on_hull[i] {
            projection[i] = if p[1] == upper_bound || p[1] == lower_bound {
                p
            } else if spine[0] * p[0] + spine[1] * p[1] < spine_offset {
                [left_bound, p[1]]
            } else {
                [right_bound, p[1]]
            };
            continue;
        }
        let straddling: Vec<&([f64; 2], [f64; 2])> = edges
            .iter()
            .filter(|(e0, e1)| (e0[1] <= p[1]) == (e1[1] >= p[1]))
            .collect();
        if straddling.len() != 2 {
            bail!(
                "Point {} crosses {} hull edges, expected 2",
                i,
                straddling.len()
            );
        }
        let x0 = edge_x_at(*straddling[0], p[1]);
        let x1 = edge_x_at(*straddling[1], p[1]);
        let span = (x0 - x1).abs();
        let x = if span > 0.0 {
            left_bound + (p[0] - x0.min(x1)) / span * width
        } else {
            left_bound
        };
        projection[i] = [x, p[1]];
    }

    // Normalize both axes to [-1, 1]
    for axis in 0..2 {
        let min = projection.iter().map(|p| p[axis]).fold(f64::MAX, f64::min);
        let max = projection.iter().map(|p| p[axis]).fold(f64::MIN, f64::max);
        let span = max - min;
        if span <= 0.0 {
            bail!("Degenerate projection span on axis {}", axis);
        }
        for p in &mut projection {
            p[axis] = (p[axis] - min) / span * 2.0 - 1.0;
        }
    }
    Ok(projection)
}
