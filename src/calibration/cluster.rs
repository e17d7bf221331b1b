// Single-LED blob detection on a thresholded camera frame. Bright pixels
// are grouped into connected clusters; the largest roughly circular one is
// taken as the lit LED.
use image::GrayImage;

/// Pixels closer than this (Euclidean, in pixel units) belong to the same
/// cluster. 1.45 connects all eight neighbors but nothing further.
const ADJACENCY_RADIUS: f64 = 1.45;

/// Clusters with an enclosing radius under this are sensor noise.
const MIN_RADIUS: f64 = 2.0;

/// A cluster is accepted outright when at least this fraction of its
/// enclosing circle is filled.
const MIN_CIRCULARITY: f64 = 0.3;

/// Binary mask in row/column order.
pub struct Mask {
    width: usize,
    height: usize,
    data: Vec<bool>,
}

impl Mask {
    pub fn new(width: usize, height: usize) -> Mask {
        Mask {
            width,
            height,
            data: vec![false; width * height],
        }
    }

    pub fn from_luma(img: &GrayImage, threshold: u8) -> Mask {
        let width = img.width() as usize;
        let height = img.height() as usize;
        let mut mask = Mask::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels() {
            if pixel.0[0] > threshold {
                mask.set(y as usize, x as usize, true);
            }
        }
        mask
    }

    pub fn set(&mut self, row: usize, col: usize, value: bool) {
        self.data[row * self.width + col] = value;
    }

    fn get(&self, row: usize, col: usize) -> bool {
        self.data[row * self.width + col]
    }
}

/// Center and radius of the detected LED, in (row, col) pixel coordinates.
#[derive(Debug, Clone, Copy)]
pub struct Detection {
    pub row: f64,
    pub col: f64,
    pub radius: f64,
}

/// Flood-fill connected components over the adjacency radius.
fn find_clusters(mask: &Mask) -> Vec<Vec<(usize, usize)>> {
    let mut visited = vec![false; mask.data.len()];
    let mut clusters = Vec::new();
    let r2 = ADJACENCY_RADIUS * ADJACENCY_RADIUS;
    let reach = ADJACENCY_RADIUS.floor() as isize;

    for start_row in 0..mask.height {
        for start_col in 0..mask.width {
            let start = start_row * mask.width + start_col;
            if visited[start] || !mask.data[start] {
                continue;
            }
            let mut cluster = Vec::new();
            let mut stack = vec![(start_row, start_col)];
            visited[start] = true;
            while let Some((row, col)) = stack.pop() {
                cluster.push((row, col));
                for dr in -reach..=reach {
                    for dc in -reach..=reach {
                        if (dr * dr + dc * dc) as f64 >= r2 {
                            continue;
                        }
                        let nr = row as isize + dr;
                        let nc = col as isize + dc;
                        if nr < 0 || nc < 0 || nr >= mask.height as isize || nc >= mask.width as isize
                        {
                            continue;
                        }
                        let idx = nr as usize * mask.width + nc as usize;
                        if !visited[idx] && mask.data[idx] {
                            visited[idx] = true;
                            stack.push((nr as usize, nc as usize));
                        }
                    }
                }
            }
            clusters.push(cluster);
        }
    }
    clusters
}

fn centroid(cluster: &[(usize, usize)]) -> (f64, f64) {
    let n = cluster.len() as f64;
    let (mut row, mut col) = (0.0, 0.0);
    for &(r, c) in cluster {
        row += r as f64;
        col += c as f64;
    }
    (row / n, col / n)
}

/// Centroid plus the distance to the furthest member.
fn min_enclosing_circle(cluster: &[(usize, usize)]) -> Detection {
    let (row, col) = centroid(cluster);
    let max_sq = cluster
        .iter()
        .map(|&(r, c)| {
            let dr = r as f64 - row;
            let dc = c as f64 - col;
            dr * dr + dc * dc
        })
        .fold(0.0, f64::max);
    Detection {
        row,
        col,
        radius: max_sq.sqrt(),
    }
}

/// Centroid plus 1.5x the larger per-axis standard deviation. Used as the
/// fallback for irregular clusters, where the furthest member would
/// overstate the radius.
fn mean_enclosing_circle(cluster: &[(usize, usize)]) -> Detection {
    let (row, col) = centroid(cluster);
    let n = cluster.len() as f64;
    let (mut var_r, mut var_c) = (0.0, 0.0);
    for &(r, c) in cluster {
        let dr = r as f64 - row;
        let dc = c as f64 - col;
        var_r += dr * dr;
        var_c += dc * dc;
    }
    Detection {
        row,
        col,
        radius: (var_r / n).max(var_c / n).sqrt() * 1.5,
    }
}

/// Pick the lit LED out of a binary mask: the largest cluster that is
/// round enough, or the roundest oversize cluster as a fallback. None when
/// nothing usable is in frame.
pub fn detect_led(mask: &Mask) -> Option<Detection> {
    let mut clusters = find_clusters(mask);
    clusters.sort_by_key(|c| std::cmp::Reverse(c.len()));

    let mut best: Option<(f64, usize)> = None;
    for (i, cluster) in clusters.iter().enumerate() {
        let circle = min_enclosing_circle(cluster);
        if circle.radius < MIN_RADIUS {
            continue;
        }
        let circularity =
            cluster.len() as f64 / (std::f64::consts::PI * circle.radius * circle.radius);
        if circularity > MIN_CIRCULARITY {
            return Some(circle);
        }
        if best.map_or(true, |(c, _)| circularity > c) {
            best = Some((circularity, i));
        }
    }
    best.map(|(_, i)| mean_enclosing_circle(&clusters[i]))
}
