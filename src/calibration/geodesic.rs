// Geodesic distance matrix over the LED adjacency graph. LEDs closer than
// the mean k-th nearest-neighbor distance are connected; all-pairs
// shortest paths come from one Dijkstra run per source. The result is
// cached on disk keyed by the geometry content hash and k.
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::geometry::GeometryStore;

pub struct GeodesicMatrix {
    /// Geodesic distance between every LED pair; infinite when unreachable.
    pub dists: Vec<Vec<f64>>,
    /// Predecessor of column j on the shortest path from row i, -1 when
    /// unreachable.
    pub preds: Vec<Vec<i32>>,
}

/// JSON cache image. Infinities are stored as -1.0; JSON has no inf.
#[derive(Serialize, Deserialize)]
struct CacheFile {
    hash: String,
    k: usize,
    dists: Vec<Vec<f64>>,
    preds: Vec<Vec<i32>>,
}

const INF_SENTINEL: f64 = -1.0;

struct HeapEntry {
    dist: f64,
    node: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.dist == other.dist && self.node == other.node
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    // Reversed for a min-heap
    fn cmp(&self, other: &Self) -> Ordering {
        other.dist.total_cmp(&self.dist)
    }
}

/// Compute the full matrix. `k` controls the adjacency threshold: the mean
/// distance to the k-th nearest neighbor (self included).
pub fn compute(points: &[[f64; 3]], k: usize) -> Result<GeodesicMatrix> {
    let n = points.len();
    if k >= n {
        bail!("k ({}) must be smaller than the LED count ({})", k, n);
    }

    let mut direct = vec![vec![0.0f64; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let dx = points[i][0] - points[j][0];
            let dy = points[i][1] - points[j][1];
            let dz = points[i][2] - points[j][2];
            let d = (dx * dx + dy * dy + dz * dz).sqrt();
            direct[i][j] = d;
            direct[j][i] = d;
        }
    }

    // Mean distance to the k-th nearest neighbor across all LEDs
    let mut epsilon = 0.0;
    for row in &direct {
        let mut sorted = row.clone();
        sorted.sort_by(f64::total_cmp);
        epsilon += sorted[k];
    }
    epsilon /= n as f64;
    debug!(epsilon, k, "adjacency threshold");

    let neighbors: Vec<Vec<usize>> = (0..n)
        .map(|i| (0..n).filter(|&j| j != i && direct[i][j] < epsilon).collect())
        .collect();

    let mut dists = vec![vec![f64::INFINITY; n]; n];
    let mut preds = vec![vec![-1i32; n]; n];
    for source in 0..n {
        dists[source][source] = 0.0;
        preds[source][source] = source as i32;
        let mut heap = BinaryHeap::new();
        heap.push(HeapEntry {
            dist: 0.0,
            node: source,
        });
        while let Some(HeapEntry { dist, node }) = heap.pop() {
            if dist > dists[source][node] {
                continue;
            }
            for &next in &neighbors[node] {
                let candidate = dist + direct[node][next];
                if candidate < dists[source][next] {
                    dists[source][next] = candidate;
                    preds[source][next] = node as i32;
                    heap.push(HeapEntry {
                        dist: candidate,
                        node: next,
                    });
                }
            }
        }
    }

    // Undirected edges must give a symmetric matrix
    for i in 0..n {
        for j in (i + 1)..n {
            let (a, b) = (dists[i][j], dists[j][i]);
            let symmetric = (a.is_infinite() && b.is_infinite()) || (a - b).abs() < 1e-6;
            if !symmetric {
                bail!("Asymmetric geodesic distances between {} and {}", i, j);
            }
        }
    }
    Ok(GeodesicMatrix { dists, preds })
}

fn cache_path(cache_dir: &Path, k: usize) -> PathBuf {
    cache_dir.join(format!("geodesic-{}.json", k))
}

fn hash_hex(geometry: &GeometryStore) -> String {
    geometry
        .content_hash()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Return the cached matrix when its geometry hash and k match, otherwise
/// recompute and rewrite the cache.
pub fn load_or_compute(cache_dir: &Path, geometry: &GeometryStore, k: usize) -> Result<GeodesicMatrix> {
    let path = cache_path(cache_dir, k);
    let hash = hash_hex(geometry);

    if let Ok(raw) = std::fs::read_to_string(&path) {
        match serde_json::from_str::<CacheFile>(&raw) {
            Ok(cache) if cache.hash == hash && cache.k == k => {
                debug!(path = %path.display(), "geodesic cache hit");
                let dists = cache
                    .dists
                    .into_iter()
                    .map(|row| {
                        row.into_iter()
                            .map(|d| if d == INF_SENTINEL { f64::INFINITY } else { d })
                            .collect()
                    })
                    .collect();
                return Ok(GeodesicMatrix {
                    dists,
                    preds: cache.preds,
                });
            }
            Ok(_) => info!(path = %path.display(), "geodesic cache stale, recomputing"),
            Err(e) => info!(path = %path.display(), "unreadable geodesic cache ({}), recomputing", e),
        }
    }

    let matrix = compute(geometry.points(), k)?;
    let cache = CacheFile {
        hash,
        k,
        dists: matrix
            .dists
            .iter()
            .map(|row| {
                row.iter()
                    .map(|&d| if d.is_infinite() { INF_SENTINEL } else { d })
                    .collect()
            })
            .collect(),
        preds: matrix.preds.clone(),
    };
    std::fs::create_dir_all(cache_dir)
        .with_context(|| format!("Failed to create cache dir {}", cache_dir.display()))?;
    std::fs::write(&path, serde_json::to_string(&cache)?)
        .with_context(|| format!("Failed to write geodesic cache {}", path.display()))?;
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(nx: usize, ny: usize) -> Vec<[f64; 3]> {
        let mut points = Vec::new();
        for x in 0..nx {
            for y in 0..ny {
                points.push([x as f64, y as f64, 0.0]);
            }
        }
        points
    }

    #[test]
    fn test_matrix_properties_on_grid() {
        let points = grid(5, 5);
        let m = compute(&points, 6).unwrap();
        let n = points.len();
        for i in 0..n {
            assert_eq!(m.dists[i][i], 0.0);
            for j in 0..n {
                assert!((m.dists[i][j] - m.dists[j][i]).abs() < 1e-9);
                assert!(m.dists[i][j].is_finite(), "grid must be connected");
            }
        }
        // Triangle inequality on true edge weights
        for i in 0..n {
            for j in 0..n {
                for l in 0..n {
                    assert!(m.dists[i][j] <= m.dists[i][l] + m.dists[l][j] + 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_geodesic_longer_than_straight_line() {
        // An L of points: the path must walk around the corner
        let mut points = Vec::new();
        for i in 0..5 {
            points.push([i as f64, 0.0, 0.0]);
        }
        for i in 1..5 {
            points.push([4.0, i as f64, 0.0]);
        }
        let m = compute(&points, 6).unwrap();
        let straight = (4.0f64 * 4.0 + 4.0 * 4.0).sqrt();
        let around = m.dists[0][8];
        assert!(around > straight);
    }

    #[test]
    fn test_disconnected_pairs_are_infinite() {
        // Two tight clumps far apart; k small enough not to bridge them
        let mut points = grid(3, 3);
        for p in grid(3, 3) {
            points.push([p[0] + 1000.0, p[1], p[2]]);
        }
        let m = compute(&points, 6).unwrap();
        assert!(m.dists[0][9].is_infinite());
        assert_eq!(m.preds[0][9], -1);
        assert!(m.dists[0][4].is_finite());
    }

    #[test]
    fn test_k_bound_checked() {
        assert!(compute(&grid(2, 2), 6).is_err());
    }

    #[test]
    fn test_cache_roundtrip_and_invalidation() {
        let dir = tempfile::tempdir().unwrap();
        let geometry = GeometryStore::new(grid(4, 4)).unwrap();

        let first = load_or_compute(dir.path(), &geometry, 6).unwrap();
        assert!(cache_path(dir.path(), 6).exists());
        let second = load_or_compute(dir.path(), &geometry, 6).unwrap();
        assert_eq!(first.dists, second.dists);
        assert_eq!(first.preds, second.preds);

        // A different geometry with the same k must not reuse the cache
        let mut moved = grid(4, 4);
        moved[0][0] += 0.5;
        let other = GeometryStore::new(moved).unwrap();
        let third = load_or_compute(dir.path(), &other, 6).unwrap();
        assert_ne!(first.dists, third.dists);
    }
}
