// Calibration Module - the offline pipeline turning per-LED photos into
// 3-D coordinates: cluster detection on thresholded frames, multi-angle
// regression into 3-D, the planar hull unwrap, and the geodesic distance
// matrix derived from the solved coordinates.
pub mod cluster;
pub mod geodesic;
pub mod hull;
pub mod regression;
