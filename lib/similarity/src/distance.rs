//! Distances between feature sequences
//!
//! Frame distances compare two frames; [`Dtw`] lifts a frame distance to
//! sequences of possibly different lengths.

use crate::features::FeatureSeq;
use abx_core::{Error, Result};

/// Distance between the feature sequences of two items
pub trait PairDistance: Sync {
    fn distance(&self, a: &FeatureSeq, b: &FeatureSeq) -> Result<f64>;
}

impl<F> PairDistance for F
where
    F: Fn(&FeatureSeq, &FeatureSeq) -> f64 + Sync,
{
    #[inline]
    fn distance(&self, a: &FeatureSeq, b: &FeatureSeq) -> Result<f64> {
        Ok(self(a, b))
    }
}

/// Angle between two frames, scaled to [0, 1]
///
/// Two null frames are at distance 0; a null frame and a non-null one at 1.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    match (norm_a == 0.0, norm_b == 0.0) {
        (true, true) => 0.0,
        (true, false) | (false, true) => 1.0,
        (false, false) => {
            let cos = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
            cos.acos() / std::f64::consts::PI
        }
    }
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Dynamic time warping with a frame distance
///
/// The cost of the best alignment is divided by the number of steps in the
/// alignment path.
#[derive(Debug, Clone, Copy)]
pub struct Dtw<F> {
    frame: F,
}

impl<F> Dtw<F>
where
    F: Fn(&[f32], &[f32]) -> f64 + Sync,
{
    pub fn new(frame: F) -> Self {
        Self { frame }
    }
}

impl Dtw<fn(&[f32], &[f32]) -> f64> {
    pub fn cosine() -> Self {
        Self {
            frame: cosine_distance,
        }
    }

    pub fn euclidean() -> Self {
        Self {
            frame: euclidean_distance,
        }
    }
}

impl<F> PairDistance for Dtw<F>
where
    F: Fn(&[f32], &[f32]) -> f64 + Sync,
{
    fn distance(&self, a: &FeatureSeq, b: &FeatureSeq) -> Result<f64> {
        if a.is_empty() || b.is_empty() {
            return Err(Error::Distance("cannot align an empty sequence".to_string()));
        }
        if a.dim() != b.dim() {
            return Err(Error::Distance(format!(
                "frame dimensions differ: {} vs {}",
                a.dim(),
                b.dim()
            )));
        }

        let (fa, fb) = (a.frames(), b.frames());
        let m = fb.len();
        // (cost, path length) for the previous and current rows
        let mut prev: Vec<(f64, u32)> = vec![(f64::INFINITY, 0); m];
        let mut curr: Vec<(f64, u32)> = vec![(f64::INFINITY, 0); m];

        for (i, x) in fa.iter().enumerate() {
            for (j, y) in fb.iter().enumerate() {
                let d = (self.frame)(x, y);
                let best = if i == 0 && j == 0 {
                    (0.0, 0)
                } else {
                    let mut best = (f64::INFINITY, 0);
                    let candidates = [
                        (i > 0).then(|| prev[j]),
                        (j > 0).then(|| curr[j - 1]),
                        (i > 0 && j > 0).then(|| prev[j - 1]),
                    ];
                    for c in candidates.into_iter().flatten() {
                        if c.0 < best.0 {
                            best = c;
                        }
                    }
                    best
                };
                curr[j] = (best.0 + d, best.1 + 1);
            }
            std::mem::swap(&mut prev, &mut curr);
        }

        let (cost, steps) = prev[m - 1];
        Ok(cost / steps as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(frames: &[&[f32]]) -> FeatureSeq {
        FeatureSeq::new(frames.iter().map(|f| f.to_vec()).collect()).unwrap()
    }

    #[test]
    fn test_cosine_distance() {
        assert!(cosine_distance(&[1.0, 0.0], &[2.0, 0.0]).abs() < 1e-9);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 0.5).abs() < 1e-9);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 1.0).abs() < 1e-9);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn test_dtw_absorbs_repeated_frames() {
        let dtw = Dtw::euclidean();
        let a = seq(&[&[0.0], &[1.0], &[2.0]]);
        let b = seq(&[&[0.0], &[1.0], &[1.0], &[2.0]]);
        assert!(dtw.distance(&a, &b).unwrap().abs() < 1e-9);
    }

    #[test]
    fn test_dtw_normalizes_by_path_length() {
        let dtw = Dtw::euclidean();
        let a = seq(&[&[0.0], &[0.0]]);
        let b = seq(&[&[1.0], &[1.0]]);
        // Diagonal path: 2 steps of cost 1
        assert!((dtw.distance(&a, &b).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_dtw_rejects_bad_input() {
        let dtw = Dtw::cosine();
        assert!(matches!(
            dtw.distance(&seq(&[]), &seq(&[&[1.0]])),
            Err(Error::Distance(_))
        ));
        assert!(dtw.distance(&seq(&[&[1.0]]), &seq(&[&[1.0, 0.0]])).is_err());
    }

    #[test]
    fn test_closures_are_pair_distances() {
        let constant = |_: &FeatureSeq, _: &FeatureSeq| 0.5;
        assert_eq!(constant.distance(&seq(&[&[1.0]]), &seq(&[])).unwrap(), 0.5);
    }
}
