//! Projective transforms estimated from point correspondences
//!
//! [`Homography::fit`] solves the direct linear transform on Hartley-normalized
//! points: a linear 8x8 system for exactly four points, SVD otherwise.
//! [`find_homography_ransac`] wraps it in seeded random sample consensus so
//! results are repeatable for a given seed.

use nalgebra::{DMatrix, Matrix3, Point2, SMatrix, SVector, Vector3};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

const MIN_POINTS: usize = 4;
/// Minimal samples with three points spanning less area than this are skipped
const COLLINEAR_AREA: f64 = 1e-6;
const SINGULAR_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    matrix: Matrix3<f64>,
}

impl Homography {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    /// Wrap a matrix, normalized so `h33 == 1`. Non-finite or singular
    /// matrices are rejected.
    pub fn from_matrix(matrix: Matrix3<f64>) -> Option<Self> {
        if matrix.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let h33 = matrix[(2, 2)];
        if h33.abs() < SINGULAR_EPS {
            return None;
        }
        let matrix = matrix / h33;
        if matrix.determinant().abs() < SINGULAR_EPS {
            return None;
        }
        Some(Self { matrix })
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Map a point, or `None` if it lands on the line at infinity
    pub fn project(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let v = self.matrix * Vector3::new(p.x, p.y, 1.0);
        if v[2].abs() < SINGULAR_EPS {
            return None;
        }
        let mapped = Point2::new(v[0] / v[2], v[1] / v[2]);
        (mapped.x.is_finite() && mapped.y.is_finite()).then_some(mapped)
    }

    /// Squared distance between `H * src` and `dst`
    fn transfer_error_sq(&self, src: &Point2<f64>, dst: &Point2<f64>) -> f64 {
        match self.project(*src) {
            Some(p) => (p - dst).norm_squared(),
            None => f64::INFINITY,
        }
    }

    /// Least-squares fit of `dst ~ H * src` from at least four correspondences
    pub fn fit(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<Self> {
        if src.len() != dst.len() || src.len() < MIN_POINTS {
            return None;
        }
        let (src_n, t_src) = normalize_points(src)?;
        let (dst_n, t_dst) = normalize_points(dst)?;

        let normalized = if src.len() == MIN_POINTS {
            solve_four(&src_n, &dst_n)?
        } else {
            solve_svd(&src_n, &dst_n)?
        };

        let denormalized = t_dst.try_inverse()? * normalized * t_src;
        Self::from_matrix(denormalized)
    }
}

/// Translate to the centroid and scale so the mean distance is sqrt(2)
fn normalize_points(points: &[Point2<f64>]) -> Option<(Vec<Point2<f64>>, Matrix3<f64>)> {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist < SINGULAR_EPS {
        return None;
    }

    let s = std::f64::consts::SQRT_2 / mean_dist;
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = points
        .iter()
        .map(|p| Point2::new(s * (p.x - cx), s * (p.y - cy)))
        .collect();
    Some((normalized, t))
}

/// Exact solution with `h33 = 1` for four correspondences
fn solve_four(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<Matrix3<f64>> {
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for (k, (s, d)) in src.iter().zip(dst).enumerate() {
        let (x, y, u, v) = (s.x, s.y, d.x, d.y);
        let r = 2 * k;

        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -x * u;
        a[(r, 7)] = -y * u;
        b[r] = u;

        a[(r + 1, 3)] = x;
        a[(r + 1, 4)] = y;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -x * v;
        a[(r + 1, 7)] = -y * v;
        b[r + 1] = v;
    }

    let h = a.lu().solve(&b)?;
    Some(Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0))
}

/// Null vector of the stacked DLT constraints
fn solve_svd(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<Matrix3<f64>> {
    let mut a = DMatrix::<f64>::zeros(2 * src.len(), 9);

    for (k, (s, d)) in src.iter().zip(dst).enumerate() {
        let (x, y, u, v) = (s.x, s.y, d.x, d.y);
        let r = 2 * k;

        a[(r, 0)] = -x;
        a[(r, 1)] = -y;
        a[(r, 2)] = -1.0;
        a[(r, 6)] = u * x;
        a[(r, 7)] = u * y;
        a[(r, 8)] = u;

        a[(r + 1, 3)] = -x;
        a[(r + 1, 4)] = -y;
        a[(r + 1, 5)] = -1.0;
        a[(r + 1, 6)] = v * x;
        a[(r + 1, 7)] = v * y;
        a[(r + 1, 8)] = v;
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let smallest = svd.singular_values.imin();
    let h = v_t.row(smallest);
    Some(Matrix3::new(
        h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8],
    ))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacParams {
    /// Maximum reprojection error (pixels) for a correspondence to count as an inlier
    pub reprojection_threshold: f64,
    pub max_iterations: usize,
    /// Desired probability of drawing at least one outlier-free sample
    pub confidence: f64,
    pub seed: u64,
}

impl Default for RansacParams {
    fn default() -> Self {
        Self {
            reprojection_threshold: 3.0,
            max_iterations: 2000,
            confidence: 0.995,
            seed: 0x5EED_1234,
        }
    }
}

impl RansacParams {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.reprojection_threshold > 0.0) {
            return Err(format!(
                "ransac.reprojection_threshold must be positive, got {}",
                self.reprojection_threshold
            ));
        }
        if self.max_iterations == 0 {
            return Err("ransac.max_iterations must be at least 1".into());
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(format!(
                "ransac.confidence must lie in (0, 1), got {}",
                self.confidence
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RansacFit {
    pub homography: Homography,
    /// Inlier flag per input correspondence
    pub inliers: Vec<bool>,
}

impl RansacFit {
    pub fn inlier_count(&self) -> usize {
        self.inliers.iter().filter(|&&inlier| inlier).count()
    }
}

fn collinear(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> bool {
    let (ab, ac) = (b - a, c - a);
    (ab.x * ac.y - ab.y * ac.x).abs() < COLLINEAR_AREA
}

/// True if any three of the sample points are collinear (or coincide)
fn degenerate_sample(points: &[Point2<f64>]) -> bool {
    let n = points.len();
    for i in 0..n {
        for j in i + 1..n {
            for k in j + 1..n {
                if collinear(&points[i], &points[j], &points[k]) {
                    return true;
                }
            }
        }
    }
    false
}

fn classify(h: &Homography, src: &[Point2<f64>], dst: &[Point2<f64>], threshold_sq: f64) -> Vec<bool> {
    src.iter()
        .zip(dst)
        .map(|(s, d)| h.transfer_error_sq(s, d) <= threshold_sq)
        .collect()
}

/// Iterations needed to draw an all-inlier sample with `confidence`
fn adaptive_iterations(inliers: usize, total: usize, confidence: f64, current: usize) -> usize {
    let inlier_ratio = inliers as f64 / total as f64;
    let all_good = inlier_ratio.powi(MIN_POINTS as i32);
    if all_good >= 1.0 {
        return 1;
    }
    let denom = (1.0 - all_good).ln();
    if denom >= 0.0 || !denom.is_finite() {
        return current;
    }
    let needed = ((1.0 - confidence).ln() / denom).ceil();
    if needed.is_finite() && needed >= 0.0 {
        (needed as usize).clamp(1, current)
    } else {
        current
    }
}

/// Robustly fit `dst ~ H * src`, tolerating outlier correspondences.
///
/// The returned model is refit on all inliers of the best consensus set.
/// Returns `None` when fewer than four correspondences agree on a
/// non-degenerate transform.
pub fn find_homography_ransac(
    src: &[Point2<f64>],
    dst: &[Point2<f64>],
    params: &RansacParams,
) -> Option<RansacFit> {
    let n = src.len();
    if n != dst.len() || n < MIN_POINTS {
        return None;
    }

    let threshold_sq = params.reprojection_threshold * params.reprojection_threshold;
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut max_iterations = params.max_iterations;
    let mut best: Option<(Homography, usize)> = None;
    let mut iteration = 0;

    while iteration < max_iterations {
        iteration += 1;
        let picked = index::sample(&mut rng, n, MIN_POINTS);
        let sample_src: Vec<Point2<f64>> = picked.iter().map(|i| src[i]).collect();
        let sample_dst: Vec<Point2<f64>> = picked.iter().map(|i| dst[i]).collect();

        if !degenerate_sample(&sample_src) && !degenerate_sample(&sample_dst) {
            if let Some(h) = Homography::fit(&sample_src, &sample_dst) {
                let count = classify(&h, src, dst, threshold_sq)
                    .into_iter()
                    .filter(|&inlier| inlier)
                    .count();
                if best.is_none_or(|(_, best_count)| count > best_count) {
                    best = Some((h, count));
                    max_iterations =
                        adaptive_iterations(count, n, params.confidence, max_iterations);
                }
            }
        }

        // Every draw from exactly four points is the same sample
        if n == MIN_POINTS {
            break;
        }
    }

    let (model, count) = best?;
    if count < MIN_POINTS {
        return None;
    }

    let inliers = classify(&model, src, dst, threshold_sq);
    let (inlier_src, inlier_dst): (Vec<_>, Vec<_>) = src
        .iter()
        .zip(dst)
        .zip(&inliers)
        .filter(|(_, inlier)| **inlier)
        .map(|((s, d), _)| (*s, *d))
        .unzip();

    if let Some(refined) = Homography::fit(&inlier_src, &inlier_dst) {
        let refined_inliers = classify(&refined, src, dst, threshold_sq);
        let refined_count = refined_inliers.iter().filter(|&&inlier| inlier).count();
        if refined_count >= count {
            log::debug!(
                "📐 Homography refit on {} inliers after {} iterations",
                refined_count,
                iteration
            );
            return Some(RansacFit {
                homography: refined,
                inliers: refined_inliers,
            });
        }
    }

    log::debug!("📐 Homography with {} inliers after {} iterations", count, iteration);
    Some(RansacFit {
        homography: model,
        inliers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::Rng;

    fn grid_points() -> Vec<Point2<f64>> {
        let mut points = Vec::new();
        for y in 0..6 {
            for x in 0..7 {
                // Slight irregularity keeps the grid from being perfectly aligned
                points.push(Point2::new(
                    x as f64 * 23.0 + (y * 3 % 5) as f64,
                    y as f64 * 17.0 + (x * 7 % 4) as f64,
                ));
            }
        }
        points
    }

    fn known_homography() -> Homography {
        Homography::from_matrix(Matrix3::new(
            0.9, -0.12, 35.0, 0.08, 1.05, 12.0, 0.0004, -0.0002, 1.0,
        ))
        .unwrap()
    }

    fn assert_same_transform(a: &Homography, b: &Homography) {
        for (x, y) in [(0.0, 0.0), (150.0, 0.0), (150.0, 90.0), (0.0, 90.0), (70.0, 40.0)] {
            let pa = a.project(Point2::new(x, y)).unwrap();
            let pb = b.project(Point2::new(x, y)).unwrap();
            assert_relative_eq!(pa.x, pb.x, epsilon = 1e-6);
            assert_relative_eq!(pa.y, pb.y, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_fit_four_points_exact() {
        let h = known_homography();
        let src = [
            Point2::new(0.0, 0.0),
            Point2::new(100.0, 0.0),
            Point2::new(100.0, 60.0),
            Point2::new(0.0, 60.0),
        ];
        let dst: Vec<_> = src.iter().map(|p| h.project(*p).unwrap()).collect();

        let fitted = Homography::fit(&src, &dst).unwrap();
        assert_same_transform(&fitted, &h);
    }

    #[test]
    fn test_fit_many_points_identity() {
        let points = grid_points();
        let fitted = Homography::fit(&points, &points).unwrap();
        assert_relative_eq!(*fitted.matrix(), Matrix3::identity(), epsilon = 1e-9);
    }

    #[test]
    fn test_fit_rejects_collapsed_points() {
        let src = vec![Point2::new(5.0, 5.0); 6];
        assert!(Homography::fit(&src, &src).is_none());
        assert!(Homography::fit(&src[..3], &src[..3]).is_none());
    }

    #[test]
    fn test_from_matrix_rejects_singular() {
        assert!(Homography::from_matrix(Matrix3::zeros()).is_none());
        let singular = Matrix3::new(1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 0.0, 0.0, 1.0);
        assert!(Homography::from_matrix(singular).is_none());
        assert!(Homography::from_matrix(Matrix3::identity() * f64::NAN).is_none());
    }

    #[test]
    fn test_ransac_recovers_transform_with_outliers() {
        let h = known_homography();
        let src = grid_points();
        let mut dst: Vec<_> = src.iter().map(|p| h.project(*p).unwrap()).collect();

        // Corrupt roughly 30% of the correspondences
        let mut rng = StdRng::seed_from_u64(99);
        let mut corrupted = 0;
        for (i, d) in dst.iter_mut().enumerate() {
            if i % 10 < 3 {
                d.x += rng.random_range(40.0..120.0);
                d.y -= rng.random_range(40.0..120.0);
                corrupted += 1;
            }
        }

        let fit = find_homography_ransac(&src, &dst, &RansacParams::default()).unwrap();
        assert_eq!(fit.inlier_count(), src.len() - corrupted);
        assert_same_transform(&fit.homography, &h);

        // Same seed, same answer
        let again = find_homography_ransac(&src, &dst, &RansacParams::default()).unwrap();
        assert_eq!(fit, again);
    }

    #[test]
    fn test_ransac_needs_four_points() {
        let src = grid_points();
        assert!(find_homography_ransac(&src[..3], &src[..3], &RansacParams::default()).is_none());
        assert!(find_homography_ransac(&src[..5], &src[..4], &RansacParams::default()).is_none());
    }

    #[test]
    fn test_ransac_rejects_collinear_matches() {
        let src: Vec<_> = (0..10).map(|i| Point2::new(i as f64 * 10.0, 5.0)).collect();
        let dst: Vec<_> = (0..10).map(|i| Point2::new(i as f64 * 10.0 + 3.0, 8.0)).collect();
        assert!(find_homography_ransac(&src, &dst, &RansacParams::default()).is_none());
    }

    #[test]
    fn test_adaptive_iterations_shrink_with_inliers() {
        assert_eq!(adaptive_iterations(10, 10, 0.995, 2000), 1);
        let most = adaptive_iterations(9, 10, 0.995, 2000);
        let half = adaptive_iterations(5, 10, 0.995, 2000);
        assert!(most < half, "{most} vs {half}");
        assert_eq!(adaptive_iterations(0, 10, 0.995, 2000), 2000);
    }
}
