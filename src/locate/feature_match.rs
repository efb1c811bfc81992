//! Feature-based localization
//!
//! Needle and haystack descriptors are matched with a mutual nearest
//! neighbour check, filtered against the best observed distance and turned
//! into a homography. The needle's corners projected through it give the
//! located region.

use super::config::LocatorConfig;
use super::correlation::resized;
use super::debug;
use super::error::{Detection, LocateError, LocateResult, NotFound, validate_scale};
use super::features::{DESCRIPTOR_BITS, Descriptor, Features, KeyPoint, OrbExtractor};
use super::homography::find_homography_ransac;
use crate::geometry::{Rect, Size, aspect_ratio_close, bounding_rect};
use image::DynamicImage;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// How the "good" subset is picked from cross-checked matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdPolicy {
    /// Accept `distance <= min_distance + min_match_score`
    #[default]
    AdditiveBand,
    /// Accept `distance <= min_match_score`
    Absolute,
}

impl ThresholdPolicy {
    pub fn max_distance(self, min_distance: u32, min_match_score: u32) -> u32 {
        match self {
            Self::AdditiveBand => min_distance.saturating_add(min_match_score),
            Self::Absolute => min_match_score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorMatch {
    /// Index into the needle features
    pub query_idx: usize,
    /// Index into the haystack features
    pub train_idx: usize,
    pub distance: u32,
}

pub fn hamming(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Index and distance of the closest descriptor, first index on ties
fn nearest(descriptor: &Descriptor, candidates: &[Descriptor]) -> Option<(usize, u32)> {
    let mut best: Option<(usize, u32)> = None;
    for (idx, candidate) in candidates.iter().enumerate() {
        let distance = hamming(descriptor, candidate);
        if best.is_none_or(|(_, d)| distance < d) {
            best = Some((idx, distance));
        }
    }
    best
}

/// Brute-force matching keeping only mutual nearest neighbours
pub fn cross_check_match(query: &[Descriptor], train: &[Descriptor]) -> Vec<DescriptorMatch> {
    let backward: Vec<Option<usize>> = train
        .iter()
        .map(|t| nearest(t, query).map(|(idx, _)| idx))
        .collect();

    query
        .iter()
        .enumerate()
        .filter_map(|(query_idx, q)| {
            let (train_idx, distance) = nearest(q, train)?;
            (backward[train_idx] == Some(query_idx)).then_some(DescriptorMatch {
                query_idx,
                train_idx,
                distance,
            })
        })
        .collect()
}

/// Clamp a caller-supplied match score into `[0, 256]`
pub fn clamp_match_score(min_match_score: i32) -> u32 {
    min_match_score.clamp(0, DESCRIPTOR_BITS as i32) as u32
}

pub fn select_good_matches(
    matches: &[DescriptorMatch],
    min_match_score: u32,
    policy: ThresholdPolicy,
) -> Vec<DescriptorMatch> {
    let Some(min_distance) = matches.iter().map(|m| m.distance).min() else {
        return Vec::new();
    };
    let max_distance = policy.max_distance(min_distance, min_match_score);
    matches
        .iter()
        .filter(|m| m.distance <= max_distance)
        .copied()
        .collect()
}

fn point(kp: &KeyPoint) -> Point2<f64> {
    Point2::new(f64::from(kp.x), f64::from(kp.y))
}

/// Locates a needle in a haystack through descriptor matching
#[derive(Debug, Clone, Default)]
pub struct FeatureLocator {
    config: LocatorConfig,
    extractor: OrbExtractor,
}

impl FeatureLocator {
    pub fn new(config: LocatorConfig) -> Self {
        let extractor = OrbExtractor::from_config(&config);
        Self { config, extractor }
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    pub fn extractor(&self) -> &OrbExtractor {
        &self.extractor
    }

    /// Extract features, e.g. to cache a haystack for repeated queries
    pub fn extract(&self, image: &DynamicImage) -> Features {
        self.extractor.extract(image)
    }

    /// Extract features from both images and locate the needle.
    ///
    /// Only an invalid `scale` or an empty image is an error; every other
    /// failure yields [`Rect::NOT_FOUND`].
    pub fn locate(
        &self,
        haystack: &DynamicImage,
        needle: &DynamicImage,
        min_match_score: i32,
        scale: f64,
        debug: bool,
    ) -> LocateResult<Rect> {
        self.try_locate(haystack, needle, min_match_score, scale, debug)
            .map(Detection::into_rect_logged)
    }

    pub fn try_locate(
        &self,
        haystack: &DynamicImage,
        needle: &DynamicImage,
        min_match_score: i32,
        scale: f64,
        debug: bool,
    ) -> LocateResult<Detection> {
        validate_scale(scale)?;
        for (image, role) in [(haystack, "haystack"), (needle, "needle")] {
            let size = Size::of(image);
            if size.is_empty() {
                return Err(LocateError::EmptyImage { role, size });
            }
        }

        let haystack = resized(haystack, scale);
        let needle = resized(needle, scale);
        let haystack_features = self.extract(&haystack);
        let needle_features = self.extract(&needle);

        if debug {
            debug::report_keypoints(
                self.config.debug_dir.as_deref(),
                "haystack",
                &haystack,
                &haystack_features,
            );
            debug::report_keypoints(
                self.config.debug_dir.as_deref(),
                "needle",
                &needle,
                &needle_features,
            );
        }

        let detection = self.match_features(
            &haystack,
            &needle,
            &haystack_features,
            &needle_features,
            min_match_score,
            debug,
            false,
        );
        Ok(match detection {
            Detection::Found(rect) => Detection::Found(rect.unscale(scale)),
            other => other,
        })
    }

    /// Locate the needle from features extracted earlier.
    ///
    /// The images are used for their sizes and for debug renderings.
    pub fn locate_precomputed(
        &self,
        haystack: &DynamicImage,
        needle: &DynamicImage,
        haystack_features: &Features,
        needle_features: &Features,
        min_match_score: i32,
        debug: bool,
    ) -> Rect {
        self.try_locate_precomputed(
            haystack,
            needle,
            haystack_features,
            needle_features,
            min_match_score,
            debug,
        )
        .into_rect_logged()
    }

    pub fn try_locate_precomputed(
        &self,
        haystack: &DynamicImage,
        needle: &DynamicImage,
        haystack_features: &Features,
        needle_features: &Features,
        min_match_score: i32,
        debug: bool,
    ) -> Detection {
        self.match_features(
            haystack,
            needle,
            haystack_features,
            needle_features,
            min_match_score,
            debug,
            true,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn match_features(
        &self,
        haystack: &DynamicImage,
        needle: &DynamicImage,
        haystack_features: &Features,
        needle_features: &Features,
        min_match_score: i32,
        debug: bool,
        check_bounds: bool,
    ) -> Detection {
        let min_match_score = clamp_match_score(min_match_score);

        for (features, role) in [(needle_features, "needle"), (haystack_features, "haystack")] {
            if features.keypoints.len() != features.descriptors.len() {
                return NotFound::MisalignedFeatures {
                    role,
                    keypoints: features.keypoints.len(),
                    descriptors: features.descriptors.len(),
                }
                .into();
            }
        }
        if needle_features.is_empty() {
            return NotFound::EmptyDescriptors { role: "needle" }.into();
        }
        if haystack_features.is_empty() {
            return NotFound::EmptyDescriptors { role: "haystack" }.into();
        }

        let matches = cross_check_match(&needle_features.descriptors, &haystack_features.descriptors);
        if matches.is_empty() {
            return NotFound::NoMatches.into();
        }

        let good = select_good_matches(&matches, min_match_score, self.config.threshold_policy);
        log::debug!(
            "🔗 {} cross-checked matches, {} good (score {}, {:?})",
            matches.len(),
            good.len(),
            min_match_score,
            self.config.threshold_policy
        );
        if debug {
            debug::report_matches(
                self.config.debug_dir.as_deref(),
                needle,
                needle_features,
                haystack,
                haystack_features,
                &good,
            );
        }

        if good.len() < self.config.min_good_matches {
            return NotFound::TooFewMatches {
                found: good.len(),
                required: self.config.min_good_matches,
            }
            .into();
        }

        let src: Vec<Point2<f64>> = good
            .iter()
            .map(|m| point(&needle_features.keypoints[m.query_idx]))
            .collect();
        let dst: Vec<Point2<f64>> = good
            .iter()
            .map(|m| point(&haystack_features.keypoints[m.train_idx]))
            .collect();

        let Some(fit) = find_homography_ransac(&src, &dst, &self.config.ransac) else {
            return NotFound::DegenerateHomography.into();
        };

        let needle_size = Size::of(needle);
        let (w, h) = (f64::from(needle_size.width), f64::from(needle_size.height));
        let corners: Option<Vec<Point2<f64>>> = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)]
            .into_iter()
            .map(|(x, y)| fit.homography.project(Point2::new(x, y)))
            .collect();
        let Some(corners) = corners else {
            return NotFound::DegenerateHomography.into();
        };

        let rect = bounding_rect(&corners);
        if !rect.is_found() {
            return NotFound::Degenerate { rect }.into();
        }
        let bounds = Size::of(haystack);
        if check_bounds && !rect.is_inside(bounds) {
            return NotFound::OutOfBounds { rect, bounds }.into();
        }
        if !aspect_ratio_close(&rect, needle_size, self.config.aspect_tolerance) {
            return NotFound::ImplausibleAspectRatio {
                rect,
                needle: needle_size,
            }
            .into();
        }

        log::debug!(
            "✅ Needle located at {} with {} inliers",
            rect,
            fit.inlier_count()
        );
        Detection::Found(rect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(seed: u8) -> Descriptor {
        let mut d = [0u8; 32];
        for (i, byte) in d.iter_mut().enumerate() {
            *byte = seed.wrapping_mul(31).wrapping_add(i as u8).rotate_left(u32::from(seed % 7));
        }
        d
    }

    fn flip_bits(mut d: Descriptor, bits: usize) -> Descriptor {
        for bit in 0..bits {
            d[bit / 8] ^= 1 << (bit % 8);
        }
        d
    }

    #[test]
    fn test_hamming_distance() {
        let a = [0u8; 32];
        let mut b = [0u8; 32];
        assert_eq!(hamming(&a, &b), 0);
        b[0] = 0b1011;
        b[31] = 0xFF;
        assert_eq!(hamming(&a, &b), 11);
        assert_eq!(hamming(&a, &[0xFF; 32]), 256);
    }

    #[test]
    fn test_cross_check_keeps_mutual_pairs_only() {
        let base = [0u8; 32];
        let query = vec![flip_bits(base, 2), flip_bits(base, 5)];
        // Both queries are nearest to train[0]; only query 0 is mutual
        let train = vec![base, [0xFF; 32]];

        let matches = cross_check_match(&query, &train);
        assert_eq!(
            matches,
            vec![DescriptorMatch {
                query_idx: 0,
                train_idx: 0,
                distance: 2
            }]
        );
    }

    #[test]
    fn test_good_match_band_is_additive() {
        let matches: Vec<_> = [12, 20, 40, 41, 90]
            .iter()
            .enumerate()
            .map(|(i, &distance)| DescriptorMatch {
                query_idx: i,
                train_idx: i,
                distance,
            })
            .collect();

        let good = select_good_matches(&matches, 28, ThresholdPolicy::AdditiveBand);
        assert_eq!(good.len(), 3);
        let good = select_good_matches(&matches, 28, ThresholdPolicy::Absolute);
        assert_eq!(good.len(), 2);
        let good = select_good_matches(&matches, 0, ThresholdPolicy::AdditiveBand);
        assert_eq!(good.len(), 1);
        assert!(select_good_matches(&[], 100, ThresholdPolicy::AdditiveBand).is_empty());
    }

    #[test]
    fn test_match_score_clamped() {
        assert_eq!(clamp_match_score(-20), 0);
        assert_eq!(clamp_match_score(230), 230);
        assert_eq!(clamp_match_score(1000), 256);
    }

    #[test]
    fn test_nearest_prefers_first_on_ties() {
        let d = descriptor(3);
        assert_eq!(nearest(&d, &[d, d]), Some((0, 0)));
        assert_eq!(nearest(&d, &[]), None);
    }
}
