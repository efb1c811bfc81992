//! Image localization engine
//!
//! Two ways of finding a needle image inside a haystack:
//! - correlation search, for exact or near-exact pixel copies
//! - keypoint matching with homography recovery, tolerant to rotation, scale and skew
//!
//! [`Locator`] bundles both behind one injectable [`LocatorConfig`].

pub mod config;
pub mod correlation;
pub mod debug;
pub mod error;
pub mod feature_match;
pub mod features;
pub mod homography;

#[cfg(test)]
pub(crate) mod fixtures;

pub use config::{LocatorConfig, create_default_config, create_ui_config};
pub use correlation::{CorrelationMatch, CorrelationMatcher, CorrelationMethod};
pub use error::{Detection, LocateError, LocateResult, NotFound};
pub use feature_match::{DescriptorMatch, FeatureLocator, ThresholdPolicy};
pub use features::{Descriptor, Features, KeyPoint, OrbExtractor};
pub use homography::{Homography, RansacParams};

use crate::geometry::{Rect, Size};
use crate::region::roi_from_keyphrase;
use image::DynamicImage;

/// Default band above the best match distance accepted by feature matching
pub const DEFAULT_MIN_MATCH_SCORE: i32 = 230;

/// Stateless entry point to every localization operation
#[derive(Debug, Clone, Default)]
pub struct Locator {
    correlation: CorrelationMatcher,
    features: FeatureLocator,
}

impl Locator {
    pub fn new(config: LocatorConfig) -> Self {
        Self {
            correlation: CorrelationMatcher::new(config.correlation_method),
            features: FeatureLocator::new(config),
        }
    }

    pub fn config(&self) -> &LocatorConfig {
        self.features.config()
    }

    /// Correlation search, see [`CorrelationMatcher::find`]
    pub fn find(
        &self,
        haystack: &DynamicImage,
        needle: &DynamicImage,
        scale: f64,
        grayscale: bool,
    ) -> LocateResult<Rect> {
        self.correlation.find(haystack, needle, scale, grayscale)
    }

    pub fn find_scored(
        &self,
        haystack: &DynamicImage,
        needle: &DynamicImage,
        scale: f64,
        grayscale: bool,
    ) -> LocateResult<CorrelationMatch> {
        self.correlation
            .find_scored(haystack, needle, scale, grayscale)
    }

    pub fn extract_features(&self, image: &DynamicImage) -> Features {
        self.features.extract(image)
    }

    /// Feature search, see [`FeatureLocator::locate`]
    pub fn locate(
        &self,
        haystack: &DynamicImage,
        needle: &DynamicImage,
        min_match_score: i32,
        scale: f64,
        debug: bool,
    ) -> LocateResult<Rect> {
        self.features
            .locate(haystack, needle, min_match_score, scale, debug)
    }

    pub fn try_locate(
        &self,
        haystack: &DynamicImage,
        needle: &DynamicImage,
        min_match_score: i32,
        scale: f64,
        debug: bool,
    ) -> LocateResult<Detection> {
        self.features
            .try_locate(haystack, needle, min_match_score, scale, debug)
    }

    /// Feature search against cached features, see [`FeatureLocator::locate_precomputed`]
    pub fn locate_precomputed(
        &self,
        haystack: &DynamicImage,
        needle: &DynamicImage,
        haystack_features: &Features,
        needle_features: &Features,
        min_match_score: i32,
        debug: bool,
    ) -> Rect {
        self.features.locate_precomputed(
            haystack,
            needle,
            haystack_features,
            needle_features,
            min_match_score,
            debug,
        )
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
        self.features.try_locate_precomputed(
            haystack,
            needle,
            haystack_features,
            needle_features,
            min_match_score,
            debug,
        )
    }

    pub fn roi_from_keyphrase(&self, phrase: &str, image_size: Size) -> Rect {
        roi_from_keyphrase(phrase, image_size)
    }
}
