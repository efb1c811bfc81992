//! Configuration for image localization

use super::correlation::CorrelationMethod;
use super::error::{LocateError, LocateResult};
use super::feature_match::ThresholdPolicy;
use super::homography::RansacParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Fewest correspondences a projective fit can be made from
pub const MIN_HOMOGRAPHY_POINTS: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Score used by the correlation matcher
    pub correlation_method: CorrelationMethod,
    /// Keypoint budget floor, whatever the image size
    pub min_keypoints: usize,
    /// Keypoints per pixel once the image is large enough to exceed the floor
    pub keypoint_density: f64,
    /// Number of pyramid levels searched for keypoints
    pub pyramid_levels: usize,
    /// Downscale factor between consecutive pyramid levels
    pub pyramid_scale: f64,
    /// FAST intensity threshold
    pub fast_threshold: u8,
    /// Border (in pixels) where no keypoints are detected
    pub edge_threshold: u32,
    /// Diameter of the patch used for orientation and descriptors
    pub patch_size: u32,
    /// How good matches are selected from the cross-checked set
    pub threshold_policy: ThresholdPolicy,
    /// Good matches required before fitting a homography
    pub min_good_matches: usize,
    /// Allowed deviation between result and needle aspect ratios
    pub aspect_tolerance: f64,
    pub ransac: RansacParams,
    /// Where debug renderings of keypoints and matches are written
    pub debug_dir: Option<PathBuf>,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            correlation_method: CorrelationMethod::CoefficientNormalized,
            min_keypoints: 500,
            keypoint_density: 0.005,
            pyramid_levels: 8,
            pyramid_scale: 1.2,
            fast_threshold: 20,
            edge_threshold: 31,
            patch_size: 31,
            threshold_policy: ThresholdPolicy::AdditiveBand,
            min_good_matches: MIN_HOMOGRAPHY_POINTS,
            aspect_tolerance: 0.2,
            ransac: RansacParams::default(),
            debug_dir: None,
        }
    }
}

impl LocatorConfig {
    pub fn from_toml_str(text: &str) -> LocateResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> LocateResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LocateError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        log::info!("📄 Loaded locator config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> LocateResult<()> {
        let invalid = |reason: String| Err(LocateError::InvalidConfig { reason });

        if self.pyramid_levels == 0 {
            return invalid("pyramid_levels must be at least 1".into());
        }
        if !(self.pyramid_scale > 1.0) {
            return invalid(format!(
                "pyramid_scale must be greater than 1, got {}",
                self.pyramid_scale
            ));
        }
        if !(self.keypoint_density >= 0.0) {
            return invalid(format!(
                "keypoint_density must not be negative, got {}",
                self.keypoint_density
            ));
        }
        if self.patch_size < 3 || self.edge_threshold < self.patch_size / 2 {
            return invalid(format!(
                "edge_threshold ({}) must cover half the patch_size ({}), and the patch must be at least 3 pixels",
                self.edge_threshold, self.patch_size
            ));
        }
        if self.min_good_matches < MIN_HOMOGRAPHY_POINTS {
            return invalid(format!(
                "min_good_matches must be at least {MIN_HOMOGRAPHY_POINTS}, got {}",
                self.min_good_matches
            ));
        }
        if !(self.aspect_tolerance >= 0.0) {
            return invalid(format!(
                "aspect_tolerance must not be negative, got {}",
                self.aspect_tolerance
            ));
        }
        self.ransac
            .validate()
            .map_err(|reason| LocateError::InvalidConfig { reason })
    }
}

/// Create the default configuration
pub fn create_default_config() -> LocatorConfig {
    LocatorConfig::default()
}

/// Configuration preset for flat UI artwork (buttons, icons, menus)
pub fn create_ui_config() -> LocatorConfig {
    LocatorConfig {
        correlation_method: CorrelationMethod::CrossCorrelationNormalized,
        fast_threshold: 12,
        aspect_tolerance: 0.15,
        ..LocatorConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LocatorConfig::default();

        assert_eq!(config.min_keypoints, 500);
        assert_eq!(config.keypoint_density, 0.005);
        assert_eq!(config.aspect_tolerance, 0.2);
        assert_eq!(config.threshold_policy, ThresholdPolicy::AdditiveBand);
        assert_eq!(
            config.correlation_method,
            CorrelationMethod::CoefficientNormalized
        );
        assert!(config.debug_dir.is_none());
        assert!(config.validate().is_ok());
        assert!(create_ui_config().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = LocatorConfig::from_toml_str(
            r#"
            min_keypoints = 800
            threshold_policy = "absolute"
            correlation_method = "cross_correlation_normalized"

            [ransac]
            seed = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.min_keypoints, 800);
        assert_eq!(config.threshold_policy, ThresholdPolicy::Absolute);
        assert_eq!(
            config.correlation_method,
            CorrelationMethod::CrossCorrelationNormalized
        );
        assert_eq!(config.ransac.seed, 7);
        assert_eq!(
            config.ransac.max_iterations,
            RansacParams::default().max_iterations
        );
        assert_eq!(config.pyramid_levels, 8);
    }

    #[test]
    fn test_rejects_invalid_values() {
        let err = LocatorConfig::from_toml_str("min_good_matches = 3").unwrap_err();
        assert!(matches!(err, LocateError::InvalidConfig { .. }));

        let err = LocatorConfig::from_toml_str("pyramid_scale = 1.0").unwrap_err();
        assert!(matches!(err, LocateError::InvalidConfig { .. }));

        let err = LocatorConfig::from_toml_str("min_keypoints = \"many\"").unwrap_err();
        assert!(matches!(err, LocateError::ConfigParse { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = LocatorConfig::load("/nonexistent/locator.toml").unwrap_err();
        assert!(matches!(err, LocateError::ConfigIo { .. }));
    }
}
