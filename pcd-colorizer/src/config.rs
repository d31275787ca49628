use std::path::Path;

use pcd_core::crs::{EpsgCode, EPSG_NAD83_UTM_13N};
use pcd_services::RetryPolicy;
use serde::{Deserialize, Serialize};

use crate::error::ColorizeError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorizeConfig {
    /// Skips CRS detection for the point cloud when set.
    pub source_crs_override: Option<EpsgCode>,
    /// CRS assumed for coordinates in the regional projected-grid range.
    pub regional_default_crs: EpsgCode,
    pub transform_batch_size: usize,
    /// Coverage below this ratio triggers raster correction.
    pub low_coverage_threshold: f64,
    /// Center distance, in metres, beyond which datasets are reported as
    /// being from different locations.
    pub mismatch_distance_m: f64,
    /// Buffer added to each side of a recommended bounding box, as a ratio
    /// of the extent.
    pub recommended_buffer_ratio: f64,
    /// Allowed relative difference between declared and derived pixel size.
    pub pixel_size_tolerance: f64,
    /// Applied to transformed coordinates, in raster CRS units.
    pub manual_offset: ManualOffset,
    pub diagnostics: bool,
    pub diagnostic_sample_size: usize,
    pub correction: CorrectionConfig,
    pub retry: RetryPolicy,
}

impl Default for ColorizeConfig {
    fn default() -> Self {
        Self {
            source_crs_override: None,
            regional_default_crs: EPSG_NAD83_UTM_13N,
            transform_batch_size: 500_000,
            low_coverage_threshold: 0.10,
            mismatch_distance_m: 100.0,
            recommended_buffer_ratio: 0.1,
            pixel_size_tolerance: 0.1,
            manual_offset: ManualOffset::default(),
            diagnostics: false,
            diagnostic_sample_size: 5000,
            correction: CorrectionConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ColorizeConfig {
    /// Loads a JSON config; missing fields take their defaults.
    pub fn from_path(path: &Path) -> Result<Self, ColorizeError> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|source| ColorizeError::Config {
            path: path.display().to_string(),
            source,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualOffset {
    pub x: f64,
    pub y: f64,
}

impl ManualOffset {
    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionConfig {
    pub enabled: bool,
    pub buffer_ratio: f64,
    /// Target ground size of one pixel of a replacement raster.
    pub native_pixel_size_m: f64,
    pub max_pixel_dimension: u32,
    /// Sizes tried, largest first, when the service rejects a request as too large.
    pub fallback_sizes: Vec<u32>,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_ratio: 0.1,
            native_pixel_size_m: 1.0,
            max_pixel_dimension: 4000,
            fallback_sizes: vec![2048, 1024, 512],
        }
    }
}
