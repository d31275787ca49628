use std::path::PathBuf;

use pcd_core::{crs::EpsgCode, pointcloud::bounds::BoundingBox};
use serde::{Deserialize, Serialize};

use crate::error::{ExportFailure, GeocodeError, PointCloudSourceError};

/// Resolves a street address to WGS84 `(lat, lon)`.
pub trait Geocoder {
    fn geocode(&self, address: &str) -> Result<(f64, f64), GeocodeError>;
}

/// A downloadable LiDAR dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub url: String,
}

pub trait PointCloudSource {
    fn find_datasets(&self, lat: f64, lon: f64) -> Result<Vec<Dataset>, PointCloudSourceError>;

    /// Downloads `dataset`, optionally clipped to `bounds`, and returns the local path.
    fn download(
        &self,
        dataset: &Dataset,
        bounds: Option<&BoundingBox>,
    ) -> Result<PathBuf, PointCloudSourceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSize {
    Explicit { width: u32, height: u32 },
    /// Let the service pick its default size.
    Auto,
}

/// Native imagery resolution and request limits published by a service.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NativeResolution {
    /// Pixel size in units of `crs`.
    pub pixel_size: Option<f64>,
    /// `None` when the unit is not known to be anything but metres.
    pub crs: Option<EpsgCode>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

pub trait ImagerySource {
    /// Exports an orthophoto covering `bbox` (in `bbox.crs()`) as a GeoTIFF.
    ///
    /// `cancelled` is polled between attempts; a true value ends the export
    /// with [`ExportFailure::Cancelled`].
    fn export_image(
        &self,
        bbox: &BoundingBox,
        size: ImageSize,
        cancelled: &dyn Fn() -> bool,
    ) -> Result<PathBuf, ExportFailure>;

    fn native_resolution(&self) -> Option<NativeResolution> {
        None
    }
}
