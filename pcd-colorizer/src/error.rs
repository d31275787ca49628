use coordinate_transformer::TransformError;
use ortho_raster::RasterError;
use pcd_core::{crs::EpsgCode, pointcloud::bounds::InvalidBounds};
use thiserror::Error;

use crate::diagnostic::DiagnosticImage;

#[derive(Debug, Error)]
pub enum ColorizeError {
    #[error(
        "cannot determine the point cloud CRS from coordinates x=[{x_min}, {x_max}], \
         y=[{y_min}, {y_max}]; supply a source CRS override"
    )]
    CrsUndetermined {
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
    },
    #[error("transforming points {start}..{end} from EPSG:{from} to EPSG:{to} failed")]
    TransformFailure {
        from: EpsgCode,
        to: EpsgCode,
        start: usize,
        end: usize,
        #[source]
        source: TransformError,
    },
    #[error(
        "point cloud {point_bounds} does not overlap raster {raster_bounds}; {remediation}"
    )]
    NoOverlap {
        point_bounds: String,
        raster_bounds: String,
        remediation: String,
        /// Overlay of the points on the raster extent.
        diagnostic: Option<Box<DiagnosticImage>>,
    },
    #[error("raster has {0} bands; expected 1 or at least 3")]
    UnsupportedBandCount(usize),
    #[error("point format {0} cannot carry color")]
    UnsupportedPointFormat(u8),
    #[error("raster {0} has no CRS")]
    MissingRasterCrs(String),
    #[error(transparent)]
    Raster(RasterError),
    #[error("point cloud has no points")]
    EmptyPointCloud,
    #[error("colorization was cancelled")]
    Cancelled,
    #[error(transparent)]
    InvalidBounds(#[from] InvalidBounds),
    #[error("invalid config {path}: {source}")]
    Config {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<RasterError> for ColorizeError {
    fn from(e: RasterError) -> Self {
        match e {
            RasterError::MissingCrs { path } => ColorizeError::MissingRasterCrs(path),
            other => ColorizeError::Raster(other),
        }
    }
}
