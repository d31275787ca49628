use thiserror::Error;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("failed to open raster {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode GeoTIFF {path}: {source}")]
    Tiff {
        path: String,
        #[source]
        source: tiff::TiffError,
    },
    #[error("raster {path} has no coordinate reference system")]
    MissingCrs { path: String },
    #[error("raster {path} has no georeferencing tags")]
    MissingGeoreference { path: String },
    #[error("raster {path} has an unsupported layout: {message}")]
    UnsupportedLayout { path: String, message: String },
    #[error("invalid raster dimensions {width}x{height} with {bands} bands")]
    InvalidDimensions {
        width: usize,
        height: usize,
        bands: usize,
    },
    #[error("raster data has {actual} samples, expected {expected}")]
    DataLength { expected: usize, actual: usize },
}
