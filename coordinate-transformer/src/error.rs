use pcd_core::crs::EpsgCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("EPSG:{0} is not in the CRS definition database")]
    UnknownCrs(EpsgCode),
    #[error("invalid definition for EPSG:{epsg}: {message}")]
    InvalidDefinition { epsg: EpsgCode, message: String },
    #[error("transform from EPSG:{from} to EPSG:{to} failed at ({x}, {y}): {message}")]
    Projection {
        from: EpsgCode,
        to: EpsgCode,
        x: f64,
        y: f64,
        message: String,
    },
    #[error("coordinate arrays differ in length: {x} x values, {y} y values")]
    LengthMismatch { x: usize, y: usize },
}
