pub mod affine;
pub mod error;
pub mod geotiff;
pub mod raster;

pub use affine::AffineTransform;
pub use error::RasterError;
pub use raster::{BandData, PixelType, RasterImage};
