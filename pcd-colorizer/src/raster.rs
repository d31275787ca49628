use std::path::Path;

use ortho_raster::{geotiff::read_geotiff, RasterImage};

use crate::error::ColorizeError;

/// Reads an orthophoto GeoTIFF into memory.
pub fn load_raster(path: &Path) -> Result<RasterImage, ColorizeError> {
    let raster = read_geotiff(path)?;
    log::debug!(
        "Loaded {} ({}x{}, EPSG:{})",
        path.display(),
        raster.width(),
        raster.height(),
        raster.crs()
    );
    Ok(raster)
}
