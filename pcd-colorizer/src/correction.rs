//! Re-acquisition of a raster that covers the point cloud.

use coordinate_transformer::unit_metres_at;
use ortho_raster::RasterImage;
use pcd_core::pointcloud::bounds::BoundingBox;
use pcd_services::{ExportFailure, ImageSize, ImagerySource, NativeResolution};

use crate::{
    cancel::CancellationToken,
    config::CorrectionConfig,
    error::ColorizeError,
    events::{ColorizeEvent, EventSink},
    raster::load_raster,
};

/// Ground extent of `bbox` in metres as `(width, height)`.
pub fn extent_metres(bbox: &BoundingBox) -> (f64, f64) {
    let (unit_x, unit_y) = unit_metres_at(bbox.crs(), bbox.center().1);
    (bbox.width() * unit_x, bbox.height() * unit_y)
}

/// Pixel size approximating `pixel_size_m` per pixel, scaled down
/// proportionally so the result fits within `max_width` x `max_height`.
pub fn native_size(
    bbox: &BoundingBox,
    pixel_size_m: f64,
    max_width: u32,
    max_height: u32,
) -> (u32, u32) {
    let (width_m, height_m) = extent_metres(bbox);
    let pixel = if pixel_size_m > 0.0 { pixel_size_m } else { 1.0 };
    let (max_width, max_height) = (max_width.max(1), max_height.max(1));
    let mut width = (width_m / pixel).ceil().max(1.0);
    let mut height = (height_m / pixel).ceil().max(1.0);
    let factor = (max_width as f64 / width).min(max_height as f64 / height);
    if factor < 1.0 {
        width = (width * factor).round().max(1.0);
        height = (height * factor).round().max(1.0);
    }
    ((width as u32).min(max_width), (height as u32).min(max_height))
}

/// Smaller sizes to try after a size-limit rejection of `(width, height)`.
///
/// Each keeps the aspect ratio with its largest side set to a fallback size;
/// only fallbacks below the rejected largest side are used.
pub fn fallback_sizes(width: u32, height: u32, fallbacks: &[u32]) -> Vec<(u32, u32)> {
    let largest = width.max(height);
    let mut sizes: Vec<u32> = fallbacks
        .iter()
        .copied()
        .filter(|size| *size > 0 && *size < largest)
        .collect();
    sizes.sort_unstable_by(|a, b| b.cmp(a));
    sizes.dedup();
    sizes
        .into_iter()
        .map(|size| {
            let scale = size as f64 / largest as f64;
            let scaled = |side: u32| ((side as f64 * scale).round() as u32).max(1);
            (scaled(width), scaled(height))
        })
        .collect()
}

/// Requests a replacement raster from an imagery service.
pub struct RasterCorrection<'a> {
    source: &'a dyn ImagerySource,
    config: &'a CorrectionConfig,
    cancel: &'a CancellationToken,
    sink: &'a dyn EventSink,
}

impl<'a> RasterCorrection<'a> {
    pub fn new(
        source: &'a dyn ImagerySource,
        config: &'a CorrectionConfig,
        cancel: &'a CancellationToken,
        sink: &'a dyn EventSink,
    ) -> Self {
        Self {
            source,
            config,
            cancel,
            sink,
        }
    }

    /// Area to request for points whose bounds in the raster CRS are `point_bounds`.
    pub fn request_bbox(&self, point_bounds: &BoundingBox) -> BoundingBox {
        point_bounds.buffered(self.config.buffer_ratio)
    }

    /// Fetches and decodes a raster covering `bbox`.
    ///
    /// Service and decoding failures are reported through the sink and yield
    /// `Ok(None)`; only cancellation is an error.
    pub fn acquire(&self, bbox: &BoundingBox) -> Result<Option<RasterImage>, ColorizeError> {
        let native = self.source.native_resolution().unwrap_or_default();
        let (width, height) = self.initial_size(bbox, &native);
        let mut sizes = vec![(width, height)];
        sizes.extend(fallback_sizes(width, height, &self.config.fallback_sizes));

        for (width, height) in sizes {
            self.cancel.check()?;
            let size = ImageSize::Explicit { width, height };
            self.sink.emit(ColorizeEvent::CorrectionRequested { bbox: *bbox, size });

            let cancelled = || self.cancel.is_cancelled();
            match self.source.export_image(bbox, size, &cancelled) {
                Ok(path) => {
                    self.cancel.check()?;
                    return match load_raster(&path) {
                        Ok(raster) => Ok(Some(raster)),
                        Err(e) => Ok(self.failed(format!("unreadable replacement raster: {e}"))),
                    };
                }
                Err(ExportFailure::SizeLimit { .. }) => {
                    self.sink
                        .emit(ColorizeEvent::CorrectionSizeLimited { width, height });
                }
                Err(ExportFailure::Cancelled) => return Err(ColorizeError::Cancelled),
                Err(e) => return Ok(self.failed(e.to_string())),
            }
        }
        Ok(self.failed("service rejected every requested size".to_string()))
    }

    /// First request size, preferring the service's published resolution and
    /// limits over the configured ones.
    fn initial_size(&self, bbox: &BoundingBox, native: &NativeResolution) -> (u32, u32) {
        let pixel_size_m = match (native.pixel_size, native.crs) {
            // y units do not depend on latitude
            (Some(size), Some(crs)) => size * unit_metres_at(crs, bbox.center().1).1,
            (Some(size), None) => size,
            (None, _) => self.config.native_pixel_size_m,
        };
        let max_width = native.max_width.unwrap_or(self.config.max_pixel_dimension);
        let max_height = native.max_height.unwrap_or(self.config.max_pixel_dimension);
        log::debug!(
            "Sizing replacement raster at {pixel_size_m:.3} m/pixel, at most {max_width}x{max_height}"
        );
        native_size(bbox, pixel_size_m, max_width, max_height)
    }

    fn failed(&self, reason: String) -> Option<RasterImage> {
        self.sink.emit(ColorizeEvent::CorrectionFailed { reason });
        None
    }
}
