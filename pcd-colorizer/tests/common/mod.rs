#![allow(dead_code)]

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use ortho_raster::{geotiff::write_geotiff, AffineTransform, BandData, RasterImage};
use pcd_core::{
    crs::EpsgCode,
    pointcloud::{
        bounds::BoundingBox,
        point::{Point, PointCloud},
    },
};
use pcd_services::{ExportFailure, ImageSize, ImagerySource};

/// `n` x `n` points spaced `step` apart starting at `(x0, y0)`.
pub fn grid_cloud(x0: f64, y0: f64, n: usize, step: f64, crs: Option<EpsgCode>) -> PointCloud {
    let mut points = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            let mut point = Point::new(x0 + i as f64 * step, y0 + j as f64 * step, 1600.0 + j as f64);
            point.attributes.intensity = Some((i * n + j) as u16);
            point.attributes.classification = Some(2);
            points.push(point);
        }
    }
    PointCloud::new(points, crs)
}

/// North-up raster with 1 m pixels whose top-left corner is `(west, north)`.
pub fn raster(
    west: f64,
    north: f64,
    width: usize,
    height: usize,
    bands: usize,
    data: BandData,
    crs: EpsgCode,
) -> RasterImage {
    let transform = AffineTransform::from_gdal([west, 1.0, 0.0, north, 0.0, -1.0]);
    RasterImage::new(width, height, bands, data, transform, crs).unwrap()
}

pub fn white_rgb8(west: f64, north: f64, width: usize, height: usize, crs: EpsgCode) -> RasterImage {
    raster(
        west,
        north,
        width,
        height,
        3,
        BandData::UInt8(vec![255; width * height * 3]),
        crs,
    )
}

/// Writes a white RGB raster covering the requested bbox, like an image service would.
pub struct WhiteImageService {
    pub dir: PathBuf,
    pub calls: Arc<AtomicUsize>,
}

impl WhiteImageService {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl ImagerySource for WhiteImageService {
    fn export_image(
        &self,
        bbox: &BoundingBox,
        size: ImageSize,
        _cancelled: &dyn Fn() -> bool,
    ) -> Result<PathBuf, ExportFailure> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let (width, height) = match size {
            ImageSize::Explicit { width, height } => (width as usize, height as usize),
            ImageSize::Auto => (100, 100),
        };
        let transform = AffineTransform::from_bounds(
            bbox.west(),
            bbox.south(),
            bbox.east(),
            bbox.north(),
            width,
            height,
        );
        let raster = RasterImage::new(
            width,
            height,
            3,
            BandData::UInt8(vec![255; width * height * 3]),
            transform,
            bbox.crs(),
        )
        .map_err(|e| ExportFailure::InvalidResponse(e.to_string()))?;

        let path = self.dir.join(format!("replacement_{call}.tif"));
        write_geotiff(&path, &raster).map_err(|e| ExportFailure::InvalidResponse(e.to_string()))?;
        Ok(path)
    }
}

/// An image service that is always down.
pub struct UnavailableImageService {
    pub calls: Arc<AtomicUsize>,
}

impl UnavailableImageService {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl ImagerySource for UnavailableImageService {
    fn export_image(
        &self,
        _bbox: &BoundingBox,
        _size: ImageSize,
        _cancelled: &dyn Fn() -> bool,
    ) -> Result<PathBuf, ExportFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ExportFailure::InvalidResponse(
            "Error exporting image: service unavailable".to_string(),
        ))
    }
}
