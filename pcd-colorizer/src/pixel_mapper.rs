use ortho_raster::{AffineTransform, RasterImage};
use pcd_core::pointcloud::bounds::BoundingBox;
use rayon::prelude::*;

use crate::events::{ColorizeEvent, EventSink};

/// Pixel indices of transformed points, with a mask of those inside the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelMapping {
    pub cols: Vec<i64>,
    pub rows: Vec<i64>,
    pub valid: Vec<bool>,
    /// The transform actually used for the mapping.
    pub transform: AffineTransform,
    pub repaired: bool,
}

impl PixelMapping {
    pub fn len(&self) -> usize {
        self.valid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valid.is_empty()
    }

    pub fn valid_count(&self) -> usize {
        self.valid.par_iter().filter(|v| **v).count()
    }
}

/// Returns the raster's transform, or one derived from its bounds when the
/// declared pixel size disagrees with the bounds by more than `tolerance`.
pub fn checked_transform(
    raster: &RasterImage,
    bounds: &BoundingBox,
    tolerance: f64,
    sink: &dyn EventSink,
) -> (AffineTransform, bool) {
    let declared = *raster.transform();
    let expected_x = bounds.width() / raster.width() as f64;
    let expected_y = bounds.height() / raster.height() as f64;

    let disagrees = |declared: f64, expected: f64| {
        let diff = (declared.abs() - expected).abs() / expected;
        !diff.is_finite() || diff > tolerance
    };

    let consistent = declared.inverse().is_some()
        && !disagrees(declared.a, expected_x)
        && !disagrees(declared.e, expected_y);
    if consistent {
        return (declared, false);
    }

    sink.emit(ColorizeEvent::PixelTransformRepaired {
        declared: (declared.a, declared.e),
        expected: (expected_x, -expected_y),
    });
    let repaired = AffineTransform::from_bounds(
        bounds.west(),
        bounds.south(),
        bounds.east(),
        bounds.north(),
        raster.width(),
        raster.height(),
    );
    (repaired, true)
}

/// Maps world coordinates (in the raster CRS) to pixel column/row indices.
pub fn map_to_pixels(
    x: &[f64],
    y: &[f64],
    raster: &RasterImage,
    bounds: &BoundingBox,
    tolerance: f64,
    sink: &dyn EventSink,
) -> PixelMapping {
    let (transform, repaired) = checked_transform(raster, bounds, tolerance, sink);
    let width = raster.width() as i64;
    let height = raster.height() as i64;

    let indexed: Vec<(i64, i64, bool)> = match transform.inverse() {
        Some(inverse) => x
            .par_iter()
            .zip(y.par_iter())
            .map(|(&px, &py)| {
                let (col, row) = inverse.apply(px, py);
                let (col, row) = (col.floor(), row.floor());
                if !col.is_finite() || !row.is_finite() {
                    return (-1, -1, false);
                }
                let (col, row) = (col as i64, row as i64);
                let valid = (0..width).contains(&col) && (0..height).contains(&row);
                (col, row, valid)
            })
            .collect(),
        None => vec![(-1, -1, false); x.len().min(y.len())],
    };

    let mut cols = Vec::with_capacity(indexed.len());
    let mut rows = Vec::with_capacity(indexed.len());
    let mut valid = Vec::with_capacity(indexed.len());
    for (col, row, ok) in indexed {
        cols.push(col);
        rows.push(row);
        valid.push(ok);
    }

    PixelMapping {
        cols,
        rows,
        valid,
        transform,
        repaired,
    }
}
