use coordinate_transformer::{PointTransformer, TransformError};
use pcd_core::{
    crs::EpsgCode,
    pointcloud::bounds::{BoundingBox, InvalidBounds},
};

use crate::{
    cancel::CancellationToken,
    config::ManualOffset,
    error::ColorizeError,
    events::{ColorizeEvent, EventSink},
};

pub const DEFAULT_BATCH_SIZE: usize = 500_000;

// Pads degenerate extents so a single point still has valid bounds.
const MIN_EXTENT: f64 = 1e-6;

/// Horizontal coordinates reprojected into `crs`, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedCoordinates {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub crs: EpsgCode,
}

impl TransformedCoordinates {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn bounds(&self) -> Result<BoundingBox, InvalidBounds> {
        BoundingBox::from_xy(&self.x, &self.y, self.crs, MIN_EXTENT)
    }
}

/// Batched reprojection of coordinate arrays between two EPSG codes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateTransform {
    from: EpsgCode,
    to: EpsgCode,
    batch_size: usize,
    offset: ManualOffset,
}

impl CoordinateTransform {
    pub fn new(from: EpsgCode, to: EpsgCode) -> Self {
        Self {
            from,
            to,
            batch_size: DEFAULT_BATCH_SIZE,
            offset: ManualOffset::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Offset added to every transformed coordinate, in target CRS units.
    pub fn with_offset(mut self, offset: ManualOffset) -> Self {
        self.offset = offset;
        self
    }

    /// Transforms copies of `x` and `y`. Any failing batch aborts the whole run.
    pub fn run(
        &self,
        x: &[f64],
        y: &[f64],
        cancel: &CancellationToken,
        sink: &dyn EventSink,
    ) -> Result<TransformedCoordinates, ColorizeError> {
        let total = x.len();
        if y.len() != total {
            return Err(self.failure(
                0,
                total,
                TransformError::LengthMismatch {
                    x: total,
                    y: y.len(),
                },
            ));
        }

        let mut transformer =
            PointTransformer::new(self.from, self.to).map_err(|e| self.failure(0, total, e))?;

        let mut xs = x.to_vec();
        let mut ys = y.to_vec();

        if !transformer.is_identity() {
            let start_time = std::time::Instant::now();
            for start in (0..total).step_by(self.batch_size) {
                cancel.check()?;
                let end = (start + self.batch_size).min(total);
                transformer
                    .transform_xy(&mut xs[start..end], &mut ys[start..end])
                    .map_err(|e| self.failure(start, end, e))?;
                sink.emit(ColorizeEvent::TransformProgress { done: end, total });
            }
            log::debug!(
                "EPSG:{} -> EPSG:{} for {total} points: {:?}",
                self.from,
                self.to,
                start_time.elapsed()
            );
        }

        if !self.offset.is_zero() {
            xs.iter_mut().for_each(|v| *v += self.offset.x);
            ys.iter_mut().for_each(|v| *v += self.offset.y);
        }

        Ok(TransformedCoordinates {
            x: xs,
            y: ys,
            crs: self.to,
        })
    }

    fn failure(&self, start: usize, end: usize, source: TransformError) -> ColorizeError {
        ColorizeError::TransformFailure {
            from: self.from,
            to: self.to,
            start,
            end,
            source,
        }
    }
}
