use coordinate_transformer::unit_metres_at;
use pcd_core::pointcloud::bounds::BoundingBox;
use serde::Serialize;

use crate::{
    config::ColorizeConfig,
    diagnostic::DiagnosticImage,
    events::{ColorizeEvent, EventSink},
    pixel_mapper::PixelMapping,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentStatus {
    Aligned,
    LowCoverage,
    NoOverlap,
    /// Bounds are disjoint and far apart; the inputs likely cover different places.
    DifferentLocation,
}

impl AlignmentStatus {
    pub fn needs_correction(&self) -> bool {
        !matches!(self, AlignmentStatus::Aligned)
    }
}

#[derive(Debug, Clone)]
pub struct AlignmentReport {
    pub coverage_ratio: f64,
    pub overlaps_x: bool,
    pub overlaps_y: bool,
    pub valid_points: usize,
    pub total_points: usize,
    pub point_bounds: BoundingBox,
    pub raster_bounds: BoundingBox,
    /// Center-to-center distance in raster CRS units, only computed when an
    /// axis does not overlap.
    pub center_distance: Option<f64>,
    pub center_distance_m: Option<f64>,
    pub status: AlignmentStatus,
    /// Point bounds plus a buffer, suggested for re-acquiring imagery.
    pub recommended_bbox: Option<BoundingBox>,
    pub diagnostic: Option<DiagnosticImage>,
}

/// Distance between two points of `crs` in metres.
pub fn distance_metres(crs: u16, from: (f64, f64), to: (f64, f64)) -> f64 {
    let (unit_x, unit_y) = unit_metres_at(crs, (from.1 + to.1) / 2.0);
    ((to.0 - from.0) * unit_x).hypot((to.1 - from.1) * unit_y)
}

/// Checks how well transformed points line up with a raster.
///
/// Both bounds must be in the raster CRS.
pub fn validate_alignment(
    point_bounds: &BoundingBox,
    raster_bounds: &BoundingBox,
    mapping: &PixelMapping,
    config: &ColorizeConfig,
    sink: &dyn EventSink,
) -> AlignmentReport {
    let total_points = mapping.len();
    let valid_points = mapping.valid_count();
    let coverage_ratio = if total_points == 0 {
        0.0
    } else {
        valid_points as f64 / total_points as f64
    };
    let overlaps_x = point_bounds.overlaps_x(raster_bounds);
    let overlaps_y = point_bounds.overlaps_y(raster_bounds);

    let mut center_distance = None;
    let mut center_distance_m = None;
    let mut recommended_bbox = None;
    let status = if !overlaps_x || !overlaps_y {
        let (from, to) = (point_bounds.center(), raster_bounds.center());
        center_distance = Some((to.0 - from.0).hypot(to.1 - from.1));
        let distance = distance_metres(raster_bounds.crs(), from, to);
        center_distance_m = Some(distance);
        if distance > config.mismatch_distance_m {
            let recommended = point_bounds.buffered(config.recommended_buffer_ratio);
            sink.emit(ColorizeEvent::LocationMismatch {
                distance_m: distance,
                recommended,
            });
            recommended_bbox = Some(recommended);
            AlignmentStatus::DifferentLocation
        } else {
            AlignmentStatus::NoOverlap
        }
    } else if valid_points == 0 {
        AlignmentStatus::NoOverlap
    } else if coverage_ratio < config.low_coverage_threshold {
        AlignmentStatus::LowCoverage
    } else {
        AlignmentStatus::Aligned
    };

    AlignmentReport {
        coverage_ratio,
        overlaps_x,
        overlaps_y,
        valid_points,
        total_points,
        point_bounds: *point_bounds,
        raster_bounds: *raster_bounds,
        center_distance,
        center_distance_m,
        status,
        recommended_bbox,
        diagnostic: None,
    }
}
