//! Structured events emitted while colorizing.
//!
//! The pipeline never logs directly; it hands every observation to an
//! [`EventSink`]. [`LogEventSink`] forwards to the `log` facade and
//! [`MemoryEventSink`] keeps events for inspection.

use std::sync::Mutex;

use pcd_core::{crs::EpsgCode, pointcloud::bounds::BoundingBox};
use pcd_services::ImageSize;

use crate::{alignment::AlignmentStatus, crs_resolver::CrsSource};

#[derive(Debug, Clone, PartialEq)]
pub enum ColorizeEvent {
    CrsResolved {
        epsg: EpsgCode,
        source: CrsSource,
    },
    /// A CRS chosen from coordinate ranges alone.
    CrsGuessed {
        epsg: EpsgCode,
        rule: &'static str,
        x_range: (f64, f64),
        y_range: (f64, f64),
    },
    TransformProgress {
        done: usize,
        total: usize,
    },
    AlignmentChecked {
        attempt: u32,
        coverage_ratio: f64,
        status: AlignmentStatus,
    },
    LocationMismatch {
        distance_m: f64,
        recommended: BoundingBox,
    },
    LowCoverage {
        coverage_ratio: f64,
        threshold: f64,
    },
    CorrectionRequested {
        bbox: BoundingBox,
        size: ImageSize,
    },
    CorrectionSizeLimited {
        width: u32,
        height: u32,
    },
    CorrectionFailed {
        reason: String,
    },
    CorrectionEvaluated {
        coverage_before: f64,
        coverage_after: f64,
        kept_replacement: bool,
    },
    PixelTransformRepaired {
        declared: (f64, f64),
        expected: (f64, f64),
    },
    ValuesClamped {
        count: usize,
        min: f64,
        max: f64,
    },
    UncheckedPixelType,
    Colorized {
        total: usize,
        valid: usize,
        colorized: usize,
    },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: ColorizeEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn emit(&self, event: ColorizeEvent) {
        match event {
            ColorizeEvent::CrsResolved { epsg, source } => {
                log::info!("Point cloud CRS: EPSG:{epsg} ({source:?})")
            }
            ColorizeEvent::CrsGuessed {
                epsg,
                rule,
                x_range,
                y_range,
            } => log::warn!(
                "No CRS in point cloud; guessing EPSG:{epsg} by rule '{rule}' \
                 from x={x_range:?}, y={y_range:?}"
            ),
            ColorizeEvent::TransformProgress { done, total } => {
                log::debug!("Transformed {done}/{total} points")
            }
            ColorizeEvent::AlignmentChecked {
                attempt,
                coverage_ratio,
                status,
            } => log::info!(
                "Alignment check {attempt}: coverage {:.1}% ({status:?})",
                coverage_ratio * 100.0
            ),
            ColorizeEvent::LocationMismatch {
                distance_m,
                recommended,
            } => log::error!(
                "Point cloud and raster appear to be from different locations \
                 ({distance_m:.1} m apart); recommended bbox {} (EPSG:{})",
                recommended.to_bbox_string(),
                recommended.crs()
            ),
            ColorizeEvent::LowCoverage {
                coverage_ratio,
                threshold,
            } => log::warn!(
                "Low coverage: {:.1}% of points fall on the raster (threshold {:.1}%)",
                coverage_ratio * 100.0,
                threshold * 100.0
            ),
            ColorizeEvent::CorrectionRequested { bbox, size } => log::info!(
                "Requesting replacement raster for bbox {} ({size:?})",
                bbox.to_bbox_string()
            ),
            ColorizeEvent::CorrectionSizeLimited { width, height } => {
                log::info!("Size {width}x{height} exceeds the service limit, trying smaller")
            }
            ColorizeEvent::CorrectionFailed { reason } => {
                log::warn!("Raster correction failed, keeping original raster: {reason}")
            }
            ColorizeEvent::CorrectionEvaluated {
                coverage_before,
                coverage_after,
                kept_replacement,
            } => log::info!(
                "Coverage {:.1}% -> {:.1}% with replacement raster ({})",
                coverage_before * 100.0,
                coverage_after * 100.0,
                if kept_replacement { "kept" } else { "discarded" }
            ),
            ColorizeEvent::PixelTransformRepaired { declared, expected } => log::warn!(
                "Raster pixel size {declared:?} disagrees with bounds-derived {expected:?}; \
                 using a transform derived from bounds"
            ),
            ColorizeEvent::ValuesClamped { count, min, max } => log::warn!(
                "{count} float samples outside [0, 1] (min {min}, max {max}) were clamped"
            ),
            ColorizeEvent::UncheckedPixelType => {
                log::warn!("Unrecognized pixel type; casting samples directly to 16 bits")
            }
            ColorizeEvent::Colorized {
                total,
                valid,
                colorized,
            } => log::info!(
                "Colorized {colorized} of {valid} points kept ({total} in input)"
            ),
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<ColorizeEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ColorizeEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: ColorizeEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_keeps_order() {
        let sink = MemoryEventSink::new();
        sink.emit(ColorizeEvent::UncheckedPixelType);
        sink.emit(ColorizeEvent::TransformProgress { done: 1, total: 2 });
        assert_eq!(
            sink.events(),
            vec![
                ColorizeEvent::UncheckedPixelType,
                ColorizeEvent::TransformProgress { done: 1, total: 2 }
            ]
        );
    }
}
