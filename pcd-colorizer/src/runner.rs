use std::sync::Arc;

use ortho_raster::RasterImage;
use pcd_core::{crs::EpsgCode, pointcloud::point::PointCloud};
use pcd_services::ImagerySource;

use crate::{
    alignment::{validate_alignment, AlignmentReport},
    assembler::{assemble, output_point_format},
    cancel::CancellationToken,
    config::ColorizeConfig,
    correction::RasterCorrection,
    crs_resolver::{resolve_crs, ResolvedCrs},
    diagnostic::DiagnosticImage,
    error::ColorizeError,
    events::{ColorizeEvent, EventSink},
    pixel_mapper::{map_to_pixels, PixelMapping},
    sampler::{check_band_count, sample_colors},
    summary::ColorizationSummary,
    transform::{CoordinateTransform, TransformedCoordinates},
};

// Replacement rasters requested per run.
const MAX_CORRECTIONS: u32 = 1;

pub trait Colorizer {
    /// Colorizes `point_cloud` from `raster`. Neither input is modified.
    fn execute(
        &self,
        point_cloud: &PointCloud,
        raster: RasterImage,
    ) -> Result<ColorizeOutput, ColorizeError>;
}

#[derive(Debug)]
pub struct ColorizeOutput {
    /// Points that fall on the raster, with colors assigned.
    pub point_cloud: PointCloud,
    pub report: AlignmentReport,
    pub summary: ColorizationSummary,
    pub resolved_crs: ResolvedCrs,
    pub raster_replaced: bool,
}

pub struct PointCloudColorizer {
    config: ColorizeConfig,
    sink: Arc<dyn EventSink>,
    imagery: Option<Box<dyn ImagerySource>>,
    cancel: CancellationToken,
}

/// One alignment of the points against one raster.
struct Attempt {
    raster: RasterImage,
    coordinates: TransformedCoordinates,
    mapping: PixelMapping,
    report: AlignmentReport,
}

impl PointCloudColorizer {
    pub fn new(
        config: ColorizeConfig,
        sink: Arc<dyn EventSink>,
        imagery: Option<Box<dyn ImagerySource>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            sink,
            imagery,
            cancel,
        }
    }

    pub fn config(&self) -> &ColorizeConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn align(
        &self,
        x: &[f64],
        y: &[f64],
        source_crs: EpsgCode,
        raster: RasterImage,
        attempt: u32,
    ) -> Result<Attempt, ColorizeError> {
        let coordinates = CoordinateTransform::new(source_crs, raster.crs())
            .with_batch_size(self.config.transform_batch_size)
            .with_offset(self.config.manual_offset)
            .run(x, y, &self.cancel, self.sink.as_ref())?;

        let raster_bounds = raster.bounds()?;
        let point_bounds = coordinates.bounds()?;
        let mapping = map_to_pixels(
            &coordinates.x,
            &coordinates.y,
            &raster,
            &raster_bounds,
            self.config.pixel_size_tolerance,
            self.sink.as_ref(),
        );
        let mut report = validate_alignment(
            &point_bounds,
            &raster_bounds,
            &mapping,
            &self.config,
            self.sink.as_ref(),
        );
        // Disjoint bounds always get an overlay.
        if self.config.diagnostics || !report.overlaps_x || !report.overlaps_y {
            report.diagnostic = Some(DiagnosticImage::render(
                &coordinates.x,
                &coordinates.y,
                &mapping.valid,
                &raster_bounds,
                self.config.diagnostic_sample_size,
            ));
        }

        self.sink.emit(ColorizeEvent::AlignmentChecked {
            attempt,
            coverage_ratio: report.coverage_ratio,
            status: report.status,
        });
        Ok(Attempt {
            raster,
            coordinates,
            mapping,
            report,
        })
    }

    /// Aligns against the original raster, then against at most
    /// `MAX_CORRECTIONS` replacements, keeping whichever covers more points.
    fn align_with_correction(
        &self,
        x: &[f64],
        y: &[f64],
        source_crs: EpsgCode,
        raster: RasterImage,
        remediation: &mut Vec<String>,
    ) -> Result<(Attempt, bool), ColorizeError> {
        let mut current = self.align(x, y, source_crs, raster, 1)?;
        let mut replaced = false;

        for attempt in 2..=MAX_CORRECTIONS + 1 {
            if !current.report.status.needs_correction() {
                break;
            }
            if !self.config.correction.enabled {
                remediation.push("raster correction is disabled".to_string());
                break;
            }
            let Some(imagery) = self.imagery.as_deref() else {
                remediation.push("no imagery source is configured for raster correction".to_string());
                break;
            };

            let correction = RasterCorrection::new(
                imagery,
                &self.config.correction,
                &self.cancel,
                self.sink.as_ref(),
            );
            let bbox = correction.request_bbox(&current.report.point_bounds);
            let Some(replacement) = correction.acquire(&bbox)? else {
                remediation.push(format!(
                    "replacement raster request for {} (EPSG:{}) failed",
                    bbox.to_bbox_string(),
                    bbox.crs()
                ));
                break;
            };

            let candidate = check_band_count(replacement.band_count())
                .and_then(|_| self.align(x, y, source_crs, replacement, attempt));
            let candidate = match candidate {
                Ok(candidate) => candidate,
                Err(ColorizeError::Cancelled) => return Err(ColorizeError::Cancelled),
                Err(e) => {
                    self.sink.emit(ColorizeEvent::CorrectionFailed {
                        reason: e.to_string(),
                    });
                    remediation.push(format!("replacement raster was unusable: {e}"));
                    break;
                }
            };

            let kept = candidate.report.coverage_ratio > current.report.coverage_ratio;
            self.sink.emit(ColorizeEvent::CorrectionEvaluated {
                coverage_before: current.report.coverage_ratio,
                coverage_after: candidate.report.coverage_ratio,
                kept_replacement: kept,
            });
            remediation.push(format!(
                "replacement raster for {} (EPSG:{}) covered {:.1}% of points",
                bbox.to_bbox_string(),
                bbox.crs(),
                candidate.report.coverage_ratio * 100.0
            ));
            if kept {
                current = candidate;
                replaced = true;
            }
        }

        Ok((current, replaced))
    }
}

impl Colorizer for PointCloudColorizer {
    fn execute(
        &self,
        point_cloud: &PointCloud,
        raster: RasterImage,
    ) -> Result<ColorizeOutput, ColorizeError> {
        if point_cloud.is_empty() {
            return Err(ColorizeError::EmptyPointCloud);
        }
        output_point_format(point_cloud.metadata.point_format)?;
        check_band_count(raster.band_count())?;
        self.cancel.check()?;

        let start = std::time::Instant::now();
        let resolved_crs = resolve_crs(point_cloud, &self.config, self.sink.as_ref())?;
        let (x, y) = point_cloud.xy();

        let mut remediation = Vec::new();
        let (attempt, raster_replaced) =
            self.align_with_correction(&x, &y, resolved_crs.epsg, raster, &mut remediation)?;
        let Attempt {
            raster,
            coordinates,
            mapping,
            report,
        } = attempt;
        log::debug!(
            "Aligned {} points in EPSG:{}: {:?}",
            coordinates.len(),
            coordinates.crs,
            start.elapsed()
        );

        if report.valid_points == 0 {
            if let Some(recommended) = report.recommended_bbox {
                remediation.push(format!(
                    "request imagery for {} (EPSG:{})",
                    recommended.to_bbox_string(),
                    recommended.crs()
                ));
            }
            if remediation.is_empty() {
                remediation.push("supply a raster that covers the point cloud".to_string());
            }
            return Err(ColorizeError::NoOverlap {
                point_bounds: report.point_bounds.to_bbox_string(),
                raster_bounds: format!(
                    "{} (EPSG:{})",
                    report.raster_bounds.to_bbox_string(),
                    report.raster_bounds.crs()
                ),
                remediation: remediation.join("; "),
                diagnostic: report.diagnostic.map(Box::new),
            });
        }
        if report.coverage_ratio < self.config.low_coverage_threshold {
            self.sink.emit(ColorizeEvent::LowCoverage {
                coverage_ratio: report.coverage_ratio,
                threshold: self.config.low_coverage_threshold,
            });
        }

        self.cancel.check()?;
        let samples = sample_colors(&raster, &mapping, self.sink.as_ref())?;
        drop(raster);
        let colorized = assemble(point_cloud, &samples)?;

        let summary = ColorizationSummary::from_samples(
            &samples,
            report.coverage_ratio,
            report.status,
            raster_replaced,
        );
        self.sink.emit(ColorizeEvent::Colorized {
            total: summary.processing_stats.original_total_points,
            valid: summary.processing_stats.trimmed_points,
            colorized: summary.processing_stats.colorized_points,
        });
        log::debug!("Colorization finished: {:?}", start.elapsed());

        Ok(ColorizeOutput {
            point_cloud: colorized,
            report,
            summary,
            resolved_crs,
            raster_replaced,
        })
    }
}
