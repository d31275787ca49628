use pcd_core::{
    crs::{EpsgCode, EPSG_WEB_MERCATOR, EPSG_WGS84_GEOGRAPHIC_2D},
    pointcloud::point::PointCloud,
};

use crate::{
    config::ColorizeConfig,
    error::ColorizeError,
    events::{ColorizeEvent, EventSink},
};

const WEB_MERCATOR_LIMIT: f64 = 20_037_508.34;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrsSource {
    Override,
    Embedded,
    /// Guessed from coordinate ranges by the named rule.
    Heuristic(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedCrs {
    pub epsg: EpsgCode,
    pub source: CrsSource,
}

/// Extent of the finite horizontal coordinates of a point cloud.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateRanges {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl CoordinateRanges {
    pub fn of(point_cloud: &PointCloud) -> Option<Self> {
        let mut ranges = Self {
            x_min: f64::INFINITY,
            x_max: f64::NEG_INFINITY,
            y_min: f64::INFINITY,
            y_max: f64::NEG_INFINITY,
        };
        let mut any = false;
        for point in &point_cloud.points {
            if !point.x.is_finite() || !point.y.is_finite() {
                continue;
            }
            any = true;
            ranges.x_min = ranges.x_min.min(point.x);
            ranges.x_max = ranges.x_max.max(point.x);
            ranges.y_min = ranges.y_min.min(point.y);
            ranges.y_max = ranges.y_max.max(point.y);
        }
        any.then_some(ranges)
    }
}

struct HeuristicRule {
    name: &'static str,
    matches: fn(&CoordinateRanges) -> bool,
    crs: fn(&ColorizeConfig) -> EpsgCode,
}

// Evaluated in order; the first match wins.
const RULES: &[HeuristicRule] = &[
    HeuristicRule {
        name: "geographic",
        matches: looks_geographic,
        crs: wgs84,
    },
    HeuristicRule {
        name: "web-mercator",
        matches: looks_web_mercator,
        crs: web_mercator,
    },
    HeuristicRule {
        name: "regional-grid",
        matches: looks_regional_grid,
        crs: regional_default,
    },
];

fn looks_geographic(r: &CoordinateRanges) -> bool {
    r.x_min >= -180.0 && r.x_max <= 180.0 && r.y_min >= -90.0 && r.y_max <= 90.0
}

fn looks_web_mercator(r: &CoordinateRanges) -> bool {
    r.x_min < -1_000_000.0
        && r.x_min.abs() < WEB_MERCATOR_LIMIT
        && r.y_min > 1_000_000.0
        && r.y_max < WEB_MERCATOR_LIMIT
}

fn looks_regional_grid(r: &CoordinateRanges) -> bool {
    r.x_min > 100_000.0 && r.x_min < 900_000.0 && r.y_min > 1_000_000.0 && r.y_min < 10_000_000.0
}

fn wgs84(_: &ColorizeConfig) -> EpsgCode {
    EPSG_WGS84_GEOGRAPHIC_2D
}

fn web_mercator(_: &ColorizeConfig) -> EpsgCode {
    EPSG_WEB_MERCATOR
}

fn regional_default(config: &ColorizeConfig) -> EpsgCode {
    config.regional_default_crs
}

/// Determines the CRS of `point_cloud`: override, then embedded, then heuristics.
pub fn resolve_crs(
    point_cloud: &PointCloud,
    config: &ColorizeConfig,
    sink: &dyn EventSink,
) -> Result<ResolvedCrs, ColorizeError> {
    let resolved = if let Some(epsg) = config.source_crs_override {
        ResolvedCrs {
            epsg,
            source: CrsSource::Override,
        }
    } else if let Some(epsg) = point_cloud.metadata.crs {
        ResolvedCrs {
            epsg,
            source: CrsSource::Embedded,
        }
    } else {
        guess_crs(point_cloud, config, sink)?
    };

    sink.emit(ColorizeEvent::CrsResolved {
        epsg: resolved.epsg,
        source: resolved.source,
    });
    Ok(resolved)
}

fn guess_crs(
    point_cloud: &PointCloud,
    config: &ColorizeConfig,
    sink: &dyn EventSink,
) -> Result<ResolvedCrs, ColorizeError> {
    let ranges = CoordinateRanges::of(point_cloud).ok_or(ColorizeError::CrsUndetermined {
        x_min: f64::NAN,
        x_max: f64::NAN,
        y_min: f64::NAN,
        y_max: f64::NAN,
    })?;

    let rule = RULES.iter().find(|rule| (rule.matches)(&ranges)).ok_or(
        ColorizeError::CrsUndetermined {
            x_min: ranges.x_min,
            x_max: ranges.x_max,
            y_min: ranges.y_min,
            y_max: ranges.y_max,
        },
    )?;

    let epsg = (rule.crs)(config);
    sink.emit(ColorizeEvent::CrsGuessed {
        epsg,
        rule: rule.name,
        x_range: (ranges.x_min, ranges.x_max),
        y_range: (ranges.y_min, ranges.y_max),
    });
    Ok(ResolvedCrs {
        epsg,
        source: CrsSource::Heuristic(rule.name),
    })
}
