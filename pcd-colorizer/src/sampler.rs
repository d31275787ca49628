use ortho_raster::{BandData, RasterImage};
use pcd_core::pointcloud::point::Color;
use rayon::prelude::*;

use crate::{
    error::ColorizeError,
    events::{ColorizeEvent, EventSink},
    pixel_mapper::PixelMapping,
};

/// Color of one point. Points off the raster keep black and `valid == false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColorSample {
    pub color: Color,
    pub valid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BandLayout {
    Rgb,
    Gray,
}

impl BandLayout {
    fn from_band_count(band_count: usize) -> Result<Self, ColorizeError> {
        match band_count {
            1 => Ok(Self::Gray),
            n if n >= 3 => Ok(Self::Rgb),
            n => Err(ColorizeError::UnsupportedBandCount(n)),
        }
    }

    fn channels(&self) -> &'static [usize] {
        match self {
            Self::Rgb => &[0, 1, 2],
            Self::Gray => &[0],
        }
    }
}

/// Fails for band counts that cannot be mapped to RGB.
pub fn check_band_count(band_count: usize) -> Result<(), ColorizeError> {
    BandLayout::from_band_count(band_count).map(|_| ())
}

pub fn normalize_u8(value: u8) -> u16 {
    value as u16 * 257
}

/// Scales a nominal 0.0..=1.0 sample to 16 bits. NaN maps to 0.
pub fn normalize_float(value: f64) -> u16 {
    if value.is_nan() {
        return 0;
    }
    (value * 65535.0).clamp(0.0, 65535.0) as u16
}

fn cast_to_u16(value: f64) -> u16 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, 65535.0) as u16
}

/// Float samples that fell outside the nominal range.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ClampStats {
    count: usize,
    min: f64,
    max: f64,
}

impl Default for ClampStats {
    fn default() -> Self {
        Self {
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl ClampStats {
    fn record(mut self, value: f64) -> Self {
        if value.is_nan() || !(0.0..=1.0).contains(&value) {
            self.count += 1;
        }
        if !value.is_nan() {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self
    }

    fn merge(self, other: Self) -> Self {
        Self {
            count: self.count + other.count,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

/// Reads a color for every mapped point from its pixel.
pub fn sample_colors(
    raster: &RasterImage,
    mapping: &PixelMapping,
    sink: &dyn EventSink,
) -> Result<Vec<ColorSample>, ColorizeError> {
    let layout = BandLayout::from_band_count(raster.band_count())?;

    let samples = match raster.data() {
        BandData::UInt8(values) => sample_with(raster, mapping, layout, |i| normalize_u8(values[i])),
        BandData::UInt16(values) => sample_with(raster, mapping, layout, |i| values[i]),
        BandData::Float32(values) => {
            report_clamped(raster, mapping, layout, |i| values[i] as f64, sink);
            sample_with(raster, mapping, layout, |i| normalize_float(values[i] as f64))
        }
        BandData::Float64(values) => {
            report_clamped(raster, mapping, layout, |i| values[i], sink);
            sample_with(raster, mapping, layout, |i| normalize_float(values[i]))
        }
        BandData::Other(values) => {
            sink.emit(ColorizeEvent::UncheckedPixelType);
            sample_with(raster, mapping, layout, |i| cast_to_u16(values[i]))
        }
    };
    Ok(samples)
}

/// Index of the first band of the pixel under point `i`, if it is on the raster.
fn pixel_offset(raster: &RasterImage, mapping: &PixelMapping, i: usize) -> Option<usize> {
    mapping.valid[i].then(|| raster.sample_index(mapping.cols[i] as usize, mapping.rows[i] as usize))
}

fn sample_with<F>(
    raster: &RasterImage,
    mapping: &PixelMapping,
    layout: BandLayout,
    read: F,
) -> Vec<ColorSample>
where
    F: Fn(usize) -> u16 + Sync,
{
    (0..mapping.len())
        .into_par_iter()
        .map(|i| match pixel_offset(raster, mapping, i) {
            Some(base) => ColorSample {
                color: match layout {
                    BandLayout::Rgb => Color::new(read(base), read(base + 1), read(base + 2)),
                    BandLayout::Gray => Color::gray(read(base)),
                },
                valid: true,
            },
            None => ColorSample::default(),
        })
        .collect()
}

fn report_clamped<F>(
    raster: &RasterImage,
    mapping: &PixelMapping,
    layout: BandLayout,
    read: F,
    sink: &dyn EventSink,
) where
    F: Fn(usize) -> f64 + Sync,
{
    let stats = (0..mapping.len())
        .into_par_iter()
        .filter_map(|i| pixel_offset(raster, mapping, i))
        .map(|base| {
            layout
                .channels()
                .iter()
                .fold(ClampStats::default(), |stats, band| stats.record(read(base + band)))
        })
        .reduce(ClampStats::default, ClampStats::merge);

    if stats.count > 0 {
        sink.emit(ColorizeEvent::ValuesClamped {
            count: stats.count,
            min: stats.min,
            max: stats.max,
        });
    }
}
