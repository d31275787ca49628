use std::{
    fs::File,
    io::{BufWriter, Write as _},
    path::Path,
};

use serde::Serialize;

use crate::{alignment::AlignmentStatus, error::ColorizeError, sampler::ColorSample};

/// Counts and color statistics of one colorization run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorizationSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_point_cloud: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_orthophoto: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_point_cloud: Option<String>,
    pub processing_stats: ProcessingStats,
    pub color_stats: ColorStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingStats {
    pub original_total_points: usize,
    /// Points kept because they fall on the raster.
    pub trimmed_points: usize,
    pub trimming_rate: f64,
    /// Kept points with at least one non-zero channel.
    pub colorized_points: usize,
    pub colorization_rate: f64,
    pub coverage_ratio: f64,
    pub alignment_status: AlignmentStatus,
    pub raster_replaced: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColorStats {
    pub mean_red: f64,
    pub mean_green: f64,
    pub mean_blue: f64,
    pub min_red: u16,
    pub min_green: u16,
    pub min_blue: u16,
    pub max_red: u16,
    pub max_green: u16,
    pub max_blue: u16,
}

impl ColorizationSummary {
    pub fn from_samples(
        samples: &[ColorSample],
        coverage_ratio: f64,
        alignment_status: AlignmentStatus,
        raster_replaced: bool,
    ) -> Self {
        let total = samples.len();
        let valid: Vec<_> = samples.iter().filter(|s| s.valid).map(|s| s.color).collect();
        let colorized = valid.iter().filter(|c| !c.is_black()).count();

        let mut color_stats = ColorStats::default();
        if !valid.is_empty() {
            let n = valid.len() as f64;
            color_stats.mean_red = valid.iter().map(|c| c.r as f64).sum::<f64>() / n;
            color_stats.mean_green = valid.iter().map(|c| c.g as f64).sum::<f64>() / n;
            color_stats.mean_blue = valid.iter().map(|c| c.b as f64).sum::<f64>() / n;
            color_stats.min_red = valid.iter().map(|c| c.r).min().unwrap_or_default();
            color_stats.min_green = valid.iter().map(|c| c.g).min().unwrap_or_default();
            color_stats.min_blue = valid.iter().map(|c| c.b).min().unwrap_or_default();
            color_stats.max_red = valid.iter().map(|c| c.r).max().unwrap_or_default();
            color_stats.max_green = valid.iter().map(|c| c.g).max().unwrap_or_default();
            color_stats.max_blue = valid.iter().map(|c| c.b).max().unwrap_or_default();
        }

        Self {
            input_point_cloud: None,
            input_orthophoto: None,
            output_point_cloud: None,
            processing_stats: ProcessingStats {
                original_total_points: total,
                trimmed_points: valid.len(),
                trimming_rate: ratio(valid.len(), total),
                colorized_points: colorized,
                colorization_rate: ratio(colorized, valid.len()),
                coverage_ratio,
                alignment_status,
                raster_replaced,
            },
            color_stats,
        }
    }

    pub fn with_paths(mut self, point_cloud: &Path, orthophoto: &Path, output: &Path) -> Self {
        self.input_point_cloud = Some(point_cloud.display().to_string());
        self.input_orthophoto = Some(orthophoto.display().to_string());
        self.output_point_cloud = Some(output.display().to_string());
        self
    }

    pub fn write_json(&self, path: &Path) -> Result<(), ColorizeError> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        log::info!("Summary report saved: {}", path.display());
        Ok(())
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}
