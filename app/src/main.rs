use std::{
    error::Error,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Local;
use clap::Parser;
use env_logger::Builder;
use log::LevelFilter;

use pcd_colorizer::{
    config::ManualOffset, load_raster, ColorizeConfig, ColorizeError, Colorizer as _,
    ColorizerBuilder, LogEventSink,
};
use pcd_core::crs::Crs;
use pcd_exporter::las::write_las;
use pcd_parser::parsers::{get_extension, las::LasParserProvider, Parser as _, ParserProvider as _};
use pcd_services::ImageServerSource;

#[derive(Parser, Debug)]
#[command(
    name = "pcolorize",
    about = "Colorizes LiDAR point clouds from georeferenced orthophotos",
    author = "MIERUNE Inc.",
    version = "0.0.1"
)]
struct Cli {
    /// Input LAS/LAZ file
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Orthophoto GeoTIFF
    #[arg(short, long, value_name = "FILE")]
    raster: PathBuf,

    /// Output LAS/LAZ file
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// JSON configuration; flags below take precedence
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// CRS of the point cloud, e.g. EPSG:2232, overriding detection
    #[arg(long, value_name = "CRS")]
    source_epsg: Option<Crs>,

    /// CRS assumed for projected coordinates without metadata
    #[arg(long, value_name = "CRS")]
    regional_epsg: Option<Crs>,

    /// Where to write the colorization summary JSON
    #[arg(long, value_name = "FILE")]
    summary: Option<PathBuf>,

    /// Where to write the alignment diagnostic PNG
    #[arg(long, value_name = "FILE")]
    diagnostic: Option<PathBuf>,

    /// ImageServer used to request a better-aligned orthophoto
    #[arg(long, value_name = "URL")]
    image_service_url: Option<String>,

    /// Directory for replacement orthophotos
    #[arg(long, value_name = "DIR", default_value = ".")]
    download_dir: PathBuf,

    #[arg(long)]
    no_correction: bool,

    /// Added to transformed x, in raster CRS units
    #[arg(long, allow_negative_numbers = true)]
    x_offset: Option<f64>,

    /// Added to transformed y, in raster CRS units
    #[arg(long, allow_negative_numbers = true)]
    y_offset: Option<f64>,
}

fn load_config(args: &Cli) -> Result<ColorizeConfig, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => ColorizeConfig::from_path(path)?,
        None => ColorizeConfig::default(),
    };
    if let Some(Crs(epsg)) = args.source_epsg {
        config.source_crs_override = Some(epsg);
    }
    if let Some(Crs(epsg)) = args.regional_epsg {
        config.regional_default_crs = epsg;
    }
    if args.no_correction {
        config.correction.enabled = false;
    }
    if args.diagnostic.is_some() {
        config.diagnostics = true;
    }
    if args.x_offset.is_some() || args.y_offset.is_some() {
        config.manual_offset = ManualOffset {
            x: args.x_offset.unwrap_or(config.manual_offset.x),
            y: args.y_offset.unwrap_or(config.manual_offset.y),
        };
    }
    Ok(config)
}

/// `<output stem>_alignment.png` next to the output point cloud.
fn alignment_diagnostic_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output.with_file_name(format!("{stem}_alignment.png"))
}

fn run(args: Cli) -> Result<(), Box<dyn Error>> {
    let start = std::time::Instant::now();
    get_extension(&args.input)?;
    get_extension(&args.output)?;
    let config = load_config(&args)?;

    log::info!("start parsing...");
    let start_local = std::time::Instant::now();
    let point_cloud = LasParserProvider {
        filename: args.input.clone(),
    }
    .get_parser()
    .parse()?;
    log::info!(
        "Parsed {} points (format {}) in {:?}",
        point_cloud.len(),
        point_cloud.metadata.point_format,
        start_local.elapsed()
    );

    let raster = load_raster(&args.raster)?;
    log::info!(
        "Orthophoto: {}x{}, {} band(s), {:?}, EPSG:{}",
        raster.width(),
        raster.height(),
        raster.band_count(),
        raster.pixel_type(),
        raster.crs()
    );

    let mut builder = ColorizerBuilder::new()
        .event_sink(Arc::new(LogEventSink))
        .config(config.clone());
    if let Some(url) = &args.image_service_url {
        std::fs::create_dir_all(&args.download_dir)?;
        let source = ImageServerSource::new(
            url,
            raster.crs(),
            &args.download_dir,
            config.retry.clone(),
        )?;
        builder = builder.imagery_source(Box::new(source));
    }

    log::info!("start colorizing...");
    let start_local = std::time::Instant::now();
    let result = builder.build().execute(&point_cloud, raster);
    match &result {
        Ok(output) => {
            if let (Some(path), Some(diagnostic)) = (&args.diagnostic, &output.report.diagnostic) {
                diagnostic.save_png(path)?;
            }
        }
        Err(ColorizeError::NoOverlap {
            diagnostic: Some(diagnostic),
            ..
        }) => {
            let path = args
                .diagnostic
                .clone()
                .unwrap_or_else(|| alignment_diagnostic_path(&args.output));
            diagnostic.save_png(&path)?;
            log::info!("Wrote alignment diagnostic to {:?}", path);
        }
        Err(_) => {}
    }
    let output = result?;
    log::info!("Finish colorizing in {:?}", start_local.elapsed());

    write_las(&args.output, &output.point_cloud)?;
    log::info!("write point cloud: {:?}", args.output);

    if let Some(path) = &args.summary {
        output
            .summary
            .clone()
            .with_paths(&args.input, &args.raster, &args.output)
            .write_json(path)?;
    }
    let stats = &output.summary.processing_stats;
    log::info!(
        "Kept {}/{} points ({:.1}%), colorized {:.1}%",
        stats.trimmed_points,
        stats.original_total_points,
        stats.trimming_rate * 100.0,
        stats.colorization_rate * 100.0
    );
    log::info!("Elapsed: {:?}", start.elapsed());
    Ok(())
}

fn main() {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Cli::parse();

    log::info!("input point cloud: {:?}", args.input);
    log::info!("input orthophoto: {:?}", args.raster);
    log::info!("output point cloud: {:?}", args.output);

    if let Err(e) = run(args) {
        log::error!("Colorization failed: {e}");
        let mut source = e.source();
        while let Some(cause) = source {
            log::error!("  caused by: {cause}");
            source = cause.source();
        }
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_diagnostic_sits_beside_output() {
        assert_eq!(
            alignment_diagnostic_path(Path::new("out/colored.las")),
            PathBuf::from("out/colored_alignment.png")
        );
    }
}
