//! Colorizes LiDAR point clouds from georeferenced orthophotos.
//!
//! The pipeline resolves the point cloud CRS, reprojects points into the
//! raster CRS, validates alignment (requesting a replacement raster once when
//! coverage is poor), maps points to pixels, samples colors and assembles a
//! trimmed, colorized point cloud.

pub mod alignment;
pub mod assembler;
pub mod builder;
pub mod cancel;
pub mod config;
pub mod correction;
pub mod crs_resolver;
pub mod diagnostic;
pub mod error;
pub mod events;
pub mod pixel_mapper;
pub mod raster;
pub mod runner;
pub mod sampler;
pub mod summary;
pub mod transform;

pub use alignment::{AlignmentReport, AlignmentStatus};
pub use builder::ColorizerBuilder;
pub use cancel::CancellationToken;
pub use config::{ColorizeConfig, CorrectionConfig, ManualOffset};
pub use crs_resolver::{CrsSource, ResolvedCrs};
pub use error::ColorizeError;
pub use events::{ColorizeEvent, EventSink, LogEventSink, MemoryEventSink};
pub use raster::load_raster;
pub use runner::{ColorizeOutput, Colorizer, PointCloudColorizer};
pub use summary::ColorizationSummary;
