//! Contracts for the external collaborators of the colorizer, and an
//! ArcGIS ImageServer client for orthophoto export.

pub mod contracts;
pub mod error;
pub mod image_server;
pub mod retry;

pub use contracts::{
    Dataset, Geocoder, ImageSize, ImagerySource, NativeResolution, PointCloudSource,
};
pub use error::{ExportFailure, GeocodeError, PointCloudSourceError, ServiceError};
pub use image_server::{ImageServerSource, ServiceInfo};
pub use retry::RetryPolicy;
