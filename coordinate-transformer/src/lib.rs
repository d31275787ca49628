mod error;
mod proj4;
mod transformer;

pub use error::TransformError;
pub use proj4::{
    is_geographic_crs, linear_unit_metres, unit_metres_at, Proj4Transformer, METRES_PER_DEGREE,
};
pub use transformer::PointTransformer;
