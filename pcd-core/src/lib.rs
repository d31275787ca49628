pub mod crs;
pub mod pointcloud;
