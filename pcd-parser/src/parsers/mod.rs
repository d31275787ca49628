use std::path::Path;

use pcd_core::pointcloud::point::PointCloud;
use thiserror::Error;

pub mod las;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read LAS/LAZ file {path}: {source}")]
    Las {
        path: String,
        #[source]
        source: ::las::Error,
    },
    #[error("unsupported file extension: {0}")]
    UnsupportedExtension(String),
}

pub trait ParserProvider {
    fn get_parser(&self) -> Box<dyn Parser>;
}

pub trait Parser {
    fn parse(&self) -> Result<PointCloud, ParseError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    Las,
    Laz,
}

pub fn get_extension(path: &Path) -> Result<Extension, ParseError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "las" => Ok(Extension::Las),
        "laz" => Ok(Extension::Laz),
        _ => Err(ParseError::UnsupportedExtension(
            path.display().to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_detection() {
        assert_eq!(get_extension(Path::new("a/b.las")).unwrap(), Extension::Las);
        assert_eq!(get_extension(Path::new("b.LAZ")).unwrap(), Extension::Laz);
        assert!(get_extension(Path::new("points.csv")).is_err());
        assert!(get_extension(Path::new("noext")).is_err());
    }
}
