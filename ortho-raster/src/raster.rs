use pcd_core::{
    crs::EpsgCode,
    pointcloud::bounds::{BoundingBox, InvalidBounds},
};

use crate::{affine::AffineTransform, error::RasterError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    UInt8,
    UInt16,
    Float32,
    Float64,
    /// Any other integer sample type, widened to `f64`
    Other,
}

/// Pixel-interleaved sample storage (`[r, g, b, r, g, b, ...]` for three bands).
#[derive(Debug, Clone, PartialEq)]
pub enum BandData {
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Other(Vec<f64>),
}

impl BandData {
    pub fn pixel_type(&self) -> PixelType {
        match self {
            BandData::UInt8(_) => PixelType::UInt8,
            BandData::UInt16(_) => PixelType::UInt16,
            BandData::Float32(_) => PixelType::Float32,
            BandData::Float64(_) => PixelType::Float64,
            BandData::Other(_) => PixelType::Other,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            BandData::UInt8(v) => v.len(),
            BandData::UInt16(v) => v.len(),
            BandData::Float32(v) => v.len(),
            BandData::Float64(v) => v.len(),
            BandData::Other(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A decoded, georeferenced raster held fully in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    width: usize,
    height: usize,
    band_count: usize,
    data: BandData,
    transform: AffineTransform,
    crs: EpsgCode,
}

impl RasterImage {
    pub fn new(
        width: usize,
        height: usize,
        band_count: usize,
        data: BandData,
        transform: AffineTransform,
        crs: EpsgCode,
    ) -> Result<Self, RasterError> {
        if width == 0 || height == 0 || band_count == 0 {
            return Err(RasterError::InvalidDimensions {
                width,
                height,
                bands: band_count,
            });
        }
        let expected = width * height * band_count;
        if data.len() != expected {
            return Err(RasterError::DataLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            band_count,
            data,
            transform,
            crs,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn band_count(&self) -> usize {
        self.band_count
    }

    pub fn data(&self) -> &BandData {
        &self.data
    }

    pub fn pixel_type(&self) -> PixelType {
        self.data.pixel_type()
    }

    pub fn transform(&self) -> &AffineTransform {
        &self.transform
    }

    pub fn crs(&self) -> EpsgCode {
        self.crs
    }

    /// Offset of the first sample of pixel `(col, row)` in [`RasterImage::data`].
    pub fn sample_index(&self, col: usize, row: usize) -> usize {
        (row * self.width + col) * self.band_count
    }

    /// Envelope of the four transformed corners in the raster's CRS.
    pub fn bounds(&self) -> Result<BoundingBox, InvalidBounds> {
        let (west, south, east, north) = self.transform.bounds(self.width, self.height);
        BoundingBox::new(west, south, east, north, self.crs)
    }
}
