//! GeoTIFF reading and writing.
//!
//! Georeferencing is taken from ModelTransformation, or from ModelPixelScale
//! together with ModelTiepoint. The CRS comes from the GeoKeyDirectory.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Seek, Write},
    path::Path,
};

use pcd_core::crs::{epsg_from_geokeys, EpsgCode};
use tiff::{
    decoder::{Decoder, DecodingResult, Limits},
    encoder::{colortype, TiffEncoder, TiffKind, TiffValue},
    tags::Tag,
    TiffResult,
};

use crate::{
    affine::AffineTransform,
    error::RasterError,
    raster::{BandData, RasterImage},
};

// GeoTIFF tag IDs
const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;

// GeoKey IDs and values
const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;
const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;

/// Decodes a GeoTIFF into memory. The file is closed before this returns.
pub fn read_geotiff(path: &Path) -> Result<RasterImage, RasterError> {
    let display = path.display().to_string();
    let tiff_error = |source| RasterError::Tiff {
        path: display.clone(),
        source,
    };

    let file = File::open(path).map_err(|source| RasterError::Io {
        path: display.clone(),
        source,
    })?;
    let mut decoder = Decoder::new(BufReader::new(file))
        .map_err(tiff_error)?
        .with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions().map_err(tiff_error)?;
    let planar = decoder
        .find_tag_unsigned::<u16>(Tag::PlanarConfiguration)
        .map_err(tiff_error)?
        .unwrap_or(1);
    if planar != 1 {
        return Err(RasterError::UnsupportedLayout {
            path: display,
            message: format!("planar configuration {planar}"),
        });
    }
    let bands = decoder
        .find_tag_unsigned::<u16>(Tag::SamplesPerPixel)
        .map_err(tiff_error)?
        .unwrap_or(1) as usize;

    let transform = read_transform(&mut decoder)
        .map_err(tiff_error)?
        .ok_or_else(|| RasterError::MissingGeoreference {
            path: display.clone(),
        })?;
    let crs = read_crs(&mut decoder)
        .map_err(tiff_error)?
        .ok_or_else(|| RasterError::MissingCrs {
            path: display.clone(),
        })?;

    let data = match decoder.read_image().map_err(tiff_error)? {
        DecodingResult::U8(v) => BandData::UInt8(v),
        DecodingResult::U16(v) => BandData::UInt16(v),
        DecodingResult::F32(v) => BandData::Float32(v),
        DecodingResult::F64(v) => BandData::Float64(v),
        DecodingResult::U32(v) => BandData::Other(v.into_iter().map(f64::from).collect()),
        DecodingResult::U64(v) => BandData::Other(v.into_iter().map(|s| s as f64).collect()),
        DecodingResult::I8(v) => BandData::Other(v.into_iter().map(f64::from).collect()),
        DecodingResult::I16(v) => BandData::Other(v.into_iter().map(f64::from).collect()),
        DecodingResult::I32(v) => BandData::Other(v.into_iter().map(f64::from).collect()),
        DecodingResult::I64(v) => BandData::Other(v.into_iter().map(|s| s as f64).collect()),
        #[allow(unreachable_patterns)]
        _ => {
            return Err(RasterError::UnsupportedLayout {
                path: display,
                message: "unsupported sample type".to_string(),
            })
        }
    };

    log::debug!(
        "Read raster {}: {}x{}, {} bands, {:?}, EPSG:{}",
        display,
        width,
        height,
        bands,
        data.pixel_type(),
        crs
    );

    RasterImage::new(width as usize, height as usize, bands, data, transform, crs)
}

fn find_f64s<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    code: u16,
) -> TiffResult<Option<Vec<f64>>> {
    decoder
        .find_tag(Tag::from_u16_exhaustive(code))?
        .map(|value| value.into_f64_vec())
        .transpose()
}

fn read_transform<R: Read + Seek>(
    decoder: &mut Decoder<R>,
) -> TiffResult<Option<AffineTransform>> {
    if let Some(m) = find_f64s(decoder, MODEL_TRANSFORMATION)? {
        if m.len() >= 8 {
            return Ok(Some(AffineTransform::from_gdal([
                m[3], m[0], m[1], m[7], m[4], m[5],
            ])));
        }
    }

    let scale = find_f64s(decoder, MODEL_PIXEL_SCALE)?;
    let tiepoint = find_f64s(decoder, MODEL_TIEPOINT)?;
    match (scale, tiepoint) {
        (Some(s), Some(t)) if s.len() >= 2 && t.len() >= 6 => {
            let (i, j, x, y) = (t[0], t[1], t[3], t[4]);
            Ok(Some(AffineTransform {
                c: x - i * s[0],
                a: s[0],
                b: 0.0,
                f: y + j * s[1],
                d: 0.0,
                e: -s[1],
            }))
        }
        _ => Ok(None),
    }
}

fn read_crs<R: Read + Seek>(decoder: &mut Decoder<R>) -> TiffResult<Option<EpsgCode>> {
    let Some(value) = decoder.find_tag(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY))? else {
        return Ok(None);
    };
    let directory: Vec<u16> = value
        .into_u32_vec()?
        .into_iter()
        .map(|key| key as u16)
        .collect();
    Ok(epsg_from_geokeys(&directory))
}

/// Writes a 1- or 3-band raster as an uncompressed GeoTIFF.
pub fn write_geotiff(path: &Path, raster: &RasterImage) -> Result<(), RasterError> {
    let display = path.display().to_string();
    let tiff_error = |source| RasterError::Tiff {
        path: display.clone(),
        source,
    };
    let unsupported = |message: &str| RasterError::UnsupportedLayout {
        path: display.clone(),
        message: message.to_string(),
    };

    let file = File::create(path).map_err(|source| RasterError::Io {
        path: display.clone(),
        source,
    })?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file)).map_err(tiff_error)?;

    let result = match (raster.band_count(), raster.data()) {
        (1, BandData::UInt8(v)) => encode::<_, colortype::Gray8>(&mut encoder, raster, v),
        (3, BandData::UInt8(v)) => encode::<_, colortype::RGB8>(&mut encoder, raster, v),
        (1, BandData::UInt16(v)) => encode::<_, colortype::Gray16>(&mut encoder, raster, v),
        (3, BandData::UInt16(v)) => encode::<_, colortype::RGB16>(&mut encoder, raster, v),
        (1, BandData::Float32(v)) => encode::<_, colortype::Gray32Float>(&mut encoder, raster, v),
        (3, BandData::Float32(v)) => encode::<_, colortype::RGB32Float>(&mut encoder, raster, v),
        (1, BandData::Float64(v)) => encode::<_, colortype::Gray64Float>(&mut encoder, raster, v),
        (3, BandData::Float64(v)) => encode::<_, colortype::RGB64Float>(&mut encoder, raster, v),
        (1 | 3, BandData::Other(_)) => return Err(unsupported("untyped samples")),
        _ => return Err(unsupported("only 1 or 3 bands can be written")),
    };
    result.map_err(tiff_error)
}

fn encode<W, C>(
    encoder: &mut TiffEncoder<W>,
    raster: &RasterImage,
    samples: &[C::Inner],
) -> TiffResult<()>
where
    W: Write + Seek,
    C: colortype::ColorType,
    [C::Inner]: TiffValue,
{
    let mut image = encoder.new_image::<C>(raster.width() as u32, raster.height() as u32)?;
    write_geo_tags(image.encoder(), raster)?;
    image.write_data(samples)
}

fn write_geo_tags<W: Write + Seek, K: TiffKind>(
    dir: &mut tiff::encoder::DirectoryEncoder<W, K>,
    raster: &RasterImage,
) -> TiffResult<()> {
    let t = raster.transform();
    if t.b == 0.0 && t.d == 0.0 {
        let pixel_scale = [t.a, -t.e, 0.0];
        dir.write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), pixel_scale.as_slice())?;
        let tiepoint = [0.0, 0.0, 0.0, t.c, t.f, 0.0];
        dir.write_tag(Tag::Unknown(MODEL_TIEPOINT), tiepoint.as_slice())?;
    } else {
        let matrix = [
            t.a, t.b, 0.0, t.c, //
            t.d, t.e, 0.0, t.f, //
            0.0, 0.0, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        dir.write_tag(Tag::Unknown(MODEL_TRANSFORMATION), matrix.as_slice())?;
    }

    // EPSG codes 4000-4999 are geographic 2D CRSs
    let crs = raster.crs();
    let (model_type, crs_key) = if (4000..5000).contains(&crs) {
        (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE_GEO_KEY)
    } else {
        (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE_GEO_KEY)
    };
    let geokeys: [u16; 12] = [
        1, 1, 0, 2, //
        GT_MODEL_TYPE_GEO_KEY, 0, 1, model_type, //
        crs_key, 0, 1, crs,
    ];
    dir.write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), geokeys.as_slice())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::PixelType;

    fn temp_tif() -> tempfile::NamedTempFile {
        tempfile::Builder::new().suffix(".tif").tempfile().unwrap()
    }

    #[test]
    fn rgb8_round_trip() {
        let transform = AffineTransform::from_bounds(470000.0, 4419000.0, 471000.0, 4420000.0, 4, 2);
        let samples: Vec<u8> = (0..24).collect();
        let raster =
            RasterImage::new(4, 2, 3, BandData::UInt8(samples.clone()), transform, 26913).unwrap();

        let tmp = temp_tif();
        write_geotiff(tmp.path(), &raster).unwrap();
        let read = read_geotiff(tmp.path()).unwrap();

        assert_eq!(read.width(), 4);
        assert_eq!(read.height(), 2);
        assert_eq!(read.band_count(), 3);
        assert_eq!(read.crs(), 26913);
        assert_eq!(read.data(), &BandData::UInt8(samples));
        assert_eq!(read.transform().to_gdal(), transform.to_gdal());
    }

    #[test]
    fn gray16_geographic_round_trip() {
        let transform = AffineTransform::from_bounds(-105.1, 39.6, -105.0, 39.7, 2, 2);
        let raster = RasterImage::new(
            2,
            2,
            1,
            BandData::UInt16(vec![30000; 4]),
            transform,
            4326,
        )
        .unwrap();

        let tmp = temp_tif();
        write_geotiff(tmp.path(), &raster).unwrap();
        let read = read_geotiff(tmp.path()).unwrap();

        assert_eq!(read.crs(), 4326);
        assert_eq!(read.pixel_type(), PixelType::UInt16);
        let bounds = read.bounds().unwrap();
        assert!((bounds.west() + 105.1).abs() < 1e-9);
        assert!((bounds.north() - 39.7).abs() < 1e-9);
    }

    #[test]
    fn rotated_transform_round_trip() {
        let transform = AffineTransform::from_gdal([1000.0, 1.0, 0.5, 2000.0, 0.25, -1.0]);
        let raster =
            RasterImage::new(2, 2, 1, BandData::Float32(vec![0.5; 4]), transform, 3857).unwrap();

        let tmp = temp_tif();
        write_geotiff(tmp.path(), &raster).unwrap();
        let read = read_geotiff(tmp.path()).unwrap();
        assert_eq!(read.transform().to_gdal(), transform.to_gdal());
        assert_eq!(read.data(), &BandData::Float32(vec![0.5; 4]));
    }

    #[test]
    fn plain_tiff_without_crs_is_rejected() {
        let tmp = temp_tif();
        {
            let file = File::create(tmp.path()).unwrap();
            let mut encoder = TiffEncoder::new(BufWriter::new(file)).unwrap();
            let mut image = encoder.new_image::<colortype::Gray8>(2, 2).unwrap();
            image
                .encoder()
                .write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), [1.0, 1.0, 0.0].as_slice())
                .unwrap();
            image
                .encoder()
                .write_tag(
                    Tag::Unknown(MODEL_TIEPOINT),
                    [0.0, 0.0, 0.0, 10.0, 20.0, 0.0].as_slice(),
                )
                .unwrap();
            image.write_data(&[1, 2, 3, 4]).unwrap();
        }
        assert!(matches!(
            read_geotiff(tmp.path()),
            Err(RasterError::MissingCrs { .. })
        ));
    }

    #[test]
    fn tiff_without_georeference_is_rejected() {
        let tmp = temp_tif();
        {
            let file = File::create(tmp.path()).unwrap();
            let mut encoder = TiffEncoder::new(BufWriter::new(file)).unwrap();
            encoder
                .write_image::<colortype::Gray8>(2, 2, &[1, 2, 3, 4])
                .unwrap();
        }
        assert!(matches!(
            read_geotiff(tmp.path()),
            Err(RasterError::MissingGeoreference { .. })
        ));
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            read_geotiff(Path::new("/nonexistent/ortho.tif")),
            Err(RasterError::Io { .. })
        ));
    }
}
