use std::path::Path;

use byteorder::{ByteOrder as _, LittleEndian};
use thiserror::Error;

use pcd_core::{
    crs::EpsgCode,
    pointcloud::point::{format_has_waveform, Metadata, Point, PointCloud, VariableLengthRecord},
};

const LASF_PROJECTION: &str = "LASF_Projection";
const GEO_KEY_DIRECTORY_RECORD: u16 = 34735;
const DEFAULT_VERSION: (u8, u8) = (1, 2);

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write LAS/LAZ file {path}: {source}")]
    Las {
        path: String,
        #[source]
        source: ::las::Error,
    },
    #[error("point format {0} cannot be written")]
    UnsupportedPointFormat(u8),
    #[error("invalid scale {scale:?}: every axis must be positive and finite")]
    InvalidScale { scale: [f64; 3] },
}

/// Writes `point_cloud` to `path`, compressing when the extension is `.laz`.
///
/// Header scale, offset, version, point format and VLRs come from the point
/// cloud's metadata. When the metadata carries an EPSG code but no projection
/// record, a GeoKeyDirectory record is added.
pub fn write_las(path: &Path, point_cloud: &PointCloud) -> Result<(), ExportError> {
    let start = std::time::Instant::now();
    let display = path.display().to_string();
    let las_error = |source| ExportError::Las {
        path: display.clone(),
        source,
    };

    let metadata = &point_cloud.metadata;
    if format_has_waveform(metadata.point_format) {
        return Err(ExportError::UnsupportedPointFormat(metadata.point_format));
    }
    if !metadata
        .scale
        .iter()
        .all(|scale| scale.is_finite() && *scale > 0.0)
    {
        return Err(ExportError::InvalidScale {
            scale: metadata.scale,
        });
    }

    let compressed = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("laz"));
    let extra_bytes = point_cloud
        .points
        .first()
        .map_or(0, |point| point.attributes.extra_bytes.len());

    let header = build_header(metadata, compressed, extra_bytes).map_err(las_error)?;
    let format = *header.point_format();

    let mut writer = ::las::Writer::from_path(path, header).map_err(las_error)?;
    for point in &point_cloud.points {
        let las_point = to_las_point(point, &format, extra_bytes).map_err(las_error)?;
        writer.write_point(las_point).map_err(las_error)?;
    }
    writer.close().map_err(las_error)?;

    log::info!(
        "Wrote {} points to {} in {:?}",
        point_cloud.len(),
        display,
        start.elapsed()
    );
    Ok(())
}

fn build_header(
    metadata: &Metadata,
    compressed: bool,
    extra_bytes: usize,
) -> Result<::las::Header, ::las::Error> {
    let version = output_version(metadata.version, metadata.point_format);
    let mut builder = ::las::Builder::from(version);

    let mut point_format = ::las::point::Format::new(metadata.point_format)?;
    point_format.extra_bytes = extra_bytes as u16;
    point_format.is_compressed = compressed;
    builder.point_format = point_format;

    let [sx, sy, sz] = metadata.scale;
    let [ox, oy, oz] = metadata.offset;
    builder.transforms = ::las::Vector {
        x: ::las::Transform {
            scale: sx,
            offset: ox,
        },
        y: ::las::Transform {
            scale: sy,
            offset: oy,
        },
        z: ::las::Transform {
            scale: sz,
            offset: oz,
        },
    };

    builder.vlrs = metadata.vlrs.iter().map(to_vlr).collect();
    builder.evlrs = metadata.evlrs.iter().map(to_vlr).collect();
    let has_projection = metadata
        .vlrs
        .iter()
        .chain(&metadata.evlrs)
        .any(|vlr| vlr.user_id.trim_end_matches('\0') == LASF_PROJECTION);
    if let (Some(epsg), false) = (metadata.crs, has_projection) {
        builder.vlrs.push(geokey_vlr(epsg));
    }

    if !metadata.system_identifier.is_empty() {
        builder.system_identifier = metadata.system_identifier.clone();
    }
    builder.generating_software = format!("pcolorize {}", env!("CARGO_PKG_VERSION"));

    builder.into_header()
}

/// Keeps the source version unless the point format needs a newer one.
fn output_version(version: (u8, u8), point_format: u8) -> (u8, u8) {
    let version = if version == (0, 0) {
        DEFAULT_VERSION
    } else {
        version
    };
    if point_format >= 6 && version < (1, 4) {
        (1, 4)
    } else {
        version
    }
}

fn to_las_point(
    point: &Point,
    format: &::las::point::Format,
    extra_bytes: usize,
) -> Result<::las::Point, ::las::Error> {
    let attributes = &point.attributes;
    let flags = &attributes.flags;

    let classification =
        ::las::point::Classification::new(attributes.classification.unwrap_or(0))?;
    let scan_direction = if flags.scan_direction_positive {
        ::las::point::ScanDirection::LeftToRight
    } else {
        ::las::point::ScanDirection::RightToLeft
    };

    let color = format.has_color.then(|| {
        let color = point.color.unwrap_or_default();
        ::las::Color::new(color.r, color.g, color.b)
    });

    let mut extra = attributes.extra_bytes.clone();
    extra.resize(extra_bytes, 0);

    Ok(::las::Point {
        x: point.x,
        y: point.y,
        z: point.z,
        intensity: attributes.intensity.unwrap_or(0),
        return_number: attributes.return_number.unwrap_or(0),
        number_of_returns: attributes.number_of_returns.unwrap_or(0),
        scan_direction,
        is_edge_of_flight_line: flags.edge_of_flight_line,
        classification,
        is_synthetic: flags.synthetic,
        is_key_point: flags.key_point,
        is_withheld: flags.withheld,
        is_overlap: flags.overlap,
        scanner_channel: attributes.scanner_channel.unwrap_or(0),
        scan_angle: attributes.scan_angle.unwrap_or(0.0),
        user_data: attributes.user_data.unwrap_or(0),
        point_source_id: attributes.point_source_id.unwrap_or(0),
        gps_time: format
            .has_gps_time
            .then(|| attributes.gps_time.unwrap_or(0.0)),
        color,
        nir: format.has_nir.then(|| attributes.nir.unwrap_or(0)),
        extra_bytes: extra,
        ..Default::default()
    })
}

fn to_vlr(record: &VariableLengthRecord) -> ::las::Vlr {
    ::las::Vlr {
        user_id: record.user_id.clone(),
        record_id: record.record_id,
        description: record.description.clone(),
        data: record.data.clone(),
    }
}

/// A minimal GeoKeyDirectory naming `epsg` as the model CRS.
fn geokey_vlr(epsg: EpsgCode) -> ::las::Vlr {
    // EPSG codes 4000-4999 are geographic 2D CRSs
    let key_id: u16 = if (4000..5000).contains(&epsg) {
        2048
    } else {
        3072
    };
    let directory: [u16; 8] = [1, 1, 0, 1, key_id, 0, 1, epsg];
    let mut data = vec![0u8; directory.len() * 2];
    LittleEndian::write_u16_into(&directory, &mut data);

    ::las::Vlr {
        user_id: LASF_PROJECTION.to_string(),
        record_id: GEO_KEY_DIRECTORY_RECORD,
        description: "GeoKeyDirectoryTag".to_string(),
        data,
    }
}

#[cfg(test)]
mod tests {
    use pcd_core::pointcloud::point::Color;
    use pcd_parser::parsers::{las::LasParser, Parser as _};

    use super::*;

    fn sample_cloud() -> PointCloud {
        let mut points = vec![
            Point::new(470010.25, 4420020.5, 1600.0),
            Point::new(470012.5, 4420022.75, 1601.5),
        ];
        points[0].color = Some(Color::new(65535, 0, 257));
        points[0].attributes.intensity = Some(512);
        points[0].attributes.classification = Some(2);
        points[1].color = Some(Color::new(1, 2, 3));
        points[1].attributes.return_number = Some(1);
        points[1].attributes.number_of_returns = Some(1);
        PointCloud::new(points, Some(26913))
    }

    fn read_back(path: &Path) -> PointCloud {
        LasParser {
            filename: path.to_path_buf(),
        }
        .parse()
        .unwrap()
    }

    #[test]
    fn write_and_read_las() {
        let tmp = tempfile::Builder::new().suffix(".las").tempfile().unwrap();
        write_las(tmp.path(), &sample_cloud()).unwrap();

        let pc = read_back(tmp.path());
        assert_eq!(pc.len(), 2);
        assert_eq!(pc.metadata.point_format, 2);
        assert_eq!(pc.metadata.version, (1, 2));
        assert_eq!(pc.metadata.crs, Some(26913));
        assert_eq!(pc.points[0].color, Some(Color::new(65535, 0, 257)));
        assert_eq!(pc.points[0].attributes.intensity, Some(512));
        assert_eq!(pc.points[0].attributes.classification, Some(2));
        assert!((pc.points[1].x - 470012.5).abs() < 1e-9);
        assert!((pc.points[1].y - 4420022.75).abs() < 1e-9);
        assert!((pc.points[1].z - 1601.5).abs() < 1e-9);
    }

    #[test]
    fn write_and_read_laz() {
        let tmp = tempfile::Builder::new().suffix(".laz").tempfile().unwrap();
        write_las(tmp.path(), &sample_cloud()).unwrap();

        let pc = read_back(tmp.path());
        assert_eq!(pc.len(), 2);
        assert_eq!(pc.points[1].color, Some(Color::new(1, 2, 3)));
    }

    #[test]
    fn existing_projection_record_is_not_duplicated() {
        let mut cloud = sample_cloud();
        cloud.metadata.vlrs.push(VariableLengthRecord {
            user_id: LASF_PROJECTION.to_string(),
            record_id: 2112,
            description: String::new(),
            data: br#"PROJCS["x",AUTHORITY["EPSG","2232"]]"#.to_vec(),
        });
        let tmp = tempfile::Builder::new().suffix(".las").tempfile().unwrap();
        write_las(tmp.path(), &cloud).unwrap();

        let pc = read_back(tmp.path());
        assert_eq!(pc.metadata.vlrs.len(), 1);
        assert_eq!(pc.metadata.crs, Some(2232));
    }

    #[test]
    fn waveform_formats_are_rejected() {
        let mut cloud = sample_cloud();
        cloud.metadata.point_format = 5;
        let tmp = tempfile::Builder::new().suffix(".las").tempfile().unwrap();
        assert!(matches!(
            write_las(tmp.path(), &cloud),
            Err(ExportError::UnsupportedPointFormat(5))
        ));
    }

    #[test]
    fn zero_scale_is_rejected() {
        let mut cloud = sample_cloud();
        cloud.metadata.scale = [0.0, 0.01, 0.01];
        let tmp = tempfile::Builder::new().suffix(".las").tempfile().unwrap();
        assert!(matches!(
            write_las(tmp.path(), &cloud),
            Err(ExportError::InvalidScale { .. })
        ));
    }

    #[test]
    fn version_selection() {
        assert_eq!(output_version((0, 0), 2), (1, 2));
        assert_eq!(output_version((1, 3), 3), (1, 3));
        assert_eq!(output_version((1, 2), 7), (1, 4));
    }
}
