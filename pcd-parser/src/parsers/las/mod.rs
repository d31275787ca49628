use std::path::PathBuf;

use byteorder::{ByteOrder, LittleEndian};
use las::{point::ScanDirection, Reader, Vlr};

use pcd_core::{
    crs::{epsg_from_geokeys, epsg_from_wkt, EpsgCode},
    pointcloud::point::{
        BoundingVolume, Color, Metadata, Point, PointAttributes, PointCloud, PointFlags,
        VariableLengthRecord,
    },
};

use super::{ParseError, Parser, ParserProvider};

const LASF_PROJECTION: &str = "LASF_Projection";
const GEO_KEY_DIRECTORY_RECORD: u16 = 34735;
const OGC_WKT_RECORD: u16 = 2112;

pub struct LasParserProvider {
    pub filename: PathBuf,
}

impl ParserProvider for LasParserProvider {
    fn get_parser(&self) -> Box<dyn Parser> {
        Box::new(LasParser {
            filename: self.filename.clone(),
        })
    }
}

pub struct LasParser {
    pub filename: PathBuf,
}

impl Parser for LasParser {
    fn parse(&self) -> Result<PointCloud, ParseError> {
        let path = self.filename.display().to_string();
        let las_error = |source| ParseError::Las {
            path: path.clone(),
            source,
        };

        let start = std::time::Instant::now();
        let mut reader = Reader::from_path(&self.filename).map_err(las_error)?;
        let header = reader.header().clone();
        log::debug!("Open LAS time: {:?}", start.elapsed());

        let point_format = header.point_format().to_u8().map_err(las_error)?;
        let transforms = header.transforms();
        let version = header.version();

        let vlrs: Vec<VariableLengthRecord> = header.vlrs().iter().map(to_record).collect();
        let evlrs: Vec<VariableLengthRecord> = header.evlrs().iter().map(to_record).collect();
        let crs = embedded_crs(header.vlrs().iter().chain(header.evlrs()), &path);

        let start = std::time::Instant::now();
        let mut points = Vec::with_capacity(header.number_of_points() as usize);
        let mut bounding_volume = BoundingVolume {
            min: [f64::MAX, f64::MAX, f64::MAX],
            max: [f64::MIN, f64::MIN, f64::MIN],
        };
        for las_point in reader.points() {
            let las_point = las_point.map_err(las_error)?;
            bounding_volume.expand([las_point.x, las_point.y, las_point.z]);
            points.push(convert_las_point(las_point));
        }
        if points.is_empty() {
            bounding_volume = BoundingVolume::default();
        }
        log::debug!("Build PointCloud time: {:?}", start.elapsed());

        let metadata = Metadata {
            point_count: points.len(),
            bounding_volume,
            crs,
            scale: [transforms.x.scale, transforms.y.scale, transforms.z.scale],
            offset: [transforms.x.offset, transforms.y.offset, transforms.z.offset],
            point_format,
            version: (version.major, version.minor),
            vlrs,
            evlrs,
            system_identifier: header.system_identifier().to_string(),
            generating_software: header.generating_software().to_string(),
        };

        Ok(PointCloud { points, metadata })
    }
}

fn convert_las_point(las_point: las::Point) -> Point {
    let color = las_point.color.map(|c| Color {
        r: c.red,
        g: c.green,
        b: c.blue,
    });

    let attributes = PointAttributes {
        intensity: Some(las_point.intensity),
        return_number: Some(las_point.return_number),
        number_of_returns: Some(las_point.number_of_returns),
        classification: Some(u8::from(las_point.classification)),
        scanner_channel: Some(las_point.scanner_channel),
        scan_angle: Some(las_point.scan_angle),
        user_data: Some(las_point.user_data),
        point_source_id: Some(las_point.point_source_id),
        gps_time: las_point.gps_time,
        nir: las_point.nir,
        flags: PointFlags {
            scan_direction_positive: las_point.scan_direction == ScanDirection::LeftToRight,
            edge_of_flight_line: las_point.is_edge_of_flight_line,
            synthetic: las_point.is_synthetic,
            key_point: las_point.is_key_point,
            withheld: las_point.is_withheld,
            overlap: las_point.is_overlap,
        },
        extra_bytes: las_point.extra_bytes,
    };

    Point {
        x: las_point.x,
        y: las_point.y,
        z: las_point.z,
        color,
        attributes,
    }
}

fn to_record(vlr: &Vlr) -> VariableLengthRecord {
    VariableLengthRecord {
        user_id: vlr.user_id.clone(),
        record_id: vlr.record_id,
        description: vlr.description.clone(),
        data: vlr.data.clone(),
    }
}

/// Looks for an EPSG code in the projection records of a LAS header.
///
/// A GeoKeyDirectory record wins over an OGC WKT record. Unreadable records
/// are logged and skipped; the CRS is then left to the caller to resolve.
fn embedded_crs<'a>(records: impl Iterator<Item = &'a Vlr>, path: &str) -> Option<EpsgCode> {
    let mut from_wkt = None;
    for vlr in records {
        if vlr.user_id.trim_end_matches('\0') != LASF_PROJECTION {
            continue;
        }
        match vlr.record_id {
            GEO_KEY_DIRECTORY_RECORD => {
                if vlr.data.len() % 2 != 0 {
                    log::warn!("{path}: GeoKeyDirectory record has odd length, ignoring it");
                    continue;
                }
                let mut keys = vec![0u16; vlr.data.len() / 2];
                LittleEndian::read_u16_into(&vlr.data, &mut keys);
                if let Some(epsg) = epsg_from_geokeys(&keys) {
                    return Some(epsg);
                }
            }
            OGC_WKT_RECORD => {
                let wkt = String::from_utf8_lossy(&vlr.data);
                from_wkt = from_wkt.or_else(|| epsg_from_wkt(wkt.trim_end_matches('\0')));
            }
            _ => {}
        }
    }
    from_wkt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_las(path: &std::path::Path, point_format: u8, vlrs: Vec<Vlr>) {
        let mut builder = las::Builder::from((1, 2));
        builder.point_format = las::point::Format::new(point_format).unwrap();
        builder.transforms = las::Vector {
            x: las::Transform {
                scale: 0.01,
                offset: 470000.0,
            },
            y: las::Transform {
                scale: 0.01,
                offset: 4420000.0,
            },
            z: las::Transform {
                scale: 0.01,
                offset: 0.0,
            },
        };
        builder.vlrs = vlrs;
        let header = builder.into_header().unwrap();
        let mut writer = las::Writer::from_path(path, header).unwrap();

        for (i, (x, y)) in [(470010.25, 4420020.5), (470011.0, 4420021.75)]
            .into_iter()
            .enumerate()
        {
            let mut point = las::Point {
                x,
                y,
                z: 1600.0 + i as f64,
                intensity: 100 + i as u16,
                return_number: 1,
                number_of_returns: 2,
                user_data: 7,
                point_source_id: 3,
                classification: las::point::Classification::Ground,
                ..Default::default()
            };
            if builder_has_color(point_format) {
                point.color = Some(las::Color::new(1, 2, 3));
            }
            writer.write_point(point).unwrap();
        }
        writer.close().unwrap();
    }

    fn builder_has_color(point_format: u8) -> bool {
        pcd_core::pointcloud::point::format_has_color(point_format)
    }

    fn geokey_vlr(epsg: u16) -> Vlr {
        let keys: [u16; 8] = [1, 1, 0, 1, 3072, 0, 1, epsg];
        let mut data = vec![0u8; keys.len() * 2];
        LittleEndian::write_u16_into(&keys, &mut data);
        Vlr {
            user_id: LASF_PROJECTION.to_string(),
            record_id: GEO_KEY_DIRECTORY_RECORD,
            description: "GeoKeyDirectoryTag".to_string(),
            data,
        }
    }

    #[test]
    fn parse_reads_points_header_and_crs() {
        let tmp = tempfile::Builder::new().suffix(".las").tempfile().unwrap();
        write_las(tmp.path(), 0, vec![geokey_vlr(26913)]);

        let parser = LasParserProvider {
            filename: tmp.path().to_path_buf(),
        }
        .get_parser();
        let pc = parser.parse().unwrap();

        assert_eq!(pc.len(), 2);
        assert_eq!(pc.metadata.point_count, 2);
        assert_eq!(pc.metadata.crs, Some(26913));
        assert_eq!(pc.metadata.point_format, 0);
        assert_eq!(pc.metadata.version, (1, 2));
        assert_eq!(pc.metadata.scale, [0.01, 0.01, 0.01]);
        assert_eq!(pc.metadata.offset, [470000.0, 4420000.0, 0.0]);
        assert_eq!(pc.metadata.vlrs.len(), 1);

        let first = &pc.points[0];
        assert!((first.x - 470010.25).abs() < 1e-9);
        assert!((first.y - 4420020.5).abs() < 1e-9);
        assert_eq!(first.color, None);
        assert_eq!(first.attributes.intensity, Some(100));
        assert_eq!(first.attributes.number_of_returns, Some(2));
        assert_eq!(first.attributes.classification, Some(2));
        assert_eq!(first.attributes.user_data, Some(7));
        assert_eq!(pc.metadata.bounding_volume.max[2], 1601.0);
    }

    #[test]
    fn parse_without_crs_records() {
        let tmp = tempfile::Builder::new().suffix(".las").tempfile().unwrap();
        write_las(tmp.path(), 2, Vec::new());

        let pc = LasParser {
            filename: tmp.path().to_path_buf(),
        }
        .parse()
        .unwrap();

        assert_eq!(pc.metadata.crs, None);
        assert_eq!(pc.points[1].color, Some(Color::new(1, 2, 3)));
    }

    #[test]
    fn parse_missing_file_fails() {
        let parser = LasParser {
            filename: PathBuf::from("/tmp/nonexistent_file_that_does_not_exist_12345.las"),
        };
        assert!(matches!(parser.parse(), Err(ParseError::Las { .. })));
    }

    #[test]
    fn wkt_record_is_used_when_no_geokeys() {
        let wkt = Vlr {
            user_id: LASF_PROJECTION.to_string(),
            record_id: OGC_WKT_RECORD,
            description: String::new(),
            data: b"PROJCS[\"NAD83 / Colorado Central (ftUS)\",AUTHORITY[\"EPSG\",\"2232\"]]\0"
                .to_vec(),
        };
        assert_eq!(embedded_crs([wkt].iter(), "test"), Some(2232));
    }

    #[test]
    fn malformed_geokeys_are_skipped() {
        let mut vlr = geokey_vlr(26913);
        vlr.data.pop();
        assert_eq!(embedded_crs([vlr].iter(), "test"), None);
    }
}
