use pcd_core::crs::EpsgCode;
use proj4rs::{proj::Proj, transform::transform};

use crate::error::TransformError;

/// PROJ.4 definition for an EPSG code from the crs-definitions database
pub fn proj_string(epsg: EpsgCode) -> Option<&'static str> {
    crs_definitions::from_code(epsg).map(|def| def.proj4)
}

/// Whether an EPSG code names a geographic (lon/lat) CRS
pub fn is_geographic_crs(epsg: EpsgCode) -> bool {
    match proj_string(epsg) {
        Some(definition) => definition.contains("+proj=longlat"),
        None => (4000..5000).contains(&epsg),
    }
}

/// Length of one linear CRS unit in metres (1.0 for metric and unknown CRSs).
pub fn linear_unit_metres(epsg: EpsgCode) -> f64 {
    let Some(definition) = proj_string(epsg) else {
        return 1.0;
    };
    for token in definition.split_whitespace() {
        if let Some(value) = token.strip_prefix("+to_meter=") {
            if let Ok(value) = value.parse() {
                return value;
            }
        }
        match token {
            "+units=us-ft" => return 1200.0 / 3937.0,
            "+units=ft" => return 0.3048,
            _ => {}
        }
    }
    1.0
}

/// Approximate ground length of one degree of latitude.
pub const METRES_PER_DEGREE: f64 = 111_320.0;

/// Ground length in metres of one `epsg` unit along x and y near `latitude`
/// (degrees). Geographic CRSs shrink the x unit with the cosine of latitude.
pub fn unit_metres_at(epsg: EpsgCode, latitude: f64) -> (f64, f64) {
    if is_geographic_crs(epsg) {
        (
            METRES_PER_DEGREE * latitude.to_radians().cos(),
            METRES_PER_DEGREE,
        )
    } else {
        let unit = linear_unit_metres(epsg);
        (unit, unit)
    }
}

/// Pure-Rust transformer between two EPSG codes.
///
/// Geographic coordinates are taken and returned in degrees.
pub struct Proj4Transformer {
    from: EpsgCode,
    to: EpsgCode,
    source: Proj,
    target: Proj,
    source_geographic: bool,
    target_geographic: bool,
}

impl Proj4Transformer {
    pub fn new(from: EpsgCode, to: EpsgCode) -> Result<Self, TransformError> {
        Ok(Self {
            from,
            to,
            source: load(from)?,
            target: load(to)?,
            source_geographic: is_geographic_crs(from),
            target_geographic: is_geographic_crs(to),
        })
    }

    pub fn transform_xy(&self, x: &mut [f64], y: &mut [f64]) -> Result<(), TransformError> {
        for (px, py) in x.iter_mut().zip(y.iter_mut()) {
            let mut point = if self.source_geographic {
                (px.to_radians(), py.to_radians(), 0.0)
            } else {
                (*px, *py, 0.0)
            };
            let outcome = transform(&self.source, &self.target, &mut point)
                .map_err(|e| format!("{e:?}"))
                .and_then(|()| {
                    if point.0.is_finite() && point.1.is_finite() {
                        Ok(())
                    } else {
                        Err("non-finite result".to_string())
                    }
                });
            if let Err(message) = outcome {
                return Err(TransformError::Projection {
                    from: self.from,
                    to: self.to,
                    x: *px,
                    y: *py,
                    message,
                });
            }
            (*px, *py) = if self.target_geographic {
                (point.0.to_degrees(), point.1.to_degrees())
            } else {
                (point.0, point.1)
            };
        }
        Ok(())
    }
}

fn load(epsg: EpsgCode) -> Result<Proj, TransformError> {
    let definition = proj_string(epsg).ok_or(TransformError::UnknownCrs(epsg))?;
    Proj::from_proj_string(definition).map_err(|e| TransformError::InvalidDefinition {
        epsg,
        message: format!("{e:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geographic_detection() {
        assert!(is_geographic_crs(4326));
        assert!(is_geographic_crs(4269));
        assert!(!is_geographic_crs(3857));
        assert!(!is_geographic_crs(26913));
    }

    #[test]
    fn linear_units() {
        assert_eq!(linear_unit_metres(3857), 1.0);
        assert_eq!(linear_unit_metres(26913), 1.0);
        assert!((linear_unit_metres(2232) - 0.3048006).abs() < 1e-6);
    }

    #[test]
    fn unit_lengths_follow_crs_kind() {
        let (x, y) = unit_metres_at(4326, 60.0);
        assert!((x - METRES_PER_DEGREE / 2.0).abs() < 1e-6);
        assert_eq!(y, METRES_PER_DEGREE);
        assert_eq!(unit_metres_at(26913, 60.0), (1.0, 1.0));
        let (x, y) = unit_metres_at(2232, 39.7);
        assert_eq!(x, y);
        assert!((x - 0.3048006).abs() < 1e-6);
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!(matches!(
            Proj4Transformer::new(4326, 1),
            Err(TransformError::UnknownCrs(1))
        ));
    }

    #[test]
    fn non_finite_coordinates_fail() {
        let transformer = Proj4Transformer::new(4326, 26913).unwrap();
        let mut x = [-105.0, f64::NAN];
        let mut y = [39.7, 39.7];
        assert!(matches!(
            transformer.transform_xy(&mut x, &mut y),
            Err(TransformError::Projection { from: 4326, to: 26913, .. })
        ));
    }

    #[test]
    fn origin_to_web_mercator() {
        let transformer = Proj4Transformer::new(4326, 3857).unwrap();
        let mut x = [0.0, 180.0];
        let mut y = [0.0, 0.0];
        transformer.transform_xy(&mut x, &mut y).unwrap();
        assert!(x[0].abs() < 1e-6);
        assert!(y[0].abs() < 1e-6);
        assert!((x[1] - 20037508.342789244).abs() < 1e-3);
    }
}
