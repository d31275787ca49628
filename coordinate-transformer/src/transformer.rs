use pcd_core::crs::EpsgCode;

use crate::{error::TransformError, proj4::Proj4Transformer};

pub enum PointTransformer {
    Identity,
    Proj4(Proj4Transformer),
}

impl PointTransformer {
    pub fn new(input_epsg: EpsgCode, output_epsg: EpsgCode) -> Result<Self, TransformError> {
        if input_epsg == output_epsg {
            return Ok(Self::Identity);
        }
        log::debug!("proj4rs transformer EPSG:{input_epsg} -> EPSG:{output_epsg}");
        Ok(Self::Proj4(Proj4Transformer::new(input_epsg, output_epsg)?))
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }

    /// Transforms paired coordinate arrays in place.
    pub fn transform_xy(&mut self, x: &mut [f64], y: &mut [f64]) -> Result<(), TransformError> {
        if x.len() != y.len() {
            return Err(TransformError::LengthMismatch {
                x: x.len(),
                y: y.len(),
            });
        }
        match self {
            Self::Identity => Ok(()),
            Self::Proj4(t) => t.transform_xy(x, y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(from: EpsgCode, to: EpsgCode, x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let mut xs = x.to_vec();
        let mut ys = y.to_vec();
        PointTransformer::new(from, to)
            .unwrap()
            .transform_xy(&mut xs, &mut ys)
            .unwrap();
        PointTransformer::new(to, from)
            .unwrap()
            .transform_xy(&mut xs, &mut ys)
            .unwrap();
        (xs, ys)
    }

    #[test]
    fn identity_transform() {
        let mut transformer = PointTransformer::new(26913, 26913).unwrap();
        assert!(transformer.is_identity());
        let mut x = [470000.0];
        let mut y = [4420000.0];
        transformer.transform_xy(&mut x, &mut y).unwrap();
        assert_eq!(x, [470000.0]);
        assert_eq!(y, [4420000.0]);
    }

    #[test]
    fn geographic_web_mercator_round_trip() {
        let lon = [-105.0, 139.7, 0.0];
        let lat = [39.7, 35.7, 0.0];
        let (x, y) = round_trip(4326, 3857, &lon, &lat);
        for i in 0..lon.len() {
            assert!((x[i] - lon[i]).abs() < 1e-6);
            assert!((y[i] - lat[i]).abs() < 1e-6);
        }
    }

    #[test]
    fn utm_geographic_round_trip() {
        let east = [470000.0, 500000.0];
        let north = [4420000.0, 4400000.5];
        let (x, y) = round_trip(26913, 4326, &east, &north);
        for i in 0..east.len() {
            assert!((x[i] - east[i]).abs() < 1e-3);
            assert!((y[i] - north[i]).abs() < 1e-3);
        }
    }

    #[test]
    fn utm_to_geographic_lands_in_zone() {
        let mut x = [500000.0];
        let mut y = [4400000.0];
        PointTransformer::new(26913, 4326)
            .unwrap()
            .transform_xy(&mut x, &mut y)
            .unwrap();
        // Central meridian of UTM zone 13 is 105 W
        assert!((x[0] + 105.0).abs() < 1e-6);
        assert!(y[0] > 39.0 && y[0] < 40.5);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let mut transformer = PointTransformer::new(4326, 3857).unwrap();
        let mut x = [0.0, 1.0];
        let mut y = [0.0];
        assert!(matches!(
            transformer.transform_xy(&mut x, &mut y),
            Err(TransformError::LengthMismatch { x: 2, y: 1 })
        ));
    }
}
