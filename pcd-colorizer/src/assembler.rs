use pcd_core::pointcloud::point::{color_capable_format, BoundingVolume, PointCloud};

use crate::{error::ColorizeError, sampler::ColorSample};

/// Color-capable point format for `point_format`, or an error for formats
/// that cannot carry color.
pub fn output_point_format(point_format: u8) -> Result<u8, ColorizeError> {
    color_capable_format(point_format).ok_or(ColorizeError::UnsupportedPointFormat(point_format))
}

/// Builds a new point cloud from the points with a valid sample.
///
/// Every attribute other than color is copied; the header keeps its scale,
/// offset, CRS, version and records.
pub fn assemble(source: &PointCloud, samples: &[ColorSample]) -> Result<PointCloud, ColorizeError> {
    let point_format = output_point_format(source.metadata.point_format)?;

    let points: Vec<_> = source
        .points
        .iter()
        .zip(samples)
        .filter(|(_, sample)| sample.valid)
        .map(|(point, sample)| {
            let mut point = point.clone();
            point.color = Some(sample.color);
            point
        })
        .collect();

    let mut metadata = source.metadata.clone();
    metadata.point_format = point_format;
    metadata.point_count = points.len();
    metadata.bounding_volume = BoundingVolume::from_points(&points);

    Ok(PointCloud { points, metadata })
}

#[cfg(test)]
mod tests {
    use pcd_core::pointcloud::point::{Color, Point};

    use super::*;

    fn sample(value: u16, valid: bool) -> ColorSample {
        ColorSample {
            color: Color::gray(value),
            valid,
        }
    }

    #[test]
    fn keeps_valid_points_and_attributes() {
        let mut points = vec![
            Point::new(1.0, 1.0, 1.0),
            Point::new(2.0, 2.0, 2.0),
            Point::new(3.0, 3.0, 3.0),
        ];
        points[2].attributes.intensity = Some(42);
        points[2].attributes.classification = Some(6);
        let mut source = PointCloud::new(points, Some(26913));
        source.metadata.point_format = 1;
        source.metadata.version = (1, 2);

        let out = assemble(
            &source,
            &[sample(10, true), sample(0, false), sample(20, true)],
        )
        .unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out.metadata.point_count, 2);
        assert_eq!(out.metadata.point_format, 3);
        assert_eq!(out.metadata.crs, Some(26913));
        assert_eq!(out.metadata.scale, source.metadata.scale);
        assert_eq!(out.metadata.offset, source.metadata.offset);
        assert_eq!(out.metadata.version, (1, 2));
        assert_eq!(out.metadata.bounding_volume.min, [1.0, 1.0, 1.0]);
        assert_eq!(out.metadata.bounding_volume.max, [3.0, 3.0, 3.0]);
        assert_eq!(out.points[1].color, Some(Color::gray(20)));
        assert_eq!(out.points[1].attributes.intensity, Some(42));
        assert_eq!(out.points[1].attributes.classification, Some(6));
        // The input is untouched.
        assert_eq!(source.len(), 3);
        assert_eq!(source.points[0].color, None);
    }

    #[test]
    fn waveform_formats_are_rejected() {
        let mut source = PointCloud::new(vec![Point::new(0.0, 0.0, 0.0)], None);
        source.metadata.point_format = 4;
        assert!(matches!(
            assemble(&source, &[sample(1, true)]),
            Err(ColorizeError::UnsupportedPointFormat(4))
        ));
    }
}
