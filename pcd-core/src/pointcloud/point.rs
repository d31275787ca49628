use serde::{Deserialize, Serialize};

use crate::crs::EpsgCode;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointAttributes {
    pub intensity: Option<u16>,
    pub return_number: Option<u8>,
    pub number_of_returns: Option<u8>,
    pub classification: Option<u8>,
    pub scanner_channel: Option<u8>,
    pub scan_angle: Option<f32>,
    pub user_data: Option<u8>,
    pub point_source_id: Option<u16>,
    pub gps_time: Option<f64>,
    pub nir: Option<u16>,
    pub flags: PointFlags,
    pub extra_bytes: Vec<u8>,
}

/// Single-bit LAS point flags, carried through untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointFlags {
    pub scan_direction_positive: bool,
    pub edge_of_flight_line: bool,
    pub synthetic: bool,
    pub key_point: bool,
    pub withheld: bool,
    pub overlap: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u16,
    pub g: u16,
    pub b: u16,
}

impl Color {
    pub fn new(r: u16, g: u16, b: u16) -> Self {
        Self { r, g, b }
    }

    pub fn gray(value: u16) -> Self {
        Self::new(value, value, value)
    }

    pub fn is_black(&self) -> bool {
        self.r == 0 && self.g == 0 && self.b == 0
    }
}

/// A point with real-world coordinates in the CRS of its cloud.
///
/// LAS stores `(x - offset) / scale` as integers; `x` here is already decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub color: Option<Color>,
    pub attributes: PointAttributes,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            color: None,
            attributes: PointAttributes::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    pub points: Vec<Point>,
    pub metadata: Metadata,
}

impl PointCloud {
    /// Builds a point cloud from raw points, deriving bounds, scale and offset.
    ///
    /// The scale is the finest decimal step needed to represent every
    /// coordinate (at most 7 fractional digits); the offset is the minimum corner.
    pub fn new(points: Vec<Point>, crs: Option<EpsgCode>) -> Self {
        let bounding_volume = BoundingVolume::from_points(&points);
        let mut max_digits = 1;

        for point in &points {
            for value in [point.x, point.y, point.z] {
                let value_str = format!("{:.7}", value);
                if let Some(dot_index) = value_str.find('.') {
                    let fractional_part = value_str[dot_index + 1..].trim_end_matches('0');
                    max_digits = max_digits.max(fractional_part.len());
                }
            }
        }

        let scale = 10_f64.powi(-(max_digits as i32));
        let has_color = points.iter().any(|p| p.color.is_some());

        let metadata = Metadata {
            point_count: points.len(),
            offset: if points.is_empty() {
                [0.0; 3]
            } else {
                bounding_volume.min
            },
            bounding_volume,
            crs,
            scale: [scale; 3],
            point_format: if has_color { 2 } else { 0 },
            ..Default::default()
        };

        PointCloud { points, metadata }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Splits the horizontal coordinates into two owned arrays.
    pub fn xy(&self) -> (Vec<f64>, Vec<f64>) {
        self.points.iter().map(|p| (p.x, p.y)).unzip()
    }
}

/// Per-axis extent of decoded coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingVolume {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingVolume {
    pub fn from_points(points: &[Point]) -> Self {
        if points.is_empty() {
            return Self::default();
        }
        let mut bounding_volume = BoundingVolume {
            min: [f64::MAX, f64::MAX, f64::MAX],
            max: [f64::MIN, f64::MIN, f64::MIN],
        };
        for point in points {
            bounding_volume.expand([point.x, point.y, point.z]);
        }
        bounding_volume
    }

    pub fn expand(&mut self, xyz: [f64; 3]) {
        for (axis, value) in xyz.into_iter().enumerate() {
            self.min[axis] = self.min[axis].min(value);
            self.max[axis] = self.max[axis].max(value);
        }
    }
}

/// A LAS variable-length record, kept verbatim so it can be written back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableLengthRecord {
    pub user_id: String,
    pub record_id: u16,
    pub description: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub point_count: usize,
    pub bounding_volume: BoundingVolume,
    pub crs: Option<EpsgCode>,
    pub scale: [f64; 3],
    pub offset: [f64; 3],
    pub point_format: u8,
    pub version: (u8, u8),
    pub vlrs: Vec<VariableLengthRecord>,
    pub evlrs: Vec<VariableLengthRecord>,
    pub system_identifier: String,
    pub generating_software: String,
}

/// Whether a LAS point data record format carries RGB.
pub fn format_has_color(point_format: u8) -> bool {
    matches!(point_format, 2 | 3 | 5 | 7 | 8 | 10)
}

/// Whether a LAS point data record format carries waveform packets.
pub fn format_has_waveform(point_format: u8) -> bool {
    matches!(point_format, 4 | 5 | 9 | 10)
}

/// The closest color-capable format that keeps every other field of `point_format`.
///
/// Returns `None` for unknown formats and for waveform formats, which are not
/// carried by this model.
pub fn color_capable_format(point_format: u8) -> Option<u8> {
    match point_format {
        0 => Some(2),
        1 => Some(3),
        6 => Some(7),
        2 | 3 | 7 | 8 => Some(point_format),
        _ => None,
    }
}
