use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crs::EpsgCode;

#[derive(Debug, Error, PartialEq)]
#[error("invalid bounds in EPSG:{crs}: west={west}, south={south}, east={east}, north={north}")]
pub struct InvalidBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
    pub crs: EpsgCode,
}

/// A 2D axis-aligned box in a stated CRS, with `west < east` and `south < north`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    west: f64,
    south: f64,
    east: f64,
    north: f64,
    crs: EpsgCode,
}

impl BoundingBox {
    pub fn new(
        west: f64,
        south: f64,
        east: f64,
        north: f64,
        crs: EpsgCode,
    ) -> Result<Self, InvalidBounds> {
        let finite = [west, south, east, north].iter().all(|v| v.is_finite());
        if !finite || west >= east || south >= north {
            return Err(InvalidBounds {
                west,
                south,
                east,
                north,
                crs,
            });
        }
        Ok(Self {
            west,
            south,
            east,
            north,
            crs,
        })
    }

    /// Envelope of paired coordinate arrays, ignoring non-finite values.
    ///
    /// Degenerate extents (a single point, or a line) are widened by `min_extent`
    /// so the result still satisfies the box invariant.
    pub fn from_xy(
        x: &[f64],
        y: &[f64],
        crs: EpsgCode,
        min_extent: f64,
    ) -> Result<Self, InvalidBounds> {
        let mut west = f64::INFINITY;
        let mut south = f64::INFINITY;
        let mut east = f64::NEG_INFINITY;
        let mut north = f64::NEG_INFINITY;
        for (&px, &py) in x.iter().zip(y) {
            if !px.is_finite() || !py.is_finite() {
                continue;
            }
            west = west.min(px);
            east = east.max(px);
            south = south.min(py);
            north = north.max(py);
        }
        if east - west < min_extent {
            let pad = (min_extent - (east - west)) / 2.0;
            west -= pad;
            east += pad;
        }
        if north - south < min_extent {
            let pad = (min_extent - (north - south)) / 2.0;
            south -= pad;
            north += pad;
        }
        Self::new(west, south, east, north, crs)
    }

    pub fn west(&self) -> f64 {
        self.west
    }

    pub fn south(&self) -> f64 {
        self.south
    }

    pub fn east(&self) -> f64 {
        self.east
    }

    pub fn north(&self) -> f64 {
        self.north
    }

    pub fn crs(&self) -> EpsgCode {
        self.crs
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.west + self.east) / 2.0,
            (self.south + self.north) / 2.0,
        )
    }

    /// Whether the x ranges intersect (touching edges count).
    pub fn overlaps_x(&self, other: &BoundingBox) -> bool {
        !(self.east < other.west || self.west > other.east)
    }

    /// Whether the y ranges intersect (touching edges count).
    pub fn overlaps_y(&self, other: &BoundingBox) -> bool {
        !(self.north < other.south || self.south > other.north)
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.west && x <= self.east && y >= self.south && y <= self.north
    }

    /// Grows every side by `ratio` of the extent along that axis.
    pub fn buffered(&self, ratio: f64) -> Self {
        let dx = self.width() * ratio;
        let dy = self.height() * ratio;
        Self {
            west: self.west - dx,
            south: self.south - dy,
            east: self.east + dx,
            north: self.north + dy,
            crs: self.crs,
        }
    }

    /// `west,south,east,north` as used by map service requests.
    pub fn to_bbox_string(&self) -> String {
        format!(
            "{:.8},{:.8},{:.8},{:.8}",
            self.west, self.south, self.east, self.north
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_or_non_finite_bounds() {
        assert!(BoundingBox::new(1.0, 0.0, 0.0, 1.0, 4326).is_err());
        assert!(BoundingBox::new(0.0, 1.0, 1.0, 1.0, 4326).is_err());
        assert!(BoundingBox::new(f64::NAN, 0.0, 1.0, 1.0, 4326).is_err());
        assert!(BoundingBox::new(0.0, 0.0, 1.0, 1.0, 4326).is_ok());
    }

    #[test]
    fn from_xy_skips_nan_and_pads_degenerate_extent() {
        let bbox =
            BoundingBox::from_xy(&[5.0, f64::NAN, 5.0], &[1.0, 2.0, 3.0], 26913, 1.0).unwrap();
        assert_eq!(bbox.west(), 4.5);
        assert_eq!(bbox.east(), 5.5);
        assert_eq!(bbox.south(), 1.0);
        assert_eq!(bbox.north(), 3.0);
    }

    #[test]
    fn from_xy_of_nothing_is_invalid() {
        assert!(BoundingBox::from_xy(&[], &[], 4326, 0.0).is_err());
    }

    #[test]
    fn overlap_and_buffer() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0, 3857).unwrap();
        let b = BoundingBox::new(10.0, 20.0, 30.0, 30.0, 3857).unwrap();
        assert!(a.overlaps_x(&b));
        assert!(!a.overlaps_y(&b));

        let buffered = a.buffered(0.1);
        assert_eq!(buffered.west(), -1.0);
        assert_eq!(buffered.north(), 11.0);
        assert_eq!(buffered.center(), (5.0, 5.0));
        assert_eq!(a.to_bbox_string(), "0.00000000,0.00000000,10.00000000,10.00000000");
    }
}
