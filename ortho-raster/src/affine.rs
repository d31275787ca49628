/// Pixel-to-world affine transform in GDAL coefficient order.
///
/// `x = c + col * a + row * b`, `y = f + col * d + row * e`, where `(col, row)`
/// addresses the top-left corner of a pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub c: f64,
    pub a: f64,
    pub b: f64,
    pub f: f64,
    pub d: f64,
    pub e: f64,
}

impl AffineTransform {
    /// From GDAL's `[c, a, b, f, d, e]` geotransform array.
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            c: gt[0],
            a: gt[1],
            b: gt[2],
            f: gt[3],
            d: gt[4],
            e: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [self.c, self.a, self.b, self.f, self.d, self.e]
    }

    /// North-up transform mapping a `width` x `height` grid onto the given bounds.
    pub fn from_bounds(
        west: f64,
        south: f64,
        east: f64,
        north: f64,
        width: usize,
        height: usize,
    ) -> Self {
        Self {
            c: west,
            a: (east - west) / width as f64,
            b: 0.0,
            f: north,
            d: 0.0,
            e: -(north - south) / height as f64,
        }
    }

    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.c + col * self.a + row * self.b,
            self.f + col * self.d + row * self.e,
        )
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.e - self.b * self.d
    }

    /// World-to-pixel transform, or `None` when the matrix is singular.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let a = self.e / det;
        let b = -self.b / det;
        let d = -self.d / det;
        let e = self.a / det;
        Some(Self {
            a,
            b,
            d,
            e,
            c: -(a * self.c + b * self.f),
            f: -(d * self.c + e * self.f),
        })
    }

    /// Envelope `(west, south, east, north)` of the four transformed grid corners.
    pub fn bounds(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let (w, h) = (width as f64, height as f64);
        let corners = [
            self.apply(0.0, 0.0),
            self.apply(w, 0.0),
            self.apply(0.0, h),
            self.apply(w, h),
        ];
        corners.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(west, south, east, north), &(x, y)| {
                (west.min(x), south.min(y), east.max(x), north.max(y))
            },
        )
    }
}
