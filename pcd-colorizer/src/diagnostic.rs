use std::path::Path;

use image::{ImageFormat, Rgb, RgbImage};
use pcd_core::pointcloud::bounds::BoundingBox;

use crate::error::ColorizeError;

const CANVAS_SIZE: u32 = 800;
const MARGIN_RATIO: f64 = 0.05;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const RASTER_OUTLINE: Rgb<u8> = Rgb([0, 0, 255]);
const INSIDE: Rgb<u8> = Rgb([0, 160, 0]);
const OUTSIDE: Rgb<u8> = Rgb([220, 0, 0]);

/// Overlay of raster bounds and a sample of transformed points.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticImage {
    image: RgbImage,
    sampled_points: usize,
}

impl DiagnosticImage {
    /// Draws every `n / sample_size`-th point, green when it falls on the raster
    /// and red otherwise. The view covers both the raster and the points.
    pub fn render(
        x: &[f64],
        y: &[f64],
        valid: &[bool],
        raster_bounds: &BoundingBox,
        sample_size: usize,
    ) -> Self {
        let stride = (x.len() / sample_size.max(1)).max(1);
        let sample: Vec<(f64, f64, bool)> = x
            .iter()
            .zip(y)
            .zip(valid)
            .step_by(stride)
            .filter(|((px, py), _)| px.is_finite() && py.is_finite())
            .map(|((&px, &py), &ok)| (px, py, ok))
            .collect();

        let mut west = raster_bounds.west();
        let mut south = raster_bounds.south();
        let mut east = raster_bounds.east();
        let mut north = raster_bounds.north();
        for &(px, py, _) in &sample {
            west = west.min(px);
            east = east.max(px);
            south = south.min(py);
            north = north.max(py);
        }
        let margin = (east - west).max(north - south) * MARGIN_RATIO;
        let view = View {
            west: west - margin,
            north: north + margin,
            scale: CANVAS_SIZE as f64 / ((east - west).max(north - south) + 2.0 * margin),
        };

        let mut image = RgbImage::from_pixel(CANVAS_SIZE, CANVAS_SIZE, BACKGROUND);
        let (left, top) = view.to_canvas(raster_bounds.west(), raster_bounds.north());
        let (right, bottom) = view.to_canvas(raster_bounds.east(), raster_bounds.south());
        draw_rectangle(&mut image, left, top, right, bottom, RASTER_OUTLINE);
        for &(px, py, ok) in &sample {
            let (cx, cy) = view.to_canvas(px, py);
            draw_dot(&mut image, cx, cy, if ok { INSIDE } else { OUTSIDE });
        }

        Self {
            image,
            sampled_points: sample.len(),
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn sampled_points(&self) -> usize {
        self.sampled_points
    }

    pub fn save_png(&self, path: &Path) -> Result<(), ColorizeError> {
        self.image.save_with_format(path, ImageFormat::Png)?;
        log::info!("Alignment diagnostic saved: {}", path.display());
        Ok(())
    }
}

struct View {
    west: f64,
    north: f64,
    scale: f64,
}

impl View {
    fn to_canvas(&self, x: f64, y: f64) -> (i64, i64) {
        (
            ((x - self.west) * self.scale).floor() as i64,
            ((self.north - y) * self.scale).floor() as i64,
        )
    }
}

fn put(image: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if (0..image.width() as i64).contains(&x) && (0..image.height() as i64).contains(&y) {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_rectangle(image: &mut RgbImage, left: i64, top: i64, right: i64, bottom: i64, color: Rgb<u8>) {
    for x in left..=right {
        put(image, x, top, color);
        put(image, x, bottom, color);
    }
    for y in top..=bottom {
        put(image, left, y, color);
        put(image, right, y, color);
    }
}

fn draw_dot(image: &mut RgbImage, cx: i64, cy: i64, color: Rgb<u8>) {
    for dy in -1..=1 {
        for dx in -1..=1 {
            put(image, cx + dx, cy + dy, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_points_by_validity() {
        let raster = BoundingBox::new(0.0, 0.0, 100.0, 100.0, 26913).unwrap();
        let diagnostic = DiagnosticImage::render(
            &[50.0, 150.0],
            &[50.0, 50.0],
            &[true, false],
            &raster,
            5000,
        );
        assert_eq!(diagnostic.sampled_points(), 2);

        let image = diagnostic.image();
        let pixels: Vec<&Rgb<u8>> = image.pixels().collect();
        assert!(pixels.iter().any(|p| **p == INSIDE));
        assert!(pixels.iter().any(|p| **p == OUTSIDE));
        assert!(pixels.iter().any(|p| **p == RASTER_OUTLINE));
    }

    #[test]
    fn samples_with_stride() {
        let raster = BoundingBox::new(0.0, 0.0, 10.0, 10.0, 3857).unwrap();
        let x: Vec<f64> = (0..100).map(|i| i as f64 / 10.0).collect();
        let y = vec![5.0; 100];
        let valid = vec![true; 100];
        let diagnostic = DiagnosticImage::render(&x, &y, &valid, &raster, 10);
        assert_eq!(diagnostic.sampled_points(), 10);
    }

    #[test]
    fn saves_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alignment.png");
        let raster = BoundingBox::new(0.0, 0.0, 1.0, 1.0, 4326).unwrap();
        DiagnosticImage::render(&[0.5], &[0.5], &[true], &raster, 10)
            .save_png(&path)
            .unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"\x89PNG");
    }
}
