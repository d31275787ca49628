mod common;

use ortho_raster::geotiff::write_geotiff;
use pcd_colorizer::{load_raster, Colorizer as _, ColorizerBuilder};
use pcd_core::pointcloud::point::Color;
use pcd_exporter::las::write_las;
use pcd_parser::parsers::{las::LasParserProvider, Parser as _, ParserProvider as _};

use common::{grid_cloud, white_rgb8};

#[test]
fn colorizes_las_from_geotiff_and_writes_laz() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("input.las");
    let raster_path = dir.path().join("ortho.tif");
    let output_path = dir.path().join("output.laz");

    let mut source = grid_cloud(500_010.0, 4_400_010.0, 6, 1.5, Some(26913));
    source.metadata.point_format = 1;
    write_las(&input_path, &source).unwrap();
    write_geotiff(
        &raster_path,
        &white_rgb8(500_000.0, 4_400_050.0, 50, 50, 26913),
    )
    .unwrap();

    let point_cloud = LasParserProvider {
        filename: input_path,
    }
    .get_parser()
    .parse()
    .unwrap();
    assert_eq!(point_cloud.metadata.crs, Some(26913));

    let raster = load_raster(&raster_path).unwrap();
    let output = ColorizerBuilder::new()
        .build()
        .execute(&point_cloud, raster)
        .unwrap();
    write_las(&output_path, &output.point_cloud).unwrap();

    let written = LasParserProvider {
        filename: output_path,
    }
    .get_parser()
    .parse()
    .unwrap();
    assert_eq!(written.len(), 36);
    assert_eq!(written.metadata.point_format, 3);
    assert_eq!(written.metadata.crs, Some(26913));
    assert!(written
        .points
        .iter()
        .all(|p| p.color == Some(Color::gray(65535))));
    for (out, original) in written.points.iter().zip(&point_cloud.points) {
        assert!((out.x - original.x).abs() < 1e-9);
        assert!((out.y - original.y).abs() < 1e-9);
        assert_eq!(out.attributes.intensity, original.attributes.intensity);
        assert_eq!(out.attributes.classification, original.attributes.classification);
    }
}
