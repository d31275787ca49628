use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
    time::Duration,
};

use pcd_core::{crs::EpsgCode, pointcloud::bounds::BoundingBox};
use serde::Deserialize;

use crate::{
    contracts::{ImageSize, ImagerySource, NativeResolution},
    error::{ExportFailure, ServiceError},
    retry::{RetryFailure, RetryPolicy},
};

/// Image bodies shorter than this are error messages, not TIFFs.
const MIN_IMAGE_BYTES: usize = 1000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const INFO_TIMEOUT: Duration = Duration::from_secs(10);

/// The parts of an ImageServer's `?f=json` description used to size requests.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub max_image_width: Option<f64>,
    pub max_image_height: Option<f64>,
    pub pixel_size_x: Option<f64>,
    pub pixel_size_y: Option<f64>,
    pub spatial_reference: Option<SpatialReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialReference {
    pub wkid: Option<u32>,
    pub latest_wkid: Option<u32>,
}

impl ServiceInfo {
    pub fn parse(body: &[u8]) -> Result<Self, ServiceError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Usable values only: sizes must be positive, and the finer of the two
    /// pixel sizes wins.
    pub fn native_resolution(&self) -> NativeResolution {
        let positive = |v: Option<f64>| v.filter(|v| v.is_finite() && *v > 0.0);
        let pixel_size = match (positive(self.pixel_size_x), positive(self.pixel_size_y)) {
            (Some(x), Some(y)) => Some(x.min(y)),
            (x, y) => x.or(y),
        };
        let crs = self
            .spatial_reference
            .as_ref()
            .and_then(|sr| sr.latest_wkid.or(sr.wkid))
            .and_then(|wkid| EpsgCode::try_from(wkid).ok());
        NativeResolution {
            pixel_size,
            crs,
            max_width: positive(self.max_image_width).map(|v| v as u32),
            max_height: positive(self.max_image_height).map(|v| v as u32),
        }
    }
}

/// Client for an ArcGIS ImageServer `exportImage` endpoint.
pub struct ImageServerSource {
    client: reqwest::blocking::Client,
    service_url: String,
    image_sr: EpsgCode,
    download_dir: PathBuf,
    retry: RetryPolicy,
    native: OnceLock<Option<NativeResolution>>,
}

impl ImageServerSource {
    /// `service_url` is the ImageServer root, e.g. `https://host/arcgis/rest/services/x/ImageServer`.
    /// Exported images are requested in `image_sr` and stored under `download_dir`.
    pub fn new(
        service_url: &str,
        image_sr: EpsgCode,
        download_dir: &Path,
        retry: RetryPolicy,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            service_url: service_url.trim_end_matches('/').to_string(),
            image_sr,
            download_dir: download_dir.to_path_buf(),
            retry,
            native: OnceLock::new(),
        })
    }

    fn export_url(&self) -> String {
        format!("{}/exportImage", self.service_url)
    }

    fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<Vec<u8>, ServiceError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .timeout(timeout)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.bytes()?.to_vec())
    }

    /// Queries the service description (`<service_url>?f=json`).
    pub fn service_info(&self) -> Result<ServiceInfo, ServiceError> {
        let query = [("f", "json".to_string())];
        let body = self
            .retry
            .run(
                || self.get(&self.service_url, &query, INFO_TIMEOUT),
                ServiceError::is_transient,
                || false,
            )
            .map_err(give_up)?;
        ServiceInfo::parse(&body)
    }

    fn output_path(&self, bbox: &BoundingBox, size: ImageSize) -> PathBuf {
        let (cx, cy) = bbox.center();
        let size = match size {
            ImageSize::Explicit { width, height } => format!("{width}x{height}"),
            ImageSize::Auto => "auto".to_string(),
        };
        self.download_dir
            .join(format!("ortho_{:.0}_{:.0}_{}.tif", cx, cy, size))
    }
}

impl ImagerySource for ImageServerSource {
    fn export_image(
        &self,
        bbox: &BoundingBox,
        size: ImageSize,
        cancelled: &dyn Fn() -> bool,
    ) -> Result<PathBuf, ExportFailure> {
        let query = export_query(bbox, self.image_sr, size);
        log::info!(
            "Requesting orthophoto from {} for bbox {} ({:?})",
            self.service_url,
            bbox.to_bbox_string(),
            size
        );

        let url = self.export_url();
        let body = self
            .retry
            .run(
                || self.get(&url, &query, REQUEST_TIMEOUT),
                ServiceError::is_transient,
                cancelled,
            )
            .map_err(|failure| {
                if failure.cancelled {
                    ExportFailure::Cancelled
                } else {
                    ExportFailure::Service(give_up(failure))
                }
            })?;
        check_image_body(&body, size)?;

        fs::create_dir_all(&self.download_dir)?;
        let path = self.output_path(bbox, size);
        fs::write(&path, &body)?;
        log::info!("Saved orthophoto ({} bytes) to {}", body.len(), path.display());
        Ok(path)
    }

    /// Fetched once per source; an unreachable or malformed description
    /// leaves sizing to the caller's defaults.
    fn native_resolution(&self) -> Option<NativeResolution> {
        *self.native.get_or_init(|| match self.service_info() {
            Ok(info) => {
                let native = info.native_resolution();
                log::info!(
                    "Service limits - width: {:?}, height: {:?}, pixel size: {:?}",
                    native.max_width,
                    native.max_height,
                    native.pixel_size
                );
                Some(native)
            }
            Err(e) => {
                log::warn!("Failed to fetch service info from {}: {e}", self.service_url);
                None
            }
        })
    }
}

fn give_up(failure: RetryFailure<ServiceError>) -> ServiceError {
    if failure.exhausted {
        ServiceError::RetriesExhausted {
            attempts: failure.attempts,
            last_error: failure.error.to_string(),
        }
    } else {
        failure.error
    }
}

fn export_query(
    bbox: &BoundingBox,
    image_sr: EpsgCode,
    size: ImageSize,
) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("bbox", bbox.to_bbox_string()),
        ("bboxSR", bbox.crs().to_string()),
        ("imageSR", image_sr.to_string()),
        ("format", "tiff".to_string()),
        ("f", "image".to_string()),
    ];
    if let ImageSize::Explicit { width, height } = size {
        query.push(("size", format!("{width},{height}")));
    }
    query
}

/// Classifies a response body that is too small to be an image.
fn check_image_body(body: &[u8], size: ImageSize) -> Result<(), ExportFailure> {
    if body.len() >= MIN_IMAGE_BYTES {
        return Ok(());
    }
    let text = String::from_utf8_lossy(body);
    let message = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|json| error_message(&json))
        .unwrap_or_else(|| text.trim().to_string());

    if message.to_ascii_lowercase().contains("size limit") {
        let (width, height) = match size {
            ImageSize::Explicit { width, height } => (width, height),
            ImageSize::Auto => (0, 0),
        };
        return Err(ExportFailure::SizeLimit { width, height });
    }
    Err(ExportFailure::InvalidResponse(message))
}

/// `{"error": {"message": ..., "details": [...]}}` as returned by ArcGIS REST.
fn error_message(json: &serde_json::Value) -> Option<String> {
    let error = json.get("error")?;
    let mut parts: Vec<String> = error
        .get("message")
        .and_then(|m| m.as_str())
        .map(|m| vec![m.to_string()])
        .unwrap_or_default();
    if let Some(details) = error.get("details").and_then(|d| d.as_array()) {
        parts.extend(details.iter().filter_map(|d| d.as_str()).map(str::to_string));
    }
    (!parts.is_empty()).then(|| parts.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox() -> BoundingBox {
        BoundingBox::new(-11686000.0, 4828000.0, -11685000.0, 4829000.0, 3857).unwrap()
    }

    #[test]
    fn query_carries_bbox_and_size() {
        let size = ImageSize::Explicit {
            width: 1000,
            height: 800,
        };
        let query = export_query(&bbox(), 3857, size);
        let get = |key: &str| {
            query
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(
            get("bbox").unwrap(),
            "-11686000.00000000,4828000.00000000,-11685000.00000000,4829000.00000000"
        );
        assert_eq!(get("bboxSR").unwrap(), "3857");
        assert_eq!(get("imageSR").unwrap(), "3857");
        assert_eq!(get("size").unwrap(), "1000,800");
        assert_eq!(get("format").unwrap(), "tiff");
        assert_eq!(get("f").unwrap(), "image");

        let auto = export_query(&bbox(), 3857, ImageSize::Auto);
        assert!(auto.iter().all(|(k, _)| *k != "size"));
    }

    #[test]
    fn size_limit_error_is_distinguished() {
        let body = br#"{"error":{"code":400,"message":"Unable to complete operation.","details":["The requested image exceeds the size limit."]}}"#;
        let size = ImageSize::Explicit {
            width: 4000,
            height: 4000,
        };
        assert!(matches!(
            check_image_body(body, size),
            Err(ExportFailure::SizeLimit {
                width: 4000,
                height: 4000
            })
        ));
    }

    #[test]
    fn small_bodies_are_errors() {
        assert!(matches!(
            check_image_body(b"Service unavailable", ImageSize::Auto),
            Err(ExportFailure::InvalidResponse(message)) if message == "Service unavailable"
        ));
        assert!(check_image_body(&[0u8; 2048], ImageSize::Auto).is_ok());
    }

    #[test]
    fn service_info_reports_finest_pixel_and_limits() {
        let body = br#"{
            "serviceDescription": "NAIP Plus",
            "pixelSizeX": 0.6,
            "pixelSizeY": 0.5,
            "maxImageWidth": 4100,
            "maxImageHeight": 15000,
            "spatialReference": {"wkid": 102100, "latestWkid": 3857}
        }"#;
        let info = ServiceInfo::parse(body).unwrap();
        assert_eq!(info.max_image_width, Some(4100.0));
        assert_eq!(
            info.native_resolution(),
            NativeResolution {
                pixel_size: Some(0.5),
                crs: Some(3857),
                max_width: Some(4100),
                max_height: Some(15000),
            }
        );
    }

    #[test]
    fn service_info_skips_unusable_values() {
        let body = br#"{"pixelSizeX": 0, "pixelSizeY": 1.2, "maxImageWidth": -1, "spatialReference": {"wkid": 102100}}"#;
        let native = ServiceInfo::parse(body).unwrap().native_resolution();
        assert_eq!(native.pixel_size, Some(1.2));
        assert_eq!(native.crs, None);
        assert_eq!(native.max_width, None);
        assert_eq!(native.max_height, None);

        let error_page = br#"{"error": {"code": 499, "message": "Token Required"}}"#;
        assert_eq!(
            ServiceInfo::parse(error_page).unwrap().native_resolution(),
            NativeResolution::default()
        );
        assert!(matches!(
            ServiceInfo::parse(b"<html>down</html>"),
            Err(ServiceError::InvalidServiceInfo(_))
        ));
    }

    #[test]
    fn output_path_names_request() {
        let tmp = tempfile::tempdir().unwrap();
        let source = ImageServerSource::new(
            "https://example.invalid/ImageServer/",
            3857,
            tmp.path(),
            RetryPolicy::default(),
        )
        .unwrap();
        assert_eq!(
            source.export_url(),
            "https://example.invalid/ImageServer/exportImage"
        );
        let size = ImageSize::Explicit {
            width: 512,
            height: 512,
        };
        let path = source.output_path(&bbox(), size);
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "ortho_-11685500_4828500_512x512.tif"
        );
    }
}
