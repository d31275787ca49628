use std::{fmt, str::FromStr};

use thiserror::Error;

/// EPSG code type alias
pub type EpsgCode = u16;

/// WGS84 Geographic 2D (EPSG:4326)
pub const EPSG_WGS84_GEOGRAPHIC_2D: EpsgCode = 4326;
/// WGS84 / Pseudo-Mercator (EPSG:3857)
pub const EPSG_WEB_MERCATOR: EpsgCode = 3857;
/// NAD83 / UTM zone 13N (EPSG:26913)
pub const EPSG_NAD83_UTM_13N: EpsgCode = 26913;

// GeoKey IDs
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;
const USER_DEFINED: u16 = 32767;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CrsParseError {
    #[error("empty CRS identifier")]
    Empty,
    #[error("unsupported CRS authority in '{0}', expected EPSG")]
    UnsupportedAuthority(String),
    #[error("invalid EPSG code in '{0}'")]
    InvalidCode(String),
}

/// A CRS identifier as given by a user, e.g. `EPSG:2232` or `2232`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Crs(pub EpsgCode);

impl FromStr for Crs {
    type Err = CrsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CrsParseError::Empty);
        }
        let code = match s.split_once(':') {
            Some((authority, code)) => {
                if !authority.eq_ignore_ascii_case("epsg") {
                    return Err(CrsParseError::UnsupportedAuthority(s.to_string()));
                }
                code
            }
            None => s,
        };
        code.trim()
            .parse::<EpsgCode>()
            .map(Crs)
            .map_err(|_| CrsParseError::InvalidCode(s.to_string()))
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

/// Reads the EPSG code out of a GeoTIFF-style GeoKeyDirectory.
///
/// The directory layout is `[version, revision, minor, count]` followed by
/// `count` entries of `[key_id, tag_location, count, value]`. Only inline
/// values (`tag_location == 0`) are considered. A projected CRS takes
/// precedence over a geographic one.
pub fn epsg_from_geokeys(directory: &[u16]) -> Option<EpsgCode> {
    if directory.len() < 4 {
        return None;
    }
    let number_of_keys = directory[3] as usize;

    let mut projected = None;
    let mut geographic = None;
    for entry in directory[4..].chunks_exact(4).take(number_of_keys) {
        let (key_id, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 || value == 0 || value == USER_DEFINED {
            continue;
        }
        match key_id {
            PROJECTED_CS_TYPE_GEO_KEY => projected = Some(value),
            GEOGRAPHIC_TYPE_GEO_KEY => geographic = Some(value),
            _ => {}
        }
    }

    projected.or(geographic)
}

/// Reads the EPSG code of the outermost object in an OGC WKT string.
///
/// In WKT1 the authority of the whole CRS is the last `AUTHORITY` clause.
pub fn epsg_from_wkt(wkt: &str) -> Option<EpsgCode> {
    let upper = wkt.to_ascii_uppercase();
    let start = upper.rfind("AUTHORITY[\"EPSG\"")?;
    let rest = &wkt[start..];
    let end = rest.find(']')?;
    rest[..end]
        .split(',')
        .nth(1)
        .map(|code| code.trim().trim_matches('"'))
        .and_then(|code| code.parse().ok())
}
