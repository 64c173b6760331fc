use std::fmt;

use http::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::layers::{GPS_POINT_LAYER, RESTRICTED_AREA_LAYER, SHIFT_LAYER, SPRAY_LAYER, WEED_LAYER};

pub const MAX_ZOOM: u8 = 22;

/// Marker in request URLs that identifies the authenticated tile function.
pub const VECTOR_TILE_ENDPOINT: &str = "getVectorTile";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileError {
    ZoomOutOfRange(u8),
    CoordOutOfRange { z: u8, x: u32, y: u32 },
    InvalidToken,
}

impl fmt::Display for TileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileError::ZoomOutOfRange(z) => write!(f, "zoom {z} out of range 0..={MAX_ZOOM}"),
            TileError::CoordOutOfRange { z, x, y } => {
                write!(f, "tile {z}/{x}/{y} outside the {0}x{0} grid", 1u64 << z)
            }
            TileError::InvalidToken => write!(f, "access token is not a valid header value"),
        }
    }
}

impl std::error::Error for TileError {}

/// A validated XYZ tile address.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    z: u8,
    x: u32,
    y: u32,
}

impl TileCoord {
    pub fn new(z: u8, x: u32, y: u32) -> Result<Self, TileError> {
        if z > MAX_ZOOM {
            return Err(TileError::ZoomOutOfRange(z));
        }
        let dim = 1u64 << z;
        if u64::from(x) >= dim || u64::from(y) >= dim {
            return Err(TileError::CoordOutOfRange { z, x, y });
        }
        Ok(Self { z, x, y })
    }

    pub fn z(&self) -> u8 {
        self.z
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// URL with `{z}`, `{x}` and `{y}` placeholders, expanded by the renderer per tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileTemplate(String);

impl TileTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn expand(&self, tile: TileCoord) -> String {
        self.0
            .replace("{z}", &tile.z.to_string())
            .replace("{x}", &tile.x.to_string())
            .replace("{y}", &tile.y.to_string())
    }
}

impl fmt::Display for TileTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<TileTemplate> for String {
    fn from(t: TileTemplate) -> Self {
        t.0
    }
}

/// Collection tiles served by a tipg instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TipgTiles {
    /// Service root including the trailing slash, e.g. `http://localhost:8000/`.
    pub base_url: String,
    pub collection: String,
    pub properties: Vec<String>,
    pub limit: u32,
}

impl TipgTiles {
    pub const GROUNDWATER_COLLECTION: &'static str = "public.ground_water_level_monthly_with_geom";
    pub const DEFAULT_LIMIT: u32 = 5000;

    pub fn groundwater(base_url: impl Into<String>, variable: &str) -> Self {
        Self {
            base_url: base_url.into(),
            collection: Self::GROUNDWATER_COLLECTION.to_string(),
            properties: vec!["id".to_string(), variable.to_string()],
            limit: Self::DEFAULT_LIMIT,
        }
    }

    /// Template for one time slice (`year_month` as `YYYY-MM`).
    pub fn template(&self, year_month: &str) -> TileTemplate {
        TileTemplate(format!(
            "{}collections/{}/tiles/{{z}}/{{x}}/{{y}}?properties={}&limit={}&year_month={}",
            self.base_url,
            self.collection,
            self.properties.join(","),
            self.limit,
            year_month
        ))
    }

    /// Single feature endpoint used by the details panel.
    pub fn item_url(base_url: &str, collection: &str, id: &str) -> String {
        format!("{base_url}collections/{collection}/items/{id}")
    }
}

/// Resources exposed by the authenticated tile function.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Shift,
    Gps,
    Spray,
    Weed,
    RestrictedArea,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Shift,
        ResourceKind::Gps,
        ResourceKind::Spray,
        ResourceKind::Weed,
        ResourceKind::RestrictedArea,
    ];

    /// Value of the `layer` query parameter.
    pub fn query_name(&self) -> &'static str {
        match self {
            ResourceKind::Shift => "shift",
            ResourceKind::Gps => "gps",
            ResourceKind::Spray => "spray",
            ResourceKind::Weed => "weed",
            ResourceKind::RestrictedArea => "restricted_area",
        }
    }

    /// Engine layer and source id the resource is rendered as.
    pub fn layer_name(&self) -> &'static str {
        match self {
            ResourceKind::Shift => SHIFT_LAYER,
            ResourceKind::Gps => GPS_POINT_LAYER,
            ResourceKind::Spray => SPRAY_LAYER,
            ResourceKind::Weed => WEED_LAYER,
            ResourceKind::RestrictedArea => RESTRICTED_AREA_LAYER,
        }
    }

    /// Field projection requested for the resource.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Shift => &["shift_id"],
            ResourceKind::Gps => &[
                "gps_id",
                "active_nozzles",
                "date_time",
                "chainage",
                "track_number",
                "vehicle_direction",
                "vehicle_speed",
                "distance_cumul",
                "weed_zone_density",
                "spray_avg_state",
                "spray_zone_chemical_quantity",
                "spray_zone_chemical_area",
                "shift_id",
            ],
            ResourceKind::Spray | ResourceKind::Weed => &["value", "shift_id"],
            ResourceKind::RestrictedArea => &["restricted_area_id", "label", "company_id"],
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|k| k.query_name() == s || k.layer_name() == s)
            .ok_or_else(|| format!("unknown resource {s:?}"))
    }
}

/// The `getVectorTile` function API, keyed by host, function code and year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorTileApi {
    pub host: String,
    pub code: String,
    pub year: i32,
}

impl VectorTileApi {
    pub fn new(host: impl Into<String>, code: impl Into<String>, year: i32) -> Self {
        Self {
            host: host.into(),
            code: code.into(),
            year,
        }
    }

    pub fn template(&self, kind: ResourceKind) -> TileTemplate {
        TileTemplate(format!(
            "https://{}/api/{VECTOR_TILE_ENDPOINT}?x={{x}}&y={{y}}&z={{z}}&layer={}&fields={}&code={}&year={}",
            self.host,
            kind.query_name(),
            kind.fields().join(","),
            self.code,
            self.year
        ))
    }
}

/// Request category reported by the renderer when it asks for a URL to be transformed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Style,
    Source,
    Tile,
    Glyphs,
    SpriteImage,
    SpriteJson,
    Image,
    Unknown,
}

impl RequestKind {
    pub fn from_renderer(kind: &str) -> Self {
        match kind {
            "Style" => RequestKind::Style,
            "Source" => RequestKind::Source,
            "Tile" => RequestKind::Tile,
            "Glyphs" => RequestKind::Glyphs,
            "SpriteImage" => RequestKind::SpriteImage,
            "SpriteJSON" => RequestKind::SpriteJson,
            "Image" => RequestKind::Image,
            _ => RequestKind::Unknown,
        }
    }
}

/// Outgoing request after [`transform_request`].
#[derive(Debug, Clone)]
pub struct TransformedRequest {
    pub url: String,
    pub headers: HeaderMap,
}

/// Attaches `Authorization: Bearer <token>` to tile requests for the tile function.
/// Every other request passes through with no headers.
pub fn transform_request(
    url: &str,
    kind: RequestKind,
    token: Option<&str>,
) -> Result<TransformedRequest, TileError> {
    let mut headers = HeaderMap::new();
    if let (RequestKind::Tile, Some(token)) = (kind, token) {
        if url.contains(VECTOR_TILE_ENDPOINT) {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| TileError::InvalidToken)?;
            headers.insert(AUTHORIZATION, value);
        }
    }
    Ok(TransformedRequest {
        url: url.to_string(),
        headers,
    })
}
