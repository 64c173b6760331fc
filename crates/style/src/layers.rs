//! Declarative layer and source definitions, one pure builder per layer category.
//!
//! Builders never touch an engine; they return values the engine boundary serializes
//! into the renderer's style JSON.

use foundation::{EngineLayerId, LayerId, SourceId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::expr::Expression;

pub const STATION_SOURCE: &str = "measuring_stations_tipg";
pub const STATION_LAYER: &str = "measuring_stations_tipg";
pub const STATION_HIGHLIGHT_LAYER: &str = "measuring_stations_tipg_highlight";
pub const STATION_SELECTED_LAYER: &str = "measuring_stations_tipg_selected";
pub const STATION_ID_KEY: &str = "id";
pub const STATION_VARIABLE: &str = "ground_water_level_m_above_sealevel_avg";

pub const SHIFT_LAYER: &str = "Shift";
pub const GPS_POINT_LAYER: &str = "GPSPoint";
pub const SPRAY_LAYER: &str = "Spray";
pub const WEED_LAYER: &str = "Weed";
pub const RESTRICTED_AREA_LAYER: &str = "RestrictedArea";
pub const BASELINE_SEGMENT_LAYER: &str = "baselineSegment";

pub const HIGHLIGHT_SUFFIX: &str = "Highlight";

/// Layers of the shifts scene that get a popup and a highlight companion on click.
pub const POPUP_LAYERS: [&str; 3] = [GPS_POINT_LAYER, SPRAY_LAYER, RESTRICTED_AREA_LAYER];

/// Substring identifying the basemap layer new overlays are inserted beneath.
pub const ANCHOR_LAYER_MARKER: &str = "admin";

const HIGHLIGHT_COLOR: &str = "#00ffff";

/// `GPSPoint` → `GPSPointHighlight`.
pub fn highlight_id(layer: &str) -> EngineLayerId {
    EngineLayerId::new(format!("{layer}{HIGHLIGHT_SUFFIX}"))
}

/// `GPSPoint` → `GPSPointId`, the per-layer feature id property.
pub fn feature_id_key(layer: &str) -> String {
    format!("{layer}Id")
}

/// Filter on `<layer>Highlight` that matches no feature: `["in", "<layer>Id", ""]`.
pub fn clear_highlight(layer: &str) -> Expression {
    Expression::in_list(feature_id_key(layer), [""])
}

/// First style layer whose id contains [`ANCHOR_LAYER_MARKER`].
pub fn find_anchor_layer<'a>(
    style_layers: impl IntoIterator<Item = &'a EngineLayerId>,
) -> Option<EngineLayerId> {
    style_layers
        .into_iter()
        .find(|id| id.as_str().contains(ANCHOR_LAYER_MARKER))
        .cloned()
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Circle,
    Line,
    Fill,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Visible,
    None,
}

impl Visibility {
    pub fn from_visible(visible: bool) -> Self {
        if visible {
            Visibility::Visible
        } else {
            Visibility::None
        }
    }

    pub fn is_visible(&self) -> bool {
        matches!(self, Visibility::Visible)
    }
}

/// A renderable layer definition.
///
/// Serializes to the renderer's layer object (`type`, `source-layer`, `minzoom`, ...).
/// `before` is placement information for `addLayer` and is not part of the object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSpec {
    pub id: EngineLayerId,
    #[serde(rename = "type")]
    pub kind: LayerType,
    pub source: SourceId,
    #[serde(rename = "source-layer", skip_serializing_if = "Option::is_none")]
    pub source_layer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minzoom: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maxzoom: Option<f64>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub layout: Map<String, Value>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub paint: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Expression>,
    #[serde(skip)]
    pub before: Option<EngineLayerId>,
}

impl LayerSpec {
    pub fn new(id: impl Into<EngineLayerId>, kind: LayerType, source: impl Into<SourceId>) -> Self {
        Self {
            id: id.into(),
            kind,
            source: source.into(),
            source_layer: None,
            minzoom: None,
            maxzoom: None,
            layout: Map::new(),
            paint: Map::new(),
            filter: None,
            before: None,
        }
    }

    pub fn source_layer(mut self, name: impl Into<String>) -> Self {
        self.source_layer = Some(name.into());
        self
    }

    pub fn zoom_range(mut self, minzoom: Option<f64>, maxzoom: Option<f64>) -> Self {
        self.minzoom = minzoom;
        self.maxzoom = maxzoom;
        self
    }

    pub fn paint(mut self, paint: Value) -> Self {
        if let Value::Object(map) = paint {
            self.paint = map;
        }
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.layout.insert("visibility".to_string(), json!(visibility));
        self
    }

    pub fn filter(mut self, filter: Expression) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn before(mut self, before: Option<EngineLayerId>) -> Self {
        self.before = before;
        self
    }

    /// Visibility declared in `layout`; layers without one start visible.
    pub fn initial_visibility(&self) -> Visibility {
        match self.layout.get("visibility").and_then(Value::as_str) {
            Some("none") => Visibility::None,
            _ => Visibility::Visible,
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Source definitions, tagged the way the renderer expects (`"type": "vector"`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceSpec {
    Vector {
        tiles: Vec<String>,
        #[serde(rename = "promoteId", skip_serializing_if = "Option::is_none")]
        promote_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        scheme: Option<String>,
        #[serde(rename = "generateId", skip_serializing_if = "std::ops::Not::not")]
        generate_id: bool,
    },
    Geojson { data: Value },
}

impl SourceSpec {
    pub fn vector(tiles: impl Into<String>) -> Self {
        SourceSpec::Vector {
            tiles: vec![tiles.into()],
            promote_id: None,
            scheme: None,
            generate_id: false,
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A source plus the layers drawn from it, added and removed together.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerBundle {
    pub source_id: SourceId,
    pub source: SourceSpec,
    pub layers: Vec<LayerSpec>,
}

/// Groundwater stations for one month: the base circle layer with a linear color ramp
/// plus hover (radius 7) and selection (radius 12) layers that start matching nothing.
pub fn groundwater_station_layers(tiles_url: impl Into<String>) -> LayerBundle {
    let source = SourceSpec::Vector {
        tiles: vec![tiles_url.into()],
        promote_id: Some(STATION_ID_KEY.to_string()),
        scheme: Some("xyz".to_string()),
        generate_id: false,
    };

    let base = LayerSpec::new(STATION_LAYER, LayerType::Circle, STATION_SOURCE)
        .source_layer("default")
        .paint(json!({
            "circle-radius": 4,
            "circle-color": [
                "interpolate",
                ["linear"],
                ["to-number", ["get", STATION_VARIABLE]],
                -1.3922, "#FFEDA0",
                82.717625, "#FEB24C",
                165.43525, "#F03B20"
            ]
        }));

    let marker = |id: &str, radius: u32| {
        LayerSpec::new(id, LayerType::Circle, STATION_SOURCE)
            .source_layer("default")
            .paint(json!({
                "circle-radius": radius,
                "circle-color": HIGHLIGHT_COLOR,
                "circle-stroke-color": "#fff",
                "circle-stroke-width": 1
            }))
            .filter(Expression::match_nothing(STATION_ID_KEY))
    };

    LayerBundle {
        source_id: SourceId::new(STATION_SOURCE),
        source,
        layers: vec![
            base,
            marker(STATION_HIGHLIGHT_LAYER, 7),
            marker(STATION_SELECTED_LAYER, 12),
        ],
    }
}

/// Shift lines, widening exponentially with zoom.
pub fn shift_layers(tiles_url: impl Into<String>, before: Option<EngineLayerId>) -> LayerBundle {
    let line = LayerSpec::new(SHIFT_LAYER, LayerType::Line, SHIFT_LAYER)
        .source_layer(SHIFT_LAYER)
        .zoom_range(None, Some(16.0))
        .paint(json!({
            "line-width": {"type": "exponential", "base": 2, "stops": [[0, 3], [7, 6], [15, 20]]},
            "line-color": "#e85b62"
        }))
        .before(before);

    LayerBundle {
        source_id: SourceId::new(SHIFT_LAYER),
        source: SourceSpec::vector(tiles_url),
        layers: vec![line],
    }
}

/// GPS positions colored by spray state, plus a ring highlight keyed on `gps_id`.
pub fn gps_point_layers(
    tiles_url: impl Into<String>,
    before: Option<EngineLayerId>,
) -> LayerBundle {
    let points = LayerSpec::new(GPS_POINT_LAYER, LayerType::Circle, GPS_POINT_LAYER)
        .source_layer(GPS_POINT_LAYER)
        .zoom_range(Some(8.0), None)
        .paint(json!({
            "circle-color": [
                "case",
                ["has", "spray_avg_state"],
                "rgba(144, 17, 243, 0.8)",
                "rgba(232, 91, 98, 0.6)"
            ],
            "circle-stroke-width": 0,
            "circle-radius": {"base": 2, "stops": [[14, 4], [22, 30]]}
        }))
        .before(before.clone());

    let highlight = LayerSpec::new(highlight_id(GPS_POINT_LAYER), LayerType::Circle, GPS_POINT_LAYER)
        .source_layer(GPS_POINT_LAYER)
        .zoom_range(Some(8.0), None)
        .paint(json!({
            "circle-opacity": 0,
            "circle-stroke-color": HIGHLIGHT_COLOR,
            "circle-stroke-width": 4,
            "circle-radius": {"base": 1.75, "stops": [[14, 4], [22, 30]]}
        }))
        .filter(Expression::in_list("gps_id", [""]))
        .before(before);

    LayerBundle {
        source_id: SourceId::new(GPS_POINT_LAYER),
        source: SourceSpec::Vector {
            tiles: vec![tiles_url.into()],
            promote_id: None,
            scheme: None,
            generate_id: true,
        },
        layers: vec![points, highlight],
    }
}

/// Spray polygons and their outline highlight; hidden until toggled in the legend.
pub fn spray_layers(tiles_url: impl Into<String>, before: Option<EngineLayerId>) -> LayerBundle {
    let fill = LayerSpec::new(SPRAY_LAYER, LayerType::Fill, SPRAY_LAYER)
        .source_layer(SPRAY_LAYER)
        .zoom_range(Some(16.0), None)
        .visibility(Visibility::None)
        .paint(json!({
            "fill-color": "rgba(237, 91, 95, 0.8)",
            "fill-outline-color": "rgba(237, 91, 95, 1)"
        }))
        .before(before.clone());

    let highlight = LayerSpec::new(highlight_id(SPRAY_LAYER), LayerType::Line, SPRAY_LAYER)
        .source_layer(SPRAY_LAYER)
        .zoom_range(Some(16.0), None)
        .visibility(Visibility::None)
        .paint(json!({"line-width": 4, "line-color": HIGHLIGHT_COLOR}))
        .filter(clear_highlight(SPRAY_LAYER))
        .before(before);

    LayerBundle {
        source_id: SourceId::new(SPRAY_LAYER),
        source: SourceSpec::vector(tiles_url),
        layers: vec![fill, highlight],
    }
}

/// Weed density circles with a transparency ramp over `value`.
pub fn weed_layers(tiles_url: impl Into<String>, before: Option<EngineLayerId>) -> LayerBundle {
    let density = LayerSpec::new(WEED_LAYER, LayerType::Circle, WEED_LAYER)
        .source_layer(WEED_LAYER)
        .zoom_range(Some(17.0), None)
        .visibility(Visibility::None)
        .paint(json!({
            "circle-color": [
                "interpolate",
                ["linear"],
                ["to-number", ["get", "value"]],
                0, "rgba(255, 255, 255, 0)",
                0.01, "rgba(229, 245, 224, 0.05)",
                0.25, "rgba(128, 202, 126, 0.2)",
                0.5, "rgba(60, 159, 57, 0.35)",
                0.75, "rgba(33, 111, 30, 0.45)",
                1, "rgba(3, 86, 0, 0.6)"
            ],
            "circle-stroke-width": 0,
            "circle-radius": {"base": 5, "stops": [[15, 1.5], [22, 3]]}
        }))
        .before(before.clone());

    let highlight = LayerSpec::new(highlight_id(WEED_LAYER), LayerType::Circle, WEED_LAYER)
        .source_layer(WEED_LAYER)
        .zoom_range(Some(17.0), None)
        .visibility(Visibility::None)
        .paint(json!({
            "circle-opacity": 0,
            "circle-stroke-width": 4,
            "circle-stroke-color": HIGHLIGHT_COLOR,
            "circle-radius": {"base": 2.75, "stops": [[12, 2], [22, 30]]}
        }))
        .filter(clear_highlight(WEED_LAYER))
        .before(before);

    LayerBundle {
        source_id: SourceId::new(WEED_LAYER),
        source: SourceSpec::vector(tiles_url),
        layers: vec![density, highlight],
    }
}

/// Restricted areas. The highlight is added first so it renders beneath the area.
pub fn restricted_area_layers(
    tiles_url: impl Into<String>,
    before: Option<EngineLayerId>,
) -> LayerBundle {
    let highlight = LayerSpec::new(
        highlight_id(RESTRICTED_AREA_LAYER),
        LayerType::Fill,
        RESTRICTED_AREA_LAYER,
    )
    .source_layer(RESTRICTED_AREA_LAYER)
    .zoom_range(Some(5.0), None)
    .visibility(Visibility::None)
    .paint(json!({
        "fill-outline-color": "#ed1313",
        "fill-color": "#f55d5d",
        "fill-opacity": 0.75
    }))
    .filter(clear_highlight(RESTRICTED_AREA_LAYER))
    .before(before.clone());

    let area = LayerSpec::new(RESTRICTED_AREA_LAYER, LayerType::Fill, RESTRICTED_AREA_LAYER)
        .source_layer(RESTRICTED_AREA_LAYER)
        .zoom_range(Some(6.0), None)
        .visibility(Visibility::None)
        .paint(json!({
            "fill-outline-color": "#fb883b",
            "fill-color": "#fbb03b",
            "fill-opacity": 0.5
        }))
        .before(before);

    LayerBundle {
        source_id: SourceId::new(RESTRICTED_AREA_LAYER),
        source: SourceSpec::vector(tiles_url),
        layers: vec![highlight, area],
    }
}

/// Comparison baseline drawn beneath the GPS points.
pub fn baseline_segment_layers(geometry: Value) -> LayerBundle {
    let line = LayerSpec::new(BASELINE_SEGMENT_LAYER, LayerType::Line, BASELINE_SEGMENT_LAYER)
        .paint(json!({"line-width": 9, "line-color": "#e0218a"}))
        .before(Some(EngineLayerId::new(GPS_POINT_LAYER)));

    LayerBundle {
        source_id: SourceId::new(BASELINE_SEGMENT_LAYER),
        source: SourceSpec::Geojson { data: geometry },
        layers: vec![line],
    }
}

/// Legend layer id for an engine layer id, stripping a highlight suffix.
pub fn legend_layer_for(engine_layer: &EngineLayerId) -> LayerId {
    let raw = engine_layer.as_str();
    LayerId::new(raw.strip_suffix(HIGHLIGHT_SUFFIX).unwrap_or(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn station_layers_start_with_empty_markers() {
        let bundle = groundwater_station_layers("http://t/{z}/{x}/{y}");
        let ids: Vec<&str> = bundle.layers.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![STATION_LAYER, STATION_HIGHLIGHT_LAYER, STATION_SELECTED_LAYER]
        );
        assert_eq!(bundle.layers[0].filter, None);
        assert_eq!(
            bundle.layers[1].to_json()["filter"],
            json!(["==", "id", ""])
        );
        assert_eq!(bundle.layers[1].paint["circle-radius"], json!(7));
        assert_eq!(bundle.layers[2].paint["circle-radius"], json!(12));
    }

    #[test]
    fn layer_json_uses_renderer_keys() {
        let bundle = spray_layers("u", Some(EngineLayerId::new("admin-1")));
        let v = bundle.layers[0].to_json();
        assert_eq!(v["type"], json!("fill"));
        assert_eq!(v["source-layer"], json!("Spray"));
        assert_eq!(v["layout"]["visibility"], json!("none"));
        assert!(v.get("before").is_none());
        assert!(v.get("filter").is_none());
        assert_eq!(bundle.layers[0].initial_visibility(), Visibility::None);
    }

    #[test]
    fn source_json() {
        let gps = gps_point_layers("g", None);
        assert_eq!(
            gps.source.to_json(),
            json!({"type": "vector", "tiles": ["g"], "generateId": true})
        );
        let stations = groundwater_station_layers("s");
        assert_eq!(
            stations.source.to_json(),
            json!({"type": "vector", "tiles": ["s"], "promoteId": "id", "scheme": "xyz"})
        );
        let baseline = baseline_segment_layers(json!({"type": "LineString", "coordinates": []}));
        assert_eq!(baseline.source.to_json()["type"], json!("geojson"));
        assert_eq!(
            baseline.layers[0].before.as_ref().map(|b| b.as_str()),
            Some(GPS_POINT_LAYER)
        );
    }

    #[test]
    fn anchor_is_first_admin_layer() {
        let style = [
            EngineLayerId::new("land"),
            EngineLayerId::new("admin-0-boundary"),
            EngineLayerId::new("admin-1-boundary"),
        ];
        assert_eq!(
            find_anchor_layer(style.iter()).map(|l| l.as_str().to_string()),
            Some("admin-0-boundary".to_string())
        );
        assert_eq!(find_anchor_layer(style[..1].iter()), None);
    }

    #[test]
    fn highlight_naming() {
        assert_eq!(highlight_id("Spray").as_str(), "SprayHighlight");
        assert_eq!(feature_id_key("RestrictedArea"), "RestrictedAreaId");
        assert_eq!(
            clear_highlight("Spray").to_json(),
            json!(["in", "SprayId", ""])
        );
        assert_eq!(
            legend_layer_for(&EngineLayerId::new("GPSPointHighlight")).as_str(),
            "GPSPoint"
        );
    }
}
