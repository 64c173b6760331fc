use foundation::{EngineLayerId, FeatureId, LngLat, LngLatBounds};
use serde_json::{Map, Value};

/// A feature returned by a rendered-feature query or attached to a pointer event.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFeature {
    pub layer: EngineLayerId,
    /// Engine-level id (`promoteId` / `generateId`), if any.
    pub id: Option<FeatureId>,
    pub properties: Map<String, Value>,
    /// Position for point geometries.
    pub anchor: Option<LngLat>,
    /// Extent of the geometry; a point collapses to a zero-size box.
    pub bounds: Option<LngLatBounds>,
}

impl RenderedFeature {
    pub fn new(layer: impl Into<EngineLayerId>, properties: Map<String, Value>) -> Self {
        Self {
            layer: layer.into(),
            id: None,
            properties,
            anchor: None,
            bounds: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<FeatureId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn at(mut self, position: LngLat) -> Self {
        self.anchor = Some(position);
        self.bounds = Some(LngLatBounds::new(position, position));
        self
    }

    pub fn with_bounds(mut self, bounds: LngLatBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Builds a feature from the renderer's GeoJSON-like query result:
    /// `{"id": .., "layer": {"id": ..}, "properties": {..}, "geometry": {..}}`.
    ///
    /// Returns `None` when the layer id is missing.
    pub fn from_geojson(value: &Value) -> Option<Self> {
        let layer = value.get("layer")?.get("id")?.as_str()?;
        let properties = value
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let mut feature = RenderedFeature::new(layer, properties);
        feature.id = value.get("id").and_then(FeatureId::from_json);

        if let Some(geometry) = value.get("geometry") {
            let coords = geometry.get("coordinates").unwrap_or(&Value::Null);
            if geometry.get("type").and_then(Value::as_str) == Some("Point") {
                feature.anchor = position(coords);
            }
            let mut points = Vec::new();
            collect_positions(coords, &mut points);
            feature.bounds = LngLatBounds::from_points(points);
        }
        Some(feature)
    }

    /// Property value as a feature id (`"id"`, `"shift_id"`, ...).
    pub fn property_id(&self, key: &str) -> Option<FeatureId> {
        self.properties.get(key).and_then(FeatureId::from_json)
    }

    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn property_i64(&self, key: &str) -> Option<i64> {
        match self.properties.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

fn position(v: &Value) -> Option<LngLat> {
    let arr = v.as_array()?;
    match (arr.first()?.as_f64(), arr.get(1)?.as_f64()) {
        (Some(lng), Some(lat)) => Some(LngLat::new(lng, lat)),
        _ => None,
    }
}

// Walks nested coordinate arrays of any geometry type.
fn collect_positions(v: &Value, out: &mut Vec<LngLat>) {
    if let Some(p) = position(v) {
        out.push(p);
        return;
    }
    if let Some(arr) = v.as_array() {
        for child in arr {
            collect_positions(child, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RenderedFeature;
    use foundation::{FeatureId, LngLat};
    use serde_json::json;

    #[test]
    fn parses_point_feature() {
        let f = RenderedFeature::from_geojson(&json!({
            "id": 17,
            "layer": {"id": "GPSPoint"},
            "properties": {"gps_id": "g-1", "track_number": "3"},
            "geometry": {"type": "Point", "coordinates": [12.5, 52.25]}
        }))
        .unwrap();
        assert_eq!(f.layer.as_str(), "GPSPoint");
        assert_eq!(f.id, Some(FeatureId::from(17_i64)));
        assert_eq!(f.anchor, Some(LngLat::new(12.5, 52.25)));
        assert_eq!(f.property_id("gps_id"), Some(FeatureId::from("g-1")));
        assert_eq!(f.property_i64("track_number"), Some(3));
    }

    #[test]
    fn line_bounds_cover_all_vertices() {
        let f = RenderedFeature::from_geojson(&json!({
            "layer": {"id": "Shift"},
            "properties": {},
            "geometry": {"type": "MultiLineString", "coordinates": [
                [[12.0, 52.0], [12.5, 52.4]],
                [[11.8, 52.1], [12.2, 52.9]]
            ]}
        }))
        .unwrap();
        let b = f.bounds.unwrap();
        assert_eq!(b.sw, LngLat::new(11.8, 52.0));
        assert_eq!(b.ne, LngLat::new(12.5, 52.9));
        assert_eq!(f.anchor, None);
    }

    #[test]
    fn missing_layer_is_rejected() {
        assert!(RenderedFeature::from_geojson(&json!({"properties": {}})).is_none());
    }
}
