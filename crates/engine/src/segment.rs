use foundation::{EngineLayerId, FeatureId, LngLat, ScreenPoint};
use style::{Direction, GPS_POINT_LAYER};
use tracing::debug;

use crate::map::MapEngine;

/// An endpoint picked on a GPS point while comparing segments.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentPick {
    pub gps_id: FeatureId,
    pub position: Option<LngLat>,
    /// Direction of travel at the point, when the point carries one.
    pub direction: Option<Direction>,
    pub track_number: Option<i64>,
}

/// Collects the two endpoints of a comparison segment from GPS point clicks.
#[derive(Debug, Default)]
pub struct SegmentPicker {
    picks: Vec<SegmentPick>,
}

impl SegmentPicker {
    pub const ENDPOINTS: usize = 2;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn picks(&self) -> &[SegmentPick] {
        &self.picks
    }

    pub fn is_complete(&self) -> bool {
        self.picks.len() >= Self::ENDPOINTS
    }

    /// Records the topmost GPS point under `point`. Ignored once both endpoints exist.
    pub fn pick<E: MapEngine + ?Sized>(
        &mut self,
        engine: &E,
        point: ScreenPoint,
    ) -> Option<&SegmentPick> {
        if self.is_complete() {
            return None;
        }
        let layer = EngineLayerId::new(GPS_POINT_LAYER);
        let feature = engine
            .query_rendered_features(point, std::slice::from_ref(&layer))
            .into_iter()
            .next()?;
        let Some(gps_id) = feature.property_id("gps_id") else {
            debug!("gps point without gps_id ignored");
            return None;
        };
        self.picks.push(SegmentPick {
            gps_id,
            position: feature.anchor,
            direction: feature
                .property_str("vehicle_direction")
                .and_then(Direction::from_feature_value),
            track_number: feature.property_i64("track_number"),
        });
        self.picks.last()
    }

    /// Drops all endpoints, e.g. when compare mode is left.
    pub fn reset(&mut self) {
        self.picks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::SegmentPicker;
    use crate::feature::RenderedFeature;
    use crate::headless::HeadlessEngine;
    use crate::map::add_bundle;
    use foundation::{FeatureId, LngLat, ScreenPoint};
    use serde_json::json;
    use style::{Direction, gps_point_layers};

    fn gps(id: &str, direction: &str, track: i64) -> RenderedFeature {
        let props = json!({"gps_id": id, "vehicle_direction": direction, "track_number": track});
        RenderedFeature::new("GPSPoint", props.as_object().cloned().unwrap()).at(LngLat::new(9.0, 49.0))
    }

    #[test]
    fn picks_two_endpoints_with_direction_and_track() {
        let mut engine = HeadlessEngine::with_style(["land"]);
        add_bundle(&mut engine, &gps_point_layers("g", None)).unwrap();
        engine.place_feature("GPSPoint", ScreenPoint::new(10.0, 10.0), gps("a", "DIRECTION_FORWARD", 2));
        engine.place_feature("GPSPoint", ScreenPoint::new(90.0, 10.0), gps("b", "DIRECTION_BACKWARD", 3));

        let mut picker = SegmentPicker::new();
        let first = picker.pick(&engine, ScreenPoint::new(10.0, 10.0)).cloned().unwrap();
        assert_eq!(first.gps_id, FeatureId::from("a"));
        assert_eq!(first.direction, Some(Direction::Forward));
        assert_eq!(first.track_number, Some(2));

        assert!(picker.pick(&engine, ScreenPoint::new(50.0, 50.0)).is_none());
        picker.pick(&engine, ScreenPoint::new(90.0, 10.0)).unwrap();
        assert!(picker.is_complete());
        assert!(picker.pick(&engine, ScreenPoint::new(10.0, 10.0)).is_none());

        picker.reset();
        assert!(picker.picks().is_empty());
    }
}
