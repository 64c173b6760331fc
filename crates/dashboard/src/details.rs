//! Detail panel of the selected station.

use std::fmt;
use std::sync::Arc;

use foundation::FeatureId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use style::TipgTiles;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailsError {
    /// Transport failure (DNS, connection reset, timeout).
    Network(String),
    Status(u16),
    Decode(String),
}

impl DetailsError {
    /// Whether offering a retry makes sense.
    pub fn is_retryable(&self) -> bool {
        match self {
            DetailsError::Network(_) => true,
            DetailsError::Status(code) => *code == 408 || *code == 429 || *code >= 500,
            DetailsError::Decode(_) => false,
        }
    }
}

impl fmt::Display for DetailsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetailsError::Network(msg) => write!(f, "network error: {msg}"),
            DetailsError::Status(code) => write!(f, "details request failed with HTTP {code}"),
            DetailsError::Decode(msg) => write!(f, "malformed station details: {msg}"),
        }
    }
}

impl std::error::Error for DetailsError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyLevel {
    #[serde(default)]
    pub year_month: Option<String>,
    #[serde(default)]
    pub ground_water_level_m_above_sealevel_avg: Option<f64>,
}

/// Station record served by the details collection.
///
/// The series attributes are kept as raw JSON for charting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationDetails {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mean_groundwater_level_m: Option<f64>,
    #[serde(default)]
    pub mean_annual_amplitude_m: Option<f64>,
    #[serde(default)]
    pub precipitation_refperiod_annual_mean_mm: Option<f64>,
    #[serde(default)]
    pub monthly_groundwater_level_attributes: Vec<MonthlyLevel>,
    #[serde(default)]
    pub weekly_groundwater_percentiles_attributes: Value,
    #[serde(default)]
    pub monthly_groundwater_prediction_attributes: Value,
    #[serde(default)]
    pub monthly_conductivity_chloride_attributes: Value,
    #[serde(default)]
    pub monthly_weather_attributes: Value,
}

impl StationDetails {
    /// Decodes either a bare record or a GeoJSON feature whose `properties` hold it.
    /// A feature-level `id` fills in a missing record id.
    pub fn from_item_json(body: &str) -> Result<Self, DetailsError> {
        let value: Value =
            serde_json::from_str(body).map_err(|e| DetailsError::Decode(e.to_string()))?;
        let record = match value.get("properties").and_then(Value::as_object) {
            Some(props) => {
                let mut props: Map<String, Value> = props.clone();
                if !props.contains_key("id") {
                    if let Some(id) = value.get("id") {
                        let id = match id {
                            Value::String(s) => Value::String(s.clone()),
                            other => Value::String(other.to_string()),
                        };
                        props.insert("id".to_string(), id);
                    }
                }
                Value::Object(props)
            }
            None => value,
        };
        serde_json::from_value(record).map_err(|e| DetailsError::Decode(e.to_string()))
    }

    /// Most recent monthly mean level.
    pub fn latest_level(&self) -> Option<f64> {
        self.monthly_groundwater_level_attributes
            .last()
            .and_then(|m| m.ground_water_level_m_above_sealevel_avg)
    }

    pub fn kpis(&self) -> [Kpi; 3] {
        [
            Kpi {
                title: "Mittlerer Grundwasserstand (m)",
                value: self.mean_groundwater_level_m,
            },
            Kpi {
                title: "Grundwasserstand (m unter GOK)",
                value: self.latest_level(),
            },
            Kpi {
                title: "Mittlere Jahresamplitude (m)",
                value: self.mean_annual_amplitude_m,
            },
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Kpi {
    pub title: &'static str,
    pub value: Option<f64>,
}

impl Kpi {
    /// Value with two decimals, `-` when unknown.
    pub fn formatted(&self) -> String {
        match self.value {
            Some(v) => format!("{v:.2}"),
            None => "-".to_string(),
        }
    }
}

/// A fetch the shell must perform and report back through [`DetailPanel::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailsRequest {
    pub seq: u64,
    pub station: FeatureId,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PanelState {
    /// No station selected.
    Closed,
    Loading {
        station: FeatureId,
    },
    Loaded {
        station: FeatureId,
        details: Arc<StationDetails>,
    },
    Failed {
        station: FeatureId,
        error: DetailsError,
        retryable: bool,
    },
}

/// `Closed -> Loading -> Loaded | Failed`, driven by the station selection.
///
/// Each request carries a sequence number; a response for anything but the latest request
/// is stale and dropped, so a slow answer for a previous station never overwrites the
/// current one.
#[derive(Debug)]
pub struct DetailPanel {
    base_url: String,
    collection: String,
    state: PanelState,
    latest: u64,
}

impl DetailPanel {
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            collection: collection.into(),
            state: PanelState::Closed,
            latest: 0,
        }
    }

    pub fn state(&self) -> &PanelState {
        &self.state
    }

    pub fn station(&self) -> Option<&FeatureId> {
        match &self.state {
            PanelState::Closed => None,
            PanelState::Loading { station }
            | PanelState::Loaded { station, .. }
            | PanelState::Failed { station, .. } => Some(station),
        }
    }

    /// Follows a selection change; returns the fetch to start, if any.
    pub fn show(&mut self, station: Option<FeatureId>) -> Option<DetailsRequest> {
        match station {
            None => {
                self.latest += 1;
                self.state = PanelState::Closed;
                None
            }
            Some(id) => Some(self.start(id)),
        }
    }

    /// Re-requests a failed station. Only failures flagged retryable can be retried.
    pub fn retry(&mut self) -> Option<DetailsRequest> {
        match &self.state {
            PanelState::Failed {
                station,
                retryable: true,
                ..
            } => {
                let station = station.clone();
                Some(self.start(station))
            }
            _ => None,
        }
    }

    /// Applies a fetch result. Returns false for stale results, which are ignored.
    pub fn resolve(&mut self, seq: u64, result: Result<StationDetails, DetailsError>) -> bool {
        if seq != self.latest {
            debug!(seq, latest = self.latest, "stale station details dropped");
            return false;
        }
        let PanelState::Loading { station } = &self.state else {
            return false;
        };
        let station = station.clone();
        self.state = match result {
            Ok(details) => PanelState::Loaded {
                station,
                details: Arc::new(details),
            },
            Err(error) => {
                warn!(%station, %error, "station details unavailable");
                let retryable = error.is_retryable();
                PanelState::Failed {
                    station,
                    error,
                    retryable,
                }
            }
        };
        true
    }

    /// Text shown in place of the panel body when there is nothing to chart.
    pub fn message(&self) -> Option<String> {
        match &self.state {
            PanelState::Closed => {
                Some("Wählen Sie einen Punkt auf der Karte, um Visualisierungen zu sehen.".to_string())
            }
            PanelState::Loading { .. } => Some(
                "Bitte warten Sie. Die Daten für diese Messstation werden gerade abgerufen..."
                    .to_string(),
            ),
            PanelState::Loaded { .. } => None,
            PanelState::Failed {
                error, retryable, ..
            } => Some(if *retryable {
                format!("Daten konnten nicht geladen werden ({error}). Bitte erneut versuchen.")
            } else {
                format!("Daten konnten nicht geladen werden ({error}).")
            }),
        }
    }

    fn start(&mut self, station: FeatureId) -> DetailsRequest {
        self.latest += 1;
        let url = TipgTiles::item_url(&self.base_url, &self.collection, &station.to_string());
        self.state = PanelState::Loading {
            station: station.clone(),
        };
        DetailsRequest {
            seq: self.latest,
            station,
            url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DetailPanel, DetailsError, PanelState, StationDetails};
    use foundation::FeatureId;

    const BODY: &str = r#"{
        "type": "Feature",
        "id": "st-1",
        "geometry": null,
        "properties": {
            "name": "Brunnen 1",
            "mean_groundwater_level_m": 34.5678,
            "mean_annual_amplitude_m": 0.4,
            "monthly_groundwater_level_attributes": [
                {"year_month": "2017-02", "ground_water_level_m_above_sealevel_avg": 33.1},
                {"year_month": "2017-03", "ground_water_level_m_above_sealevel_avg": 33.456}
            ]
        }
    }"#;

    fn panel() -> DetailPanel {
        DetailPanel::new("http://tipg/", "public.station_details")
    }

    #[test]
    fn decodes_feature_and_formats_kpis() {
        let details = StationDetails::from_item_json(BODY).unwrap();
        assert_eq!(details.id, "st-1");
        let kpis: Vec<String> = details.kpis().iter().map(|k| k.formatted()).collect();
        assert_eq!(kpis, vec!["34.57", "33.46", "0.40"]);
    }

    #[test]
    fn malformed_body_is_not_retryable() {
        let err = StationDetails::from_item_json("{").unwrap_err();
        assert!(matches!(err, DetailsError::Decode(_)));
        assert!(!err.is_retryable());
        assert!(DetailsError::Status(503).is_retryable());
        assert!(!DetailsError::Status(404).is_retryable());
    }

    #[test]
    fn loading_then_loaded() {
        let mut p = panel();
        let req = p.show(Some(FeatureId::from("st-1"))).unwrap();
        assert_eq!(req.url, "http://tipg/collections/public.station_details/items/st-1");
        assert!(matches!(p.state(), PanelState::Loading { .. }));
        assert!(p.resolve(req.seq, StationDetails::from_item_json(BODY)));
        assert!(matches!(p.state(), PanelState::Loaded { .. }));
        assert_eq!(p.message(), None);
    }

    #[test]
    fn stale_response_is_dropped() {
        let mut p = panel();
        let first = p.show(Some(FeatureId::from("a"))).unwrap();
        let second = p.show(Some(FeatureId::from("b"))).unwrap();
        assert!(!p.resolve(first.seq, StationDetails::from_item_json(BODY)));
        assert_eq!(p.station(), Some(&FeatureId::from("b")));
        assert!(matches!(p.state(), PanelState::Loading { .. }));
        assert!(p.resolve(second.seq, Err(DetailsError::Network("reset".into()))));
    }

    #[test]
    fn retry_after_retryable_failure() {
        let mut p = panel();
        let req = p.show(Some(FeatureId::from("a"))).unwrap();
        p.resolve(req.seq, Err(DetailsError::Status(502)));
        assert!(matches!(
            p.state(),
            PanelState::Failed {
                retryable: true,
                ..
            }
        ));
        assert!(p.message().unwrap().contains("erneut"));
        let again = p.retry().unwrap();
        assert!(again.seq > req.seq);
        assert!(matches!(p.state(), PanelState::Loading { .. }));
        assert!(p.retry().is_none());
    }

    #[test]
    fn closing_discards_in_flight_request() {
        let mut p = panel();
        let req = p.show(Some(FeatureId::from("a"))).unwrap();
        assert_eq!(p.show(None), None);
        assert!(!p.resolve(req.seq, Err(DetailsError::Status(500))));
        assert_eq!(p.state(), &PanelState::Closed);
    }
}
