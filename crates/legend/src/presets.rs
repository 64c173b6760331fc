//! Legend configurations shipped with the dashboard.

use crate::error::LegendError;
use crate::state::LegendState;

const GROUNDWATER_JSON: &str = include_str!("../assets/groundwater.json");
const SHIFTS_JSON: &str = include_str!("../assets/shifts.json");

/// Names accepted by [`by_name`].
pub const PRESET_NAMES: &[&str] = &["groundwater", "shifts"];

/// Groundwater monitoring legend (stations, depth to water, protection zones, salinity).
pub fn groundwater() -> Result<LegendState, LegendError> {
    LegendState::from_json(GROUNDWATER_JSON)
}

/// Agricultural shift tracking legend (tracks, GPS points, spray/weed maps, restricted areas).
pub fn shifts() -> Result<LegendState, LegendError> {
    LegendState::from_json(SHIFTS_JSON)
}

pub fn by_name(name: &str) -> Result<LegendState, LegendError> {
    match name {
        "groundwater" => groundwater(),
        "shifts" => shifts(),
        other => Err(LegendError::Config(format!(
            "unknown legend preset {other:?} (expected one of {PRESET_NAMES:?})"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{by_name, groundwater, shifts};
    use foundation::{EngineLayerId, GroupId, LayerId};

    #[test]
    fn groundwater_preset_matches_expected_layout() {
        let s = groundwater().unwrap();
        let groups: Vec<&str> = s.groups().iter().map(|g| g.id.as_str()).collect();
        assert_eq!(groups, vec!["Aktuell", "Andere"]);

        let stations = s
            .layer(&GroupId::new("Aktuell"), &LayerId::new("gws-latest"))
            .unwrap();
        assert_eq!(stations.symbology.len(), 9);
        assert_eq!(
            stations.engine_layers(),
            vec![
                EngineLayerId::new("measuring_stations_tipg"),
                EngineLayerId::new("measuring_stations_tipg_highlight"),
                EngineLayerId::new("measuring_stations_tipg_selected"),
            ]
        );

        let depth = s
            .layer(&GroupId::new("Andere"), &LayerId::new("gw-flurabstand"))
            .unwrap();
        assert_eq!(depth.engine_layers(), vec![EngineLayerId::new("gw-flurabstand")]);
        assert_eq!(depth.symbology.len(), 13);
    }

    #[test]
    fn shifts_preset_hides_treatment_layers() {
        let s = shifts().unwrap();
        let hidden: Vec<&str> = s
            .layers()
            .filter(|(_, l)| !l.visible)
            .map(|(_, l)| l.id.as_str())
            .collect();
        assert_eq!(hidden, vec!["Spray", "Weed", "RestrictedArea"]);
    }

    #[test]
    fn unknown_preset_is_a_config_error() {
        assert!(by_name("groundwater").is_ok());
        assert!(by_name("bathymetry").is_err());
    }
}
