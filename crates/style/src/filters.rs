use std::fmt;
use std::str::FromStr;

use foundation::{EngineLayerId, FeatureId};
use serde::{Deserialize, Serialize};

use crate::expr::Expression;
use crate::layers::{GPS_POINT_LAYER, SHIFT_LAYER, SPRAY_LAYER, WEED_LAYER};

/// Vehicle direction selector.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
    #[default]
    #[serde(rename = "Forward, Backward")]
    Both,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectionParseError(pub String);

impl fmt::Display for DirectionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown direction {:?} (expected Forward, Backward or \"Forward, Backward\")",
            self.0
        )
    }
}

impl std::error::Error for DirectionParseError {}

impl Direction {
    /// Encoded value of the direction property on GPS features, `None` for [`Direction::Both`].
    pub fn feature_value(&self) -> Option<&'static str> {
        match self {
            Direction::Forward => Some("DIRECTION_FORWARD"),
            Direction::Backward => Some("DIRECTION_BACKWARD"),
            Direction::Both => None,
        }
    }

    /// Decodes a feature's direction property (`DIRECTION_FORWARD` → `Forward`).
    ///
    /// Only the part after the first `_` is considered, case-insensitively.
    pub fn from_feature_value(raw: &str) -> Option<Direction> {
        let tail = raw.split_once('_').map_or(raw, |(_, t)| t);
        match tail.to_ascii_lowercase().as_str() {
            "forward" => Some(Direction::Forward),
            "backward" => Some(Direction::Backward),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Forward => "Forward",
            Direction::Backward => "Backward",
            Direction::Both => "Forward, Backward",
        })
    }
}

impl FromStr for Direction {
    type Err = DirectionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Forward" | "forward" => Ok(Direction::Forward),
            "Backward" | "backward" => Ok(Direction::Backward),
            "Forward, Backward" | "both" | "Both" => Ok(Direction::Both),
            other => Err(DirectionParseError(other.to_string())),
        }
    }
}

/// Feature property names the filters are built on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterKeys {
    pub entity: String,
    pub direction: String,
    pub track: String,
}

impl Default for FilterKeys {
    fn default() -> Self {
        Self {
            entity: "shift_id".to_string(),
            direction: "vehicle_direction".to_string(),
            track: "track_number".to_string(),
        }
    }
}

/// Inputs of the filter derivation. Never stored: rebuilt whenever an input changes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterCriteria {
    /// Every entity currently loadable (e.g. shifts matching the sidebar filters).
    pub loadable: Vec<FeatureId>,
    pub direction: Direction,
    pub selected: Option<FeatureId>,
    pub track_number: Option<i64>,
}

/// Filters for the two layer categories derived from one [`FilterCriteria`].
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedFilters {
    /// For aggregate overlays; never restricted by direction or track.
    pub direction_naive: Expression,
    /// For per-position layers that carry direction and track properties.
    pub direction_sensitive: Expression,
}

/// Derives both filters from `criteria`.
///
/// Precedence:
/// 1. a selected entity restricts the base predicate to that entity alone,
/// 2. otherwise the base predicate is the loadable set,
/// 3. a restricted direction is conjoined to the direction-sensitive filter,
/// 4. a track number is conjoined to the direction-sensitive filter.
pub fn derive_filters(criteria: &FilterCriteria, keys: &FilterKeys) -> DerivedFilters {
    let base = match &criteria.selected {
        Some(id) => Expression::eq(keys.entity.as_str(), id.to_json()),
        None => Expression::in_list(
            keys.entity.as_str(),
            criteria.loadable.iter().map(FeatureId::to_json),
        ),
    };

    let mut sensitive = vec![base.clone()];
    if let Some(dir) = criteria.direction.feature_value() {
        sensitive.push(Expression::eq(keys.direction.as_str(), dir));
    }
    if let Some(track) = criteria.track_number {
        sensitive.push(Expression::eq(keys.track.as_str(), track));
    }

    DerivedFilters {
        direction_naive: base,
        direction_sensitive: Expression::all(sensitive),
    }
}

/// Engine layers that receive [`DerivedFilters::direction_naive`].
pub fn direction_naive_layers() -> [EngineLayerId; 3] {
    [
        EngineLayerId::new(SHIFT_LAYER),
        EngineLayerId::new(SPRAY_LAYER),
        EngineLayerId::new(WEED_LAYER),
    ]
}

/// Engine layers that receive [`DerivedFilters::direction_sensitive`].
pub fn direction_sensitive_layers() -> [EngineLayerId; 1] {
    [EngineLayerId::new(GPS_POINT_LAYER)]
}
