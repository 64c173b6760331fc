use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use foundation::{LngLat, YearMonth};
use runtime::{MonthRange, ReplayError};
use style::{STATION_VARIABLE, TipgTiles, VectorTileApi};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { key, value, reason } => {
                write!(f, "invalid {key}={value:?}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

const DEFAULT_REPLAY_START: YearMonth = YearMonth::from_const(2015, 1);
const DEFAULT_REPLAY_END: YearMonth = YearMonth::from_const(2017, 3);

/// Runtime settings of the dashboard.
///
/// Every field has a default; [`DashboardConfig::from_lookup`] overrides fields from
/// `KEY=value` pairs (environment variables in practice).
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    /// tipg service root, with trailing slash.
    pub tipg_url: String,
    pub api_hostname: String,
    pub api_key: String,
    pub map_style: String,
    pub map_center: LngLat,
    pub map_zoom: f64,
    pub replay_start: YearMonth,
    pub replay_end: YearMonth,
    pub replay_period: Duration,
    pub active_year: i32,
    pub details_collection: String,
    pub access_token: Option<String>,
    pub login_url: Option<String>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            tipg_url: "http://localhost:8000/".to_string(),
            api_hostname: "localhost:7071".to_string(),
            api_key: String::new(),
            map_style: "mapbox://styles/orbicaeu/clzs3lv2j00ek01nz2wu0f5oo".to_string(),
            map_center: LngLat::new(12.8105, 52.616),
            map_zoom: 7.0,
            replay_start: DEFAULT_REPLAY_START,
            replay_end: DEFAULT_REPLAY_END,
            replay_period: Duration::from_millis(2000),
            active_year: 2024,
            details_collection: "public.station_details".to_string(),
            access_token: None,
            login_url: None,
        }
    }
}

impl DashboardConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from `lookup`, falling back to defaults for absent keys.
    /// Present but malformed values are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let text = |key: &str, default: String| lookup(key).unwrap_or(default);

        let mut tipg_url = text("TIPG_URL", d.tipg_url);
        if !tipg_url.ends_with('/') {
            tipg_url.push('/');
        }

        let period_ms: u64 =
            parsed(&lookup, "REPLAY_PERIOD_MS", d.replay_period.as_millis() as u64)?;
        if period_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "REPLAY_PERIOD_MS",
                value: "0".to_string(),
                reason: "replay period must be non-zero".to_string(),
            });
        }

        Ok(Self {
            tipg_url,
            api_hostname: text("API_HOSTNAME", d.api_hostname),
            api_key: text("API_KEY", d.api_key),
            map_style: text("MAP_STYLE", d.map_style),
            map_center: LngLat::new(
                parsed(&lookup, "MAP_CENTER_LNG", d.map_center.lng)?,
                parsed(&lookup, "MAP_CENTER_LAT", d.map_center.lat)?,
            ),
            map_zoom: parsed(&lookup, "MAP_ZOOM", d.map_zoom)?,
            replay_start: parsed(&lookup, "REPLAY_START", d.replay_start)?,
            replay_end: parsed(&lookup, "REPLAY_END", d.replay_end)?,
            replay_period: Duration::from_millis(period_ms),
            active_year: parsed(&lookup, "ACTIVE_YEAR", d.active_year)?,
            details_collection: text("DETAILS_COLLECTION", d.details_collection),
            access_token: lookup("ACCESS_TOKEN").filter(|t| !t.is_empty()),
            login_url: lookup("LOGIN_URL").filter(|u| !u.is_empty()),
        })
    }

    pub fn replay_range(&self) -> Result<MonthRange, ReplayError> {
        MonthRange::new(self.replay_start, self.replay_end)
    }

    pub fn station_tiles(&self) -> TipgTiles {
        TipgTiles::groundwater(self.tipg_url.clone(), STATION_VARIABLE)
    }

    pub fn vector_tile_api(&self) -> VectorTileApi {
        VectorTileApi::new(self.api_hostname.clone(), self.api_key.clone(), self.active_year)
    }

    pub fn details_url(&self, station_id: &str) -> String {
        TipgTiles::item_url(&self.tipg_url, &self.details_collection, station_id)
    }
}

fn parsed<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, DashboardConfig};
    use foundation::YearMonth;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = DashboardConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, DashboardConfig::default());
        assert_eq!(cfg.replay_range().unwrap().month_count(), 27);
        assert_eq!(cfg.replay_period, Duration::from_secs(2));
    }

    #[test]
    fn overrides_and_trailing_slash() {
        let cfg = DashboardConfig::from_lookup(lookup(&[
            ("TIPG_URL", "https://tipg.example.org"),
            ("REPLAY_END", "2015-06"),
            ("REPLAY_PERIOD_MS", "250"),
            ("ACCESS_TOKEN", ""),
        ]))
        .unwrap();
        assert_eq!(cfg.tipg_url, "https://tipg.example.org/");
        assert_eq!(cfg.replay_end, "2015-06".parse::<YearMonth>().unwrap());
        assert_eq!(cfg.replay_period, Duration::from_millis(250));
        assert_eq!(cfg.access_token, None);
        assert_eq!(
            cfg.details_url("st-9"),
            "https://tipg.example.org/collections/public.station_details/items/st-9"
        );
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = DashboardConfig::from_lookup(lookup(&[("MAP_ZOOM", "close")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MAP_ZOOM", .. }));
        assert!(DashboardConfig::from_lookup(lookup(&[("REPLAY_START", "2015-13")])).is_err());
    }

    #[test]
    fn zero_replay_period_is_rejected() {
        let err = DashboardConfig::from_lookup(lookup(&[("REPLAY_PERIOD_MS", "0")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "REPLAY_PERIOD_MS",
                ..
            }
        ));
    }
}
