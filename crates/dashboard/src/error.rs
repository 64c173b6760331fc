use std::fmt;

use engine::EngineError;
use legend::LegendError;
use runtime::ReplayError;

use crate::config::ConfigError;

/// Errors surfaced by the dashboard controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DashboardError {
    Engine(EngineError),
    Legend(LegendError),
    Config(ConfigError),
    Replay(ReplayError),
    /// The controller was torn down.
    TornDown,
}

impl fmt::Display for DashboardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DashboardError::Engine(e) => write!(f, "{e}"),
            DashboardError::Legend(e) => write!(f, "{e}"),
            DashboardError::Config(e) => write!(f, "{e}"),
            DashboardError::Replay(e) => write!(f, "{e}"),
            DashboardError::TornDown => write!(f, "dashboard was torn down"),
        }
    }
}

impl std::error::Error for DashboardError {}

impl From<EngineError> for DashboardError {
    fn from(e: EngineError) -> Self {
        DashboardError::Engine(e)
    }
}

impl From<LegendError> for DashboardError {
    fn from(e: LegendError) -> Self {
        DashboardError::Legend(e)
    }
}

impl From<ConfigError> for DashboardError {
    fn from(e: ConfigError) -> Self {
        DashboardError::Config(e)
    }
}

impl From<ReplayError> for DashboardError {
    fn from(e: ReplayError) -> Self {
        DashboardError::Replay(e)
    }
}
