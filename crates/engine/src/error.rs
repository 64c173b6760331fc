use std::fmt;

use foundation::{EngineLayerId, SourceId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    LayerNotFound(EngineLayerId),
    SourceNotFound(SourceId),
    DuplicateLayer(EngineLayerId),
    DuplicateSource(SourceId),
    /// Source still referenced by a layer.
    SourceInUse { source: SourceId, layer: EngineLayerId },
    StyleNotLoaded,
    /// The engine instance was destroyed.
    Removed,
    /// Error raised by the underlying renderer.
    Backend(String),
}

impl EngineError {
    /// Races with style loading are expected and retried after the style-load event.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::StyleNotLoaded | EngineError::LayerNotFound(_))
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::LayerNotFound(id) => write!(f, "layer {id} not found"),
            EngineError::SourceNotFound(id) => write!(f, "source {id} not found"),
            EngineError::DuplicateLayer(id) => write!(f, "layer {id} already exists"),
            EngineError::DuplicateSource(id) => write!(f, "source {id} already exists"),
            EngineError::SourceInUse { source, layer } => {
                write!(f, "source {source} is still used by layer {layer}")
            }
            EngineError::StyleNotLoaded => write!(f, "style is not loaded yet"),
            EngineError::Removed => write!(f, "map engine was removed"),
            EngineError::Backend(msg) => write!(f, "map engine error: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
