use foundation::{GroupId, LayerId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegendError {
    UnknownGroup(GroupId),
    UnknownLayer { group: GroupId, layer: LayerId },
    DuplicateGroup(GroupId),
    DuplicateLayer { group: GroupId, layer: LayerId },
    /// `mapLayers` was given but lists no engine layer.
    EmptyMapLayers(LayerId),
    Config(String),
}

impl std::fmt::Display for LegendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LegendError::UnknownGroup(g) => write!(f, "invalid reference: no legend group {g:?}"),
            LegendError::UnknownLayer { group, layer } => {
                write!(f, "invalid reference: no layer {layer:?} in legend group {group:?}")
            }
            LegendError::DuplicateGroup(g) => write!(f, "duplicate legend group {g:?}"),
            LegendError::DuplicateLayer { group, layer } => {
                write!(f, "duplicate layer {layer:?} in legend group {group:?}")
            }
            LegendError::EmptyMapLayers(l) => write!(f, "layer {l:?} has an empty mapLayers list"),
            LegendError::Config(msg) => write!(f, "legend config error: {msg}"),
        }
    }
}

impl std::error::Error for LegendError {}
