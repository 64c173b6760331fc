use foundation::{EngineLayerId, LngLat, LngLatBounds, ScreenPoint, SourceId};
use serde::Serialize;
use serde_json::{Map, Value};
use style::{Expression, LayerBundle, LayerSpec, SourceSpec, Visibility};
use tracing::debug;

use crate::error::EngineError;
use crate::feature::RenderedFeature;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum EventKind {
    StyleLoad,
    Click,
    MouseEnter,
    MouseLeave,
}

impl EventKind {
    /// Event name understood by the renderer's `on`/`off`.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::StyleLoad => "style.load",
            EventKind::Click => "click",
            EventKind::MouseEnter => "mouseenter",
            EventKind::MouseLeave => "mouseleave",
        }
    }
}

/// An event subscription, optionally scoped to one layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subscription {
    pub kind: EventKind,
    pub layer: Option<EngineLayerId>,
}

impl Subscription {
    pub fn global(kind: EventKind) -> Self {
        Self { kind, layer: None }
    }

    pub fn layer(kind: EventKind, layer: impl Into<EngineLayerId>) -> Self {
        Self {
            kind,
            layer: Some(layer.into()),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ListenerId(pub u64);

/// Events delivered by the engine, already decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    StyleLoaded,
    Click {
        point: ScreenPoint,
        lng_lat: LngLat,
    },
    MouseEnter {
        layer: EngineLayerId,
        features: Vec<RenderedFeature>,
    },
    MouseLeave {
        layer: EngineLayerId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CameraMove {
    FlyTo { center: LngLat, zoom: Option<f64> },
    FitBounds { bounds: LngLatBounds, padding: f64 },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize)]
pub enum Cursor {
    #[default]
    Default,
    Pointer,
}

impl Cursor {
    /// CSS cursor value; the default cursor is an empty string.
    pub fn as_css(&self) -> &'static str {
        match self {
            Cursor::Default => "",
            Cursor::Pointer => "pointer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Popup {
    pub at: LngLat,
    pub layer: EngineLayerId,
    pub properties: Map<String, Value>,
}

/// The live map rendering engine.
///
/// One instance is exclusively owned by the dashboard controller; all layer, source and
/// filter mutation goes through it. After [`MapEngine::remove`] every mutating call fails
/// with [`EngineError::Removed`].
pub trait MapEngine {
    fn is_style_loaded(&self) -> bool;

    /// Layer ids in render order, bottom first.
    fn layer_ids(&self) -> Vec<EngineLayerId>;
    fn has_layer(&self, id: &EngineLayerId) -> bool;
    fn has_source(&self, id: &SourceId) -> bool;

    fn add_source(&mut self, id: &SourceId, source: &SourceSpec) -> Result<(), EngineError>;
    fn remove_source(&mut self, id: &SourceId) -> Result<(), EngineError>;
    /// Adds `layer` beneath `layer.before` when given and present, else on top.
    fn add_layer(&mut self, layer: &LayerSpec) -> Result<(), EngineError>;
    fn remove_layer(&mut self, id: &EngineLayerId) -> Result<(), EngineError>;

    fn visibility(&self, id: &EngineLayerId) -> Option<Visibility>;
    fn set_visibility(
        &mut self,
        id: &EngineLayerId,
        visibility: Visibility,
    ) -> Result<(), EngineError>;
    fn set_filter(&mut self, id: &EngineLayerId, filter: &Expression) -> Result<(), EngineError>;

    /// Features at `point` on `layers`, topmost first.
    fn query_rendered_features(
        &self,
        point: ScreenPoint,
        layers: &[EngineLayerId],
    ) -> Vec<RenderedFeature>;

    fn move_camera(&mut self, camera: CameraMove);
    fn set_cursor(&mut self, cursor: Cursor);
    fn show_popup(&mut self, popup: Popup);
    fn close_popups(&mut self);

    fn subscribe(&mut self, subscription: Subscription) -> ListenerId;
    /// Returns false when the listener was already removed.
    fn unsubscribe(&mut self, id: ListenerId) -> bool;

    /// Destroys the engine instance and everything attached to it.
    fn remove(&mut self);
    fn is_removed(&self) -> bool;
}

/// Adds a source and its layers. An already present source is reused.
pub fn add_bundle<E: MapEngine + ?Sized>(
    engine: &mut E,
    bundle: &LayerBundle,
) -> Result<(), EngineError> {
    if !engine.has_source(&bundle.source_id) {
        engine.add_source(&bundle.source_id, &bundle.source)?;
    }
    for layer in &bundle.layers {
        engine.add_layer(layer)?;
    }
    debug!(source = %bundle.source_id, layers = bundle.layers.len(), "bundle added");
    Ok(())
}

/// Removes a bundle's layers (topmost first) and then its source. Missing parts are skipped.
pub fn remove_bundle<E: MapEngine + ?Sized>(
    engine: &mut E,
    bundle: &LayerBundle,
) -> Result<(), EngineError> {
    for layer in bundle.layers.iter().rev() {
        if engine.has_layer(&layer.id) {
            engine.remove_layer(&layer.id)?;
        }
    }
    if engine.has_source(&bundle.source_id) {
        engine.remove_source(&bundle.source_id)?;
    }
    Ok(())
}

/// Listeners registered by one owner, released together on teardown.
#[derive(Debug, Default)]
pub struct ListenerSet {
    ids: Vec<ListenerId>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        subscription: Subscription,
    ) -> ListenerId {
        let id = engine.subscribe(subscription);
        self.ids.push(id);
        id
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Unsubscribes every listener; returns how many were still live.
    pub fn release_all<E: MapEngine + ?Sized>(&mut self, engine: &mut E) -> usize {
        self.ids
            .drain(..)
            .filter(|id| engine.unsubscribe(*id))
            .count()
    }
}
