//! In-process [`MapEngine`] used by the CLI replay and by tests.
//!
//! Keeps the layer stack, sources, filters and listeners in memory, evaluates filters
//! against seeded features, and records every call so callers can assert on the exact
//! engine traffic.

use std::collections::BTreeMap;

use foundation::{EngineLayerId, ScreenPoint, SourceId};
use serde::Serialize;
use serde_json::{Map, Value, json};
use style::{Expression, LayerSpec, SourceSpec, Visibility};

use crate::error::EngineError;
use crate::feature::RenderedFeature;
use crate::map::{CameraMove, Cursor, ListenerId, MapEngine, Popup, Subscription};

/// Pixel radius within which a seeded feature counts as hit.
pub const HIT_TOLERANCE_PX: f64 = 5.0;

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EngineCall {
    AddSource(SourceId),
    RemoveSource(SourceId),
    AddLayer(EngineLayerId),
    RemoveLayer(EngineLayerId),
    SetVisibility(EngineLayerId, Visibility),
    SetFilter(EngineLayerId, Value),
    MoveCamera(CameraMove),
    SetCursor(Cursor),
    ShowPopup(Popup),
    ClosePopups,
    Subscribe(ListenerId),
    Unsubscribe(ListenerId),
    Remove,
}

#[derive(Debug, Clone)]
struct HeadlessLayer {
    id: EngineLayerId,
    /// `None` for layers that belong to the basemap style.
    spec: Option<LayerSpec>,
    visibility: Visibility,
    filter: Option<Expression>,
}

impl HeadlessLayer {
    fn basemap(id: EngineLayerId) -> Self {
        Self {
            id,
            spec: None,
            visibility: Visibility::Visible,
            filter: None,
        }
    }

    fn source(&self) -> Option<&SourceId> {
        self.spec.as_ref().map(|s| &s.source)
    }
}

/// A feature rendered at a fixed screen position.
#[derive(Debug, Clone)]
struct PlacedFeature {
    at: ScreenPoint,
    feature: RenderedFeature,
}

#[derive(Debug, Default)]
pub struct HeadlessEngine {
    style_loaded: bool,
    removed: bool,
    /// Full render stack, bottom first, basemap layers included.
    layers: Vec<HeadlessLayer>,
    sources: BTreeMap<SourceId, SourceSpec>,
    features: BTreeMap<SourceId, Vec<PlacedFeature>>,
    listeners: BTreeMap<ListenerId, Subscription>,
    next_listener: u64,
    cursor: Cursor,
    popups: Vec<Popup>,
    calls: Vec<EngineCall>,
}

impl HeadlessEngine {
    /// An engine whose style is still loading.
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine with a loaded style made of `basemap` layers.
    pub fn with_style<I, S>(basemap: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<EngineLayerId>,
    {
        let mut engine = Self::new();
        engine.layers = basemap
            .into_iter()
            .map(|id| HeadlessLayer::basemap(id.into()))
            .collect();
        engine.style_loaded = true;
        engine
    }

    /// Completes a pending style load.
    pub fn finish_style_load(&mut self) {
        self.style_loaded = true;
    }

    /// Swaps the style: every custom layer and source is dropped, as a renderer does.
    pub fn reload_style(&mut self) {
        self.layers.retain(|l| l.spec.is_none());
        self.sources.clear();
        self.style_loaded = false;
    }

    /// Seeds a feature of `source` at a screen position.
    pub fn place_feature(
        &mut self,
        source: impl Into<SourceId>,
        at: ScreenPoint,
        feature: RenderedFeature,
    ) {
        self.features
            .entry(source.into())
            .or_default()
            .push(PlacedFeature { at, feature });
    }

    pub fn calls(&self) -> &[EngineCall] {
        &self.calls
    }

    /// Returns and forgets the recorded calls.
    pub fn take_calls(&mut self) -> Vec<EngineCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn filter(&self, id: &EngineLayerId) -> Option<&Expression> {
        self.layer(id).and_then(|l| l.filter.as_ref())
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn popups(&self) -> &[Popup] {
        &self.popups
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn source_ids(&self) -> Vec<SourceId> {
        self.sources.keys().cloned().collect()
    }

    /// Style document of the custom sources and layers, in render order.
    pub fn style_json(&self) -> Value {
        let sources: Map<String, Value> = self
            .sources
            .iter()
            .map(|(id, s)| (id.to_string(), s.to_json()))
            .collect();
        let layers: Vec<Value> = self
            .layers
            .iter()
            .filter_map(|l| Some((l, l.spec.as_ref()?)))
            .map(|(l, spec)| {
                let mut v = spec.to_json();
                if let Value::Object(obj) = &mut v {
                    let layout = obj.entry("layout").or_insert_with(|| json!({}));
                    layout["visibility"] = json!(l.visibility);
                    match &l.filter {
                        Some(f) => {
                            obj.insert("filter".to_string(), f.to_json());
                        }
                        None => {
                            obj.remove("filter");
                        }
                    }
                }
                v
            })
            .collect();
        json!({ "version": 8, "sources": sources, "layers": layers })
    }

    fn layer(&self, id: &EngineLayerId) -> Option<&HeadlessLayer> {
        self.layers.iter().find(|l| &l.id == id)
    }

    fn layer_mut(&mut self, id: &EngineLayerId) -> Option<&mut HeadlessLayer> {
        self.layers.iter_mut().find(|l| &l.id == id)
    }

    fn ensure_live(&self) -> Result<(), EngineError> {
        if self.removed {
            return Err(EngineError::Removed);
        }
        Ok(())
    }
}

impl MapEngine for HeadlessEngine {
    fn is_style_loaded(&self) -> bool {
        self.style_loaded && !self.removed
    }

    fn layer_ids(&self) -> Vec<EngineLayerId> {
        self.layers.iter().map(|l| l.id.clone()).collect()
    }

    fn has_layer(&self, id: &EngineLayerId) -> bool {
        self.layer(id).is_some()
    }

    fn has_source(&self, id: &SourceId) -> bool {
        self.sources.contains_key(id)
    }

    fn add_source(&mut self, id: &SourceId, source: &SourceSpec) -> Result<(), EngineError> {
        self.ensure_live()?;
        if !self.style_loaded {
            return Err(EngineError::StyleNotLoaded);
        }
        if self.sources.contains_key(id) {
            return Err(EngineError::DuplicateSource(id.clone()));
        }
        self.sources.insert(id.clone(), source.clone());
        self.calls.push(EngineCall::AddSource(id.clone()));
        Ok(())
    }

    fn remove_source(&mut self, id: &SourceId) -> Result<(), EngineError> {
        self.ensure_live()?;
        if let Some(user) = self.layers.iter().find(|l| l.source() == Some(id)) {
            return Err(EngineError::SourceInUse {
                source: id.clone(),
                layer: user.id.clone(),
            });
        }
        if self.sources.remove(id).is_none() {
            return Err(EngineError::SourceNotFound(id.clone()));
        }
        self.calls.push(EngineCall::RemoveSource(id.clone()));
        Ok(())
    }

    fn add_layer(&mut self, layer: &LayerSpec) -> Result<(), EngineError> {
        self.ensure_live()?;
        if !self.style_loaded {
            return Err(EngineError::StyleNotLoaded);
        }
        if self.has_layer(&layer.id) {
            return Err(EngineError::DuplicateLayer(layer.id.clone()));
        }
        if !self.sources.contains_key(&layer.source) {
            return Err(EngineError::SourceNotFound(layer.source.clone()));
        }
        let entry = HeadlessLayer {
            id: layer.id.clone(),
            spec: Some(layer.clone()),
            visibility: layer.initial_visibility(),
            filter: layer.filter.clone(),
        };
        // An unknown `before` id falls back to the top of the stack.
        let index = layer
            .before
            .as_ref()
            .and_then(|before| self.layers.iter().position(|l| &l.id == before))
            .unwrap_or(self.layers.len());
        self.layers.insert(index, entry);
        self.calls.push(EngineCall::AddLayer(layer.id.clone()));
        Ok(())
    }

    fn remove_layer(&mut self, id: &EngineLayerId) -> Result<(), EngineError> {
        self.ensure_live()?;
        let Some(index) = self.layers.iter().position(|l| &l.id == id) else {
            return Err(EngineError::LayerNotFound(id.clone()));
        };
        self.layers.remove(index);
        self.calls.push(EngineCall::RemoveLayer(id.clone()));
        Ok(())
    }

    fn visibility(&self, id: &EngineLayerId) -> Option<Visibility> {
        self.layer(id).map(|l| l.visibility)
    }

    fn set_visibility(
        &mut self,
        id: &EngineLayerId,
        visibility: Visibility,
    ) -> Result<(), EngineError> {
        self.ensure_live()?;
        if !self.style_loaded {
            return Err(EngineError::StyleNotLoaded);
        }
        let layer = self
            .layer_mut(id)
            .ok_or_else(|| EngineError::LayerNotFound(id.clone()))?;
        layer.visibility = visibility;
        self.calls.push(EngineCall::SetVisibility(id.clone(), visibility));
        Ok(())
    }

    fn set_filter(&mut self, id: &EngineLayerId, filter: &Expression) -> Result<(), EngineError> {
        self.ensure_live()?;
        let layer = self
            .layer_mut(id)
            .ok_or_else(|| EngineError::LayerNotFound(id.clone()))?;
        layer.filter = Some(filter.clone());
        self.calls.push(EngineCall::SetFilter(id.clone(), filter.to_json()));
        Ok(())
    }

    fn query_rendered_features(
        &self,
        point: ScreenPoint,
        layers: &[EngineLayerId],
    ) -> Vec<RenderedFeature> {
        if self.removed {
            return Vec::new();
        }
        let mut hits = Vec::new();
        for layer in self.layers.iter().rev() {
            if !layers.contains(&layer.id) || !layer.visibility.is_visible() {
                continue;
            }
            let Some(placed) = layer.source().and_then(|s| self.features.get(s)) else {
                continue;
            };
            for p in placed {
                if p.at.distance(point) > HIT_TOLERANCE_PX {
                    continue;
                }
                if let Some(filter) = &layer.filter {
                    if !filter.matches(&p.feature.properties) {
                        continue;
                    }
                }
                let mut hit = p.feature.clone();
                hit.layer = layer.id.clone();
                hits.push(hit);
            }
        }
        hits
    }

    fn move_camera(&mut self, camera: CameraMove) {
        if !self.removed {
            self.calls.push(EngineCall::MoveCamera(camera));
        }
    }

    fn set_cursor(&mut self, cursor: Cursor) {
        if !self.removed {
            self.cursor = cursor;
            self.calls.push(EngineCall::SetCursor(cursor));
        }
    }

    fn show_popup(&mut self, popup: Popup) {
        if !self.removed {
            self.popups.push(popup.clone());
            self.calls.push(EngineCall::ShowPopup(popup));
        }
    }

    fn close_popups(&mut self) {
        if !self.removed {
            self.popups.clear();
            self.calls.push(EngineCall::ClosePopups);
        }
    }

    fn subscribe(&mut self, subscription: Subscription) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        if !self.removed {
            self.listeners.insert(id, subscription);
            self.calls.push(EngineCall::Subscribe(id));
        }
        id
    }

    fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let live = self.listeners.remove(&id).is_some();
        if live {
            self.calls.push(EngineCall::Unsubscribe(id));
        }
        live
    }

    fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.removed = true;
        self.layers.clear();
        self.sources.clear();
        self.listeners.clear();
        self.popups.clear();
        self.calls.push(EngineCall::Remove);
    }

    fn is_removed(&self) -> bool {
        self.removed
    }
}

#[cfg(test)]
mod tests {
    use super::{EngineCall, HeadlessEngine};
    use crate::error::EngineError;
    use crate::feature::RenderedFeature;
    use crate::map::{EventKind, MapEngine, Subscription, add_bundle, remove_bundle};
    use foundation::{EngineLayerId, ScreenPoint, SourceId};
    use serde_json::{Map, json};
    use style::{Expression, Visibility, spray_layers};

    fn props(v: serde_json::Value) -> Map<String, serde_json::Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn layers_need_a_loaded_style() {
        let mut engine = HeadlessEngine::new();
        let bundle = spray_layers("u", None);
        assert_eq!(add_bundle(&mut engine, &bundle), Err(EngineError::StyleNotLoaded));
        engine.finish_style_load();
        add_bundle(&mut engine, &bundle).unwrap();
        assert!(engine.has_layer(&EngineLayerId::new("SprayHighlight")));
    }

    #[test]
    fn before_anchor_places_layer_below() {
        let mut engine = HeadlessEngine::with_style(["land", "admin-0"]);
        let bundle = spray_layers("u", Some(EngineLayerId::new("admin-0")));
        add_bundle(&mut engine, &bundle).unwrap();
        let ids: Vec<String> = engine.layer_ids().iter().map(|l| l.to_string()).collect();
        assert_eq!(ids, vec!["land", "Spray", "SprayHighlight", "admin-0"]);
    }

    #[test]
    fn remove_bundle_drops_layers_then_source() {
        let mut engine = HeadlessEngine::with_style(["land"]);
        let bundle = spray_layers("u", None);
        add_bundle(&mut engine, &bundle).unwrap();
        engine.take_calls();
        remove_bundle(&mut engine, &bundle).unwrap();
        assert_eq!(
            engine.calls(),
            &[
                EngineCall::RemoveLayer(EngineLayerId::new("SprayHighlight")),
                EngineCall::RemoveLayer(EngineLayerId::new("Spray")),
                EngineCall::RemoveSource(SourceId::new("Spray")),
            ]
        );
        assert!(engine.source_ids().is_empty());
    }

    #[test]
    fn query_honours_filter_visibility_and_order() {
        let mut engine = HeadlessEngine::with_style(["land"]);
        add_bundle(&mut engine, &spray_layers("u", None)).unwrap();
        let spray = EngineLayerId::new("Spray");
        engine
            .set_visibility(&spray, Visibility::Visible)
            .unwrap();
        engine.place_feature(
            "Spray",
            ScreenPoint::new(10.0, 10.0),
            RenderedFeature::new("Spray", props(json!({"SprayId": 1, "shift_id": "A"}))),
        );
        let at = ScreenPoint::new(12.0, 11.0);
        assert_eq!(engine.query_rendered_features(at, &[spray.clone()]).len(), 1);
        assert!(engine
            .query_rendered_features(ScreenPoint::new(40.0, 40.0), &[spray.clone()])
            .is_empty());

        engine
            .set_filter(&spray, &Expression::eq("shift_id", "B"))
            .unwrap();
        assert!(engine.query_rendered_features(at, &[spray.clone()]).is_empty());

        engine.set_filter(&spray, &Expression::all([])).unwrap();
        engine.set_visibility(&spray, Visibility::None).unwrap();
        assert!(engine.query_rendered_features(at, &[spray]).is_empty());
    }

    #[test]
    fn removed_engine_rejects_mutation() {
        let mut engine = HeadlessEngine::with_style(["land"]);
        engine.subscribe(Subscription::global(EventKind::Click));
        add_bundle(&mut engine, &spray_layers("u", None)).unwrap();
        engine.remove();
        assert!(engine.is_removed());
        assert_eq!(engine.listener_count(), 0);
        assert_eq!(
            engine.set_visibility(&EngineLayerId::new("Spray"), Visibility::Visible),
            Err(EngineError::Removed)
        );
        assert!(!engine.is_style_loaded());
    }

    #[test]
    fn style_json_reflects_live_state() {
        let mut engine = HeadlessEngine::with_style(["land"]);
        add_bundle(&mut engine, &spray_layers("u", None)).unwrap();
        engine
            .set_filter(&EngineLayerId::new("Spray"), &Expression::eq("shift_id", 3))
            .unwrap();
        let style = engine.style_json();
        assert_eq!(style["sources"]["Spray"]["type"], json!("vector"));
        assert_eq!(style["layers"][0]["filter"], json!(["==", "shift_id", 3]));
        assert_eq!(style["layers"][0]["layout"]["visibility"], json!("none"));
    }
}
