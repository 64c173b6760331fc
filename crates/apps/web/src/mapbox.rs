//! `MapEngine` over a mapbox-gl `Map` living in the page.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use engine::{
    CameraMove, Cursor, EngineError, EventKind, ListenerId, MapEngine, MapEvent, Popup,
    RenderedFeature, Subscription,
};
use foundation::{EngineLayerId, LngLat, ScreenPoint, SourceId};
use serde_json::{Value, json};
use style::{Expression, LayerSpec, SourceSpec, Visibility};
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = mapboxgl, js_name = Map)]
    pub type JsMap;

    #[wasm_bindgen(constructor, js_namespace = mapboxgl, js_class = "Map", catch)]
    pub fn new(options: &JsValue) -> Result<JsMap, JsValue>;

    #[wasm_bindgen(method, js_name = isStyleLoaded)]
    fn is_style_loaded(this: &JsMap) -> bool;

    #[wasm_bindgen(method, js_name = getStyle)]
    fn get_style(this: &JsMap) -> JsValue;

    #[wasm_bindgen(method, js_name = getLayer)]
    fn get_layer(this: &JsMap, id: &str) -> JsValue;

    #[wasm_bindgen(method, js_name = getSource)]
    fn get_source(this: &JsMap, id: &str) -> JsValue;

    #[wasm_bindgen(method, catch, js_name = addSource)]
    fn add_source(this: &JsMap, id: &str, source: &JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch, js_name = removeSource)]
    fn remove_source(this: &JsMap, id: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch, js_name = addLayer)]
    fn add_layer(this: &JsMap, layer: &JsValue, before: Option<String>) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch, js_name = removeLayer)]
    fn remove_layer(this: &JsMap, id: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(method, js_name = getLayoutProperty)]
    fn get_layout_property(this: &JsMap, id: &str, name: &str) -> JsValue;

    #[wasm_bindgen(method, catch, js_name = setLayoutProperty)]
    fn set_layout_property(
        this: &JsMap,
        id: &str,
        name: &str,
        value: &JsValue,
    ) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch, js_name = setFilter)]
    fn set_filter(this: &JsMap, id: &str, filter: &JsValue) -> Result<(), JsValue>;

    #[wasm_bindgen(method, js_name = queryRenderedFeatures)]
    fn query_rendered_features(this: &JsMap, point: &JsValue, options: &JsValue) -> js_sys::Array;

    #[wasm_bindgen(method, js_name = flyTo)]
    fn fly_to(this: &JsMap, options: &JsValue);

    #[wasm_bindgen(method, js_name = fitBounds)]
    fn fit_bounds(this: &JsMap, bounds: &JsValue, options: &JsValue);

    #[wasm_bindgen(method, js_name = getCanvas)]
    fn get_canvas(this: &JsMap) -> JsValue;

    #[wasm_bindgen(method, js_name = on)]
    fn on(this: &JsMap, kind: &str, listener: &js_sys::Function);

    #[wasm_bindgen(method, js_name = on)]
    fn on_layer(this: &JsMap, kind: &str, layer: &str, listener: &js_sys::Function);

    #[wasm_bindgen(method, js_name = off)]
    fn off(this: &JsMap, kind: &str, listener: &js_sys::Function);

    #[wasm_bindgen(method, js_name = off)]
    fn off_layer(this: &JsMap, kind: &str, layer: &str, listener: &js_sys::Function);

    #[wasm_bindgen(method, js_name = remove)]
    fn destroy(this: &JsMap);

    #[wasm_bindgen(js_namespace = mapboxgl, js_name = Popup)]
    type JsPopup;

    #[wasm_bindgen(constructor, js_namespace = mapboxgl, js_class = "Popup")]
    fn new(options: &JsValue) -> JsPopup;

    #[wasm_bindgen(method, js_name = setLngLat)]
    fn set_lng_lat(this: &JsPopup, lng_lat: &JsValue) -> JsPopup;

    #[wasm_bindgen(method, js_name = setHTML)]
    fn set_html(this: &JsPopup, html: &str) -> JsPopup;

    #[wasm_bindgen(method, js_name = addTo)]
    fn add_to(this: &JsPopup, map: &JsMap) -> JsPopup;

    #[wasm_bindgen(method)]
    fn remove(this: &JsPopup);
}

/// Converts through JSON text; the values involved are plain style documents.
pub fn to_js(value: &Value) -> JsValue {
    js_sys::JSON::parse(&value.to_string()).unwrap_or(JsValue::UNDEFINED)
}

pub fn from_js(value: &JsValue) -> Value {
    if value.is_undefined() {
        return Value::Null;
    }
    js_sys::JSON::stringify(value)
        .ok()
        .and_then(|s| s.as_string())
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(Value::Null)
}

fn backend(err: JsValue) -> EngineError {
    let msg = js_sys::Reflect::get(&err, &JsValue::from_str("message"))
        .ok()
        .and_then(|m| m.as_string())
        .or_else(|| err.as_string())
        .unwrap_or_else(|| format!("{err:?}"));
    EngineError::Backend(msg)
}

/// Decoded events waiting for the dashboard, plus the hook that schedules their delivery.
#[derive(Default)]
pub struct EventQueue {
    events: RefCell<VecDeque<MapEvent>>,
    wake: RefCell<Option<Box<dyn Fn()>>>,
}

impl EventQueue {
    pub fn set_wake(&self, wake: impl Fn() + 'static) {
        *self.wake.borrow_mut() = Some(Box::new(wake));
    }

    pub fn pop(&self) -> Option<MapEvent> {
        self.events.borrow_mut().pop_front()
    }

    fn push(&self, event: MapEvent) {
        self.events.borrow_mut().push_back(event);
        if let Some(wake) = self.wake.borrow().as_ref() {
            wake();
        }
    }
}

struct Listener {
    subscription: Subscription,
    closure: Closure<dyn FnMut(JsValue)>,
}

pub struct BrowserMap {
    map: JsMap,
    queue: Rc<EventQueue>,
    listeners: HashMap<ListenerId, Listener>,
    next_listener: u64,
    popups: Vec<JsPopup>,
    removed: bool,
}

impl BrowserMap {
    pub fn new(map: JsMap, queue: Rc<EventQueue>) -> Self {
        Self {
            map,
            queue,
            listeners: HashMap::new(),
            next_listener: 0,
            popups: Vec::new(),
            removed: false,
        }
    }

    fn live(&self) -> Result<(), EngineError> {
        if self.removed {
            Err(EngineError::Removed)
        } else {
            Ok(())
        }
    }
}

/// Decodes a renderer event into a [`MapEvent`]. Unknown shapes decode to `None`.
fn decode_event(subscription: &Subscription, event: &JsValue) -> Option<MapEvent> {
    let event = from_js(&strip_target(event));
    match subscription.kind {
        EventKind::StyleLoad => Some(MapEvent::StyleLoaded),
        EventKind::Click => {
            let point = event.get("point")?;
            let lng_lat = event.get("lngLat")?;
            Some(MapEvent::Click {
                point: ScreenPoint::new(point.get("x")?.as_f64()?, point.get("y")?.as_f64()?),
                lng_lat: LngLat::new(lng_lat.get("lng")?.as_f64()?, lng_lat.get("lat")?.as_f64()?),
            })
        }
        EventKind::MouseEnter => {
            let features = event
                .get("features")
                .and_then(Value::as_array)
                .map(|list| list.iter().filter_map(RenderedFeature::from_geojson).collect())
                .unwrap_or_default();
            Some(MapEvent::MouseEnter {
                layer: subscription.layer.clone()?,
                features,
            })
        }
        EventKind::MouseLeave => Some(MapEvent::MouseLeave {
            layer: subscription.layer.clone()?,
        }),
    }
}

/// Copies the serializable parts of a renderer event; `target` points back at the map.
fn strip_target(event: &JsValue) -> JsValue {
    let out = js_sys::Object::new();
    for key in ["point", "lngLat", "features"] {
        if let Ok(value) = js_sys::Reflect::get(event, &JsValue::from_str(key)) {
            if !value.is_undefined() {
                let _ = js_sys::Reflect::set(&out, &JsValue::from_str(key), &value);
            }
        }
    }
    out.into()
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn popup_html(popup: &Popup) -> String {
    let mut html = String::from("<table>");
    for (key, value) in &popup.properties {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Null => "-".to_string(),
            other => other.to_string(),
        };
        html.push_str(&format!(
            "<tr><th>{}</th><td>{}</td></tr>",
            escape_html(key),
            escape_html(&text)
        ));
    }
    html.push_str("</table>");
    html
}

impl MapEngine for BrowserMap {
    fn is_style_loaded(&self) -> bool {
        !self.removed && self.map.is_style_loaded()
    }

    fn layer_ids(&self) -> Vec<EngineLayerId> {
        if self.removed {
            return Vec::new();
        }
        from_js(&self.map.get_style())
            .get("layers")
            .and_then(Value::as_array)
            .map(|layers| {
                layers
                    .iter()
                    .filter_map(|l| l.get("id").and_then(Value::as_str))
                    .map(EngineLayerId::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn has_layer(&self, id: &EngineLayerId) -> bool {
        !self.removed && !self.map.get_layer(id.as_str()).is_undefined()
    }

    fn has_source(&self, id: &SourceId) -> bool {
        !self.removed && !self.map.get_source(id.as_str()).is_undefined()
    }

    fn add_source(&mut self, id: &SourceId, source: &SourceSpec) -> Result<(), EngineError> {
        self.live()?;
        if self.has_source(id) {
            return Err(EngineError::DuplicateSource(id.clone()));
        }
        self.map
            .add_source(id.as_str(), &to_js(&source.to_json()))
            .map_err(backend)
    }

    fn remove_source(&mut self, id: &SourceId) -> Result<(), EngineError> {
        self.live()?;
        if !self.has_source(id) {
            return Err(EngineError::SourceNotFound(id.clone()));
        }
        self.map.remove_source(id.as_str()).map_err(backend)
    }

    fn add_layer(&mut self, layer: &LayerSpec) -> Result<(), EngineError> {
        self.live()?;
        if self.has_layer(&layer.id) {
            return Err(EngineError::DuplicateLayer(layer.id.clone()));
        }
        let before = layer
            .before
            .as_ref()
            .filter(|b| self.has_layer(b))
            .map(|b| b.to_string());
        self.map
            .add_layer(&to_js(&layer.to_json()), before)
            .map_err(backend)
    }

    fn remove_layer(&mut self, id: &EngineLayerId) -> Result<(), EngineError> {
        self.live()?;
        if !self.has_layer(id) {
            return Err(EngineError::LayerNotFound(id.clone()));
        }
        self.map.remove_layer(id.as_str()).map_err(backend)
    }

    fn visibility(&self, id: &EngineLayerId) -> Option<Visibility> {
        if !self.has_layer(id) {
            return None;
        }
        match self.map.get_layout_property(id.as_str(), "visibility").as_string() {
            Some(v) if v == "none" => Some(Visibility::None),
            _ => Some(Visibility::Visible),
        }
    }

    fn set_visibility(
        &mut self,
        id: &EngineLayerId,
        visibility: Visibility,
    ) -> Result<(), EngineError> {
        self.live()?;
        if !self.has_layer(id) {
            return Err(EngineError::LayerNotFound(id.clone()));
        }
        let value = if visibility.is_visible() { "visible" } else { "none" };
        self.map
            .set_layout_property(id.as_str(), "visibility", &JsValue::from_str(value))
            .map_err(backend)
    }

    fn set_filter(&mut self, id: &EngineLayerId, filter: &Expression) -> Result<(), EngineError> {
        self.live()?;
        if !self.has_layer(id) {
            return Err(EngineError::LayerNotFound(id.clone()));
        }
        self.map
            .set_filter(id.as_str(), &to_js(&filter.to_json()))
            .map_err(backend)
    }

    fn query_rendered_features(
        &self,
        point: ScreenPoint,
        layers: &[EngineLayerId],
    ) -> Vec<RenderedFeature> {
        let present: Vec<&str> = layers
            .iter()
            .filter(|l| self.has_layer(l))
            .map(EngineLayerId::as_str)
            .collect();
        if present.is_empty() {
            return Vec::new();
        }
        let hits = self.map.query_rendered_features(
            &to_js(&json!([point.x, point.y])),
            &to_js(&json!({ "layers": present })),
        );
        hits.iter()
            .map(|hit| from_js(&hit))
            .filter_map(|hit| RenderedFeature::from_geojson(&hit))
            .collect()
    }

    fn move_camera(&mut self, camera: CameraMove) {
        if self.removed {
            return;
        }
        match camera {
            CameraMove::FlyTo { center, zoom } => {
                let mut options = json!({ "center": [center.lng, center.lat] });
                if let Some(zoom) = zoom {
                    options["zoom"] = json!(zoom);
                }
                self.map.fly_to(&to_js(&options));
            }
            CameraMove::FitBounds { bounds, padding } => {
                let corners =
                    json!([[bounds.sw.lng, bounds.sw.lat], [bounds.ne.lng, bounds.ne.lat]]);
                self.map
                    .fit_bounds(&to_js(&corners), &to_js(&json!({ "padding": padding })));
            }
        }
    }

    fn set_cursor(&mut self, cursor: Cursor) {
        if self.removed {
            return;
        }
        let canvas = self.map.get_canvas();
        if let Ok(style) = js_sys::Reflect::get(&canvas, &JsValue::from_str("style")) {
            let _ = js_sys::Reflect::set(
                &style,
                &JsValue::from_str("cursor"),
                &JsValue::from_str(cursor.as_css()),
            );
        }
    }

    fn show_popup(&mut self, popup: Popup) {
        if self.removed {
            return;
        }
        let at = to_js(&json!([popup.at.lng, popup.at.lat]));
        let shown = JsPopup::new(&to_js(&json!({ "closeButton": true })))
            .set_lng_lat(&at)
            .set_html(&popup_html(&popup))
            .add_to(&self.map);
        self.popups.push(shown);
    }

    fn close_popups(&mut self) {
        for popup in self.popups.drain(..) {
            popup.remove();
        }
    }

    fn subscribe(&mut self, subscription: Subscription) -> ListenerId {
        self.next_listener += 1;
        let id = ListenerId(self.next_listener);
        let queue = Rc::clone(&self.queue);
        let decoded_for = subscription.clone();
        let closure = Closure::wrap(Box::new(move |event: JsValue| {
            if let Some(event) = decode_event(&decoded_for, &event) {
                queue.push(event);
            }
        }) as Box<dyn FnMut(JsValue)>);

        let function = closure.as_ref().unchecked_ref::<js_sys::Function>();
        match &subscription.layer {
            Some(layer) => self
                .map
                .on_layer(subscription.kind.as_str(), layer.as_str(), function),
            None => self.map.on(subscription.kind.as_str(), function),
        }
        self.listeners.insert(id, Listener {
            subscription,
            closure,
        });
        id
    }

    fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let Some(listener) = self.listeners.remove(&id) else {
            return false;
        };
        if !self.removed {
            let function = listener.closure.as_ref().unchecked_ref::<js_sys::Function>();
            let kind = listener.subscription.kind.as_str();
            match &listener.subscription.layer {
                Some(layer) => self.map.off_layer(kind, layer.as_str(), function),
                None => self.map.off(kind, function),
            }
        }
        true
    }

    fn remove(&mut self) {
        if self.removed {
            return;
        }
        self.close_popups();
        self.map.destroy();
        self.listeners.clear();
        self.removed = true;
    }

    fn is_removed(&self) -> bool {
        self.removed
    }
}
