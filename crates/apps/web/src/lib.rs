use console_error_panic_hook::set_once;
use gloo_net::http::Request;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

use dashboard::{
    AuthStatus, DashboardConfig, DashboardController, DashboardError, DetailPanel, DetailsError,
    DetailsRequest, Effect, GateDecision, PanelState, Scene, ShiftFilterInput, StationDetails, gate,
};
use foundation::FeatureId;
use runtime::MonthCursor;
use serde_json::{Value, json};
use style::{Direction, RequestKind, transform_request};

mod mapbox;
use mapbox::{BrowserMap, EventQueue, JsMap, from_js, to_js};

fn log(msg: &str) {
    web_sys::console::log_1(&JsValue::from_str(msg));
}

fn js_err(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Largest integer a JS number holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// A JS track number as an integer. Fractions, NaN and infinities are refused.
fn track_number(raw: Option<f64>) -> Result<Option<i64>, String> {
    match raw {
        None => Ok(None),
        Some(t) if t.is_finite() && t.fract() == 0.0 && t.abs() <= MAX_SAFE_INTEGER => {
            Ok(Some(t as i64))
        }
        Some(t) => Err(format!("track number must be a whole number, got {t}")),
    }
}

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    set_once();
    Ok(())
}

/// Decides what the page shows for the identity provider's state.
///
/// `status` is `{"isLoading", "isAuthenticated", "accessToken"}`. Returns `"loading"`,
/// `"redirect"` or `"ready"`; a redirect with a known login URL navigates right away.
#[wasm_bindgen]
pub fn auth_gate(status: &str, login_url: Option<String>) -> Result<String, JsValue> {
    let status: AuthStatus = serde_json::from_str(status).map_err(js_err)?;
    Ok(match gate(&status, login_url.as_deref()) {
        GateDecision::Loading => "loading".to_string(),
        GateDecision::RedirectToLogin { login_url } => {
            if let Some(url) = login_url {
                let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
                window.location().assign(&url)?;
            }
            "redirect".to_string()
        }
        GateDecision::Ready { .. } => "ready".to_string(),
    })
}

struct Replay {
    handle: i32,
    cursor: MonthCursor,
    // Dropped only from outside the tick itself.
    _tick: Closure<dyn FnMut()>,
}

struct Shell {
    controller: DashboardController<BrowserMap>,
    queue: Rc<EventQueue>,
    listener: Option<js_sys::Function>,
    replay: Option<Replay>,
    token: Option<String>,
}

impl Shell {
    fn stop_replay(&mut self) {
        if let Some(replay) = self.replay.take() {
            clear_interval(replay.handle);
        }
    }
}

fn clear_interval(handle: i32) {
    if let Some(window) = web_sys::window() {
        window.clear_interval_with_handle(handle);
    }
}

fn notify(listener: Option<&js_sys::Function>, kind: &str, payload: &Value) {
    if let Some(listener) = listener {
        let kind = JsValue::from_str(kind);
        if let Err(err) = listener.call2(&JsValue::NULL, &kind, &to_js(payload)) {
            log(&format!("dashboard listener failed: {err:?}"));
        }
    }
}

fn id_json(id: &Option<FeatureId>) -> Value {
    id.as_ref().map(FeatureId::to_json).unwrap_or(Value::Null)
}

fn panel_json(panel: &DetailPanel) -> Value {
    match panel.state() {
        PanelState::Closed => json!({ "state": "closed", "message": panel.message() }),
        PanelState::Loading { station } => json!({
            "state": "loading",
            "station": station.to_json(),
            "message": panel.message(),
        }),
        PanelState::Loaded { station, details } => {
            let kpis: Vec<Value> = details
                .kpis()
                .iter()
                .map(|k| json!({ "title": k.title, "value": k.formatted() }))
                .collect();
            json!({
                "state": "loaded",
                "station": station.to_json(),
                "name": details.name,
                "kpis": kpis,
                "details": serde_json::to_value(details.as_ref()).unwrap_or(Value::Null),
            })
        }
        PanelState::Failed {
            station,
            error,
            retryable,
        } => json!({
            "state": "failed",
            "station": station.to_json(),
            "error": error.to_string(),
            "retryable": retryable,
            "message": panel.message(),
        }),
    }
}

/// Feeds queued map events to the controller. A busy shell is left alone; the call
/// holding it pumps again once done.
fn pump(shell: &Rc<RefCell<Shell>>) {
    loop {
        let (effects, listener) = {
            let Ok(mut s) = shell.try_borrow_mut() else {
                return;
            };
            let Some(event) = s.queue.pop() else {
                return;
            };
            match s.controller.handle_event(event) {
                Ok(effects) => (effects, s.listener.clone()),
                Err(err) => {
                    log(&format!("map event failed: {err}"));
                    continue;
                }
            }
        };
        for effect in effects {
            dispatch(shell, effect, listener.as_ref());
        }
    }
}

fn dispatch(shell: &Rc<RefCell<Shell>>, effect: Effect, listener: Option<&js_sys::Function>) {
    match effect {
        Effect::SelectionChanged(change) => notify(
            listener,
            "selection",
            &json!({ "previous": id_json(&change.previous), "current": id_json(&change.current) }),
        ),
        Effect::FetchDetails(request) => {
            let Ok(s) = shell.try_borrow() else {
                return;
            };
            let token = s.token.clone();
            let loading = panel_json(s.controller.details());
            drop(s);
            notify(listener, "details", &loading);
            spawn_local(fetch_details(Rc::downgrade(shell), request, token));
        }
        Effect::PopupOpened(hit) => notify(
            listener,
            "popup",
            &json!({ "layer": hit.layer.as_str(), "id": id_json(&hit.id) }),
        ),
        Effect::SegmentEndpoint(pick) => notify(
            listener,
            "segment",
            &json!({
                "gpsId": pick.gps_id.to_json(),
                "position": pick.position.map(|p| [p.lng, p.lat]),
                "direction": pick.direction.map(|d| d.to_string()),
                "trackNumber": pick.track_number,
            }),
        ),
    }
}

async fn get_details(url: &str, token: Option<&str>) -> Result<StationDetails, DetailsError> {
    let mut request = Request::get(url);
    if let Some(token) = token {
        request = request.header("Authorization", &format!("Bearer {token}"));
    }
    let resp = request
        .send()
        .await
        .map_err(|e| DetailsError::Network(e.to_string()))?;
    if !resp.ok() {
        return Err(DetailsError::Status(resp.status()));
    }
    let body = resp
        .text()
        .await
        .map_err(|e| DetailsError::Network(e.to_string()))?;
    StationDetails::from_item_json(&body)
}

async fn fetch_details(
    shell: Weak<RefCell<Shell>>,
    request: DetailsRequest,
    token: Option<String>,
) {
    let result = get_details(&request.url, token.as_deref()).await;
    let Some(shell) = shell.upgrade() else {
        return;
    };
    let (payload, listener) = {
        let Ok(mut s) = shell.try_borrow_mut() else {
            log("details arrived while the dashboard was busy; dropped");
            return;
        };
        if !s.controller.resolve_details(request.seq, result) {
            return;
        }
        (panel_json(s.controller.details()), s.listener.clone())
    };
    notify(listener.as_ref(), "details", &payload);
}

/// The dashboard mounted on one page element.
///
/// Owns the map, its event closures and the replay timer; [`WebDashboard::destroy`] (or
/// dropping the value from JS via `free()`) releases all of them.
#[wasm_bindgen]
pub struct WebDashboard {
    shell: Rc<RefCell<Shell>>,
    _transform: Closure<dyn FnMut(String, String) -> JsValue>,
}

impl WebDashboard {
    fn with_controller<R>(
        &self,
        f: impl FnOnce(&mut DashboardController<BrowserMap>) -> Result<R, DashboardError>,
    ) -> Result<R, JsValue> {
        let result = {
            let mut s = self
                .shell
                .try_borrow_mut()
                .map_err(|_| JsValue::from_str("dashboard busy"))?;
            f(&mut s.controller).map_err(js_err)
        };
        pump(&self.shell);
        result
    }
}

#[wasm_bindgen]
impl WebDashboard {
    /// Mounts the dashboard in `container`.
    ///
    /// `scene` is `groundwater` or `shifts`. `options` holds string settings keyed like the
    /// environment (`TIPG_URL`, `API_HOSTNAME`, `ACCESS_TOKEN`, `MAPBOX_TOKEN`, ...).
    #[wasm_bindgen(constructor)]
    pub fn new(container: &str, scene: &str, options: JsValue) -> Result<WebDashboard, JsValue> {
        let lookup = |key: &str| {
            js_sys::Reflect::get(&options, &JsValue::from_str(key))
                .ok()
                .and_then(|v| v.as_string())
        };
        let config = DashboardConfig::from_lookup(lookup).map_err(js_err)?;
        let scene: Scene = scene.parse().map_err(js_err)?;
        let token = config.access_token.clone();

        let transform_token = token.clone();
        let transform = Closure::wrap(Box::new(move |url: String, kind: String| {
            let kind = RequestKind::from_renderer(&kind);
            match transform_request(&url, kind, transform_token.as_deref()) {
                Ok(req) => {
                    let headers: serde_json::Map<String, Value> = req
                        .headers
                        .iter()
                        .filter_map(|(k, v)| Some((k.to_string(), Value::from(v.to_str().ok()?))))
                        .collect();
                    to_js(&json!({ "url": req.url, "headers": headers }))
                }
                Err(err) => {
                    log(&format!("request transform failed: {err}"));
                    to_js(&json!({ "url": url }))
                }
            }
        }) as Box<dyn FnMut(String, String) -> JsValue>);

        let mut map_options = json!({
            "container": container,
            "style": config.map_style,
            "center": [config.map_center.lng, config.map_center.lat],
            "zoom": config.map_zoom,
        });
        if let Some(mapbox_token) = lookup("MAPBOX_TOKEN") {
            map_options["accessToken"] = Value::from(mapbox_token);
        }
        let map_options = to_js(&map_options);
        js_sys::Reflect::set(
            &map_options,
            &JsValue::from_str("transformRequest"),
            transform.as_ref(),
        )?;
        let map = JsMap::new(&map_options)?;

        let queue = Rc::new(EventQueue::default());
        let engine = BrowserMap::new(map, Rc::clone(&queue));
        let controller = DashboardController::new(engine, scene, config).map_err(js_err)?;
        let shell = Rc::new(RefCell::new(Shell {
            controller,
            queue: Rc::clone(&queue),
            listener: None,
            replay: None,
            token,
        }));

        let weak = Rc::downgrade(&shell);
        queue.set_wake(move || {
            let weak = weak.clone();
            spawn_local(async move {
                if let Some(shell) = weak.upgrade() {
                    pump(&shell);
                }
            });
        });

        Ok(WebDashboard {
            shell,
            _transform: transform,
        })
    }

    /// Receives `(kind, payload)` for `selection`, `details`, `popup`, `segment` and `month`.
    pub fn set_listener(&self, listener: js_sys::Function) -> Result<(), JsValue> {
        let mut s = self
            .shell
            .try_borrow_mut()
            .map_err(|_| JsValue::from_str("dashboard busy"))?;
        s.listener = Some(listener);
        Ok(())
    }

    pub fn toggle_layer(&self, group: &str, layer: &str) -> Result<(), JsValue> {
        self.with_controller(|c| c.toggle_visibility(group, layer).map(|_| ()))
    }

    pub fn legend_json(&self) -> Result<String, JsValue> {
        let s = self.shell.try_borrow().map_err(|_| JsValue::from_str("dashboard busy"))?;
        serde_json::to_string(s.controller.legend()).map_err(js_err)
    }

    pub fn year_month(&self) -> Result<String, JsValue> {
        let s = self.shell.try_borrow().map_err(|_| JsValue::from_str("dashboard busy"))?;
        Ok(s.controller.year_month().to_string())
    }

    /// `ids` is an array of shift ids, `direction` one of `Forward`, `Backward`, `Both`.
    pub fn set_shift_filters(
        &self,
        ids: JsValue,
        direction: &str,
        track_number_raw: Option<f64>,
    ) -> Result<(), JsValue> {
        let loadable = match from_js(&ids) {
            Value::Array(list) => list.iter().filter_map(FeatureId::from_json).collect(),
            _ => Vec::new(),
        };
        let direction: Direction = direction.parse().map_err(js_err)?;
        let input = ShiftFilterInput {
            loadable,
            direction,
            track_number: track_number(track_number_raw).map_err(js_err)?,
        };
        self.with_controller(|c| c.set_shift_filters(input))
    }

    pub fn set_direction(&self, direction: &str) -> Result<(), JsValue> {
        let direction: Direction = direction.parse().map_err(js_err)?;
        self.with_controller(|c| c.set_direction(direction))
    }

    pub fn set_track_number(&self, raw: Option<f64>) -> Result<(), JsValue> {
        let track = track_number(raw).map_err(js_err)?;
        self.with_controller(|c| c.set_track_number(track))
    }

    pub fn set_comparing(&self, comparing: bool) -> Result<(), JsValue> {
        self.with_controller(|c| {
            c.set_comparing(comparing);
            Ok(())
        })
    }

    /// Draws the segment between two picked points as GeoJSON.
    pub fn show_baseline_segment(&self, geojson: &str) -> Result<(), JsValue> {
        let geometry: Value = serde_json::from_str(geojson).map_err(js_err)?;
        self.with_controller(|c| c.show_baseline_segment(geometry))
    }

    pub fn clear_baseline_segment(&self) -> Result<(), JsValue> {
        self.with_controller(|c| c.clear_baseline_segment())
    }

    pub fn details_json(&self) -> Result<String, JsValue> {
        let s = self.shell.try_borrow().map_err(|_| JsValue::from_str("dashboard busy"))?;
        Ok(panel_json(s.controller.details()).to_string())
    }

    pub fn close_details(&self) -> Result<(), JsValue> {
        self.with_controller(|c| c.close_details().map(|_| ()))
    }

    pub fn retry_details(&self) -> Result<(), JsValue> {
        let request = {
            let mut s = self
                .shell
                .try_borrow_mut()
                .map_err(|_| JsValue::from_str("dashboard busy"))?;
            s.controller.retry_details().map(|r| (r, s.token.clone()))
        };
        if let Some((request, token)) = request {
            spawn_local(fetch_details(Rc::downgrade(&self.shell), request, token));
        }
        Ok(())
    }

    /// Plays the configured month range once, one month per replay period.
    pub fn start_replay(&self) -> Result<(), JsValue> {
        let mut s = self
            .shell
            .try_borrow_mut()
            .map_err(|_| JsValue::from_str("dashboard busy"))?;
        s.stop_replay();
        let range = s.controller.config().replay_range().map_err(js_err)?;
        let period_ms = i32::try_from(s.controller.config().replay_period.as_millis())
            .unwrap_or(i32::MAX);

        let weak = Rc::downgrade(&self.shell);
        let tick = Closure::wrap(Box::new(move || {
            if let Some(shell) = weak.upgrade() {
                replay_tick(&shell);
            }
        }) as Box<dyn FnMut()>);
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
        let handle = window.set_interval_with_callback_and_timeout_and_arguments_0(
            tick.as_ref().unchecked_ref(),
            period_ms,
        )?;
        s.replay = Some(Replay {
            handle,
            cursor: range.cursor(),
            _tick: tick,
        });
        Ok(())
    }

    pub fn stop_replay(&self) -> Result<(), JsValue> {
        let mut s = self
            .shell
            .try_borrow_mut()
            .map_err(|_| JsValue::from_str("dashboard busy"))?;
        s.stop_replay();
        Ok(())
    }

    /// Stops the replay, releases every map listener and removes the map. Idempotent.
    pub fn destroy(&self) {
        let Ok(mut s) = self.shell.try_borrow_mut() else {
            log("destroy while busy; skipped");
            return;
        };
        s.stop_replay();
        s.listener = None;
        s.controller.teardown();
    }
}

fn replay_tick(shell: &Rc<RefCell<Shell>>) {
    let (month, listener) = {
        let Ok(mut guard) = shell.try_borrow_mut() else {
            return;
        };
        let s = &mut *guard;
        let Some(replay) = s.replay.as_mut() else {
            return;
        };
        let Some(month) = replay.cursor.next() else {
            clear_interval(replay.handle);
            return;
        };
        if replay.cursor.is_finished() {
            clear_interval(replay.handle);
        }
        if let Err(err) = s.controller.set_year_month(month) {
            log(&format!("replay step {month} failed: {err}"));
        }
        (month, s.listener.clone())
    };
    notify(listener.as_ref(), "month", &Value::from(month.to_string()));
    pump(shell);
}

impl Drop for WebDashboard {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::track_number;

    #[test]
    fn whole_track_numbers_pass_through() {
        assert_eq!(track_number(None), Ok(None));
        assert_eq!(track_number(Some(3.0)), Ok(Some(3)));
        assert_eq!(track_number(Some(-2.0)), Ok(Some(-2)));
    }

    #[test]
    fn fractional_and_non_finite_track_numbers_are_refused() {
        for raw in [1.5, f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1e300] {
            assert!(track_number(Some(raw)).is_err(), "{raw}");
        }
    }
}
