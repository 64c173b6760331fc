//! The map layer and legend synchronization controller.
//!
//! Owns the live map engine exclusively. Legend toggles, replay ticks, selection and
//! filter inputs all enter here and leave as engine calls through the synchronizer and
//! the interaction bridges.

use engine::{
    Cursor, EngineCall, EventKind, HeadlessEngine, InteractionBridge, InteractionTarget, ListenerSet, MapEngine, MapEvent,
    PopupBridge, PopupHit, SegmentPick, SegmentPicker, Subscription, VisibilitySynchronizer,
    add_bundle, remove_bundle,
};
use foundation::{EngineLayerId, FeatureId, LngLat, ScreenPoint, YearMonth};
use legend::{LegendAction, LegendState, LegendStore, ProcessReport, presets};
use runtime::SelectionChange;
use serde_json::Value;
use style::{
    DerivedFilters, Direction, FilterCriteria, FilterKeys, LayerBundle, ResourceKind,
    SHIFT_LAYER, STATION_LAYER, baseline_segment_layers, derive_filters,
    direction_naive_layers, direction_sensitive_layers, find_anchor_layer, gps_point_layers,
    groundwater_station_layers, restricted_area_layers, shift_layers, spray_layers,
    weed_layers,
};
use tracing::{debug, info};

use crate::config::DashboardConfig;
use crate::details::{DetailPanel, DetailsError, DetailsRequest, StationDetails};
use crate::error::DashboardError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Scene {
    /// Monthly groundwater levels at measuring stations.
    Groundwater,
    /// Agricultural shift tracking.
    Shifts,
}

impl Scene {
    pub fn legend(&self) -> Result<LegendState, DashboardError> {
        Ok(match self {
            Scene::Groundwater => presets::groundwater()?,
            Scene::Shifts => presets::shifts()?,
        })
    }
}

impl std::str::FromStr for Scene {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "groundwater" => Ok(Scene::Groundwater),
            "shifts" => Ok(Scene::Shifts),
            other => Err(format!("unknown scene {other:?} (expected groundwater or shifts)")),
        }
    }
}

/// Observable outcomes of [`DashboardController::handle_event`] the shell reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    SelectionChanged(SelectionChange),
    /// Fetch station details and report back via [`DashboardController::resolve_details`].
    FetchDetails(DetailsRequest),
    PopupOpened(PopupHit),
    SegmentEndpoint(SegmentPick),
}

/// Inputs of the shift filters other than the selected shift.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShiftFilterInput {
    pub loadable: Vec<FeatureId>,
    pub direction: Direction,
    pub track_number: Option<i64>,
}

pub struct DashboardController<E: MapEngine> {
    engine: E,
    scene: Scene,
    config: DashboardConfig,
    legend: LegendStore,
    sync: VisibilitySynchronizer,
    listeners: ListenerSet,
    /// Layer-scoped listeners are registered once, on the first style load.
    layer_listeners: bool,
    year_month: YearMonth,
    stations: InteractionBridge,
    details: DetailPanel,
    shifts: InteractionBridge,
    popups: PopupBridge,
    segment: SegmentPicker,
    comparing: bool,
    filter_input: ShiftFilterInput,
    filter_keys: FilterKeys,
    baseline: Option<LayerBundle>,
    torn_down: bool,
}

impl<E: MapEngine> DashboardController<E> {
    /// Takes ownership of `engine`. When its style is already loaded the scene's layers
    /// are added right away, otherwise on [`MapEvent::StyleLoaded`].
    pub fn new(engine: E, scene: Scene, config: DashboardConfig) -> Result<Self, DashboardError> {
        let legend = LegendStore::new(scene.legend()?);
        let details = DetailPanel::new(config.tipg_url.clone(), config.details_collection.clone());
        let mut controller = Self {
            engine,
            scene,
            year_month: config.replay_start,
            config,
            legend,
            sync: VisibilitySynchronizer::new(),
            listeners: ListenerSet::new(),
            layer_listeners: false,
            stations: InteractionBridge::new(InteractionTarget::stations()),
            details,
            shifts: InteractionBridge::new(InteractionTarget::shifts()),
            popups: PopupBridge::default(),
            segment: SegmentPicker::new(),
            comparing: false,
            filter_input: ShiftFilterInput::default(),
            filter_keys: FilterKeys::default(),
            baseline: None,
            torn_down: false,
        };
        controller.listeners.register(
            &mut controller.engine,
            Subscription::global(EventKind::StyleLoad),
        );
        if controller.engine.is_style_loaded() {
            controller.on_style_load()?;
        }
        Ok(controller)
    }

    pub fn scene(&self) -> Scene {
        self.scene
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn legend(&self) -> &LegendState {
        self.legend.state()
    }

    pub fn year_month(&self) -> YearMonth {
        self.year_month
    }

    pub fn details(&self) -> &DetailPanel {
        &self.details
    }

    pub fn selected_station(&self) -> Option<FeatureId> {
        self.stations.selected()
    }

    pub fn selected_shift(&self) -> Option<FeatureId> {
        self.shifts.selected()
    }

    pub fn segment_picks(&self) -> &[SegmentPick] {
        self.segment.picks()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    fn ensure_live(&self) -> Result<(), DashboardError> {
        if self.torn_down {
            return Err(DashboardError::TornDown);
        }
        Ok(())
    }

    /// (Re)creates every scene layer. Runs after each style load, since a style swap
    /// drops all custom layers and sources.
    pub fn on_style_load(&mut self) -> Result<(), DashboardError> {
        self.ensure_live()?;
        match self.scene {
            Scene::Groundwater => {
                let bundle = self.station_bundle();
                remove_bundle(&mut self.engine, &bundle)?;
                add_bundle(&mut self.engine, &bundle)?;
                if !self.layer_listeners {
                    self.listeners
                        .register(&mut self.engine, Subscription::global(EventKind::Click));
                    for kind in [EventKind::MouseEnter, EventKind::MouseLeave] {
                        self.listeners
                            .register(&mut self.engine, Subscription::layer(kind, STATION_LAYER));
                    }
                }
                self.stations.reapply(&mut self.engine)?;
            }
            Scene::Shifts => {
                let anchor = find_anchor_layer(&self.engine.layer_ids());
                let mut bundles = self.shift_bundles(anchor);
                bundles.extend(self.baseline.clone());
                for bundle in &bundles {
                    remove_bundle(&mut self.engine, bundle)?;
                    add_bundle(&mut self.engine, bundle)?;
                }
                if !self.layer_listeners {
                    self.listeners
                        .register(&mut self.engine, Subscription::global(EventKind::Click));
                    for kind in [EventKind::MouseEnter, EventKind::MouseLeave] {
                        self.listeners
                            .register(&mut self.engine, Subscription::layer(kind, SHIFT_LAYER));
                    }
                }
                self.apply_filters()?;
            }
        }
        self.layer_listeners = true;
        let outcome = self.sync.apply_legend(&mut self.engine, self.legend.state())?;
        debug!(
            applied = outcome.applied.len(),
            deferred = outcome.deferred.len(),
            "legend visibility synchronized"
        );
        Ok(())
    }

    fn station_bundle(&self) -> LayerBundle {
        let template = self
            .config
            .station_tiles()
            .template(&self.year_month.to_string());
        groundwater_station_layers(template)
    }

    fn shift_bundles(&self, anchor: Option<EngineLayerId>) -> Vec<LayerBundle> {
        let api = self.config.vector_tile_api();
        let url = |kind| String::from(api.template(kind));
        vec![
            shift_layers(url(ResourceKind::Shift), anchor.clone()),
            weed_layers(url(ResourceKind::Weed), anchor.clone()),
            spray_layers(url(ResourceKind::Spray), anchor.clone()),
            restricted_area_layers(url(ResourceKind::RestrictedArea), anchor.clone()),
            gps_point_layers(url(ResourceKind::Gps), anchor),
        ]
    }

    /// Shows another month: the time-sliced station source and its layers are rebuilt and
    /// the current hover/selection highlight and legend visibility are re-applied.
    pub fn set_year_month(&mut self, year_month: YearMonth) -> Result<(), DashboardError> {
        self.ensure_live()?;
        self.year_month = year_month;
        if self.scene != Scene::Groundwater || !self.engine.is_style_loaded() {
            return Ok(());
        }
        info!(%year_month, "rebuilding station layers");
        let bundle = self.station_bundle();
        remove_bundle(&mut self.engine, &bundle)?;
        add_bundle(&mut self.engine, &bundle)?;
        self.stations.reapply(&mut self.engine)?;
        self.sync.apply_legend(&mut self.engine, self.legend.state())?;
        Ok(())
    }

    /// Queues a legend action. Nothing reaches the engine before [`Self::process_legend`].
    pub fn dispatch(&mut self, action: LegendAction) {
        self.legend.dispatch(action);
    }

    /// Applies queued legend actions in dispatch order and pushes the visibility changes
    /// to the engine. Rejected actions are reported, not fatal.
    pub fn process_legend(&mut self) -> Result<ProcessReport, DashboardError> {
        self.ensure_live()?;
        let report = self.legend.process();
        self.sync.apply_report(&mut self.engine, &report)?;
        Ok(report)
    }

    pub fn toggle_visibility(
        &mut self,
        group: &str,
        layer: &str,
    ) -> Result<ProcessReport, DashboardError> {
        self.dispatch(LegendAction::toggle_visibility(group, layer));
        self.process_legend()
    }

    pub fn set_shift_filters(&mut self, input: ShiftFilterInput) -> Result<(), DashboardError> {
        self.filter_input = input;
        self.apply_filters()
    }

    pub fn set_direction(&mut self, direction: Direction) -> Result<(), DashboardError> {
        self.filter_input.direction = direction;
        self.apply_filters()
    }

    pub fn set_track_number(&mut self, track_number: Option<i64>) -> Result<(), DashboardError> {
        self.filter_input.track_number = track_number;
        self.apply_filters()
    }

    /// Selects a shift from outside the map (e.g. a list); `None` deselects.
    pub fn select_shift(
        &mut self,
        shift: Option<FeatureId>,
    ) -> Result<SelectionChange, DashboardError> {
        self.ensure_live()?;
        let change = match shift {
            Some(id) => self.shifts.selection().select(id),
            None => self.shifts.selection().clear(),
        };
        if change.changed() {
            self.apply_filters()?;
        }
        Ok(change)
    }

    /// Filters derived from the current inputs.
    pub fn derived_filters(&self) -> DerivedFilters {
        derive_filters(
            &FilterCriteria {
                loadable: self.filter_input.loadable.clone(),
                direction: self.filter_input.direction,
                selected: self.shifts.selected(),
                track_number: self.filter_input.track_number,
            },
            &self.filter_keys,
        )
    }

    /// Pushes the derived filters to the shift layers. Skipped while nothing is loadable
    /// and nothing is selected, or while the layers do not exist yet.
    fn apply_filters(&mut self) -> Result<(), DashboardError> {
        self.ensure_live()?;
        if self.scene != Scene::Shifts {
            return Ok(());
        }
        if self.filter_input.loadable.is_empty() && self.shifts.selected().is_none() {
            debug!("no loadable shifts, filters left untouched");
            return Ok(());
        }
        let filters = self.derived_filters();
        let targets = direction_naive_layers()
            .into_iter()
            .map(|l| (l, &filters.direction_naive))
            .chain(
                direction_sensitive_layers()
                    .into_iter()
                    .map(|l| (l, &filters.direction_sensitive)),
            );
        for (layer, filter) in targets {
            if self.engine.has_layer(&layer) {
                self.engine.set_filter(&layer, filter)?;
            } else {
                debug!(%layer, "filter target missing, skipped");
            }
        }
        Ok(())
    }

    /// Compare mode: GPS clicks pick segment endpoints instead of opening popups.
    pub fn set_comparing(&mut self, comparing: bool) {
        if self.comparing && !comparing {
            self.segment.reset();
        }
        self.comparing = comparing;
    }

    /// Draws the comparison baseline beneath the GPS points, replacing a previous one.
    pub fn show_baseline_segment(&mut self, geometry: Value) -> Result<(), DashboardError> {
        self.ensure_live()?;
        self.clear_baseline_segment()?;
        let bundle = baseline_segment_layers(geometry);
        if self.engine.is_style_loaded() {
            add_bundle(&mut self.engine, &bundle)?;
        }
        self.baseline = Some(bundle);
        Ok(())
    }

    pub fn clear_baseline_segment(&mut self) -> Result<(), DashboardError> {
        self.ensure_live()?;
        if let Some(bundle) = self.baseline.take() {
            remove_bundle(&mut self.engine, &bundle)?;
        }
        Ok(())
    }

    /// Routes one engine event.
    pub fn handle_event(&mut self, event: MapEvent) -> Result<Vec<Effect>, DashboardError> {
        self.ensure_live()?;
        let mut effects = Vec::new();
        match event {
            MapEvent::StyleLoaded => self.on_style_load()?,
            MapEvent::Click { point, lng_lat } => match self.scene {
                Scene::Groundwater => self.click_station(point, lng_lat, &mut effects)?,
                Scene::Shifts => self.click_shifts(point, lng_lat, &mut effects)?,
            },
            MapEvent::MouseEnter { layer, features } => {
                if layer.as_str() == STATION_LAYER {
                    self.stations.pointer_enter(&mut self.engine, &features)?;
                } else {
                    self.engine.set_cursor(Cursor::Pointer);
                }
            }
            MapEvent::MouseLeave { layer } => {
                if layer.as_str() == STATION_LAYER {
                    self.stations.pointer_leave(&mut self.engine)?;
                } else {
                    self.engine.set_cursor(Cursor::Default);
                }
            }
        }
        Ok(effects)
    }

    fn click_station(
        &mut self,
        point: ScreenPoint,
        lng_lat: LngLat,
        effects: &mut Vec<Effect>,
    ) -> Result<(), DashboardError> {
        let change = self.stations.click(&mut self.engine, point, lng_lat)?;
        if change.changed() {
            if let Some(request) = self.details.show(change.current.clone()) {
                effects.push(Effect::FetchDetails(request));
            }
            effects.push(Effect::SelectionChanged(change));
        }
        Ok(())
    }

    fn click_shifts(
        &mut self,
        point: ScreenPoint,
        lng_lat: LngLat,
        effects: &mut Vec<Effect>,
    ) -> Result<(), DashboardError> {
        if self.comparing {
            if let Some(pick) = self.segment.pick(&self.engine, point).cloned() {
                if let Some(direction) = pick.direction {
                    self.filter_input.direction = direction;
                }
                self.filter_input.track_number = pick.track_number;
                self.apply_filters()?;
                effects.push(Effect::SegmentEndpoint(pick));
            }
            return Ok(());
        }

        if let Some(hit) = self.popups.click(&mut self.engine, point, lng_lat)? {
            effects.push(Effect::PopupOpened(hit));
        }
        let shift_layer = self.shifts.target().layer.clone();
        let shift_hits = self
            .engine
            .query_rendered_features(point, std::slice::from_ref(&shift_layer));
        if let Some(shift) = shift_hits.first() {
            let change = self.shifts.select(&mut self.engine, shift, lng_lat)?;
            if change.changed() {
                self.apply_filters()?;
                effects.push(Effect::SelectionChanged(change));
            }
        }
        Ok(())
    }

    /// Explicit close of the detail panel.
    pub fn close_details(&mut self) -> Result<SelectionChange, DashboardError> {
        self.ensure_live()?;
        let change = self.stations.close(&mut self.engine)?;
        self.details.show(None);
        Ok(change)
    }

    pub fn resolve_details(
        &mut self,
        seq: u64,
        result: Result<StationDetails, DetailsError>,
    ) -> bool {
        self.details.resolve(seq, result)
    }

    pub fn retry_details(&mut self) -> Option<DetailsRequest> {
        self.details.retry()
    }

    /// Releases every listener and destroys the engine. Safe to call more than once.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        let released = self.listeners.release_all(&mut self.engine);
        self.engine.remove();
        self.details.show(None);
        self.torn_down = true;
        info!(released, "dashboard torn down");
    }
}

/// Hooks for driving the in-process engine. Neither touches layers, filters or visibility.
impl DashboardController<HeadlessEngine> {
    /// Completes the engine's pending style load. Follow with [`MapEvent::StyleLoaded`].
    pub fn finish_style_load(&mut self) {
        self.engine.finish_style_load();
    }

    /// Drains the engine's recorded call log.
    pub fn take_engine_calls(&mut self) -> Vec<EngineCall> {
        self.engine.take_calls()
    }
}

impl<E: MapEngine> Drop for DashboardController<E> {
    fn drop(&mut self) {
        self.teardown();
    }
}
