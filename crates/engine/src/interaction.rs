use foundation::{EngineLayerId, FeatureId, LngLat, ScreenPoint};
use runtime::{SelectionChange, SelectionState};
use style::{
    Expression, SHIFT_LAYER, STATION_HIGHLIGHT_LAYER, STATION_ID_KEY, STATION_LAYER,
    STATION_SELECTED_LAYER,
};
use tracing::debug;

use crate::error::EngineError;
use crate::feature::RenderedFeature;
use crate::map::{CameraMove, Cursor, MapEngine};

pub const STATION_FLY_ZOOM: f64 = 15.0;
pub const SHIFT_FIT_PADDING: f64 = 20.0;

/// Camera reaction to a selection.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum CameraPolicy {
    /// Fly to the feature position (or the click position) at a fixed zoom.
    FlyTo { zoom: f64 },
    /// Fit the feature's bounds.
    FitBounds { padding: f64 },
    Stay,
}

/// Which layers one interactive feature layer drives.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionTarget {
    /// Layer that receives pointer and click events.
    pub layer: EngineLayerId,
    /// Layer filtered to the hovered feature.
    pub hover_layer: Option<EngineLayerId>,
    /// Layer filtered to the selected feature.
    pub selected_layer: Option<EngineLayerId>,
    /// Property holding the feature id.
    pub id_key: String,
    pub camera: CameraPolicy,
}

impl InteractionTarget {
    /// Groundwater stations: hover and selection markers, fly to the station.
    pub fn stations() -> Self {
        Self {
            layer: EngineLayerId::new(STATION_LAYER),
            hover_layer: Some(EngineLayerId::new(STATION_HIGHLIGHT_LAYER)),
            selected_layer: Some(EngineLayerId::new(STATION_SELECTED_LAYER)),
            id_key: STATION_ID_KEY.to_string(),
            camera: CameraPolicy::FlyTo {
                zoom: STATION_FLY_ZOOM,
            },
        }
    }

    /// Shift lines: selection only narrows the shift filters, the view fits the shift.
    pub fn shifts() -> Self {
        Self {
            layer: EngineLayerId::new(SHIFT_LAYER),
            hover_layer: None,
            selected_layer: None,
            id_key: "shift_id".to_string(),
            camera: CameraPolicy::FitBounds {
                padding: SHIFT_FIT_PADDING,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionPhase {
    Idle,
    Hovered(FeatureId),
    Selected(FeatureId),
}

/// Hover/selection state machine of one interactive layer.
///
/// ```text
/// Idle --enter--> Hovered --leave--> Idle
/// Idle|Hovered --click feature--> Selected --click elsewhere|close--> Idle
/// ```
///
/// Replacing a selection issues a single filter update for the new id.
#[derive(Debug)]
pub struct InteractionBridge {
    target: InteractionTarget,
    selection: SelectionState,
    hovered: Option<FeatureId>,
}

impl InteractionBridge {
    pub fn new(target: InteractionTarget) -> Self {
        Self::with_selection(target, SelectionState::new())
    }

    pub fn with_selection(target: InteractionTarget, selection: SelectionState) -> Self {
        Self {
            target,
            selection,
            hovered: None,
        }
    }

    pub fn target(&self) -> &InteractionTarget {
        &self.target
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn selected(&self) -> Option<FeatureId> {
        self.selection.selected()
    }

    pub fn phase(&self) -> InteractionPhase {
        match (self.selection.selected(), &self.hovered) {
            (Some(id), _) => InteractionPhase::Selected(id),
            (None, Some(id)) => InteractionPhase::Hovered(id.clone()),
            (None, None) => InteractionPhase::Idle,
        }
    }

    fn feature_id(&self, feature: &RenderedFeature) -> Option<FeatureId> {
        feature
            .property_id(&self.target.id_key)
            .or_else(|| feature.id.clone())
    }

    fn id_filter(&self, id: Option<&FeatureId>) -> Expression {
        match id {
            Some(id) => Expression::eq(self.target.id_key.as_str(), id.to_json()),
            None => Expression::match_nothing(self.target.id_key.as_str()),
        }
    }

    pub fn pointer_enter<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        features: &[RenderedFeature],
    ) -> Result<(), EngineError> {
        engine.set_cursor(Cursor::Pointer);
        let id = features.first().and_then(|f| self.feature_id(f));
        if id == self.hovered {
            return Ok(());
        }
        if let Some(layer) = &self.target.hover_layer {
            engine.set_filter(layer, &self.id_filter(id.as_ref()))?;
        }
        self.hovered = id;
        Ok(())
    }

    pub fn pointer_leave<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
    ) -> Result<(), EngineError> {
        engine.set_cursor(Cursor::Default);
        if self.hovered.take().is_some() {
            if let Some(layer) = &self.target.hover_layer {
                engine.set_filter(layer, &self.id_filter(None))?;
            }
        }
        Ok(())
    }

    /// Handles a map click: selects the topmost feature of the target layer under
    /// `point`, or clears the selection when there is none.
    pub fn click<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        point: ScreenPoint,
        lng_lat: LngLat,
    ) -> Result<SelectionChange, EngineError> {
        let hits = engine.query_rendered_features(point, std::slice::from_ref(&self.target.layer));
        match hits.first() {
            Some(feature) => self.select(engine, feature, lng_lat),
            None => self.close(engine),
        }
    }

    /// Selects `feature`, replacing any previous selection in one filter update.
    pub fn select<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        feature: &RenderedFeature,
        fallback_center: LngLat,
    ) -> Result<SelectionChange, EngineError> {
        let Some(id) = self.feature_id(feature) else {
            debug!(layer = %feature.layer, key = %self.target.id_key, "clicked feature has no id");
            return Ok(SelectionChange {
                previous: self.selected(),
                current: self.selected(),
            });
        };
        if let Some(layer) = &self.target.selected_layer {
            engine.set_filter(layer, &self.id_filter(Some(&id)))?;
        }
        let change = self.selection.select(id);
        match self.target.camera {
            CameraPolicy::FlyTo { zoom } => engine.move_camera(CameraMove::FlyTo {
                center: feature.anchor.unwrap_or(fallback_center),
                zoom: Some(zoom),
            }),
            CameraPolicy::FitBounds { padding } => {
                if let Some(bounds) = feature.bounds {
                    engine.move_camera(CameraMove::FitBounds { bounds, padding });
                }
            }
            CameraPolicy::Stay => {}
        }
        Ok(change)
    }

    /// Clears the selection; a no-op when nothing is selected.
    pub fn close<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
    ) -> Result<SelectionChange, EngineError> {
        if self.selection.selected().is_none() {
            return Ok(SelectionChange {
                previous: None,
                current: None,
            });
        }
        if let Some(layer) = &self.target.selected_layer {
            engine.set_filter(layer, &self.id_filter(None))?;
        }
        Ok(self.selection.clear())
    }

    /// Re-issues the highlight filters after the target layers were rebuilt.
    pub fn reapply<E: MapEngine + ?Sized>(&self, engine: &mut E) -> Result<(), EngineError> {
        if let (Some(layer), Some(id)) = (&self.target.selected_layer, self.selection.selected()) {
            engine.set_filter(layer, &self.id_filter(Some(&id)))?;
        }
        if let (Some(layer), Some(id)) = (&self.target.hover_layer, &self.hovered) {
            engine.set_filter(layer, &self.id_filter(Some(id)))?;
        }
        Ok(())
    }
}
