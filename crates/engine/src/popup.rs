use foundation::{EngineLayerId, FeatureId, LngLat, ScreenPoint};
use style::{Expression, POPUP_LAYERS, clear_highlight, feature_id_key, highlight_id};

use crate::error::EngineError;
use crate::map::{CameraMove, MapEngine, Popup};

/// The feature a popup was opened for.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupHit {
    pub layer: EngineLayerId,
    pub id: Option<FeatureId>,
}

/// Click-to-inspect across several layers.
///
/// The topmost hit gets its `<layer>Highlight` filtered to `["in", "<layer>Id", id]`,
/// every other highlight is cleared, a popup opens at the click and the camera follows.
/// A click on empty map clears all highlights.
#[derive(Debug, Clone)]
pub struct PopupBridge {
    layers: Vec<EngineLayerId>,
}

impl Default for PopupBridge {
    fn default() -> Self {
        Self::new(POPUP_LAYERS)
    }
}

impl PopupBridge {
    pub fn new<I, S>(layers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<EngineLayerId>,
    {
        Self {
            layers: layers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn layers(&self) -> &[EngineLayerId] {
        &self.layers
    }

    pub fn click<E: MapEngine + ?Sized>(
        &self,
        engine: &mut E,
        point: ScreenPoint,
        lng_lat: LngLat,
    ) -> Result<Option<PopupHit>, EngineError> {
        let hits = engine.query_rendered_features(point, &self.layers);
        let Some(top) = hits.into_iter().next() else {
            self.clear(engine)?;
            return Ok(None);
        };

        let key = feature_id_key(top.layer.as_str());
        let id = top.property_id(&key);
        for layer in &self.layers {
            let highlight = highlight_id(layer.as_str());
            if !engine.has_layer(&highlight) {
                continue;
            }
            match (&id, layer == &top.layer) {
                (Some(id), true) => {
                    engine.set_filter(&highlight, &Expression::in_list(key.as_str(), [id.to_json()]))?
                }
                _ => engine.set_filter(&highlight, &clear_highlight(layer.as_str()))?,
            }
        }

        engine.show_popup(Popup {
            at: lng_lat,
            layer: top.layer.clone(),
            properties: top.properties.clone(),
        });
        engine.move_camera(CameraMove::FlyTo {
            center: lng_lat,
            zoom: None,
        });
        Ok(Some(PopupHit { layer: top.layer, id }))
    }

    /// Clears every highlight filter and closes open popups.
    pub fn clear<E: MapEngine + ?Sized>(&self, engine: &mut E) -> Result<(), EngineError> {
        for layer in &self.layers {
            let highlight = highlight_id(layer.as_str());
            if engine.has_layer(&highlight) {
                engine.set_filter(&highlight, &clear_highlight(layer.as_str()))?;
            }
        }
        engine.close_popups();
        Ok(())
    }
}
