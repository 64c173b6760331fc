use std::collections::BTreeSet;

use foundation::EngineLayerId;
use legend::{LegendState, ProcessReport};
use style::Visibility;
use tracing::debug;

use crate::error::EngineError;
use crate::map::MapEngine;

/// What one [`VisibilitySynchronizer::apply`] call did per engine layer.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub applied: Vec<EngineLayerId>,
    pub unchanged: Vec<EngineLayerId>,
    /// Layers not present yet; re-applied after the next style load.
    pub deferred: Vec<EngineLayerId>,
}

impl SyncOutcome {
    fn merge(&mut self, other: SyncOutcome) {
        self.applied.extend(other.applied);
        self.unchanged.extend(other.unchanged);
        self.deferred.extend(other.deferred);
    }
}

/// Applies legend visibility to engine layers.
///
/// Idempotent: a layer already in the requested state gets no engine call. Layers the
/// engine does not have yet are skipped and remembered in [`Self::deferred`].
#[derive(Debug, Default)]
pub struct VisibilitySynchronizer {
    deferred: BTreeSet<EngineLayerId>,
}

impl VisibilitySynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deferred(&self) -> impl Iterator<Item = &EngineLayerId> + '_ {
        self.deferred.iter()
    }

    pub fn apply<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        layers: &[EngineLayerId],
        visible: bool,
    ) -> Result<SyncOutcome, EngineError> {
        if engine.is_removed() {
            return Err(EngineError::Removed);
        }
        let target = Visibility::from_visible(visible);
        let mut outcome = SyncOutcome::default();
        for id in layers {
            match engine.visibility(id) {
                None => {
                    debug!(layer = %id, "engine layer missing, deferring visibility");
                    self.deferred.insert(id.clone());
                    outcome.deferred.push(id.clone());
                }
                Some(current) if current == target => {
                    self.deferred.remove(id);
                    outcome.unchanged.push(id.clone());
                }
                Some(_) => match engine.set_visibility(id, target) {
                    Ok(()) => {
                        self.deferred.remove(id);
                        outcome.applied.push(id.clone());
                    }
                    Err(e) if e.is_transient() => {
                        debug!(layer = %id, error = %e, "visibility skipped");
                        self.deferred.insert(id.clone());
                        outcome.deferred.push(id.clone());
                    }
                    Err(e) => return Err(e),
                },
            }
        }
        Ok(outcome)
    }

    /// Applies the visibility updates produced by one legend processing pass, in order.
    pub fn apply_report<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        report: &ProcessReport,
    ) -> Result<SyncOutcome, EngineError> {
        let mut outcome = SyncOutcome::default();
        for (layers, visible) in report.visibility_updates() {
            outcome.merge(self.apply(engine, layers, visible)?);
        }
        Ok(outcome)
    }

    /// Re-applies the whole legend, typically right after the style finished loading.
    pub fn apply_legend<E: MapEngine + ?Sized>(
        &mut self,
        engine: &mut E,
        legend: &LegendState,
    ) -> Result<SyncOutcome, EngineError> {
        let mut outcome = SyncOutcome::default();
        for (id, visible) in legend.engine_visibility() {
            outcome.merge(self.apply(engine, std::slice::from_ref(&id), visible)?);
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::VisibilitySynchronizer;
    use crate::headless::{EngineCall, HeadlessEngine};
    use crate::map::{MapEngine, add_bundle};
    use foundation::EngineLayerId;
    use legend::{LegendStore, presets};
    use style::{Visibility, gps_point_layers, spray_layers};

    fn ids(raw: &[&str]) -> Vec<EngineLayerId> {
        raw.iter().map(|s| EngineLayerId::new(*s)).collect()
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let mut engine = HeadlessEngine::with_style(["land"]);
        add_bundle(&mut engine, &spray_layers("u", None)).unwrap();
        engine.take_calls();
        let mut sync = VisibilitySynchronizer::new();
        let layers = ids(&["Spray", "SprayHighlight"]);

        let first = sync.apply(&mut engine, &layers, true).unwrap();
        let after_first = engine.take_calls();
        let second = sync.apply(&mut engine, &layers, true).unwrap();

        assert_eq!(first.applied, layers);
        assert_eq!(after_first.len(), 2);
        assert_eq!(second.unchanged, layers);
        assert!(engine.calls().is_empty());
        assert_eq!(
            engine.visibility(&EngineLayerId::new("SprayHighlight")),
            Some(Visibility::Visible)
        );
    }

    #[test]
    fn missing_layers_are_deferred_not_errors() {
        let mut engine = HeadlessEngine::new();
        let mut sync = VisibilitySynchronizer::new();
        let outcome = sync.apply(&mut engine, &ids(&["GPSPoint"]), false).unwrap();
        assert_eq!(outcome.deferred, ids(&["GPSPoint"]));
        assert_eq!(sync.deferred().count(), 1);

        engine.finish_style_load();
        add_bundle(&mut engine, &gps_point_layers("u", None)).unwrap();
        sync.apply(&mut engine, &ids(&["GPSPoint"]), false).unwrap();
        assert_eq!(sync.deferred().count(), 0);
        assert_eq!(
            engine.visibility(&EngineLayerId::new("GPSPoint")),
            Some(Visibility::None)
        );
    }

    #[test]
    fn legend_toggle_reaches_every_map_layer() {
        let mut engine = HeadlessEngine::with_style(["land"]);
        add_bundle(&mut engine, &spray_layers("u", None)).unwrap();
        engine.take_calls();
        let mut store = LegendStore::new(presets::shifts().unwrap());
        store.toggle_visibility("treatment", "Spray");
        let report = store.process();

        let mut sync = VisibilitySynchronizer::new();
        sync.apply_report(&mut engine, &report).unwrap();
        assert_eq!(
            engine.calls(),
            &[
                EngineCall::SetVisibility(EngineLayerId::new("Spray"), Visibility::Visible),
                EngineCall::SetVisibility(
                    EngineLayerId::new("SprayHighlight"),
                    Visibility::Visible
                ),
            ]
        );
    }

    #[test]
    fn removed_engine_is_an_error() {
        let mut engine = HeadlessEngine::with_style(["land"]);
        engine.remove();
        let mut sync = VisibilitySynchronizer::new();
        assert!(sync.apply(&mut engine, &ids(&["Spray"]), true).is_err());
    }

    #[test]
    fn style_reload_mid_apply_defers_the_layer() {
        let mut engine = HeadlessEngine::with_style(["land"]);
        engine.reload_style();
        let mut sync = VisibilitySynchronizer::new();

        let outcome = sync.apply(&mut engine, &ids(&["land"]), false).unwrap();
        assert_eq!(outcome.deferred, ids(&["land"]));
        assert!(outcome.applied.is_empty());
        assert_eq!(sync.deferred().count(), 1);
        assert_eq!(
            engine.visibility(&EngineLayerId::new("land")),
            Some(Visibility::Visible)
        );

        engine.finish_style_load();
        let outcome = sync.apply(&mut engine, &ids(&["land"]), false).unwrap();
        assert_eq!(outcome.applied, ids(&["land"]));
        assert_eq!(sync.deferred().count(), 0);
    }
}
