use foundation::{EngineLayerId, GroupId, LayerId};
use runtime::{ActionQueue, Seq};
use tracing::{debug, warn};

use crate::error::LegendError;
use crate::state::{LegendAction, LegendState};

/// Observable effect of one applied legend action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegendChange {
    Visibility {
        group: GroupId,
        layer: LayerId,
        visible: bool,
        engine_layers: Vec<EngineLayerId>,
    },
    LayerExpanded {
        group: GroupId,
        layer: LayerId,
        expanded: bool,
    },
    GroupExpanded {
        group: GroupId,
        expanded: bool,
    },
    Panel {
        open: bool,
    },
}

/// Outcome of [`LegendStore::process`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    pub changes: Vec<(Seq, LegendChange)>,
    pub errors: Vec<(Seq, LegendError)>,
}

impl ProcessReport {
    /// Engine-layer visibility updates implied by the applied changes, in order.
    pub fn visibility_updates(&self) -> impl Iterator<Item = (&[EngineLayerId], bool)> + '_ {
        self.changes.iter().filter_map(|(_, c)| match c {
            LegendChange::Visibility {
                visible,
                engine_layers,
                ..
            } => Some((engine_layers.as_slice(), *visible)),
            _ => None,
        })
    }
}

/// Legend state plus the queue of dispatched actions.
///
/// Actions are applied strictly in dispatch order, one at a time, each against the
/// state produced by the previous one; a failing action is logged and skipped.
#[derive(Debug)]
pub struct LegendStore {
    state: LegendState,
    queue: ActionQueue<LegendAction>,
}

impl LegendStore {
    pub fn new(state: LegendState) -> Self {
        Self {
            state,
            queue: ActionQueue::new(),
        }
    }

    pub fn state(&self) -> &LegendState {
        &self.state
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn dispatch(&mut self, action: LegendAction) -> Seq {
        self.queue.push(action)
    }

    pub fn toggle_visibility(
        &mut self,
        group: impl Into<GroupId>,
        layer: impl Into<LayerId>,
    ) -> Seq {
        self.dispatch(LegendAction::toggle_visibility(group, layer))
    }

    pub fn toggle_expanded_layer(
        &mut self,
        group: impl Into<GroupId>,
        layer: impl Into<LayerId>,
    ) -> Seq {
        self.dispatch(LegendAction::toggle_expanded_layer(group, layer))
    }

    pub fn toggle_expanded_group(&mut self, group: impl Into<GroupId>) -> Seq {
        self.dispatch(LegendAction::toggle_expanded_group(group))
    }

    /// Applies every queued action.
    pub fn process(&mut self) -> ProcessReport {
        let mut report = ProcessReport::default();
        while let Some((seq, action)) = self.queue.pop() {
            match self.state.reduce(&action) {
                Ok(next) => {
                    let change = describe(&next, &action);
                    debug!(seq = seq.0, ?change, "legend action applied");
                    self.state = next;
                    report.changes.push((seq, change));
                }
                Err(err) => {
                    warn!(seq = seq.0, %err, "legend action rejected");
                    report.errors.push((seq, err));
                }
            }
        }
        report
    }
}

// Only called with an action that `next` was successfully reduced from.
fn describe(next: &LegendState, action: &LegendAction) -> LegendChange {
    match action {
        LegendAction::ToggleVisibility { group, layer } => {
            let l = next.layer(group, layer);
            LegendChange::Visibility {
                group: group.clone(),
                layer: layer.clone(),
                visible: l.is_some_and(|l| l.visible),
                engine_layers: l.map(|l| l.engine_layers()).unwrap_or_default(),
            }
        }
        LegendAction::ToggleExpandedLayer { group, layer } => LegendChange::LayerExpanded {
            group: group.clone(),
            layer: layer.clone(),
            expanded: next.layer(group, layer).is_some_and(|l| l.expanded),
        },
        LegendAction::ToggleExpandedGroup { group } => LegendChange::GroupExpanded {
            group: group.clone(),
            expanded: next.group(group).is_some_and(|g| g.expanded),
        },
        LegendAction::TogglePanel => LegendChange::Panel {
            open: next.panel_open(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{LegendChange, LegendStore};
    use crate::error::LegendError;
    use crate::presets;
    use foundation::{EngineLayerId, GroupId, LayerId};

    #[test]
    fn rapid_toggles_are_all_applied_in_order() {
        let mut store = LegendStore::new(presets::groundwater().unwrap());
        for _ in 0..3 {
            store.toggle_visibility("Andere", "wasserschutzgebiete");
        }
        assert_eq!(store.pending(), 3);
        let report = store.process();
        assert_eq!(store.pending(), 0);

        let flags: Vec<bool> = report
            .changes
            .iter()
            .map(|(_, c)| match c {
                LegendChange::Visibility { visible, .. } => *visible,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(flags, vec![false, true, false]);
        let layer = store
            .state()
            .layer(&GroupId::new("Andere"), &LayerId::new("wasserschutzgebiete"))
            .unwrap();
        assert!(!layer.visible);
    }

    #[test]
    fn rejected_action_does_not_block_later_ones() {
        let mut store = LegendStore::new(presets::groundwater().unwrap());
        store.toggle_visibility("Andere", "missing");
        store.toggle_visibility("Andere", "GWVersalz-Atlas25a");
        let report = store.process();

        assert_eq!(report.errors.len(), 1);
        assert!(matches!(report.errors[0].1, LegendError::UnknownLayer { .. }));
        let updates: Vec<_> = report.visibility_updates().collect();
        assert_eq!(
            updates,
            vec![(
                &[
                    EngineLayerId::new("GWVersalz-Atlas25a"),
                    EngineLayerId::new("GWVersalz-Atlas25a-line"),
                ][..],
                false
            )]
        );
    }

    #[test]
    fn expansion_changes_are_reported() {
        let mut store = LegendStore::new(presets::groundwater().unwrap());
        store.toggle_expanded_group("Aktuell");
        store.toggle_expanded_layer("Aktuell", "gws-latest");
        let report = store.process();
        assert_eq!(
            report.changes.iter().map(|(_, c)| c.clone()).collect::<Vec<_>>(),
            vec![
                LegendChange::GroupExpanded {
                    group: GroupId::new("Aktuell"),
                    expanded: false,
                },
                LegendChange::LayerExpanded {
                    group: GroupId::new("Aktuell"),
                    layer: LayerId::new("gws-latest"),
                    expanded: false,
                },
            ]
        );
        assert_eq!(report.visibility_updates().count(), 0);
    }
}
