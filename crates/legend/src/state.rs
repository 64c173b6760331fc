use std::collections::BTreeSet;
use std::sync::Arc;

use foundation::{EngineLayerId, GroupId, LayerId};
use serde::{Deserialize, Serialize};

use crate::error::LegendError;
use crate::symbology::{LegendKind, SymbologyEntry};

/// A logical, user-togglable layer of the legend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegendLayer {
    pub id: LayerId,
    pub label: String,
    pub expanded: bool,
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(rename = "type")]
    pub kind: LegendKind,
    #[serde(default)]
    pub symbology: Vec<SymbologyEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_layers: Option<Vec<EngineLayerId>>,
}

impl LegendLayer {
    /// Engine layers driven by this legend entry; `[id]` when `mapLayers` is absent.
    pub fn engine_layers(&self) -> Vec<EngineLayerId> {
        match &self.map_layers {
            Some(ids) => ids.clone(),
            None => vec![EngineLayerId::from(&self.id)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegendGroup {
    pub id: GroupId,
    pub label: String,
    pub expanded: bool,
    pub layers: Vec<Arc<LegendLayer>>,
}

impl LegendGroup {
    pub fn layer(&self, id: &LayerId) -> Option<&LegendLayer> {
        self.layers.iter().find(|l| &l.id == id).map(Arc::as_ref)
    }
}

/// User actions on the legend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegendAction {
    ToggleVisibility { group: GroupId, layer: LayerId },
    ToggleExpandedLayer { group: GroupId, layer: LayerId },
    ToggleExpandedGroup { group: GroupId },
    TogglePanel,
}

impl LegendAction {
    pub fn toggle_visibility(group: impl Into<GroupId>, layer: impl Into<LayerId>) -> Self {
        LegendAction::ToggleVisibility {
            group: group.into(),
            layer: layer.into(),
        }
    }

    pub fn toggle_expanded_layer(group: impl Into<GroupId>, layer: impl Into<LayerId>) -> Self {
        LegendAction::ToggleExpandedLayer {
            group: group.into(),
            layer: layer.into(),
        }
    }

    pub fn toggle_expanded_group(group: impl Into<GroupId>) -> Self {
        LegendAction::ToggleExpandedGroup {
            group: group.into(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Immutable legend tree: groups → layers → visibility/expansion flags.
///
/// Every update returns a new state. Unaffected groups and layers are shared with the
/// previous state (`Arc::ptr_eq` holds for them). Group and layer order is the config order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegendState {
    groups: Vec<Arc<LegendGroup>>,
    #[serde(default = "default_true")]
    panel_open: bool,
}

impl LegendState {
    /// Builds a validated state. Group ids are unique, layer ids are unique per group and
    /// explicit `mapLayers` lists are non-empty.
    pub fn new(groups: Vec<LegendGroup>) -> Result<Self, LegendError> {
        let state = Self {
            groups: groups.into_iter().map(Arc::new).collect(),
            panel_open: true,
        };
        state.validate()?;
        Ok(state)
    }

    pub fn from_json(json: &str) -> Result<Self, LegendError> {
        let state: Self =
            serde_json::from_str(json).map_err(|e| LegendError::Config(e.to_string()))?;
        state.validate()?;
        Ok(state)
    }

    fn validate(&self) -> Result<(), LegendError> {
        let mut groups = BTreeSet::new();
        for g in &self.groups {
            if !groups.insert(&g.id) {
                return Err(LegendError::DuplicateGroup(g.id.clone()));
            }
            let mut layers = BTreeSet::new();
            for l in &g.layers {
                if !layers.insert(&l.id) {
                    return Err(LegendError::DuplicateLayer {
                        group: g.id.clone(),
                        layer: l.id.clone(),
                    });
                }
                if l.map_layers.as_ref().is_some_and(Vec::is_empty) {
                    return Err(LegendError::EmptyMapLayers(l.id.clone()));
                }
            }
        }
        Ok(())
    }

    pub fn groups(&self) -> &[Arc<LegendGroup>] {
        &self.groups
    }

    pub fn panel_open(&self) -> bool {
        self.panel_open
    }

    pub fn group(&self, id: &GroupId) -> Option<&LegendGroup> {
        self.groups.iter().find(|g| &g.id == id).map(Arc::as_ref)
    }

    pub fn layer(&self, group: &GroupId, layer: &LayerId) -> Option<&LegendLayer> {
        self.group(group)?.layer(layer)
    }

    /// All layers in display order, with their group id.
    pub fn layers(&self) -> impl Iterator<Item = (&GroupId, &LegendLayer)> + '_ {
        self.groups
            .iter()
            .flat_map(|g| g.layers.iter().map(move |l| (&g.id, l.as_ref())))
    }

    /// Desired visibility for every engine layer referenced by the legend.
    pub fn engine_visibility(&self) -> Vec<(EngineLayerId, bool)> {
        self.layers()
            .flat_map(|(_, l)| l.engine_layers().into_iter().map(move |id| (id, l.visible)))
            .collect()
    }

    /// Applies `action`, returning the next state. Unknown references fail and leave
    /// `self` untouched.
    pub fn reduce(&self, action: &LegendAction) -> Result<LegendState, LegendError> {
        match action {
            LegendAction::ToggleVisibility { group, layer } => {
                self.update_layer(group, layer, |l| l.visible = !l.visible)
            }
            LegendAction::ToggleExpandedLayer { group, layer } => {
                self.update_layer(group, layer, |l| l.expanded = !l.expanded)
            }
            LegendAction::ToggleExpandedGroup { group } => {
                self.update_group(group, |g| g.expanded = !g.expanded)
            }
            LegendAction::TogglePanel => Ok(Self {
                groups: self.groups.clone(),
                panel_open: !self.panel_open,
            }),
        }
    }

    fn group_index(&self, group: &GroupId) -> Result<usize, LegendError> {
        self.groups
            .iter()
            .position(|g| &g.id == group)
            .ok_or_else(|| LegendError::UnknownGroup(group.clone()))
    }

    fn update_group(
        &self,
        group: &GroupId,
        f: impl FnOnce(&mut LegendGroup),
    ) -> Result<LegendState, LegendError> {
        let gi = self.group_index(group)?;
        let mut next_group = LegendGroup::clone(&self.groups[gi]);
        f(&mut next_group);

        let mut groups = self.groups.clone();
        groups[gi] = Arc::new(next_group);
        Ok(Self {
            groups,
            panel_open: self.panel_open,
        })
    }

    fn update_layer(
        &self,
        group: &GroupId,
        layer: &LayerId,
        f: impl FnOnce(&mut LegendLayer),
    ) -> Result<LegendState, LegendError> {
        let gi = self.group_index(group)?;
        let li = self.groups[gi]
            .layers
            .iter()
            .position(|l| &l.id == layer)
            .ok_or_else(|| LegendError::UnknownLayer {
                group: group.clone(),
                layer: layer.clone(),
            })?;

        self.update_group(group, |g| {
            let mut next_layer = LegendLayer::clone(&g.layers[li]);
            f(&mut next_layer);
            g.layers[li] = Arc::new(next_layer);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{LegendAction, LegendGroup, LegendLayer, LegendState};
    use crate::error::LegendError;
    use crate::symbology::LegendKind;
    use foundation::{EngineLayerId, GroupId, LayerId};
    use std::sync::Arc;

    fn layer(id: &str, visible: bool) -> LegendLayer {
        LegendLayer {
            id: LayerId::new(id),
            label: id.to_uppercase(),
            expanded: true,
            visible,
            tooltip: None,
            kind: LegendKind::Polygon,
            symbology: Vec::new(),
            map_layers: None,
        }
    }

    fn group(id: &str, layers: Vec<LegendLayer>) -> LegendGroup {
        LegendGroup {
            id: GroupId::new(id),
            label: id.to_string(),
            expanded: true,
            layers: layers.into_iter().map(Arc::new).collect(),
        }
    }

    fn sample() -> LegendState {
        LegendState::new(vec![
            group("g1", vec![layer("a", true), layer("b", false)]),
            group("g2", vec![layer("a", true), layer("c", true)]),
        ])
        .unwrap()
    }

    fn visible(s: &LegendState, g: &str, l: &str) -> bool {
        s.layer(&GroupId::new(g), &LayerId::new(l)).unwrap().visible
    }

    #[test]
    fn toggle_visibility_flips_exactly_one_layer() {
        let s0 = sample();
        let s1 = s0
            .reduce(&LegendAction::toggle_visibility("g1", "a"))
            .unwrap();
        assert!(!visible(&s1, "g1", "a"));
        assert!(!visible(&s1, "g1", "b"));
        // Same layer id in another group is a different layer.
        assert!(visible(&s1, "g2", "a"));
        assert!(visible(&s1, "g2", "c"));
        // Previous state is untouched.
        assert!(visible(&s0, "g1", "a"));
    }

    #[test]
    fn unaffected_branches_are_shared() {
        let s0 = sample();
        let s1 = s0
            .reduce(&LegendAction::toggle_visibility("g1", "a"))
            .unwrap();
        assert!(Arc::ptr_eq(&s0.groups()[1], &s1.groups()[1]));
        assert!(!Arc::ptr_eq(&s0.groups()[0], &s1.groups()[0]));
        assert!(Arc::ptr_eq(&s0.groups()[0].layers[1], &s1.groups()[0].layers[1]));
    }

    #[test]
    fn visibility_is_xor_of_toggle_count() {
        let s0 = sample();
        let targets = [("g1", "a"), ("g2", "c"), ("g1", "b"), ("g2", "a")];
        let mut counts = [0usize; 4];
        let mut s = s0.clone();
        // Deterministic pseudo-random sequence of toggles.
        let mut x: u32 = 0x9e37_79b9;
        for _ in 0..101 {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            let i = (x % 4) as usize;
            counts[i] += 1;
            let (g, l) = targets[i];
            s = s.reduce(&LegendAction::toggle_visibility(g, l)).unwrap();
        }
        for (i, (g, l)) in targets.iter().enumerate() {
            assert_eq!(
                visible(&s, g, l),
                visible(&s0, g, l) ^ (counts[i] % 2 == 1),
                "{g}/{l}"
            );
        }
    }

    #[test]
    fn expansion_toggles_are_independent_of_visibility() {
        let s = sample()
            .reduce(&LegendAction::toggle_expanded_layer("g1", "b"))
            .unwrap()
            .reduce(&LegendAction::toggle_expanded_group("g2"))
            .unwrap();
        let b = s.layer(&GroupId::new("g1"), &LayerId::new("b")).unwrap();
        assert!(!b.expanded);
        assert!(!b.visible);
        assert!(!s.group(&GroupId::new("g2")).unwrap().expanded);
        assert!(s.group(&GroupId::new("g1")).unwrap().expanded);
    }

    #[test]
    fn unknown_references_fail() {
        let s = sample();
        assert_eq!(
            s.reduce(&LegendAction::toggle_visibility("nope", "a")),
            Err(LegendError::UnknownGroup(GroupId::new("nope")))
        );
        assert_eq!(
            s.reduce(&LegendAction::toggle_expanded_layer("g1", "c")),
            Err(LegendError::UnknownLayer {
                group: GroupId::new("g1"),
                layer: LayerId::new("c"),
            })
        );
        assert_eq!(
            s.reduce(&LegendAction::toggle_expanded_group("g3")),
            Err(LegendError::UnknownGroup(GroupId::new("g3")))
        );
    }

    #[test]
    fn engine_layers_default_to_layer_id() {
        let mut l = layer("GWVersalz-Atlas25a", true);
        assert_eq!(l.engine_layers(), vec![EngineLayerId::new("GWVersalz-Atlas25a")]);
        l.map_layers = Some(vec![
            EngineLayerId::new("GWVersalz-Atlas25a"),
            EngineLayerId::new("GWVersalz-Atlas25a-line"),
        ]);
        assert_eq!(l.engine_layers().len(), 2);
    }

    #[test]
    fn rejects_duplicates_and_empty_map_layers() {
        assert_eq!(
            LegendState::new(vec![group("g", vec![]), group("g", vec![])]),
            Err(LegendError::DuplicateGroup(GroupId::new("g")))
        );
        assert!(matches!(
            LegendState::new(vec![group("g", vec![layer("a", true), layer("a", false)])]),
            Err(LegendError::DuplicateLayer { .. })
        ));
        let mut empty = layer("x", true);
        empty.map_layers = Some(Vec::new());
        assert_eq!(
            LegendState::new(vec![group("g", vec![empty])]),
            Err(LegendError::EmptyMapLayers(LayerId::new("x")))
        );
    }

    #[test]
    fn panel_toggle_keeps_groups() {
        let s0 = sample();
        let s1 = s0.reduce(&LegendAction::TogglePanel).unwrap();
        assert!(!s1.panel_open());
        assert!(Arc::ptr_eq(&s0.groups()[0], &s1.groups()[0]));
    }
}
