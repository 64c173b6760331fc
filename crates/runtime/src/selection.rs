use foundation::FeatureId;
use tokio::sync::watch;

/// Result of a selection update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionChange {
    pub previous: Option<FeatureId>,
    pub current: Option<FeatureId>,
}

impl SelectionChange {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

/// The single selected entity of one selection domain.
///
/// Selecting a new id replaces the old one in one step; `None` means nothing is
/// selected (the detail panel collapses). Sibling components observe changes through
/// [`SelectionState::subscribe`]; a receiver only wakes when the value actually changes.
#[derive(Debug)]
pub struct SelectionState {
    tx: watch::Sender<Option<FeatureId>>,
}

impl Default for SelectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn selected(&self) -> Option<FeatureId> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<FeatureId>> {
        self.tx.subscribe()
    }

    pub fn select(&self, id: FeatureId) -> SelectionChange {
        self.replace(Some(id))
    }

    pub fn clear(&self) -> SelectionChange {
        self.replace(None)
    }

    fn replace(&self, next: Option<FeatureId>) -> SelectionChange {
        let mut previous = None;
        self.tx.send_if_modified(|current| {
            previous = current.clone();
            if *current == next {
                return false;
            }
            *current = next.clone();
            true
        });
        SelectionChange {
            previous,
            current: next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SelectionState;
    use foundation::FeatureId;

    #[test]
    fn selecting_replaces_previous() {
        let s = SelectionState::new();
        let first = s.select(FeatureId::from("X"));
        assert_eq!(first.previous, None);
        let second = s.select(FeatureId::from("Y"));
        assert_eq!(second.previous, Some(FeatureId::from("X")));
        assert_eq!(s.selected(), Some(FeatureId::from("Y")));
    }

    #[test]
    fn reselecting_same_id_is_not_a_change() {
        let s = SelectionState::new();
        s.select(FeatureId::from(3));
        let again = s.select(FeatureId::from(3));
        assert!(!again.changed());
    }

    #[tokio::test]
    async fn subscribers_see_only_real_changes() {
        let s = SelectionState::new();
        let mut rx = s.subscribe();

        s.select(FeatureId::from("A"));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Some(FeatureId::from("A")));

        s.select(FeatureId::from("A"));
        assert!(!rx.has_changed().unwrap());

        s.clear();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), None);
    }
}
