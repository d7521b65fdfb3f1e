//! The one focused station shared by list, map and detail views.

use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use transit_proto::config::MissingFocus;
use transit_proto::Station;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Focus {
    pub station: Station,
    /// The station was missing from the last applied collection and is
    /// being kept under [`MissingFocus::Keep`].
    pub stale: bool,
}

pub struct SelectionCoordinator {
    on_missing: MissingFocus,
    focus: watch::Sender<Option<Focus>>,
}

impl SelectionCoordinator {
    pub fn new(on_missing: MissingFocus) -> Self {
        Self {
            on_missing,
            focus: watch::Sender::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Focus>> {
        self.focus.subscribe()
    }

    pub fn focused(&self) -> Option<Focus> {
        self.focus.borrow().clone()
    }

    /// Focus `station`. Not checked against any collection.
    pub fn set_focus(&self, station: Station) {
        debug!("[selection] focus {}", station.stop_id);
        self.focus.send_replace(Some(Focus {
            station,
            stale: false,
        }));
    }

    pub fn clear_focus(&self) {
        if self.focus.send_replace(None).is_some() {
            debug!("[selection] focus cleared");
        }
    }

    /// Re-resolve the focus against a freshly applied collection. Returns
    /// `true` if the focus changed.
    pub fn reconcile(&self, stations: &[Station]) -> bool {
        let on_missing = self.on_missing;
        self.focus.send_if_modified(|focus| {
            let Some(current) = focus.as_ref() else {
                return false;
            };
            let fresh = stations
                .iter()
                .find(|s| s.stop_id == current.station.stop_id);
            match (fresh, on_missing) {
                (Some(fresh), _) => {
                    if current.station == *fresh && !current.stale {
                        return false;
                    }
                    *focus = Some(Focus {
                        station: fresh.clone(),
                        stale: false,
                    });
                    true
                }
                (None, MissingFocus::Clear) => {
                    debug!(
                        "[selection] {} left the collection, clearing focus",
                        current.station.stop_id
                    );
                    *focus = None;
                    true
                }
                (None, MissingFocus::Keep) => {
                    if current.stale {
                        return false;
                    }
                    let station = current.station.clone();
                    *focus = Some(Focus {
                        station,
                        stale: true,
                    });
                    true
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::station;

    #[test]
    fn test_set_focus_visible_to_every_reader_immediately() {
        let sel = SelectionCoordinator::new(MissingFocus::Clear);
        let list_view = sel.subscribe();
        let map_view = sel.subscribe();

        sel.set_focus(station("A27", "42 St"));
        assert!(list_view.has_changed().unwrap());
        assert_eq!(
            map_view.borrow().as_ref().unwrap().station.stop_id,
            "A27"
        );
        assert_eq!(sel.focused().unwrap().station.stop_id, "A27");

        sel.clear_focus();
        assert!(list_view.borrow().is_none());
    }

    #[test]
    fn test_reconcile_rebinds_to_fresh_snapshot() {
        let sel = SelectionCoordinator::new(MissingFocus::Clear);
        sel.set_focus(station("A27", "42 St"));

        let mut fresh = station("A27", "42 St");
        fresh.next_arrival = vec![1_700_000_000];
        assert!(sel.reconcile(&[station("127", "Times Sq"), fresh.clone()]));
        assert_eq!(sel.focused().unwrap().station, fresh);

        // Same data again: nothing to do.
        assert!(!sel.reconcile(&[fresh]));
    }

    #[test]
    fn test_reconcile_clears_missing_focus_by_default() {
        let sel = SelectionCoordinator::new(MissingFocus::Clear);
        sel.set_focus(station("A27", "42 St"));
        assert!(sel.reconcile(&[station("127", "Times Sq")]));
        assert!(sel.focused().is_none());
    }

    #[test]
    fn test_reconcile_keep_marks_stale_then_recovers() {
        let sel = SelectionCoordinator::new(MissingFocus::Keep);
        sel.set_focus(station("A27", "42 St"));

        assert!(sel.reconcile(&[]));
        let focus = sel.focused().unwrap();
        assert!(focus.stale);
        assert_eq!(focus.station.stop_id, "A27");
        assert!(!sel.reconcile(&[]));

        assert!(sel.reconcile(&[station("A27", "42 St")]));
        assert!(!sel.focused().unwrap().stale);
    }

    #[test]
    fn test_reconcile_without_focus_is_noop() {
        let sel = SelectionCoordinator::new(MissingFocus::Clear);
        assert!(!sel.reconcile(&[station("A27", "42 St")]));
    }
}
