use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use transit_proto::protocol::directory_page;
use transit_proto::{FeedKey, Outage, Route, Station};

use crate::auth::Identity;
use crate::favorites::FavoritesState;
use crate::poller::FeedState;
use crate::reference::{LoadState, ReferenceState};
use crate::selection::Focus;

/// Read-only view of everything a dashboard renders.
///
/// Built from the three component states. Views never mutate it; they call
/// back into `SyncContext` instead.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub feed: Option<FeedKey>,
    pub stations: Vec<Station>,
    pub stations_loading: bool,
    pub stations_error: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub favorites: BTreeSet<String>,
    pub favorites_pending: BTreeSet<String>,
    pub favorites_loading: bool,
    pub favorites_error: Option<String>,
    pub identity: Option<Identity>,
    pub focus: Option<Focus>,
    /// Every station in the network, for the directory list.
    pub directory: LoadState<Vec<Station>>,
    pub outages: LoadState<Vec<Outage>>,
}

impl Snapshot {
    /// Favorites only count for the identity they were loaded for, so a
    /// set that belongs to someone else reads as empty even before the
    /// store has processed the transition. The favorites error follows the
    /// same rule, except that a signed-out store still reports its own
    /// (a favorite attempted while signed out).
    pub(crate) fn compose(
        feed: &FeedState,
        favorites: &FavoritesState,
        focus: &Option<Focus>,
        reference: &ReferenceState,
        identity: Option<Identity>,
    ) -> Self {
        let same = favorites.identity == identity;
        let owned = same && identity.is_some();
        Self {
            feed: feed.feed,
            stations: feed.stations.clone(),
            stations_loading: feed.loading,
            stations_error: feed.error.clone(),
            fetched_at: feed.fetched_at,
            favorites: if owned {
                favorites.favorites.clone()
            } else {
                BTreeSet::new()
            },
            favorites_pending: if owned {
                favorites.pending()
            } else {
                BTreeSet::new()
            },
            favorites_loading: owned && favorites.loading,
            favorites_error: favorites.error.clone().filter(|_| same),
            identity,
            focus: focus.clone(),
            directory: reference.directory.clone(),
            outages: reference.outages.clone(),
        }
    }

    pub fn is_favorite(&self, stop_id: &str) -> bool {
        self.favorites.contains(stop_id)
    }

    /// Favorites resolved against the current collection, in id order.
    /// Ids the collection does not carry are skipped.
    pub fn favorite_stations(&self) -> Vec<&Station> {
        self.favorites
            .iter()
            .filter_map(|id| self.stations.iter().find(|s| &s.stop_id == id))
            .collect()
    }

    pub fn station(&self, stop_id: &str) -> Option<&Station> {
        self.stations.iter().find(|s| s.stop_id == stop_id)
    }

    pub fn focused_id(&self) -> Option<&str> {
        self.focus.as_ref().map(|f| f.station.stop_id.as_str())
    }

    /// Directory stations serving `route` (all when `None`), one page.
    pub fn directory_page(&self, route: Option<Route>) -> Vec<&Station> {
        directory_page(&self.directory.data, route)
    }
}
