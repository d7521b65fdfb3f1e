//! Composition root for the sync core.
//!
//! `SyncContext` owns the poller, the favorites store, the selection and the
//! one-shot reference data, and runs the wiring between them:
//!
//! - identity transitions reset and refresh favorites;
//! - every applied station collection re-resolves the focus.
//!
//! Views read [`Snapshot`]s and call the mutating methods here; they never
//! reach into the components directly.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use transit_proto::config::{Config, MissingFocus};
use transit_proto::{FeedKey, Station};

use crate::api::TransitApi;
use crate::auth::AuthSession;
use crate::error::SyncError;
use crate::favorites::{FavoritesState, FavoritesStore, MutationOutcome};
use crate::poller::{FeedState, RemoteFeedPoller};
use crate::reference::{ReferenceData, ReferenceState};
use crate::selection::{Focus, SelectionCoordinator};
use crate::snapshot::Snapshot;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub poll_interval: Duration,
    /// Feed to start polling right away, if any.
    pub initial_feed: Option<FeedKey>,
    pub on_missing: MissingFocus,
    /// Load the station directory and outages once at startup.
    pub load_reference: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            initial_feed: Some(FeedKey::default()),
            on_missing: MissingFocus::default(),
            load_reference: true,
        }
    }
}

impl From<&Config> for SyncOptions {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.polling.interval(),
            initial_feed: Some(config.polling.default_feed),
            on_missing: config.selection.on_missing,
            load_reference: true,
        }
    }
}

pub struct SyncContext<A, S> {
    auth: Arc<S>,
    poller: RemoteFeedPoller<A>,
    favorites: Arc<FavoritesStore<A, S>>,
    selection: Arc<SelectionCoordinator>,
    reference: Arc<ReferenceData<A>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<A: TransitApi, S: AuthSession> SyncContext<A, S> {
    /// Build the components and start the wiring tasks. Must be called from
    /// inside a tokio runtime.
    pub fn new(api: Arc<A>, auth: Arc<S>, options: SyncOptions) -> Self {
        let poller = RemoteFeedPoller::new(api.clone(), options.poll_interval);
        let favorites = Arc::new(FavoritesStore::new(api.clone(), auth.clone()));
        let selection = Arc::new(SelectionCoordinator::new(options.on_missing));
        let reference = Arc::new(ReferenceData::new(api));

        let mut tasks = vec![
            spawn_identity_watch(auth.clone(), favorites.clone()),
            spawn_focus_reconcile(poller.subscribe(), selection.clone()),
        ];
        if options.load_reference {
            tasks.push(reference.clone().spawn_load());
        }

        if let Some(feed) = options.initial_feed {
            poller.start(feed);
        }

        Self {
            auth,
            poller,
            favorites,
            selection,
            reference,
            tasks: Mutex::new(tasks),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::compose(
            &self.poller.state(),
            &self.favorites.state(),
            &self.selection.focused(),
            &self.reference.state(),
            self.auth.current(),
        )
    }

    /// Stream of snapshots, one per component change.
    pub fn subscribe(&self) -> SnapshotStream<S> {
        SnapshotStream {
            feed: self.poller.subscribe(),
            favorites: self.favorites.subscribe(),
            focus: self.selection.subscribe(),
            reference: self.reference.subscribe(),
            auth: self.auth.clone(),
        }
    }

    pub fn feed(&self) -> Option<FeedKey> {
        self.poller.active_feed()
    }

    pub fn set_feed_key(&self, feed: FeedKey) {
        info!("[context] feed -> {}", feed);
        self.poller.start(feed);
    }

    pub async fn add_favorite(&self, stop_id: &str) -> Result<MutationOutcome, SyncError> {
        self.favorites.add(stop_id).await
    }

    pub async fn delete_favorite(&self, stop_id: &str) -> Result<MutationOutcome, SyncError> {
        self.favorites.delete(stop_id).await
    }

    pub async fn toggle_favorite(&self, stop_id: &str) -> Result<MutationOutcome, SyncError> {
        self.favorites.toggle(stop_id).await
    }

    pub async fn refresh_favorites(&self) -> Result<(), SyncError> {
        self.favorites.refresh().await
    }

    pub async fn reload_directory(&self) -> Result<(), SyncError> {
        Ok(self.reference.load_directory().await?)
    }

    pub async fn reload_outages(&self) -> Result<(), SyncError> {
        Ok(self.reference.load_outages().await?)
    }

    pub fn set_focus(&self, station: Station) {
        self.selection.set_focus(station);
    }

    pub fn clear_focus(&self) {
        self.selection.clear_focus();
    }

    /// Focus a station of the current collection by id.
    pub fn focus_stop(&self, stop_id: &str) -> Result<(), SyncError> {
        let station = self
            .poller
            .state()
            .stations
            .into_iter()
            .find(|s| s.stop_id == stop_id)
            .ok_or_else(|| SyncError::UnknownStation(stop_id.to_string()))?;
        self.selection.set_focus(station);
        Ok(())
    }

    /// Stop polling and tear down the wiring tasks.
    pub fn shutdown(&self) {
        self.poller.stop();
        self.abort_tasks();
        info!("[context] shut down");
    }
}

impl<A, S> SyncContext<A, S> {
    fn abort_tasks(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            task.abort();
        }
    }
}

impl<A, S> Drop for SyncContext<A, S> {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

/// Receives component changes and turns them into snapshots.
pub struct SnapshotStream<S> {
    feed: watch::Receiver<FeedState>,
    favorites: watch::Receiver<FavoritesState>,
    focus: watch::Receiver<Option<Focus>>,
    reference: watch::Receiver<ReferenceState>,
    auth: Arc<S>,
}

impl<S: AuthSession> SnapshotStream<S> {
    /// Snapshot of the latest state; marks everything as seen.
    pub fn current(&mut self) -> Snapshot {
        let feed = self.feed.borrow_and_update().clone();
        let favorites = self.favorites.borrow_and_update().clone();
        let focus = self.focus.borrow_and_update().clone();
        let reference = self.reference.borrow_and_update().clone();
        Snapshot::compose(&feed, &favorites, &focus, &reference, self.auth.current())
    }

    /// Wait for the next change. `None` once a component has gone away.
    pub async fn next(&mut self) -> Option<Snapshot> {
        let changed = tokio::select! {
            r = self.feed.changed() => r,
            r = self.favorites.changed() => r,
            r = self.focus.changed() => r,
            r = self.reference.changed() => r,
        };
        changed.ok()?;
        Some(self.current())
    }
}

fn spawn_identity_watch<A: TransitApi, S: AuthSession>(
    auth: Arc<S>,
    favorites: Arc<FavoritesStore<A, S>>,
) -> JoinHandle<()> {
    // Subscribe before spawning so no transition can slip through.
    let mut events = auth.subscribe();
    tokio::spawn(async move {
        let mut refresh = auth
            .current()
            .is_some()
            .then(|| spawn_refresh(favorites.clone()));

        loop {
            let identity = match events.recv().await {
                Ok(identity) => identity,
                Err(RecvError::Lagged(n)) => {
                    warn!("[context] missed {} identity events, resyncing", n);
                    auth.current()
                }
                Err(RecvError::Closed) => break,
            };
            match &identity {
                Some(id) => info!("[context] identity changed to {}", id.user_id),
                None => info!("[context] identity cleared"),
            }
            favorites.on_identity_changed(identity.as_ref());
            if let Some(previous) = refresh.take() {
                previous.abort();
            }
            refresh = Some(spawn_refresh(favorites.clone()));
        }

        if let Some(task) = refresh {
            task.abort();
        }
    })
}

fn spawn_refresh<A: TransitApi, S: AuthSession>(
    favorites: Arc<FavoritesStore<A, S>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // Failures are recorded in the store state.
        let _ = favorites.refresh().await;
    })
}

fn spawn_focus_reconcile(
    mut feed: watch::Receiver<FeedState>,
    selection: Arc<SelectionCoordinator>,
) -> JoinHandle<()> {
    let mut seen = feed.borrow_and_update().revision;
    tokio::spawn(async move {
        while feed.changed().await.is_ok() {
            let applied = {
                let state = feed.borrow_and_update();
                if state.revision == seen {
                    None
                } else {
                    seen = state.revision;
                    Some(state.stations.clone())
                }
            };
            if let Some(stations) = applied {
                if selection.reconcile(&stations) {
                    debug!("[context] focus re-resolved against {} stations", stations.len());
                }
            }
        }
    })
}
