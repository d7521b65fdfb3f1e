//! Per-user favorite stations with optimistic mutation.
//!
//! `add`/`delete` change the published set before the backend answers and
//! roll back if it refuses. Mutations for one station id run one at a time
//! in call order; when a queued mutation gets its turn and the backend is
//! already where the user wants it, no request is sent.
//!
//! Every identity transition bumps an epoch. Work issued under an older
//! epoch is dropped when it settles.
//!
//! A refresh answers with the list the backend held when it handled the
//! request. Ids mutated locally after that point keep their local
//! membership when the list is applied.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{AddOutcome, TransitApi};
use crate::auth::{AuthSession, Identity};
use crate::error::SyncError;
use crate::intent::IntentState;

/// How a single `add`/`delete` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationOutcome {
    /// Local state already matched; nothing was sent.
    Noop,
    /// The backend now agrees with this call.
    Confirmed,
    /// A later call for the same id changed the intent first.
    Superseded,
    /// The identity changed before the request settled.
    Discarded,
}

#[derive(Debug, Clone)]
struct Tracked {
    intent: IntentState<bool>,
    /// Calls for this id that have not finished yet.
    queued: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FavoritesState {
    /// Favorites as the user should see them, optimistic changes included.
    pub favorites: BTreeSet<String>,
    /// Identity the set was loaded for.
    pub identity: Option<Identity>,
    pub loading: bool,
    pub error: Option<String>,
    epoch: u64,
    refreshing: usize,
    intents: HashMap<String, Tracked>,
    /// Bumped on every local change while a refresh is in flight.
    seq: u64,
    /// Last `seq` each id was changed at. Only kept while refreshing.
    touched: HashMap<String, u64>,
}

impl FavoritesState {
    pub fn contains(&self, stop_id: &str) -> bool {
        self.favorites.contains(stop_id)
    }

    /// Ids with a mutation the backend has not acknowledged yet.
    pub fn pending(&self) -> BTreeSet<String> {
        self.intents
            .iter()
            .filter(|(_, t)| t.intent.is_pending())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn is_pending(&self, stop_id: &str) -> bool {
        self.intents
            .get(stop_id)
            .map_or(false, |t| t.intent.is_pending())
    }

    pub fn intent(&self, stop_id: &str) -> Option<&IntentState<bool>> {
        self.intents.get(stop_id).map(|t| &t.intent)
    }

    fn set_member(&mut self, stop_id: &str, member: bool) {
        if member {
            self.favorites.insert(stop_id.to_string());
        } else {
            self.favorites.remove(stop_id);
        }
    }

    /// Record a local change to `stop_id` for refreshes still in flight.
    fn touch(&mut self, stop_id: &str) {
        if self.refreshing > 0 {
            self.seq += 1;
            self.touched.insert(stop_id.to_string(), self.seq);
        }
    }

    /// Apply a refreshed list issued at `issued`. Ids with unsettled work or
    /// changed since then keep what is shown locally.
    fn apply_remote(&mut self, ids: &[String], issued: u64) {
        let local: Vec<(String, bool)> = self
            .intents
            .keys()
            .chain(
                self.touched
                    .iter()
                    .filter(|(_, seq)| **seq > issued)
                    .map(|(id, _)| id),
            )
            .map(|id| (id.clone(), self.favorites.contains(id)))
            .collect();
        self.favorites = ids.iter().cloned().collect();
        for (id, member) in local {
            self.set_member(&id, member);
        }
    }

    fn reset(&mut self) {
        self.favorites.clear();
        self.intents.clear();
        self.touched.clear();
        self.error = None;
        self.refreshing = 0;
        self.loading = false;
    }
}

/// What a call does once it holds the id's turn.
enum Turn {
    Discard,
    Done(MutationOutcome),
    Send(bool),
}

pub struct FavoritesStore<A, S> {
    api: Arc<A>,
    auth: Arc<S>,
    state: watch::Sender<FavoritesState>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<A: TransitApi, S: AuthSession> FavoritesStore<A, S> {
    pub fn new(api: Arc<A>, auth: Arc<S>) -> Self {
        let state = FavoritesState {
            identity: auth.current(),
            ..FavoritesState::default()
        };
        Self {
            api,
            auth,
            state: watch::Sender::new(state),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FavoritesState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> FavoritesState {
        self.state.borrow().clone()
    }

    pub fn contains(&self, stop_id: &str) -> bool {
        self.state.borrow().contains(stop_id)
    }

    /// Drop everything that belonged to the previous identity. Anything
    /// still in flight for it is discarded when it settles.
    pub fn on_identity_changed(&self, identity: Option<&Identity>) {
        self.state.send_modify(|s| {
            s.epoch += 1;
            s.reset();
            s.identity = identity.cloned();
        });
        match identity {
            Some(id) => info!("[favorites] identity is now {}", id.user_id),
            None => info!("[favorites] signed out, favorites cleared"),
        }
    }

    /// Replace the local set with the backend's list.
    pub async fn refresh(&self) -> Result<(), SyncError> {
        if self.auth.current().is_none() {
            self.state.send_modify(|s| {
                s.reset();
                s.identity = None;
            });
            return Ok(());
        }

        let mut epoch = 0;
        let mut issued = 0;
        self.state.send_modify(|s| {
            epoch = s.epoch;
            issued = s.seq;
            s.refreshing += 1;
            s.loading = true;
        });

        let result = self.fetch_remote().await;

        let mut applied = false;
        self.state.send_if_modified(|s| {
            if s.epoch != epoch {
                return false;
            }
            s.refreshing = s.refreshing.saturating_sub(1);
            s.loading = s.refreshing > 0;
            applied = true;
            match &result {
                Ok(ids) => {
                    s.apply_remote(ids, issued);
                    s.error = None;
                }
                Err(e) => s.error = Some(e.to_string()),
            }
            if s.refreshing == 0 {
                s.touched.clear();
            }
            true
        });

        if !applied {
            debug!("[favorites] dropping refresh from a previous identity");
            return Ok(());
        }
        match result {
            Ok(ids) => {
                debug!("[favorites] refreshed, {} favorites", ids.len());
                Ok(())
            }
            Err(e) => {
                warn!("[favorites] refresh failed: {}", e);
                Err(e)
            }
        }
    }

    pub async fn add(&self, stop_id: &str) -> Result<MutationOutcome, SyncError> {
        self.mutate(stop_id, true).await
    }

    pub async fn delete(&self, stop_id: &str) -> Result<MutationOutcome, SyncError> {
        self.mutate(stop_id, false).await
    }

    /// Add when absent, delete when present (as currently shown).
    pub async fn toggle(&self, stop_id: &str) -> Result<MutationOutcome, SyncError> {
        let present = self.contains(stop_id);
        self.mutate(stop_id, !present).await
    }

    async fn fetch_remote(&self) -> Result<Vec<String>, SyncError> {
        let token = self.auth.get_token().await?;
        Ok(self.api.fetch_favorites(&token).await?)
    }

    async fn mutate(&self, stop_id: &str, want: bool) -> Result<MutationOutcome, SyncError> {
        if self.auth.current().is_none() {
            warn!("[favorites] {} {} while signed out", verb(want), stop_id);
            self.state
                .send_modify(|s| s.error = Some(SyncError::Unauthenticated.to_string()));
            return Err(SyncError::Unauthenticated);
        }

        // Optimistic step: record the intent and show it.
        let mut epoch = 0;
        let registered = self.state.send_if_modified(|s| {
            epoch = s.epoch;
            if s.favorites.contains(stop_id) == want {
                return false;
            }
            match s.intents.get_mut(stop_id) {
                Some(t) => {
                    t.intent.set_intent(want);
                    t.queued += 1;
                }
                None => {
                    let mut intent = IntentState::new(!want);
                    intent.set_intent(want);
                    s.intents
                        .insert(stop_id.to_string(), Tracked { intent, queued: 1 });
                }
            }
            s.set_member(stop_id, want);
            s.touch(stop_id);
            true
        });
        if !registered {
            debug!("[favorites] {} {}: already in that state", verb(want), stop_id);
            return Ok(MutationOutcome::Noop);
        }

        let lock = self.id_lock(stop_id);
        let result = {
            let _turn = lock.lock().await;
            let result = self.take_turn(stop_id, want, epoch).await;
            self.finish(stop_id, epoch);
            result
        };
        self.release_id_lock(stop_id, &lock);
        result
    }

    async fn take_turn(
        &self,
        stop_id: &str,
        want: bool,
        epoch: u64,
    ) -> Result<MutationOutcome, SyncError> {
        let mut turn = Turn::Discard;
        self.state.send_if_modified(|s| {
            if s.epoch != epoch {
                return false;
            }
            let Some(t) = s.intents.get_mut(stop_id) else {
                return false;
            };
            if t.intent.intended() == t.intent.confirmed() {
                let value = *t.intent.confirmed();
                turn = Turn::Done(if value == want {
                    MutationOutcome::Confirmed
                } else {
                    MutationOutcome::Superseded
                });
                t.intent.settle()
            } else {
                turn = Turn::Send(*t.intent.intended());
                false
            }
        });

        let target = match turn {
            Turn::Discard => return Ok(MutationOutcome::Discarded),
            Turn::Done(outcome) => {
                debug!("[favorites] {} {}: backend already agrees", verb(want), stop_id);
                return Ok(outcome);
            }
            Turn::Send(target) => target,
        };

        let result = self.send(stop_id, target).await;

        let mut outcome = MutationOutcome::Discarded;
        let mut rolled_back = false;
        self.state.send_if_modified(|s| {
            if s.epoch != epoch {
                return false;
            }
            let Some(t) = s.intents.get_mut(stop_id) else {
                return false;
            };
            match &result {
                Ok(()) => {
                    t.intent.on_confirmed(target);
                    outcome = if *t.intent.intended() == want {
                        MutationOutcome::Confirmed
                    } else {
                        MutationOutcome::Superseded
                    };
                    true
                }
                Err(e) if *t.intent.intended() == target => {
                    t.intent.rollback();
                    let restored = *t.intent.confirmed();
                    s.set_member(stop_id, restored);
                    s.error = Some(e.to_string());
                    rolled_back = true;
                    true
                }
                Err(_) => {
                    // The user has since asked for the value the backend
                    // still holds; the next queued call settles it.
                    outcome = MutationOutcome::Superseded;
                    false
                }
            }
        });

        match result {
            Err(e) if rolled_back => {
                warn!(
                    "[favorites] {} {} failed, rolled back: {}",
                    verb(target),
                    stop_id,
                    e
                );
                Err(e)
            }
            _ => {
                debug!("[favorites] {} {}: {:?}", verb(want), stop_id, outcome);
                Ok(outcome)
            }
        }
    }

    async fn send(&self, stop_id: &str, member: bool) -> Result<(), SyncError> {
        let token = self.auth.get_token().await?;
        if member {
            if self.api.add_favorite(&token, stop_id).await? == AddOutcome::AlreadyFavorite {
                debug!("[favorites] {} was already a favorite", stop_id);
            }
        } else {
            self.api.remove_favorite(&token, stop_id).await?;
        }
        Ok(())
    }

    /// This call is done with `stop_id`; forget it once nothing is pending.
    fn finish(&self, stop_id: &str, epoch: u64) {
        self.state.send_if_modified(|s| {
            if s.epoch != epoch {
                return false;
            }
            let Some(t) = s.intents.get_mut(stop_id) else {
                return false;
            };
            t.queued = t.queued.saturating_sub(1);
            if t.queued == 0 {
                // Nothing left to send, so whatever is still pending has
                // nothing that could confirm it.
                t.intent.settle();
                if t.intent.is_pending() {
                    t.intent.rollback();
                    let restored = *t.intent.confirmed();
                    s.set_member(stop_id, restored);
                }
                s.intents.remove(stop_id);
                s.touch(stop_id);
                return true;
            }
            false
        });
    }

    fn id_lock(&self, stop_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(stop_id.to_string())
            .or_default()
            .clone()
    }

    fn release_id_lock(&self, stop_id: &str, lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one held by the caller.
        if Arc::strong_count(lock) <= 2 {
            locks.remove(stop_id);
        }
    }
}

fn verb(member: bool) -> &'static str {
    if member {
        "add"
    } else {
        "delete"
    }
}
