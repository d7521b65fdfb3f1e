//! Periodic station fetch for the active feed.
//!
//! Every request carries the feed key it was issued for. When it settles the
//! response is applied only if that key is still the active one, so a slow
//! reply for a feed the user already left can never overwrite the list.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use transit_proto::{FeedKey, Station};

use crate::api::TransitApi;

/// Shortest poll period; a zero period would make the timer panic.
const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Published poller state. Consumers only ever see clones of this.
#[derive(Debug, Clone, Default)]
pub struct FeedState {
    /// Key new responses are matched against. `None` until first `start`.
    pub feed: Option<FeedKey>,
    pub running: bool,
    /// Last successful collection for `feed`. Empty right after a switch.
    pub stations: Vec<Station>,
    /// A request tagged with `feed` is in flight.
    pub loading: bool,
    pub error: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
    /// Bumped every time a collection is applied.
    pub revision: u64,
    in_flight: HashMap<FeedKey, usize>,
}

impl FeedState {
    fn track(&mut self, feed: FeedKey) {
        *self.in_flight.entry(feed).or_default() += 1;
        self.update_loading();
    }

    fn untrack(&mut self, feed: FeedKey) {
        if let Some(n) = self.in_flight.get_mut(&feed) {
            *n = n.saturating_sub(1);
            if *n == 0 {
                self.in_flight.remove(&feed);
            }
        }
        self.update_loading();
    }

    fn update_loading(&mut self) {
        self.loading = self
            .feed
            .map_or(false, |f| self.in_flight.get(&f).copied().unwrap_or(0) > 0);
    }
}

pub struct RemoteFeedPoller<A> {
    api: Arc<A>,
    period: Duration,
    state: Arc<watch::Sender<FeedState>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<A: TransitApi> RemoteFeedPoller<A> {
    /// `period` is raised to one second if shorter.
    pub fn new(api: Arc<A>, period: Duration) -> Self {
        Self {
            api,
            period: period.max(MIN_PERIOD),
            state: Arc::new(watch::Sender::new(FeedState::default())),
            timer: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> FeedState {
        self.state.borrow().clone()
    }

    pub fn active_feed(&self) -> Option<FeedKey> {
        self.state.borrow().feed
    }

    /// Start polling `feed`: one request now, then one per period.
    ///
    /// A call with the key that is already running does nothing. A different
    /// key stops the old timer and clears the collection, which belonged to
    /// the old key. Must be called from inside a tokio runtime.
    pub fn start(&self, feed: FeedKey) {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        let running = timer.as_ref().map_or(false, |h| !h.is_finished());
        if running && self.active_feed() == Some(feed) {
            debug!("[poller] already polling {}", feed);
            return;
        }
        if let Some(old) = timer.take() {
            old.abort();
        }

        self.state.send_modify(|s| {
            if s.feed != Some(feed) {
                if let Some(old) = s.feed {
                    info!("[poller] switching feed {} -> {}", old, feed);
                }
                s.feed = Some(feed);
                s.stations.clear();
                s.error = None;
                s.fetched_at = None;
            }
            s.running = true;
            s.update_loading();
        });

        spawn_fetch(self.api.clone(), self.state.clone(), feed);

        let api = self.api.clone();
        let state = self.state.clone();
        let period = self.period;
        *timer = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                spawn_fetch(api.clone(), state.clone(), feed);
            }
        }));
        info!("[poller] polling {} every {:?}", feed, period);
    }

    /// Stop the timer. Requests already in flight still settle and are
    /// still matched against the active key.
    pub fn stop(&self) {
        let handle = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            debug!("[poller] stopped");
        }
        self.state.send_if_modified(|s| std::mem::replace(&mut s.running, false));
    }
}

impl<A> Drop for RemoteFeedPoller<A> {
    fn drop(&mut self) {
        let handle = self
            .timer
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

/// Issue one request tagged with `feed`. The request runs on its own task so
/// a hung fetch never holds up the next tick.
fn spawn_fetch<A: TransitApi>(api: Arc<A>, state: Arc<watch::Sender<FeedState>>, feed: FeedKey) {
    state.send_modify(|s| s.track(feed));
    debug!("[poller] fetching {}", feed);
    tokio::spawn(async move {
        let result = api.fetch_stations(feed).await;
        state.send_modify(|s| {
            s.untrack(feed);
            if s.feed != Some(feed) {
                debug!("[poller] dropping stale response for {}", feed);
                return;
            }
            match result {
                Ok(stations) => {
                    debug!("[poller] {} returned {} stations", feed, stations.len());
                    s.stations = stations;
                    s.error = None;
                    s.fetched_at = Some(Utc::now());
                    s.revision += 1;
                }
                Err(e) => {
                    warn!("[poller] fetch {} failed: {}", feed, e);
                    s.error = Some(e.to_string());
                }
            }
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::fake::{station, Call, FakeApi};

    const PERIOD: Duration = Duration::from_secs(60);

    fn poller(api: &Arc<FakeApi>) -> RemoteFeedPoller<FakeApi> {
        RemoteFeedPoller::new(api.clone(), PERIOD)
    }

    /// Let spawned tasks (and auto-advanced sleeps) run.
    async fn settle(d: Duration) {
        tokio::time::sleep(d).await;
        tokio::task::yield_now().await;
    }

    fn ids(state: &FeedState) -> Vec<&str> {
        state.stations.iter().map(|s| s.stop_id.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_fetches_immediately_then_every_period() {
        let api = Arc::new(FakeApi::new());
        api.set_stations(FeedKey::Ace, vec![station("A27", "42 St")]);
        let p = poller(&api);

        p.start(FeedKey::Ace);
        assert!(p.state().loading);
        settle(Duration::from_millis(1)).await;
        assert_eq!(ids(&p.state()), vec!["A27"]);
        assert!(!p.state().loading);
        assert!(p.state().fetched_at.is_some());
        assert_eq!(api.station_calls(FeedKey::Ace), 1);

        settle(PERIOD).await;
        assert_eq!(api.station_calls(FeedKey::Ace), 2);
        settle(PERIOD).await;
        assert_eq!(api.station_calls(FeedKey::Ace), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_same_key_is_noop() {
        let api = Arc::new(FakeApi::new());
        let p = poller(&api);
        p.start(FeedKey::L);
        p.start(FeedKey::L);
        settle(Duration::from_millis(1)).await;
        assert_eq!(api.station_calls(FeedKey::L), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_response_for_previous_key_is_discarded() {
        let api = Arc::new(FakeApi::new());
        api.set_stations(FeedKey::Ace, vec![station("A27", "42 St")]);
        api.set_stations(FeedKey::L, vec![station("L08", "Bedford Av")]);
        api.set_delay(FeedKey::Ace, Duration::from_secs(5));
        let p = poller(&api);

        p.start(FeedKey::Ace);
        settle(Duration::from_secs(1)).await;
        p.start(FeedKey::L);
        settle(Duration::from_secs(10)).await;

        let state = p.state();
        assert_eq!(state.feed, Some(FeedKey::L));
        assert_eq!(ids(&state), vec!["L08"]);
        assert_eq!(state.revision, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_key_wins_for_any_response_order() {
        let api = Arc::new(FakeApi::new());
        for (i, key) in [FeedKey::Ace, FeedKey::G, FeedKey::Jz].into_iter().enumerate() {
            api.set_stations(key, vec![station(key.as_str(), "x")]);
            // Earlier keys answer later.
            api.set_delay(key, Duration::from_secs(10 - 3 * i as u64));
        }
        let p = poller(&api);
        p.start(FeedKey::Ace);
        p.start(FeedKey::G);
        p.start(FeedKey::Jz);
        settle(Duration::from_secs(20)).await;
        assert_eq!(ids(&p.state()), vec!["jz"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_clears_collection_and_error() {
        let api = Arc::new(FakeApi::new());
        api.set_stations(FeedKey::Ace, vec![station("A27", "42 St")]);
        api.set_delay(FeedKey::G, Duration::from_secs(5));
        let p = poller(&api);
        p.start(FeedKey::Ace);
        settle(Duration::from_millis(1)).await;
        assert_eq!(p.state().stations.len(), 1);

        p.start(FeedKey::G);
        let state = p.state();
        assert!(state.stations.is_empty());
        assert!(state.error.is_none());
        assert!(state.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_previous_collection() {
        let api = Arc::new(FakeApi::new());
        api.set_stations(FeedKey::Seven, vec![station("701", "Flushing-Main St")]);
        let p = poller(&api);
        p.start(FeedKey::Seven);
        settle(Duration::from_millis(1)).await;

        api.fail_stations(
            FeedKey::Seven,
            ApiError::Status {
                status: 500,
                message: "feed down".into(),
            },
        );
        settle(PERIOD).await;

        let state = p.state();
        assert_eq!(ids(&state), vec!["701"]);
        assert!(state.error.as_deref().unwrap().contains("feed down"));

        api.set_stations(FeedKey::Seven, vec![station("702", "Mets-Willets Point")]);
        settle(PERIOD).await;
        let state = p.state();
        assert_eq!(ids(&state), vec!["702"]);
        assert!(state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_timer_but_in_flight_request_applies() {
        let api = Arc::new(FakeApi::new());
        api.set_stations(FeedKey::Nqrw, vec![station("R16", "Times Sq")]);
        api.set_delay(FeedKey::Nqrw, Duration::from_secs(3));
        let p = poller(&api);
        p.start(FeedKey::Nqrw);
        p.stop();
        assert!(!p.state().running);

        settle(Duration::from_secs(5)).await;
        assert_eq!(ids(&p.state()), vec!["R16"]);

        settle(PERIOD * 3).await;
        assert_eq!(api.station_calls(FeedKey::Nqrw), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_request_does_not_delay_next_tick() {
        let api = Arc::new(FakeApi::new());
        api.set_delay(FeedKey::Bdfm, PERIOD * 10);
        let p = poller(&api);
        p.start(FeedKey::Bdfm);
        settle(PERIOD * 2 + Duration::from_millis(1)).await;
        assert_eq!(api.station_calls(FeedKey::Bdfm), 3);
        assert!(p.state().loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_carries_data_from_when_it_was_handled() {
        let api = Arc::new(FakeApi::new());
        api.set_stations(FeedKey::Ace, vec![station("A27", "42 St")]);
        api.set_delay(FeedKey::Ace, Duration::from_secs(5));
        let p = poller(&api);
        p.start(FeedKey::Ace);

        settle(Duration::from_secs(1)).await;
        api.set_stations(FeedKey::Ace, vec![station("A32", "W 4 St")]);
        settle(Duration::from_secs(5)).await;
        assert_eq!(ids(&p.state()), vec!["A27"]);

        settle(PERIOD).await;
        assert_eq!(ids(&p.state()), vec!["A32"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_period_is_raised_to_minimum() {
        let api = Arc::new(FakeApi::new());
        let p = RemoteFeedPoller::new(api.clone(), Duration::ZERO);
        p.start(FeedKey::StatenIsland);
        settle(Duration::from_millis(2500)).await;
        // Immediate fetch plus ticks at 1s and 2s.
        assert_eq!(api.station_calls(FeedKey::StatenIsland), 3);
        assert!(p.state().running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_polling() {
        let api = Arc::new(FakeApi::new());
        {
            let p = poller(&api);
            p.start(FeedKey::G);
        }
        settle(PERIOD * 3).await;
        assert_eq!(
            api.calls()
                .iter()
                .filter(|c| **c == Call::Stations(FeedKey::G))
                .count(),
            1
        );
    }
}
