//! Scriptable in-memory backend for unit tests.
//!
//! Reads capture the scripted state when the request arrives and return it
//! after the delay, the way a real backend answers with what it held when it
//! handled the request.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use transit_proto::{FeedKey, Outage, Station};

use crate::api::{AddOutcome, TransitApi};
use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Stations(FeedKey),
    AllStations,
    Outages,
    Favorites(String),
    Add(String),
    Remove(String),
}

#[derive(Default)]
struct Script {
    stations: HashMap<FeedKey, Result<Vec<Station>, ApiError>>,
    delays: HashMap<FeedKey, Duration>,
    directory: Option<Result<Vec<Station>, ApiError>>,
    outages: Option<Result<Vec<Outage>, ApiError>>,
    reference_delay: Duration,
    remote: BTreeSet<String>,
    favorites_error: Option<ApiError>,
    favorites_delay: Duration,
    mutation_error: Option<ApiError>,
    mutation_delay: Duration,
    calls: Vec<Call>,
}

#[derive(Default)]
pub struct FakeApi {
    script: Mutex<Script>,
}

pub fn station(id: &str, name: &str) -> Station {
    Station {
        stop_id: id.to_string(),
        stop_name: name.to_string(),
        stop_lat: 40.75,
        stop_lon: -73.98,
        routes: vec![],
        next_arrival: vec![],
    }
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_stations(&self, feed: FeedKey, stations: Vec<Station>) {
        self.script.lock().unwrap().stations.insert(feed, Ok(stations));
    }

    pub fn fail_stations(&self, feed: FeedKey, error: ApiError) {
        self.script.lock().unwrap().stations.insert(feed, Err(error));
    }

    pub fn set_delay(&self, feed: FeedKey, delay: Duration) {
        self.script.lock().unwrap().delays.insert(feed, delay);
    }

    pub fn set_directory(&self, result: Result<Vec<Station>, ApiError>) {
        self.script.lock().unwrap().directory = Some(result);
    }

    pub fn set_outages(&self, result: Result<Vec<Outage>, ApiError>) {
        self.script.lock().unwrap().outages = Some(result);
    }

    /// Delay for the directory and outage reads.
    pub fn set_reference_delay(&self, delay: Duration) {
        self.script.lock().unwrap().reference_delay = delay;
    }

    pub fn set_remote<I: IntoIterator<Item = &'static str>>(&self, ids: I) {
        self.script.lock().unwrap().remote = ids.into_iter().map(String::from).collect();
    }

    pub fn remote(&self) -> BTreeSet<String> {
        self.script.lock().unwrap().remote.clone()
    }

    pub fn fail_favorites(&self, error: Option<ApiError>) {
        self.script.lock().unwrap().favorites_error = error;
    }

    pub fn set_favorites_delay(&self, delay: Duration) {
        self.script.lock().unwrap().favorites_delay = delay;
    }

    pub fn fail_mutations(&self, error: Option<ApiError>) {
        self.script.lock().unwrap().mutation_error = error;
    }

    pub fn set_mutation_delay(&self, delay: Duration) {
        self.script.lock().unwrap().mutation_delay = delay;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn station_calls(&self, feed: FeedKey) -> usize {
        self.count(&Call::Stations(feed))
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    /// Add/Remove calls only, in issue order.
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Add(_) | Call::Remove(_)))
            .collect()
    }

    fn record(&self, call: Call) {
        self.script.lock().unwrap().calls.push(call);
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

impl TransitApi for FakeApi {
    async fn fetch_stations(&self, feed: FeedKey) -> Result<Vec<Station>, ApiError> {
        self.record(Call::Stations(feed));
        let (answer, delay) = {
            let script = self.script.lock().unwrap();
            let answer = script
                .stations
                .get(&feed)
                .cloned()
                .unwrap_or_else(|| Ok(Vec::new()));
            (answer, script.delays.get(&feed).copied().unwrap_or_default())
        };
        pause(delay).await;
        answer
    }

    async fn fetch_all_stations(&self) -> Result<Vec<Station>, ApiError> {
        self.record(Call::AllStations);
        let (answer, delay) = {
            let script = self.script.lock().unwrap();
            let answer = script.directory.clone().unwrap_or_else(|| Ok(Vec::new()));
            (answer, script.reference_delay)
        };
        pause(delay).await;
        answer
    }

    async fn fetch_outages(&self) -> Result<Vec<Outage>, ApiError> {
        self.record(Call::Outages);
        let (answer, delay) = {
            let script = self.script.lock().unwrap();
            let answer = script.outages.clone().unwrap_or_else(|| Ok(Vec::new()));
            (answer, script.reference_delay)
        };
        pause(delay).await;
        answer
    }

    async fn fetch_favorites(&self, token: &str) -> Result<Vec<String>, ApiError> {
        self.record(Call::Favorites(token.to_string()));
        let (answer, delay) = {
            let script = self.script.lock().unwrap();
            let answer = match &script.favorites_error {
                Some(e) => Err(e.clone()),
                None => Ok(script.remote.iter().cloned().collect()),
            };
            (answer, script.favorites_delay)
        };
        pause(delay).await;
        answer
    }

    async fn add_favorite(&self, _token: &str, station_id: &str) -> Result<AddOutcome, ApiError> {
        self.record(Call::Add(station_id.to_string()));
        let delay = self.script.lock().unwrap().mutation_delay;
        pause(delay).await;
        let mut script = self.script.lock().unwrap();
        if let Some(e) = &script.mutation_error {
            return Err(e.clone());
        }
        if script.remote.insert(station_id.to_string()) {
            Ok(AddOutcome::Created)
        } else {
            Ok(AddOutcome::AlreadyFavorite)
        }
    }

    async fn remove_favorite(&self, _token: &str, station_id: &str) -> Result<(), ApiError> {
        self.record(Call::Remove(station_id.to_string()));
        let delay = self.script.lock().unwrap().mutation_delay;
        pause(delay).await;
        let mut script = self.script.lock().unwrap();
        if let Some(e) = &script.mutation_error {
            return Err(e.clone());
        }
        if script.remote.remove(station_id) {
            Ok(())
        } else {
            Err(ApiError::Status {
                status: 404,
                message: "favorite not found".into(),
            })
        }
    }
}
