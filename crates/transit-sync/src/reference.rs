//! Reference data loaded once rather than polled: the network-wide station
//! directory and the current elevator/escalator outages.
//!
//! Each kind carries a generation. A reload bumps it, and a load that
//! settles under an older generation is dropped, same as the poller's
//! key tag.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use transit_proto::{Outage, Station};

use crate::api::TransitApi;
use crate::error::ApiError;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadState<T> {
    /// Last successful result. Kept when a reload fails.
    pub data: T,
    pub loading: bool,
    pub error: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    generation: u64,
}

impl<T> LoadState<T> {
    fn begin(&mut self) -> u64 {
        self.generation += 1;
        self.loading = true;
        self.error = None;
        self.generation
    }

    /// Apply `result` if no newer load started since `generation`.
    fn finish(&mut self, generation: u64, result: Result<T, ApiError>) -> bool {
        if generation != self.generation {
            return false;
        }
        self.loading = false;
        match result {
            Ok(data) => {
                self.data = data;
                self.fetched_at = Some(Utc::now());
            }
            Err(e) => self.error = Some(e.to_string()),
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceState {
    pub directory: LoadState<Vec<Station>>,
    pub outages: LoadState<Vec<Outage>>,
}

pub struct ReferenceData<A> {
    api: Arc<A>,
    state: watch::Sender<ReferenceState>,
}

impl<A: TransitApi> ReferenceData<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            state: watch::Sender::new(ReferenceState::default()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ReferenceState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ReferenceState {
        self.state.borrow().clone()
    }

    pub async fn load_directory(&self) -> Result<(), ApiError> {
        let generation = self.begin_directory();
        self.finish_directory(generation).await
    }

    pub async fn load_outages(&self) -> Result<(), ApiError> {
        let generation = self.begin_outages();
        self.finish_outages(generation).await
    }

    /// Load both kinds on a background task. Both read as loading by the
    /// time this returns.
    pub fn spawn_load(self: Arc<Self>) -> JoinHandle<()> {
        let directory = self.begin_directory();
        let outages = self.begin_outages();
        tokio::spawn(async move {
            // Failures are recorded in the state.
            let _ = tokio::join!(
                self.finish_directory(directory),
                self.finish_outages(outages)
            );
        })
    }

    fn begin_directory(&self) -> u64 {
        let mut generation = 0;
        self.state.send_modify(|s| generation = s.directory.begin());
        generation
    }

    fn begin_outages(&self) -> u64 {
        let mut generation = 0;
        self.state.send_modify(|s| generation = s.outages.begin());
        generation
    }

    async fn finish_directory(&self, generation: u64) -> Result<(), ApiError> {
        debug!("[reference] loading station directory");
        let result = self.api.fetch_all_stations().await;
        let summary = result.as_ref().map(Vec::len).map_err(|e| e.clone());
        if !self
            .state
            .send_if_modified(|s| s.directory.finish(generation, result))
        {
            debug!("[reference] dropping superseded directory load");
            return Ok(());
        }
        match summary {
            Ok(n) => {
                info!("[reference] directory has {} stations", n);
                Ok(())
            }
            Err(e) => {
                warn!("[reference] directory load failed: {}", e);
                Err(e)
            }
        }
    }

    async fn finish_outages(&self, generation: u64) -> Result<(), ApiError> {
        debug!("[reference] loading accessibility outages");
        let result = self.api.fetch_outages().await;
        let summary = result.as_ref().map(Vec::len).map_err(|e| e.clone());
        if !self
            .state
            .send_if_modified(|s| s.outages.finish(generation, result))
        {
            debug!("[reference] dropping superseded outage load");
            return Ok(());
        }
        match summary {
            Ok(n) => {
                info!("[reference] {} outages reported", n);
                Ok(())
            }
            Err(e) => {
                warn!("[reference] outage load failed: {}", e);
                Err(e)
            }
        }
    }
}
