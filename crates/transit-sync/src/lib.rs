//! Client-side synchronization core for the transit dashboard.
//!
//! - [`RemoteFeedPoller`] keeps the station collection for the active feed fresh.
//! - [`FavoritesStore`] owns the favorite set and reconciles it with the backend.
//! - [`SelectionCoordinator`] holds the single focused station.
//! - [`ReferenceData`] loads the station directory and outages once.
//! - [`SyncContext`] wires them together and is the only surface views touch.

pub mod api;
pub mod auth;
pub mod context;
pub mod error;
pub mod favorites;
pub mod intent;
pub mod poller;
pub mod reference;
pub mod selection;
pub mod snapshot;

#[cfg(test)]
mod fake;

pub use api::{AddOutcome, HttpBackend, TransitApi};
pub use auth::{AuthSession, Identity, StaticSession};
pub use context::{SnapshotStream, SyncContext, SyncOptions};
pub use error::{ApiError, AuthError, SyncError};
pub use favorites::{FavoritesState, FavoritesStore, MutationOutcome};
pub use poller::{FeedState, RemoteFeedPoller};
pub use reference::{LoadState, ReferenceData, ReferenceState};
pub use selection::{Focus, SelectionCoordinator};
pub use snapshot::Snapshot;
