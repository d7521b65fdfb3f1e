//! Shared data model for the transit dashboard: stations, feed partitions,
//! route codes, REST wire shapes and on-disk configuration.

pub mod arrivals;
pub mod config;
pub mod feeds;
pub mod platform;
pub mod protocol;

pub use feeds::{FeedKey, Route, UnknownKey};
pub use protocol::{Outage, Station};
