//! Feed Engine - a subscription feed aggregator
//!
//! Fetches the recent items of every subscribed source, drops anything older
//! than a rolling cutoff, repairs rounded upload dates from an earlier result
//! and merges everything into one newest-first feed with a change-detection
//! hash.

pub mod aggregator;
pub mod collector;
pub mod config;
pub mod correction;
pub mod cutoff;
pub mod db;
pub mod fetcher;
pub mod model;
pub mod registry;
pub mod routes;
