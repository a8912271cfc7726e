//! Client for job-portal conversations: paginated history over REST plus a
//! live STOMP feed, merged into one ordered message store.

pub mod api;
pub mod config;
pub mod errors;
pub mod models;
pub mod service;
pub mod store;
pub mod transport;
