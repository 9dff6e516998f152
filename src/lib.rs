//! Client-side data core for the HR management API.
//!
//! UI code talks to a [`CachedApi`], which answers reads from a two-tier
//! [`CacheStore`] when it can, funnels network fetches through a
//! [`RequestCoordinator`] so that only the newest request per key stays
//! registered, and invalidates cached entries after writes.

pub mod api;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod logging;

pub use api::{ApiEnvelope, ApiError, CachedApi, HttpRemoteApi, Invalidation, Method, RemoteApi};
pub use cache::{CacheKey, CacheStatistics, CacheStore, FetchResult, Ttl};
pub use config::Config;
pub use coordinator::RequestCoordinator;
