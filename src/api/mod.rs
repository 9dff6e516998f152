//! Remote HR API access: the client contract, its HTTP implementation, and
//! the cached access service layered on top.

mod cached_client;
mod client;
mod error;
mod types;

pub use cached_client::{CachedApi, Invalidation};
pub use client::{HttpRemoteApi, Method, RemoteApi};
pub use error::ApiError;
pub use types::ApiEnvelope;
