//! Cached API client: cache-first reads, deduplicated fetches, write-through
//! invalidation.

use color_eyre::Result as EyreResult;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::{
  CacheKey, CacheStatistics, CacheStore, FetchResult, NoopStorage, SqliteStorage, Ttl, TtlPolicy,
};
use crate::config::Config;
use crate::coordinator::RequestCoordinator;

use super::client::{HttpRemoteApi, RemoteApi};
use super::error::ApiError;

/// Which cache entries a write makes stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
  /// Nothing cached depends on the written resource
  Nothing,
  /// Specific keys
  Keys(Vec<String>),
  /// Whole resource families (see [`CacheKey::tag`])
  Tags(Vec<String>),
  /// Everything
  All,
}

impl Invalidation {
  pub fn key(key: impl Into<CacheKey>) -> Self {
    let key: CacheKey = key.into();
    Self::Keys(vec![key.as_str().to_string()])
  }

  pub fn tag(tag: impl Into<String>) -> Self {
    Self::Tags(vec![tag.into()])
  }
}

/// API client with transparent caching.
///
/// Construct one per process and hand clones to every consumer; clones share
/// the same cache store and request registry.
pub struct CachedApi<R: RemoteApi = HttpRemoteApi> {
  remote: Arc<R>,
  store: Arc<CacheStore>,
  coordinator: Arc<RequestCoordinator>,
  ttl: TtlPolicy,
}

impl<R: RemoteApi> Clone for CachedApi<R> {
  fn clone(&self) -> Self {
    Self {
      remote: Arc::clone(&self.remote),
      store: Arc::clone(&self.store),
      coordinator: Arc::clone(&self.coordinator),
      ttl: self.ttl,
    }
  }
}

impl CachedApi<HttpRemoteApi> {
  /// Build the HTTP client, open the configured durable tier and optionally
  /// sweep expired records.
  pub fn from_config(config: &Config) -> EyreResult<Self> {
    let remote = HttpRemoteApi::from_config(config)?;

    let store = if config.cache.enabled {
      let path = match &config.cache.path {
        Some(p) => p.clone(),
        None => SqliteStorage::default_path()?,
      };
      CacheStore::new(SqliteStorage::open(&path)?)
    } else {
      CacheStore::new(NoopStorage)
    };
    let store = store.with_memory_limits(config.cache.memory_max_items, config.cache.memory_max_bytes);

    if config.cache.enabled && config.cache.sweep_on_start {
      store.sweep_expired();
    }

    Ok(Self::new(remote, store).with_ttl_policy(config.cache.ttl.policy()))
  }
}

impl<R: RemoteApi> CachedApi<R> {
  pub fn new(remote: R, store: CacheStore) -> Self {
    Self {
      remote: Arc::new(remote),
      store: Arc::new(store),
      coordinator: Arc::new(RequestCoordinator::new()),
      ttl: TtlPolicy::default(),
    }
  }

  /// Override the durations behind each TTL category.
  pub fn with_ttl_policy(mut self, ttl: TtlPolicy) -> Self {
    self.ttl = ttl;
    self
  }

  pub fn remote(&self) -> &R {
    &self.remote
  }

  pub fn store(&self) -> &CacheStore {
    &self.store
  }

  pub fn coordinator(&self) -> &RequestCoordinator {
    &self.coordinator
  }

  /// Fetch with a cache-first strategy.
  ///
  /// 1. Unless `force_refresh`, return an unexpired cached value
  /// 2. Otherwise run `remote_call` through the coordinator, superseding any
  ///    in-flight fetch for the same key
  /// 3. Cache the result under `ttl` and return it
  ///
  /// Remote errors are returned untouched and leave the cache as it was. A
  /// fetch cancelled before its result is cached (superseded, or its key
  /// invalidated by a write) caches nothing and returns [`ApiError::Cancelled`].
  pub async fn fetch<T, F, Fut>(
    &self,
    key: impl Into<CacheKey>,
    ttl: Ttl,
    force_refresh: bool,
    remote_call: F,
  ) -> Result<T, ApiError>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
  {
    self
      .fetch_with_provenance(key, ttl, force_refresh, remote_call)
      .await
      .map(|result| result.value)
  }

  /// Same as [`CachedApi::fetch`], also reporting whether the value came from
  /// cache or network.
  pub async fn fetch_with_provenance<T, F, Fut>(
    &self,
    key: impl Into<CacheKey>,
    ttl: Ttl,
    force_refresh: bool,
    remote_call: F,
  ) -> Result<FetchResult<T>, ApiError>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
  {
    let key: CacheKey = key.into();

    if !force_refresh {
      if let Some(value) = self.store.get::<T>(key.as_str()) {
        debug!(key = %key, "Cache hit");
        return Ok(FetchResult::from_cache(value));
      }
    }

    debug!(key = %key, force_refresh, "Fetching from network");
    let store = &self.store;
    let cache_key = &key;
    let ttl = self.ttl.duration(ttl);
    let value = self
      .coordinator
      .run(key.as_str(), |cancel| async move {
        let value = remote_call(cancel.clone()).await?;
        if !store.put_if(cache_key, &value, ttl, || !cancel.is_cancelled()) {
          return Err(ApiError::Cancelled);
        }
        Ok::<_, ApiError>(value)
      })
      .await?;

    Ok(FetchResult::from_network(value))
  }

  /// Caller-side recovery for payload shape drift: on a decoding error,
  /// drop the cached entry and force one refetch. Any other error, or a
  /// second decoding error, is returned as is.
  pub async fn fetch_refreshing_on_decode_error<T, F, Fut>(
    &self,
    key: impl Into<CacheKey>,
    ttl: Ttl,
    force_refresh: bool,
    remote_call: F,
  ) -> Result<T, ApiError>
  where
    T: Serialize + DeserializeOwned,
    F: Fn(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
  {
    let key: CacheKey = key.into();
    match self.fetch(&key, ttl, force_refresh, &remote_call).await {
      Err(ApiError::Decoding(reason)) => {
        debug!(key = %key, %reason, "Decode failed, retrying with a forced refresh");
        self.store.remove(key.as_str());
        self.fetch(&key, ttl, true, &remote_call).await
      }
      other => other,
    }
  }

  /// GET `endpoint` through the cache, decoding the envelope payload as `T`.
  pub async fn get_json<T>(
    &self,
    endpoint: &str,
    key: impl Into<CacheKey>,
    ttl: Ttl,
    force_refresh: bool,
  ) -> Result<T, ApiError>
  where
    T: Serialize + DeserializeOwned,
  {
    self
      .get_json_with_provenance(endpoint, key, ttl, force_refresh)
      .await
      .map(|result| result.value)
  }

  pub async fn get_json_with_provenance<T>(
    &self,
    endpoint: &str,
    key: impl Into<CacheKey>,
    ttl: Ttl,
    force_refresh: bool,
  ) -> Result<FetchResult<T>, ApiError>
  where
    T: Serialize + DeserializeOwned,
  {
    let remote = Arc::clone(&self.remote);
    self
      .fetch_with_provenance(key, ttl, force_refresh, |_| async move {
        remote.get(endpoint).await?.into_data::<T>()
      })
      .await
  }

  /// Run a write directly against the remote API, then invalidate.
  ///
  /// Invalidation happens whatever the outcome: a failed write may still have
  /// reached the server.
  pub async fn write<T, F, Fut>(&self, invalidation: Invalidation, remote_call: F) -> Result<T, ApiError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
  {
    let result = remote_call().await;
    self.invalidate(&invalidation);
    result
  }

  /// Like [`CachedApi::write`], but registered with the coordinator under
  /// `key` so a repeated submission supersedes the earlier one.
  pub async fn write_exclusive<T, F, Fut>(
    &self,
    key: &str,
    invalidation: Invalidation,
    remote_call: F,
  ) -> Result<T, ApiError>
  where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
  {
    let result = self.coordinator.run(key, remote_call).await;
    self.invalidate(&invalidation);
    result
  }

  /// POST `body` to `endpoint` and decode the response payload.
  pub async fn post_json<T: DeserializeOwned>(
    &self,
    endpoint: &str,
    body: Value,
    invalidation: Invalidation,
  ) -> Result<T, ApiError> {
    let remote = Arc::clone(&self.remote);
    self
      .write(invalidation, || async move {
        remote.post(endpoint, Some(body)).await?.into_data::<T>()
      })
      .await
  }

  /// PUT `body` to `endpoint` and decode the response payload.
  pub async fn put_json<T: DeserializeOwned>(
    &self,
    endpoint: &str,
    body: Value,
    invalidation: Invalidation,
  ) -> Result<T, ApiError> {
    let remote = Arc::clone(&self.remote);
    self
      .write(invalidation, || async move {
        remote.put(endpoint, Some(body)).await?.into_data::<T>()
      })
      .await
  }

  /// DELETE `endpoint`, ignoring any response payload.
  pub async fn delete_json(&self, endpoint: &str, invalidation: Invalidation) -> Result<(), ApiError> {
    let remote = Arc::clone(&self.remote);
    self
      .write(invalidation, || async move {
        let envelope = remote.delete(endpoint).await?;
        if !envelope.success {
          return Err(ApiError::Server(envelope.error_message()));
        }
        Ok(())
      })
      .await
  }

  /// Drop the cache entries described by `invalidation`, cancelling any
  /// in-flight fetch for them first so it cannot cache the old value.
  pub fn invalidate(&self, invalidation: &Invalidation) {
    match invalidation {
      Invalidation::Nothing => {}
      Invalidation::Keys(keys) => {
        for key in keys {
          self.coordinator.cancel(key);
          self.store.remove(key);
        }
      }
      Invalidation::Tags(tags) => {
        for tag in tags {
          self
            .coordinator
            .cancel_where(|key| CacheKey::from(key).tag() == tag.as_str());
          self.store.invalidate_tag(tag);
        }
      }
      Invalidation::All => {
        self.coordinator.cancel_all();
        self.store.clear();
      }
    }
  }

  pub fn statistics(&self) -> CacheStatistics {
    self.store.statistics()
  }

  /// Cancel every in-flight fetch.
  pub fn cancel_all(&self) {
    self.coordinator.cancel_all();
  }

  /// Logout / "clear all data": stop in-flight fetches, then wipe both tiers.
  pub fn clear_all(&self) {
    self.cancel_all();
    self.store.clear();
    info!("Cleared all cached data");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::ApiEnvelope;
  use crate::api::Method;
  use crate::cache::ManualClock;
  use async_trait::async_trait;
  use serde::Deserialize;
  use serde_json::json;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;
  use std::time::Duration;
  use tokio::sync::oneshot;

  /// In-process stand-in for the HR API.
  #[derive(Default)]
  struct MockApi {
    data: Mutex<HashMap<String, Value>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
  }

  impl MockApi {
    fn with(endpoint: &str, data: Value) -> Self {
      let api = Self::default();
      api.set(endpoint, data);
      api
    }

    fn set(&self, endpoint: &str, data: Value) {
      self.data.lock().unwrap().insert(endpoint.to_string(), data);
    }

    fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl RemoteApi for MockApi {
    async fn request(
      &self,
      method: Method,
      endpoint: &str,
      body: Option<Value>,
    ) -> Result<ApiEnvelope, ApiError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if let Some(delay) = self.delay {
        tokio::time::sleep(delay).await;
      }
      match method {
        Method::Get => {
          let data = self.data.lock().unwrap().get(endpoint).cloned();
          match data {
            Some(data) => Ok(ApiEnvelope::ok(data)),
            None => Ok(ApiEnvelope::failure(format!("no route {}", endpoint))),
          }
        }
        Method::Put | Method::Post => {
          let body = body.unwrap_or(Value::Null);
          self.set(endpoint, body.clone());
          Ok(ApiEnvelope::ok(body))
        }
        Method::Delete => {
          self.data.lock().unwrap().remove(endpoint);
          Ok(ApiEnvelope::ok(Value::Null))
        }
      }
    }
  }

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Employee {
    id: u32,
    name: String,
  }

  fn service(api: MockApi) -> CachedApi<MockApi> {
    CachedApi::new(api, CacheStore::new(SqliteStorage::open_in_memory().unwrap()))
  }

  #[tokio::test]
  async fn test_second_read_comes_from_cache() {
    let api = service(MockApi::with("employees/7", json!({"id": 7, "name": "Ada"})));

    let first: FetchResult<Employee> = api
      .get_json_with_provenance("employees/7", "employee_7", Ttl::Long, false)
      .await
      .unwrap();
    let second: FetchResult<Employee> = api
      .get_json_with_provenance("employees/7", "employee_7", Ttl::Long, false)
      .await
      .unwrap();

    assert!(!first.is_cached());
    assert!(second.is_cached());
    assert_eq!(first.value, second.value);
    assert_eq!(api.remote().calls(), 1);
  }

  #[tokio::test]
  async fn test_force_refresh_bypasses_cache() {
    let api = service(MockApi::with("dashboard", json!({"total": 5})));

    let _: Value = api.get_json("dashboard", "dashboard", Ttl::Short, false).await.unwrap();
    api.remote().set("dashboard", json!({"total": 6}));

    let cached: Value = api.get_json("dashboard", "dashboard", Ttl::Short, false).await.unwrap();
    let fresh: Value = api.get_json("dashboard", "dashboard", Ttl::Short, true).await.unwrap();

    assert_eq!(cached, json!({"total": 5}));
    assert_eq!(fresh, json!({"total": 6}));
    assert_eq!(api.remote().calls(), 2);
    // The refresh overwrote the cached entry
    let again: Value = api.get_json("dashboard", "dashboard", Ttl::Short, false).await.unwrap();
    assert_eq!(again, json!({"total": 6}));
  }

  #[tokio::test]
  async fn test_expired_entry_refetches() {
    let clock = Arc::new(ManualClock::default());
    let store = CacheStore::new(SqliteStorage::open_in_memory().unwrap()).with_clock(clock.clone());
    let api = CachedApi::new(MockApi::with("dashboard", json!({"total": 5})), store);

    let _: Value = api.get_json("dashboard", "dash", Ttl::Short, false).await.unwrap();
    clock.advance(chrono::Duration::seconds(301));
    let _: Value = api.get_json("dashboard", "dash", Ttl::Short, false).await.unwrap();

    assert_eq!(api.remote().calls(), 2);
  }

  #[tokio::test]
  async fn test_remote_error_propagates_and_caches_nothing() {
    let api = service(MockApi::default());

    let result: Result<Value, _> = api.get_json("missing", "missing", Ttl::Medium, false).await;

    assert_eq!(result, Err(ApiError::Server("no route missing".into())));
    assert_eq!(api.statistics().disk_count, 0);
    assert_eq!(api.coordinator().active_count(), 0);
  }

  #[tokio::test]
  async fn test_authentication_error_is_not_retried() {
    let api = service(MockApi::default());
    let calls = AtomicUsize::new(0);

    let result: Result<Value, _> = api
      .fetch("profile", Ttl::Long, false, |_| async {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(ApiError::Authentication)
      })
      .await;

    assert_eq!(result, Err(ApiError::Authentication));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_concurrent_fetches_same_key_complete() {
    let api = service(MockApi {
      delay: Some(Duration::from_millis(50)),
      ..MockApi::with("employees?page=1", json!([1, 2, 3]))
    });
    let key = CacheKey::builder("list").param("p1").build();

    let (first, second) = tokio::time::timeout(Duration::from_secs(5), async {
      tokio::join!(
        api.get_json::<Vec<u32>>("employees?page=1", &key, Ttl::Medium, false),
        api.get_json::<Vec<u32>>("employees?page=1", &key, Ttl::Medium, false),
      )
    })
    .await
    .expect("concurrent fetches should not deadlock");

    // The earlier request was superseded by the later one
    assert_eq!(first, Err(ApiError::Cancelled));
    assert_eq!(second, Ok(vec![1, 2, 3]));
    assert_eq!(api.coordinator().active_count(), 0);
    assert!(!api.coordinator().is_active(key.as_str()));
  }

  #[tokio::test]
  async fn test_write_invalidates_key() {
    let api = service(MockApi::with("employees/7", json!({"id": 7, "name": "Ada"})));

    let before: Employee = api.get_json("employees/7", "employee_7", Ttl::Long, false).await.unwrap();
    assert_eq!(before.name, "Ada");

    let updated: Employee = api
      .put_json(
        "employees/7",
        json!({"id": 7, "name": "Grace"}),
        Invalidation::key("employee_7"),
      )
      .await
      .unwrap();
    assert_eq!(updated.name, "Grace");

    let after: FetchResult<Employee> = api
      .get_json_with_provenance("employees/7", "employee_7", Ttl::Long, false)
      .await
      .unwrap();
    assert!(!after.is_cached());
    assert_eq!(after.value.name, "Grace");
    assert_eq!(api.remote().calls(), 3);
  }

  #[tokio::test]
  async fn test_write_invalidates_tag_only() {
    let api = service(MockApi::default());
    let page1 = CacheKey::builder("employees").param(1).opt(None::<&str>).build();
    let page2 = CacheKey::builder("employees").param(2).opt(None::<&str>).build();
    let invoices = CacheKey::builder("invoices").param(1).build();
    for key in [&page1, &page2, &invoices] {
      let _: u32 = api.fetch(key, Ttl::Medium, false, |_| async { Ok(1) }).await.unwrap();
    }

    api
      .post_json::<Value>("employees", json!({"name": "Lin"}), Invalidation::tag("employees"))
      .await
      .unwrap();

    assert_eq!(api.store().get::<u32>(page1.as_str()), None);
    assert_eq!(api.store().get::<u32>(page2.as_str()), None);
    assert_eq!(api.store().get::<u32>(invoices.as_str()), Some(1));
  }

  #[tokio::test]
  async fn test_write_cancels_in_flight_fetch_of_invalidated_key() {
    let api = service(MockApi::with("employees/7", json!({"id": 7, "name": "Ada"})));
    let (release_tx, release_rx) = oneshot::channel::<()>();

    // Forced fetch that read the old record and is held open until released
    let stale = api.fetch::<Employee, _, _>("employee_7", Ttl::Long, true, |_| async move {
      let _ = release_rx.await;
      Ok(Employee {
        id: 7,
        name: "Ada".into(),
      })
    });
    let write = async {
      while !api.coordinator().is_active("employee_7") {
        tokio::task::yield_now().await;
      }
      let updated: Employee = api
        .put_json(
          "employees/7",
          json!({"id": 7, "name": "Grace"}),
          Invalidation::key("employee_7"),
        )
        .await
        .unwrap();
      let _ = release_tx.send(());
      updated
    };

    let (stale, updated) = tokio::join!(stale, write);
    assert_eq!(stale, Err(ApiError::Cancelled));
    assert_eq!(updated.name, "Grace");

    let after: FetchResult<Employee> = api
      .get_json_with_provenance("employees/7", "employee_7", Ttl::Long, false)
      .await
      .unwrap();
    assert!(!after.is_cached());
    assert_eq!(after.value.name, "Grace");
  }

  #[tokio::test]
  async fn test_tag_write_cancels_in_flight_page_fetch() {
    let api = service(MockApi::default());
    let page = CacheKey::builder("employees").param(1).build();
    let (release_tx, release_rx) = oneshot::channel::<()>();

    let stale = api.fetch::<Vec<u32>, _, _>(&page, Ttl::Medium, false, |_| async move {
      let _ = release_rx.await;
      Ok(vec![1, 2])
    });
    let write = async {
      while !api.coordinator().is_active(page.as_str()) {
        tokio::task::yield_now().await;
      }
      api
        .post_json::<Value>("employees", json!({"name": "Lin"}), Invalidation::tag("employees"))
        .await
        .unwrap();
      let _ = release_tx.send(());
    };

    let (stale, ()) = tokio::join!(stale, write);
    assert_eq!(stale, Err(ApiError::Cancelled));
    assert_eq!(api.store().get::<Vec<u32>>(page.as_str()), None);
    assert_eq!(api.coordinator().active_count(), 0);
  }

  #[tokio::test]
  async fn test_failed_write_still_invalidates() {
    let api = service(MockApi::default());
    api.store().put("employee_7", &1, chrono::Duration::hours(1));

    let result: Result<(), _> = api
      .write(Invalidation::key("employee_7"), || async {
        Err(ApiError::Network("connection reset".into()))
      })
      .await;

    assert!(result.is_err());
    assert_eq!(api.store().get::<u32>("employee_7"), None);
  }

  #[tokio::test]
  async fn test_delete_with_full_invalidation() {
    let api = service(MockApi::with("leave/3", json!({"days": 2})));
    let _: Value = api.get_json("leave/3", "leave_3", Ttl::Medium, false).await.unwrap();
    let _: Value = api.fetch("holidays", Ttl::Extended, false, |_| async { Ok(json!([])) }).await.unwrap();

    api.delete_json("leave/3", Invalidation::All).await.unwrap();

    let stats = api.statistics();
    assert_eq!(stats.disk_count, 0);
    assert_eq!(stats.memory_count, 0);
  }

  #[tokio::test]
  async fn test_write_exclusive_supersedes_duplicate_submission() {
    let api = service(MockApi::default());
    let submitted = AtomicUsize::new(0);

    let submit = |n: u32| {
      let api = &api;
      let submitted = &submitted;
      async move {
        api
          .write_exclusive("submit_expense", Invalidation::tag("expenses"), |_| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            submitted.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ApiError>(n)
          })
          .await
      }
    };

    let (first, second) = tokio::join!(submit(1), submit(2));
    assert_eq!(first, Err(ApiError::Cancelled));
    assert_eq!(second, Ok(2));
    assert_eq!(submitted.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_decode_error_triggers_one_forced_refresh() {
    let api = service(MockApi::default());
    let attempts = AtomicUsize::new(0);

    let value: u32 = api
      .fetch_refreshing_on_decode_error("payslip_4", Ttl::Long, false, |_| {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst);
        async move {
          if attempt == 0 {
            Err(ApiError::Decoding("unexpected field".into()))
          } else {
            Ok(4)
          }
        }
      })
      .await
      .unwrap();

    assert_eq!(value, 4);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_decode_error_retried_only_once() {
    let api = service(MockApi::default());
    let attempts = AtomicUsize::new(0);

    let result: Result<u32, _> = api
      .fetch_refreshing_on_decode_error("payslip_4", Ttl::Long, false, |_| {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { Err(ApiError::Decoding("still wrong".into())) }
      })
      .await;

    assert!(matches!(result, Err(ApiError::Decoding(_))));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_clear_all_cancels_and_wipes() {
    let api = service(MockApi::default());
    let _: u32 = api.fetch("dash", Ttl::Short, false, |_| async { Ok(5) }).await.unwrap();

    let pending = api.fetch::<u32, _, _>("list_p1", Ttl::Medium, false, |cancel| async move {
      cancel.cancelled().await;
      Ok(0)
    });
    let clear = async {
      while api.coordinator().active_count() == 0 {
        tokio::task::yield_now().await;
      }
      api.clear_all();
    };

    let (pending, ()) = tokio::join!(pending, clear);
    assert_eq!(pending, Err(ApiError::Cancelled));
    assert_eq!(api.statistics().disk_count, 0);
    assert_eq!(api.store().get::<u32>("dash"), None);
  }
}
