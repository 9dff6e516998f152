//! In-flight request registry with cancel-and-replace semantics.
//!
//! Each key holds at most one registered operation. Starting a new operation
//! for a key cancels the one already registered there. Cancellation is strict:
//! a superseded caller always receives [`ApiError::Cancelled`], even if its
//! work happened to finish, so no caller ever sees a result older than the
//! request that replaced it.
//!
//! # Example
//!
//! ```ignore
//! let coordinator = RequestCoordinator::new();
//! let employees = coordinator
//!     .run("employees_1_none_all", |cancel| async move {
//!         api.get("employees?page=1").await
//!     })
//!     .await?;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::ApiError;

struct Slot {
  id: u64,
  cancel: CancellationToken,
}

/// Registry of in-flight operations keyed by coordinator key.
///
/// The registry lock only guards registration, lookup, and removal; it is
/// never held while an operation runs, so different keys proceed in parallel.
#[derive(Default)]
pub struct RequestCoordinator {
  slots: Mutex<HashMap<String, Slot>>,
  next_id: AtomicU64,
}

impl RequestCoordinator {
  pub fn new() -> Self {
    Self::default()
  }

  fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
    self.slots.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Run `operation` as the registered unit of work for `key`.
  ///
  /// Any operation already registered for `key` is cancelled and replaced.
  /// `operation` receives the cancellation token for its slot; it is also
  /// dropped at its next suspension point once the token fires.
  pub async fn run<T, F, Fut>(&self, key: &str, operation: F) -> Result<T, ApiError>
  where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
  {
    let cancel = CancellationToken::new();
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);

    {
      let mut slots = self.slots();
      let previous = slots.insert(
        key.to_string(),
        Slot {
          id,
          cancel: cancel.clone(),
        },
      );
      if let Some(previous) = previous {
        debug!(key, "Superseding in-flight request");
        previous.cancel.cancel();
      }
    }

    // Unregisters on every exit path, including the caller dropping this future.
    let _registration = Registration {
      coordinator: self,
      key,
      id,
    };

    let work = operation(cancel.clone());
    let result = tokio::select! {
      biased;
      _ = cancel.cancelled() => Err(ApiError::Cancelled),
      result = work => result,
    };

    if cancel.is_cancelled() {
      return Err(ApiError::Cancelled);
    }
    result
  }

  /// Cancel the operation registered for `key` and drop its slot.
  pub fn cancel(&self, key: &str) {
    if let Some(slot) = self.slots().remove(key) {
      debug!(key, "Cancelled in-flight request");
      slot.cancel.cancel();
    }
  }

  /// Cancel every operation whose key satisfies `matches`. Returns the
  /// number cancelled.
  pub fn cancel_where(&self, matches: impl Fn(&str) -> bool) -> usize {
    let cancelled: Vec<Slot> = {
      let mut slots = self.slots();
      let keys: Vec<String> = slots.keys().filter(|key| matches(key)).cloned().collect();
      keys.iter().filter_map(|key| slots.remove(key)).collect()
    };
    debug!(count = cancelled.len(), "Cancelled matching in-flight requests");
    for slot in &cancelled {
      slot.cancel.cancel();
    }
    cancelled.len()
  }

  /// Cancel every registered operation.
  pub fn cancel_all(&self) {
    let drained: Vec<Slot> = self.slots().drain().map(|(_, slot)| slot).collect();
    debug!(count = drained.len(), "Cancelling all in-flight requests");
    for slot in drained {
      slot.cancel.cancel();
    }
  }

  /// Number of registered operations.
  pub fn active_count(&self) -> usize {
    self.slots().len()
  }

  pub fn is_active(&self, key: &str) -> bool {
    self.slots().contains_key(key)
  }
}

struct Registration<'a> {
  coordinator: &'a RequestCoordinator,
  key: &'a str,
  id: u64,
}

impl Drop for Registration<'_> {
  fn drop(&mut self) {
    let mut slots = self.coordinator.slots();
    // A newer operation may own the slot by now; leave it alone.
    if slots.get(self.key).is_some_and(|slot| slot.id == self.id) {
      slots.remove(self.key);
    }
  }
}
