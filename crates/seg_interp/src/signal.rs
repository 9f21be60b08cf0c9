//! Modification signal with deterministic unsubscription.
//!
//! The volume owner fires `notify` after mutating voxel data; subscribers
//! hold an RAII token that removes their handler on release or drop, so no
//! handler can outlive the component that registered it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

type Handler = Arc<dyn Fn() + Send + Sync>;

/// Unique handle for one registered handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Modification-notification source, owned by a volume.
pub struct ModifiedSignal {
  next_id: AtomicU64,
  handlers: Arc<Mutex<Vec<(SubscriptionId, Handler)>>>,
}

impl ModifiedSignal {
  pub fn new() -> Self {
    Self {
      next_id: AtomicU64::new(1),
      handlers: Arc::new(Mutex::new(Vec::new())),
    }
  }

  /// Register a handler, returning the token that keeps it alive.
  pub fn subscribe(&self, handler: impl Fn() + Send + Sync + 'static) -> Subscription {
    let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
    self
      .handlers
      .lock()
      .unwrap()
      .push((id, Arc::new(handler)));

    Subscription {
      id,
      handlers: Arc::downgrade(&self.handlers),
    }
  }

  /// Fire the signal, invoking every registered handler.
  ///
  /// Handlers run outside the internal lock, so they may freely touch the
  /// signal's owner (e.g. rescan the volume that fired).
  pub fn notify(&self) {
    let handlers: Vec<Handler> = {
      let entries = self.handlers.lock().unwrap();
      entries.iter().map(|(_, h)| Arc::clone(h)).collect()
    };

    for handler in handlers {
      handler();
    }
  }

  /// Number of live subscriptions.
  pub fn subscriber_count(&self) -> usize {
    self.handlers.lock().unwrap().len()
  }
}

impl Default for ModifiedSignal {
  fn default() -> Self {
    Self::new()
  }
}

/// RAII unsubscribe token.
///
/// Dropping (or calling [`release`](Subscription::release)) removes the
/// handler from the signal. A signal that is already gone is a no-op.
pub struct Subscription {
  id: SubscriptionId,
  handlers: Weak<Mutex<Vec<(SubscriptionId, Handler)>>>,
}

impl Subscription {
  pub fn id(&self) -> SubscriptionId {
    self.id
  }

  /// Explicitly unsubscribe. Equivalent to dropping the token.
  pub fn release(self) {}

  fn unsubscribe(&self) {
    if let Some(handlers) = self.handlers.upgrade() {
      handlers.lock().unwrap().retain(|(id, _)| *id != self.id);
    }
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.unsubscribe();
  }
}
