//! Process-scoped mapping from volume identity to the tracker responsible
//! for it.
//!
//! Injected into whatever needs lookup-by-volume instead of living as
//! ambient global state. The registry stores handles only, so it never
//! extends a tracker's lifetime; trackers keep their entries current from
//! their attach, detach, and drop paths.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::{TrackerId, VolumeId};

/// One tracker per volume.
///
/// Registering a tracker for an already mapped volume replaces the entry:
/// the intent is "the one tracker responsible for a given volume", not a
/// multi-subscriber registry.
#[derive(Default)]
pub struct VolumeRegistry {
  entries: Mutex<HashMap<VolumeId, TrackerId>>,
}

impl VolumeRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// The tracker currently responsible for `volume`, if any.
  pub fn lookup(&self, volume: VolumeId) -> Option<TrackerId> {
    self.entries.lock().unwrap().get(&volume).copied()
  }

  pub fn len(&self) -> usize {
    self.entries.lock().unwrap().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.lock().unwrap().is_empty()
  }

  pub(crate) fn register(&self, volume: VolumeId, tracker: TrackerId) {
    self.entries.lock().unwrap().insert(volume, tracker);
  }

  /// Remove the entry for `volume`, but only if it still points at
  /// `tracker`; another tracker may have taken the volume over since.
  pub(crate) fn unregister_volume(&self, volume: VolumeId, tracker: TrackerId) {
    let mut entries = self.entries.lock().unwrap();
    if entries.get(&volume) == Some(&tracker) {
      entries.remove(&volume);
    }
  }

  /// Remove every entry pointing at `tracker`.
  pub(crate) fn unregister_tracker(&self, tracker: TrackerId) {
    self
      .entries
      .lock()
      .unwrap()
      .retain(|_, entry| *entry != tracker);
  }
}
