//! Per-axis slice occupancy tracking for an externally owned label volume.
//!
//! The tracker keeps, for each of the three principal axes, one count per
//! slice index. A count of zero means the slice holds no annotation; the
//! interpolation coordinator uses this to find bounding slices. Counts stay
//! in sync with the volume through three update paths: a full-volume scan,
//! a signed sub-volume diff, and a signed single-slice diff (the per-paint-
//! stroke hot path).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use thiserror::Error;

use crate::registry::VolumeRegistry;
use crate::signal::Subscription;
use crate::types::{Axis, Label, TrackerId, VolumeId};
use crate::volume::LabelVolume;

/// Attach failures.
///
/// Everything else in this module is a silent no-op by contract: malformed
/// update arguments come from routine UI edge interactions and must not
/// interrupt an editing session.
#[derive(Debug, Error)]
pub enum AttachError {
  /// The volume is not exactly 3-dimensional (2D or 3D+t input).
  #[error("occupancy tracking needs a 3D volume, got {dims} dimension(s)")]
  InvalidDimensionality { dims: usize },
}

// =============================================================================
// SliceCounts
// =============================================================================

/// The three per-axis count arrays.
///
/// `counts[axis][i]` is the running sum of label values over the slice
/// perpendicular to `axis` at index `i`; zero sum means the slice is treated
/// as empty. Summing (rather than counting non-zero voxels) is what makes
/// signed diff updates composable - a stroke and its undo cancel exactly.
/// For multi-label data with unusual label codes a sum could in principle
/// cancel on a non-empty slice; debug assertions below flag any count going
/// negative, release builds clamp and carry on.
#[derive(Debug, Default)]
struct SliceCounts {
  counts: [Vec<u64>; 3],
}

impl SliceCounts {
  fn clear(&mut self) {
    for counts in &mut self.counts {
      counts.clear();
    }
  }

  /// Size all three arrays for a volume of the given extents, zero-filled.
  fn reset(&mut self, extents: [usize; 3]) {
    for (axis, counts) in self.counts.iter_mut().enumerate() {
      counts.clear();
      counts.resize(extents[axis], 0);
    }
  }

  #[inline]
  fn extent(&self, axis: Axis) -> usize {
    self.counts[axis.index()].len()
  }

  #[inline]
  fn get(&self, axis: Axis, index: usize) -> Option<u64> {
    self.counts[axis.index()].get(index).copied()
  }

  fn axis_counts(&self, axis: Axis) -> Vec<u64> {
    self.counts[axis.index()].clone()
  }

  fn axis_total(&self, axis: Axis) -> u64 {
    self.counts[axis.index()].iter().sum()
  }

  #[inline]
  fn apply(&mut self, axis: Axis, index: usize, delta: i64) {
    let slot = &mut self.counts[axis.index()][index];
    debug_assert!(
      *slot as i64 + delta >= 0,
      "occupancy count went negative at axis {:?} index {}: inconsistent diff",
      axis,
      index
    );
    *slot = (*slot as i64 + delta).max(0) as u64;
  }

  /// Fold one slice of values (absolute or delta) at `(axis, index)` into
  /// the counts. Single pass: row sums feed the second perpendicular array,
  /// per-pixel values feed the first, and the slice total lands in
  /// `counts[axis][index]`.
  fn scan_slice(&mut self, axis: Axis, index: usize, pixels: &[Label]) {
    let [u_axis, v_axis] = axis.others();
    let u_max = self.extent(u_axis);
    let v_max = self.extent(v_axis);
    debug_assert_eq!(pixels.len(), u_max * v_max);

    let mut slice_total: i64 = 0;
    for v in 0..v_max {
      let row = &pixels[v * u_max..(v + 1) * u_max];
      let mut row_total: i64 = 0;
      for (u, &value) in row.iter().enumerate() {
        if value != 0 {
          self.apply(u_axis, u, value as i64);
          row_total += value as i64;
        }
      }
      if row_total != 0 {
        self.apply(v_axis, v, row_total);
      }
      slice_total += row_total;
    }
    self.apply(axis, index, slice_total);
  }
}

// =============================================================================
// OccupancyTracker
// =============================================================================

struct TrackerCore {
  volume: Option<Arc<dyn LabelVolume>>,
  subscription: Option<Subscription>,
  counts: SliceCounts,
}

struct TrackerShared {
  core: Mutex<TrackerCore>,
  /// Echo guard: while set, modified notifications are ignored.
  suppress_echo: AtomicBool,
}

/// Tracks per-slice occupancy for one attached volume.
///
/// A tracker observes the attached volume's modified signal and reacts with
/// a full rescan, unless the caller engaged [`suppress_echo`](Self::suppress_echo)
/// around a write-back of interpolation results. The registry passed at
/// construction maps volume identity to the tracker responsible for it and
/// is kept current by attach, detach, and drop.
pub struct OccupancyTracker {
  id: TrackerId,
  registry: Arc<VolumeRegistry>,
  shared: Arc<TrackerShared>,
}

impl OccupancyTracker {
  pub fn new(registry: Arc<VolumeRegistry>) -> Self {
    Self {
      id: TrackerId::new(),
      registry,
      shared: Arc::new(TrackerShared {
        core: Mutex::new(TrackerCore {
          volume: None,
          subscription: None,
          counts: SliceCounts::default(),
        }),
        suppress_echo: AtomicBool::new(false),
      }),
    }
  }

  pub fn id(&self) -> TrackerId {
    self.id
  }

  /// Attach a volume, replacing any previous one.
  ///
  /// Clears and resizes the count arrays, subscribes to the volume's
  /// modified signal, performs a full scan, and registers the volume in the
  /// registry. Re-attaching the volume that is already attached forces a
  /// full rescan, which is the cheap way to recover consistency after
  /// mutations the tracker could not observe incrementally.
  pub fn attach(&self, volume: Arc<dyn LabelVolume>) -> Result<(), AttachError> {
    let shape = volume.shape();
    if shape.len() != 3 {
      return Err(AttachError::InvalidDimensionality { dims: shape.len() });
    }

    let mut core = self.shared.core.lock().unwrap();

    // Let go of the previous volume: registry entry, subscription, counts.
    if let Some(previous) = core.volume.take() {
      self.registry.unregister_volume(previous.id(), self.id);
    }
    drop(core.subscription.take());
    core.counts.reset([shape[0], shape[1], shape[2]]);

    let weak = Arc::downgrade(&self.shared);
    core.subscription = Some(volume.modified().subscribe(move || {
      on_volume_modified(&weak);
    }));

    #[cfg(feature = "tracing")]
    tracing::debug!(volume = volume.id().raw(), ?shape, "attaching volume, full scan");

    scan_volume(&mut core.counts, volume.as_ref());
    self.registry.register(volume.id(), self.id);
    core.volume = Some(volume);

    Ok(())
  }

  /// Detach the current volume, if any. Idempotent.
  pub fn detach(&self) {
    let mut core = self.shared.core.lock().unwrap();
    if let Some(volume) = core.volume.take() {
      self.registry.unregister_volume(volume.id(), self.id);
    }
    drop(core.subscription.take());
    core.counts.clear();
  }

  /// Full scan of the currently attached volume.
  ///
  /// Re-reads the volume's shape first, so a volume that was resized in
  /// place comes back with correctly sized arrays.
  pub fn rescan(&self) {
    let mut core = self.shared.core.lock().unwrap();
    rescan_locked(&mut core);
  }

  /// Fold a signed delta volume into the counts in one pass.
  ///
  /// The diff expresses changes since the counts were last consistent, not
  /// absolute values. Silently no-ops when nothing is attached, the diff is
  /// not 3D, or its shape does not match the attached volume.
  pub fn apply_volume_diff(&self, diff: &dyn LabelVolume) {
    let mut core = self.shared.core.lock().unwrap();
    let Some(attached) = core.volume.clone() else {
      return;
    };

    let shape = diff.shape();
    if shape.len() != 3 || shape != attached.shape() {
      #[cfg(feature = "tracing")]
      tracing::trace!(?shape, "volume diff ignored: shape mismatch");
      return;
    }

    let slice_len = shape[0] * shape[1];
    diff.with_data(&mut |data| {
      if data.len() < slice_len * shape[2] {
        return;
      }
      for z in 0..shape[2] {
        core
          .counts
          .scan_slice(Axis::Z, z, &data[z * slice_len..][..slice_len]);
      }
    });
  }

  /// Fold a single slice of signed deltas into the counts.
  ///
  /// O(slice area) - this is the hot path invoked after every paint stroke
  /// confined to one slice. `pixels` is row-major with the first
  /// perpendicular axis varying fastest, the same order the volume buffer
  /// uses. Silently no-ops on an axis index above 2, an out-of-range slice
  /// index (which also covers the unattached case), or a pixel buffer of
  /// the wrong length.
  pub fn apply_slice_diff(&self, axis: usize, index: usize, pixels: &[Label]) {
    let Some(axis) = Axis::from_index(axis) else {
      #[cfg(feature = "tracing")]
      tracing::trace!(axis, "slice diff ignored: axis out of range");
      return;
    };

    let mut core = self.shared.core.lock().unwrap();
    if index >= core.counts.extent(axis) {
      return;
    }
    let [u_axis, v_axis] = axis.others();
    if pixels.len() != core.counts.extent(u_axis) * core.counts.extent(v_axis) {
      #[cfg(feature = "tracing")]
      tracing::trace!(len = pixels.len(), "slice diff ignored: pixel count mismatch");
      return;
    }

    core.counts.scan_slice(axis, index, pixels);
  }

  /// Engage the echo guard for the returned scope.
  ///
  /// Callers that write interpolation results back into the volume hold
  /// this across the write, so the volume's own modified notification does
  /// not trigger a redundant full rescan. The guard is restored on drop,
  /// including on unwind; it is not meant to be nested.
  pub fn suppress_echo(&self) -> EchoGuard<'_> {
    self.shared.suppress_echo.store(true, Ordering::Release);
    EchoGuard {
      flag: &self.shared.suppress_echo,
    }
  }

  /// True while an [`EchoGuard`] is held.
  pub fn is_suppressing_echo(&self) -> bool {
    self.shared.suppress_echo.load(Ordering::Acquire)
  }

  pub fn is_attached(&self) -> bool {
    self.shared.core.lock().unwrap().volume.is_some()
  }

  /// Identity of the attached volume.
  pub fn volume_id(&self) -> Option<VolumeId> {
    self.shared.core.lock().unwrap().volume.as_ref().map(|v| v.id())
  }

  /// Shared handle to the attached volume.
  pub fn volume(&self) -> Option<Arc<dyn LabelVolume>> {
    self.shared.core.lock().unwrap().volume.clone()
  }

  /// Number of slices along `axis`; zero when nothing is attached.
  pub fn extent(&self, axis: Axis) -> usize {
    self.shared.core.lock().unwrap().counts.extent(axis)
  }

  /// Occupancy count of one slice, `None` when the index is out of range.
  pub fn slice_count(&self, axis: Axis, index: usize) -> Option<u64> {
    self.shared.core.lock().unwrap().counts.get(axis, index)
  }

  /// True when the slice holds any annotation.
  pub fn is_occupied(&self, axis: Axis, index: usize) -> bool {
    self.slice_count(axis, index).is_some_and(|c| c > 0)
  }

  /// Snapshot of one axis' count array.
  pub fn axis_counts(&self, axis: Axis) -> Vec<u64> {
    self.shared.core.lock().unwrap().counts.axis_counts(axis)
  }

  /// Sum of all counts along one axis: the volume's total label mass.
  pub fn axis_total(&self, axis: Axis) -> u64 {
    self.shared.core.lock().unwrap().counts.axis_total(axis)
  }

  /// Occupancy row as text, `O` for occupied and `.` for empty slices.
  pub fn occupancy_pattern(&self, axis: Axis) -> String {
    self
      .axis_counts(axis)
      .iter()
      .map(|&c| if c > 0 { 'O' } else { '.' })
      .collect()
  }
}

impl Drop for OccupancyTracker {
  fn drop(&mut self) {
    // The subscription token inside the core drops with the shared state;
    // only the registry entry needs explicit removal.
    self.registry.unregister_tracker(self.id);
  }
}

/// Modified-signal handler: rescan unless the echo guard is engaged or the
/// tracker is already gone.
fn on_volume_modified(shared: &Weak<TrackerShared>) {
  let Some(shared) = shared.upgrade() else {
    return;
  };
  if shared.suppress_echo.load(Ordering::Acquire) {
    #[cfg(feature = "tracing")]
    tracing::trace!("modified notification suppressed by echo guard");
    return;
  }
  let mut core = shared.core.lock().unwrap();
  rescan_locked(&mut core);
}

fn rescan_locked(core: &mut TrackerCore) {
  let Some(volume) = core.volume.clone() else {
    return;
  };
  let shape = volume.shape();
  if shape.len() != 3 {
    return;
  }
  core.counts.reset([shape[0], shape[1], shape[2]]);
  scan_volume(&mut core.counts, volume.as_ref());
}

/// Accumulate a whole volume, decomposed into per-slice scans along Z.
///
/// Using the same slice scan as the incremental path keeps the two exactly
/// equivalent: a full scan is nothing but every slice scanned once.
fn scan_volume(counts: &mut SliceCounts, volume: &dyn LabelVolume) {
  let shape = volume.shape();
  let slice_len = shape[0] * shape[1];

  volume.with_data(&mut |data| {
    if data.len() < slice_len * shape[2] {
      return;
    }
    for z in 0..shape[2] {
      counts.scan_slice(Axis::Z, z, &data[z * slice_len..][..slice_len]);
    }
  });
}

/// Scoped suppression of modification echoes.
///
/// Two states exist: tracking (flag clear) and suppressing (flag set, guard
/// alive). Dropping the guard always returns the tracker to tracking.
pub struct EchoGuard<'a> {
  flag: &'a AtomicBool,
}

impl Drop for EchoGuard<'_> {
  fn drop(&mut self) {
    self.flag.store(false, Ordering::Release);
  }
}

#[cfg(test)]
#[path = "occupancy_test.rs"]
mod occupancy_test;
