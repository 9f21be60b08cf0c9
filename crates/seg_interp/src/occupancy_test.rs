use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;
use crate::signal::ModifiedSignal;
use crate::volume::ArrayVolume;

fn new_tracker() -> (Arc<VolumeRegistry>, OccupancyTracker) {
  let registry = Arc::new(VolumeRegistry::new());
  let tracker = OccupancyTracker::new(Arc::clone(&registry));
  (registry, tracker)
}

/// Wrapper that counts voxel-buffer reads, i.e. scans.
struct CountingVolume {
  inner: ArrayVolume,
  reads: AtomicUsize,
}

impl CountingVolume {
  fn new(shape: [usize; 3]) -> Self {
    Self {
      inner: ArrayVolume::new(shape),
      reads: AtomicUsize::new(0),
    }
  }

  fn reads(&self) -> usize {
    self.reads.load(Ordering::Relaxed)
  }
}

impl LabelVolume for CountingVolume {
  fn id(&self) -> VolumeId {
    self.inner.id()
  }

  fn shape(&self) -> Vec<usize> {
    self.inner.shape()
  }

  fn with_data(&self, f: &mut dyn FnMut(&[Label])) {
    self.reads.fetch_add(1, Ordering::Relaxed);
    self.inner.with_data(f);
  }

  fn modified(&self) -> &ModifiedSignal {
    self.inner.modified()
  }
}

/// Pull one z-slice out of a volume, in the buffer's own pixel order.
fn z_slice(volume: &ArrayVolume, z: usize) -> Vec<Label> {
  let shape = volume.shape();
  let slice_len = shape[0] * shape[1];
  let mut pixels = Vec::new();
  volume.with_data(&mut |data| {
    pixels = data[z * slice_len..(z + 1) * slice_len].to_vec();
  });
  pixels
}

#[test]
fn attach_scans_whole_volume() {
  let (_registry, tracker) = new_tracker();
  let volume = Arc::new(ArrayVolume::new([4, 3, 2]));
  volume.set_voxel(0, 0, 0, 1);
  volume.set_voxel(1, 2, 0, 2);
  volume.set_voxel(3, 1, 1, 1);

  tracker.attach(volume).unwrap();

  assert_eq!(tracker.axis_counts(Axis::X), vec![1, 2, 0, 1]);
  assert_eq!(tracker.axis_counts(Axis::Y), vec![1, 1, 2]);
  assert_eq!(tracker.axis_counts(Axis::Z), vec![3, 1]);
}

#[test]
fn attach_registers_volume() {
  let (registry, tracker) = new_tracker();
  let volume = Arc::new(ArrayVolume::new([2, 2, 2]));
  let volume_id = volume.id();

  tracker.attach(volume).unwrap();

  assert_eq!(registry.lookup(volume_id), Some(tracker.id()));
  assert_eq!(tracker.volume_id(), Some(volume_id));
}

#[test]
fn attach_rejects_non_3d_volumes() {
  let (registry, tracker) = new_tracker();

  let flat = Arc::new(ArrayVolume::from_shape(vec![16, 16]));
  match tracker.attach(flat) {
    Err(AttachError::InvalidDimensionality { dims }) => assert_eq!(dims, 2),
    other => panic!("expected InvalidDimensionality, got {:?}", other.err()),
  }

  let timed = Arc::new(ArrayVolume::from_shape(vec![8, 8, 8, 4]));
  match tracker.attach(timed) {
    Err(AttachError::InvalidDimensionality { dims }) => assert_eq!(dims, 4),
    other => panic!("expected InvalidDimensionality, got {:?}", other.err()),
  }

  assert!(!tracker.is_attached());
  assert!(registry.is_empty());
}

#[test]
fn full_scan_equals_slicewise_scan() {
  let shape = [5, 4, 6];
  let volume = Arc::new(ArrayVolume::new(shape));
  // Deterministic but irregular content.
  for z in 0..shape[2] {
    for y in 0..shape[1] {
      for x in 0..shape[0] {
        if (x * 7 + y * 3 + z * 5) % 4 == 0 {
          volume.set_voxel(x, y, z, ((x + y + z) % 3 + 1) as Label);
        }
      }
    }
  }

  let (_ra, full) = new_tracker();
  full.attach(Arc::<ArrayVolume>::clone(&volume)).unwrap();

  // Same content fed slice by slice into a tracker attached to an empty
  // volume of the same extents.
  let (_rb, slicewise) = new_tracker();
  slicewise.attach(Arc::new(ArrayVolume::new(shape))).unwrap();
  for z in 0..shape[2] {
    slicewise.apply_slice_diff(2, z, &z_slice(&volume, z));
  }

  for axis in Axis::ALL {
    assert_eq!(full.axis_counts(axis), slicewise.axis_counts(axis));
  }
}

#[test]
fn axis_totals_agree() {
  let volume = Arc::new(ArrayVolume::new([3, 5, 4]));
  volume.set_voxel(0, 4, 3, 2);
  volume.set_voxel(2, 0, 0, 1);
  volume.set_voxel(1, 2, 2, 3);

  let (_registry, tracker) = new_tracker();
  tracker.attach(volume).unwrap();

  assert_eq!(tracker.axis_total(Axis::X), 6);
  assert_eq!(tracker.axis_total(Axis::Y), 6);
  assert_eq!(tracker.axis_total(Axis::Z), 6);
}

#[test]
fn volume_diff_updates_all_axes() {
  let (_registry, tracker) = new_tracker();
  let volume = Arc::new(ArrayVolume::new([3, 3, 3]));
  volume.set_voxel(1, 1, 1, 1);
  tracker.attach(volume).unwrap();

  let diff = ArrayVolume::new([3, 3, 3]);
  diff.set_voxel(1, 1, 1, -1); // undo the existing voxel
  diff.set_voxel(2, 0, 0, 2); // paint a new one
  tracker.apply_volume_diff(&diff);

  assert_eq!(tracker.axis_counts(Axis::X), vec![0, 0, 2]);
  assert_eq!(tracker.axis_counts(Axis::Y), vec![2, 0, 0]);
  assert_eq!(tracker.axis_counts(Axis::Z), vec![2, 0, 0]);
}

#[test]
fn volume_diff_shape_mismatch_is_noop() {
  let (_registry, tracker) = new_tracker();
  let volume = Arc::new(ArrayVolume::new([3, 3, 3]));
  volume.set_voxel(0, 0, 0, 1);
  tracker.attach(volume).unwrap();
  let before = tracker.axis_counts(Axis::Z);

  let wrong_extent = ArrayVolume::new([3, 3, 4]);
  wrong_extent.set_voxel(1, 1, 1, 5);
  tracker.apply_volume_diff(&wrong_extent);

  let wrong_dims = ArrayVolume::from_shape(vec![3, 3, 3, 2]);
  tracker.apply_volume_diff(&wrong_dims);

  assert_eq!(tracker.axis_counts(Axis::Z), before);
}

#[test]
fn volume_diff_without_attachment_is_noop() {
  let (_registry, tracker) = new_tracker();
  let diff = ArrayVolume::new([2, 2, 2]);
  diff.set_voxel(0, 0, 0, 1);
  tracker.apply_volume_diff(&diff); // must not panic
  assert_eq!(tracker.extent(Axis::X), 0);
}

#[test]
fn slice_diff_updates_counts() {
  let (_registry, tracker) = new_tracker();
  tracker.attach(Arc::new(ArrayVolume::new([2, 2, 3]))).unwrap();

  // Paint two pixels into z-slice 1: (0,0) and (1,1).
  tracker.apply_slice_diff(2, 1, &[1, 0, 0, 1]);

  assert_eq!(tracker.axis_counts(Axis::X), vec![1, 1]);
  assert_eq!(tracker.axis_counts(Axis::Y), vec![1, 1]);
  assert_eq!(tracker.axis_counts(Axis::Z), vec![0, 2, 0]);
}

#[test]
fn slice_diff_along_each_axis() {
  let shape = [3, 4, 5];
  let (_registry, tracker) = new_tracker();
  tracker.attach(Arc::new(ArrayVolume::new(shape))).unwrap();

  // One pixel at (u=1, v=2) of the slice at index 1, for every axis.
  for (axis, u_extent) in [(0usize, 4), (1, 3), (2, 3)] {
    let [u_axis, v_axis] = Axis::from_index(axis).unwrap().others();
    let len = shape[u_axis.index()] * shape[v_axis.index()];
    let mut pixels = vec![0; len];
    pixels[1 + 2 * u_extent] = 1;
    tracker.apply_slice_diff(axis, 1, &pixels);
  }

  // Each of the three strokes put one voxel somewhere; totals agree.
  assert_eq!(tracker.axis_total(Axis::X), 3);
  assert_eq!(tracker.axis_total(Axis::Y), 3);
  assert_eq!(tracker.axis_total(Axis::Z), 3);
  // The X-axis stroke targeted slice x=1; the other two landed at u=1 of
  // their own slices, which is x=1 as well.
  assert_eq!(tracker.axis_counts(Axis::X), vec![0, 3, 0]);
}

#[test]
fn slice_diff_bad_arguments_are_noops() {
  let (_registry, tracker) = new_tracker();
  tracker.attach(Arc::new(ArrayVolume::new([2, 2, 2]))).unwrap();

  tracker.apply_slice_diff(3, 0, &[1, 1, 1, 1]); // axis out of range
  tracker.apply_slice_diff(2, 2, &[1, 1, 1, 1]); // index out of range
  tracker.apply_slice_diff(2, 0, &[1, 1, 1]); // wrong pixel count
  tracker.apply_slice_diff(usize::MAX, 0, &[1, 1, 1, 1]);

  for axis in Axis::ALL {
    assert_eq!(tracker.axis_total(axis), 0);
  }
}

#[test]
fn paint_then_undo_returns_to_empty() {
  let (_registry, tracker) = new_tracker();
  tracker.attach(Arc::new(ArrayVolume::new([2, 2, 2]))).unwrap();

  let stroke = [3, 0, 1, 0];
  let undo: Vec<Label> = stroke.iter().map(|v| -v).collect();

  tracker.apply_slice_diff(2, 0, &stroke);
  assert!(tracker.is_occupied(Axis::Z, 0));

  tracker.apply_slice_diff(2, 0, &undo);
  for axis in Axis::ALL {
    assert!(tracker.axis_counts(axis).iter().all(|&c| c == 0));
  }
}

#[test]
fn reattach_resets_extents_and_counts() {
  let (registry, tracker) = new_tracker();

  let first = Arc::new(ArrayVolume::new([3, 4, 5]));
  first.set_voxel(0, 0, 0, 9);
  let first_id = first.id();
  tracker.attach(first).unwrap();
  assert_eq!(tracker.extent(Axis::Z), 5);

  let second = Arc::new(ArrayVolume::new([7, 2, 9]));
  second.set_voxel(6, 1, 8, 1);
  tracker.attach(Arc::<ArrayVolume>::clone(&second)).unwrap();

  assert_eq!(tracker.extent(Axis::X), 7);
  assert_eq!(tracker.extent(Axis::Y), 2);
  assert_eq!(tracker.extent(Axis::Z), 9);
  assert_eq!(tracker.axis_total(Axis::X), 1);
  assert_eq!(tracker.slice_count(Axis::Z, 8), Some(1));

  assert_eq!(registry.lookup(first_id), None);
  assert_eq!(registry.lookup(second.id()), Some(tracker.id()));
}

#[test]
fn reattach_same_volume_rescans() {
  let (_registry, tracker) = new_tracker();
  let volume = Arc::new(ArrayVolume::new([2, 2, 2]));
  tracker.attach(Arc::clone(&volume) as Arc<dyn LabelVolume>).unwrap();
  assert_eq!(tracker.axis_total(Axis::Z), 0);

  // Mutation the tracker could not observe incrementally.
  volume.set_voxel(1, 1, 1, 4);
  assert_eq!(tracker.axis_total(Axis::Z), 0); // still stale

  tracker.attach(Arc::clone(&volume) as Arc<dyn LabelVolume>).unwrap();
  assert_eq!(tracker.axis_total(Axis::Z), 4);
  assert_eq!(volume.modified().subscriber_count(), 1);
}

#[test]
fn modified_notification_triggers_rescan() {
  let (_registry, tracker) = new_tracker();
  let volume = Arc::new(CountingVolume::new([2, 2, 2]));
  tracker.attach(Arc::clone(&volume) as Arc<dyn LabelVolume>).unwrap();
  assert_eq!(volume.reads(), 1); // the attach scan

  volume.inner.set_voxel(0, 1, 0, 2);
  volume.inner.notify_modified();

  assert_eq!(volume.reads(), 2);
  assert_eq!(tracker.slice_count(Axis::Y, 1), Some(2));
}

#[test]
fn echo_guard_suppresses_rescan() {
  let (_registry, tracker) = new_tracker();
  let volume = Arc::new(CountingVolume::new([2, 2, 2]));
  tracker.attach(Arc::clone(&volume) as Arc<dyn LabelVolume>).unwrap();
  assert_eq!(volume.reads(), 1);

  volume.inner.set_voxel(0, 0, 0, 1);
  {
    let _guard = tracker.suppress_echo();
    assert!(tracker.is_suppressing_echo());
    volume.inner.notify_modified();
    assert_eq!(volume.reads(), 1); // no rescan
    assert_eq!(tracker.axis_total(Axis::Z), 0); // counts untouched
  }
  assert!(!tracker.is_suppressing_echo());

  // Disengaged: the next notification triggers exactly one rescan.
  volume.inner.notify_modified();
  assert_eq!(volume.reads(), 2);
  assert_eq!(tracker.axis_total(Axis::Z), 1);
}

#[test]
fn detach_is_idempotent_and_cleans_up() {
  let (registry, tracker) = new_tracker();
  let volume = Arc::new(ArrayVolume::new([2, 2, 2]));
  tracker.attach(Arc::clone(&volume) as Arc<dyn LabelVolume>).unwrap();
  assert_eq!(volume.modified().subscriber_count(), 1);

  tracker.detach();
  tracker.detach();

  assert!(!tracker.is_attached());
  assert_eq!(tracker.extent(Axis::X), 0);
  assert!(registry.is_empty());
  assert_eq!(volume.modified().subscriber_count(), 0);

  // A notification after detach must not resurrect anything.
  volume.notify_modified();
  assert!(!tracker.is_attached());
}

#[test]
fn dropping_tracker_cleans_up() {
  let registry = Arc::new(VolumeRegistry::new());
  let volume = Arc::new(ArrayVolume::new([2, 2, 2]));

  {
    let tracker = OccupancyTracker::new(Arc::clone(&registry));
    tracker.attach(Arc::clone(&volume) as Arc<dyn LabelVolume>).unwrap();
    assert_eq!(registry.len(), 1);
  }

  assert!(registry.is_empty());
  assert_eq!(volume.modified().subscriber_count(), 0);
  volume.notify_modified(); // must not reach a dead tracker
}

#[test]
fn second_tracker_takes_over_registration() {
  let registry = Arc::new(VolumeRegistry::new());
  let volume = Arc::new(ArrayVolume::new([2, 2, 2]));

  let first = OccupancyTracker::new(Arc::clone(&registry));
  first.attach(Arc::clone(&volume) as Arc<dyn LabelVolume>).unwrap();

  let second = OccupancyTracker::new(Arc::clone(&registry));
  second.attach(Arc::clone(&volume) as Arc<dyn LabelVolume>).unwrap();
  assert_eq!(registry.lookup(volume.id()), Some(second.id()));

  // The displaced tracker letting go must not disturb the new mapping.
  first.detach();
  assert_eq!(registry.lookup(volume.id()), Some(second.id()));
}

#[test]
fn occupancy_pattern_renders_counts() {
  let (_registry, tracker) = new_tracker();
  let volume = Arc::new(ArrayVolume::new([2, 2, 4]));
  volume.fill_slice(Axis::Z, 0, 1);
  volume.fill_slice(Axis::Z, 3, 1);
  tracker.attach(volume).unwrap();

  assert_eq!(tracker.occupancy_pattern(Axis::Z), "O..O");
}
