//! Label volume access contract and a simple heap-backed implementation.

use std::sync::RwLock;

use glam::Vec3;

use crate::signal::ModifiedSignal;
use crate::types::{Axis, Label, VolumeId};

/// Read-only contract the tracker and coordinator need from a label volume.
///
/// The volume is owned and mutated elsewhere; this crate only reads it
/// during scans, never writes through this interface. The voxel buffer is
/// contiguous with x varying fastest, then y, then z, so the per-slice
/// stride along z is `shape[0] * shape[1]`.
pub trait LabelVolume: Send + Sync {
  /// Identity used as the registry key.
  fn id(&self) -> VolumeId;

  /// Full shape of the underlying image.
  ///
  /// Attaching demands exactly three dimensions; 2D or 3D+t data is
  /// rejected at that point.
  fn shape(&self) -> Vec<usize>;

  /// Scoped access to the contiguous voxel buffer.
  ///
  /// The buffer stays borrowed only for the duration of the call, which
  /// lets implementations keep pixel storage behind interior mutability.
  fn with_data(&self, f: &mut dyn FnMut(&[Label]));

  /// World position of the (0, 0, 0) voxel.
  fn origin(&self) -> Vec3 {
    Vec3::ZERO
  }

  /// Per-axis voxel spacing.
  fn spacing(&self) -> Vec3 {
    Vec3::ONE
  }

  /// Modification notifications; the tracker subscribes on attach.
  fn modified(&self) -> &ModifiedSignal;

  /// Extent along one axis, zero when the axis does not exist.
  fn extent(&self, axis: Axis) -> usize {
    self.shape().get(axis.index()).copied().unwrap_or(0)
  }
}

/// Heap-backed label volume for tests and simple hosts.
///
/// Pixel storage sits behind a `RwLock` so an owner can keep mutating the
/// volume through a shared handle after a tracker attached to it, mirroring
/// how an interactive editor drives both sides. Mutation does not notify by
/// itself; the owner decides when to fire [`notify_modified`](Self::notify_modified).
pub struct ArrayVolume {
  id: VolumeId,
  shape: Vec<usize>,
  data: RwLock<Vec<Label>>,
  origin: Vec3,
  spacing: Vec3,
  modified: ModifiedSignal,
}

impl ArrayVolume {
  /// Create a zero-filled 3D volume.
  pub fn new(shape: [usize; 3]) -> Self {
    Self::from_shape(shape.to_vec())
  }

  /// Create a zero-filled volume of any dimensionality.
  ///
  /// Only 3D volumes are accepted by the tracker; other shapes exist so
  /// hosts can hand over whatever their image source produced and let
  /// attach do the checking.
  pub fn from_shape(shape: Vec<usize>) -> Self {
    let len = shape.iter().product();
    Self {
      id: VolumeId::new(),
      shape,
      data: RwLock::new(vec![0; len]),
      origin: Vec3::ZERO,
      spacing: Vec3::ONE,
      modified: ModifiedSignal::new(),
    }
  }

  pub fn with_origin(mut self, origin: Vec3) -> Self {
    self.origin = origin;
    self
  }

  pub fn with_spacing(mut self, spacing: Vec3) -> Self {
    self.spacing = spacing;
    self
  }

  #[inline]
  fn offset(&self, x: usize, y: usize, z: usize) -> usize {
    debug_assert_eq!(self.shape.len(), 3);
    x + self.shape[0] * (y + self.shape[1] * z)
  }

  /// Read one voxel of a 3D volume.
  pub fn voxel(&self, x: usize, y: usize, z: usize) -> Label {
    self.data.read().unwrap()[self.offset(x, y, z)]
  }

  /// Write one voxel of a 3D volume. Does not notify.
  pub fn set_voxel(&self, x: usize, y: usize, z: usize, value: Label) {
    let index = self.offset(x, y, z);
    self.data.write().unwrap()[index] = value;
  }

  /// Overwrite every voxel of a slice along `axis` with `value`.
  pub fn fill_slice(&self, axis: Axis, index: usize, value: Label) {
    debug_assert_eq!(self.shape.len(), 3);
    let [u_axis, v_axis] = axis.others();
    let u_max = self.shape[u_axis.index()];
    let v_max = self.shape[v_axis.index()];

    let mut data = self.data.write().unwrap();
    for v in 0..v_max {
      for u in 0..u_max {
        let mut coord = [0usize; 3];
        coord[axis.index()] = index;
        coord[u_axis.index()] = u;
        coord[v_axis.index()] = v;
        data[coord[0] + self.shape[0] * (coord[1] + self.shape[1] * coord[2])] = value;
      }
    }
  }

  /// Fire the modified signal. Called by the owner after a batch of edits.
  pub fn notify_modified(&self) {
    self.modified.notify();
  }
}

impl LabelVolume for ArrayVolume {
  fn id(&self) -> VolumeId {
    self.id
  }

  fn shape(&self) -> Vec<usize> {
    self.shape.clone()
  }

  fn with_data(&self, f: &mut dyn FnMut(&[Label])) {
    let data = self.data.read().unwrap();
    f(&data);
  }

  fn origin(&self) -> Vec3 {
    self.origin
  }

  fn spacing(&self) -> Vec3 {
    self.spacing
  }

  fn modified(&self) -> &ModifiedSignal {
    &self.modified
  }
}
