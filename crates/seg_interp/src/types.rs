//! Core data types for occupancy tracking and slice interpolation.

use std::sync::atomic::{AtomicU64, Ordering};

use glam::{Vec2, Vec3};

/// Voxel label value.
///
/// Signed so the same buffer type carries both absolute labels and the
/// signed deltas consumed by the diff update paths.
pub type Label = i32;

// =============================================================================
// Axis
// =============================================================================

/// One of the three principal volume axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
  X = 0,
  Y = 1,
  Z = 2,
}

/// Perpendicular axes per slice axis, in scan order (u, v) with u varying
/// fastest: a slice along Z is addressed by (X, Y), along Y by (X, Z),
/// along X by (Y, Z).
const OTHER_AXES: [[Axis; 2]; 3] = [
  [Axis::Y, Axis::Z],
  [Axis::X, Axis::Z],
  [Axis::X, Axis::Y],
];

impl Axis {
  pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

  /// Map a raw axis index to an axis.
  ///
  /// Returns `None` for indices above 2; update and interpolate entry points
  /// treat that as a silent no-op rather than an error.
  pub fn from_index(index: usize) -> Option<Axis> {
    match index {
      0 => Some(Axis::X),
      1 => Some(Axis::Y),
      2 => Some(Axis::Z),
      _ => None,
    }
  }

  #[inline]
  pub fn index(self) -> usize {
    self as usize
  }

  /// The two axes perpendicular to this one, in (u, v) scan order.
  #[inline]
  pub fn others(self) -> [Axis; 2] {
    OTHER_AXES[self.index()]
  }
}

// =============================================================================
// Identities
// =============================================================================

static VOLUME_ID_COUNTER: AtomicU64 = AtomicU64::new(1);
static TRACKER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque volume identity, used as the registry key.
///
/// Generated atomically - unique within process lifetime.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct VolumeId(u64);

impl VolumeId {
  pub fn new() -> Self {
    Self(VOLUME_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
  }

  pub fn raw(&self) -> u64 {
    self.0
  }
}

impl Default for VolumeId {
  fn default() -> Self {
    Self::new()
  }
}

/// Opaque tracker identity, the registry value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TrackerId(u64);

impl TrackerId {
  pub fn new() -> Self {
    Self(TRACKER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
  }

  pub fn raw(&self) -> u64 {
    self.0
  }
}

impl Default for TrackerId {
  fn default() -> Self {
    Self::new()
  }
}

// =============================================================================
// Slices
// =============================================================================

/// Spatial placement of a slice within its volume.
///
/// Copied onto interpolation results from the empty placeholder slice at the
/// target index, so synthesized content lands where the placeholder was.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SliceGeometry {
  /// Axis the slice is perpendicular to.
  pub axis: Axis,

  /// Slice index along `axis`.
  pub index: usize,

  /// World position of the slice's (0, 0) pixel.
  pub origin: Vec3,

  /// In-plane pixel spacing along (u, v).
  pub spacing: Vec2,
}

/// A 2D cross-section of a label volume.
///
/// Pixels are row-major with u (the first perpendicular axis) varying
/// fastest, matching the volume's own buffer order.
#[derive(Clone, Debug, PartialEq)]
pub struct SliceImage {
  /// Extent along the first perpendicular axis (u).
  pub width: usize,

  /// Extent along the second perpendicular axis (v).
  pub height: usize,

  /// Pixel buffer, length `width * height`.
  pub pixels: Vec<Label>,

  /// Placement of this slice in the volume.
  pub geometry: SliceGeometry,
}

impl SliceImage {
  /// Create a zero-filled slice.
  pub fn new(width: usize, height: usize, geometry: SliceGeometry) -> Self {
    Self {
      width,
      height,
      pixels: vec![0; width * height],
      geometry,
    }
  }

  /// Wrap an existing pixel buffer.
  pub fn from_pixels(
    width: usize,
    height: usize,
    pixels: Vec<Label>,
    geometry: SliceGeometry,
  ) -> Self {
    debug_assert_eq!(pixels.len(), width * height);
    Self {
      width,
      height,
      pixels,
      geometry,
    }
  }

  #[inline]
  pub fn pixel(&self, u: usize, v: usize) -> Label {
    self.pixels[u + v * self.width]
  }

  #[inline]
  pub fn set_pixel(&mut self, u: usize, v: usize, value: Label) {
    self.pixels[u + v * self.width] = value;
  }

  /// True when every pixel is background.
  pub fn is_blank(&self) -> bool {
    self.pixels.iter().all(|&p| p == 0)
  }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
