//! Slice interpolation coordination.
//!
//! Given an axis and an empty slice index, find the nearest occupied slices
//! below and above, compute the blend ratio, and drive the external
//! extraction and shape-blend collaborators. Interpolation is advisory:
//! every infeasible request - no bounds, occupied target, collaborator
//! failure - comes back as `None`, never as an error, and the caller owns
//! the decision whether to commit the result into the volume.

use glam::Vec2;
use thiserror::Error;

use crate::occupancy::OccupancyTracker;
use crate::types::{Axis, SliceGeometry, SliceImage};
use crate::volume::LabelVolume;

/// Slice extraction failures. The coordinator maps all of these to "cannot
/// interpolate here".
#[derive(Debug, Error)]
pub enum ExtractError {
  #[error("slice extraction needs a 3D volume, got {dims} dimension(s)")]
  WrongDimensionality { dims: usize },

  #[error("slice index {index} out of range along axis {axis:?}")]
  IndexOutOfRange { axis: Axis, index: usize },

  #[error("voxel buffer shorter than the volume shape implies")]
  TruncatedBuffer,
}

/// Shape-blend failures, equally mapped to "cannot interpolate here".
#[derive(Debug, Error)]
pub enum BlendError {
  #[error("slice shapes differ: {0}x{1} vs {2}x{3}")]
  ShapeMismatch(usize, usize, usize, usize),

  #[error("blend ratio {0} outside (0, 1)")]
  RatioOutOfRange(f32),

  #[error("blend failed: {0}")]
  Internal(String),
}

/// Pulls a 2D cross-section out of a volume.
pub trait SliceExtractor {
  fn extract(
    &self,
    volume: &dyn LabelVolume,
    axis: Axis,
    index: usize,
  ) -> Result<SliceImage, ExtractError>;
}

/// Blends two label slices into one at a given ratio.
///
/// The algorithm behind this is outside this crate; implementations are
/// typically distance-transform shape blends. `ratio` is the normalized
/// position of the target slice between `lower` (0) and `upper` (1),
/// strictly inside that interval.
pub trait ShapeBlend {
  fn blend(
    &self,
    lower: &SliceImage,
    upper: &SliceImage,
    ratio: f32,
  ) -> Result<SliceImage, BlendError>;
}

// =============================================================================
// BufferSliceExtractor
// =============================================================================

/// Extractor reading straight from the contiguous voxel buffer.
///
/// Slice geometry is derived from the volume's origin and spacing: the
/// slice origin sits `index * spacing[axis]` along the slice axis, and the
/// in-plane spacing is the volume spacing of the two perpendicular axes.
#[derive(Clone, Copy, Debug, Default)]
pub struct BufferSliceExtractor;

impl SliceExtractor for BufferSliceExtractor {
  fn extract(
    &self,
    volume: &dyn LabelVolume,
    axis: Axis,
    index: usize,
  ) -> Result<SliceImage, ExtractError> {
    let shape = volume.shape();
    if shape.len() != 3 {
      return Err(ExtractError::WrongDimensionality { dims: shape.len() });
    }
    if index >= shape[axis.index()] {
      return Err(ExtractError::IndexOutOfRange { axis, index });
    }

    let [u_axis, v_axis] = axis.others();
    let u_max = shape[u_axis.index()];
    let v_max = shape[v_axis.index()];

    let spacing = volume.spacing();
    let mut origin = volume.origin();
    origin[axis.index()] += index as f32 * spacing[axis.index()];
    let geometry = SliceGeometry {
      axis,
      index,
      origin,
      spacing: Vec2::new(spacing[u_axis.index()], spacing[v_axis.index()]),
    };

    let mut result = Err(ExtractError::TruncatedBuffer);
    volume.with_data(&mut |data| {
      if data.len() < shape[0] * shape[1] * shape[2] {
        return;
      }
      let mut pixels = Vec::with_capacity(u_max * v_max);
      for v in 0..v_max {
        for u in 0..u_max {
          let mut coord = [0usize; 3];
          coord[axis.index()] = index;
          coord[u_axis.index()] = u;
          coord[v_axis.index()] = v;
          pixels.push(data[coord[0] + shape[0] * (coord[1] + shape[1] * coord[2])]);
        }
      }
      result = Ok(SliceImage::from_pixels(u_max, v_max, pixels, geometry));
    });
    result
  }
}

// =============================================================================
// InterpolationCoordinator
// =============================================================================

/// Decides whether and between which two slices a missing one should be
/// synthesized, then runs the collaborators.
///
/// Generic over its collaborators so hosts can plug their own extraction
/// and blend machinery; [`BufferSliceExtractor`] covers volumes that expose
/// their buffer directly.
pub struct InterpolationCoordinator<E: SliceExtractor, B: ShapeBlend> {
  extractor: E,
  blender: B,
}

impl<E: SliceExtractor, B: ShapeBlend> InterpolationCoordinator<E, B> {
  pub fn new(extractor: E, blender: B) -> Self {
    Self { extractor, blender }
  }

  /// Synthesize the slice at `(axis, index)` from its nearest occupied
  /// neighbors.
  ///
  /// Rejections, in order: nothing attached; axis above 2; first or last
  /// slice (no two-sided bound can exist); target slice already occupied
  /// (interpolation never overwrites annotation); no occupied slice below;
  /// no occupied slice above; extraction or blend failure. All come back
  /// as `None`.
  ///
  /// The result carries the geometry of the (empty) placeholder slice at
  /// `index`, so it is positioned correctly even though the content is
  /// interpolated.
  pub fn interpolate(
    &self,
    tracker: &OccupancyTracker,
    axis: usize,
    index: usize,
  ) -> Option<SliceImage> {
    let volume = tracker.volume()?;
    let axis = Axis::from_index(axis)?;

    let counts = tracker.axis_counts(axis);
    let last = counts.len().checked_sub(1)?;
    if index == 0 || index >= last {
      return None;
    }
    if counts[index] > 0 {
      return None;
    }

    let lower = (0..index).rev().find(|&i| counts[i] > 0)?;
    let upper = (index + 1..=last).find(|&i| counts[i] > 0)?;

    // Normalized position of the target between its bounds, in (0, 1).
    let ratio = (index - lower) as f32 / (upper - lower) as f32;

    #[cfg(feature = "tracing")]
    tracing::debug!(?axis, index, lower, upper, ratio, "interpolating between bounding slices");

    let lower_slice = self.extractor.extract(volume.as_ref(), axis, lower).ok()?;
    let upper_slice = self.extractor.extract(volume.as_ref(), axis, upper).ok()?;
    // The empty placeholder at the target index donates its geometry.
    let placeholder = self.extractor.extract(volume.as_ref(), axis, index).ok()?;

    let mut result = self.blender.blend(&lower_slice, &upper_slice, ratio).ok()?;
    result.geometry = placeholder.geometry;
    Some(result)
  }
}

#[cfg(test)]
#[path = "interpolate_test.rs"]
mod interpolate_test;
