//! seg_interp - sparse-segmentation occupancy tracking and slice
//! interpolation coordination
//!
//! An interactive segmentation tool rarely paints every slice of a 3D label
//! volume by hand. This crate keeps, per slice along each principal axis, a
//! count of how much annotation the slice holds, stays exactly consistent
//! with the externally owned volume under incremental edits (single slice,
//! sub-volume diff, whole-volume replace), and decides between which two
//! labeled slices a missing one should be synthesized by an external
//! shape-blend primitive.
//!
//! The crate is GUI and engine independent: no I/O, no rendering, no
//! persistence. The volume, the slice blend, and the decision to commit an
//! interpolated slice all belong to the caller.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use seg_interp::{
//!   ArrayVolume, BufferSliceExtractor, InterpolationCoordinator, OccupancyTracker,
//!   VolumeRegistry,
//! };
//!
//! let registry = Arc::new(VolumeRegistry::new());
//! let tracker = OccupancyTracker::new(Arc::clone(&registry));
//!
//! let volume = Arc::new(ArrayVolume::new([64, 64, 32]));
//! tracker.attach(volume.clone())?;
//!
//! // After painting slices 5 and 9 along Z, synthesize slice 7:
//! let coordinator = InterpolationCoordinator::new(BufferSliceExtractor, MyShapeBlend);
//! if let Some(slice) = coordinator.interpolate(&tracker, 2, 7) {
//!   // The caller owns the result; writing it back into the volume should
//!   // happen under tracker.suppress_echo() to avoid a redundant rescan.
//! }
//! ```

pub mod types;
pub use types::{Axis, Label, SliceGeometry, SliceImage, TrackerId, VolumeId};

// Modification signal with RAII unsubscription
pub mod signal;
pub use signal::{ModifiedSignal, Subscription, SubscriptionId};

// Volume access contract + heap-backed implementation
pub mod volume;
pub use volume::{ArrayVolume, LabelVolume};

// Per-axis slice occupancy tracking
pub mod occupancy;
pub use occupancy::{AttachError, EchoGuard, OccupancyTracker};

// Volume identity -> tracker mapping
pub mod registry;
pub use registry::VolumeRegistry;

// Bound search + collaborator-driven slice synthesis
pub mod interpolate;
pub use interpolate::{
  BlendError, BufferSliceExtractor, ExtractError, InterpolationCoordinator, ShapeBlend,
  SliceExtractor,
};
