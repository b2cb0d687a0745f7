//! Training-target generation for anchor-based region proposal networks.
//!
//! The pieces fit together Faster R-CNN style: an [`AnchorGenerator`]
//! enumerates a fixed anchor set over a strided feature map, and an
//! [`AnchorTargetAssigner`] matches those anchors against ground-truth boxes
//! by IoU, subsamples a balanced set of foreground/background labels, and
//! encodes regression targets with a [`BoxCoder`].
//!
//! Everything is a pure function of its inputs plus an injected random
//! source, so independent calls are safe to run concurrently.

pub mod anchor;
pub mod anchor_target;
pub mod bbox;
pub mod box_coder;
pub mod error;

pub use anchor::AnchorGenerator;
pub use anchor_target::{AnchorTargetAssigner, AnchorTargetConfig};
pub use box_coder::BoxCoder;
pub use error::{Error, Result};
