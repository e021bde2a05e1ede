//! Box coordinate codecs for anchor-based object detection.
//!
//! The crate turns batches of ground truth bounding boxes into per grid
//! cell, per anchor regression targets and converts network outputs back
//! into absolute box coordinates.

mod common;

pub mod anchor;
pub mod coder;
pub mod grid;
pub mod ratio;
pub mod size;
pub mod unit;

pub use anchor::*;
pub use coder::*;
pub use grid::*;
pub use ratio::*;
pub use size::*;
pub use unit::*;
