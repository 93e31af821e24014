//! Safe bounding box types and functions.

mod common;

pub use xyxy::*;
pub mod xyxy;
