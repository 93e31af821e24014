//! Dataset adapter for the hand/object contact PASCAL VOC corpus.
//!
//! The crate loads ground truth from VOC style XML annotations extended with
//! hand contact attributes, caches the parsed roidb, writes detection results
//! in the VOC results format and scores them.

mod common;
pub mod blob;
pub mod config;
pub mod dataset;
pub mod error;
pub mod eval;

pub use error::DatasetError;
