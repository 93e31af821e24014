//! Ground truth loading toolkit.

mod annotation;
mod classes;
mod imdb;
mod index;
mod pascal_voc;
mod proposal;
mod record;
mod roidb;

pub use annotation::*;
pub use classes::*;
pub use imdb::*;
pub use index::*;
pub use pascal_voc::*;
pub use proposal::*;
pub use record::*;
pub use roidb::*;
