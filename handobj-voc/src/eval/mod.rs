//! Detection results writing and scoring.

mod ap;
mod detection;
mod evaluator;
mod matlab;
mod results;
mod scorer;
mod voc_eval;

pub use ap::*;
pub use detection::*;
pub use evaluator::*;
pub use matlab::*;
pub use results::*;
pub use scorer::*;
pub use voc_eval::*;
