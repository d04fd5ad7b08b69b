pub mod generation;
pub mod ml;
