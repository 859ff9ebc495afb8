// src/lib.rs - Vendor description to catalog matching
pub mod matching;
pub mod models;
pub mod sources;
pub mod utils;

pub use matching::manager::{BatchOutcome, CancellationFlag, MatchingPipeline};
pub use utils::config::MatchingConfig;
