// Core algorithm exports
pub mod pairing;
pub mod scheduler;
pub mod scoring;

pub use pairing::{greedy_pairs, PairCandidate};
pub use scheduler::QueueScheduler;
pub use scoring::{compatibility_score, MIN_COMPATIBILITY_SCORE};
