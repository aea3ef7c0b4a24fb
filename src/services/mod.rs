// Service exports
pub mod availability;
pub mod directory;
pub mod events;
pub mod matches;

pub use availability::AvailabilityService;
pub use directory::{CachedDirectory, HttpDirectory, ProfileDirectory};
pub use events::{EventBridge, NullEventBridge, RedisEventBridge};
pub use matches::{CreateMatch, CreateMatchOptions, MatchPolicy, MatchService};
