//! Pubsub relay for hosted networks

pub mod relay;

pub use relay::{PubsubRelay, SubscriptionInfo};
