//! IPNS naming records

pub mod duration;
pub mod publisher;

pub use publisher::{NamingRecordPublisher, NamingRecordRequest, PublishedNamingRecord};
