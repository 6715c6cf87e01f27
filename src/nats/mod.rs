//! NATS JetStream messaging substrate

pub mod client;
pub mod messages;

pub use client::NatsClient;
pub use messages::{
    Envelope, Exchange, FileAdd, NamingRecordUpdate, PinRemoval, PinRequest, QueueMessage,
    SUBJECT_PREFIX,
};
