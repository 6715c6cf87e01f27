//! Storage endpoint client for hosted IPFS networks

pub mod endpoint;
pub mod http;
pub mod mock;

pub use endpoint::{
    ContentStream, EndpointConnector, KeyInfo, MessageStream, ObjectStat, PinInfo,
    PublishedRecord, PubsubMessage, RecordPublish, StorageEndpoint,
};
pub use http::{HttpConnector, HttpEndpoint};
pub use mock::{MockConnector, MockEndpoint};
