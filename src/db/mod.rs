//! MongoDB persistence

pub mod mongo;
pub mod schemas;
pub mod stores;

pub use mongo::MongoClient;
pub use stores::MongoStore;
