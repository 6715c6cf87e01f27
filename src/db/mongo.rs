//! MongoDB client and collection wrapper

use bson::{doc, oid::ObjectId, Bson, DateTime, Document};
use mongodb::{
    error::{ErrorKind as MongoErrorKind, WriteFailure},
    options::{IndexOptions, UpdateModifications},
    results::UpdateResult,
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use crate::db::schemas::Metadata;
use crate::types::PorticoError;

/// Server error code for unique index violations
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Create a new MongoDB client
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, PorticoError> {
        info!(uri = %uri, "Connecting to MongoDB");

        // Fail fast when the server is unreachable instead of hanging startup
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| PorticoError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| PorticoError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!(db = %db_name, "Connected to MongoDB");

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, PorticoError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + Default + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + Default + IntoIndexes + MutMetadata,
{
    /// Create a new collection and apply indexes
    pub async fn new(
        client: &Client,
        db_name: &str,
        collection_name: &str,
    ) -> Result<Self, PorticoError> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    /// Apply schema-defined indexes
    async fn apply_indexes(&self) -> Result<(), PorticoError> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| PorticoError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Insert a document, setting metadata timestamps.
    ///
    /// A unique index violation surfaces as `AlreadyExists`.
    pub async fn insert_one(&self, mut item: T) -> Result<ObjectId, PorticoError> {
        let metadata = item.mut_metadata();
        metadata.is_deleted = false;
        metadata.created_at = Some(DateTime::now());
        metadata.updated_at = Some(DateTime::now());

        let result = self.inner.insert_one(item).await.map_err(|e| {
            if is_duplicate_key(&e) {
                PorticoError::AlreadyExists("a record with the same unique key exists".into())
            } else {
                PorticoError::Database(format!("Insert failed: {}", e))
            }
        })?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| PorticoError::Database("Failed to get inserted ID".into()))
    }

    /// Find one document by filter
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, PorticoError> {
        let mut full_filter = filter;
        full_filter.insert("metadata.is_deleted", doc! { "$ne": true });

        self.inner
            .find_one(full_filter)
            .await
            .map_err(|e| PorticoError::Database(format!("Find failed: {}", e)))
    }

    /// Update one document
    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<UpdateResult, PorticoError> {
        self.inner
            .update_one(filter, update.into())
            .await
            .map_err(|e| PorticoError::Database(format!("Update failed: {}", e)))
    }

    /// Replace the document matching `filter`, touching `updated_at`.
    ///
    /// Returns the number of matched documents; zero means the filter
    /// (including any revision condition) no longer matches.
    pub async fn replace_one(&self, filter: Document, mut item: T) -> Result<u64, PorticoError> {
        item.mut_metadata().touch();

        let result = self
            .inner
            .replace_one(filter, item)
            .await
            .map_err(|e| PorticoError::Database(format!("Replace failed: {}", e)))?;

        Ok(result.matched_count)
    }

    /// Rewrite the matching document or insert it when absent.
    ///
    /// `metadata.created_at` is only written on insert, so it survives
    /// later upserts of the same key.
    pub async fn upsert_one(&self, filter: Document, item: T) -> Result<(), PorticoError> {
        let update = upsert_update(&item)?;

        self.inner
            .update_one(filter, update)
            .upsert(true)
            .await
            .map_err(|e| PorticoError::Database(format!("Upsert failed: {}", e)))?;

        Ok(())
    }
}

/// Turn a whole document into `$set` / `$setOnInsert` operators
fn upsert_update<T: Serialize>(item: &T) -> Result<Document, PorticoError> {
    let mut fields = bson::to_document(item)
        .map_err(|e| PorticoError::Database(format!("Serialize failed: {}", e)))?;
    fields.remove("_id");
    let metadata = match fields.remove("metadata") {
        Some(Bson::Document(metadata)) => metadata,
        _ => Document::new(),
    };

    let now = DateTime::now();
    let mut set = fields;
    for (key, value) in metadata {
        if key != "created_at" && key != "updated_at" {
            set.insert(format!("metadata.{}", key), value);
        }
    }
    set.insert("metadata.updated_at", now);

    Ok(doc! {
        "$set": set,
        "$setOnInsert": { "metadata.created_at": now },
    })
}

/// True when the driver error is a unique index violation
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        MongoErrorKind::Write(WriteFailure::WriteError(write_error)) => {
            write_error.code == DUPLICATE_KEY_CODE
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::NamingRecordDoc;

    #[test]
    fn test_upsert_update_leaves_creation_time_to_insert() {
        let mut record = NamingRecordDoc {
            _id: Some(ObjectId::new()),
            record_name: "k51abc".into(),
            record_value: "/ipfs/Qm123".into(),
            ..Default::default()
        };
        record.metadata.created_at = Some(DateTime::now());

        let update = upsert_update(&record).unwrap();
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("record_name").unwrap(), "k51abc");
        assert_eq!(set.get_str("record_value").unwrap(), "/ipfs/Qm123");
        assert!(!set.get_bool("metadata.is_deleted").unwrap());
        assert!(set.get_datetime("metadata.updated_at").is_ok());
        assert!(!set.contains_key("_id"));
        assert!(!set.contains_key("metadata"));
        assert!(!set.contains_key("metadata.created_at"));

        let on_insert = update.get_document("$setOnInsert").unwrap();
        assert!(on_insert.get_datetime("metadata.created_at").is_ok());
    }
}
