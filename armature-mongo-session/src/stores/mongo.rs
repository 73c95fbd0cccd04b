//! MongoDB document store
//!
//! This module requires the `mongodb` feature flag (enabled by default).

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::record::LockSnapshot;
use crate::stores::DocumentStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{self, Document, doc};
use mongodb::options::{ClientOptions, ReturnDocument};
use mongodb::{Client, Collection, IndexModel};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// MongoDB-backed document store.
///
/// The client is created lazily on first use and shared afterwards; the driver
/// pools connections internally.
///
/// # Examples
///
/// ```no_run
/// use armature_mongo_session::{DocumentStore, MongoDocumentStore};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MongoDocumentStore::new(
///         "mongodb://localhost:27017/app",
///         "app",
///         "sessions",
///         Duration::from_secs(10),
///     );
///     store.ensure_ready().await?;
///     Ok(())
/// }
/// ```
pub struct MongoDocumentStore {
    uri: String,
    database: String,
    collection: String,
    connect_timeout: Duration,
    client: OnceCell<Client>,
}

impl MongoDocumentStore {
    /// Create a new store. No connection is made until the first operation.
    pub fn new(
        uri: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            collection: collection.into(),
            connect_timeout,
            client: OnceCell::new(),
        }
    }

    /// Create a store from a session configuration and its parsed backend.
    pub fn from_config(config: &SessionConfig, uri: &str, database: &str) -> Self {
        Self::new(uri, database, config.collection.as_str(), config.connect_timeout)
    }

    /// Get the database name.
    pub fn database(&self) -> &str {
        &self.database
    }

    async fn client(&self) -> SessionResult<&Client> {
        self.client
            .get_or_try_init(|| async {
                let mut options = ClientOptions::parse(&self.uri)
                    .await
                    .map_err(|e| SessionError::Connection(e.to_string()))?;
                options.connect_timeout = Some(self.connect_timeout);
                options.server_selection_timeout = Some(self.connect_timeout);
                options
                    .app_name
                    .get_or_insert_with(|| "armature-mongo-session".to_string());

                Client::with_options(options).map_err(|e| SessionError::Connection(e.to_string()))
            })
            .await
    }

    async fn sessions(&self) -> SessionResult<Collection<Document>> {
        let client = self.client().await?;
        Ok(client.database(&self.database).collection(&self.collection))
    }
}

fn to_bson_datetime(time: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(time.timestamp_millis())
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn ensure_ready(&self) -> SessionResult<()> {
        let client = self.client().await?;
        let db = client.database(&self.database);

        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| SessionError::Connection(e.to_string()))?;

        let index = IndexModel::builder().keys(doc! { "expires": 1 }).build();
        db.collection::<Document>(&self.collection)
            .create_index(index)
            .await
            .map_err(|e| SessionError::Connection(e.to_string()))?;

        info!(
            database = %self.database,
            collection = %self.collection,
            "MongoDB session store ready"
        );
        Ok(())
    }

    async fn increment_lock(&self, id: &str) -> SessionResult<LockSnapshot> {
        self.sessions()
            .await?
            .clone_with_type::<LockSnapshot>()
            .find_one_and_update(doc! { "_id": id }, doc! { "$inc": { "lock": 1 } })
            .projection(doc! { "lock": 1, "data": 1 })
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await?
            .ok_or_else(|| SessionError::command("findAndModify returned no document", 0))
    }

    async fn claim(&self, id: &str, owner: &str, expires: DateTime<Utc>) -> SessionResult<()> {
        self.sessions()
            .await?
            .update_one(
                doc! { "_id": id },
                doc! {
                    "$set": {
                        "owner": owner,
                        "lock": 1,
                        "expires": to_bson_datetime(expires),
                    }
                },
            )
            .await?;
        Ok(())
    }

    async fn update_owned(&self, id: &str, owner: &str, data: &str) -> SessionResult<bool> {
        let result = self
            .sessions()
            .await?
            .update_one(
                doc! { "_id": id, "owner": owner },
                doc! { "$set": { "data": data, "lock": 0 } },
            )
            .await?;

        debug!(id = %id, matched = result.matched_count, "Guarded session write");
        Ok(result.matched_count > 0)
    }

    async fn remove(&self, id: &str) -> SessionResult<()> {
        self.sessions().await?.delete_one(doc! { "_id": id }).await?;
        Ok(())
    }

    async fn remove_expired(&self, before: DateTime<Utc>) -> SessionResult<u64> {
        let result = self
            .sessions()
            .await?
            .delete_many(doc! { "expires": { "$lt": to_bson_datetime(before) } })
            .await?;
        Ok(result.deleted_count)
    }

    fn store_type(&self) -> &'static str {
        "mongodb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_from_projection() {
        // $inc on a fresh upsert yields an Int32 counter and no data
        let fresh: LockSnapshot = bson::from_document(doc! { "_id": "abc", "lock": 1_i32 }).unwrap();
        assert_eq!(fresh, LockSnapshot { lock: 1, data: None });

        let held: LockSnapshot =
            bson::from_document(doc! { "_id": "abc", "lock": 15_i64, "data": "cart=3;" }).unwrap();
        assert_eq!(held.lock, 15);
        assert_eq!(held.data.as_deref(), Some("cart=3;"));
    }

    #[test]
    fn test_bson_datetime_keeps_millis() {
        let now = Utc::now();
        assert_eq!(to_bson_datetime(now).timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn test_new_does_not_connect() {
        let store = MongoDocumentStore::new(
            "mongodb://localhost:27017/app",
            "app",
            "sessions",
            Duration::from_secs(1),
        );
        assert_eq!(store.database(), "app");
        assert_eq!(store.store_type(), "mongodb");
        assert!(store.client.get().is_none());
    }

    // Requires a running MongoDB: cargo test -- --ignored

    #[tokio::test]
    #[ignore]
    async fn test_mongo_lock_cycle() {
        let store = MongoDocumentStore::new(
            "mongodb://localhost:27017/armature_test",
            "armature_test",
            "sessions",
            Duration::from_secs(5),
        );
        store.ensure_ready().await.unwrap();
        store.remove("lock-cycle").await.unwrap();

        let first = store.increment_lock("lock-cycle").await.unwrap();
        assert_eq!(first.lock, 1);
        assert!(first.data.is_none());

        store
            .claim("lock-cycle", "me", Utc::now() + chrono::Duration::minutes(1))
            .await
            .unwrap();
        assert!(!store.update_owned("lock-cycle", "other", "x").await.unwrap());
        assert!(store.update_owned("lock-cycle", "me", "x").await.unwrap());

        let again = store.increment_lock("lock-cycle").await.unwrap();
        assert_eq!(again.lock, 1);
        assert_eq!(again.data.as_deref(), Some("x"));

        store.remove("lock-cycle").await.unwrap();
    }
}
