//! MongoDB implementation of the video store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::{self, doc, oid::ObjectId, Document};
use mongodb::options::{ClientOptions, FindOptions};
use mongodb::{Client, Collection};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

use super::{ConnectionManager, Connector, SharedHandle, VideoStore};
use crate::config::{CacheScope, ListOrder, MongoSettings};
use crate::errors::AppError;
use crate::models::{InsertAck, NewVideo, Video, VideoQuery};

/// Stored shape of a video. Absent fields stay absent in the document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube_url: Option<String>,
    pub created_at: bson::DateTime,
}

impl From<NewVideo> for VideoDocument {
    fn from(video: NewVideo) -> Self {
        VideoDocument {
            id: None,
            title: video.title,
            youtube_url: video.youtube_url,
            created_at: bson::DateTime::from_millis(video.created_at.timestamp_millis()),
        }
    }
}

impl VideoDocument {
    fn into_video(self) -> Result<Video, AppError> {
        let id = self.id.ok_or_else(|| {
            AppError::Database(anyhow::anyhow!("Stored video document has no _id"))
        })?;

        Ok(Video {
            id,
            title: self.title,
            youtube_url: self.youtube_url,
            created_at: DateTime::<Utc>::from_timestamp_millis(self.created_at.timestamp_millis())
                .unwrap_or_default(),
        })
    }
}

pub type VideoCollection = Collection<VideoDocument>;

static PROCESS_HANDLE: Lazy<SharedHandle<VideoCollection>> = Lazy::new(|| Arc::new(OnceCell::new()));

/// Builds the manager for the configured cache scope.
pub fn connection_manager(settings: &MongoSettings) -> ConnectionManager<MongoConnector> {
    let connector = MongoConnector::new(settings.clone());
    match settings.cache_scope {
        CacheScope::Instance => ConnectionManager::new(connector),
        CacheScope::Process => ConnectionManager::with_shared_cache(connector, PROCESS_HANDLE.clone()),
    }
}

pub struct MongoConnector {
    settings: MongoSettings,
}

impl MongoConnector {
    pub fn new(settings: MongoSettings) -> Self {
        Self { settings }
    }

    /// Parses the connection string and applies the configured driver parameters.
    pub async fn client_options(&self) -> Result<ClientOptions, AppError> {
        let mut options = ClientOptions::parse(&self.settings.uri).await.map_err(|e| {
            AppError::Connection(anyhow::Error::new(e).context("Invalid MongoDB connection string"))
        })?;

        options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
        if let Some(timeout) = self.settings.connect_timeout {
            options.connect_timeout = Some(timeout);
        }
        if let Some(timeout) = self.settings.server_selection_timeout {
            options.server_selection_timeout = Some(timeout);
        }
        if let Some(size) = self.settings.max_pool_size {
            options.max_pool_size = Some(size);
        }
        if let Some(size) = self.settings.min_pool_size {
            options.min_pool_size = Some(size);
        }
        if let Some(idle) = self.settings.max_idle_time {
            options.max_idle_time = Some(idle);
        }

        Ok(options)
    }
}

#[async_trait]
impl Connector for MongoConnector {
    type Handle = VideoCollection;

    async fn connect(&self) -> Result<VideoCollection, AppError> {
        let options = self.client_options().await?;
        let client = Client::with_options(options).map_err(|e| {
            AppError::Connection(anyhow::Error::new(e).context("Failed to build MongoDB client"))
        })?;

        let database = client.database(&self.settings.database);
        database.run_command(doc! { "ping": 1 }).await.map_err(|e| {
            AppError::Connection(anyhow::Error::new(e).context("Failed to ping MongoDB"))
        })?;

        tracing::info!(
            database = %self.settings.database,
            collection = %self.settings.collection,
            "Connected to MongoDB"
        );

        Ok(database.collection::<VideoDocument>(&self.settings.collection))
    }
}

/// Escapes regex metacharacters so the search is matched literally.
///
/// The server evaluates `$regex` with PCRE, where a backslash before any
/// non-alphanumeric character yields that character literally. Escaping `-`
/// and `/` is therefore harmless and keeps the pattern safe inside a class
/// or a `/.../` literal.
pub fn escape_regex(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if "\\^$.|?*+()[]{}/-".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Filter selecting the videos whose title contains the search, ignoring case.
pub fn title_filter(search: &str) -> Document {
    if search.is_empty() {
        return doc! {};
    }
    doc! { "title": { "$regex": escape_regex(search), "$options": "i" } }
}

pub fn sort_spec(order: ListOrder) -> Option<Document> {
    match order {
        ListOrder::Newest => Some(doc! { "createdAt": -1, "_id": -1 }),
        ListOrder::Natural => None,
    }
}

/// Skip, limit and sort for one page of `query`.
pub fn find_options(query: &VideoQuery) -> FindOptions {
    let mut options = FindOptions::default();
    options.skip = Some(query.skip());
    options.limit = Some(i64::try_from(query.limit()).unwrap_or(i64::MAX));
    options.sort = sort_spec(query.order);
    options
}

pub struct MongoVideoStore {
    manager: ConnectionManager<MongoConnector>,
    socket_timeout: Option<Duration>,
}

impl MongoVideoStore {
    pub fn new(manager: ConnectionManager<MongoConnector>, socket_timeout: Option<Duration>) -> Self {
        Self {
            manager,
            socket_timeout,
        }
    }

    async fn bounded<T, F>(&self, operation: F) -> Result<T, AppError>
    where
        F: IntoFuture<Output = Result<T, mongodb::error::Error>>,
    {
        match self.socket_timeout {
            Some(limit) => Ok(tokio::time::timeout(limit, operation).await??),
            None => Ok(operation.await?),
        }
    }
}

#[async_trait]
impl VideoStore for MongoVideoStore {
    #[tracing::instrument(name = "Insert video", skip(self, video))]
    async fn insert(&self, video: NewVideo) -> Result<InsertAck, AppError> {
        let collection = self.manager.acquire().await?;
        let result = self
            .bounded(collection.insert_one(VideoDocument::from(video)))
            .await?;

        let inserted_id = result.inserted_id.as_object_id().ok_or_else(|| {
            AppError::Database(anyhow::anyhow!(
                "Insert returned a non-ObjectId id: {}",
                result.inserted_id
            ))
        })?;

        tracing::debug!("Inserted video {}", inserted_id);

        Ok(InsertAck {
            acknowledged: true,
            inserted_id,
        })
    }

    #[tracing::instrument(name = "Count videos", skip(self))]
    async fn count(&self, query: &VideoQuery) -> Result<u64, AppError> {
        let collection = self.manager.acquire().await?;
        self.bounded(collection.count_documents(title_filter(&query.search)))
            .await
    }

    #[tracing::instrument(name = "Find video page", skip(self))]
    async fn find_page(&self, query: &VideoQuery) -> Result<Vec<Video>, AppError> {
        let collection = self.manager.acquire().await?;

        let find = collection
            .find(title_filter(&query.search))
            .with_options(find_options(query));

        let documents = self
            .bounded(async move {
                let cursor = find.await?;
                let documents: Vec<VideoDocument> = cursor.try_collect().await?;
                Ok::<_, mongodb::error::Error>(documents)
            })
            .await?;

        documents.into_iter().map(VideoDocument::into_video).collect()
    }

    #[tracing::instrument(name = "Delete video", skip(self))]
    async fn delete(&self, id: ObjectId) -> Result<u64, AppError> {
        let collection = self.manager.acquire().await?;
        let result = self
            .bounded(collection.delete_one(doc! { "_id": id }))
            .await?;

        Ok(result.deleted_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> MongoSettings {
        MongoSettings {
            uri: "mongodb://localhost:27017".to_string(),
            database: "videosDB".to_string(),
            collection: "videos".to_string(),
            cache_scope: CacheScope::Instance,
            connect_timeout: Some(Duration::from_millis(1500)),
            server_selection_timeout: Some(Duration::from_millis(2500)),
            socket_timeout: None,
            max_pool_size: Some(10),
            min_pool_size: Some(1),
            max_idle_time: Some(Duration::from_secs(30)),
        }
    }

    #[test]
    fn empty_search_matches_everything() {
        assert_eq!(title_filter(""), doc! {});
    }

    #[test]
    fn search_becomes_case_insensitive_regex() {
        assert_eq!(
            title_filter("rock"),
            doc! { "title": { "$regex": "rock", "$options": "i" } }
        );
    }

    #[test]
    fn regex_metacharacters_are_escaped() {
        assert_eq!(escape_regex("a.b*c"), "a\\.b\\*c");
        assert_eq!(escape_regex("(1+1)?"), "\\(1\\+1\\)\\?");
        assert_eq!(escape_regex("plain text"), "plain text");
        assert_eq!(escape_regex("AC/DC - Live"), "AC\\/DC \\- Live");
    }

    fn page_query(page: u64, order: ListOrder) -> VideoQuery {
        VideoQuery {
            search: String::new(),
            page,
            order,
        }
    }

    #[test]
    fn find_options_select_one_sorted_page() {
        let options = find_options(&page_query(3, ListOrder::Newest));
        assert_eq!(options.skip, Some(12));
        assert_eq!(options.limit, Some(6));
        assert_eq!(options.sort, Some(doc! { "createdAt": -1, "_id": -1 }));

        let options = find_options(&page_query(1, ListOrder::Natural));
        assert_eq!(options.skip, Some(0));
        assert_eq!(options.limit, Some(6));
        assert_eq!(options.sort, None);
    }

    #[test]
    fn find_options_skip_fits_the_wire_format() {
        let options = find_options(&page_query(u64::MAX, ListOrder::Newest));
        let skip = options.skip.unwrap();
        assert!(i64::try_from(skip).is_ok());
    }

    #[test]
    fn newest_order_breaks_ties_by_id() {
        assert_eq!(sort_spec(ListOrder::Newest), Some(doc! { "createdAt": -1, "_id": -1 }));
        assert_eq!(sort_spec(ListOrder::Natural), None);
    }

    #[test]
    fn new_video_document_has_no_id_and_skips_missing_fields() {
        let now = Utc::now();
        let document = VideoDocument::from(NewVideo {
            title: None,
            youtube_url: Some("http://a".to_string()),
            created_at: now,
        });

        let stored = bson::to_document(&document).unwrap();
        assert!(!stored.contains_key("_id"));
        assert!(!stored.contains_key("title"));
        assert_eq!(stored.get_str("youtubeUrl").unwrap(), "http://a");
        assert_eq!(
            stored.get_datetime("createdAt").unwrap().timestamp_millis(),
            now.timestamp_millis()
        );
    }

    #[test]
    fn stored_document_without_id_is_a_database_error() {
        let document = VideoDocument {
            id: None,
            title: None,
            youtube_url: None,
            created_at: bson::DateTime::now(),
        };
        assert!(matches!(document.into_video(), Err(AppError::Database(_))));
    }

    #[tokio::test]
    async fn driver_parameters_pass_through() {
        let options = MongoConnector::new(settings()).client_options().await.unwrap();

        assert_eq!(options.connect_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(options.server_selection_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(options.max_pool_size, Some(10));
        assert_eq!(options.min_pool_size, Some(1));
        assert_eq!(options.max_idle_time, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn malformed_uri_is_a_connection_error() {
        let connector = MongoConnector::new(MongoSettings {
            uri: "not-a-mongo-uri".to_string(),
            ..settings()
        });
        assert!(matches!(connector.connect().await, Err(AppError::Connection(_))));
    }

    #[test]
    fn process_scope_shares_the_cache() {
        let process = MongoSettings {
            cache_scope: CacheScope::Process,
            ..settings()
        };
        let first = connection_manager(&process);
        let second = connection_manager(&process);
        assert!(Arc::ptr_eq(&first.handle, &second.handle));

        let third = connection_manager(&settings());
        assert!(!Arc::ptr_eq(&first.handle, &third.handle));
    }

    /// Runs the full create/list/search/delete flow against a live server.
    /// Set `MONGODB_URI` and run with `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore = "requires a running MongoDB at MONGODB_URI"]
    async fn live_store_round_trip() {
        let uri = std::env::var("MONGODB_URI").expect("MONGODB_URI must be set");
        let settings = MongoSettings {
            uri,
            database: "videosDB_test".to_string(),
            collection: format!("videos_test_{}", ObjectId::new().to_hex()),
            min_pool_size: None,
            socket_timeout: Some(Duration::from_secs(10)),
            ..settings()
        };
        let store = MongoVideoStore::new(connection_manager(&settings), settings.socket_timeout);
        let query = |search: &str, page: u64| VideoQuery {
            search: search.to_string(),
            page,
            order: ListOrder::Newest,
        };
        let video = |title: &str, url: &str| NewVideo {
            title: Some(title.to_string()),
            youtube_url: Some(url.to_string()),
            created_at: Utc::now(),
        };

        let movie_a = store.insert(video("Movie A", "http://a")).await.unwrap();
        store.insert(video("Movie B", "http://b")).await.unwrap();

        assert_eq!(store.count(&query("", 1)).await.unwrap(), 2);
        let titles: Vec<_> = store
            .find_page(&query("", 1))
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.title.unwrap_or_default())
            .collect();
        assert_eq!(titles, vec!["Movie B", "Movie A"]);
        assert!(store.find_page(&query("", u64::MAX)).await.unwrap().is_empty());

        let found = store.find_page(&query("a", 1)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, movie_a.inserted_id);
        assert_eq!(store.count(&query("a.", 1)).await.unwrap(), 0);

        assert_eq!(store.delete(movie_a.inserted_id).await.unwrap(), 1);
        assert_eq!(store.delete(movie_a.inserted_id).await.unwrap(), 0);
        assert_eq!(store.count(&query("", 1)).await.unwrap(), 1);

        store.manager.acquire().await.unwrap().drop().await.unwrap();
    }
}
