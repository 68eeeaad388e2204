//! Store access: the connection manager and the video store seam.
//!
//! Handlers only see [`VideoStore`]. The MongoDB implementation obtains its
//! collection handle from a [`ConnectionManager`], which connects on first use
//! and caches the handle for every later request.

pub mod mongo;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::errors::AppError;
use crate::models::{InsertAck, NewVideo, Video, VideoQuery};

/// Cache slot for an established handle. Managers built on the same slot share one connection.
pub type SharedHandle<H> = Arc<OnceCell<H>>;

/// Opens a connection and returns a handle to the video collection.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Handle: Clone + Send + Sync + 'static;

    async fn connect(&self) -> Result<Self::Handle, AppError>;
}

pub struct ConnectionManager<C: Connector> {
    connector: Arc<C>,
    handle: SharedHandle<C::Handle>,
}

impl<C: Connector> Clone for ConnectionManager<C> {
    fn clone(&self) -> Self {
        Self {
            connector: self.connector.clone(),
            handle: self.handle.clone(),
        }
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Manager with its own cache; dropping every clone drops the connection.
    pub fn new(connector: C) -> Self {
        Self::with_shared_cache(connector, Arc::new(OnceCell::new()))
    }

    /// Manager whose cache outlives it, so a rebuilt manager reuses the connection.
    pub fn with_shared_cache(connector: C, handle: SharedHandle<C::Handle>) -> Self {
        Self {
            connector: Arc::new(connector),
            handle,
        }
    }

    /// Returns the cached handle, connecting first if needed.
    ///
    /// Concurrent callers wait on the same connection attempt. A failed attempt
    /// leaves the cache empty, so the next call tries again.
    #[tracing::instrument(name = "acquire_collection_handle", skip(self))]
    pub async fn acquire(&self) -> Result<C::Handle, AppError> {
        let handle = self
            .handle
            .get_or_try_init(|| async {
                tracing::info!("No cached database handle, connecting");
                match self.connector.connect().await {
                    Ok(handle) => {
                        tracing::info!("Database connection established");
                        Ok(handle)
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "Database connection attempt failed");
                        Err(err)
                    }
                }
            })
            .await?;

        Ok(handle.clone())
    }

    pub fn is_connected(&self) -> bool {
        self.handle.initialized()
    }
}

/// Persistence operations behind the video routes.
#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn insert(&self, video: NewVideo) -> Result<InsertAck, AppError>;

    /// Number of records matching the query's search, ignoring pagination.
    async fn count(&self, query: &VideoQuery) -> Result<u64, AppError>;

    async fn find_page(&self, query: &VideoQuery) -> Result<Vec<Video>, AppError>;

    /// Returns the number of removed records.
    async fn delete(&self, id: ObjectId) -> Result<u64, AppError>;
}

pub type DynVideoStore = Arc<dyn VideoStore>;
