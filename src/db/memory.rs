//! In-process store used by the route tests.

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::VideoStore;
use crate::config::ListOrder;
use crate::errors::AppError;
use crate::models::{InsertAck, NewVideo, Video, VideoQuery};

#[derive(Default)]
pub struct MemoryVideoStore {
    videos: RwLock<Vec<Video>>,
    unavailable: AtomicBool,
}

impl MemoryVideoStore {
    /// Makes every later call fail the way an unreachable database does.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.videos.read().await.len()
    }

    fn check_available(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Connection(anyhow::anyhow!("connection refused")));
        }
        Ok(())
    }

    async fn matching(&self, query: &VideoQuery) -> Vec<Video> {
        let videos = self.videos.read().await;
        let mut matching: Vec<Video> = videos
            .iter()
            .filter(|v| query.matches_title(v.title.as_deref()))
            .cloned()
            .collect();

        if query.order == ListOrder::Newest {
            matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        }
        matching
    }
}

#[async_trait]
impl VideoStore for MemoryVideoStore {
    async fn insert(&self, video: NewVideo) -> Result<InsertAck, AppError> {
        self.check_available()?;
        let id = ObjectId::new();
        self.videos.write().await.push(Video {
            id,
            title: video.title,
            youtube_url: video.youtube_url,
            created_at: video.created_at,
        });
        Ok(InsertAck {
            acknowledged: true,
            inserted_id: id,
        })
    }

    async fn count(&self, query: &VideoQuery) -> Result<u64, AppError> {
        self.check_available()?;
        Ok(self.matching(query).await.len() as u64)
    }

    async fn find_page(&self, query: &VideoQuery) -> Result<Vec<Video>, AppError> {
        self.check_available()?;
        Ok(self
            .matching(query)
            .await
            .into_iter()
            .skip(usize::try_from(query.skip()).unwrap_or(usize::MAX))
            .take(usize::try_from(query.limit()).unwrap_or(usize::MAX))
            .collect())
    }

    async fn delete(&self, id: ObjectId) -> Result<u64, AppError> {
        self.check_available()?;
        let mut videos = self.videos.write().await;
        let before = videos.len();
        videos.retain(|v| v.id != id);
        Ok((before - videos.len()) as u64)
    }
}
