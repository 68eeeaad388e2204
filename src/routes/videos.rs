use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::models::{
    total_pages, CreateVideo, InsertAck, ListParams, NewVideo, VideoPage, VideoQuery,
};
use crate::InnerState;

const VIDEO_NOT_FOUND: &str = "Video not found";

#[tracing::instrument(name = "Create video", skip(inner, payload))]
pub async fn create_video(
    State(inner): State<InnerState>,
    payload: Result<Json<CreateVideo>, JsonRejection>,
) -> Result<Json<InsertAck>, AppError> {
    let InnerState { videos, .. } = inner;
    let Json(payload) = payload?;

    let video = NewVideo::from_request(payload, Utc::now());
    tracing::debug!(
        title = ?video.title,
        youtube_url = ?video.youtube_url,
        "Creating video"
    );

    let ack = videos.insert(video).await?;
    Ok(Json(ack))
}

#[tracing::instrument(name = "List videos", skip(inner))]
pub async fn list_videos(
    State(inner): State<InnerState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<VideoPage>, AppError> {
    let InnerState { videos, list_order } = inner;
    let Query(params) = params?;

    let query = VideoQuery::from_params(params, list_order);

    let total = videos.count(&query).await?;
    let page = videos.find_page(&query).await?;

    tracing::debug!(
        "Listed {} of {} videos on page {} for search {:?}",
        page.len(),
        total,
        query.page,
        query.search
    );

    Ok(Json(VideoPage {
        videos: page,
        total_pages: total_pages(total),
    }))
}

#[tracing::instrument(name = "Delete video", skip(inner))]
pub async fn delete_video(
    State(inner): State<InnerState>,
    Path(video_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let InnerState { videos, .. } = inner;

    // A malformed id cannot name a stored video.
    let id = ObjectId::parse_str(&video_id)
        .map_err(|_| AppError::NotFound(VIDEO_NOT_FOUND.to_string()))?;

    match videos.delete(id).await? {
        0 => Err(AppError::NotFound(VIDEO_NOT_FOUND.to_string())),
        _ => Ok(Json(json!({ "message": "Deleted" }))),
    }
}
