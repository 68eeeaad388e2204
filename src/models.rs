use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::serde_helpers::serialize_object_id_as_hex_string;
use serde::{Deserialize, Serialize};

use crate::config::ListOrder;

/// Fixed number of videos per listed page.
pub const PAGE_SIZE: u64 = 6;

const MAX_SKIP: u64 = i64::MAX as u64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    #[serde(rename = "_id", serialize_with = "serialize_object_id_as_hex_string")]
    pub id: ObjectId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub youtube_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /videos`. Unknown fields, including `_id` and `createdAt`, are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVideo {
    pub title: Option<String>,
    #[serde(alias = "url")]
    pub youtube_url: Option<String>,
}

/// A record about to be inserted; `created_at` is always assigned server-side.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVideo {
    pub title: Option<String>,
    pub youtube_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewVideo {
    pub fn from_request(body: CreateVideo, now: DateTime<Utc>) -> Self {
        NewVideo {
            title: body.title,
            youtube_url: body.youtube_url,
            created_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertAck {
    pub acknowledged: bool,
    #[serde(serialize_with = "serialize_object_id_as_hex_string")]
    pub inserted_id: ObjectId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoPage {
    pub videos: Vec<Video>,
    pub total_pages: u64,
}

/// Raw query string of `GET /videos`, kept as strings so that bad input falls back to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    pub search: Option<String>,
}

/// Everything a store needs to select one page of videos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoQuery {
    pub search: String,
    pub page: u64,
    pub order: ListOrder,
}

impl VideoQuery {
    pub fn from_params(params: ListParams, order: ListOrder) -> Self {
        VideoQuery {
            search: params.search.unwrap_or_default(),
            page: parse_page(params.page.as_deref()),
            order,
        }
    }

    /// Records to skip before the page. Capped so the store can encode it as an `i64`.
    pub fn skip(&self) -> u64 {
        self.page
            .saturating_sub(1)
            .saturating_mul(PAGE_SIZE)
            .min(MAX_SKIP)
    }

    pub fn limit(&self) -> u64 {
        PAGE_SIZE
    }

    /// Case-insensitive substring match on the title; an empty search matches every record.
    pub fn matches_title(&self, title: Option<&str>) -> bool {
        if self.search.is_empty() {
            return true;
        }
        title.is_some_and(|t| t.to_lowercase().contains(&self.search.to_lowercase()))
    }
}

/// Absent, non-numeric and non-positive pages all mean page 1.
pub fn parse_page(raw: Option<&str>) -> u64 {
    raw.and_then(|p| p.trim().parse::<u64>().ok())
        .filter(|p| *p >= 1)
        .unwrap_or(1)
}

pub fn total_pages(total: u64) -> u64 {
    total.div_ceil(PAGE_SIZE)
}
