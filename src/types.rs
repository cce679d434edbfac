use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single search made by a user. Never mutated once stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRecord {
    pub user_id: String,

    pub search_phrase: String,

    pub timestamp: DateTime<Utc>,
}

impl SearchRecord {
    pub fn new(user_id: impl Into<String>, search_phrase: impl Into<String>) -> Self {
        Self::at(user_id, search_phrase, Utc::now())
    }

    pub fn at(
        user_id: impl Into<String>,
        search_phrase: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            search_phrase: search_phrase.into(),
            timestamp,
        }
    }
}

/// Hit count for one phrase, aggregated over the popularity window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularityEntry {
    pub search_phrase: String,

    pub hits: u64,
}

impl PopularityEntry {
    pub fn new(search_phrase: impl Into<String>, hits: u64) -> Self {
        Self {
            search_phrase: search_phrase.into(),
            hits,
        }
    }
}

/// Body of `POST /lastSearch`. Fields are optional so that missing values
/// surface as validation errors instead of extractor rejections.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSearchRequest {
    pub user_id: Option<String>,

    pub search_phrase: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSearchesParams {
    pub user_id: Option<String>,

    pub limit: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MostPopularParams {
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSearchesResponse {
    pub last_searches: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MostPopularResponse {
    pub most_searched: Vec<PopularityEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

/// Point-in-time view of the popularity cache, served by `GET /status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub entries: usize,

    pub capacity: usize,

    pub age_secs: u64,
}
