use crate::error::ServiceError;
use crate::service::SearchService;
use crate::types::{
    LastSearchesParams, LastSearchesResponse, MostPopularParams, MostPopularResponse,
    RecordSearchRequest,
};
use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SearchService>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/hello", get(hello))
        .route("/lastSearch", post(record_search))
        .route("/health", get(health_check))
        .route("/lastSearches", get(last_searches))
        .route("/mostPopular", get(most_popular))
        .route("/status", get(status_check))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

async fn hello() -> StatusCode {
    StatusCode::OK
}

async fn record_search(
    State(state): State<AppState>,
    payload: Result<Json<RecordSearchRequest>, JsonRejection>,
) -> Result<StatusCode, ServiceError> {
    let Json(request) = payload?;
    state
        .service
        .record_search(request.user_id.as_deref(), request.search_phrase.as_deref())
        .await?;
    Ok(StatusCode::OK)
}

/// Storage health check endpoint
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.service.health().await {
        Ok(()) => (StatusCode::OK, "OK"),
        Err(e) => {
            tracing::error!(error = %e, "storage health check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Connection to storage is not OK",
            )
        }
    }
}

async fn last_searches(
    State(state): State<AppState>,
    Query(params): Query<LastSearchesParams>,
) -> Result<Json<LastSearchesResponse>, ServiceError> {
    let limit = parse_limit(params.limit.as_deref())?;
    let last_searches = state
        .service
        .last_searches(params.user_id.as_deref(), limit)
        .await?;
    Ok(Json(LastSearchesResponse { last_searches }))
}

async fn most_popular(
    State(state): State<AppState>,
    Query(params): Query<MostPopularParams>,
) -> Result<Json<MostPopularResponse>, ServiceError> {
    let limit = parse_limit(params.limit.as_deref())?;
    let most_searched = state.service.most_popular(limit).await?;
    Ok(Json(MostPopularResponse { most_searched }))
}

/// Status check endpoint - returns the popularity cache snapshot summary
async fn status_check(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.service.cache_status()))
}

/// Missing stays `None` so the service reports it; anything non-numeric is rejected here.
fn parse_limit(raw: Option<&str>) -> Result<Option<i64>, ServiceError> {
    raw.map(|s| {
        s.trim()
            .parse::<i64>()
            .map_err(|_| ServiceError::invalid("limit must be a positive integer"))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheSettings, PopularityCache};
    use crate::storage::{MemoryStore, SearchStore};
    use crate::types::{CacheStatus, ErrorResponse};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;

    fn app() -> Router {
        let store: Arc<dyn SearchStore> = Arc::new(MemoryStore::new());
        let cache = PopularityCache::new(Arc::clone(&store), CacheSettings::default());
        router(AppState {
            service: Arc::new(SearchService::new(store, cache)),
        })
    }

    async fn get_uri(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    async fn post_search(app: &Router, body: serde_json::Value) -> StatusCode {
        app.clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/lastSearch")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    fn json<T: DeserializeOwned>(body: &[u8]) -> T {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_hello_and_health() {
        let app = app();

        assert_eq!(get_uri(&app, "/hello").await.0, StatusCode::OK);
        let (status, body) = get_uri(&app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");
    }

    #[tokio::test]
    async fn test_record_then_last_searches() {
        let app = app();

        let status = post_search(
            &app,
            serde_json::json!({"userId": "bob", "searchPhrase": "marvel"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = get_uri(&app, "/lastSearches?userId=bob&limit=1").await;
        assert_eq!(status, StatusCode::OK);
        let response: LastSearchesResponse = json(&body);
        assert_eq!(response.last_searches, vec!["marvel".to_string()]);
    }

    #[tokio::test]
    async fn test_record_search_missing_field_is_bad_request() {
        let app = app();

        let status = post_search(&app, serde_json::json!({"userId": "bob"})).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    async fn post_raw(
        app: &Router,
        content_type: Option<&str>,
        body: &str,
    ) -> (StatusCode, Vec<u8>) {
        let mut request = Request::builder().method("POST").uri("/lastSearch");
        if let Some(content_type) = content_type {
            request = request.header("content-type", content_type);
        }
        let response = app
            .clone()
            .oneshot(request.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_record_search_malformed_bodies_are_json_bad_requests() {
        let app = app();
        let valid = r#"{"userId": "bob", "searchPhrase": "marvel"}"#;

        for (content_type, body) in [
            (None, valid),
            (Some("text/plain"), valid),
            (
                Some("application/json"),
                r#"{"userId": 123, "searchPhrase": "marvel"}"#,
            ),
            (Some("application/json"), ""),
            (Some("application/json"), "{not json"),
        ] {
            let (status, body) = post_raw(&app, content_type, body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{content_type:?}");
            let error: ErrorResponse = json(&body);
            assert!(!error.error.is_empty());
        }

        let (_, body) = get_uri(&app, "/lastSearches?userId=bob&limit=5").await;
        let response: LastSearchesResponse = json(&body);
        assert!(response.last_searches.is_empty());
    }

    #[tokio::test]
    async fn test_last_searches_validation() {
        let app = app();

        for uri in [
            "/lastSearches?userId=bob",
            "/lastSearches?limit=2",
            "/lastSearches?userId=bob&limit=0",
            "/lastSearches?userId=bob&limit=abc",
        ] {
            let (status, body) = get_uri(&app, uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            let error: ErrorResponse = json(&body);
            assert!(!error.error.is_empty());
        }
    }

    #[tokio::test]
    async fn test_most_popular() {
        let app = app();
        for (phrase, count) in [("A", 3), ("B", 1)] {
            for _ in 0..count {
                post_search(
                    &app,
                    serde_json::json!({"userId": "bob", "searchPhrase": phrase}),
                )
                .await;
            }
        }

        let (status, body) = get_uri(&app, "/mostPopular?limit=1").await;
        assert_eq!(status, StatusCode::OK);
        let response: MostPopularResponse = json(&body);
        assert_eq!(response.most_searched.len(), 1);
        assert_eq!(response.most_searched[0].search_phrase, "A");
        assert_eq!(response.most_searched[0].hits, 3);

        let (_, body) = get_uri(&app, "/status").await;
        let status: CacheStatus = json(&body);
        // Backfilled from the direct query for one entry.
        assert_eq!(status.entries, 1);
        assert_eq!(status.capacity, 100);
    }

    #[tokio::test]
    async fn test_most_popular_rejects_bad_limit() {
        let app = app();

        for uri in ["/mostPopular", "/mostPopular?limit=0", "/mostPopular?limit=-4"] {
            assert_eq!(get_uri(&app, uri).await.0, StatusCode::BAD_REQUEST, "{uri}");
        }
    }
}
