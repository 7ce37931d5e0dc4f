//! Listing, detail and freshness endpoints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::header::HeaderName;
use axum::http::{HeaderMap, HeaderValue, Uri};
use axum::Json;
use fileindex::{group, query, GroupedEntry, ListEntry, QueryOutcome, QueryParams};

use crate::server::error::ApiError;
use crate::server::{request_key, ServerState};

const TOTAL_ITEMS: HeaderName = HeaderName::from_static("total-items");
const TOTAL_MATCHED: HeaderName = HeaderName::from_static("total-matched");
const LAST_UPDATE: HeaderName = HeaderName::from_static("last-update");
const PAGE: HeaderName = HeaderName::from_static("page");
const PAGE_SIZE: HeaderName = HeaderName::from_static("page-size");

fn run_query(state: &ServerState, pairs: Vec<(String, String)>) -> (QueryOutcome, u64) {
    let params = QueryParams::from_pairs(pairs);
    let snapshot = state.store.snapshot();
    let outcome = query(&snapshot, &params);
    (outcome, snapshot.cycle_millis())
}

fn outcome_headers(outcome: &QueryOutcome, last_update: u64) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(TOTAL_ITEMS, HeaderValue::from(outcome.returned()));
    headers.insert(TOTAL_MATCHED, HeaderValue::from(outcome.matched));
    headers.insert(LAST_UPDATE, HeaderValue::from(last_update));
    if let Some(page) = outcome.pagination {
        headers.insert(PAGE, HeaderValue::from(page.page));
        headers.insert(PAGE_SIZE, HeaderValue::from(page.page_size));
    }
    headers
}

/// GET /list
pub(crate) async fn list(
    State(state): State<Arc<ServerState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> (HeaderMap, Json<Vec<ListEntry>>) {
    let (outcome, last_update) = run_query(&state, pairs);
    tracing::debug!(
        matched = outcome.matched,
        returned = outcome.returned(),
        "list query"
    );
    let headers = outcome_headers(&outcome, last_update);
    (headers, Json(outcome.entries))
}

/// GET /list/group
///
/// Same query options as `/list`; the page of results is arranged into a
/// directory tree.
pub(crate) async fn list_grouped(
    State(state): State<Arc<ServerState>>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> (HeaderMap, Json<GroupedEntry>) {
    let (outcome, last_update) = run_query(&state, pairs);
    let headers = outcome_headers(&outcome, last_update);
    (headers, Json(group(outcome.entries)))
}

/// GET /detail/*key
pub(crate) async fn detail(
    State(state): State<Arc<ServerState>>,
    uri: Uri,
) -> Result<Json<ListEntry>, ApiError> {
    let key = request_key(&uri, "/detail");
    let entry = state.store.get(&key)?;
    Ok(Json(entry.to_list_entry()))
}

/// GET /cycle
///
/// Cycle of the current snapshot, in milliseconds.
pub(crate) async fn cycle(State(state): State<Arc<ServerState>>) -> Json<u64> {
    Json(state.store.cycle_millis())
}

#[cfg(test)]
mod tests {
    use crate::server::tests::{body_json, fixture, get};
    use axum::http::StatusCode;

    fn names(value: &serde_json::Value) -> Vec<String> {
        value
            .as_array()
            .expect("array")
            .iter()
            .map(|item| item["name"].as_str().expect("name").to_string())
            .collect()
    }

    #[tokio::test]
    async fn list_returns_everything_without_pagination_headers() {
        let (_dir, state) = fixture();
        let response = get(&state, "/list").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["total-items"], "4");
        assert_eq!(response.headers()["total-matched"], "4");
        assert_eq!(
            response.headers()["last-update"],
            state.store.cycle_millis().to_string().as_str()
        );
        assert!(response.headers().get("page").is_none());

        let body = body_json(response).await;
        assert_eq!(names(&body), vec!["a", "x.txt", "y.txt", "b.txt"]);
        let first_file = &body[1];
        assert_eq!(first_file["directories"], serde_json::json!(["a"]));
        assert_eq!(first_file["contentUrl"], "/content/a/x.txt");
        assert_eq!(first_file["isDirectory"], false);
    }

    #[tokio::test]
    async fn list_applies_dirs_order_and_limit() {
        let (_dir, state) = fixture();
        let response = get(&state, "/list?dirs%5B%5D=a&orderby=-name&limit=1").await;
        assert_eq!(response.headers()["total-items"], "1");
        assert_eq!(response.headers()["total-matched"], "2");
        assert_eq!(response.headers()["page"], "1");
        assert_eq!(response.headers()["page-size"], "10");
        assert_eq!(names(&body_json(response).await), vec!["y.txt"]);
    }

    #[tokio::test]
    async fn list_coerces_bad_numbers() {
        let (_dir, state) = fixture();
        let response = get(&state, "/list?page=zero&pagesize=-2").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["page"], "1");
        assert_eq!(response.headers()["page-size"], "1");
        assert_eq!(names(&body_json(response).await), vec!["a"]);
    }

    #[tokio::test]
    async fn grouped_list_nests_directory_children() {
        let (_dir, state) = fixture();
        let response = get(&state, "/list/group").await;
        assert_eq!(response.status(), StatusCode::OK);
        let tree = body_json(response).await;
        assert_eq!(tree["name"], "topLevel");
        assert_eq!(names(&tree["children"]), vec!["a", "b.txt"]);
        assert_eq!(names(&tree["children"][0]["children"]), vec!["x.txt", "y.txt"]);
    }

    #[tokio::test]
    async fn detail_finds_entry_or_reports_not_found() {
        let (_dir, state) = fixture();
        let response = get(&state, "/detail/a/x.txt").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["name"], "x.txt");
        assert_eq!(body["size"], 2);
        assert_eq!(body["contentType"], "text/plain; charset=utf-8");

        let response = get(&state, "/detail/a/missing.txt").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["ok"], false);
        assert_eq!(body["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn cycle_reports_snapshot_millis() {
        let (_dir, state) = fixture();
        let body = body_json(get(&state, "/cycle").await).await;
        assert_eq!(body.as_u64(), Some(state.store.cycle_millis()));
    }
}
