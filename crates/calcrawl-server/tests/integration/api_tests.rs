use axum::http::StatusCode;
use calcrawl_core::EventStore;

use crate::integration::common::{get_json, setup_test_app, upcoming_event};

#[tokio::test]
async fn health_returns_200() {
    let app = setup_test_app().await;

    let (status, json) = get_json(&app.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["database"], "ok");
}

#[tokio::test]
async fn list_events_returns_upcoming_in_order() {
    let app = setup_test_app().await;
    let repo = app.db.event_repo();
    repo.upsert_if_absent(&upcoming_event("Later", 5, &["anime"]))
        .await
        .unwrap();
    repo.upsert_if_absent(&upcoming_event("Sooner", 1, &["anime", "luma"]))
        .await
        .unwrap();
    repo.upsert_if_absent(&upcoming_event("Far Away", 60, &[]))
        .await
        .unwrap();

    let (status, json) = get_json(&app.router, "/v1/events").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 2);
    assert_eq!(json["limit"], 50);
    assert_eq!(json["events"][0]["name"], "Sooner");
    assert_eq!(json["events"][1]["name"], "Later");
    assert_eq!(json["events"][0]["tags"], serde_json::json!(["anime", "luma"]));
}

#[tokio::test]
async fn list_events_filters_by_all_tags() {
    let app = setup_test_app().await;
    let repo = app.db.event_repo();
    repo.upsert_if_absent(&upcoming_event("Both", 1, &["anime", "luma"]))
        .await
        .unwrap();
    repo.upsert_if_absent(&upcoming_event("One", 2, &["anime"]))
        .await
        .unwrap();

    let (status, json) = get_json(&app.router, "/v1/events?tags=anime,luma").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 1);
    assert_eq!(json["events"][0]["name"], "Both");
}

#[tokio::test]
async fn list_events_rejects_inverted_window() {
    let app = setup_test_app().await;

    let (status, json) = get_json(&app.router, "/v1/events?start=2000&end=1000").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_request");
}

#[tokio::test]
async fn get_event_by_id() {
    let app = setup_test_app().await;
    let event = upcoming_event("Anime Night", 3, &["anime"]);
    app.db.event_repo().upsert_if_absent(&event).await.unwrap();

    let (status, json) = get_json(&app.router, &format!("/v1/events/{}", event.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], event.id.as_str());
    assert_eq!(json["name"], "Anime Night");
    assert_eq!(json["origin_url"], "https://lu.ma/anime-night");
}

#[tokio::test]
async fn unknown_event_returns_404() {
    let app = setup_test_app().await;

    let (status, json) = get_json(&app.router, "/v1/events/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");
}

#[tokio::test]
async fn tags_lists_upcoming_only() {
    let app = setup_test_app().await;
    let repo = app.db.event_repo();
    repo.upsert_if_absent(&upcoming_event("Past", -3, &["retro"]))
        .await
        .unwrap();
    repo.upsert_if_absent(&upcoming_event("Next", 2, &["tech", "anime"]))
        .await
        .unwrap();

    let (status, json) = get_json(&app.router, "/v1/tags").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["tags"], serde_json::json!(["anime", "tech"]));
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = setup_test_app().await;

    let (status, json) = get_json(&app.router, "/api-docs/openapi.json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/v1/events"].is_object());
    assert!(json["paths"]["/v1/events/{id}"].is_object());
}
