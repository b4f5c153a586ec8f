use calcrawl_core::{EventQuery, EventStore};
use chrono::Duration;

use crate::integration::common::{base_time, event_at, setup_test_db};

#[tokio::test]
async fn insert_and_get_round_trips_fields() {
    let db = setup_test_db().await;
    let repo = db.event_repo();
    let event = event_at("Anime Night", 0, &["anime", "eventbrite"]);

    assert!(repo.upsert_if_absent(&event).await.unwrap());

    let stored = repo
        .get_event(&event.id)
        .await
        .unwrap()
        .expect("Should find the event");
    assert_eq!(stored, event);
    assert_eq!(stored.start_time.offset(), event.start_time.offset());
    assert_eq!(stored.metadata["raw-time"], "Saturday 6pm");
}

#[tokio::test]
async fn duplicate_insert_keeps_first_row() {
    let db = setup_test_db().await;
    let repo = db.event_repo();
    let event = event_at("Anime Night", 0, &["anime"]);

    assert!(repo.upsert_if_absent(&event).await.unwrap());

    let mut again = event.clone();
    again.tags.insert("cosplay".into());
    again.metadata.insert("raw-time".into(), "changed".into());
    assert!(!repo.upsert_if_absent(&again).await.unwrap());

    assert_eq!(repo.count().await.unwrap(), 1);
    let stored = repo.get_event(&event.id).await.unwrap().unwrap();
    assert!(!stored.tags.contains("cosplay"));
    assert_eq!(stored.metadata["raw-time"], "Saturday 6pm");
}

#[tokio::test]
async fn get_unknown_id_returns_none() {
    let db = setup_test_db().await;
    assert!(db.event_repo().get_event("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn query_filters_window_and_orders_by_start() {
    let db = setup_test_db().await;
    let repo = db.event_repo();
    for (name, hours) in [("Late", 48), ("Early", 1), ("Outside", 24 * 40), ("Past", -5)] {
        repo.upsert_if_absent(&event_at(name, hours, &[]))
            .await
            .unwrap();
    }

    let query = EventQuery::between(base_time(), base_time() + Duration::days(30));
    let names: Vec<String> = repo
        .query_events(&query)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["Early", "Late"]);

    let page = repo
        .query_events(&query.clone().with_page(1, 1))
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].name, "Late");
}

#[tokio::test]
async fn query_requires_every_tag() {
    let db = setup_test_db().await;
    let repo = db.event_repo();
    repo.upsert_if_absent(&event_at("Both", 1, &["anime", "luma"]))
        .await
        .unwrap();
    repo.upsert_if_absent(&event_at("Anime Only", 2, &["anime"]))
        .await
        .unwrap();
    repo.upsert_if_absent(&event_at("Neither", 3, &["tech"]))
        .await
        .unwrap();

    let window = EventQuery::between(base_time(), base_time() + Duration::days(1));

    let both = repo
        .query_events(&window.clone().with_tags(vec!["anime".into(), "luma".into()]))
        .await
        .unwrap();
    assert_eq!(both.len(), 1);
    assert_eq!(both[0].name, "Both");

    let anime = repo
        .query_events(&window.clone().with_tags(vec!["anime".into(), "anime".into()]))
        .await
        .unwrap();
    assert_eq!(anime.len(), 2);

    let none = repo
        .query_events(&window.with_tags(vec!["sports".into()]))
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn bulk_update_marks_processed_and_adds_tags() {
    let db = setup_test_db().await;
    let repo = db.event_repo();
    let first = event_at("Anime Night", 1, &["luma"]);
    let second = event_at("Board Games", 2, &[]);
    repo.upsert_if_absent(&first).await.unwrap();
    repo.upsert_if_absent(&second).await.unwrap();

    let mut pending = repo.get_unprocessed().await.unwrap();
    assert_eq!(pending.len(), 2);

    pending[0].tags.insert("anime".into());
    pending[0].processed = true;
    pending[1].processed = true;
    pending[1].relevant = true;
    repo.bulk_update_processed(&pending).await.unwrap();

    assert!(repo.get_unprocessed().await.unwrap().is_empty());

    let updated = repo.get_event(&first.id).await.unwrap().unwrap();
    assert!(updated.processed);
    assert!(!updated.relevant);
    assert_eq!(
        updated.tags.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["anime", "luma"]
    );
    assert_eq!(updated.id, updated.identity_hash());

    let relevant = repo.get_event(&second.id).await.unwrap().unwrap();
    assert!(relevant.relevant);
}

#[tokio::test]
async fn bulk_update_ignores_unknown_events() {
    let db = setup_test_db().await;
    let repo = db.event_repo();
    let mut ghost = event_at("Ghost", 1, &["anime"]);
    ghost.processed = true;

    repo.bulk_update_processed(&[ghost]).await.unwrap();
    assert_eq!(repo.count().await.unwrap(), 0);
}

#[tokio::test]
async fn distinct_tags_since_skips_past_events() {
    let db = setup_test_db().await;
    let repo = db.event_repo();
    repo.upsert_if_absent(&event_at("Old", -48, &["retro"]))
        .await
        .unwrap();
    repo.upsert_if_absent(&event_at("Soon", 5, &["tech", "luma"]))
        .await
        .unwrap();
    repo.upsert_if_absent(&event_at("Later", 50, &["luma", "anime"]))
        .await
        .unwrap();

    let tags = repo.distinct_tags_since(base_time()).await.unwrap();
    assert_eq!(tags, vec!["anime", "luma", "tech"]);
}

#[tokio::test]
async fn health_check_succeeds() {
    let db = setup_test_db().await;
    db.event_repo().health_check().await.unwrap();
}
