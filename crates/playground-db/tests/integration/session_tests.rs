use chrono::Duration;
use playground_core::models::{Principal, compute_hash};

use crate::integration::common::setup_test_db;

fn principal() -> Principal {
    Principal {
        login: "octocat".into(),
        email: Some("octocat@example.com".into()),
        avatar_url: Some("https://avatars.githubusercontent.com/u/1".into()),
        access_token: "gho_session_token".into(),
    }
}

#[tokio::test]
async fn create_and_find_session() {
    let db = setup_test_db().await;
    let repo = db.session_repo();

    let raw_id = repo.create(&principal(), Duration::hours(8)).await.unwrap();
    assert_eq!(raw_id.len(), 64);

    let found = repo.find(&raw_id).await.unwrap().expect("session should exist");
    assert_eq!(found, principal());

    assert!(repo.find("not-a-session").await.unwrap().is_none());
}

#[tokio::test]
async fn raw_session_id_is_not_stored() {
    let db = setup_test_db().await;
    let repo = db.session_repo();

    let raw_id = repo.create(&principal(), Duration::hours(8)).await.unwrap();

    let stored: Vec<(String,)> = sqlx::query_as("SELECT id_hash FROM sessions")
        .fetch_all(db.pool())
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_ne!(stored[0].0, raw_id);
    assert_eq!(stored[0].0, compute_hash(&raw_id));
}

#[tokio::test]
async fn expired_session_is_ignored_and_purged() {
    let db = setup_test_db().await;
    let repo = db.session_repo();

    let expired = repo.create(&principal(), Duration::seconds(-60)).await.unwrap();
    let live = repo.create(&principal(), Duration::hours(1)).await.unwrap();

    assert!(repo.find(&expired).await.unwrap().is_none());
    assert_eq!(repo.purge_expired().await.unwrap(), 1);
    assert!(repo.find(&live).await.unwrap().is_some());
}

#[tokio::test]
async fn delete_ends_session() {
    let db = setup_test_db().await;
    let repo = db.session_repo();

    let raw_id = repo.create(&principal(), Duration::hours(1)).await.unwrap();
    assert!(repo.delete(&raw_id).await.unwrap());
    assert!(repo.find(&raw_id).await.unwrap().is_none());
    assert!(!repo.delete(&raw_id).await.unwrap());
}
