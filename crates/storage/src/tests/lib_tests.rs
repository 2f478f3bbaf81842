use super::*;
use shared::domain::Role;
use tempfile::TempDir;

fn db_url(dir: &TempDir) -> String {
    format!("sqlite://{}/session.db", dir.path().display())
}

#[tokio::test]
async fn load_session_on_fresh_store_is_none() {
    let dir = TempDir::new().expect("tempdir");
    let store = SessionStore::new(&db_url(&dir)).await.expect("open store");

    store.health_check().await.expect("health check");
    assert!(store.load_session().await.expect("load").is_none());
}

#[tokio::test]
async fn session_round_trips_across_reopen() {
    let dir = TempDir::new().expect("tempdir");
    let url = db_url(&dir);

    {
        let store = SessionStore::new(&url).await.expect("open store");
        store
            .save_session("bearer-token-1", Role::Hr, "priya")
            .await
            .expect("save");
    }

    let store = SessionStore::new(&url).await.expect("reopen store");
    let session = store.load_session().await.expect("load").expect("some");
    assert_eq!(session.token, "bearer-token-1");
    assert_eq!(session.role, Role::Hr);
    assert_eq!(session.username, "priya");
}

#[tokio::test]
async fn save_session_replaces_previous_row() {
    let dir = TempDir::new().expect("tempdir");
    let store = SessionStore::new(&db_url(&dir)).await.expect("open store");

    store
        .save_session("old-token", Role::Employee, "sam")
        .await
        .expect("save first");
    store
        .save_session("new-token", Role::Admin, "sam")
        .await
        .expect("save second");

    let session = store.load_session().await.expect("load").expect("some");
    assert_eq!(session.token, "new-token");
    assert_eq!(session.role, Role::Admin);
}

#[tokio::test]
async fn clear_session_removes_row() {
    let dir = TempDir::new().expect("tempdir");
    let store = SessionStore::new(&db_url(&dir)).await.expect("open store");

    store
        .save_session("token", Role::Admin, "sam")
        .await
        .expect("save");
    store.clear_session().await.expect("clear");

    assert!(store.load_session().await.expect("load").is_none());
}

#[tokio::test]
async fn creates_parent_dir_for_nested_database_path() {
    let dir = TempDir::new().expect("tempdir");
    let url = format!("sqlite://{}/nested/dir/session.db", dir.path().display());

    let store = SessionStore::new(&url).await.expect("open store");
    store.health_check().await.expect("health check");
    assert!(dir.path().join("nested/dir").exists());
}
