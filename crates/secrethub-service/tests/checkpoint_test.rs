//! Integration tests for folder and tree checkpoints.

mod helpers;

use secrethub_core::config::PitConfig;
use secrethub_core::error::ErrorKind;
use uuid::Uuid;

use helpers::Harness;

#[tokio::test]
async fn test_folder_checkpoint_preconditions() {
    let h = Harness::new().await;
    let root = h.create_root_folder().await;
    let app = h.create_folder(root, "app").await;

    let none = h
        .pit
        .checkpoints
        .create_folder_checkpoint(app, None, true)
        .await
        .expect("no history");
    assert!(none.is_none());

    let err = h
        .pit
        .checkpoints
        .create_folder_checkpoint(Uuid::new_v4(), None, true)
        .await
        .expect_err("missing folder");
    assert!(err.is_not_found());

    h.create_secret(app, "A", "a").await;
    let root_commit = h.latest_commit(root).await;
    let err = h
        .pit
        .checkpoints
        .create_folder_checkpoint(app, Some(root_commit.id), true)
        .await
        .expect_err("foreign commit");
    assert_eq!(err.kind, ErrorKind::BadRequest);
}

#[tokio::test]
async fn test_folder_checkpoint_not_repeated_for_same_commit() {
    let h = Harness::new().await;
    let root = h.create_root_folder().await;
    h.create_secret(root, "A", "a").await;

    let first = h
        .pit
        .checkpoints
        .create_folder_checkpoint(root, None, true)
        .await
        .expect("checkpoint");
    assert!(first.is_some());

    let second = h
        .pit
        .checkpoints
        .create_folder_checkpoint(root, None, true)
        .await
        .expect("checkpoint");
    assert!(second.is_none());

    let latest = h.pit.history.latest_checkpoint(root).await.expect("latest");
    assert_eq!(latest.map(|m| m.checkpoint_id), first.map(|c| c.id));
}

#[tokio::test]
async fn test_unforced_folder_checkpoint_waits_for_window() {
    let h = Harness::with_config(PitConfig::with_windows(3, 100)).await;
    let root = h.create_root_folder().await;
    let app = h.create_folder(root, "app").await;
    h.create_secret(app, "A", "a").await;

    let skipped = h
        .pit
        .checkpoints
        .create_folder_checkpoint(app, None, false)
        .await
        .expect("evaluate");
    assert!(skipped.is_none());
    assert_eq!(h.store.checkpoint_count().await, 0);
}

#[tokio::test]
async fn test_tree_checkpoint_window() {
    let h = Harness::with_config(PitConfig::with_windows(100, 2)).await;
    let root = h.create_root_folder().await;

    h.create_secret(root, "A", "a").await;
    assert_eq!(h.store.tree_checkpoint_count().await, 1);

    h.create_secret(root, "B", "b").await;
    h.create_secret(root, "C", "c").await;
    let not_due = h
        .pit
        .checkpoints
        .create_folder_tree_checkpoint(h.env_id)
        .await
        .expect("evaluate");
    assert!(not_due.is_none());

    h.create_secret(root, "D", "d").await;
    let created = h
        .pit
        .checkpoints
        .create_folder_tree_checkpoint(h.env_id)
        .await
        .expect("evaluate");
    assert!(created.is_some());
    assert_eq!(h.store.tree_checkpoint_count().await, 2);

    let repeated = h
        .pit
        .checkpoints
        .create_folder_tree_checkpoint(h.env_id)
        .await
        .expect("evaluate");
    assert!(repeated.is_none());
}

#[tokio::test]
async fn test_tree_checkpoint_for_unknown_environment_is_noop() {
    let h = Harness::new().await;
    let result = h
        .pit
        .checkpoints
        .create_folder_tree_checkpoint(Uuid::new_v4())
        .await
        .expect("evaluate");
    assert!(result.is_none());
}

#[tokio::test]
async fn test_resolve_folder_commits_at_position() {
    let h = Harness::with_config(PitConfig::with_windows(100, 1)).await;
    let root = h.create_root_folder().await;
    let api = h.create_folder(root, "api").await;
    let web = h.create_folder(root, "web").await;
    h.create_secret(api, "A", "a").await;
    h.create_secret(web, "W", "w").await;

    let root_then = h.latest_commit(root).await;
    let api_then = h.latest_commit(api).await;
    let web_then = h.latest_commit(web).await;
    let position = web_then.position;

    h.create_secret(api, "B", "b").await;
    let api_now = h.latest_commit(api).await;
    h.pit
        .checkpoints
        .create_folder_tree_checkpoint(h.env_id)
        .await
        .expect("evaluate")
        .expect("due");

    let at_then = h
        .pit
        .checkpoints
        .resolve_folder_commits_at(h.env_id, position)
        .await
        .expect("resolve");
    assert_eq!(at_then.len(), 3);
    assert_eq!(at_then[&root].id, root_then.id);
    assert_eq!(at_then[&api].id, api_then.id);
    assert_eq!(at_then[&web].id, web_then.id);

    let at_now = h
        .pit
        .checkpoints
        .resolve_folder_commits_at(h.env_id, api_now.position)
        .await
        .expect("resolve");
    assert_eq!(at_now[&api].id, api_now.id);
    assert_eq!(at_now[&web].id, web_then.id);
}
