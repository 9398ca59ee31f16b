//! Integration tests for applying diffs, deep rollback and revert.

mod helpers;

use uuid::Uuid;

use secrethub_cache::keys;
use secrethub_core::error::ErrorKind;
use secrethub_entity::commit::CommitChangeType;
use secrethub_entity::resource::ResourceKind;
use secrethub_service::{ApplyRequest, DeepRollbackRequest, DiffChangeType, ResourceChange};

use helpers::Harness;

fn apply_request(h: &Harness, folder_id: Uuid, differences: Vec<ResourceChange>) -> ApplyRequest {
    ApplyRequest {
        differences,
        actor: h.actor(),
        message: None,
        folder_id,
        project_id: h.project_id,
        reconstruct_new_folders: false,
        reconstruct_up_to: None,
    }
}

#[tokio::test]
async fn test_rollback_to_latest_is_empty() {
    let h = Harness::new().await;
    let root = h.create_root_folder().await;
    h.create_secret(root, "A", "a").await;
    let latest = h.latest_commit(root).await;

    let diff = h
        .pit
        .rollback
        .compare_folder_states(latest.id, Some(latest.id))
        .await
        .expect("compare");
    assert!(diff.is_empty());

    let outcome = h
        .pit
        .rollback
        .apply_folder_state_differences(apply_request(&h, root, diff))
        .await
        .expect("apply");
    assert_eq!(outcome.total_changes, 0);

    let commit = outcome.commit.expect("empty commit recorded");
    assert_eq!(commit.commit_id, latest.commit_id + 1);
    assert_eq!(commit.message.as_deref(), Some("Rolled back folder state"));
    let details = h.pit.history.get_commit(commit.id).await.expect("details");
    assert!(details.changes.is_empty());
    assert!(details.is_latest);
}

#[tokio::test]
async fn test_apply_round_trip() {
    let h = Harness::new().await;
    let root = h.create_root_folder().await;
    let app = h.create_folder(root, "app").await;

    let a = h.create_secret(app, "A", "a1").await;
    let b = h.create_secret(app, "B", "b1").await;
    let older = h.latest_commit(app).await;
    h.update_secret(a, "a2").await.expect("changed");
    h.delete_secret(b).await;
    let newest = h.latest_commit(app).await;

    let back = h
        .pit
        .rollback
        .compare_folder_states(older.id, Some(newest.id))
        .await
        .expect("compare");
    let outcome = h
        .pit
        .rollback
        .apply_folder_state_differences(apply_request(&h, app, back))
        .await
        .expect("apply");
    assert_eq!(outcome.secret_changes, 2);
    assert_eq!(h.secret_value(a).await.as_deref(), Some("a1"));
    assert_eq!(h.secret_value(b).await.as_deref(), Some("b1"));

    let restored = outcome.commit.expect("commit");
    let forward = h
        .pit
        .rollback
        .compare_folder_states(newest.id, Some(restored.id))
        .await
        .expect("compare");
    h.pit
        .rollback
        .apply_folder_state_differences(apply_request(&h, app, forward))
        .await
        .expect("apply");

    assert_eq!(h.secret_value(a).await.as_deref(), Some("a2"));
    assert!(h.live_secret(b).await.is_none());

    let state = h.pit.history.folder_state(app, None).await.expect("state");
    assert_eq!(state.state.len(), 1);
    assert!(state.state.contains(ResourceKind::Secret, a));
}

#[tokio::test]
async fn test_apply_invalidates_project_cache_and_schedules() {
    let h = Harness::new().await;
    let root = h.create_root_folder().await;
    h.create_secret(root, "A", "a").await;
    let latest = h.latest_commit(root).await;

    h.pit
        .rollback
        .apply_folder_state_differences(apply_request(&h, root, Vec::new()))
        .await
        .expect("apply");

    assert_eq!(
        h.cache.evicted().await,
        vec![keys::project_secrets_pattern(h.project_id)]
    );
    assert_eq!(h.scheduler.scheduled().await, vec![latest.env_id]);
}

#[tokio::test]
async fn test_apply_to_missing_folder_is_not_found() {
    let h = Harness::new().await;
    let err = h
        .pit
        .rollback
        .apply_folder_state_differences(apply_request(&h, Uuid::new_v4(), Vec::new()))
        .await
        .expect_err("missing folder");
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_deep_rollback_restores_child_secret() {
    let h = Harness::new().await;
    let root = h.create_root_folder().await;
    let api = h.create_folder(root, "api").await;
    let web = h.create_folder(root, "web").await;
    let api_secret = h.create_secret(api, "API_KEY", "k1").await;
    h.create_secret(web, "WEB_KEY", "w1").await;
    h.create_secret(root, "ROOT_KEY", "r1").await;
    let target = h.latest_commit(root).await;

    h.delete_secret(api_secret).await;
    assert!(h.live_secret(api_secret).await.is_none());

    let counts_before = (
        h.commit_count(root).await,
        h.commit_count(api).await,
        h.commit_count(web).await,
    );

    let outcome = h
        .pit
        .rollback
        .deep_rollback_folder(DeepRollbackRequest {
            target_commit_id: target.id,
            env_id: h.env_id,
            actor: h.actor(),
            project_id: h.project_id,
            message: None,
        })
        .await
        .expect("deep rollback");

    assert_eq!(h.secret_value(api_secret).await.as_deref(), Some("k1"));
    assert_eq!(outcome.folders.len(), 3);
    assert_eq!(outcome.total_changes(), 1);
    assert_eq!(outcome.folders[0].folder_id, root);
    assert!(outcome.folders.iter().all(|f| f.outcome.commit.is_some()));

    assert_eq!(h.commit_count(root).await, counts_before.0 + 1);
    assert_eq!(h.commit_count(api).await, counts_before.1 + 1);
    assert_eq!(h.commit_count(web).await, counts_before.2 + 1);

    let api_commit = h.latest_commit(api).await;
    assert_eq!(api_commit.message.as_deref(), Some("Deep rollback"));
    let details = h.pit.history.get_commit(api_commit.id).await.expect("details");
    assert_eq!(details.changes.len(), 1);
    assert_eq!(details.changes[0].change_type, CommitChangeType::Add);

    assert_eq!(h.scheduler.scheduled().await, vec![h.env_id]);
}

#[tokio::test]
async fn test_deep_rollback_recreates_deleted_folder() {
    let h = Harness::new().await;
    let root = h.create_root_folder().await;
    let api = h.create_folder(root, "api").await;
    let nested = h.create_folder(api, "v1").await;
    let api_secret = h.create_secret(api, "API_KEY", "k1").await;
    let nested_secret = h.create_secret(nested, "TOKEN", "t1").await;
    h.create_secret(root, "ROOT_KEY", "r1").await;
    let target = h.latest_commit(root).await;

    h.delete_folder(api).await;
    assert!(h.live_folder(api).await.is_none());
    assert!(h.live_secret(nested_secret).await.is_none());

    h.pit
        .rollback
        .deep_rollback_folder(DeepRollbackRequest {
            target_commit_id: target.id,
            env_id: h.env_id,
            actor: h.actor(),
            project_id: h.project_id,
            message: Some("restore api".into()),
        })
        .await
        .expect("deep rollback");

    let restored = h.live_folder(api).await.expect("api restored");
    assert_eq!(restored.parent_id, Some(root));
    assert_eq!(restored.name, "api");
    assert!(h.live_folder(nested).await.is_some());
    assert_eq!(h.secret_value(api_secret).await.as_deref(), Some("k1"));
    assert_eq!(h.secret_value(nested_secret).await.as_deref(), Some("t1"));

    let api_commit = h.latest_commit(api).await;
    assert_eq!(api_commit.message.as_deref(), Some("restore api"));
}

#[tokio::test]
async fn test_deep_rollback_removes_newer_folder() {
    let h = Harness::new().await;
    let root = h.create_root_folder().await;
    h.create_secret(root, "ROOT_KEY", "r1").await;
    let target = h.latest_commit(root).await;

    let newer = h.create_folder(root, "newer").await;
    h.create_secret(newer, "NEW_KEY", "n1").await;

    let outcome = h
        .pit
        .rollback
        .deep_rollback_folder(DeepRollbackRequest {
            target_commit_id: target.id,
            env_id: h.env_id,
            actor: h.actor(),
            project_id: h.project_id,
            message: None,
        })
        .await
        .expect("deep rollback");

    assert!(h.live_folder(newer).await.is_none());
    assert_eq!(outcome.folders.len(), 1);
    assert_eq!(outcome.folders[0].outcome.folder_changes, 1);
}

#[tokio::test]
async fn test_deep_rollback_validates_target() {
    let h = Harness::new().await;
    let root = h.create_root_folder().await;
    h.create_secret(root, "ROOT_KEY", "r1").await;
    let target = h.latest_commit(root).await;

    let err = h
        .pit
        .rollback
        .deep_rollback_folder(DeepRollbackRequest {
            target_commit_id: Uuid::new_v4(),
            env_id: h.env_id,
            actor: h.actor(),
            project_id: h.project_id,
            message: None,
        })
        .await
        .expect_err("missing commit");
    assert!(err.is_not_found());

    let err = h
        .pit
        .rollback
        .deep_rollback_folder(DeepRollbackRequest {
            target_commit_id: target.id,
            env_id: Uuid::new_v4(),
            actor: h.actor(),
            project_id: h.project_id,
            message: None,
        })
        .await
        .expect_err("wrong environment");
    assert_eq!(err.kind, ErrorKind::BadRequest);
}

#[tokio::test]
async fn test_deep_compare_previews_without_writing() {
    let h = Harness::new().await;
    let root = h.create_root_folder().await;
    let api = h.create_folder(root, "api").await;
    let api_secret = h.create_secret(api, "API_KEY", "k1").await;
    h.create_secret(root, "ROOT_KEY", "r1").await;
    let target = h.latest_commit(root).await;

    h.delete_secret(api_secret).await;
    let api_commits = h.commit_count(api).await;

    let diffs = h
        .pit
        .rollback
        .deep_compare_folder(target.id, h.env_id)
        .await
        .expect("deep compare");
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].folder_id, api);
    assert!(!diffs[0].recreated);
    assert_eq!(diffs[0].changes.len(), 1);
    assert_eq!(diffs[0].changes[0].change_type, DiffChangeType::Create);

    assert_eq!(h.commit_count(api).await, api_commits);
    assert!(h.live_secret(api_secret).await.is_none());
}

#[tokio::test]
async fn test_deep_compare_includes_recreated_folders() {
    let h = Harness::new().await;
    let root = h.create_root_folder().await;
    let api = h.create_folder(root, "api").await;
    h.create_secret(api, "API_KEY", "k1").await;
    h.create_secret(root, "ROOT_KEY", "r1").await;
    let target = h.latest_commit(root).await;

    h.delete_folder(api).await;

    let diffs = h
        .pit
        .rollback
        .deep_compare_folder(target.id, h.env_id)
        .await
        .expect("deep compare");
    assert_eq!(diffs.len(), 2);
    assert_eq!(diffs[0].folder_id, root);
    assert_eq!(diffs[1].folder_id, api);
    assert!(diffs[1].recreated);
    assert_eq!(diffs[1].folder_name, "api");
}

#[tokio::test]
async fn test_revert_commit() {
    let h = Harness::new().await;
    let root = h.create_root_folder().await;
    let secret = h.create_secret(root, "DB_URL", "postgres://a").await;
    let first = h.latest_commit(root).await;
    let update = h
        .update_secret(secret, "postgres://b")
        .await
        .expect("changed");

    let outcome = h
        .pit
        .rollback
        .revert_commit_changes(update.id, h.actor(), h.project_id, None)
        .await
        .expect("revert");
    assert_eq!(outcome.changes_reverted, 1);
    assert_eq!(h.secret_value(secret).await.as_deref(), Some("postgres://a"));

    let commit = outcome.commit.expect("revert commit");
    assert_eq!(
        commit.message,
        Some(format!("Reverted changes from commit {}", update.id))
    );

    let err = h
        .pit
        .rollback
        .revert_commit_changes(first.id, h.actor(), h.project_id, None)
        .await
        .expect_err("first commit");
    assert_eq!(err.kind, ErrorKind::BadRequest);
}

#[tokio::test]
async fn test_revert_skips_superseded_changes() {
    let h = Harness::new().await;
    let root = h.create_root_folder().await;
    h.create_secret(root, "A", "a").await;
    let b = h.create_secret(root, "B", "b").await;
    let added_b = h.latest_commit(root).await;
    h.delete_secret(b).await;
    let before = h.commit_count(root).await;

    let outcome = h
        .pit
        .rollback
        .revert_commit_changes(added_b.id, h.actor(), h.project_id, None)
        .await
        .expect("revert");
    assert_eq!(outcome.changes_reverted, 0);
    assert!(outcome.commit.is_none());
    assert_eq!(h.commit_count(root).await, before);
}

#[tokio::test]
async fn test_revert_missing_commit_is_not_found() {
    let h = Harness::new().await;
    let err = h
        .pit
        .rollback
        .revert_commit_changes(Uuid::new_v4(), h.actor(), h.project_id, None)
        .await
        .expect_err("missing commit");
    assert!(err.is_not_found());
}
