//! Integration tests for reconstruction and diffing.

mod helpers;

use secrethub_core::config::PitConfig;
use secrethub_core::error::ErrorKind;
use secrethub_core::types::PageRequest;
use secrethub_entity::resource::ResourceKind;
use secrethub_service::DiffChangeType;
use uuid::Uuid;

use helpers::Harness;

#[tokio::test]
async fn test_add_add_delete_scenario() {
    let h = Harness::new().await;
    let root = h.create_root_folder().await;
    let app = h.create_folder(root, "app").await;

    let a = h.create_secret(app, "A", "a").await;
    let first = h.latest_commit(app).await;
    let b = h.create_secret(app, "B", "b").await;
    h.delete_secret(a).await;
    let third = h.latest_commit(app).await;
    assert_eq!(third.commit_id, 3);

    let state = h
        .pit
        .history
        .folder_state(app, Some(third.id))
        .await
        .expect("state")
        .state;
    assert_eq!(state.len(), 1);
    assert!(state.contains(ResourceKind::Secret, b));
    assert!(!state.contains(ResourceKind::Secret, a));

    let diff = h
        .pit
        .rollback
        .compare_folder_states(third.id, Some(first.id))
        .await
        .expect("compare");
    assert_eq!(diff.len(), 2);
    assert_eq!(diff[0].resource_id, a);
    assert_eq!(diff[0].change_type, DiffChangeType::Delete);
    assert_eq!(diff[1].resource_id, b);
    assert_eq!(diff[1].change_type, DiffChangeType::Create);
    assert_eq!(diff[1].commit_id, 2);
}

#[tokio::test]
async fn test_compare_without_current_reports_creates() {
    let h = Harness::new().await;
    let root = h.create_root_folder().await;
    h.create_folder(root, "api").await;
    h.create_secret(root, "DB_URL", "postgres://a").await;
    let latest = h.latest_commit(root).await;

    let diff = h
        .pit
        .rollback
        .compare_folder_states(latest.id, None)
        .await
        .expect("compare");
    assert_eq!(diff.len(), 2);
    assert!(diff.iter().all(|c| c.change_type == DiffChangeType::Create));

    let folder = diff.iter().find(|c| c.is_folder()).expect("folder entry");
    assert_eq!(folder.name, "api");
    assert_eq!(folder.version, 1);
}

#[tokio::test]
async fn test_compare_rejects_foreign_and_missing_commits() {
    let h = Harness::new().await;
    let root = h.create_root_folder().await;
    let app = h.create_folder(root, "app").await;
    h.create_secret(app, "A", "a").await;

    let root_commit = h.latest_commit(root).await;
    let app_commit = h.latest_commit(app).await;

    let err = h
        .pit
        .rollback
        .compare_folder_states(app_commit.id, Some(root_commit.id))
        .await
        .expect_err("different folders");
    assert_eq!(err.kind, ErrorKind::BadRequest);

    let err = h
        .pit
        .rollback
        .compare_folder_states(Uuid::new_v4(), None)
        .await
        .expect_err("missing commit");
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_update_back_to_same_content_is_not_a_difference() {
    let h = Harness::new().await;
    let root = h.create_root_folder().await;
    let secret = h.create_secret(root, "DB_URL", "postgres://a").await;
    let first = h.latest_commit(root).await;

    h.update_secret(secret, "postgres://b").await.expect("changed");
    let second = h.latest_commit(root).await;
    h.update_secret(secret, "postgres://a").await.expect("changed");
    let third = h.latest_commit(root).await;

    let diff = h
        .pit
        .rollback
        .compare_folder_states(first.id, Some(third.id))
        .await
        .expect("compare");
    assert!(diff.is_empty());

    let diff = h
        .pit
        .rollback
        .compare_folder_states(second.id, Some(third.id))
        .await
        .expect("compare");
    assert_eq!(diff.len(), 1);
    assert_eq!(diff[0].change_type, DiffChangeType::Update);
    assert_eq!(diff[0].version, 2);
    assert_eq!(diff[0].from_version, Some(3));
}

#[tokio::test]
async fn test_checkpoint_window_bounds_replay() {
    let h = Harness::with_config(PitConfig::with_windows(5, 100)).await;
    let root = h.create_root_folder().await;
    let app = h.create_folder(root, "app").await;

    for i in 0..5 {
        h.create_secret(app, &format!("KEY_{i}"), "v").await;
    }
    assert_eq!(h.pit.history.list_checkpoints(app).await.expect("list").len(), 0);

    h.create_secret(app, "KEY_5", "v").await;
    let checkpoints = h.pit.history.list_checkpoints(app).await.expect("list");
    assert_eq!(checkpoints.len(), 1);
    assert_eq!(checkpoints[0].commit_id, 6);

    h.create_secret(app, "KEY_6", "v").await;
    assert_eq!(h.pit.history.list_checkpoints(app).await.expect("list").len(), 1);

    let reconstruction = h.pit.history.folder_state(app, None).await.expect("state");
    assert_eq!(reconstruction.commit_id, 7);
    assert_eq!(reconstruction.replayed_commits, 1);
    assert_eq!(reconstruction.checkpoint_id, Some(checkpoints[0].checkpoint_id));
    assert_eq!(reconstruction.state.len(), 7);
}

#[tokio::test]
async fn test_reconstruction_ignores_checkpoint_placement() {
    let h = Harness::new().await;
    let root = h.create_root_folder().await;
    let app = h.create_folder(root, "app").await;

    let a = h.create_secret(app, "A", "a1").await;
    let b = h.create_secret(app, "B", "b1").await;
    h.update_secret(a, "a2").await.expect("changed");
    h.create_folder(app, "nested").await;
    h.delete_secret(b).await;
    h.create_secret(app, "C", "c1").await;
    h.update_secret(a, "a3").await.expect("changed");
    h.delete_secret(a).await;

    let mut commits = h
        .pit
        .history
        .list_commits(app, &PageRequest::new(1, 100))
        .await
        .expect("list")
        .items;
    commits.reverse();
    assert_eq!(commits.len(), 8);

    let mut without_checkpoints = Vec::new();
    for commit in &commits {
        let reconstruction = h
            .pit
            .history
            .folder_state(app, Some(commit.id))
            .await
            .expect("state");
        assert!(reconstruction.checkpoint_id.is_none());
        without_checkpoints.push(reconstruction.state.version_ids());
    }

    for anchor in [&commits[2], &commits[4], &commits[7]] {
        h.pit
            .checkpoints
            .create_folder_checkpoint(app, Some(anchor.id), true)
            .await
            .expect("checkpoint")
            .expect("forced");
    }

    for (commit, expected) in commits.iter().zip(&without_checkpoints) {
        let reconstruction = h
            .pit
            .history
            .folder_state(app, Some(commit.id))
            .await
            .expect("state");
        if commit.commit_id >= 3 {
            assert!(reconstruction.checkpoint_id.is_some());
        }
        assert_eq!(&reconstruction.state.version_ids(), expected);
    }
}

#[tokio::test]
async fn test_checkpoint_matches_log_after_ignored_update() {
    let mut outcomes = Vec::new();

    for checkpoint_window in [1000, 1] {
        let h = Harness::with_config(PitConfig::with_windows(checkpoint_window, 1000)).await;
        let root = h.create_root_folder().await;
        let a = h.create_secret(root, "A", "x").await;
        // The live row moves to version 2 but the log keeps version 1.
        assert!(h.update_secret(a, "x").await.is_none());
        h.create_secret(root, "B", "y").await;
        let latest = h.latest_commit(root).await;

        let reconstruction = h
            .pit
            .history
            .folder_state(root, Some(latest.id))
            .await
            .expect("state");
        let held = reconstruction
            .state
            .get(ResourceKind::Secret, a)
            .expect("A is held");

        let mut origins: Vec<(String, i64)> = h
            .pit
            .rollback
            .compare_folder_states(latest.id, None)
            .await
            .expect("compare")
            .into_iter()
            .map(|change| (change.name, change.commit_id))
            .collect();
        origins.sort();

        outcomes.push((
            reconstruction.checkpoint_id.is_some(),
            held.resource.version,
            held.commit_id,
            origins,
        ));
    }

    let (without, with) = (&outcomes[0], &outcomes[1]);
    assert!(!without.0);
    assert!(with.0);
    assert_eq!(without.1, 1);
    assert_eq!(with.1, without.1);
    assert_eq!(with.2, without.2);
    assert_eq!(without.3, vec![("A".to_string(), 1), ("B".to_string(), 2)]);
    assert_eq!(with.3, without.3);
}

#[tokio::test]
async fn test_folder_state_rejects_foreign_commit() {
    let h = Harness::new().await;
    let root = h.create_root_folder().await;
    let app = h.create_folder(root, "app").await;
    let root_commit = h.latest_commit(root).await;

    let err = h
        .pit
        .history
        .folder_state(app, Some(root_commit.id))
        .await
        .expect_err("foreign commit");
    assert_eq!(err.kind, ErrorKind::BadRequest);
}
