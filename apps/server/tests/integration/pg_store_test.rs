//! Integration tests for the Postgres group store
//!
//! Tests that constraint violations surface as recoverable errors and that
//! multi-statement operations are atomic.

use rustrak_merge::error::AppError;
use rustrak_merge::models::dependent::{GROUP_ASSIGNEE, GROUP_HASH, GROUP_TAG_VALUE};
use rustrak_merge::models::{DependentRecord, GroupCounter};
use rustrak_merge::store::{GroupStore, PgGroupStore};

use crate::common::fixtures::{
    count_for_group, insert_assignee, insert_group, insert_hash, insert_project, insert_tag_value,
};
use crate::common::{at, GroupBuilder, TestDb};

// =============================================================================
// Dependent Records
// =============================================================================

#[tokio::test]
async fn test_fetch_and_reassign_dependents() {
    let db = TestDb::new().await;
    let store = PgGroupStore::new(db.pool.clone());
    let project = insert_project(&db.pool, "store").await;
    let source = insert_group(&db.pool, GroupBuilder::new(0).project(project)).await;
    let destination = insert_group(&db.pool, GroupBuilder::new(0).project(project)).await;
    for hash in ["a", "b", "c"] {
        insert_hash(&db.pool, &source, hash).await;
    }

    let records = store.fetch_dependents(&GROUP_HASH, &source, 2).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.group_id == source.id));

    for record in &records {
        store
            .reassign_dependent(&GROUP_HASH, record, &source, &destination)
            .await
            .unwrap();
    }

    assert_eq!(count_for_group(&db.pool, "group_hashes", destination.id).await, 2);
    assert_eq!(count_for_group(&db.pool, "group_hashes", source.id).await, 1);
}

#[tokio::test]
async fn test_reassign_conflict_is_reported() {
    let db = TestDb::new().await;
    let store = PgGroupStore::new(db.pool.clone());
    let project = insert_project(&db.pool, "store").await;
    let source = insert_group(&db.pool, GroupBuilder::new(0).project(project)).await;
    let destination = insert_group(&db.pool, GroupBuilder::new(0).project(project)).await;
    insert_assignee(&db.pool, &destination, 1).await;
    let id = insert_assignee(&db.pool, &source, 2).await;
    let record = DependentRecord {
        id,
        group_id: source.id,
    };

    let result = store
        .reassign_dependent(&GROUP_ASSIGNEE, &record, &source, &destination)
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));

    // The failed move left the pool usable and the row in place
    assert_eq!(count_for_group(&db.pool, "group_assignees", source.id).await, 1);

    store
        .absorb_dependent(&GROUP_ASSIGNEE, &record, &destination)
        .await
        .unwrap();
    assert_eq!(count_for_group(&db.pool, "group_assignees", source.id).await, 0);
    assert_eq!(count_for_group(&db.pool, "group_assignees", destination.id).await, 1);
}

#[tokio::test]
async fn test_absorb_sums_counters() {
    let db = TestDb::new().await;
    let store = PgGroupStore::new(db.pool.clone());
    let project = insert_project(&db.pool, "store").await;
    let source = insert_group(&db.pool, GroupBuilder::new(0).project(project)).await;
    let destination = insert_group(&db.pool, GroupBuilder::new(0).project(project)).await;
    let kept = insert_tag_value(&db.pool, &destination, "browser", "firefox", 7).await;
    let other = insert_tag_value(&db.pool, &destination, "browser", "chrome", 1).await;
    let id = insert_tag_value(&db.pool, &source, "browser", "firefox", 5).await;

    store
        .absorb_dependent(
            &GROUP_TAG_VALUE,
            &DependentRecord {
                id,
                group_id: source.id,
            },
            &destination,
        )
        .await
        .unwrap();

    let counts: Vec<(i64, i64)> =
        sqlx::query_as("SELECT id, times_seen FROM group_tag_values ORDER BY id")
            .fetch_all(&db.pool)
            .await
            .unwrap();
    assert_eq!(counts, vec![(kept, 12), (other, 1)]);
}

// =============================================================================
// Groups
// =============================================================================

#[tokio::test]
async fn test_finalize_source_retires_source_into_destination() {
    let db = TestDb::new().await;
    let store = PgGroupStore::new(db.pool.clone());
    let project = insert_project(&db.pool, "store").await;
    let source = insert_group(
        &db.pool,
        GroupBuilder::new(0)
            .project(project)
            .times_seen(3)
            .num_comments(2)
            .seen(at(2024, 1, 1), at(2024, 1, 10)),
    )
    .await;
    let destination = insert_group(
        &db.pool,
        GroupBuilder::new(0)
            .project(project)
            .times_seen(10)
            .seen(at(2024, 1, 5), at(2024, 1, 20)),
    )
    .await;
    sqlx::query("INSERT INTO group_inbox (project_id, group_id, reason) VALUES ($1, $2, 'new')")
        .bind(project)
        .bind(source.id)
        .execute(&db.pool)
        .await
        .unwrap();

    let skipped = store.finalize_source(&source, &destination).await.unwrap();

    assert!(skipped.is_empty());
    assert!(store.get_group(source.id).await.unwrap().is_none());
    assert_eq!(
        store.get_redirect_target(source.id).await.unwrap(),
        Some(destination.id)
    );
    assert_eq!(count_for_group(&db.pool, "group_inbox", source.id).await, 0);

    let group = store.get_group(destination.id).await.unwrap().unwrap();
    assert_eq!(group.times_seen, 13);
    assert_eq!(group.num_comments, 2);
    assert_eq!(group.first_seen, at(2024, 1, 1));
    assert_eq!(group.last_seen, at(2024, 1, 20));
}

#[tokio::test]
async fn test_finalize_source_skips_overflowing_counter() {
    let db = TestDb::new().await;
    let store = PgGroupStore::new(db.pool.clone());
    let project = insert_project(&db.pool, "store").await;
    let source = insert_group(
        &db.pool,
        GroupBuilder::new(0).project(project).times_seen(5).num_comments(5),
    )
    .await;
    let destination = insert_group(
        &db.pool,
        GroupBuilder::new(0).project(project).times_seen(i32::MAX - 1),
    )
    .await;

    let skipped = store.finalize_source(&source, &destination).await.unwrap();

    assert_eq!(skipped, vec![GroupCounter::TimesSeen]);

    // The overflow only rolled back its own increment
    assert!(store.get_group(source.id).await.unwrap().is_none());
    let group = store.get_group(destination.id).await.unwrap().unwrap();
    assert_eq!(group.times_seen, i32::MAX - 1);
    assert_eq!(group.num_comments, 5);
}
