//! Integration tests for the Postgres merge backends
//!
//! Tests time-series, similarity, event stream and forecast storage.

use chrono::{Duration, DurationRound, Utc};
use rustrak_merge::backends::{
    EventStream, ForecastEngine, HourlyCountCache, PgEventStream, PgForecastEngine,
    PgSimilarityIndex, PgTsdb, SimilarityIndex, Tsdb,
};
use rustrak_merge::error::AppError;
use rustrak_merge::models::TsdbModel;
use sqlx::PgPool;

use crate::common::fixtures::{insert_group, insert_project};
use crate::common::{GroupBuilder, TestDb};

async fn counts(pool: &PgPool, key: i64) -> Vec<(i64, i64)> {
    sqlx::query_as(
        "SELECT environment_id, SUM(value)::BIGINT FROM tsdb_counts WHERE key = $1 GROUP BY environment_id ORDER BY environment_id",
    )
    .bind(key)
    .fetch_all(pool)
    .await
    .unwrap()
}

// =============================================================================
// Time-series
// =============================================================================

#[tokio::test]
async fn test_tsdb_merge_sums_into_destination() {
    let db = TestDb::new().await;
    let tsdb = PgTsdb::new(db.pool.clone());
    let now = Utc::now();

    tsdb.incr(TsdbModel::Group, 1, None, now, 4).await.unwrap();
    tsdb.incr(TsdbModel::Group, 1, Some(7), now, 2).await.unwrap();
    tsdb.incr(TsdbModel::Group, 2, None, now, 5).await.unwrap();
    tsdb.incr(TsdbModel::Group, 3, None, now, 1).await.unwrap();

    tsdb.merge(TsdbModel::Group, 3, &[1, 2], Some(&[7]))
        .await
        .unwrap();

    assert_eq!(counts(&db.pool, 3).await, vec![(0, 10), (7, 2)]);
    assert!(counts(&db.pool, 1).await.is_empty());
    assert!(counts(&db.pool, 2).await.is_empty());
}

#[tokio::test]
async fn test_tsdb_merge_without_environments_leaves_environment_series() {
    let db = TestDb::new().await;
    let tsdb = PgTsdb::new(db.pool.clone());
    let now = Utc::now();

    tsdb.incr(TsdbModel::Group, 1, None, now, 4).await.unwrap();
    tsdb.incr(TsdbModel::Group, 1, Some(7), now, 2).await.unwrap();

    tsdb.merge(TsdbModel::Group, 3, &[1], None).await.unwrap();

    assert_eq!(counts(&db.pool, 3).await, vec![(0, 4)]);
    assert_eq!(counts(&db.pool, 1).await, vec![(7, 2)]);
}

#[tokio::test]
async fn test_distinct_counts_union_members() {
    let db = TestDb::new().await;
    let tsdb = PgTsdb::new(db.pool.clone());
    let bucket = Utc::now().duration_trunc(Duration::hours(1)).unwrap();

    for (key, member) in [(1, "alice"), (1, "bob"), (2, "bob"), (2, "carol")] {
        sqlx::query(
            "INSERT INTO tsdb_distinct_counts (model, key, bucket, member) VALUES ($1, $2, $3, $4)",
        )
        .bind(TsdbModel::UsersAffectedByGroup.as_str())
        .bind(key)
        .bind(bucket)
        .bind(member)
        .execute(&db.pool)
        .await
        .unwrap();
    }

    tsdb.merge_distinct_counts(TsdbModel::UsersAffectedByGroup, 2, &[1], None)
        .await
        .unwrap();

    let members: Vec<String> =
        sqlx::query_scalar("SELECT member FROM tsdb_distinct_counts WHERE key = 2 ORDER BY member")
            .fetch_all(&db.pool)
            .await
            .unwrap();
    assert_eq!(members, vec!["alice", "bob", "carol"]);
}

#[tokio::test]
async fn test_frequencies_add_scores() {
    let db = TestDb::new().await;
    let tsdb = PgTsdb::new(db.pool.clone());
    let bucket = Utc::now().duration_trunc(Duration::hours(1)).unwrap();

    for (key, member, score) in [(1, "1.0", 2.0), (2, "1.0", 3.0), (1, "2.0", 1.0)] {
        sqlx::query(
            "INSERT INTO tsdb_frequencies (model, key, bucket, member, score) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(TsdbModel::FrequentReleasesByGroup.as_str())
        .bind(key)
        .bind(bucket)
        .bind(member)
        .bind(score)
        .execute(&db.pool)
        .await
        .unwrap();
    }

    tsdb.merge_frequencies(TsdbModel::FrequentReleasesByGroup, 2, &[1], None)
        .await
        .unwrap();

    let scores: Vec<(String, f64)> = sqlx::query_as(
        "SELECT member, score FROM tsdb_frequencies WHERE key = 2 ORDER BY member",
    )
    .fetch_all(&db.pool)
    .await
    .unwrap();
    assert_eq!(scores, vec![("1.0".to_string(), 5.0), ("2.0".to_string(), 1.0)]);
}

// =============================================================================
// Similarity
// =============================================================================

async fn add_feature(pool: &PgPool, project_id: i64, group_id: i64, value: &str) {
    sqlx::query(
        "INSERT INTO similarity_features (project_id, group_id, label, value) VALUES ($1, $2, 'frame', $3)",
    )
    .bind(project_id)
    .bind(group_id)
    .bind(value)
    .execute(pool)
    .await
    .unwrap();
}

#[tokio::test]
async fn test_similarity_refuses_live_sources_unless_unsafe() {
    let db = TestDb::new().await;
    let index = PgSimilarityIndex::new(db.pool.clone());
    let project = insert_project(&db.pool, "similar").await;
    let source = insert_group(&db.pool, GroupBuilder::new(0).project(project)).await;
    let destination = insert_group(&db.pool, GroupBuilder::new(0).project(project)).await;
    add_feature(&db.pool, project, source.id, "main.rs:10").await;
    add_feature(&db.pool, project, source.id, "lib.rs:3").await;
    add_feature(&db.pool, project, destination.id, "main.rs:10").await;

    let refused = index
        .merge(project, destination.id, &[source.id], false)
        .await;
    assert!(matches!(refused, Err(AppError::Validation(_))));

    index
        .merge(project, destination.id, &[source.id], true)
        .await
        .unwrap();

    let values: Vec<(i64, String)> = sqlx::query_as(
        "SELECT group_id, value FROM similarity_features WHERE project_id = $1 ORDER BY value",
    )
    .bind(project)
    .fetch_all(&db.pool)
    .await
    .unwrap();
    assert_eq!(
        values,
        vec![
            (destination.id, "lib.rs:3".to_string()),
            (destination.id, "main.rs:10".to_string()),
        ]
    );
}

// =============================================================================
// Event Stream
// =============================================================================

#[tokio::test]
async fn test_eventstream_round_trips_state() {
    let db = TestDb::new().await;
    let stream = PgEventStream::new(db.pool.clone());

    let state = stream.start_merge(1, &[5, 7], 10).await.unwrap();
    stream.end_merge(&state).await.unwrap();

    let messages: Vec<(String, serde_json::Value)> =
        sqlx::query_as("SELECT kind, payload FROM eventstream_messages ORDER BY id")
            .fetch_all(&db.pool)
            .await
            .unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].0, "start_merge");
    assert_eq!(messages[1].0, "end_merge");
    assert_eq!(messages[0].1, messages[1].1);
    assert_eq!(messages[0].1["new_group_id"], 10);
    assert_eq!(messages[0].1["previous_group_ids"], serde_json::json!([5, 7]));
}

// =============================================================================
// Forecasts
// =============================================================================

#[tokio::test]
async fn test_forecast_generate_cache_and_delete() {
    let db = TestDb::new().await;
    let engine = PgForecastEngine::new(db.pool.clone());
    let tsdb = PgTsdb::new(db.pool.clone());
    let project = insert_project(&db.pool, "forecast").await;
    let group = insert_group(&db.pool, GroupBuilder::new(0).project(project)).await;

    tsdb.incr(TsdbModel::Group, group.id, None, Utc::now() - Duration::hours(3), 1400)
        .await
        .unwrap();

    engine
        .generate_and_save_forecasts(std::slice::from_ref(&group))
        .await
        .unwrap();
    assert_eq!(engine.get(group.id).await.unwrap(), Some(vec![300; 14]));

    // Cached counts win until invalidated
    tsdb.incr(TsdbModel::Group, group.id, None, Utc::now() - Duration::hours(3), 1400)
        .await
        .unwrap();
    engine
        .generate_and_save_forecasts(std::slice::from_ref(&group))
        .await
        .unwrap();
    assert_eq!(engine.get(group.id).await.unwrap(), Some(vec![300; 14]));

    engine.invalidate(&group).await.unwrap();
    engine
        .generate_and_save_forecasts(std::slice::from_ref(&group))
        .await
        .unwrap();
    assert_eq!(engine.get(group.id).await.unwrap(), Some(vec![600; 14]));

    engine.delete(project, group.id).await.unwrap();
    assert_eq!(engine.get(group.id).await.unwrap(), None);
}
