//! Integration tests for the connection proxy.
//!
//! These drive the full path a caller takes: registry lookup, worker
//! selection, then query/transaction requests through the worker handle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use db::mock::{mock_row, MockFactory, MockOutcome};
use db::{BindMap, DbConfig, DbDriver, SqlValue, SqlxFactory};
use error::{ConnectError, ProxyError};
use proxy_service::{Pool, Registry, DEFAULT_LIVENESS_INTERVAL};

async fn pool_with_workers(
    registry: &Registry,
    factory: MockFactory,
    name: &str,
    workers: usize,
) -> Arc<Pool> {
    let pool = Pool::connect(
        registry,
        DbConfig::default(),
        name,
        Arc::new(factory),
        DEFAULT_LIVENESS_INTERVAL,
    )
    .await
    .unwrap();
    pool.spawn(workers);
    wait_for_workers(&pool, workers).await;
    pool
}

async fn wait_for_workers(pool: &Pool, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while pool.online_workers().await < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("workers did not come online");
}

#[tokio::test]
async fn test_selection_is_round_robin_fair() {
    let registry = Registry::new();
    let pool = pool_with_workers(&registry, MockFactory::new(), "main", 3).await;

    let mut selections: HashMap<String, usize> = HashMap::new();
    for _ in 0..6 {
        let name = pool.select_worker().await.unwrap();
        *selections.entry(name).or_default() += 1;
    }

    assert_eq!(selections.len(), 3);
    for (name, count) in &selections {
        assert_eq!(*count, 2, "worker {name} selected {count} times");
        assert!(name.starts_with("database-main-"));
    }
}

#[tokio::test]
async fn test_query_through_selected_worker() {
    let registry = Registry::new();
    let factory = MockFactory::new();
    factory.push_outcome(MockOutcome::Rows(vec![mock_row(&[("1", SqlValue::Int(1))])]));
    let pool = pool_with_workers(&registry, factory, "main", 1).await;

    // the path a caller takes: registry -> pool -> worker id -> handle
    let pool = registry.get("main").await.unwrap();
    let worker = pool.select_worker().await.unwrap();
    let handle = pool.handle(&worker).await.unwrap();

    let rows = handle
        .query("SELECT 1", BindMap::new(), BindMap::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("1"), Some(&SqlValue::Int(1)));
}

#[tokio::test]
async fn test_transient_loss_is_transparent_to_caller() {
    let registry = Registry::new();
    let factory = MockFactory::new();
    factory.push_outcome(MockOutcome::ConnectionLost);
    factory.push_outcome(MockOutcome::Rows(vec![mock_row(&[("1", SqlValue::Int(1))])]));
    let pool = pool_with_workers(&registry, factory.clone(), "main", 1).await;

    let worker = pool.select_worker().await.unwrap();
    let handle = pool.handle(&worker).await.unwrap();

    let rows = handle
        .query("SELECT 1", BindMap::new(), BindMap::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rows.len(), 1);

    // direct connection + worker connect + one reconnect
    assert_eq!(factory.connect_count(), 3);
}

#[tokio::test]
async fn test_misconfigured_pool_fails_before_io() {
    let registry = Registry::new();
    let config = DbConfig::new(DbDriver::Sqlite, "", "db", "", "");

    // the real factory rejects the config while building the URL
    let result = Pool::connect(
        &registry,
        config,
        "broken",
        Arc::new(SqlxFactory),
        DEFAULT_LIVENESS_INTERVAL,
    )
    .await;

    assert!(matches!(result.err(), Some(ProxyError::Config(_))));
    assert!(registry.get("broken").await.is_none());
}

#[tokio::test]
async fn test_transactions_stay_on_one_worker() {
    let registry = Registry::new();
    let factory = MockFactory::new();
    factory.push_outcome(MockOutcome::NoResult);
    let pool = pool_with_workers(&registry, factory, "main", 2).await;

    let worker = pool.select_worker().await.unwrap();
    let handle = pool.handle(&worker).await.unwrap();

    assert!(handle.begin_transaction().await.unwrap());
    // a second begin on the same worker soft-fails
    assert!(!handle.begin_transaction().await.unwrap());

    handle
        .query("UPDATE t SET x = 1", BindMap::new(), BindMap::new())
        .await
        .unwrap();

    assert!(handle.commit().await.unwrap());
    // nothing open anymore
    assert!(!handle.commit().await.unwrap());
    assert!(!handle.rollback().await.unwrap());
}

#[tokio::test]
async fn test_fork_reconnect_replaces_worker_connection() {
    let registry = Registry::new();
    let factory = MockFactory::new();
    let pool = pool_with_workers(&registry, factory.clone(), "main", 1).await;

    let worker = pool.select_worker().await.unwrap();
    let handle = pool.handle(&worker).await.unwrap();

    // direct + worker
    assert_eq!(factory.connect_count(), 2);
    handle.reconnect().await.unwrap();
    assert_eq!(factory.connect_count(), 3);
}

#[tokio::test]
async fn test_dead_worker_reports_worker_gone() {
    let registry = Registry::new();
    let factory = MockFactory::new();
    let pool = pool_with_workers(&registry, factory.clone(), "main", 1).await;

    let worker = pool.select_worker().await.unwrap();
    let handle = pool.handle(&worker).await.unwrap();

    // a failed forced reconnect is fatal to the worker
    factory.fail_next_connect("host unreachable");
    assert!(handle.reconnect().await.is_err());

    // wait for the task to wind down, then every call must fail fast
    tokio::time::sleep(Duration::from_millis(50)).await;
    let err = handle
        .query("SELECT 1", BindMap::new(), BindMap::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProxyError::Connect(ConnectError::WorkerGone)
    ));
}

#[tokio::test]
async fn test_failed_initial_connect_never_announces() {
    let registry = Registry::new();
    let factory = MockFactory::new();
    let pool = Pool::connect(
        &registry,
        DbConfig::default(),
        "main",
        Arc::new(factory.clone()),
        DEFAULT_LIVENESS_INTERVAL,
    )
    .await
    .unwrap();

    factory.fail_next_connect("host unreachable");
    pool.spawn(1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pool.online_workers().await, 0);
    assert_eq!(pool.select_worker().await, None);
}

#[tokio::test]
async fn test_two_pools_are_independent() {
    let registry = Registry::new();
    let main = pool_with_workers(&registry, MockFactory::new(), "main", 1).await;
    let reporting = pool_with_workers(&registry, MockFactory::new(), "reporting", 2).await;

    assert_eq!(main.select_worker().await.unwrap(), "database-main-1");
    assert!(reporting
        .select_worker()
        .await
        .unwrap()
        .starts_with("database-reporting-"));

    let mut names = registry.names().await;
    names.sort();
    assert_eq!(names, vec!["main".to_string(), "reporting".to_string()]);
}
