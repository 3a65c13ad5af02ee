//! Connection pool for one logical database.
//!
//! The pool owns a configuration template and the bookkeeping for a fixed
//! set of spawned workers: a usage counter per worker and the transport
//! handle callers route requests through. It never touches a worker's
//! connection; isolation replaces locking at the connection level.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use tokio::sync::{Mutex, MutexGuard};

use db::{Connection, ConnectionFactory, DbConfig};
use error::ProxyError;

use crate::handle::WorkerHandle;
use crate::registry::Registry;
use crate::worker::ConnectionWorker;

/// Kind of worker announcing itself online.
///
/// Announcements from worker kinds other than `Connection` are ignored by
/// the load-balance bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerKind {
    /// A worker owning one database connection
    Connection,
    /// Any other service worker sharing the announcement channel
    Auxiliary,
}

#[derive(Default)]
struct PoolState {
    /// Usage counter per worker, in announcement order. Counters only
    /// increase; selection picks the first minimum.
    usage: IndexMap<String, u64>,
    handles: HashMap<String, WorkerHandle>,
}

/// Pool of connection workers for one logical database.
pub struct Pool {
    database_name: String,
    config: DbConfig,
    factory: Arc<dyn ConnectionFactory>,
    liveness_interval: Duration,
    state: Mutex<PoolState>,
    /// Secondary non-pooled connection reserved for the ORM-integration
    /// collaborator; not used for proxied query routing.
    direct: Mutex<Box<dyn Connection>>,
}

impl Pool {
    /// Construct a pool, register it in `registry` under `database_name`,
    /// and open the secondary direct connection.
    pub async fn connect(
        registry: &Registry,
        config: DbConfig,
        database_name: impl Into<String>,
        factory: Arc<dyn ConnectionFactory>,
        liveness_interval: Duration,
    ) -> Result<Arc<Self>, ProxyError> {
        let database_name = database_name.into();
        let direct = factory.connect(&config).await?;

        let pool = Arc::new(Self {
            database_name,
            config,
            factory,
            liveness_interval,
            state: Mutex::new(PoolState::default()),
            direct: Mutex::new(direct),
        });

        registry.insert(Arc::clone(&pool)).await;
        tracing::info!(database = %pool.database_name, "pool registered");
        Ok(pool)
    }

    /// Logical database name this pool serves.
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// Spawn `count` connection workers from the stored config template.
    ///
    /// Workers self-announce online once their connection is established;
    /// the worker set is fixed for the process lifetime after this.
    pub fn spawn(self: &Arc<Self>, count: usize) {
        for i in 1..=count {
            let name = format!("database-{}-{}", self.database_name, i);
            ConnectionWorker::spawn(
                name,
                self.config.clone(),
                Arc::clone(&self.factory),
                self.liveness_interval,
                Arc::clone(self),
            );
        }
    }

    /// Record a worker as online with a zeroed usage counter.
    pub async fn on_worker_online(&self, kind: WorkerKind, name: &str, handle: WorkerHandle) {
        if kind != WorkerKind::Connection {
            tracing::debug!(worker = name, "ignoring non-connection worker announcement");
            return;
        }
        let mut state = self.state.lock().await;
        state.usage.entry(name.to_string()).or_insert(0);
        state.handles.insert(name.to_string(), handle);
        tracing::info!(worker = name, database = %self.database_name, "connection worker online");
    }

    /// Select the least-used worker and charge one use to it.
    ///
    /// Ties break on announcement order, first minimum wins. Callers must
    /// keep routing to the returned identifier for every call belonging to
    /// one transaction. Returns `None` while no worker is online.
    pub async fn select_worker(&self) -> Option<String> {
        let mut state = self.state.lock().await;

        let mut selected: Option<(&str, u64)> = None;
        for (name, &count) in &state.usage {
            match selected {
                Some((_, best)) if best <= count => {}
                _ => selected = Some((name.as_str(), count)),
            }
        }
        let name = selected.map(|(name, _)| name.to_string())?;

        if let Some(count) = state.usage.get_mut(&name) {
            *count += 1;
        }
        Some(name)
    }

    /// Transport handle for a worker identifier returned by selection.
    pub async fn handle(&self, name: &str) -> Option<WorkerHandle> {
        self.state.lock().await.handles.get(name).cloned()
    }

    /// Number of workers currently online.
    pub async fn online_workers(&self) -> usize {
        self.state.lock().await.usage.len()
    }

    /// Snapshot of the usage counters, in announcement order.
    pub async fn usage(&self) -> IndexMap<String, u64> {
        self.state.lock().await.usage.clone()
    }

    /// Exclusive access to the secondary direct connection.
    pub async fn direct(&self) -> MutexGuard<'_, Box<dyn Connection>> {
        self.direct.lock().await
    }

    /// Recovery hook for a pool process duplicated from a forked state:
    /// reconnects only the direct connection, never a worker's.
    pub async fn recover_after_fork(&self) -> Result<(), ProxyError> {
        let fresh = self.factory.connect(&self.config).await?;
        *self.direct.lock().await = fresh;
        tracing::info!(database = %self.database_name, "direct connection re-established after fork");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::mock::MockFactory;
    use tokio::sync::mpsc;

    fn dummy_handle() -> WorkerHandle {
        let (tx, _rx) = mpsc::channel(1);
        WorkerHandle::new(tx)
    }

    async fn test_pool() -> Arc<Pool> {
        let registry = Registry::new();
        Pool::connect(
            &registry,
            DbConfig::default(),
            "main",
            Arc::new(MockFactory::new()),
            Duration::from_secs(30),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_select_without_workers() {
        let pool = test_pool().await;
        assert_eq!(pool.select_worker().await, None);
    }

    #[tokio::test]
    async fn test_announcement_order_breaks_ties() {
        let pool = test_pool().await;
        for name in ["database-main-1", "database-main-2", "database-main-3"] {
            pool.on_worker_online(WorkerKind::Connection, name, dummy_handle())
                .await;
        }

        // all counters equal, first announced wins
        assert_eq!(pool.select_worker().await.unwrap(), "database-main-1");
        assert_eq!(pool.select_worker().await.unwrap(), "database-main-2");
        assert_eq!(pool.select_worker().await.unwrap(), "database-main-3");
        assert_eq!(pool.select_worker().await.unwrap(), "database-main-1");
    }

    #[tokio::test]
    async fn test_counters_stay_balanced() {
        let pool = test_pool().await;
        for name in ["a", "b", "c"] {
            pool.on_worker_online(WorkerKind::Connection, name, dummy_handle())
                .await;
        }

        for _ in 0..31 {
            pool.select_worker().await.unwrap();
        }

        let usage = pool.usage().await;
        let max = usage.values().max().copied().unwrap();
        let min = usage.values().min().copied().unwrap();
        assert!(max - min <= 1);
        assert_eq!(usage.values().sum::<u64>(), 31);
    }

    #[tokio::test]
    async fn test_non_connection_announcements_ignored() {
        let pool = test_pool().await;
        pool.on_worker_online(WorkerKind::Auxiliary, "metrics-1", dummy_handle())
            .await;
        assert_eq!(pool.online_workers().await, 0);
        assert_eq!(pool.select_worker().await, None);
    }

    #[tokio::test]
    async fn test_duplicate_announcement_keeps_counter() {
        let pool = test_pool().await;
        pool.on_worker_online(WorkerKind::Connection, "a", dummy_handle())
            .await;
        pool.select_worker().await.unwrap();

        // re-announcement (e.g. after forced reconnect) must not reset usage
        pool.on_worker_online(WorkerKind::Connection, "a", dummy_handle())
            .await;
        assert_eq!(pool.usage().await.get("a"), Some(&1));
    }

    #[tokio::test]
    async fn test_recover_after_fork_reconnects_direct_only() {
        let registry = Registry::new();
        let factory = MockFactory::new();
        let pool = Pool::connect(
            &registry,
            DbConfig::default(),
            "main",
            Arc::new(factory.clone()),
            Duration::from_secs(30),
        )
        .await
        .unwrap();
        pool.on_worker_online(WorkerKind::Connection, "a", dummy_handle())
            .await;
        pool.select_worker().await.unwrap();
        assert_eq!(factory.connect_count(), 1);

        pool.recover_after_fork().await.unwrap();
        assert_eq!(factory.connect_count(), 2);
        // worker bookkeeping untouched
        assert_eq!(pool.usage().await.get("a"), Some(&1));
    }
}
