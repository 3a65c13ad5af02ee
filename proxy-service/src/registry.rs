//! Process-wide pool lookup.
//!
//! An explicit registry object owned by the application's startup sequence,
//! not ambient global state. Populated exclusively by pool construction,
//! read-only afterwards; entries live until process exit.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::pool::Pool;

/// Mapping from logical database name to its pool.
#[derive(Default)]
pub struct Registry {
    pools: RwLock<HashMap<String, Arc<Pool>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pool under its database name. Called from pool
    /// construction; there is no removal path.
    pub(crate) async fn insert(&self, pool: Arc<Pool>) {
        self.pools
            .write()
            .await
            .insert(pool.database_name().to_string(), pool);
    }

    /// Look up the pool for a logical database.
    pub async fn get(&self, database_name: &str) -> Option<Arc<Pool>> {
        self.pools.read().await.get(database_name).cloned()
    }

    /// Names of all registered logical databases.
    pub async fn names(&self) -> Vec<String> {
        self.pools.read().await.keys().cloned().collect()
    }
}
