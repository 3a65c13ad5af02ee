//! Per-connection worker.
//!
//! Each worker is an independently scheduled task that exclusively owns one
//! physical database connection. It multiplexes request handling and a
//! periodic liveness probe on its single thread of control; requests are
//! processed strictly in arrival order. Nothing outside the task can reach
//! the connection handle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use db::{BindMap, Connection, ConnectionFactory, DbConfig, Row};
use error::{ProxyError, QueryError};

use crate::handle::WorkerHandle;
use crate::pool::{Pool, WorkerKind};

/// Liveness probe period.
pub const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_secs(30);

/// Request channel depth per worker.
const REQUEST_BUFFER: usize = 32;

/// One request to a worker, carrying its reply channel.
#[derive(Debug)]
pub(crate) enum WorkerRequest {
    Query {
        sql: String,
        bindings: BindMap,
        bind_params: BindMap,
        reply: oneshot::Sender<Result<Option<Vec<Row>>, ProxyError>>,
    },
    BeginTransaction {
        reply: oneshot::Sender<bool>,
    },
    Commit {
        reply: oneshot::Sender<bool>,
    },
    Rollback {
        reply: oneshot::Sender<bool>,
    },
    Reconnect {
        reply: oneshot::Sender<Result<(), ProxyError>>,
    },
}

/// A worker owning exactly one database connection.
pub struct ConnectionWorker {
    name: String,
    config: DbConfig,
    factory: Arc<dyn ConnectionFactory>,
    conn: Box<dyn Connection>,
    in_transaction: bool,
    liveness_interval: Duration,
}

impl ConnectionWorker {
    /// Spawn a worker task.
    ///
    /// The task connects, announces itself online to `pool`, then serves
    /// requests until its channel closes or a fatal connection error
    /// terminates it. A failed initial connect is fatal; supervision is the
    /// host runtime's concern.
    pub fn spawn(
        name: String,
        config: DbConfig,
        factory: Arc<dyn ConnectionFactory>,
        liveness_interval: Duration,
        pool: Arc<Pool>,
    ) {
        let (tx, rx) = mpsc::channel(REQUEST_BUFFER);
        let handle = WorkerHandle::new(tx);

        tokio::spawn(async move {
            let conn = match factory.connect(&config).await {
                Ok(conn) => conn,
                Err(err) => {
                    tracing::error!(
                        worker = %name,
                        error = %err,
                        "initial connect failed, terminating worker"
                    );
                    return;
                }
            };

            let worker = ConnectionWorker {
                name: name.clone(),
                config,
                factory,
                conn,
                in_transaction: false,
                liveness_interval,
            };

            pool.on_worker_online(WorkerKind::Connection, &name, handle).await;
            worker.run(rx).await;
        });
    }

    /// Serve requests and the liveness probe until shutdown.
    async fn run(mut self, mut requests: mpsc::Receiver<WorkerRequest>) {
        let mut probe = tokio::time::interval(self.liveness_interval);
        probe.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick fires after one full period, not immediately
        probe.reset();

        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => {
                        if !self.handle_request(request).await {
                            break;
                        }
                    }
                    None => {
                        tracing::info!(worker = %self.name, "request channel closed, shutting down");
                        break;
                    }
                },
                _ = probe.tick() => {
                    if let Err(err) = self.probe().await {
                        tracing::error!(
                            worker = %self.name,
                            error = %err,
                            "re-establishing connection failed, terminating worker"
                        );
                        break;
                    }
                }
            }
        }
    }

    /// Returns false when the worker must terminate.
    async fn handle_request(&mut self, request: WorkerRequest) -> bool {
        match request {
            WorkerRequest::Query {
                sql,
                bindings,
                bind_params,
                reply,
            } => {
                let result = self.execute(&sql, &bindings, &bind_params).await;
                let _ = reply.send(result);
                true
            }
            WorkerRequest::BeginTransaction { reply } => {
                let _ = reply.send(self.begin_transaction().await);
                true
            }
            WorkerRequest::Commit { reply } => {
                let _ = reply.send(self.commit().await);
                true
            }
            WorkerRequest::Rollback { reply } => {
                let _ = reply.send(self.rollback().await);
                true
            }
            WorkerRequest::Reconnect { reply } => match self.reconnect().await {
                Ok(()) => {
                    let _ = reply.send(Ok(()));
                    true
                }
                Err(err) => {
                    tracing::error!(
                        worker = %self.name,
                        error = %err,
                        "forced reconnect failed, terminating worker"
                    );
                    let _ = reply.send(Err(err));
                    false
                }
            },
        }
    }

    /// Execute one statement with bound values.
    ///
    /// `bindings` are bound by value, `bind_params` by reference; both are
    /// applied before execution, params last. On transient connection loss
    /// the worker reconnects and retries exactly once; a second failure
    /// propagates instead of recursing.
    async fn execute(
        &mut self,
        sql: &str,
        bindings: &BindMap,
        bind_params: &BindMap,
    ) -> Result<Option<Vec<Row>>, ProxyError> {
        let mut merged = bindings.clone();
        for (key, value) in bind_params {
            merged.insert(key.clone(), value.clone());
        }

        match self.conn.execute(sql, &merged).await {
            Ok(rows) => Ok(rows),
            Err(err) if err.is_connection_lost() => {
                tracing::warn!(
                    worker = %self.name,
                    error = %err,
                    "connection lost mid-query, reconnecting for one retry"
                );
                match self.factory.connect(&self.config).await {
                    Ok(fresh) => self.conn = fresh,
                    Err(reconnect_err) => {
                        return Err(QueryError::RetryFailed(format!(
                            "{err} (reconnect failed: {reconnect_err})"
                        ))
                        .into());
                    }
                }
                self.conn
                    .execute(sql, &merged)
                    .await
                    .map_err(|retry_err| QueryError::RetryFailed(retry_err.to_string()).into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Open a transaction. Returns false if one is already open or the
    /// driver refuses; state is left unchanged on failure.
    async fn begin_transaction(&mut self) -> bool {
        if self.in_transaction {
            return false;
        }
        match self.conn.begin().await {
            Ok(()) => {
                self.in_transaction = true;
                true
            }
            Err(err) => {
                tracing::warn!(worker = %self.name, error = %err, "begin transaction failed");
                false
            }
        }
    }

    /// Commit the open transaction. Returns false with no transaction open,
    /// and a failed commit does not silently close the transaction.
    async fn commit(&mut self) -> bool {
        if !self.in_transaction {
            return false;
        }
        match self.conn.commit().await {
            Ok(()) => {
                self.in_transaction = false;
                true
            }
            Err(err) => {
                tracing::warn!(worker = %self.name, error = %err, "commit failed");
                false
            }
        }
    }

    /// Roll back the open transaction, with the same contract as commit.
    async fn rollback(&mut self) -> bool {
        if !self.in_transaction {
            return false;
        }
        match self.conn.rollback().await {
            Ok(()) => {
                self.in_transaction = false;
                true
            }
            Err(err) => {
                tracing::warn!(worker = %self.name, error = %err, "rollback failed");
                false
            }
        }
    }

    /// Liveness probe: a trivial round trip, forcing re-establishment on
    /// failure. A re-establishment failure here is fatal to the worker.
    async fn probe(&mut self) -> Result<(), ProxyError> {
        if let Err(err) = self.conn.ping().await {
            tracing::warn!(
                worker = %self.name,
                error = %err,
                "liveness probe failed, re-establishing connection"
            );
            self.conn = self.factory.connect(&self.config).await?;
        }
        Ok(())
    }

    /// Replace the connection wholesale with a freshly established one.
    ///
    /// Used when the worker's execution unit is duplicated into a new
    /// process; connections are never valid across a process boundary.
    async fn reconnect(&mut self) -> Result<(), ProxyError> {
        self.conn = self.factory.connect(&self.config).await?;
        Ok(())
    }
}
