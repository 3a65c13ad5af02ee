//! In-process transport handle for a worker.
//!
//! Callers hold the identifier returned by pool selection and route all
//! requests for one logical session through the matching handle. A wire
//! transport plugs in on top of these calls; the handle itself is the
//! request/reply channel into the worker task.

use tokio::sync::{mpsc, oneshot};

use db::{BindMap, Row};
use error::{ConnectError, ProxyError};

use crate::worker::WorkerRequest;

/// Cheap, cloneable sender for one worker's request channel.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<WorkerRequest>,
}

impl WorkerHandle {
    pub(crate) fn new(tx: mpsc::Sender<WorkerRequest>) -> Self {
        Self { tx }
    }

    /// Execute a query on the worker.
    ///
    /// Returns the result rows, or `None` if the statement produced no
    /// result. A terminated worker surfaces as `WorkerGone`, never a hang.
    pub async fn query(
        &self,
        sql: impl Into<String>,
        bindings: BindMap,
        bind_params: BindMap,
    ) -> Result<Option<Vec<Row>>, ProxyError> {
        let (reply, response) = oneshot::channel();
        self.send(WorkerRequest::Query {
            sql: sql.into(),
            bindings,
            bind_params,
            reply,
        })
        .await?;
        response.await.map_err(|_| ConnectError::WorkerGone)?
    }

    /// Begin a transaction. False if one is already open.
    pub async fn begin_transaction(&self) -> Result<bool, ProxyError> {
        let (reply, response) = oneshot::channel();
        self.send(WorkerRequest::BeginTransaction { reply }).await?;
        response.await.map_err(|_| ConnectError::WorkerGone.into())
    }

    /// Commit the open transaction. False if none is open or the commit
    /// failed.
    pub async fn commit(&self) -> Result<bool, ProxyError> {
        let (reply, response) = oneshot::channel();
        self.send(WorkerRequest::Commit { reply }).await?;
        response.await.map_err(|_| ConnectError::WorkerGone.into())
    }

    /// Roll back the open transaction. Same contract as commit.
    pub async fn rollback(&self) -> Result<bool, ProxyError> {
        let (reply, response) = oneshot::channel();
        self.send(WorkerRequest::Rollback { reply }).await?;
        response.await.map_err(|_| ConnectError::WorkerGone.into())
    }

    /// Force the worker to establish a fresh connection, discarding the old
    /// handle wholesale. Used after the hosting process is duplicated.
    pub async fn reconnect(&self) -> Result<(), ProxyError> {
        let (reply, response) = oneshot::channel();
        self.send(WorkerRequest::Reconnect { reply }).await?;
        response.await.map_err(|_| ConnectError::WorkerGone)?
    }

    async fn send(&self, request: WorkerRequest) -> Result<(), ProxyError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| ConnectError::WorkerGone.into())
    }
}
