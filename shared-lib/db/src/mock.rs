//! Scripted mock connections for testing and development.
//!
//! A `MockFactory` hands out connections that pop pre-scripted outcomes,
//! so worker recovery behavior can be driven without a live database. The
//! script is shared across every connection the factory produces, which
//! matches how a reconnect mid-script should behave.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use error::{ConnectError, ProxyError, QueryError};

use crate::bind::{BindMap, Row, SqlValue};
use crate::config::DbConfig;
use crate::connection::{Connection, ConnectionFactory};

/// Scripted outcome for a single `execute` call.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Return these rows
    Rows(Vec<Row>),
    /// Statement produced no result
    NoResult,
    /// Transient connection loss
    ConnectionLost,
    /// Any other database failure
    Fail(String),
}

#[derive(Debug, Default)]
struct MockState {
    execute_script: Mutex<VecDeque<MockOutcome>>,
    connect_failures: Mutex<VecDeque<String>>,
    ping_failures: Mutex<VecDeque<String>>,
    fail_next_commit: AtomicBool,
    connects: AtomicUsize,
    executes: AtomicUsize,
}

/// Factory producing scripted mock connections.
#[derive(Debug, Clone, Default)]
pub struct MockFactory {
    state: Arc<MockState>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next unscripted `execute` call.
    pub fn push_outcome(&self, outcome: MockOutcome) {
        self.state.execute_script.lock().unwrap().push_back(outcome);
    }

    /// Make the next `connect` call fail with `message`.
    pub fn fail_next_connect(&self, message: impl Into<String>) {
        self.state
            .connect_failures
            .lock()
            .unwrap()
            .push_back(message.into());
    }

    /// Make the next `ping` call fail with `message`.
    pub fn fail_next_ping(&self, message: impl Into<String>) {
        self.state
            .ping_failures
            .lock()
            .unwrap()
            .push_back(message.into());
    }

    /// Make the next `commit` call fail.
    pub fn fail_next_commit(&self) {
        self.state.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Number of `connect` attempts made against this factory.
    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Number of `execute` calls across all connections.
    pub fn execute_count(&self) -> usize {
        self.state.executes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn connect(&self, _config: &DbConfig) -> Result<Box<dyn Connection>, ProxyError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.state.connect_failures.lock().unwrap().pop_front() {
            return Err(ConnectError::Failed(message).into());
        }
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

/// A connection that replays the factory's script.
#[derive(Debug)]
pub struct MockConnection {
    state: Arc<MockState>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn execute(
        &mut self,
        _sql: &str,
        _bindings: &BindMap,
    ) -> Result<Option<Vec<Row>>, QueryError> {
        self.state.executes.fetch_add(1, Ordering::SeqCst);
        let outcome = self.state.execute_script.lock().unwrap().pop_front();
        match outcome {
            Some(MockOutcome::Rows(rows)) => Ok(Some(rows)),
            Some(MockOutcome::NoResult) | None => Ok(None),
            Some(MockOutcome::ConnectionLost) => {
                Err(QueryError::ConnectionLost("server has gone away".into()))
            }
            Some(MockOutcome::Fail(message)) => Err(QueryError::Failed(message)),
        }
    }

    async fn begin(&mut self) -> Result<(), QueryError> {
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), QueryError> {
        if self.state.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(QueryError::Failed("commit failed".into()));
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), QueryError> {
        Ok(())
    }

    async fn ping(&mut self) -> Result<(), QueryError> {
        if let Some(message) = self.state.ping_failures.lock().unwrap().pop_front() {
            return Err(QueryError::ConnectionLost(message));
        }
        Ok(())
    }
}

/// Build a row from column/value pairs, for tests.
pub fn mock_row(columns: &[(&str, SqlValue)]) -> Row {
    columns
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}
