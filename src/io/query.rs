//! Post-commit query endpoint.
//!
//! After every file is committed a job can run one statement (typically a
//! partition repair or table refresh) against an external SQL endpoint. The driver
//! for that endpoint lives behind [`QueryConnector`]. This crate ships only the
//! in-memory [`FakeQueryConnector`].

use crate::error::{ErrorKind, Result, WriterError};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Opens sessions against a query endpoint.
pub trait QueryConnector: Send + Sync {
    /// # Errors
    /// Returns [`ErrorKind::ConnectDb`] when the endpoint cannot be reached. Only
    /// that kind is retried by the committer.
    fn connect(&self, url: &str, user: &str, password: &str) -> Result<Box<dyn QuerySession>>;
}

/// A live session. Closed exactly once by its owner.
pub trait QuerySession: Send {
    /// # Errors
    /// Returns [`ErrorKind::Sql`] when the statement fails.
    fn execute(&mut self, statement: &str) -> Result<()>;

    /// # Errors
    /// Returns an error if the endpoint reports a failure on close.
    fn close(self: Box<Self>) -> Result<()>;
}

#[derive(Debug, Default)]
struct FakeQueryState {
    refuse_next: u32,
    reject_credentials: bool,
    fail_statements: bool,
    connect_attempts: usize,
    opened: usize,
    closed: usize,
    executed: Vec<String>,
}

/// In-memory query endpoint with scripted failures.
#[derive(Debug, Clone, Default)]
pub struct FakeQueryConnector {
    state: Arc<Mutex<FakeQueryState>>,
}

impl FakeQueryConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeQueryState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Refuse the next `n` connection attempts with a transient error.
    pub fn refuse_next_connections(&self, n: u32) {
        self.state().refuse_next = n;
    }

    /// Fail every connection attempt with a non-transient authentication error.
    pub fn reject_credentials(&self) {
        self.state().reject_credentials = true;
    }

    /// Make every executed statement fail.
    pub fn fail_statements(&self) {
        self.state().fail_statements = true;
    }

    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        self.state().connect_attempts
    }

    #[must_use]
    pub fn opened(&self) -> usize {
        self.state().opened
    }

    #[must_use]
    pub fn closed(&self) -> usize {
        self.state().closed
    }

    /// Statements that ran successfully, in order.
    #[must_use]
    pub fn executed(&self) -> Vec<String> {
        self.state().executed.clone()
    }
}

impl QueryConnector for FakeQueryConnector {
    fn connect(&self, url: &str, user: &str, _password: &str) -> Result<Box<dyn QuerySession>> {
        let mut state = self.state();
        state.connect_attempts += 1;
        if state.reject_credentials {
            return Err(WriterError::illegal(format!(
                "user [{user}] was rejected by {url}"
            )));
        }
        if state.refuse_next > 0 {
            state.refuse_next -= 1;
            return Err(WriterError::new(
                ErrorKind::ConnectDb,
                format!("connection to {url} refused"),
            ));
        }
        state.opened += 1;
        debug!(url, user, "fake query session opened");
        Ok(Box::new(FakeQuerySession {
            connector: self.clone(),
        }))
    }
}

struct FakeQuerySession {
    connector: FakeQueryConnector,
}

impl QuerySession for FakeQuerySession {
    fn execute(&mut self, statement: &str) -> Result<()> {
        let mut state = self.connector.state();
        if state.fail_statements {
            return Err(WriterError::new(
                ErrorKind::Sql,
                format!("statement failed: {statement}"),
            ));
        }
        state.executed.push(statement.to_string());
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.connector.state().closed += 1;
        Ok(())
    }
}
