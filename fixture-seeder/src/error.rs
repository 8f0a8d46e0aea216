use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::node::Role;

pub type StoreResult<T> = Result<T, StoreError>;

/// A caller passed a parameter that can never produce a fixture.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[error("invalid argument `{name}`: {reason}")]
pub struct InvalidArgument {
    pub name: &'static str,
    pub reason: String,
}

impl InvalidArgument {
    pub fn new(name: &'static str, reason: impl Into<String>) -> Self {
        Self { name, reason: reason.into() }
    }
}

/// Failures while bringing a single node up. Each node fails on its own.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BootstrapError {
    #[error("data directory {path:?} is not writable: {reason}")]
    DirectoryUnwritable { path: PathBuf, reason: String },

    #[error("failed to launch node process: {reason}")]
    ProcessLaunchFailed { reason: String },

    #[error("node on port {port} did not accept connections within {waited:?}")]
    ReadinessTimeout { port: u16, waited: Duration },

    #[error("provisioning was cancelled")]
    Cancelled,
}

/// Failures talking to a running node's blob store.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreError {
    #[error("connection to {endpoint} refused: {reason}")]
    ConnectionRefused { endpoint: String, reason: String },

    #[error("write failed: {reason}")]
    WriteFailed { reason: String },

    #[error("connection lost: {reason}")]
    Disconnected { reason: String },

    #[error("no object with id {id}")]
    NotFound { id: String },

    #[error("read failed: {reason}")]
    ReadFailed { reason: String },

    /// The object was published but reading it back failed, so it may exist
    /// under `id`.
    #[error("object {id} was written but could not be verified: {reason}")]
    Unverified { id: String, reason: String },
}

impl StoreError {
    /// The connection itself is gone, so further calls on it cannot succeed.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, StoreError::Disconnected { .. })
    }

    /// Hex id of an object that may still be readable despite the error.
    pub fn object_id(&self) -> Option<&str> {
        match self {
            StoreError::Unverified { id, .. } => Some(id),
            _ => None,
        }
    }
}

/// Why a node's pipeline stopped before reaching `Done`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", content = "error", rename_all = "snake_case")]
pub enum FailureReason {
    Bootstrap(BootstrapError),
    Store(StoreError),
    Cancelled,
}

impl Display for FailureReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Bootstrap(e) => write!(f, "{}", e),
            FailureReason::Store(e) => write!(f, "{}", e),
            FailureReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A node-level failure, always carrying the role it happened on.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[error("{role} node: {reason}")]
pub struct NodeFailure {
    pub role: Role,
    pub reason: FailureReason,
}

impl NodeFailure {
    pub fn bootstrap(role: Role, err: BootstrapError) -> Self {
        Self { role, reason: FailureReason::Bootstrap(err) }
    }

    pub fn store(role: Role, err: StoreError) -> Self {
        Self { role, reason: FailureReason::Store(err) }
    }
}

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),

    #[error("no node could be provisioned: {}", join_failures(.0))]
    AllNodesUnavailable(Vec<NodeFailure>),
}

fn join_failures(failures: &[NodeFailure]) -> String {
    failures.iter().map(|f| f.to_string()).collect::<Vec<_>>().join("; ")
}
