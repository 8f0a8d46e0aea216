use fixture_seeder::{FixtureError, InvalidArgument, NodeFailure};
use serde_json::error::Error as SerdeError;
use thiserror::Error;


#[derive(Debug, Error)]
pub enum CliErr {
    #[error(transparent)]
    Fixture(#[from] FixtureError),

    #[error(transparent)]
    InvalidArgument(#[from] InvalidArgument),

    #[error("{} node(s) failed to start: {}", .0.len(), describe(.0))]
    Bootstrap(Vec<NodeFailure>),

    #[error("seeding failed on every node")]
    TotalFailure,

    #[error("audit found problems on {0} node(s)")]
    AuditFailed(usize),

    #[error("Failed to write JSON report")]
    Json(#[from] SerdeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe(failures: &[NodeFailure]) -> String {
    failures.iter().map(|f| f.to_string()).collect::<Vec<_>>().join("; ")
}
