use std::path::PathBuf;

use futures::future::join_all;
use sample_archive::{LocalSampleArchive, SampleArchive};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::content::{self, ContentGenerator, SampleFile, DEFAULT_PAYLOAD_SIZE};
use crate::error::{FailureReason, InvalidArgument, NodeFailure, StoreError};
use crate::node::{NodeEndpoint, Role};
use crate::store::blob_store::hex_object_id;
use crate::store::{BlobConnection, Connector, ObjectId, ObjectTags, StoredObject};

/// A node the orchestrator was asked to seed.
#[derive(Debug, Clone)]
pub enum SeedTarget {
    Ready(NodeEndpoint),
    /// The node never came up; it is reported but not seeded.
    Unavailable(NodeFailure),
}

impl SeedTarget {
    pub fn role(&self) -> Role {
        match self {
            SeedTarget::Ready(endpoint) => endpoint.role,
            SeedTarget::Unavailable(failure) => failure.role,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum EntryOutcome {
    Stored(StoredObject),
    Failed(StoreError),
    /// The run was cancelled while this put was in flight; the object may or
    /// may not exist on the node.
    Cancelled,
}

/// One attempted insertion.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SeedEntry {
    pub role: Role,
    pub filename: String,
    /// Set whenever the object may be readable on the node, including a put
    /// that failed only after publishing.
    #[serde(with = "hex_object_id::option")]
    pub object_id: Option<ObjectId>,
    pub outcome: EntryOutcome,
}

impl SeedEntry {
    fn stored(role: Role, object: StoredObject) -> Self {
        Self {
            role,
            filename: object.filename.clone(),
            object_id: Some(object.object_id),
            outcome: EntryOutcome::Stored(object),
        }
    }

    fn failed(role: Role, filename: &str, err: StoreError) -> Self {
        Self {
            role,
            filename: filename.to_string(),
            object_id: err.object_id().and_then(|id| ObjectId::parse_str(id).ok()),
            outcome: EntryOutcome::Failed(err),
        }
    }

    fn cancelled(role: Role, filename: &str) -> Self {
        Self {
            role,
            filename: filename.to_string(),
            object_id: None,
            outcome: EntryOutcome::Cancelled,
        }
    }

    pub fn stored_object(&self) -> Option<&StoredObject> {
        match &self.outcome {
            EntryOutcome::Stored(object) => Some(object),
            EntryOutcome::Failed(_) | EntryOutcome::Cancelled => None,
        }
    }

    pub fn is_stored(&self) -> bool {
        self.stored_object().is_some()
    }
}

/// Per-node pipeline state. `Done` and `Failed` are terminal.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NodeState {
    NotConnected,
    Connected,
    Inserting { index: usize, total: usize },
    Done { stored: usize, failed: usize },
    Failed { reason: FailureReason },
}

impl NodeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeState::Done { .. } | NodeState::Failed { .. })
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct NodeOutcome {
    pub role: Role,
    pub state: NodeState,
}

/// Everything a seeding run attempted, per node and per object.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedingReport {
    pub entries: Vec<SeedEntry>,
    pub nodes: Vec<NodeOutcome>,
}

impl SeedingReport {
    pub fn entries_for(&self, role: Role) -> impl Iterator<Item = &SeedEntry> {
        self.entries.iter().filter(move |e| e.role == role)
    }

    pub fn stored(&self) -> impl Iterator<Item = &StoredObject> {
        self.entries.iter().filter_map(SeedEntry::stored_object)
    }

    pub fn node(&self, role: Role) -> Option<&NodeOutcome> {
        self.nodes.iter().find(|n| n.role == role)
    }

    /// No node finished seeding.
    pub fn is_total_failure(&self) -> bool {
        !self.nodes.iter().any(|n| matches!(n.state, NodeState::Done { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.entries.iter().any(|e| !e.is_stored())
            || self.nodes.iter().any(|n| matches!(n.state, NodeState::Failed { .. }))
    }
}

/// Generates sample files and writes them to every ready node, tagging each
/// object with the role of the node it was written to.
pub struct Seeder<C> {
    connector: C,
    generator: ContentGenerator,
    payload_size: usize,
    archive_dir: Option<PathBuf>,
}

impl<C: Connector> Seeder<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            generator: ContentGenerator::from_entropy(),
            payload_size: DEFAULT_PAYLOAD_SIZE,
            archive_dir: None,
        }
    }

    pub fn generator(mut self, generator: ContentGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn payload_size(mut self, size: usize) -> Self {
        self.payload_size = size;
        self
    }

    /// Also write each generated file to `<dir>/<role>/<filename>`.
    pub fn archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = Some(dir.into());
        self
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Rejects a run that could never produce a file, before any I/O.
    pub fn validate(&self, files_per_node: usize) -> Result<(), InvalidArgument> {
        content::validate(files_per_node, self.payload_size)
    }

    pub async fn seed(&mut self, targets: Vec<SeedTarget>, files_per_node: usize) -> Result<SeedingReport, InvalidArgument> {
        self.seed_with_cancel(targets, files_per_node, &CancellationToken::new()).await
    }

    pub async fn seed_with_cancel(
        &mut self,
        targets: Vec<SeedTarget>,
        files_per_node: usize,
        cancel: &CancellationToken,
    ) -> Result<SeedingReport, InvalidArgument> {
        self.validate(files_per_node)?;

        let mut batches = Vec::with_capacity(targets.len());
        for target in targets {
            match target {
                SeedTarget::Ready(endpoint) => {
                    let files = self.generator.generate(files_per_node, self.payload_size)?;
                    if let Some(dir) = &self.archive_dir {
                        archive(dir.join(endpoint.role.as_str()), endpoint.role, &files).await;
                    }
                    batches.push(Ok((endpoint, files)));
                }
                SeedTarget::Unavailable(failure) => {
                    tracing::warn!(role = %failure.role, "skipping node: {}", failure.reason);
                    batches.push(Err(failure));
                }
            }
        }

        let connector = &self.connector;
        let runs = join_all(batches.into_iter().map(|batch| async move {
            match batch {
                Ok((endpoint, files)) => seed_node(connector, endpoint, files, cancel).await,
                Err(failure) => NodeRun::failed(failure.role, failure.reason),
            }
        }))
        .await;

        let mut report = SeedingReport::default();
        for run in runs {
            report.entries.extend(run.entries);
            report.nodes.push(run.outcome);
        }
        Ok(report)
    }
}

struct NodeRun {
    entries: Vec<SeedEntry>,
    outcome: NodeOutcome,
}

impl NodeRun {
    fn failed(role: Role, reason: FailureReason) -> Self {
        Self {
            entries: Vec::new(),
            outcome: NodeOutcome { role, state: NodeState::Failed { reason } },
        }
    }
}

fn transition(role: Role, state: &mut NodeState, next: NodeState) {
    tracing::trace!(%role, from = ?state, to = ?next, "node state");
    *state = next;
}

/// Seeds one node over one connection. The connection is closed on every
/// path that opened it.
async fn seed_node<C: Connector>(
    connector: &C,
    endpoint: NodeEndpoint,
    files: Vec<SampleFile>,
    cancel: &CancellationToken,
) -> NodeRun {
    let role = endpoint.role;
    let mut state = NodeState::NotConnected;

    let connected = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        conn = connector.connect(&endpoint) => Some(conn),
    };
    let conn = match connected {
        None => return NodeRun::failed(role, FailureReason::Cancelled),
        Some(Err(e)) => {
            tracing::error!(%role, address = %endpoint.address(), "cannot connect: {}", e);
            return NodeRun::failed(role, FailureReason::Store(e));
        }
        Some(Ok(conn)) => conn,
    };
    transition(role, &mut state, NodeState::Connected);

    let tags = ObjectTags::active_on(conn.endpoint().role);
    let total = files.len();
    let mut entries = Vec::with_capacity(total);
    let (mut stored, mut failed) = (0, 0);
    let mut failure = None;

    for (index, file) in files.iter().enumerate() {
        transition(role, &mut state, NodeState::Inserting { index: index + 1, total });

        let put = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = conn.put(file, &tags) => Some(result),
        };
        match put {
            None => {
                tracing::warn!(%role, filename = %file.name, "cancelled during insert");
                entries.push(SeedEntry::cancelled(role, &file.name));
                failure = Some(FailureReason::Cancelled);
                break;
            }
            Some(Ok(object)) => {
                tracing::info!(%role, filename = %object.filename, object_id = %object.object_id, "inserted file");
                entries.push(SeedEntry::stored(role, object));
                stored += 1;
            }
            Some(Err(e)) => {
                tracing::error!(%role, filename = %file.name, "insert failed: {}", e);
                failed += 1;
                let lost = e.is_connection_lost();
                entries.push(SeedEntry::failed(role, &file.name, e.clone()));
                if lost {
                    failure = Some(FailureReason::Store(e));
                    break;
                }
            }
        }
    }

    if let Err(e) = conn.close().await {
        tracing::warn!(%role, "error closing connection: {}", e);
    }

    let terminal = match failure {
        Some(reason) => {
            tracing::error!(%role, attempted = entries.len(), total, "seeding stopped: {}", reason);
            NodeState::Failed { reason }
        }
        None => {
            tracing::info!(%role, stored, failed, port = endpoint.port, "seeding finished");
            NodeState::Done { stored, failed }
        }
    };
    transition(role, &mut state, terminal);

    NodeRun {
        entries,
        outcome: NodeOutcome { role, state },
    }
}

async fn archive(dir: PathBuf, role: Role, files: &[SampleFile]) {
    let files = files.to_vec();
    let written = tokio::task::spawn_blocking(move || {
        let archive = LocalSampleArchive::new(dir);
        files
            .into_iter()
            .map(|f| {
                let result = archive.persist(&f.name, &f.payload);
                (f.name, result)
            })
            .collect::<Vec<_>>()
    })
    .await;

    match written {
        Ok(results) => {
            for (filename, result) in results {
                match result {
                    Ok(path) => tracing::debug!(%role, path = %path.display(), "archived sample file"),
                    Err(e) => tracing::warn!(%role, %filename, "failed to archive sample file: {}", e),
                }
            }
        }
        Err(e) => tracing::warn!(%role, "sample archive task failed: {}", e),
    }
}
