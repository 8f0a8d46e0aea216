use tokio_util::sync::CancellationToken;

use crate::error::FixtureError;
use crate::node::{provision_all, Bootstrapper, Launcher, NodeSpec, RunningNode};
use crate::seed::{SeedTarget, Seeder, SeedingReport};
use crate::store::Connector;

/// Nodes that came up, and what was seeded into them.
#[derive(Debug)]
pub struct FixtureRun {
    pub nodes: Vec<RunningNode>,
    pub report: SeedingReport,
}

impl FixtureRun {
    /// Stops every node this run started.
    pub async fn shutdown(self) -> std::io::Result<()> {
        for node in self.nodes {
            node.shutdown().await?;
        }
        Ok(())
    }
}

/// Provisions nodes and seeds whichever of them came up.
pub struct Fixture<L, C> {
    bootstrapper: Bootstrapper<L>,
    seeder: Seeder<C>,
}

impl<L: Launcher, C: Connector> Fixture<L, C> {
    pub fn new(bootstrapper: Bootstrapper<L>, seeder: Seeder<C>) -> Self {
        Self { bootstrapper, seeder }
    }

    pub fn seeder(&self) -> &Seeder<C> {
        &self.seeder
    }

    pub async fn run(
        &mut self,
        specs: Vec<NodeSpec>,
        files_per_node: usize,
        cancel: &CancellationToken,
    ) -> Result<FixtureRun, FixtureError> {
        // fail on bad arguments before starting any process
        self.seeder.validate(files_per_node)?;

        let provisioned = provision_all(&self.bootstrapper, specs, cancel).await;

        let mut nodes = Vec::new();
        let mut targets = Vec::new();
        let mut failures = Vec::new();
        for result in provisioned {
            match result {
                Ok(node) => {
                    targets.push(SeedTarget::Ready(node.endpoint()));
                    nodes.push(node);
                }
                Err(failure) => {
                    targets.push(SeedTarget::Unavailable(failure.clone()));
                    failures.push(failure);
                }
            }
        }
        if nodes.is_empty() {
            return Err(FixtureError::AllNodesUnavailable(failures));
        }

        let report = self.seeder.seed_with_cancel(targets, files_per_node, cancel).await?;
        Ok(FixtureRun { nodes, report })
    }
}
