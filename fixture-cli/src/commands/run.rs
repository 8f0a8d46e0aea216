use fixture_seeder::store::GridFsConnector;
use fixture_seeder::{FailureReason, Fixture, FixtureConfig, FixtureError, NodeFailure, NodeState};
use tokio_util::sync::CancellationToken;

use crate::errors::CliErr;
use crate::params::RunArgs;

use super::setup::stop_all;
use super::verify::{audit_all, check};
use super::{print_audits, print_report};

pub(super) async fn run(args: RunArgs, cancel: &CancellationToken) -> Result<(), CliErr> {
    let mut config = FixtureConfig { store: args.store.settings(), ..FixtureConfig::default() };
    args.nodes.apply(&mut config);
    args.content.apply(&mut config);

    let mut fixture = Fixture::new(config.bootstrapper(), config.seeder());
    let run = match fixture.run(config.node_specs(), config.files_per_node, cancel).await {
        Ok(run) => run,
        Err(FixtureError::AllNodesUnavailable(failures)) => return Err(CliErr::Bootstrap(failures)),
        Err(e) => return Err(e.into()),
    };
    print_report(&run.report, args.json)?;

    let endpoints: Vec<_> = run.nodes.iter().map(|node| node.endpoint()).collect();
    let connector = GridFsConnector::new(config.store.clone());
    let (audits, unreachable) = audit_all(&connector, &endpoints).await;
    print_audits(&audits, args.json)?;

    let bootstrap_failures: Vec<_> = run
        .report
        .nodes
        .iter()
        .filter_map(|node| match &node.state {
            NodeState::Failed { reason: FailureReason::Bootstrap(err) } => {
                Some(NodeFailure::bootstrap(node.role, err.clone()))
            }
            _ => None,
        })
        .collect();
    let total_failure = run.report.is_total_failure();

    if args.keep_running {
        for node in run.nodes {
            node.detach();
        }
    } else {
        stop_all(run.nodes).await;
    }

    if !bootstrap_failures.is_empty() {
        return Err(CliErr::Bootstrap(bootstrap_failures));
    }
    if total_failure {
        return Err(CliErr::TotalFailure);
    }
    check(&audits, unreachable)
}
