use fixture_seeder::node::provision_all;
use fixture_seeder::{FixtureConfig, RunningNode};
use tokio_util::sync::CancellationToken;

use crate::errors::CliErr;
use crate::params::SetupArgs;

pub(super) async fn setup(args: SetupArgs, cancel: &CancellationToken) -> Result<(), CliErr> {
    let mut config = FixtureConfig::default();
    args.nodes.apply(&mut config);

    let bootstrapper = config.bootstrapper();
    let results = provision_all(&bootstrapper, config.node_specs(), cancel).await;

    let mut nodes: Vec<RunningNode> = Vec::new();
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(node) => {
                println!("{}\t{}", node.endpoint(), node.spec().data_dir.display());
                nodes.push(node);
            }
            Err(failure) => {
                tracing::error!(role = %failure.role, reason = %failure.reason, "node failed to start");
                failures.push(failure);
            }
        }
    }

    if !failures.is_empty() {
        stop_all(nodes).await;
        return Err(CliErr::Bootstrap(failures));
    }

    if args.detach {
        for node in nodes {
            let pid = node.pid();
            let spec = node.detach();
            tracing::info!(role = %spec.role, port = spec.port, pid, "left running");
        }
        return Ok(());
    }

    tracing::info!("nodes running, press Ctrl-C to stop");
    cancel.cancelled().await;
    stop_all(nodes).await;
    Ok(())
}

pub(super) async fn stop_all(nodes: Vec<RunningNode>) {
    for node in nodes {
        let role = node.spec().role;
        if let Err(e) = node.shutdown().await {
            tracing::warn!(%role, "failed to stop node: {}", e);
        } else {
            tracing::info!(%role, "node stopped");
        }
    }
}
