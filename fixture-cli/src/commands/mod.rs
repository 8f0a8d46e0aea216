mod run;
mod seed;
mod setup;
mod verify;

use std::io::Write;

use fixture_seeder::{NodeAudit, NodeState, SeedingReport};
use tokio_util::sync::CancellationToken;

use crate::errors::CliErr;
use crate::params::Command;

pub async fn dispatch(command: Command, cancel: &CancellationToken) -> Result<(), CliErr> {
    match command {
        Command::Setup(args) => setup::setup(args, cancel).await,
        Command::Seed(args) => seed::seed(args, cancel).await,
        Command::Verify(args) => verify::verify(args).await,
        Command::Run(args) => run::run(args, cancel).await,
    }
}

/// One `<filename>\t<objectId>` line per stored object, or the whole report as JSON.
fn print_report(report: &SeedingReport, json: bool) -> Result<(), CliErr> {
    let mut out = std::io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut out, report)?;
        writeln!(out)?;
    } else {
        for object in report.stored() {
            writeln!(out, "{}\t{}", object.filename, object.object_id.to_hex())?;
        }
    }

    for node in &report.nodes {
        match &node.state {
            NodeState::Done { stored, failed } => {
                tracing::info!(role = %node.role, stored, failed, "node seeded");
            }
            NodeState::Failed { reason } => {
                tracing::error!(role = %node.role, %reason, "node not seeded");
            }
            other => tracing::warn!(role = %node.role, state = ?other, "node did not finish"),
        }
    }
    Ok(())
}

fn print_audits(audits: &[NodeAudit], json: bool) -> Result<(), CliErr> {
    let mut out = std::io::stdout().lock();
    if json {
        serde_json::to_writer_pretty(&mut out, audits)?;
        writeln!(out)?;
        return Ok(());
    }
    for audit in audits {
        writeln!(
            out,
            "{}\t{} objects\t{} misplaced\t{} inactive\t{} corrupted\t{}",
            audit.role,
            audit.objects,
            audit.misplaced.len(),
            audit.inactive.len(),
            audit.corrupted.len(),
            if audit.is_clean() { "clean" } else { "UNCLEAN" }
        )?;
    }
    Ok(())
}
