use fixture_seeder::{FixtureConfig, SeedTarget};
use tokio_util::sync::CancellationToken;

use crate::errors::CliErr;
use crate::params::{endpoints_or_default, SeedArgs};

use super::print_report;

pub(super) async fn seed(args: SeedArgs, cancel: &CancellationToken) -> Result<(), CliErr> {
    let mut config = FixtureConfig { store: args.store.settings(), ..FixtureConfig::default() };
    args.content.apply(&mut config);

    let targets = endpoints_or_default(&args.nodes, &config)
        .into_iter()
        .map(SeedTarget::Ready)
        .collect();

    let mut seeder = config.seeder();
    let report = seeder.seed_with_cancel(targets, config.files_per_node, cancel).await?;
    print_report(&report, args.json)?;

    if report.is_total_failure() {
        return Err(CliErr::TotalFailure);
    }
    Ok(())
}
