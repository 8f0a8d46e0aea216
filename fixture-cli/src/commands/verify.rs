use fixture_seeder::store::{BlobConnection, Connector, GridFsConnector};
use fixture_seeder::{audit, FixtureConfig, NodeAudit, NodeEndpoint};

use crate::errors::CliErr;
use crate::params::{endpoints_or_default, VerifyArgs};

use super::print_audits;

pub(super) async fn verify(args: VerifyArgs) -> Result<(), CliErr> {
    let config = FixtureConfig { store: args.store.settings(), ..FixtureConfig::default() };
    let endpoints = endpoints_or_default(&args.nodes, &config);
    let connector = GridFsConnector::new(config.store);

    let (audits, unreachable) = audit_all(&connector, &endpoints).await;
    print_audits(&audits, args.json)?;
    check(&audits, unreachable)
}

/// Audits each endpoint in turn; returns the audits and how many nodes could not be audited.
pub(super) async fn audit_all<C: Connector>(connector: &C, endpoints: &[NodeEndpoint]) -> (Vec<NodeAudit>, usize) {
    let mut audits = Vec::new();
    let mut unreachable = 0;
    for endpoint in endpoints {
        let conn = match connector.connect(endpoint).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(role = %endpoint.role, address = %endpoint.address(), "cannot audit: {}", e);
                unreachable += 1;
                continue;
            }
        };
        match audit(&conn).await {
            Ok(node_audit) => audits.push(node_audit),
            Err(e) => {
                tracing::error!(role = %endpoint.role, "audit failed: {}", e);
                unreachable += 1;
            }
        }
        if let Err(e) = conn.close().await {
            tracing::warn!(role = %endpoint.role, "close failed: {}", e);
        }
    }
    (audits, unreachable)
}

pub(super) fn check(audits: &[NodeAudit], unreachable: usize) -> Result<(), CliErr> {
    let bad = unreachable + audits.iter().filter(|a| !a.is_clean()).count();
    if bad > 0 {
        return Err(CliErr::AuditFailed(bad));
    }
    Ok(())
}
