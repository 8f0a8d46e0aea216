#![allow(dead_code)]

use std::time::Duration;

use fixture_seeder::node::{Launcher, ReadinessPolicy};
use fixture_seeder::{NodeEndpoint, NodeSpec, Role, SeedTarget};
use tokio::net::TcpListener;
use tokio::process::Command;

pub const PRIMARY_PORT: u16 = 27017;
pub const SECONDARY_PORT: u16 = 27018;

pub fn endpoints() -> Vec<SeedTarget> {
    vec![
        SeedTarget::Ready(NodeEndpoint::new(Role::Primary, "127.0.0.1", PRIMARY_PORT)),
        SeedTarget::Ready(NodeEndpoint::new(Role::Secondary, "127.0.0.1", SECONDARY_PORT)),
    ]
}

pub fn quick_readiness() -> ReadinessPolicy {
    ReadinessPolicy {
        timeout: Duration::from_secs(5),
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(100),
        attempt_timeout: Duration::from_millis(200),
    }
}

/// Binds an ephemeral port so something is listening there, standing in for
/// the store's own listener.
pub async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Launches a long `sleep` for primary and a missing binary for secondary.
pub struct BrokenSecondaryLauncher;

impl Launcher for BrokenSecondaryLauncher {
    fn command(&self, spec: &NodeSpec) -> Command {
        match spec.role {
            Role::Primary => {
                let mut cmd = Command::new("sleep");
                cmd.arg("30");
                cmd
            }
            Role::Secondary => Command::new("/nonexistent/bin/mongod"),
        }
    }
}
