pub mod bootstrap;
pub mod launcher;
pub mod readiness;
pub mod role;
pub mod spec;

pub use bootstrap::{provision_all, Bootstrapper, RunningNode};
pub use launcher::{Launcher, MongodLauncher};
pub use readiness::{wait_until_ready, ReadinessPolicy};
pub use role::Role;
pub use spec::{NodeEndpoint, NodeSpec};
