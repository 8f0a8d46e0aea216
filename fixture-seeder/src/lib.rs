#![allow(clippy::uninlined_format_args)]
#![deny(unused_qualifications)]

pub mod audit;
pub mod config;
pub mod content;
pub mod error;
pub mod fixture;
pub mod node;
pub mod seed;
pub mod store;

pub use audit::{audit, NodeAudit};
pub use config::FixtureConfig;
pub use content::{ContentGenerator, SampleFile};
pub use error::{BootstrapError, FailureReason, FixtureError, InvalidArgument, NodeFailure, StoreError};
pub use fixture::{Fixture, FixtureRun};
pub use node::{Bootstrapper, NodeEndpoint, NodeSpec, Role, RunningNode};
pub use seed::{EntryOutcome, NodeOutcome, NodeState, SeedEntry, SeedTarget, Seeder, SeedingReport};
