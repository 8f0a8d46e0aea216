use std::path::PathBuf;

use crate::content::{ContentGenerator, DEFAULT_FILE_COUNT, DEFAULT_PAYLOAD_SIZE};
use crate::node::spec::{DEFAULT_HOST, DEFAULT_PRIMARY_PORT, DEFAULT_SECONDARY_PORT};
use crate::node::{Bootstrapper, MongodLauncher, NodeEndpoint, NodeSpec, ReadinessPolicy, Role};
use crate::seed::Seeder;
use crate::store::{GridFsConnector, StoreSettings};

/// Everything needed to stand up and seed the two-node fixture.
#[derive(Debug, Clone)]
pub struct FixtureConfig {
    /// Parent of the `mongodb_data_<role>` directories.
    pub base_dir: PathBuf,
    pub mongod: PathBuf,
    pub mongod_log_to_file: bool,
    pub host: String,
    pub primary_port: u16,
    pub secondary_port: u16,
    pub readiness: ReadinessPolicy,
    pub store: StoreSettings,
    pub files_per_node: usize,
    pub payload_size: usize,
    pub sample_dir: Option<PathBuf>,
    pub rng_seed: Option<u64>,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            mongod: PathBuf::from("mongod"),
            mongod_log_to_file: true,
            host: DEFAULT_HOST.to_string(),
            primary_port: DEFAULT_PRIMARY_PORT,
            secondary_port: DEFAULT_SECONDARY_PORT,
            readiness: ReadinessPolicy::default(),
            store: StoreSettings::default(),
            files_per_node: DEFAULT_FILE_COUNT,
            payload_size: DEFAULT_PAYLOAD_SIZE,
            sample_dir: None,
            rng_seed: None,
        }
    }
}

impl FixtureConfig {
    pub fn port(&self, role: Role) -> u16 {
        match role {
            Role::Primary => self.primary_port,
            Role::Secondary => self.secondary_port,
        }
    }

    pub fn node_specs(&self) -> Vec<NodeSpec> {
        Role::ALL
            .iter()
            .map(|&role| {
                let mut spec = NodeSpec::default_for(role, &self.base_dir);
                spec.port = self.port(role);
                spec.host = self.host.clone();
                spec
            })
            .collect()
    }

    pub fn endpoints(&self) -> Vec<NodeEndpoint> {
        self.node_specs().iter().map(NodeSpec::endpoint).collect()
    }

    pub fn bootstrapper(&self) -> Bootstrapper<MongodLauncher> {
        let launcher = MongodLauncher::new(&self.mongod).log_to_file(self.mongod_log_to_file);
        Bootstrapper::new(launcher).readiness(self.readiness)
    }

    pub fn generator(&self) -> ContentGenerator {
        match self.rng_seed {
            Some(seed) => ContentGenerator::seeded(seed),
            None => ContentGenerator::from_entropy(),
        }
    }

    pub fn seeder(&self) -> Seeder<GridFsConnector> {
        let seeder = Seeder::new(GridFsConnector::new(self.store.clone()))
            .generator(self.generator())
            .payload_size(self.payload_size);
        match &self.sample_dir {
            Some(dir) => seeder.archive_dir(dir),
            None => seeder,
        }
    }
}
