use std::path::PathBuf;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand};
use fixture_seeder::node::ReadinessPolicy;
use fixture_seeder::store::StoreSettings;
use fixture_seeder::{FixtureConfig, NodeEndpoint};

#[derive(Parser)]
#[clap(name = "dfs-fixture", about = "Provision and seed a two-node GridFS fixture")]
pub struct Args {
    #[clap(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the primary and secondary nodes.
    Setup(SetupArgs),
    /// Write random sample files to running nodes.
    Seed(SeedArgs),
    /// Check that every object on each node is where and what it should be.
    Verify(VerifyArgs),
    /// Setup, seed and verify, then stop the nodes.
    Run(RunArgs),
}

#[derive(ClapArgs)]
pub struct NodeArgs {
    #[clap(long, env = "DFS_FIXTURE_BASE_DIR", default_value = ".")]
    pub(crate) base_dir: PathBuf,
    #[clap(long, env = "DFS_FIXTURE_MONGOD", default_value = "mongod")]
    pub(crate) mongod: PathBuf,
    #[clap(long, default_value = "127.0.0.1")]
    pub(crate) host: String,
    #[clap(long, default_value_t = 27017)]
    pub(crate) primary_port: u16,
    #[clap(long, default_value_t = 27018)]
    pub(crate) secondary_port: u16,
    #[clap(long, default_value_t = 30)]
    pub(crate) readiness_timeout_secs: u64,
    /// Leave mongod logging on its inherited stdout instead of `<dbpath>.log`.
    #[clap(long)]
    pub(crate) mongod_stdout: bool,
}

#[derive(ClapArgs)]
pub struct StoreArgs {
    #[clap(long, env = "DFS_FIXTURE_DATABASE", default_value = "dfs")]
    pub(crate) database: String,
    #[clap(long, default_value = "fs")]
    pub(crate) bucket: String,
    #[clap(long, default_value_t = 255 * 1024)]
    pub(crate) chunk_size: u32,
    #[clap(long, default_value_t = 3)]
    pub(crate) connect_timeout_secs: u64,
}

#[derive(ClapArgs)]
pub struct ContentArgs {
    #[clap(long, default_value_t = 5)]
    pub(crate) files_per_node: usize,
    /// Payload size of each file in bytes.
    #[clap(long, default_value_t = 1024)]
    pub(crate) size: usize,
    /// Also write every generated file under `<dir>/<role>/`.
    #[clap(long)]
    pub(crate) sample_dir: Option<PathBuf>,
    #[clap(long)]
    pub(crate) rng_seed: Option<u64>,
}

#[derive(ClapArgs)]
pub struct SetupArgs {
    #[clap(flatten)]
    pub(crate) nodes: NodeArgs,
    /// Leave the nodes running and exit.
    #[clap(long)]
    pub(crate) detach: bool,
}

#[derive(ClapArgs)]
pub struct SeedArgs {
    /// Node to seed, as `role=host:port`. Repeatable.
    #[clap(long = "node")]
    pub(crate) nodes: Vec<NodeEndpoint>,
    #[clap(flatten)]
    pub(crate) store: StoreArgs,
    #[clap(flatten)]
    pub(crate) content: ContentArgs,
    /// Print the full report as JSON instead of one line per object.
    #[clap(long)]
    pub(crate) json: bool,
}

#[derive(ClapArgs)]
pub struct VerifyArgs {
    #[clap(long = "node")]
    pub(crate) nodes: Vec<NodeEndpoint>,
    #[clap(flatten)]
    pub(crate) store: StoreArgs,
    #[clap(long)]
    pub(crate) json: bool,
}

#[derive(ClapArgs)]
pub struct RunArgs {
    #[clap(flatten)]
    pub(crate) nodes: NodeArgs,
    #[clap(flatten)]
    pub(crate) store: StoreArgs,
    #[clap(flatten)]
    pub(crate) content: ContentArgs,
    #[clap(long)]
    pub(crate) json: bool,
    /// Leave the nodes running after verification.
    #[clap(long)]
    pub(crate) keep_running: bool,
}

impl NodeArgs {
    pub(crate) fn apply(&self, config: &mut FixtureConfig) {
        config.base_dir = self.base_dir.clone();
        config.mongod = self.mongod.clone();
        config.mongod_log_to_file = !self.mongod_stdout;
        config.host = self.host.clone();
        config.primary_port = self.primary_port;
        config.secondary_port = self.secondary_port;
        config.readiness = ReadinessPolicy::with_timeout(Duration::from_secs(self.readiness_timeout_secs));
    }
}

impl StoreArgs {
    pub(crate) fn settings(&self) -> StoreSettings {
        StoreSettings {
            database: self.database.clone(),
            bucket: self.bucket.clone(),
            chunk_size_bytes: self.chunk_size,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}

impl ContentArgs {
    pub(crate) fn apply(&self, config: &mut FixtureConfig) {
        config.files_per_node = self.files_per_node;
        config.payload_size = self.size;
        config.sample_dir = self.sample_dir.clone();
        config.rng_seed = self.rng_seed;
    }
}

/// Falls back to the default primary and secondary endpoints when none were given.
pub(crate) fn endpoints_or_default(nodes: &[NodeEndpoint], config: &FixtureConfig) -> Vec<NodeEndpoint> {
    if nodes.is_empty() {
        config.endpoints()
    } else {
        nodes.to_vec()
    }
}
