use std::ffi::OsString;
use std::path::PathBuf;

use tokio::process::Command;

use crate::node::NodeSpec;

/// Builds the command that starts a node. Arguments are passed as discrete
/// values; no shell ever sees the data directory or port.
pub trait Launcher: Send + Sync {
    fn command(&self, spec: &NodeSpec) -> Command;
}

/// Starts a `mongod` against the node's data directory and port.
#[derive(Debug, Clone)]
pub struct MongodLauncher {
    binary: PathBuf,
    log_to_file: bool,
    extra_args: Vec<OsString>,
}

impl MongodLauncher {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            log_to_file: false,
            extra_args: Vec::new(),
        }
    }

    /// Send mongod's log to `<data_dir>.log` instead of stdout.
    pub fn log_to_file(mut self, enabled: bool) -> Self {
        self.log_to_file = enabled;
        self
    }

    pub fn extra_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.extra_args.push(arg.into());
        self
    }
}

impl Default for MongodLauncher {
    fn default() -> Self {
        Self::new("mongod")
    }
}

impl Launcher for MongodLauncher {
    fn command(&self, spec: &NodeSpec) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--dbpath")
            .arg(&spec.data_dir)
            .arg("--port")
            .arg(spec.port.to_string())
            .arg("--bind_ip")
            .arg(&spec.host);

        if self.log_to_file {
            let mut log_path = spec.data_dir.clone().into_os_string();
            log_path.push(".log");
            cmd.arg("--logpath").arg(log_path).arg("--logappend");
        }

        cmd.args(&self.extra_args);
        cmd
    }
}
