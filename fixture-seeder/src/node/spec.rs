use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::node::Role;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PRIMARY_PORT: u16 = 27017;
pub const DEFAULT_SECONDARY_PORT: u16 = 27018;

/// Where and how a node should run. The process handle lives in `RunningNode`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    pub role: Role,
    pub data_dir: PathBuf,
    pub port: u16,
    pub host: String,
}

impl NodeSpec {
    pub fn new(role: Role, data_dir: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            role,
            data_dir: data_dir.into(),
            port,
            host: DEFAULT_HOST.to_string(),
        }
    }

    /// Standard layout: `<base>/mongodb_data_<role>` on the role's default port.
    pub fn default_for(role: Role, base_dir: &Path) -> Self {
        let port = match role {
            Role::Primary => DEFAULT_PRIMARY_PORT,
            Role::Secondary => DEFAULT_SECONDARY_PORT,
        };
        Self::new(role, base_dir.join(format!("mongodb_data_{}", role)), port)
    }

    pub fn endpoint(&self) -> NodeEndpoint {
        NodeEndpoint {
            role: self.role,
            host: self.host.clone(),
            port: self.port,
        }
    }
}

/// A node the blob store client can connect to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NodeEndpoint {
    pub role: Role,
    pub host: String,
    pub port: u16,
}

impl NodeEndpoint {
    pub fn new(role: Role, host: impl Into<String>, port: u16) -> Self {
        Self { role, host: host.into(), port }
    }

    pub fn default_for(role: Role) -> Self {
        NodeSpec::default_for(role, Path::new(".")).endpoint()
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Display for NodeEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}:{}", self.role, self.host, self.port)
    }
}

/// Parses `role=host:port`.
impl FromStr for NodeEndpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (role, address) = s
            .split_once('=')
            .ok_or_else(|| format!("expected role=host:port, got `{}`", s))?;
        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| format!("missing port in `{}`", address))?;
        if host.is_empty() {
            return Err(format!("missing host in `{}`", address));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| format!("bad port `{}`: {}", port, e))?;
        Ok(Self::new(role.parse()?, host, port))
    }
}
