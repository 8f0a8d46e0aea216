use std::path::Path;
use std::process::Stdio;

use futures::future::join_all;
use tokio::fs;
use tokio::process::Child;
use tokio_util::sync::CancellationToken;

use crate::error::{BootstrapError, NodeFailure};
use crate::node::launcher::Launcher;
use crate::node::readiness::{probe_once, wait_until_ready_or_exit, ReadinessPolicy};
use crate::node::{NodeEndpoint, NodeSpec};

const WRITE_PROBE_NAME: &str = ".fixture-write-probe";

/// A node process this crate started and still owns.
///
/// Dropping it kills the process. Use `detach` to leave it running.
#[derive(Debug)]
pub struct RunningNode {
    spec: NodeSpec,
    child: Option<Child>,
}

impl RunningNode {
    pub fn spec(&self) -> &NodeSpec {
        &self.spec
    }

    pub fn endpoint(&self) -> NodeEndpoint {
        self.spec.endpoint()
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    /// Kills the process and waits for it to be reaped.
    pub async fn shutdown(mut self) -> std::io::Result<()> {
        if let Some(mut child) = self.child.take() {
            tracing::info!(role = %self.spec.role, port = self.spec.port, "stopping node");
            child.kill().await?;
        }
        Ok(())
    }

    /// Gives up ownership; the process outlives this handle.
    pub fn detach(mut self) -> NodeSpec {
        if let Some(child) = self.child.take() {
            tracing::info!(role = %self.spec.role, pid = ?child.id(), "detaching node");
        }
        self.spec.clone()
    }
}

impl Drop for RunningNode {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                tracing::warn!(role = %self.spec.role, "failed to kill node on drop: {}", e);
            }
            // a child still running here is reaped by the runtime once it exits
            if let Ok(Some(status)) = child.try_wait() {
                tracing::debug!(role = %self.spec.role, %status, "node reaped on drop");
            }
        }
    }
}

/// Creates data directories, launches node processes and waits for them.
pub struct Bootstrapper<L> {
    launcher: L,
    readiness: ReadinessPolicy,
    require_free_port: bool,
}

impl<L: Launcher> Bootstrapper<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            readiness: ReadinessPolicy::default(),
            require_free_port: true,
        }
    }

    pub fn readiness(mut self, policy: ReadinessPolicy) -> Self {
        self.readiness = policy;
        self
    }

    /// When set (the default), refuse to launch onto a port something already
    /// listens on, so a stale node is never mistaken for the new one.
    pub fn require_free_port(mut self, required: bool) -> Self {
        self.require_free_port = required;
        self
    }

    pub async fn provision(&self, spec: NodeSpec) -> Result<RunningNode, BootstrapError> {
        self.provision_with_cancel(spec, &CancellationToken::new()).await
    }

    pub async fn provision_with_cancel(
        &self,
        spec: NodeSpec,
        cancel: &CancellationToken,
    ) -> Result<RunningNode, BootstrapError> {
        ensure_data_dir(&spec.data_dir).await?;

        if self.require_free_port && probe_once(&spec.host, spec.port, self.readiness.attempt_timeout).await {
            return Err(BootstrapError::ProcessLaunchFailed {
                reason: format!("port {} is already accepting connections", spec.port),
            });
        }

        let mut cmd = self.launcher.command(&spec);
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(false);
        let program = cmd.as_std().get_program().to_string_lossy().into_owned();

        let mut child = cmd.spawn().map_err(|e| BootstrapError::ProcessLaunchFailed {
            reason: format!("{}: {}", program, e),
        })?;
        tracing::info!(
            role = %spec.role,
            pid = child.id().unwrap_or(0),
            port = spec.port,
            data_dir = %spec.data_dir.display(),
            "launched node process"
        );

        let ready = wait_until_ready_or_exit(&spec.host, spec.port, &self.readiness, cancel, || {
            match child.try_wait() {
                Ok(Some(status)) => Some(status.to_string()),
                Ok(None) => None,
                Err(e) => Some(e.to_string()),
            }
        })
        .await;

        match ready {
            Ok(()) => {
                tracing::info!(role = %spec.role, port = spec.port, "node is ready");
                Ok(RunningNode { spec, child: Some(child) })
            }
            Err(err) => {
                if let Err(e) = child.kill().await {
                    tracing::debug!(role = %spec.role, "node process already gone: {}", e);
                }
                Err(err)
            }
        }
    }
}

/// Provisions every spec concurrently. One node failing never stops another.
pub async fn provision_all<L: Launcher>(
    bootstrapper: &Bootstrapper<L>,
    specs: Vec<NodeSpec>,
    cancel: &CancellationToken,
) -> Vec<Result<RunningNode, NodeFailure>> {
    let attempts = specs.into_iter().map(|spec| async move {
        let role = spec.role;
        bootstrapper
            .provision_with_cancel(spec, cancel)
            .await
            .map_err(|e| {
                tracing::error!(%role, "provisioning failed: {}", e);
                NodeFailure::bootstrap(role, e)
            })
    });
    join_all(attempts).await
}

/// Creates `dir` if needed and checks it can be written. Existing content is
/// left alone.
pub async fn ensure_data_dir(dir: &Path) -> Result<(), BootstrapError> {
    let unwritable = |e: std::io::Error| BootstrapError::DirectoryUnwritable {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    };

    fs::create_dir_all(dir).await.map_err(unwritable)?;
    let probe = dir.join(WRITE_PROBE_NAME);
    fs::write(&probe, b"").await.map_err(unwritable)?;
    fs::remove_file(&probe).await.map_err(unwritable)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Role;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::net::TcpListener;
    use tokio::process::Command;

    struct ProgramLauncher(&'static str, Vec<&'static str>);

    impl Launcher for ProgramLauncher {
        fn command(&self, _spec: &NodeSpec) -> Command {
            let mut cmd = Command::new(self.0);
            cmd.args(&self.1);
            cmd
        }
    }

    fn quick() -> ReadinessPolicy {
        ReadinessPolicy {
            timeout: Duration::from_secs(5),
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            attempt_timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_ensure_data_dir_is_idempotent() {
        let temp_dir = tempdir().unwrap();
        let dir = temp_dir.path().join("nested").join("mongodb_data_primary");

        ensure_data_dir(&dir).await.unwrap();
        std::fs::write(dir.join("existing.wt"), b"keep me").unwrap();
        ensure_data_dir(&dir).await.unwrap();

        assert_eq!(std::fs::read(dir.join("existing.wt")).unwrap(), b"keep me");
        assert!(!dir.join(WRITE_PROBE_NAME).exists());
    }

    #[tokio::test]
    async fn test_ensure_data_dir_under_file_fails() {
        let temp_dir = tempdir().unwrap();
        let file = temp_dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let err = ensure_data_dir(&file.join("data")).await.unwrap_err();
        assert!(matches!(err, BootstrapError::DirectoryUnwritable { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_launch_failure() {
        let temp_dir = tempdir().unwrap();
        let spec = NodeSpec::new(Role::Secondary, temp_dir.path().join("secondary"), 1);
        let bootstrapper = Bootstrapper::new(ProgramLauncher("/nonexistent/mongod", vec![]))
            .readiness(quick())
            .require_free_port(false);

        let err = bootstrapper.provision(spec).await.unwrap_err();
        assert!(matches!(err, BootstrapError::ProcessLaunchFailed { .. }));
        // the directory is still created before the launch is attempted
        assert!(temp_dir.path().join("secondary").is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_early_exit_is_launch_failure() {
        let temp_dir = tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let spec = NodeSpec::new(Role::Primary, temp_dir.path().join("primary"), port);
        let bootstrapper = Bootstrapper::new(ProgramLauncher("false", vec![])).readiness(quick());

        let err = bootstrapper.provision(spec).await.unwrap_err();
        assert!(matches!(err, BootstrapError::ProcessLaunchFailed { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_occupied_port_is_rejected() {
        let temp_dir = tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let spec = NodeSpec::new(Role::Primary, temp_dir.path().join("primary"), port);
        let bootstrapper = Bootstrapper::new(ProgramLauncher("/nonexistent/mongod", vec![])).readiness(quick());

        match bootstrapper.provision(spec).await.unwrap_err() {
            BootstrapError::ProcessLaunchFailed { reason } => assert!(reason.contains("already")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_provision_ready_and_shutdown() {
        let temp_dir = tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let spec = NodeSpec::new(Role::Primary, temp_dir.path().join("primary"), port);
        let bootstrapper = Bootstrapper::new(ProgramLauncher("sleep", vec!["30"]))
            .readiness(quick())
            .require_free_port(false);

        let node = bootstrapper.provision(spec).await.unwrap();
        assert_eq!(node.endpoint().port, port);
        assert!(node.pid().is_some());
        node.shutdown().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_provision_all_isolates_failures() {
        let temp_dir = tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let specs = vec![
            NodeSpec::new(Role::Primary, temp_dir.path().join("primary"), port),
            NodeSpec::new(Role::Secondary, temp_dir.path().join("not-a-dir").join("x"), port),
        ];
        std::fs::write(temp_dir.path().join("not-a-dir"), b"x").unwrap();

        let bootstrapper = Bootstrapper::new(ProgramLauncher("sleep", vec!["30"]))
            .readiness(quick())
            .require_free_port(false);
        let results = provision_all(&bootstrapper, specs, &CancellationToken::new()).await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        let failure = results[1].as_ref().unwrap_err();
        assert_eq!(failure.role, Role::Secondary);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_dropped_node_is_killed_and_reaped() {
        let temp_dir = tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let spec = NodeSpec::new(Role::Primary, temp_dir.path().join("primary"), port);
        let bootstrapper = Bootstrapper::new(ProgramLauncher("sleep", vec!["30"]))
            .readiness(quick())
            .require_free_port(false);
        let node = bootstrapper.provision(spec).await.unwrap();
        let proc_entry = std::path::PathBuf::from(format!("/proc/{}", node.pid().unwrap()));
        assert!(proc_entry.exists());

        drop(node);

        // a zombie keeps its /proc entry until it is reaped
        let mut waited = Duration::ZERO;
        while proc_entry.exists() && waited < Duration::from_secs(5) {
            tokio::time::sleep(Duration::from_millis(20)).await;
            waited += Duration::from_millis(20);
        }
        assert!(!proc_entry.exists(), "process was not reaped");
    }
}
