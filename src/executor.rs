// NETEXP: Perturbation-Driven Multipath Experiments in Emulated Network Topologies
// Copyright (C) 2024-2025 Roland Schmid <roschmi@ethz.ch> and Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Execution of shell commands on the nodes of the emulated topology.
//!
//! The experiments only compose command strings. A [`CommandExecutor`] decides how a command
//! reaches its node, and the [`Dispatcher`] decides what a failing command means for the
//! experiment.

use std::{process::Stdio, sync::Arc};

use thiserror::Error;
use tokio::process::Command;

use crate::topology::LinkSpec;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Cannot dispatch `{command}` to {node}: {source}")]
    Spawn {
        node: String,
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` on {node} exited with status {code:?}")]
    NonZeroExit {
        node: String,
        command: String,
        code: Option<i32>,
    },
}

#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `command` on `node`. A background command only needs to be launched: the call returns
    /// as soon as it is started, without waiting for it to finish.
    async fn execute(&self, node: &str, command: &str, background: bool) -> Result<(), ExecError>;
}

/// Quote a command such that it survives being passed as a single argument through a shell.
fn quote(command: &str) -> String {
    format!("'{}'", command.replace('\'', r"'\''"))
}

async fn run_to_completion(node: &str, command: &str, mut cmd: Command) -> Result<(), ExecError> {
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| ExecError::Spawn {
            node: node.to_string(),
            command: command.to_string(),
            source,
        })?;
    log::trace!("[{node}] {output:?}");
    if output.status.success() {
        Ok(())
    } else {
        Err(ExecError::NonZeroExit {
            node: node.to_string(),
            command: command.to_string(),
            code: output.status.code(),
        })
    }
}

/// Executes commands on nodes that are reachable by `ssh <node>`.
#[derive(Debug, Clone, Default)]
pub struct SshExecutor;

#[async_trait::async_trait]
impl CommandExecutor for SshExecutor {
    async fn execute(&self, node: &str, command: &str, background: bool) -> Result<(), ExecError> {
        let remote = if background {
            format!("nohup bash -c {} > /dev/null 2>&1 &", quote(command))
        } else {
            format!("bash -c {}", quote(command))
        };
        let mut cmd = Command::new("ssh");
        cmd.args([node, remote.as_str()]);
        run_to_completion(node, command, cmd).await
    }
}

/// Executes commands in the network namespace named after the node (`ip netns exec`).
#[derive(Debug, Clone, Default)]
pub struct NetnsExecutor;

#[async_trait::async_trait]
impl CommandExecutor for NetnsExecutor {
    async fn execute(&self, node: &str, command: &str, background: bool) -> Result<(), ExecError> {
        let mut cmd = Command::new("ip");
        cmd.args(["netns", "exec", node, "bash", "-c", command]);
        if background {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .map_err(|source| ExecError::Spawn {
                    node: node.to_string(),
                    command: command.to_string(),
                    source,
                })?;
            Ok(())
        } else {
            run_to_completion(node, command, cmd).await
        }
    }
}

/// Only logs the commands, without executing anything.
#[derive(Debug, Clone, Default)]
pub struct DryRunExecutor;

#[async_trait::async_trait]
impl CommandExecutor for DryRunExecutor {
    async fn execute(&self, node: &str, command: &str, background: bool) -> Result<(), ExecError> {
        log::info!("[{node}] {command}{}", if background { " &" } else { "" });
        Ok(())
    }
}

/// How to react on a failed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display)]
pub enum DispatchPolicy {
    /// Log the failure and carry on with the experiment.
    #[default]
    BestEffort,
    /// Abort at the first failure.
    FailFast,
}

/// Sends commands to the executor and applies the [`DispatchPolicy`] to the result.
#[derive(Clone)]
pub struct Dispatcher {
    executor: Arc<dyn CommandExecutor>,
    policy: DispatchPolicy,
}

impl Dispatcher {
    pub fn new(executor: Arc<dyn CommandExecutor>, policy: DispatchPolicy) -> Self {
        Self { executor, policy }
    }

    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    pub fn executor(&self) -> Arc<dyn CommandExecutor> {
        self.executor.clone()
    }

    /// Run a command on `node` and wait for it to finish.
    pub async fn run(&self, node: &str, command: impl AsRef<str>) -> Result<(), ExecError> {
        self.dispatch(node, command.as_ref(), false).await
    }

    /// Launch a command on `node` in the background.
    pub async fn spawn(&self, node: &str, command: impl AsRef<str>) -> Result<(), ExecError> {
        self.dispatch(node, command.as_ref(), true).await
    }

    /// Run a command on `node` and wait for it to finish. Failures are logged and ignored,
    /// whatever the dispatch policy.
    pub async fn run_best_effort(&self, node: &str, command: impl AsRef<str>) {
        let _ = self
            .dispatch_with(DispatchPolicy::BestEffort, node, command.as_ref(), false)
            .await;
    }

    /// Launch a command on `node` in the background. Failures are logged and ignored, whatever
    /// the dispatch policy.
    pub async fn spawn_best_effort(&self, node: &str, command: impl AsRef<str>) {
        let _ = self
            .dispatch_with(DispatchPolicy::BestEffort, node, command.as_ref(), true)
            .await;
    }

    async fn dispatch(&self, node: &str, command: &str, background: bool) -> Result<(), ExecError> {
        self.dispatch_with(self.policy, node, command, background).await
    }

    async fn dispatch_with(
        &self,
        policy: DispatchPolicy,
        node: &str,
        command: &str,
        background: bool,
    ) -> Result<(), ExecError> {
        log::debug!("[{node}] {command}{}", if background { " &" } else { "" });
        match self.executor.execute(node, command, background).await {
            Ok(()) => Ok(()),
            Err(e) => match policy {
                DispatchPolicy::BestEffort => {
                    log::warn!("{e} (ignored)");
                    Ok(())
                }
                DispatchPolicy::FailFast => {
                    log::error!("{e}");
                    Err(e)
                }
            },
        }
    }
}

#[async_trait::async_trait]
pub trait LinkControl: Send + Sync {
    /// Administratively bring a link up or down.
    async fn set_link_status(&self, link: &LinkSpec, up: bool) -> Result<(), ExecError>;
}

/// Toggles links by setting the interfaces on both ends up or down.
#[derive(Clone)]
pub struct InterfaceLinkControl {
    executor: Arc<dyn CommandExecutor>,
}

impl InterfaceLinkControl {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait::async_trait]
impl LinkControl for InterfaceLinkControl {
    async fn set_link_status(&self, link: &LinkSpec, up: bool) -> Result<(), ExecError> {
        let status = if up { "up" } else { "down" };
        let mut result = Ok(());
        for end in link.ends() {
            let command = format!("ip link set dev {} {status}", end.interface);
            log::debug!("[{}] {command}", end.node);
            if let Err(e) = self.executor.execute(&end.node, &command, false).await {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_quote() {
        assert_eq!(quote("rm -f a.log"), "'rm -f a.log'");
        assert_eq!(quote("echo 'x'"), r"'echo '\''x'\'''");
    }

    /// Fails every command containing `fail`, and records everything.
    #[derive(Default)]
    struct Flaky(Mutex<Vec<(String, String)>>);

    #[async_trait::async_trait]
    impl CommandExecutor for Flaky {
        async fn execute(
            &self,
            node: &str,
            command: &str,
            _background: bool,
        ) -> Result<(), ExecError> {
            self.0
                .lock()
                .unwrap()
                .push((node.to_string(), command.to_string()));
            if command.contains("fail") {
                Err(ExecError::NonZeroExit {
                    node: node.to_string(),
                    command: command.to_string(),
                    code: Some(1),
                })
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_best_effort_ignores_failures() {
        let dispatcher = Dispatcher::new(Arc::new(Flaky::default()), DispatchPolicy::BestEffort);
        assert!(dispatcher.run("c", "rm fail.log").await.is_ok());
        assert!(dispatcher.spawn("c", "true").await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_fast_propagates() {
        let dispatcher = Dispatcher::new(Arc::new(Flaky::default()), DispatchPolicy::FailFast);
        assert!(matches!(
            dispatcher.run("c", "rm fail.log").await,
            Err(ExecError::NonZeroExit { code: Some(1), .. })
        ));
    }

    #[tokio::test]
    async fn test_best_effort_commands_ignore_fail_fast() {
        let executor = Arc::new(Flaky::default());
        let dispatcher = Dispatcher::new(executor.clone(), DispatchPolicy::FailFast);
        dispatcher.spawn_best_effort("c", "fail to capture").await;
        dispatcher.run_best_effort("c", "fail to stop").await;
        // both were attempted, and the policy still applies to everything else
        assert_eq!(executor.0.lock().unwrap().len(), 2);
        assert!(dispatcher.run("c", "rm fail.log").await.is_err());
    }

    #[tokio::test]
    async fn test_link_control_toggles_both_ends() {
        let executor = Arc::new(Flaky::default());
        let control = InterfaceLinkControl::new(executor.clone());
        let link = LinkSpec::new("r", "r-eth1", "s", "s-eth0");
        control.set_link_status(&link, false).await.unwrap();
        assert_eq!(
            *executor.0.lock().unwrap(),
            vec![
                ("r".to_string(), "ip link set dev r-eth1 down".to_string()),
                ("s".to_string(), "ip link set dev s-eth0 down".to_string()),
            ]
        );

        // the second end is still attempted when the first one fails
        let link = LinkSpec::new("r", "fail-eth1", "s", "s-eth0");
        assert!(control.set_link_status(&link, true).await.is_err());
        assert_eq!(executor.0.lock().unwrap().len(), 4);
    }
}
