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
//! Everything an experiment needs to act on the topology.

use std::{sync::Arc, time::Duration};

use crate::{
    clock::{wait, CancelToken, Clock, TokioClock, Wait},
    executor::{
        CommandExecutor, DispatchPolicy, Dispatcher, ExecError, InterfaceLinkControl, LinkControl,
    },
    topology::{Role, Topology},
};

/// The topology of an experiment, together with the means to run commands on it, toggle its
/// links, and wait.
#[derive(Clone)]
pub struct Testbed {
    pub topo: Topology,
    pub dispatcher: Dispatcher,
    pub links: Arc<dyn LinkControl>,
    pub clock: Arc<dyn Clock>,
    pub cancel: CancelToken,
}

impl Testbed {
    /// Create a testbed that toggles links through the same executor and waits for real.
    pub fn new(topo: Topology, executor: Arc<dyn CommandExecutor>, policy: DispatchPolicy) -> Self {
        Self {
            topo,
            links: Arc::new(InterfaceLinkControl::new(executor.clone())),
            dispatcher: Dispatcher::new(executor, policy),
            clock: Arc::new(TokioClock),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_link_control(mut self, links: Arc<dyn LinkControl>) -> Self {
        self.links = links;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn node(&self, role: Role) -> &str {
        self.topo.node(role)
    }

    /// Run a command on the node of `role` and wait for it to finish.
    pub async fn run(&self, role: Role, command: impl AsRef<str>) -> Result<(), ExecError> {
        self.dispatcher.run(self.node(role), command).await
    }

    /// Launch a command on the node of `role` in the background.
    pub async fn spawn(&self, role: Role, command: impl AsRef<str>) -> Result<(), ExecError> {
        self.dispatcher.spawn(self.node(role), command).await
    }

    /// Run a command on the node of `role`, ignoring any failure.
    pub async fn run_best_effort(&self, role: Role, command: impl AsRef<str>) {
        self.dispatcher.run_best_effort(self.node(role), command).await
    }

    /// Launch an optional command on the node of `role` in the background, ignoring any failure.
    pub async fn spawn_best_effort(&self, role: Role, command: impl AsRef<str>) {
        self.dispatcher.spawn_best_effort(self.node(role), command).await
    }

    /// Remove a file on the node of `role`, if it exists.
    pub async fn remove(&self, role: Role, file: &str) -> Result<(), ExecError> {
        self.run(role, format!("rm -f {file}")).await
    }

    /// Wait, unless the experiment gets cancelled.
    pub async fn wait(&self, duration: Duration) -> Wait {
        wait(self.clock.as_ref(), &self.cancel, duration).await
    }
}
