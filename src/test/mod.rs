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
//! Scenario tests of whole experiment runs.
//!
//! The [`Recorder`] stands in for the command executor, the link control and the clock at the
//! same time, such that the exact order of everything an experiment does ends up in one log.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::{
    clock::{CancelToken, Clock},
    executor::{CommandExecutor, DispatchPolicy, ExecError, LinkControl},
    experiments::{Experiment, ExperimentKind},
    params::Overrides,
    testbed::Testbed,
    topology::{LinkSpec, Topology},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Exec {
        node: String,
        command: String,
        background: bool,
    },
    /// A link, identified by the node on its `a` end, was set up (`true`) or down (`false`).
    Link { link: String, up: bool },
    Sleep(Duration),
}

impl Event {
    pub fn run(node: &str, command: impl Into<String>) -> Self {
        Self::Exec {
            node: node.to_string(),
            command: command.into(),
            background: false,
        }
    }

    pub fn spawn(node: &str, command: impl Into<String>) -> Self {
        Self::Exec {
            node: node.to_string(),
            command: command.into(),
            background: true,
        }
    }

    pub fn link(link: &str, up: bool) -> Self {
        Self::Link {
            link: link.to_string(),
            up,
        }
    }

    pub fn sleep(secs: u64) -> Self {
        Self::Sleep(Duration::from_secs(secs))
    }
}

#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
    /// Commands containing any of these patterns fail.
    fail_commands: Vec<&'static str>,
    /// Setting the link (given by its `a` node) to the given status fails.
    fail_links: Vec<(&'static str, bool)>,
    /// Cancel the token as soon as a sleep of that duration begins.
    cancel_on: Option<(Duration, CancelToken)>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_commands(mut self, patterns: &[&'static str]) -> Self {
        self.fail_commands.extend_from_slice(patterns);
        self
    }

    pub fn fail_link(mut self, link: &'static str, up: bool) -> Self {
        self.fail_links.push((link, up));
        self
    }

    pub fn cancel_on(mut self, secs: u64, cancel: CancelToken) -> Self {
        self.cancel_on = Some((Duration::from_secs(secs), cancel));
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    /// Count the events matching the predicate.
    pub fn count(&self, f: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| f(e)).count()
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait::async_trait]
impl CommandExecutor for Recorder {
    async fn execute(&self, node: &str, command: &str, background: bool) -> Result<(), ExecError> {
        self.record(Event::Exec {
            node: node.to_string(),
            command: command.to_string(),
            background,
        });
        if self.fail_commands.iter().any(|p| command.contains(p)) {
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

#[async_trait::async_trait]
impl LinkControl for Recorder {
    async fn set_link_status(&self, link: &LinkSpec, up: bool) -> Result<(), ExecError> {
        self.record(Event::link(&link.a.node, up));
        if self
            .fail_links
            .iter()
            .any(|(l, u)| *l == link.a.node && *u == up)
        {
            Err(ExecError::NonZeroExit {
                node: link.a.node.clone(),
                command: format!("ip link set dev {}", link.a.interface),
                code: Some(2),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl Clock for Recorder {
    async fn sleep(&self, duration: Duration) {
        self.record(Event::Sleep(duration));
        if let Some((at, cancel)) = &self.cancel_on {
            if *at == duration {
                cancel.cancel();
                // a long wait that only ends by the cancellation
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Build a testbed on the default topology where everything goes through the recorder.
pub fn testbed(recorder: &Arc<Recorder>, policy: DispatchPolicy) -> Testbed {
    let mut tb = Testbed::new(Topology::default(), recorder.clone(), policy)
        .with_link_control(recorder.clone())
        .with_clock(recorder.clone());
    if let Some((_, cancel)) = &recorder.cancel_on {
        tb = tb.with_cancel(cancel.clone());
    }
    tb
}

/// Load an experiment from `key:value` lines on the default topology.
pub fn load(kind: ExperimentKind, params: &str) -> Experiment {
    let overrides = Overrides::parse(params).unwrap();
    Experiment::load(kind, &overrides, &Topology::default()).unwrap()
}

mod workloads;
