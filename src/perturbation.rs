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
//! Network perturbations injected while a transfer is in flight.
//!
//! A perturbation is armed once, right after the client was launched. Drop and reset are handed
//! to injector scripts on the router, which loop on their own until the experiment ends. The
//! interface flap either toggles the two redundant server links itself (`api` mode), or hands the
//! toggling to a script on the client (`script` mode).

use std::{fmt, time::Duration};

use thiserror::Error;

use crate::{
    clock::Wait,
    executor::{DispatchPolicy, ExecError},
    testbed::Testbed,
    topology::Role,
};

pub const DROP_SCRIPT: &str = "~/picotcpls/t/ipmininet/tcp_drop.sh";
pub const RST_SCRIPT: &str = "~/picotcpls/t/ipmininet/tcp_reset_mininet.sh";
pub const IFUPDOWN_SCRIPT: &str = "~/picotcpls/t/ipmininet/ifupdown.sh";
pub const PERTURBATION_LOG: &str = "tcpls_perturbation.log";

/// Measurement window of the drop and reset perturbations (and of the control condition).
pub const SCRIPT_DURATION: Duration = Duration::from_secs(70);
/// Measurement window of the interface flap.
pub const IFUPDOWN_DURATION: Duration = Duration::from_secs(80);

/// Errors that are reported during a run, but never abort it.
#[derive(Debug, Error)]
pub enum PerturbationError {
    #[error("Unknown perturbation kind `{0}`, running without perturbation")]
    UnknownKind(String),
    #[error("Iteration {iteration}: {applied} is {applied_status}, but {failed} failed: {source}")]
    PartialLinkToggle {
        iteration: u64,
        applied: String,
        applied_status: &'static str,
        failed: String,
        #[source]
        source: ExecError,
    },
}

/// How the interface flap is performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display, strum::EnumString)]
pub enum IfUpDownMode {
    /// Toggle the server links through the topology, from the control loop.
    #[default]
    #[strum(serialize = "api")]
    TopologyApi,
    /// Launch the flapping script on the client.
    #[strum(serialize = "script")]
    Script,
}

/// The perturbation to apply during an experiment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PerturbationKind {
    None,
    Drop,
    Reset,
    IfUpDown(IfUpDownMode),
    /// A configured kind that is not known. The run continues without perturbation.
    Unrecognized(String),
}

impl PerturbationKind {
    /// Parse the configured perturbation type (`none`, `drop`, `rst`, or `ifupdown`).
    pub fn parse(kind: &str, mode: IfUpDownMode) -> Self {
        match kind.trim() {
            "none" => Self::None,
            "drop" => Self::Drop,
            "rst" | "reset" => Self::Reset,
            "ifupdown" => Self::IfUpDown(mode),
            other => Self::Unrecognized(other.to_string()),
        }
    }

    /// Total duration of the measurement window for this perturbation.
    pub fn total_duration(&self) -> Duration {
        match self {
            Self::IfUpDown(_) => IFUPDOWN_DURATION,
            Self::None | Self::Drop | Self::Reset | Self::Unrecognized(_) => SCRIPT_DURATION,
        }
    }
}

impl fmt::Display for PerturbationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Drop => f.write_str("drop"),
            Self::Reset => f.write_str("rst"),
            Self::IfUpDown(mode) => write!(f, "ifupdown ({mode})"),
            Self::Unrecognized(kind) => write!(f, "{kind} (unknown)"),
        }
    }
}

/// Number of toggles the interface flap performs in the measurement window. The remainder of
/// the window is not covered by a toggle.
pub fn num_toggles(total_duration: Duration, interval_secs: u64) -> u64 {
    total_duration.as_secs() / interval_secs
}

/// Result of arming a perturbation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// The perturbation is running. The given time of the measurement window already passed.
    Armed { spent: Duration },
    /// The experiment was cancelled while the perturbation was applied.
    Cancelled,
}

/// Immutable description of the perturbation of one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PerturbationSpec {
    kind: PerturbationKind,
    interval_secs: u64,
}

impl PerturbationSpec {
    /// Create a new perturbation schedule. Returns `None` if the interval is zero.
    pub fn new(kind: PerturbationKind, interval_secs: u64) -> Option<Self> {
        (interval_secs > 0).then_some(Self {
            kind,
            interval_secs,
        })
    }

    pub fn kind(&self) -> &PerturbationKind {
        &self.kind
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn total_duration(&self) -> Duration {
        self.kind.total_duration()
    }

    /// Command that launches an injector script with the interval as its only argument.
    pub fn script_command(&self, script: &str) -> String {
        format!("{script} {} &>> {PERTURBATION_LOG}", self.interval_secs)
    }

    /// Arm the perturbation on the testbed.
    pub async fn schedule(&self, tb: &Testbed) -> Result<Schedule, ExecError> {
        log::info!(
            "Arm perturbation {} (interval {}s, window {:?})",
            self.kind,
            self.interval_secs,
            self.total_duration()
        );
        match &self.kind {
            PerturbationKind::None => {}
            PerturbationKind::Drop => {
                tb.spawn(Role::Router, self.script_command(DROP_SCRIPT))
                    .await?
            }
            PerturbationKind::Reset => {
                tb.spawn(Role::Router, self.script_command(RST_SCRIPT))
                    .await?
            }
            PerturbationKind::IfUpDown(IfUpDownMode::Script) => {
                tb.spawn(Role::Client, self.script_command(IFUPDOWN_SCRIPT))
                    .await?
            }
            PerturbationKind::IfUpDown(IfUpDownMode::TopologyApi) => return self.flap(tb).await,
            PerturbationKind::Unrecognized(kind) => {
                log::error!("{}", PerturbationError::UnknownKind(kind.clone()))
            }
        }
        Ok(Schedule::Armed {
            spent: Duration::ZERO,
        })
    }

    /// Alternate which of the two server links is up, every `interval` seconds.
    async fn flap(&self, tb: &Testbed) -> Result<Schedule, ExecError> {
        let links = match tb.topo.server_link_pair() {
            Ok(links) => links,
            Err(e) => {
                log::error!("Cannot flap the server links: {e}");
                return Ok(Schedule::Armed {
                    spent: Duration::ZERO,
                });
            }
        };
        let mut spent = Duration::ZERO;
        for i in 0..num_toggles(self.total_duration(), self.interval_secs) {
            let up = links[(i % 2) as usize];
            let down = links[((i + 1) % 2) as usize];
            log::debug!("Iteration {i}: bring {up} up and {down} down");
            let up_result = tb.links.set_link_status(up, true).await;
            let down_result = tb.links.set_link_status(down, false).await;
            match (up_result, down_result) {
                (Ok(()), Ok(())) => {}
                (Ok(()), Err(source)) => log::error!(
                    "{}",
                    PerturbationError::PartialLinkToggle {
                        iteration: i,
                        applied: up.to_string(),
                        applied_status: "up",
                        failed: down.to_string(),
                        source
                    }
                ),
                (Err(source), Ok(())) => log::error!(
                    "{}",
                    PerturbationError::PartialLinkToggle {
                        iteration: i,
                        applied: down.to_string(),
                        applied_status: "down",
                        failed: up.to_string(),
                        source
                    }
                ),
                (Err(e), Err(_)) => {
                    if tb.dispatcher.policy() == DispatchPolicy::FailFast {
                        return Err(e);
                    }
                    log::warn!("Iteration {i}: could not toggle any server link: {e}");
                }
            }
            if tb.wait(self.interval()).await == Wait::Cancelled {
                return Ok(Schedule::Cancelled);
            }
            spent += self.interval();
        }
        Ok(Schedule::Armed { spent })
    }
}
