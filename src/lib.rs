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
//! Library for running network experiments with timed perturbations in an emulated topology.
//!
//! An experiment is loaded from a parameter file ([`params`]) and a [`topology::Topology`], and
//! executed on a [`testbed::Testbed`] by an [`lifecycle::ExperimentRun`]. Commands reach the nodes
//! through an [`executor::CommandExecutor`]; all waits go through an injectable
//! [`clock::Clock`] and can be interrupted with a [`clock::CancelToken`].

pub mod clock;
pub mod executor;
pub mod experiments;
pub mod lifecycle;
pub mod params;
pub mod perturbation;
pub mod testbed;
pub mod topology;
pub mod util;

#[cfg(test)]
mod test;

pub mod prelude {
    pub use super::{
        clock::{CancelToken, Clock, SkipClock, TokioClock},
        executor::{CommandExecutor, DispatchPolicy, LinkControl},
        experiments::{Experiment, ExperimentKind},
        lifecycle::{ExperimentRun, LifecycleState, RunOutcome},
        params::{Overrides, ParameterStore},
        perturbation::{IfUpDownMode, PerturbationKind, PerturbationSpec},
        testbed::Testbed,
        topology::{Role, Topology},
    };
}
