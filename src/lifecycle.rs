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
//! Lifecycle of a single experiment run: `Created -> Prepared -> Running -> Cleaned`.
//!
//! Transitions only move forward. Calling an operation out of order is a usage error. `clean`
//! is idempotent, and can be called as soon as `run` was entered, even if `run` failed halfway.

use thiserror::Error;

use crate::{executor::ExecError, experiments::Experiment, testbed::Testbed};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum LifecycleState {
    Created,
    Prepared,
    Running,
    Cleaned,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Cannot {operation} an experiment in state {state}")]
    OrderViolation {
        operation: &'static str,
        state: LifecycleState,
    },
    #[error("Command dispatch failed: {0}")]
    Dispatch(#[from] ExecError),
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum RunOutcome {
    /// The whole measurement window passed.
    Completed,
    /// The run was interrupted by the cancel token. The experiment is already cleaned.
    Cancelled,
}

/// One execution of an experiment on a testbed.
pub struct ExperimentRun {
    experiment: Experiment,
    testbed: Testbed,
    state: LifecycleState,
}

impl ExperimentRun {
    pub fn new(experiment: Experiment, testbed: Testbed) -> Self {
        Self {
            experiment,
            testbed,
            state: LifecycleState::Created,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn experiment(&self) -> &Experiment {
        &self.experiment
    }

    pub fn testbed(&self) -> &Testbed {
        &self.testbed
    }

    fn expect(&self, operation: &'static str, state: LifecycleState) -> Result<(), LifecycleError> {
        if self.state == state {
            Ok(())
        } else {
            Err(LifecycleError::OrderViolation {
                operation,
                state: self.state,
            })
        }
    }

    /// Remove the artifacts of earlier runs and start auxiliary services.
    pub async fn prepare(&mut self) -> Result<(), LifecycleError> {
        self.expect("prepare", LifecycleState::Created)?;
        log::info!("Prepare {} experiment", self.experiment.kind());
        self.experiment.prepare(&self.testbed).await?;
        self.state = LifecycleState::Prepared;
        Ok(())
    }

    /// Start the workload and wait for the measurement window to pass. If the run gets cancelled,
    /// the experiment is cleaned right away.
    pub async fn run(&mut self) -> Result<RunOutcome, LifecycleError> {
        self.expect("run", LifecycleState::Prepared)?;
        self.state = LifecycleState::Running;
        log::info!("Run {} experiment", self.experiment.kind());
        let outcome = self.experiment.run(&self.testbed).await?;
        if outcome == RunOutcome::Cancelled {
            log::warn!("Experiment cancelled, cleaning up early");
            self.clean().await?;
        }
        Ok(outcome)
    }

    /// Revert the changes of the run. Calling it again has no effect.
    pub async fn clean(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            LifecycleState::Cleaned => {
                log::debug!("Experiment is already cleaned");
                Ok(())
            }
            LifecycleState::Running => {
                log::info!("Clean {} experiment", self.experiment.kind());
                // the state moves forward even if a step failed; all steps were attempted
                self.state = LifecycleState::Cleaned;
                Ok(self.experiment.clean(&self.testbed).await?)
            }
            state => Err(LifecycleError::OrderViolation {
                operation: "clean",
                state,
            }),
        }
    }

    /// Prepare, run and clean the experiment. Clean is attempted even if the run failed.
    pub async fn execute(&mut self) -> Result<RunOutcome, LifecycleError> {
        self.prepare().await?;
        let outcome = self.run().await;
        let cleaned = if self.state == LifecycleState::Running {
            self.clean().await
        } else {
            Ok(())
        };
        let outcome = outcome?;
        cleaned?;
        Ok(outcome)
    }
}
