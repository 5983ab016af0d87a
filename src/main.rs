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
use std::{path::PathBuf, sync::Arc};

use clap::{Parser, ValueEnum};

use netexp::{
    clock::{CancelToken, SkipClock},
    executor::{CommandExecutor, DispatchPolicy, DryRunExecutor, NetnsExecutor, SshExecutor},
    experiments::{Experiment, ExperimentKind},
    lifecycle::ExperimentRun,
    params::Overrides,
    testbed::Testbed,
    topology::Topology,
    util,
};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Executor {
    /// Reach every node with `ssh <node>`.
    Ssh,
    /// Run in the network namespace of the node.
    Netns,
    /// Only log the commands, and do not wait.
    DryRun,
}

#[derive(Parser, Debug)]
#[command(author, version, about)] // get author/version information from Cargo.toml
struct Args {
    /// Experiment parameter file, with one `key:value` per line.
    #[arg(short, long)]
    params: PathBuf,
    /// Topology description (JSON). Uses the default two-path topology if omitted.
    #[arg(short, long)]
    topo: Option<PathBuf>,
    /// Overwrite the experiment type given by `xpType` in the parameter file.
    #[arg(short, long)]
    experiment: Option<ExperimentKind>,
    /// How to run the commands on the nodes.
    #[arg(long, value_enum, default_value = "ssh")]
    executor: Executor,
    /// Abort on the first failed command, instead of logging it and carrying on.
    #[arg(long)]
    fail_fast: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    util::init_logging()?;

    let args = Args::parse();

    let overrides = Overrides::from_file(&args.params)?;
    let kind = match args.experiment {
        Some(kind) => kind,
        None => ExperimentKind::from_overrides(&overrides)?,
    };
    let topo = match &args.topo {
        Some(path) => Topology::from_file(path)?,
        None => Topology::default(),
    };
    let experiment = Experiment::load(kind, &overrides, &topo)?;

    let executor: Arc<dyn CommandExecutor> = match args.executor {
        Executor::Ssh => Arc::new(SshExecutor),
        Executor::Netns => Arc::new(NetnsExecutor),
        Executor::DryRun => Arc::new(DryRunExecutor),
    };
    let policy = if args.fail_fast {
        DispatchPolicy::FailFast
    } else {
        DispatchPolicy::BestEffort
    };

    let cancel = CancelToken::new();
    let mut testbed = Testbed::new(topo, executor, policy).with_cancel(cancel.clone());
    if args.executor == Executor::DryRun {
        testbed = testbed.with_clock(Arc::new(SkipClock));
    }

    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if cancel.interrupt() {
                log::warn!("Interrupted, stopping the experiment (press Ctrl-C again to force quit)...");
            } else {
                log::error!("Interrupted again, exiting without cleaning up!");
                std::process::exit(130);
            }
        }
    });

    log::info!(
        "Starting {kind} experiment at {} ({policy})",
        util::get_timestamp()
    );
    let outcome = ExperimentRun::new(experiment, testbed).execute().await?;
    log::info!("Experiment {kind}: {outcome}");

    Ok(())
}
