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
use std::path::PathBuf;

use clap::Parser;

use netexp::{experiments::ExperimentKind, params::Overrides};

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    /// Experiment parameter file, with one `key:value` per line.
    params: PathBuf,
    /// Overwrite the experiment type given by `xpType` in the parameter file.
    #[arg(short, long)]
    experiment: Option<ExperimentKind>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    let args = Args::parse();
    let overrides = Overrides::from_file(&args.params)?;
    let kind = match args.experiment {
        Some(kind) => kind,
        None => ExperimentKind::from_overrides(&overrides)?,
    };
    let params = kind.parameters(&overrides)?;
    for key in params.undeclared() {
        log::warn!("Parameter {key} is not used by the {kind} experiment");
    }
    println!("{}", serde_json::to_string_pretty(&params.resolved())?);

    Ok(())
}
