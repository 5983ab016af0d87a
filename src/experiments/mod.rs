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
//! The experiments that can be run on the testbed.
//!
//! Each experiment reads all of its parameters when it is loaded, such that configuration errors
//! surface before anything is executed. The experiment type is selected by the `xpType` parameter.

pub mod ab;
pub mod netperf;
pub mod tcpls;
pub mod vlc;

pub use ab::Ab;
pub use netperf::Netperf;
pub use tcpls::Tcpls;
pub use vlc::Vlc;

use thiserror::Error;

use crate::{
    executor::ExecError,
    lifecycle::RunOutcome,
    params::{Overrides, ParamSpec, ParameterError, ParameterStore},
    testbed::Testbed,
    topology::{Role, Topology, TopologyError},
};

/// Parameter selecting the experiment type.
pub const XP_TYPE: &str = "xpType";
pub const PING_COUNT: &str = "pingCount";
pub const FILE: &str = "file";
pub const FILE_SIZE: &str = "fileSize";
pub const PING_OUTPUT: &str = "ping.log";

/// Parameters shared by all experiments.
pub const BASE_SCHEMA: &[ParamSpec] = &[ParamSpec::int(PING_COUNT, 5)];

/// Parameters of experiments that transfer a file.
pub const RANDOM_FILE_SCHEMA: &[ParamSpec] = &[
    ParamSpec::str(FILE, "random"),
    ParamSpec::int(FILE_SIZE, 1024),
];

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("Parameter error: {0}")]
    Parameter(#[from] ParameterError),
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),
    #[error("Parameter `{key}` must be one of {allowed:?}, but is `{value}`")]
    InvalidChoice {
        key: &'static str,
        value: String,
        allowed: &'static [&'static str],
    },
    #[error("The perturbation interval must be a positive number of seconds")]
    ZeroInterval,
    #[error("Unknown experiment type `{0}`")]
    UnknownExperiment(String),
}

/// Type of an experiment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum ExperimentKind {
    Tcpls,
    Ab,
    Netperf,
    Vlc,
}

impl ExperimentKind {
    /// Read the experiment type from the `xpType` parameter.
    pub fn from_overrides(overrides: &Overrides) -> Result<Self, ExperimentError> {
        let value = overrides
            .get(XP_TYPE)
            .ok_or_else(|| ParameterError::MissingKey(XP_TYPE.to_string()))?;
        value
            .parse()
            .map_err(|_| ExperimentError::UnknownExperiment(value.to_string()))
    }

    /// All parameters this experiment type reads, with their defaults. Earlier entries take
    /// precedence over later ones with the same key.
    pub fn schema(&self) -> Vec<ParamSpec> {
        let specific: &[&[ParamSpec]] = match self {
            Self::Tcpls => &[tcpls::SCHEMA, RANDOM_FILE_SCHEMA],
            Self::Ab => &[ab::SCHEMA, RANDOM_FILE_SCHEMA],
            Self::Netperf => &[netperf::SCHEMA],
            Self::Vlc => &[vlc::SCHEMA],
        };
        specific
            .iter()
            .chain(std::iter::once(&BASE_SCHEMA))
            .flat_map(|s| s.iter().copied())
            .collect()
    }

    /// Resolve the parameters of this experiment type.
    pub fn parameters(&self, overrides: &Overrides) -> Result<ParameterStore, ParameterError> {
        crate::params::resolve(&self.schema(), overrides)
    }
}

/// One of the supported experiments, with all of its parameters resolved.
#[derive(Debug, Clone)]
pub enum Experiment {
    Tcpls(Tcpls),
    Ab(Ab),
    Netperf(Netperf),
    Vlc(Vlc),
}

impl Experiment {
    /// Load the experiment of the given type.
    pub fn load(
        kind: ExperimentKind,
        overrides: &Overrides,
        topo: &Topology,
    ) -> Result<Self, ExperimentError> {
        let params = kind.parameters(overrides)?;
        Ok(match kind {
            ExperimentKind::Tcpls => Self::Tcpls(Tcpls::from_params(&params, topo)?),
            ExperimentKind::Ab => Self::Ab(Ab::from_params(&params, topo)?),
            ExperimentKind::Netperf => Self::Netperf(Netperf::from_params(&params, topo)?),
            ExperimentKind::Vlc => Self::Vlc(Vlc::from_params(&params, topo)?),
        })
    }

    pub fn kind(&self) -> ExperimentKind {
        match self {
            Self::Tcpls(_) => ExperimentKind::Tcpls,
            Self::Ab(_) => ExperimentKind::Ab,
            Self::Netperf(_) => ExperimentKind::Netperf,
            Self::Vlc(_) => ExperimentKind::Vlc,
        }
    }

    pub async fn prepare(&self, tb: &Testbed) -> Result<(), ExecError> {
        match self {
            Self::Tcpls(x) => x.prepare(tb).await,
            Self::Ab(x) => x.prepare(tb).await,
            Self::Netperf(x) => x.prepare(tb).await,
            Self::Vlc(x) => x.prepare(tb).await,
        }
    }

    pub async fn run(&self, tb: &Testbed) -> Result<RunOutcome, ExecError> {
        match self {
            Self::Tcpls(x) => x.run(tb).await,
            Self::Ab(x) => x.run(tb).await,
            Self::Netperf(x) => x.run(tb).await,
            Self::Vlc(x) => x.run(tb).await,
        }
    }

    pub async fn clean(&self, tb: &Testbed) -> Result<(), ExecError> {
        match self {
            Self::Tcpls(x) => x.clean(tb).await,
            Self::Ab(x) => x.clean(tb).await,
            Self::Netperf(_) => Ok(()),
            Self::Vlc(x) => x.clean(tb).await,
        }
    }
}

/// Read a string parameter that must take one of the `allowed` values.
pub(crate) fn choice<'a>(
    params: &'a ParameterStore,
    key: &'static str,
    allowed: &'static [&'static str],
) -> Result<&'a str, ExperimentError> {
    let value = params.get_str(key)?;
    if allowed.iter().any(|a| *a == value) {
        Ok(value)
    } else {
        Err(ExperimentError::InvalidChoice {
            key,
            value: value.to_string(),
            allowed,
        })
    }
}

/// Read a string parameter where `none` means unset.
pub(crate) fn optional(
    params: &ParameterStore,
    key: &str,
) -> Result<Option<String>, ParameterError> {
    Ok(Some(params.get_str(key)?)
        .filter(|v| *v != "none")
        .map(str::to_string))
}

/// Returns the first error of a sequence of steps that were all attempted.
pub(crate) fn first_error(
    results: impl IntoIterator<Item = Result<(), ExecError>>,
) -> Result<(), ExecError> {
    results.into_iter().collect()
}

/// The file transferred by an experiment. `random` makes the experiment generate a file of random
/// bytes on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomFile {
    pub name: String,
    pub size_kib: u64,
}

impl RandomFile {
    pub fn from_params(params: &ParameterStore) -> Result<Self, ParameterError> {
        Ok(Self {
            name: params.get_str(FILE)?.to_string(),
            size_kib: params.get_int(FILE_SIZE)?,
        })
    }

    pub fn is_generated(&self) -> bool {
        self.name == "random"
    }

    pub async fn create(&self, tb: &Testbed) -> Result<(), ExecError> {
        if self.is_generated() {
            tb.run(
                Role::Server,
                format!(
                    "dd if=/dev/urandom of={} bs=1K count={}",
                    self.name, self.size_kib
                ),
            )
            .await?;
        }
        Ok(())
    }

    pub async fn remove(&self, tb: &Testbed) -> Result<(), ExecError> {
        if self.is_generated() {
            tb.remove(Role::Server, &self.name).await?;
        }
        Ok(())
    }
}

/// Ping the server from every client address, appending to the ping log.
pub(crate) async fn ping(tb: &Testbed, count: u64) -> Result<(), ExecError> {
    tb.remove(Role::Client, PING_OUTPUT).await?;
    let Ok(server) = tb.topo.get_ip(Role::Server, 0) else {
        log::warn!("The server has no address, skip pinging");
        return Ok(());
    };
    for i in 0..tb.topo.interface_count(Role::Client) {
        // `i` is always in range
        let Ok(client) = tb.topo.get_ip(Role::Client, i) else {
            continue;
        };
        tb.run(
            Role::Client,
            format!("ping -c {count} -I {client} {server} >> {PING_OUTPUT}"),
        )
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_kind_from_overrides() {
        let overrides = Overrides::parse("xpType:netperf").unwrap();
        assert_eq!(
            ExperimentKind::from_overrides(&overrides).unwrap(),
            ExperimentKind::Netperf
        );
        let overrides = Overrides::parse("xpType:quic").unwrap();
        assert!(matches!(
            ExperimentKind::from_overrides(&overrides),
            Err(ExperimentError::UnknownExperiment(k)) if k == "quic"
        ));
        assert!(matches!(
            ExperimentKind::from_overrides(&Overrides::new()),
            Err(ExperimentError::Parameter(ParameterError::MissingKey(_)))
        ));
    }

    #[test]
    fn test_every_kind_loads_with_defaults() {
        let topo = Topology::default();
        for kind in ExperimentKind::iter() {
            let experiment = Experiment::load(kind, &Overrides::new(), &topo).unwrap();
            assert_eq!(experiment.kind(), kind);
            // the shared parameters are registered for every kind
            let params = kind.parameters(&Overrides::new()).unwrap();
            assert_eq!(params.get_int(PING_COUNT).unwrap(), 5);
        }
    }

    #[test]
    fn test_optional() {
        let overrides = Overrides::parse("goodputFile:/tmp/g").unwrap();
        let params = ExperimentKind::Tcpls.parameters(&overrides).unwrap();
        assert_eq!(
            optional(&params, "goodputFile").unwrap(),
            Some("/tmp/g".to_string())
        );
        assert_eq!(optional(&params, "clientBackupIF").unwrap(), None);
    }
}
