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
//! Request/response benchmark with netperf.

use std::{net::IpAddr, time::Duration};

use crate::{
    clock::Wait,
    executor::ExecError,
    lifecycle::RunOutcome,
    params::{ParamSpec, ParameterStore},
    testbed::Testbed,
    topology::{Role, Topology},
};

use super::{ping, ExperimentError, PING_COUNT};

pub const TESTLEN: &str = "netperfTestlen";
pub const TESTNAME: &str = "netperfTestname";
pub const REQRES_SIZE: &str = "netperfReqresSize";

pub const SCHEMA: &[ParamSpec] = &[
    ParamSpec::int(TESTLEN, 10),
    ParamSpec::str(TESTNAME, "TCP_RR"),
    ParamSpec::str(REQRES_SIZE, "2K,256"),
];

pub const NETPERF_LOG: &str = "netperf.log";
pub const NETSERVER_LOG: &str = "netserver.log";
pub const NETPERF_BIN: &str = "netperf";
pub const NETSERVER_BIN: &str = "netserver";
const SETTLE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Netperf {
    pub testlen: u64,
    pub testname: String,
    pub reqres_size: String,
    pub ping_count: u64,
    pub server_ip: IpAddr,
}

impl Netperf {
    pub fn from_params(params: &ParameterStore, topo: &Topology) -> Result<Self, ExperimentError> {
        Ok(Self {
            testlen: params.get_int(TESTLEN)?,
            testname: params.get_str(TESTNAME)?.to_string(),
            reqres_size: params.get_str(REQRES_SIZE)?.to_string(),
            ping_count: params.get_int(PING_COUNT)?,
            server_ip: topo.get_ip(Role::Server, 0)?,
        })
    }

    pub fn server_cmd(&self) -> String {
        format!("sudo {NETSERVER_BIN} &> {NETSERVER_LOG}")
    }

    pub fn client_cmd(&self) -> String {
        format!(
            "{NETPERF_BIN} -H {} -l {} -t {} -- -r {} &> {NETPERF_LOG}",
            self.server_ip, self.testlen, self.testname, self.reqres_size
        )
    }

    pub async fn prepare(&self, tb: &Testbed) -> Result<(), ExecError> {
        ping(tb, self.ping_count).await?;
        tb.remove(Role::Client, NETPERF_LOG).await?;
        tb.remove(Role::Server, NETSERVER_LOG).await
    }

    pub async fn run(&self, tb: &Testbed) -> Result<RunOutcome, ExecError> {
        tb.spawn(Role::Server, self.server_cmd()).await?;
        if tb.wait(SETTLE).await == Wait::Cancelled {
            return Ok(RunOutcome::Cancelled);
        }
        tb.run(Role::Client, self.client_cmd()).await?;
        if tb.wait(SETTLE).await == Wait::Cancelled {
            return Ok(RunOutcome::Cancelled);
        }
        Ok(RunOutcome::Completed)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{experiments::ExperimentKind, params::Overrides};

    #[test]
    fn test_client_cmd() {
        let overrides = Overrides::parse("netperfTestname:TCP_STREAM\nnetperfTestlen:30").unwrap();
        let params = ExperimentKind::Netperf.parameters(&overrides).unwrap();
        let netperf = Netperf::from_params(&params, &Topology::default()).unwrap();
        assert_eq!(
            netperf.client_cmd(),
            "netperf -H 10.1.0.1 -l 30 -t TCP_STREAM -- -r 2K,256 &> netperf.log"
        );
    }
}
