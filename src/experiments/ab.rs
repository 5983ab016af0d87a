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
//! HTTP load test with apache bench against a simple HTTP server.

use std::{net::IpAddr, time::Duration};

use crate::{
    clock::Wait,
    executor::ExecError,
    lifecycle::RunOutcome,
    params::{ParamSpec, ParameterStore},
    testbed::Testbed,
    topology::{Role, Topology},
};

use super::{ExperimentError, RandomFile};

pub const CONCURRENT_REQUESTS: &str = "abConcurrentRequests";
pub const TIME_LIMIT: &str = "abTimelimit";
pub const SERVER_SCRIPT: &str = "abServerScript";

pub const SCHEMA: &[ParamSpec] = &[
    ParamSpec::int(CONCURRENT_REQUESTS, 50),
    ParamSpec::int(TIME_LIMIT, 20),
    ParamSpec::str(SERVER_SCRIPT, "~/utils/http_server.py"),
];

pub const SERVER_LOG: &str = "ab_server.log";
pub const CLIENT_LOG: &str = "ab_client.log";
pub const AB_BIN: &str = "ab";
/// The python HTTP server takes a while to come up.
const SERVER_STARTUP: Duration = Duration::from_secs(15);
const COOLDOWN: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ab {
    pub concurrent_requests: u64,
    pub time_limit: u64,
    pub server_script: String,
    pub file: RandomFile,
    pub server_ip: IpAddr,
}

impl Ab {
    pub fn from_params(params: &ParameterStore, topo: &Topology) -> Result<Self, ExperimentError> {
        Ok(Self {
            concurrent_requests: params.get_int(CONCURRENT_REQUESTS)?,
            time_limit: params.get_int(TIME_LIMIT)?,
            server_script: params.get_str(SERVER_SCRIPT)?.to_string(),
            file: RandomFile::from_params(params)?,
            server_ip: topo.get_ip(Role::Server, 0)?,
        })
    }

    pub fn server_cmd(&self) -> String {
        format!("python {} &> {SERVER_LOG}", self.server_script)
    }

    pub fn client_cmd(&self) -> String {
        format!(
            "{AB_BIN} -c {} -t {} http://{}/{} &> {CLIENT_LOG}",
            self.concurrent_requests, self.time_limit, self.server_ip, self.file.name
        )
    }

    pub async fn prepare(&self, tb: &Testbed) -> Result<(), ExecError> {
        tb.remove(Role::Client, CLIENT_LOG).await?;
        tb.remove(Role::Server, SERVER_LOG).await?;
        self.file.create(tb).await
    }

    pub async fn run(&self, tb: &Testbed) -> Result<RunOutcome, ExecError> {
        tb.spawn(Role::Server, self.server_cmd()).await?;
        log::info!("Wait for the HTTP server to be up, this can take quite a while...");
        if tb.wait(SERVER_STARTUP).await == Wait::Cancelled {
            return Ok(RunOutcome::Cancelled);
        }
        tb.run(Role::Client, self.client_cmd()).await?;
        if tb.wait(COOLDOWN).await == Wait::Cancelled {
            return Ok(RunOutcome::Cancelled);
        }
        Ok(RunOutcome::Completed)
    }

    pub async fn clean(&self, tb: &Testbed) -> Result<(), ExecError> {
        self.file.remove(tb).await
    }
}
