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
//! Adaptive video streaming with VLC from an apache server. VLC needs a display, so a virtual
//! one is started during preparation.

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

pub const FILE: &str = "vlcFile";
pub const TIME: &str = "vlcTime";

pub const SCHEMA: &[ParamSpec] = &[
    ParamSpec::str(FILE, "bunny_ibmff_360.mpd"),
    ParamSpec::int(TIME, 0),
];

pub const SERVER_LOG: &str = "vlc_server.log";
pub const CLIENT_LOG: &str = "vlc_client.log";
pub const VLC_BIN: &str = "/home/mininet/vlc/vlc";
pub const DISPLAY: &str = ":66";
const SERVER_STARTUP: Duration = Duration::from_secs(1);
const COOLDOWN: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vlc {
    pub file: String,
    /// Stop playback after this many seconds. `0` plays the whole file.
    pub time: u64,
    pub ping_count: u64,
    pub server_ip: IpAddr,
}

impl Vlc {
    pub fn from_params(params: &ParameterStore, topo: &Topology) -> Result<Self, ExperimentError> {
        Ok(Self {
            file: params.get_str(FILE)?.to_string(),
            time: params.get_int(TIME)?,
            ping_count: params.get_int(PING_COUNT)?,
            server_ip: topo.get_ip(Role::Server, 0)?,
        })
    }

    pub fn server_cmd(&self) -> String {
        format!("/etc/init.d/apache2 restart &> {SERVER_LOG}")
    }

    pub fn client_cmd(&self) -> String {
        format!(
            "export LD_LIBRARY_PATH=$LD_LIBRARY_PATH:/home/mininet/usr/lib/ && sudo ldconfig && \
             {VLC_BIN} -I dummy --x11-display {DISPLAY} --adaptive-logic 3 --no-loop --play-and-exit \
             http://{}/{} 2>&1 | grep -E '(Neb|halp|bandwidth|late|Buffering|buffering)' > {CLIENT_LOG}",
            self.server_ip, self.file
        )
    }

    pub async fn prepare(&self, tb: &Testbed) -> Result<(), ExecError> {
        ping(tb, self.ping_count).await?;
        tb.remove(Role::Client, CLIENT_LOG).await?;
        tb.spawn(Role::Client, format!("Xvfb {DISPLAY}")).await?;
        tb.remove(Role::Server, SERVER_LOG).await
    }

    pub async fn run(&self, tb: &Testbed) -> Result<RunOutcome, ExecError> {
        tb.run(Role::Server, self.server_cmd()).await?;
        if tb.wait(SERVER_STARTUP).await == Wait::Cancelled {
            return Ok(RunOutcome::Cancelled);
        }
        if self.time > 0 {
            tb.spawn(Role::Client, self.client_cmd()).await?;
            if tb.wait(Duration::from_secs(self.time)).await == Wait::Cancelled {
                return Ok(RunOutcome::Cancelled);
            }
            tb.run(Role::Client, "pkill -9 -f vlc").await?;
        } else {
            tb.run(Role::Client, self.client_cmd()).await?;
        }
        if tb.wait(COOLDOWN).await == Wait::Cancelled {
            return Ok(RunOutcome::Cancelled);
        }
        Ok(RunOutcome::Completed)
    }

    pub async fn clean(&self, tb: &Testbed) -> Result<(), ExecError> {
        tb.run(Role::Client, "pkill Xvfb").await
    }
}
