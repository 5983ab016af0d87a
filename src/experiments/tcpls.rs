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
//! Multipath transfer with the TCPLS command line tool, while a perturbation acts on one of the
//! two paths.

use std::net::IpAddr;

use crate::{
    clock::Wait,
    executor::ExecError,
    lifecycle::RunOutcome,
    params::{ParamSpec, ParameterStore},
    perturbation::{IfUpDownMode, PerturbationKind, PerturbationSpec, Schedule, PERTURBATION_LOG},
    testbed::Testbed,
    topology::{Role, Topology},
};

use super::{choice, first_error, optional, ExperimentError, RandomFile};

pub const FAILOVER: &str = "failover";
pub const CLIENT_BACKUP_IF: &str = "clientBackupIF";
pub const SERVER_BACKUP_IF: &str = "serverBackupIF";
pub const PERTURBATION: &str = "perturbationType";
pub const GOODPUT_FILE: &str = "goodputFile";
pub const INTERVAL: &str = "interval";
pub const IFUPDOWN_MODE: &str = "ifupdownMode";

pub const SCHEMA: &[ParamSpec] = &[
    ParamSpec::str(FAILOVER, "on"),
    ParamSpec::str(CLIENT_BACKUP_IF, "none"),
    ParamSpec::str(SERVER_BACKUP_IF, "none"),
    ParamSpec::str(GOODPUT_FILE, "none"),
    ParamSpec::str(PERTURBATION, "drop"),
    ParamSpec::int(INTERVAL, 5),
    ParamSpec::str(IFUPDOWN_MODE, "api"),
];

pub const CLI: &str = "~/picotcpls/cli";
pub const CERT: &str = "~/picotcpls/t/assets/server.crt";
pub const KEY: &str = "~/picotcpls/t/assets/server.key";
pub const PORT: u16 = 4443;
pub const SERVER_LOG: &str = "tcpls_server.log";
pub const CLIENT_LOG: &str = "tcpls_client.log";
pub const CAPTURE_LOG: &str = "client_tcpdump.log";
/// Time the server gets to bind before the client connects.
pub const GRACE_PERIOD: std::time::Duration = std::time::Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tcpls {
    pub failover: bool,
    pub client_backup_if: Option<String>,
    pub server_backup_if: Option<String>,
    pub goodput_file: Option<String>,
    pub file: RandomFile,
    pub perturbation: PerturbationSpec,
    /// Server addresses, primary path first.
    pub server_ips: [IpAddr; 2],
    /// Client addresses, primary path first.
    pub client_ips: [IpAddr; 2],
}

impl Tcpls {
    pub fn from_params(params: &ParameterStore, topo: &Topology) -> Result<Self, ExperimentError> {
        topo.require_paths(Role::Client, 2)?;
        topo.require_paths(Role::Server, 2)?;

        let mode = choice(params, IFUPDOWN_MODE, &["api", "script"])?
            .parse::<IfUpDownMode>()
            .unwrap_or_default();
        let kind = PerturbationKind::parse(params.get_str(PERTURBATION)?, mode);
        if let PerturbationKind::Unrecognized(kind) = &kind {
            log::warn!("Perturbation type `{kind}` is unknown, the run will not be perturbed");
        }
        let perturbation = PerturbationSpec::new(kind, params.get_int(INTERVAL)?)
            .ok_or(ExperimentError::ZeroInterval)?;

        Ok(Self {
            failover: choice(params, FAILOVER, &["on", "off"])? == "on",
            client_backup_if: optional(params, CLIENT_BACKUP_IF)?,
            server_backup_if: optional(params, SERVER_BACKUP_IF)?,
            goodput_file: optional(params, GOODPUT_FILE)?,
            file: RandomFile::from_params(params)?,
            perturbation,
            server_ips: [topo.get_ip(Role::Server, 0)?, topo.get_ip(Role::Server, 1)?],
            client_ips: [topo.get_ip(Role::Client, 0)?, topo.get_ip(Role::Client, 1)?],
        })
    }

    fn failover_flag(&self) -> &'static str {
        if self.failover {
            " -f"
        } else {
            ""
        }
    }

    pub fn server_cmd(&self) -> String {
        format!(
            "{CLI} -t{} -T simple_transfer -k {KEY} -c {CERT} -i {} -z {} {} {PORT} &> {SERVER_LOG}",
            self.failover_flag(),
            self.file.name,
            self.server_ips[1],
            self.server_ips[0],
        )
    }

    pub fn client_cmd(&self) -> String {
        let goodput = match &self.goodput_file {
            Some(file) => format!(" -g {file}"),
            None => String::new(),
        };
        format!(
            "{CLI} -t{}{goodput} -T simple_transfer -z {} -z {} -p {} {} {PORT} &> {CLIENT_LOG}",
            self.failover_flag(),
            self.client_ips[0],
            self.client_ips[1],
            self.server_ips[1],
            self.server_ips[0],
        )
    }

    pub fn capture_cmd(&self) -> String {
        format!(
            "tcpdump -i any -n -v host {} or {} &> {CAPTURE_LOG}",
            self.server_ips[0], self.server_ips[1]
        )
    }

    /// Stops the capture of this experiment only. The bracket keeps the pattern from matching
    /// the shell that runs `pkill`.
    pub fn stop_capture_cmd(&self) -> String {
        format!(
            "pkill -f '[t]cpdump -i any -n -v host {} or {}'",
            self.server_ips[0], self.server_ips[1]
        )
    }

    pub fn backup_cmd(interface: &str) -> String {
        format!("ip link set dev {interface} multipath backup")
    }

    pub async fn prepare(&self, tb: &Testbed) -> Result<(), ExecError> {
        tb.remove(Role::Client, CLIENT_LOG).await?;
        tb.remove(Role::Client, CAPTURE_LOG).await?;
        tb.remove(Role::Server, SERVER_LOG).await?;
        tb.remove(Role::Router, PERTURBATION_LOG).await?;
        self.file.create(tb).await
    }

    pub async fn run(&self, tb: &Testbed) -> Result<RunOutcome, ExecError> {
        // the backup role must be known before any connection is opened
        if let Some(interface) = &self.client_backup_if {
            tb.run(Role::Client, Self::backup_cmd(interface)).await?;
        }
        if let Some(interface) = &self.server_backup_if {
            tb.run(Role::Server, Self::backup_cmd(interface)).await?;
        }

        tb.spawn(Role::Server, self.server_cmd()).await?;
        // the capture is optional, the transfer runs without it
        tb.spawn_best_effort(Role::Client, self.capture_cmd()).await;
        if tb.wait(GRACE_PERIOD).await == Wait::Cancelled {
            return Ok(RunOutcome::Cancelled);
        }
        tb.spawn(Role::Client, self.client_cmd()).await?;

        let spent = match self.perturbation.schedule(tb).await? {
            Schedule::Armed { spent } => spent,
            Schedule::Cancelled => return Ok(RunOutcome::Cancelled),
        };
        let remaining = self.perturbation.total_duration().saturating_sub(spent);
        if !remaining.is_zero() && tb.wait(remaining).await == Wait::Cancelled {
            return Ok(RunOutcome::Cancelled);
        }
        Ok(RunOutcome::Completed)
    }

    pub async fn clean(&self, tb: &Testbed) -> Result<(), ExecError> {
        let removed = self.file.remove(tb).await;
        // nothing to stop if the capture never started or already exited
        tb.run_best_effort(Role::Client, self.stop_capture_cmd()).await;
        let flushed = tb.run(Role::Router, "iptables -F").await;
        first_error([removed, flushed])
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{params::Overrides, topology::Endpoint};

    fn load(params: &str) -> Result<Tcpls, ExperimentError> {
        let overrides = Overrides::parse(params).unwrap();
        let params = crate::experiments::ExperimentKind::Tcpls
            .parameters(&overrides)
            .unwrap();
        Tcpls::from_params(&params, &Topology::default())
    }

    #[test]
    fn test_defaults() {
        let tcpls = load("").unwrap();
        assert!(tcpls.failover);
        assert_eq!(tcpls.perturbation.kind(), &PerturbationKind::Drop);
        assert_eq!(tcpls.perturbation.interval_secs(), 5);
        assert_eq!(tcpls.goodput_file, None);
        assert!(tcpls.file.is_generated());
        assert_eq!(tcpls.file.size_kib, 1024);
    }

    #[test]
    fn test_commands() {
        let tcpls = load("goodputFile:goodput.csv").unwrap();
        assert_eq!(
            tcpls.server_cmd(),
            "~/picotcpls/cli -t -f -T simple_transfer -k ~/picotcpls/t/assets/server.key \
             -c ~/picotcpls/t/assets/server.crt -i random -z 10.1.1.1 10.1.0.1 4443 \
             &> tcpls_server.log"
        );
        assert_eq!(
            tcpls.client_cmd(),
            "~/picotcpls/cli -t -f -g goodput.csv -T simple_transfer -z 10.0.0.1 -z 10.0.1.1 \
             -p 10.1.1.1 10.1.0.1 4443 &> tcpls_client.log"
        );
        assert_eq!(
            tcpls.capture_cmd(),
            "tcpdump -i any -n -v host 10.1.0.1 or 10.1.1.1 &> client_tcpdump.log"
        );
        assert_eq!(
            tcpls.stop_capture_cmd(),
            "pkill -f '[t]cpdump -i any -n -v host 10.1.0.1 or 10.1.1.1'"
        );

        let tcpls = load("failover:off").unwrap();
        assert!(tcpls.client_cmd().starts_with("~/picotcpls/cli -t -T simple_transfer"));
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(matches!(
            load("interval:0"),
            Err(ExperimentError::ZeroInterval)
        ));
        assert!(matches!(
            load("failover:maybe"),
            Err(ExperimentError::InvalidChoice { key: FAILOVER, .. })
        ));
        assert!(matches!(
            load("ifupdownMode:both"),
            Err(ExperimentError::InvalidChoice { key: IFUPDOWN_MODE, .. })
        ));
        // unknown perturbations are no configuration error
        let tcpls = load("perturbationType:flood").unwrap();
        assert_eq!(
            tcpls.perturbation.kind(),
            &PerturbationKind::Unrecognized("flood".to_string())
        );
    }

    #[test]
    fn test_requires_two_paths() {
        let mut topo = Topology::default();
        topo.server = Endpoint::new("Server_0", [topo.server.addresses[0]]);
        let params = crate::experiments::ExperimentKind::Tcpls
            .parameters(&Overrides::new())
            .unwrap();
        assert!(matches!(
            Tcpls::from_params(&params, &topo),
            Err(ExperimentError::Topology(_))
        ));
    }
}
