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
use std::sync::Arc;

use super::{load, testbed, Event, Recorder};
use crate::{
    executor::DispatchPolicy,
    experiments::{Experiment, ExperimentKind},
    lifecycle::{ExperimentRun, RunOutcome},
};

async fn execute(kind: ExperimentKind, params: &str) -> (Experiment, Vec<Event>) {
    let recorder = Arc::new(Recorder::new());
    let experiment = load(kind, params);
    let mut run = ExperimentRun::new(
        experiment.clone(),
        testbed(&recorder, DispatchPolicy::BestEffort),
    );
    assert_eq!(run.execute().await.unwrap(), RunOutcome::Completed);
    (experiment, recorder.events())
}

fn pings() -> Vec<Event> {
    vec![
        Event::run("Client_0", "rm -f ping.log"),
        Event::run("Client_0", "ping -c 3 -I 10.0.0.1 10.1.0.1 >> ping.log"),
        Event::run("Client_0", "ping -c 3 -I 10.0.1.1 10.1.0.1 >> ping.log"),
    ]
}

#[tokio::test]
async fn netperf_sequence() {
    let (experiment, events) = execute(ExperimentKind::Netperf, "pingCount:3").await;
    let Experiment::Netperf(netperf) = experiment else {
        unreachable!()
    };
    let mut expected = pings();
    expected.extend([
        Event::run("Client_0", "rm -f netperf.log"),
        Event::run("Server_0", "rm -f netserver.log"),
        Event::spawn("Server_0", "sudo netserver &> netserver.log"),
        Event::sleep(2),
        Event::run("Client_0", netperf.client_cmd()),
        Event::sleep(2),
    ]);
    assert_eq!(events, expected);
}

#[tokio::test]
async fn vlc_with_time_limit() {
    let (experiment, events) = execute(ExperimentKind::Vlc, "pingCount:3\nvlcTime:30").await;
    let Experiment::Vlc(vlc) = experiment else {
        unreachable!()
    };
    let mut expected = pings();
    expected.extend([
        Event::run("Client_0", "rm -f vlc_client.log"),
        Event::spawn("Client_0", "Xvfb :66"),
        Event::run("Server_0", "rm -f vlc_server.log"),
        Event::run("Server_0", "/etc/init.d/apache2 restart &> vlc_server.log"),
        Event::sleep(1),
        Event::spawn("Client_0", vlc.client_cmd()),
        Event::sleep(30),
        Event::run("Client_0", "pkill -9 -f vlc"),
        Event::sleep(2),
        Event::run("Client_0", "pkill Xvfb"),
    ]);
    assert_eq!(events, expected);
}

#[tokio::test]
async fn vlc_plays_whole_file() {
    let (experiment, events) = execute(ExperimentKind::Vlc, "").await;
    let Experiment::Vlc(vlc) = experiment else {
        unreachable!()
    };
    assert!(vlc.client_cmd().contains("http://10.1.0.1/bunny_ibmff_360.mpd"));
    // the client runs in the foreground and is never killed
    assert!(events.contains(&Event::run("Client_0", vlc.client_cmd())));
    assert!(!events.contains(&Event::run("Client_0", "pkill -9 -f vlc")));
    assert_eq!(events.last(), Some(&Event::run("Client_0", "pkill Xvfb")));
}

#[tokio::test]
async fn ab_sequence() {
    let (experiment, events) = execute(ExperimentKind::Ab, "fileSize:64").await;
    let Experiment::Ab(ab) = experiment else {
        unreachable!()
    };
    assert_eq!(
        events,
        vec![
            Event::run("Client_0", "rm -f ab_client.log"),
            Event::run("Server_0", "rm -f ab_server.log"),
            Event::run("Server_0", "dd if=/dev/urandom of=random bs=1K count=64"),
            Event::spawn("Server_0", ab.server_cmd()),
            Event::sleep(15),
            Event::run("Client_0", ab.client_cmd()),
            Event::sleep(2),
            Event::run("Server_0", "rm -f random"),
        ]
    );
}
