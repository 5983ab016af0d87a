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
//! Logical view of the emulated topology: which node plays which role, and which addresses each
//! role has. Path index 0 is always the primary path, index 1 the secondary (backup) path.

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr},
    path::Path,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("The {role} has no address for path {index}")]
    MissingAddress { role: Role, index: usize },
    #[error("The {role} needs at least {required} paths, but only has {found}")]
    NotEnoughPaths {
        role: Role,
        required: usize,
        found: usize,
    },
    #[error("Expected exactly two redundant server links, but found {0}")]
    NotEnoughLinks(usize),
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot parse the topology: {0}")]
    Json(#[from] serde_json::Error),
}

/// Role of a node in the experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Client,
    Server,
    Router,
}

/// A node of the topology together with its addresses, ordered by path index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub node: String,
    #[serde(default)]
    pub addresses: Vec<IpAddr>,
}

impl Endpoint {
    pub fn new(node: impl Into<String>, addresses: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            node: node.into(),
            addresses: addresses.into_iter().collect(),
        }
    }
}

/// One end of a link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkEnd {
    pub node: String,
    pub interface: String,
}

/// A link between two nodes, identified by the interfaces on both ends.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkSpec {
    pub a: LinkEnd,
    pub b: LinkEnd,
}

impl LinkSpec {
    pub fn new(
        a: impl Into<String>,
        a_intf: impl Into<String>,
        b: impl Into<String>,
        b_intf: impl Into<String>,
    ) -> Self {
        Self {
            a: LinkEnd {
                node: a.into(),
                interface: a_intf.into(),
            },
            b: LinkEnd {
                node: b.into(),
                interface: b_intf.into(),
            },
        }
    }

    pub fn ends(&self) -> [&LinkEnd; 2] {
        [&self.a, &self.b]
    }
}

impl fmt::Display for LinkSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -- {}", self.a.node, self.b.node)
    }
}

fn default_server_links() -> Vec<LinkSpec> {
    vec![
        LinkSpec::new("bs_r2s_0_3", "bs_r2s_0_3-eth1", "Server_0", "Server_0-eth0"),
        LinkSpec::new("bs_r2s_1_3", "bs_r2s_1_3-eth1", "Server_0", "Server_0-eth1"),
    ]
}

/// Endpoints of the experiment, and the redundant links between the server and the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub client: Endpoint,
    pub server: Endpoint,
    pub router: Endpoint,
    #[serde(default = "default_server_links")]
    pub server_links: Vec<LinkSpec>,
}

impl Default for Topology {
    /// Two-path topology with one client, one router and one server.
    fn default() -> Self {
        let ip = |a, b, c, d| IpAddr::V4(Ipv4Addr::new(a, b, c, d));
        Self {
            client: Endpoint::new("Client_0", [ip(10, 0, 0, 1), ip(10, 0, 1, 1)]),
            server: Endpoint::new("Server_0", [ip(10, 1, 0, 1), ip(10, 1, 1, 1)]),
            router: Endpoint::new("Router", []),
            server_links: default_server_links(),
        }
    }
}

impl Topology {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TopologyError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn endpoint(&self, role: Role) -> &Endpoint {
        match role {
            Role::Client => &self.client,
            Role::Server => &self.server,
            Role::Router => &self.router,
        }
    }

    /// Name of the node that plays the given role.
    pub fn node(&self, role: Role) -> &str {
        &self.endpoint(role).node
    }

    /// Address of `role` on the path with the given index.
    pub fn get_ip(&self, role: Role, index: usize) -> Result<IpAddr, TopologyError> {
        self.endpoint(role)
            .addresses
            .get(index)
            .copied()
            .ok_or(TopologyError::MissingAddress { role, index })
    }

    pub fn interface_count(&self, role: Role) -> usize {
        self.endpoint(role).addresses.len()
    }

    /// Make sure that `role` has at least `required` paths.
    pub fn require_paths(&self, role: Role, required: usize) -> Result<(), TopologyError> {
        let found = self.interface_count(role);
        if found < required {
            Err(TopologyError::NotEnoughPaths {
                role,
                required,
                found,
            })
        } else {
            Ok(())
        }
    }

    /// The two redundant links towards the server, in order.
    pub fn server_link_pair(&self) -> Result<[&LinkSpec; 2], TopologyError> {
        match self.server_links.as_slice() {
            [a, b] => Ok([a, b]),
            links => Err(TopologyError::NotEnoughLinks(links.len())),
        }
    }
}
