use crate::{IpSet, PortMapping};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    #[serde(default, rename = "IPs")]
    pub ips: IpSet,

    /// The endpoint runs on this node.
    #[serde(default)]
    pub local: bool,

    #[serde(default)]
    pub hostname: String,

    /// Numeric values of named ports, keyed by port name.
    #[serde(default)]
    pub port_overrides: BTreeMap<String, i32>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("port {0:?} has no override and no numeric target")]
    NotFound(String),

    #[error("port mapping is undefined")]
    Undefined,
}

// === impl Endpoint ===

impl Endpoint {
    /// Resolves the port this endpoint serves for the given service port.
    ///
    /// An override registered under the port's name (or, for unnamed ports,
    /// its target port name) wins; the numeric target port is used otherwise.
    pub fn port_mapping(&self, port: &PortMapping) -> Result<i32, PortError> {
        for name in [&port.name, &port.target_port_name] {
            if name.is_empty() {
                continue;
            }
            if let Some(&p) = self.port_overrides.get(name.as_str()) {
                return Ok(p);
            }
        }

        if port.target_port > 0 {
            return Ok(port.target_port);
        }

        match (port.name.is_empty(), port.target_port_name.is_empty()) {
            (false, _) => Err(PortError::NotFound(port.name.clone())),
            (true, false) => Err(PortError::NotFound(port.target_port_name.clone())),
            (true, true) => Err(PortError::Undefined),
        }
    }

    /// Tells whether this endpoint serves the given service port.
    pub fn serves(&self, port: &PortMapping) -> bool {
        match self.port_mapping(port) {
            Ok(p) => p != 0,
            Err(error) => {
                tracing::trace!(%error, port = %port.name, "Endpoint does not serve port");
                false
            }
        }
    }
}
