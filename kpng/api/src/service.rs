use crate::IpSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub namespace: String,
    pub name: String,

    #[serde(default, rename = "type")]
    pub type_: ServiceType,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, rename = "IPs")]
    pub ips: ServiceIps,

    #[serde(default)]
    pub ports: Vec<PortMapping>,

    #[serde(default)]
    pub session_affinity: SessionAffinity,

    /// Set when the service's `externalTrafficPolicy` is `Local`.
    #[serde(default)]
    pub external_traffic_to_local: bool,

    /// Set when the service's `internalTrafficPolicy` is `Local`.
    #[serde(default)]
    pub internal_traffic_to_local: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceType {
    #[default]
    ClusterIP,
    NodePort,
    LoadBalancer,
    ExternalName,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceIps {
    #[serde(default, rename = "ClusterIPs")]
    pub cluster_ips: IpSet,

    #[serde(default, rename = "ExternalIPs")]
    pub external_ips: IpSet,

    #[serde(default, rename = "LoadBalancerIPs")]
    pub load_balancer_ips: IpSet,

    /// The service was declared with `clusterIP: None`.
    #[serde(default)]
    pub headless: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    #[serde(default)]
    pub name: String,

    pub protocol: Protocol,

    #[serde(default)]
    pub port: i32,

    #[serde(default)]
    pub node_port: i32,

    #[serde(default)]
    pub target_port: i32,

    /// Set when the service targets a named container port; the numeric
    /// value is then resolved per endpoint.
    #[serde(default)]
    pub target_port_name: String,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Protocol {
    #[default]
    TCP,
    UDP,
    SCTP,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionAffinity {
    #[default]
    None,

    #[serde(rename = "clientIP", rename_all = "camelCase")]
    ClientIp { timeout_seconds: i32 },
}

// === impl Service ===

impl Service {
    pub fn is_external_name(&self) -> bool {
        self.type_ == ServiceType::ExternalName
    }

    /// Addresses reachable from outside the cluster: external IPs and
    /// load-balancer ingress IPs.
    pub fn ingress_ips(&self) -> IpSet {
        let mut ips = self.ips.external_ips.clone();
        ips.add_set(&self.ips.load_balancer_ips);
        ips
    }
}

// === impl PortMapping ===

impl PortMapping {
    /// Returns the ports this mapping listens on, each flagged with whether
    /// it is the node port. Zero ports are not present and are skipped.
    pub fn src_ports(&self) -> impl Iterator<Item = (i32, bool)> {
        [(self.port, false), (self.node_port, true)]
            .into_iter()
            .filter(|(port, _)| *port != 0)
    }
}
