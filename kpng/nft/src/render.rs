//! Per-pass compilation of services into table objects.

use crate::{Config, Family, Table};
use kpng_api::{Endpoint, PortMapping, Protocol, Service, ServiceEndpoints};
use std::{
    collections::HashSet,
    net::IpAddr,
    time::{Duration, Instant},
};
use tracing::trace;

mod dispatch;
mod endpoint;
mod service;

#[cfg(test)]
mod tests;

/// Matches packets sent to an address owned by this node.
const DADDR_LOCAL: &str = "fib daddr type local ";

/// Compiles one pass of services into a [`Table`].
///
/// The table must have been reset for the pass. Once every service has been
/// added, [`RenderContext::finalize`] writes the shared scaffolding and
/// freezes the table so that its changes can be queried.
#[derive(Debug)]
pub struct RenderContext<'t> {
    table: &'t mut Table,
    config: &'t Config,

    /// Local endpoint addresses, in first-seen order, for hairpin
    /// masquerading.
    ep_seen: HashSet<IpAddr>,
    local_endpoint_ips: Vec<IpAddr>,

    /// Dispatch shards already wired into the `z_*_all` chains.
    chain_nets: HashSet<String>,

    /// Endpoints accounted per map bucket.
    map_offsets: Vec<u64>,

    stats: PassStats,
    start: Instant,
}

/// Counters for one compiled pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassStats {
    pub services: usize,
    pub endpoints: usize,
    pub dispatch_shards: usize,
    /// Endpoints in the most loaded map bucket.
    pub largest_map_bucket: u64,
    pub elapsed: Duration,
}

/// An endpoint selected for the table's family, with the address used to
/// reach it.
#[derive(Debug)]
struct EpIp<'a> {
    ip: IpAddr,
    endpoint: &'a Endpoint,
}

/// Object names derived from a service.
#[derive(Debug)]
struct SvcNames {
    prefix: String,
    dnat: String,
    filter: String,
    eps: String,
}

// === impl RenderContext ===

impl<'t> RenderContext<'t> {
    pub fn new(table: &'t mut Table, config: &'t Config) -> Self {
        let buckets = usize::try_from(config.maps_count.max(1)).unwrap_or(usize::MAX);
        Self {
            table,
            config,
            ep_seen: HashSet::new(),
            local_endpoint_ips: Vec::new(),
            chain_nets: HashSet::new(),
            map_offsets: vec![0; buckets],
            stats: PassStats::default(),
            start: Instant::now(),
        }
    }

    pub fn family(&self) -> Family {
        self.table.family()
    }

    /// Writes the objects forwarding traffic of one service.
    pub fn add_service_endpoints(&mut self, seps: &ServiceEndpoints) {
        let svc = &*seps.service;
        if svc.is_external_name() {
            return;
        }

        let cluster_ips = self.table.ips_from_set(&svc.ips.cluster_ips);
        let ingress_ips = self.table.ips_from_set(&svc.ingress_ips());
        if cluster_ips.is_empty() && ingress_ips.is_empty() {
            trace!(ns = %svc.namespace, svc = %svc.name, family = %self.family(), "No service IP");
            return;
        }

        let ep_ips = self.endpoint_ips(&seps.endpoints);
        self.stats.services += 1;
        self.stats.endpoints += ep_ips.len();
        self.account_map_bucket(svc, ep_ips.len());

        let names = SvcNames::new(svc);
        for ep in &ep_ips {
            self.add_endpoint_chain(svc, &names, ep);
        }
        self.add_svc_chain(svc, &names, &ep_ips);
        self.add_svc_dispatch(&names, &cluster_ips, &ingress_ips);
    }

    /// Writes the shared chains and freezes the table for this pass.
    pub fn finalize(mut self) -> PassStats {
        self.close_maps();
        self.add_dispatch_chains();
        self.add_postrouting_chain();
        self.table.done();

        self.stats.dispatch_shards = self.chain_nets.len();
        self.stats.largest_map_bucket = self.map_offsets.iter().copied().max().unwrap_or(0);
        self.stats.elapsed = self.start.elapsed();
        self.stats
    }

    /// Selects the endpoints that have an address in this family, recording
    /// the addresses of local ones.
    fn endpoint_ips<'e>(&mut self, endpoints: &'e [std::sync::Arc<Endpoint>]) -> Vec<EpIp<'e>> {
        let mut ep_ips = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let ips = self.table.ips_from_set(&endpoint.ips);
            let Some(&ip) = ips.first() else {
                continue;
            };
            ep_ips.push(EpIp { ip, endpoint });

            if endpoint.local {
                for ip in ips {
                    if self.ep_seen.insert(ip) {
                        self.local_endpoint_ips.push(ip);
                    }
                }
            }
        }
        ep_ips
    }

    fn account_map_bucket(&mut self, svc: &Service, endpoints: usize) {
        let key = format!("{}/{}", svc.namespace, svc.name);
        let buckets = self.map_offsets.len() as u64;
        let bucket = (xxhash_rust::xxh3::xxh3_64(key.as_bytes()) % buckets) as usize;
        self.map_offsets[bucket] += endpoints as u64;
    }
}

// === impl SvcNames ===

impl SvcNames {
    fn new(svc: &Service) -> Self {
        let prefix = format!("svc_{}_{}", svc.namespace, svc.name);
        Self {
            dnat: format!("dnat_{prefix}"),
            filter: format!("filter_{prefix}"),
            eps: format!("{prefix}_eps"),
            prefix,
        }
    }

    fn endpoint_chain(&self, ip: IpAddr) -> String {
        format!("{}_ep_{}", self.prefix, hex(ip))
    }

    /// The endpoint vmap of a port served by only some endpoints.
    fn port_eps(&self, port: &PortMapping) -> String {
        if port.name.is_empty() {
            format!("{}_eps_{}", self.prefix, port.port)
        } else {
            format!("{}_eps_{}", self.prefix, port.name)
        }
    }
}

/// Lowercase hex of the address octets; endpoint chain and dispatch map names embed it.
fn hex(ip: IpAddr) -> String {
    let octets = match ip {
        IpAddr::V4(ip) => ip.octets().to_vec(),
        IpAddr::V6(ip) => ip.octets().to_vec(),
    };
    octets.iter().map(|b| format!("{b:02x}")).collect()
}

fn proto_match(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::TCP => "tcp dport",
        Protocol::UDP => "udp dport",
        Protocol::SCTP => "sctp dport",
    }
}

/// A DNAT destination, with its port only when it differs from the one
/// matched.
fn dnat_target(ip: IpAddr, src_port: i32, target_port: i32) -> String {
    match ip {
        _ if src_port == target_port => ip.to_string(),
        IpAddr::V4(ip) => format!("{ip}:{target_port}"),
        IpAddr::V6(ip) => format!("[{ip}]:{target_port}"),
    }
}
