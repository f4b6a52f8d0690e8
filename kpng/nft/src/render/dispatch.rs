use super::{hex, RenderContext, SvcNames};
use crate::Kind;
use ipnet::IpNet;
use kpng_diffstore::BufferLeaf;
use std::net::IpAddr;
use tracing::warn;

/// Vmap targets are either NAT chains, or filter chains for services
/// without endpoints.
const PREFIXES: [&str; 2] = ["dnat", "filter"];

impl RenderContext<'_> {
    /// Registers the service chains in the dispatch maps: cluster IPs in the
    /// shard of their prefix, ingress IPs in the external map.
    pub(super) fn add_svc_dispatch(
        &mut self,
        names: &SvcNames,
        cluster_ips: &[IpAddr],
        ingress_ips: &[IpAddr],
    ) {
        let addr_type = self.family().addr_type();
        for (prefix, target) in PREFIXES.into_iter().zip([&names.dnat, &names.filter]) {
            if !self.table.has_content(Kind::Chain, target) {
                continue;
            }

            for &ip in cluster_ips {
                let Some(shard) = self.shard(prefix, ip) else {
                    continue;
                };
                add_vmap_element(self.table.maps.get(shard), addr_type, ip, target);
            }

            for &ip in ingress_ips {
                let external = format!("{prefix}_external");
                add_vmap_element(self.table.maps.get(external), addr_type, ip, target);
            }
        }
    }

    /// Returns the dispatch map of `ip`'s prefix, wiring it into the
    /// `z_<prefix>_all` chain the first time it is used in this pass.
    fn shard(&mut self, prefix: &str, ip: IpAddr) -> Option<String> {
        let family = self.family();
        let net = match IpNet::new(ip, self.config.split_bits(family)) {
            Ok(net) => net.trunc(),
            Err(error) => {
                warn!(%error, %ip, "Cannot compute dispatch prefix");
                return None;
            }
        };

        let map = format!("{prefix}_net_{}", hex(net.network()));
        if self.chain_nets.insert(map.clone()) {
            self.all_chain(prefix)
                .push_str(&format!("  {family} daddr {net} {family} daddr vmap @{map}\n"));
        }
        Some(map)
    }

    /// Returns the `z_<prefix>_all` chain, writing its header if it is
    /// still empty.
    fn all_chain(&mut self, prefix: &str) -> &mut BufferLeaf {
        let trace = self.config.trace;
        let chain = self.table.chains.get(format!("z_{prefix}_all"));
        if chain.is_empty() {
            if trace {
                chain.push_str("  meta nftrace set 1\n");
            }
            if prefix == "filter" {
                chain.push_str("  ct state invalid drop\n");
            }
        }
        chain
    }

    /// Terminates the element list of every verdict map written in this
    /// pass. Must run once, after the last service was added.
    pub(super) fn close_maps(&mut self) {
        let maps = self
            .table
            .maps
            .list()
            .map(|map| map.key().clone())
            .collect::<Vec<_>>();
        for map in maps {
            self.table.maps.get(map).push_str("\n  }\n");
        }
    }

    /// Wires the external maps and node ports into the `z_*_all` chains, and
    /// those into the netfilter hooks.
    pub(super) fn add_dispatch_chains(&mut self) {
        let family = self.family();

        for prefix in PREFIXES {
            let external = format!("{prefix}_external");
            if self.table.has_content(Kind::Map, &external) {
                self.all_chain(prefix)
                    .push_str(&format!("  {family} daddr vmap @{external}\n"));
            }

            let nodeports = format!("nodeports_{prefix}");
            if self.table.has_content(Kind::Chain, &nodeports) {
                self.all_chain(prefix)
                    .push_str(&format!("  fib daddr type local jump {nodeports}\n"));
            }
        }

        let priority = self.config.hook_priority;
        let hooks = [
            ("dnat", "nat", "prerouting"),
            ("dnat", "nat", "output"),
            ("filter", "filter", "forward"),
            ("filter", "filter", "output"),
        ];
        for (prefix, type_, hook) in hooks {
            let all = format!("z_{prefix}_all");
            if !self.table.has_content(Kind::Chain, &all) {
                continue;
            }
            self.table
                .chains
                .get(format!("z_hook_{type_}_{hook}"))
                .push_str(&format!(
                    "  type {type_} hook {hook} priority {priority};\n  jump {all}\n"
                ));
        }
    }

    /// Masquerades traffic leaving the cluster networks towards remote
    /// endpoints, and hairpin traffic of local endpoints.
    pub(super) fn add_postrouting_chain(&mut self) {
        let family = self.family();
        let cluster_cidrs = self.config.cluster_cidrs(family);
        let comments = self.config.comments;

        if cluster_cidrs.is_empty() && self.local_endpoint_ips.is_empty() {
            return;
        }

        let local_ips = self
            .local_endpoint_ips
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();

        let chain = self.table.chains.get("zz_hook_nat_postrouting");
        chain.push_str(&format!(
            "  type nat hook postrouting priority {};\n",
            self.config.hook_priority
        ));

        if !cluster_cidrs.is_empty() {
            let cidrs = cluster_cidrs
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>();

            chain.writeln();
            if comments {
                chain.push_str("  # masquerade non-cluster traffic to non-local endpoints\n");
            }
            chain.push_str(&format!("  {family} saddr != {{ {} }} \\\n", cidrs.join(", ")));
            if !local_ips.is_empty() {
                chain.push_str(&format!(
                    "  {family} daddr != {{ {} }} \\\n",
                    local_ips.join(", ")
                ));
            }
            chain.push_str("  masquerade\n");
        }

        if !local_ips.is_empty() {
            let pairs = local_ips
                .iter()
                .map(|ip| format!("{ip} . {ip}"))
                .collect::<Vec<_>>();

            chain.writeln();
            if comments {
                chain.push_str("  # masquerade hairpin traffic\n");
            }
            chain.push_str(&format!(
                "  {family} saddr . {family} daddr {{ {} }} masquerade\n",
                pairs.join(", ")
            ));
        }
    }
}

/// Appends `ip : jump target` to a verdict map, opening it on first use.
/// The element list is closed when the pass is finalized.
fn add_vmap_element(map: &mut BufferLeaf, addr_type: &str, ip: IpAddr, target: &str) {
    if map.is_empty() {
        map.push_str(&format!("  type {addr_type} : verdict\n  elements = {{\n    "));
    } else {
        map.push_str(",\n    ");
    }
    map.push_str(&format!("{ip} : jump {target}"));
}
