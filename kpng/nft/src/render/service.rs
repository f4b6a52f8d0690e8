use super::{proto_match, EpIp, RenderContext, SvcNames, DADDR_LOCAL};
use kpng_api::{PortMapping, Service};

/// Vmap elements per line.
const ELEMENTS_PER_LINE: usize = 5;

impl RenderContext<'_> {
    /// Writes the service chains: one rule per port, jumping to the vmap of
    /// the endpoints serving that port, or rejecting when none does.
    pub(super) fn add_svc_chain(&mut self, svc: &Service, names: &SvcNames, ep_ips: &[EpIp<'_>]) {
        if !ep_ips.is_empty() {
            let all = ep_ips.iter().collect::<Vec<_>>();
            self.add_svc_vmap(&names.eps, names, &all);
        }

        for port in &svc.ports {
            let subset = ep_ips
                .iter()
                .filter(|ep| ep.endpoint.serves(port))
                .collect::<Vec<_>>();

            // Rejecting is only possible from a filter hook.
            let chain_name = if subset.is_empty() {
                &names.filter
            } else {
                &names.dnat
            };

            let vmap = if !subset.is_empty() && subset.len() != ep_ips.len() {
                let vmap = names.port_eps(port);
                self.add_svc_vmap(&vmap, names, &subset);
                Some(vmap)
            } else if subset.is_empty() {
                None
            } else {
                Some(names.eps.clone())
            };

            for (src_port, node_port) in port.src_ports() {
                if node_port {
                    self.record_node_port(port, chain_name);
                }

                let chain = self.table.chains.get(chain_name.clone());
                chain.push_str("  ");
                if node_port {
                    chain.push_str(DADDR_LOCAL);
                }
                chain.push_str(proto_match(port.protocol));
                chain.push_str(&match &vmap {
                    Some(vmap) => format!(" {src_port} jump {vmap}\n"),
                    None => format!(" {src_port} reject\n"),
                });
            }
        }
    }

    /// Writes a chain spreading connections evenly over `eps`.
    fn add_svc_vmap(&mut self, name: &str, names: &SvcNames, eps: &[&EpIp<'_>]) {
        let config = self.config;
        let vmap = self.table.chains.get(name);

        vmap.push_str(&format!("  numgen random mod {} vmap {{", eps.len()));
        for (i, ep) in eps.iter().enumerate() {
            vmap.push_str(match i {
                0 => "\n    ",
                i if i % ELEMENTS_PER_LINE == 0 => ",\n    ",
                _ => ", ",
            });
            vmap.push_str(&format!(
                "{}: jump {}",
                config.nft_key(i as u64),
                names.endpoint_chain(ep.ip)
            ));
        }
        vmap.push_str(" }\n");
    }

    /// Routes a node port to the service chain handling it.
    fn record_node_port(&mut self, port: &PortMapping, chain_name: &str) {
        let nodeports = if chain_name.starts_with("filter_") {
            "nodeports_filter"
        } else {
            "nodeports_dnat"
        };

        self.table.chains.get(nodeports).push_str(&format!(
            "  {} {} jump {chain_name}\n",
            proto_match(port.protocol),
            port.node_port
        ));
    }
}
