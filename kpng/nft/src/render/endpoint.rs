use super::{dnat_target, proto_match, EpIp, RenderContext, SvcNames, DADDR_LOCAL};
use kpng_api::{Service, SessionAffinity};
use tracing::debug;

impl RenderContext<'_> {
    /// Writes the chain that DNATs to one endpoint, and its affinity set
    /// when the service has client-IP affinity.
    pub(super) fn add_endpoint_chain(&mut self, svc: &Service, names: &SvcNames, ep: &EpIp<'_>) {
        let family = self.table.family();
        let chain_name = names.endpoint_chain(ep.ip);

        if let SessionAffinity::ClientIp { timeout_seconds } = svc.session_affinity {
            let recent = format!("{chain_name}_recent");

            let set = self.table.sets.get(recent.clone());
            if set.is_empty() {
                set.push_str(&format!("  type {}; flags timeout;\n", family.addr_type()));
            }

            self.table.chains.get(chain_name.clone()).push_str(&format!(
                "  update @{recent} {{ {family} saddr timeout {timeout_seconds}s }}\n"
            ));

            // Clients seen recently stick to their endpoint, ahead of the
            // per-port load balancing.
            self.table
                .chains
                .get(names.dnat.clone())
                .push_str(&format!("  {family} saddr @{recent} jump {chain_name}\n"));
        }

        let chain = self.table.chains.get(chain_name);
        for node_port in [false, true] {
            for port in &svc.ports {
                let src_port = if node_port { port.node_port } else { port.port };
                if src_port == 0 {
                    continue;
                }

                let target_port = match ep.endpoint.port_mapping(port) {
                    Ok(0) => continue,
                    Ok(p) => p,
                    Err(error) => {
                        debug!(%error, ns = %svc.namespace, svc = %svc.name, ip = %ep.ip, "Failed to map port");
                        continue;
                    }
                };

                chain.push_str("  ");
                if node_port {
                    chain.push_str(DADDR_LOCAL);
                }
                chain.push_str(proto_match(port.protocol));
                chain.push_str(&format!(
                    " {src_port} dnat to {}\n",
                    dnat_target(ep.ip, src_port, target_port)
                ));
            }
        }
    }
}
