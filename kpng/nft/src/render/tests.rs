use super::*;
use crate::{Kind, Script};
use kpng_api::{IpSet, ServiceIps, ServiceType, SessionAffinity};
use maplit::btreemap;
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn config() -> Config {
    Config {
        cluster_cidrs: vec!["10.1.0.0/16".parse().unwrap()],
        ..Default::default()
    }
}

fn ips(ips: &[&str]) -> IpSet {
    ips.iter().copied().collect()
}

fn port(name: &str, port: i32, target_port: i32, node_port: i32) -> PortMapping {
    PortMapping {
        name: name.to_string(),
        protocol: Protocol::TCP,
        port,
        target_port,
        node_port,
        ..Default::default()
    }
}

fn service(cluster_ips: &[&str], ports: Vec<PortMapping>) -> Service {
    Service {
        namespace: "my-ns".to_string(),
        name: "my-svc".to_string(),
        ips: ServiceIps {
            cluster_ips: ips(cluster_ips),
            ..Default::default()
        },
        ports,
        ..Default::default()
    }
}

fn endpoint(ip: &str, local: bool) -> Endpoint {
    Endpoint {
        ips: ips(&[ip]),
        local,
        ..Default::default()
    }
}

/// A service with a port on every endpoint, a named port on some of them,
/// and a named port on none.
fn multi_port() -> ServiceEndpoints {
    let svc = service(
        &["10.0.0.1"],
        vec![
            port("http", 80, 8080, 58080),
            PortMapping {
                target_port_name: "x".to_string(),
                ..port("metrics", 81, 0, 0)
            },
            PortMapping {
                target_port_name: "y".to_string(),
                ..port("nowhere", 82, 0, 58081)
            },
        ],
    );

    ServiceEndpoints::new(svc).with_endpoints([
        endpoint("10.1.0.1", true),
        Endpoint {
            port_overrides: btreemap! { "metrics".to_string() => 1011 },
            ..endpoint("10.1.0.2", true)
        },
        Endpoint {
            port_overrides: btreemap! { "metrics".to_string() => 1042 },
            ..endpoint("10.1.1.1", false)
        },
    ])
}

fn compile(table: &mut Table, config: &Config, snapshot: &[ServiceEndpoints]) -> PassStats {
    table.reset();
    let mut ctx = RenderContext::new(table, config);
    for seps in snapshot {
        ctx.add_service_endpoints(seps);
    }
    ctx.finalize()
}

/// The table block of a full resync script.
fn objects(table: &Table) -> String {
    let script = Script::render([table], true).main;
    let mut lines = script.splitn(3, '\n');
    assert_eq!(lines.next(), Some(format!("table {} {}", table.family(), table.name()).as_str()));
    assert!(lines.next().unwrap_or_default().starts_with("delete table"));
    lines.next().unwrap_or_default().to_string()
}

fn changed(table: &Table) -> Vec<String> {
    table
        .stores()
        .into_iter()
        .flat_map(|(kind, store)| {
            store
                .changed()
                .into_iter()
                .map(move |item| format!("{kind} {}", item.key()))
        })
        .collect()
}

fn chain<'t>(table: &'t Table, name: &str) -> &'t str {
    table
        .chains
        .peek(name)
        .map(|c| c.as_str())
        .unwrap_or_else(|| panic!("chain {name} not written"))
}

#[test]
fn multi_port_service() {
    let config = config();
    let mut table = Table::new(Family::Ip);
    let stats = compile(&mut table, &config, &[multi_port()]);

    assert_eq!(
        objects(&table),
        r#"table ip k8s_svc {
 chain svc_my-ns_my-svc_ep_0a010001 {
  tcp dport 80 dnat to 10.1.0.1:8080
  fib daddr type local tcp dport 58080 dnat to 10.1.0.1:8080
 }
 chain svc_my-ns_my-svc_ep_0a010002 {
  tcp dport 80 dnat to 10.1.0.2:8080
  tcp dport 81 dnat to 10.1.0.2:1011
  fib daddr type local tcp dport 58080 dnat to 10.1.0.2:8080
 }
 chain svc_my-ns_my-svc_ep_0a010101 {
  tcp dport 80 dnat to 10.1.1.1:8080
  tcp dport 81 dnat to 10.1.1.1:1042
  fib daddr type local tcp dport 58080 dnat to 10.1.1.1:8080
 }
 chain svc_my-ns_my-svc_eps {
  numgen random mod 3 vmap {
    0: jump svc_my-ns_my-svc_ep_0a010001, 1: jump svc_my-ns_my-svc_ep_0a010002, 2: jump svc_my-ns_my-svc_ep_0a010101 }
 }
 chain svc_my-ns_my-svc_eps_metrics {
  numgen random mod 2 vmap {
    0: jump svc_my-ns_my-svc_ep_0a010002, 1: jump svc_my-ns_my-svc_ep_0a010101 }
 }
 chain dnat_svc_my-ns_my-svc {
  tcp dport 80 jump svc_my-ns_my-svc_eps
  fib daddr type local tcp dport 58080 jump svc_my-ns_my-svc_eps
  tcp dport 81 jump svc_my-ns_my-svc_eps_metrics
 }
 chain filter_svc_my-ns_my-svc {
  tcp dport 82 reject
  fib daddr type local tcp dport 58081 reject
 }
 map dnat_net_0a000000 {
  type ipv4_addr : verdict
  elements = {
    10.0.0.1 : jump dnat_svc_my-ns_my-svc
  }
 }
 map filter_net_0a000000 {
  type ipv4_addr : verdict
  elements = {
    10.0.0.1 : jump filter_svc_my-ns_my-svc
  }
 }
 chain nodeports_dnat {
  tcp dport 58080 jump dnat_svc_my-ns_my-svc
 }
 chain nodeports_filter {
  tcp dport 58081 jump filter_svc_my-ns_my-svc
 }
 chain z_dnat_all {
  ip daddr 10.0.0.0/24 ip daddr vmap @dnat_net_0a000000
  fib daddr type local jump nodeports_dnat
 }
 chain z_filter_all {
  ct state invalid drop
  ip daddr 10.0.0.0/24 ip daddr vmap @filter_net_0a000000
  fib daddr type local jump nodeports_filter
 }
 chain z_hook_filter_forward {
  type filter hook forward priority 0;
  jump z_filter_all
 }
 chain z_hook_filter_output {
  type filter hook output priority 0;
  jump z_filter_all
 }
 chain z_hook_nat_output {
  type nat hook output priority 0;
  jump z_dnat_all
 }
 chain z_hook_nat_prerouting {
  type nat hook prerouting priority 0;
  jump z_dnat_all
 }
 chain zz_hook_nat_postrouting {
  type nat hook postrouting priority 0;

  # masquerade non-cluster traffic to non-local endpoints
  ip saddr != { 10.1.0.0/16 } \
  ip daddr != { 10.1.0.1, 10.1.0.2 } \
  masquerade

  # masquerade hairpin traffic
  ip saddr . ip daddr { 10.1.0.1 . 10.1.0.1, 10.1.0.2 . 10.1.0.2 } masquerade
 }
}
"#
    );

    assert_eq!(stats.services, 1);
    assert_eq!(stats.endpoints, 3);
    assert_eq!(stats.dispatch_shards, 2);
    assert_eq!(stats.largest_map_bucket, 3);
}

#[test]
fn client_ip_affinity() {
    let config = config();
    let mut table = Table::new(Family::Ip);
    let mut seps = multi_port();
    Arc::make_mut(&mut seps.service).session_affinity = SessionAffinity::ClientIp {
        timeout_seconds: 30,
    };
    compile(&mut table, &config, &[seps]);

    let sets = table
        .sets
        .list()
        .map(|set| format!("{} => {}", set.key(), set.value()))
        .collect::<Vec<_>>();
    assert_eq!(
        sets,
        vec![
            "svc_my-ns_my-svc_ep_0a010001_recent =>   type ipv4_addr; flags timeout;\n",
            "svc_my-ns_my-svc_ep_0a010002_recent =>   type ipv4_addr; flags timeout;\n",
            "svc_my-ns_my-svc_ep_0a010101_recent =>   type ipv4_addr; flags timeout;\n",
        ]
    );

    assert_eq!(
        chain(&table, "dnat_svc_my-ns_my-svc"),
        "  ip saddr @svc_my-ns_my-svc_ep_0a010001_recent jump svc_my-ns_my-svc_ep_0a010001
  ip saddr @svc_my-ns_my-svc_ep_0a010002_recent jump svc_my-ns_my-svc_ep_0a010002
  ip saddr @svc_my-ns_my-svc_ep_0a010101_recent jump svc_my-ns_my-svc_ep_0a010101
  tcp dport 80 jump svc_my-ns_my-svc_eps
  fib daddr type local tcp dport 58080 jump svc_my-ns_my-svc_eps
  tcp dport 81 jump svc_my-ns_my-svc_eps_metrics
"
    );
    assert_eq!(
        chain(&table, "svc_my-ns_my-svc_ep_0a010002"),
        "  update @svc_my-ns_my-svc_ep_0a010002_recent { ip saddr timeout 30s }
  tcp dport 80 dnat to 10.1.0.2:8080
  tcp dport 81 dnat to 10.1.0.2:1011
  fib daddr type local tcp dport 58080 dnat to 10.1.0.2:8080
"
    );

    // Sets are declared before the chains updating them.
    let block = objects(&table);
    let set = block.find(" set svc_my-ns_my-svc_ep_0a010101_recent {");
    let ep_chain = block.find(" chain svc_my-ns_my-svc_ep_0a010001 {");
    assert!(set.is_some() && set < ep_chain);
}

#[test]
fn load_balanced_service() {
    let config = config();
    let mut table = Table::new(Family::Ip);
    let seps = ServiceEndpoints::new(service(&["10.0.0.1"], vec![port("http", 80, 8080, 58080)]))
        .with_endpoints([endpoint("10.1.0.1", true), endpoint("10.1.0.2", true)]);
    compile(&mut table, &config, &[seps]);

    let svc_chain = chain(&table, "dnat_svc_my-ns_my-svc");
    assert!(svc_chain.contains("  tcp dport 80 jump svc_my-ns_my-svc_eps\n"));
    assert!(svc_chain.contains("  fib daddr type local tcp dport 58080 jump svc_my-ns_my-svc_eps\n"));
    assert_eq!(
        chain(&table, "svc_my-ns_my-svc_eps"),
        "  numgen random mod 2 vmap {\n    0: jump svc_my-ns_my-svc_ep_0a010001, 1: jump svc_my-ns_my-svc_ep_0a010002 }\n"
    );
    assert!(table.chains.peek("filter_svc_my-ns_my-svc").is_none());
}

#[test]
fn service_without_endpoints_rejects() {
    let config = config();
    let mut table = Table::new(Family::Ip);
    let seps = ServiceEndpoints::new(service(&["10.0.0.1"], vec![port("http", 80, 8080, 0)]));
    compile(&mut table, &config, &[seps]);

    assert_eq!(chain(&table, "filter_svc_my-ns_my-svc"), "  tcp dport 80 reject\n");
    assert!(table.chains.peek("dnat_svc_my-ns_my-svc").is_none());
    assert!(table.chains.with_prefix("svc_").next().is_none(), "no endpoint objects");
    assert!(table.maps.peek("dnat_net_0a000000").is_none());
    assert!(table.has_content(Kind::Map, "filter_net_0a000000"));
    assert!(table.chains.peek("z_dnat_all").is_none());
    assert!(table.chains.peek("z_hook_nat_prerouting").is_none());
    assert!(table.has_content(Kind::Chain, "z_hook_filter_forward"));
}

#[test]
fn added_endpoint_changes_only_its_objects() {
    let config = config();
    let mut table = Table::new(Family::Ip);
    let svc = Arc::new(service(&["10.0.0.1"], vec![port("http", 80, 8080, 0)]));

    let one = ServiceEndpoints::new(svc.clone()).with_endpoints([endpoint("10.1.0.1", false)]);
    compile(&mut table, &config, &[one]);
    assert!(table.has_changes());

    let two = ServiceEndpoints::new(svc)
        .with_endpoints([endpoint("10.1.0.1", false), endpoint("10.1.0.2", false)]);
    compile(&mut table, &config, &[two]);

    assert_eq!(
        changed(&table),
        vec![
            "chain svc_my-ns_my-svc_ep_0a010002",
            "chain svc_my-ns_my-svc_eps",
        ]
    );
    let first = table.chains.with_prefix("svc_my-ns_my-svc_ep_0a010001").next();
    assert!(first.map_or(false, |item| !item.changed()));
}

#[test]
fn same_snapshot_is_idempotent() {
    let config = config();
    let mut table = Table::new(Family::Ip);
    let mut affinity = multi_port();
    {
        let svc = Arc::make_mut(&mut affinity.service);
        svc.name = "sticky".to_string();
        svc.ips.cluster_ips = ips(&["10.0.3.1"]);
        svc.session_affinity = SessionAffinity::ClientIp { timeout_seconds: 10 };
    }
    let snapshot = [multi_port(), affinity];

    compile(&mut table, &config, &snapshot);
    let first = objects(&table);
    assert!(table.has_changes());

    compile(&mut table, &config, &snapshot);
    assert!(!table.has_changes());
    assert!(Script::render([&table], false).is_empty());
    assert_eq!(objects(&table), first);
}

#[test]
fn removed_service_is_deleted() {
    let config = config();
    let mut table = Table::new(Family::Ip);
    compile(&mut table, &config, &[multi_port()]);
    compile(&mut table, &config, &[]);

    let deleted = table.chains.deleted();
    assert!(deleted.iter().any(|c| c.key() == "dnat_svc_my-ns_my-svc"));
    assert!(deleted.iter().any(|c| c.key() == "z_hook_nat_prerouting"));
    assert_eq!(table.maps.deleted().len(), 2);
    assert!(table.chains.list().any(|c| c.key() == "zz_hook_nat_postrouting"));

    compile(&mut table, &config, &[]);
    assert!(!table.has_changes());
}

#[test]
fn vmap_keys() {
    let config = Config {
        hash_workaround: true,
        ..config()
    };
    let mut table = Table::new(Family::Ip);
    let endpoints = (1..=7).map(|i| endpoint(&format!("10.1.0.{i}"), false));
    let seps = ServiceEndpoints::new(service(&["10.0.0.1"], vec![port("", 80, 80, 0)]))
        .with_endpoints(endpoints);
    compile(&mut table, &config, &[seps]);

    let vmap = chain(&table, "svc_my-ns_my-svc_eps");
    assert!(vmap.starts_with("  numgen random mod 7 vmap {\n"));
    assert_eq!(vmap.lines().count(), 3, "five elements per line:\n{vmap}");

    let keys = vmap
        .split(": jump")
        .filter_map(|s| s.rsplit(char::is_whitespace).next())
        .filter_map(|k| k.parse::<u64>().ok())
        .collect::<Vec<_>>();
    assert_eq!(keys, (0..7).map(|i| config.nft_key(i)).collect::<Vec<_>>());
    assert_eq!(keys[1], 16777216);

    // Same target port: no port rewrite.
    assert_eq!(
        chain(&table, "svc_my-ns_my-svc_ep_0a010007"),
        "  tcp dport 80 dnat to 10.1.0.7\n"
    );
}

#[test]
fn dispatch_is_sharded_by_prefix() {
    let config = config();
    let mut table = Table::new(Family::Ip);
    let snapshot = ["10.0.0.1", "10.0.0.200", "10.0.1.5", "10.2.0.1", "10.0.0.9"]
        .into_iter()
        .enumerate()
        .map(|(i, ip)| {
            let mut svc = service(&[ip], vec![port("http", 80, 8080, 0)]);
            svc.name = format!("svc-{i}");
            ServiceEndpoints::new(svc).with_endpoints([endpoint("10.1.0.1", false)])
        })
        .collect::<Vec<_>>();
    let stats = compile(&mut table, &config, &snapshot);

    let shards = table
        .maps
        .with_prefix("dnat_net_")
        .map(|m| m.key().as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        shards,
        vec!["dnat_net_0a000000", "dnat_net_0a000100", "dnat_net_0a020000"]
    );
    assert_eq!(stats.dispatch_shards, 3);
    assert_eq!(stats.services, 5);

    let all = chain(&table, "z_dnat_all");
    assert_eq!(all.matches("vmap @dnat_net_").count(), 3, "wired once each");
    assert_eq!(
        table.maps.peek("dnat_net_0a000000").map(|m| m.as_str()),
        Some(
            "  type ipv4_addr : verdict\n  elements = {\n    10.0.0.1 : jump dnat_svc_my-ns_svc-0,\n    10.0.0.200 : jump dnat_svc_my-ns_svc-1,\n    10.0.0.9 : jump dnat_svc_my-ns_svc-4\n  }\n"
        )
    );
}

#[test]
fn external_ips() {
    let config = config();
    let mut table = Table::new(Family::Ip);
    let mut svc = service(&["10.0.0.1"], vec![port("http", 80, 8080, 0)]);
    svc.type_ = ServiceType::LoadBalancer;
    svc.ips.external_ips = ips(&["192.0.2.1"]);
    svc.ips.load_balancer_ips = ips(&["198.51.100.1"]);
    let seps = ServiceEndpoints::new(svc).with_endpoints([endpoint("10.1.0.1", false)]);
    compile(&mut table, &config, &[seps]);

    assert_eq!(
        table.maps.peek("dnat_external").map(|m| m.as_str()),
        Some("  type ipv4_addr : verdict\n  elements = {\n    192.0.2.1 : jump dnat_svc_my-ns_my-svc,\n    198.51.100.1 : jump dnat_svc_my-ns_my-svc\n  }\n")
    );
    assert_eq!(
        chain(&table, "z_dnat_all"),
        "  ip daddr 10.0.0.0/24 ip daddr vmap @dnat_net_0a000000\n  ip daddr vmap @dnat_external\n"
    );
}

#[test]
fn skipped_services() {
    let config = config();
    let mut table = Table::new(Family::Ip);

    let mut external_name = service(&["10.0.0.1"], vec![port("http", 80, 8080, 0)]);
    external_name.type_ = ServiceType::ExternalName;
    let v6_only = service(&["fd00::1"], vec![port("http", 80, 8080, 0)]);
    let stats = compile(
        &mut table,
        &config,
        &[
            ServiceEndpoints::new(external_name),
            ServiceEndpoints::new(v6_only),
        ],
    );

    assert_eq!(stats.services, 0);
    assert!(table.chains.with_prefix("z_").next().is_none());
    assert!(table.maps.list().next().is_none());
}

#[test]
fn ipv6_service() {
    let config = Config {
        cluster_cidrs: vec!["fd00:1::/64".parse().unwrap()],
        comments: false,
        trace: true,
        ..Default::default()
    };
    let mut table = Table::new(Family::Ip6);
    let svc = service(&["10.0.0.1", "fd00::1"], vec![port("http", 80, 8080, 0)]);
    let seps = ServiceEndpoints::new(svc)
        .with_endpoints([endpoint("fd00:1::1", true), endpoint("10.1.0.9", true)]);
    let stats = compile(&mut table, &config, &[seps]);
    assert_eq!(stats.endpoints, 1);

    assert_eq!(
        chain(&table, "svc_my-ns_my-svc_ep_fd000001000000000000000000000001"),
        "  tcp dport 80 dnat to [fd00:1::1]:8080\n"
    );
    assert_eq!(
        chain(&table, "z_dnat_all"),
        "  meta nftrace set 1\n  ip6 daddr fd00::/120 ip6 daddr vmap @dnat_net_fd000000000000000000000000000000\n"
    );
    assert_eq!(
        chain(&table, "zz_hook_nat_postrouting"),
        r#"  type nat hook postrouting priority 0;

  ip6 saddr != { fd00:1::/64 } \
  ip6 daddr != { fd00:1::1 } \
  masquerade

  ip6 saddr . ip6 daddr { fd00:1::1 . fd00:1::1 } masquerade
"#
    );
}

#[test]
fn invalid_endpoint_address_is_skipped() {
    let config = config();
    let mut table = Table::new(Family::Ip);
    let bogus = Endpoint {
        ips: IpSet {
            v4: vec!["10.1.0.999".to_string()],
            v6: vec![],
        },
        ..Default::default()
    };
    let seps = ServiceEndpoints::new(service(&["10.0.0.1"], vec![port("http", 80, 8080, 0)]))
        .with_endpoints([bogus, endpoint("10.1.0.1", false)]);
    let stats = compile(&mut table, &config, &[seps]);

    assert_eq!(stats.endpoints, 1);
    assert!(chain(&table, "svc_my-ns_my-svc_eps").starts_with("  numgen random mod 1 vmap"));
}
