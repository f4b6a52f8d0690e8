use kpng_api::IpSet;
use kpng_diffstore::BufferStore;
use std::{fmt, net::IpAddr};
use tracing::warn;

/// An nftables address family.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    Ip,
    Ip6,
}

/// The kind of a table object.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Set,
    Map,
    Chain,
}

/// The generated objects of one nftables table.
///
/// Each kind of object lives in its own store, keyed by object name. The
/// content of an object is its nft body, without the surrounding
/// `chain name { ... }`.
#[derive(Debug)]
pub struct Table {
    family: Family,
    pub chains: BufferStore<String>,
    pub maps: BufferStore<String>,
    pub sets: BufferStore<String>,
}

// === impl Family ===

impl Family {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ip => "ip",
            Self::Ip6 => "ip6",
        }
    }

    /// Name of the table this agent owns in this family.
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::Ip => "k8s_svc",
            Self::Ip6 => "k8s_svc6",
        }
    }

    /// nft type of an address of this family.
    pub fn addr_type(&self) -> &'static str {
        match self {
            Self::Ip => "ipv4_addr",
            Self::Ip6 => "ipv6_addr",
        }
    }

    pub fn max_prefix_len(&self) -> u8 {
        match self {
            Self::Ip => 32,
            Self::Ip6 => 128,
        }
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        matches!(
            (self, ip),
            (Self::Ip, IpAddr::V4(_)) | (Self::Ip6, IpAddr::V6(_))
        )
    }

    fn addrs<'s>(&self, set: &'s IpSet) -> &'s [String] {
        match self {
            Self::Ip => &set.v4,
            Self::Ip6 => &set.v6,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl Kind ===

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Map => "map",
            Self::Chain => "chain",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl Table ===

impl Table {
    pub fn new(family: Family) -> Self {
        Self {
            family,
            chains: BufferStore::buffers(),
            maps: BufferStore::buffers(),
            sets: BufferStore::buffers(),
        }
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn name(&self) -> &'static str {
        self.family.table_name()
    }

    pub fn stores(&self) -> [(Kind, &BufferStore<String>); 3] {
        [
            (Kind::Set, &self.sets),
            (Kind::Map, &self.maps),
            (Kind::Chain, &self.chains),
        ]
    }

    pub fn store(&self, kind: Kind) -> &BufferStore<String> {
        match kind {
            Kind::Set => &self.sets,
            Kind::Map => &self.maps,
            Kind::Chain => &self.chains,
        }
    }

    pub fn reset(&mut self) {
        self.sets.reset();
        self.maps.reset();
        self.chains.reset();
    }

    pub fn done(&mut self) {
        self.sets.done();
        self.maps.done();
        self.chains.done();
    }

    /// Tells whether any object was created, updated or deleted.
    pub fn has_changes(&self) -> bool {
        self.stores().iter().any(|(_, store)| store.has_changes())
    }

    /// Tells whether the named object was written with some content in the
    /// current pass.
    pub fn has_content(&self, kind: Kind, name: &str) -> bool {
        self.store(kind)
            .peek(name)
            .map_or(false, |leaf| !leaf.is_empty())
    }

    /// The addresses of this table's family in `set`. Addresses that do not
    /// parse are skipped.
    pub fn ips_from_set(&self, set: &IpSet) -> Vec<IpAddr> {
        self.family
            .addrs(set)
            .iter()
            .filter_map(|s| match s.parse::<IpAddr>() {
                Ok(ip) if self.family.contains(ip) => Some(ip),
                Ok(ip) => {
                    warn!(%ip, family = %self.family, "Ignoring address of the wrong family");
                    None
                }
                Err(error) => {
                    warn!(%error, ip = %s, "Ignoring invalid address");
                    None
                }
            })
            .collect()
    }
}
