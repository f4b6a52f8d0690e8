use crate::Family;
use ipnet::{IpNet, Ipv4Net};

/// Compiler settings, fixed for the lifetime of the process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Priority of every hook chain.
    pub hook_priority: i32,

    /// Emit `#` comments in generated chains.
    pub comments: bool,

    /// Prefix length used to shard IPv4 service dispatch.
    pub split_bits: u8,

    /// Prefix length used to shard IPv6 service dispatch.
    pub split_bits6: u8,

    /// Number of buckets services are spread over for endpoint-map
    /// accounting.
    pub maps_count: u64,

    /// Compensate for nft tooling that byte-swaps numeric map keys.
    pub hash_workaround: bool,

    /// Emit `meta nftrace set 1` at the top of the dispatch chains.
    pub trace: bool,

    /// Traffic from these networks is not masqueraded.
    pub cluster_cidrs: Vec<IpNet>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidConfig {
    #[error("split bits must be at most {max} for {family}, got {bits}")]
    SplitBits { family: Family, bits: u8, max: u8 },

    #[error("maps count must be at least 1")]
    NoMaps,
}

// === impl Config ===

impl Default for Config {
    fn default() -> Self {
        Self {
            hook_priority: 0,
            comments: true,
            split_bits: 24,
            split_bits6: 120,
            maps_count: 256,
            hash_workaround: false,
            trace: false,
            cluster_cidrs: vec![IpNet::V4(Ipv4Net::default())],
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        for family in [Family::Ip, Family::Ip6] {
            let bits = self.split_bits(family);
            let max = family.max_prefix_len();
            if bits > max {
                return Err(InvalidConfig::SplitBits { family, bits, max });
            }
        }
        if self.maps_count == 0 {
            return Err(InvalidConfig::NoMaps);
        }
        Ok(())
    }

    pub fn split_bits(&self, family: Family) -> u8 {
        match family {
            Family::Ip => self.split_bits,
            Family::Ip6 => self.split_bits6,
        }
    }

    /// Cluster networks of the given family.
    pub fn cluster_cidrs(&self, family: Family) -> Vec<IpNet> {
        self.cluster_cidrs
            .iter()
            .filter(|net| family.contains(net.addr()))
            .map(IpNet::trunc)
            .collect()
    }

    /// Maps a vmap element index to the key nft must be given.
    ///
    /// With the workaround, the low three bytes of the index are written in
    /// reverse order in the high bytes of the key, so `1` becomes `16777216`.
    pub fn nft_key(&self, index: u64) -> u64 {
        if !self.hash_workaround {
            return index;
        }
        (index & 0xff) << 24 | (index >> 8 & 0xff) << 16 | (index >> 16 & 0xff) << 8
    }
}
