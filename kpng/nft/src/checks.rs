//! Startup checks of the host's netfilter tooling.

use crate::{Apply, Nft};
use tokio::process::Command;
use tracing::{info, warn};

const TEST_TABLE: &str = "k8s_test_vmap_bug";

const TEST_SCRIPT: &str = "\
table ip k8s_test_vmap_bug
delete table ip k8s_test_vmap_bug
table ip k8s_test_vmap_bug {
  map m1 {
    typeof numgen random mod 2 : ip daddr
    elements = { 1 : 10.0.0.1, 2 : 10.0.0.2 }
  }
}
";

/// Outcome of the map key byte-order check.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HashBug {
    /// Keys are read back byte-swapped; generated keys need the workaround.
    Present,
    Absent,
    /// nft did not list the test map, so nothing can be told.
    Unknown,
}

// === impl HashBug ===

impl HashBug {
    /// Interprets the listing of the test map.
    pub fn from_listing(listing: &str) -> Self {
        if listing.trim().is_empty() {
            return Self::Unknown;
        }
        if listing.contains("16777216") || listing.contains("0x01000000") {
            return Self::Present;
        }
        Self::Absent
    }
}

/// Writes a throwaway table with known map keys and reads it back to tell
/// whether nft swaps the bytes of numeric map keys.
pub async fn detect_hash_bug(nft: &Nft) -> HashBug {
    info!("Checking for nft map key bug");

    if let Err(error) = nft.apply(TEST_SCRIPT).await {
        warn!(%error, "Failed to test nft bugs");
    }

    let listing = nft
        .output(&["list", "map", "ip", TEST_TABLE, "m1"], None)
        .await;

    if let Err(error) = nft.apply(&format!("delete table ip {TEST_TABLE}\n")).await {
        warn!(%error, table = TEST_TABLE, "Failed to delete test table");
    }

    let bug = match listing {
        Ok(listing) => HashBug::from_listing(&listing),
        Err(error) => {
            warn!(%error, "Failed to test nft bugs");
            return HashBug::Unknown;
        }
    };

    match bug {
        HashBug::Present => info!(
            "nft map key bug found, map indices will be compensated (0x01 becomes 0x01000000)"
        ),
        HashBug::Absent => {}
        HashBug::Unknown => warn!(
            "nft is blind, cannot detect the map key bug. To check manually, load this script \
             with `nft -f -` then run `nft list map ip {TEST_TABLE} m1`; if the keys read \
             16777216 and 33554432, run with --force-nft-hash-workaround\n{TEST_SCRIPT}"
        ),
    }
    bug
}

/// Tells whether `iptables -V` output names the legacy backend.
pub fn is_legacy(version: &str) -> bool {
    version.contains("legacy")
}

/// Warns when the legacy iptables backend is installed next to nftables.
pub async fn check_iptables_version() {
    for bin in ["ip6tables", "iptables"] {
        match Command::new(bin).arg("-V").output().await {
            Ok(output) => {
                if is_legacy(&String::from_utf8_lossy(&output.stdout)) {
                    warn!(%bin, "Legacy iptables found");
                }
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => warn!(%error, %bin, "Failed to check iptables version"),
        }
    }
}
