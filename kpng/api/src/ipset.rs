use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// A set of addresses, split by family.
///
/// Addresses are kept in their textual form, sorted and deduplicated, so that
/// two sets holding the same addresses always compare (and serialize) equal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpSet {
    #[serde(default, rename = "V4")]
    pub v4: Vec<String>,
    #[serde(default, rename = "V6")]
    pub v6: Vec<String>,
}

// === impl IpSet ===

impl IpSet {
    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }

    /// Adds an address to the set, returning the parsed value.
    ///
    /// Strings that do not parse as an address are ignored and `None` is
    /// returned.
    pub fn add(&mut self, s: &str) -> Option<IpAddr> {
        let ip = s.parse::<IpAddr>().ok()?;
        match ip {
            IpAddr::V4(_) => insert_sorted(&mut self.v4, s),
            IpAddr::V6(_) => insert_sorted(&mut self.v6, s),
        }
        Some(ip)
    }

    pub fn add_set(&mut self, other: &IpSet) {
        for ip in &other.v4 {
            insert_sorted(&mut self.v4, ip);
        }
        for ip in &other.v6 {
            insert_sorted(&mut self.v6, ip);
        }
    }

    /// Iterates over IPv4 addresses, then IPv6 addresses.
    pub fn all(&self) -> impl Iterator<Item = &str> {
        self.v4.iter().chain(self.v6.iter()).map(String::as_str)
    }
}

impl<'a> FromIterator<&'a str> for IpSet {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        let mut set = IpSet::default();
        for ip in iter {
            set.add(ip);
        }
        set
    }
}

fn insert_sorted(list: &mut Vec<String>, s: &str) {
    if let Err(idx) = list.binary_search_by(|item| item.as_str().cmp(s)) {
        list.insert(idx, s.to_string());
    }
}
