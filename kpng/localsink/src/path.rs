use std::{cmp::Ordering, fmt};

/// A store path, such as `ns/svc` or `ns/svc/endpoint`.
///
/// Paths order segment by segment: `/` sorts before any other byte, so that
/// the children of `ns/svc` come right after it and before `ns/svc-udp`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Path(String);

// === impl Path ===

impl Path {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Path {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Ord for Path {
    fn cmp(&self, other: &Self) -> Ordering {
        let rank = |b: &u8| (*b != b'/', *b);
        self.0.as_bytes().iter().map(rank).cmp(other.0.as_bytes().iter().map(rank))
    }
}

impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
