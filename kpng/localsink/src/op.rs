use crate::Error;
use kpng_api::{Endpoint, Service};
use serde::{Deserialize, Serialize};

/// One change of the watched state, as read from the feed.
///
/// On the wire, each op is a JSON object tagged by `op`:
///
/// ```text
/// {"op":"set","path":"ns/svc","service":{...}}
/// {"op":"set","path":"ns/svc/ep-1","endpoint":{...}}
/// {"op":"delete","path":"ns/svc/ep-1"}
/// {"op":"reset"}
/// {"op":"sync"}
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Op {
    Set {
        path: String,
        #[serde(flatten)]
        value: Value,
    },
    Delete {
        path: String,
    },
    /// Forgets everything; the feed is about to resend the full state.
    Reset,
    /// The state is consistent: run one pass over it.
    Sync,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    Service(Service),
    Endpoint(Endpoint),
}

// === impl Op ===

impl Op {
    pub fn from_json(line: &str) -> Result<Self, Error> {
        serde_json::from_str(line).map_err(Into::into)
    }

    pub fn set_service(path: impl Into<String>, service: Service) -> Self {
        Self::Set {
            path: path.into(),
            value: Value::Service(service),
        }
    }

    pub fn set_endpoint(path: impl Into<String>, endpoint: Endpoint) -> Self {
        Self::Set {
            path: path.into(),
            value: Value::Endpoint(endpoint),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::Delete { path: path.into() }
    }
}
