//! Local proxy model.
//!
//! These are the decoded shapes of the objects a node agent receives from the
//! watch layer: a `Service` with its ports and addresses, and the `Endpoint`s
//! currently backing it. Field names follow the wire schema so that the
//! decoder can hand values over without any translation.
//!
//! That schema is camelCase except for address fields, which keep the
//! capitalized names of the upstream Go types (`IPs`, `ClusterIPs`,
//! `ExternalIPs`, `LoadBalancerIPs`, `V4`, `V6`). Those renames are explicit
//! on each field; everything else goes through `rename_all = "camelCase"`.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod endpoint;
mod ipset;
mod service;

pub use self::{
    endpoint::{Endpoint, PortError},
    ipset::IpSet,
    service::{PortMapping, Protocol, Service, ServiceIps, ServiceType, SessionAffinity},
};
use std::sync::Arc;

/// A service together with the endpoints that back it, as delivered for one
/// compilation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceEndpoints {
    pub service: Arc<Service>,
    pub endpoints: Vec<Arc<Endpoint>>,
}

impl ServiceEndpoints {
    pub fn new(service: impl Into<Arc<Service>>) -> Self {
        Self {
            service: service.into(),
            endpoints: Vec::new(),
        }
    }

    pub fn with_endpoints<I, E>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Arc<Endpoint>>,
    {
        self.endpoints.extend(endpoints.into_iter().map(Into::into));
        self
    }
}
