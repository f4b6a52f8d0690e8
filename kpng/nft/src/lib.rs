//! nftables service proxy.
//!
//! Every pass compiles the full service snapshot into one [`Table`] per
//! address family, through a [`RenderContext`]. The tables track what each
//! pass wrote, so only the objects that changed since the previous pass are
//! sent to the kernel, as an nft [`Script`].
//!
//! Traffic is dispatched as follows:
//!
//! ```text
//! z_hook_* -> z_dnat_all -> dnat_net_<prefix> (vmap on daddr)
//!                        -> dnat_external     (vmap on daddr)
//!                        -> nodeports_dnat    (local daddr)
//!          -> dnat_svc_<ns>_<name>            (per port)
//!          -> svc_<ns>_<name>_eps[_<port>]    (numgen vmap)
//!          -> svc_<ns>_<name>_ep_<ip>         (dnat)
//! ```
//!
//! Services without endpoints follow the same path through the `filter`
//! hooks, where their ports are rejected.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod apply;
pub mod checks;
mod config;
mod proxy;
mod render;
mod script;
mod table;

pub use self::{
    apply::{Apply, DryRun, Error, Nft},
    config::{Config, InvalidConfig},
    proxy::{Outcome, Proxy},
    render::{PassStats, RenderContext},
    script::Script,
    table::{Family, Kind, Table},
};
