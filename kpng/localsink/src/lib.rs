//! Full-state sink.
//!
//! The watch layer delivers a stream of [`Op`]s. The sink keeps the latest
//! value of every object and, on each `Sync`, hands the whole snapshot to a
//! [`Callback`] as a sequence of [`ServiceEndpoints`]: each service followed
//! by the endpoints stored under its path.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod op;
mod path;
mod pipe;
mod sink;


pub use self::{
    op::{Op, Value},
    path::Path,
    pipe::{Pipe, Strategy},
    sink::Sink,
};
pub use kpng_api::ServiceEndpoints;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid op: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unknown pipe strategy: {0:?}")]
    UnknownStrategy(String),
}

/// A stage consuming one snapshot.
///
/// The channel yields every service of the snapshot in path order and is
/// closed once the snapshot has been fully sent. Implementations should
/// drain it; a stage returning early only drops the rest of the snapshot.
#[async_trait::async_trait]
pub trait Callback: Send + Sync {
    async fn callback(&self, rx: mpsc::Receiver<ServiceEndpoints>);
}

#[async_trait::async_trait]
impl<C: Callback + ?Sized> Callback for Arc<C> {
    async fn callback(&self, rx: mpsc::Receiver<ServiceEndpoints>) {
        (**self).callback(rx).await
    }
}
