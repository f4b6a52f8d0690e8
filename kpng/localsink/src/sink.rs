use crate::{Callback, Op, Path, ServiceEndpoints, Value};
use kpng_api::{Endpoint, Service};
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

const SNAPSHOT_BUFFER: usize = 16;

/// Holds the latest state and runs a pass of its callback on every sync.
#[derive(Debug)]
pub struct Sink<C> {
    callback: C,
    data: BTreeMap<Path, Entry>,
}

#[derive(Debug)]
enum Entry {
    Service(Arc<Service>),
    Endpoint(Arc<Endpoint>),
}

// === impl Sink ===

impl<C: Callback> Sink<C> {
    pub fn new(callback: C) -> Self {
        Self {
            callback,
            data: BTreeMap::new(),
        }
    }

    pub fn callback(&self) -> &C {
        &self.callback
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Applies one op. Returns true if a pass was run.
    pub async fn send(&mut self, op: Op) -> bool {
        match op {
            Op::Set { path, value } => {
                trace!(%path, "Set");
                let entry = match value {
                    Value::Service(svc) => Entry::Service(Arc::new(svc)),
                    Value::Endpoint(ep) => Entry::Endpoint(Arc::new(ep)),
                };
                self.data.insert(path.into(), entry);
                false
            }

            Op::Delete { path } => {
                if self.data.remove(&Path::from(path.as_str())).is_none() {
                    debug!(%path, "Deleting unknown path");
                }
                false
            }

            Op::Reset => {
                debug!(objects = self.data.len(), "Reset");
                self.data.clear();
                false
            }

            Op::Sync => {
                self.sync().await;
                true
            }
        }
    }

    /// Groups the stored objects: every service, in path order, with the
    /// endpoints stored under its path.
    pub fn snapshot(&self) -> Vec<ServiceEndpoints> {
        let mut snapshot = Vec::<ServiceEndpoints>::new();
        let mut parent: Option<&str> = None;

        for (path, entry) in &self.data {
            match entry {
                Entry::Service(svc) => {
                    parent = Some(path.as_str());
                    snapshot.push(ServiceEndpoints::new(svc.clone()));
                }

                Entry::Endpoint(ep) => {
                    let owned = parent
                        .and_then(|p| path.as_str().strip_prefix(p))
                        .map_or(false, |rest| rest.starts_with('/'));
                    match snapshot.last_mut() {
                        Some(seps) if owned => seps.endpoints.push(ep.clone()),
                        _ => warn!(%path, "Ignoring endpoint without a service"),
                    }
                }
            }
        }

        snapshot
    }

    async fn sync(&self) {
        let snapshot = self.snapshot();
        debug!(services = snapshot.len(), "Sync");

        let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);
        let feed = async move {
            for seps in snapshot {
                if tx.send(seps).await.is_err() {
                    debug!("Callback stopped reading the snapshot");
                    return;
                }
            }
        };
        tokio::join!(feed, self.callback.callback(rx));
    }
}
